//! Device classes and the nodes published through them.
//!
//! [`ClassOnly`] just creates `myclass`. [`DeviceFile`] puts two devices, `200:1` and
//! `200:2`, under it as `/dev/mydevice1` and `/dev/mydevice2`, each with a number range
//! and a buffer of its own.

use std::sync::Arc;

use kernel::{
    buf::{UserSliceReader, UserSliceWriter},
    chrdev::{self, ScratchBuffer},
    class::{Class, Node},
    fs::file_operations::{File, FileOperations},
    prelude::*,
};

/// Creates `myclass` on load and destroys it on unload.
pub struct ClassOnly {
    class: Class,
}

impl Module for ClassOnly {
    fn init(module: &ThisModule) -> Result<Self> {
        kernel::logger::init_logger();
        let class = Class::create(module, "myclass")?;
        pr_info!("class {} created\n", class.name());
        Ok(ClassOnly { class })
    }
}

impl ClassOnly {
    pub fn class(&self) -> &Class {
        &self.class
    }
}

impl Drop for ClassOnly {
    fn drop(&mut self) {
        if let Err(e) = self.class.destroy() {
            pr_warn!("class {} left behind: {:?}\n", self.class.name(), e);
        }
    }
}

module! {
    type: ClassOnly,
    name: "class_only",
    author: "Rust for Linux Contributors",
    description: "Creates a device class",
    license: "GPL",
}

struct BufferFile;

impl FileOperations for BufferFile {
    type OpenData = Arc<ScratchBuffer>;
    type Data = Arc<ScratchBuffer>;
    const HAS_READ: bool = true;
    const HAS_WRITE: bool = true;

    fn open(buffer: &Arc<ScratchBuffer>, _file: &File<'_>) -> Result<Arc<ScratchBuffer>> {
        Ok(Arc::clone(buffer))
    }

    fn read(
        buffer: &Arc<ScratchBuffer>,
        _file: &File<'_>,
        writer: &mut UserSliceWriter<'_>,
        offset: u64,
    ) -> Result<usize> {
        buffer.read(writer, offset)
    }

    fn write(
        buffer: &Arc<ScratchBuffer>,
        _file: &File<'_>,
        reader: &mut UserSliceReader<'_>,
        offset: u64,
    ) -> Result<usize> {
        buffer.write(reader, offset)
    }
}

/// Two buffered devices, each on a number range of its own, published under `myclass`.
pub struct DeviceFile {
    nodes: Vec<Node>,
    class: Class,
    devices: Vec<chrdev::Registration>,
    buffers: Vec<Arc<ScratchBuffer>>,
}

impl Module for DeviceFile {
    fn init(module: &ThisModule) -> Result<Self> {
        kernel::logger::init_logger();
        let size = usize::try_from(module.param::<u32>("buffer_size")?)?;
        let mut buffers = Vec::new();
        let mut devices = Vec::new();
        for minor in 1..=2 {
            let buffer = Arc::new(ScratchBuffer::new(size));
            let reg = chrdev::builder(module, &format!("mydevice{}", minor), minor..minor + 1)?
                .major(200)
                .register_device::<BufferFile>(Arc::clone(&buffer))
                .build()?;
            buffers.push(buffer);
            devices.push(reg);
        }

        // Nodes go away before the class on every early return.
        let class = Class::create(module, "myclass")?;
        let mut nodes = Vec::new();
        for (i, reg) in devices.iter().enumerate() {
            let node = class.publish(reg.region(), 0, &format!("mydevice{}", i + 1))?;
            pr_info!("{} is up\n", node.path());
            nodes.push(node);
        }
        Ok(DeviceFile {
            nodes,
            class,
            devices,
            buffers,
        })
    }
}

impl DeviceFile {
    pub fn buffer(&self, index: usize) -> Option<&ScratchBuffer> {
        self.buffers.get(index).map(|b| &**b)
    }

    pub fn class(&self) -> &Class {
        &self.class
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn devices(&self) -> &[chrdev::Registration] {
        &self.devices
    }
}

impl Drop for DeviceFile {
    fn drop(&mut self) {
        while let Some(node) = self.nodes.pop() {
            node.unpublish();
        }
        if let Err(e) = self.class.destroy() {
            pr_warn!("class {} left behind: {:?}\n", self.class.name(), e);
        }
    }
}

module! {
    type: DeviceFile,
    name: "devicefile",
    author: "Rust for Linux Contributors",
    description: "Two device nodes under one class",
    license: "GPL",
    params: {
        buffer_size: u32 {
            default: 64,
            permissions: 0o444,
            description: "Bytes of storage per device",
        },
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel::{
        bindings::{MKDEV, O_RDWR, SEEK_SET},
        chrdev::Region,
        kbind::vfs::Process,
        module::load,
        Kernel,
    };

    #[test]
    fn class_only_module_creates_and_destroys_its_class() {
        let kernel = Kernel::new();
        let loaded = load::<ClassOnly>(&kernel, "").unwrap();
        assert_eq!(kernel.class_devices("myclass"), Some(Vec::new()));
        loaded.unload();
        assert!(kernel.class_devices("myclass").is_none());
    }

    #[test]
    fn both_nodes_resolve_to_their_numbers() {
        let kernel = Kernel::new();
        let loaded = load::<DeviceFile>(&kernel, "").unwrap();
        assert_eq!(kernel.devtmpfs_lookup("/dev/mydevice1"), Some(MKDEV(200, 1)));
        assert_eq!(kernel.devtmpfs_lookup("/dev/mydevice2"), Some(MKDEV(200, 2)));
        let mut listed = kernel.class_devices("myclass").unwrap();
        listed.sort();
        assert_eq!(
            listed,
            vec![
                ("mydevice1".to_string(), MKDEV(200, 1)),
                ("mydevice2".to_string(), MKDEV(200, 2)),
            ]
        );
        assert_eq!(loaded.get().class().node_count(), 2);
        assert_eq!(
            kernel.proc_devices(),
            vec![(200, "mydevice1".to_string()), (200, "mydevice2".to_string())]
        );
        let devices = loaded.get().devices();
        assert_ne!(devices[0].region().dev(), devices[1].region().dev());
    }

    #[test]
    fn devices_keep_separate_buffers() {
        let kernel = Kernel::new();
        let loaded = load::<DeviceFile>(&kernel, "buffer_size=8").unwrap();
        let p = Process::new(&kernel);
        let one = p.open("/dev/mydevice1", O_RDWR).unwrap();
        let two = p.open("/dev/mydevice2", O_RDWR).unwrap();

        assert_eq!(p.write_bytes(one, b"first").unwrap(), 5);
        assert_eq!(p.write_bytes(two, b"second!!!").unwrap(), 8);
        p.lseek(one, 0, SEEK_SET).unwrap();
        p.lseek(two, 0, SEEK_SET).unwrap();
        assert_eq!(p.read_bytes(one, 64).unwrap(), b"first");
        assert_eq!(p.read_bytes(two, 64).unwrap(), b"second!!");

        let module = loaded.get();
        assert_eq!(module.buffer(0).unwrap().contents(), b"first");
        assert_eq!(module.buffer(1).unwrap().contents(), b"second!!");
        assert!(module.buffer(2).is_none());
    }

    #[test]
    fn taken_class_name_fails_the_load_and_unwinds() {
        let kernel = Kernel::new();
        let class_only = load::<ClassOnly>(&kernel, "").unwrap();
        assert_eq!(load::<DeviceFile>(&kernel, "").err(), Some(EEXIST));
        assert!(kernel.proc_devices().is_empty());
        assert!(kernel.cdev_lookup(MKDEV(200, 1)).is_none());
        assert_eq!(kernel.devtmpfs_lookup("/dev/mydevice1"), None);
        assert_eq!(kernel.lsmod(), vec!["class_only".to_string()]);

        class_only.unload();
        let loaded = load::<DeviceFile>(&kernel, "").unwrap();
        assert_eq!(loaded.get().nodes().len(), 2);
    }

    #[test]
    fn unload_removes_nodes_before_the_class() {
        let kernel = Kernel::new();
        let loaded = load::<DeviceFile>(&kernel, "").unwrap();
        loaded.unload();
        assert_eq!(kernel.devtmpfs_lookup("/dev/mydevice1"), None);
        assert_eq!(kernel.devtmpfs_lookup("/dev/mydevice2"), None);
        assert!(kernel.class_devices("myclass").is_none());
        assert!(kernel.proc_devices().is_empty());
        assert!(kernel.lsmod().is_empty());
    }

    #[test]
    fn class_with_a_foreign_node_outlives_its_module() {
        let kernel = Kernel::new();
        let loaded = load::<ClassOnly>(&kernel, "").unwrap();
        let other = ThisModule::new(&kernel, "other");
        let region = Region::register(&other, 200, 1, 1, "other").unwrap();
        let node = loaded.get().class().publish(&region, 0, "mydevice1").unwrap();

        loaded.unload();
        assert!(kernel.lsmod().is_empty());
        assert_eq!(
            kernel.class_devices("myclass"),
            Some(vec![("mydevice1".to_string(), MKDEV(200, 1))])
        );
        node.unpublish();
        assert!(kernel.class_devices("myclass").is_none());
    }
}
