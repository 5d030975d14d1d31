//! A character device backed by a small in-memory buffer.
//!
//! Loading it allocates a number range, makes one device per minor live and publishes
//! each as a node under a class named after the device. Data written to a node can be
//! read back from it until the module is unloaded.

use std::sync::Arc;

use kernel::{
    buf::{UserSliceReader, UserSliceWriter},
    chrdev::{self, ScratchBuffer},
    fs::file_operations::{File, FileOperations},
    prelude::*,
};

struct BufferDevice;

impl FileOperations for BufferDevice {
    type OpenData = Arc<ScratchBuffer>;
    type Data = Arc<ScratchBuffer>;
    const HAS_READ: bool = true;
    const HAS_WRITE: bool = true;

    fn open(buffer: &Arc<ScratchBuffer>, file: &File<'_>) -> Result<Arc<ScratchBuffer>> {
        pr_info!("device_open: flags {:?}\n", file.flags());
        Ok(Arc::clone(buffer))
    }

    fn release(_buffer: Arc<ScratchBuffer>, _file: &File<'_>) {
        pr_info!("device_release\n");
    }

    fn read(
        buffer: &Arc<ScratchBuffer>,
        _file: &File<'_>,
        writer: &mut UserSliceWriter<'_>,
        offset: u64,
    ) -> Result<usize> {
        let n = buffer.read(writer, offset)?;
        pr_debug!("device_read: {} bytes at {}\n", n, offset);
        Ok(n)
    }

    fn write(
        buffer: &Arc<ScratchBuffer>,
        _file: &File<'_>,
        reader: &mut UserSliceReader<'_>,
        offset: u64,
    ) -> Result<usize> {
        let requested = reader.len();
        let n = buffer.write(reader, offset)?;
        pr_debug!("device_write: {} of {} bytes at {}\n", n, requested, offset);
        Ok(n)
    }
}

struct CdevModule {
    buffers: Vec<Arc<ScratchBuffer>>,
    reg: chrdev::Registration,
}

impl Module for CdevModule {
    fn init(module: &ThisModule) -> Result<Self> {
        kernel::logger::init_logger();
        let base_minor: u32 = module.param("base_minor")?;
        let count: u32 = module.param("count")?;
        let device_name: String = module.param("device_name")?;
        let size = usize::try_from(module.param::<u32>("buffer_size")?)?;

        let minors = base_minor..base_minor.checked_add(count).ok_or(EINVAL)?;
        let mut builder = chrdev::builder(module, &device_name, minors)?.class(&device_name);
        let mut buffers = Vec::new();
        for i in 0..count {
            let buffer = Arc::new(ScratchBuffer::new(size));
            builder = builder.register_device::<BufferDevice>(Arc::clone(&buffer));
            builder = if count == 1 {
                builder.node(&device_name)
            } else {
                builder.node(&format!("{}{}", device_name, i))
            };
            buffers.push(buffer);
        }
        let reg = builder.build()?;
        pr_info!(
            "Major number received:{} ({} device(s))\n",
            reg.region().major(),
            count
        );
        Ok(CdevModule { buffers, reg })
    }
}

impl CdevModule {
    fn buffer(&self, index: usize) -> Option<&ScratchBuffer> {
        self.buffers.get(index).map(|b| &**b)
    }
}

module! {
    type: CdevModule,
    name: "mychardev",
    author: "Rust for Linux Contributors",
    description: "Character device with a scratch buffer",
    license: "GPL",
    params: {
        base_minor: u32 {
            default: 0,
            permissions: 0o444,
            description: "First minor number",
        },
        count: u32 {
            default: 1,
            permissions: 0o444,
            description: "Number of devices",
        },
        device_name: String {
            default: "mychardev",
            permissions: 0o444,
            description: "Name of the device and its class",
        },
        buffer_size: u32 {
            default: 10,
            permissions: 0o444,
            description: "Bytes of storage per device",
        },
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel::{
        bindings::{MKDEV, O_RDONLY, O_RDWR, O_WRONLY, SEEK_CUR, SEEK_END, SEEK_SET},
        kbind::{mm::PAGE_SIZE, vfs::Process},
        module::load,
        Kernel,
    };

    #[test]
    fn write_then_read_back() {
        let kernel = Kernel::new();
        let _loaded = load::<CdevModule>(&kernel, "").unwrap();
        let p = Process::new(&kernel);
        let fd = p.open("/dev/mychardev", O_RDWR).unwrap();
        assert_eq!(p.write_bytes(fd, b"hello").unwrap(), 5);
        assert_eq!(p.lseek(fd, 0, SEEK_SET).unwrap(), 0);
        assert_eq!(p.read_bytes(fd, 10).unwrap(), b"hello");
        assert_eq!(p.read_bytes(fd, 10).unwrap(), b"");
        p.close(fd).unwrap();
    }

    #[test]
    fn data_survives_reopening() {
        let kernel = Kernel::new();
        let _loaded = load::<CdevModule>(&kernel, "").unwrap();
        let p = Process::new(&kernel);
        let w = p.open("/dev/mychardev", O_WRONLY).unwrap();
        assert_eq!(p.write_bytes(w, b"abc").unwrap(), 3);
        p.close(w).unwrap();

        let r = p.open("/dev/mychardev", O_RDONLY).unwrap();
        assert_eq!(p.read_bytes(r, 2).unwrap(), b"ab");
        assert_eq!(p.read_bytes(r, 2).unwrap(), b"c");
        assert_eq!(p.write_bytes(r, b"x").err(), Some(EBADF));
    }

    #[test]
    fn full_buffer_gives_short_writes() {
        let kernel = Kernel::new();
        let loaded = load::<CdevModule>(&kernel, "").unwrap();
        let p = Process::new(&kernel);
        let fd = p.open("/dev/mychardev", O_RDWR).unwrap();
        assert_eq!(p.write_bytes(fd, b"0123456789abcdef").unwrap(), 10);
        assert_eq!(p.write_bytes(fd, b"more").unwrap(), 0);
        assert_eq!(p.write_bytes(fd, b"").unwrap(), 0);
        assert_eq!(loaded.get().buffer(0).unwrap().contents(), b"0123456789");
    }

    #[test]
    fn reads_past_the_data_return_nothing() {
        let kernel = Kernel::new();
        let _loaded = load::<CdevModule>(&kernel, "").unwrap();
        let p = Process::new(&kernel);
        let fd = p.open("/dev/mychardev", O_RDWR).unwrap();
        p.write_bytes(fd, b"four").unwrap();
        assert_eq!(p.lseek(fd, 2, SEEK_SET).unwrap(), 2);
        assert_eq!(p.read_bytes(fd, 64).unwrap(), b"ur");
        assert_eq!(p.lseek(fd, 100, SEEK_CUR).unwrap(), 104);
        assert!(p.read_bytes(fd, 64).unwrap().is_empty());
        assert_eq!(p.lseek(fd, 0, SEEK_END).err(), Some(EINVAL));
    }

    #[test]
    fn bad_user_addresses_fault() {
        let kernel = Kernel::new();
        let loaded = load::<CdevModule>(&kernel, "").unwrap();
        let p = Process::new(&kernel);
        let fd = p.open("/dev/mychardev", O_RDWR).unwrap();
        let bogus = 0x10 * PAGE_SIZE;
        assert_eq!(p.write(fd, bogus, 4).err(), Some(EFAULT));
        assert_eq!(loaded.get().buffer(0).unwrap().data_len(), 0);

        p.write_bytes(fd, b"data").unwrap();
        p.lseek(fd, 0, SEEK_SET).unwrap();
        assert_eq!(p.read(fd, bogus, 4).err(), Some(EFAULT));
    }

    #[test]
    fn several_minors_get_their_own_nodes() {
        let kernel = Kernel::new();
        let loaded = load::<CdevModule>(&kernel, "count=3 base_minor=4 device_name=tty").unwrap();
        let major = loaded.get().reg.region().major();
        for i in 0..3 {
            assert_eq!(
                kernel.devtmpfs_lookup(&format!("/dev/tty{}", i)),
                Some(MKDEV(major, 4 + i))
            );
        }
        let p = Process::new(&kernel);
        let fd = p.open("/dev/tty1", O_RDWR).unwrap();
        p.write_bytes(fd, b"one").unwrap();
        assert_eq!(loaded.get().buffer(1).unwrap().contents(), b"one");
        assert!(loaded.get().buffer(0).unwrap().contents().is_empty());
        assert!(loaded.get().buffer(2).unwrap().contents().is_empty());
    }

    #[test]
    fn unload_with_an_open_file() {
        let kernel = Kernel::new();
        let loaded = load::<CdevModule>(&kernel, "").unwrap();
        let dev = loaded.get().reg.region().dev();
        let p = Process::new(&kernel);
        let fd = p.open("/dev/mychardev", O_RDWR).unwrap();
        p.write_bytes(fd, b"hi").unwrap();

        loaded.unload();
        assert_eq!(p.write_bytes(fd, b"hi").err(), Some(ENODEV));
        assert_eq!(p.read_bytes(fd, 2).err(), Some(ENODEV));
        assert_eq!(p.open("/dev/mychardev", O_RDWR).err(), Some(ENOENT));
        assert_eq!(p.open_dev(dev, O_RDWR).err(), Some(ENXIO));
        p.close(fd).unwrap();
        assert!(kernel.proc_devices().is_empty());

        let _again = load::<CdevModule>(&kernel, "").unwrap();
        assert!(p.open("/dev/mychardev", O_RDWR).is_ok());
    }

    #[test]
    fn concurrent_readers_and_writers() {
        let kernel = Kernel::new();
        let loaded = load::<CdevModule>(&kernel, "buffer_size=32").unwrap();

        std::thread::scope(|s| {
            for byte in [b'w', b'x', b'y', b'z'] {
                let kernel = &kernel;
                s.spawn(move || {
                    let p = Process::new(kernel);
                    let fd = p.open("/dev/mychardev", O_RDWR).unwrap();
                    for _ in 0..100 {
                        p.lseek(fd, 0, SEEK_SET).unwrap();
                        assert_eq!(p.write_bytes(fd, &[byte; 32]).unwrap(), 32);
                        p.lseek(fd, 0, SEEK_SET).unwrap();
                        let seen = p.read_bytes(fd, 32).unwrap();
                        assert_eq!(seen.len(), 32);
                        assert!(seen.iter().all(|&b| b == seen[0]));
                    }
                });
            }
        });

        let contents = loaded.get().buffer(0).unwrap().contents();
        assert!(contents.iter().all(|&b| b == contents[0]));
        assert_eq!(loaded.get().reg.device(0).unwrap().open_count(), 0);
    }
}
