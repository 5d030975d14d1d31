//! `/dev/msg`: every write replaces the stored message, every read returns it.

use std::sync::Arc;

use kernel::{
    buf::{UserSliceReader, UserSliceWriter},
    chrdev::{self, ScratchBuffer},
    fs::file_operations::{File, FileOperations},
    prelude::*,
};

struct Msg;

impl FileOperations for Msg {
    type OpenData = Arc<ScratchBuffer>;
    type Data = Arc<ScratchBuffer>;
    const HAS_READ: bool = true;
    const HAS_WRITE: bool = true;

    fn open(msg: &Arc<ScratchBuffer>, _file: &File<'_>) -> Result<Arc<ScratchBuffer>> {
        Ok(Arc::clone(msg))
    }

    fn read(
        msg: &Arc<ScratchBuffer>,
        _file: &File<'_>,
        writer: &mut UserSliceWriter<'_>,
        offset: u64,
    ) -> Result<usize> {
        msg.read(writer, offset)
    }

    fn write(
        msg: &Arc<ScratchBuffer>,
        _file: &File<'_>,
        reader: &mut UserSliceReader<'_>,
        _offset: u64,
    ) -> Result<usize> {
        msg.write_message(reader)
    }
}

struct CopyUser {
    msg: Arc<ScratchBuffer>,
    _reg: chrdev::Registration,
}

impl Module for CopyUser {
    fn init(module: &ThisModule) -> Result<Self> {
        kernel::logger::init_logger();
        let size = usize::try_from(module.param::<u32>("msg_size")?)?;
        let msg = Arc::new(ScratchBuffer::new(size));
        let reg = chrdev::builder(module, "msg", 0..1)?
            .register_device::<Msg>(Arc::clone(&msg))
            .class("msg")
            .node("msg")
            .build()?;
        pr_info!("/dev/msg on {}:0\n", reg.region().major());
        Ok(CopyUser { msg, _reg: reg })
    }
}

module! {
    type: CopyUser,
    name: "msg",
    author: "Rust for Linux Contributors",
    description: "Copies messages to and from user space",
    license: "GPL",
    params: {
        msg_size: u32 {
            default: 32,
            permissions: 0o444,
            description: "Longest message kept",
        },
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel::{
        bindings::{O_RDWR, SEEK_SET},
        kbind::vfs::Process,
        module::load,
        Kernel,
    };

    /// The user program: write "hello" up to 250 times, stopping at the first write that
    /// does not take all five bytes. Returns the results seen.
    fn hello_loop(p: &Process, fd: usize, before_each: impl Fn(usize)) -> Vec<Result<usize>> {
        let mut seen = Vec::new();
        for i in 0..250 {
            before_each(i);
            let ret = p.write_bytes(fd, b"hello");
            seen.push(ret);
            if ret != Ok(5) {
                break;
            }
        }
        seen
    }

    #[test]
    fn every_write_takes_the_whole_message() {
        let kernel = Kernel::new();
        let loaded = load::<CopyUser>(&kernel, "").unwrap();
        let p = Process::new(&kernel);
        let fd = p.open("/dev/msg", O_RDWR).unwrap();

        let seen = hello_loop(&p, fd, |_| {});
        assert_eq!(seen.len(), 250);
        assert!(seen.iter().all(|r| *r == Ok(5)));
        assert_eq!(loaded.get().msg.contents(), b"hello");

        p.lseek(fd, 0, SEEK_SET).unwrap();
        assert_eq!(p.read_bytes(fd, 64).unwrap(), b"hello");
    }

    #[test]
    fn loop_stops_once_the_module_is_gone() {
        let kernel = Kernel::new();
        let loaded = std::cell::Cell::new(Some(load::<CopyUser>(&kernel, "").unwrap()));
        let p = Process::new(&kernel);
        let fd = p.open("/dev/msg", O_RDWR).unwrap();

        let seen = hello_loop(&p, fd, |i| {
            if i == 100 {
                if let Some(m) = loaded.take() {
                    m.unload();
                }
            }
        });
        assert_eq!(seen.len(), 101);
        assert!(seen[..100].iter().all(|r| *r == Ok(5)));
        assert_eq!(seen[100], Err(ENODEV));
        assert!(kernel.lsmod().is_empty());
        p.close(fd).unwrap();
    }

    #[test]
    fn long_messages_are_cut_to_size() {
        let kernel = Kernel::new();
        let loaded = load::<CopyUser>(&kernel, "msg_size=4").unwrap();
        let p = Process::new(&kernel);
        let fd = p.open("/dev/msg", O_RDWR).unwrap();
        assert_eq!(p.write_bytes(fd, b"hello").unwrap(), 4);
        assert_eq!(p.write_bytes(fd, b"hi").unwrap(), 2);
        assert_eq!(loaded.get().msg.contents(), b"hi");
    }

    #[test]
    fn module_is_listed_while_loaded() {
        let kernel = Kernel::new();
        let loaded = load::<CopyUser>(&kernel, "").unwrap();
        assert_eq!(kernel.lsmod(), vec!["msg".to_string()]);
        assert_eq!(loaded.params(), vec![("msg_size", "32".to_string())]);
        assert_eq!(load::<CopyUser>(&kernel, "").err(), Some(EEXIST));
        loaded.unload();
        assert!(kernel.lsmod().is_empty());
        assert_eq!(kernel.devtmpfs_lookup("/dev/msg"), None);
    }
}
