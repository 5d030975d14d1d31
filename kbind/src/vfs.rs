//! The user-space side of character devices: processes, file descriptors and the
//! system calls that end up in a driver's `file_operations`.
//!
//! C source: `fs/open.c`, `fs/read_write.c`, `fs/file.c`.

use core::ffi::{c_int, c_uint};
use std::sync::Arc;

use spin::Mutex;

use crate::{
    bindings::{
        dev_t, file, inode, loff_t, ssize_t, NR_OPEN_DEFAULT, O_ACCMODE, O_RDONLY, O_WRONLY,
        SEEK_CUR, SEEK_SET,
    },
    error::{linux_err::*, to_result, Error, KernelResult},
    mm::{MmStruct, UserPtr, VmFlags},
    Kernel,
};

/// An open file description. Descriptors created with [`Process::dup`] share one.
pub struct OpenFile {
    inode: inode,
    file: file,
    pos: Mutex<loff_t>,
}

impl OpenFile {
    pub fn rdev(&self) -> dev_t {
        self.inode.i_rdev
    }

    pub fn flags(&self) -> c_uint {
        self.file.f_flags
    }

    fn readable(&self) -> bool {
        self.file.f_flags & O_ACCMODE != O_WRONLY
    }

    fn writable(&self) -> bool {
        self.file.f_flags & O_ACCMODE != O_RDONLY
    }
}

impl Drop for OpenFile {
    fn drop(&mut self) {
        if let Some(release) = self.inode.i_cdev.ops.release {
            // Errors from release are not reported to anybody, as in `__fput`.
            let _ = release(&self.inode, &mut self.file);
        }
    }
}

type IoFn = fn(&file, UserPtr<'_>, usize, &mut loff_t) -> ssize_t;

fn ssize_to_result(rc: ssize_t) -> KernelResult<usize> {
    if rc < 0 {
        let errno = c_int::try_from(rc).unwrap_or(-(crate::bindings::EINVAL as c_int));
        Err(Error::from_errno(errno))
    } else {
        Ok(rc as usize)
    }
}

/// A user process: an address space plus a descriptor table.
pub struct Process {
    kernel: Arc<Kernel>,
    pid: u32,
    mm: MmStruct,
    files: Mutex<Vec<Option<Arc<OpenFile>>>>,
}

impl Process {
    pub fn new(kernel: &Arc<Kernel>) -> Process {
        let pid = kernel.alloc_pid();
        log::trace!("process {} started", pid);
        Process {
            kernel: Arc::clone(kernel),
            pid,
            mm: MmStruct::new(),
            files: Mutex::new(Vec::new()),
        }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn mm(&self) -> &MmStruct {
        &self.mm
    }

    /// Opens a device node such as `/dev/mychardev`.
    pub fn open(&self, path: &str, flags: c_uint) -> KernelResult<usize> {
        let dev = self.kernel.devtmpfs_lookup(path).ok_or(ENOENT)?;
        self.open_dev(dev, flags)
    }

    /// Opens a device by number, as if through a node made with `mknod`.
    pub fn open_dev(&self, dev: dev_t, flags: c_uint) -> KernelResult<usize> {
        let cdev = self.kernel.cdev_lookup(dev).ok_or(ENXIO)?;
        let inode = inode {
            i_rdev: dev,
            i_cdev: cdev,
        };
        let mut file = file {
            f_flags: flags,
            private_data: None,
        };
        if let Some(open) = inode.i_cdev.ops.open {
            to_result(open(&inode, &mut file))?;
        }
        let of = Arc::new(OpenFile {
            inode,
            file,
            pos: Mutex::new(0),
        });
        self.install(of)
    }

    fn install(&self, of: Arc<OpenFile>) -> KernelResult<usize> {
        let mut files = self.files.lock();
        if let Some(fd) = files.iter().position(Option::is_none) {
            files[fd] = Some(of);
            return Ok(fd);
        }
        if files.len() >= NR_OPEN_DEFAULT {
            return Err(EMFILE);
        }
        files.push(Some(of));
        Ok(files.len() - 1)
    }

    /// Returns the open file behind `fd`.
    pub fn file(&self, fd: usize) -> KernelResult<Arc<OpenFile>> {
        self.files
            .lock()
            .get(fd)
            .and_then(|f| f.clone())
            .ok_or(EBADF)
    }

    pub fn dup(&self, fd: usize) -> KernelResult<usize> {
        let of = self.file(fd)?;
        self.install(of)
    }

    /// Closes `fd`. The driver's `release` runs once the last descriptor sharing the
    /// open file is gone.
    pub fn close(&self, fd: usize) -> KernelResult {
        let of = {
            let mut files = self.files.lock();
            files.get_mut(fd).and_then(Option::take).ok_or(EBADF)?
        };
        drop(of);
        Ok(())
    }

    fn io(&self, of: &OpenFile, op: IoFn, buf: usize, len: usize, pos: &mut loff_t) -> ssize_t {
        op(&of.file, UserPtr::new(&self.mm, buf), len, pos)
    }

    /// `read(2)`: reads up to `len` bytes into user memory at `buf`.
    pub fn read(&self, fd: usize, buf: usize, len: usize) -> KernelResult<usize> {
        let of = self.file(fd)?;
        if !of.readable() {
            return Err(EBADF);
        }
        let op = of.inode.i_cdev.ops.read.ok_or(EINVAL)?;
        // Held across the driver call, like `f_pos_lock`.
        let mut pos = of.pos.lock();
        let rc = self.io(&of, op, buf, len, &mut pos);
        drop(pos);
        ssize_to_result(rc)
    }

    /// `write(2)`: writes up to `len` bytes from user memory at `buf`.
    pub fn write(&self, fd: usize, buf: usize, len: usize) -> KernelResult<usize> {
        let of = self.file(fd)?;
        if !of.writable() {
            return Err(EBADF);
        }
        let op = of.inode.i_cdev.ops.write.ok_or(EINVAL)?;
        let mut pos = of.pos.lock();
        let rc = self.io(&of, op, buf, len, &mut pos);
        drop(pos);
        ssize_to_result(rc)
    }

    /// `pread(2)`: like [`Process::read`] at `offset`, leaving the file position alone.
    pub fn pread(&self, fd: usize, buf: usize, len: usize, offset: loff_t) -> KernelResult<usize> {
        let of = self.file(fd)?;
        if !of.readable() {
            return Err(EBADF);
        }
        if offset < 0 {
            return Err(EINVAL);
        }
        let op = of.inode.i_cdev.ops.read.ok_or(EINVAL)?;
        let mut pos = offset;
        ssize_to_result(self.io(&of, op, buf, len, &mut pos))
    }

    /// `pwrite(2)`: like [`Process::write`] at `offset`, leaving the file position alone.
    pub fn pwrite(&self, fd: usize, buf: usize, len: usize, offset: loff_t) -> KernelResult<usize> {
        let of = self.file(fd)?;
        if !of.writable() {
            return Err(EBADF);
        }
        if offset < 0 {
            return Err(EINVAL);
        }
        let op = of.inode.i_cdev.ops.write.ok_or(EINVAL)?;
        let mut pos = offset;
        ssize_to_result(self.io(&of, op, buf, len, &mut pos))
    }

    /// `lseek(2)` for devices without a size: only `SEEK_SET` and `SEEK_CUR` are
    /// meaningful.
    pub fn lseek(&self, fd: usize, offset: loff_t, whence: c_int) -> KernelResult<loff_t> {
        let of = self.file(fd)?;
        let mut pos = of.pos.lock();
        let new = match whence {
            SEEK_SET => offset,
            SEEK_CUR => pos.checked_add(offset).ok_or(EINVAL)?,
            _ => return Err(EINVAL),
        };
        if new < 0 {
            return Err(EINVAL);
        }
        *pos = new;
        Ok(new)
    }

    /// Writes `data` through `fd` from a freshly mapped user buffer.
    pub fn write_bytes(&self, fd: usize, data: &[u8]) -> KernelResult<usize> {
        if data.is_empty() {
            return self.write(fd, 0, 0);
        }
        let buf = self.mm.mmap(data.len(), VmFlags::RW)?;
        let res = self
            .mm
            .store(buf, data)
            .and_then(|_| self.write(fd, buf, data.len()));
        self.mm.munmap(buf)?;
        res
    }

    /// Reads up to `len` bytes through `fd` into a freshly mapped user buffer and
    /// returns what the driver produced.
    pub fn read_bytes(&self, fd: usize, len: usize) -> KernelResult<Vec<u8>> {
        if len == 0 {
            return self.read(fd, 0, 0).map(|_| Vec::new());
        }
        let buf = self.mm.mmap(len, VmFlags::RW)?;
        let res = self
            .read(fd, buf, len)
            .and_then(|n| self.mm.load(buf, n));
        self.mm.munmap(buf)?;
        res
    }
}

impl Drop for Process {
    fn drop(&mut self) {
        let files = core::mem::take(&mut *self.files.lock());
        drop(files);
        log::trace!("process {} exited", self.pid);
    }
}
