//! Kernel types, constants and structures shared with driver code.
//!
//! Names follow the C side (`dev_t`, `file_operations`, `MKDEV`, ...) so that the
//! abstractions in the `kernel` crate read like their counterparts in a real tree.
#![allow(non_camel_case_types, non_upper_case_globals, non_snake_case)]

use core::ffi::{c_int, c_uint};
use std::{any::Any, collections::BTreeMap, sync::Arc};

use spin::Mutex;

use crate::mm::UserPtr;

pub type dev_t = u32;
pub type loff_t = i64;
pub type ssize_t = isize;

pub const MINORBITS: u32 = 20;
pub const MINORMASK: u32 = (1 << MINORBITS) - 1;

/// Majors at or above this value cannot be registered.
pub const CHRDEV_MAJOR_MAX: u32 = 512;
/// Size of the classic major table; dynamic allocation starts just below it.
pub const CHRDEV_MAJOR_HASH_SIZE: u32 = 255;
pub const CHRDEV_MAJOR_DYN_END: u32 = 234;
pub const CHRDEV_MAJOR_DYN_EXT_START: u32 = 511;
pub const CHRDEV_MAJOR_DYN_EXT_END: u32 = 384;

/// Builds a device number from a major and a minor number.
pub const fn MKDEV(ma: u32, mi: u32) -> dev_t {
    (ma << MINORBITS) | mi
}

/// Extracts the major number of a device number.
pub const fn MAJOR(dev: dev_t) -> u32 {
    dev >> MINORBITS
}

/// Extracts the minor number of a device number.
pub const fn MINOR(dev: dev_t) -> u32 {
    dev & MINORMASK
}

pub const EPERM: u32 = 1;
pub const ENOENT: u32 = 2;
pub const EINTR: u32 = 4;
pub const EIO: u32 = 5;
pub const ENXIO: u32 = 6;
pub const EBADF: u32 = 9;
pub const EAGAIN: u32 = 11;
pub const ENOMEM: u32 = 12;
pub const EACCES: u32 = 13;
pub const EFAULT: u32 = 14;
pub const EBUSY: u32 = 16;
pub const EEXIST: u32 = 17;
pub const ENODEV: u32 = 19;
pub const EINVAL: u32 = 22;
pub const EMFILE: u32 = 24;
pub const ENOSPC: u32 = 28;
pub const ESPIPE: u32 = 29;
pub const ERANGE: u32 = 34;
pub const ENOTEMPTY: u32 = 39;
pub const ERESTARTSYS: u32 = 512;
pub const MAX_ERRNO: u32 = 4095;

/// Returns the symbolic name of a positive errno value.
pub fn errname(err: c_int) -> Option<&'static str> {
    let name = match u32::try_from(err).ok()? {
        EPERM => "EPERM",
        ENOENT => "ENOENT",
        EINTR => "EINTR",
        EIO => "EIO",
        ENXIO => "ENXIO",
        EBADF => "EBADF",
        EAGAIN => "EAGAIN",
        ENOMEM => "ENOMEM",
        EACCES => "EACCES",
        EFAULT => "EFAULT",
        EBUSY => "EBUSY",
        EEXIST => "EEXIST",
        ENODEV => "ENODEV",
        EINVAL => "EINVAL",
        EMFILE => "EMFILE",
        ENOSPC => "ENOSPC",
        ESPIPE => "ESPIPE",
        ERANGE => "ERANGE",
        ENOTEMPTY => "ENOTEMPTY",
        ERESTARTSYS => "ERESTARTSYS",
        _ => return None,
    };
    Some(name)
}

pub const O_ACCMODE: c_uint = 0o3;
pub const O_RDONLY: c_uint = 0o0;
pub const O_WRONLY: c_uint = 0o1;
pub const O_RDWR: c_uint = 0o2;
pub const O_APPEND: c_uint = 0o2000;
pub const O_NONBLOCK: c_uint = 0o4000;

pub const SEEK_SET: c_int = 0;
pub const SEEK_CUR: c_int = 1;
pub const SEEK_END: c_int = 2;

/// Upper bound on open descriptors per process.
pub const NR_OPEN_DEFAULT: usize = 1024;

pub type open_fn = fn(&inode, &mut file) -> c_int;
pub type release_fn = fn(&inode, &mut file) -> c_int;
pub type read_fn = fn(&file, UserPtr<'_>, usize, &mut loff_t) -> ssize_t;
pub type write_fn = fn(&file, UserPtr<'_>, usize, &mut loff_t) -> ssize_t;

/// Operation slots the VFS dispatches to for an open character device.
///
/// A `None` slot behaves like a `NULL` pointer in C: `open`/`release` are skipped and
/// `read`/`write` fail with `EINVAL`.
pub struct file_operations {
    pub open: Option<open_fn>,
    pub release: Option<release_fn>,
    pub read: Option<read_fn>,
    pub write: Option<write_fn>,
}

/// A character device as known to the cdev map.
///
/// `private` carries whatever the registering code needs to find its own state again
/// from an inode (the C side uses `container_of` on the embedded `struct cdev`).
pub struct cdev {
    pub owner: String,
    pub ops: &'static file_operations,
    pub dev: dev_t,
    pub count: c_uint,
    pub private: Arc<dyn Any + Send + Sync>,
}

pub struct inode {
    pub i_rdev: dev_t,
    pub i_cdev: Arc<cdev>,
}

pub struct file {
    pub f_flags: c_uint,
    pub private_data: Option<Box<dyn Any + Send + Sync>>,
}

/// A device class: a named group of device nodes.
pub struct class {
    pub name: String,
    pub(crate) devices: Mutex<BTreeMap<dev_t, String>>,
}
