//! Kernel services that character device modules bind to.
//!
//! Everything a driver module calls into but does not implement lives here: the
//! device-number registry, the cdev map, the class/device registry with its devtmpfs
//! view, per-process user address spaces, a small VFS that routes system calls to
//! installed `file_operations`, the module table and `printk`. The state of one running
//! kernel is a [`Kernel`] value, so independent kernels can coexist in one process.

pub mod bindings;
pub mod chrdev;
pub mod class;
pub mod error;
mod kernel;
pub mod mm;
pub mod module;
pub mod printk;
pub mod vfs;

pub use kernel::Kernel;
