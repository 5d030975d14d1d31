//! Kernel errors.
//!
//! C header: `include/uapi/asm-generic/errno-base.h`

pub use kbind::error::{from_result, linux_err, to_result, Error, KernelResult};

/// Converts a C-style `ssize_t` return (a count or a negative errno) into a
/// [`KernelResult`].
pub fn to_count(ret: kbind::bindings::ssize_t) -> KernelResult<usize> {
    if ret < 0 {
        let errno = core::ffi::c_int::try_from(ret)?;
        Err(Error::from_errno(errno))
    } else {
        Ok(usize::try_from(ret)?)
    }
}
