// SPDX-License-Identifier: GPL-2.0

//! File operations.
//!
//! C header: [`include/linux/fs.h`](../../../../include/linux/fs.h)

use core::{ffi::c_int, marker::PhantomData, sync::atomic::Ordering};
use std::sync::Arc;

use kbind::{bindings, mm::UserPtr};

use crate::{
    buf::{UserSlice, UserSliceReader, UserSliceWriter},
    chrdev::DeviceState,
    code::*,
    error::{from_result, KernelResult as Result},
};

bitflags::bitflags! {
    /// Flags a file was opened with.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct OpenFlags: u32 {
        /// Open for writing only.
        const O_WRONLY = bindings::O_WRONLY;
        /// Open for reading and writing.
        const O_RDWR = bindings::O_RDWR;
        /// Writes go to the end of the file.
        const O_APPEND = bindings::O_APPEND;
        /// Operations should not block.
        const O_NONBLOCK = bindings::O_NONBLOCK;
    }
}

/// Wraps the kernel's `struct file`.
pub struct File<'a> {
    raw: &'a bindings::file,
}

impl<'a> File<'a> {
    pub(crate) fn from_raw(raw: &'a bindings::file) -> Self {
        File { raw }
    }

    /// Returns the flags associated with the file.
    pub fn flags(&self) -> OpenFlags {
        OpenFlags::from_bits_truncate(self.raw.f_flags)
    }

    /// Returns `true` if the file was opened for reading.
    pub fn is_readable(&self) -> bool {
        self.raw.f_flags & bindings::O_ACCMODE != bindings::O_WRONLY
    }

    /// Returns `true` if the file was opened for writing.
    pub fn is_writable(&self) -> bool {
        self.raw.f_flags & bindings::O_ACCMODE != bindings::O_RDONLY
    }
}

/// Corresponds to the kernel's `struct file_operations`.
///
/// You implement this trait whenever you would create a `struct file_operations`. Every
/// handler receives what it needs explicitly: `open` gets the context of the device being
/// opened, the others get the per-open [`FileOperations::Data`] that `open` returned.
///
/// `read` and `write` are optional; set [`FileOperations::HAS_READ`] or
/// [`FileOperations::HAS_WRITE`] when overriding them, otherwise the installed slot fails
/// with `EINVAL` without reaching the device.
pub trait FileOperations: Sized + 'static {
    /// Per-device context, fixed when the device is registered.
    type OpenData: Send + Sync + 'static;

    /// Per-open state, created by [`FileOperations::open`] and kept for the life of the
    /// open file.
    type Data: Send + Sync + 'static;

    /// Whether `read` is overridden.
    const HAS_READ: bool = false;

    /// Whether `write` is overridden.
    const HAS_WRITE: bool = false;

    /// Creates a new instance of this file.
    ///
    /// Corresponds to the `open` function pointer in `struct file_operations`.
    fn open(context: &Self::OpenData, file: &File<'_>) -> Result<Self::Data>;

    /// Cleans up after the last reference to the file goes away.
    ///
    /// Corresponds to the `release` function pointer in `struct file_operations`.
    fn release(_data: Self::Data, _file: &File<'_>) {}

    /// Reads data from this file to the caller's buffer.
    ///
    /// Corresponds to the `read` function pointer in `struct file_operations`.
    fn read(
        _data: &Self::Data,
        _file: &File<'_>,
        _writer: &mut UserSliceWriter<'_>,
        _offset: u64,
    ) -> Result<usize> {
        Err(EINVAL)
    }

    /// Writes data from the caller's buffer to this file.
    ///
    /// Corresponds to the `write` function pointer in `struct file_operations`.
    fn write(
        _data: &Self::Data,
        _file: &File<'_>,
        _reader: &mut UserSliceReader<'_>,
        _offset: u64,
    ) -> Result<usize> {
        Err(EINVAL)
    }
}

/// What `file.private_data` holds for an open file.
struct OpenState<T: FileOperations> {
    device: Arc<DeviceState<T>>,
    data: T::Data,
}

fn device_state<T: FileOperations>(inode: &bindings::inode) -> Result<Arc<DeviceState<T>>> {
    Arc::clone(&inode.i_cdev.private)
        .downcast::<DeviceState<T>>()
        .map_err(|_| EINVAL)
}

fn open_state<'a, T: FileOperations>(file: &'a bindings::file) -> Result<&'a OpenState<T>> {
    file.private_data
        .as_ref()
        .and_then(|data| data.downcast_ref::<OpenState<T>>())
        .ok_or(EINVAL)
}

fn advance(pos: &mut bindings::loff_t, count: usize) -> Result<bindings::ssize_t> {
    *pos = pos
        .checked_add(bindings::loff_t::try_from(count)?)
        .ok_or(EINVAL)?;
    Ok(bindings::ssize_t::try_from(count)?)
}

/// The `struct file_operations` a [`FileOperations`] implementation is installed with.
pub struct OperationsVtable<T>(PhantomData<T>);

impl<T: FileOperations> OperationsVtable<T> {
    /// Called by the VFS when an inode is opened.
    ///
    /// Looks up the device behind the inode, hands its context to [`FileOperations::open`]
    /// and stores the returned data in `private_data`. A device that is being removed
    /// refuses new opens with `ENODEV`.
    fn open_callback(inode: &bindings::inode, file: &mut bindings::file) -> c_int {
        from_result(|| {
            let device = device_state::<T>(inode)?;
            let data = device
                .context
                .try_access_with(|ctx| -> Result<T::Data> {
                    let data = T::open(ctx, &File::from_raw(file))?;
                    device.open_count.fetch_add(1, Ordering::AcqRel);
                    Ok(data)
                })
                .ok_or(ENODEV)??;
            file.private_data = Some(Box::new(OpenState::<T> { device, data }));
            Ok(0)
        })
    }

    fn release_callback(_inode: &bindings::inode, file: &mut bindings::file) -> c_int {
        let Some(state) = file.private_data.take() else {
            return 0;
        };
        if let Ok(state) = state.downcast::<OpenState<T>>() {
            let OpenState { device, data } = *state;
            device.open_count.fetch_sub(1, Ordering::AcqRel);
            T::release(data, &File::from_raw(file));
        }
        0
    }

    fn read_callback(
        file: &bindings::file,
        buf: UserPtr<'_>,
        len: usize,
        pos: &mut bindings::loff_t,
    ) -> bindings::ssize_t {
        from_result(|| {
            let state = open_state::<T>(file)?;
            let offset = u64::try_from(*pos)?;
            let mut writer = UserSlice::new(buf, len).writer();
            let read = state
                .device
                .context
                .try_access_with(|_| {
                    T::read(&state.data, &File::from_raw(file), &mut writer, offset)
                })
                .ok_or(ENODEV)??;
            advance(pos, read)
        })
    }

    fn write_callback(
        file: &bindings::file,
        buf: UserPtr<'_>,
        len: usize,
        pos: &mut bindings::loff_t,
    ) -> bindings::ssize_t {
        from_result(|| {
            let state = open_state::<T>(file)?;
            let offset = u64::try_from(*pos)?;
            let mut reader = UserSlice::new(buf, len).reader();
            let written = state
                .device
                .context
                .try_access_with(|_| {
                    T::write(&state.data, &File::from_raw(file), &mut reader, offset)
                })
                .ok_or(ENODEV)??;
            advance(pos, written)
        })
    }

    fn unsupported(
        _file: &bindings::file,
        _buf: UserPtr<'_>,
        _len: usize,
        _pos: &mut bindings::loff_t,
    ) -> bindings::ssize_t {
        -(bindings::EINVAL as bindings::ssize_t)
    }

    const VTABLE: bindings::file_operations = bindings::file_operations {
        open: Some(Self::open_callback),
        release: Some(Self::release_callback),
        read: if T::HAS_READ {
            Some(Self::read_callback)
        } else {
            Some(Self::unsupported)
        },
        write: if T::HAS_WRITE {
            Some(Self::write_callback)
        } else {
            Some(Self::unsupported)
        },
    };

    /// Builds an instance of [`struct file_operations`].
    ///
    /// All four slots are populated; the table is a constant and cannot change once a
    /// cdev points at it.
    pub const fn build() -> &'static bindings::file_operations {
        &Self::VTABLE
    }
}
