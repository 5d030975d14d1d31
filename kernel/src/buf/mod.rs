//! User slices: bounds-checked views of user memory.
//!
//! A driver never dereferences a user address. It gets a [`UserSlice`] for the
//! `(pointer, length)` pair a system call handed over and moves bytes through a
//! [`UserSliceReader`] or [`UserSliceWriter`], each of which advances as it goes.
//!
//! C header: [`include/linux/uaccess.h`](../../../../include/linux/uaccess.h)

use kbind::mm::UserPtr;

use crate::{code::*, error::KernelResult as Result};

/// A pointer to an area in userspace memory, which can be either read-only or
/// read-write.
///
/// Every copy is validated against the caller's address space; a bad address fails with
/// [`EFAULT`] instead of touching anything.
///
/// # Concurrency
///
/// User memory may change between two reads of the same range. Read each byte once,
/// into kernel memory, and validate the copy.
pub struct UserSlice<'a> {
    ptr: UserPtr<'a>,
    length: usize,
}

impl<'a> UserSlice<'a> {
    /// Constructs a user slice from a raw pointer and a length in bytes.
    pub fn new(ptr: UserPtr<'a>, length: usize) -> Self {
        UserSlice { ptr, length }
    }

    /// Reads the entirety of the user slice, appending it to the end of the provided
    /// buffer.
    ///
    /// Fails with [`EFAULT`] if the read happens on a bad address.
    pub fn read_all(self, buf: &mut Vec<u8>) -> Result {
        self.reader().read_all(buf)
    }

    /// Constructs a [`UserSliceReader`].
    pub fn reader(self) -> UserSliceReader<'a> {
        UserSliceReader {
            ptr: self.ptr,
            length: self.length,
        }
    }

    /// Constructs a [`UserSliceWriter`].
    pub fn writer(self) -> UserSliceWriter<'a> {
        UserSliceWriter {
            ptr: self.ptr,
            length: self.length,
        }
    }

    /// Constructs both a [`UserSliceReader`] and a [`UserSliceWriter`] over the same range.
    pub fn reader_writer(self) -> (UserSliceReader<'a>, UserSliceWriter<'a>) {
        (
            UserSliceReader {
                ptr: self.ptr,
                length: self.length,
            },
            UserSliceWriter {
                ptr: self.ptr,
                length: self.length,
            },
        )
    }
}

/// A reader for [`UserSlice`].
///
/// Used to incrementally read from the user slice.
pub struct UserSliceReader<'a> {
    ptr: UserPtr<'a>,
    length: usize,
}

impl<'a> UserSliceReader<'a> {
    /// Skip the provided number of bytes.
    ///
    /// Returns an error if skipping more than the length of the buffer.
    pub fn skip(&mut self, num_skip: usize) -> Result {
        // Update `self.length` first since that's the fallible part of this operation.
        self.length = self.length.checked_sub(num_skip).ok_or(EFAULT)?;
        self.ptr = self.ptr.wrapping_add(num_skip);
        Ok(())
    }

    /// Create a reader that can access the same range of data.
    ///
    /// Reading from the clone does not advance the current reader.
    pub fn clone_reader(&self) -> UserSliceReader<'a> {
        UserSliceReader {
            ptr: self.ptr,
            length: self.length,
        }
    }

    /// Returns the number of bytes left to be read from this reader.
    ///
    /// Note that even reading less than this number of bytes may fail.
    pub fn len(&self) -> usize {
        self.length
    }

    /// Returns `true` if no data is available in the io buffer.
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Reads raw data from the user slice into a kernel buffer.
    ///
    /// Fails with [`EFAULT`] if the read happens on a bad address, or if the read goes out of
    /// bounds of this [`UserSliceReader`]. This call may modify `out` even if it returns an error.
    pub fn read_slice(&mut self, out: &mut [u8]) -> Result {
        let len = out.len();
        if len > self.length {
            return Err(EFAULT);
        }
        if self.ptr.mm().copy_from_user(out, self.ptr.addr()) != 0 {
            return Err(EFAULT);
        }
        self.ptr = self.ptr.wrapping_add(len);
        self.length -= len;
        Ok(())
    }

    /// Reads the entirety of the user slice, appending it to the end of the provided buffer.
    ///
    /// Fails with [`EFAULT`] if the read happens on a bad address.
    pub fn read_all(mut self, buf: &mut Vec<u8>) -> Result {
        let len = self.length;
        buf.try_reserve(len).map_err(|_| ENOMEM)?;
        let start = buf.len();
        buf.resize(start + len, 0);
        let res = self.read_slice(&mut buf[start..]);
        if res.is_err() {
            buf.truncate(start);
        }
        res
    }
}

/// A writer for [`UserSlice`].
///
/// Used to incrementally write into the user slice.
pub struct UserSliceWriter<'a> {
    ptr: UserPtr<'a>,
    length: usize,
}

impl<'a> UserSliceWriter<'a> {
    /// Returns the amount of space remaining in this buffer.
    ///
    /// Note that even writing less than this number of bytes may fail.
    pub fn len(&self) -> usize {
        self.length
    }

    /// Returns `true` if no more data can be written to this buffer.
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Writes raw data to this user pointer from a kernel buffer.
    ///
    /// Fails with [`EFAULT`] if the write happens on a bad address, or if the write goes out of
    /// bounds of this [`UserSliceWriter`]. This call may modify the associated userspace slice even
    /// if it returns an error.
    pub fn write_slice(&mut self, data: &[u8]) -> Result {
        let len = data.len();
        if len > self.length {
            return Err(EFAULT);
        }
        if self.ptr.mm().copy_to_user(self.ptr.addr(), data) != 0 {
            return Err(EFAULT);
        }
        self.ptr = self.ptr.wrapping_add(len);
        self.length -= len;
        Ok(())
    }
}
