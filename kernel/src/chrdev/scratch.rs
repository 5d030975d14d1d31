//! A fixed-capacity in-memory buffer for device read/write handlers.

use core::cmp;

use spin::Mutex;

use crate::{
    buf::{UserSliceReader, UserSliceWriter},
    error::KernelResult as Result,
};

struct Contents {
    bytes: Box<[u8]>,
    data_len: usize,
}

/// Bytes a device keeps between a write and a later read.
///
/// Capacity is fixed at creation. `data_len` is the high-water mark of what has been
/// written; reads never see past it. All access goes through one lock, so concurrent
/// handlers on the same buffer are serialized and a caller finding it busy waits.
pub struct ScratchBuffer {
    inner: Mutex<Contents>,
}

impl ScratchBuffer {
    pub fn new(capacity: usize) -> Self {
        ScratchBuffer {
            inner: Mutex::new(Contents {
                bytes: vec![0; capacity].into_boxed_slice(),
                data_len: 0,
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().bytes.len()
    }

    /// Number of valid bytes.
    pub fn data_len(&self) -> usize {
        self.inner.lock().data_len
    }

    /// A copy of the valid bytes.
    pub fn contents(&self) -> Vec<u8> {
        let inner = self.inner.lock();
        inner.bytes[..inner.data_len].to_vec()
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.bytes.fill(0);
        inner.data_len = 0;
    }

    /// Copies `min(writer.len(), data_len - offset)` bytes starting at `offset` out to
    /// the caller.
    ///
    /// Returns `0` once `offset` reaches `data_len`. A bad destination fails with
    /// `EFAULT`.
    pub fn read(&self, writer: &mut UserSliceWriter<'_>, offset: u64) -> Result<usize> {
        let chunk = {
            let inner = self.inner.lock();
            let Ok(offset) = usize::try_from(offset) else {
                return Ok(0);
            };
            if offset >= inner.data_len {
                return Ok(0);
            }
            let n = cmp::min(writer.len(), inner.data_len - offset);
            inner.bytes[offset..offset + n].to_vec()
        };
        writer.write_slice(&chunk)?;
        Ok(chunk.len())
    }

    /// Copies `min(reader.len(), capacity - offset)` bytes from the caller in at `offset`
    /// and grows `data_len` to cover them.
    ///
    /// A full buffer gives a short count, and `0` once `offset` reaches the capacity. A
    /// bad source fails with `EFAULT` and leaves the buffer unchanged.
    pub fn write(&self, reader: &mut UserSliceReader<'_>, offset: u64) -> Result<usize> {
        let capacity = self.capacity();
        let Ok(offset) = usize::try_from(offset) else {
            return Ok(0);
        };
        if offset >= capacity {
            return Ok(0);
        }
        let n = cmp::min(reader.len(), capacity - offset);
        if n == 0 {
            return Ok(0);
        }
        let mut chunk = vec![0; n];
        reader.read_slice(&mut chunk)?;

        let mut inner = self.inner.lock();
        inner.bytes[offset..offset + n].copy_from_slice(&chunk);
        inner.data_len = cmp::max(inner.data_len, offset + n);
        Ok(n)
    }

    /// Stores one message: up to `capacity` bytes from the caller replace the previous
    /// contents, wherever the file position is.
    pub fn write_message(&self, reader: &mut UserSliceReader<'_>) -> Result<usize> {
        let n = cmp::min(reader.len(), self.capacity());
        let mut chunk = vec![0; n];
        reader.read_slice(&mut chunk)?;

        let mut inner = self.inner.lock();
        inner.bytes[..n].copy_from_slice(&chunk);
        inner.data_len = n;
        Ok(n)
    }
}
