//! User address spaces and the `copy_{to,from}_user` primitives.
//!
//! A process address space is a set of mappings with per-mapping protection. User
//! pointers handed to drivers are plain addresses into one of these spaces; any access
//! the mapping does not allow faults, exactly like touching an unmapped or read-only
//! page would.

use core::cmp;
use std::collections::BTreeMap;

use spin::Mutex;

use crate::error::{linux_err::*, KernelResult};

pub const PAGE_SIZE: usize = 4096;

/// First address handed out by [`MmStruct::mmap`].
const MMAP_BASE: usize = 0x1000_0000;

bitflags::bitflags! {
    /// Access rights of a mapping.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct VmFlags: u32 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        const RW = Self::READ.bits() | Self::WRITE.bits();
    }
}

struct Vma {
    data: Vec<u8>,
    prot: VmFlags,
}

struct MmInner {
    vmas: BTreeMap<usize, Vma>,
    next_addr: usize,
}

/// One process address space.
pub struct MmStruct {
    inner: Mutex<MmInner>,
}

impl Default for MmStruct {
    fn default() -> Self {
        Self::new()
    }
}

impl MmStruct {
    pub fn new() -> Self {
        MmStruct {
            inner: Mutex::new(MmInner {
                vmas: BTreeMap::new(),
                next_addr: MMAP_BASE,
            }),
        }
    }

    /// Maps `len` zeroed bytes with protection `prot` and returns the start address.
    ///
    /// Mappings are page-rounded and separated by an unmapped guard page, so running
    /// off the end of one always faults.
    pub fn mmap(&self, len: usize, prot: VmFlags) -> KernelResult<usize> {
        if len == 0 {
            return Err(EINVAL);
        }
        let rounded = len.checked_next_multiple_of(PAGE_SIZE).ok_or(ENOMEM)?;
        let mut inner = self.inner.lock();
        let start = inner.next_addr;
        inner.next_addr = start
            .checked_add(rounded)
            .and_then(|a| a.checked_add(PAGE_SIZE))
            .ok_or(ENOMEM)?;
        inner.vmas.insert(
            start,
            Vma {
                data: vec![0; rounded],
                prot,
            },
        );
        Ok(start)
    }

    /// Removes the mapping starting at `addr`.
    pub fn munmap(&self, addr: usize) -> KernelResult {
        self.inner
            .lock()
            .vmas
            .remove(&addr)
            .map(|_| ())
            .ok_or(EINVAL)
    }

    /// Changes the protection of the mapping starting at `addr`.
    pub fn mprotect(&self, addr: usize, prot: VmFlags) -> KernelResult {
        let mut inner = self.inner.lock();
        let vma = inner.vmas.get_mut(&addr).ok_or(ENOMEM)?;
        vma.prot = prot;
        Ok(())
    }

    /// A user-mode store: writes `bytes` at `addr` or fails with `EFAULT`.
    pub fn store(&self, addr: usize, bytes: &[u8]) -> KernelResult {
        match self.copy_to_user(addr, bytes) {
            0 => Ok(()),
            _ => Err(EFAULT),
        }
    }

    /// A user-mode load: reads `len` bytes at `addr` or fails with `EFAULT`.
    pub fn load(&self, addr: usize, len: usize) -> KernelResult<Vec<u8>> {
        let mut out = vec![0; len];
        match self.copy_from_user(&mut out, addr) {
            0 => Ok(out),
            _ => Err(EFAULT),
        }
    }

    /// Copies `from` into user memory at `to`.
    ///
    /// Returns the number of bytes that could *not* be copied; bytes before the first
    /// faulting address have been written.
    pub fn copy_to_user(&self, to: usize, from: &[u8]) -> usize {
        self.transfer(to, from.len(), VmFlags::WRITE, |dst, at| {
            dst.copy_from_slice(&from[at..at + dst.len()]);
        })
    }

    /// Copies user memory at `from` into `to`.
    ///
    /// Returns the number of bytes that could *not* be copied.
    pub fn copy_from_user(&self, to: &mut [u8], from: usize) -> usize {
        let len = to.len();
        self.transfer(from, len, VmFlags::READ, |src, at| {
            to[at..at + src.len()].copy_from_slice(src);
        })
    }

    fn transfer(
        &self,
        addr: usize,
        len: usize,
        need: VmFlags,
        mut f: impl FnMut(&mut [u8], usize),
    ) -> usize {
        let mut inner = self.inner.lock();
        let mut done = 0;
        while done < len {
            let Some(cur) = addr.checked_add(done) else {
                break;
            };
            let Some((&start, vma)) = inner.vmas.range_mut(..=cur).next_back() else {
                break;
            };
            let off = cur - start;
            if off >= vma.data.len() || !vma.prot.contains(need) {
                break;
            }
            let chunk = cmp::min(len - done, vma.data.len() - off);
            f(&mut vma.data[off..off + chunk], done);
            done += chunk;
        }
        len - done
    }
}

/// A `__user` pointer: an address in a specific process address space.
#[derive(Clone, Copy)]
pub struct UserPtr<'a> {
    mm: &'a MmStruct,
    addr: usize,
}

impl<'a> UserPtr<'a> {
    pub fn new(mm: &'a MmStruct, addr: usize) -> Self {
        UserPtr { mm, addr }
    }

    pub fn addr(&self) -> usize {
        self.addr
    }

    pub fn mm(&self) -> &'a MmStruct {
        self.mm
    }

    /// Returns the pointer `count` bytes further on.
    ///
    /// Since this is not a pointer to a valid object in our program, we cannot use `add`,
    /// which has C-style rules for defined behavior.
    pub fn wrapping_add(self, count: usize) -> Self {
        UserPtr {
            mm: self.mm,
            addr: self.addr.wrapping_add(count),
        }
    }
}
