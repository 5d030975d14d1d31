// SPDX-License-Identifier: GPL-2.0

//! Device number regions.
//!
//! C header: [`include/linux/fs.h`](../../../../include/linux/fs.h)

use std::sync::Arc;

use kbind::{
    bindings::{self, dev_t, MAJOR, MINOR, MKDEV},
    Kernel,
};

use crate::{
    code::*,
    error::{to_result, KernelResult as Result},
    retry::RetryPolicy,
    ThisModule,
};

/// A reserved range of character device numbers: one major and `count` minors starting
/// at a base minor.
///
/// The range is held until [`Region::release`] is called or the value is dropped.
/// Releasing twice is refused instead of being passed on to the registry.
pub struct Region {
    kernel: Arc<Kernel>,
    dev: dev_t,
    count: u32,
    name: String,
    held: bool,
}

impl Region {
    /// Reserves `count` minors starting at `base_minor`.
    ///
    /// With `major` set, exactly that major is requested (static allocation); otherwise
    /// the registry picks a free one. Fails with `EBUSY` if any number in the range is
    /// already held.
    pub fn acquire(
        module: &ThisModule,
        major: Option<u32>,
        base_minor: u32,
        count: u32,
        name: &str,
    ) -> Result<Region> {
        let kernel = Arc::clone(module.kernel());
        let dev = match major {
            Some(major) => {
                let dev = MKDEV(major, base_minor);
                to_result(kernel.register_chrdev_region(dev, count, name))?;
                dev
            }
            None => {
                let mut dev: dev_t = 0;
                to_result(kernel.alloc_chrdev_region(&mut dev, base_minor, count, name))?;
                dev
            }
        };
        Ok(Region {
            kernel,
            dev,
            count,
            name: name.into(),
            held: true,
        })
    }

    /// Reserves a range under a major picked by the registry.
    pub fn alloc(module: &ThisModule, base_minor: u32, count: u32, name: &str) -> Result<Region> {
        Self::acquire(module, None, base_minor, count, name)
    }

    /// Reserves a range under `major`.
    pub fn register(
        module: &ThisModule,
        major: u32,
        base_minor: u32,
        count: u32,
        name: &str,
    ) -> Result<Region> {
        Self::acquire(module, Some(major), base_minor, count, name)
    }

    /// Like [`Region::acquire`], retrying while the range is busy as `policy` allows.
    pub fn acquire_with_retry(
        module: &ThisModule,
        major: Option<u32>,
        base_minor: u32,
        count: u32,
        name: &str,
        policy: &RetryPolicy,
    ) -> Result<Region> {
        policy.run(name, |_| Self::acquire(module, major, base_minor, count, name))
    }

    /// Returns the range to the registry.
    ///
    /// Fails with `EINVAL` if the range was already released; the registry is not touched
    /// in that case.
    pub fn release(&mut self) -> Result {
        if !self.held {
            log::warn!(
                "chrdev region {}:{} (+{}) of \"{}\" released twice",
                self.major(),
                self.base_minor(),
                self.count,
                self.name
            );
            return Err(EINVAL);
        }
        self.held = false;
        self.kernel.unregister_chrdev_region(self.dev, self.count);
        Ok(())
    }

    /// The first device number of the range.
    pub fn dev(&self) -> dev_t {
        self.dev
    }

    pub fn major(&self) -> u32 {
        MAJOR(self.dev)
    }

    pub fn base_minor(&self) -> u32 {
        MINOR(self.dev)
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_held(&self) -> bool {
        self.held
    }

    /// Returns `true` if `dev` falls inside the range.
    pub fn contains(&self, dev: dev_t) -> bool {
        let start = u64::from(self.dev);
        (start..start + u64::from(self.count)).contains(&u64::from(dev))
    }

    /// The device number `index` places into the range, if it is inside.
    pub fn dev_at(&self, index: u32) -> Option<dev_t> {
        if index >= self.count {
            return None;
        }
        self.dev.checked_add(index)
    }

    pub(crate) fn kernel(&self) -> &Arc<Kernel> {
        &self.kernel
    }
}

impl core::fmt::Debug for Region {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Region")
            .field("major", &self.major())
            .field("base_minor", &self.base_minor())
            .field("count", &self.count)
            .field("name", &self.name)
            .field("held", &self.held)
            .finish()
    }
}

impl Drop for Region {
    fn drop(&mut self) {
        if self.held {
            let _ = self.release();
        }
    }
}

/// The largest minor a single major can hold.
pub const MINOR_MAX: u32 = bindings::MINORMASK;
