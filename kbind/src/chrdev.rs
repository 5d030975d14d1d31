//! Character device number registry and the cdev map.
//!
//! C source: `fs/char_dev.c`.

use core::ffi::c_int;
use std::{collections::BTreeMap, sync::Arc};

use crate::{
    bindings::{
        cdev, dev_t, CHRDEV_MAJOR_DYN_END, CHRDEV_MAJOR_DYN_EXT_END, CHRDEV_MAJOR_DYN_EXT_START,
        CHRDEV_MAJOR_HASH_SIZE, CHRDEV_MAJOR_MAX, EBUSY, EINVAL, MAJOR, MINOR, MINORBITS,
        MINORMASK,
    },
    Kernel,
};

struct CharDeviceStruct {
    minorct: u32,
    name: String,
}

/// Registered `(major, baseminor)` → region.
#[derive(Default)]
pub(crate) struct ChrdevTable {
    regions: BTreeMap<(u32, u32), CharDeviceStruct>,
}

impl ChrdevTable {
    fn major_in_use(&self, major: u32) -> bool {
        self.regions
            .range((major, 0)..=(major, u32::MAX))
            .next()
            .is_some()
    }

    fn find_dynamic_major(&self) -> Result<u32, c_int> {
        if let Some(major) = (CHRDEV_MAJOR_DYN_END..CHRDEV_MAJOR_HASH_SIZE)
            .rev()
            .find(|&m| !self.major_in_use(m))
        {
            return Ok(major);
        }
        (CHRDEV_MAJOR_DYN_EXT_END..=CHRDEV_MAJOR_DYN_EXT_START)
            .rev()
            .find(|&m| !self.major_in_use(m))
            .ok_or(-(EBUSY as c_int))
    }

    /// Reserves `minorct` minors of `major` starting at `baseminor`. A zero major
    /// picks a free one. Returns the major actually used.
    fn register(
        &mut self,
        major: u32,
        baseminor: u32,
        minorct: u32,
        name: &str,
    ) -> Result<u32, c_int> {
        if major >= CHRDEV_MAJOR_MAX {
            log::error!(
                "CHRDEV \"{}\" major requested ({}) is greater than the maximum ({})",
                name,
                major,
                CHRDEV_MAJOR_MAX - 1
            );
            return Err(-(EINVAL as c_int));
        }
        if baseminor > MINORMASK || minorct == 0 || minorct > MINORMASK + 1 - baseminor {
            log::error!(
                "CHRDEV \"{}\" minor range requested ({}-{}) is out of range of maximum range (0-{}) for a single major",
                name,
                baseminor,
                u64::from(baseminor) + u64::from(minorct).saturating_sub(1),
                MINORMASK
            );
            return Err(-(EINVAL as c_int));
        }

        let major = if major == 0 {
            self.find_dynamic_major()?
        } else {
            major
        };

        let end = baseminor + (minorct - 1);
        let overlaps = self
            .regions
            .range((major, 0)..=(major, end))
            .any(|(&(_, base), cd)| base + (cd.minorct - 1) >= baseminor);
        if overlaps {
            return Err(-(EBUSY as c_int));
        }

        self.regions.insert(
            (major, baseminor),
            CharDeviceStruct {
                minorct,
                name: name.into(),
            },
        );
        Ok(major)
    }

    fn unregister(&mut self, major: u32, baseminor: u32, minorct: u32) -> bool {
        match self.regions.get(&(major, baseminor)) {
            Some(cd) if cd.minorct == minorct => {
                self.regions.remove(&(major, baseminor));
                true
            }
            _ => false,
        }
    }
}

/// Splits `[from, from + count)` at major boundaries, as `register_chrdev_region` does.
fn major_chunks(from: dev_t, count: u32) -> impl Iterator<Item = (u32, u32, u32)> {
    let to = u64::from(from) + u64::from(count);
    let mut n = u64::from(from);
    core::iter::from_fn(move || {
        if n >= to {
            return None;
        }
        let next = core::cmp::min(((n >> MINORBITS) + 1) << MINORBITS, to);
        let chunk = ((n >> MINORBITS) as u32, (n as u32) & MINORMASK, (next - n) as u32);
        n = next;
        Some(chunk)
    })
}

impl Kernel {
    /// Registers a range of device numbers.
    ///
    /// `from` is the first number in the desired range; it must include the major.
    /// Returns zero or a negative errno (`-EBUSY` when any part is already held).
    pub fn register_chrdev_region(&self, from: dev_t, count: u32, name: &str) -> c_int {
        if count == 0 || u64::from(from) + u64::from(count) > u64::from(u32::MAX) + 1 {
            return -(EINVAL as c_int);
        }
        let mut table = self.chrdevs.lock();
        let mut done = Vec::new();
        for (major, baseminor, minorct) in major_chunks(from, count) {
            // A zero major would be a dynamic request; static ranges must name one.
            let res = if major == 0 {
                Err(-(EINVAL as c_int))
            } else {
                table.register(major, baseminor, minorct, name)
            };
            if let Err(e) = res {
                for (major, baseminor, minorct) in done {
                    table.unregister(major, baseminor, minorct);
                }
                return e;
            }
            done.push((major, baseminor, minorct));
        }
        log::debug!(
            "chrdev region {}:{} (+{}) registered for \"{}\"",
            MAJOR(from),
            MINOR(from),
            count,
            name
        );
        0
    }

    /// Registers a range of char device numbers under a dynamically chosen major.
    ///
    /// On success the first number of the range is stored in `dev`.
    pub fn alloc_chrdev_region(
        &self,
        dev: &mut dev_t,
        baseminor: u32,
        count: u32,
        name: &str,
    ) -> c_int {
        let res = self.chrdevs.lock().register(0, baseminor, count, name);
        match res {
            Ok(major) => {
                *dev = crate::bindings::MKDEV(major, baseminor);
                log::debug!(
                    "chrdev region {}:{} (+{}) allocated for \"{}\"",
                    major,
                    baseminor,
                    count,
                    name
                );
                0
            }
            Err(e) => e,
        }
    }

    /// Returns a range of device numbers to the registry.
    ///
    /// The range must match one earlier registration exactly. Unknown ranges are
    /// reported and otherwise ignored.
    pub fn unregister_chrdev_region(&self, from: dev_t, count: u32) {
        let mut table = self.chrdevs.lock();
        for (major, baseminor, minorct) in major_chunks(from, count) {
            if !table.unregister(major, baseminor, minorct) {
                log::warn!(
                    "trying to free nonexistent chrdev region {}:{} (+{})",
                    major,
                    baseminor,
                    minorct
                );
            }
        }
    }

    /// Lists `(major, name)` pairs of registered regions, as `/proc/devices` does.
    pub fn proc_devices(&self) -> Vec<(u32, String)> {
        let table = self.chrdevs.lock();
        let mut out: Vec<(u32, String)> = table
            .regions
            .iter()
            .map(|(&(major, _), cd)| (major, cd.name.clone()))
            .collect();
        out.dedup();
        out
    }

    /// Makes a character device live: numbers `[p.dev, p.dev + p.count)` now resolve to `p`.
    pub fn cdev_add(&self, p: Arc<cdev>) -> c_int {
        if p.count == 0 || u64::from(p.dev) + u64::from(p.count) > u64::from(u32::MAX) + 1 {
            return -(EINVAL as c_int);
        }
        let start = u64::from(p.dev);
        let end = start + u64::from(p.count);
        let mut map = self.cdev_map.lock();
        let overlaps = map.values().any(|c| {
            let s = u64::from(c.dev);
            s < end && start < s + u64::from(c.count)
        });
        if overlaps {
            return -(EBUSY as c_int);
        }
        log::debug!(
            "cdev {}:{} (+{}) added by {}",
            MAJOR(p.dev),
            MINOR(p.dev),
            p.count,
            p.owner
        );
        map.insert(p.dev, p);
        0
    }

    /// Removes a character device from the system. Files already open keep their
    /// reference; new lookups fail.
    pub fn cdev_del(&self, p: &cdev) {
        let mut map = self.cdev_map.lock();
        if map.get(&p.dev).is_some_and(|c| core::ptr::eq(&**c, p)) {
            map.remove(&p.dev);
        }
    }

    /// Finds the character device serving `dev`.
    pub fn cdev_lookup(&self, dev: dev_t) -> Option<Arc<cdev>> {
        let map = self.cdev_map.lock();
        map.range(..=dev)
            .next_back()
            .filter(|(&start, c)| u64::from(dev) < u64::from(start) + u64::from(c.count))
            .map(|(_, c)| Arc::clone(c))
    }
}
