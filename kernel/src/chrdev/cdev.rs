// SPDX-License-Identifier: GPL-2.0

//! Character device registration.
//!
//! C header: [`include/linux/cdev.h`](../../../../include/linux/cdev.h)

use core::sync::atomic::{AtomicUsize, Ordering};
use std::{any::Any, sync::Arc};

use kbind::{
    bindings::{self, dev_t, MAJOR, MINOR},
    Kernel,
};

use super::Region;
use crate::{
    code::*,
    error::{to_result, KernelResult as Result},
    fs::file_operations::{FileOperations, OperationsVtable},
    revocable::Revocable,
    ThisModule,
};

/// State shared by a registered device and every file open on it.
pub(crate) struct DeviceState<T: FileOperations> {
    pub(crate) open_count: AtomicUsize,
    pub(crate) context: Revocable<T::OpenData>,
}

/// The parts of [`DeviceState`] that do not depend on the operations type.
trait DeviceControl: Send + Sync {
    fn open_count(&self) -> usize;
    fn is_live(&self) -> bool;
    fn revoke(&self) -> bool;
}

impl<T: FileOperations> DeviceControl for DeviceState<T> {
    fn open_count(&self) -> usize {
        self.open_count.load(Ordering::Acquire)
    }

    fn is_live(&self) -> bool {
        self.context.is_available()
    }

    fn revoke(&self) -> bool {
        self.context.revoke()
    }
}

/// A live character device: one device number routed to a [`FileOperations`]
/// implementation.
///
/// Dropping it takes the device away. Files still open on it stay valid, but every
/// further read or write on them fails with `ENODEV`; their release still runs.
pub struct Cdev {
    kernel: Arc<Kernel>,
    raw: Arc<bindings::cdev>,
    state: Arc<dyn DeviceControl>,
}

impl Cdev {
    /// Makes device number `index` of `region` live, dispatching to `T`.
    ///
    /// `context` is what `T::open` receives for every open of this device. Fails with
    /// `EINVAL` if `region` is no longer held or `index` lies outside it, and with `EBUSY`
    /// if the number is already served by another cdev.
    pub fn add<T: FileOperations>(
        module: &ThisModule,
        region: &Region,
        index: u32,
        context: T::OpenData,
    ) -> Result<Cdev> {
        if !region.is_held() {
            return Err(EINVAL);
        }
        let dev = region.dev_at(index).ok_or(EINVAL)?;
        let state = Arc::new(DeviceState::<T> {
            open_count: AtomicUsize::new(0),
            context: Revocable::new(context),
        });
        let private: Arc<dyn Any + Send + Sync> = state.clone();
        let raw = Arc::new(bindings::cdev {
            owner: module.name().into(),
            ops: OperationsVtable::<T>::build(),
            dev,
            count: 1,
            private,
        });
        let kernel = Arc::clone(region.kernel());
        to_result(kernel.cdev_add(Arc::clone(&raw)))?;
        Ok(Cdev {
            kernel,
            raw,
            state,
        })
    }

    pub fn dev(&self) -> dev_t {
        self.raw.dev
    }

    /// Number of files currently open on this device.
    pub fn open_count(&self) -> usize {
        self.state.open_count()
    }

    /// Returns `false` once the device has been taken away.
    pub fn is_live(&self) -> bool {
        self.state.is_live()
    }
}

impl Drop for Cdev {
    fn drop(&mut self) {
        self.kernel.cdev_del(&self.raw);
        self.state.revoke();
        let open = self.state.open_count();
        if open > 0 {
            log::debug!(
                "cdev {}:{} removed with {} open file(s)",
                MAJOR(self.raw.dev),
                MINOR(self.raw.dev),
                open
            );
        }
    }
}
