//! Device classes, the devices created under them and the `/dev` nodes they publish.
//!
//! C source: `drivers/base/class.c`, `drivers/base/core.c`, `drivers/base/devtmpfs.c`.

use core::ffi::c_int;
use std::{collections::BTreeMap, sync::Arc};

use spin::Mutex;

use crate::{
    bindings::{class, dev_t, EEXIST, EINVAL, ENODEV, MAJOR, MINOR},
    error::{linux_err, KernelResult},
    Kernel,
};

/// Directory devtmpfs nodes appear under.
pub const DEVTMPFS_ROOT: &str = "/dev";

fn node_path(name: &str) -> String {
    format!("{}/{}", DEVTMPFS_ROOT, name)
}

impl Kernel {
    /// Creates a device class. Fails with `EEXIST` if the name is taken.
    pub fn class_create(&self, name: &str) -> KernelResult<Arc<class>> {
        if name.is_empty() || name.contains('/') {
            return Err(linux_err::EINVAL);
        }
        let mut classes = self.classes.lock();
        if classes.contains_key(name) {
            return Err(linux_err::EEXIST);
        }
        let cls = Arc::new(class {
            name: name.into(),
            devices: Mutex::new(BTreeMap::new()),
        });
        classes.insert(name.into(), Arc::clone(&cls));
        log::debug!("class \"{}\" created", name);
        Ok(cls)
    }

    /// Unregisters a class.
    ///
    /// Devices still created under it are torn down with a warning; callers are expected
    /// to destroy them first.
    pub fn class_destroy(&self, cls: &Arc<class>) {
        let mut classes = self.classes.lock();
        match classes.get(&cls.name) {
            Some(c) if Arc::ptr_eq(c, cls) => {
                classes.remove(&cls.name);
            }
            _ => {
                log::warn!("class \"{}\" is not registered", cls.name);
                return;
            }
        }
        let mut devices = cls.devices.lock();
        if !devices.is_empty() {
            log::warn!(
                "class \"{}\" destroyed with {} device(s) still present",
                cls.name,
                devices.len()
            );
            let mut devtmpfs = self.devtmpfs.lock();
            for name in devices.values() {
                devtmpfs.remove(&node_path(name));
            }
            devices.clear();
        }
        log::debug!("class \"{}\" destroyed", cls.name);
    }

    /// Creates a device under `cls` and its `/dev/<name>` node for `dev`.
    pub fn device_create(&self, cls: &Arc<class>, dev: dev_t, name: &str) -> c_int {
        if name.is_empty() || name.contains('/') {
            return -(EINVAL as c_int);
        }
        let classes = self.classes.lock();
        if !classes.get(&cls.name).is_some_and(|c| Arc::ptr_eq(c, cls)) {
            return -(ENODEV as c_int);
        }
        let mut devices = cls.devices.lock();
        let mut devtmpfs = self.devtmpfs.lock();
        let path = node_path(name);
        if devices.contains_key(&dev) || devtmpfs.contains_key(&path) {
            return -(EEXIST as c_int);
        }
        devices.insert(dev, name.into());
        devtmpfs.insert(path, dev);
        log::debug!(
            "device {} ({}:{}) created in class \"{}\"",
            name,
            MAJOR(dev),
            MINOR(dev),
            cls.name
        );
        0
    }

    /// Removes the device created under `cls` for `dev`, if any, and its node.
    pub fn device_destroy(&self, cls: &Arc<class>, dev: dev_t) {
        let mut devices = cls.devices.lock();
        if let Some(name) = devices.remove(&dev) {
            self.devtmpfs.lock().remove(&node_path(&name));
            log::debug!("device {} destroyed", name);
        }
    }

    /// Lists `(name, dev)` for every device in the named class, as `/sys/class/<name>` does.
    pub fn class_devices(&self, name: &str) -> Option<Vec<(String, dev_t)>> {
        let cls = self.classes.lock().get(name).cloned()?;
        let devices = cls.devices.lock();
        Some(devices.iter().map(|(&d, n)| (n.clone(), d)).collect())
    }

    /// Resolves a devtmpfs path such as `/dev/mychardev` to its device number.
    pub fn devtmpfs_lookup(&self, path: &str) -> Option<dev_t> {
        self.devtmpfs.lock().get(path).copied()
    }
}
