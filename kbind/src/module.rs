//! The loaded-module list.

use crate::{
    error::{linux_err, KernelResult},
    Kernel,
};

impl Kernel {
    /// Records `name` as loaded. Fails with `EEXIST` if a module of that name is.
    pub fn insert_module(&self, name: &str) -> KernelResult {
        if name.is_empty() {
            return Err(linux_err::EINVAL);
        }
        if !self.modules.lock().insert(name.into()) {
            log::warn!("module {} is already loaded", name);
            return Err(linux_err::EEXIST);
        }
        Ok(())
    }

    pub fn remove_module(&self, name: &str) -> KernelResult {
        if self.modules.lock().remove(name) {
            Ok(())
        } else {
            Err(linux_err::ENOENT)
        }
    }

    /// Names of loaded modules, sorted.
    pub fn lsmod(&self) -> Vec<String> {
        self.modules.lock().iter().cloned().collect()
    }
}
