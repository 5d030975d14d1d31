// SPDX-License-Identifier: GPL-2.0

//! Device classes and the device nodes published through them.
//!
//! C header: [`include/linux/device/class.h`](../../../../include/linux/device/class.h)

use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use kbind::{
    bindings::{self, dev_t, MAJOR, MINOR},
    class::DEVTMPFS_ROOT,
    Kernel,
};

use crate::{
    chrdev::Region,
    code::*,
    error::{to_result, KernelResult as Result},
    ThisModule,
};

struct ClassInner {
    kernel: Arc<Kernel>,
    raw: Arc<bindings::class>,
    nodes: AtomicUsize,
    destroyed: AtomicBool,
}

impl Drop for ClassInner {
    fn drop(&mut self) {
        if !self.destroyed.swap(true, Ordering::AcqRel) {
            self.kernel.class_destroy(&self.raw);
        }
    }
}

/// A device class: the group device nodes are published under.
///
/// The class refuses to go away while nodes are published in it. Dropping a [`Class`]
/// without calling [`Class::destroy`] destroys it once its last node is gone.
pub struct Class {
    inner: Arc<ClassInner>,
}

impl Class {
    /// Creates a class. Fails with `EEXIST` if a class of that name already exists.
    pub fn create(module: &ThisModule, name: &str) -> Result<Class> {
        let kernel = Arc::clone(module.kernel());
        let raw = kernel.class_create(name)?;
        Ok(Class {
            inner: Arc::new(ClassInner {
                kernel,
                raw,
                nodes: AtomicUsize::new(0),
                destroyed: AtomicBool::new(false),
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.raw.name
    }

    /// Number of nodes currently published in this class.
    pub fn node_count(&self) -> usize {
        self.inner.nodes.load(Ordering::Acquire)
    }

    /// Publishes `/dev/<name>` for device number `index` of `region`.
    ///
    /// Fails with `ENXIO` if `region` is not held or `index` is outside it, and with
    /// `EEXIST` if the node name is taken.
    pub fn publish(&self, region: &Region, index: u32, name: &str) -> Result<Node> {
        if self.inner.destroyed.load(Ordering::Acquire) {
            return Err(EINVAL);
        }
        if !region.is_held() {
            return Err(ENXIO);
        }
        let dev = region.dev_at(index).ok_or(ENXIO)?;
        to_result(self.inner.kernel.device_create(&self.inner.raw, dev, name))?;
        self.inner.nodes.fetch_add(1, Ordering::AcqRel);
        Ok(Node {
            class: Arc::clone(&self.inner),
            dev,
            name: name.into(),
            published: true,
        })
    }

    /// Destroys the class.
    ///
    /// Fails with `ENOTEMPTY`, leaving the class untouched, while nodes are still
    /// published in it, and with `EINVAL` if it was already destroyed.
    pub fn destroy(&mut self) -> Result {
        if self.inner.destroyed.load(Ordering::Acquire) {
            return Err(EINVAL);
        }
        let nodes = self.node_count();
        if nodes > 0 {
            log::warn!(
                "class \"{}\" still has {} node(s) published",
                self.name(),
                nodes
            );
            return Err(ENOTEMPTY);
        }
        self.inner.destroyed.store(true, Ordering::Release);
        self.inner.kernel.class_destroy(&self.inner.raw);
        Ok(())
    }
}

/// A published device node.
///
/// Unpublished by [`Node::unpublish`] or on drop.
pub struct Node {
    class: Arc<ClassInner>,
    dev: dev_t,
    name: String,
    published: bool,
}

impl Node {
    pub fn dev(&self) -> dev_t {
        self.dev
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path the node appears at, e.g. `/dev/mychardev`.
    pub fn path(&self) -> String {
        format!("{}/{}", DEVTMPFS_ROOT, self.name)
    }

    /// Removes the node.
    pub fn unpublish(mut self) {
        self.remove();
    }

    fn remove(&mut self) {
        if !self.published {
            return;
        }
        self.published = false;
        self.class.kernel.device_destroy(&self.class.raw, self.dev);
        self.class.nodes.fetch_sub(1, Ordering::AcqRel);
        log::debug!(
            "node {} ({}:{}) unpublished",
            self.path(),
            MAJOR(self.dev),
            MINOR(self.dev)
        );
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        self.remove();
    }
}
