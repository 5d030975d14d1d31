use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    },
};

use spin::Mutex;

use crate::{
    bindings::{cdev, class, dev_t},
    chrdev::ChrdevTable,
};

/// One running kernel: every registry a module can touch.
///
/// Lock order, when more than one is needed: `classes` → `class::devices` → `devtmpfs`.
/// No registry lock is ever held while driver code runs.
pub struct Kernel {
    pub(crate) chrdevs: Mutex<ChrdevTable>,
    pub(crate) cdev_map: Mutex<BTreeMap<dev_t, Arc<cdev>>>,
    pub(crate) classes: Mutex<BTreeMap<String, Arc<class>>>,
    pub(crate) devtmpfs: Mutex<BTreeMap<String, dev_t>>,
    pub(crate) modules: Mutex<BTreeSet<String>>,
    next_pid: AtomicU32,
}

impl Kernel {
    /// Boots an empty kernel.
    pub fn new() -> Arc<Kernel> {
        Arc::new(Kernel {
            chrdevs: Mutex::new(ChrdevTable::default()),
            cdev_map: Mutex::new(BTreeMap::new()),
            classes: Mutex::new(BTreeMap::new()),
            devtmpfs: Mutex::new(BTreeMap::new()),
            modules: Mutex::new(BTreeSet::new()),
            next_pid: AtomicU32::new(1),
        })
    }

    pub(crate) fn alloc_pid(&self) -> u32 {
        self.next_pid.fetch_add(1, Ordering::Relaxed)
    }
}
