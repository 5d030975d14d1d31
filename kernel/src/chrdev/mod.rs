// SPDX-License-Identifier: GPL-2.0

//! Character devices.
//!
//! Also called "char devices", `chrdev`, `cdev`.
//!
//! C header: [`include/linux/cdev.h`](../../../../include/linux/cdev.h)
//!
//! Reference: <https://www.kernel.org/doc/html/latest/core-api/kernel-api.html#char-devices>

mod cdev;
mod region;
mod scratch;

use core::ops::Range;

pub(crate) use cdev::DeviceState;
pub use cdev::Cdev;
pub use region::{Region, MINOR_MAX};
pub use scratch::ScratchBuffer;

use crate::{
    class::{Class, Node},
    code::*,
    error::{Error, KernelResult as Result},
    fs::file_operations::FileOperations,
    retry::RetryPolicy,
    ThisModule,
};

type DeviceCtor = Box<dyn FnOnce(&ThisModule, &Region, u32) -> Result<Cdev> + Send>;

/// Character device registration.
///
/// Owns everything a character device module sets up, in the order it was set up: the
/// device number region, one cdev per registered device, an optional class and the
/// nodes published in it. Dropping it tears all of that down in reverse: nodes, class,
/// cdevs, region.
pub struct Registration {
    nodes: Vec<Node>,
    class: Option<Class>,
    devices: Vec<Cdev>,
    region: Region,
}

impl Registration {
    pub fn region(&self) -> &Region {
        &self.region
    }

    /// The `index`-th registered device.
    pub fn device(&self, index: usize) -> Option<&Cdev> {
        self.devices.get(index)
    }

    pub fn devices(&self) -> &[Cdev] {
        &self.devices
    }

    pub fn class(&self) -> Option<&Class> {
        self.class.as_ref()
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        while let Some(node) = self.nodes.pop() {
            node.unpublish();
        }
        if let Some(mut class) = self.class.take() {
            if let Err(e) = class.destroy() {
                log::warn!("class \"{}\" not destroyed: {:?}", class.name(), e);
            }
        }
        while let Some(cdev) = self.devices.pop() {
            drop(cdev);
        }
        if self.region.is_held() {
            let _ = self.region.release();
        }
        log::debug!("chrdev registration \"{}\" torn down", self.region.name());
    }
}

/// Builder for a [`Registration`].
///
/// Nothing touches the kernel until [`Builder::build`]; a failure there unwinds whatever
/// had been set up so far.
pub struct Builder {
    module: ThisModule,
    name: String,
    minors: Range<u32>,
    major: Option<u32>,
    retry: RetryPolicy,
    devices: Vec<DeviceCtor>,
    class: Option<String>,
    nodes: Vec<(u32, String)>,
    error: Option<Error>,
}

/// Starts building a registration named `name` over the minors in `minors`.
///
/// Fails with `EINVAL` if `minors` is empty or `name` is empty.
pub fn builder(module: &ThisModule, name: &str, minors: Range<u32>) -> Result<Builder> {
    if minors.is_empty() || name.is_empty() {
        return Err(EINVAL);
    }
    Ok(Builder {
        module: module.clone(),
        name: name.into(),
        minors,
        major: None,
        retry: RetryPolicy::none(),
        devices: Vec::new(),
        class: None,
        nodes: Vec::new(),
        error: None,
    })
}

impl Builder {
    /// Requests exactly `major` instead of a dynamically chosen one.
    pub fn major(mut self, major: u32) -> Self {
        self.major = Some(major);
        self
    }

    /// Retries acquiring the region while it is busy.
    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Registers a device on the next free minor, dispatching to `T` with `context` as
    /// its open data.
    pub fn register_device<T: FileOperations>(mut self, context: T::OpenData) -> Self {
        self.devices.push(Box::new(move |module, region, index| {
            Cdev::add::<T>(module, region, index, context)
        }));
        self
    }

    /// Creates a class named `name` once the devices are live.
    pub fn class(mut self, name: &str) -> Self {
        self.class = Some(name.into());
        self
    }

    /// Publishes a node named `name` for the most recently registered device.
    pub fn node(mut self, name: &str) -> Self {
        match self.devices.len().checked_sub(1) {
            Some(index) => self.nodes.push((index as u32, name.into())),
            None => {
                log::error!("node \"{}\" requested before any device", name);
                self.error.get_or_insert(EINVAL);
            }
        }
        self
    }

    /// Acquires the region, adds each device, creates the class and publishes the nodes.
    pub fn build(self) -> Result<Registration> {
        if let Some(e) = self.error {
            return Err(e);
        }
        let count = self.minors.end - self.minors.start;
        if self.devices.len() > count as usize {
            log::error!(
                "{} devices do not fit in {} minors of \"{}\"",
                self.devices.len(),
                count,
                self.name
            );
            return Err(EINVAL);
        }
        if !self.nodes.is_empty() && self.class.is_none() {
            return Err(EINVAL);
        }

        let region = Region::acquire_with_retry(
            &self.module,
            self.major,
            self.minors.start,
            count,
            &self.name,
            &self.retry,
        )?;
        let mut reg = Registration {
            nodes: Vec::new(),
            class: None,
            devices: Vec::new(),
            region,
        };

        // From here on an early return drops `reg`, which unwinds in reverse.
        for (index, ctor) in self.devices.into_iter().enumerate() {
            let cdev = ctor(&self.module, &reg.region, index as u32)?;
            reg.devices.push(cdev);
        }
        if let Some(name) = &self.class {
            reg.class = Some(Class::create(&self.module, name)?);
        }
        if let Some(class) = &reg.class {
            for (index, name) in &self.nodes {
                let node = class.publish(&reg.region, *index, name)?;
                reg.nodes.push(node);
            }
        }
        log::debug!(
            "chrdev registration \"{}\" up: {}:{} (+{}), {} device(s)",
            self.name,
            reg.region.major(),
            reg.region.base_minor(),
            count,
            reg.devices.len()
        );
        Ok(reg)
    }
}
