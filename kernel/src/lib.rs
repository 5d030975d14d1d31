//! The `kernel` crate.
//!
//! Safe abstractions for writing character device modules on top of the services in
//! [`kbind`]: device number regions, file operation tables, cdevs, device classes,
//! module loading with parameters, and the logging glue.

pub mod buf;
pub mod chrdev;
pub mod class;
pub mod error;
pub mod fs;
pub mod logger;
pub mod module;
pub mod print;
pub mod retry;
pub mod revocable;
pub mod time;

pub use kbind::{self, bindings, println, Kernel};

pub use error::linux_err as code;
pub use module::{param as module_param, Module, ThisModule};

/// The items most modules need, for glob import.
pub mod prelude {
    pub use crate::{
        error::{linux_err::*, Error, KernelResult as Result},
        module, pr_cont, pr_debug, pr_err, pr_info, pr_notice, pr_warn, Module, ThisModule,
    };
}
