// SPDX-License-Identifier: GPL-2.0

//! Loadable modules.
//!
//! C header: [`include/linux/module.h`](../../../../include/linux/module.h)

pub mod param;

use std::{fmt, sync::Arc};

use kbind::Kernel;

use self::param::{ModuleParam, ParamSpec, ParamStore};
use crate::error::KernelResult as Result;

/// The top level entrypoint to implementing a kernel module.
///
/// For any teardown or cleanup operations, your type may implement [`Drop`].
pub trait Module: Sized + Send + Sync {
    /// Called at module initialization time.
    ///
    /// Use this method to perform whatever setup or registration your module
    /// should do.
    ///
    /// Equivalent to the `module_init` macro in the C API.
    fn init(module: &ThisModule) -> Result<Self>;
}

/// Static description of a module, generated by [`module!`](crate::module!).
pub trait ModuleInfo {
    const NAME: &'static str;
    const AUTHOR: &'static str;
    const DESCRIPTION: &'static str;
    const LICENSE: &'static str;
    const PARAMS: &'static [ParamSpec];
}

/// Equivalent to `THIS_MODULE` in the C API.
///
/// Names the module to the registries and carries the kernel it was loaded into along
/// with its parameter values.
#[derive(Clone)]
pub struct ThisModule {
    kernel: Arc<Kernel>,
    name: Arc<str>,
    params: Arc<ParamStore>,
}

impl ThisModule {
    /// A module handle without parameters, for code that is not loaded through [`load`].
    pub fn new(kernel: &Arc<Kernel>, name: &str) -> ThisModule {
        ThisModule {
            kernel: Arc::clone(kernel),
            name: name.into(),
            params: Arc::new(ParamStore::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kernel(&self) -> &Arc<Kernel> {
        &self.kernel
    }

    /// Value of parameter `name`: the `insmod` argument if one was given, the declared
    /// default otherwise.
    pub fn param<T: ModuleParam>(&self, name: &str) -> Result<T> {
        self.params.get(name)
    }
}

impl fmt::Debug for ThisModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThisModule")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Entry in the kernel's module list, removed on drop.
struct ModuleSlot {
    kernel: Arc<Kernel>,
    name: &'static str,
}

impl Drop for ModuleSlot {
    fn drop(&mut self) {
        if let Err(e) = self.kernel.remove_module(self.name) {
            log::warn!("module {} missing from the module list: {:?}", self.name, e);
        }
    }
}

/// A module brought up by [`load`].
///
/// Dropping it, or calling [`LoadedModule::unload`], runs the module's teardown and then
/// removes it from the module list.
pub struct LoadedModule<M: Module + ModuleInfo> {
    module: M,
    this: ThisModule,
    _slot: ModuleSlot,
}

impl<M: Module + ModuleInfo> LoadedModule<M> {
    pub fn get(&self) -> &M {
        &self.module
    }

    pub fn this(&self) -> &ThisModule {
        &self.this
    }

    /// Parameters visible under `/sys/module/<name>/parameters`, with their values.
    pub fn params(&self) -> Vec<(&'static str, String)> {
        self.this.params.visible()
    }

    /// Equivalent to `rmmod`.
    pub fn unload(self) {
        log::debug!("unloading module {}", M::NAME);
        drop(self);
    }
}

/// Equivalent to `insmod`: loads `M` into `kernel` with `args` as its parameters.
///
/// Parameters are parsed and checked before anything else happens. `init` runs only if
/// they are all valid and no module named [`ModuleInfo::NAME`] is loaded yet; if it fails,
/// the module is taken off the module list again and the error is returned.
pub fn load<M: Module + ModuleInfo>(kernel: &Arc<Kernel>, args: &str) -> Result<LoadedModule<M>> {
    let params = ParamStore::parse(M::PARAMS, args)?;
    kernel.insert_module(M::NAME)?;
    let slot = ModuleSlot {
        kernel: Arc::clone(kernel),
        name: M::NAME,
    };
    let this = ThisModule {
        kernel: Arc::clone(kernel),
        name: M::NAME.into(),
        params: Arc::new(params),
    };
    let module = match M::init(&this) {
        Ok(module) => module,
        Err(e) => {
            log::warn!("module {} failed to initialise: {:?}", M::NAME, e);
            return Err(e);
        }
    };
    log::debug!("module {} ({}) loaded", M::NAME, M::DESCRIPTION);
    Ok(LoadedModule {
        module,
        this,
        _slot: slot,
    })
}

#[doc(hidden)]
#[macro_export]
macro_rules! __param_default {
    (String, $default:expr) => {
        ::std::string::String::from($default)
    };
    ($t:tt, $default:expr) => {{
        let v: $t = $default;
        v
    }};
}

/// Declares a kernel module.
///
/// The `type` argument should be a type which implements the [`Module`] trait. Parameters
/// may be of type `bool`, `i32`, `u32`, `u64` or `String` and are read in
/// [`Module::init`] through [`ThisModule::param`].
///
/// # Examples
///
/// ```
/// use kernel::prelude::*;
///
/// struct MyModule;
///
/// impl Module for MyModule {
///     fn init(module: &ThisModule) -> Result<Self> {
///         let count: u32 = module.param("count")?;
///         pr_info!("count is {}\n", count);
///         Ok(MyModule)
///     }
/// }
///
/// module! {
///     type: MyModule,
///     name: "my_kernel_module",
///     author: "Rust for Linux Contributors",
///     description: "My very own kernel module!",
///     license: "GPL",
///     params: {
///         count: u32 {
///             default: 1,
///             permissions: 0o444,
///             description: "Number of devices",
///         },
///     },
/// }
///
/// let kernel = kernel::Kernel::new();
/// let loaded = kernel::module::load::<MyModule>(&kernel, "count=3").unwrap();
/// assert_eq!(loaded.this().param::<u32>("count"), Ok(3));
/// ```
#[macro_export]
macro_rules! module {
    (
        type: $type:ty,
        name: $name:literal,
        author: $author:literal,
        description: $description:literal,
        license: $license:literal
        $(, params: {
            $($pname:ident : $ptype:tt {
                default: $default:expr,
                permissions: $permissions:expr,
                description: $pdescription:expr $(,)?
            }),* $(,)?
        })?
        $(,)?
    ) => {
        impl $crate::module::ModuleInfo for $type {
            const NAME: &'static str = $name;
            const AUTHOR: &'static str = $author;
            const DESCRIPTION: &'static str = $description;
            const LICENSE: &'static str = $license;
            const PARAMS: &'static [$crate::module::param::ParamSpec] = &[
                $($(
                    $crate::module::param::ParamSpec {
                        name: ::core::stringify!($pname),
                        description: $pdescription,
                        permissions: $permissions,
                        default: || {
                            $crate::module::param::ModuleParam::into_value(
                                $crate::__param_default!($ptype, $default),
                            )
                        },
                        parse: |arg| {
                            <$ptype as $crate::module::param::ModuleParam>::try_from_param_arg(arg)
                                .map($crate::module::param::ModuleParam::into_value)
                        },
                    },
                )*)?
            ];
        }
    };
}
