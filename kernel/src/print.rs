// SPDX-License-Identifier: GPL-2.0

//! Printing facilities.
//!
//! C header: [`include/linux/printk.h`](../../../../include/linux/printk.h)
//!
//! Reference: <https://www.kernel.org/doc/html/latest/core-api/printk-basics.html>

use core::fmt;

use kbind::printk::{printk, KERN_CONT};

/// Prints a message prefixed with the name of the calling crate.
#[doc(hidden)]
pub fn call_printk(level: &'static str, module_path: &str, args: fmt::Arguments<'_>) {
    let prefix = module_path.split("::").next().unwrap_or(module_path);
    printk(level, format_args!("{}: {}", prefix, args));
}

/// Continues the previous line.
#[doc(hidden)]
pub fn call_printk_cont(args: fmt::Arguments<'_>) {
    printk(KERN_CONT, args);
}

#[doc(hidden)]
#[macro_export]
macro_rules! print_macro (
    ($level:path, false, $($arg:tt)+) => (
        $crate::print::call_printk($level, ::core::module_path!(), ::core::format_args!($($arg)+))
    );
    ($level:path, true, $($arg:tt)+) => (
        $crate::print::call_printk_cont(::core::format_args!($($arg)+))
    );
);

/// Prints an emergency-level message (level 0).
///
/// Use this level if the system is unusable.
#[macro_export]
macro_rules! pr_emerg (
    ($($arg:tt)*) => (
        $crate::print_macro!($crate::kbind::printk::KERN_EMERG, false, $($arg)*)
    )
);

/// Prints an alert-level message (level 1).
#[macro_export]
macro_rules! pr_alert (
    ($($arg:tt)*) => (
        $crate::print_macro!($crate::kbind::printk::KERN_ALERT, false, $($arg)*)
    )
);

/// Prints a critical-level message (level 2).
#[macro_export]
macro_rules! pr_crit (
    ($($arg:tt)*) => (
        $crate::print_macro!($crate::kbind::printk::KERN_CRIT, false, $($arg)*)
    )
);

/// Prints an error-level message (level 3).
#[macro_export]
macro_rules! pr_err (
    ($($arg:tt)*) => (
        $crate::print_macro!($crate::kbind::printk::KERN_ERR, false, $($arg)*)
    )
);

/// Prints a warning-level message (level 4).
#[macro_export]
macro_rules! pr_warn (
    ($($arg:tt)*) => (
        $crate::print_macro!($crate::kbind::printk::KERN_WARNING, false, $($arg)*)
    )
);

/// Prints a notice-level message (level 5).
#[macro_export]
macro_rules! pr_notice (
    ($($arg:tt)*) => (
        $crate::print_macro!($crate::kbind::printk::KERN_NOTICE, false, $($arg)*)
    )
);

/// Prints an info-level message (level 6).
///
/// Use this level for informational messages.
#[macro_export]
macro_rules! pr_info (
    ($($arg:tt)*) => (
        $crate::print_macro!($crate::kbind::printk::KERN_INFO, false, $($arg)*)
    )
);

/// Prints a debug-level message (level 7).
#[macro_export]
macro_rules! pr_debug (
    ($($arg:tt)*) => (
        $crate::print_macro!($crate::kbind::printk::KERN_DEBUG, false, $($arg)*)
    )
);

/// Continues a line previously started with one of the other `pr_*` macros.
#[macro_export]
macro_rules! pr_cont (
    ($($arg:tt)*) => (
        $crate::print_macro!($crate::kbind::printk::KERN_CONT, true, $($arg)*)
    )
);
