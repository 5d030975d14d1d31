//! File system glue for character devices.

pub mod file_operations;
