use core::{cmp, fmt};
use std::collections::VecDeque;

use spin::Mutex;

pub const KERN_EMERG: &str = "<0>";
pub const KERN_ALERT: &str = "<1>";
pub const KERN_CRIT: &str = "<2>";
pub const KERN_ERR: &str = "<3>";
pub const KERN_WARNING: &str = "<4>";
pub const KERN_NOTICE: &str = "<5>";
pub const KERN_INFO: &str = "<6>";
pub const KERN_DEBUG: &str = "<7>";
pub const KERN_CONT: &str = "c";

// From kernel/print/printk.c
const LOG_LINE_MAX: usize = 1024 - 32;
const LOG_BUF_LINES: usize = 1024;

static LOG_BUF: Mutex<VecDeque<String>> = Mutex::new(VecDeque::new());

#[doc(hidden)]
pub fn printk(level: &'static str, args: fmt::Arguments<'_>) {
    let mut writer = LogLineWriter::new();
    let _ = fmt::write(&mut writer, args);
    let line = writer.as_str().trim_end_matches('\n');
    eprintln!("{}{}", level, line);

    let mut buf = LOG_BUF.lock();
    if level == KERN_CONT {
        if let Some(last) = buf.back_mut() {
            last.push_str(line);
            return;
        }
    }
    if buf.len() == LOG_BUF_LINES {
        buf.pop_front();
    }
    buf.push_back(format!("{}{}", level, line));
}

/// Returns a snapshot of the kernel log, oldest line first.
pub fn dmesg() -> Vec<String> {
    LOG_BUF.lock().iter().cloned().collect()
}

#[doc(hidden)]
pub struct LogLineWriter {
    data: String,
}

#[allow(clippy::new_without_default)]
impl LogLineWriter {
    pub fn new() -> LogLineWriter {
        LogLineWriter {
            data: String::new(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.data
    }
}

impl fmt::Write for LogLineWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let mut copy_len = cmp::min(LOG_LINE_MAX - self.data.len(), s.len());
        while !s.is_char_boundary(copy_len) {
            copy_len -= 1;
        }
        self.data.push_str(&s[..copy_len]);
        Ok(())
    }
}

/// [`println!`] functions the same as it does in `std`, except instead of
/// printing to `stdout`, it writes to the kernel log at the `KERN_INFO`
/// level.
///
/// [`println!`]: https://doc.rust-lang.org/stable/std/macro.println.html
#[macro_export]
macro_rules! println {
    () => ({
        $crate::printk::printk($crate::printk::KERN_INFO, format_args!(""));
    });
    ($($arg:tt)*) => ({
        $crate::printk::printk($crate::printk::KERN_INFO, format_args!($($arg)*));
    });
}
