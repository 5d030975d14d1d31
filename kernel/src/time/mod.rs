// SPDX-License-Identifier: GPL-2.0

//! Time and delays.
//!
//! C header: [`include/linux/delay.h`](../../../../include/linux/delay.h)

use core::time::Duration;

/// Sleeps for at least `ms` milliseconds.
pub fn msleep(ms: u32) {
    fsleep(Duration::from_millis(u64::from(ms)));
}

/// Sleeps for at least `delta`. A zero delta returns at once.
pub fn fsleep(delta: Duration) {
    if delta.is_zero() {
        return;
    }
    std::thread::sleep(delta);
}
