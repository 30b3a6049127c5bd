//! ARM generic timer driver
//!
//! Each core owns a private instance of the architected timer; boot starts
//! it on the primary and again on every secondary during its join path.

use crate::arch;
use core::sync::atomic::{AtomicU64, Ordering};

static TIMER_FREQ: AtomicU64 = AtomicU64::new(0);

const CTL_ENABLE: u64 = 1 << 0;
const CTL_IMASK: u64 = 1 << 1;

/// Start the calling core's timer.
///
/// The frequency register is global to the SoC, so the first caller records
/// it for everyone.
pub fn init_current_core() {
    if TIMER_FREQ.load(Ordering::Relaxed) == 0 {
        TIMER_FREQ.store(arch::read_timer_freq(), Ordering::Relaxed);
    }
    // Counting, interrupt line unmasked at the timer itself; delivery is
    // still gated by the interrupt controller.
    arch::write_timer_ctl(CTL_ENABLE & !CTL_IMASK);
}

/// Timer frequency in Hz.
pub fn frequency() -> u64 {
    let freq = TIMER_FREQ.load(Ordering::Relaxed);
    if freq == 0 {
        // QEMU virt default before init has run.
        62_500_000
    } else {
        freq
    }
}

/// Current count of the timer.
#[inline]
pub fn ticks() -> u64 {
    arch::read_timer()
}
