//! Boot-time core synchronization
//!
//! A release flag plus a joined-core counter, shared by every core for the
//! duration of boot and discarded afterwards. No kernel primitive exists
//! yet when this runs, so the contract is carried entirely by the two
//! atomics:
//!
//! - the primary publishes the flag with `Release` ordering *after* all of
//!   its writes to shared boot structures, and every secondary reads it
//!   with `Acquire`, so a secondary that observes the release also
//!   observes every prior write;
//! - each secondary bumps the counter with `Release` ordering *after* its
//!   core-local initialization, and the primary polls it with `Acquire`,
//!   so the primary proceeds only once every join is fully visible.
//!
//! There is no timeout and no recovery: a core that never joins hangs the
//! boot.

use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

pub struct BootSync {
    released: AtomicBool,
    joined: AtomicUsize,
}

impl BootSync {
    pub const fn new() -> Self {
        BootSync {
            released: AtomicBool::new(false),
            joined: AtomicUsize::new(0),
        }
    }

    /// Count the primary core itself. Runs strictly before [`release`],
    /// while no other core can observe the counter.
    ///
    /// [`release`]: Self::release
    pub fn begin(&self) {
        self.joined.store(1, Ordering::Relaxed);
    }

    /// Publish all prior writes and let the secondaries run. Called exactly
    /// once, by the primary.
    pub fn release(&self) {
        self.released.store(true, Ordering::Release);
    }

    /// Spin until the primary has released the secondaries.
    pub fn wait_for_release(&self) {
        while !self.released.load(Ordering::Acquire) {
            core::hint::spin_loop();
        }
    }

    /// Announce that this secondary finished its core-local setup. Called
    /// exactly once per secondary.
    pub fn join(&self) {
        self.joined.fetch_add(1, Ordering::AcqRel);
    }

    /// Spin until `expected` cores (the primary included) have joined.
    pub fn wait_for_joined(&self, expected: usize) {
        while self.joined.load(Ordering::Acquire) != expected {
            core::hint::spin_loop();
        }
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    pub fn joined_count(&self) -> usize {
        self.joined.load(Ordering::Acquire)
    }
}
