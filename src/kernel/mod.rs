//! Kernel subsystems
//!
//! - Capability model and the root capability table
//! - Interrupt-line state machine
//! - Thread control blocks
//! - Per-core scheduler state
//! - The one-shot bootstrap sequence

pub mod boot;
pub mod capability;
pub mod irq;
pub mod sched;
pub mod thread;

pub use self::capability::{CapRights, Capability};
