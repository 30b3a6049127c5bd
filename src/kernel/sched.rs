//! Per-core scheduler state
//!
//! Boot only establishes the initial state: the primary core holds the one
//! runnable thread, every secondary enters with the resume-current-thread
//! action and no thread of its own. Tick handling and priority decisions
//! live elsewhere.

use crate::arch::SpinLock;
use crate::config::MAX_CORES;
use crate::kprintln;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SchedulerAction {
    /// Keep running whatever the core currently holds.
    ResumeCurrentThread,
    /// Pick the highest-priority runnable thread.
    ChooseNewThread,
}

#[derive(Clone, Copy)]
pub struct CoreState {
    pub action: SchedulerAction,
    /// Whether the core holds a runnable thread; false on fresh secondaries.
    pub has_current: bool,
    /// Start of the running quantum.
    #[cfg(feature = "mcs")]
    pub current_time: u64,
    /// Time consumed by the current scheduling context.
    #[cfg(feature = "mcs")]
    pub consumed: u64,
}

impl CoreState {
    const fn new() -> Self {
        CoreState {
            action: SchedulerAction::ResumeCurrentThread,
            has_current: false,
            #[cfg(feature = "mcs")]
            current_time: 0,
            #[cfg(feature = "mcs")]
            consumed: 0,
        }
    }
}

const INIT: SpinLock<CoreState> = SpinLock::new(CoreState::new());
static CORE_STATES: [SpinLock<CoreState>; MAX_CORES] = [INIT; MAX_CORES];

/// Establish a core's initial scheduling state.
pub fn init_core_state(core: usize, action: SchedulerAction, has_current: bool) {
    let mut state = CORE_STATES[core].lock();
    state.action = action;
    state.has_current = has_current;
}

/// Start quantum/consumption accounting on this core.
#[cfg(feature = "mcs")]
pub fn arm_quantum(core: usize) {
    let mut state = CORE_STATES[core].lock();
    state.current_time = crate::drivers::timer::ticks();
    state.consumed = 0;
}

/// Resolve the pending scheduler action.
pub fn schedule(core: usize) {
    let mut state = CORE_STATES[core].lock();
    match state.action {
        SchedulerAction::ResumeCurrentThread => {}
        SchedulerAction::ChooseNewThread => {
            // The runtime scheduler owns this path; at boot the only
            // runnable thread is already current on the primary.
            state.action = SchedulerAction::ResumeCurrentThread;
        }
    }
}

/// Hand the core to its current thread. On hardware this ends in an
/// exception return; under the test harness it only records the decision.
pub fn activate_thread(core: usize) {
    let state = CORE_STATES[core].lock();
    if state.has_current {
        kprintln!("core {}: dropping to user level", core);
    }
}

/// Snapshot of a core's scheduler state.
pub fn core_state(core: usize) -> (SchedulerAction, bool) {
    let state = CORE_STATES[core].lock();
    (state.action, state.has_current)
}
