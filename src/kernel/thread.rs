//! Thread control blocks
//!
//! Boot creates exactly two threads: the per-system idle thread and the
//! initial user thread. Everything else is retyped out of untyped memory
//! at runtime.

// ═══════════════════════════════════════════════════════════════════════════════
// USER CONTEXT
// ═══════════════════════════════════════════════════════════════════════════════

/// Architectural state restored when a thread enters user level. Only the
/// registers boot needs to seed are modelled; the exception path saves and
/// restores the full frame.
#[derive(Clone, Copy, Debug, Default)]
pub struct UserContext {
    /// Program counter (ELR_EL1 on entry).
    pub pc: usize,
    /// Stack pointer; the initial thread sets up its own stack.
    pub sp: usize,
    /// Saved processor state.
    pub spsr: usize,
    /// First argument register; carries the boot-info pointer.
    pub arg0: usize,
}

/// EL0, AArch64, all interrupts enabled.
pub const SPSR_USER: usize = 0;

// ═══════════════════════════════════════════════════════════════════════════════
// TCB
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ThreadState {
    Inactive,
    Running,
    IdleThreadState,
}

/// Highest priority; the initial thread gets it so nothing can starve it
/// before user level sets policy.
pub const MAX_PRIORITY: u8 = 255;

/// A thread control block.
#[derive(Clone, Copy, Debug)]
pub struct Tcb {
    pub context: UserContext,
    pub state: ThreadState,
    pub priority: u8,
    /// Kernel-window pointer to the thread's capability table.
    pub cspace_root: usize,
    /// Physical address of the thread's translation-table root.
    pub vspace_root: usize,
    /// Virtual address of the thread's IPC buffer, zero for the idle thread.
    pub ipc_buffer: usize,
}

impl Tcb {
    pub const fn new() -> Self {
        Tcb {
            context: UserContext {
                pc: 0,
                sp: 0,
                spsr: 0,
                arg0: 0,
            },
            state: ThreadState::Inactive,
            priority: 0,
            cspace_root: 0,
            vspace_root: 0,
            ipc_buffer: 0,
        }
    }
}

/// Turn a blank TCB into the idle thread. The idle loop never leaves the
/// kernel, so it has no cspace, vspace or IPC buffer.
pub fn configure_idle_thread(tcb: &mut Tcb) {
    let entry: fn() -> ! = idle_thread;
    tcb.context.pc = entry as usize;
    tcb.context.spsr = SPSR_IDLE;
    tcb.state = ThreadState::IdleThreadState;
    tcb.priority = 0;
}

/// EL1h with interrupts enabled: the idle thread runs in the kernel.
const SPSR_IDLE: usize = 0b0101;

fn idle_thread() -> ! {
    loop {
        crate::arch::wfi();
    }
}

/// Seed the initial thread's execution state.
pub fn configure_initial_thread(
    tcb: &mut Tcb,
    cspace_root: usize,
    vspace_root: usize,
    entry: usize,
    boot_info_vptr: usize,
    ipcbuf_vptr: usize,
) {
    tcb.context = UserContext {
        pc: entry,
        sp: 0,
        spsr: SPSR_USER,
        arg0: boot_info_vptr,
    };
    tcb.state = ThreadState::Running;
    tcb.priority = MAX_PRIORITY;
    tcb.cspace_root = cspace_root;
    tcb.vspace_root = vspace_root;
    tcb.ipc_buffer = ipcbuf_vptr;
}
