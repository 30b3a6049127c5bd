//! Multi-core bring-up on a simulated machine
//!
//! Each std thread plays one core against the shared BootSync, which is
//! exactly the contract the hardware cores follow: no secondary proceeds
//! before the release, the primary proceeds only after every join.

use crate::{image_args, new_arena, test_platform};
use corten_kernel::drivers::interrupts::{IRQ_REMOTE_CALL_IPI, IRQ_RESCHEDULE_IPI, KERNEL_TIMER_IRQ};
use corten_kernel::kernel::boot::smp::BootSync;
use corten_kernel::kernel::boot::{try_init_kernel, try_init_secondary};
use corten_kernel::kernel::irq::{irq_state, IrqState};
use corten_kernel::kernel::sched::{core_state, SchedulerAction};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[test]
fn release_flag_publishes_prior_writes() {
    let sync = Arc::new(BootSync::new());
    let data = Arc::new(AtomicUsize::new(0));

    let reader = {
        let sync = Arc::clone(&sync);
        let data = Arc::clone(&data);
        thread::spawn(move || {
            sync.wait_for_release();
            // Everything written before the release must be visible.
            data.load(Ordering::Relaxed)
        })
    };

    data.store(0xC0DE, Ordering::Relaxed);
    sync.begin();
    sync.release();
    assert_eq!(reader.join().unwrap(), 0xC0DE);
}

#[test]
fn secondaries_join_only_after_release() {
    let _guard = crate::BOOT_LOCK.lock().unwrap_or_else(|e| e.into_inner());

    const CORES: usize = 3;
    let sync = Arc::new(BootSync::new());
    let proceeded = Arc::new(AtomicUsize::new(0));

    let mut secondaries = Vec::new();
    for core in 1..CORES {
        let sync = Arc::clone(&sync);
        let proceeded = Arc::clone(&proceeded);
        secondaries.push(thread::spawn(move || {
            let plat = test_platform(CORES);
            sync.wait_for_release();
            proceeded.fetch_add(1, Ordering::SeqCst);
            try_init_secondary(&plat, core, &sync).unwrap();
        }));
    }

    // The primary has not released yet: nobody may have moved.
    thread::sleep(Duration::from_millis(50));
    assert_eq!(proceeded.load(Ordering::SeqCst), 0);
    assert_eq!(sync.joined_count(), 0);
    assert!(!sync.is_released());

    // The primary sequence releases at its end and returns only once the
    // joined-core counter has reached the configured core count.
    let plat = test_platform(CORES);
    let mut arena = new_arena();
    try_init_kernel(&plat, &mut arena, &sync, &image_args()).unwrap();

    assert!(sync.is_released());
    assert_eq!(sync.joined_count(), CORES);

    for handle in secondaries {
        handle.join().unwrap();
    }
    // Exactly one pass through the wait per secondary.
    assert_eq!(proceeded.load(Ordering::SeqCst), CORES - 1);

    // Each secondary entered the initial scheduling state with nothing to
    // run, and activated its own per-core lines.
    for core in 1..CORES {
        let (action, has_current) = core_state(core);
        assert_eq!(action, SchedulerAction::ResumeCurrentThread);
        assert!(!has_current);
        assert_eq!(irq_state(core, KERNEL_TIMER_IRQ), IrqState::Timer);
        assert_eq!(irq_state(core, IRQ_REMOTE_CALL_IPI), IrqState::Ipi);
        assert_eq!(irq_state(core, IRQ_RESCHEDULE_IPI), IrqState::Ipi);
    }
    // The primary holds the only runnable thread.
    let (action, has_current) = core_state(0);
    assert_eq!(action, SchedulerAction::ResumeCurrentThread);
    assert!(has_current);
    assert_eq!(irq_state(0, IRQ_REMOTE_CALL_IPI), IrqState::Ipi);
}

#[test]
fn multi_core_boot_reports_core_count() {
    let _guard = crate::BOOT_LOCK.lock().unwrap_or_else(|e| e.into_inner());

    const CORES: usize = 2;
    let sync = Arc::new(BootSync::new());
    let secondary = {
        let sync = Arc::clone(&sync);
        thread::spawn(move || {
            let plat = test_platform(CORES);
            try_init_secondary(&plat, 1, &sync).unwrap();
        })
    };

    let plat = test_platform(CORES);
    let mut arena = new_arena();
    try_init_kernel(&plat, &mut arena, &sync, &image_args()).unwrap();
    secondary.join().unwrap();

    assert_eq!(arena.boot_info.0.node_count, CORES);
}
