//! Kernel bootstrap
//!
//! The one-shot sequence that takes the loader's description of memory and
//! the user image to a running first thread. The primary core builds every
//! kernel structure; secondaries wait on [`BootSync`], do core-local setup
//! and join. Any failure anywhere converts, here and only here, into a
//! terminal halt: boot is all-or-nothing, with no partial rollback.

pub mod bootinfo;
pub mod memory;
pub mod smp;
pub mod untyped;
pub mod vspace;

use crate::arch;
use crate::config::{
    Platform, ASID_POOL_SLOTS, BOOT_INFO_FRAME_BITS, EXTRA_BI_MAX_SIZE_BITS, IT_ASID, PAGE_SIZE,
    ROOT_CNODE_SLOTS,
};
use crate::drivers::interrupts::{
    self, IRQ_REMOTE_CALL_IPI, IRQ_RESCHEDULE_IPI, KERNEL_TIMER_IRQ, NUM_IRQS,
};
use crate::drivers::{timer, uart};
use crate::kernel::capability::{self as cap, CapTable, Capability};
use crate::kernel::irq::{self, IrqState};
use crate::kernel::sched::{self, SchedulerAction};
use crate::kernel::thread::{self, Tcb};
use crate::kprintln;

use self::bootinfo::{
    calculate_extra_bi_size_bits, write_extra_bi_header, BootInfoBlock, SlotRegion,
    EXTRA_BI_DEVICE_TREE, EXTRA_BI_HEADER_SIZE, EXTRA_BI_PADDING,
};
use self::memory::{init_freemem, plan_reserved_regions, PhysRegion, VirtRegion};
pub use self::smp::BootSync;
use self::vspace::TablePool;

// ═══════════════════════════════════════════════════════════════════════════════
// ERRORS
// ═══════════════════════════════════════════════════════════════════════════════

/// Every way boot can fail. One value travels up the call chain unmodified;
/// the entry point turns it into a halt.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BootError {
    /// The reserved-region set is full.
    TooManyReservedRegions,
    /// The free-memory list is full.
    TooManyFreeRegions,
    /// A board or loader region list is malformed.
    InvalidRegionList(&'static str),
    /// The root capability table has no slot left.
    OutOfRootSlots,
    /// The boot page-table pool is empty.
    PageTablesExhausted,
    /// Device-tree end address overflowed the address type.
    DtbRegionInvalid { paddr: usize, size: usize },
    /// Device tree lies beyond the kernel window.
    DtbOutsideKernelWindow { end: usize, paddr_top: usize },
    /// Extra boot-info payloads exceed the compiled-in allocation.
    ExtraBootInfoTooLarge { size_bits: usize },
    /// The initial thread's virtual region reaches the user-address limit.
    InitialThreadRegionTooLarge { end: usize, user_top: usize },
    /// A creation call produced the Null capability.
    CapCreationFailed(&'static str),
    /// A frame-mapping operation failed.
    MappingFailed(&'static str),
    /// Required hardware is absent or misbehaving.
    PlatformInit(&'static str),
}

impl core::fmt::Display for BootError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            BootError::TooManyReservedRegions => write!(f, "reserved-region set is full"),
            BootError::TooManyFreeRegions => write!(f, "free-memory list is full"),
            BootError::InvalidRegionList(what) => write!(f, "{} region list is malformed", what),
            BootError::OutOfRootSlots => write!(f, "root capability table is out of slots"),
            BootError::PageTablesExhausted => write!(f, "boot page-table pool is exhausted"),
            BootError::DtbRegionInvalid { paddr, size } => write!(
                f,
                "device tree at {:#x} len {} overflows the address space",
                paddr, size
            ),
            BootError::DtbOutsideKernelWindow { end, paddr_top } => write!(
                f,
                "device tree end {:#x} exceeds addressable top {:#x}",
                end, paddr_top
            ),
            BootError::ExtraBootInfoTooLarge { size_bits } => write!(
                f,
                "extra boot-info needs 2^{} bytes, more than the build allows",
                size_bits
            ),
            BootError::InitialThreadRegionTooLarge { end, user_top } => write!(
                f,
                "initial thread region end {:#x} reaches user top {:#x}",
                end, user_top
            ),
            BootError::CapCreationFailed(what) => write!(f, "could not create {}", what),
            BootError::MappingFailed(why) => write!(f, "frame mapping failed: {}", why),
            BootError::PlatformInit(what) => write!(f, "platform failure: {}", what),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// LOADER CONTRACT
// ═══════════════════════════════════════════════════════════════════════════════

/// What the loader passes to every core's entry.
#[derive(Clone, Copy, Debug)]
pub struct BootArgs {
    /// Physical bounds of the user image.
    pub ui_phys_start: usize,
    pub ui_phys_end: usize,
    /// Physical-to-virtual translation of the image: vaddr = paddr - offset,
    /// in wrapping arithmetic.
    pub pv_offset: usize,
    /// Entry point of the initial thread, virtual.
    pub v_entry: usize,
    /// Device-tree blob location; size zero means none was provided.
    pub dtb_phys: usize,
    pub dtb_size: usize,
}

// ═══════════════════════════════════════════════════════════════════════════════
// BOOT ARENA
// ═══════════════════════════════════════════════════════════════════════════════

/// Gives a boot object its required frame alignment.
#[repr(C, align(4096))]
pub struct PageAligned<T>(pub T);

/// The initial thread's pool of address-space identifiers. Entry `i` holds
/// the physical address of the vspace root bound to ASID `i`, or zero.
#[repr(C, align(4096))]
pub struct AsidPool {
    pub vspace_roots: [usize; ASID_POOL_SLOTS],
}

/// Backing store for every object boot creates. Lives in kernel bss on
/// hardware; tests own their own arena, which is what lets the whole boot
/// sequence run in an ordinary process.
pub struct BootArena {
    pub root_cnode: CapTable,
    pub tables: TablePool,
    pub boot_info: PageAligned<BootInfoBlock>,
    pub extra_bi: PageAligned<[u8; 1 << EXTRA_BI_MAX_SIZE_BITS]>,
    pub ipc_buffer: PageAligned<[u8; PAGE_SIZE]>,
    pub asid_pool: AsidPool,
    pub idle_tcb: Tcb,
    pub initial_tcb: Tcb,
}

impl BootArena {
    pub const fn new() -> Self {
        BootArena {
            root_cnode: CapTable::new(),
            tables: TablePool::new(),
            boot_info: PageAligned(BootInfoBlock::new()),
            extra_bi: PageAligned([0; 1 << EXTRA_BI_MAX_SIZE_BITS]),
            ipc_buffer: PageAligned([0; PAGE_SIZE]),
            asid_pool: AsidPool {
                vspace_roots: [0; ASID_POOL_SLOTS],
            },
            idle_tcb: Tcb::new(),
            initial_tcb: Tcb::new(),
        }
    }
}

/// Hands out the dynamic slots of the root table, after the fixed ones.
pub struct SlotAlloc {
    next: usize,
}

impl SlotAlloc {
    pub fn new() -> Self {
        SlotAlloc {
            next: cap::NUM_FIXED_SLOTS,
        }
    }

    pub fn next_slot(&self) -> usize {
        self.next
    }

    /// Place `capability` in the next free slot.
    pub fn provide(
        &mut self,
        cnode: &mut CapTable,
        capability: Capability,
    ) -> Result<usize, BootError> {
        if self.next >= ROOT_CNODE_SLOTS {
            kprintln!("root capability table is full");
            return Err(BootError::OutOfRootSlots);
        }
        let slot = self.next;
        cnode.write_slot(slot, capability);
        self.next += 1;
        Ok(slot)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CPU AND PLATFORM INIT
// ═══════════════════════════════════════════════════════════════════════════════

/// Initialise the calling CPU. Touches no kernel state; every core runs
/// this exactly once, whatever its role.
pub fn init_cpu(core: usize) -> Result<(), BootError> {
    arch::activate_kernel_vspace();

    #[cfg(feature = "hyp")]
    {
        if !arch::check_tcr_el2() {
            kprintln!("EL2 translation control is not in the expected state");
            return Err(BootError::PlatformInit("EL2 translation control"));
        }
        arch::vcpu_boot_init();
    }

    #[cfg(feature = "hw_debug")]
    if !arch::init_hardware_breakpoints() {
        kprintln!("this board does not reliably support hardware breakpoints");
        return Err(BootError::PlatformInit("hardware breakpoints"));
    }

    arch::set_kernel_stack(arch::kernel_stack_top(core));
    arch::install_vectors();

    let have_hw_fpu = arch::fpsimd_hw_cap_test();
    // Leave the FPU off so unused hardware cannot become a covert channel.
    if have_hw_fpu {
        arch::disable_fpu();
    }
    #[cfg(feature = "fpu")]
    {
        if !have_hw_fpu {
            kprintln!("platform claims to have FP hardware, but does not!");
            return Err(BootError::PlatformInit("FP/SIMD missing"));
        }
        if !arch::fpsimd_init() {
            return Err(BootError::PlatformInit("FP/SIMD init"));
        }
    }

    interrupts::init_local();
    timer::init_current_core();
    Ok(())
}

/// Initialise the platform. Primary core only; no kernel state.
fn init_plat() {
    interrupts::init();
}

// ═══════════════════════════════════════════════════════════════════════════════
// CAPABILITY-SPACE BOOTSTRAP
// ═══════════════════════════════════════════════════════════════════════════════

/// Create the root capability table and seat its own capability.
fn create_root_cnode(cnode: &mut CapTable) -> Capability {
    let root_cap = Capability::CapTable {
        table: cnode as *const CapTable as usize,
    };
    cnode.write_slot(cap::SLOT_ROOT_CNODE, root_cap);
    root_cap
}

/// Seed every interrupt line's state and provide the IRQ-control cap.
fn init_irqs(plat: &Platform, cnode: &mut CapTable) {
    for line in 0..NUM_IRQS {
        irq::set_irq_state(IrqState::Inactive, 0, line);
    }
    irq::set_irq_state(IrqState::Timer, 0, KERNEL_TIMER_IRQ);

    #[cfg(feature = "hyp")]
    {
        irq::set_irq_state(IrqState::Reserved, 0, interrupts::IRQ_VGIC_MAINTENANCE);
        irq::set_irq_state(IrqState::Reserved, 0, interrupts::IRQ_VTIMER_EVENT);
    }

    // Each core activates its own IPI lines; this is core 0's pass.
    if plat.core_count > 1 {
        irq::set_irq_state(IrqState::Ipi, 0, IRQ_REMOTE_CALL_IPI);
        irq::set_irq_state(IrqState::Ipi, 0, IRQ_RESCHEDULE_IPI);
    }

    cnode.write_slot(cap::SLOT_IRQ_CONTROL, Capability::IrqControl);
}

#[cfg(feature = "smmu")]
fn init_smmu(cnode: &mut CapTable) {
    let info = crate::drivers::smmu::init();
    kprintln!(
        "SMMU: {} streams, {} context banks",
        info.num_streams,
        info.num_context_banks
    );
    cnode.write_slot(cap::SLOT_SID_CONTROL, Capability::SidControl);
    cnode.write_slot(cap::SLOT_CB_CONTROL, Capability::CbControl);
}

#[cfg(feature = "smc")]
fn init_smc(cnode: &mut CapTable) {
    let version = crate::drivers::smc::init();
    kprintln!(
        "secure monitor reports SMCCC {}.{}",
        version >> 16,
        version & 0xFFFF
    );
    cnode.write_slot(cap::SLOT_SMC, Capability::Smc { badge: 0 });
}

/// Provide one I/O-space capability per SMMU-translated stream.
#[cfg(feature = "smmu")]
fn create_io_space_caps(
    cnode: &mut CapTable,
    slots: &mut SlotAlloc,
) -> Result<SlotRegion, BootError> {
    let first = slots.next_slot();
    for module_id in 0..crate::drivers::smmu::NUM_IO_SPACES {
        slots
            .provide(cnode, Capability::IoSpace { module_id })
            .map_err(|_| BootError::CapCreationFailed("I/O space capabilities"))?;
    }
    Ok(SlotRegion::new(first, slots.next_slot()))
}

/// Create the ASID-control cap and the initial thread's ASID pool.
fn create_it_asid_pool(cnode: &mut CapTable, pool: &AsidPool) -> Capability {
    cnode.write_slot(cap::SLOT_ASID_CONTROL, Capability::AsidControl);
    let pool_cap = Capability::AsidPool {
        pool: pool as *const AsidPool as usize,
    };
    cnode.write_slot(cap::SLOT_INIT_ASID_POOL, pool_cap);
    pool_cap
}

// ═══════════════════════════════════════════════════════════════════════════════
// PRIMARY SEQUENCE
// ═══════════════════════════════════════════════════════════════════════════════

/// The full primary-core bootstrap. Fallible end to end; the caller decides
/// what a failure means.
pub fn try_init_kernel(
    plat: &Platform,
    arena: &mut BootArena,
    sync: &BootSync,
    args: &BootArgs,
) -> Result<(), BootError> {
    let BootArena {
        root_cnode,
        tables,
        boot_info,
        extra_bi,
        ipc_buffer,
        asid_pool,
        idle_tcb,
        initial_tcb,
    } = arena;

    init_cpu(0)?;
    uart::init();
    kprintln!("Bootstrapping kernel");
    init_plat();

    let ui_p_reg = PhysRegion::new(args.ui_phys_start, args.ui_phys_end);
    let ui_v_reg = VirtRegion {
        start: args.ui_phys_start.wrapping_sub(args.pv_offset),
        end: args.ui_phys_end.wrapping_sub(args.pv_offset),
    };

    // The initial thread's fixed placements, one after another.
    let ipcbuf_vptr = ui_v_reg.end;
    let bi_frame_vptr = ipcbuf_vptr + PAGE_SIZE;
    let extra_bi_frame_vptr = bi_frame_vptr + (1 << BOOT_INFO_FRAME_BITS);

    // Validate the device tree before anything is copied.
    let mut extra_bi_size = 0;
    let mut dtb_p_reg = None;
    if args.dtb_size > 0 {
        let dtb_end = args
            .dtb_phys
            .checked_add(args.dtb_size)
            .ok_or_else(|| {
                kprintln!(
                    "device tree location {:#x} len {} is invalid",
                    args.dtb_phys,
                    args.dtb_size
                );
                BootError::DtbRegionInvalid {
                    paddr: args.dtb_phys,
                    size: args.dtb_size,
                }
            })?;
        if dtb_end >= plat.paddr_top {
            kprintln!(
                "device tree [{:#x}..{:#x}) exceeds the kernel window ({:#x})",
                args.dtb_phys,
                dtb_end,
                plat.paddr_top
            );
            return Err(BootError::DtbOutsideKernelWindow {
                end: dtb_end,
                paddr_top: plat.paddr_top,
            });
        }
        extra_bi_size = EXTRA_BI_HEADER_SIZE + args.dtb_size;
        dtb_p_reg = Some(PhysRegion::new(args.dtb_phys, dtb_end));
    }

    let extra_bi_size_bits = calculate_extra_bi_size_bits(extra_bi_size);
    if extra_bi_size_bits > EXTRA_BI_MAX_SIZE_BITS {
        return Err(BootError::ExtraBootInfoTooLarge {
            size_bits: extra_bi_size_bits,
        });
    }
    let extra_bi_extent = if extra_bi_size_bits > 0 {
        1usize << extra_bi_size_bits
    } else {
        0
    };

    // The region the initial thread occupies: image, IPC buffer, boot info,
    // extra boot info.
    let it_v_reg = VirtRegion {
        start: ui_v_reg.start,
        end: extra_bi_frame_vptr + extra_bi_extent,
    };
    if it_v_reg.end >= plat.user_top {
        kprintln!(
            "initial thread region [{:#x}..{:#x}) exceeds user top ({:#x})",
            it_v_reg.start,
            it_v_reg.end,
            plat.user_top
        );
        return Err(BootError::InitialThreadRegionTooLarge {
            end: it_v_reg.end,
            user_top: plat.user_top,
        });
    }

    // Account for all physical memory before any object is created.
    let plan = plan_reserved_regions(plat, ui_p_reg, dtb_p_reg)?;
    let freemem = init_freemem(plat.avail_regions, plan.reserved.as_slice())?;

    #[cfg(feature = "debug")]
    {
        for reg in plan.reserved.as_slice() {
            kprintln!("reserved [{:#x}..{:#x})", reg.start, reg.end);
        }
        for reg in freemem.iter() {
            kprintln!("free     [{:#x}..{:#x})", reg.start, reg.end);
        }
    }

    // The root of the capability space.
    let root_cnode_cap = create_root_cnode(root_cnode);
    if root_cnode_cap.is_null() {
        kprintln!("root capability table creation failed");
        return Err(BootError::CapCreationFailed("root capability table"));
    }

    root_cnode.write_slot(cap::SLOT_DOMAIN, Capability::Domain);
    init_irqs(plat, root_cnode);

    #[cfg(feature = "smmu")]
    init_smmu(root_cnode);
    #[cfg(feature = "smc")]
    init_smc(root_cnode);

    // Fixed boot-info fields.
    let bi_pptr = boot_info as *const PageAligned<BootInfoBlock> as usize;
    let bi = &mut boot_info.0;
    bi.node_count = plat.core_count;
    bi.ipc_buf_ptr = ipcbuf_vptr;
    bi.extra_len = extra_bi_size;

    // Device-tree payload, then a padding header out to the size class.
    if let Some(dtb) = dtb_p_reg {
        let store = &mut extra_bi.0;
        write_extra_bi_header(store, 0, EXTRA_BI_DEVICE_TREE, extra_bi_size);
        let dtb_pptr = plat.paddr_to_pptr(dtb.start) as *const u8;
        // Validated above to lie inside the kernel window.
        let blob = unsafe { core::slice::from_raw_parts(dtb_pptr, args.dtb_size) };
        store[EXTRA_BI_HEADER_SIZE..extra_bi_size].copy_from_slice(blob);
        if extra_bi_extent > extra_bi_size {
            write_extra_bi_header(
                store,
                extra_bi_size,
                EXTRA_BI_PADDING,
                extra_bi_extent - extra_bi_size,
            );
        }
    }

    let mut slots = SlotAlloc::new();

    #[cfg(feature = "smmu")]
    {
        bi.io_space_caps = create_io_space_caps(root_cnode, &mut slots)?;
    }
    #[cfg(not(feature = "smmu"))]
    {
        bi.io_space_caps = SlotRegion::EMPTY;
    }

    // The initial thread's address space.
    let (it_vspace_cap, it_root) = vspace::create_it_address_space(tables, plat);
    if it_vspace_cap.is_null() {
        kprintln!("address space creation for initial thread failed");
        return Err(BootError::CapCreationFailed("initial address space"));
    }
    root_cnode.write_slot(cap::SLOT_INIT_VSPACE, it_vspace_cap);

    // Boot-info frame.
    let bi_frame_cap =
        vspace::create_mapped_frame_cap(tables, plat, it_root, bi_frame_vptr, bi_pptr)?;
    root_cnode.write_slot(cap::SLOT_BOOT_INFO_FRAME, bi_frame_cap);

    // Extra boot-info frames.
    if extra_bi_extent > 0 {
        let store_pptr = extra_bi as *const PageAligned<_> as usize;
        let store_paddr = plat.pptr_to_paddr(store_pptr);
        let extra_reg = PhysRegion::new(store_paddr, store_paddr + extra_bi_extent);
        let extra_offset = store_paddr.wrapping_sub(extra_bi_frame_vptr);
        bi.extra_bi_pages = vspace::create_frames_of_region(
            root_cnode,
            &mut slots,
            tables,
            plat,
            it_root,
            extra_reg,
            extra_offset,
        )
        .map_err(|err| {
            kprintln!("mapping extra boot info to initial thread failed");
            err
        })?;
    }

    #[cfg(feature = "mcs")]
    {
        bi.sched_control = init_sched_control(root_cnode, &mut slots, plat.core_count)?;
    }

    // The initial thread's IPC buffer.
    let ipcbuf_pptr = ipc_buffer as *const PageAligned<_> as usize;
    let ipcbuf_cap =
        vspace::create_mapped_frame_cap(tables, plat, it_root, ipcbuf_vptr, ipcbuf_pptr)
            .map_err(|_| {
                kprintln!("could not create IPC buffer for initial thread");
                BootError::CapCreationFailed("IPC buffer")
            })?;
    root_cnode.write_slot(cap::SLOT_INIT_IPC_BUFFER, ipcbuf_cap);

    // All frames of the user image.
    bi.user_image_frames = vspace::create_frames_of_region(
        root_cnode,
        &mut slots,
        tables,
        plat,
        it_root,
        ui_p_reg,
        args.pv_offset,
    )
    .map_err(|err| {
        kprintln!("could not create all user image frames");
        err
    })?;

    // ASID management for the initial address space.
    let it_ap_cap = create_it_asid_pool(root_cnode, asid_pool);
    if it_ap_cap.is_null() {
        kprintln!("could not create ASID pool for initial thread");
        return Err(BootError::CapCreationFailed("ASID pool"));
    }
    let it_vspace_root = match it_vspace_cap {
        Capability::AddressSpaceRoot { root, .. } => root,
        _ => unreachable!(),
    };
    asid_pool.vspace_roots[IT_ASID] = it_vspace_root;

    thread::configure_idle_thread(idle_tcb);

    // Page-table writes must be visible to the hardware walker before the
    // initial thread can be entered.
    arch::clean_invalidate_l1_caches();

    thread::configure_initial_thread(
        initial_tcb,
        root_cnode as *const CapTable as usize,
        it_vspace_root,
        args.v_entry,
        bi_frame_vptr,
        ipcbuf_vptr,
    );
    root_cnode.write_slot(
        cap::SLOT_INIT_TCB,
        Capability::ThreadControl {
            tcb: initial_tcb as *const Tcb as usize,
        },
    );

    sched::init_core_state(0, SchedulerAction::ResumeCurrentThread, true);

    // Whatever memory is left becomes untyped capabilities.
    let untyped_region = untyped::create_untypeds(
        root_cnode,
        &mut slots,
        bi,
        plat,
        &freemem,
        plan.reserved.as_slice(),
        plan.protected,
    )?;
    bi.untyped = untyped_region;

    // No cross-kernel shared frames on this architecture.
    bi.shared_frames = SlotRegion::EMPTY;

    // Finalise: everything after the last provided slot belongs to user level.
    bi.empty = SlotRegion::new(slots.next_slot(), ROOT_CNODE_SLOTS);

    // Publish every boot write before other cores can look.
    arch::clean_invalidate_l1_caches();
    arch::invalidate_local_tlb();

    sync.begin();
    release_secondary_cores(plat, sync);

    kprintln!("Booting all finished, dropped to user space");
    Ok(())
}

/// Per-core scheduling-control capabilities.
#[cfg(feature = "mcs")]
fn init_sched_control(
    cnode: &mut CapTable,
    slots: &mut SlotAlloc,
    cores: usize,
) -> Result<SlotRegion, BootError> {
    let first = slots.next_slot();
    for core in 0..cores {
        slots.provide(cnode, Capability::SchedControl { core })?;
    }
    Ok(SlotRegion::new(first, slots.next_slot()))
}

/// Release the secondaries, then wait until every one has joined.
fn release_secondary_cores(plat: &Platform, sync: &BootSync) {
    // Secondaries still run on the loader's cache configuration; make the
    // kernel structures visible before the flag flips.
    arch::clean_invalidate_l1_caches();
    arch::dsb();
    sync.release();
    arch::sev();

    sync.wait_for_joined(plat.core_count);
}

// ═══════════════════════════════════════════════════════════════════════════════
// SECONDARY SEQUENCE
// ═══════════════════════════════════════════════════════════════════════════════

/// A secondary core's whole boot: wait, set up locally, join.
pub fn try_init_secondary(
    plat: &Platform,
    core: usize,
    sync: &BootSync,
) -> Result<(), BootError> {
    // Nothing may be touched before the primary publishes.
    sync.wait_for_release();

    init_cpu(core)?;

    irq::mask_all_ppis(core);
    if plat.core_count > 1 {
        irq::set_irq_state(IrqState::Ipi, core, IRQ_REMOTE_CALL_IPI);
        irq::set_irq_state(IrqState::Ipi, core, IRQ_RESCHEDULE_IPI);
    }
    irq::set_irq_state(IrqState::Timer, core, KERNEL_TIMER_IRQ);
    #[cfg(feature = "hyp")]
    {
        irq::set_irq_state(IrqState::Reserved, core, interrupts::IRQ_VGIC_MAINTENANCE);
        irq::set_irq_state(IrqState::Reserved, core, interrupts::IRQ_VTIMER_EVENT);
    }

    sync.join();

    // No thread of its own; the primary's initial thread is the only
    // runnable one at this point.
    sched::init_core_state(core, SchedulerAction::ResumeCurrentThread, false);
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// ENTRY POINT
// ═══════════════════════════════════════════════════════════════════════════════

static BOOT_SYNC: BootSync = BootSync::new();
static mut BOOT_ARENA: BootArena = BootArena::new();

/// Per-core kernel entry. Dispatches to the primary or secondary sequence
/// and is the single place where a boot failure becomes terminal.
pub fn init_kernel(args: &BootArgs) -> ! {
    let core = arch::core_id();
    let plat = &crate::config::QEMU_VIRT;

    let result = if core == 0 {
        // The primary runs alone until it releases the secondaries, so the
        // exclusive arena access here cannot race.
        let arena = unsafe { &mut *core::ptr::addr_of_mut!(BOOT_ARENA) };
        try_init_kernel(plat, arena, &BOOT_SYNC, args)
    } else {
        try_init_secondary(plat, core, &BOOT_SYNC)
    };

    if let Err(err) = result {
        fail(err);
    }

    #[cfg(feature = "mcs")]
    sched::arm_quantum(core);

    sched::schedule(core);
    sched::activate_thread(core);

    // The exception return into the initial thread happens in the activate
    // path on hardware; if control ever falls through, idle.
    loop {
        arch::wfi();
    }
}

/// Terminal failure: report and halt this core forever.
pub fn fail(err: BootError) -> ! {
    kprintln!("kernel init failed: {}", err);
    arch::halt()
}
