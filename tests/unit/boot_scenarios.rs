//! End-to-end boot scenarios on a single core

use crate::{image_args, new_arena, test_platform, AVAIL, DEVICES, KERNEL_IMG};
use corten_kernel::config::{Platform, PAGE_SIZE};
use corten_kernel::kernel::boot::bootinfo::SlotRegion;
use corten_kernel::kernel::boot::memory::{init_freemem, plan_reserved_regions, PhysRegion};
use corten_kernel::kernel::boot::smp::BootSync;
use corten_kernel::kernel::boot::vspace::lookup_frame;
use corten_kernel::kernel::boot::{try_init_kernel, BootError};
use corten_kernel::kernel::capability::{self as cap, Capability};

#[test]
fn single_core_boot_succeeds() {
    let _guard = crate::BOOT_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let plat = test_platform(1);
    let mut arena = new_arena();
    let sync = BootSync::new();

    try_init_kernel(&plat, &mut arena, &sync, &image_args()).unwrap();

    let bi = &arena.boot_info.0;
    assert_eq!(bi.node_count, 1);

    // No device tree: the extra boot-info region is empty.
    assert_eq!(bi.extra_len, 0);
    assert!(bi.extra_bi_pages.is_empty());

    // One frame capability for each of the 256 user-image pages.
    assert_eq!(bi.user_image_frames.len(), 0x10_0000 / PAGE_SIZE);

    // The I/O-space range is populated only on SMMU builds.
    #[cfg(not(feature = "smmu"))]
    assert_eq!(bi.io_space_caps, SlotRegion::EMPTY);
    #[cfg(feature = "smmu")]
    assert!(!bi.io_space_caps.is_empty());
    assert_eq!(bi.shared_frames, SlotRegion::EMPTY);

    // The IPC buffer sits directly after the image, the boot-info frame
    // after that.
    assert_eq!(bi.ipc_buf_ptr, 0x20_0000);
}

#[test]
fn boot_populates_fixed_slots() {
    let _guard = crate::BOOT_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let plat = test_platform(1);
    let mut arena = new_arena();
    try_init_kernel(&plat, &mut arena, &BootSync::new(), &image_args()).unwrap();

    let cnode = &arena.root_cnode;
    assert!(matches!(
        cnode.slot(cap::SLOT_ROOT_CNODE),
        Capability::CapTable { .. }
    ));
    assert_eq!(*cnode.slot(cap::SLOT_IRQ_CONTROL), Capability::IrqControl);
    assert_eq!(*cnode.slot(cap::SLOT_DOMAIN), Capability::Domain);
    assert_eq!(*cnode.slot(cap::SLOT_ASID_CONTROL), Capability::AsidControl);
    assert!(matches!(
        cnode.slot(cap::SLOT_INIT_ASID_POOL),
        Capability::AsidPool { .. }
    ));
    assert!(matches!(
        cnode.slot(cap::SLOT_INIT_VSPACE),
        Capability::AddressSpaceRoot { .. }
    ));
    assert!(matches!(
        cnode.slot(cap::SLOT_BOOT_INFO_FRAME),
        Capability::Frame { .. }
    ));
    assert!(matches!(
        cnode.slot(cap::SLOT_INIT_IPC_BUFFER),
        Capability::Frame { .. }
    ));
    assert!(matches!(
        cnode.slot(cap::SLOT_INIT_TCB),
        Capability::ThreadControl { .. }
    ));
    #[cfg(feature = "smmu")]
    {
        assert_eq!(*cnode.slot(cap::SLOT_SID_CONTROL), Capability::SidControl);
        assert_eq!(*cnode.slot(cap::SLOT_CB_CONTROL), Capability::CbControl);
    }
    #[cfg(feature = "smc")]
    assert!(matches!(cnode.slot(cap::SLOT_SMC), Capability::Smc { .. }));
    #[cfg(feature = "mcs")]
    assert_eq!(arena.boot_info.0.sched_control.len(), 1);

    // The first user-image frame capability covers the image start.
    let bi = &arena.boot_info.0;
    match cnode.slot(bi.user_image_frames.start) {
        Capability::Frame { base, .. } => assert_eq!(*base, 0x10_0000),
        other => panic!("expected a frame capability, found {:?}", other),
    }

    // Everything past the last provided slot is reported free.
    assert_eq!(bi.empty.end, cnode.len());
    assert!(bi.empty.start >= bi.untyped.end);
}

#[test]
fn boot_maps_the_initial_region() {
    let _guard = crate::BOOT_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let plat = test_platform(1);
    let mut arena = new_arena();
    try_init_kernel(&plat, &mut arena, &BootSync::new(), &image_args()).unwrap();

    // The address-space root is the first table the pool handed out.
    let root = 0;
    // User image is mapped at its physical address (offset zero).
    assert_eq!(
        lookup_frame(&arena.tables, &plat, root, 0x10_0000),
        Some(0x10_0000)
    );
    assert_eq!(
        lookup_frame(&arena.tables, &plat, root, 0x1F_F000),
        Some(0x1F_F000)
    );
    // The IPC buffer and boot-info frames are kernel objects.
    let ipcbuf_paddr = &arena.ipc_buffer.0 as *const _ as usize;
    let bi_paddr = &arena.boot_info.0 as *const _ as usize;
    assert_eq!(
        lookup_frame(&arena.tables, &plat, root, 0x20_0000),
        Some(ipcbuf_paddr)
    );
    assert_eq!(
        lookup_frame(&arena.tables, &plat, root, 0x20_1000),
        Some(bi_paddr)
    );
    // Nothing is mapped past the initial region.
    assert_eq!(lookup_frame(&arena.tables, &plat, root, 0x20_2000), None);
}

#[test]
fn untypeds_cover_leftover_memory_exactly() {
    let _guard = crate::BOOT_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let plat = test_platform(1);
    let mut arena = new_arena();
    try_init_kernel(&plat, &mut arena, &BootSync::new(), &image_args()).unwrap();

    let bi = &arena.boot_info.0;
    let args = image_args();
    let ui = PhysRegion::new(args.ui_phys_start, args.ui_phys_end);

    let mut ram_total = 0usize;
    for i in 0..bi.untyped.len() {
        let desc = &bi.untyped_list[i];
        let block = PhysRegion::new(desc.paddr, desc.paddr + (1 << desc.size_bits));
        // Power-of-two aligned to its own size.
        assert_eq!(desc.paddr % (1 << desc.size_bits), 0);
        // Never overlapping what boot reserved.
        assert!(!block.overlaps(&ui), "untyped overlaps the user image");
        assert!(!block.overlaps(&KERNEL_IMG), "untyped overlaps the kernel");
        if desc.is_device {
            assert!(DEVICES.iter().any(|d| d.contains(&block)));
        } else {
            assert!(AVAIL.iter().any(|a| a.contains(&block)));
            ram_total += block.len();
        }
    }

    // RAM untypeds account for every free byte.
    let plan = plan_reserved_regions(&plat, ui, None).unwrap();
    let freemem = init_freemem(plat.avail_regions, plan.reserved.as_slice()).unwrap();
    let free_total: usize = freemem.iter().map(|r| r.len()).sum();
    assert_eq!(ram_total, free_total);
}

#[test]
fn reserved_set_is_disjoint_and_within_available_memory() {
    let plat = test_platform(1);
    let args = image_args();
    let ui = PhysRegion::new(args.ui_phys_start, args.ui_phys_end);

    let plan = plan_reserved_regions(&plat, ui, None).unwrap();
    let regions = plan.reserved.as_slice();
    for (i, a) in regions.iter().enumerate() {
        for b in &regions[i + 1..] {
            assert!(!a.overlaps(b), "{:#x?} overlaps {:#x?}", a, b);
        }
        assert!(
            plat.avail_regions.iter().any(|avail| avail.contains(a)),
            "{:#x?} is not backed by available memory",
            a
        );
    }
}

#[test]
fn oversized_initial_region_fails_before_any_capability() {
    let _guard = crate::BOOT_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let plat = Platform {
        user_top: 0x20_0000,
        ..test_platform(1)
    };
    let mut arena = new_arena();

    let err = try_init_kernel(&plat, &mut arena, &BootSync::new(), &image_args());
    assert!(matches!(
        err,
        Err(BootError::InitialThreadRegionTooLarge { .. })
    ));

    // Nothing was created.
    assert!(arena.root_cnode.slot(cap::SLOT_ROOT_CNODE).is_null());
    assert!(arena.root_cnode.slot(cap::SLOT_IRQ_CONTROL).is_null());
    assert_eq!(arena.tables.tables_used(), 0);
}
