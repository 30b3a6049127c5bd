//! Device-tree handling and the extra boot-info wire format

use crate::{new_arena, test_platform};
use corten_kernel::config::{Platform, PAGE_SIZE};
use corten_kernel::kernel::boot::bootinfo::{
    ExtraBiWalker, EXTRA_BI_DEVICE_TREE, EXTRA_BI_HEADER_SIZE, EXTRA_BI_PADDING,
};
use corten_kernel::kernel::boot::memory::PhysRegion;
use corten_kernel::kernel::boot::smp::BootSync;
use corten_kernel::kernel::boot::{try_init_kernel, BootArgs, BootError};

fn align_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}

/// A boot over simulated RAM: one heap buffer plays physical memory so the
/// device-tree copy reads real bytes.
struct SimulatedRam {
    backing: Vec<u8>,
    base: usize,
}

impl SimulatedRam {
    fn new(size: usize) -> Self {
        let backing = vec![0u8; size + PAGE_SIZE];
        let base = align_up(backing.as_ptr() as usize, PAGE_SIZE);
        SimulatedRam { backing, base }
    }

    fn write(&mut self, paddr: usize, bytes: &[u8]) {
        let offset = paddr - self.backing.as_ptr() as usize;
        self.backing[offset..offset + bytes.len()].copy_from_slice(bytes);
    }
}

#[test]
fn device_tree_is_embedded_and_walkable() {
    let _guard = crate::BOOT_LOCK.lock().unwrap_or_else(|e| e.into_inner());

    let mut ram = SimulatedRam::new(0x30_0000);
    let base = ram.base;
    let dtb_size = 0x1000;
    let dtb_phys = base + 0x8_0000;
    let blob: Vec<u8> = (0..dtb_size).map(|i| (i * 7 + 3) as u8).collect();
    ram.write(dtb_phys, &blob);

    let avail = [PhysRegion::new(base, base + 0x30_0000)];
    let plat = Platform {
        avail_regions: &avail,
        kernel_image: PhysRegion::new(base, base + 0x8_0000),
        ..test_platform(1)
    };
    let args = BootArgs {
        ui_phys_start: base + 0x10_0000,
        ui_phys_end: base + 0x20_0000,
        pv_offset: base, // image linked at 0x100000
        v_entry: 0x10_0040,
        dtb_phys,
        dtb_size,
    };

    let mut arena = new_arena();
    try_init_kernel(&plat, &mut arena, &BootSync::new(), &args).unwrap();

    let bi = &arena.boot_info.0;
    assert_eq!(bi.extra_len, EXTRA_BI_HEADER_SIZE + dtb_size);

    // 0x1010 bytes round up to the 8 KiB frame class: two pages mapped.
    let extent = 0x2000;
    assert_eq!(bi.extra_bi_pages.len(), extent / PAGE_SIZE);

    // Walking the sequence reproduces the blob, then one padding record
    // out to the allocated extent, and nothing else.
    let mut walker = ExtraBiWalker::new(&arena.extra_bi.0[..extent]);
    let (id, payload) = walker.next().unwrap();
    assert_eq!(id, EXTRA_BI_DEVICE_TREE);
    assert_eq!(payload, &blob[..]);

    let (id, payload) = walker.next().unwrap();
    assert_eq!(id, EXTRA_BI_PADDING);
    assert_eq!(payload.len(), extent - bi.extra_len - EXTRA_BI_HEADER_SIZE);
    assert!(walker.next().is_none());

    // Consumed lengths sum to the extent exactly.
    let consumed: usize = ExtraBiWalker::new(&arena.extra_bi.0[..extent])
        .map(|(_, payload)| EXTRA_BI_HEADER_SIZE + payload.len())
        .sum();
    assert_eq!(consumed, extent);
}

#[test]
fn overflowing_device_tree_end_fails_without_copying() {
    let _guard = crate::BOOT_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let plat = test_platform(1);
    let mut arena = new_arena();

    let args = BootArgs {
        dtb_phys: usize::MAX - 0x10,
        dtb_size: 0x100,
        ..crate::image_args()
    };
    let err = try_init_kernel(&plat, &mut arena, &BootSync::new(), &args);
    assert!(matches!(err, Err(BootError::DtbRegionInvalid { .. })));
    assert!(arena.extra_bi.0[..64].iter().all(|&b| b == 0));
}

#[test]
fn device_tree_beyond_addressable_top_is_rejected() {
    let _guard = crate::BOOT_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let plat = Platform {
        paddr_top: 0x100_0000,
        ..test_platform(1)
    };
    let mut arena = new_arena();

    let args = BootArgs {
        dtb_phys: 0x200_0000,
        dtb_size: 0x1000,
        ..crate::image_args()
    };
    let err = try_init_kernel(&plat, &mut arena, &BootSync::new(), &args);
    assert!(matches!(err, Err(BootError::DtbOutsideKernelWindow { .. })));
    assert!(arena.extra_bi.0[..64].iter().all(|&b| b == 0));
}
