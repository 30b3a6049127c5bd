//! Build-time configuration and board description
//!
//! The compile-time constants mirror what the kernel build system would bake
//! in for a given board; the [`Platform`] value is the loader/board contract
//! threaded through the whole boot sequence, so nothing in the boot path
//! reads ambient board state.

use crate::kernel::boot::memory::PhysRegion;

// ═══════════════════════════════════════════════════════════════════════════════
// ARCHITECTURE CONSTANTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Smallest translation granule: 4 KiB pages.
pub const PAGE_BITS: usize = 12;
pub const PAGE_SIZE: usize = 1 << PAGE_BITS;

/// The boot-info block occupies exactly one frame.
pub const BOOT_INFO_FRAME_BITS: usize = PAGE_BITS;

/// Per-core kernel stack size (16 KiB).
pub const KERNEL_STACK_BITS: usize = 14;

/// Maximum number of physical cores this build supports.
pub const MAX_CORES: usize = 4;

// ═══════════════════════════════════════════════════════════════════════════════
// BOOT-TIME CAPACITIES
// ═══════════════════════════════════════════════════════════════════════════════

/// Kernel image, device tree, user image, one mode-specific region.
pub const NUM_RESERVED_REGIONS: usize = 4;

/// Free physical regions left after the reserved set is subtracted.
pub const MAX_FREE_REGIONS: usize = 16;

/// Slots in the root capability table.
pub const ROOT_CNODE_SLOTS: usize = 4096;

/// Untyped descriptors the boot-info block can carry.
pub const MAX_UNTYPED_CAPS: usize = 230;

/// Size-class bounds for untyped carving.
pub const MIN_UNTYPED_BITS: usize = 4;
pub const MAX_UNTYPED_BITS: usize = 47;

/// Upper bound on the extra boot-info allocation (64 KiB).
pub const EXTRA_BI_MAX_SIZE_BITS: usize = 16;

/// Page tables available to the initial address-space builder.
pub const PAGE_TABLE_POOL: usize = 64;

/// Entries in an ASID pool; the initial thread gets the first valid ASID.
pub const ASID_POOL_SLOTS: usize = 512;
pub const IT_ASID: usize = 1;

// ═══════════════════════════════════════════════════════════════════════════════
// BOARD DESCRIPTION
// ═══════════════════════════════════════════════════════════════════════════════

/// Everything the loader and board hand the kernel about the machine.
///
/// One `const` instance exists per supported board; tests build their own to
/// model arbitrary memory layouts.
#[derive(Clone, Copy)]
pub struct Platform<'a> {
    /// RAM regions available to the kernel, sorted by start address.
    pub avail_regions: &'a [PhysRegion],
    /// Device (MMIO) regions the board declares, sorted by start address.
    pub device_regions: &'a [PhysRegion],
    /// Physical footprint of the kernel image, including boot-time objects.
    pub kernel_image: PhysRegion,
    /// At most one extra board/mode-specific reservation.
    pub mode_reserved: Option<PhysRegion>,
    /// Offset of the kernel window: pptr = paddr + pptr_offset.
    pub pptr_offset: usize,
    /// First physical address not covered by the kernel window.
    pub paddr_top: usize,
    /// First virtual address the initial thread must not reach.
    pub user_top: usize,
    /// Physical cores that will enter the kernel.
    pub core_count: usize,
}

impl<'a> Platform<'a> {
    /// Translate a physical address into the kernel window.
    #[inline]
    pub fn paddr_to_pptr(&self, paddr: usize) -> usize {
        paddr.wrapping_add(self.pptr_offset)
    }

    /// Inverse of [`Self::paddr_to_pptr`].
    #[inline]
    pub fn pptr_to_paddr(&self, pptr: usize) -> usize {
        pptr.wrapping_sub(self.pptr_offset)
    }

    pub fn paddr_to_pptr_region(&self, reg: PhysRegion) -> PhysRegion {
        PhysRegion::new(self.paddr_to_pptr(reg.start), self.paddr_to_pptr(reg.end))
    }
}

/// QEMU `virt` machine, 1 GiB of RAM at the canonical load address.
///
/// The kernel-image bound is refined from linker symbols at runtime on real
/// hardware; the static extent below covers the worst case.
pub const QEMU_VIRT: Platform<'static> = Platform {
    avail_regions: &[PhysRegion::new(0x4000_0000, 0x8000_0000)],
    device_regions: &[
        PhysRegion::new(0x0800_0000, 0x0802_0000), // GIC-400
        PhysRegion::new(0x0900_0000, 0x0900_1000), // PL011 UART
        PhysRegion::new(0x0a00_0000, 0x0a00_4000), // virtio-mmio
    ],
    kernel_image: PhysRegion::new(0x4000_0000, 0x4080_0000),
    mode_reserved: None,
    pptr_offset: PPTR_OFFSET,
    paddr_top: PADDR_TOP,
    user_top: USER_TOP,
    core_count: MAX_CORES,
};

/// Kernel window placement: physical memory is mapped at this offset.
pub const PPTR_OFFSET: usize = 0xFFFF_FF80_0000_0000;

/// The window covers physical addresses below this bound.
pub const PADDR_TOP: usize = 0x0000_007F_8000_0000;

/// Highest user-addressable virtual address (exclusive), leaving a guard
/// page below the canonical-range split.
pub const USER_TOP: usize = 0x0000_007F_FFFF_F000;
