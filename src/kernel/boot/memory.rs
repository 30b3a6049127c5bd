//! Physical-memory planning
//!
//! Builds the bounded reserved-region set from the loader's inputs and
//! subtracts it from the board's available memory to produce the free list
//! the untyped carver consumes. Everything here is arithmetic over
//! half-open `[start, end)` intervals of physical addresses.

use super::BootError;
use crate::config::{Platform, MAX_FREE_REGIONS, NUM_RESERVED_REGIONS};
use crate::kprintln;
use heapless::Vec;

// ═══════════════════════════════════════════════════════════════════════════════
// REGIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// A half-open interval of physical addresses.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct PhysRegion {
    pub start: usize,
    pub end: usize,
}

impl PhysRegion {
    pub const fn new(start: usize, end: usize) -> Self {
        debug_assert!(start <= end);
        PhysRegion { start, end }
    }

    pub const fn empty() -> Self {
        PhysRegion { start: 0, end: 0 }
    }

    pub const fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub const fn len(&self) -> usize {
        self.end - self.start
    }

    pub const fn contains(&self, other: &PhysRegion) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    pub const fn overlaps(&self, other: &PhysRegion) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// A half-open interval of virtual addresses.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct VirtRegion {
    pub start: usize,
    pub end: usize,
}

// ═══════════════════════════════════════════════════════════════════════════════
// RESERVED SET
// ═══════════════════════════════════════════════════════════════════════════════

/// The bounded, ordered set of regions withheld from reuse.
///
/// Capacity is fixed at compile time; exceeding it fails the boot instead
/// of silently dropping a reservation.
pub struct ReservedRegions {
    regions: Vec<PhysRegion, NUM_RESERVED_REGIONS>,
}

impl ReservedRegions {
    pub const fn new() -> Self {
        ReservedRegions {
            regions: Vec::new(),
        }
    }

    /// Append a region; the caller appends in ascending start order.
    pub fn push(&mut self, region: PhysRegion) -> Result<(), BootError> {
        self.regions.push(region).map_err(|_| {
            kprintln!("no slot to add {:#x?} to the reserved regions", region);
            BootError::TooManyReservedRegions
        })
    }

    pub fn as_slice(&self) -> &[PhysRegion] {
        &self.regions
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

/// Physical memory not covered by any reservation, ordered by address.
pub type FreeMemory = Vec<PhysRegion, MAX_FREE_REGIONS>;

// ═══════════════════════════════════════════════════════════════════════════════
// PLANNING
// ═══════════════════════════════════════════════════════════════════════════════

/// Outcome of reserved-region planning.
pub struct ReservedPlan {
    pub reserved: ReservedRegions,
    /// A user image whose physical end lies outside the kernel window can
    /// not enter the reserved set, but must still never be handed out as
    /// device memory.
    pub protected: Option<PhysRegion>,
}

/// Build the reserved set: kernel image, device tree (if any), then the
/// user image and the mode-specific reservation in ascending start order.
pub fn plan_reserved_regions(
    plat: &Platform,
    ui_p_reg: PhysRegion,
    dtb_p_reg: Option<PhysRegion>,
) -> Result<ReservedPlan, BootError> {
    let mut reserved = ReservedRegions::new();
    let mut protected = None;

    reserved.push(plat.kernel_image)?;

    if let Some(dtb) = dtb_p_reg {
        if !dtb.is_empty() {
            reserved.push(dtb)?;
        }
    }

    if ui_p_reg.start < plat.paddr_top {
        match plat.mode_reserved {
            Some(mode) if ui_p_reg.end > mode.start => {
                reserved.push(mode)?;
                reserved.push(ui_p_reg)?;
            }
            Some(mode) => {
                reserved.push(ui_p_reg)?;
                reserved.push(mode)?;
            }
            None => reserved.push(ui_p_reg)?,
        }
    } else {
        if let Some(mode) = plat.mode_reserved {
            reserved.push(mode)?;
        }
        // Out of the window's reach, so it cannot be accounted as free
        // memory, but it must not resurface as a device untyped either.
        protected = Some(ui_p_reg);
    }

    Ok(ReservedPlan {
        reserved,
        protected,
    })
}

/// Check a region list is made of well-formed, disjoint, ascending entries.
fn check_region_list(regions: &[PhysRegion], what: &'static str) -> Result<(), BootError> {
    let mut prev_end = 0;
    for (i, reg) in regions.iter().enumerate() {
        if reg.start > reg.end || (i > 0 && reg.start < prev_end) {
            kprintln!("{} region list malformed at entry {}: {:#x?}", what, i, reg);
            return Err(BootError::InvalidRegionList(what));
        }
        prev_end = reg.end;
    }
    Ok(())
}

/// Subtract `cuts` (sorted, disjoint) from `region`, emitting what is left.
pub(crate) fn subtract_region(
    region: PhysRegion,
    cuts: &[PhysRegion],
    mut emit: impl FnMut(PhysRegion) -> Result<(), BootError>,
) -> Result<(), BootError> {
    let mut cursor = region.start;
    for cut in cuts {
        if cut.end <= cursor || cut.start >= region.end {
            continue;
        }
        if cut.start > cursor {
            emit(PhysRegion::new(cursor, cut.start))?;
        }
        cursor = cursor.max(cut.end);
    }
    if cursor < region.end {
        emit(PhysRegion::new(cursor, region.end))?;
    }
    Ok(())
}

/// Compute the free-memory list: available memory minus the reserved set.
pub fn init_freemem(
    avail: &[PhysRegion],
    reserved: &[PhysRegion],
) -> Result<FreeMemory, BootError> {
    check_region_list(avail, "available")?;
    check_region_list(reserved, "reserved")?;

    let mut free = FreeMemory::new();
    for region in avail {
        subtract_region(*region, reserved, |left| {
            free.push(left).map_err(|_| {
                kprintln!("too many free memory regions");
                BootError::TooManyFreeRegions
            })
        })?;
    }
    Ok(free)
}

// ═══════════════════════════════════════════════════════════════════════════════
// UNIT TESTS
// ═══════════════════════════════════════════════════════════════════════════════
