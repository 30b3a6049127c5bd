//! Untyped carving
//!
//! Partitions every leftover physical region into power-of-two-sized,
//! power-of-two-aligned untyped capabilities: repeatedly take the largest
//! aligned block that fits, then recurse on the remainder. Boot-time only;
//! there is no reuse and no merging.

use super::bootinfo::{BootInfoBlock, SlotRegion, UntypedDesc};
use super::memory::{subtract_region, FreeMemory, PhysRegion};
use super::{BootError, SlotAlloc};
use crate::config::{Platform, MAX_UNTYPED_CAPS, MAX_UNTYPED_BITS, MIN_UNTYPED_BITS, NUM_RESERVED_REGIONS};
use crate::kernel::capability::{CapTable, Capability};
use crate::kprintln;
use heapless::Vec;

/// Largest power-of-two block that starts at `start` and fits in `len`.
fn boot_block_bits(start: usize, len: usize) -> usize {
    let mut bits = usize::BITS as usize - 1 - len.leading_zeros() as usize;
    if start != 0 {
        bits = bits.min(start.trailing_zeros() as usize);
    }
    bits.min(MAX_UNTYPED_BITS)
}

/// Carve one region into untyped capabilities.
///
/// Chunks below the minimum size class are dropped; a full descriptor list
/// stops carving with a diagnostic rather than failing the boot.
fn carve_region(
    cnode: &mut CapTable,
    slots: &mut SlotAlloc,
    bi: &mut BootInfoBlock,
    count: &mut usize,
    region: PhysRegion,
    is_device: bool,
) -> Result<(), BootError> {
    let mut start = region.start;
    while start < region.end {
        let bits = boot_block_bits(start, region.end - start);
        if bits >= MIN_UNTYPED_BITS {
            if *count == MAX_UNTYPED_CAPS {
                kprintln!(
                    "leaving {} bytes of {} memory unclaimed, untyped list is full",
                    region.end - start,
                    if is_device { "device" } else { "boot" },
                );
                return Ok(());
            }
            slots.provide(
                cnode,
                Capability::Untyped {
                    base: start,
                    size_bits: bits as u8,
                    device: is_device,
                },
            )?;
            bi.untyped_list[*count] = UntypedDesc {
                paddr: start,
                size_bits: bits as u8,
                is_device,
            };
            *count += 1;
        }
        start += 1 << bits;
    }
    Ok(())
}

/// Create all untyped capabilities: device memory first, then free RAM.
///
/// Device regions are filtered against the reserved set and the protected
/// user image so reserved memory can never resurface as a device untyped.
pub fn create_untypeds(
    cnode: &mut CapTable,
    slots: &mut SlotAlloc,
    bi: &mut BootInfoBlock,
    plat: &Platform,
    freemem: &FreeMemory,
    reserved: &[PhysRegion],
    protected: Option<PhysRegion>,
) -> Result<SlotRegion, BootError> {
    let first = slots.next_slot();
    let mut count = 0;

    // Reserved regions plus the protected image, re-sorted for subtraction.
    let mut cuts: Vec<PhysRegion, { NUM_RESERVED_REGIONS + 1 }> = Vec::new();
    for reg in reserved {
        cuts.push(*reg).map_err(|_| BootError::TooManyReservedRegions)?;
    }
    if let Some(prot) = protected {
        cuts.push(prot).map_err(|_| BootError::TooManyReservedRegions)?;
    }
    cuts.sort_unstable_by_key(|r| r.start);

    for device in plat.device_regions {
        subtract_region(*device, &cuts, |reg| {
            carve_region(cnode, slots, bi, &mut count, reg, true)
        })?;
    }

    for region in freemem.iter() {
        carve_region(cnode, slots, bi, &mut count, *region, false)?;
    }

    Ok(SlotRegion::new(first, slots.next_slot()))
}

// ═══════════════════════════════════════════════════════════════════════════════
// UNIT TESTS
// ═══════════════════════════════════════════════════════════════════════════════
