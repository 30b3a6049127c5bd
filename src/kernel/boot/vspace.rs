//! Initial address-space construction
//!
//! AArch64 VMSA translation tables, 4 KiB granule, four levels. The boot
//! path owns a fixed pool of tables; the initial thread's address space is
//! the only one ever built here, so the pool never frees.

use super::memory::PhysRegion;
use super::{BootError, SlotAlloc};
use crate::config::{Platform, IT_ASID, PAGE_BITS, PAGE_SIZE, PAGE_TABLE_POOL};
use crate::kernel::capability::{CapRights, CapTable, Capability};
use crate::kernel::boot::bootinfo::SlotRegion;
use crate::kprintln;

// ═══════════════════════════════════════════════════════════════════════════════
// TRANSLATION TABLE ENTRIES
// ═══════════════════════════════════════════════════════════════════════════════

/// A 64-bit translation-table descriptor.
#[derive(Clone, Copy, Debug)]
#[repr(transparent)]
pub struct PageTableEntry(u64);

impl PageTableEntry {
    pub const fn new() -> Self {
        Self(0)
    }

    pub fn is_valid(&self) -> bool {
        self.0 & EntryFlags::VALID.bits() != 0
    }

    /// Output address: attributes below bit 12 and above bit 47 masked off.
    pub fn address(&self) -> u64 {
        self.0 & 0x0000_FFFF_FFFF_F000
    }

    pub fn flags(&self) -> u64 {
        self.0 & !0x0000_FFFF_FFFF_F000
    }

    pub fn set(&mut self, addr: u64, flags: EntryFlags) {
        debug_assert!(addr & 0xFFF == 0, "descriptor address must be page aligned");
        self.0 = addr | flags.bits();
    }
}

/// Descriptor attribute bits.
#[derive(Clone, Copy, Debug)]
pub struct EntryFlags(u64);

impl EntryFlags {
    pub const VALID: Self = Self(1 << 0);
    /// Table descriptor; doubles as the page bit at level 3.
    pub const TABLE: Self = Self(1 << 1);

    // MAIR indices
    pub const ATTR_DEVICE: Self = Self(0 << 2);
    pub const ATTR_NORMAL: Self = Self(1 << 2);

    // Access permissions
    pub const AP_RW_EL1: Self = Self(0 << 6);
    pub const AP_RW_USER: Self = Self(1 << 6);

    // Shareability
    pub const SH_INNER: Self = Self(3 << 8);

    /// Access flag; must be set or the first access faults.
    pub const AF: Self = Self(1 << 10);

    /// Privileged execute-never: user frames are not kernel code.
    pub const PXN: Self = Self(1 << 53);

    pub const fn bits(&self) -> u64 {
        self.0
    }
}

impl core::ops::BitOr for EntryFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// One translation table: 512 descriptors, naturally aligned.
#[derive(Clone, Copy)]
#[repr(C, align(4096))]
pub struct PageTable {
    pub entries: [PageTableEntry; 512],
}

impl PageTable {
    pub const EMPTY: PageTable = PageTable {
        entries: [PageTableEntry::new(); 512],
    };
}

// ═══════════════════════════════════════════════════════════════════════════════
// TABLE POOL
// ═══════════════════════════════════════════════════════════════════════════════

/// The fixed stock of translation tables available during boot.
pub struct TablePool {
    tables: [PageTable; PAGE_TABLE_POOL],
    used: usize,
}

impl TablePool {
    pub const fn new() -> Self {
        TablePool {
            tables: [PageTable::EMPTY; PAGE_TABLE_POOL],
            used: 0,
        }
    }

    fn alloc(&mut self) -> Option<usize> {
        if self.used == PAGE_TABLE_POOL {
            return None;
        }
        let index = self.used;
        self.used += 1;
        self.tables[index] = PageTable::EMPTY;
        Some(index)
    }

    /// Physical address of a pool table, as the hardware walker will see it.
    fn paddr_of(&self, plat: &Platform, index: usize) -> usize {
        let pptr = &self.tables[index] as *const PageTable as usize;
        plat.pptr_to_paddr(pptr)
    }

    fn index_by_paddr(&self, plat: &Platform, paddr: usize) -> Option<usize> {
        (0..self.used).find(|&i| self.paddr_of(plat, i) == paddr)
    }

    pub fn tables_used(&self) -> usize {
        self.used
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// MAPPING
// ═══════════════════════════════════════════════════════════════════════════════

fn level_index(vptr: usize, level: usize) -> usize {
    (vptr >> (PAGE_BITS + 9 * (3 - level))) & 0x1FF
}

/// Descend one level, allocating the next table on first touch.
fn next_level(
    pool: &mut TablePool,
    plat: &Platform,
    table: usize,
    slot: usize,
) -> Result<usize, BootError> {
    let entry = pool.tables[table].entries[slot];
    if entry.is_valid() {
        pool.index_by_paddr(plat, entry.address() as usize)
            .ok_or(BootError::MappingFailed("descriptor outside the boot pool"))
    } else {
        let next = pool.alloc().ok_or_else(|| {
            kprintln!("out of boot page tables");
            BootError::PageTablesExhausted
        })?;
        let paddr = pool.paddr_of(plat, next) as u64;
        pool.tables[table].entries[slot].set(paddr, EntryFlags::VALID | EntryFlags::TABLE);
        Ok(next)
    }
}

/// Map one 4 KiB frame into the initial address space.
pub fn map_frame(
    pool: &mut TablePool,
    plat: &Platform,
    root: usize,
    vptr: usize,
    paddr: usize,
    attrs: EntryFlags,
) -> Result<(), BootError> {
    if vptr % PAGE_SIZE != 0 || paddr % PAGE_SIZE != 0 {
        return Err(BootError::MappingFailed("address not page aligned"));
    }

    let l1 = next_level(pool, plat, root, level_index(vptr, 0))?;
    let l2 = next_level(pool, plat, l1, level_index(vptr, 1))?;
    let l3 = next_level(pool, plat, l2, level_index(vptr, 2))?;

    let leaf = &mut pool.tables[l3].entries[level_index(vptr, 3)];
    if leaf.is_valid() {
        return Err(BootError::MappingFailed("frame already mapped"));
    }
    leaf.set(
        paddr as u64,
        attrs | EntryFlags::VALID | EntryFlags::TABLE | EntryFlags::AF,
    );
    Ok(())
}

/// Translate a virtual address through the boot-built tables. Test and
/// diagnostic aid; the hardware walker is the real consumer.
pub fn lookup_frame(
    pool: &TablePool,
    plat: &Platform,
    root: usize,
    vptr: usize,
) -> Option<usize> {
    let mut table = root;
    for level in 0..3 {
        let entry = pool.tables[table].entries[level_index(vptr, level)];
        if !entry.is_valid() {
            return None;
        }
        table = pool.index_by_paddr(plat, entry.address() as usize)?;
    }
    let leaf = pool.tables[table].entries[level_index(vptr, 3)];
    leaf.is_valid().then(|| leaf.address() as usize)
}

/// Attributes for frames the initial thread can read and write.
pub fn user_data_attrs() -> EntryFlags {
    EntryFlags::ATTR_NORMAL | EntryFlags::AP_RW_USER | EntryFlags::SH_INNER | EntryFlags::PXN
}

// ═══════════════════════════════════════════════════════════════════════════════
// ADDRESS-SPACE AND FRAME CAPABILITIES
// ═══════════════════════════════════════════════════════════════════════════════

/// Create the initial thread's address-space root.
///
/// Returns the capability and the root's pool index for the mappings that
/// follow.
pub fn create_it_address_space(
    pool: &mut TablePool,
    plat: &Platform,
) -> (Capability, usize) {
    match pool.alloc() {
        Some(root) => {
            let cap = Capability::AddressSpaceRoot {
                root: pool.paddr_of(plat, root),
                asid: IT_ASID,
            };
            (cap, root)
        }
        None => (Capability::Null, 0),
    }
}

/// Map one kernel-owned frame at `vptr` and return its capability.
pub fn create_mapped_frame_cap(
    pool: &mut TablePool,
    plat: &Platform,
    root: usize,
    vptr: usize,
    frame_pptr: usize,
) -> Result<Capability, BootError> {
    let paddr = plat.pptr_to_paddr(frame_pptr);
    map_frame(pool, plat, root, vptr, paddr, user_data_attrs())?;
    Ok(Capability::Frame {
        base: paddr,
        size_bits: PAGE_BITS as u8,
        rights: CapRights::RW,
        device: false,
    })
}

/// Create and map frame capabilities for every page of a physical region.
///
/// `pv_offset` is the translation from physical to virtual placement:
/// `vptr = paddr - pv_offset`, in wrapping arithmetic, matching the offset
/// the loader reported for the user image.
pub fn create_frames_of_region(
    cnode: &mut CapTable,
    slots: &mut SlotAlloc,
    pool: &mut TablePool,
    plat: &Platform,
    root: usize,
    reg: PhysRegion,
    pv_offset: usize,
) -> Result<SlotRegion, BootError> {
    debug_assert!(reg.start % PAGE_SIZE == 0 && reg.end % PAGE_SIZE == 0);
    let first = slots.next_slot();

    let mut paddr = reg.start;
    while paddr < reg.end {
        let vptr = paddr.wrapping_sub(pv_offset);
        map_frame(pool, plat, root, vptr, paddr, user_data_attrs())?;
        slots.provide(
            cnode,
            Capability::Frame {
                base: paddr,
                size_bits: PAGE_BITS as u8,
                rights: CapRights::RW,
                device: false,
            },
        )?;
        paddr += PAGE_SIZE;
    }

    Ok(SlotRegion::new(first, slots.next_slot()))
}

// ═══════════════════════════════════════════════════════════════════════════════
// UNIT TESTS
// ═══════════════════════════════════════════════════════════════════════════════
