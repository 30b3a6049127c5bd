//! Capability model
//!
//! A capability is an unforgeable token granting operations on one kernel
//! object. Capabilities are values stored in table slots; the kernel never
//! hands out references to them. The variant set is closed: behavior that
//! depends on the kind pattern-matches exhaustively, so a new kind is a
//! compile-time exercise, not a runtime discovery.

use crate::config::ROOT_CNODE_SLOTS;

// ═══════════════════════════════════════════════════════════════════════════════
// RIGHTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Access rights carried by memory-object capabilities.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct CapRights(u8);

impl CapRights {
    pub const NONE: CapRights = CapRights(0);
    pub const READ: CapRights = CapRights(1 << 0);
    pub const WRITE: CapRights = CapRights(1 << 1);
    pub const GRANT: CapRights = CapRights(1 << 2);

    pub const RW: CapRights = CapRights(0x03);
    pub const ALL: CapRights = CapRights(0x07);

    pub const fn has(self, rights: CapRights) -> bool {
        (self.0 & rights.0) == rights.0
    }

    pub const fn or(self, other: CapRights) -> CapRights {
        CapRights(self.0 | other.0)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CAPABILITY
// ═══════════════════════════════════════════════════════════════════════════════

/// One capability value. Addresses held in payloads are kernel-window
/// pointers for kernel objects and physical addresses for memory ranges.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Capability {
    /// The empty slot marker, and the result of every failed creation.
    Null,
    /// A table of capability slots.
    CapTable { table: usize },
    /// Authority to mint interrupt-handler capabilities.
    IrqControl,
    /// Authority to assign threads to scheduling domains.
    Domain,
    /// Authority over SMMU stream-id mappings.
    #[cfg(feature = "smmu")]
    SidControl,
    /// Authority over SMMU context banks.
    #[cfg(feature = "smmu")]
    CbControl,
    /// One SMMU-translated I/O space.
    #[cfg(feature = "smmu")]
    IoSpace { module_id: usize },
    /// Authority to issue secure monitor calls.
    #[cfg(feature = "smc")]
    Smc { badge: usize },
    /// Root of a virtual address space.
    AddressSpaceRoot { root: usize, asid: usize },
    /// A mappable physical frame.
    Frame {
        base: usize,
        size_bits: u8,
        rights: CapRights,
        device: bool,
    },
    /// Authority to create ASID pools.
    AsidControl,
    /// A pool of address-space identifiers.
    AsidPool { pool: usize },
    /// Raw memory, retypable into other objects at runtime.
    Untyped {
        base: usize,
        size_bits: u8,
        device: bool,
    },
    /// A thread control block.
    ThreadControl { tcb: usize },
    /// Authority over one core's scheduling contexts.
    #[cfg(feature = "mcs")]
    SchedControl { core: usize },
}

impl Capability {
    pub const fn is_null(&self) -> bool {
        matches!(self, Capability::Null)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ROOT TABLE FIXED SLOTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Well-known slot assignment in the root capability table. The indices are
/// stable regardless of build configuration; slots for features that are
/// compiled out simply stay Null.
pub const SLOT_NULL: usize = 0;
pub const SLOT_INIT_TCB: usize = 1;
pub const SLOT_ROOT_CNODE: usize = 2;
pub const SLOT_INIT_VSPACE: usize = 3;
pub const SLOT_IRQ_CONTROL: usize = 4;
pub const SLOT_ASID_CONTROL: usize = 5;
pub const SLOT_INIT_ASID_POOL: usize = 6;
pub const SLOT_BOOT_INFO_FRAME: usize = 7;
pub const SLOT_INIT_IPC_BUFFER: usize = 8;
pub const SLOT_DOMAIN: usize = 9;
pub const SLOT_SID_CONTROL: usize = 10;
pub const SLOT_CB_CONTROL: usize = 11;
pub const SLOT_SMC: usize = 12;
pub const NUM_FIXED_SLOTS: usize = 13;

// ═══════════════════════════════════════════════════════════════════════════════
// CAPABILITY TABLE
// ═══════════════════════════════════════════════════════════════════════════════

/// A fixed-size table of capability slots. The root table is created once
/// at boot and is the only capability container until user level derives
/// its own tables from it.
pub struct CapTable {
    slots: [Capability; ROOT_CNODE_SLOTS],
}

impl CapTable {
    pub const fn new() -> Self {
        CapTable {
            slots: [Capability::Null; ROOT_CNODE_SLOTS],
        }
    }

    /// Place a capability at a well-known index.
    pub fn write_slot(&mut self, index: usize, cap: Capability) {
        debug_assert!(self.slots[index].is_null(), "slot written twice");
        self.slots[index] = cap;
    }

    pub fn slot(&self, index: usize) -> &Capability {
        &self.slots[index]
    }

    pub const fn len(&self) -> usize {
        ROOT_CNODE_SLOTS
    }
}
