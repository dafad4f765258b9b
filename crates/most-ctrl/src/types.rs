//! Address encodings, protocol constants, and small hand-rolled bitmasks.
//!
//! Mirrors the teacher crate's `types.rs`: plain newtypes and constants, no external
//! bitflags dependency — bitmasks are hand-rolled the same way `nmt::flags` rolled
//! `FeatureFlags`.

/// A node's logical address on the ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeAddress(pub u16);

/// A node's position address, as reported in its `Signature`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PositionAddress(pub u16);

/// `node_position_address` value denoting the local INIC.
pub const C_POS_ADDR_LOCAL_INIC: u16 = 0x0400;
/// Target address Welcome/Init rewrite `C_POS_ADDR_LOCAL_INIC` to.
pub const C_ADDR_LOCAL_INIC_TARGET: u16 = 0x0001;
/// "Don't-care" node-address field value accepted by Welcome.
pub const C_ADDR_DONT_CARE: u16 = 0xFFFF;

/// Inclusive range of accepted static connection labels.
pub const STATIC_LABEL_RANGE: core::ops::RangeInclusive<u16> = 0x800C..=0x817F;

/// Returns `true` if `label` is a valid static connection label per §6 (zero means "unset").
pub fn is_valid_static_label(label: u16) -> bool {
    label == 0 || STATIC_LABEL_RANGE.contains(&label)
}

/// Signature-version value stamped on every `Hello.Get` / `Welcome.StartResult` / `Signature.Get`.
pub const SIGNATURE_VERSION: u8 = 1;

/// Retry count at which a transient error is re-classified as critical.
pub const MAX_NUM_RETRIES_IN_ERR: u8 = 0xFF;

// --- Timing constants (§6) ---
pub const ND_TIMEOUT_PERIODIC_MS: u32 = 5000;
pub const ND_TIMEOUT_WELCOME_MS: u32 = 100;
pub const ND_TIMEOUT_SIGNATURE_MS: u32 = 300;
pub const ND_TIMEOUT_DEBOUNCE_MS: u32 = 200;
pub const RTM_ROUTE_TICK_MS: u32 = 50;

// --- Scheduler priorities (§5; lower value == higher priority) ---
pub const ND_SRV_PRIO: u8 = 248;
pub const RTM_SRV_PRIO: u8 = 250;

/// Hand-rolled bitmask over the network-status change fields consumed by ND and RTM (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NetChangeMask(pub u32);

impl NetChangeMask {
    pub const NETWORK_AVAILABILITY: Self = Self(0x0002);
    pub const MAX_POSITION: Self = Self(0x0040);
    pub const FALLBACK: Self = Self(0x0004);

    pub fn empty() -> Self {
        Self(0)
    }

    pub fn contains(&self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }
}

/// Hand-rolled bitmask of latched scheduler events. Re-latching the same event before it is
/// drained coalesces, per §5's ordering guarantees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EventMask(pub u32);

impl EventMask {
    pub fn empty() -> Self {
        Self(0)
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn set(&mut self, bit: Self) {
        self.0 |= bit.0;
    }

    pub fn clear(&mut self, bit: Self) {
        self.0 &= !bit.0;
    }

    pub fn contains(&self, bit: Self) -> bool {
        (self.0 & bit.0) == bit.0
    }
}
