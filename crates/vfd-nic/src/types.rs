//! Identifiers and value types passed across the NIC control interface.

use std::fmt;
use vfd_types::LinkState;

/// Logical port number of a physical function, as assigned by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PortId(pub u16);

impl PortId {
    pub const fn new(id: u16) -> Self {
        Self(id)
    }

    pub const fn as_u16(self) -> u16 {
        self.0
    }
}

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Hardware VF number on a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VfId(pub u16);

impl VfId {
    pub const fn new(id: u16) -> Self {
        Self(id)
    }

    pub const fn as_u16(self) -> u16 {
        self.0
    }
}

impl fmt::Display for VfId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Bit set of VFs a filter applies to. Bit `n` selects VF `n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct VfMask(u64);

impl VfMask {
    pub const EMPTY: VfMask = VfMask(0);

    /// Creates a mask selecting a single VF.
    pub fn single(vf: VfId) -> Self {
        Self(1u64 << (vf.0 as u32 % 64))
    }

    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u64 {
        self.0
    }

    pub fn contains(self, vf: VfId) -> bool {
        self.0 & Self::single(vf).0 != 0
    }

    pub fn insert(&mut self, vf: VfId) {
        self.0 |= Self::single(vf).0;
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for VfMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

/// Which traffic classes a VF may receive beyond its own unicast filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AllowFlags {
    pub broadcast: bool,
    pub multicast: bool,
    pub unknown_unicast: bool,
}

/// Counters and link state for a physical function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortStats {
    pub link: LinkState,
    pub rx_packets: u64,
    pub tx_packets: u64,
    pub rx_bytes: u64,
    pub tx_bytes: u64,
    pub rx_errors: u64,
    pub tx_errors: u64,
    pub rx_dropped: u64,
}

impl Default for PortStats {
    fn default() -> Self {
        Self {
            link: LinkState::DOWN,
            rx_packets: 0,
            tx_packets: 0,
            rx_bytes: 0,
            tx_bytes: 0,
            rx_errors: 0,
            tx_errors: 0,
            rx_dropped: 0,
        }
    }
}

/// Counters for one virtual function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VfStats {
    pub rx_packets: u64,
    pub tx_packets: u64,
    pub rx_bytes: u64,
    pub tx_bytes: u64,
    pub rx_errors: u64,
    pub tx_errors: u64,
    pub spoofed: u64,
}
