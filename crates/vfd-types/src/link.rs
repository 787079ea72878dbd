//! Link status of a physical function as reported by the NIC.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Duplex mode of an established link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Duplex {
    Half,
    #[default]
    Full,
}

impl fmt::Display for Duplex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Duplex::Half => write!(f, "HDX"),
            Duplex::Full => write!(f, "FDX"),
        }
    }
}

/// Link state snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct LinkState {
    /// Link is established.
    pub up: bool,
    /// Negotiated speed in Mbps (0 while down).
    pub speed_mbps: u32,
    pub duplex: Duplex,
}

impl LinkState {
    /// A link that is down.
    pub const DOWN: LinkState = LinkState {
        up: false,
        speed_mbps: 0,
        duplex: Duplex::Full,
    };

    pub const fn up(speed_mbps: u32, duplex: Duplex) -> Self {
        Self {
            up: true,
            speed_mbps,
            duplex,
        }
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.up {
            write!(f, "UP {} {}", self.speed_mbps, self.duplex)
        } else {
            write!(f, "DOWN")
        }
    }
}
