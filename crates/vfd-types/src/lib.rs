//! Common types for the SR-IOV VF daemon.
//!
//! This crate provides type-safe representations of the network and bus
//! primitives that flow between the request protocol, the running
//! configuration and the NIC control layer:
//!
//! - [`MacAddress`]: 48-bit Ethernet MAC addresses
//! - [`VlanId`]: IEEE 802.1Q VLAN identifiers as accepted by the VF filters
//! - [`PciAddress`]: PCI slot address identifying a physical function
//! - [`LinkState`]: link status reported for a PF
//!
//! [`is_valid_mac_str`] is the strict textual check applied to MAC strings
//! arriving in VF config resources, before they are parsed.

mod link;
mod mac;
mod pci;
mod vlan;

pub use link::{Duplex, LinkState};
pub use mac::{is_valid_mac_str, MacAddress};
pub use pci::PciAddress;
pub use vlan::VlanId;

/// Common error type for parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid MAC address format: {0}")]
    InvalidMacAddress(String),

    #[error("invalid VLAN ID: {0} (must be 1-4095)")]
    InvalidVlanId(u16),

    #[error("invalid PCI address: {0}")]
    InvalidPciAddress(String),
}
