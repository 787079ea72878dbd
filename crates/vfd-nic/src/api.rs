//! The NIC control trait.
//!
//! Every call is synchronous and addresses one physical function port. Calls
//! taking a [`VfId`] affect only that VF. Filter calls taking a [`VfMask`]
//! affect every VF whose bit is set.

use crate::error::NicResult;
use crate::types::{AllowFlags, PortId, PortStats, VfId, VfMask, VfStats};
use std::fmt;
use vfd_types::{MacAddress, VlanId};

/// Catalogue of NIC calls, used when logging or reporting a failed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NicOp {
    EnablePort,
    AddVlanFilter,
    RemoveVlanFilter,
    AddMacFilter,
    RemoveMacFilter,
    SetRateLimit,
    SetAntiSpoof,
    SetStripTag,
    SetInsertTag,
    SetAllowFlags,
    SetSplitDropEnable,
    SetUntaggedRx,
    SetLoopback,
    SetQueueDrop,
    EnableQos,
    PortStats,
    VfStats,
    ReleasePort,
}

impl NicOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            NicOp::EnablePort => "enable_port",
            NicOp::AddVlanFilter => "add_vlan_filter",
            NicOp::RemoveVlanFilter => "remove_vlan_filter",
            NicOp::AddMacFilter => "add_mac_filter",
            NicOp::RemoveMacFilter => "remove_mac_filter",
            NicOp::SetRateLimit => "set_rate_limit",
            NicOp::SetAntiSpoof => "set_anti_spoof",
            NicOp::SetStripTag => "set_strip_tag",
            NicOp::SetInsertTag => "set_insert_tag",
            NicOp::SetAllowFlags => "set_allow_flags",
            NicOp::SetSplitDropEnable => "set_split_drop_enable",
            NicOp::SetUntaggedRx => "set_untagged_rx",
            NicOp::SetLoopback => "set_loopback",
            NicOp::SetQueueDrop => "set_queue_drop",
            NicOp::EnableQos => "enable_qos",
            NicOp::PortStats => "port_stats",
            NicOp::VfStats => "vf_stats",
            NicOp::ReleasePort => "release_port",
        }
    }
}

impl fmt::Display for NicOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operations the daemon needs from the NIC driver binding.
///
/// Implementations must be usable from the request server and the refresh
/// worker at the same time; the caller serializes calls per port.
pub trait NicControl: Send + Sync {
    /// Puts the port in promiscuous mode, accepts all multicast and enables
    /// unicast hash filtering. Re-asserted after a VF reset.
    fn enable_port(&self, port: PortId) -> NicResult<()>;

    /// Admits `vlan` on the port for every VF in `mask`.
    fn add_vlan_filter(&self, port: PortId, vlan: VlanId, mask: VfMask) -> NicResult<()>;

    /// Withdraws `vlan` from every VF in `mask`.
    fn remove_vlan_filter(&self, port: PortId, vlan: VlanId, mask: VfMask) -> NicResult<()>;

    /// Steers frames for `mac` to `vf`.
    fn add_mac_filter(&self, port: PortId, vf: VfId, mac: MacAddress) -> NicResult<()>;

    fn remove_mac_filter(&self, port: PortId, vf: VfId, mac: MacAddress) -> NicResult<()>;

    /// Limits the VF's transmit rate, in Mbps. Zero removes the limit.
    fn set_rate_limit(&self, port: PortId, vf: VfId, mbps: u32) -> NicResult<()>;

    /// Enables MAC and VLAN anti-spoof checking on frames the VF transmits.
    fn set_anti_spoof(&self, port: PortId, vf: VfId, mac: bool, vlan: bool) -> NicResult<()>;

    fn set_strip_tag(&self, port: PortId, vf: VfId, enable: bool) -> NicResult<()>;

    /// Inserts `vlan` into every frame the VF transmits. `None` disables
    /// insertion.
    fn set_insert_tag(&self, port: PortId, vf: VfId, vlan: Option<VlanId>) -> NicResult<()>;

    fn set_allow_flags(&self, port: PortId, vf: VfId, flags: AllowFlags) -> NicResult<()>;

    fn set_split_drop_enable(&self, port: PortId, vf: VfId, enable: bool) -> NicResult<()>;

    /// Controls whether frames without a VLAN tag are delivered to the VF.
    fn set_untagged_rx(&self, port: PortId, vf: VfId, accept: bool) -> NicResult<()>;

    /// Enables VF-to-VF loopback switching on the port.
    fn set_loopback(&self, port: PortId, enable: bool) -> NicResult<()>;

    fn set_queue_drop(&self, port: PortId, enable: bool) -> NicResult<()>;

    /// Programs traffic-class bandwidth shares. `shares` holds `ntcs`
    /// percentages per VF slot, laid out slot-major.
    fn enable_qos(&self, port: PortId, ntcs: u8, shares: &[u8]) -> NicResult<()>;

    fn port_stats(&self, port: PortId) -> NicResult<PortStats>;

    fn vf_stats(&self, port: PortId, vf: VfId) -> NicResult<VfStats>;

    /// Stops the port and returns it to the kernel. The port accepts no
    /// further calls afterwards.
    fn release_port(&self, port: PortId) -> NicResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_op_names() {
        assert_eq!(NicOp::AddVlanFilter.to_string(), "add_vlan_filter");
        assert_eq!(NicOp::ReleasePort.as_str(), "release_port");
    }
}
