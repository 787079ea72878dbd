//! A NIC backend that only logs.
//!
//! Selected with `--no-nic`: the daemon runs its full request and
//! reconciliation machinery without touching any device.

use crate::api::NicControl;
use crate::error::NicResult;
use crate::types::{AllowFlags, PortId, PortStats, VfId, VfMask, VfStats};
use tracing::debug;
use vfd_types::{MacAddress, VlanId};

#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunNic;

impl DryRunNic {
    pub fn new() -> Self {
        Self
    }
}

impl NicControl for DryRunNic {
    fn enable_port(&self, port: PortId) -> NicResult<()> {
        debug!(%port, "dry-run: enable_port");
        Ok(())
    }

    fn add_vlan_filter(&self, port: PortId, vlan: VlanId, mask: VfMask) -> NicResult<()> {
        debug!(%port, %vlan, %mask, "dry-run: add_vlan_filter");
        Ok(())
    }

    fn remove_vlan_filter(&self, port: PortId, vlan: VlanId, mask: VfMask) -> NicResult<()> {
        debug!(%port, %vlan, %mask, "dry-run: remove_vlan_filter");
        Ok(())
    }

    fn add_mac_filter(&self, port: PortId, vf: VfId, mac: MacAddress) -> NicResult<()> {
        debug!(%port, %vf, %mac, "dry-run: add_mac_filter");
        Ok(())
    }

    fn remove_mac_filter(&self, port: PortId, vf: VfId, mac: MacAddress) -> NicResult<()> {
        debug!(%port, %vf, %mac, "dry-run: remove_mac_filter");
        Ok(())
    }

    fn set_rate_limit(&self, port: PortId, vf: VfId, mbps: u32) -> NicResult<()> {
        debug!(%port, %vf, mbps, "dry-run: set_rate_limit");
        Ok(())
    }

    fn set_anti_spoof(&self, port: PortId, vf: VfId, mac: bool, vlan: bool) -> NicResult<()> {
        debug!(%port, %vf, mac, vlan, "dry-run: set_anti_spoof");
        Ok(())
    }

    fn set_strip_tag(&self, port: PortId, vf: VfId, enable: bool) -> NicResult<()> {
        debug!(%port, %vf, enable, "dry-run: set_strip_tag");
        Ok(())
    }

    fn set_insert_tag(&self, port: PortId, vf: VfId, vlan: Option<VlanId>) -> NicResult<()> {
        debug!(%port, %vf, ?vlan, "dry-run: set_insert_tag");
        Ok(())
    }

    fn set_allow_flags(&self, port: PortId, vf: VfId, flags: AllowFlags) -> NicResult<()> {
        debug!(%port, %vf, ?flags, "dry-run: set_allow_flags");
        Ok(())
    }

    fn set_split_drop_enable(&self, port: PortId, vf: VfId, enable: bool) -> NicResult<()> {
        debug!(%port, %vf, enable, "dry-run: set_split_drop_enable");
        Ok(())
    }

    fn set_untagged_rx(&self, port: PortId, vf: VfId, accept: bool) -> NicResult<()> {
        debug!(%port, %vf, accept, "dry-run: set_untagged_rx");
        Ok(())
    }

    fn set_loopback(&self, port: PortId, enable: bool) -> NicResult<()> {
        debug!(%port, enable, "dry-run: set_loopback");
        Ok(())
    }

    fn set_queue_drop(&self, port: PortId, enable: bool) -> NicResult<()> {
        debug!(%port, enable, "dry-run: set_queue_drop");
        Ok(())
    }

    fn enable_qos(&self, port: PortId, ntcs: u8, shares: &[u8]) -> NicResult<()> {
        debug!(%port, ntcs, ?shares, "dry-run: enable_qos");
        Ok(())
    }

    fn port_stats(&self, _port: PortId) -> NicResult<PortStats> {
        Ok(PortStats::default())
    }

    fn vf_stats(&self, _port: PortId, _vf: VfId) -> NicResult<VfStats> {
        Ok(VfStats::default())
    }

    fn release_port(&self, port: PortId) -> NicResult<()> {
        debug!(%port, "dry-run: release_port");
        Ok(())
    }
}
