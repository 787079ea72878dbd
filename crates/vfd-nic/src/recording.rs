//! A NIC backend that records every call it receives.
//!
//! Used to observe what reconciliation does to the hardware: the call log is
//! kept in order, and individual operations can be made to fail so that
//! error reporting paths can be exercised.

use crate::api::{NicControl, NicOp};
use crate::error::{NicError, NicResult, NicStatus};
use crate::types::{AllowFlags, PortId, PortStats, VfId, VfMask, VfStats};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use vfd_types::{MacAddress, VlanId};

/// One recorded NIC call with its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NicCall {
    EnablePort(PortId),
    AddVlanFilter(PortId, VlanId, VfMask),
    RemoveVlanFilter(PortId, VlanId, VfMask),
    AddMacFilter(PortId, VfId, MacAddress),
    RemoveMacFilter(PortId, VfId, MacAddress),
    SetRateLimit(PortId, VfId, u32),
    SetAntiSpoof(PortId, VfId, bool, bool),
    SetStripTag(PortId, VfId, bool),
    SetInsertTag(PortId, VfId, Option<VlanId>),
    SetAllowFlags(PortId, VfId, AllowFlags),
    SetSplitDropEnable(PortId, VfId, bool),
    SetUntaggedRx(PortId, VfId, bool),
    SetLoopback(PortId, bool),
    SetQueueDrop(PortId, bool),
    EnableQos(PortId, u8, Vec<u8>),
    PortStats(PortId),
    VfStats(PortId, VfId),
    ReleasePort(PortId),
}

impl NicCall {
    pub fn op(&self) -> NicOp {
        match self {
            NicCall::EnablePort(..) => NicOp::EnablePort,
            NicCall::AddVlanFilter(..) => NicOp::AddVlanFilter,
            NicCall::RemoveVlanFilter(..) => NicOp::RemoveVlanFilter,
            NicCall::AddMacFilter(..) => NicOp::AddMacFilter,
            NicCall::RemoveMacFilter(..) => NicOp::RemoveMacFilter,
            NicCall::SetRateLimit(..) => NicOp::SetRateLimit,
            NicCall::SetAntiSpoof(..) => NicOp::SetAntiSpoof,
            NicCall::SetStripTag(..) => NicOp::SetStripTag,
            NicCall::SetInsertTag(..) => NicOp::SetInsertTag,
            NicCall::SetAllowFlags(..) => NicOp::SetAllowFlags,
            NicCall::SetSplitDropEnable(..) => NicOp::SetSplitDropEnable,
            NicCall::SetUntaggedRx(..) => NicOp::SetUntaggedRx,
            NicCall::SetLoopback(..) => NicOp::SetLoopback,
            NicCall::SetQueueDrop(..) => NicOp::SetQueueDrop,
            NicCall::EnableQos(..) => NicOp::EnableQos,
            NicCall::PortStats(..) => NicOp::PortStats,
            NicCall::VfStats(..) => NicOp::VfStats,
            NicCall::ReleasePort(..) => NicOp::ReleasePort,
        }
    }

    pub fn port(&self) -> PortId {
        match self {
            NicCall::EnablePort(p)
            | NicCall::AddVlanFilter(p, ..)
            | NicCall::RemoveVlanFilter(p, ..)
            | NicCall::AddMacFilter(p, ..)
            | NicCall::RemoveMacFilter(p, ..)
            | NicCall::SetRateLimit(p, ..)
            | NicCall::SetAntiSpoof(p, ..)
            | NicCall::SetStripTag(p, ..)
            | NicCall::SetInsertTag(p, ..)
            | NicCall::SetAllowFlags(p, ..)
            | NicCall::SetSplitDropEnable(p, ..)
            | NicCall::SetUntaggedRx(p, ..)
            | NicCall::SetLoopback(p, ..)
            | NicCall::SetQueueDrop(p, ..)
            | NicCall::EnableQos(p, ..)
            | NicCall::PortStats(p)
            | NicCall::VfStats(p, ..)
            | NicCall::ReleasePort(p) => *p,
        }
    }
}

/// Records calls in order and fails the operations it is told to fail.
#[derive(Debug, Default)]
pub struct RecordingNic {
    calls: Mutex<Vec<NicCall>>,
    failing: Mutex<HashSet<NicOp>>,
    port_stats: Mutex<HashMap<PortId, PortStats>>,
    released: Mutex<HashSet<PortId>>,
}

impl RecordingNic {
    /// Creates a new recorder with an empty call log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent call of `op` fail with an I/O status.
    pub fn fail_on(&self, op: NicOp) {
        self.failing.lock().insert(op);
    }

    /// Stops injecting failures.
    pub fn clear_failures(&self) {
        self.failing.lock().clear();
    }

    /// Sets the counters returned by `port_stats` for `port`.
    pub fn set_port_stats(&self, port: PortId, stats: PortStats) {
        self.port_stats.lock().insert(port, stats);
    }

    /// Returns a copy of the call log.
    pub fn calls(&self) -> Vec<NicCall> {
        self.calls.lock().clone()
    }

    /// Returns the calls of a given kind.
    pub fn calls_of(&self, op: NicOp) -> Vec<NicCall> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.op() == op)
            .cloned()
            .collect()
    }

    /// Number of recorded calls of a given kind.
    pub fn count(&self, op: NicOp) -> usize {
        self.calls.lock().iter().filter(|c| c.op() == op).count()
    }

    /// Number of recorded calls of any kind.
    pub fn len(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.lock().is_empty()
    }

    /// Empties the call log.
    pub fn clear(&self) {
        self.calls.lock().clear();
    }

    fn record(&self, call: NicCall) -> NicResult<()> {
        let op = call.op();
        let port = call.port();
        self.calls.lock().push(call);

        if op != NicOp::ReleasePort && self.released.lock().contains(&port) {
            return Err(NicError::Released { port: port.0 });
        }
        if self.failing.lock().contains(&op) {
            return Err(NicError::from_status(NicStatus::IoError));
        }
        Ok(())
    }
}

impl NicControl for RecordingNic {
    fn enable_port(&self, port: PortId) -> NicResult<()> {
        self.record(NicCall::EnablePort(port))
    }

    fn add_vlan_filter(&self, port: PortId, vlan: VlanId, mask: VfMask) -> NicResult<()> {
        self.record(NicCall::AddVlanFilter(port, vlan, mask))
    }

    fn remove_vlan_filter(&self, port: PortId, vlan: VlanId, mask: VfMask) -> NicResult<()> {
        self.record(NicCall::RemoveVlanFilter(port, vlan, mask))
    }

    fn add_mac_filter(&self, port: PortId, vf: VfId, mac: MacAddress) -> NicResult<()> {
        self.record(NicCall::AddMacFilter(port, vf, mac))
    }

    fn remove_mac_filter(&self, port: PortId, vf: VfId, mac: MacAddress) -> NicResult<()> {
        self.record(NicCall::RemoveMacFilter(port, vf, mac))
    }

    fn set_rate_limit(&self, port: PortId, vf: VfId, mbps: u32) -> NicResult<()> {
        self.record(NicCall::SetRateLimit(port, vf, mbps))
    }

    fn set_anti_spoof(&self, port: PortId, vf: VfId, mac: bool, vlan: bool) -> NicResult<()> {
        self.record(NicCall::SetAntiSpoof(port, vf, mac, vlan))
    }

    fn set_strip_tag(&self, port: PortId, vf: VfId, enable: bool) -> NicResult<()> {
        self.record(NicCall::SetStripTag(port, vf, enable))
    }

    fn set_insert_tag(&self, port: PortId, vf: VfId, vlan: Option<VlanId>) -> NicResult<()> {
        self.record(NicCall::SetInsertTag(port, vf, vlan))
    }

    fn set_allow_flags(&self, port: PortId, vf: VfId, flags: AllowFlags) -> NicResult<()> {
        self.record(NicCall::SetAllowFlags(port, vf, flags))
    }

    fn set_split_drop_enable(&self, port: PortId, vf: VfId, enable: bool) -> NicResult<()> {
        self.record(NicCall::SetSplitDropEnable(port, vf, enable))
    }

    fn set_untagged_rx(&self, port: PortId, vf: VfId, accept: bool) -> NicResult<()> {
        self.record(NicCall::SetUntaggedRx(port, vf, accept))
    }

    fn set_loopback(&self, port: PortId, enable: bool) -> NicResult<()> {
        self.record(NicCall::SetLoopback(port, enable))
    }

    fn set_queue_drop(&self, port: PortId, enable: bool) -> NicResult<()> {
        self.record(NicCall::SetQueueDrop(port, enable))
    }

    fn enable_qos(&self, port: PortId, ntcs: u8, shares: &[u8]) -> NicResult<()> {
        self.record(NicCall::EnableQos(port, ntcs, shares.to_vec()))
    }

    fn port_stats(&self, port: PortId) -> NicResult<PortStats> {
        self.record(NicCall::PortStats(port))?;
        Ok(self
            .port_stats
            .lock()
            .get(&port)
            .copied()
            .unwrap_or_default())
    }

    fn vf_stats(&self, port: PortId, vf: VfId) -> NicResult<VfStats> {
        self.record(NicCall::VfStats(port, vf))?;
        Ok(VfStats::default())
    }

    fn release_port(&self, port: PortId) -> NicResult<()> {
        self.record(NicCall::ReleasePort(port))?;
        self.released.lock().insert(port);
        Ok(())
    }
}
