//! The running configuration.
//!
//! A [`RunningConfig`] holds one [`PortState`] per managed PF, each behind its
//! own lock. A port owns a fixed arena of [`VfSlot`]s indexed by VF number;
//! a slot is free while its number is [`FREE_VF`] and only returns to that
//! state once the reconciler has torn down its hardware filters.

use crate::config::{DaemonConfig, PciConfig};
use crate::error::{VfdError, VfdResult};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use vfd_nic::{PortId, VfId};
use vfd_types::{MacAddress, PciAddress, VlanId};

/// VF slots per PF. VF 0 is reserved, so numbers 1..MAX_VFS are usable.
pub const MAX_VFS: usize = 32;

/// VLANs one VF may carry.
pub const MAX_VF_VLANS: usize = 64;

/// MAC addresses one VF may carry.
pub const MAX_VF_MACS: usize = 64;

/// Upper bound on traffic classes per PF.
pub const MAX_TCS: usize = 8;

/// Number of a slot that holds no VF.
pub const FREE_VF: i32 = -1;

/// Pending work for a port or VF.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChangeMarker {
    #[default]
    Unchanged,
    Added,
    Deleted,
    /// Re-apply current settings after a hardware reset.
    Reset,
}

impl ChangeMarker {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeMarker::Unchanged => "unchanged",
            ChangeMarker::Added => "add",
            ChangeMarker::Deleted => "delete",
            ChangeMarker::Reset => "reset",
        }
    }
}

impl fmt::Display for ChangeMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One VF slot on a port.
#[derive(Debug, Clone, PartialEq)]
pub struct VfSlot {
    /// VF number, or [`FREE_VF`].
    pub num: i32,
    /// Uid that last presented this VF's config.
    pub owner: u32,
    /// Resource the config came from.
    pub name: String,
    /// Order matters: the first entry is the strip/insert VLAN.
    pub vlans: Vec<VlanId>,
    pub macs: Vec<MacAddress>,
    pub tc_pctgs: [u8; MAX_TCS],
    /// Fraction of the PF link rate; 0 is unlimited.
    pub rate: f64,
    pub mtu: Option<u32>,
    pub mac_anti_spoof: bool,
    pub vlan_anti_spoof: bool,
    pub strip_stag: bool,
    pub insert_stag: bool,
    pub allow_bcast: bool,
    pub allow_mcast: bool,
    pub allow_un_ucast: bool,
    pub start_cb: Option<String>,
    pub stop_cb: Option<String>,
    /// Filters a replaced config had that the new one dropped.
    pub retired_vlans: Vec<VlanId>,
    pub retired_macs: Vec<MacAddress>,
    /// The replaced config had a rate limit and this one has none.
    pub retired_rate: bool,
    pub marker: ChangeMarker,
}

impl Default for VfSlot {
    fn default() -> Self {
        Self::free()
    }
}

impl VfSlot {
    /// Creates an empty, free slot.
    pub fn free() -> Self {
        Self {
            num: FREE_VF,
            owner: 0,
            name: String::new(),
            vlans: Vec::new(),
            macs: Vec::new(),
            tc_pctgs: [0; MAX_TCS],
            rate: 0.0,
            mtu: None,
            mac_anti_spoof: false,
            vlan_anti_spoof: false,
            strip_stag: false,
            insert_stag: false,
            allow_bcast: false,
            allow_mcast: false,
            allow_un_ucast: false,
            start_cb: None,
            stop_cb: None,
            retired_vlans: Vec::new(),
            retired_macs: Vec::new(),
            retired_rate: false,
            marker: ChangeMarker::Unchanged,
        }
    }

    pub fn is_active(&self) -> bool {
        self.num >= 0
    }

    /// Hardware VF id of an active slot.
    pub fn vf_id(&self) -> Option<VfId> {
        u16::try_from(self.num).ok().map(VfId)
    }

    /// Returns the slot to the free state.
    pub fn clear(&mut self) {
        *self = Self::free();
    }
}

/// State of one managed PF.
#[derive(Debug, Clone)]
pub struct PortState {
    pub pciid: PciAddress,
    /// Logical port number used for NIC calls.
    pub id: PortId,
    pub mtu: u32,
    pub loopback: bool,
    pub qos: bool,
    pub ntcs: u8,
    pub num_mirrors: u32,
    pub max_macs: usize,
    pub max_vlans: usize,
    pub link_rate_mbps: u32,
    pub marker: ChangeMarker,
    vfs: Vec<VfSlot>,
}

impl PortState {
    /// Creates a new port with every VF slot free.
    pub fn new(id: PortId, pf: &PciConfig) -> Self {
        Self {
            pciid: pf.id,
            id,
            mtu: pf.mtu,
            loopback: pf.loopback,
            qos: pf.qos,
            ntcs: pf.ntcs,
            num_mirrors: 0,
            max_macs: pf.max_macs,
            max_vlans: pf.max_vlans,
            link_rate_mbps: pf.link_rate_mbps,
            marker: ChangeMarker::Unchanged,
            vfs: vec![VfSlot::free(); MAX_VFS],
        }
    }

    /// Slot for VF number `num`, active or not.
    pub fn slot(&self, num: i32) -> Option<&VfSlot> {
        usize::try_from(num).ok().and_then(|i| self.vfs.get(i))
    }

    fn slot_mut(&mut self, num: i32) -> Option<&mut VfSlot> {
        usize::try_from(num).ok().and_then(|i| self.vfs.get_mut(i))
    }

    /// Active VF with number `num`.
    pub fn vf(&self, num: i32) -> Option<&VfSlot> {
        self.slot(num).filter(|s| s.is_active())
    }

    /// Every slot in VF number order.
    pub fn slots(&self) -> &[VfSlot] {
        &self.vfs
    }

    pub(crate) fn slots_mut(&mut self) -> &mut [VfSlot] {
        &mut self.vfs
    }

    pub fn active_vfs(&self) -> impl Iterator<Item = &VfSlot> {
        self.vfs.iter().filter(|s| s.is_active())
    }

    pub fn num_vfs(&self) -> usize {
        self.active_vfs().count()
    }

    /// MACs held by active VFs other than `except`.
    pub fn mac_count(&self, except: i32) -> usize {
        self.active_vfs()
            .filter(|s| s.num != except)
            .map(|s| s.macs.len())
            .sum()
    }

    /// VLANs held by active VFs other than `except`.
    pub fn vlan_count(&self, except: i32) -> usize {
        self.active_vfs()
            .filter(|s| s.num != except)
            .map(|s| s.vlans.len())
            .sum()
    }

    /// True when the port or any VF has a marker to process.
    pub fn has_pending(&self) -> bool {
        self.marker != ChangeMarker::Unchanged
            || self.vfs.iter().any(|s| s.marker != ChangeMarker::Unchanged)
    }

    /// Overwrites the slot named by `vf.num` with a validated VF and marks
    /// it `Added`.
    ///
    /// Filters and a rate limit the previous occupant had and `vf` does not
    /// are kept on the new slot for the reconciler to remove. The port is marked `Added`
    /// when this is its first active VF.
    pub fn install(&mut self, mut vf: VfSlot) -> VfdResult<()> {
        let first = self.num_vfs() == 0;
        let num = vf.num;
        let slot = self
            .slot_mut(num)
            .filter(|_| num > 0)
            .ok_or_else(|| VfdError::validation(format!("VF {} is out of range", num)))?;

        if slot.is_active() {
            vf.retired_vlans = slot
                .vlans
                .iter()
                .filter(|v| !vf.vlans.contains(v))
                .copied()
                .collect();
            vf.retired_macs = slot
                .macs
                .iter()
                .filter(|m| !vf.macs.contains(m))
                .copied()
                .collect();
            vf.retired_rate = slot.rate > 0.0 && vf.rate <= 0.0;
        }
        vf.marker = ChangeMarker::Added;
        *slot = vf;

        if first {
            self.marker = ChangeMarker::Added;
        }
        Ok(())
    }

    /// Marks active VF `num` for teardown. Returns false if it is not active.
    pub fn mark_deleted(&mut self, num: i32) -> bool {
        self.mark(num, ChangeMarker::Deleted)
    }

    /// Marks active VF `num` to have its settings re-applied. A VF with an
    /// add or delete still pending keeps that marker.
    pub fn mark_reset(&mut self, num: i32) -> bool {
        match self.slot_mut(num) {
            Some(slot) if slot.is_active() => {
                if slot.marker == ChangeMarker::Unchanged {
                    slot.marker = ChangeMarker::Reset;
                }
                true
            }
            _ => false,
        }
    }

    fn mark(&mut self, num: i32, marker: ChangeMarker) -> bool {
        match self.slot_mut(num) {
            Some(slot) if slot.is_active() => {
                slot.marker = marker;
                true
            }
            _ => false,
        }
    }
}

/// Shared handle to one port.
pub type SharedPort = Arc<Mutex<PortState>>;

/// Every managed port, in logical port order.
#[derive(Debug, Default)]
pub struct RunningConfig {
    ports: Vec<SharedPort>,
    ids: Vec<(PortId, PciAddress)>,
}

impl RunningConfig {
    /// Creates a new running configuration from port states.
    pub fn new(ports: Vec<PortState>) -> Self {
        let ids = ports.iter().map(|p| (p.id, p.pciid)).collect();
        Self {
            ports: ports
                .into_iter()
                .map(|p| Arc::new(Mutex::new(p)))
                .collect(),
            ids,
        }
    }

    /// Builds one port per configured PF, each marked `Added` so the first
    /// reconciliation activates it.
    pub fn from_config(config: &DaemonConfig) -> VfdResult<Self> {
        if config.pciids.is_empty() {
            return Err(VfdError::fatal_init("no pciids configured"));
        }

        let mut ports = Vec::with_capacity(config.pciids.len());
        for (index, pf) in config.pciids.iter().enumerate() {
            let id = u16::try_from(index)
                .map_err(|_| VfdError::fatal_init("too many pciids configured"))?;
            let mut port = PortState::new(PortId(id), pf);
            port.marker = ChangeMarker::Added;
            ports.push(port);
        }
        Ok(Self::new(ports))
    }

    pub fn ports(&self) -> &[SharedPort] {
        &self.ports
    }

    pub fn len(&self) -> usize {
        self.ports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }

    /// Port ids and addresses, readable without taking any port lock.
    pub fn port_ids(&self) -> &[(PortId, PciAddress)] {
        &self.ids
    }

    pub fn port(&self, id: PortId) -> Option<&SharedPort> {
        self.ids
            .iter()
            .position(|(pid, _)| *pid == id)
            .and_then(|i| self.ports.get(i))
    }

    pub fn port_by_pciid(&self, pciid: &PciAddress) -> Option<&SharedPort> {
        self.ids
            .iter()
            .position(|(_, addr)| addr == pciid)
            .and_then(|i| self.ports.get(i))
    }
}
