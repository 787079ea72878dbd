//! Admission checks for VF configs.
//!
//! Everything here is a pure function of a port snapshot and the candidate
//! definition. Nothing is mutated: a rejected add leaves the running
//! configuration exactly as it was.

use crate::error::{VfdError, VfdResult};
use crate::model::{ChangeMarker, PortState, VfSlot, MAX_TCS, MAX_VFS, MAX_VF_MACS, MAX_VF_VLANS};
use crate::vf_config::VfDefinition;
use vfd_types::{is_valid_mac_str, MacAddress, VlanId};

/// True if `mac` is six colon separated hex octets, each at most 255.
pub fn validate_mac(mac: &str) -> bool {
    is_valid_mac_str(mac)
}

/// True if `vlan` is configured on active VF `vf` of `port`.
pub fn validate_vlan_membership(port: &PortState, vf: i32, vlan: u16) -> bool {
    port.vf(vf)
        .map(|slot| slot.vlans.iter().any(|v| v.as_u16() == vlan))
        .unwrap_or(false)
}

/// True if `mtu` fits within the port's MTU.
pub fn validate_mtu(port: &PortState, mtu: i64) -> bool {
    (0..=i64::from(port.mtu)).contains(&mtu)
}

/// Checks that the port's filter tables can hold the proposed VF.
///
/// Filters already held by VF `replacing` are not counted, since an add
/// for an active VF replaces its config.
pub fn validate_quota(
    port: &PortState,
    replacing: i32,
    proposed_macs: usize,
    proposed_vlans: usize,
) -> VfdResult<()> {
    let macs = port.mac_count(replacing) + proposed_macs;
    if macs > port.max_macs {
        return Err(VfdError::validation(format!(
            "MAC quota exceeded on {}: {} requested, {} available",
            port.pciid,
            proposed_macs,
            port.max_macs.saturating_sub(port.mac_count(replacing))
        )));
    }

    let vlans = port.vlan_count(replacing) + proposed_vlans;
    if vlans > port.max_vlans {
        return Err(VfdError::validation(format!(
            "VLAN quota exceeded on {}: {} requested, {} available",
            port.pciid,
            proposed_vlans,
            port.max_vlans.saturating_sub(port.vlan_count(replacing))
        )));
    }

    Ok(())
}

/// Checks a VF number is assignable: VF 0 is reserved.
pub fn validate_vf_number(vfid: i64) -> VfdResult<i32> {
    if vfid == 0 {
        return Err(VfdError::validation("VF 0 is reserved and cannot be assigned"));
    }
    match i32::try_from(vfid) {
        Ok(num) if num > 0 && (num as usize) < MAX_VFS => Ok(num),
        _ => Err(VfdError::validation(format!(
            "VF {} is out of range (1-{})",
            vfid,
            MAX_VFS - 1
        ))),
    }
}

/// Validates `def` against `port` and builds the slot that would replace
/// the VF's current one.
pub fn admit(port: &PortState, def: &VfDefinition) -> VfdResult<VfSlot> {
    let num = validate_vf_number(def.vfid)?;

    if let Some(slot) = port.slot(num) {
        if slot.marker == ChangeMarker::Deleted {
            return Err(VfdError::validation(format!(
                "VF {} on {} is still being deleted",
                num, port.pciid
            )));
        }
    }

    if def.vlans.len() > MAX_VF_VLANS {
        return Err(VfdError::validation(format!(
            "too many VLANs: {} (max {})",
            def.vlans.len(),
            MAX_VF_VLANS
        )));
    }
    let mut vlans: Vec<VlanId> = Vec::with_capacity(def.vlans.len());
    for raw in &def.vlans {
        let vlan = VlanId::try_from(*raw)
            .map_err(|_| VfdError::validation(format!("invalid VLAN id: {}", raw)))?;
        if vlans.contains(&vlan) {
            return Err(VfdError::validation(format!("duplicate VLAN id: {}", vlan)));
        }
        vlans.push(vlan);
    }

    if def.macs.len() > MAX_VF_MACS {
        return Err(VfdError::validation(format!(
            "too many MACs: {} (max {})",
            def.macs.len(),
            MAX_VF_MACS
        )));
    }
    let mut macs: Vec<MacAddress> = Vec::with_capacity(def.macs.len());
    for raw in &def.macs {
        if !validate_mac(raw) {
            return Err(VfdError::validation(format!("invalid MAC address: {}", raw)));
        }
        let mac: MacAddress = raw.parse()?;
        if !macs.contains(&mac) {
            macs.push(mac);
        }
    }

    if !def.rate.is_finite() || !(0.0..=1.0).contains(&def.rate) {
        return Err(VfdError::validation(format!(
            "rate must be between 0 and 1, not {}",
            def.rate
        )));
    }

    if def.tc_pctgs.len() > MAX_TCS {
        return Err(VfdError::validation(format!(
            "too many traffic classes: {} (max {})",
            def.tc_pctgs.len(),
            MAX_TCS
        )));
    }
    let mut tc_pctgs = [0u8; MAX_TCS];
    for (tc, pct) in def.tc_pctgs.iter().enumerate() {
        tc_pctgs[tc] = u8::try_from(*pct)
            .ok()
            .filter(|p| *p <= 100)
            .ok_or_else(|| {
                VfdError::validation(format!("TC {} share {} exceeds 100%", tc, pct))
            })?;
    }

    let mtu = match def.mtu {
        Some(mtu) if !validate_mtu(port, mtu) => {
            return Err(VfdError::validation(format!(
                "MTU {} exceeds the {} limit of {}",
                mtu, port.pciid, port.mtu
            )));
        }
        Some(mtu) => u32::try_from(mtu).ok(),
        None => None,
    };

    validate_quota(port, num, macs.len(), vlans.len())?;

    Ok(VfSlot {
        num,
        owner: def.owner,
        name: def.name.clone(),
        vlans,
        macs,
        tc_pctgs,
        rate: def.rate,
        mtu,
        mac_anti_spoof: def.mac_anti_spoof,
        vlan_anti_spoof: def.vlan_anti_spoof,
        strip_stag: def.strip_stag,
        insert_stag: def.insert_stag,
        allow_bcast: def.allow_bcast,
        allow_mcast: def.allow_mcast,
        allow_un_ucast: def.allow_un_ucast,
        start_cb: def.start_cb.clone().filter(|c| !c.trim().is_empty()),
        stop_cb: def.stop_cb.clone().filter(|c| !c.trim().is_empty()),
        ..VfSlot::free()
    })
}
