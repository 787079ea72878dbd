//! Pushes the running configuration to the NIC.
//!
//! A pass walks one port and, for every node whose change marker is set,
//! issues the NIC calls that bring the hardware in line with the model, then
//! clears the marker. A pass over a port with nothing pending issues no
//! calls at all.
//!
//! Order within a pass:
//! 1. port level: loopback, queue drop, and (on `Added`) port activation
//! 2. each marked VF: filter teardown or install, rate limit, then
//!    anti-spoof, strip/insert, allow flags and split drop for VFs that
//!    remain active
//! 3. port activation re-asserted and untagged frames refused for every
//!    active VF, since some of that hardware state drifts
//!
//! A failed call is logged and recorded in the [`ReconcileReport`]; the pass
//! carries on with the remaining steps.

use crate::model::{ChangeMarker, PortState, RunningConfig, VfSlot};
use crate::qos::{self, QosPolicy};
use std::sync::Arc;
use tracing::{debug, info, instrument, trace, warn};
use vfd_nic::{AllowFlags, NicControl, NicError, NicOp, NicResult, PortId, VfId, VfMask};

/// A NIC call that failed during reconciliation.
#[derive(Debug, Clone)]
pub struct HardwareFailure {
    pub port: PortId,
    pub vf: Option<VfId>,
    pub call: NicOp,
    pub error: NicError,
}

/// Outcome of one or more reconciliation passes.
#[derive(Debug, Clone, Default)]
pub struct ReconcileReport {
    /// NIC calls issued
    pub calls: usize,
    /// VFs whose markers were processed
    pub touched: Vec<(PortId, VfId)>,
    pub failures: Vec<HardwareFailure>,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn merge(&mut self, other: ReconcileReport) {
        self.calls += other.calls;
        self.touched.extend(other.touched);
        self.failures.extend(other.failures);
    }

    /// One line per failure, for replies and logs.
    pub fn failure_summary(&self) -> String {
        self.failures
            .iter()
            .map(|f| match f.vf {
                Some(vf) => format!("port {} vf {}: {}: {}", f.port, vf, f.call, f.error),
                None => format!("port {}: {}: {}", f.port, f.call, f.error),
            })
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Applies model changes through a NIC backend.
#[derive(Clone)]
pub struct Reconciler {
    nic: Arc<dyn NicControl>,
}

impl Reconciler {
    /// Creates a new reconciler driving `nic`.
    pub fn new(nic: Arc<dyn NicControl>) -> Self {
        Self { nic }
    }

    pub fn nic(&self) -> &Arc<dyn NicControl> {
        &self.nic
    }

    /// Locks and reconciles every port in turn.
    pub fn reconcile_all(&self, config: &RunningConfig) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        for port in config.ports() {
            let mut port = port.lock();
            report.merge(self.reconcile(&mut port));
        }
        report
    }

    /// Runs one pass over `port`. The caller holds the port's lock.
    #[instrument(skip_all, fields(port = %port.id, pciid = %port.pciid))]
    pub fn reconcile(&self, port: &mut PortState) -> ReconcileReport {
        let mut pass = Pass {
            nic: self.nic.as_ref(),
            port: port.id,
            report: ReconcileReport::default(),
        };

        if !port.has_pending() {
            trace!("nothing to reconcile");
            return pass.report;
        }

        pass.call(None, NicOp::SetLoopback, |n, p| n.set_loopback(p, port.loopback));
        pass.call(None, NicOp::SetQueueDrop, |n, p| n.set_queue_drop(p, true));

        if port.marker == ChangeMarker::Added {
            info!("activating port");
            pass.call(None, NicOp::EnablePort, |n, p| n.enable_port(p));
            port.marker = ChangeMarker::Unchanged;
        }

        let link_rate = port.link_rate_mbps;
        for slot in port.slots_mut() {
            if slot.marker != ChangeMarker::Unchanged {
                pass.vf(slot, link_rate);
            }
        }

        if port.active_vfs().next().is_some() {
            pass.call(None, NicOp::EnablePort, |n, p| n.enable_port(p));
            for vf in port.active_vfs().filter_map(VfSlot::vf_id) {
                pass.call(Some(vf), NicOp::SetUntaggedRx, |n, p| {
                    n.set_untagged_rx(p, vf, false)
                });
            }
        }

        debug!(
            calls = pass.report.calls,
            failures = pass.report.failures.len(),
            "port reconciled"
        );
        pass.report
    }

    /// Normalizes the port's traffic-class shares and programs them.
    #[instrument(skip_all, fields(port = %port.id))]
    pub fn program_qos(&self, port: &PortState, policy: QosPolicy) -> ReconcileReport {
        let mut pass = Pass {
            nic: self.nic.as_ref(),
            port: port.id,
            report: ReconcileReport::default(),
        };

        let shares = qos::normalize(port, policy);
        let used = crate::model::MAX_VFS * usize::from(port.ntcs);
        let ntcs = port.ntcs;
        debug!(ntcs, "programming traffic class shares");
        pass.call(None, NicOp::EnableQos, |n, p| {
            n.enable_qos(p, ntcs, &shares[..used.min(shares.len())])
        });
        pass.report
    }
}

/// Converts a fraction of the link rate to Mbps. A non-zero fraction never
/// rounds down to 0, which the NIC reads as unlimited.
fn rate_mbps(link_rate_mbps: u32, rate: f64) -> u32 {
    let mbps = (f64::from(link_rate_mbps) * rate) as u32;
    if rate > 0.0 {
        mbps.max(1)
    } else {
        mbps
    }
}

/// Bookkeeping for a single pass over one port.
struct Pass<'a> {
    nic: &'a dyn NicControl,
    port: PortId,
    report: ReconcileReport,
}

impl Pass<'_> {
    fn call<F>(&mut self, vf: Option<VfId>, op: NicOp, f: F)
    where
        F: FnOnce(&dyn NicControl, PortId) -> NicResult<()>,
    {
        self.report.calls += 1;
        if let Err(error) = f(self.nic, self.port) {
            match vf {
                Some(vf) => warn!(port = %self.port, %vf, call = %op, %error, "NIC call failed"),
                None => warn!(port = %self.port, call = %op, %error, "NIC call failed"),
            }
            self.report.failures.push(HardwareFailure {
                port: self.port,
                vf,
                call: op,
                error,
            });
        }
    }

    fn vf(&mut self, slot: &mut VfSlot, link_rate_mbps: u32) {
        let Some(vf) = slot.vf_id() else {
            slot.marker = ChangeMarker::Unchanged;
            return;
        };
        let mask = VfMask::single(vf);
        info!(port = %self.port, %vf, reason = %slot.marker, "reconfiguring VF");

        for vlan in std::mem::take(&mut slot.retired_vlans) {
            self.call(Some(vf), NicOp::RemoveVlanFilter, |n, p| {
                n.remove_vlan_filter(p, vlan, mask)
            });
        }
        for mac in std::mem::take(&mut slot.retired_macs) {
            self.call(Some(vf), NicOp::RemoveMacFilter, |n, p| {
                n.remove_mac_filter(p, vf, mac)
            });
        }

        if slot.marker == ChangeMarker::Deleted {
            slot.start_cb = None;
            slot.stop_cb = None;
            for &vlan in &slot.vlans {
                debug!(%vf, %vlan, "removing VLAN filter");
                self.call(Some(vf), NicOp::RemoveVlanFilter, |n, p| {
                    n.remove_vlan_filter(p, vlan, mask)
                });
            }
            for &mac in &slot.macs {
                debug!(%vf, %mac, "removing MAC filter");
                self.call(Some(vf), NicOp::RemoveMacFilter, |n, p| {
                    n.remove_mac_filter(p, vf, mac)
                });
            }
            if slot.rate > 0.0 {
                self.call(Some(vf), NicOp::SetRateLimit, |n, p| n.set_rate_limit(p, vf, 0));
            }

            // Released only now that its filters are gone.
            slot.clear();
        } else {
            for &vlan in &slot.vlans {
                debug!(%vf, %vlan, "adding VLAN filter");
                self.call(Some(vf), NicOp::AddVlanFilter, |n, p| {
                    n.add_vlan_filter(p, vlan, mask)
                });
            }
            for &mac in &slot.macs {
                debug!(%vf, %mac, "adding MAC filter");
                self.call(Some(vf), NicOp::AddMacFilter, |n, p| {
                    n.add_mac_filter(p, vf, mac)
                });
            }
            if slot.rate > 0.0 {
                let mbps = rate_mbps(link_rate_mbps, slot.rate);
                debug!(%vf, mbps, "setting rate limit");
                self.call(Some(vf), NicOp::SetRateLimit, |n, p| {
                    n.set_rate_limit(p, vf, mbps)
                });
            } else if std::mem::take(&mut slot.retired_rate) {
                debug!(%vf, "clearing rate limit");
                self.call(Some(vf), NicOp::SetRateLimit, |n, p| n.set_rate_limit(p, vf, 0));
            }
        }

        if slot.is_active() {
            let (mac_spoof, vlan_spoof) = (slot.mac_anti_spoof, slot.vlan_anti_spoof);
            self.call(Some(vf), NicOp::SetAntiSpoof, |n, p| {
                n.set_anti_spoof(p, vf, mac_spoof, vlan_spoof)
            });

            self.strip_insert(slot, vf);

            let flags = AllowFlags {
                broadcast: slot.allow_bcast,
                multicast: slot.allow_mcast,
                unknown_unicast: slot.allow_un_ucast,
            };
            self.call(Some(vf), NicOp::SetAllowFlags, |n, p| {
                n.set_allow_flags(p, vf, flags)
            });
            self.call(Some(vf), NicOp::SetSplitDropEnable, |n, p| {
                n.set_split_drop_enable(p, vf, true)
            });
        }

        self.report.touched.push((self.port, vf));
        slot.marker = ChangeMarker::Unchanged;
    }

    /// Tag handling only applies to a VF with exactly one VLAN; trunked VFs
    /// get neither strip nor insert.
    fn strip_insert(&mut self, slot: &VfSlot, vf: VfId) {
        let (strip, insert) = match slot.vlans.as_slice() {
            [vlan] => (slot.strip_stag, slot.insert_stag.then_some(*vlan)),
            _ => (false, None),
        };
        self.call(Some(vf), NicOp::SetStripTag, |n, p| n.set_strip_tag(p, vf, strip));
        self.call(Some(vf), NicOp::SetInsertTag, |n, p| n.set_insert_tag(p, vf, insert));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PciConfig;
    use crate::model::MAX_TCS;
    use pretty_assertions::assert_eq;
    use vfd_nic::{NicCall, RecordingNic};
    use vfd_types::{MacAddress, PciAddress, VlanId};

    fn setup() -> (Arc<RecordingNic>, Reconciler, PortState) {
        let nic = Arc::new(RecordingNic::new());
        let reconciler = Reconciler::new(nic.clone());
        let port = PortState::new(PortId(0), &PciConfig::new(PciAddress::new(0, 8, 0, 0)));
        (nic, reconciler, port)
    }

    fn vlan(id: u16) -> VlanId {
        VlanId::new(id).unwrap()
    }

    fn slot(num: i32, vlans: &[u16]) -> VfSlot {
        VfSlot {
            num,
            vlans: vlans.iter().map(|v| vlan(*v)).collect(),
            ..VfSlot::free()
        }
    }

    #[test]
    fn test_idle_pass_issues_no_calls() {
        let (nic, reconciler, mut port) = setup();
        let report = reconciler.reconcile(&mut port);
        assert_eq!(report.calls, 0);
        assert!(nic.is_empty());
    }

    #[test]
    fn test_second_pass_is_noop() {
        let (nic, reconciler, mut port) = setup();
        port.install(slot(1, &[10])).unwrap();

        let first = reconciler.reconcile(&mut port);
        assert!(first.calls > 0);
        assert!(first.is_clean());
        assert!(!port.has_pending());

        nic.clear();
        let second = reconciler.reconcile(&mut port);
        assert_eq!(second.calls, 0);
        assert!(nic.is_empty());
    }

    #[test]
    fn test_add_call_order() {
        let (nic, reconciler, mut port) = setup();
        let mac = MacAddress::new([2, 0, 0, 0, 0, 1]);
        port.install(VfSlot {
            macs: vec![mac],
            rate: 0.5,
            mac_anti_spoof: true,
            strip_stag: true,
            insert_stag: true,
            allow_mcast: true,
            ..slot(3, &[100])
        })
        .unwrap();

        reconciler.reconcile(&mut port);

        let p = PortId(0);
        let vf = VfId(3);
        assert_eq!(
            nic.calls(),
            vec![
                NicCall::SetLoopback(p, false),
                NicCall::SetQueueDrop(p, true),
                NicCall::EnablePort(p),
                NicCall::AddVlanFilter(p, vlan(100), VfMask::single(vf)),
                NicCall::AddMacFilter(p, vf, mac),
                NicCall::SetRateLimit(p, vf, 5000),
                NicCall::SetAntiSpoof(p, vf, true, false),
                NicCall::SetStripTag(p, vf, true),
                NicCall::SetInsertTag(p, vf, Some(vlan(100))),
                NicCall::SetAllowFlags(
                    p,
                    vf,
                    AllowFlags {
                        broadcast: false,
                        multicast: true,
                        unknown_unicast: false
                    }
                ),
                NicCall::SetSplitDropEnable(p, vf, true),
                NicCall::EnablePort(p),
                NicCall::SetUntaggedRx(p, vf, false),
            ]
        );
    }

    #[test]
    fn test_single_vlan_strip_without_insert() {
        let (nic, reconciler, mut port) = setup();
        port.install(VfSlot {
            strip_stag: true,
            insert_stag: false,
            ..slot(1, &[10])
        })
        .unwrap();
        reconciler.reconcile(&mut port);

        assert_eq!(
            nic.calls_of(NicOp::SetStripTag),
            vec![NicCall::SetStripTag(PortId(0), VfId(1), true)]
        );
        assert_eq!(
            nic.calls_of(NicOp::SetInsertTag),
            vec![NicCall::SetInsertTag(PortId(0), VfId(1), None)]
        );
    }

    #[test]
    fn test_multi_vlan_forces_strip_and_insert_off() {
        let (nic, reconciler, mut port) = setup();
        port.install(VfSlot {
            strip_stag: true,
            insert_stag: true,
            ..slot(1, &[10, 20])
        })
        .unwrap();
        reconciler.reconcile(&mut port);

        assert_eq!(
            nic.calls_of(NicOp::SetStripTag),
            vec![NicCall::SetStripTag(PortId(0), VfId(1), false)]
        );
        assert_eq!(
            nic.calls_of(NicOp::SetInsertTag),
            vec![NicCall::SetInsertTag(PortId(0), VfId(1), None)]
        );
    }

    #[test]
    fn test_delete_tears_down_before_release() {
        let (nic, reconciler, mut port) = setup();
        let mac = MacAddress::new([2, 0, 0, 0, 0, 9]);
        port.install(VfSlot {
            macs: vec![mac],
            start_cb: Some("start".to_string()),
            ..slot(2, &[10, 20])
        })
        .unwrap();
        reconciler.reconcile(&mut port);
        nic.clear();

        assert!(port.mark_deleted(2));
        let report = reconciler.reconcile(&mut port);
        assert!(report.is_clean());

        let mask = VfMask::single(VfId(2));
        assert_eq!(
            nic.calls(),
            vec![
                NicCall::SetLoopback(PortId(0), false),
                NicCall::SetQueueDrop(PortId(0), true),
                NicCall::RemoveVlanFilter(PortId(0), vlan(10), mask),
                NicCall::RemoveVlanFilter(PortId(0), vlan(20), mask),
                NicCall::RemoveMacFilter(PortId(0), VfId(2), mac),
            ]
        );
        assert_eq!(port.slot(2), Some(&VfSlot::free()));
        assert_eq!(report.touched, vec![(PortId(0), VfId(2))]);
    }

    #[test]
    fn test_replacement_removes_retired_filters() {
        let (nic, reconciler, mut port) = setup();
        port.install(slot(4, &[10, 20])).unwrap();
        reconciler.reconcile(&mut port);
        nic.clear();

        port.install(slot(4, &[20, 30])).unwrap();
        reconciler.reconcile(&mut port);

        let mask = VfMask::single(VfId(4));
        assert_eq!(
            nic.calls_of(NicOp::RemoveVlanFilter),
            vec![NicCall::RemoveVlanFilter(PortId(0), vlan(10), mask)]
        );
        assert_eq!(nic.count(NicOp::AddVlanFilter), 2);
        assert!(port.vf(4).unwrap().retired_vlans.is_empty());
    }

    #[test]
    fn test_replacement_clears_dropped_rate_limit() {
        let (nic, reconciler, mut port) = setup();
        port.install(VfSlot { rate: 0.5, ..slot(3, &[10]) }).unwrap();
        reconciler.reconcile(&mut port);
        assert_eq!(
            nic.calls_of(NicOp::SetRateLimit),
            vec![NicCall::SetRateLimit(PortId(0), VfId(3), 5000)]
        );
        nic.clear();

        port.install(slot(3, &[10])).unwrap();
        reconciler.reconcile(&mut port);
        assert_eq!(
            nic.calls_of(NicOp::SetRateLimit),
            vec![NicCall::SetRateLimit(PortId(0), VfId(3), 0)]
        );
        assert!(!port.vf(3).unwrap().retired_rate);

        nic.clear();
        assert!(port.mark_reset(3));
        reconciler.reconcile(&mut port);
        assert_eq!(nic.count(NicOp::SetRateLimit), 0);
    }

    #[test]
    fn test_tiny_rate_is_not_unlimited() {
        assert_eq!(rate_mbps(10_000, 0.00001), 1);
        assert_eq!(rate_mbps(10_000, 0.25), 2500);
        assert_eq!(rate_mbps(10_000, 0.0), 0);
    }

    #[test]
    fn test_reset_reapplies_settings() {
        let (nic, reconciler, mut port) = setup();
        port.install(slot(1, &[10])).unwrap();
        reconciler.reconcile(&mut port);
        nic.clear();

        assert!(port.mark_reset(1));
        reconciler.reconcile(&mut port);

        assert_eq!(nic.count(NicOp::EnablePort), 1);
        assert_eq!(nic.count(NicOp::AddVlanFilter), 1);
        assert_eq!(nic.count(NicOp::SetAntiSpoof), 1);
        assert_eq!(port.vf(1).unwrap().marker, ChangeMarker::Unchanged);
    }

    #[test]
    fn test_failures_reported_and_pass_continues() {
        let (nic, reconciler, mut port) = setup();
        nic.fail_on(NicOp::AddVlanFilter);
        port.install(slot(1, &[10, 20])).unwrap();

        let report = reconciler.reconcile(&mut port);

        assert_eq!(report.failures.len(), 2);
        assert_eq!(report.failures[0].call, NicOp::AddVlanFilter);
        assert_eq!(report.failures[0].vf, Some(VfId(1)));
        assert_eq!(nic.count(NicOp::SetSplitDropEnable), 1);
        assert!(!port.has_pending());
        assert!(report.failure_summary().contains("add_vlan_filter"));
    }

    #[test]
    fn test_reconcile_all_visits_every_port() {
        let mut config = crate::config::DaemonConfig::default();
        config.pciids.push(PciConfig::new(PciAddress::new(0, 8, 0, 0)));
        config.pciids.push(PciConfig::new(PciAddress::new(0, 8, 0, 1)));
        let running = RunningConfig::from_config(&config).unwrap();

        let nic = Arc::new(RecordingNic::new());
        let reconciler = Reconciler::new(nic.clone());
        reconciler.reconcile_all(&running);

        assert_eq!(
            nic.calls_of(NicOp::EnablePort),
            vec![NicCall::EnablePort(PortId(0)), NicCall::EnablePort(PortId(1))]
        );
        assert_eq!(reconciler.reconcile_all(&running).calls, 0);
    }

    #[test]
    fn test_program_qos() {
        let (nic, reconciler, mut port) = setup();
        let mut pctgs = [0u8; MAX_TCS];
        pctgs[0] = 60;
        port.install(VfSlot { tc_pctgs: pctgs, ..slot(1, &[]) }).unwrap();
        port.install(VfSlot { tc_pctgs: pctgs, ..slot(2, &[]) }).unwrap();

        reconciler.program_qos(&port, QosPolicy::Truncate);

        let calls = nic.calls_of(NicOp::EnableQos);
        let NicCall::EnableQos(_, ntcs, shares) = &calls[0] else {
            panic!("expected enable_qos, got {:?}", calls);
        };
        assert_eq!(*ntcs, 4);
        assert_eq!(shares.len(), crate::model::MAX_VFS * 4);
        assert_eq!(shares[4], 50);
        assert_eq!(shares[8], 50);
    }
}
