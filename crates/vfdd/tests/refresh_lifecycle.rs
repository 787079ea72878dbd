//! Integration tests for the refresh worker and shutdown controller
//!
//! - hardware resets re-apply a VF's settings without a request
//! - a reset queued behind a delete is dropped
//! - a fatal signal releases every port exactly once

use nix::sys::signal::Signal;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::{Duration, Instant};

use vfd_nic::{NicCall, NicOp, PortId, RecordingNic, VfId, VfMask};
use vfd_types::{PciAddress, VlanId};
use vfdd::{
    ChangeMarker, LifecycleState, PciConfig, PortState, Reconciler, RefreshWorker,
    RunningConfig, ShutdownController, SignalAction, VfSlot,
};

fn running(pfs: u8) -> Arc<RunningConfig> {
    let ports = (0..pfs)
        .map(|i| {
            let mut port = PortState::new(
                PortId(u16::from(i)),
                &PciConfig::new(PciAddress::new(0, 8, 0, i)),
            );
            port.marker = ChangeMarker::Added;
            port
        })
        .collect();
    Arc::new(RunningConfig::new(ports))
}

fn install(config: &RunningConfig, num: i32, vlans: &[u16]) {
    config.ports()[0]
        .lock()
        .install(VfSlot {
            num,
            vlans: vlans.iter().map(|v| VlanId::new(*v).unwrap()).collect(),
            mac_anti_spoof: true,
            strip_stag: true,
            ..VfSlot::free()
        })
        .unwrap();
}

/// Polls until `cond` holds or a few seconds pass.
fn wait_for(cond: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    cond()
}

#[test]
fn test_reset_reapplies_vf_settings() {
    let config = running(1);
    install(&config, 4, &[42]);
    let nic = Arc::new(RecordingNic::new());
    let reconciler = Reconciler::new(nic.clone());
    reconciler.reconcile_all(&config);
    nic.clear();

    let (worker, resets) = RefreshWorker::spawn(config.clone(), reconciler, 16).unwrap();
    assert!(resets.notify(PortId(0), VfId(4)));
    assert!(wait_for(|| nic.count(NicOp::SetUntaggedRx) == 1));
    worker.stop();

    let calls = nic.calls();
    assert_eq!(
        calls[..2].to_vec(),
        vec![
            NicCall::SetLoopback(PortId(0), false),
            NicCall::SetQueueDrop(PortId(0), true),
        ]
    );
    assert!(calls.contains(&NicCall::AddVlanFilter(
        PortId(0),
        VlanId::new(42).unwrap(),
        VfMask::single(VfId(4))
    )));
    assert!(calls.contains(&NicCall::SetAntiSpoof(PortId(0), VfId(4), true, false)));
    assert!(calls.contains(&NicCall::SetStripTag(PortId(0), VfId(4), true)));
    assert!(calls.contains(&NicCall::SetInsertTag(PortId(0), VfId(4), None)));

    let port = config.ports()[0].lock();
    assert_eq!(port.vf(4).unwrap().marker, ChangeMarker::Unchanged);
    assert_eq!(port.num_vfs(), 1);
}

#[test]
fn test_resets_for_several_vfs_processed_in_order() {
    let config = running(1);
    install(&config, 1, &[10]);
    install(&config, 2, &[20]);
    let nic = Arc::new(RecordingNic::new());
    let reconciler = Reconciler::new(nic.clone());
    reconciler.reconcile_all(&config);
    nic.clear();

    let (worker, resets) = RefreshWorker::spawn(config.clone(), reconciler, 16).unwrap();
    assert!(resets.notify(PortId(0), VfId(2)));
    assert!(resets.notify(PortId(0), VfId(1)));
    assert!(wait_for(|| nic.count(NicOp::SetSplitDropEnable) == 2));
    worker.stop();

    let order: Vec<VfId> = nic
        .calls_of(NicOp::AddVlanFilter)
        .into_iter()
        .filter_map(|call| match call {
            NicCall::AddVlanFilter(_, vlan, _) if vlan.as_u16() == 20 => Some(VfId(2)),
            NicCall::AddVlanFilter(_, vlan, _) if vlan.as_u16() == 10 => Some(VfId(1)),
            _ => None,
        })
        .collect();
    assert_eq!(order, vec![VfId(2), VfId(1)]);
}

#[test]
fn test_reset_after_delete_is_dropped() {
    let config = running(1);
    install(&config, 3, &[30]);
    let nic = Arc::new(RecordingNic::new());
    let reconciler = Reconciler::new(nic.clone());
    reconciler.reconcile_all(&config);

    {
        let mut port = config.ports()[0].lock();
        assert!(port.mark_deleted(3));
        reconciler.reconcile(&mut port);
    }
    nic.clear();

    let report = vfdd::refresh::restore_vf(
        &config,
        &reconciler,
        vfdd::ResetEvent {
            port: PortId(0),
            vf: VfId(3),
        },
    );
    assert!(report.is_none());
    assert!(nic.is_empty());
}

#[test]
fn test_fatal_signal_releases_ports_once() {
    let config = running(1);
    let nic = Arc::new(RecordingNic::new());
    let shutdown = ShutdownController::new(config, nic.clone());

    assert_eq!(shutdown.handle_signal(Signal::SIGBUS), SignalAction::Abort);
    assert_eq!(
        nic.calls_of(NicOp::ReleasePort),
        vec![NicCall::ReleasePort(PortId(0))]
    );

    assert_eq!(shutdown.handle_signal(Signal::SIGTERM), SignalAction::Ignore);
    assert_eq!(shutdown.release_ports(), 0);
    assert_eq!(nic.count(NicOp::ReleasePort), 1);
}

#[test]
fn test_release_failure_does_not_stop_others() {
    let config = running(3);
    let nic = Arc::new(RecordingNic::new());
    nic.fail_on(NicOp::ReleasePort);
    let shutdown = ShutdownController::new(config, nic.clone());

    assert_eq!(shutdown.release_ports(), 0);
    assert_eq!(nic.count(NicOp::ReleasePort), 3);
}

#[test]
fn test_release_ignores_held_port_lock() {
    let config = running(2);
    let nic = Arc::new(RecordingNic::new());
    let shutdown = ShutdownController::new(config.clone(), nic.clone());

    let _held = config.ports()[1].lock();
    assert_eq!(shutdown.release_ports(), 2);
}

#[tokio::test]
async fn test_normal_shutdown_sequence() {
    let config = running(2);
    let nic = Arc::new(RecordingNic::new());
    let shutdown = Arc::new(ShutdownController::new(config, nic.clone()));

    let waiter = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { shutdown.terminated().await })
    };
    assert_eq!(shutdown.handle_signal(Signal::SIGUSR1), SignalAction::Shutdown);
    tokio::time::timeout(Duration::from_secs(1), waiter)
        .await
        .expect("waiter not woken")
        .unwrap();

    assert!(nic.is_empty());
    assert_eq!(shutdown.release_ports(), 2);
    shutdown.close();
    assert_eq!(shutdown.state(), LifecycleState::Closed);
}
