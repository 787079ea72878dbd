//! Re-applies VF settings after a hardware reset.
//!
//! The NIC layer reports a VF reset by calling [`ResetNotifier::notify`],
//! which only queues the event. A dedicated thread drains the queue in
//! arrival order, marks each VF `Reset` and reconciles its port. Events for
//! the same VF therefore never overtake each other, and a reset queued
//! behind a delete finds the slot already free and is dropped.

use crate::error::{VfdError, VfdResult};
use crate::model::RunningConfig;
use crate::reconciler::{ReconcileReport, Reconciler};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use vfd_nic::{PortId, VfId};

/// A VF the hardware has reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResetEvent {
    pub port: PortId,
    pub vf: VfId,
}

#[derive(Debug)]
enum Message {
    Reset(ResetEvent),
    Stop,
}

/// Queues reset events for the refresh worker. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ResetNotifier {
    tx: mpsc::Sender<Message>,
}

impl ResetNotifier {
    /// Queues a reset of `vf` on `port` without blocking. Returns false if
    /// the event was dropped because the queue is full or the worker is gone.
    pub fn notify(&self, port: PortId, vf: VfId) -> bool {
        match self.tx.try_send(Message::Reset(ResetEvent { port, vf })) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(%port, %vf, "refresh queue full, reset dropped");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(%port, %vf, "refresh worker stopped, reset dropped");
                false
            }
        }
    }
}

/// The thread that services reset events.
#[derive(Debug)]
pub struct RefreshWorker {
    handle: JoinHandle<()>,
    stopping: Arc<AtomicBool>,
    tx: mpsc::Sender<Message>,
}

impl RefreshWorker {
    /// Starts the worker thread with room for `depth` queued events.
    pub fn spawn(
        config: Arc<RunningConfig>,
        reconciler: Reconciler,
        depth: usize,
    ) -> VfdResult<(Self, ResetNotifier)> {
        let (tx, mut rx) = mpsc::channel(depth.max(1));
        let stopping = Arc::new(AtomicBool::new(false));
        let flag = stopping.clone();

        let handle = thread::Builder::new()
            .name("vfd-refresh".to_string())
            .spawn(move || {
                info!("refresh worker started");
                while let Some(message) = rx.blocking_recv() {
                    if flag.load(Ordering::Acquire) {
                        break;
                    }
                    match message {
                        Message::Reset(event) => {
                            restore_vf(&config, &reconciler, event);
                        }
                        Message::Stop => break,
                    }
                }
                info!("refresh worker stopped");
            })
            .map_err(|e| VfdError::fatal_init(format!("cannot start refresh worker: {}", e)))?;

        let notifier = ResetNotifier { tx: tx.clone() };
        Ok((
            Self {
                handle,
                stopping,
                tx,
            },
            notifier,
        ))
    }

    /// Asks the worker to finish and waits for it. Events still queued are
    /// discarded. Blocks; call from a blocking context.
    pub fn stop(self) {
        self.stopping.store(true, Ordering::Release);
        // A full queue wakes the worker anyway; it sees the flag on the next event.
        let _ = self.tx.try_send(Message::Stop);
        if self.handle.join().is_err() {
            warn!("refresh worker panicked");
        }
    }
}

/// Marks the VF named by `event` for reset and reconciles its port.
///
/// Returns `None` when the port is unknown or the VF is not active.
pub fn restore_vf(
    config: &RunningConfig,
    reconciler: &Reconciler,
    event: ResetEvent,
) -> Option<ReconcileReport> {
    let Some(port) = config.port(event.port) else {
        warn!(port = %event.port, vf = %event.vf, "reset for unknown port ignored");
        return None;
    };

    let mut port = port.lock();
    if !port.mark_reset(i32::from(event.vf.as_u16())) {
        debug!(port = %event.port, vf = %event.vf, "reset for inactive VF ignored");
        return None;
    }

    info!(port = %event.port, vf = %event.vf, "re-applying VF settings after reset");
    let report = reconciler.reconcile(&mut port);
    if !report.is_clean() {
        warn!(
            port = %event.port,
            vf = %event.vf,
            failures = %report.failure_summary(),
            "VF restore incomplete"
        );
    }
    Some(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PciConfig;
    use crate::model::{ChangeMarker, PortState, VfSlot};
    use pretty_assertions::assert_eq;
    use vfd_nic::{NicCall, NicOp, RecordingNic};
    use vfd_types::{PciAddress, VlanId};

    fn running() -> RunningConfig {
        let mut port = PortState::new(PortId(0), &PciConfig::new(PciAddress::new(0, 8, 0, 0)));
        port.install(VfSlot {
            num: 2,
            vlans: vec![VlanId::new(100).unwrap()],
            strip_stag: true,
            ..VfSlot::free()
        })
        .unwrap();
        RunningConfig::new(vec![port])
    }

    #[test]
    fn test_restore_reapplies_settings() {
        let config = running();
        let nic = Arc::new(RecordingNic::new());
        let reconciler = Reconciler::new(nic.clone());
        reconciler.reconcile_all(&config);
        nic.clear();

        let report = restore_vf(
            &config,
            &reconciler,
            ResetEvent {
                port: PortId(0),
                vf: VfId(2),
            },
        )
        .unwrap();

        assert!(report.is_clean());
        assert_eq!(report.touched, vec![(PortId(0), VfId(2))]);
        assert_eq!(nic.count(NicOp::AddVlanFilter), 1);
        assert_eq!(nic.count(NicOp::EnablePort), 1);
        assert!(nic
            .calls()
            .contains(&NicCall::SetStripTag(PortId(0), VfId(2), true)));
        assert_eq!(
            config.ports()[0].lock().slot(2).unwrap().marker,
            ChangeMarker::Unchanged
        );
    }

    #[test]
    fn test_restore_ignores_unknown_targets() {
        let config = running();
        let nic = Arc::new(RecordingNic::new());
        let reconciler = Reconciler::new(nic.clone());

        let unknown_port = ResetEvent {
            port: PortId(5),
            vf: VfId(2),
        };
        let free_vf = ResetEvent {
            port: PortId(0),
            vf: VfId(3),
        };
        assert!(restore_vf(&config, &reconciler, unknown_port).is_none());
        assert!(restore_vf(&config, &reconciler, free_vf).is_none());
        assert!(nic.is_empty());
    }

    #[test]
    fn test_worker_drains_and_stops() {
        let config = Arc::new(running());
        let nic = Arc::new(RecordingNic::new());
        let reconciler = Reconciler::new(nic.clone());
        reconciler.reconcile_all(&config);
        nic.clear();

        let (worker, notifier) = RefreshWorker::spawn(config.clone(), reconciler, 8).unwrap();
        assert!(notifier.notify(PortId(0), VfId(2)));

        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        while nic.count(NicOp::SetSplitDropEnable) == 0 && std::time::Instant::now() < deadline {
            thread::sleep(std::time::Duration::from_millis(5));
        }
        worker.stop();

        assert_eq!(nic.count(NicOp::SetSplitDropEnable), 1);
        assert!(!notifier.notify(PortId(0), VfId(2)));
    }
}
