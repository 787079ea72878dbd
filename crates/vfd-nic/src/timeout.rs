//! Bounds how long a single NIC call may block.
//!
//! Calls run one at a time on a single worker thread. When the budget
//! elapses first the caller gets [`NicError::Timeout`]; the stuck call keeps
//! the worker busy and every call made before it returns fails at once with
//! the same error, so no two calls ever reach the hardware together.

use crate::api::{NicControl, NicOp};
use crate::error::{NicError, NicResult};
use crate::types::{AllowFlags, PortId, PortStats, VfId, VfMask, VfStats};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};
use vfd_types::{MacAddress, VlanId};

type Job<N> = Box<dyn FnOnce(&N) + Send>;

pub struct TimeoutNic<N> {
    inner: Arc<N>,
    budget: Duration,
    /// Held for the whole of a call.
    jobs: Mutex<mpsc::Sender<Job<N>>>,
    busy: Arc<AtomicBool>,
}

/// Clears the busy flag when a call returns, including by panic.
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<N> TimeoutNic<N>
where
    N: NicControl + 'static,
{
    /// Creates a new wrapper around `inner` allowing `budget` per call and
    /// starts its worker thread. The thread exits once the wrapper is dropped.
    pub fn new(inner: Arc<N>, budget: Duration) -> NicResult<Self> {
        let (tx, rx) = mpsc::channel::<Job<N>>();
        let busy = Arc::new(AtomicBool::new(false));

        let worker_nic = Arc::clone(&inner);
        thread::Builder::new()
            .name("nic-calls".to_string())
            .spawn(move || {
                for job in rx {
                    job(&worker_nic);
                }
                debug!("NIC call worker stopped");
            })
            .map_err(|e| NicError::internal(format!("cannot start NIC call worker: {}", e)))?;

        Ok(Self {
            inner,
            budget,
            jobs: Mutex::new(tx),
            busy,
        })
    }

    pub fn inner(&self) -> &Arc<N> {
        &self.inner
    }

    fn timed_out(&self, op: NicOp) -> NicError {
        NicError::Timeout {
            op: op.to_string(),
            millis: self.budget.as_millis() as u64,
        }
    }

    fn bounded<T, F>(&self, op: NicOp, call: F) -> NicResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&N) -> NicResult<T> + Send + 'static,
    {
        let jobs = self.jobs.lock();
        if self.busy.load(Ordering::Acquire) {
            debug!(%op, "earlier NIC call still running, call refused");
            return Err(self.timed_out(op));
        }

        let (tx, rx) = mpsc::sync_channel(1);
        self.busy.store(true, Ordering::Release);
        let busy = Arc::clone(&self.busy);
        let job: Job<N> = Box::new(move |nic| {
            let result = {
                let _guard = BusyGuard(&busy);
                call(nic)
            };
            let _ = tx.send(result);
        });
        if jobs.send(job).is_err() {
            self.busy.store(false, Ordering::Release);
            return Err(NicError::internal(format!(
                "NIC call worker is gone, {} not sent",
                op
            )));
        }

        match rx.recv_timeout(self.budget) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                let err = self.timed_out(op);
                warn!(%op, error = %err, "NIC call exceeded its time budget");
                Err(err)
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                Err(NicError::internal(format!("{} call panicked", op)))
            }
        }
    }
}

impl<N> NicControl for TimeoutNic<N>
where
    N: NicControl + 'static,
{
    fn enable_port(&self, port: PortId) -> NicResult<()> {
        self.bounded(NicOp::EnablePort, move |n| n.enable_port(port))
    }

    fn add_vlan_filter(&self, port: PortId, vlan: VlanId, mask: VfMask) -> NicResult<()> {
        self.bounded(NicOp::AddVlanFilter, move |n| {
            n.add_vlan_filter(port, vlan, mask)
        })
    }

    fn remove_vlan_filter(&self, port: PortId, vlan: VlanId, mask: VfMask) -> NicResult<()> {
        self.bounded(NicOp::RemoveVlanFilter, move |n| {
            n.remove_vlan_filter(port, vlan, mask)
        })
    }

    fn add_mac_filter(&self, port: PortId, vf: VfId, mac: MacAddress) -> NicResult<()> {
        self.bounded(NicOp::AddMacFilter, move |n| n.add_mac_filter(port, vf, mac))
    }

    fn remove_mac_filter(&self, port: PortId, vf: VfId, mac: MacAddress) -> NicResult<()> {
        self.bounded(NicOp::RemoveMacFilter, move |n| {
            n.remove_mac_filter(port, vf, mac)
        })
    }

    fn set_rate_limit(&self, port: PortId, vf: VfId, mbps: u32) -> NicResult<()> {
        self.bounded(NicOp::SetRateLimit, move |n| n.set_rate_limit(port, vf, mbps))
    }

    fn set_anti_spoof(&self, port: PortId, vf: VfId, mac: bool, vlan: bool) -> NicResult<()> {
        self.bounded(NicOp::SetAntiSpoof, move |n| {
            n.set_anti_spoof(port, vf, mac, vlan)
        })
    }

    fn set_strip_tag(&self, port: PortId, vf: VfId, enable: bool) -> NicResult<()> {
        self.bounded(NicOp::SetStripTag, move |n| n.set_strip_tag(port, vf, enable))
    }

    fn set_insert_tag(&self, port: PortId, vf: VfId, vlan: Option<VlanId>) -> NicResult<()> {
        self.bounded(NicOp::SetInsertTag, move |n| n.set_insert_tag(port, vf, vlan))
    }

    fn set_allow_flags(&self, port: PortId, vf: VfId, flags: AllowFlags) -> NicResult<()> {
        self.bounded(NicOp::SetAllowFlags, move |n| {
            n.set_allow_flags(port, vf, flags)
        })
    }

    fn set_split_drop_enable(&self, port: PortId, vf: VfId, enable: bool) -> NicResult<()> {
        self.bounded(NicOp::SetSplitDropEnable, move |n| {
            n.set_split_drop_enable(port, vf, enable)
        })
    }

    fn set_untagged_rx(&self, port: PortId, vf: VfId, accept: bool) -> NicResult<()> {
        self.bounded(NicOp::SetUntaggedRx, move |n| {
            n.set_untagged_rx(port, vf, accept)
        })
    }

    fn set_loopback(&self, port: PortId, enable: bool) -> NicResult<()> {
        self.bounded(NicOp::SetLoopback, move |n| n.set_loopback(port, enable))
    }

    fn set_queue_drop(&self, port: PortId, enable: bool) -> NicResult<()> {
        self.bounded(NicOp::SetQueueDrop, move |n| n.set_queue_drop(port, enable))
    }

    fn enable_qos(&self, port: PortId, ntcs: u8, shares: &[u8]) -> NicResult<()> {
        let shares = shares.to_vec();
        self.bounded(NicOp::EnableQos, move |n| n.enable_qos(port, ntcs, &shares))
    }

    fn port_stats(&self, port: PortId) -> NicResult<PortStats> {
        self.bounded(NicOp::PortStats, move |n| n.port_stats(port))
    }

    fn vf_stats(&self, port: PortId, vf: VfId) -> NicResult<VfStats> {
        self.bounded(NicOp::VfStats, move |n| n.vf_stats(port, vf))
    }

    fn release_port(&self, port: PortId) -> NicResult<()> {
        self.bounded(NicOp::ReleasePort, move |n| n.release_port(port))
    }
}
