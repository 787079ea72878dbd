//! Shutdown control.
//!
//! The daemon moves `Running -> Terminating -> Closed` once per process. The
//! first terminating signal wins; later ones are ignored. Ports are released
//! through the NIC at most once, whichever path gets there first: normal
//! shutdown, a core-dumping signal, or a panic.

use nix::sys::signal::Signal;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::model::RunningConfig;
use vfd_nic::NicControl;

/// Signals the daemon installs handlers for. SIGPIPE stays ignored: a
/// requester that closes its reply pipe early costs one EPIPE, not the daemon.
pub const TRAPPED_SIGNALS: &[Signal] = &[
    Signal::SIGHUP,
    Signal::SIGINT,
    Signal::SIGQUIT,
    Signal::SIGTRAP,
    Signal::SIGABRT,
    Signal::SIGBUS,
    Signal::SIGUSR1,
    Signal::SIGUSR2,
    Signal::SIGALRM,
    Signal::SIGTERM,
    Signal::SIGXCPU,
    Signal::SIGXFSZ,
    Signal::SIGVTALRM,
    Signal::SIGPROF,
    Signal::SIGIO,
    Signal::SIGSYS,
];

/// Process lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Running = 0,
    Terminating = 1,
    Closed = 2,
}

impl LifecycleState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => LifecycleState::Running,
            1 => LifecycleState::Terminating,
            _ => LifecycleState::Closed,
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleState::Running => write!(f, "running"),
            LifecycleState::Terminating => write!(f, "terminating"),
            LifecycleState::Closed => write!(f, "closed"),
        }
    }
}

/// What the signal task must do after [`ShutdownController::handle_signal`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalAction {
    /// Nothing; the signal is ignored or shutdown is already under way.
    Ignore,
    /// The main loop will wind down on its own.
    Shutdown,
    /// Ports are released; restore the default disposition and re-raise.
    Abort,
}

/// Returns true for signals whose default action dumps core.
pub fn is_core_signal(sig: Signal) -> bool {
    matches!(
        sig,
        Signal::SIGQUIT
            | Signal::SIGILL
            | Signal::SIGTRAP
            | Signal::SIGABRT
            | Signal::SIGBUS
            | Signal::SIGFPE
            | Signal::SIGSEGV
            | Signal::SIGSYS
            | Signal::SIGXCPU
            | Signal::SIGXFSZ
    )
}

/// Owns the lifecycle state and the port release path.
pub struct ShutdownController {
    state: AtomicU8,
    released: AtomicBool,
    config: Arc<RunningConfig>,
    nic: Arc<dyn NicControl>,
    notify: Notify,
}

impl ShutdownController {
    /// Creates a new controller in the `Running` state.
    pub fn new(config: Arc<RunningConfig>, nic: Arc<dyn NicControl>) -> Self {
        Self {
            state: AtomicU8::new(LifecycleState::Running as u8),
            released: AtomicBool::new(false),
            config,
            nic,
            notify: Notify::new(),
        }
    }

    pub fn state(&self) -> LifecycleState {
        LifecycleState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_running(&self) -> bool {
        self.state() == LifecycleState::Running
    }

    /// Moves `Running -> Terminating`. Returns false if that already happened.
    pub fn begin(&self, reason: &str) -> bool {
        let won = self
            .state
            .compare_exchange(
                LifecycleState::Running as u8,
                LifecycleState::Terminating as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if won {
            info!(reason, "shutting down");
            self.notify.notify_waiters();
        } else {
            debug!(reason, state = %self.state(), "shutdown already in progress");
        }
        won
    }

    /// Applies the daemon's policy for `sig`.
    pub fn handle_signal(&self, sig: Signal) -> SignalAction {
        if sig == Signal::SIGHUP {
            debug!(signal = %sig, "signal ignored");
            return SignalAction::Ignore;
        }
        if !self.begin(sig.as_str()) {
            return SignalAction::Ignore;
        }

        if is_core_signal(sig) {
            warn!(signal = %sig, "fatal signal, releasing ports before abort");
            self.release_ports();
            SignalAction::Abort
        } else {
            SignalAction::Shutdown
        }
    }

    /// Tells the NIC to release every port. Only the first call does any
    /// work; it returns the number of ports released.
    ///
    /// Takes no port locks, so it is safe from a panic hook while another
    /// thread holds one.
    pub fn release_ports(&self) -> usize {
        if self.released.swap(true, Ordering::AcqRel) {
            return 0;
        }

        let mut released = 0;
        for (id, pciid) in self.config.port_ids() {
            match self.nic.release_port(*id) {
                Ok(()) => {
                    info!(port = %id, %pciid, "port released");
                    released += 1;
                }
                Err(e) => warn!(port = %id, %pciid, error = %e, "port release failed"),
            }
        }
        released
    }

    /// Moves to `Terminating` and releases every port, for paths where the
    /// process cannot carry on: a panic or a failed start-up. Returns the
    /// number of ports released.
    pub fn fail(&self, reason: &str) -> usize {
        self.begin(reason);
        self.release_ports()
    }

    /// Marks the process `Closed`.
    pub fn close(&self) {
        self.state
            .store(LifecycleState::Closed as u8, Ordering::Release);
        self.notify.notify_waiters();
        info!("closed");
    }

    /// Resolves once the controller leaves `Running`.
    pub async fn terminated(&self) {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if !self.is_running() {
            return;
        }
        notified.await;
    }
}

impl fmt::Debug for ShutdownController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShutdownController")
            .field("state", &self.state())
            .field("released", &self.released.load(Ordering::Relaxed))
            .finish()
    }
}
