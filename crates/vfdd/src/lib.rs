//! vfdd - SR-IOV virtual function configuration daemon
//!
//! Keeps a running configuration of the VFs carved out of each managed PF
//! and pushes it to the NIC through the [`vfd_nic::NicControl`] interface.
//!
//! # Architecture
//!
//! - [`validator`]: admission checks on a VF definition
//! - [`qos`]: traffic-class share normalization
//! - [`model`]: ports, VF slots and change markers
//! - [`reconciler`]: turns change markers into ordered NIC calls
//! - [`server`]: the add/delete/show/ping/verbose/dump request server
//! - [`refresh`]: re-applies VF settings after a hardware reset
//! - [`lifecycle`]: signal handling and port release on shutdown
//!
//! Requests arrive through a [`transport::RequestSource`]; VF definitions
//! come from a [`vf_config::ConfigLoader`].

pub mod config;
pub mod error;
pub mod hotplug;
pub mod lifecycle;
pub mod logging;
pub mod model;
pub mod qos;
pub mod reconciler;
pub mod refresh;
pub mod request;
pub mod server;
pub mod show;
pub mod transport;
pub mod validator;
pub mod vf_config;

pub use config::{DaemonConfig, PciConfig, DEFAULT_PARMS_PATH};
pub use error::{VfdError, VfdResult};
pub use hotplug::{HotplugPhase, HotplugTrigger, NoopHotplug, RecordingHotplug, ShellHotplug};
pub use lifecycle::{LifecycleState, ShutdownController, SignalAction, TRAPPED_SIGNALS};
pub use logging::{AtomicVerbosity, LogControl, VerbosityControl};
pub use model::{ChangeMarker, PortState, RunningConfig, VfSlot};
pub use qos::QosPolicy;
pub use reconciler::{HardwareFailure, ReconcileReport, Reconciler};
pub use refresh::{RefreshWorker, ResetEvent, ResetNotifier};
pub use request::{Reply, ReplyState, Request, RequestKind};
pub use server::{RequestServer, ServerOptions};
pub use vf_config::{ConfigLoader, DirLoader, VfDefinition};

/// Daemon version reported by ping.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
