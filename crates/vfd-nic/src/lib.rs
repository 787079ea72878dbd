//! NIC control interface for SR-IOV virtual function management.
//!
//! The VF daemon never talks to registers directly. Every hardware effect of
//! reconciling the running configuration goes through the [`NicControl`]
//! trait, which the register-level driver binding implements.
//!
//! # Architecture
//!
//! - [`types`]: port/VF identifiers, VF masks, counters
//! - [`error`]: status codes and error types for failed calls
//! - [`api`]: the [`NicControl`] trait and the [`NicOp`] call catalogue
//! - [`dry_run`]: a backend that logs every call and touches nothing
//! - [`recording`]: a backend that records calls and can inject failures
//! - [`timeout`]: a wrapper bounding how long any single call may take
//!
//! # Example
//!
//! ```ignore
//! use vfd_nic::{NicControl, NicResult, PortId, VfId};
//!
//! fn lock_down(nic: &dyn NicControl, port: PortId, vf: VfId) -> NicResult<()> {
//!     nic.set_anti_spoof(port, vf, true, true)?;
//!     nic.set_strip_tag(port, vf, false)?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod dry_run;
pub mod error;
pub mod recording;
pub mod timeout;
pub mod types;

pub use api::{NicControl, NicOp};
pub use dry_run::DryRunNic;
pub use error::{NicError, NicResult, NicStatus};
pub use recording::{NicCall, RecordingNic};
pub use timeout::TimeoutNic;
pub use types::{AllowFlags, PortId, PortStats, VfId, VfMask, VfStats};
