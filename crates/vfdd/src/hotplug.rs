//! Hot-plug callbacks.
//!
//! A VF config may name a command to run when the VF comes up and another
//! for when it goes away. The daemon decides when they fire; a
//! [`HotplugTrigger`] decides how they run.

use crate::model::PortState;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::fmt;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{info, warn};

/// Path to the shell that runs callback commands.
pub const SHELL_CMD: &str = "/bin/sh";

/// How long a callback may run when no budget is configured.
pub const DEFAULT_HOTPLUG_TIMEOUT: Duration = Duration::from_secs(10);

/// When a callback fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotplugPhase {
    Start,
    Stop,
}

impl fmt::Display for HotplugPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HotplugPhase::Start => write!(f, "start"),
            HotplugPhase::Stop => write!(f, "stop"),
        }
    }
}

/// Runs hot-plug commands on behalf of a VF's owner.
#[async_trait]
pub trait HotplugTrigger: Send + Sync {
    async fn fire(&self, owner: u32, command: &str, phase: HotplugPhase);
}

/// Collects the callbacks of `phase` for every active VF on `port`.
pub fn callbacks(port: &PortState, phase: HotplugPhase) -> Vec<(u32, String)> {
    port.active_vfs()
        .filter_map(|vf| {
            let cmd = match phase {
                HotplugPhase::Start => vf.start_cb.as_ref(),
                HotplugPhase::Stop => vf.stop_cb.as_ref(),
            };
            cmd.map(|c| (vf.owner, c.clone()))
        })
        .collect()
}

/// Runs each command through the shell as the VF owner's uid. A command
/// still running when the budget elapses is killed.
#[derive(Debug, Clone)]
pub struct ShellHotplug {
    timeout: Duration,
}

impl ShellHotplug {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for ShellHotplug {
    fn default() -> Self {
        Self::new(DEFAULT_HOTPLUG_TIMEOUT)
    }
}

#[async_trait]
impl HotplugTrigger for ShellHotplug {
    async fn fire(&self, owner: u32, command: &str, phase: HotplugPhase) {
        let mut cmd = Command::new(SHELL_CMD);
        cmd.arg("-c")
            .arg(command)
            .uid(owner)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let Ok(result) = tokio::time::timeout(self.timeout, cmd.output()).await else {
            warn!(
                owner,
                %phase,
                command,
                timeout_ms = self.timeout.as_millis() as u64,
                "hot-plug callback timed out and was killed"
            );
            return;
        };

        match result {
            Ok(output) if output.status.success() => {
                info!(owner, %phase, command, "hot-plug callback completed");
            }
            Ok(output) => {
                warn!(
                    owner,
                    %phase,
                    command,
                    status = %output.status,
                    stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                    "hot-plug callback failed"
                );
            }
            Err(e) => {
                warn!(owner, %phase, command, error = %e, "cannot run hot-plug callback");
            }
        }
    }
}

/// Ignores every callback.
#[derive(Debug, Clone, Default)]
pub struct NoopHotplug;

#[async_trait]
impl HotplugTrigger for NoopHotplug {
    async fn fire(&self, _owner: u32, _command: &str, _phase: HotplugPhase) {}
}

/// Remembers every callback it is asked to fire.
#[derive(Debug, Default)]
pub struct RecordingHotplug {
    fired: Mutex<Vec<(u32, String, HotplugPhase)>>,
}

impl RecordingHotplug {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fired(&self) -> Vec<(u32, String, HotplugPhase)> {
        self.fired.lock().clone()
    }
}

#[async_trait]
impl HotplugTrigger for RecordingHotplug {
    async fn fire(&self, owner: u32, command: &str, phase: HotplugPhase) {
        self.fired.lock().push((owner, command.to_string(), phase));
    }
}
