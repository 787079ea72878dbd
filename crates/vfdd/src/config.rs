//! Daemon parameter file.
//!
//! Loads and validates the daemon parameters from TOML.
//! Default location: /etc/vfd/vfd.toml
//!
//! ```toml
//! config_dir = "/var/lib/vfd/config"
//! fifo_path = "/var/lib/vfd/request"
//! log_level = 1
//!
//! [[pciids]]
//! id = "0000:08:00.0"
//! mtu = 9000
//! qos = true
//! ntcs = 4
//! ```

use crate::error::{VfdError, VfdResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use vfd_types::PciAddress;

/// Default parameter file location.
pub const DEFAULT_PARMS_PATH: &str = "/etc/vfd/vfd.toml";

/// One physical function the daemon manages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PciConfig {
    /// PCI address of the PF
    pub id: PciAddress,

    /// Largest MTU any VF on this PF may request
    #[serde(default = "default_mtu")]
    pub mtu: u32,

    /// Allow VF to VF traffic to loop back inside the NIC
    #[serde(default)]
    pub loopback: bool,

    /// Program traffic-class bandwidth shares on this PF
    #[serde(default)]
    pub qos: bool,

    /// Number of traffic classes (4 or 8)
    #[serde(default = "default_ntcs")]
    pub ntcs: u8,

    /// Hardware MAC filter capacity shared by all VFs
    #[serde(default = "default_max_macs")]
    pub max_macs: usize,

    /// Hardware VLAN filter capacity shared by all VFs
    #[serde(default = "default_max_vlans")]
    pub max_vlans: usize,

    /// Link speed that VF rate fractions are scaled against
    #[serde(default = "default_link_rate")]
    pub link_rate_mbps: u32,
}

impl PciConfig {
    /// Creates a PF entry with default settings.
    pub fn new(id: PciAddress) -> Self {
        Self {
            id,
            mtu: default_mtu(),
            loopback: false,
            qos: false,
            ntcs: default_ntcs(),
            max_macs: default_max_macs(),
            max_vlans: default_max_vlans(),
            link_rate_mbps: default_link_rate(),
        }
    }
}

/// Complete daemon parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Directory holding one JSON config per VF
    #[serde(default = "default_config_dir")]
    pub config_dir: PathBuf,

    /// Named pipe requests arrive on
    #[serde(default = "default_fifo_path")]
    pub fifo_path: PathBuf,

    /// Verbosity once start-up has finished
    #[serde(default = "default_log_level")]
    pub log_level: u8,

    /// Verbosity while starting up
    #[serde(default = "default_init_log_level")]
    pub init_log_level: u8,

    /// Keep VF config files after a successful delete
    #[serde(default)]
    pub delete_keep: bool,

    /// Program QoS on PFs that ask for it
    #[serde(default = "default_enable_qos")]
    pub enable_qos: bool,

    /// How long a reply pipe may take to accept a reply, in milliseconds
    #[serde(default = "default_reply_timeout")]
    pub reply_timeout_ms: u64,

    /// Time budget for one NIC call in milliseconds (0 disables the bound)
    #[serde(default = "default_nic_timeout")]
    pub nic_timeout_ms: u64,

    /// Time a hot-plug callback may run before it is killed, in milliseconds
    #[serde(default = "default_hotplug_timeout")]
    pub hotplug_timeout_ms: u64,

    /// Depth of the VF reset notification queue
    #[serde(default = "default_refresh_queue_depth")]
    pub refresh_queue_depth: usize,

    /// Managed physical functions
    #[serde(default)]
    pub pciids: Vec<PciConfig>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            config_dir: default_config_dir(),
            fifo_path: default_fifo_path(),
            log_level: default_log_level(),
            init_log_level: default_init_log_level(),
            delete_keep: false,
            enable_qos: default_enable_qos(),
            reply_timeout_ms: default_reply_timeout(),
            nic_timeout_ms: default_nic_timeout(),
            hotplug_timeout_ms: default_hotplug_timeout(),
            refresh_queue_depth: default_refresh_queue_depth(),
            pciids: Vec::new(),
        }
    }
}

// Default functions
fn default_mtu() -> u32 {
    9000
}

fn default_ntcs() -> u8 {
    4
}

fn default_max_macs() -> usize {
    128
}

fn default_max_vlans() -> usize {
    64
}

fn default_link_rate() -> u32 {
    10000
}

fn default_config_dir() -> PathBuf {
    PathBuf::from("/var/lib/vfd/config")
}

fn default_fifo_path() -> PathBuf {
    PathBuf::from("/var/lib/vfd/request")
}

fn default_log_level() -> u8 {
    1
}

fn default_init_log_level() -> u8 {
    2
}

fn default_enable_qos() -> bool {
    true
}

fn default_reply_timeout() -> u64 {
    2000
}

fn default_nic_timeout() -> u64 {
    2000
}

fn default_hotplug_timeout() -> u64 {
    10_000
}

fn default_refresh_queue_depth() -> usize {
    64
}

impl DaemonConfig {
    /// Loads and validates the parameter file at `path`.
    pub fn load(path: impl AsRef<Path>) -> VfdResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| VfdError::config(path.display().to_string(), e.to_string()))?;
        let config = Self::from_toml_str(&content)
            .map_err(|e| VfdError::config(path.display().to_string(), e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Parses parameters from a TOML string without validating them.
    pub fn from_toml_str(content: &str) -> VfdResult<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Checks the parameters for consistency.
    ///
    /// An empty PF list is fatal: the daemon has nothing to manage.
    pub fn validate(&self) -> VfdResult<()> {
        if self.pciids.is_empty() {
            return Err(VfdError::fatal_init("no pciids configured"));
        }

        let mut seen = HashSet::new();
        for pf in &self.pciids {
            if !seen.insert(pf.id) {
                return Err(VfdError::config(
                    "pciids",
                    format!("{} is listed more than once", pf.id),
                ));
            }
            if pf.ntcs != 4 && pf.ntcs != 8 {
                return Err(VfdError::config(
                    "pciids",
                    format!("{}: ntcs must be 4 or 8, not {}", pf.id, pf.ntcs),
                ));
            }
            if pf.link_rate_mbps == 0 {
                return Err(VfdError::config(
                    "pciids",
                    format!("{}: link_rate_mbps must be positive", pf.id),
                ));
            }
        }

        if self.refresh_queue_depth == 0 {
            return Err(VfdError::config(
                "refresh_queue_depth",
                "must be positive",
            ));
        }

        Ok(())
    }

    /// Returns the NIC call budget, or None when calls are unbounded.
    pub fn nic_timeout(&self) -> Option<Duration> {
        (self.nic_timeout_ms > 0).then(|| Duration::from_millis(self.nic_timeout_ms))
    }

    /// Returns the reply delivery budget.
    pub fn reply_timeout(&self) -> Duration {
        Duration::from_millis(self.reply_timeout_ms)
    }

    pub fn hotplug_timeout(&self) -> Duration {
        Duration::from_millis(self.hotplug_timeout_ms)
    }
}
