//! VF config resources.
//!
//! Each VF is defined by one JSON document, named by its resource (the file
//! name under the config directory). Values are kept as written; range and
//! syntax checks belong to the validator so that a bad value is reported as
//! a rejected request rather than a parse failure.
//!
//! ```json
//! {
//!   "name": "vm1-eth0",
//!   "pciid": "0000:08:00.0",
//!   "vfid": 3,
//!   "vlans": [10],
//!   "macs": ["fa:16:3e:00:00:01"],
//!   "strip_stag": true,
//!   "rate": 0.5,
//!   "tc_pctgs": [25, 25, 25, 25]
//! }
//! ```

use crate::error::{VfdError, VfdResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use tracing::debug;
use vfd_types::PciAddress;

/// A VF definition as supplied by a config resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VfDefinition {
    #[serde(default)]
    pub name: String,

    pub pciid: PciAddress,

    pub vfid: i64,

    #[serde(default)]
    pub vlans: Vec<i64>,

    #[serde(default)]
    pub macs: Vec<String>,

    #[serde(default)]
    pub strip_stag: bool,

    #[serde(default)]
    pub insert_stag: bool,

    #[serde(default)]
    pub vlan_anti_spoof: bool,

    #[serde(default)]
    pub mac_anti_spoof: bool,

    #[serde(default)]
    pub allow_bcast: bool,

    #[serde(default)]
    pub allow_mcast: bool,

    #[serde(default)]
    pub allow_un_ucast: bool,

    /// Transmit limit as a fraction of the PF link rate; 0 is unlimited.
    #[serde(default)]
    pub rate: f64,

    /// Percentage share per traffic class; missing classes are 0.
    #[serde(default)]
    pub tc_pctgs: Vec<u32>,

    #[serde(default)]
    pub mtu: Option<i64>,

    #[serde(default)]
    pub start_cb: Option<String>,

    #[serde(default)]
    pub stop_cb: Option<String>,

    /// Uid of the principal that presented this definition.
    #[serde(skip)]
    pub owner: u32,
}

impl VfDefinition {
    /// Creates a bare definition for `vfid` on `pciid`.
    pub fn new(pciid: PciAddress, vfid: i64) -> Self {
        Self {
            name: String::new(),
            pciid,
            vfid,
            vlans: Vec::new(),
            macs: Vec::new(),
            strip_stag: false,
            insert_stag: false,
            vlan_anti_spoof: false,
            mac_anti_spoof: false,
            allow_bcast: false,
            allow_mcast: false,
            allow_un_ucast: false,
            rate: 0.0,
            tc_pctgs: Vec::new(),
            mtu: None,
            start_cb: None,
            stop_cb: None,
            owner: 0,
        }
    }

    /// Parses a definition from JSON.
    pub fn from_json(content: &str) -> VfdResult<Self> {
        Ok(serde_json::from_str(content)?)
    }
}

/// Source of VF definitions, keyed by resource name.
pub trait ConfigLoader: Send + Sync {
    /// Loads the definition named `resource`.
    fn load(&self, resource: &str) -> VfdResult<VfDefinition>;

    /// Lists every resource currently available, in a stable order.
    fn list(&self) -> VfdResult<Vec<String>>;

    /// Removes `resource` after its VF has been deleted.
    fn discard(&self, resource: &str) -> VfdResult<()>;
}

/// Loads VF definitions from `*.json` files in a directory.
///
/// A resource is either a file name relative to the directory or an
/// absolute path. The owner of a definition is the uid owning its file.
#[derive(Debug, Clone)]
pub struct DirLoader {
    dir: PathBuf,
}

impl DirLoader {
    /// Creates a new loader rooted at `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn resolve(&self, resource: &str) -> PathBuf {
        let path = Path::new(resource);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.dir.join(path)
        }
    }
}

impl ConfigLoader for DirLoader {
    fn load(&self, resource: &str) -> VfdResult<VfDefinition> {
        let path = self.resolve(resource);
        let content = fs::read_to_string(&path)?;
        let owner = fs::metadata(&path)?.uid();

        let mut def = VfDefinition::from_json(&content)?;
        def.owner = owner;
        if def.name.is_empty() {
            def.name = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| resource.to_string());
        }

        debug!(resource, owner, pciid = %def.pciid, vfid = def.vfid, "loaded VF config");
        Ok(def)
    }

    fn list(&self) -> VfdResult<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if !entry.file_type()?.is_file() {
                continue;
            }
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    fn discard(&self, resource: &str) -> VfdResult<()> {
        let path = self.resolve(resource);
        fs::remove_file(&path).map_err(|e| {
            VfdError::config(path.display().to_string(), format!("cannot remove: {}", e))
        })
    }
}
