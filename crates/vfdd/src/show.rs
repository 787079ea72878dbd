//! Show and dump output.

use crate::error::{VfdError, VfdResult};
use crate::model::{PortState, RunningConfig, SharedPort};
use std::fmt::Write;
use std::str::FromStr;
use tracing::warn;
use vfd_nic::{NicControl, PortId, PortStats, VfId, VfStats};
use vfd_types::PciAddress;

/// A port named in a show selector, by logical number or PCI address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortRef {
    Index(u16),
    Pci(PciAddress),
}

impl FromStr for PortRef {
    type Err = VfdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(index) = s.parse::<u16>() {
            return Ok(PortRef::Index(index));
        }
        s.parse::<PciAddress>()
            .map(PortRef::Pci)
            .map_err(|_| VfdError::validation(format!("unknown show selector: {}", s)))
    }
}

/// Which part of the configuration a show request covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShowSelector {
    All,
    Pfs,
    Port(PortRef),
    Vf(PortRef, i32),
}

impl ShowSelector {
    /// Parses `all` (the default), `pfs`, `<pf>` or `<pf>/<vf>`.
    pub fn parse(selector: Option<&str>) -> VfdResult<Self> {
        let selector = selector.map(str::trim).unwrap_or("all");
        match selector {
            "" | "all" => Ok(ShowSelector::All),
            "pfs" => Ok(ShowSelector::Pfs),
            s => match s.split_once('/') {
                Some((pf, vf)) => {
                    let vf = vf
                        .parse::<i32>()
                        .map_err(|_| VfdError::validation(format!("bad VF number: {}", vf)))?;
                    Ok(ShowSelector::Vf(pf.parse()?, vf))
                }
                None => Ok(ShowSelector::Port(s.parse()?)),
            },
        }
    }
}

fn find_port<'a>(config: &'a RunningConfig, port: &PortRef) -> VfdResult<&'a SharedPort> {
    let found = match port {
        PortRef::Index(i) => config.port(PortId(*i)),
        PortRef::Pci(addr) => config.port_by_pciid(addr),
    };
    found.ok_or_else(|| match port {
        PortRef::Index(i) => VfdError::not_found(format!("port {}", i)),
        PortRef::Pci(addr) => VfdError::not_found(format!("port {}", addr)),
    })
}

const HEADER: &str = "PF/VF    ID  PCIID          Link   Speed Duplex      RX pkts     RX bytes  RX errors RX dropped      TX pkts     TX bytes  TX errors    Spoofed";

/// Renders link state and counters for the selected ports and VFs.
pub fn render_stats(
    config: &RunningConfig,
    nic: &dyn NicControl,
    selector: &ShowSelector,
) -> VfdResult<String> {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "vfd status at {}",
        chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
    );
    let _ = writeln!(out, "{}", HEADER);

    match selector {
        ShowSelector::All | ShowSelector::Pfs => {
            for port in config.ports() {
                let port = port.lock();
                pf_row(&mut out, nic, &port);
                if *selector == ShowSelector::All {
                    for vf in port.active_vfs().filter_map(|s| s.vf_id()) {
                        vf_row(&mut out, nic, &port, vf);
                    }
                }
            }
        }
        ShowSelector::Port(pf) => {
            let port = find_port(config, pf)?.lock();
            pf_row(&mut out, nic, &port);
            for vf in port.active_vfs().filter_map(|s| s.vf_id()) {
                vf_row(&mut out, nic, &port, vf);
            }
        }
        ShowSelector::Vf(pf, num) => {
            let port = find_port(config, pf)?.lock();
            let vf = port
                .vf(*num)
                .and_then(|s| s.vf_id())
                .ok_or_else(|| VfdError::not_found(format!("VF {} on {}", num, port.pciid)))?;
            vf_row(&mut out, nic, &port, vf);
        }
    }

    Ok(out)
}

fn pf_row(out: &mut String, nic: &dyn NicControl, port: &PortState) {
    match nic.port_stats(port.id) {
        Ok(stats) => {
            let _ = writeln!(
                out,
                "pf     {:>4}  {}  {}",
                port.id.as_u16(),
                port.pciid,
                pf_columns(&stats)
            );
        }
        Err(e) => {
            warn!(port = %port.id, error = %e, "cannot read port counters");
            let _ = writeln!(
                out,
                "pf     {:>4}  {}  unavailable: {}",
                port.id.as_u16(),
                port.pciid,
                e
            );
        }
    }
}

fn pf_columns(s: &PortStats) -> String {
    format!(
        "{:<5} {:>6} {:>6} {:>12} {:>12} {:>10} {:>10} {:>12} {:>12} {:>10} {:>10}",
        if s.link.up { "UP" } else { "DOWN" },
        s.link.speed_mbps,
        s.link.duplex.to_string(),
        s.rx_packets,
        s.rx_bytes,
        s.rx_errors,
        s.rx_dropped,
        s.tx_packets,
        s.tx_bytes,
        s.tx_errors,
        "-"
    )
}

fn vf_row(out: &mut String, nic: &dyn NicControl, port: &PortState, vf: VfId) {
    match nic.vf_stats(port.id, vf) {
        Ok(stats) => {
            let _ = writeln!(
                out,
                "vf     {:>4}  {}  {}",
                vf.as_u16(),
                port.pciid,
                vf_columns(&stats)
            );
        }
        Err(e) => {
            warn!(port = %port.id, %vf, error = %e, "cannot read VF counters");
            let _ = writeln!(
                out,
                "vf     {:>4}  {}  unavailable: {}",
                vf.as_u16(),
                port.pciid,
                e
            );
        }
    }
}

fn vf_columns(s: &VfStats) -> String {
    format!(
        "{:<5} {:>6} {:>6} {:>12} {:>12} {:>10} {:>10} {:>12} {:>12} {:>10} {:>10}",
        "-", "-", "-", s.rx_packets, s.rx_bytes, s.rx_errors, "-", s.tx_packets, s.tx_bytes,
        s.tx_errors, s.spoofed
    )
}

/// Renders the whole running configuration for diagnostics.
pub fn render_dump(config: &RunningConfig) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "config has {} port(s)", config.len());

    for port in config.ports() {
        let port = port.lock();
        let _ = writeln!(
            out,
            "port {}: pciid {}, marker {}, mtu {}, ntcs {}, loopback {}, qos {}, mirrors {}, vfs {}",
            port.id,
            port.pciid,
            port.marker,
            port.mtu,
            port.ntcs,
            port.loopback,
            port.qos,
            port.num_mirrors,
            port.num_vfs()
        );

        for vf in port.active_vfs() {
            let _ = writeln!(
                out,
                "  vf {}: name {:?}, owner {}, marker {}, strip {}, insert {}, vlan_aspoof {}, mac_aspoof {}, bcast {}, mcast {}, un_ucast {}, rate {}, tc {:?}",
                vf.num,
                vf.name,
                vf.owner,
                vf.marker,
                vf.strip_stag,
                vf.insert_stag,
                vf.vlan_anti_spoof,
                vf.mac_anti_spoof,
                vf.allow_bcast,
                vf.allow_mcast,
                vf.allow_un_ucast,
                vf.rate,
                &vf.tc_pctgs[..usize::from(port.ntcs).min(vf.tc_pctgs.len())]
            );
            let vlans: Vec<String> = vf.vlans.iter().map(|v| v.to_string()).collect();
            let macs: Vec<String> = vf.macs.iter().map(|m| m.to_string()).collect();
            let _ = writeln!(out, "    vlans [{}]", vlans.join(", "));
            let _ = writeln!(out, "    macs [{}]", macs.join(", "));
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DaemonConfig, PciConfig};
    use crate::model::VfSlot;
    use pretty_assertions::assert_eq;
    use vfd_nic::{NicOp, RecordingNic};
    use vfd_types::{Duplex, LinkState, VlanId};

    fn running() -> RunningConfig {
        let mut config = DaemonConfig::default();
        config.pciids.push(PciConfig::new(PciAddress::new(0, 8, 0, 0)));
        config.pciids.push(PciConfig::new(PciAddress::new(0, 8, 0, 1)));
        let running = RunningConfig::from_config(&config).unwrap();
        running.ports()[0]
            .lock()
            .install(VfSlot {
                num: 3,
                vlans: vec![VlanId::new(10).unwrap()],
                ..VfSlot::free()
            })
            .unwrap();
        running
    }

    #[test]
    fn test_parse_selectors() {
        assert_eq!(ShowSelector::parse(None).unwrap(), ShowSelector::All);
        assert_eq!(ShowSelector::parse(Some("all")).unwrap(), ShowSelector::All);
        assert_eq!(ShowSelector::parse(Some("pfs")).unwrap(), ShowSelector::Pfs);
        assert_eq!(
            ShowSelector::parse(Some("1")).unwrap(),
            ShowSelector::Port(PortRef::Index(1))
        );
        assert_eq!(
            ShowSelector::parse(Some("0000:08:00.1/4")).unwrap(),
            ShowSelector::Vf(PortRef::Pci(PciAddress::new(0, 8, 0, 1)), 4)
        );
        assert!(ShowSelector::parse(Some("eth0")).is_err());
        assert!(ShowSelector::parse(Some("0/x")).is_err());
    }

    #[test]
    fn test_render_all() {
        let running = running();
        let nic = RecordingNic::new();
        nic.set_port_stats(
            PortId(0),
            PortStats {
                link: LinkState::up(25000, Duplex::Full),
                rx_packets: 1234,
                ..Default::default()
            },
        );

        let out = render_stats(&running, &nic, &ShowSelector::All).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 5);
        assert!(lines[2].starts_with("pf        0  0000:08:00.0  UP"));
        assert!(lines[2].contains("25000"));
        assert!(lines[2].contains("1234"));
        assert!(lines[3].starts_with("vf        3  0000:08:00.0"));
        assert!(lines[4].starts_with("pf        1  0000:08:00.1  DOWN"));
        assert_eq!(nic.count(NicOp::VfStats), 1);
    }

    #[test]
    fn test_render_pfs_only() {
        let running = running();
        let nic = RecordingNic::new();
        let out = render_stats(&running, &nic, &ShowSelector::Pfs).unwrap();
        assert_eq!(out.lines().count(), 4);
        assert_eq!(nic.count(NicOp::VfStats), 0);
    }

    #[test]
    fn test_render_unknown_vf() {
        let running = running();
        let nic = RecordingNic::new();
        let err = render_stats(&running, &nic, &ShowSelector::Vf(PortRef::Index(0), 4))
            .unwrap_err();
        assert!(matches!(err, VfdError::NotFound { .. }));

        let err = render_stats(&running, &nic, &ShowSelector::Port(PortRef::Index(9)))
            .unwrap_err();
        assert!(matches!(err, VfdError::NotFound { .. }));
    }

    #[test]
    fn test_stats_failure_is_reported_inline() {
        let running = running();
        let nic = RecordingNic::new();
        nic.fail_on(NicOp::PortStats);
        let out = render_stats(&running, &nic, &ShowSelector::Pfs).unwrap();
        assert!(out.contains("unavailable"));
    }

    #[test]
    fn test_render_dump() {
        let out = render_dump(&running());
        assert!(out.starts_with("config has 2 port(s)"));
        assert!(out.contains("port 0: pciid 0000:08:00.0, marker add"));
        assert!(out.contains("  vf 3: "));
        assert!(out.contains("    vlans [10]"));
    }
}
