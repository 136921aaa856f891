//! Gateway discovery for tethered connections
//!
//! When the player is tethered over USB, the sender usually sits on the
//! tethering interface's /24. Hosts are probed one at a time with a 1 s
//! timeout, so a full scan can take over four minutes and stalls the
//! reconnect loop for that long.

use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::io::ErrorKind;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use crate::constants::{PROBE_PORT, PROBE_TIMEOUT_MS, TETHER_INTERFACE_MARKER};
use crate::error::NetworkError;
use crate::shutdown::Shutdown;

/// Decides whether a host answers
pub trait ReachabilityProbe: Send {
    fn is_reachable(&self, addr: Ipv4Addr, timeout: Duration) -> bool;
}

/// Reachability via a TCP connect to the echo port.
///
/// An accepted or actively refused connection both prove the host is up.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpEchoProbe;

impl ReachabilityProbe for TcpEchoProbe {
    fn is_reachable(&self, addr: Ipv4Addr, timeout: Duration) -> bool {
        let target = SocketAddr::new(IpAddr::V4(addr), PROBE_PORT);
        let socket = match Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP)) {
            Ok(socket) => socket,
            Err(e) => {
                tracing::warn!("Probe socket for {} failed: {}", addr, e);
                return false;
            }
        };

        match socket.connect_timeout(&SockAddr::from(target), timeout) {
            Ok(()) => true,
            Err(e) => e.kind() == ErrorKind::ConnectionRefused,
        }
    }
}

/// Address record of one network interface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceRecord {
    pub name: String,
    pub addr: IpAddr,
    pub is_loopback: bool,
    /// Link is operationally up
    pub is_up: bool,
}

/// Whether a Linux `operstate` value means the link can carry traffic.
///
/// Virtual links often report `unknown` while working.
pub fn operstate_is_up(state: &str) -> bool {
    !matches!(
        state.trim(),
        "down" | "lowerlayerdown" | "notpresent" | "dormant" | "testing"
    )
}

/// Link state from sysfs; treated as up where it cannot be read
fn link_is_up(name: &str) -> bool {
    match std::fs::read_to_string(format!("/sys/class/net/{}/operstate", name)) {
        Ok(state) => operstate_is_up(&state),
        Err(_) => true,
    }
}

/// Every interface address, with its link state
pub fn interface_records() -> Result<Vec<InterfaceRecord>, NetworkError> {
    let interfaces =
        if_addrs::get_if_addrs().map_err(|e| NetworkError::Interfaces(e.to_string()))?;

    Ok(interfaces
        .into_iter()
        .map(|iface| InterfaceRecord {
            is_up: link_is_up(&iface.name),
            is_loopback: iface.is_loopback(),
            addr: iface.ip(),
            name: iface.name,
        })
        .collect())
}

/// First IPv4 address of an up, non-loopback interface whose name
/// contains `marker`
pub fn select_tethered_address(records: &[InterfaceRecord], marker: &str) -> Option<Ipv4Addr> {
    records
        .iter()
        .filter(|record| record.is_up && !record.is_loopback && record.name.contains(marker))
        .find_map(|record| match record.addr {
            IpAddr::V4(addr) => Some(addr),
            IpAddr::V6(_) => None,
        })
}

/// First IPv4 address of a live tethering interface
pub fn tethered_interface_address(marker: &str) -> Result<Option<Ipv4Addr>, NetworkError> {
    Ok(select_tethered_address(&interface_records()?, marker))
}

/// Hosts .1 through .254 of `local`'s /24, excluding `local` itself
pub fn subnet_candidates(local: Ipv4Addr) -> impl Iterator<Item = Ipv4Addr> {
    let [a, b, c, own] = local.octets();
    (1..=254u8)
        .filter(move |&host| host != own)
        .map(move |host| Ipv4Addr::new(a, b, c, host))
}

/// Probe `local`'s /24 in order and return the first host that answers.
///
/// Stops early, returning `None`, once `shutdown` is triggered.
pub fn scan_subnet(
    local: Ipv4Addr,
    probe: &dyn ReachabilityProbe,
    timeout: Duration,
    shutdown: &Shutdown,
) -> Option<Ipv4Addr> {
    for candidate in subnet_candidates(local) {
        if !shutdown.is_running() {
            return None;
        }
        if probe.is_reachable(candidate, timeout) {
            return Some(candidate);
        }
    }
    None
}

/// Find a reachable peer on the tethering interface, if there is one
pub fn find_tethered_gateway(
    probe: &dyn ReachabilityProbe,
    shutdown: &Shutdown,
) -> Option<Ipv4Addr> {
    let local = match tethered_interface_address(TETHER_INTERFACE_MARKER) {
        Ok(Some(local)) => local,
        Ok(None) => {
            tracing::debug!("No {} interface with an IPv4 address", TETHER_INTERFACE_MARKER);
            return None;
        }
        Err(e) => {
            tracing::warn!("Gateway discovery failed: {}", e);
            return None;
        }
    };

    tracing::info!(
        "Scanning {}/24 for a gateway, this can take up to {} s",
        local,
        254 * PROBE_TIMEOUT_MS / 1000
    );
    let found = scan_subnet(
        local,
        probe,
        Duration::from_millis(PROBE_TIMEOUT_MS),
        shutdown,
    );
    match found {
        Some(addr) => tracing::info!("Gateway discovery found {}", addr),
        None => tracing::info!("Gateway discovery found no reachable host"),
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    struct FakeProbe {
        reachable: Vec<Ipv4Addr>,
        probed: Arc<Mutex<Vec<Ipv4Addr>>>,
    }

    impl ReachabilityProbe for FakeProbe {
        fn is_reachable(&self, addr: Ipv4Addr, _timeout: Duration) -> bool {
            self.probed.lock().push(addr);
            self.reachable.contains(&addr)
        }
    }

    #[test]
    fn test_candidates_skip_self() {
        let candidates: Vec<_> = subnet_candidates(Ipv4Addr::new(192, 168, 42, 129)).collect();
        assert_eq!(candidates.len(), 253);
        assert_eq!(candidates[0], Ipv4Addr::new(192, 168, 42, 1));
        assert_eq!(candidates[252], Ipv4Addr::new(192, 168, 42, 254));
        assert!(!candidates.contains(&Ipv4Addr::new(192, 168, 42, 129)));
    }

    #[test]
    fn test_scan_returns_first_reachable() {
        let probed = Arc::new(Mutex::new(Vec::new()));
        let probe = FakeProbe {
            reachable: vec![Ipv4Addr::new(10, 0, 0, 40), Ipv4Addr::new(10, 0, 0, 7)],
            probed: probed.clone(),
        };

        let found = scan_subnet(
            Ipv4Addr::new(10, 0, 0, 3),
            &probe,
            Duration::from_millis(1),
            &Shutdown::new(),
        );
        assert_eq!(found, Some(Ipv4Addr::new(10, 0, 0, 7)));
        // .1 .2 .4 .5 .6 .7
        assert_eq!(probed.lock().len(), 6);
    }

    #[test]
    fn test_scan_finds_nothing() {
        let probe = FakeProbe {
            reachable: vec![],
            probed: Arc::new(Mutex::new(Vec::new())),
        };
        let found = scan_subnet(
            Ipv4Addr::new(10, 0, 0, 3),
            &probe,
            Duration::from_millis(1),
            &Shutdown::new(),
        );
        assert_eq!(found, None);
        assert_eq!(probe.probed.lock().len(), 253);
    }

    #[test]
    fn test_scan_stops_on_shutdown() {
        let probed = Arc::new(Mutex::new(Vec::new()));
        let probe = FakeProbe {
            reachable: vec![Ipv4Addr::new(10, 0, 0, 9)],
            probed: probed.clone(),
        };
        let shutdown = Shutdown::new();
        shutdown.trigger();

        let found = scan_subnet(Ipv4Addr::new(10, 0, 0, 3), &probe, Duration::from_millis(1), &shutdown);
        assert_eq!(found, None);
        assert!(probed.lock().is_empty());
    }

    fn record(name: &str, addr: &str, is_up: bool) -> InterfaceRecord {
        InterfaceRecord {
            name: name.to_string(),
            addr: addr.parse().unwrap(),
            is_loopback: addr == "127.0.0.1",
            is_up,
        }
    }

    #[test]
    fn test_select_skips_down_interfaces() {
        let records = vec![
            record("lo", "127.0.0.1", true),
            record("rndis0", "192.168.42.7", false),
            record("rndis1", "fe80::1", true),
            record("rndis1", "192.168.43.129", true),
            record("wlan0", "10.0.0.5", true),
        ];
        assert_eq!(
            select_tethered_address(&records, "rndis"),
            Some(Ipv4Addr::new(192, 168, 43, 129))
        );
    }

    #[test]
    fn test_select_none_when_only_stale_address() {
        let records = vec![record("rndis0", "192.168.42.7", false)];
        assert_eq!(select_tethered_address(&records, "rndis"), None);
    }

    #[test]
    fn test_operstate_values() {
        assert!(operstate_is_up("up\n"));
        assert!(operstate_is_up("unknown\n"));
        assert!(!operstate_is_up("down\n"));
        assert!(!operstate_is_up("lowerlayerdown"));
    }

    #[test]
    fn test_echo_probe_sees_listener() {
        // Loopback answers on the echo port with either accept or refuse
        assert!(TcpEchoProbe.is_reachable(Ipv4Addr::LOCALHOST, Duration::from_secs(1)));
    }
}
