//! TCP liveness probing.
//!
//! A probe is a heuristic "is the machine up" check: one bounded connect
//! attempt against a well-known port. Every failure mode (refused, timed
//! out, unresolvable, unreachable) collapses to `Offline`.

use crate::registry::Device;
use lazy_static::lazy_static;
use prometheus::{register_int_counter_vec, IntCounterVec};
use serde::Serialize;
use std::net::{TcpStream, ToSocketAddrs};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

/// RDP. A host answering here is powered on and on the network.
pub const DEFAULT_PROBE_PORT: u16 = 3389;

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// Ceiling on concurrently in-flight probes.
pub const MAX_IN_FLIGHT_PROBES: usize = 20;

lazy_static! {
    static ref PROBES: IntCounterVec = register_int_counter_vec!(
        "wakehub_liveness_probes_total",
        "Liveness probe attempts by outcome.",
        &["outcome"]
    )
    .expect("probe counter registration");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Online { latency: Duration },
    Offline,
}

impl Liveness {
    pub fn is_online(self) -> bool {
        matches!(self, Liveness::Online { .. })
    }

    /// Whole milliseconds to connection establishment, `None` when offline.
    pub fn latency_ms(self) -> Option<u64> {
        match self {
            Liveness::Online { latency } => Some(latency.as_millis() as u64),
            Liveness::Offline => None,
        }
    }
}

/// Per-device result of a bulk probe, correlated by MAC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeReport {
    pub mac: String,
    pub online: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

impl ProbeReport {
    fn new(mac: &str, liveness: Liveness) -> Self {
        ProbeReport {
            mac: mac.to_string(),
            online: liveness.is_online(),
            latency_ms: liveness.latency_ms(),
        }
    }
}

/// One bounded connect attempt against `(address, port)`. Latency is
/// wall-clock from attempt start to connection establishment.
pub fn probe(address: &str, port: u16, timeout: Duration) -> Liveness {
    if address.is_empty() {
        return Liveness::Offline;
    }
    let start = Instant::now();
    let resolved = match (address, port).to_socket_addrs() {
        Ok(mut addrs) => addrs.next(),
        Err(_) => None,
    };
    let liveness = match resolved {
        Some(addr) => match TcpStream::connect_timeout(&addr, timeout) {
            Ok(_stream) => Liveness::Online {
                latency: start.elapsed(),
            },
            Err(_) => Liveness::Offline,
        },
        None => Liveness::Offline,
    };
    let outcome = if liveness.is_online() { "online" } else { "offline" };
    PROBES.with_label_values(&[outcome]).inc();
    liveness
}

/// Probes every device concurrently and returns one report per input
/// device once all probes have finished. Completion order; callers
/// correlate by `mac`.
///
/// Devices without an address are reported offline without dispatching
/// any work. The rest run on a worker pool capped at
/// [`MAX_IN_FLIGHT_PROBES`]; a panicking probe is converted to an
/// offline report so it can never take down its siblings.
pub fn probe_all(devices: &[Device]) -> Vec<ProbeReport> {
    fan_out(devices, DEFAULT_PROBE_PORT, DEFAULT_PROBE_TIMEOUT)
}

fn fan_out(devices: &[Device], port: u16, timeout: Duration) -> Vec<ProbeReport> {
    let mut reports = Vec::with_capacity(devices.len());
    let mut targets: Vec<(&str, &str)> = Vec::new();
    for device in devices {
        match device.ip.as_deref().filter(|ip| !ip.is_empty()) {
            Some(address) => targets.push((&device.mac, address)),
            None => reports.push(ProbeReport::new(&device.mac, Liveness::Offline)),
        }
    }

    let cursor = AtomicUsize::new(0);
    let probed = Mutex::new(Vec::with_capacity(targets.len()));
    let workers = MAX_IN_FLIGHT_PROBES.min(targets.len());
    thread::scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|| loop {
                let index = cursor.fetch_add(1, Ordering::Relaxed);
                let Some(&(mac, address)) = targets.get(index) else {
                    break;
                };
                let liveness =
                    panic::catch_unwind(AssertUnwindSafe(|| probe(address, port, timeout)))
                        .unwrap_or(Liveness::Offline);
                probed.lock().unwrap().push(ProbeReport::new(mac, liveness));
            });
        }
    });

    reports.append(&mut probed.into_inner().unwrap());
    reports
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    fn device(mac: &str, ip: Option<&str>) -> Device {
        Device {
            mac: mac.to_string(),
            ip: ip.map(str::to_string),
            remark: None,
            broadcast_ip: None,
        }
    }

    #[test]
    fn empty_address_short_circuits_offline() {
        assert_eq!(probe("", DEFAULT_PROBE_PORT, DEFAULT_PROBE_TIMEOUT), Liveness::Offline);
    }

    #[test]
    fn malformed_address_is_offline_not_an_error() {
        let liveness = probe("not an address!", 80, Duration::from_millis(100));
        assert_eq!(liveness, Liveness::Offline);
    }

    #[test]
    fn open_port_reports_online_with_latency() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let liveness = probe("127.0.0.1", port, DEFAULT_PROBE_TIMEOUT);
        assert!(liveness.is_online());
        assert!(liveness.latency_ms().is_some());
    }

    #[test]
    fn closed_port_reports_offline() {
        // Bind then drop to find a port with nothing listening on it.
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let liveness = probe("127.0.0.1", port, DEFAULT_PROBE_TIMEOUT);
        assert_eq!(liveness, Liveness::Offline);
        assert_eq!(liveness.latency_ms(), None);
    }

    #[test]
    fn fan_out_reports_every_device_exactly_once() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        // More devices than the worker ceiling, to exercise the pool.
        let mut devices = Vec::new();
        for i in 0..MAX_IN_FLIGHT_PROBES + 5 {
            let mac = format!("AA:BB:CC:DD:EE:{:02X}", i);
            devices.push(device(&mac, Some("127.0.0.1")));
        }
        devices.push(device("11:22:33:44:55:66", None));
        devices.push(device("11:22:33:44:55:77", Some("")));

        let reports = fan_out(&devices, port, DEFAULT_PROBE_TIMEOUT);
        assert_eq!(reports.len(), devices.len());

        let addressless = reports.iter().find(|r| r.mac == "11:22:33:44:55:66").unwrap();
        assert!(!addressless.online);
        assert_eq!(addressless.latency_ms, None);

        let reachable = reports.iter().find(|r| r.mac == "AA:BB:CC:DD:EE:00").unwrap();
        assert!(reachable.online, "listener on 127.0.0.1:{port} should be reachable");
    }

    #[test]
    fn probe_all_over_empty_registry_is_empty() {
        assert!(probe_all(&[]).is_empty());
    }
}
