//! HTTP surface: the embedded UI plus the JSON API.
//!
//! All state flows through the [`Registry`] handed to `handle_request`,
//! so the whole surface can be driven in tests with fake requests.

use crate::probe;
use crate::registry::{Device, Registry};
use crate::wol;
use percent_encoding::percent_decode_str;
use rouille::input::json_input;
use rouille::{router, Request, Response};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

#[derive(Deserialize)]
struct WakeRequest {
    mac: String,
    #[serde(default)]
    port: Option<u16>,
}

#[derive(Deserialize)]
struct ProbeRequest {
    address: String,
    #[serde(default)]
    port: Option<u16>,
    /// Seconds, fractional allowed.
    #[serde(default)]
    timeout: Option<f64>,
}

pub fn handle_request(registry: &Registry, request: &Request) -> Response {
    router!(request,
        (GET) (/) => { Response::html(include_str!("index.html")) },
        (GET) (/varz) => { varz() },
        (GET) (/api/devices) => { Response::json(&registry.list()) },
        (POST) (/api/devices) => { add_device(registry, request) },
        (DELETE) (/api/devices/{mac_str: String}) => { delete_device(registry, &mac_str) },
        (GET) (/api/search) => {
            let query = request.get_param("q").unwrap_or_default();
            Response::json(&registry.search(query.trim()))
        },
        (POST) (/api/wake) => { wake_device(registry, request) },
        (POST) (/api/probe) => { probe_address(request) },
        (GET) (/api/status) => { Response::json(&probe::probe_all(&registry.list())) },
        _ => Response::empty_404()
    )
}

fn error_response(status: u16, message: &str) -> Response {
    Response::json(&json!({ "error": message })).with_status_code(status)
}

fn add_device(registry: &Registry, request: &Request) -> Response {
    let candidate: Device = match json_input(request) {
        Ok(candidate) => candidate,
        Err(_) => return error_response(400, "invalid request body"),
    };
    match registry.add(candidate) {
        Ok(device) => Response::json(&json!({ "ok": true, "device": device })),
        Err(err) => err.into(),
    }
}

fn delete_device(registry: &Registry, raw_mac: &str) -> Response {
    // The UI percent-encodes the MAC path segment (MACs contain ':').
    let mac_str = percent_decode_str(raw_mac).decode_utf8_lossy();
    match registry.remove(&mac_str) {
        Ok(()) => Response::json(&json!({ "ok": true })),
        Err(err) => err.into(),
    }
}

fn wake_device(registry: &Registry, request: &Request) -> Response {
    let req: WakeRequest = match json_input(request) {
        Ok(req) => req,
        Err(_) => return error_response(400, "invalid request body"),
    };
    // A registered device may carry a directed broadcast address for
    // cross-subnet wake; everything else goes out on the global broadcast.
    let destination = registry
        .find(&req.mac)
        .and_then(|device| device.broadcast_ip)
        .unwrap_or_else(|| wol::SUBNET_BROADCAST.to_string());
    let port = req.port.unwrap_or(wol::DEFAULT_WAKE_PORT);
    match wol::wake(&req.mac, &destination, port) {
        Ok(()) => Response::json(&json!({ "ok": true })),
        Err(err) => err.into(),
    }
}

fn probe_address(request: &Request) -> Response {
    let req: ProbeRequest = match json_input(request) {
        Ok(req) => req,
        Err(_) => return error_response(400, "invalid request body"),
    };
    let timeout_secs = req.timeout.unwrap_or(1.0);
    if !timeout_secs.is_finite() || timeout_secs <= 0.0 {
        return error_response(400, "invalid probe timeout");
    }
    let liveness = probe::probe(
        &req.address,
        req.port.unwrap_or(probe::DEFAULT_PROBE_PORT),
        Duration::from_secs_f64(timeout_secs),
    );
    match liveness.latency_ms() {
        Some(latency_ms) => Response::json(&json!({ "online": true, "latency_ms": latency_ms })),
        None => Response::json(&json!({ "online": false })),
    }
}

fn varz() -> Response {
    let metrics = prometheus::gather();
    let encoder = prometheus::TextEncoder::new();
    match encoder.encode_to_string(&metrics) {
        Ok(body) => Response::text(body),
        Err(err) => error_response(500, &err.to_string()),
    }
}
