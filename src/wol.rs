//! Wake-on-LAN magic packet construction and transmission.
//!
//! Sending is best-effort: WOL is a fire-and-forget broadcast datagram,
//! so `Ok` only means the packet was handed to the local network stack,
//! never that the target machine actually woke up.

use crate::mac;
use crate::mac::InvalidMac;
use lazy_static::lazy_static;
use log::info;
use prometheus::{register_int_counter, IntCounter};
use rouille::Response;
use std::net::UdpSocket;

const SYNCHRONIZATION_SCHEME: [u8; 6] = [0xff; 6];

/// 6 bytes of 0xff followed by the MAC repeated 16 times.
pub const MAGIC_PACKET_LEN: usize = 102;

/// Conventional WOL discard port.
pub const DEFAULT_WAKE_PORT: u16 = 9;

/// Destination when a device has no broadcast address configured.
pub const SUBNET_BROADCAST: &str = "255.255.255.255";

lazy_static! {
    static ref MAGIC_PACKETS_SENT: IntCounter = register_int_counter!(
        "wakehub_magic_packets_sent_total",
        "Magic packets handed to the local network stack."
    )
    .expect("magic packet counter registration");
}

#[derive(Debug, thiserror::Error)]
pub enum WolError {
    #[error(transparent)]
    InvalidMac(#[from] InvalidMac),
    #[error("failed to send magic packet: {0}")]
    Send(#[from] std::io::Error),
}

impl From<WolError> for Response {
    fn from(err: WolError) -> Response {
        let status = match err {
            WolError::InvalidMac(_) => 400,
            WolError::Send(_) => 500,
        };
        Response::json(&serde_json::json!({ "error": err.to_string() })).with_status_code(status)
    }
}

pub fn magic_packet(mac_address: [u8; 6]) -> [u8; MAGIC_PACKET_LEN] {
    let mut packet = [0u8; MAGIC_PACKET_LEN];
    packet[..6].copy_from_slice(&SYNCHRONIZATION_SCHEME);
    for repetition in packet[6..].chunks_exact_mut(6) {
        repetition.copy_from_slice(&mac_address);
    }
    packet
}

/// Normalizes `mac_str`, then sends one magic packet to
/// `(destination, port)` from an ephemeral broadcast-capable UDP socket.
pub fn wake(mac_str: &str, destination: &str, port: u16) -> Result<(), WolError> {
    let mac_address = mac::to_bytes(mac_str)?;
    let socket = UdpSocket::bind("0.0.0.0:0")?;
    socket.set_broadcast(true)?;
    socket.send_to(&magic_packet(mac_address), (destination, port))?;
    MAGIC_PACKETS_SENT.inc();
    info!(
        "magic packet sent, mac={} destination={}:{}",
        mac::normalize(mac_str).unwrap_or_default(),
        destination,
        port
    );
    Ok(())
}
