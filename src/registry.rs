//! File-backed device registry.
//!
//! The whole device list lives in one JSON file, rewritten in full on
//! every mutation. A `Registry` owns an in-memory copy behind a mutex so
//! concurrent request handlers cannot interleave load-modify-save cycles.

use crate::mac;
use log::error;
use rouille::Response;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// One registered device. `mac` is always the canonical form; the
/// optional fields are omitted from JSON when absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub mac: String,
    /// Host address, used for liveness probing and free-text search only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remark: Option<String>,
    /// Magic packet destination; global broadcast when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub broadcast_ip: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error(transparent)]
    InvalidMac(#[from] mac::InvalidMac),
    #[error("device {0} is already registered")]
    Duplicate(String),
    #[error("device {0} is not registered")]
    NotFound(String),
    #[error("failed to persist device registry: {0}")]
    Persist(#[from] io::Error),
}

impl From<RegistryError> for Response {
    fn from(err: RegistryError) -> Response {
        let status = match err {
            RegistryError::InvalidMac(_) | RegistryError::Duplicate(_) => 400,
            RegistryError::NotFound(_) => 404,
            RegistryError::Persist(_) => 500,
        };
        Response::json(&serde_json::json!({ "error": err.to_string() })).with_status_code(status)
    }
}

pub struct Registry {
    path: PathBuf,
    devices: Mutex<Vec<Device>>,
}

impl Registry {
    /// Opens the registry at `path`. A missing file is an empty registry;
    /// an unparseable one is recovered as empty, which discards its
    /// contents on the next write.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let devices = load(&path);
        Registry {
            path,
            devices: Mutex::new(devices),
        }
    }

    /// Full contents, insertion order.
    pub fn list(&self) -> Vec<Device> {
        self.devices.lock().unwrap().clone()
    }

    /// Validates and normalizes the candidate's MAC, drops empty optional
    /// fields, enforces uniqueness, persists, and returns the stored
    /// record.
    pub fn add(&self, candidate: Device) -> Result<Device, RegistryError> {
        let canonical =
            mac::normalize(&candidate.mac).ok_or_else(|| mac::InvalidMac(candidate.mac.clone()))?;

        let mut devices = self.devices.lock().unwrap();
        if devices.iter().any(|d| d.mac == canonical) {
            return Err(RegistryError::Duplicate(canonical));
        }

        let device = Device {
            mac: canonical,
            ip: non_empty(candidate.ip),
            remark: non_empty(candidate.remark),
            broadcast_ip: non_empty(candidate.broadcast_ip),
        };
        let mut next = devices.clone();
        next.push(device.clone());
        persist(&self.path, &next)?;
        *devices = next;
        Ok(device)
    }

    /// Removes the device with the given MAC (any accepted spelling).
    pub fn remove(&self, mac_str: &str) -> Result<(), RegistryError> {
        let canonical = match mac::normalize(mac_str) {
            Some(canonical) => canonical,
            None => return Err(RegistryError::NotFound(mac_str.to_string())),
        };

        let mut devices = self.devices.lock().unwrap();
        let next: Vec<Device> = devices.iter().filter(|d| d.mac != canonical).cloned().collect();
        if next.len() == devices.len() {
            return Err(RegistryError::NotFound(canonical));
        }
        persist(&self.path, &next)?;
        *devices = next;
        Ok(())
    }

    pub fn find(&self, mac_str: &str) -> Option<Device> {
        let canonical = mac::normalize(mac_str)?;
        self.devices
            .lock()
            .unwrap()
            .iter()
            .find(|d| d.mac == canonical)
            .cloned()
    }

    /// Case-insensitive substring match over mac, ip, and remark. An
    /// empty query returns everything, unfiltered, in registry order.
    pub fn search(&self, query: &str) -> Vec<Device> {
        let devices = self.devices.lock().unwrap();
        if query.is_empty() {
            return devices.clone();
        }
        let query = query.to_lowercase();
        devices
            .iter()
            .filter(|d| {
                d.mac.to_lowercase().contains(&query)
                    || d.ip.as_deref().unwrap_or("").to_lowercase().contains(&query)
                    || d.remark.as_deref().unwrap_or("").to_lowercase().contains(&query)
            })
            .cloned()
            .collect()
    }
}

fn non_empty(field: Option<String>) -> Option<String> {
    field.filter(|value| !value.is_empty())
}

fn load(path: &Path) -> Vec<Device> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Vec::new(),
        Err(err) => {
            error!("device registry {} is unreadable, starting empty: {}", path.display(), err);
            return Vec::new();
        }
    };
    match serde_json::from_str(&contents) {
        Ok(devices) => devices,
        Err(err) => {
            error!(
                "device registry {} is corrupt, starting empty (contents will be lost on next write): {}",
                path.display(),
                err
            );
            Vec::new()
        }
    }
}

fn persist(path: &Path, devices: &[Device]) -> io::Result<()> {
    let contents = serde_json::to_string_pretty(devices)?;
    fs::write(path, contents)
}
