//! # Compute Device
//!
//! `models.device` names where Whisper runs: `auto`, `cpu`, `cuda` or
//! `metal`. The same names come back to clients as `device_used`, so parsing
//! and labelling share one table. An accelerator that fails to initialise
//! falls back to CPU; `auto` probes CUDA, then Metal, once per process.

use candle_core::Device;
use std::sync::OnceLock;
use tracing::{debug, info, warn};

static DETECTED: OnceLock<Device> = OnceLock::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    Auto,
    Cpu,
    Cuda,
    Metal,
}

/// Accepted spellings; the first entry per kind is its label.
const NAMES: [(&str, DeviceKind); 6] = [
    ("auto", DeviceKind::Auto),
    ("cpu", DeviceKind::Cpu),
    ("cuda", DeviceKind::Cuda),
    ("metal", DeviceKind::Metal),
    ("gpu", DeviceKind::Cuda),
    ("automatic", DeviceKind::Auto),
];

impl DeviceKind {
    pub fn label(self) -> &'static str {
        NAMES
            .iter()
            .find(|(_, kind)| *kind == self)
            .map(|(name, _)| *name)
            .unwrap_or("cpu")
    }

    /// Open the device, degrading to CPU when the accelerator is missing.
    pub fn open(self) -> Device {
        match self {
            DeviceKind::Auto => DETECTED.get_or_init(detect).clone(),
            DeviceKind::Cpu => Device::Cpu,
            DeviceKind::Cuda => probe(DeviceKind::Cuda).unwrap_or(Device::Cpu),
            DeviceKind::Metal => probe(DeviceKind::Metal).unwrap_or(Device::Cpu),
        }
    }
}

impl std::str::FromStr for DeviceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_lowercase();
        NAMES
            .iter()
            .find(|(candidate, _)| *candidate == name)
            .map(|(_, kind)| *kind)
            .ok_or_else(|| format!("Unknown device: {}", s))
    }
}

impl From<&Device> for DeviceKind {
    fn from(device: &Device) -> Self {
        match device {
            Device::Cpu => DeviceKind::Cpu,
            Device::Cuda(_) => DeviceKind::Cuda,
            Device::Metal(_) => DeviceKind::Metal,
        }
    }
}

/// Device for the configured name; unknown names behave like `auto`.
pub fn select_device(name: &str) -> Device {
    let kind = name.parse::<DeviceKind>().unwrap_or_else(|e| {
        warn!("{}, using auto", e);
        DeviceKind::Auto
    });
    let device = kind.open();
    info!(requested = kind.label(), selected = device_label(&device), "Compute device ready");
    device
}

/// Label reported to clients as `device_used`.
pub fn device_label(device: &Device) -> &'static str {
    DeviceKind::from(device).label()
}

fn detect() -> Device {
    probe(DeviceKind::Cuda)
        .or_else(|| probe(DeviceKind::Metal))
        .unwrap_or(Device::Cpu)
}

fn probe(kind: DeviceKind) -> Option<Device> {
    let opened = match kind {
        DeviceKind::Cuda => Device::new_cuda(0),
        DeviceKind::Metal => Device::new_metal(0),
        DeviceKind::Auto | DeviceKind::Cpu => return Some(Device::Cpu),
    };
    match opened {
        Ok(device) => Some(device),
        Err(e) => {
            debug!(device = kind.label(), error = %e, "Accelerator unavailable");
            None
        }
    }
}
