//! Static registry of configured camera slots.

use crate::capture::DeviceConfig;
use crate::error::CameraError;
use serde::Serialize;

/// A configured camera: slot id, device node and human name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceDescriptor {
    pub id: u32,
    pub path: String,
    pub name: String,
}

impl From<&DeviceConfig> for DeviceDescriptor {
    fn from(config: &DeviceConfig) -> Self {
        Self {
            id: config.id,
            path: config.path.clone(),
            name: config.name.clone(),
        }
    }
}

/// Read-only set of devices, fixed at construction.
#[derive(Debug, Clone)]
pub struct DeviceRegistry {
    devices: Vec<DeviceDescriptor>,
}

impl DeviceRegistry {
    /// Builds the registry, ordered by slot id.
    pub fn new(devices: &[DeviceConfig]) -> Self {
        let mut devices: Vec<DeviceDescriptor> = devices.iter().map(Into::into).collect();
        devices.sort_by_key(|d| d.id);
        devices.dedup_by_key(|d| d.id);
        Self { devices }
    }

    /// All configured devices.
    pub fn list_devices(&self) -> &[DeviceDescriptor] {
        &self.devices
    }

    /// Looks up a device by slot id.
    pub fn resolve(&self, device_id: u32) -> Result<&DeviceDescriptor, CameraError> {
        self.devices
            .iter()
            .find(|d| d.id == device_id)
            .ok_or(CameraError::UnknownDevice(device_id))
    }

    /// Resolves a textual selector: a slot id (`"1"`) or a device name
    /// (`"lower"`, case-insensitive).
    pub fn lookup(&self, selector: &str) -> Result<&DeviceDescriptor, CameraError> {
        let selector = selector.trim();
        if let Ok(id) = selector.parse::<u32>() {
            return self.resolve(id);
        }
        self.devices
            .iter()
            .find(|d| d.name.eq_ignore_ascii_case(selector))
            .ok_or_else(|| CameraError::InvalidDevice(selector.to_string()))
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}
