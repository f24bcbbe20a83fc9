//! Audio device enumeration and selection.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceDirection {
    Input,
    Output,
}

/// Metadata about an audio device.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    /// Human-readable device name reported by the OS.
    pub name: String,
    pub direction: DeviceDirection,
    /// Whether this is the system default device for its direction.
    pub is_default: bool,
    /// Heuristic flag for inputs that likely capture system output audio.
    pub is_loopback_like: bool,
}

const LOOPBACK_KEYWORDS: &[&str] = &[
    "stereo mix",
    "wave out",
    "what u hear",
    "what you hear",
    "loopback",
    "monitor of",
];

/// Best-effort heuristic for loopback capture devices. A call client must
/// never pick one of these as a microphone, or the agent hears itself.
pub fn is_loopback_like_name(name: &str) -> bool {
    let lowered = name.trim().to_ascii_lowercase();
    LOOPBACK_KEYWORDS.iter().any(|k| lowered.contains(k))
}

/// Default first, then alphabetical.
fn sort_devices(list: &mut [DeviceInfo]) {
    list.sort_by_key(|d| (!d.is_default, d.name.to_ascii_lowercase()));
}

#[cfg(feature = "audio-cpal")]
mod host {
    use cpal::traits::{DeviceTrait, HostTrait};
    use cpal::Device;
    use tracing::warn;

    use super::{is_loopback_like_name, sort_devices, DeviceDirection, DeviceInfo};
    use crate::error::{Result, VoxError};

    fn enumerate(direction: DeviceDirection) -> Vec<DeviceInfo> {
        let host = cpal::default_host();
        let (default_name, devices) = match direction {
            DeviceDirection::Input => (
                host.default_input_device().and_then(|d| d.name().ok()),
                host.input_devices().map(|d| d.collect::<Vec<_>>()),
            ),
            DeviceDirection::Output => (
                host.default_output_device().and_then(|d| d.name().ok()),
                host.output_devices().map(|d| d.collect::<Vec<_>>()),
            ),
        };

        let devices = match devices {
            Ok(devices) => devices,
            Err(e) => {
                warn!(?direction, "failed to enumerate devices: {e}");
                return default_name
                    .map(|name| {
                        vec![DeviceInfo {
                            is_loopback_like: direction == DeviceDirection::Input
                                && is_loopback_like_name(&name),
                            name,
                            direction,
                            is_default: true,
                        }]
                    })
                    .unwrap_or_default();
            }
        };

        let mut list = devices
            .iter()
            .enumerate()
            .map(|(idx, device)| {
                let name = device
                    .name()
                    .unwrap_or_else(|_| format!("{direction:?} Device {}", idx + 1));
                DeviceInfo {
                    is_default: default_name.as_deref() == Some(name.as_str()),
                    is_loopback_like: direction == DeviceDirection::Input
                        && is_loopback_like_name(&name),
                    name,
                    direction,
                }
            })
            .collect::<Vec<_>>();
        sort_devices(&mut list);
        list
    }

    pub fn list_input_devices() -> Vec<DeviceInfo> {
        enumerate(DeviceDirection::Input)
    }

    pub fn list_output_devices() -> Vec<DeviceInfo> {
        enumerate(DeviceDirection::Output)
    }

    fn find_named<I: Iterator<Item = Device>>(mut devices: I, preferred: &str) -> Option<Device> {
        devices.find(|device| device.name().map(|n| n == preferred).unwrap_or(false))
    }

    /// Preferred input by exact name, else the system default, else the first
    /// non-loopback input.
    pub fn select_input_device(preferred: Option<&str>) -> Result<Device> {
        let host = cpal::default_host();
        if let Some(name) = preferred {
            match host.input_devices() {
                Ok(devices) => {
                    if let Some(device) = find_named(devices, name) {
                        return Ok(device);
                    }
                    warn!("preferred input device '{name}' not found, falling back");
                }
                Err(e) => warn!("failed to list input devices while resolving preference: {e}"),
            }
        }
        if let Some(device) = host.default_input_device() {
            return Ok(device);
        }
        let mut devices = host
            .input_devices()
            .map_err(|e| VoxError::AudioDevice(e.to_string()))?;
        let fallback = devices
            .find(|d| d.name().map(|n| !is_loopback_like_name(&n)).unwrap_or(true))
            .ok_or(VoxError::NoDefaultInputDevice)?;
        warn!("no default input device, falling back to first available input");
        Ok(fallback)
    }

    /// Preferred output by exact name, else the system default, else the
    /// first available output.
    pub fn select_output_device(preferred: Option<&str>) -> Result<Device> {
        let host = cpal::default_host();
        if let Some(name) = preferred {
            match host.output_devices() {
                Ok(devices) => {
                    if let Some(device) = find_named(devices, name) {
                        return Ok(device);
                    }
                    warn!("preferred output device '{name}' not found, falling back");
                }
                Err(e) => warn!("failed to list output devices while resolving preference: {e}"),
            }
        }
        if let Some(device) = host.default_output_device() {
            return Ok(device);
        }
        let mut devices = host
            .output_devices()
            .map_err(|e| VoxError::AudioDevice(e.to_string()))?;
        let fallback = devices.next().ok_or(VoxError::NoDefaultOutputDevice)?;
        warn!("no default output device, falling back to first available output");
        Ok(fallback)
    }
}

#[cfg(feature = "audio-cpal")]
pub use host::{list_input_devices, list_output_devices, select_input_device, select_output_device};

#[cfg(not(feature = "audio-cpal"))]
pub fn list_input_devices() -> Vec<DeviceInfo> {
    vec![]
}

#[cfg(not(feature = "audio-cpal"))]
pub fn list_output_devices() -> Vec<DeviceInfo> {
    vec![]
}
