// src/descriptor.rs
//
// Reported device attributes and the pure display derivations built on
// them (panel heading, update-advisory banner).

use serde::{Deserialize, Serialize};

/// Reported type tag of a connected device. Distinct from the dispatch
/// class: the tag describes what the device says it is, the class decides
/// which handler owns it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "kind", content = "name")]
pub enum DeviceType {
    LaserCan,
    FlexiCan,
    MitoCandria,
    /// Vendor device carrying its own display name.
    Vendor(String),
    Unknown,
}

impl DeviceType {
    /// Fixed label for well-known kinds, the vendor-supplied name for
    /// vendor devices, "Unknown Device" otherwise. Pure.
    pub fn label(&self) -> &str {
        match self {
            DeviceType::LaserCan => "LaserCAN",
            DeviceType::FlexiCan => "FlexiCAN",
            DeviceType::MitoCandria => "MitoCANdria",
            DeviceType::Vendor(name) => name,
            DeviceType::Unknown => "Unknown Device",
        }
    }
}

/// Attributes a device reports about itself during enumeration.
///
/// When `in_bootloader` is set the device offers only firmware-upgrade
/// operations, regardless of its nominal type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceDescriptor {
    pub device_type: DeviceType,
    pub device_id: Option<u8>,
    pub name: Option<String>,
    pub serial: Option<u32>,
    pub firmware_version: Option<String>,
    #[serde(default)]
    pub in_bootloader: bool,
}

impl DeviceDescriptor {
    /// Heading shown alongside the device's panel, e.g. "LaserCAN #5".
    pub fn heading(&self) -> String {
        match self.device_id {
            Some(id) => format!("{} #{}", self.device_type.label(), id),
            None => self.device_type.label().to_string(),
        }
    }

    /// Serial number rendered as big-endian hex, as printed on the case.
    pub fn serial_hex(&self) -> Option<String> {
        self.serial.map(|s| hex::encode(s.to_be_bytes()))
    }
}

/// Latest known firmware release, supplied by the host. Display-only:
/// a mismatch produces an advisory banner, never an automatic action.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReleaseInfo {
    pub version: String,
    pub announcement_url: Option<String>,
}

/// Advisory banner text when the device's reported firmware version differs
/// from the latest known release. `None` when either version is unknown or
/// they match.
pub fn update_advisory(descriptor: &DeviceDescriptor, latest: Option<&ReleaseInfo>) -> Option<String> {
    let latest = latest?;
    let current = descriptor.firmware_version.as_deref()?;
    if current == latest.version {
        return None;
    }
    Some(format!(
        "Firmware {} is available (device reports {})",
        latest.version, current
    ))
}
