//! Identifier sets captured from, and staged for, a target process.

use serde::{Deserialize, Serialize};

/// One hardware/system identifier category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IdentityCategory {
    MacAddress,
    VolumeSerial,
    DiskSerial,
    GpuId,
    BiosSerial,
    MotherboardSerial,
}

impl IdentityCategory {
    /// Every category, in the order apply reports list them.
    pub const ALL: [IdentityCategory; 6] = [
        IdentityCategory::MacAddress,
        IdentityCategory::VolumeSerial,
        IdentityCategory::DiskSerial,
        IdentityCategory::GpuId,
        IdentityCategory::BiosSerial,
        IdentityCategory::MotherboardSerial,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IdentityCategory::MacAddress => "mac address",
            IdentityCategory::VolumeSerial => "volume serial",
            IdentityCategory::DiskSerial => "disk serial",
            IdentityCategory::GpuId => "gpu id",
            IdentityCategory::BiosSerial => "bios serial",
            IdentityCategory::MotherboardSerial => "motherboard serial",
        }
    }
}

/// A spoofed identifier set staged for (or applied to) a target process.
///
/// An empty string means "leave this category alone" — the engine skips it.
/// The MAC address is textual hex (the interception decodes it two
/// characters per byte); the volume serial is textual base-16.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SpoofedIdentifiers {
    pub mac_address: String,
    pub disk_serial: String,
    pub volume_serial: String,
    pub gpu_id: String,
    pub bios_serial: String,
    pub motherboard_serial: String,
    /// True from the moment the set is installed until it is restored.
    pub active: bool,
    /// Process this set applies to; 0 until the controller stamps it.
    #[serde(rename = "ownerProcessId")]
    pub owner_pid: u32,
}

impl SpoofedIdentifiers {
    /// The value staged for `category`, if non-empty.
    pub fn value(&self, category: IdentityCategory) -> Option<&str> {
        let value = match category {
            IdentityCategory::MacAddress => &self.mac_address,
            IdentityCategory::VolumeSerial => &self.volume_serial,
            IdentityCategory::DiskSerial => &self.disk_serial,
            IdentityCategory::GpuId => &self.gpu_id,
            IdentityCategory::BiosSerial => &self.bios_serial,
            IdentityCategory::MotherboardSerial => &self.motherboard_serial,
        };
        (!value.is_empty()).then_some(value.as_str())
    }
}

/// The machine's real identifiers, captured once per initialized target.
///
/// Categories without a direct query on the current platform stay empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OriginalIdentifiers {
    pub mac_address: String,
    pub disk_serial: String,
    pub volume_serial: String,
    pub gpu_id: String,
    pub bios_serial: String,
    pub motherboard_serial: String,
}
