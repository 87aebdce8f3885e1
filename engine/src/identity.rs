//! Direct (non-intercepted) identity queries used to capture originals.

use idveil_protocol::OriginalIdentifiers;

/// Reads the machine's real identifiers.
///
/// These queries run before any interception for the target is installed,
/// so they always observe real values.
pub trait IdentitySource: Send + Sync {
    fn capture(&self) -> OriginalIdentifiers;
}

/// Identity queries against the running system.
///
/// MAC address and volume serial come from the real system queries; the
/// categories without a direct query at this layer (disk, GPU, firmware)
/// are left empty.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemIdentitySource;

impl IdentitySource for SystemIdentitySource {
    fn capture(&self) -> OriginalIdentifiers {
        #[cfg(windows)]
        {
            crate::windows::capture_identifiers()
        }
        #[cfg(not(windows))]
        {
            fallback_identifiers()
        }
    }
}

/// Values reported when the real queries are unavailable.
#[cfg(not(windows))]
pub(crate) fn fallback_identifiers() -> OriginalIdentifiers {
    OriginalIdentifiers {
        mac_address: "00:00:00:00:00:00".to_string(),
        volume_serial: "00000000".to_string(),
        ..Default::default()
    }
}
