//! Plausible random identifier generation.

use idveil_protocol::SpoofedIdentifiers;
use rand::Rng;

const HEX_DIGITS: &[u8; 16] = b"0123456789ABCDEF";

/// Hex-string length for each serial category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerialLengths {
    pub disk: usize,
    pub volume: usize,
    pub gpu: usize,
    pub bios: usize,
    pub motherboard: usize,
}

impl Default for SerialLengths {
    fn default() -> Self {
        Self {
            disk: 16,
            volume: 8,
            gpu: 12,
            bios: 10,
            motherboard: 14,
        }
    }
}

/// Generate a full spoof set with the default serial lengths.
///
/// The set comes back inactive and unowned; `apply_spoofing` stamps it.
/// MAC bytes are uniform random — the locally-administered/unicast
/// convention bits are not forced.
pub fn generate_identifiers() -> SpoofedIdentifiers {
    generate_identifiers_with(&SerialLengths::default())
}

/// Generate a full spoof set with caller-specified serial lengths.
pub fn generate_identifiers_with(lengths: &SerialLengths) -> SpoofedIdentifiers {
    let mut rng = rand::thread_rng();
    SpoofedIdentifiers {
        mac_address: random_mac(&mut rng),
        disk_serial: random_serial(&mut rng, lengths.disk),
        volume_serial: random_serial(&mut rng, lengths.volume),
        gpu_id: random_serial(&mut rng, lengths.gpu),
        bios_serial: random_serial(&mut rng, lengths.bios),
        motherboard_serial: random_serial(&mut rng, lengths.motherboard),
        active: false,
        owner_pid: 0,
    }
}

/// Six random bytes rendered as uppercase colon-hex (`XX:XX:XX:XX:XX:XX`).
fn random_mac(rng: &mut impl Rng) -> String {
    let bytes: [u8; 6] = rng.gen();
    bytes
        .iter()
        .map(|byte| format!("{byte:02X}"))
        .collect::<Vec<_>>()
        .join(":")
}

/// `len` uppercase hex digits.
fn random_serial(rng: &mut impl Rng, len: usize) -> String {
    (0..len)
        .map(|_| HEX_DIGITS[rng.gen_range(0..HEX_DIGITS.len())] as char)
        .collect()
}
