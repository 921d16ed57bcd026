//! Device identity derived from the factory hardware address.

use core::fmt::Write as _;

use crate::platform::IdentitySource;

/// Longest identity is `<prefix>-` plus twelve hex digits; prefixes are
/// short target names, so 32 leaves headroom.
pub const DEVICE_ID_MAX: usize = 32;

pub type DeviceId = heapless::String<DEVICE_ID_MAX>;

const PLACEHOLDER_SUFFIX: &str = "placeholder";

/// Identity resolved once per boot. `degraded` marks the placeholder form
/// taken when no hardware address was available.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedIdentity {
    pub id: DeviceId,
    pub degraded: bool,
}

/// Formats `<prefix>-<12 lowercase hex>` from a six-byte hardware address.
pub fn from_hardware_address(prefix: &str, address: [u8; 6]) -> DeviceId {
    let mut id = DeviceId::new();
    let _ = write!(id, "{prefix}-");
    for byte in address {
        let _ = write!(id, "{byte:02x}");
    }
    id
}

/// Formats the degraded `<prefix>-placeholder` identity.
pub fn placeholder(prefix: &str) -> DeviceId {
    let mut id = DeviceId::new();
    let _ = write!(id, "{prefix}-{PLACEHOLDER_SUFFIX}");
    id
}

/// Resolves the boot identity from the given source, degrading to the
/// placeholder form when the source has no address.
pub fn resolve<I: IdentitySource>(prefix: &str, source: &mut I) -> ResolvedIdentity {
    match source.hardware_address() {
        Some(address) => ResolvedIdentity {
            id: from_hardware_address(prefix, address),
            degraded: false,
        },
        None => ResolvedIdentity {
            id: placeholder(prefix),
            degraded: true,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedAddress(Option<[u8; 6]>);

    impl IdentitySource for FixedAddress {
        fn hardware_address(&mut self) -> Option<[u8; 6]> {
            self.0
        }
    }

    #[test]
    fn formats_address_as_lowercase_hex() {
        let id = from_hardware_address("esp32", [0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);
        assert_eq!(id.as_str(), "esp32-aabbccddeeff");
    }

    #[test]
    fn zero_pads_each_byte() {
        let id = from_hardware_address("cyd", [0x00, 0x01, 0x0A, 0x10, 0xF0, 0x05]);
        assert_eq!(id.as_str(), "cyd-00010a10f005");
    }

    #[test]
    fn resolves_placeholder_when_address_missing() {
        let resolved = resolve("p4", &mut FixedAddress(None));
        assert_eq!(resolved.id.as_str(), "p4-placeholder");
        assert!(resolved.degraded);
    }

    #[test]
    fn resolves_hardware_identity_when_address_present() {
        let resolved = resolve("esp32", &mut FixedAddress(Some([0x24, 0x6F, 0x28, 0x00, 0x11, 0x22])));
        assert_eq!(resolved.id.as_str(), "esp32-246f28001122");
        assert!(!resolved.degraded);
    }
}
