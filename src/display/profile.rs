/*
 *  display/profile.rs
 *
 *  trlcd - cooler panel streamer
 *  (c) 2020-26 Stuart Hunter
 *
 *  Static registry of supported LCD panels
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *  Public License.
 *
 */

use std::fmt;

use crate::display::error::SessionError;

/// Vendor/product pair reported by the USB device descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceIdentity {
    pub vendor_id: u16,
    pub product_id: u16,
}

impl DeviceIdentity {
    pub const fn new(vendor_id: u16, product_id: u16) -> Self {
        Self { vendor_id, product_id }
    }

    /// Parse the `vvvv:pppp` hex notation used by lsusb
    pub fn parse(s: &str) -> Option<Self> {
        let (vid, pid) = s.trim().split_once(':')?;
        let vid = u16::from_str_radix(vid.trim_start_matches("0x"), 16).ok()?;
        let pid = u16::from_str_radix(pid.trim_start_matches("0x"), 16).ok()?;
        Some(Self::new(vid, pid))
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}:{:04x}", self.vendor_id, self.product_id)
    }
}

/// Byte layout of the per-frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderLayout {
    /// `69 88 w h 0000`, 8 bytes
    Compact,
    /// `DA DB DC DD` magic followed by an 18 byte descriptor, 22 bytes
    Extended,
}

/// How the panel is addressed on the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// Output reports on the HID interface, addressing is implicit
    Hid,
    /// Raw bulk endpoints on an explicitly claimed interface
    Bulk {
        endpoint_out: u8,
        endpoint_in: u8,
        interface: u8,
    },
}

/// Immutable description of one supported panel model
#[derive(Debug, PartialEq, Eq)]
pub struct DeviceProfile {
    pub name: &'static str,
    pub identity: DeviceIdentity,
    /// Payload bytes per transport packet, excluding the framing byte
    pub chunk_size: usize,
    pub width: u32,
    pub height: u32,
    pub header: HeaderLayout,
    pub transport: TransportKind,
    /// Leading byte of every packet (HID report id)
    pub framing_byte: u8,
    /// Raw blobs written once, in order, before the first frame
    pub init_sequence: &'static [&'static [u8]],
}

impl DeviceProfile {
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn packet_len(&self) -> usize {
        self.chunk_size + 1
    }

    pub fn is_hid(&self) -> bool {
        matches!(self.transport, TransportKind::Hid)
    }
}

impl fmt::Display for DeviceProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}] {}x{}", self.name, self.identity, self.width, self.height)
    }
}

// ChiZhu panel handshake, captured from the vendor tool
const CHIZHU_INIT_1: &[u8] = &[
    0x1b, 0x00, 0x10, 0xd0, 0x9e, 0x27, 0x02, 0x8e, 0xff, 0xff, 0x00, 0x00, 0x00, 0x00, 0x09, 0x00,
    0x00, 0x01, 0x00, 0x02, 0x00, 0x01, 0x03, 0x40, 0x00, 0x00, 0x00, 0x12, 0x34, 0x56, 0x78, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

const CHIZHU_INIT_2: &[u8] = &[
    0x1b, 0x00, 0x10, 0x90, 0x72, 0x27, 0x02, 0x8e, 0xff, 0xff, 0x00, 0x00, 0x00, 0x00, 0x09, 0x00,
    0x01, 0x01, 0x00, 0x02, 0x00, 0x01, 0x03, 0x00, 0x00, 0x00, 0x00,
];

pub static PROFILES: &[DeviceProfile] = &[
    DeviceProfile {
        name: "Frozen Warframe 240",
        identity: DeviceIdentity::new(0x0416, 0x5302),
        chunk_size: 512,
        width: 320,
        height: 240,
        header: HeaderLayout::Extended,
        transport: TransportKind::Hid,
        framing_byte: 0x00,
        init_sequence: &[],
    },
    DeviceProfile {
        name: "Frozen Warframe 480",
        identity: DeviceIdentity::new(0x0416, 0x8001),
        chunk_size: 64,
        width: 480,
        height: 480,
        header: HeaderLayout::Extended,
        transport: TransportKind::Hid,
        framing_byte: 0x00,
        init_sequence: &[],
    },
    DeviceProfile {
        name: "Trofeo 320",
        identity: DeviceIdentity::new(0x0418, 0x5303),
        chunk_size: 64,
        width: 320,
        height: 320,
        header: HeaderLayout::Compact,
        transport: TransportKind::Hid,
        framing_byte: 0x00,
        init_sequence: &[],
    },
    DeviceProfile {
        name: "Trofeo 480",
        identity: DeviceIdentity::new(0x0418, 0x5304),
        chunk_size: 512,
        width: 480,
        height: 480,
        header: HeaderLayout::Compact,
        transport: TransportKind::Hid,
        framing_byte: 0x00,
        init_sequence: &[],
    },
    DeviceProfile {
        name: "ChiZhu 480",
        identity: DeviceIdentity::new(0x87ad, 0x70db),
        chunk_size: 512,
        width: 480,
        height: 480,
        header: HeaderLayout::Compact,
        transport: TransportKind::Bulk {
            endpoint_out: 0x01,
            endpoint_in: 0x81,
            interface: 0,
        },
        framing_byte: 0x00,
        init_sequence: &[CHIZHU_INIT_1, CHIZHU_INIT_2],
    },
];

/// Exact vid:pid lookup
pub fn lookup(identity: DeviceIdentity) -> Option<&'static DeviceProfile> {
    PROFILES.iter().find(|p| p.identity == identity)
}

/// True when some profile ships under this vendor id
pub fn is_known_vendor(vendor_id: u16) -> bool {
    PROFILES.iter().any(|p| p.identity.vendor_id == vendor_id)
}

/// Resolve a discovered identity to its profile
///
/// A known vendor with an unknown product is reported as `UnsupportedProfile`
/// so the user learns the panel was seen but cannot be driven; anything else
/// is `DeviceNotFound`. Neither case guesses a layout.
pub fn resolve(identity: DeviceIdentity) -> Result<&'static DeviceProfile, SessionError> {
    if let Some(profile) = lookup(identity) {
        return Ok(profile);
    }
    if is_known_vendor(identity.vendor_id) {
        return Err(SessionError::UnsupportedProfile {
            identity,
            reason: "product id has no header layout".to_string(),
        });
    }
    Err(SessionError::DeviceNotFound)
}

/// Profiles addressed through the HID abstraction, probed first
pub fn hid_profiles() -> impl Iterator<Item = &'static DeviceProfile> {
    PROFILES.iter().filter(|p| p.is_hid())
}

/// Raw bulk profiles, probed only when no HID panel matched
pub fn bulk_profiles() -> impl Iterator<Item = &'static DeviceProfile> {
    PROFILES.iter().filter(|p| !p.is_hid())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_known_panels() {
        let p = lookup(DeviceIdentity::new(0x0418, 0x5304)).unwrap();
        assert_eq!(p.dimensions(), (480, 480));
        assert_eq!(p.chunk_size, 512);
        assert_eq!(p.header, HeaderLayout::Compact);

        let p = lookup(DeviceIdentity::new(0x0416, 0x5302)).unwrap();
        assert_eq!(p.dimensions(), (320, 240));
        assert_eq!(p.header, HeaderLayout::Extended);
    }

    #[test]
    fn test_identities_are_unique() {
        for (i, a) in PROFILES.iter().enumerate() {
            for b in &PROFILES[i + 1..] {
                assert_ne!(a.identity, b.identity, "{} and {} collide", a.name, b.name);
            }
        }
    }

    #[test]
    fn test_chizhu_handshake() {
        let p = lookup(DeviceIdentity::new(0x87ad, 0x70db)).unwrap();
        assert!(!p.is_hid());
        assert_eq!(p.init_sequence.len(), 2);
        assert_eq!(p.init_sequence[0].len(), 91);
        assert_eq!(p.init_sequence[1].len(), 27);
        assert_eq!(p.init_sequence[0][83], 0x01);
        assert_eq!(&p.init_sequence[0][27..31], &[0x12, 0x34, 0x56, 0x78]);
    }

    #[test]
    fn test_only_bulk_profiles_carry_init() {
        assert!(hid_profiles().all(|p| p.init_sequence.is_empty()));
        assert!(bulk_profiles().all(|p| !p.init_sequence.is_empty()));
    }

    #[test]
    fn test_resolve_unknown_product_of_known_vendor() {
        let err = resolve(DeviceIdentity::new(0x0418, 0x9999)).unwrap_err();
        assert!(matches!(err, SessionError::UnsupportedProfile { .. }));
    }

    #[test]
    fn test_resolve_foreign_vendor() {
        let err = resolve(DeviceIdentity::new(0x046d, 0xc52b)).unwrap_err();
        assert!(matches!(err, SessionError::DeviceNotFound));
    }

    #[test]
    fn test_identity_parse() {
        assert_eq!(DeviceIdentity::parse("87ad:70db"), Some(DeviceIdentity::new(0x87ad, 0x70db)));
        assert_eq!(DeviceIdentity::parse("0x0416:0x8001"), Some(DeviceIdentity::new(0x0416, 0x8001)));
        assert_eq!(DeviceIdentity::parse("nonsense"), None);
        assert_eq!(DeviceIdentity::new(0x416, 0x5302).to_string(), "0416:5302");
    }
}
