//! Hardware address of an advertising device.
//!
//! The registry keys records by this type, so it is `Copy`, hashable and
//! independent of any Bluetooth library.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A 48-bit Bluetooth device address, most significant byte first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct DeviceAddress(pub [u8; 6]);

impl DeviceAddress {
    /// Build an address from the little-endian byte order used on the HCI wire.
    pub fn from_le_bytes(mut bytes: [u8; 6]) -> Self {
        bytes.reverse();
        Self(bytes)
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

/// Errors returned when parsing a device address string.
#[derive(Error, Debug, PartialEq)]
pub enum ParseAddressError {
    #[error("invalid device address: expected 6 octets, got {0}")]
    WrongOctetCount(usize),
    #[error("invalid device address: octet {0} must be two hex digits")]
    WrongOctetWidth(usize),
    #[error("invalid device address: '{0}' is not valid hex")]
    InvalidHex(String),
}

impl FromStr for DeviceAddress {
    type Err = ParseAddressError;

    /// Accepts `AA:BB:CC:DD:EE:FF` and the dash-separated `AA-BB-CC-DD-EE-FF`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let separator = if s.contains('-') { '-' } else { ':' };
        let octets: Vec<&str> = s.trim().split(separator).collect();
        if octets.len() != 6 {
            return Err(ParseAddressError::WrongOctetCount(octets.len()));
        }

        let mut bytes = [0u8; 6];
        for (i, octet) in octets.iter().enumerate() {
            if octet.len() != 2 {
                return Err(ParseAddressError::WrongOctetWidth(i));
            }
            bytes[i] = u8::from_str_radix(octet, 16)
                .map_err(|_| ParseAddressError::InvalidHex(octet.to_string()))?;
        }

        Ok(DeviceAddress(bytes))
    }
}

impl From<[u8; 6]> for DeviceAddress {
    fn from(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }
}

#[cfg(feature = "bluer")]
impl From<bluer::Address> for DeviceAddress {
    fn from(addr: bluer::Address) -> Self {
        Self(addr.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_pads_and_uppercases() {
        let addr = DeviceAddress([0x0a, 0x01, 0xbc, 0x00, 0xee, 0x7f]);
        assert_eq!(addr.to_string(), "0A:01:BC:00:EE:7F");
    }

    #[test]
    fn test_parse_colon_and_dash_forms() {
        let colon: DeviceAddress = "c4:7c:8d:6a:1b:02".parse().unwrap();
        let dash: DeviceAddress = "C4-7C-8D-6A-1B-02".parse().unwrap();
        assert_eq!(colon, dash);
        assert_eq!(colon.0, [0xC4, 0x7C, 0x8D, 0x6A, 0x1B, 0x02]);
    }

    #[test]
    fn test_parse_roundtrips_through_display() {
        let addr = DeviceAddress([0xC4, 0x7C, 0x8D, 0x6A, 0x1B, 0x02]);
        assert_eq!(addr.to_string().parse::<DeviceAddress>().unwrap(), addr);
    }

    #[test]
    fn test_parse_rejects_malformed_input() {
        assert_eq!(
            "sensor".parse::<DeviceAddress>(),
            Err(ParseAddressError::WrongOctetCount(1))
        );
        assert_eq!(
            "C4:7C:8D".parse::<DeviceAddress>(),
            Err(ParseAddressError::WrongOctetCount(3))
        );
        assert_eq!(
            "C4:7C:8D:6A:1B:2".parse::<DeviceAddress>(),
            Err(ParseAddressError::WrongOctetWidth(5))
        );
        assert!(matches!(
            "C4:7C:8D:6A:1B:ZZ".parse::<DeviceAddress>(),
            Err(ParseAddressError::InvalidHex(_))
        ));
    }

    #[test]
    fn test_from_le_bytes_reverses_wire_order() {
        let addr = DeviceAddress::from_le_bytes([0x02, 0x1B, 0x6A, 0x8D, 0x7C, 0xC4]);
        assert_eq!(addr.to_string(), "C4:7C:8D:6A:1B:02");
    }
}
