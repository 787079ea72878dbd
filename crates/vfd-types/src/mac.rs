//! MAC address type with safe parsing and formatting.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A 48-bit Ethernet MAC address.
///
/// # Examples
///
/// ```
/// use vfd_types::MacAddress;
///
/// let mac: MacAddress = "00:11:22:33:44:55".parse().unwrap();
/// assert_eq!(mac.to_string(), "00:11:22:33:44:55");
///
/// // Also supports hyphen-separated format
/// let mac2: MacAddress = "00-11-22-33-44-55".parse().unwrap();
/// assert_eq!(mac, mac2);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    /// The zero/null MAC address (00:00:00:00:00:00).
    pub const ZERO: MacAddress = MacAddress([0, 0, 0, 0, 0, 0]);

    /// Creates a new MAC address from raw bytes.
    pub const fn new(bytes: [u8; 6]) -> Self {
        MacAddress(bytes)
    }

    /// Returns the raw bytes of the MAC address.
    pub const fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }

    /// Returns true if this is a multicast (or broadcast) address.
    pub const fn is_multicast(&self) -> bool {
        self.0[0] & 0x01 != 0
    }

    /// Returns true if this is the zero address.
    pub fn is_zero(&self) -> bool {
        self.0 == [0; 6]
    }
}

/// Checks that `mac` is six colon separated hexadecimal octets.
///
/// The string must be at least 17 characters long, contain exactly five
/// colons, hold nothing but hex digits between them, and every octet must be
/// numerically at most 255. Leading zeros are tolerated (`"0ff"` is 255).
///
/// ```
/// use vfd_types::is_valid_mac_str;
///
/// assert!(is_valid_mac_str("00:1b:21:aa:0c:7f"));
/// assert!(!is_valid_mac_str("00-1b-21-aa-0c-7f"));
/// assert!(!is_valid_mac_str("00:1b:21:aa:0c:1ff"));
/// ```
pub fn is_valid_mac_str(mac: &str) -> bool {
    if mac.len() < 17 {
        return false;
    }

    let mut colons = 0;
    for c in mac.chars() {
        if c == ':' {
            colons += 1;
        } else if !c.is_ascii_hexdigit() {
            return false;
        }
    }
    if colons != 5 {
        return false;
    }

    mac.split(':').all(|octet| {
        !octet.is_empty()
            && u32::from_str_radix(octet.trim_start_matches('0'), 16)
                .map(|v| v <= 255)
                .unwrap_or(octet.chars().all(|c| c == '0'))
    })
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

impl FromStr for MacAddress {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Support both colon and hyphen separators
        let separator = if s.contains(':') { ':' } else { '-' };

        let parts: Vec<&str> = s.split(separator).collect();
        if parts.len() != 6 {
            return Err(ParseError::InvalidMacAddress(s.to_string()));
        }

        let mut bytes = [0u8; 6];
        for (i, part) in parts.iter().enumerate() {
            bytes[i] = u8::from_str_radix(part, 16)
                .map_err(|_| ParseError::InvalidMacAddress(s.to_string()))?;
        }

        Ok(MacAddress(bytes))
    }
}

impl TryFrom<String> for MacAddress {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<MacAddress> for String {
    fn from(mac: MacAddress) -> String {
        mac.to_string()
    }
}

impl From<[u8; 6]> for MacAddress {
    fn from(bytes: [u8; 6]) -> Self {
        MacAddress(bytes)
    }
}

impl From<MacAddress> for [u8; 6] {
    fn from(mac: MacAddress) -> [u8; 6] {
        mac.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_colon_format() {
        let mac: MacAddress = "00:11:22:33:44:55".parse().unwrap();
        assert_eq!(mac.as_bytes(), &[0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);
    }

    #[test]
    fn test_parse_hyphen_format() {
        let mac: MacAddress = "00-11-22-33-44-55".parse().unwrap();
        assert_eq!(mac.as_bytes(), &[0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);
    }

    #[test]
    fn test_display() {
        let mac = MacAddress::new([0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]);
        assert_eq!(mac.to_string(), "aa:bb:cc:dd:ee:ff");
    }

    #[test]
    fn test_multicast_and_zero() {
        let multicast: MacAddress = "01:00:5e:00:00:01".parse().unwrap();
        assert!(multicast.is_multicast());
        assert!(!"00:11:22:33:44:55".parse::<MacAddress>().unwrap().is_multicast());
        assert!(MacAddress::ZERO.is_zero());
    }

    #[test]
    fn test_valid_mac_str() {
        assert!(is_valid_mac_str("00:11:22:33:44:55"));
        assert!(is_valid_mac_str("FA:16:3E:0B:7C:1D"));
        assert!(is_valid_mac_str("000:11:22:33:44:55"));
        assert!(is_valid_mac_str("0ff:11:22:33:44:55"));
    }

    #[test]
    fn test_invalid_mac_str() {
        // too short
        assert!(!is_valid_mac_str("0:1:2:3:4:5"));
        // missing a colon
        assert!(!is_valid_mac_str("00:11:22:33:4455aa"));
        // non-hex character
        assert!(!is_valid_mac_str("00:11:22:33:44:5g"));
        // octet above 255
        assert!(!is_valid_mac_str("100:11:22:33:44:55"));
        // too many colons
        assert!(!is_valid_mac_str("00:11:22:33:44:55:66"));
        // empty octet
        assert!(!is_valid_mac_str("0011:22:33:44::5566"));
        // hyphen separated is fine for parsing but not for the strict check
        assert!(!is_valid_mac_str("00-11-22-33-44-55"));
    }

    #[test]
    fn test_invalid_format() {
        assert!("invalid".parse::<MacAddress>().is_err());
        assert!("00:11:22:33:44".parse::<MacAddress>().is_err());
        assert!("00:11:22:33:44:55:66".parse::<MacAddress>().is_err());
        assert!("gg:11:22:33:44:55".parse::<MacAddress>().is_err());
    }
}
