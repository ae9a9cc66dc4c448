//! Interface address type: an IP address together with its prefix length.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

/// An address assigned to an interface, in CIDR notation (`10.0.0.1/24`).
///
/// Unlike a network prefix the host bits are preserved: `10.0.0.1/24` and
/// `10.0.0.2/24` are different interface addresses on the same network.
/// The bare address (without length) is the natural key the directory is
/// reconciled on; the prefix length is an attribute of that key.
///
/// # Examples
///
/// ```
/// use nbsync_types::IpInterface;
///
/// let addr: IpInterface = "10.0.0.1/24".parse().unwrap();
/// assert_eq!(addr.bare(), "10.0.0.1");
/// assert_eq!(addr.prefix_len(), 24);
///
/// // Dotted netmasks are accepted as well.
/// let masked: IpInterface = "10.0.0.1 255.255.255.0".parse().unwrap();
/// assert_eq!(addr, masked);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IpInterface {
    address: IpAddr,
    prefix_len: u8,
}

impl IpInterface {
    /// Creates a new interface address.
    ///
    /// # Errors
    ///
    /// Returns an error if the prefix length exceeds 32 (IPv4) or 128 (IPv6).
    pub fn new(address: IpAddr, prefix_len: u8) -> Result<Self, ParseError> {
        let max_len = match address {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        };

        if prefix_len > max_len {
            return Err(ParseError::InvalidIpPrefix(format!(
                "prefix length {} exceeds maximum {} for {}",
                prefix_len, max_len, address
            )));
        }

        Ok(IpInterface {
            address,
            prefix_len,
        })
    }

    /// Returns the address without its prefix length.
    pub const fn address(&self) -> IpAddr {
        self.address
    }

    /// Returns the prefix length in bits.
    pub const fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    /// Returns true if this is an IPv4 address.
    pub const fn is_ipv4(&self) -> bool {
        self.address.is_ipv4()
    }

    /// Returns the bare address as text, the natural key for reconciliation.
    pub fn bare(&self) -> String {
        self.address.to_string()
    }
}

fn mask_to_prefix_len(mask: Ipv4Addr) -> Option<u8> {
    let bits = u32::from(mask);
    let len = bits.leading_ones();
    // A netmask must be contiguous ones followed by zeros.
    if bits.checked_shl(len).unwrap_or(0) != 0 {
        return None;
    }
    u8::try_from(len).ok()
}

impl fmt::Display for IpInterface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.prefix_len)
    }
}

impl FromStr for IpInterface {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let (addr_str, len_str) = match trimmed.split_once(['/', ' ']) {
            Some((addr, len)) => (addr.trim(), Some(len.trim())),
            None => (trimmed, None),
        };

        let address: IpAddr = addr_str
            .parse()
            .map_err(|_| ParseError::InvalidIpAddress(s.to_string()))?;

        let prefix_len = match len_str {
            None => match address {
                IpAddr::V4(_) => 32,
                IpAddr::V6(_) => 128,
            },
            Some(len) if len.contains('.') => {
                let mask: Ipv4Addr = len
                    .parse()
                    .map_err(|_| ParseError::InvalidIpPrefix(s.to_string()))?;
                mask_to_prefix_len(mask)
                    .ok_or_else(|| ParseError::InvalidIpPrefix(s.to_string()))?
            }
            Some(len) => len
                .parse()
                .map_err(|_| ParseError::InvalidIpPrefix(s.to_string()))?,
        };

        IpInterface::new(address, prefix_len)
    }
}

impl TryFrom<String> for IpInterface {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<IpInterface> for String {
    fn from(addr: IpInterface) -> String {
        addr.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_ipv4() {
        let addr: IpInterface = "192.168.1.1/24".parse().unwrap();
        assert!(addr.is_ipv4());
        assert_eq!(addr.prefix_len(), 24);
        assert_eq!(addr.bare(), "192.168.1.1");
        assert_eq!(addr.to_string(), "192.168.1.1/24");
    }

    #[test]
    fn test_parse_ipv6() {
        let addr: IpInterface = "2001:db8::1/64".parse().unwrap();
        assert!(!addr.is_ipv4());
        assert_eq!(addr.prefix_len(), 64);
        assert_eq!(addr.bare(), "2001:db8::1");
    }

    #[test]
    fn test_bare_address_is_host_length() {
        let v4: IpInterface = "10.1.1.1".parse().unwrap();
        assert_eq!(v4.prefix_len(), 32);
        let v6: IpInterface = "fe80::1".parse().unwrap();
        assert_eq!(v6.prefix_len(), 128);
    }

    #[test]
    fn test_dotted_netmask() {
        let addr: IpInterface = "10.0.0.1 255.255.255.252".parse().unwrap();
        assert_eq!(addr.prefix_len(), 30);
        assert!("10.0.0.1 255.0.255.0".parse::<IpInterface>().is_err());
    }

    #[test]
    fn test_invalid_prefix_length() {
        assert!("10.0.0.1/33".parse::<IpInterface>().is_err());
        assert!("2001:db8::1/129".parse::<IpInterface>().is_err());
        assert!("10.0.0.1/abc".parse::<IpInterface>().is_err());
        assert!("not-an-ip/24".parse::<IpInterface>().is_err());
    }
}
