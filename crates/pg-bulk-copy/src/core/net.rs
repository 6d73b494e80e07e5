//! Network address types: inet/cidr networks and MAC addresses.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use crate::error::{BulkCopyError, Result};

/// An IP address with a netmask length, as stored in `inet` and `cidr`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Inet {
    addr: IpAddr,
    netmask: u8,
}

impl Inet {
    /// Create a network, rejecting netmasks longer than the address.
    pub fn new(addr: IpAddr, netmask: u8) -> Result<Self> {
        let max = max_bits(&addr);
        if netmask > max {
            return Err(BulkCopyError::Conversion(format!(
                "netmask /{} exceeds {} bits for {}",
                netmask, max, addr
            )));
        }
        Ok(Self { addr, netmask })
    }

    /// A single host (full-length netmask).
    pub fn host(addr: IpAddr) -> Self {
        Self {
            netmask: max_bits(&addr),
            addr,
        }
    }

    pub fn addr(&self) -> IpAddr {
        self.addr
    }

    pub fn netmask(&self) -> u8 {
        self.netmask
    }

    /// Check if every bit to the right of the netmask is zero.
    pub fn is_network(&self) -> bool {
        match self.addr {
            IpAddr::V4(v4) => {
                let bits = u32::from(v4);
                let host_mask = u32::MAX.checked_shr(u32::from(self.netmask)).unwrap_or(0);
                bits & host_mask == 0
            }
            IpAddr::V6(v6) => {
                let bits = u128::from(v6);
                let host_mask = u128::MAX
                    .checked_shr(u32::from(self.netmask))
                    .unwrap_or(0);
                bits & host_mask == 0
            }
        }
    }
}

fn max_bits(addr: &IpAddr) -> u8 {
    match addr {
        IpAddr::V4(_) => 32,
        IpAddr::V6(_) => 128,
    }
}

impl From<IpAddr> for Inet {
    fn from(addr: IpAddr) -> Self {
        Inet::host(addr)
    }
}

impl FromStr for Inet {
    type Err = BulkCopyError;

    /// Parse `addr` or `addr/prefix`.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (addr_part, mask_part) = match s.split_once('/') {
            Some((a, m)) => (a, Some(m)),
            None => (s, None),
        };
        let addr: IpAddr = addr_part
            .parse()
            .map_err(|_| BulkCopyError::Conversion(format!("invalid IP address: {:?}", s)))?;
        match mask_part {
            None => Ok(Inet::host(addr)),
            Some(m) => {
                let netmask: u8 = m
                    .parse()
                    .map_err(|_| BulkCopyError::Conversion(format!("invalid netmask: {:?}", s)))?;
                Inet::new(addr, netmask)
            }
        }
    }
}

impl fmt::Display for Inet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.netmask)
    }
}

/// A 6-byte (EUI-48) or 8-byte (EUI-64) hardware address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MacAddress {
    Eui48([u8; 6]),
    Eui64([u8; 8]),
}

impl MacAddress {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            MacAddress::Eui48(b) => b,
            MacAddress::Eui64(b) => b,
        }
    }

    /// Widen to 8 bytes; a 6-byte address gets `FF:FE` inserted in the middle.
    pub fn to_eui64(self) -> [u8; 8] {
        match self {
            MacAddress::Eui64(b) => b,
            MacAddress::Eui48(b) => [b[0], b[1], b[2], 0xFF, 0xFE, b[3], b[4], b[5]],
        }
    }

    /// Parse from a raw byte slice of length 6 or 8.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        if let Ok(b) = <[u8; 6]>::try_from(bytes) {
            return Ok(MacAddress::Eui48(b));
        }
        if let Ok(b) = <[u8; 8]>::try_from(bytes) {
            return Ok(MacAddress::Eui64(b));
        }
        Err(BulkCopyError::Conversion(format!(
            "MAC address must be 6 or 8 bytes, got {}",
            bytes.len()
        )))
    }
}

impl FromStr for MacAddress {
    type Err = BulkCopyError;

    /// Accepts hex digits separated by `:`, `-`, `.` or not separated at all.
    fn from_str(s: &str) -> Result<Self> {
        let digits: String = s
            .trim()
            .chars()
            .filter(|c| !matches!(c, ':' | '-' | '.'))
            .collect();
        if digits.len() != 12 && digits.len() != 16 {
            return Err(BulkCopyError::Conversion(format!(
                "invalid MAC address: {:?}",
                s
            )));
        }
        let mut bytes = Vec::with_capacity(digits.len() / 2);
        for i in (0..digits.len()).step_by(2) {
            let byte = digits
                .get(i..i + 2)
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or_else(|| BulkCopyError::Conversion(format!("invalid MAC address: {:?}", s)))?;
            bytes.push(byte);
        }
        MacAddress::from_slice(&bytes)
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, b) in self.as_bytes().iter().enumerate() {
            if i > 0 {
                f.write_str(":")?;
            }
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inet_parse() {
        let net: Inet = "192.168.1.0/24".parse().unwrap();
        assert_eq!(net.netmask(), 24);
        assert!(net.is_network());

        let host: Inet = "10.0.0.5".parse().unwrap();
        assert_eq!(host.netmask(), 32);
        assert!(host.is_network());

        let hosty: Inet = "10.0.0.5/8".parse().unwrap();
        assert!(!hosty.is_network());

        let v6: Inet = "2001:db8::/32".parse().unwrap();
        assert_eq!(v6.netmask(), 32);
        assert!(v6.is_network());
    }

    #[test]
    fn test_inet_rejects_bad_input() {
        assert!("10.0.0.1/33".parse::<Inet>().is_err());
        assert!("not-an-ip".parse::<Inet>().is_err());
        assert!("10.0.0.1/x".parse::<Inet>().is_err());
    }

    #[test]
    fn test_zero_netmask_is_network_only_for_zero_address() {
        assert!("0.0.0.0/0".parse::<Inet>().unwrap().is_network());
        assert!(!"1.0.0.0/0".parse::<Inet>().unwrap().is_network());
    }

    #[test]
    fn test_mac_separators() {
        let expected = MacAddress::Eui48([0x08, 0x00, 0x2b, 0x01, 0x02, 0x03]);
        for s in [
            "08:00:2b:01:02:03",
            "08-00-2b-01-02-03",
            "0800.2b01.0203",
            "08002b010203",
        ] {
            assert_eq!(s.parse::<MacAddress>().unwrap(), expected, "{}", s);
        }
        assert!("08:00:2b".parse::<MacAddress>().is_err());
        assert!("zz:00:2b:01:02:03".parse::<MacAddress>().is_err());
    }

    #[test]
    fn test_mac_to_eui64() {
        let mac = MacAddress::Eui48([1, 2, 3, 4, 5, 6]);
        assert_eq!(mac.to_eui64(), [1, 2, 3, 0xFF, 0xFE, 4, 5, 6]);
        assert_eq!(mac.to_string(), "01:02:03:04:05:06");
    }
}
