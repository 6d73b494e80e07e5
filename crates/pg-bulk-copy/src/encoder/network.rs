//! Semantic encoders for network address and document columns.

use std::str::FromStr;

use crate::core::{HostValue, Inet, MacAddress, PgValue, WireType};
use crate::error::{BulkCopyError, Result};

fn unexpected(value: &HostValue, wire: WireType) -> BulkCopyError {
    BulkCopyError::Conversion(format!(
        "unexpected {} value for {} encoder",
        value.type_name(),
        wire
    ))
}

pub(crate) fn to_inet(value: &HostValue, wire: WireType) -> Result<PgValue> {
    let net = match value {
        HostValue::IpAddr(addr) => Inet::host(*addr),
        HostValue::Inet(net) => *net,
        HostValue::String(s) => Inet::from_str(s.trim())?,
        other => return Err(unexpected(other, wire)),
    };
    Ok(PgValue::Inet(net))
}

pub(crate) fn to_macaddr(value: &HostValue, wire: WireType) -> Result<PgValue> {
    let mac = match value {
        HostValue::MacAddr(mac) => *mac,
        HostValue::String(s) => MacAddress::from_str(s.trim())?,
        other => return Err(unexpected(other, wire)),
    };
    if wire == WireType::MacAddr {
        if let MacAddress::Eui64(bytes) = mac {
            return Err(BulkCopyError::Conversion(format!(
                "8-byte MAC address {} does not fit macaddr",
                MacAddress::Eui64(bytes)
            )));
        }
    }
    Ok(PgValue::MacAddr(mac))
}

/// JSON text is validated before it reaches the server.
pub(crate) fn to_json(value: &HostValue, wire: WireType) -> Result<PgValue> {
    match value {
        HostValue::String(s) => {
            serde_json::from_str::<serde::de::IgnoredAny>(s)?;
            Ok(PgValue::Json(s.clone()))
        }
        HostValue::Json(doc) => Ok(PgValue::Json(serde_json::to_string(doc)?)),
        other => Err(unexpected(other, wire)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::IpAddr;

    #[test]
    fn test_inet_from_string_and_addr() {
        let addr: IpAddr = "10.0.0.1".parse().unwrap();
        assert_eq!(
            to_inet(&HostValue::IpAddr(addr), WireType::Inet).unwrap(),
            PgValue::Inet(Inet::host(addr))
        );
        assert_eq!(
            to_inet(&"10.0.0.0/8".into(), WireType::Cidr).unwrap(),
            PgValue::Inet(Inet::new("10.0.0.0".parse().unwrap(), 8).unwrap())
        );
        assert!(to_inet(&"not-an-address".into(), WireType::Inet).is_err());
    }

    #[test]
    fn test_macaddr_rejects_eui64_for_six_byte_column() {
        assert!(to_macaddr(&"08:00:2b:01:02:03".into(), WireType::MacAddr).is_ok());
        assert!(to_macaddr(&"08:00:2b:01:02:03:04:05".into(), WireType::MacAddr).is_err());
        assert!(to_macaddr(&"08:00:2b:01:02:03:04:05".into(), WireType::MacAddr8).is_ok());
    }

    #[test]
    fn test_json_is_validated() {
        assert_eq!(
            to_json(&r#"{"a":1}"#.into(), WireType::Jsonb).unwrap(),
            PgValue::Json(r#"{"a":1}"#.into())
        );
        assert!(to_json(&"{oops".into(), WireType::Json).is_err());
        assert_eq!(
            to_json(&HostValue::Json(serde_json::json!([1, 2])), WireType::Json).unwrap(),
            PgValue::Json("[1,2]".into())
        );
    }
}
