//! Board and network identity models
//!
//! Identity written into the unit (MAC, addresses) and the metadata printed on
//! the certificate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;
use thiserror::Error;

/// MAC parsing errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum MacError {
    #[error("MAC address is empty")]
    Empty,

    #[error("MAC address has more than 12 hex digits: {0}")]
    TooLong(String),

    #[error("MAC address contains non-hex characters: {0}")]
    NotHex(String),
}

/// 48-bit hardware address, stored as 12 uppercase hex digits
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MacAddress(String);

impl MacAddress {
    /// Raw form written to the unit (`DEADBEEF1234`)
    pub fn raw(&self) -> &str {
        &self.0
    }

    /// Colon-delimited form (`DE:AD:BE:EF:12:34`)
    pub fn colon_delimited(&self) -> String {
        self.0
            .as_bytes()
            .chunks(2)
            .map(|pair| String::from_utf8_lossy(pair).into_owned())
            .collect::<Vec<_>>()
            .join(":")
    }

    /// Next address in sequence, wrapping at 48 bits
    pub fn next(&self) -> Self {
        let value = u64::from_str_radix(&self.0, 16).unwrap_or(0);
        let next = value.wrapping_add(1) & 0xFFFF_FFFF_FFFF;
        Self(format!("{next:012X}"))
    }
}

impl FromStr for MacAddress {
    type Err = MacError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits: String = s
            .trim()
            .chars()
            .filter(|c| !matches!(c, ':' | '-'))
            .collect();

        if digits.is_empty() {
            return Err(MacError::Empty);
        }
        if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(MacError::NotHex(s.to_string()));
        }
        if digits.len() > 12 {
            return Err(MacError::TooLong(s.to_string()));
        }

        Ok(Self(format!("{:0>12}", digits.to_ascii_uppercase())))
    }
}

impl TryFrom<String> for MacAddress {
    type Error = MacError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MacAddress> for String {
    fn from(mac: MacAddress) -> Self {
        mac.colon_delimited()
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.colon_delimited())
    }
}

/// IPv4 settings the unit is told to use
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkIdentity {
    pub ip: String,
    pub mask: String,
    pub gateway: String,
}

impl NetworkIdentity {
    pub fn new(ip: impl Into<String>, mask: impl Into<String>, gateway: impl Into<String>) -> Self {
        Self {
            ip: ip.into(),
            mask: mask.into(),
            gateway: gateway.into(),
        }
    }

    /// Check that all three fields are dotted-quad IPv4 addresses
    pub fn validate(&self) -> Result<(), String> {
        for (name, value) in [
            ("ip", &self.ip),
            ("mask", &self.mask),
            ("gateway", &self.gateway),
        ] {
            if value.parse::<Ipv4Addr>().is_err() {
                return Err(format!("invalid {name} address '{value}'"));
            }
        }
        Ok(())
    }
}

impl fmt::Display for NetworkIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} mask {} gw {}", self.ip, self.mask, self.gateway)
    }
}

/// Identity the unit receives in one run
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunPlan {
    pub board_sn: String,
    pub mac: MacAddress,
    /// Deployed identity committed when the unit passes
    pub target: NetworkIdentity,
}

/// Operator and board metadata printed on the certificate
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardInfo {
    pub operator: String,
    pub date: DateTime<Utc>,
    #[serde(rename = "testBoardSN")]
    pub test_board_sn: String,
    #[serde(rename = "testBoardPN")]
    pub test_board_pn: String,
    pub test_sw_version: String,
    #[serde(rename = "boardSN")]
    pub board_sn: String,
    #[serde(rename = "boardPN")]
    pub board_pn: String,
    #[serde(rename = "manufSN")]
    pub manuf_sn: String,
}

impl BoardInfo {
    pub fn new(operator: impl Into<String>, board_sn: impl Into<String>) -> Self {
        Self {
            operator: operator.into(),
            date: Utc::now(),
            test_board_sn: String::new(),
            test_board_pn: String::new(),
            test_sw_version: env!("CARGO_PKG_VERSION").to_string(),
            board_sn: board_sn.into(),
            board_pn: String::new(),
            manuf_sn: String::new(),
        }
    }

    pub fn with_board_pn(mut self, pn: impl Into<String>) -> Self {
        self.board_pn = pn.into();
        self
    }

    pub fn with_manuf_sn(mut self, sn: impl Into<String>) -> Self {
        self.manuf_sn = sn.into();
        self
    }

    pub fn with_test_board(mut self, sn: impl Into<String>, pn: impl Into<String>) -> Self {
        self.test_board_sn = sn.into();
        self.test_board_pn = pn.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mac_parse_forms() {
        let colon: MacAddress = "de:ad:be:ef:12:34".parse().unwrap();
        let raw: MacAddress = "DEADBEEF1234".parse().unwrap();
        assert_eq!(colon, raw);
        assert_eq!(raw.raw(), "DEADBEEF1234");
        assert_eq!(raw.colon_delimited(), "DE:AD:BE:EF:12:34");
    }

    #[test]
    fn test_mac_short_is_padded() {
        let mac: MacAddress = "20000000001".parse().unwrap();
        assert_eq!(mac.raw(), "020000000001");
    }

    #[test]
    fn test_mac_rejects_garbage() {
        assert_eq!("".parse::<MacAddress>(), Err(MacError::Empty));
        assert!(matches!(
            "XY:00:00:00:00:00".parse::<MacAddress>(),
            Err(MacError::NotHex(_))
        ));
        assert!(matches!(
            "0011223344556677".parse::<MacAddress>(),
            Err(MacError::TooLong(_))
        ));
    }

    #[test]
    fn test_mac_next() {
        let mac: MacAddress = "0000000000FF".parse().unwrap();
        assert_eq!(mac.next().raw(), "000000000100");
        let last: MacAddress = "FFFFFFFFFFFF".parse().unwrap();
        assert_eq!(last.next().raw(), "000000000000");
    }

    #[test]
    fn test_network_identity_validate() {
        let ok = NetworkIdentity::new("10.0.18.201", "255.255.255.0", "10.0.18.1");
        assert!(ok.validate().is_ok());
        let bad = NetworkIdentity::new("10.0.18", "255.255.255.0", "10.0.18.1");
        assert!(bad.validate().unwrap_err().contains("ip"));
    }

    #[test]
    fn test_board_info_builder() {
        let info = BoardInfo::new("operator", "CN00001")
            .with_board_pn("UC:1.2")
            .with_test_board("TB001", "TB:1.0");
        assert_eq!(info.board_sn, "CN00001");
        assert_eq!(info.board_pn, "UC:1.2");
        assert_eq!(info.test_board_pn, "TB:1.0");
        assert!(!info.test_sw_version.is_empty());
    }
}
