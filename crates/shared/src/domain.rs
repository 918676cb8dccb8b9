use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{InvalidAddress, InvalidAmount};

macro_rules! numeric_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub u64);
    };
}

numeric_newtype!(ChainId);
numeric_newtype!(BlockNumber);

pub const WEI_PER_ETHER: u128 = 1_000_000_000_000_000_000;
const ETHER_DECIMALS: usize = 18;
const ADDRESS_HEX_LEN: usize = 40;

/// Lowercase `0x`-prefixed 20-byte account identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    pub fn parse(raw: &str) -> Result<Self, InvalidAddress> {
        let trimmed = raw.trim();
        let hex = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .ok_or_else(|| InvalidAddress(raw.to_string()))?;
        if hex.len() != ADDRESS_HEX_LEN || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(InvalidAddress(raw.to_string()));
        }
        Ok(Self(format!("0x{}", hex.to_ascii_lowercase())))
    }

    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
        Self(format!("0x{hex}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `0x1234...abcd` form used in compact listings.
    pub fn short(&self) -> String {
        format!("{}...{}", &self.0[..6], &self.0[self.0.len() - 4..])
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Address {
    type Err = InvalidAddress;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Address {
    type Error = InvalidAddress;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Address> for String {
    fn from(value: Address) -> Self {
        value.0
    }
}

/// Formats a wei amount as an ether decimal string, always keeping at least
/// one fractional digit (`2.5`, `1.0`, `0.000000000000000001`).
pub fn format_ether(wei: u128) -> String {
    let whole = wei / WEI_PER_ETHER;
    let fraction = wei % WEI_PER_ETHER;
    let digits = format!("{fraction:0width$}", width = ETHER_DECIMALS);
    let digits = digits.trim_end_matches('0');
    if digits.is_empty() {
        format!("{whole}.0")
    } else {
        format!("{whole}.{digits}")
    }
}

pub fn parse_ether(raw: &str) -> Result<u128, InvalidAmount> {
    let invalid = || InvalidAmount(raw.to_string());
    let trimmed = raw.trim();
    let (whole, fraction) = match trimmed.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (trimmed, ""),
    };
    if whole.is_empty() && fraction.is_empty() {
        return Err(invalid());
    }
    if fraction.len() > ETHER_DECIMALS
        || !whole.chars().all(|c| c.is_ascii_digit())
        || !fraction.chars().all(|c| c.is_ascii_digit())
    {
        return Err(invalid());
    }

    let whole: u128 = if whole.is_empty() {
        0
    } else {
        whole.parse().map_err(|_| invalid())?
    };
    let fraction: u128 = if fraction.is_empty() {
        0
    } else {
        let padded = format!("{fraction:0<width$}", width = ETHER_DECIMALS);
        padded.parse().map_err(|_| invalid())?
    };

    whole
        .checked_mul(WEI_PER_ETHER)
        .and_then(|wei| wei.checked_add(fraction))
        .ok_or_else(invalid)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderKind {
    #[serde(rename = "metamask")]
    MetaMask,
    #[serde(rename = "walletconnect")]
    WalletConnect,
}

impl ProviderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MetaMask => "metamask",
            Self::WalletConnect => "walletconnect",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "metamask" => Ok(Self::MetaMask),
            "walletconnect" => Ok(Self::WalletConnect),
            other => Err(format!(
                "unknown provider kind '{other}', expected metamask or walletconnect"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    pub name: Option<String>,
    pub chain_id: ChainId,
}

impl Network {
    /// Builds a network for `chain_id`, filling in the well-known name if any.
    pub fn from_chain_id(chain_id: ChainId) -> Self {
        Self {
            name: known_chain_name(chain_id).map(str::to_string),
            chain_id,
        }
    }

    pub fn label(&self) -> String {
        match self.name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => format!("Chain {}", self.chain_id.0),
        }
    }
}

pub fn known_chain_name(chain_id: ChainId) -> Option<&'static str> {
    match chain_id.0 {
        1 => Some("mainnet"),
        10 => Some("optimism"),
        137 => Some("matic"),
        8453 => Some("base"),
        17000 => Some("holesky"),
        42161 => Some("arbitrum"),
        11155111 => Some("sepolia"),
        _ => None,
    }
}

/// Snapshot of the wallet session as seen by the presentation layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletSession {
    pub address: Option<Address>,
    pub balance: Option<String>,
    pub network: Option<String>,
    pub provider_kind: Option<ProviderKind>,
    pub connection_state: ConnectionState,
    pub last_error: Option<String>,
}

impl WalletSession {
    pub fn is_connected(&self) -> bool {
        self.connection_state == ConnectionState::Connected
    }

    pub fn display_name(&self) -> String {
        match (&self.connection_state, &self.address) {
            (ConnectionState::Connected, Some(address)) => address.short(),
            (ConnectionState::Connecting, _) => "connecting...".to_string(),
            _ => "guest".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub hash: String,
    pub from: Address,
    pub to: Address,
    pub value: String,
    pub timestamp: DateTime<Utc>,
    pub block_number: BlockNumber,
    pub gas_used: u64,
    pub gas_price_gwei: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartPoint {
    pub date: String,
    pub value: f64,
    pub count: u32,
}

/// Transaction count for one weekday/hour slot. `weekday` is 0 for Monday
/// through 6 for Sunday; `hour` is the UTC hour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeatmapCell {
    pub weekday: u8,
    pub hour: u8,
    pub count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskFactors {
    pub transaction_count: usize,
    pub suspicious_activity: bool,
    pub age_days: u32,
    pub balance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskScore {
    pub score: u8,
    pub level: RiskLevel,
    pub factors: RiskFactors,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_parse_lowercases_and_validates() {
        let address = Address::parse("0xABCDEF0123456789abcdef0123456789ABCDEF01").expect("address");
        assert_eq!(address.as_str(), "0xabcdef0123456789abcdef0123456789abcdef01");
        assert_eq!(address.short(), "0xabcd...ef01");

        assert!(Address::parse("abcdef0123456789abcdef0123456789abcdef01").is_err());
        assert!(Address::parse("0x1234").is_err());
        assert!(Address::parse("0xzzcdef0123456789abcdef0123456789abcdef01").is_err());
    }

    #[test]
    fn address_round_trips_through_json_as_string() {
        let address = Address::from_bytes([0xab; 20]);
        let json = serde_json::to_string(&address).expect("serialize");
        assert_eq!(json, format!("\"0x{}\"", "ab".repeat(20)));
        let bad: Result<Address, _> = serde_json::from_str("\"not-an-address\"");
        assert!(bad.is_err());
    }

    #[test]
    fn formats_ether_like_ethers() {
        assert_eq!(format_ether(0), "0.0");
        assert_eq!(format_ether(WEI_PER_ETHER), "1.0");
        assert_eq!(format_ether(2_500_000_000_000_000_000), "2.5");
        assert_eq!(format_ether(1), "0.000000000000000001");
        assert_eq!(format_ether(1_523_400_000_000_000_000), "1.5234");
    }

    #[test]
    fn parses_ether_strings() {
        assert_eq!(parse_ether("2.5").expect("2.5"), 2_500_000_000_000_000_000);
        assert_eq!(parse_ether("1").expect("1"), WEI_PER_ETHER);
        assert_eq!(parse_ether(".5").expect(".5"), WEI_PER_ETHER / 2);
        assert!(parse_ether("").is_err());
        assert!(parse_ether("1.2.3").is_err());
        assert!(parse_ether("0.0000000000000000001").is_err());
        assert!(parse_ether("-1").is_err());
    }

    #[test]
    fn network_label_falls_back_to_chain_id() {
        assert_eq!(Network::from_chain_id(ChainId(1)).label(), "mainnet");
        assert_eq!(Network::from_chain_id(ChainId(31337)).label(), "Chain 31337");
        let blank = Network {
            name: Some("  ".into()),
            chain_id: ChainId(5),
        };
        assert_eq!(blank.label(), "Chain 5");
    }

    #[test]
    fn provider_kind_parses_case_insensitively() {
        assert_eq!("MetaMask".parse::<ProviderKind>(), Ok(ProviderKind::MetaMask));
        assert_eq!(
            "walletconnect".parse::<ProviderKind>(),
            Ok(ProviderKind::WalletConnect)
        );
        assert!("ledger".parse::<ProviderKind>().is_err());
        assert_eq!(
            serde_json::to_string(&ProviderKind::MetaMask).expect("json"),
            "\"metamask\""
        );
    }

    #[test]
    fn session_display_name_tracks_state() {
        let mut session = WalletSession::default();
        assert_eq!(session.display_name(), "guest");
        session.connection_state = ConnectionState::Connecting;
        assert_eq!(session.display_name(), "connecting...");
        session.connection_state = ConnectionState::Connected;
        session.address = Some(Address::from_bytes([0x12; 20]));
        assert_eq!(session.display_name(), "0x1212...1212");
    }
}
