use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{domain::ChainId, error::ProviderError};

/// Notifications a wallet provider pushes to its subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ProviderEvent {
    AccountsChanged(Vec<String>),
    /// Chain id as the provider reports it, usually a `0x` hex quantity.
    ChainChanged(String),
}

/// Parses a chain id given either as a `0x` hex quantity or a decimal string.
pub fn parse_chain_id(raw: &str) -> Option<ChainId> {
    let raw = raw.trim();
    let parsed = match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => raw.parse().ok(),
    };
    parsed.map(ChainId)
}

pub fn parse_quantity(raw: &str) -> Result<u128, ProviderError> {
    let hex = raw
        .trim()
        .strip_prefix("0x")
        .ok_or_else(|| ProviderError::Malformed(format!("expected hex quantity, got '{raw}'")))?;
    if hex.is_empty() {
        return Ok(0);
    }
    u128::from_str_radix(hex, 16)
        .map_err(|err| ProviderError::Malformed(format!("invalid hex quantity '{raw}': {err}")))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    #[serde(default)]
    pub params: Vec<Value>,
}

impl RpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            id,
            method: method.into(),
            params,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorObject>,
}

impl RpcResponse {
    pub fn success(id: u64, result: Value) -> Self {
        Self {
            jsonrpc: Some("2.0".into()),
            id: Some(id),
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: u64, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: Some("2.0".into()),
            id: Some(id),
            result: None,
            error: Some(RpcErrorObject {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }

    pub fn into_result(self) -> Result<Value, ProviderError> {
        if let Some(error) = self.error {
            return Err(ProviderError::Rpc {
                code: error.code,
                message: error.message,
            });
        }
        self.result
            .ok_or_else(|| ProviderError::Malformed("response carried neither result nor error".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hex_and_decimal_chain_ids() {
        assert_eq!(parse_chain_id("0x1"), Some(ChainId(1)));
        assert_eq!(parse_chain_id("0xaa36a7"), Some(ChainId(11155111)));
        assert_eq!(parse_chain_id("137"), Some(ChainId(137)));
        assert_eq!(parse_chain_id("0xnope"), None);
    }

    #[test]
    fn parses_hex_quantities() {
        assert_eq!(parse_quantity("0x22b1c8c1227a0000").expect("qty"), 2_500_000_000_000_000_000);
        assert_eq!(parse_quantity("0x").expect("empty"), 0);
        assert!(matches!(parse_quantity("12"), Err(ProviderError::Malformed(_))));
    }

    #[test]
    fn rpc_error_object_becomes_provider_error() {
        let response: RpcResponse = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":1,"error":{"code":4001,"message":"User rejected the request."}}"#,
        )
        .expect("decode");
        assert_eq!(
            response.into_result(),
            Err(ProviderError::rpc(4001, "User rejected the request."))
        );
    }

    #[test]
    fn provider_event_uses_tagged_representation() {
        let event = ProviderEvent::ChainChanged("0x89".into());
        let json = serde_json::to_value(&event).expect("encode");
        assert_eq!(json["type"], "chain_changed");
        assert_eq!(json["payload"], "0x89");
    }
}
