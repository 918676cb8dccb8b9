use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// EIP-1193 "user rejected request".
pub const USER_REJECTED_CODE: i64 = 4001;
/// Wallet already has an account-access prompt open.
pub const REQUEST_PENDING_CODE: i64 = -32002;
pub const METHOD_NOT_FOUND_CODE: i64 = -32601;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid account address '{0}'")]
pub struct InvalidAddress(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid ether amount '{0}'")]
pub struct InvalidAmount(pub String);

/// Failure reported by a wallet provider backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("provider error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("provider transport failure: {0}")]
    Transport(String),
    #[error("malformed provider response: {0}")]
    Malformed(String),
}

impl ProviderError {
    pub fn rpc(code: i64, message: impl Into<String>) -> Self {
        Self::Rpc {
            code,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectStep {
    RequestAccounts,
    FetchBalance,
    FetchNetwork,
}

impl fmt::Display for ConnectStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::RequestAccounts => "requesting accounts",
            Self::FetchBalance => "fetching balance",
            Self::FetchNetwork => "fetching network",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    NoProvider,
    UserRejected,
    RequestPending,
    Timeout,
    Transport,
    NoAccounts,
    InvalidAccount,
    Unknown,
}

/// User-facing classification of a failed wallet operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WalletError {
    #[error("no wallet provider detected; install a browser wallet extension")]
    NoProvider,
    #[error("the connection request was rejected in the wallet")]
    UserRejected,
    #[error("a connection request is already pending; check the wallet prompt")]
    RequestPending,
    #[error("timed out while {step}; make sure the wallet is unlocked")]
    Timeout { step: ConnectStep },
    #[error("wallet communication failed ({0}); reload and try again")]
    Transport(String),
    #[error("the wallet returned no accounts; unlock it and try again")]
    NoAccounts,
    #[error("the wallet returned an invalid account: {0}")]
    InvalidAccount(#[from] InvalidAddress),
    #[error("{0}")]
    Unknown(String),
}

impl WalletError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NoProvider => ErrorCode::NoProvider,
            Self::UserRejected => ErrorCode::UserRejected,
            Self::RequestPending => ErrorCode::RequestPending,
            Self::Timeout { .. } => ErrorCode::Timeout,
            Self::Transport(_) => ErrorCode::Transport,
            Self::NoAccounts => ErrorCode::NoAccounts,
            Self::InvalidAccount(_) => ErrorCode::InvalidAccount,
            Self::Unknown(_) => ErrorCode::Unknown,
        }
    }
}

fn is_message_channel_failure(message: &str) -> bool {
    message.to_ascii_lowercase().contains("message channel")
}

impl From<ProviderError> for WalletError {
    fn from(value: ProviderError) -> Self {
        match value {
            ProviderError::Rpc { code, .. } if code == USER_REJECTED_CODE => Self::UserRejected,
            ProviderError::Rpc { code, .. } if code == REQUEST_PENDING_CODE => {
                Self::RequestPending
            }
            ProviderError::Rpc { message, .. } if is_message_channel_failure(&message) => {
                Self::Transport(message)
            }
            ProviderError::Transport(message) => Self::Transport(message),
            ProviderError::Rpc { message, .. } | ProviderError::Malformed(message) => {
                if message.trim().is_empty() {
                    Self::Unknown("connection failed; unlock the wallet and try again".into())
                } else {
                    Self::Unknown(message)
                }
            }
        }
    }
}

/// Serializable form of a [`WalletError`] for presentation output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorReport {
    pub code: ErrorCode,
    pub message: String,
}

impl From<&WalletError> for ErrorReport {
    fn from(value: &WalletError) -> Self {
        Self {
            code: value.code(),
            message: value.to_string(),
        }
    }
}
