//! Coin control errors.
//!
//! Estimation itself never fails. Errors only surface at the edges:
//! - Reading or writing the config, lock file and coin snapshots (IO)
//! - Decoding snapshots (JSON)
//! - Malformed user input such as outpoints
//!
use std::error::Error;

/// Errors raised while loading or persisting coin control state.
#[derive(Debug)]
pub enum CoinControlError {
    /// Standard IO errors while touching the config, lock file or snapshot.
    IO(std::io::Error),
    /// JSON serialization or deserialization error.
    Json(serde_json::Error),
    /// An outpoint string did not parse as `txid:vout`.
    InvalidOutPoint(String),
    /// General error with a descriptive message.
    General(String),
}

impl std::fmt::Display for CoinControlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CoinControlError::IO(e) => write!(f, "I/O error: {}", e),
            CoinControlError::Json(e) => write!(f, "JSON error: {}", e),
            CoinControlError::InvalidOutPoint(s) => write!(f, "Invalid outpoint: {}", s),
            CoinControlError::General(msg) => write!(f, "{}", msg),
        }
    }
}

impl Error for CoinControlError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            CoinControlError::IO(e) => Some(e),
            CoinControlError::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CoinControlError {
    fn from(value: std::io::Error) -> Self {
        Self::IO(value)
    }
}

impl From<serde_json::Error> for CoinControlError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}
