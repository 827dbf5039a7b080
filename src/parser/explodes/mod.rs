//! Link decoders, one per supported scheme.

mod common;
mod vmess;

use thiserror::Error;

pub use common::explode;
pub use vmess::{explode_vmess, implode_vmess, node_to_record, salvage_json};

/// Why a single subscription entry did not become a record.
///
/// None of these stop a run; the subscription parser counts and logs them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The entry does not start with a scheme we decode. Skipped silently.
    #[error("unsupported link scheme")]
    UnsupportedScheme,

    #[error("invalid base64 payload: {raw}")]
    InvalidBase64 { raw: String },

    #[error("failed to decode JSON: {text}")]
    InvalidJson { text: String },

    #[error("invalid port '{port}' in node {name}")]
    InvalidPort { name: String, port: String },

    #[error("invalid host '{host}' in node {name}")]
    InvalidHost { name: String, host: String },
}

impl DecodeError {
    pub fn is_invalid_host(&self) -> bool {
        matches!(self, DecodeError::InvalidHost { .. })
    }
}
