/// Typed decoding of the enrichment payloads attached to transactions
///
/// `logs` and `operations` arrive as opaque JSON produced by the external
/// enrichment job. Each entry decodes independently into a typed value or a
/// `ParseError`; callers skip failed entries and keep going.

pub mod events;
pub mod calldata;

use alloy_primitives::U256;
use serde_json::Value;

pub use calldata::{decode_defi_call, is_decodable, DecodedCall};
pub use events::{
    parse_log, parse_logs, parse_operation, parse_operations, BridgeDirection, InternalTransfer,
    ParsedEvent, RawLog, SwapLayout,
};

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("Entry is not a JSON object")]
    NotAnObject,

    #[error("Missing field `{0}`")]
    MissingField(&'static str),

    #[error("Invalid hex in `{field}`: {value}")]
    InvalidHex { field: &'static str, value: String },

    #[error("Expected {expected} topics, found {found}")]
    TopicCount { expected: usize, found: usize },

    #[error("Expected at least {expected} data bytes, found {found}")]
    ShortData { expected: usize, found: usize },

    #[error("Unknown event topic {0}")]
    UnknownEvent(String),

    #[error("Unsupported function `{0}`")]
    UnsupportedFunction(String),
}

/// Enrichment columns are sometimes double-encoded as a JSON string
pub(crate) fn as_entries(value: &Value) -> Vec<Value> {
    match value {
        Value::Array(entries) => entries.clone(),
        Value::String(raw) => match serde_json::from_str::<Value>(raw) {
            Ok(Value::Array(entries)) => entries,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

pub(crate) fn decode_hex(field: &'static str, raw: &str) -> Result<Vec<u8>, ParseError> {
    let digits = raw.trim().trim_start_matches("0x").trim_start_matches("0X");
    hex::decode(digits).map_err(|_| ParseError::InvalidHex {
        field,
        value: raw.to_string(),
    })
}

/// 32-byte ABI word at `index`
pub(crate) fn word(data: &[u8], index: usize) -> Result<U256, ParseError> {
    let start = index * 32;
    let end = start + 32;
    if data.len() < end {
        return Err(ParseError::ShortData {
            expected: end,
            found: data.len(),
        });
    }
    Ok(U256::from_be_slice(&data[start..end]))
}

/// Right-aligned address inside a 32-byte word, lowercase `0x` hex
pub(crate) fn word_address(bytes: &[u8]) -> String {
    let tail = if bytes.len() >= 20 { &bytes[bytes.len() - 20..] } else { bytes };
    format!("0x{}", hex::encode(tail))
}

pub(crate) fn address_at(data: &[u8], index: usize) -> Result<String, ParseError> {
    let start = index * 32;
    let end = start + 32;
    if data.len() < end {
        return Err(ParseError::ShortData {
            expected: end,
            found: data.len(),
        });
    }
    Ok(word_address(&data[start..end]))
}
