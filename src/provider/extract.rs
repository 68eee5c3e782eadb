//! # Data Extraction
//!
//! Conversions between structured secret payloads and flat key/value data,
//! shared by every backend:
//!
//! - version tokens are integer ordinals, parsed before any network call
//! - JSON objects flatten to their top-level keys; string leaves are returned
//!   unquoted, every other leaf as compact JSON text
//! - a push without a source key serializes the whole source map as JSON
//!   (keys sorted, values base64, as Kubernetes `Secret.data` is encoded)

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::crd::{PushSpec, SecretData};
use crate::error::{Result, SyncError};

/// Parse an optional version token as an integer ordinal
///
/// `None` and the empty string both mean "latest".
///
/// # Errors
/// `InvalidVersion` when the token is not a non-negative integer.
pub fn parse_version(version: Option<&str>) -> Result<Option<u64>> {
    match version {
        None | Some("") => Ok(None),
        Some(token) => token
            .parse::<u64>()
            .map(Some)
            .map_err(|e| SyncError::InvalidVersion {
                version: token.to_string(),
                message: e.to_string(),
            }),
    }
}

fn leaf_bytes(value: &Value) -> Vec<u8> {
    match value {
        Value::String(s) => s.as_bytes().to_vec(),
        other => other.to_string().into_bytes(),
    }
}

fn parse_object(key: &str, payload: &[u8]) -> Result<Map<String, Value>> {
    serde_json::from_slice::<Map<String, Value>>(payload).map_err(|e| {
        SyncError::MalformedPayload {
            key: key.to_string(),
            message: e.to_string(),
        }
    })
}

/// Flatten a JSON object payload into top-level key/value pairs
///
/// # Errors
/// `MalformedPayload` when `payload` is not a JSON object.
pub fn flatten_json_object(key: &str, payload: &[u8]) -> Result<SecretData> {
    Ok(parse_object(key, payload)?
        .iter()
        .map(|(k, v)| (k.clone(), leaf_bytes(v)))
        .collect())
}

/// One top-level field of a JSON object payload
///
/// # Errors
/// `MalformedPayload` when `payload` is not a JSON object, `SecretNotFound`
/// when the field is absent.
pub fn select_property(key: &str, payload: &[u8], property: &str) -> Result<Vec<u8>> {
    parse_object(key, payload)?
        .get(property)
        .map(leaf_bytes)
        .ok_or_else(|| SyncError::SecretNotFound {
            key: format!("{key}#{property}"),
        })
}

/// Value to push for `spec`
///
/// # Errors
/// `SourceKeyNotFound` when `spec.source_key` is not in `source`.
pub fn push_value(spec: &PushSpec, source: &SecretData) -> Result<Vec<u8>> {
    match spec.source_key.as_deref().filter(|k| !k.is_empty()) {
        Some(source_key) => source
            .get(source_key)
            .cloned()
            .ok_or_else(|| SyncError::SourceKeyNotFound {
                key: source_key.to_string(),
            }),
        None => {
            let encoded: BTreeMap<&str, String> = source
                .iter()
                .map(|(k, v)| (k.as_str(), STANDARD.encode(v)))
                .collect();
            serde_json::to_vec(&encoded).map_err(|e| SyncError::Backend(e.to_string()))
        }
    }
}

/// Write `value` under `property` of the JSON object `existing`
///
/// A missing `existing` starts from an empty object.
///
/// # Errors
/// `MalformedPayload` when `existing` is not a JSON object;
/// `UnsupportedOperation` when `value` is not UTF-8.
pub fn merge_property(
    key: &str,
    existing: Option<&[u8]>,
    property: &str,
    value: &[u8],
) -> Result<Vec<u8>> {
    let mut object = match existing {
        Some(payload) => parse_object(key, payload)?,
        None => Map::new(),
    };
    let text = std::str::from_utf8(value).map_err(|e| {
        SyncError::UnsupportedOperation(format!(
            "property {property} of {key} needs a UTF-8 value: {e}"
        ))
    })?;
    object.insert(property.to_string(), Value::String(text.to_string()));
    serde_json::to_vec(&object).map_err(|e| SyncError::Backend(e.to_string()))
}
