//! Object prefix encoding and random credentials.

use crate::error::{Result, TreeError};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::distributions::Alphanumeric;
use rand::Rng;

/// Standard base64 of the UTF-8 path, as the object endpoint expects in `prefix`.
pub fn encode_prefix(path: &str) -> String {
    STANDARD.encode(path.as_bytes())
}

pub fn decode_prefix(encoded: &str) -> Result<String> {
    let bytes = STANDARD
        .decode(encoded)
        .map_err(|e| TreeError::Decode(format!("prefix '{}': {}", encoded, e)))?;
    String::from_utf8(bytes).map_err(|e| TreeError::Decode(format!("prefix '{}': {}", encoded, e)))
}

/// Encoded prefix, escaped for use as a query value.
pub(crate) fn prefix_query(path: &str) -> String {
    urlencoding::encode(&encode_prefix(path)).into_owned()
}

/// `len` characters drawn from `[A-Za-z0-9]`.
pub fn random_string(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}
