//! Shared-secret API key check.

use {
    axum::http::HeaderMap,
    secrecy::{ExposeSecret, Secret},
    serde::Deserialize,
    sha2::{Digest, Sha256},
};

pub const API_KEY_HEADER: &str = "x-api-key";

/// The `api_key` query parameter, extracted separately from the fetch params.
#[derive(Debug, Default, Deserialize)]
pub struct ApiKeyParam {
    pub api_key: Option<String>,
}

/// Accept when no key is configured, otherwise require a match in the
/// `x-api-key` header or the `api_key` query parameter. The header wins when
/// both are present.
pub fn check_api_key(expected: Option<&Secret<String>>, headers: &HeaderMap, query: Option<&str>) -> bool {
    let Some(expected) = expected else {
        return true;
    };

    let provided = headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .or(query);

    provided.is_some_and(|key| {
        let expected_hash = Sha256::digest(expected.expose_secret().as_bytes());
        let provided_hash = Sha256::digest(key.as_bytes());
        expected_hash == provided_hash
    })
}
