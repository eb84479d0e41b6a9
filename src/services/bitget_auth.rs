//! Bitget request signing.
//!
//! Signature = base64(HMAC-SHA256(secret, timestamp + METHOD + path + ?query + body)).

use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::services::credentials::Credentials;

type HmacSha256 = Hmac<Sha256>;

pub const HEADER_ACCESS_KEY: &str = "ACCESS-KEY";
pub const HEADER_ACCESS_SIGN: &str = "ACCESS-SIGN";
pub const HEADER_ACCESS_TIMESTAMP: &str = "ACCESS-TIMESTAMP";
pub const HEADER_ACCESS_PASSPHRASE: &str = "ACCESS-PASSPHRASE";

/// Build the canonical message that gets signed.
pub fn canonical_message(
    timestamp: &str,
    method: &str,
    request_path: &str,
    query_string: &str,
    body: &str,
) -> String {
    let query = if query_string.is_empty() || query_string.starts_with('?') {
        query_string.to_string()
    } else {
        format!("?{}", query_string)
    };

    format!(
        "{}{}{}{}{}",
        timestamp,
        method.to_uppercase(),
        request_path,
        query,
        body
    )
}

/// Create a Bitget HMAC-SHA256 + Base64 signature
pub fn sign_request(
    secret_key: &str,
    timestamp: &str,
    method: &str,
    request_path: &str,
    query_string: &str,
    body: &str,
) -> String {
    let message = canonical_message(timestamp, method, request_path, query_string, body);

    let mut mac = HmacSha256::new_from_slice(secret_key.as_bytes())
        .expect("HMAC-SHA256 accepts keys of any length");
    mac.update(message.as_bytes());
    STANDARD.encode(mac.finalize().into_bytes())
}

/// Authentication headers for one request
pub fn signed_headers(
    credentials: &Credentials,
    timestamp: &str,
    method: &str,
    request_path: &str,
    query_string: &str,
    body: &str,
) -> Vec<(&'static str, String)> {
    let signature = sign_request(
        &credentials.secret_key,
        timestamp,
        method,
        request_path,
        query_string,
        body,
    );

    vec![
        (HEADER_ACCESS_KEY, credentials.api_key.clone()),
        (HEADER_ACCESS_SIGN, signature),
        (HEADER_ACCESS_TIMESTAMP, timestamp.to_string()),
        (HEADER_ACCESS_PASSPHRASE, credentials.passphrase.clone()),
        ("Content-Type", "application/json".to_string()),
    ]
}
