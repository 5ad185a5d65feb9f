//! Exchange request signing
//!
//! The exchange authenticates requests with an HMAC-SHA256 signature over
//! `method + timestamp + path + body`. The body serialization used for the
//! signature must be byte-identical to the one transmitted, so both go
//! through [`canonical_json`]: keys sorted, no whitespace.
//!
//! Signatures embed the current Unix timestamp and the exchange rejects
//! stale ones, so headers are computed immediately before each request and
//! never cached.

use chrono::Utc;
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;

use crate::config::Credentials;

type HmacSha256 = Hmac<Sha256>;

const USER_AGENT: &str = concat!("trendbot/", env!("CARGO_PKG_VERSION"));

/// Header set attached to every authenticated request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHeaders {
    pub api_key: String,
    pub timestamp: String,
    pub signature: String,
    pub content_type: &'static str,
    pub accept: &'static str,
    pub user_agent: &'static str,
}

impl SignedHeaders {
    /// Apply the header set to a reqwest builder
    pub fn apply(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .header("api-key", &self.api_key)
            .header("timestamp", &self.timestamp)
            .header("signature", &self.signature)
            .header("Content-Type", self.content_type)
            .header("Accept", self.accept)
            .header("User-Agent", self.user_agent)
    }
}

/// Serialize a JSON value with sorted keys and no whitespace
///
/// Deterministic regardless of the order keys were inserted in, which is what
/// makes the signed payload reproducible. The explicit sort is deliberate:
/// `Value::to_string` only emits sorted keys while serde_json's
/// `preserve_order` feature stays off, and any crate in the dependency graph
/// can switch that on. Signature bytes must not depend on a feature flag.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                write_canonical(&map[*key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        // Scalars already serialize compactly
        other => out.push_str(&other.to_string()),
    }
}

/// Sign a request at an explicit timestamp
///
/// Pure function of its inputs; [`signed_headers`] is the clock-reading
/// wrapper used in production.
pub fn signed_headers_at(
    credentials: &Credentials,
    method: &str,
    path: &str,
    body: Option<&Value>,
    unix_timestamp: i64,
) -> SignedHeaders {
    let payload = body.map(canonical_json).unwrap_or_default();
    let timestamp = unix_timestamp.to_string();
    let sign_str = format!("{}{}{}{}", method, timestamp, path, payload);

    let mut mac = HmacSha256::new_from_slice(credentials.api_secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(sign_str.as_bytes());
    let signature = hex::encode(mac.finalize().into_bytes());

    SignedHeaders {
        api_key: credentials.api_key.clone(),
        timestamp,
        signature,
        content_type: "application/json",
        accept: "application/json",
        user_agent: USER_AGENT,
    }
}

/// Sign a request as of now
pub fn signed_headers(
    credentials: &Credentials,
    method: &str,
    path: &str,
    body: Option<&Value>,
) -> SignedHeaders {
    signed_headers_at(credentials, method, path, body, Utc::now().timestamp())
}
