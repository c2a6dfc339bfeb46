//! CLS request signing.
//!
//! Derives the `Authorization` header value for a request from a shared secret,
//! the request shape (method, path, query parameters, headers) and the current
//! time. The algorithm is HMAC-SHA1 over a canonical form of the request, keyed
//! by a signing key that is itself derived from the secret and a time window.

use hmac::{Hmac, Mac};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::header::{AUTHORIZATION, HOST, HeaderMap, HeaderName, HeaderValue, InvalidHeaderValue};
use sha1::{Digest, Sha1};
use std::collections::HashMap;
use std::fmt;

type HmacSha1 = Hmac<Sha1>;

pub const SIGN_ALGORITHM: &str = "sha1";

/// Validity of a derived signing key, in seconds.
pub const KEY_TIME_WINDOW_SECS: i64 = 30 * 3600;

pub const TOKEN_HEADER: HeaderName = HeaderName::from_static("x-cls-token");

// Unreserved characters of form query escaping. Space is handled separately.
const QUERY_ESCAPE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Credentials and addressing used to sign one request.
///
/// `host` replaces the client's default host in the request URL and
/// `header_host` replaces the signed `Host` header, so a single client can
/// address several virtual hosts.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct AuthParam {
    pub secret_id: String,
    pub secret_key: String,
    pub token: String,
    pub host: Option<String>,
    pub header_host: Option<String>,
}

impl AuthParam {
    pub fn new(
        secret_id: impl Into<String>,
        secret_key: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            secret_id: secret_id.into(),
            secret_key: secret_key.into(),
            token: token.into(),
            host: None,
            header_host: None,
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into()).filter(|h: &String| !h.is_empty());
        self
    }

    pub fn with_header_host(mut self, header_host: impl Into<String>) -> Self {
        self.header_host = Some(header_host.into()).filter(|h: &String| !h.is_empty());
        self
    }
}

impl fmt::Debug for AuthParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthParam")
            .field("secret_id", &self.secret_id)
            .field("secret_key", &"[REDACTED]")
            .field("token", &"[REDACTED]")
            .field("host", &self.host)
            .field("header_host", &self.header_host)
            .finish()
    }
}

/// Header values produced by signing a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHeaders {
    pub authorization: String,
    pub token: String,
    pub host: Option<String>,
}

impl SignedHeaders {
    /// Writes `Authorization`, `X-Cls-Token` and `Host` onto an outgoing request.
    pub fn apply(&self, headers: &mut HeaderMap) -> Result<(), InvalidHeaderValue> {
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&self.authorization)?);
        headers.insert(TOKEN_HEADER, HeaderValue::from_str(&self.token)?);
        if let Some(host) = &self.host {
            headers.insert(HOST, HeaderValue::from_str(host)?);
        }
        Ok(())
    }
}

/// Signs a request and returns every header the service expects.
///
/// `headers` must carry the virtual host under the `Host` key; it is echoed
/// back as the request host.
pub fn sign_request(
    auth: &AuthParam,
    method: &str,
    uri_path: &str,
    params: &HashMap<String, String>,
    headers: &HashMap<String, String>,
    now: i64,
) -> SignedHeaders {
    SignedHeaders {
        authorization: sign(
            &auth.secret_id,
            &auth.secret_key,
            method,
            uri_path,
            params,
            headers,
            now,
        ),
        token: auth.token.clone(),
        host: headers.get("Host").cloned(),
    }
}

/// Computes the `Authorization` header value.
pub fn sign(
    secret_id: &str,
    secret_key: &str,
    method: &str,
    uri_path: &str,
    params: &HashMap<String, String>,
    headers: &HashMap<String, String>,
    now: i64,
) -> String {
    let key_time = key_time(now);
    let sign_key = hmac_sha1_hex(secret_key.as_bytes(), key_time.as_bytes());

    let format_string = format_string(method, uri_path, params, headers);
    let string_to_sign = format!(
        "{SIGN_ALGORITHM}\n{key_time}\n{}\n",
        hex::encode(Sha1::digest(format_string.as_bytes()))
    );
    let signature = hmac_sha1_hex(sign_key.as_bytes(), string_to_sign.as_bytes());

    format!(
        "q-sign-algorithm={SIGN_ALGORITHM}&q-ak={secret_id}&q-sign-time={key_time}&q-key-time={key_time}&q-header-list={}&q-url-param-list={}&q-signature={signature}",
        key_list(headers),
        key_list(params),
    )
}

/// `"{start};{end}"` for a key window opening at `now`.
pub fn key_time(now: i64) -> String {
    format!("{};{}", now, now + KEY_TIME_WINDOW_SECS)
}

/// Canonical request form that gets hashed into the string to sign.
pub fn format_string(
    method: &str,
    uri_path: &str,
    params: &HashMap<String, String>,
    headers: &HashMap<String, String>,
) -> String {
    format!(
        "{}\n{}\n{}\n{}\n",
        method.to_lowercase(),
        uri_path,
        format_params(params),
        format_headers(headers)
    )
}

fn format_params(params: &HashMap<String, String>) -> String {
    sorted_keys(params)
        .into_iter()
        .map(|key| {
            format!(
                "{}={}",
                url_escape(key).to_lowercase(),
                url_escape(&params[key]).to_lowercase()
            )
        })
        .collect::<Vec<_>>()
        .join("&")
}

fn format_headers(headers: &HashMap<String, String>) -> String {
    sorted_keys(headers)
        .into_iter()
        .map(|key| format!("{}={}", key.to_lowercase(), url_escape(&headers[key])))
        .collect::<Vec<_>>()
        .join("&")
}

fn key_list(map: &HashMap<String, String>) -> String {
    sorted_keys(map)
        .into_iter()
        .map(|key| key.to_lowercase())
        .collect::<Vec<_>>()
        .join(";")
}

fn sorted_keys(map: &HashMap<String, String>) -> Vec<&String> {
    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort();
    keys
}

/// Form query escaping: unreserved bytes pass through, space becomes `+`.
pub fn url_escape(value: &str) -> String {
    // '%' itself is escaped, so every "%20" comes from a space
    utf8_percent_encode(value, QUERY_ESCAPE)
        .to_string()
        .replace("%20", "+")
}

fn hmac_sha1_hex(key: &[u8], message: &[u8]) -> String {
    let mut mac = HmacSha1::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(message);
    hex::encode(mac.finalize().into_bytes())
}

/// Current unix time in seconds.
pub fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}
