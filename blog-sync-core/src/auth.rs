//! COS request signature.
//!
//! Computes the `Authorization` token the Tencent-COS-compatible storage API
//! expects: a pair of nested HMAC-SHA1 passes over a canonical rendering of
//! the request, scoped to a time window. [`sign`] is a pure function of its
//! [`SigningContext`]; callers that want to avoid re-signing within the
//! validity window wrap it in a [`CachedSigner`].
//!
//! The canonical encoding must match the server bit-for-bit: keys are
//! lowercased, percent-encoding is stricter than a standard URI-component
//! encoder (it additionally escapes `! ' ( ) *`), and keys sort
//! case-insensitively.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use hmac::{Hmac, Mac};
use sha1::{Digest, Sha1};
use tracing::debug;

type HmacSha1 = Hmac<Sha1>;

/// Seconds a signed token stays valid, measured from one second before the
/// caller-supplied clock reading.
pub const VALIDITY_WINDOW_SECS: u64 = 3600;

/// Everything a signature is computed from. `now` is the current unix time
/// in seconds, supplied by the caller so the computation stays pure.
#[derive(Debug, Clone)]
pub struct SigningContext<'a> {
    pub access_key_id: &'a str,
    pub access_key_secret: &'a str,
    pub method: &'a str,
    pub path: &'a str,
    pub query: &'a [(String, String)],
    pub headers: &'a [(String, String)],
    pub now: u64,
}

/// Compute the authorization token for one storage request.
///
/// Malformed input (empty method or path) is a caller contract violation;
/// the function signs whatever it is given.
pub fn sign(ctx: &SigningContext<'_>) -> String {
    let method = ctx.method.to_lowercase();
    let pathname = if ctx.path.starts_with('/') {
        ctx.path.to_string()
    } else {
        format!("/{}", ctx.path)
    };

    // Window starts one second in the past; sign time and key time are the
    // same value.
    let start = ctx.now.saturating_sub(1);
    let expiry = start + VALIDITY_WINDOW_SECS;
    let sign_time = format!("{start};{expiry}");

    let url_param_list = key_list(ctx.query);
    let header_list = key_list(ctx.headers);

    let sign_key = hmac_sha1_hex(ctx.access_key_secret.as_bytes(), sign_time.as_bytes());

    let format_string = [
        method.as_str(),
        pathname.as_str(),
        canonical_pairs(ctx.query).as_str(),
        canonical_pairs(ctx.headers).as_str(),
        "",
    ]
    .join("\n");
    let format_hash = hex::encode(Sha1::digest(format_string.as_bytes()));

    let string_to_sign = ["sha1", sign_time.as_str(), format_hash.as_str(), ""].join("\n");
    let signature = hmac_sha1_hex(sign_key.as_bytes(), string_to_sign.as_bytes());

    [
        "q-sign-algorithm=sha1".to_string(),
        format!("q-ak={}", ctx.access_key_id),
        format!("q-sign-time={sign_time}"),
        format!("q-key-time={sign_time}"),
        format!("q-header-list={header_list}"),
        format!("q-url-param-list={url_param_list}"),
        format!("q-signature={signature}"),
    ]
    .join("&")
}

fn hmac_sha1_hex(key: &[u8], message: &[u8]) -> String {
    let mut mac = HmacSha1::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(message);
    hex::encode(mac.finalize().into_bytes())
}

fn sorted<'a>(pairs: &'a [(String, String)]) -> Vec<&'a (String, String)> {
    let mut out: Vec<&(String, String)> = pairs.iter().collect();
    out.sort_by(|a, b| a.0.to_lowercase().cmp(&b.0.to_lowercase()));
    out
}

/// Lowercase keys, case-insensitively sorted, semicolon-joined — the value
/// of `q-header-list` / `q-url-param-list`.
pub fn key_list(pairs: &[(String, String)]) -> String {
    sorted(pairs)
        .iter()
        .map(|(k, _)| k.to_lowercase())
        .collect::<Vec<_>>()
        .join(";")
}

/// Canonical `k=v&k=v` rendering of a query or header map: keys lowercased,
/// both sides strictly percent-encoded, case-insensitive key order.
pub fn canonical_pairs(pairs: &[(String, String)]) -> String {
    sorted(pairs)
        .iter()
        .map(|(k, v)| {
            format!(
                "{}={}",
                safe_url_encode(&k.to_lowercase()),
                safe_url_encode(v)
            )
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// Percent-encode with the storage API's strict reserved set. Standard
/// URI-component encoders leave `! ' ( ) *` bare; the server does not.
pub fn safe_url_encode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => {
                out.push('%');
                out.push_str(&format!("{byte:02X}"));
            }
        }
    }
    out
}

struct CachedToken {
    token: String,
    expires_at: u64,
}

/// Token cache over [`sign`].
///
/// Keyed by the full request shape (method, path, canonical query and
/// headers), so a cached token is only ever replayed for a request it
/// actually authorizes. A hit is reused while more than half the validity
/// window remains; the signing function itself stays stateless.
pub struct CachedSigner {
    cache: Mutex<HashMap<String, CachedToken>>,
}

impl CachedSigner {
    pub fn new() -> Self {
        Self {
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn sign(&self, ctx: &SigningContext<'_>) -> String {
        let shape = format!(
            "{}\n{}\n{}\n{}",
            ctx.method.to_lowercase(),
            ctx.path,
            canonical_pairs(ctx.query),
            canonical_pairs(ctx.headers),
        );
        let mut cache = self
            .cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(hit) = cache.get(&shape) {
            if hit.expires_at.saturating_sub(ctx.now) > VALIDITY_WINDOW_SECS / 2 {
                debug!(method = %ctx.method, path = %ctx.path, "Reusing cached authorization token");
                return hit.token.clone();
            }
        }
        let token = sign(ctx);
        cache.insert(
            shape,
            CachedToken {
                token: token.clone(),
                expires_at: ctx.now.saturating_sub(1) + VALIDITY_WINDOW_SECS,
            },
        );
        token
    }
}

impl Default for CachedSigner {
    fn default() -> Self {
        Self::new()
    }
}
