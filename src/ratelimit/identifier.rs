//! Client identifier derivation.
//!
//! Callers are bucketed by `address:hash`, where `hash` folds the user-agent
//! into a bounded integer. Distinct clients behind one NAT address with the
//! same user-agent share a bucket.

use axum::http::HeaderMap;

/// Sentinel used when an address or user-agent is absent.
pub const UNKNOWN: &str = "unknown";

/// Upper bound (exclusive) of the user-agent hash.
const HASH_RANGE: u32 = 100_000;

const FORWARDED_FOR: &str = "x-forwarded-for";
const REAL_IP: &str = "x-real-ip";
const USER_AGENT: &str = "user-agent";

/// Derive the client identifier for a request from its headers.
///
/// Never fails: missing or non-UTF-8 headers fall back to [`UNKNOWN`].
pub fn derive_identifier(headers: &HeaderMap) -> String {
    derive_identifier_from(
        header_str(headers, FORWARDED_FOR),
        header_str(headers, REAL_IP),
        header_str(headers, USER_AGENT),
    )
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// Derive a client identifier from raw header values.
pub fn derive_identifier_from(
    forwarded_for: Option<&str>,
    real_ip: Option<&str>,
    user_agent: Option<&str>,
) -> String {
    let forwarded = forwarded_for
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|addr| !addr.is_empty());
    let real = real_ip.map(str::trim).filter(|addr| !addr.is_empty());

    let address = forwarded.or(real).unwrap_or(UNKNOWN);
    let agent = user_agent.unwrap_or(UNKNOWN);

    format!("{}:{}", address, user_agent_hash(agent))
}

/// Fold a user-agent string into `0..HASH_RANGE`.
///
/// Multiplies by 31 over UTF-16 code units with 32-bit wrapping. Not
/// collision resistant.
pub fn user_agent_hash(user_agent: &str) -> u32 {
    let folded = user_agent
        .encode_utf16()
        .fold(0i32, |hash, unit| {
            hash.wrapping_shl(5).wrapping_sub(hash).wrapping_add(unit as i32)
        });

    folded.unsigned_abs() % HASH_RANGE
}
