//! Signed playback-URL construction. The video host validates the query
//! byte-for-byte, so the digest input order and formatting are fixed.

use anyhow::{Result, anyhow};

/// Builds the `auth_key=...&t=...` query string appended to the raw video
/// URL. The digest input is the URL path, user id, tenant id, the user's
/// phone number reversed, and a Unix-seconds timestamp, concatenated with
/// no separators and hashed with md5 (lowercase hex).
#[must_use]
pub fn video_auth_query(
    auth_key: &str,
    url_path: &str,
    user_id: i64,
    tenant_id: i64,
    phone: &str,
    timestamp: i64,
) -> String {
    let digest = signature_digest(url_path, user_id, tenant_id, phone, timestamp);
    format!("auth_key={auth_key}&t={user_id}-{timestamp}-{digest}")
}

fn signature_digest(
    url_path: &str,
    user_id: i64,
    tenant_id: i64,
    phone: &str,
    timestamp: i64,
) -> String {
    let input = format!(
        "{url_path}{user_id}{tenant_id}{}{timestamp}",
        reverse_phone(phone)
    );
    format!("{:x}", md5::compute(input))
}

/// Raw character reversal, no digit-aware tricks.
#[must_use]
pub fn reverse_phone(phone: &str) -> String {
    phone.chars().rev().collect()
}

/// Extracts the path component the digest covers from a raw video URL,
/// dropping the scheme, host, query and fragment.
pub fn url_path_of(raw: &str) -> Result<String> {
    let without_scheme = raw.split_once("://").map_or(raw, |(_, rest)| rest);
    let path_start = without_scheme
        .find('/')
        .ok_or_else(|| anyhow!("video url {raw:?} has no path"))?;
    let path = &without_scheme[path_start..];
    let path = path.split(['?', '#']).next().unwrap_or(path);
    Ok(path.to_string())
}
