//! Client IP resolution from request metadata
//!
//! CDN-terminated and proxied requests carry the real client IP in headers,
//! not in the transport peer address. This module picks the single IP string
//! the admission pipeline classifies:
//! - `CF-Connecting-IP` header (set by Cloudflare at the edge)
//! - first entry of `X-Forwarded-For`, trimmed
//! - transport peer address with the port stripped
//!
//! There is no trusted-proxy allowlist: any client that reaches us directly
//! can spoof either header and bypass geo checks. Known weakness, kept from
//! the original design rather than silently hardened here.

use axum::http::HeaderMap;

/// Header set by Cloudflare with the connecting client's IP
pub const CF_CONNECTING_IP: &str = "cf-connecting-ip";

/// Standard forwarded-client header, `"client, proxy1, proxy2"`
pub const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Resolve the client IP to classify for this request.
///
/// Always returns something; a malformed peer address falls through as the
/// raw string, trimmed, and the classifier fails open on it later.
pub fn resolve(headers: &HeaderMap, peer_addr: &str) -> String {
    if let Some(cf) = header_str(headers, CF_CONNECTING_IP) {
        return cf.trim().to_string();
    }

    // The first entry is taken as-is, even when it trims to nothing (a
    // degenerate header like ", 5.6.7.8"): the empty string fails IP parsing
    // downstream and the request is admitted, same as the original behavior.
    if let Some(xff) = header_str(headers, X_FORWARDED_FOR) {
        let first = xff.split(',').next().unwrap_or(xff);
        return first.trim().to_string();
    }

    strip_port(peer_addr)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
}

/// Strip the port from a peer address.
///
/// Handles `host:port` and bracketed IPv6 `[addr]:port`. A bare IPv6 address
/// like `::1` contains colons but no port; splitting on the last colon would
/// mangle it, so anything unbracketed with more than one colon is returned
/// as-is.
fn strip_port(addr: &str) -> String {
    let addr = addr.trim();

    if let Some(rest) = addr.strip_prefix('[') {
        if let Some(end) = rest.find(']') {
            return rest[..end].to_string();
        }
        return addr.to_string();
    }

    if addr.matches(':').count() == 1 {
        if let Some((host, _port)) = addr.rsplit_once(':') {
            return host.to_string();
        }
    }

    addr.to_string()
}
