//! Network identity of a caller.
//!
//! Forwarding headers are trusted as-is. That is only sound behind a reverse
//! proxy that overwrites them; a directly exposed listener lets clients pick
//! their own rate-limit key.

use std::net::SocketAddr;

use axum::http::HeaderMap;

pub const X_FORWARDED_FOR: &str = "x-forwarded-for";
pub const X_REAL_IP: &str = "x-real-ip";

/// First forwarded hop, then `X-Real-IP`, then the peer address without port.
pub fn client_address(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get(X_FORWARDED_FOR)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(hop) = forwarded {
        return hop.to_string();
    }

    let real_ip = headers
        .get(X_REAL_IP)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(ip) = real_ip {
        return ip.to_string();
    }

    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn peer() -> Option<SocketAddr> {
        Some("10.0.0.7:51234".parse().unwrap())
    }

    #[test]
    fn test_forwarded_for_first_hop_wins() {
        let mut headers = HeaderMap::new();
        headers.insert(X_FORWARDED_FOR, HeaderValue::from_static(" 203.0.113.9 , 10.0.0.1"));
        headers.insert(X_REAL_IP, HeaderValue::from_static("198.51.100.2"));
        assert_eq!(client_address(&headers, peer()), "203.0.113.9");
    }

    #[test]
    fn test_real_ip_then_peer() {
        let mut headers = HeaderMap::new();
        headers.insert(X_REAL_IP, HeaderValue::from_static("198.51.100.2"));
        assert_eq!(client_address(&headers, peer()), "198.51.100.2");

        let empty = HeaderMap::new();
        assert_eq!(client_address(&empty, peer()), "10.0.0.7");
        assert_eq!(client_address(&empty, None), "unknown");
    }

    #[test]
    fn test_blank_headers_are_skipped() {
        let mut headers = HeaderMap::new();
        headers.insert(X_FORWARDED_FOR, HeaderValue::from_static(""));
        headers.insert(X_REAL_IP, HeaderValue::from_static("  "));
        assert_eq!(client_address(&headers, peer()), "10.0.0.7");
    }
}
