//! Client identifier derivation for rate limiting.

use axum::http::HeaderMap;
use std::net::{IpAddr, SocketAddr};

pub const FORWARDED_FOR: &str = "x-forwarded-for";
const UNKNOWN_CLIENT: &str = "unknown";

/// Decides which address identifies the client behind a request.
#[derive(Debug, Clone)]
pub struct ClientKeyExtractor {
    trust_forwarded_for: bool,
    trusted_proxies: Vec<IpAddr>,
}

impl ClientKeyExtractor {
    pub fn new(trust_forwarded_for: bool, trusted_proxies: Vec<IpAddr>) -> Self {
        Self {
            trust_forwarded_for,
            trusted_proxies,
        }
    }

    /// Client identifier for a request: the first X-Forwarded-For entry when the
    /// header may be trusted, otherwise the peer IP address.
    pub fn client_key(&self, headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
        if self.forwarded_for_trusted(peer) {
            if let Some(ip) = first_forwarded_for(headers) {
                return ip;
            }
        }

        match peer {
            Some(addr) => addr.ip().to_string(),
            None => UNKNOWN_CLIENT.to_string(),
        }
    }

    fn forwarded_for_trusted(&self, peer: Option<SocketAddr>) -> bool {
        if !self.trust_forwarded_for {
            return false;
        }
        if self.trusted_proxies.is_empty() {
            return true;
        }
        peer.map(|addr| self.trusted_proxies.contains(&addr.ip()))
            .unwrap_or(false)
    }
}

impl Default for ClientKeyExtractor {
    fn default() -> Self {
        Self::new(true, Vec::new())
    }
}

fn first_forwarded_for(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(FORWARDED_FOR)?.to_str().ok()?;
    let first = value.split(',').next()?.trim();
    if first.is_empty() {
        None
    } else {
        Some(first.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn forwarded(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(FORWARDED_FOR, HeaderValue::from_static(value));
        headers
    }

    fn peer(ip: [u8; 4]) -> Option<SocketAddr> {
        Some(SocketAddr::from((ip, 40000)))
    }

    #[test]
    fn test_first_forwarded_entry_wins() {
        let extractor = ClientKeyExtractor::default();
        let key = extractor.client_key(&forwarded("192.168.1.1, 10.0.0.1"), peer([127, 0, 0, 1]));
        assert_eq!(key, "192.168.1.1");
    }

    #[test]
    fn test_peer_address_fallback() {
        let extractor = ClientKeyExtractor::default();
        let key = extractor.client_key(&HeaderMap::new(), peer([203, 0, 113, 1]));
        assert_eq!(key, "203.0.113.1");
    }

    #[test]
    fn test_unknown_without_peer() {
        let extractor = ClientKeyExtractor::default();
        assert_eq!(extractor.client_key(&HeaderMap::new(), None), "unknown");
    }

    #[test]
    fn test_empty_forwarded_entry_falls_back() {
        let extractor = ClientKeyExtractor::default();
        let key = extractor.client_key(&forwarded(" , 10.0.0.1"), peer([203, 0, 113, 9]));
        assert_eq!(key, "203.0.113.9");
    }

    #[test]
    fn test_forwarded_for_disabled() {
        let extractor = ClientKeyExtractor::new(false, Vec::new());
        let key = extractor.client_key(&forwarded("1.2.3.4"), peer([203, 0, 113, 1]));
        assert_eq!(key, "203.0.113.1");
    }

    #[test]
    fn test_untrusted_proxy_is_ignored() {
        let proxy: IpAddr = "10.0.0.1".parse().unwrap();
        let extractor = ClientKeyExtractor::new(true, vec![proxy]);

        let spoofed = extractor.client_key(&forwarded("1.2.3.4"), peer([198, 51, 100, 7]));
        assert_eq!(spoofed, "198.51.100.7");

        let proxied = extractor.client_key(&forwarded("1.2.3.4"), peer([10, 0, 0, 1]));
        assert_eq!(proxied, "1.2.3.4");
    }
}
