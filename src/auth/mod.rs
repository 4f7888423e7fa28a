//! Authentication seam consumed by the core
//!
//! The gateway core does not implement credential storage, rate limits, or
//! token formats; it talks to an [`AuthProvider`] and otherwise only moves
//! opaque strings around. [`NoAuth`] is the disabled-mode implementation
//! used when the gateway runs open.

use crate::common::http::{query_param, RequestHead};
use crate::{Error, Result};
use async_trait::async_trait;
use std::net::SocketAddr;
use subtle::ConstantTimeEq;

/// Claims recovered from a tunnel-bound bearer token.
#[derive(Debug, Clone)]
pub struct TokenClaims {
    pub tunnel_id: String,
}

/// Behavioural contract of the authentication collaborator.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Whether authentication is enforced at all.
    fn enabled(&self) -> bool;

    /// Check that the API key exists, is enabled, is allowed from this IP,
    /// and is within its rate budget.
    async fn validate_caller(&self, api_key: &str, client_ip: &str) -> Result<()>;

    /// Mint a bearer token bound to one tunnel id.
    async fn mint_tunnel_token(
        &self,
        tunnel_id: &str,
        client_ip: &str,
        subdomain: &str,
        api_key: &str,
    ) -> Result<String>;

    /// Validate a tunnel token and recover its claims.
    async fn validate_tunnel_token(&self, token: &str) -> Result<TokenClaims>;
}

/// Disabled-mode provider: every caller passes, no tokens exist.
pub struct NoAuth;

#[async_trait]
impl AuthProvider for NoAuth {
    fn enabled(&self) -> bool {
        false
    }

    async fn validate_caller(&self, _api_key: &str, _client_ip: &str) -> Result<()> {
        Ok(())
    }

    async fn mint_tunnel_token(
        &self,
        _tunnel_id: &str,
        _client_ip: &str,
        _subdomain: &str,
        _api_key: &str,
    ) -> Result<String> {
        Ok(String::new())
    }

    async fn validate_tunnel_token(&self, _token: &str) -> Result<TokenClaims> {
        Err(Error::auth("authentication is disabled"))
    }
}

/// Extract an API key from a request, in precedence order:
/// `Authorization: Bearer`, `Authorization: ApiKey`, `api_key` query
/// parameter, `X-API-Key` header.
pub fn extract_api_key(head: &RequestHead) -> Option<String> {
    if let Some(auth) = head.header("authorization") {
        if let Some(key) = auth.strip_prefix("Bearer ") {
            return Some(key.trim().to_string());
        }
        if let Some(key) = auth.strip_prefix("ApiKey ") {
            return Some(key.trim().to_string());
        }
    }
    if let Some(key) = query_param(&head.target, "api_key") {
        return Some(key);
    }
    head.header("x-api-key").map(|k| k.trim().to_string())
}

/// Derive the caller IP: `X-Real-IP`, else the first `X-Forwarded-For`
/// element, else the connection remote address. Ports are stripped.
pub fn client_ip(head: &RequestHead, remote: SocketAddr) -> String {
    if let Some(ip) = head.header("x-real-ip") {
        return strip_port(ip.trim()).to_string();
    }
    if let Some(fwd) = head.header("x-forwarded-for") {
        if let Some(first) = fwd.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return strip_port(first).to_string();
            }
        }
    }
    remote.ip().to_string()
}

fn strip_port(addr: &str) -> &str {
    // [v6]:port keeps the brackets' contents; host:port loses the port.
    // Bare v6 addresses contain multiple colons and are left alone.
    if let Some(rest) = addr.strip_prefix('[') {
        if let Some(end) = rest.find(']') {
            return &rest[..end];
        }
    }
    match addr.rfind(':') {
        Some(idx) if addr[..idx].find(':').is_none() => &addr[..idx],
        _ => addr,
    }
}

/// Byte-for-byte token comparison in constant time.
pub fn tokens_match(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::http::read_request_head;
    use bytes::BytesMut;

    async fn head_from(raw: &[u8]) -> RequestHead {
        let mut reader = raw;
        let mut buf = BytesMut::new();
        read_request_head(&mut reader, &mut buf)
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn test_api_key_precedence() {
        let head = head_from(
            b"GET /?api_key=from-query HTTP/1.1\r\nAuthorization: Bearer from-bearer\r\nX-API-Key: from-header\r\n\r\n",
        )
        .await;
        assert_eq!(extract_api_key(&head).as_deref(), Some("from-bearer"));

        let head = head_from(
            b"GET /?api_key=from-query HTTP/1.1\r\nAuthorization: ApiKey from-apikey\r\n\r\n",
        )
        .await;
        assert_eq!(extract_api_key(&head).as_deref(), Some("from-apikey"));

        let head =
            head_from(b"GET /?api_key=from-query HTTP/1.1\r\nX-API-Key: from-header\r\n\r\n")
                .await;
        assert_eq!(extract_api_key(&head).as_deref(), Some("from-query"));

        let head = head_from(b"GET / HTTP/1.1\r\nX-API-Key: from-header\r\n\r\n").await;
        assert_eq!(extract_api_key(&head).as_deref(), Some("from-header"));

        let head = head_from(b"GET / HTTP/1.1\r\n\r\n").await;
        assert_eq!(extract_api_key(&head), None);
    }

    #[tokio::test]
    async fn test_client_ip_derivation() {
        let remote: SocketAddr = "10.0.0.9:41000".parse().unwrap();

        let head = head_from(b"GET / HTTP/1.1\r\nX-Real-IP: 1.2.3.4:5678\r\n\r\n").await;
        assert_eq!(client_ip(&head, remote), "1.2.3.4");

        let head =
            head_from(b"GET / HTTP/1.1\r\nX-Forwarded-For: 5.6.7.8, 9.9.9.9\r\n\r\n").await;
        assert_eq!(client_ip(&head, remote), "5.6.7.8");

        let head = head_from(b"GET / HTTP/1.1\r\n\r\n").await;
        assert_eq!(client_ip(&head, remote), "10.0.0.9");
    }

    #[test]
    fn test_strip_port_v6() {
        assert_eq!(strip_port("[::1]:8080"), "::1");
        assert_eq!(strip_port("::1"), "::1");
        assert_eq!(strip_port("1.2.3.4"), "1.2.3.4");
    }

    #[test]
    fn test_tokens_match() {
        assert!(tokens_match("secret", "secret"));
        assert!(!tokens_match("secret", "secre"));
        assert!(!tokens_match("secret", "secrets"));
        assert!(!tokens_match("secret", "Secret"));
    }

    #[tokio::test]
    async fn test_noauth_contract() {
        let auth = NoAuth;
        assert!(!auth.enabled());
        assert!(auth.validate_caller("", "1.2.3.4").await.is_ok());
        assert_eq!(auth.mint_tunnel_token("t", "ip", "t", "k").await.unwrap(), "");
        assert!(auth.validate_tunnel_token("x").await.is_err());
    }
}
