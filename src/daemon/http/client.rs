//! Request metadata extraction.

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::request::Parts;
use axum::http::{HeaderMap, header};
use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};

use super::SharedState;
use crate::model::ClientInfo;
use crate::policy::sanitize::sanitize_user_agent;

/// Client address: the first `X-Forwarded-For` hop when trusted, else the
/// peer address.
pub fn remote_ip(
    headers: &HeaderMap,
    peer: Option<IpAddr>,
    trust_forwarded_for: bool,
) -> Option<IpAddr> {
    if trust_forwarded_for
        && let Some(ip) = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .and_then(|first| first.trim().parse::<IpAddr>().ok())
    {
        return Some(ip);
    }
    peer
}

fn header_str(headers: &HeaderMap, name: &str) -> String {
    if name.is_empty() {
        return String::new();
    }
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
        .unwrap_or_default()
}

/// Live metadata of the requesting client, with location resolved.
#[derive(Debug, Clone)]
pub struct ClientMeta(pub ClientInfo);

impl FromRequestParts<SharedState> for ClientMeta {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|info| info.0.ip());
        let ip = remote_ip(&parts.headers, peer, state.headers.trust_forwarded_for);

        let user_agent = parts
            .headers
            .get(header::USER_AGENT)
            .map(|v| sanitize_user_agent(&String::from_utf8_lossy(v.as_bytes())))
            .unwrap_or_default();

        Ok(Self(ClientInfo {
            addr: ip.map(|ip| ip.to_string()).unwrap_or_default(),
            user_agent,
            tls_version: header_str(&parts.headers, &state.headers.tls_version),
            tls_cipher_suite: header_str(&parts.headers, &state.headers.tls_cipher_suite),
            location: ip.and_then(|ip| state.locator.lookup(ip)),
        }))
    }
}
