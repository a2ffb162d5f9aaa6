use axum::{
    extract::{connect_info::ConnectInfo, Request},
    http::HeaderMap,
};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// Client address for a request: proxy headers first, then the socket peer, then loopback.
pub fn client_ip(req: &Request) -> IpAddr {
    let peer = req.extensions().get::<ConnectInfo<SocketAddr>>().map(|info| info.0.ip());
    ip_from_headers(req.headers()).or(peer).unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

/// First parsable address from `X-Forwarded-For`, else `X-Real-IP`.
pub fn ip_from_headers(headers: &HeaderMap) -> Option<IpAddr> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|hv| hv.to_str().ok())
        .and_then(|h| h.split(',').next())
        .and_then(|first| first.trim().parse::<IpAddr>().ok());
    forwarded.or_else(|| {
        headers.get("x-real-ip").and_then(|hv| hv.to_str().ok()).and_then(|h| h.trim().parse::<IpAddr>().ok())
    })
}
