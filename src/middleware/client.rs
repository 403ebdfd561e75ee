//! Who is calling: client IP, device class and the request facts that go into
//! security and activity logs.

use std::net::{IpAddr, SocketAddr};

use axum::{
    extract::ConnectInfo,
    http::{Extensions, HeaderMap, Method, Uri, header},
};

use crate::security_log::RequestInfo;

/// Client IP of the socket peer. With `trust_proxy` set, `x-forwarded-for`
/// (first hop) and then `x-real-ip` take precedence over the peer.
pub fn client_ip(headers: &HeaderMap, extensions: &Extensions, trust_proxy: bool) -> Option<IpAddr> {
    if trust_proxy {
        if let Some(ip) = forwarded_ip(headers) {
            return Some(ip);
        }
    }

    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
}

fn forwarded_ip(headers: &HeaderMap) -> Option<IpAddr> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .and_then(|s| s.trim().parse::<IpAddr>().ok())
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse::<IpAddr>().ok())
        })
}

pub fn client_ip_label(headers: &HeaderMap, extensions: &Extensions, trust_proxy: bool) -> String {
    client_ip(headers, extensions, trust_proxy)
        .map(|ip| ip.to_string())
        .unwrap_or_else(|| "Unknown".to_string())
}

/// Coarse device class derived from the User-Agent. First match wins.
pub fn device_type(user_agent: Option<&str>) -> &'static str {
    let Some(ua) = user_agent else {
        return "Unknown Device";
    };
    if ua.contains("Mobile") {
        "Mobile Device"
    } else if ua.contains("Tablet") {
        "Tablet"
    } else if ua.contains("Chrome") {
        "Chrome Browser"
    } else if ua.contains("Firefox") {
        "Firefox Browser"
    } else if ua.contains("Safari") {
        "Safari Browser"
    } else if ua.contains("Edge") {
        "Edge Browser"
    } else {
        "Desktop Browser"
    }
}

pub fn user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(String::from)
}

pub fn request_info(
    method: &Method,
    uri: &Uri,
    headers: &HeaderMap,
    extensions: &Extensions,
    trust_proxy: bool,
) -> RequestInfo {
    RequestInfo {
        ip: client_ip_label(headers, extensions, trust_proxy),
        user_agent: user_agent(headers),
        url: uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| uri.path().to_string()),
        method: method.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn spoofed_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7, 10.0.0.1"));
        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.4"));
        headers
    }

    fn peer(octets: [u8; 4]) -> Extensions {
        let mut extensions = Extensions::new();
        extensions.insert(ConnectInfo(SocketAddr::from((octets, 4000))));
        extensions
    }

    #[test]
    fn proxy_headers_are_ignored_unless_trusted() {
        let headers = spoofed_headers();
        let extensions = peer([127, 0, 0, 1]);

        assert_eq!(client_ip_label(&headers, &extensions, false), "127.0.0.1");
        assert_eq!(client_ip_label(&headers, &extensions, true), "203.0.113.7");
    }

    #[test]
    fn trusted_proxy_falls_back_to_real_ip_then_peer() {
        let mut headers = spoofed_headers();
        headers.remove("x-forwarded-for");
        let extensions = peer([10, 0, 0, 2]);
        assert_eq!(client_ip_label(&headers, &extensions, true), "198.51.100.4");

        assert_eq!(client_ip_label(&HeaderMap::new(), &extensions, true), "10.0.0.2");
    }

    #[test]
    fn falls_back_to_unknown_without_a_peer() {
        assert_eq!(client_ip_label(&HeaderMap::new(), &Extensions::new(), false), "Unknown");
        assert_eq!(
            client_ip_label(&HeaderMap::new(), &peer([192, 168, 1, 20]), false),
            "192.168.1.20"
        );
    }

    #[test]
    fn classifies_devices() {
        assert_eq!(device_type(None), "Unknown Device");
        assert_eq!(
            device_type(Some("Mozilla/5.0 (iPhone) AppleWebKit Mobile/15E148 Safari/604.1")),
            "Mobile Device"
        );
        assert_eq!(
            device_type(Some("Mozilla/5.0 (X11; Linux x86_64) Chrome/120.0 Safari/537.36")),
            "Chrome Browser"
        );
        assert_eq!(device_type(Some("Mozilla/5.0 Firefox/121.0")), "Firefox Browser");
        assert_eq!(device_type(Some("curl/8.4.0")), "Desktop Browser");
    }
}
