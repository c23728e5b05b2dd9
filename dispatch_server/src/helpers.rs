use std::{net::IpAddr, str::FromStr, sync::OnceLock};

use actix_web::{dev::ServiceRequest, HttpRequest};
use log::{debug, trace, warn};
use regex::Regex;

fn forwarded_for_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(r#"for="?(?P<ip>[^;,"]+)"#).map_err(|e| warn!("💻️ Invalid Forwarded header pattern. {e}")).ok()
        })
        .as_ref()
}

/// Get the remote IP address from the request. It uses 3 sources to determine the IP address, in decreasing order
/// of preference:
/// 1. The `X-Forwarded-For` header, iif `use_x_forwarded_for` is set to true in the configuration.
/// 2. The `Forwarded` header, iif `use_forwarded` is set to true in the configuration.
/// 3. The peer address from the connection info.
pub fn get_remote_ip(req: &HttpRequest, use_x_forwarded_for: bool, use_forwarded: bool) -> Option<IpAddr> {
    let mut result = None;
    if use_x_forwarded_for {
        trace!("Checking X-Forwarded-For header");
        // Proxies append to the list, so the first entry is the original client
        result = req
            .headers()
            .get("X-Forwarded-For")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.split(',').next())
            .and_then(|s| IpAddr::from_str(s.trim()).ok());
        if let Some(ip) = result {
            debug!("Using X-Forwarded-For header for remote address: {ip}");
        }
    }
    if use_forwarded && result.is_none() {
        trace!("Checking Forwarded header");
        result = req
            .headers()
            .get("Forwarded")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| forwarded_for_pattern().and_then(|re| re.captures(v)))
            .and_then(|caps| caps.name("ip"))
            .map(|m| m.as_str())
            .and_then(|s| IpAddr::from_str(s).ok());
        if let Some(ip) = result {
            debug!("Using Forwarded header for remote address: {ip}");
        }
    }
    result.or_else(|| {
        let peer_addr = req.connection_info().peer_addr().map(|a| a.to_string());
        trace!("Using Peer address for remote address: {:?}", peer_addr);
        peer_addr.and_then(|s| IpAddr::from_str(&s).ok())
    })
}

/// Checks a webhook caller against the whitelist. No whitelist means everyone is allowed.
pub fn is_whitelisted(req: &ServiceRequest, whitelist: Option<&[IpAddr]>, use_xff: bool, use_fwd: bool) -> bool {
    let Some(whitelist) = whitelist else {
        return true;
    };
    match get_remote_ip(req.request(), use_xff, use_fwd) {
        Some(ip) => {
            let allowed = whitelist.contains(&ip);
            if !allowed {
                warn!("💻️ Webhook call from {ip}, which is not on the whitelist. Denying access.");
            }
            allowed
        },
        None => {
            warn!("💻️ No IP address found for the webhook caller. Denying access.");
            false
        },
    }
}

/// Compares two keys without stopping at the first difference.
pub fn keys_match(expected: &str, supplied: &str) -> bool {
    let (a, b) = (expected.as_bytes(), supplied.as_bytes());
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
