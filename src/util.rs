use std::net::{IpAddr, SocketAddr};

const RESOURCE_SERVER: &str = "RESOURCE_SERVER";

pub fn get_resource_server() -> Option<String> {
    std::env::var(RESOURCE_SERVER).ok()
}

const TELEMETRY_URL: &str = "TELEMETRY_URL";

pub fn get_telemetry_url() -> Option<String> {
    std::env::var(TELEMETRY_URL).ok()
}

const TELEMETRY_TOKEN: &str = "TELEMETRY_TOKEN";

pub fn get_telemetry_token() -> Option<String> {
    std::env::var(TELEMETRY_TOKEN).ok()
}

pub const DEFAULT_COAP_PORT: u16 = 5683;

/// Parse a resource server address. Accepts a full `ip:port` pair, a bare
/// IP (the usual deployment shape, an IPv6 host), or a bracketed IPv6
/// address; a missing port defaults to the well-known CoAP port.
pub fn parse_resource_server(addr: &str) -> anyhow::Result<SocketAddr> {
    if let Ok(socket) = addr.parse::<SocketAddr>() {
        return Ok(socket);
    }

    if let Ok(ip) = addr.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, DEFAULT_COAP_PORT));
    }

    if let Some(inner) = addr.strip_prefix('[').and_then(|a| a.strip_suffix(']'))
        && let Ok(ip) = inner.parse::<IpAddr>()
    {
        return Ok(SocketAddr::new(ip, DEFAULT_COAP_PORT));
    }

    anyhow::bail!("invalid resource server address: {addr}")
}
