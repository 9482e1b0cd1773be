//! WeMo plug discovery: SSDP `M-SEARCH` for the basicevent service, then a
//! `setup.xml` fetch per responder to read its friendly name.

use reqwest::Url;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, info, warn};

use super::switch::SwitchError;

pub const SSDP_MULTICAST: SocketAddr =
    SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::new(239, 255, 255, 250), 1900));
const SEARCH_TARGET: &str = "urn:Belkin:service:basicevent:1";

/// A plug found on the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredPlug {
    pub friendly_name: String,
    pub host: String,
    pub port: u16,
}

/// Timeout-bounded SSDP scanner.
#[derive(Debug, Clone)]
pub struct WemoDiscovery {
    target: SocketAddr,
    search_timeout: Duration,
    client: reqwest::Client,
}

impl WemoDiscovery {
    pub fn new(target: SocketAddr, search_timeout: Duration) -> Result<Self, SwitchError> {
        let client = reqwest::Client::builder()
            .timeout(search_timeout.max(Duration::from_secs(1)))
            .build()
            .map_err(|e| SwitchError::Communication(e.to_string()))?;
        Ok(Self {
            target,
            search_timeout,
            client,
        })
    }

    /// Sends one search and collects `LOCATION` URLs until the timeout.
    pub async fn search(&self) -> Result<Vec<String>, SwitchError> {
        let comm = |e: std::io::Error| SwitchError::Communication(format!("ssdp: {e}"));
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await.map_err(comm)?;

        let mx = self.search_timeout.as_secs().clamp(1, 5);
        let request = format!(
            "M-SEARCH * HTTP/1.1\r\nHOST: 239.255.255.250:1900\r\nMAN: \"ssdp:discover\"\r\nMX: {mx}\r\nST: {SEARCH_TARGET}\r\n\r\n"
        );
        socket
            .send_to(request.as_bytes(), self.target)
            .await
            .map_err(comm)?;

        let deadline = Instant::now() + self.search_timeout;
        let mut locations = Vec::new();
        let mut buf = [0u8; 2048];
        loop {
            match timeout_at(deadline, socket.recv_from(&mut buf)).await {
                Err(_) => break,
                Ok(Err(e)) => return Err(comm(e)),
                Ok(Ok((n, from))) => {
                    let reply = String::from_utf8_lossy(&buf[..n]);
                    match parse_ssdp_location(&reply) {
                        Some(loc) if !locations.contains(&loc) => {
                            debug!(%from, location = %loc, "ssdp response");
                            locations.push(loc);
                        }
                        Some(_) => {}
                        None => debug!(%from, "ssdp response without LOCATION"),
                    }
                }
            }
        }
        info!(responders = locations.len(), "wemo search finished");
        Ok(locations)
    }

    /// Reads `setup.xml` at each location and returns the first plug whose
    /// friendly name matches, ignoring case.
    pub async fn resolve(&self, locations: &[String], name: &str) -> Option<DiscoveredPlug> {
        for location in locations {
            match self.describe(location).await {
                Ok(plug) if plug.friendly_name.eq_ignore_ascii_case(name) => return Some(plug),
                Ok(plug) => debug!(name = %plug.friendly_name, host = %plug.host, "not the wanted plug"),
                Err(e) => warn!(location = %location, error = %e, "failed to describe device"),
            }
        }
        None
    }

    async fn describe(&self, location: &str) -> Result<DiscoveredPlug, SwitchError> {
        let url = Url::parse(location)
            .map_err(|e| SwitchError::Protocol(format!("bad location '{location}': {e}")))?;
        let host = url
            .host_str()
            .ok_or_else(|| SwitchError::Protocol(format!("location '{location}' has no host")))?
            .to_string();
        let port = url.port_or_known_default().unwrap_or(80);

        let body = timeout(self.search_timeout.max(Duration::from_secs(1)), async {
            self.client.get(url).send().await?.error_for_status()?.text().await
        })
        .await
        .map_err(|_| SwitchError::Communication(format!("{location}: timed out")))?
        .map_err(|e| SwitchError::Communication(e.to_string()))?;

        let friendly_name = parse_friendly_name(&body)
            .ok_or_else(|| SwitchError::Protocol(format!("{location}: no friendlyName")))?;
        Ok(DiscoveredPlug {
            friendly_name,
            host,
            port,
        })
    }
}

/// `LOCATION` header of an SSDP response. Header names are case-insensitive.
pub fn parse_ssdp_location(reply: &str) -> Option<String> {
    reply.lines().find_map(|line| {
        let (name, value) = line.split_once(':')?;
        name.trim()
            .eq_ignore_ascii_case("location")
            .then(|| value.trim().to_string())
            .filter(|v| !v.is_empty())
    })
}

pub fn parse_friendly_name(setup_xml: &str) -> Option<String> {
    const OPEN: &str = "<friendlyName>";
    const CLOSE: &str = "</friendlyName>";
    let start = setup_xml.find(OPEN)? + OPEN.len();
    let len = setup_xml[start..].find(CLOSE)?;
    let name = setup_xml[start..start + len].trim();
    (!name.is_empty()).then(|| name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_header() {
        let reply = "HTTP/1.1 200 OK\r\nCACHE-CONTROL: max-age=86400\r\nLocation: http://192.168.1.41:49153/setup.xml\r\nST: urn:Belkin:service:basicevent:1\r\n\r\n";
        assert_eq!(
            parse_ssdp_location(reply).as_deref(),
            Some("http://192.168.1.41:49153/setup.xml")
        );
        assert_eq!(parse_ssdp_location("HTTP/1.1 200 OK\r\nST: x\r\n\r\n"), None);
    }

    #[test]
    fn test_friendly_name() {
        let xml = "<root><device><deviceType>urn:Belkin:device:controllee:1</deviceType>\
                   <friendlyName> Masterbed </friendlyName></device></root>";
        assert_eq!(parse_friendly_name(xml).as_deref(), Some("Masterbed"));
        assert_eq!(parse_friendly_name("<root/>"), None);
        assert_eq!(parse_friendly_name("<friendlyName></friendlyName>"), None);
    }

    #[tokio::test]
    async fn test_search_without_responders_is_empty() {
        // Nothing listens on this socket's port once it is dropped
        let silent = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        let target = silent.local_addr().unwrap();
        drop(silent);

        let discovery = WemoDiscovery::new(target, Duration::from_millis(300)).unwrap();
        match discovery.search().await {
            Ok(found) => assert!(found.is_empty()),
            // Some platforms surface the ICMP port-unreachable on recv
            Err(e) => assert!(matches!(e, SwitchError::Communication(_))),
        }
    }
}
