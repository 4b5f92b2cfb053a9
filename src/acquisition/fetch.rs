//! Page fetching with SSRF protection
//!
//! Requests to private/internal IP addresses are refused before any
//! connection is made. Redirects are followed by hand so every hop passes
//! the same check.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::time::Duration;

use reqwest::header::LOCATION;
use reqwest::{Client, Response};
use url::Url;

use crate::{Error, Result};

/// Redirect hops followed before giving up
const MAX_REDIRECTS: usize = 10;

/// Bytes of body read before the rest of the page is dropped
pub const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// HTTP page fetcher with SSRF protection
pub struct PageFetcher {
    client: Client,
}

impl PageFetcher {
    /// Create a new fetcher with the specified timeout
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(concat!("webvoice/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(Error::Http)?;

        Ok(Self { client })
    }

    /// GET a page and return its body, capped at [`MAX_BODY_BYTES`]
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - URL is malformed or its scheme is not http or https
    /// - The host, or the host of any redirect, resolves to a blocked IP address
    /// - More than ten redirects are chained
    /// - HTTP request fails or times out
    /// - Status is not a success
    pub async fn fetch(&self, url: &str) -> Result<String> {
        let mut target = validate_url(url)?;
        let mut redirects = 0;

        loop {
            Self::check_target(&target).await?;

            let response = self
                .client
                .get(target.as_str())
                .send()
                .await
                .map_err(|e| Error::WebFetch(format!("Request failed: {e}")))?;

            let status = response.status();

            if status.is_redirection() {
                if redirects == MAX_REDIRECTS {
                    return Err(Error::WebFetch(format!(
                        "Too many redirects (more than {MAX_REDIRECTS})"
                    )));
                }
                redirects += 1;

                let location = response
                    .headers()
                    .get(LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .ok_or_else(|| {
                        Error::WebFetch(format!("{target} returned {status} without a location"))
                    })?;
                target = redirect_target(&target, location)?;
                tracing::debug!(to = %target, hop = redirects, "following redirect");
                continue;
            }

            if !status.is_success() {
                return Err(Error::WebFetch(format!("{target} returned {status}")));
            }

            let body = read_capped(response, MAX_BODY_BYTES).await?;
            tracing::debug!(url = %target, status = status.as_u16(), bytes = body.len(), "page fetched");

            return Ok(body);
        }
    }

    /// Refuse a URL whose host is, or resolves to, a blocked address
    async fn check_target(target: &Url) -> Result<()> {
        let host = target
            .host_str()
            .ok_or_else(|| Error::WebFetch("URL has no host".to_string()))?;
        let port = target.port_or_known_default().unwrap_or(80);

        Self::check_ssrf(host, port).await
    }

    /// Check if the host resolves to a blocked IP address
    async fn check_ssrf(host: &str, port: u16) -> Result<()> {
        // IPv6 literals arrive bracketed from the URL parser
        let bare = host.trim_start_matches('[').trim_end_matches(']');
        if let Ok(ip) = bare.parse::<IpAddr>() {
            return if Self::is_blocked_ip(ip) {
                Err(Error::WebFetch(format!("Blocked: {host} is a private/internal address")))
            } else {
                Ok(())
            };
        }

        let addrs = tokio::net::lookup_host((bare, port))
            .await
            .map_err(|e| Error::WebFetch(format!("Failed to resolve hostname: {e}")))?;

        for addr in addrs {
            if Self::is_blocked_ip(addr.ip()) {
                return Err(Error::WebFetch(format!(
                    "Blocked: {} resolves to private/internal IP {}",
                    host,
                    addr.ip()
                )));
            }
        }

        Ok(())
    }

    /// Check if an IP address is private or otherwise blocked
    ///
    /// Blocks the following ranges:
    /// - IPv4: 127.0.0.0/8 (loopback), 10.0.0.0/8, 172.16.0.0/12,
    ///   192.168.0.0/16 (private), 169.254.0.0/16 (link-local),
    ///   0.0.0.0/8 (current network)
    /// - IPv6: `::1` (loopback), `fc00::/7` (unique local), `fe80::/10` (link-local),
    ///   `::` (unspecified), and IPv4-mapped forms of the blocked IPv4 ranges
    #[must_use]
    pub fn is_blocked_ip(ip: IpAddr) -> bool {
        match ip {
            IpAddr::V4(ipv4) => Self::is_blocked_ipv4(ipv4),
            IpAddr::V6(ipv6) => Self::is_blocked_ipv6(ipv6),
        }
    }

    fn is_blocked_ipv4(ip: Ipv4Addr) -> bool {
        let octets = ip.octets();

        match octets {
            [0 | 10 | 127, ..] => true,
            [172, second, ..] if (16..=31).contains(&second) => true,
            [192, 168, ..] | [169, 254, ..] => true,
            _ => false,
        }
    }

    fn is_blocked_ipv6(ip: Ipv6Addr) -> bool {
        if ip.is_loopback() || ip.is_unspecified() {
            return true;
        }

        if let Some(mapped) = ip.to_ipv4_mapped() {
            return Self::is_blocked_ipv4(mapped);
        }

        let first = ip.segments()[0];

        // fc00::/7 unique local
        if first & 0xfe00 == 0xfc00 {
            return true;
        }

        // fe80::/10 link-local
        first & 0xffc0 == 0xfe80
    }
}

/// Parse a URL and require an http(s) scheme
///
/// # Errors
///
/// Returns error if the URL is malformed or uses another scheme
pub fn validate_url(url: &str) -> Result<Url> {
    let parsed = Url::parse(url.trim()).map_err(|e| Error::WebFetch(format!("Invalid URL: {e}")))?;
    require_http(parsed)
}

/// Resolve a `Location` header against the URL that returned it
fn redirect_target(from: &Url, location: &str) -> Result<Url> {
    let next = from
        .join(location.trim())
        .map_err(|e| Error::WebFetch(format!("Invalid redirect location {location:?}: {e}")))?;
    require_http(next)
}

fn require_http(parsed: Url) -> Result<Url> {
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        scheme => Err(Error::WebFetch(format!(
            "Invalid scheme: {scheme}. Only http and https are allowed"
        ))),
    }
}

/// Read the body as text, dropping everything after `limit` bytes
async fn read_capped(mut response: Response, limit: usize) -> Result<String> {
    let mut body = Vec::new();

    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| Error::WebFetch(format!("Failed to read response body: {e}")))?
    {
        if !append_capped(&mut body, &chunk, limit) {
            tracing::debug!(limit, "page body truncated");
            break;
        }
    }

    Ok(String::from_utf8_lossy(&body).into_owned())
}

/// Append as much of `chunk` as fits under `limit`; false once the limit is hit
fn append_capped(body: &mut Vec<u8>, chunk: &[u8], limit: usize) -> bool {
    let room = limit.saturating_sub(body.len());
    if chunk.len() > room {
        body.extend_from_slice(&chunk[..room]);
        return false;
    }
    body.extend_from_slice(chunk);
    true
}
