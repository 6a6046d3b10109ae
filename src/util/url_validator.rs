use std::net::IpAddr;
use thiserror::Error;
use url::{Host, Url};

/// Reasons a feed URL is refused before any request is made.
#[derive(Error, Debug)]
pub enum UrlValidationError {
    /// The URL string could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The URL uses a scheme other than http or https.
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    /// The URL has no host component.
    #[error("URL has no host")]
    MissingHost,
    /// The URL points to a private/internal IP address.
    #[error("Private IP address not allowed: {0}")]
    PrivateIp(IpAddr),
    /// The URL points to localhost.
    #[error("Localhost not allowed")]
    Localhost,
}

/// Which hosts a feed URL may point at.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UrlPolicy {
    /// Accept loopback and private-range hosts (local mirrors, test servers).
    pub allow_private_hosts: bool,
}

impl UrlPolicy {
    /// Only public hosts.
    pub const PUBLIC: Self = Self {
        allow_private_hosts: false,
    };

    /// Any http(s) host.
    pub const PERMISSIVE: Self = Self {
        allow_private_hosts: true,
    };
}

#[derive(Debug, PartialEq, Eq)]
enum HostClass {
    Public,
    Loopback,
    Private(IpAddr),
}

fn classify(host: Host<&str>) -> HostClass {
    let ip = match host {
        Host::Domain(name) if name.eq_ignore_ascii_case("localhost") => {
            return HostClass::Loopback
        }
        Host::Domain(_) => return HostClass::Public,
        Host::Ipv4(v4) => IpAddr::V4(v4),
        Host::Ipv6(v6) => IpAddr::V6(v6),
    };

    if ip.is_loopback() {
        return HostClass::Loopback;
    }
    let private = match ip {
        IpAddr::V4(v4) => v4.is_private() || v4.is_link_local() || v4.is_unspecified(),
        IpAddr::V6(v6) => {
            let first = v6.segments()[0];
            v6.is_unspecified()
                || (first & 0xfe00) == 0xfc00 // unique local, fc00::/7
                || (first & 0xffc0) == 0xfe80 // link local, fe80::/10
        }
    };
    if private {
        HostClass::Private(ip)
    } else {
        HostClass::Public
    }
}

/// Parse a feed URL and check it against `policy`.
///
/// Only `http` and `https` are accepted. Unless the policy allows it,
/// localhost, loopback and private-range addresses are rejected so a feed
/// subscription cannot be used to probe the local network.
///
/// ```
/// use rssd::util::{validate_url, UrlPolicy};
///
/// let url = validate_url("https://example.com/feed.xml", UrlPolicy::PUBLIC).unwrap();
/// assert_eq!(url.host_str(), Some("example.com"));
///
/// assert!(validate_url("http://192.168.1.1/feed", UrlPolicy::PUBLIC).is_err());
/// assert!(validate_url("http://192.168.1.1/feed", UrlPolicy::PERMISSIVE).is_ok());
/// assert!(validate_url("file:///etc/passwd", UrlPolicy::PERMISSIVE).is_err());
/// ```
pub fn validate_url(url_str: &str, policy: UrlPolicy) -> Result<Url, UrlValidationError> {
    let url = Url::parse(url_str.trim())?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlValidationError::UnsupportedScheme(scheme.to_owned())),
    }

    let host = url.host().ok_or(UrlValidationError::MissingHost)?;
    if !policy.allow_private_hosts {
        match classify(host) {
            HostClass::Public => {}
            HostClass::Loopback => return Err(UrlValidationError::Localhost),
            HostClass::Private(ip) => return Err(UrlValidationError::PrivateIp(ip)),
        }
    }

    Ok(url)
}
