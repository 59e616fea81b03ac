use std::net::IpAddr;
use thiserror::Error;
use url::Url;

/// Errors returned when a candidate feed URL is rejected.
#[derive(Error, Debug)]
pub enum UrlValidationError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    #[error("URL has no host")]
    MissingHost,
    /// Loopback, private or link-local address while private hosts are disallowed.
    #[error("Private or local address not allowed: {0}")]
    PrivateHost(String),
}

/// Which hosts a feed URL may point at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HostPolicy {
    /// Reject localhost and private/link-local IP literals.
    #[default]
    PublicOnly,
    /// Accept any host (self-hosted feeds, tests against a local server).
    AllowPrivate,
}

/// Validates a feed URL before it is fetched.
///
/// Only `http`/`https` URLs with a host are accepted. Under
/// [`HostPolicy::PublicOnly`] loopback and private addresses are refused so a
/// subscribed URL cannot be used to reach into the local network.
///
/// ```
/// use feedsync::util::{validate_url, HostPolicy};
///
/// assert!(validate_url("https://example.com/feed.xml", HostPolicy::PublicOnly).is_ok());
/// assert!(validate_url("file:///etc/passwd", HostPolicy::AllowPrivate).is_err());
/// assert!(validate_url("http://127.0.0.1/feed", HostPolicy::PublicOnly).is_err());
/// assert!(validate_url("http://127.0.0.1/feed", HostPolicy::AllowPrivate).is_ok());
/// ```
pub fn validate_url(url_str: &str, policy: HostPolicy) -> Result<Url, UrlValidationError> {
    let url = Url::parse(url_str.trim())?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlValidationError::UnsupportedScheme(scheme.to_owned())),
    }

    let host = url.host_str().ok_or(UrlValidationError::MissingHost)?;
    if host.is_empty() {
        return Err(UrlValidationError::MissingHost);
    }

    if policy == HostPolicy::PublicOnly && is_private_host(host) {
        return Err(UrlValidationError::PrivateHost(host.to_owned()));
    }

    Ok(url)
}

fn is_private_host(host: &str) -> bool {
    if host.eq_ignore_ascii_case("localhost") {
        return true;
    }

    let bare = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);

    match bare.parse::<IpAddr>() {
        Ok(IpAddr::V4(ip)) => {
            ip.is_loopback() || ip.is_private() || ip.is_link_local() || ip.is_unspecified()
        }
        Ok(IpAddr::V6(ip)) => {
            let first = ip.segments()[0];
            ip.is_loopback()
                || ip.is_unspecified()
                || (first & 0xfe00) == 0xfc00
                || (first & 0xffc0) == 0xfe80
        }
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_urls_accepted() {
        assert!(validate_url("https://example.com/feed.xml", HostPolicy::PublicOnly).is_ok());
        assert!(validate_url("http://news.example.org:8080/rss", HostPolicy::PublicOnly).is_ok());
        assert!(validate_url("  https://example.com/atom  ", HostPolicy::PublicOnly).is_ok());
    }

    #[test]
    fn test_non_http_schemes_rejected() {
        for url in ["file:///etc/passwd", "ftp://example.com/feed", "feed://example.com"] {
            assert!(
                matches!(
                    validate_url(url, HostPolicy::AllowPrivate),
                    Err(UrlValidationError::UnsupportedScheme(_))
                ),
                "{url} should be rejected"
            );
        }
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(matches!(
            validate_url("not a url", HostPolicy::AllowPrivate),
            Err(UrlValidationError::InvalidUrl(_))
        ));
        assert!(validate_url("", HostPolicy::AllowPrivate).is_err());
    }

    #[test]
    fn test_private_hosts_depend_on_policy() {
        for url in [
            "http://localhost/feed",
            "http://127.0.0.1:3000/feed",
            "http://192.168.1.1/feed",
            "http://10.0.0.1/feed",
            "http://169.254.1.1/feed",
            "http://[::1]/feed",
            "http://[fe80::1]/feed",
            "http://0.0.0.0/feed",
        ] {
            assert!(
                matches!(
                    validate_url(url, HostPolicy::PublicOnly),
                    Err(UrlValidationError::PrivateHost(_))
                ),
                "{url} should be private"
            );
            assert!(validate_url(url, HostPolicy::AllowPrivate).is_ok());
        }
    }
}
