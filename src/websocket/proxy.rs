//! Proxy resolution and HTTP CONNECT tunnelling for the handshake.
//!
//! An explicit override always wins. Without one the proxy comes from the
//! conventional environment variables (`HTTPS_PROXY` for `wss`, `HTTP_PROXY`
//! for `ws`, then `ALL_PROXY`), honouring `NO_PROXY`. Loopback targets are
//! never proxied.

use std::net::IpAddr;

use base64::prelude::*;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info};
use url::Url;

use crate::{CambistError, Result};

/// Upper bound on the size of the proxy's CONNECT response head.
const MAX_RESPONSE_HEAD: usize = 8 * 1024;

/// Picks the proxy for `target`, if any.
///
/// A non-empty `proxy_override` is parsed and used as-is; otherwise the
/// process environment is consulted.
///
/// # Errors
///
/// Returns [`CambistError::ProxyOverride`] if the override is not a valid
/// URL, or [`CambistError::Proxy`] if the chosen proxy is unusable.
pub fn resolve(target: &Url, proxy_override: Option<&str>) -> Result<Option<Url>> {
    if let Some(value) = proxy_override.filter(|v| !v.is_empty()) {
        let proxy = Url::parse(value).map_err(|e| CambistError::ProxyOverride {
            value: value.to_string(),
            reason: e.to_string(),
        })?;
        ensure_supported(&proxy)?;
        return Ok(Some(proxy));
    }

    from_env(target, |name| {
        std::env::var(name).ok().filter(|v| !v.is_empty())
    })
}

/// Environment-based resolution with an injectable variable lookup.
fn from_env<F>(target: &Url, lookup: F) -> Result<Option<Url>>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(host) = target.host_str() else {
        return Ok(None);
    };
    if is_loopback(host) {
        return Ok(None);
    }

    let port = target.port_or_known_default();
    let no_proxy = lookup("NO_PROXY").or_else(|| lookup("no_proxy"));
    if let Some(list) = no_proxy
        && bypasses(&list, host, port)
    {
        debug!(host, "proxy bypassed by NO_PROXY");
        return Ok(None);
    }

    let scheme_vars: &[&str] = match target.scheme() {
        "wss" | "https" => &["HTTPS_PROXY", "https_proxy"],
        _ => &["HTTP_PROXY", "http_proxy"],
    };
    let value = scheme_vars
        .iter()
        .chain(["ALL_PROXY", "all_proxy"].iter())
        .copied()
        .find_map(|name| lookup(name));

    let Some(value) = value else {
        return Ok(None);
    };

    let proxy = parse_env_proxy(&value)?;
    ensure_supported(&proxy)?;
    Ok(Some(proxy))
}

/// Parses a proxy address from the environment, assuming `http://` when
/// the value carries no scheme.
fn parse_env_proxy(value: &str) -> Result<Url> {
    let candidate = if value.contains("://") {
        value.to_string()
    } else {
        format!("http://{value}")
    };
    Url::parse(&candidate)
        .map_err(|e| CambistError::Proxy(format!("invalid proxy address {value:?}: {e}")))
}

fn ensure_supported(proxy: &Url) -> Result<()> {
    if proxy.scheme() != "http" {
        return Err(CambistError::Proxy(format!(
            "unsupported proxy scheme {:?}, only http proxies can tunnel",
            proxy.scheme()
        )));
    }
    if proxy.host_str().is_none() {
        return Err(CambistError::Proxy(format!("proxy {proxy} has no host")));
    }
    Ok(())
}

fn is_loopback(host: &str) -> bool {
    if host.eq_ignore_ascii_case("localhost") {
        return true;
    }
    host.trim_start_matches('[')
        .trim_end_matches(']')
        .parse::<IpAddr>()
        .is_ok_and(|ip| ip.is_loopback())
}

/// Matches `host` against a comma-separated `NO_PROXY` list.
///
/// `*` bypasses everything. `example.com` matches the domain and its
/// subdomains, `.example.com` only subdomains. An entry with a port only
/// matches that port.
fn bypasses(list: &str, host: &str, port: Option<u16>) -> bool {
    let host = host.to_ascii_lowercase();
    for raw in list.split(',') {
        let entry = raw.trim().to_ascii_lowercase();
        if entry.is_empty() {
            continue;
        }
        if entry == "*" {
            return true;
        }

        let (pattern, entry_port) = split_port(&entry);
        if let Some(entry_port) = entry_port
            && Some(entry_port) != port
        {
            continue;
        }

        let matched = match pattern.strip_prefix('.') {
            Some(suffix) => host.ends_with(&format!(".{suffix}")),
            None => host == pattern || host.ends_with(&format!(".{pattern}")),
        };
        if matched {
            return true;
        }
    }
    false
}

/// Splits a trailing `:port` off a `NO_PROXY` entry. Bare IPv6 addresses
/// are left whole.
fn split_port(entry: &str) -> (&str, Option<u16>) {
    if entry.starts_with('[') {
        if let Some((addr, rest)) = entry.split_once(']') {
            let port = rest.strip_prefix(':').and_then(|p| p.parse().ok());
            return (&entry[..addr.len() + 1], port);
        }
        return (entry, None);
    }
    match entry.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') => match port.parse() {
            Ok(port) => (host, Some(port)),
            Err(_) => (entry, None),
        },
        _ => (entry, None),
    }
}

/// Opens a TCP connection to `proxy` and asks it to tunnel to
/// `target_host:target_port`.
///
/// # Errors
///
/// Returns [`CambistError::Io`] on socket failure, or
/// [`CambistError::ProxyConnect`] if the proxy answers with a non-2xx status.
pub(crate) async fn tunnel(proxy: &Url, target_host: &str, target_port: u16) -> Result<TcpStream> {
    let proxy_host = proxy
        .host_str()
        .ok_or_else(|| CambistError::Proxy(format!("proxy {proxy} has no host")))?;
    let proxy_port = proxy.port_or_known_default().unwrap_or(80);
    let proxy_addr = format!("{proxy_host}:{proxy_port}");
    info!(proxy = %proxy_addr, "using proxy for websocket handshake");

    let mut stream = TcpStream::connect(&proxy_addr).await?;

    let authority = format!("{target_host}:{target_port}");
    let mut request = format!("CONNECT {authority} HTTP/1.1\r\nHost: {authority}\r\n");
    if !proxy.username().is_empty() {
        let credentials = format!("{}:{}", proxy.username(), proxy.password().unwrap_or(""));
        request.push_str(&format!(
            "Proxy-Authorization: Basic {}\r\n",
            BASE64_STANDARD.encode(credentials)
        ));
    }
    request.push_str("\r\n");
    stream.write_all(request.as_bytes()).await?;

    let head = read_response_head(&mut stream).await?;
    let status_line = head.lines().next().unwrap_or_default().trim().to_string();
    let status = status_line
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse::<u16>().ok());

    match status {
        Some(code) if (200..300).contains(&code) => {
            debug!(proxy = %proxy_addr, target = %authority, "proxy tunnel established");
            Ok(stream)
        }
        _ => Err(CambistError::ProxyConnect {
            status: status_line,
        }),
    }
}

/// Reads the proxy's response up to and including the blank line, one
/// byte at a time so nothing belonging to the tunnelled stream is consumed.
async fn read_response_head(stream: &mut TcpStream) -> Result<String> {
    let mut head = Vec::with_capacity(256);
    while !head.ends_with(b"\r\n\r\n") {
        if head.len() >= MAX_RESPONSE_HEAD {
            return Err(CambistError::Proxy(
                "proxy response head exceeds 8 KiB".to_string(),
            ));
        }
        head.push(stream.read_u8().await?);
    }
    Ok(String::from_utf8_lossy(&head).into_owned())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn override_takes_precedence() {
        let proxy = resolve(
            &url("wss://stream.example.com/ws"),
            Some("http://10.0.0.1:3128"),
        )
        .unwrap()
        .unwrap();
        assert_eq!(proxy.host_str(), Some("10.0.0.1"));
        assert_eq!(proxy.port(), Some(3128));
    }

    #[test]
    fn unparseable_override_names_the_value() {
        let err = resolve(&url("wss://stream.example.com/ws"), Some("not a proxy url"))
            .unwrap_err();
        assert!(matches!(err, CambistError::ProxyOverride { .. }));
        assert!(err.to_string().contains("(not a proxy url)"));
    }

    #[test]
    fn empty_override_falls_back_to_environment() {
        let target = url("wss://127.0.0.1:9443/ws");
        assert!(resolve(&target, Some("")).unwrap().is_none());
    }

    #[test]
    fn socks_override_is_unsupported() {
        let err = resolve(
            &url("wss://stream.example.com/ws"),
            Some("socks5://10.0.0.1:1080"),
        )
        .unwrap_err();
        assert!(err.to_string().contains("unsupported proxy scheme"));
    }

    #[test]
    fn secure_target_uses_https_proxy() {
        let lookup = env(&[
            ("HTTPS_PROXY", "http://secure-proxy:8443"),
            ("HTTP_PROXY", "http://plain-proxy:8080"),
        ]);
        let proxy = from_env(&url("wss://stream.example.com/ws"), &lookup)
            .unwrap()
            .unwrap();
        assert_eq!(proxy.host_str(), Some("secure-proxy"));

        let proxy = from_env(&url("ws://stream.example.com/ws"), &lookup)
            .unwrap()
            .unwrap();
        assert_eq!(proxy.host_str(), Some("plain-proxy"));
    }

    #[test]
    fn lowercase_and_all_proxy_fallbacks() {
        let lookup = env(&[("https_proxy", "http://lower:1")]);
        let proxy = from_env(&url("wss://a.example.com"), &lookup).unwrap().unwrap();
        assert_eq!(proxy.host_str(), Some("lower"));

        let lookup = env(&[("ALL_PROXY", "http://everything:2")]);
        let proxy = from_env(&url("ws://a.example.com"), &lookup).unwrap().unwrap();
        assert_eq!(proxy.host_str(), Some("everything"));
    }

    #[test]
    fn scheme_less_env_value_defaults_to_http() {
        let lookup = env(&[("HTTPS_PROXY", "corp-proxy:3128")]);
        let proxy = from_env(&url("wss://stream.example.com"), &lookup)
            .unwrap()
            .unwrap();
        assert_eq!(proxy.scheme(), "http");
        assert_eq!(proxy.port(), Some(3128));
    }

    #[test]
    fn loopback_is_never_proxied() {
        let lookup = env(&[("HTTP_PROXY", "http://proxy:8080")]);
        assert!(from_env(&url("ws://localhost:9000"), &lookup).unwrap().is_none());
        assert!(from_env(&url("ws://127.0.0.1:9000"), &lookup).unwrap().is_none());
        assert!(from_env(&url("ws://[::1]:9000"), &lookup).unwrap().is_none());
    }

    #[test]
    fn no_proxy_matching() {
        assert!(bypasses("*", "stream.example.com", Some(443)));
        assert!(bypasses("example.com", "example.com", Some(443)));
        assert!(bypasses("example.com", "stream.example.com", Some(443)));
        assert!(!bypasses(".example.com", "example.com", Some(443)));
        assert!(bypasses(".example.com", "stream.example.com", Some(443)));
        assert!(!bypasses("ample.com", "stream.example.com", Some(443)));
        assert!(bypasses("other.org, example.com:443", "example.com", Some(443)));
        assert!(!bypasses("example.com:9443", "example.com", Some(443)));
        assert!(bypasses("10.1.2.3", "10.1.2.3", Some(80)));
    }

    #[test]
    fn no_proxy_env_suppresses_proxy() {
        let lookup = env(&[
            ("HTTPS_PROXY", "http://proxy:8080"),
            ("no_proxy", "internal.example.com"),
        ]);
        assert!(
            from_env(&url("wss://feed.internal.example.com"), &lookup)
                .unwrap()
                .is_none()
        );
        assert!(
            from_env(&url("wss://stream.example.com"), &lookup)
                .unwrap()
                .is_some()
        );
    }

    #[test]
    fn split_port_handles_ipv6() {
        assert_eq!(split_port("[::1]:8080"), ("[::1]", Some(8080)));
        assert_eq!(split_port("::1"), ("::1", None));
        assert_eq!(split_port("host:99"), ("host", Some(99)));
        assert_eq!(split_port("host"), ("host", None));
    }
}
