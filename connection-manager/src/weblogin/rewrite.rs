//! Header rewriting between the browser, the gateway and the backend login domain.

use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use axum_extra::extract::cookie::Cookie;
use tracing::debug;
use url::Url;

/// Connection-scoped headers that must not cross the proxy.
const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Host without its port: `gateway.example.com:8443` → `gateway.example.com`.
///
/// Bracketed IPv6 hosts keep their brackets: `[::1]:8443` → `[::1]`.
pub fn extract_domain(host: &str) -> &str {
    if host.starts_with('[') {
        return match host.find(']') {
            Some(end) => &host[..=end],
            None => host,
        };
    }
    match host.rfind(':') {
        Some(index) => &host[..index],
        None => host,
    }
}

/// `host[:port]` of a URL, as used in `Host` headers.
pub fn host_with_port(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    }
}

pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

fn set(headers: &mut HeaderMap, name: HeaderName, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.insert(name, value);
    }
}

/// Makes a browser request look as if it was sent to `target` directly.
pub fn remap_request_headers(headers: &mut HeaderMap, target: &Url) {
    let target_host = host_with_port(target);

    if headers.contains_key(header::ORIGIN) {
        set(headers, header::ORIGIN, &format!("{}://{}", target.scheme(), target_host));
    }
    if headers.contains_key(header::REFERER) {
        set(headers, header::REFERER, target.as_str());
    }
    set(headers, header::HOST, &target_host);
    strip_hop_by_hop(headers);
}

/// Makes a backend response look as if it came from the gateway.
pub fn remap_response_headers(headers: &mut HeaderMap, scheme: &str, gateway_host: &str) {
    if headers.contains_key(header::ORIGIN) {
        set(headers, header::ORIGIN, &format!("{}://{}", scheme, gateway_host));
    }
    set(headers, header::HOST, gateway_host);
    headers.remove(header::LINK);
    strip_hop_by_hop(headers);
    rewrite_cookie_domains(headers, extract_domain(gateway_host));
}

/// Points every `Set-Cookie` that names a domain at `domain` instead.
pub fn rewrite_cookie_domains(headers: &mut HeaderMap, domain: &str) {
    let values: Vec<HeaderValue> = headers.get_all(header::SET_COOKIE).iter().cloned().collect();
    if values.is_empty() {
        return;
    }

    headers.remove(header::SET_COOKIE);

    for value in values {
        let rewritten = value
            .to_str()
            .ok()
            .and_then(|raw| Cookie::parse(raw.to_string()).ok())
            .filter(|cookie| cookie.domain().is_some())
            .and_then(|mut cookie| {
                debug!(
                    cookie = %cookie.name(),
                    from = cookie.domain().unwrap_or_default(),
                    to = %domain,
                    "Remapping cookie domain"
                );
                cookie.set_domain(domain.to_string());
                HeaderValue::from_str(&cookie.to_string()).ok()
            });

        headers.append(header::SET_COOKIE, rewritten.unwrap_or(value));
    }
}

/// Cookies set by a backend response.
pub fn response_cookies(headers: &HeaderMap) -> Vec<Cookie<'static>> {
    headers
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|raw| Cookie::parse(raw.to_string()).ok())
        .collect()
}

/// Drops the named cookie from the request `Cookie` header(s).
pub fn strip_request_cookie(headers: &mut HeaderMap, name: &str) {
    let kept: Vec<String> = headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|raw| Cookie::split_parse(raw.to_string()).flatten().collect::<Vec<_>>())
        .filter(|cookie| cookie.name() != name)
        .map(|cookie| format!("{}={}", cookie.name(), cookie.value()))
        .collect();

    headers.remove(header::COOKIE);
    if !kept.is_empty() {
        set(headers, header::COOKIE, &kept.join("; "));
    }
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Page shown to the browser in place of the backend's login completion page.
///
/// Error causes may carry backend response bodies, so both parts are escaped.
pub fn login_page_html(title: &str, message: &str) -> String {
    format!(
        "<html><body><h1>{}</h1><br/>{}</body></html>",
        escape_html(title),
        escape_html(message)
    )
}

/// Multi-line header listing for debug logs.
pub fn dump_headers(headers: &HeaderMap) -> String {
    headers
        .iter()
        .map(|(name, value)| format!("   {} : {}", name, value.to_str().unwrap_or("<binary>")))
        .collect::<Vec<_>>()
        .join("\n")
}
