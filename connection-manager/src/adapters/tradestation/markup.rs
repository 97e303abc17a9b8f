//! Narrow scraping of the Tradestation sign-in pages.
//!
//! Only two things are ever read from HTML: the base64 login configuration
//! embedded in the first attribute-less `<script>`, and the hidden form
//! inputs (`wa`, `wresult`, `wctx`) returned after credentials are posted.

use regex::Regex;
use std::sync::LazyLock;

static BARE_SCRIPT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<script>(.*?)</script>").expect("valid regex"));

static QUOTED_BASE64: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"'([A-Za-z0-9+/]{8,}={0,2})'").expect("valid regex"));

static INPUT_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<input\b([^>]*)>").expect("valid regex"));

static ATTRIBUTE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?s)([A-Za-z_:][-A-Za-z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("valid regex"));

/// Hidden inputs of the form posted back to the login callback.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct LoginResult {
    pub wa: String,
    pub wresult: String,
    pub wctx: String,
}

/// Returns the quoted base64 blob of the first `<script>` without attributes.
pub fn extract_encoded_config(html: &str) -> Option<String> {
    let script = BARE_SCRIPT.captures(html)?.get(1)?.as_str();
    QUOTED_BASE64
        .captures(script)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Collects the `wa`, `wresult` and `wctx` input values.
pub fn extract_login_result(html: &str) -> LoginResult {
    let mut result = LoginResult::default();

    for tag in INPUT_TAG.captures_iter(html) {
        let attributes = tag.get(1).map_or("", |m| m.as_str());
        let mut name = None;
        let mut value = String::new();

        for attr in ATTRIBUTE.captures_iter(attributes) {
            let raw = attr.get(2).or_else(|| attr.get(3)).map_or("", |m| m.as_str());
            match &attr[1] {
                "name" => name = Some(raw.to_string()),
                "value" => value = decode_entities(raw),
                _ => {}
            }
        }

        match name.as_deref() {
            Some("wa") => result.wa = value,
            Some("wresult") => result.wresult = value,
            Some("wctx") => result.wctx = value,
            _ => {}
        }
    }

    result
}

/// Decodes the character references that appear in attribute values.
fn decode_entities(value: &str) -> String {
    if !value.contains('&') {
        return value.to_string();
    }

    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let candidate = &rest[start..];

        let decoded = candidate.find(';').and_then(|end| {
            let entity = &candidate[1..end];
            let ch = match entity {
                "quot" => Some('"'),
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "apos" => Some('\''),
                _ if entity.starts_with("#x") || entity.starts_with("#X") => {
                    u32::from_str_radix(&entity[2..], 16).ok().and_then(char::from_u32)
                }
                _ if entity.starts_with('#') => entity[1..].parse().ok().and_then(char::from_u32),
                _ => None,
            };
            ch.map(|c| (c, end))
        });

        match decoded {
            Some((c, end)) => {
                out.push(c);
                rest = &candidate[end + 1..];
            }
            None => {
                out.push('&');
                rest = &candidate[1..];
            }
        }
    }

    out.push_str(rest);
    out
}
