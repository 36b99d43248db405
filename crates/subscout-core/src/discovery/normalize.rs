//! Subscription URL normalization and extraction from free text.

use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;
use url::Url;

static URL_REGEX: OnceLock<Regex> = OnceLock::new();
static ALNUM_REGEX: OnceLock<Regex> = OnceLock::new();

fn url_regex() -> &'static Regex {
    URL_REGEX.get_or_init(|| {
        Regex::new(r#"https?://[^\s"'<>`\\]+"#).expect("URL regex is valid")
    })
}

fn alnum_regex() -> &'static Regex {
    ALNUM_REGEX.get_or_init(|| Regex::new(r"^[A-Za-z0-9]+$").expect("Alnum regex is valid"))
}

const PLACEHOLDER_HOSTS: [&str; 3] = ["xxxx", "your-provider.com", "example.com"];

fn is_url_safe(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || "-._~:/?#[]@!$&'()*+,;=%".contains(ch)
}

/// Undo HTML entity escaping, including nested `&amp;amp;`.
pub fn html_unescape(input: &str) -> String {
    let mut current = input.to_string();
    for _ in 0..4 {
        let next = current
            .replace("&quot;", "\"")
            .replace("&#39;", "'")
            .replace("&#x27;", "'")
            .replace("&lt;", "<")
            .replace("&gt;", ">")
            .replace("&#x2F;", "/")
            .replace("&#47;", "/")
            .replace("&amp;", "&");
        if next == current {
            break;
        }
        current = next;
    }
    current
}

/// Canonical form of a subscription URL, or `None` if it is not one.
///
/// Keeps scheme, host and path plus the `token` query parameter (required,
/// alphanumeric). Client hints such as `flag=clash` are dropped, so every
/// variant of one subscription maps to the same URL.
pub fn normalize_subscribe_url(raw: &str, signature: &str) -> Option<String> {
    let unescaped = html_unescape(raw.trim());
    let candidate: String = unescaped.chars().take_while(|c| is_url_safe(*c)).collect();
    let candidate = candidate.trim_end_matches(['.', ',', ';', ')', '\'']);

    let parsed = Url::parse(candidate).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return None;
    }
    let host = parsed.host_str()?.to_ascii_lowercase();
    if PLACEHOLDER_HOSTS.iter().any(|p| host.contains(p)) {
        return None;
    }
    if !parsed.path().contains(signature.trim_matches('/')) {
        return None;
    }

    let token = parsed
        .query_pairs()
        .find(|(k, _)| k == "token")
        .map(|(_, v)| v.into_owned())
        .filter(|t| alnum_regex().is_match(t) && !t.eq_ignore_ascii_case("xxxx"))?;

    let authority = match parsed.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host,
    };
    Some(format!("{}://{}{}?token={}", parsed.scheme(), authority, parsed.path(), token))
}

/// Every distinct normalized subscription URL found in `text`.
pub fn extract_subscription_urls(text: &str, signature: &str) -> BTreeSet<String> {
    let unescaped = html_unescape(text);
    url_regex()
        .find_iter(&unescaped)
        .filter_map(|m| normalize_subscribe_url(m.as_str(), signature))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIG: &str = "api/v1/client/subscribe";

    #[test]
    fn test_normalize_keeps_token_only() {
        let url = "https://Panel.Net/api/v1/client/subscribe?flag=clash&utm=x&token=AbC123";
        assert_eq!(
            normalize_subscribe_url(url, SIG).as_deref(),
            Some("https://panel.net/api/v1/client/subscribe?token=AbC123")
        );
    }

    #[test]
    fn test_client_flag_variants_collapse() {
        let text = "https://p.net/api/v1/client/subscribe?token=abc \
            https://p.net/api/v1/client/subscribe?token=abc&flag=clash \
            https://p.net/api/v1/client/subscribe?flag=v2ray&token=abc";
        let urls: Vec<String> = extract_subscription_urls(text, SIG).into_iter().collect();
        assert_eq!(urls, vec!["https://p.net/api/v1/client/subscribe?token=abc".to_string()]);
    }

    #[test]
    fn test_normalize_unescapes_and_trims_garbage() {
        let url = "https://a.net/api/v1/client/subscribe?token=abc123&amp;amp;flag=v2 剩余流量:10GB";
        assert_eq!(
            normalize_subscribe_url(url, SIG).as_deref(),
            Some("https://a.net/api/v1/client/subscribe?token=abc123")
        );
    }

    #[test]
    fn test_normalize_rejects_placeholders_and_bad_tokens() {
        assert!(normalize_subscribe_url("https://xxxx.com/api/v1/client/subscribe?token=abc", SIG).is_none());
        assert!(normalize_subscribe_url("https://a.net/api/v1/client/subscribe?token=xxxx", SIG).is_none());
        assert!(normalize_subscribe_url("https://a.net/api/v1/client/subscribe?token=ab-c", SIG).is_none());
        assert!(normalize_subscribe_url("https://a.net/api/v1/client/subscribe", SIG).is_none());
        assert!(normalize_subscribe_url("https://a.net/other?token=abc", SIG).is_none());
        assert!(normalize_subscribe_url("ftp://a.net/api/v1/client/subscribe?token=abc", SIG).is_none());
    }

    #[test]
    fn test_extract_from_snippet_dedupes() {
        let text = r#"Free nodes: <code>https://b.org/api/v1/client/subscribe?token=T1</code>
            mirror "https://B.org/api/v1/client/subscribe?token=T1" and
            https://c.org:8443/api/v1/client/subscribe?token=T2&amp;flag=meta."#;
        let urls: Vec<String> = extract_subscription_urls(text, SIG).into_iter().collect();
        assert_eq!(
            urls,
            vec![
                "https://b.org/api/v1/client/subscribe?token=T1".to_string(),
                "https://c.org:8443/api/v1/client/subscribe?token=T2".to_string(),
            ]
        );
    }
}
