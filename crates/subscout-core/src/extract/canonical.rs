//! Per-protocol canonicalization of node lines.
//!
//! Each rule extracts `(host, port, identifier)` independent of surface
//! formatting: base64 padding and alphabet, query parameter order, host case,
//! IPv6 brackets and display names never affect the key.

use serde::Deserialize;
use serde_json::Value;
use subscout_types::{CanonicalKey, Protocol};

use super::decoder::decode_base64_lenient;

const HYSTERIA2_DEFAULT_PORT: u16 = 443;

/// A canonicalized node line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Canonical {
    pub key: CanonicalKey,
    pub name: Option<String>,
}

/// Canonicalize one line whose protocol is already known to be supported.
pub fn canonicalize(protocol: Protocol, line: &str) -> Result<Canonical, String> {
    let (_, rest) = line.split_once("://").ok_or("missing scheme separator")?;
    let (body, name) = split_fragment(rest);
    let body = body.split('?').next().unwrap_or_default();

    let (host, port, identifier, name) = match protocol {
        Protocol::Ss => {
            let (h, p, id) = shadowsocks(body)?;
            (h, p, id, name)
        }
        Protocol::Vmess => vmess(body, name)?,
        Protocol::Vless => {
            let (userinfo, hostport) = split_userinfo(body)?;
            let (h, p) = host_port(hostport, None)?;
            (h, p, uuid(&percent_decode(userinfo))?, name)
        }
        Protocol::Trojan => {
            let (userinfo, hostport) = split_userinfo(body)?;
            let (h, p) = host_port(hostport, None)?;
            let password = percent_decode(userinfo);
            if password.is_empty() {
                return Err("empty password".to_string());
            }
            (h, p, password, name)
        }
        Protocol::Hysteria2 => {
            let (userinfo, hostport) = split_userinfo(body)?;
            let (h, p) = host_port(hostport, Some(HYSTERIA2_DEFAULT_PORT))?;
            (h, p, percent_decode(userinfo), name)
        }
        Protocol::Unknown => return Err("unsupported protocol".to_string()),
    };

    Ok(Canonical { key: CanonicalKey { protocol, host, port, identifier }, name })
}

fn percent_decode(input: &str) -> String {
    urlencoding::decode(input).map_or_else(|_| input.to_string(), |s| s.into_owned())
}

fn split_fragment(rest: &str) -> (&str, Option<String>) {
    match rest.split_once('#') {
        Some((body, fragment)) if !fragment.trim().is_empty() => {
            (body, Some(percent_decode(fragment.trim())))
        }
        Some((body, _)) => (body, None),
        None => (rest, None),
    }
}

fn split_userinfo(body: &str) -> Result<(&str, &str), String> {
    body.rsplit_once('@').ok_or_else(|| "missing userinfo".to_string())
}

fn normalize_host(raw: &str) -> Result<String, String> {
    let host = raw.trim().trim_start_matches('[').trim_end_matches(']').trim_end_matches('.');
    if host.is_empty() || host.contains(char::is_whitespace) {
        return Err(format!("invalid host '{raw}'"));
    }
    Ok(host.to_ascii_lowercase())
}

fn parse_port(raw: &str) -> Result<u16, String> {
    // Port lists ("443,8443") and ranges ("20000-30000") use their first port.
    let first = raw.split([',', '-']).next().unwrap_or_default().trim();
    match first.parse::<u16>() {
        Ok(0) | Err(_) => Err(format!("invalid port '{raw}'")),
        Ok(port) => Ok(port),
    }
}

/// Split `host:port`, `[v6]:port`, optionally followed by a `/path`.
fn host_port(raw: &str, default_port: Option<u16>) -> Result<(String, u16), String> {
    let raw = raw.split('/').next().unwrap_or_default();
    if let Some(inner) = raw.strip_prefix('[') {
        let (host, after) = inner.split_once(']').ok_or("unterminated IPv6 literal")?;
        let port = match after.strip_prefix(':') {
            Some(p) => parse_port(p)?,
            None => default_port.ok_or("missing port")?,
        };
        return Ok((normalize_host(host)?, port));
    }
    match raw.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') => Ok((normalize_host(host)?, parse_port(port)?)),
        Some(_) => Err("ambiguous IPv6 host without brackets".to_string()),
        None => Ok((normalize_host(raw)?, default_port.ok_or("missing port")?)),
    }
}

fn uuid(raw: &str) -> Result<String, String> {
    let id = raw.trim().to_ascii_lowercase();
    if id.is_empty() || !id.chars().all(|c| c.is_ascii_hexdigit() || c == '-') {
        return Err(format!("invalid id '{raw}'"));
    }
    Ok(id)
}

fn method_password(decoded: &str) -> Result<String, String> {
    let (method, password) = decoded.split_once(':').ok_or("missing method:password")?;
    if method.is_empty() || password.is_empty() {
        return Err("empty method or password".to_string());
    }
    Ok(format!("{}:{}", method.to_ascii_lowercase(), password))
}

fn decode_text(input: &str) -> Result<String, String> {
    let bytes = decode_base64_lenient(input).ok_or("invalid base64")?;
    String::from_utf8(bytes).map_err(|_| "base64 payload is not UTF-8".to_string())
}

fn shadowsocks(body: &str) -> Result<(String, u16, String), String> {
    if let Some((userinfo, hostport)) = body.rsplit_once('@') {
        // SIP002: userinfo is base64(method:password), or plain when percent-encoded.
        let userinfo = percent_decode(userinfo);
        let credentials =
            if userinfo.contains(':') { userinfo } else { decode_text(&userinfo)? };
        let (host, port) = host_port(hostport, None)?;
        return Ok((host, port, method_password(&credentials)?));
    }

    // Legacy: base64(method:password@host:port)
    let decoded = decode_text(body.trim_end_matches('/'))?;
    let (credentials, hostport) = decoded.rsplit_once('@').ok_or("missing host in legacy form")?;
    let (host, port) = host_port(hostport, None)?;
    Ok((host, port, method_password(credentials)?))
}

#[derive(Debug, Deserialize)]
struct VmessPayload {
    add: String,
    port: Value,
    id: String,
    #[serde(default)]
    ps: Option<String>,
}

fn vmess(
    body: &str,
    name: Option<String>,
) -> Result<(String, u16, String, Option<String>), String> {
    if body.contains('@') {
        let (userinfo, hostport) = split_userinfo(body)?;
        let (host, port) = host_port(hostport, None)?;
        return Ok((host, port, uuid(&percent_decode(userinfo))?, name));
    }

    let json = decode_text(body)?;
    let payload: VmessPayload =
        serde_json::from_str(&json).map_err(|e| format!("invalid vmess JSON: {e}"))?;
    let port = match &payload.port {
        Value::Number(n) => n
            .as_u64()
            .and_then(|p| u16::try_from(p).ok())
            .filter(|p| *p > 0)
            .ok_or_else(|| format!("invalid port {n}"))?,
        Value::String(s) => parse_port(s)?,
        other => return Err(format!("invalid port {other}")),
    };
    let name = payload.ps.filter(|s| !s.trim().is_empty()).or(name);
    Ok((normalize_host(&payload.add)?, port, uuid(&payload.id)?, name))
}
