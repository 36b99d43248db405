//! Clash-style structured documents re-encoded as subscription lines.

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use serde::Deserialize;
use serde_yaml::Value;

use super::decoder::{DecodeError, Decoded};

#[derive(Debug, Deserialize)]
struct ClashDocument {
    proxies: Vec<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct ClashProxy {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    name: Option<String>,
    server: String,
    port: Value,
    #[serde(default)]
    cipher: Option<String>,
    #[serde(default)]
    password: Option<String>,
    #[serde(default)]
    auth: Option<String>,
    #[serde(default)]
    uuid: Option<String>,
    #[serde(default, rename = "alterId")]
    alter_id: Option<Value>,
    #[serde(default)]
    network: Option<String>,
    #[serde(default)]
    tls: Option<bool>,
    #[serde(default)]
    sni: Option<String>,
    #[serde(default)]
    servername: Option<String>,
    #[serde(default)]
    flow: Option<String>,
}

impl ClashProxy {
    fn port(&self) -> Option<u16> {
        match &self.port {
            Value::Number(n) => n.as_u64().and_then(|p| u16::try_from(p).ok()),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    fn authority(&self) -> Option<String> {
        let port = self.port()?;
        let host = self.server.trim();
        if host.contains(':') && !host.starts_with('[') {
            Some(format!("[{host}]:{port}"))
        } else {
            Some(format!("{host}:{port}"))
        }
    }

    fn fragment(&self) -> String {
        self.name.as_deref().map(|n| format!("#{}", urlencoding::encode(n))).unwrap_or_default()
    }

    fn sni(&self) -> Option<&str> {
        self.sni.as_deref().or(self.servername.as_deref())
    }

    fn to_line(&self) -> Option<String> {
        let authority = self.authority()?;
        let fragment = self.fragment();
        match self.kind.to_ascii_lowercase().as_str() {
            "ss" => {
                let userinfo =
                    URL_SAFE_NO_PAD.encode(format!("{}:{}", self.cipher.as_deref()?, self.password.as_deref()?));
                Some(format!("ss://{userinfo}@{authority}{fragment}"))
            }
            "vmess" => {
                let alter_id = match &self.alter_id {
                    Some(Value::Number(n)) => n.as_u64().unwrap_or(0),
                    Some(Value::String(s)) => s.parse().unwrap_or(0),
                    _ => 0,
                };
                let payload = serde_json::json!({
                    "v": "2",
                    "ps": self.name.clone().unwrap_or_default(),
                    "add": self.server.trim(),
                    "port": self.port()?,
                    "id": self.uuid.as_deref()?,
                    "aid": alter_id,
                    "net": self.network.as_deref().unwrap_or("tcp"),
                    "type": "none",
                    "tls": if self.tls.unwrap_or(false) { "tls" } else { "" },
                    "sni": self.sni().unwrap_or_default(),
                });
                Some(format!("vmess://{}", STANDARD.encode(payload.to_string())))
            }
            "vless" => {
                let mut params = vec![
                    "encryption=none".to_string(),
                    format!("security={}", if self.tls.unwrap_or(false) { "tls" } else { "none" }),
                    format!("type={}", self.network.as_deref().unwrap_or("tcp")),
                ];
                if let Some(sni) = self.sni() {
                    params.push(format!("sni={}", urlencoding::encode(sni)));
                }
                if let Some(flow) = &self.flow {
                    params.push(format!("flow={flow}"));
                }
                Some(format!("vless://{}@{authority}?{}{fragment}", self.uuid.as_deref()?, params.join("&")))
            }
            "trojan" | "hysteria2" | "hy2" => {
                let secret = self.password.as_deref().or(self.auth.as_deref())?;
                let scheme = if self.kind.eq_ignore_ascii_case("trojan") { "trojan" } else { "hysteria2" };
                let query = self.sni().map(|s| format!("?sni={}", urlencoding::encode(s))).unwrap_or_default();
                Some(format!("{scheme}://{}@{authority}{query}{fragment}", urlencoding::encode(secret)))
            }
            _ => None,
        }
    }
}

/// Parse a YAML (or JSON) document with a `proxies` sequence.
///
/// Entries of unsupported type or missing required fields are counted in
/// [`Decoded::skipped`].
pub fn decode_document(text: &str) -> Result<Decoded, DecodeError> {
    let document: ClashDocument =
        serde_yaml::from_str(text).map_err(|e| DecodeError::NotStructured(e.to_string()))?;

    let mut decoded = Decoded::default();
    for entry in document.proxies {
        match serde_yaml::from_value::<ClashProxy>(entry).ok().and_then(|p| p.to_line()) {
            Some(line) => decoded.lines.push(line),
            None => decoded.skipped += 1,
        }
    }
    Ok(decoded)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"
port: 7890
proxies:
  - name: "HK 01"
    type: ss
    server: hk.example.net
    port: 8388
    cipher: aes-256-gcm
    password: "p@ss"
  - { name: v1, type: vmess, server: 10.0.0.1, port: "443", uuid: 1B3F0C1A-0000-4000-8000-00000000ABCD, alterId: 0, tls: true }
  - { name: t1, type: trojan, server: tj.example.net, port: 443, password: secret, sni: cdn.example.net }
  - { name: h1, type: hysteria2, server: "2001:db8::1", port: 8443, password: hy }
  - { name: old, type: ssr, server: x.example.net, port: 1, cipher: none, password: x }
"#;

    #[test]
    fn test_document_reencoded() {
        let decoded = decode_document(DOC).unwrap();
        assert_eq!(decoded.lines.len(), 4);
        assert_eq!(decoded.skipped, 1);
        assert!(decoded.lines[0].starts_with("ss://"));
        assert!(decoded.lines[0].ends_with("@hk.example.net:8388#HK%2001"));
        assert!(decoded.lines[1].starts_with("vmess://"));
        assert_eq!(decoded.lines[2], "trojan://secret@tj.example.net:443?sni=cdn.example.net#t1");
        assert_eq!(decoded.lines[3], "hysteria2://hy@[2001:db8::1]:8443#h1");
    }

    #[test]
    fn test_non_documents_rejected() {
        assert!(decode_document("ss://abc@h:1\nvmess://xyz").is_err());
        assert!(decode_document("c3M6Ly9hYmM=").is_err());
        assert!(decode_document("port: 7890\nmode: rule").is_err());
    }

    #[test]
    fn test_json_document_accepted() {
        let json = r#"{"proxies":[{"type":"trojan","server":"a.net","port":443,"password":"pw"}]}"#;
        let decoded = decode_document(json).unwrap();
        assert_eq!(decoded.lines, vec!["trojan://pw@a.net:443".to_string()]);
    }
}
