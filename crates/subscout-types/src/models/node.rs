//! Proxy node records and their canonical identity.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Protocol class of a node line, derived from its URI scheme.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Ss,
    Vmess,
    Vless,
    Trojan,
    Hysteria2,
    #[default]
    Unknown,
}

impl Protocol {
    /// All supported protocols, in reporting order.
    pub const SUPPORTED: [Protocol; 5] =
        [Protocol::Ss, Protocol::Vmess, Protocol::Vless, Protocol::Trojan, Protocol::Hysteria2];

    /// Classify by URI scheme (case-insensitive). `hy2` aliases `hysteria2`.
    pub fn from_scheme(scheme: &str) -> Self {
        match scheme.to_ascii_lowercase().as_str() {
            "ss" => Protocol::Ss,
            "vmess" => Protocol::Vmess,
            "vless" => Protocol::Vless,
            "trojan" => Protocol::Trojan,
            "hysteria2" | "hy2" => Protocol::Hysteria2,
            _ => Protocol::Unknown,
        }
    }

    /// Classify a raw node line by its `scheme://` prefix.
    pub fn classify_line(line: &str) -> Self {
        line.split_once("://").map_or(Protocol::Unknown, |(scheme, _)| Self::from_scheme(scheme))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Ss => "ss",
            Protocol::Vmess => "vmess",
            Protocol::Vless => "vless",
            Protocol::Trojan => "trojan",
            Protocol::Hysteria2 => "hysteria2",
            Protocol::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deduplication identity of a node: `(protocol, host, port, identifier)`.
///
/// Two nodes with equal keys are duplicates regardless of surface encoding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CanonicalKey {
    pub protocol: Protocol,
    pub host: String,
    pub port: u16,
    pub identifier: String,
}

impl fmt::Display for CanonicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}|{}|{}", self.protocol, self.host, self.port, self.identifier)
    }
}

/// One proxy node extracted from a subscription body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProxyNode {
    pub key: CanonicalKey,
    /// Originating subscription URL
    pub source_url: String,
    /// Line in the canonical subscription line format
    pub raw: String,
    /// Display name (URI fragment or `ps` field)
    #[serde(default)]
    pub name: Option<String>,
}

impl ProxyNode {
    pub fn protocol(&self) -> Protocol {
        self.key.protocol
    }
}
