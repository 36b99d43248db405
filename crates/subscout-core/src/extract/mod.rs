//! NodeExtractor/Classifier.
//!
//! Decodes a subscription body (structured document → base64 → plain text,
//! first decoder yielding a valid node wins), classifies each line by scheme
//! and canonicalizes it into a [`CanonicalKey`](subscout_types::CanonicalKey).

mod canonical;
mod clash;
mod decoder;
pub mod traffic;

pub use canonical::{canonicalize, Canonical};
pub use decoder::{decode_base64_lenient, DecodeError, DecoderKind, DECODE_ORDER};

use std::collections::BTreeMap;
use subscout_types::{PipelineError, Protocol, ProxyNode, TrafficInfo};
use tracing::debug;

/// Nodes and diagnostics extracted from one body.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub nodes: Vec<ProxyNode>,
    /// Decoder that produced `nodes`; `None` when nothing decoded to a node
    pub decoder: Option<DecoderKind>,
    /// Lines with an unsupported scheme (counted, not errors)
    pub discarded: usize,
    /// Supported-scheme lines that failed canonicalization
    pub malformed: Vec<PipelineError>,
    /// Traffic metadata found in the decoded text and node names
    pub traffic: TrafficInfo,
}

impl Extraction {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Total lines the accepted decoder produced.
    pub fn lines_seen(&self) -> usize {
        self.nodes.len() + self.discarded + self.malformed.len()
    }

    pub fn protocol_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for node in &self.nodes {
            *counts.entry(node.protocol().to_string()).or_insert(0) += 1;
        }
        counts
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NodeExtractor;

impl NodeExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Extract every node from `body`. Never fails; an empty result means no
    /// decoder produced a valid node line.
    pub fn extract(&self, body: &[u8], source_url: &str) -> Extraction {
        let text = String::from_utf8_lossy(body);
        let text = text.trim_start_matches('\u{feff}');

        let mut fallback = Extraction::default();
        for kind in DECODE_ORDER {
            let decoded = match kind.decode(text) {
                Ok(decoded) => decoded,
                Err(e) => {
                    debug!(url = source_url, decoder = ?kind, "Decoder declined: {}", e);
                    continue;
                }
            };

            let mut extraction = self.classify_lines(&decoded.lines, source_url);
            extraction.discarded += decoded.skipped;
            if !extraction.nodes.is_empty() {
                extraction.decoder = Some(kind);
                extraction.traffic = traffic::scan_text(&scan_corpus(&decoded.lines, &extraction));
                debug!(
                    url = source_url,
                    decoder = ?kind,
                    "Extracted {} node(s), {} discarded, {} malformed",
                    extraction.nodes.len(),
                    extraction.discarded,
                    extraction.malformed.len()
                );
                return extraction;
            }
            if extraction.lines_seen() > fallback.lines_seen() {
                fallback = extraction;
            }
        }
        fallback.traffic = traffic::scan_text(text);
        fallback
    }

    fn classify_lines(&self, lines: &[String], source_url: &str) -> Extraction {
        let mut extraction = Extraction::default();
        for line in lines {
            let protocol = Protocol::classify_line(line);
            if protocol == Protocol::Unknown {
                extraction.discarded += 1;
                continue;
            }
            match canonicalize(protocol, line) {
                Ok(Canonical { key, name }) => extraction.nodes.push(ProxyNode {
                    key,
                    source_url: source_url.to_string(),
                    raw: line.clone(),
                    name,
                }),
                Err(reason) => extraction.malformed.push(PipelineError::MalformedNodeLine {
                    protocol: protocol.to_string(),
                    reason,
                }),
            }
        }
        extraction
    }
}

/// Decoded lines that are not nodes plus every node name; providers put
/// their quota banners in either place.
fn scan_corpus(lines: &[String], extraction: &Extraction) -> String {
    let mut corpus: Vec<&str> = lines
        .iter()
        .filter(|l| Protocol::classify_line(l) == Protocol::Unknown)
        .map(String::as_str)
        .collect();
    corpus.extend(extraction.nodes.iter().filter_map(|n| n.name.as_deref()));
    corpus.join("\n")
}
