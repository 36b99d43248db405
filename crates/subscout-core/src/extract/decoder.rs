//! Body decoders, tried in a fixed priority order.

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use serde::Serialize;
use thiserror::Error;

use super::clash;

const LENIENT: GeneralPurposeConfig = GeneralPurposeConfig::new()
    .with_decode_padding_mode(DecodePaddingMode::Indifferent)
    .with_decode_allow_trailing_bits(true);

const LENIENT_STANDARD: GeneralPurpose = GeneralPurpose::new(&alphabet::STANDARD, LENIENT);
const LENIENT_URL_SAFE: GeneralPurpose = GeneralPurpose::new(&alphabet::URL_SAFE, LENIENT);

/// Decoding strategy for a subscription body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DecoderKind {
    /// Clash-style YAML/JSON document with a `proxies` sequence
    Structured,
    /// Base64 blob of newline-separated node lines
    Base64,
    /// Newline-separated node lines
    PlainText,
}

/// Priority order in which decoders are attempted.
pub const DECODE_ORDER: [DecoderKind; 3] =
    [DecoderKind::Structured, DecoderKind::Base64, DecoderKind::PlainText];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("not a structured proxy document: {0}")]
    NotStructured(String),
    #[error("not a base64 payload")]
    NotBase64,
    #[error("decoded payload is not UTF-8")]
    NotUtf8,
    #[error("no lines")]
    Empty,
}

/// Lines produced by one decoder.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Decoded {
    pub lines: Vec<String>,
    /// Entries the decoder recognised but cannot express as node lines
    pub skipped: usize,
}

impl DecoderKind {
    pub fn decode(self, text: &str) -> Result<Decoded, DecodeError> {
        let decoded = match self {
            DecoderKind::Structured => clash::decode_document(text)?,
            DecoderKind::Base64 => {
                let bytes = decode_base64_lenient(text).ok_or(DecodeError::NotBase64)?;
                let inner = String::from_utf8(bytes).map_err(|_| DecodeError::NotUtf8)?;
                Decoded { lines: split_lines(&inner), skipped: 0 }
            }
            DecoderKind::PlainText => Decoded { lines: split_lines(text), skipped: 0 },
        };
        if decoded.lines.is_empty() && decoded.skipped == 0 {
            return Err(DecodeError::Empty);
        }
        Ok(decoded)
    }
}

fn split_lines(text: &str) -> Vec<String> {
    text.split(['\n', '\r'])
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

/// Decode base64 that may lack padding, contain whitespace, or use the
/// URL-safe alphabet.
pub fn decode_base64_lenient(input: &str) -> Option<Vec<u8>> {
    let compact: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        return None;
    }
    if compact.contains(['-', '_']) {
        LENIENT_URL_SAFE.decode(compact.as_bytes()).ok()
    } else {
        LENIENT_STANDARD.decode(compact.as_bytes()).ok()
    }
}
