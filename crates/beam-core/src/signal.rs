//! Transportable signal codec for negotiation bundles.
//!
//! A serialized signal is `<tag>:<payload>`. Three generations exist:
//! - `d:` deflate-compressed JSON, base64url without padding (current)
//! - `l:` lz-string-style textual compression (fallback when deflate fails)
//! - no tag: plain standard-base64 JSON (legacy, always accepted)
//!
//! Compression is a size optimization for narrow channels (QR codes,
//! clipboard, URL query strings), never a correctness requirement. Decode
//! dispatches strictly on the tag and falls back to the legacy form before
//! giving up.

use std::io::Write as _;

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine as _;
use flate2::write::{DeflateDecoder, DeflateEncoder};
use flate2::Compression;
use serde::{Deserialize, Serialize};

const TAG_DEFLATE: &str = "d:";
const TAG_LZ: &str = "l:";

/// One negotiation step's worth of connectivity information: the local
/// description plus every candidate gathered for it.
///
/// An empty candidate list is legal (restrictive network, or gathering cut
/// off by the timeout) and must round-trip as empty, not absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalBundle {
    pub description: SessionDescription,
    pub candidates: Vec<CandidateInit>,
}

/// An SDP offer or answer, serialized as `{"type": "...", "sdp": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpKind,
    pub sdp: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    Offer,
    Answer,
}

/// ICE candidate init fields, mirroring the standard JSON shape so bundles
/// interoperate with browser peers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateInit {
    pub candidate: String,
    #[serde(rename = "sdpMid", default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(
        rename = "sdpMLineIndex",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub sdp_mline_index: Option<u16>,
    #[serde(
        rename = "usernameFragment",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub username_fragment: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("bundle serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("payload did not inflate: {0}")]
    Inflate(#[source] std::io::Error),
    #[error("lz payload did not decompress")]
    Lz,
    #[error("decompressed payload is not valid utf-16 text")]
    Utf16(#[from] std::string::FromUtf16Error),
    #[error("invalid bundle json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Encode a bundle into its transportable string form.
///
/// The deflate generation is preferred; if it fails for any reason the
/// lz-string generation is emitted instead, so encoding succeeds whenever the
/// bundle itself serializes.
pub fn encode(bundle: &SignalBundle) -> Result<String, EncodeError> {
    let json = serde_json::to_string(bundle)?;
    match encode_deflate(json.as_bytes()) {
        Ok(payload) => Ok(format!("{TAG_DEFLATE}{payload}")),
        Err(_) => Ok(format!("{TAG_LZ}{}", encode_lz(&json))),
    }
}

/// Decode any supported signal generation.
pub fn decode(signal: &str) -> Result<SignalBundle, DecodeError> {
    if let Some(payload) = signal.strip_prefix(TAG_DEFLATE) {
        let compressed = URL_SAFE_NO_PAD.decode(payload)?;
        let json = inflate(&compressed)?;
        return Ok(serde_json::from_slice(&json)?);
    }
    if let Some(payload) = signal.strip_prefix(TAG_LZ) {
        let wide = lz_str::decompress_from_base64(payload).ok_or(DecodeError::Lz)?;
        let json = String::from_utf16(&wide)?;
        return Ok(serde_json::from_str(&json)?);
    }
    // Legacy untagged generation: the whole string is standard base64 JSON.
    let json = STANDARD.decode(signal)?;
    Ok(serde_json::from_slice(&json)?)
}

fn encode_deflate(json: &[u8]) -> std::io::Result<String> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(json)?;
    let compressed = encoder.finish()?;
    Ok(URL_SAFE_NO_PAD.encode(compressed))
}

fn encode_lz(json: &str) -> String {
    lz_str::compress_to_base64(json)
}

fn inflate(compressed: &[u8]) -> Result<Vec<u8>, DecodeError> {
    let mut decoder = DeflateDecoder::new(Vec::new());
    decoder
        .write_all(compressed)
        .map_err(DecodeError::Inflate)?;
    decoder.finish().map_err(DecodeError::Inflate)
}
