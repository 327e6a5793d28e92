//! Message envelopes exchanged over the open data channel.
//!
//! Envelopes are small, self-contained JSON text frames; only the initial
//! negotiation bundle is size-sensitive, so nothing here is compressed.
//! `system:ping`/`system:pong` belong to the protocol layer and are never
//! surfaced to the application.

use serde::{Deserialize, Serialize};

/// Synchronized display configuration.
///
/// The remote is the single writer; viewers only apply what they receive.
/// The state outlives any one peer session and is re-sent in full after a
/// reconnect, which is how a refreshed viewer recovers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigState {
    pub brightness: u8,
    pub contrast: u8,
    pub overlay: OverlayMode,
    pub color: AccentColor,
    pub label: String,
    pub annotations: String,
}

impl Default for ConfigState {
    fn default() -> Self {
        Self {
            brightness: 60,
            contrast: 40,
            overlay: OverlayMode::Grid,
            color: AccentColor::Cyan,
            label: "Remote Control".to_string(),
            annotations: "Double-check camera framing before going live.".to_string(),
        }
    }
}

impl ConfigState {
    /// Merge a partial delta: only keys present in the delta change, and
    /// numeric fields are clamped to the 0-100 range.
    pub fn apply(&mut self, delta: &ConfigDelta) {
        if let Some(brightness) = delta.brightness {
            self.brightness = brightness.min(100);
        }
        if let Some(contrast) = delta.contrast {
            self.contrast = contrast.min(100);
        }
        if let Some(overlay) = delta.overlay {
            self.overlay = overlay;
        }
        if let Some(color) = delta.color {
            self.color = color;
        }
        if let Some(label) = &delta.label {
            self.label = label.clone();
        }
        if let Some(annotations) = &delta.annotations {
            self.annotations = annotations.clone();
        }
    }
}

/// Partial config patch; absent keys leave the receiver's value untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brightness: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contrast: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overlay: Option<OverlayMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<AccentColor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlayMode {
    Grid,
    Crosshair,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccentColor {
    Cyan,
    Purple,
    Amber,
    Lime,
    Red,
}

/// One discriminated message unit on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Envelope {
    /// Partial config patch, remote to viewer.
    #[serde(rename = "config:update")]
    ConfigUpdate { delta: ConfigDelta },
    /// Full config replacement, remote to viewer.
    #[serde(rename = "config:replace")]
    ConfigReplace { full: ConfigState },
    /// Informational free-text event, viewer to remote.
    #[serde(rename = "viewer:event")]
    ViewerEvent { event: String },
    /// Liveness probe, protocol-internal.
    #[serde(rename = "system:ping")]
    Ping,
    /// Liveness reply, protocol-internal.
    #[serde(rename = "system:pong")]
    Pong,
}

impl Envelope {
    /// Serialize to a wire frame.
    pub fn to_frame(&self) -> String {
        serde_json::to_string(self).expect("envelope serialization is infallible")
    }

    /// Parse a wire frame.
    pub fn from_frame(frame: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(frame)
    }

    /// The immediate protocol-layer reply this envelope demands, if any.
    pub fn reply(&self) -> Option<Envelope> {
        match self {
            Envelope::Ping => Some(Envelope::Pong),
            _ => None,
        }
    }

    /// Whether the envelope is consumed by the protocol layer and never
    /// handed to the application.
    pub fn is_system(&self) -> bool {
        matches!(self, Envelope::Ping | Envelope::Pong)
    }
}
