//! Declarative per-zone capability matrix.
//!
//! Five capability kinds, each either unsupported, handled natively by the
//! backend, or routed through a content adapter.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapabilityLevel {
    #[default]
    None,
    Native,
    Adapter,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityMatrix {
    /// Transport control: play/pause/stop/position/volume.
    pub control: CapabilityLevel,
    /// Content playback: serviceplay/playlistplay/libraryplay.
    pub content: CapabilityLevel,
    /// Sync-group membership.
    pub grouping: CapabilityLevel,
    /// Alert playback (doorbell, alarm).
    pub alerts: CapabilityLevel,
    /// Text-to-speech announcements.
    pub tts: CapabilityLevel,
}

impl CapabilityMatrix {
    /// Matrix for a zone with no configured backend.
    pub fn unconfigured() -> Self {
        Self::default()
    }

    /// Music Assistant backend: everything native.
    pub fn musicassistant() -> Self {
        Self {
            control: CapabilityLevel::Native,
            content: CapabilityLevel::Native,
            grouping: CapabilityLevel::Native,
            alerts: CapabilityLevel::Native,
            tts: CapabilityLevel::Native,
        }
    }

    /// BeoLink backend: transport is native, content and announcements go
    /// through an adapter, grouping is not exposed.
    pub fn beolink() -> Self {
        Self {
            control: CapabilityLevel::Native,
            content: CapabilityLevel::Adapter,
            grouping: CapabilityLevel::None,
            alerts: CapabilityLevel::Adapter,
            tts: CapabilityLevel::Adapter,
        }
    }

    pub fn supports_grouping(&self) -> bool {
        self.grouping != CapabilityLevel::None
    }

    pub fn supports_content(&self) -> bool {
        self.content != CapabilityLevel::None
    }
}
