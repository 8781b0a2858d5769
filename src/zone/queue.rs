//! Playback queue view, replaced atomically per backend update.

use serde::{Deserialize, Serialize};

use crate::zone::status::AudioType;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    pub qindex: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unique_id: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub artist: String,
    #[serde(default)]
    pub album: String,
    /// Canonical URI (§ids), same spelling used everywhere else.
    #[serde(default)]
    pub audiopath: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audiotype: Option<AudioType>,
    #[serde(default)]
    pub coverurl: String,
    #[serde(default)]
    pub duration: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub station: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Queue {
    pub zone_id: u32,
    pub items: Vec<QueueItem>,
    #[serde(default)]
    pub shuffle: bool,
    #[serde(default)]
    pub start: u32,
    #[serde(default)]
    pub totalitems: u32,
}

impl Queue {
    pub fn new(zone_id: u32) -> Self {
        Self {
            zone_id,
            ..Self::default()
        }
    }

    /// Build a queue view from mapped items; `totalitems` reflects the full
    /// count when the window is partial.
    pub fn with_items(zone_id: u32, items: Vec<QueueItem>, start: u32, total: Option<u32>) -> Self {
        let totalitems = total.unwrap_or(items.len() as u32);
        Self {
            zone_id,
            items,
            shuffle: false,
            start,
            totalitems,
        }
    }
}
