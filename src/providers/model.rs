//! Response model shared by every media provider.
//!
//! Field names match the miniserver wire (`totalitems`, `coverurl`,
//! `audiopath`, ...). Every item carries the canonical id grammar so the
//! router and favorites store can hand ids straight back to providers.

use serde::{Deserialize, Serialize};

use crate::zone::status::AudioType;

/// A radio "service" root shown in the radios menu.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RadioEntry {
    /// Service command key (e.g. `local`, `custom`, `tunein`).
    pub cmd: String,
    pub name: String,
    #[serde(default)]
    pub icon: String,
    /// Root folder id to browse for this service.
    #[serde(default)]
    pub root: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FolderItemKind {
    #[default]
    Folder,
    Station,
}

/// One entry inside a radio service folder.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RadioFolderItem {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: FolderItemKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub station: Option<String>,
    #[serde(default)]
    pub audiopath: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coverurl: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FolderResponse {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub service: String,
    pub start: u32,
    pub totalitems: u32,
    pub items: Vec<RadioFolderItem>,
}

impl FolderResponse {
    /// Empty response echoing the request, used for lookup misses.
    pub fn empty(service: &str, folder_id: &str, offset: u32) -> Self {
        Self {
            id: folder_id.to_string(),
            name: String::new(),
            service: service.to_string(),
            start: offset,
            totalitems: 0,
            items: Vec::new(),
        }
    }
}

/// A playlist in the playlists menu (also used for playlist children).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlaylistItem {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub audiopath: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coverurl: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlaylistResponse {
    pub id: String,
    pub name: String,
    pub start: u32,
    pub totalitems: u32,
    pub items: Vec<PlaylistItem>,
}

impl PlaylistResponse {
    pub fn empty(id: &str, offset: u32) -> Self {
        Self {
            id: id.to_string(),
            name: String::new(),
            start: offset,
            totalitems: 0,
            items: Vec::new(),
        }
    }
}

/// Media kinds surfaced by the library browser.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    #[default]
    Folder,
    Album,
    Artist,
    Track,
    Playlist,
    Radio,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Folder => "folder",
            Self::Album => "album",
            Self::Artist => "artist",
            Self::Track => "track",
            Self::Playlist => "playlist",
            Self::Radio => "radio",
        }
    }
}

/// One entry inside a library folder.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaFolderItem {
    /// Canonical id (`library:<provider>:<kind>:<id>`).
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: MediaKind,
    #[serde(default)]
    pub audiopath: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coverurl: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaFolderResponse {
    pub id: String,
    pub name: String,
    pub start: u32,
    pub totalitems: u32,
    pub items: Vec<MediaFolderItem>,
}

impl MediaFolderResponse {
    pub fn empty(folder_id: &str, offset: u32) -> Self {
        Self {
            id: folder_id.to_string(),
            name: String::new(),
            start: offset,
            totalitems: 0,
            items: Vec::new(),
        }
    }
}

/// Favorite-shaped entry as returned by providers (no slot/id assignment;
/// the store adds those).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FavoriteEntry {
    pub name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub artist: String,
    #[serde(default)]
    pub album: String,
    #[serde(default)]
    pub coverurl: String,
    /// Must be non-empty or the entry is dropped by the mapper.
    pub audiopath: String,
    #[serde(rename = "type", default)]
    pub audiotype: AudioType,
    #[serde(default)]
    pub service: String,
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub raw_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub station: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FavoriteResponse {
    pub start: u32,
    pub totalitems: u32,
    pub items: Vec<FavoriteEntry>,
}

impl FavoriteResponse {
    pub fn empty(offset: u32) -> Self {
        Self {
            start: offset,
            totalitems: 0,
            items: Vec::new(),
        }
    }
}

/// Recently played entries, newest first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecentEntry {
    pub audiopath: String,
    pub name: String,
    #[serde(default)]
    pub artist: String,
    #[serde(default)]
    pub coverurl: String,
    #[serde(rename = "type", default)]
    pub audiotype: AudioType,
    /// Milliseconds since epoch.
    pub played_at: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecentResponse {
    pub totalitems: u32,
    pub items: Vec<RecentEntry>,
}

/// One category section of a global search result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchSection {
    pub category: String,
    pub totalitems: u32,
    pub items: Vec<MediaFolderItem>,
    /// Browse link for "more"; a section with a link is kept even when empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub sections: Vec<SearchSection>,
}
