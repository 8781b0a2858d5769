//! Push events fanned out to every miniserver-facing subscriber.
//!
//! Each event serializes to a JSON frame with a single top-level key
//! (`audio_event`, `roomfavchanged_event`, ...) exactly as the miniserver
//! expects them on the WebSocket.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::zone::groups::GroupRecord;
use crate::zone::status::PlayerStatus;

/// Wire form of one sync group inside `audio_group_changed_event`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupEventEntry {
    pub group: u32,
    pub players: Vec<u32>,
    #[serde(rename = "type")]
    pub kind: String,
}

impl From<&GroupRecord> for GroupEventEntry {
    fn from(record: &GroupRecord) -> Self {
        Self {
            group: record.leader,
            players: record.members.clone(),
            kind: "dynamic".to_string(),
        }
    }
}

/// All events that can be published on the broadcast plane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum PushEvent {
    /// Player status changed for one or more zones.
    AudioEvent { statuses: Vec<PlayerStatus> },

    /// A zone's queue view changed.
    AudioQueueEvent {
        playerid: u32,
        totalitems: u32,
        start: u32,
    },

    /// Sync-group topology changed; carries the full current picture.
    AudioGroupChangedEvent { groups: Vec<GroupEventEntry> },

    /// A zone's favorites file was mutated.
    RoomFavChangedEvent { playerid: u32, count: u32 },

    /// Global search preamble: fresh correlation id plus the literal command.
    GlobalSearchPreamble { id: String, command: String },

    /// Global search result frame with the categorised hits.
    GlobalSearchResult { id: String, results: Value },

    /// Log record mirrored onto the broadcast plane.
    Log {
        level: String,
        message: String,
        target: String,
    },
}

impl PushEvent {
    /// The event type as a string (for logging/filtering).
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::AudioEvent { .. } => "audio_event",
            Self::AudioQueueEvent { .. } => "audio_queue_event",
            Self::AudioGroupChangedEvent { .. } => "audio_group_changed_event",
            Self::RoomFavChangedEvent { .. } => "roomfavchanged_event",
            Self::GlobalSearchPreamble { .. } | Self::GlobalSearchResult { .. } => {
                "globalsearch_result"
            }
            Self::Log { .. } => "log",
        }
    }

    /// Serialize to the single-top-level-key wire frame.
    pub fn to_frame(&self) -> Value {
        match self {
            Self::AudioEvent { statuses } => json!({ "audio_event": statuses }),
            Self::AudioQueueEvent {
                playerid,
                totalitems,
                start,
            } => json!({
                "audio_queue_event": [{
                    "playerid": playerid,
                    "totalitems": totalitems,
                    "start": start,
                }]
            }),
            Self::AudioGroupChangedEvent { groups } => {
                json!({ "audio_group_changed_event": groups })
            }
            Self::RoomFavChangedEvent { playerid, count } => json!({
                "roomfavchanged_event": [{
                    "playerid": playerid,
                    "count": count,
                }]
            }),
            Self::GlobalSearchPreamble { id, command } => json!({
                "globalsearch_result": {
                    "id": id,
                    "command": command,
                }
            }),
            Self::GlobalSearchResult { id, results } => json!({
                "globalsearch_result": {
                    "id": id,
                    "results": results,
                }
            }),
            Self::Log {
                level,
                message,
                target,
            } => json!({
                "log": {
                    "level": level,
                    "message": message,
                    "target": target,
                }
            }),
        }
    }
}
