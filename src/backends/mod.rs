//! Per-zone backend drivers.
//!
//! Each driver owns the connection to one speaker family and translates
//! normalized zone commands to vendor RPC. Drivers push partial status,
//! queue, and group-topology updates to the zone manager through a bounded
//! channel; the manager owns merging and broadcasting.

pub mod beolink;
pub mod musicassistant;
pub mod null;
pub mod rpc;

pub use beolink::BeolinkBackend;
pub use musicassistant::MusicAssistantBackend;
pub use null::NullBackend;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::config::ZoneConfig;
use crate::zone::queue::Queue;
use crate::zone::status::{PlayerStatus, RepeatMode};

/// Backend kinds accepted in zone configs.
pub const KNOWN_BACKENDS: &[&str] = &["musicassistant", "beolink"];

/// Default probe deadline for vendor RPC endpoints.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(4);
/// Probe deadline for plain HTTP vendor endpoints.
pub const HTTP_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Normalized per-zone command after router parsing. Volume and shuffle
/// coercions happen before a command reaches a driver.
#[derive(Debug, Clone, PartialEq)]
pub enum ZoneCommand {
    Play,
    Resume,
    Pause,
    Stop,
    QueuePlus,
    QueueMinus,
    QueuePlayIndex(u32),
    /// Seek, seconds from track start.
    Position(f64),
    /// Absolute target volume, already clamped to 0..100.
    SetVolume(i32),
    SetShuffle(bool),
    SetRepeat(RepeatMode),
    /// This zone becomes (or extends) the leader of a group. Entries are
    /// `(zone_id, vendor player id)` resolved by the manager.
    GroupJoin { members: Vec<(u32, String)> },
    /// Remove the given members from this zone's group.
    GroupLeave { members: Vec<(u32, String)> },
    /// Play a station/service URI (canonical grammar).
    ServicePlay { uri: String },
    /// Play a playlist command URI.
    PlaylistPlay { uri: String },
    /// Play a library item URI.
    LibraryPlay { uri: String },
    /// Short alert/TTS playback that interrupts and resumes.
    Announce { url: String, volume: Option<i32> },
    /// Switch to an auxiliary input.
    LineIn(String),
}

impl ZoneCommand {
    /// Verb name used in logs and adapter capability declarations.
    pub fn verb(&self) -> &'static str {
        match self {
            Self::Play => "play",
            Self::Resume => "resume",
            Self::Pause => "pause",
            Self::Stop => "stop",
            Self::QueuePlus => "queueplus",
            Self::QueueMinus => "queueminus",
            Self::QueuePlayIndex(_) => "queue/play",
            Self::Position(_) => "position",
            Self::SetVolume(_) => "volume",
            Self::SetShuffle(_) => "shuffle",
            Self::SetRepeat(_) => "repeat",
            Self::GroupJoin { .. } => "groupJoin",
            Self::GroupLeave { .. } => "groupLeave",
            Self::ServicePlay { .. } => "serviceplay",
            Self::PlaylistPlay { .. } => "playlistplay",
            Self::LibraryPlay { .. } => "libraryplay",
            Self::Announce { .. } => "announce",
            Self::LineIn(_) => "linein",
        }
    }
}

/// Whether a driver handled a command natively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    Handled,
    /// The driver has no native handling; the router may consult the zone's
    /// content adapter before giving up.
    Unhandled,
}

/// Candidate player surfaced to the admin config for unassigned zones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSuggestion {
    pub player_id: String,
    pub name: String,
    #[serde(default)]
    pub available: bool,
}

/// Updates a driver pushes toward the zone manager. Vendor-side ids are
/// translated to zone ids by the manager, which owns the config.
#[derive(Debug, Clone)]
pub enum BackendUpdate {
    Status {
        zone_id: u32,
        update: PlayerStatus,
    },
    Queue {
        zone_id: u32,
        queue: Queue,
    },
    /// Vendor-reported group topology in vendor player ids.
    GroupTopology {
        backend: &'static str,
        leader_player: String,
        member_players: Vec<String>,
        external_id: Option<String>,
    },
    /// A vendor-side group disappeared.
    GroupDissolved {
        backend: &'static str,
        external_id: Option<String>,
        leader_player: Option<String>,
    },
    /// Snapshot of selectable players for the admin surface.
    Suggestions {
        backend: &'static str,
        players: Vec<PlayerSuggestion>,
    },
}

/// Everything a driver needs at construction time.
#[derive(Clone)]
pub struct BackendContext {
    pub zone_id: u32,
    pub config: ZoneConfig,
    pub updates: mpsc::Sender<BackendUpdate>,
}

impl BackendContext {
    /// Push an update without blocking command handling; a full manager
    /// inbox drops the update with a warning rather than stalling a driver.
    pub async fn push(&self, update: BackendUpdate) {
        if self.updates.send(update).await.is_err() {
            tracing::warn!(zone = self.zone_id, "zone manager inbox closed, update dropped");
        }
    }
}

/// Abstract per-zone driver.
#[async_trait]
pub trait BackendDriver: Send + Sync {
    /// Backend kind key (matches the config value).
    fn kind(&self) -> &'static str;

    /// Connect to the device, subscribe to its events, and publish an
    /// initial status merge. Idempotent.
    async fn initialize(&self) -> Result<()>;

    /// Translate a normalized command to vendor RPC.
    async fn send_command(&self, command: &ZoneCommand) -> Result<CommandOutcome>;

    /// Tear down timers, sockets, pending requests. Idempotent, callable
    /// from any lifecycle phase.
    async fn cleanup(&self);

    /// Shared RPC client for content adapters, when the driver has one.
    fn rpc_client(&self) -> Option<rpc::RpcClient> {
        None
    }
}

/// Construct the driver for a zone config. Unconfigured zones get the null
/// driver so they present a steady status rather than absence.
pub fn create_backend(ctx: BackendContext) -> Arc<dyn BackendDriver> {
    match ctx.config.backend.as_deref() {
        Some("musicassistant") => Arc::new(MusicAssistantBackend::new(ctx)),
        Some("beolink") => Arc::new(BeolinkBackend::new(ctx)),
        _ => Arc::new(NullBackend::new(ctx)),
    }
}

/// Options for a pre-persist reachability probe.
#[derive(Debug, Clone)]
pub struct ProbeOptions {
    pub ip: String,
    pub port: Option<u16>,
}

/// Validate a backend config before persisting it. Raises a descriptive
/// error on failure.
pub async fn probe(kind: &str, options: &ProbeOptions) -> Result<()> {
    match kind {
        "musicassistant" => musicassistant::probe(options).await,
        "beolink" => beolink::probe(options).await,
        other => anyhow::bail!("unknown backend kind '{other}'"),
    }
}

/// HTTP Basic authorization header value for vendor endpoints that want
/// preemptive credentials.
pub fn basic_auth_header(username: &str, password: &str) -> String {
    let token = base64::engine::general_purpose::STANDARD.encode(format!("{username}:{password}"));
    format!("Basic {token}")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn basic_auth_header_encoding() {
        assert_eq!(
            basic_auth_header("user", "pass"),
            "Basic dXNlcjpwYXNz"
        );
    }

    #[tokio::test]
    async fn factory_defaults_to_null_backend() {
        let (tx, _rx) = mpsc::channel(8);
        let ctx = BackendContext {
            zone_id: 9,
            config: ZoneConfig {
                id: 9,
                ..ZoneConfig::default()
            },
            updates: tx,
        };
        let driver = create_backend(ctx);
        assert_eq!(driver.kind(), "null");
    }

    #[tokio::test]
    async fn probe_rejects_unknown_kind() {
        let err = probe(
            "sonos",
            &ProbeOptions {
                ip: "127.0.0.1".to_string(),
                port: None,
            },
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("unknown backend kind"));
    }
}
