//! Music Assistant backend driver.
//!
//! Talks the Music Assistant WebSocket RPC dialect through the shared
//! [`RpcClient`]. Subscribes to `player_*`, `queue_*` and `queue_time_updated`
//! events, maps them to partial status/queue updates, and surfaces vendor
//! group topology to the zone manager.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backends::rpc::RpcClient;
use crate::backends::{
    BackendContext, BackendDriver, BackendUpdate, CommandOutcome, PlayerSuggestion, ProbeOptions,
    ZoneCommand, PROBE_TIMEOUT,
};
use crate::ids::{normalize_media_uri, parse_identifier, IdFamily};
use crate::zone::queue::{Queue, QueueItem};
use crate::zone::status::{AudioType, PlayerMode, PlayerStatus, PowerState, RepeatMode};

const BACKEND_KIND: &str = "musicassistant";
/// Queue windows of at most this many items (or with missing ids) trigger a
/// full expansion RPC.
const QUEUE_EXPANSION_THRESHOLD: usize = 3;
/// Upper bound on expanded queue items.
const QUEUE_EXPANSION_LIMIT: u32 = 250;

fn ws_url(ip: &str) -> String {
    // Config may carry host or host:port; the default API port is 8095.
    if ip.contains(':') {
        format!("ws://{ip}/ws")
    } else {
        format!("ws://{ip}:8095/ws")
    }
}

/// Reachability probe used before persisting a zone config.
pub async fn probe(options: &ProbeOptions) -> Result<()> {
    let host = match options.port {
        Some(port) => format!("{}:{}", options.ip, port),
        None => options.ip.clone(),
    };
    RpcClient::probe(&ws_url(&host), PROBE_TIMEOUT)
        .await
        .map_err(|e| anyhow!("Music Assistant not reachable: {e}"))
}

pub struct MusicAssistantBackend {
    ctx: BackendContext,
    client: RpcClient,
    player_id: String,
    /// Queue currently bound to the player; events for it are relevant.
    active_queue: Arc<Mutex<Option<String>>>,
    /// Vendor id of the group leader this player is synced to, if any.
    group_leader: Arc<Mutex<Option<String>>>,
    /// Queue versions already expanded, so repeat events do not retrigger.
    expanded_queues: Arc<Mutex<HashSet<String>>>,
    event_task: Mutex<Option<JoinHandle<()>>>,
    shutdown: CancellationToken,
}

impl MusicAssistantBackend {
    pub fn new(ctx: BackendContext) -> Self {
        let host = ctx.config.ip.clone().unwrap_or_default();
        let player_id = ctx.config.ma_player_id.clone().unwrap_or_default();
        Self {
            client: RpcClient::new(ws_url(&host)),
            player_id,
            ctx,
            active_queue: Arc::new(Mutex::new(None)),
            group_leader: Arc::new(Mutex::new(None)),
            expanded_queues: Arc::new(Mutex::new(HashSet::new())),
            event_task: Mutex::new(None),
            shutdown: CancellationToken::new(),
        }
    }

    fn set_active_queue(&self, queue_id: Option<String>) {
        #[allow(clippy::unwrap_used)] // lock poisoning is unrecoverable here
        let mut slot = self.active_queue.lock().unwrap();
        *slot = queue_id;
    }

    fn active_queue_id(&self) -> Option<String> {
        #[allow(clippy::unwrap_used)]
        let slot = self.active_queue.lock().unwrap();
        slot.clone()
    }

    fn set_group_leader(&self, leader: Option<String>) {
        #[allow(clippy::unwrap_used)]
        let mut slot = self.group_leader.lock().unwrap();
        *slot = leader;
    }

    fn group_leader_id(&self) -> Option<String> {
        #[allow(clippy::unwrap_used)]
        let slot = self.group_leader.lock().unwrap();
        slot.clone()
    }

    /// An event is relevant iff its object id matches the configured player,
    /// the active queue, or the current group leader - or, for events outside
    /// the player/queue families, when it has no object id at all.
    fn is_relevant(&self, event: &str, object_id: Option<&str>) -> bool {
        match object_id {
            Some(id) => {
                id == self.player_id
                    || self.active_queue_id().as_deref() == Some(id)
                    || self.group_leader_id().as_deref() == Some(id)
            }
            None => !event.starts_with("player_") && !event.starts_with("queue_"),
        }
    }

    async fn fetch_players(&self) -> Result<Vec<Value>> {
        let result = self.client.request("players/all", Value::Null).await?;
        Ok(result.as_array().cloned().unwrap_or_default())
    }

    /// Publish the selectable-players snapshot for the admin surface.
    async fn push_suggestions(&self, players: &[Value]) {
        let players = players
            .iter()
            .filter_map(|p| {
                Some(PlayerSuggestion {
                    player_id: p.get("player_id")?.as_str()?.to_string(),
                    name: p
                        .get("display_name")
                        .or(p.get("name"))
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    available: p.get("available").and_then(Value::as_bool).unwrap_or(false),
                })
            })
            .collect();
        self.ctx
            .push(BackendUpdate::Suggestions {
                backend: BACKEND_KIND,
                players,
            })
            .await;
    }

    async fn handle_player_object(&self, player: &Value) {
        let update = map_player_status(self.ctx.zone_id, player);
        self.set_active_queue(
            player
                .get("active_source")
                .and_then(Value::as_str)
                .map(str::to_string),
        );

        // Group picture: synced_to marks this player as a child; group_childs
        // marks it as a leader.
        let synced_to = player
            .get("synced_to")
            .and_then(Value::as_str)
            .map(str::to_string);
        let childs: Vec<String> = player
            .get("group_childs")
            .or(player.get("group_members"))
            .and_then(Value::as_array)
            .map(|a| {
                a.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        self.set_group_leader(synced_to.clone());

        if let Some(leader) = synced_to {
            // A child only knows its leader; the leader's own event carries
            // the member list, so nothing to push from here.
            debug!(zone = self.ctx.zone_id, leader = %leader, "synced to group leader");
        } else if childs.len() > 1
            || (childs.len() == 1 && childs[0] != self.player_id)
        {
            let mut members = childs;
            if !members.contains(&self.player_id) {
                members.insert(0, self.player_id.clone());
            }
            self.ctx
                .push(BackendUpdate::GroupTopology {
                    backend: BACKEND_KIND,
                    leader_player: self.player_id.clone(),
                    member_players: members,
                    external_id: None,
                })
                .await;
        } else {
            // A group with a single member collapses.
            self.ctx
                .push(BackendUpdate::GroupDissolved {
                    backend: BACKEND_KIND,
                    external_id: None,
                    leader_player: Some(self.player_id.clone()),
                })
                .await;
        }

        self.ctx
            .push(BackendUpdate::Status {
                zone_id: self.ctx.zone_id,
                update,
            })
            .await;
    }

    async fn handle_queue_event(&self, event: &str, object_id: Option<&str>, data: &Value) {
        if event == "queue_time_updated" {
            // Only the timing fields move; an exact zero additionally forces
            // pause so the UI does not show a playing zone at 0:00.
            let elapsed = data.as_f64().unwrap_or_else(|| {
                data.get("elapsed_time").and_then(Value::as_f64).unwrap_or(0.0)
            });
            let mut update = PlayerStatus {
                playerid: self.ctx.zone_id,
                time: Some(elapsed),
                position_ms: Some((elapsed * 1000.0) as u64),
                ..PlayerStatus::default()
            };
            if elapsed == 0.0 {
                update.mode = Some(PlayerMode::Pause);
            }
            self.ctx
                .push(BackendUpdate::Status {
                    zone_id: self.ctx.zone_id,
                    update,
                })
                .await;
            return;
        }

        let queue_id = object_id
            .map(str::to_string)
            .or_else(|| data.get("queue_id").and_then(Value::as_str).map(str::to_string));

        // Status fields carried on the queue object.
        let mut update = PlayerStatus::new(self.ctx.zone_id);
        if let Some(shuffle) = data.get("shuffle_enabled").and_then(Value::as_bool) {
            update.plshuffle = Some(shuffle);
        }
        if let Some(repeat) = data.get("repeat_mode").and_then(Value::as_str) {
            update.plrepeat = Some(map_repeat_mode(repeat));
        }
        if let Some(index) = data.get("current_index").and_then(Value::as_u64) {
            update.qindex = Some(index as u32);
        }
        if let Some(id) = &queue_id {
            update.qid = Some(id.clone());
        }
        if update != PlayerStatus::new(self.ctx.zone_id) {
            self.ctx
                .push(BackendUpdate::Status {
                    zone_id: self.ctx.zone_id,
                    update,
                })
                .await;
        }

        let Some(queue_id) = queue_id else { return };

        let items = data.get("items").and_then(Value::as_array);
        let window: Vec<Value> = items.cloned().unwrap_or_default();
        let missing_ids = window
            .iter()
            .any(|i| i.get("queue_item_id").and_then(Value::as_str).is_none());

        if window.len() <= QUEUE_EXPANSION_THRESHOLD || missing_ids {
            let version = format!(
                "{queue_id}:{}",
                data.get("items_version")
                    .or(data.get("version"))
                    .map(Value::to_string)
                    .unwrap_or_else(|| data.get("items").map(Value::to_string).unwrap_or_default())
            );
            let already = {
                #[allow(clippy::unwrap_used)]
                let mut seen = self.expanded_queues.lock().unwrap();
                !seen.insert(version)
            };
            if !already {
                self.expand_queue(&queue_id).await;
            }
        } else {
            let queue = map_queue(self.ctx.zone_id, &window, 0, None);
            self.ctx
                .push(BackendUpdate::Queue {
                    zone_id: self.ctx.zone_id,
                    queue,
                })
                .await;
        }
    }

    /// Fetch up to 250 full items for a queue the event only summarized.
    async fn expand_queue(&self, queue_id: &str) {
        let args = json!({
            "queue_id": queue_id,
            "limit": QUEUE_EXPANSION_LIMIT,
            "offset": 0,
        });
        match self.client.request("player_queues/items", args).await {
            Ok(result) => {
                let items = result.as_array().cloned().unwrap_or_default();
                let queue = map_queue(self.ctx.zone_id, &items, 0, None);
                self.ctx
                    .push(BackendUpdate::Queue {
                        zone_id: self.ctx.zone_id,
                        queue,
                    })
                    .await;
            }
            Err(e) => warn!(queue_id, "queue expansion failed: {e}"),
        }
    }

    async fn run_events(&self) {
        let mut rx = self.client.subscribe_events();
        loop {
            let frame = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                frame = rx.recv() => frame,
            };
            let frame = match frame {
                Ok(frame) => frame,
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    warn!(zone = self.ctx.zone_id, "event stream lagged, {n} dropped");
                    continue;
                }
                Err(_) => break,
            };

            let Some(event) = frame.get("event").and_then(Value::as_str) else {
                continue;
            };
            let object_id = frame.get("object_id").and_then(Value::as_str);
            if !self.is_relevant(event, object_id) {
                continue;
            }
            let data = frame.get("data").cloned().unwrap_or(Value::Null);

            match event {
                e if e.starts_with("player_") => {
                    self.handle_player_object(&data).await;
                }
                "queue_time_updated" => {
                    self.handle_queue_event(event, object_id, &data).await;
                }
                e if e.starts_with("queue_") => {
                    self.handle_queue_event(event, object_id, &data).await;
                }
                other => debug!(event = other, "unhandled event"),
            }
        }
    }

    /// Translate a canonical media id to the URI the vendor understands.
    fn vendor_media_uri(uri: &str) -> String {
        let id = parse_identifier(uri);
        match id.family {
            Some(IdFamily::Radio) => {
                let item = id.item_id.unwrap_or_default();
                // TuneIn station keys are `s<digits>`; anything else is a
                // direct stream URL or vendor-native id.
                let station = regex::Regex::new(r"^s\d+$")
                    .ok()
                    .map(|re| re.is_match(&item))
                    .unwrap_or(false);
                if station {
                    format!("tunein:station:{item}")
                } else {
                    item
                }
            }
            Some(IdFamily::Playlist) => {
                format!("library://playlist/{}", id.item_id.unwrap_or_default())
            }
            Some(IdFamily::Library) => {
                let kind = id.kind.unwrap_or_else(|| "track".to_string());
                format!("library://{kind}/{}", id.item_id.unwrap_or_default())
            }
            _ => uri.to_string(),
        }
    }

    async fn play_media(&self, uri: &str) -> Result<()> {
        let media = Self::vendor_media_uri(uri);
        let queue_id = self.active_queue_id().unwrap_or_else(|| self.player_id.clone());
        let args = json!({
            "queue_id": queue_id,
            "media": [media],
            "option": "replace",
        });
        self.client.request("player_queues/play_media", args).await?;
        Ok(())
    }

    async fn player_cmd(&self, cmd: &str, extra: Value) -> Result<()> {
        let mut args = json!({ "player_id": self.player_id });
        if let (Value::Object(target), Value::Object(extra)) = (&mut args, extra) {
            for (k, v) in extra {
                target.insert(k, v);
            }
        }
        self.client
            .request(&format!("players/cmd/{cmd}"), args)
            .await?;
        Ok(())
    }

    async fn queue_cmd(&self, cmd: &str, extra: Value) -> Result<()> {
        let queue_id = self.active_queue_id().unwrap_or_else(|| self.player_id.clone());
        let mut args = json!({ "queue_id": queue_id });
        if let (Value::Object(target), Value::Object(extra)) = (&mut args, extra) {
            for (k, v) in extra {
                target.insert(k, v);
            }
        }
        self.client
            .request(&format!("player_queues/{cmd}"), args)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl BackendDriver for MusicAssistantBackend {
    fn kind(&self) -> &'static str {
        BACKEND_KIND
    }

    async fn initialize(&self) -> Result<()> {
        if self.player_id.is_empty() {
            anyhow::bail!("zone {} has no ma_player_id", self.ctx.zone_id);
        }
        self.client
            .connect()
            .await
            .map_err(|e| anyhow!("connect: {e}"))?;

        // Full player list: seeds our own status and the admin suggestions.
        let players = self.fetch_players().await?;
        self.push_suggestions(&players).await;
        if let Some(own) = players
            .iter()
            .find(|p| p.get("player_id").and_then(Value::as_str) == Some(self.player_id.as_str()))
        {
            self.handle_player_object(own).await;
        } else {
            warn!(
                zone = self.ctx.zone_id,
                player = %self.player_id,
                "configured player not reported by server"
            );
            self.ctx
                .push(BackendUpdate::Status {
                    zone_id: self.ctx.zone_id,
                    update: PlayerStatus::offline(self.ctx.zone_id),
                })
                .await;
        }

        let this = self.clone_for_task();
        let handle = tokio::spawn(async move { this.run_events().await });
        #[allow(clippy::unwrap_used)]
        let mut slot = self.event_task.lock().unwrap();
        if let Some(old) = slot.replace(handle) {
            old.abort();
        }
        info!(zone = self.ctx.zone_id, player = %self.player_id, "backend ready");
        Ok(())
    }

    async fn send_command(&self, command: &ZoneCommand) -> Result<CommandOutcome> {
        match command {
            ZoneCommand::Play | ZoneCommand::Resume => self.player_cmd("play", json!({})).await?,
            ZoneCommand::Pause => self.player_cmd("pause", json!({})).await?,
            ZoneCommand::Stop => self.player_cmd("stop", json!({})).await?,
            ZoneCommand::QueuePlus => self.player_cmd("next", json!({})).await?,
            ZoneCommand::QueueMinus => self.player_cmd("previous", json!({})).await?,
            ZoneCommand::Position(seconds) => {
                self.player_cmd("seek", json!({ "position": seconds })).await?
            }
            ZoneCommand::SetVolume(volume) => {
                self.player_cmd("volume_set", json!({ "volume_level": volume }))
                    .await?
            }
            ZoneCommand::SetShuffle(enabled) => {
                self.queue_cmd("shuffle", json!({ "shuffle_enabled": enabled }))
                    .await?
            }
            ZoneCommand::SetRepeat(mode) => {
                let vendor = match mode {
                    RepeatMode::None => "off",
                    RepeatMode::Queue => "all",
                    RepeatMode::Track => "one",
                };
                self.queue_cmd("repeat", json!({ "repeat_mode": vendor })).await?
            }
            ZoneCommand::QueuePlayIndex(index) => {
                self.queue_cmd("play_index", json!({ "index": index })).await?
            }
            ZoneCommand::GroupJoin { members } => {
                let childs: Vec<&str> = members.iter().map(|(_, p)| p.as_str()).collect();
                self.client
                    .request(
                        "players/cmd/group_many",
                        json!({
                            "target_player": self.player_id,
                            "child_player_ids": childs,
                        }),
                    )
                    .await?;
            }
            ZoneCommand::GroupLeave { members } => {
                let ids: Vec<&str> = members.iter().map(|(_, p)| p.as_str()).collect();
                self.client
                    .request("players/cmd/ungroup_many", json!({ "player_ids": ids }))
                    .await?;
            }
            ZoneCommand::ServicePlay { uri }
            | ZoneCommand::PlaylistPlay { uri }
            | ZoneCommand::LibraryPlay { uri } => self.play_media(uri).await?,
            ZoneCommand::Announce { url, volume } => {
                let mut extra = json!({ "url": url });
                if let Some(v) = volume {
                    extra["volume_level"] = json!(v);
                }
                self.player_cmd("play_announcement", extra).await?
            }
            ZoneCommand::LineIn(_) => return Ok(CommandOutcome::Unhandled),
        }
        Ok(CommandOutcome::Handled)
    }

    async fn cleanup(&self) {
        self.shutdown.cancel();
        #[allow(clippy::unwrap_used)]
        let handle = self.event_task.lock().unwrap().take();
        if let Some(handle) = handle {
            handle.abort();
        }
        self.client.close();
    }

    fn rpc_client(&self) -> Option<RpcClient> {
        Some(self.client.clone())
    }
}

impl MusicAssistantBackend {
    /// Cheap clone for the event task: shares the client, context and state.
    fn clone_for_task(&self) -> Self {
        Self {
            ctx: self.ctx.clone(),
            client: self.client.clone(),
            player_id: self.player_id.clone(),
            active_queue: self.active_queue.clone(),
            group_leader: self.group_leader.clone(),
            expanded_queues: self.expanded_queues.clone(),
            event_task: Mutex::new(None),
            shutdown: self.shutdown.clone(),
        }
    }
}

/// Map a vendor player object to a partial status.
fn map_player_status(zone_id: u32, player: &Value) -> PlayerStatus {
    let mut status = PlayerStatus::new(zone_id);

    if let Some(state) = player.get("state").and_then(Value::as_str) {
        status.mode = Some(PlayerMode::from_vendor(state));
    }
    status.power = Some(
        match (
            player.get("available").and_then(Value::as_bool),
            player.get("powered").and_then(Value::as_bool),
        ) {
            (Some(false), _) => PowerState::Offline,
            (_, Some(false)) => PowerState::Off,
            _ => PowerState::On,
        },
    );
    if let Some(volume) = player.get("volume_level").and_then(Value::as_f64) {
        status.volume = Some((volume as i32).clamp(0, 100));
    }
    if let Some(elapsed) = player.get("elapsed_time").and_then(Value::as_f64) {
        status.time = Some(elapsed);
        status.position_ms = Some((elapsed * 1000.0) as u64);
    }

    if let Some(media) = player.get("current_media") {
        status.title = media
            .get("title")
            .and_then(Value::as_str)
            .map(str::to_string);
        status.artist = media
            .get("artist")
            .and_then(Value::as_str)
            .map(str::to_string);
        status.album = media
            .get("album")
            .and_then(Value::as_str)
            .map(str::to_string);
        status.coverurl = media
            .get("image_url")
            .and_then(Value::as_str)
            .map(str::to_string);
        if let Some(duration) = media.get("duration").and_then(Value::as_f64) {
            status.duration = Some(duration);
            status.duration_ms = Some((duration * 1000.0) as u64);
        }
        if let Some(uri) = media.get("uri").and_then(Value::as_str) {
            let normalized = normalize_media_uri(uri);
            status.audiotype = Some(AudioType::from_path(&normalized));
            if status.audiotype == Some(AudioType::Radio) {
                status.station = status.title.clone();
            }
            status.audiopath = Some(normalized);
        }
    }

    status
}

fn map_repeat_mode(vendor: &str) -> RepeatMode {
    match vendor {
        "all" => RepeatMode::Queue,
        "one" => RepeatMode::Track,
        _ => RepeatMode::None,
    }
}

/// Map vendor queue items to the queue view.
fn map_queue(zone_id: u32, items: &[Value], start: u32, total: Option<u32>) -> Queue {
    let mapped: Vec<QueueItem> = items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            let media = item.get("media_item").unwrap_or(item);
            let uri = media.get("uri").and_then(Value::as_str).unwrap_or_default();
            let normalized = normalize_media_uri(uri);
            QueueItem {
                qindex: start + index as u32,
                unique_id: item
                    .get("queue_item_id")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                title: media
                    .get("name")
                    .or(media.get("title"))
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                artist: media
                    .get("artist")
                    .and_then(Value::as_str)
                    .or_else(|| {
                        media
                            .get("artists")
                            .and_then(Value::as_array)
                            .and_then(|a| a.first())
                            .and_then(|a| a.get("name"))
                            .and_then(Value::as_str)
                    })
                    .unwrap_or_default()
                    .to_string(),
                album: media
                    .get("album")
                    .and_then(|a| a.get("name").and_then(Value::as_str).or(a.as_str()))
                    .unwrap_or_default()
                    .to_string(),
                audiotype: Some(AudioType::from_path(&normalized)),
                audiopath: normalized,
                coverurl: media
                    .get("image_url")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                duration: item
                    .get("duration")
                    .or(media.get("duration"))
                    .and_then(Value::as_f64)
                    .unwrap_or(0.0),
                station: None,
                user: None,
            }
        })
        .collect();
    Queue::with_items(zone_id, mapped, start, total)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn vendor_media_uri_mapping() {
        assert_eq!(
            MusicAssistantBackend::vendor_media_uri("radio:musicassistant:s24940"),
            "tunein:station:s24940"
        );
        assert_eq!(
            MusicAssistantBackend::vendor_media_uri("radio:custom:http%3A%2F%2Fhost%2Fstream"),
            "http://host/stream"
        );
        assert_eq!(
            MusicAssistantBackend::vendor_media_uri("playlist:musicassistant:17"),
            "library://playlist/17"
        );
        assert_eq!(
            MusicAssistantBackend::vendor_media_uri("library:musicassistant:album:42"),
            "library://album/42"
        );
    }

    #[test]
    fn player_status_mapping() {
        let player = serde_json::json!({
            "player_id": "p1",
            "state": "playing",
            "available": true,
            "powered": true,
            "volume_level": 40.0,
            "elapsed_time": 12.5,
            "current_media": {
                "title": "Jazz FM",
                "artist": "",
                "image_url": "http://x/cover.jpg",
                "duration": 0.0,
                "uri": "tunein://s24940",
            },
        });
        let status = map_player_status(7, &player);
        assert_eq!(status.mode, Some(PlayerMode::Play));
        assert_eq!(status.power, Some(PowerState::On));
        assert_eq!(status.volume, Some(40));
        assert_eq!(status.audiotype, Some(AudioType::Radio));
        assert_eq!(status.station.as_deref(), Some("Jazz FM"));
        assert_eq!(status.position_ms, Some(12500));
    }

    #[test]
    fn unavailable_player_is_offline() {
        let player = serde_json::json!({ "available": false });
        let status = map_player_status(1, &player);
        assert_eq!(status.power, Some(PowerState::Offline));
    }

    #[test]
    fn queue_mapping_reads_media_items() {
        let items = vec![serde_json::json!({
            "queue_item_id": "q1",
            "duration": 200.0,
            "media_item": {
                "name": "Track A",
                "uri": "library://track/1",
                "artists": [{"name": "Artist A"}],
                "album": {"name": "Album A"},
                "image_url": "http://x/a.jpg",
            },
        })];
        let queue = map_queue(4, &items, 0, None);
        assert_eq!(queue.totalitems, 1);
        let item = &queue.items[0];
        assert_eq!(item.title, "Track A");
        assert_eq!(item.artist, "Artist A");
        assert_eq!(item.album, "Album A");
        assert_eq!(item.unique_id.as_deref(), Some("q1"));
        assert_eq!(item.duration, 200.0);
        // Canonical spelling of the vendor uri.
        assert!(item.audiopath.starts_with("library:"));
    }

    #[test]
    fn repeat_mode_mapping() {
        assert_eq!(map_repeat_mode("off"), RepeatMode::None);
        assert_eq!(map_repeat_mode("all"), RepeatMode::Queue);
        assert_eq!(map_repeat_mode("one"), RepeatMode::Track);
        assert_eq!(map_repeat_mode("?"), RepeatMode::None);
    }

    #[tokio::test]
    async fn relevance_filter() {
        let (tx, _rx) = tokio::sync::mpsc::channel(8);
        let backend = MusicAssistantBackend::new(BackendContext {
            zone_id: 7,
            config: crate::config::ZoneConfig {
                id: 7,
                ip: Some("127.0.0.1".to_string()),
                ma_player_id: Some("p7".to_string()),
                ..crate::config::ZoneConfig::default()
            },
            updates: tx,
        });

        assert!(backend.is_relevant("player_updated", Some("p7")));
        assert!(!backend.is_relevant("player_updated", Some("p8")));
        // No object id: only non-player/queue events pass.
        assert!(backend.is_relevant("connection_state", None));
        assert!(!backend.is_relevant("player_updated", None));

        backend.set_active_queue(Some("queue-1".to_string()));
        assert!(backend.is_relevant("queue_updated", Some("queue-1")));

        backend.set_group_leader(Some("leader-9".to_string()));
        assert!(backend.is_relevant("player_updated", Some("leader-9")));
    }
}
