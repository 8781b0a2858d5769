//! Miniserver command router.
//!
//! Parses the slash-separated command grammar (`audio/<zoneId>/<verb>/...`,
//! `audio/cfg/<verb>/...`), dispatches to the zone manager or the media
//! provider, and builds the response envelope. This is the only layer that
//! converts errors into miniserver-wire responses; every envelope echoes the
//! original command string verbatim.

pub mod args;

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::backends::ZoneCommand;
use crate::error::ServerError;
use crate::favorites::FavoritesStore;
use crate::ids::{normalize_media_uri, to_playlist_command_uri};
use crate::providers::media_provider;
use crate::zone::status::{AudioType, RepeatMode};
use crate::zone::ZoneManager;
use args::{
    coerce_shuffle, normalize_payload, parse_i64, parse_id_set, parse_seconds, parse_u32,
    payload_str,
};

/// Wire response plus the HTTP status the surface should use.
#[derive(Debug, Clone, PartialEq)]
pub struct RouterResponse {
    pub status: u16,
    pub body: Value,
}

impl RouterResponse {
    fn ok(command: &str, key: &str, payload: Value) -> Self {
        let mut body = serde_json::Map::new();
        body.insert("command".to_string(), Value::String(command.to_string()));
        body.insert(format!("{key}_result"), payload);
        Self {
            status: 200,
            body: Value::Object(body),
        }
    }

    fn error(command: &str, status: u16, message: &str) -> Self {
        Self {
            status,
            body: json!({
                "command": command,
                "error": message,
            }),
        }
    }
}

fn error_response(command: &str, err: &ServerError) -> RouterResponse {
    match err {
        // Lookup misses answer empty, not with an error.
        ServerError::NotFound(_) => RouterResponse::ok(command, "empty", Value::Null),
        ServerError::Config(msg) => RouterResponse::error(command, 400, msg),
        ServerError::Resource(msg) => RouterResponse::error(command, 500, msg),
        other => RouterResponse::error(command, 500, &other.to_string()),
    }
}

pub struct CommandRouter {
    manager: Arc<ZoneManager>,
    favorites: Arc<FavoritesStore>,
    alerts: Option<(Arc<crate::alerts::AlertResolver>, String)>,
}

impl CommandRouter {
    pub fn new(manager: Arc<ZoneManager>, favorites: Arc<FavoritesStore>) -> Self {
        Self {
            manager,
            favorites,
            alerts: None,
        }
    }

    /// Attach the alert resolver and the advertised URL base so `announce`
    /// accepts alert kinds and TTS text, not only raw URLs.
    pub fn with_alerts(
        mut self,
        resolver: Arc<crate::alerts::AlertResolver>,
        url_base: String,
    ) -> Self {
        self.alerts = Some((resolver, url_base));
        self
    }

    /// Map an announce argument to a playable URL: direct URLs pass
    /// through, alert kinds and `tts/<text>` resolve through the resolver.
    async fn announce_url(&self, raw: &str) -> Option<String> {
        if raw.starts_with("http://") || raw.starts_with("https://") {
            return Some(raw.to_string());
        }
        let (resolver, base) = self.alerts.as_ref()?;
        let (kind, text) = match raw.split_once('/') {
            Some((kind, text)) => (kind, Some(decode_segment(text))),
            None => (raw, None),
        };
        let resource = resolver
            .resolve_alert_media(&crate::alerts::AlertMediaRequest {
                kind: kind.to_string(),
                text,
                language: None,
            })
            .await?;
        Some(resolver.public_url(base, &resource))
    }

    pub fn manager(&self) -> &Arc<ZoneManager> {
        &self.manager
    }

    /// Dispatch one command string (no leading slash). `payload` carries an
    /// optional request body in any of the accepted spellings.
    pub async fn dispatch(&self, command: &str, payload: Option<&str>) -> RouterResponse {
        let command = command.trim_start_matches('/').trim_end_matches('/');
        let segments: Vec<&str> = command.split('/').collect();
        let payload = normalize_payload(payload.unwrap_or_default());

        match segments.as_slice() {
            ["audio", "cfg", verb, rest @ ..] => {
                self.cfg_command(command, verb, rest, &payload).await
            }
            ["audio", zone, "favorites", op, rest @ ..] => {
                match zone.parse::<u32>() {
                    Ok(zone_id) => {
                        self.favorites_command(command, zone_id, op, rest, &payload)
                            .await
                    }
                    Err(_) => RouterResponse::error(command, 400, "invalid zone id"),
                }
            }
            ["audio", zone, verb, rest @ ..] => match zone.parse::<u32>() {
                Ok(zone_id) => {
                    self.zone_command(command, zone_id, verb, rest, &payload)
                        .await
                }
                Err(_) => RouterResponse::error(command, 400, "invalid zone id"),
            },
            ["audio", zone] => match zone.parse::<u32>() {
                Ok(zone_id) => self.status_response(command, zone_id).await,
                Err(_) => RouterResponse::error(command, 400, "invalid zone id"),
            },
            _ => {
                debug!(command, "unroutable command");
                RouterResponse::error(command, 404, "unknown command")
            }
        }
    }

    // =========================================================================
    // Zone surface
    // =========================================================================

    async fn status_response(&self, command: &str, zone_id: u32) -> RouterResponse {
        match self.manager.status(zone_id).await {
            Some(status) => RouterResponse::ok(command, "status", json!([status])),
            None => RouterResponse::ok(command, "status", json!([])),
        }
    }

    #[allow(clippy::too_many_lines)]
    async fn zone_command(
        &self,
        command: &str,
        zone_id: u32,
        verb: &str,
        rest: &[&str],
        payload: &serde_json::Map<String, Value>,
    ) -> RouterResponse {
        let arg = rest.first().copied().unwrap_or_default();
        let outcome = match verb {
            "status" => return self.status_response(command, zone_id).await,
            "getqueue" => return self.queue_response(command, zone_id, rest).await,
            "play" => self.manager.command(zone_id, ZoneCommand::Play).await,
            "resume" => self.manager.command(zone_id, ZoneCommand::Resume).await,
            "pause" => self.manager.command(zone_id, ZoneCommand::Pause).await,
            "stop" => self.manager.command(zone_id, ZoneCommand::Stop).await,
            "queueplus" => self.manager.command(zone_id, ZoneCommand::QueuePlus).await,
            "queueminus" => self.manager.command(zone_id, ZoneCommand::QueueMinus).await,
            "position" => match parse_seconds(arg) {
                Ok(seconds) => {
                    self.manager
                        .command(zone_id, ZoneCommand::Position(seconds))
                        .await
                }
                Err(e) => return error_response(command, &e),
            },
            "volume" => {
                let raw = if arg.is_empty() {
                    payload_str(payload, &["value", "volume"]).unwrap_or_default()
                } else {
                    arg
                };
                match parse_i64(raw) {
                    Ok(delta) => {
                        let delta = delta.clamp(i32::MIN as i64, i32::MAX as i64) as i32;
                        match self.manager.volume_delta(zone_id, delta).await {
                            Ok(target) => {
                                return RouterResponse::ok(
                                    command,
                                    "volume",
                                    json!({ "playerid": zone_id, "volume": target }),
                                )
                            }
                            Err(e) => Err(e),
                        }
                    }
                    Err(e) => return error_response(command, &e),
                }
            }
            "repeat" => {
                let mode = RepeatMode::coerce(arg);
                self.manager.set_repeat(zone_id, mode).await
            }
            "shuffle" => {
                let explicit = coerce_shuffle(arg);
                match self.manager.set_shuffle(zone_id, explicit).await {
                    Ok(target) => {
                        return RouterResponse::ok(
                            command,
                            "shuffle",
                            json!({ "playerid": zone_id, "shuffle": u8::from(target) }),
                        )
                    }
                    Err(e) => Err(e),
                }
            }
            "groupJoin" | "groupJoinMany" => {
                let ids = self.ids_argument(arg, payload);
                self.manager.join_group(zone_id, &ids).await
            }
            "groupLeave" | "groupLeaveMany" => {
                let ids = self.ids_argument(arg, payload);
                self.manager.leave_group(zone_id, &ids).await
            }
            "queue" => match rest {
                ["play", index, ..] => match parse_u32(index) {
                    Ok(index) => {
                        self.manager
                            .command(zone_id, ZoneCommand::QueuePlayIndex(index))
                            .await
                    }
                    Err(e) => return error_response(command, &e),
                },
                _ => return self.queue_response(command, zone_id, rest).await,
            },
            "serviceplay" => {
                let uri = self.uri_argument(rest, payload);
                let result = self
                    .manager
                    .command(zone_id, ZoneCommand::ServicePlay { uri: uri.clone() })
                    .await;
                if result.is_ok() {
                    media_provider().note_played(zone_id, &uri, &uri).await;
                }
                result
            }
            "playlistplay" => {
                let raw = self.uri_argument(rest, payload);
                let uri = to_playlist_command_uri(&raw, None, None).unwrap_or(raw);
                let result = self
                    .manager
                    .command(zone_id, ZoneCommand::PlaylistPlay { uri: uri.clone() })
                    .await;
                if result.is_ok() {
                    media_provider().note_played(zone_id, &uri, &uri).await;
                }
                result
            }
            "libraryplay" => {
                let uri = normalize_media_uri(&self.uri_argument(rest, payload));
                let result = self
                    .manager
                    .command(zone_id, ZoneCommand::LibraryPlay { uri: uri.clone() })
                    .await;
                if result.is_ok() {
                    media_provider().note_played(zone_id, &uri, &uri).await;
                }
                result
            }
            "favoriteplay" => return self.favorite_play(command, zone_id, arg).await,
            "announce" => {
                let (volume, raw) = match parse_i64(arg) {
                    Ok(v) => (
                        Some(v.clamp(0, 100) as i32),
                        rest.get(1..).unwrap_or_default().join("/"),
                    ),
                    Err(_) => (None, rest.join("/")),
                };
                let raw = decode_segment(&raw);
                match self.announce_url(&raw).await {
                    Some(url) => {
                        self.manager
                            .command(zone_id, ZoneCommand::Announce { url, volume })
                            .await
                    }
                    None if raw.is_empty() => {
                        return RouterResponse::error(command, 400, "missing announce target")
                    }
                    None => {
                        debug!(zone = zone_id, raw = %raw, "unresolvable announce target");
                        return self.status_response(command, zone_id).await;
                    }
                }
            }
            "linein" => {
                self.manager
                    .command(zone_id, ZoneCommand::LineIn(arg.to_string()))
                    .await
            }
            other => {
                warn!(zone = zone_id, verb = other, "unknown zone verb");
                return RouterResponse::error(command, 404, "unknown command");
            }
        };

        match outcome {
            Ok(()) => self.status_response(command, zone_id).await,
            Err(e) => {
                warn!(zone = zone_id, verb, "command error: {e}");
                RouterResponse::error(command, 500, &e.to_string())
            }
        }
    }

    async fn queue_response(&self, command: &str, zone_id: u32, rest: &[&str]) -> RouterResponse {
        let start = rest
            .first()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(0);
        let limit = rest
            .get(1)
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(0);
        let queue = self.manager.queue(zone_id).await.unwrap_or_else(|| {
            crate::zone::queue::Queue::new(zone_id)
        });
        let items: Vec<_> = queue
            .items
            .iter()
            .skip(start as usize)
            .take(if limit == 0 { usize::MAX } else { limit })
            .cloned()
            .collect();
        RouterResponse::ok(
            command,
            "getqueue",
            json!({
                "playerid": zone_id,
                "start": start,
                "totalitems": queue.totalitems,
                "shuffle": queue.shuffle,
                "items": items,
            }),
        )
    }

    /// `favoriteplay/<favId>`: resolve the favorite, route it through the
    /// matching content verb, then mark it recently played.
    async fn favorite_play(&self, command: &str, zone_id: u32, arg: &str) -> RouterResponse {
        let fav_id = match parse_u32(arg) {
            Ok(id) => id,
            Err(e) => return error_response(command, &e),
        };
        let item = match self.favorites.get_for_playback(zone_id, fav_id).await {
            Ok(Some(item)) => item,
            Ok(None) => {
                debug!(zone = zone_id, fav_id, "favorite not found");
                return self.status_response(command, zone_id).await;
            }
            Err(e) => return error_response(command, &e),
        };

        let uri = if item.source_id.is_empty() {
            item.audiopath.clone()
        } else {
            item.source_id.clone()
        };
        let zone_command = match item.audiotype {
            AudioType::Playlist => ZoneCommand::PlaylistPlay {
                uri: to_playlist_command_uri(&uri, None, None).unwrap_or(uri.clone()),
            },
            _ => ZoneCommand::ServicePlay { uri: uri.clone() },
        };

        match self.manager.command(zone_id, zone_command).await {
            Ok(()) => {
                media_provider().note_played(zone_id, &uri, &item.name).await;
                self.status_response(command, zone_id).await
            }
            Err(e) => RouterResponse::error(command, 500, &e.to_string()),
        }
    }

    fn ids_argument(&self, arg: &str, payload: &serde_json::Map<String, Value>) -> Vec<u32> {
        if !arg.is_empty() {
            return parse_id_set(arg);
        }
        payload_str(payload, &["value", "ids", "players", "zones"])
            .map(parse_id_set)
            .unwrap_or_default()
    }

    fn uri_argument(&self, rest: &[&str], payload: &serde_json::Map<String, Value>) -> String {
        if !rest.is_empty() {
            let joined = rest.join("/");
            let decoded = urlencoding::decode(&joined)
                .map(|s| s.into_owned())
                .unwrap_or(joined);
            return decoded;
        }
        payload_str(payload, &["uri", "id", "audiopath", "value"])
            .unwrap_or_default()
            .to_string()
    }

    // =========================================================================
    // Favorites surface
    // =========================================================================

    async fn favorites_command(
        &self,
        command: &str,
        zone_id: u32,
        op: &str,
        rest: &[&str],
        payload: &serde_json::Map<String, Value>,
    ) -> RouterResponse {
        let arg = rest.first().copied().unwrap_or_default();
        let result = match op {
            "get" => {
                let start = rest
                    .first()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(0);
                let limit = rest
                    .get(1)
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(-1);
                self.favorites.get(zone_id, start, limit).await
            }
            "add" => {
                let title = if arg.is_empty() {
                    payload_str(payload, &["title", "name"])
                        .unwrap_or_default()
                        .to_string()
                } else {
                    decode_segment(arg)
                };
                let source_id = rest
                    .get(1)
                    .map(|s| decode_segment(s))
                    .or_else(|| payload_str(payload, &["id", "sourceId"]).map(str::to_string));
                self.favorites
                    .add(zone_id, &title, source_id.as_deref())
                    .await
            }
            "delete" => match parse_u32(arg) {
                Ok(id) => self.favorites.delete(zone_id, id).await,
                Err(e) => return error_response(command, &e),
            },
            "reorder" => {
                let ids = self.ids_argument(arg, payload);
                self.favorites.reorder(zone_id, &ids).await
            }
            "plus" => {
                let id = match parse_u32(arg) {
                    Ok(id) => id,
                    Err(e) => return error_response(command, &e),
                };
                let plus = rest
                    .get(1)
                    .map(|s| matches!(*s, "1" | "true" | "yes"))
                    .unwrap_or(true);
                self.favorites.set_plus(zone_id, id, plus).await
            }
            "copy" => {
                let dests = self.ids_argument(arg, payload);
                match self.favorites.copy(zone_id, &dests).await {
                    Ok(()) => {
                        return RouterResponse::ok(
                            command,
                            "favorites",
                            json!({ "copied": dests }),
                        )
                    }
                    Err(e) => return error_response(command, &e),
                }
            }
            other => {
                warn!(zone = zone_id, op = other, "unknown favorites op");
                return RouterResponse::error(command, 404, "unknown command");
            }
        };

        match result {
            Ok(file) => RouterResponse::ok(
                command,
                "favorites",
                serde_json::to_value(&file).unwrap_or(Value::Null),
            ),
            Err(e) => error_response(command, &e),
        }
    }

    // =========================================================================
    // Provider (cfg) surface
    // =========================================================================

    async fn cfg_command(
        &self,
        command: &str,
        verb: &str,
        rest: &[&str],
        _payload: &serde_json::Map<String, Value>,
    ) -> RouterResponse {
        let provider = media_provider();
        let seg = |i: usize| rest.get(i).copied().unwrap_or_default();
        let num = |i: usize, default: u32| {
            rest.get(i).and_then(|s| s.parse::<u32>().ok()).unwrap_or(default)
        };

        match verb {
            "ready" => RouterResponse::ok(command, "ready", json!({ "status": "ok" })),
            "getradios" => {
                let radios = provider.get_radios().await;
                RouterResponse::ok(command, "getradios", json!(radios))
            }
            "getservicefolder" => {
                // getservicefolder/<service>/<folderId>/<user>/<offset>/<limit>
                let response = provider
                    .get_service_folder(seg(0), seg(1), seg(2), num(3, 0), num(4, 50))
                    .await;
                RouterResponse::ok(command, "getservicefolder", json!(response))
            }
            "getplaylists" => {
                let response = provider.get_playlists(num(0, 0), num(1, 50)).await;
                RouterResponse::ok(command, "getplaylists", json!(response))
            }
            "getplaylistitems" => {
                let id = decode_segment(seg(0));
                let response = provider
                    .get_playlist_items(&id, num(1, 0), num(2, 50))
                    .await
                    .unwrap_or_else(|| {
                        crate::providers::model::PlaylistResponse::empty(&id, num(1, 0))
                    });
                RouterResponse::ok(command, "getplaylistitems", json!(response))
            }
            "getmediafolder" => {
                let id = decode_segment(seg(0));
                let response = provider.get_media_folder(&id, num(1, 0), num(2, 50)).await;
                RouterResponse::ok(command, "getmediafolder", json!(response))
            }
            "resolvemediaitem" => {
                let folder = decode_segment(seg(0));
                let item = decode_segment(seg(1));
                let resolved = provider.resolve_media_item(&folder, &item).await;
                RouterResponse::ok(
                    command,
                    "resolvemediaitem",
                    resolved.map(|i| json!(i)).unwrap_or(json!({})),
                )
            }
            "getfavorites" => {
                let zone_id = num(0, 0);
                let response = provider.get_favorites(zone_id, num(1, 0), num(2, 50)).await;
                RouterResponse::ok(command, "getfavorites", json!(response))
            }
            "getrecent" => {
                let zone_id = num(0, 0);
                let response = provider.get_recently_played(zone_id, num(1, 0)).await;
                RouterResponse::ok(command, "getrecent", json!(response))
            }
            "clearrecent" => {
                provider.clear_recently_played(num(0, 0)).await;
                RouterResponse::ok(command, "clearrecent", json!({ "cleared": true }))
            }
            "globalsearch" => {
                // globalsearch/<source>/<query...>
                let source = seg(0);
                let query = decode_segment(&rest.get(1..).unwrap_or_default().join("/"));
                let response = provider.global_search(source, &query).await;
                RouterResponse::ok(command, "globalsearch", json!(response))
            }
            "getsuggestions" => {
                let players = self.manager.suggestions("musicassistant");
                RouterResponse::ok(command, "getsuggestions", json!(players))
            }
            other => {
                warn!(verb = other, "unknown cfg verb");
                RouterResponse::error(command, 404, "unknown command")
            }
        }
    }
}

fn decode_segment(raw: &str) -> String {
    urlencoding::decode(raw)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| raw.to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::bus::create_bus;
    use crate::config::ZoneConfig;
    use crate::content::AdapterRegistry;
    use crate::providers::DummyProvider;
    use std::time::Duration;

    async fn router_with_zones(ids: &[u32]) -> (CommandRouter, tempfile::TempDir) {
        let bus = create_bus();
        let manager = ZoneManager::new(bus.clone(), AdapterRegistry::new());
        for id in ids {
            manager
                .upsert_zone(ZoneConfig {
                    id: *id,
                    ..ZoneConfig::default()
                })
                .await;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        let dir = tempfile::tempdir().unwrap();
        let favorites = Arc::new(
            FavoritesStore::new(dir.path(), bus).with_provider(Arc::new(DummyProvider::default())),
        );
        (CommandRouter::new(manager, favorites), dir)
    }

    #[tokio::test]
    async fn envelope_echoes_command_verbatim() {
        let (router, _dir) = router_with_zones(&[1]).await;
        for command in [
            "audio/1/play",
            "audio/1/pause",
            "audio/1/status",
            "audio/cfg/getradios",
            "audio/cfg/getplaylists/0/50",
            "audio/1/favorites/get",
        ] {
            let response = router.dispatch(command, None).await;
            assert_eq!(
                response.body.get("command").and_then(Value::as_str),
                Some(command),
                "echo for {command}"
            );
            assert_eq!(response.status, 200, "status for {command}");
        }
    }

    #[tokio::test]
    async fn volume_clamps_at_boundaries() {
        let (router, _dir) = router_with_zones(&[1]).await;
        router
            .manager()
            .updates_sender()
            .send(crate::backends::BackendUpdate::Status {
                zone_id: 1,
                update: crate::zone::status::PlayerStatus {
                    playerid: 1,
                    volume: Some(95),
                    ..Default::default()
                },
            })
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let response = router.dispatch("audio/1/volume/+20", None).await;
        assert_eq!(response.body["volume_result"]["volume"], 100);
    }

    #[tokio::test]
    async fn volume_rejects_nan() {
        let (router, _dir) = router_with_zones(&[1]).await;
        let response = router.dispatch("audio/1/volume/NaN", None).await;
        assert_eq!(response.status, 400);
        assert!(response.body.get("error").is_some());
    }

    #[tokio::test]
    async fn shuffle_toggle_round_trip() {
        let (router, _dir) = router_with_zones(&[1]).await;
        let first = router.dispatch("audio/1/shuffle", None).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        let second = router.dispatch("audio/1/shuffle", None).await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        let a = first.body["shuffle_result"]["shuffle"].as_u64().unwrap();
        let b = second.body["shuffle_result"]["shuffle"].as_u64().unwrap();
        assert_ne!(a, b);

        // Explicit spellings.
        let on = router.dispatch("audio/1/shuffle/enable", None).await;
        assert_eq!(on.body["shuffle_result"]["shuffle"], 1);
        let off = router.dispatch("audio/1/shuffle/disable", None).await;
        assert_eq!(off.body["shuffle_result"]["shuffle"], 0);
    }

    #[tokio::test]
    async fn favorites_flow_end_to_end() {
        let (router, _dir) = router_with_zones(&[7]).await;

        let response = router
            .dispatch("audio/7/favorites/add/My%20Station/radio%3Atunein%3As1", None)
            .await;
        let items = response.body["favorites_result"]["items"].as_array().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["sourceId"], "radio:tunein:s1");
        assert_eq!(items[0]["slot"], 1);
        assert_eq!(items[0]["id"], 1_000_000);

        router.dispatch("audio/7/favorites/add/Second", None).await;
        let response = router
            .dispatch("audio/7/favorites/reorder/1000001,1000000", None)
            .await;
        let items = response.body["favorites_result"]["items"].as_array().unwrap();
        assert_eq!(items[0]["id"], 1_000_001);
        assert_eq!(items[0]["slot"], 1);

        let response = router
            .dispatch("audio/7/favorites/delete/1000001", None)
            .await;
        let items = response.body["favorites_result"]["items"].as_array().unwrap();
        assert_eq!(items.len(), 1);
    }

    #[tokio::test]
    async fn group_join_many_accepts_payload_ids() {
        let (router, _dir) = router_with_zones(&[5, 6]).await;
        let response = router.dispatch("audio/5/groupJoinMany", Some("6")).await;
        assert_eq!(response.status, 200);
        tokio::time::sleep(Duration::from_millis(100)).await;
        let record = router.manager().group_tracker().get_group_by_leader(5).unwrap();
        assert_eq!(record.members, vec![5, 6]);
    }

    #[tokio::test]
    async fn unknown_zone_answers_empty_status() {
        let (router, _dir) = router_with_zones(&[]).await;
        let response = router.dispatch("audio/99/status", None).await;
        assert_eq!(response.status, 200);
        assert_eq!(response.body["status_result"], json!([]));
    }

    #[tokio::test]
    async fn unknown_verbs_are_flagged() {
        let (router, _dir) = router_with_zones(&[1]).await;
        assert_eq!(router.dispatch("audio/1/explode", None).await.status, 404);
        assert_eq!(router.dispatch("audio/cfg/nonsense", None).await.status, 404);
        assert_eq!(router.dispatch("video/1/play", None).await.status, 404);
    }

    #[tokio::test]
    async fn cfg_surface_answers_with_dummy_provider() {
        crate::providers::configure_providers(crate::providers::ProviderSettings::default());
        let (router, _dir) = router_with_zones(&[1]).await;

        let response = router.dispatch("audio/cfg/getradios", None).await;
        let radios = response.body["getradios_result"].as_array().unwrap().clone();
        assert_eq!(radios.len(), 2);

        let response = router.dispatch("audio/cfg/getplaylists/0/50", None).await;
        assert_eq!(response.body["getplaylists_result"]["totalitems"], 0);

        // Unknown playlist id: empty response, not an error.
        let response = router
            .dispatch("audio/cfg/getplaylistitems/nope/0/50", None)
            .await;
        assert_eq!(response.status, 200);
        assert_eq!(response.body["getplaylistitems_result"]["totalitems"], 0);

        let response = router
            .dispatch("audio/cfg/resolvemediaitem/folder/item", None)
            .await;
        assert_eq!(response.body["resolvemediaitem_result"], json!({}));
    }
}
