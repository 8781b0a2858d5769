//! Music Assistant media provider (reference implementation).
//!
//! Backs every provider operation with the remote WebSocket RPC dialect.
//! Radio favorites and the playlist list are cached behind TTLs with a
//! single in-flight refresh guarding against stampedes; browsed folders are
//! cached under canonical ids and their encoded/decoded/lowercased variants
//! so `resolve_media_item` is O(1) after a listing - and direct-id
//! album/artist/track lookups work without one.

use std::collections::HashMap;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::backends::rpc::RpcClient;
use crate::bus::{PushEvent, SharedBus};
use crate::config::{get_data_dir, MusicAssistantConfig};
use crate::ids::{build_library_uri, build_playlist_uri, build_radio_key, parse_identifier};
use crate::providers::model::{
    FavoriteEntry, FavoriteResponse, FolderItemKind, FolderResponse, MediaFolderItem,
    MediaFolderResponse, MediaKind, PlaylistItem, PlaylistResponse, RadioEntry, RadioFolderItem,
    RecentEntry, RecentResponse, SearchResponse, SearchSection,
};
use crate::providers::MediaProvider;
use crate::zone::status::AudioType;

const PROVIDER_NAME: &str = "musicassistant";
/// Most recently played entries kept per zone.
const RECENT_LIMIT: usize = 50;

fn radio_ttl() -> Duration {
    env_secs("MA_RADIO_TTL_SECS", 30)
}

fn playlist_ttl() -> Duration {
    env_secs("MA_PLAYLIST_TTL_SECS", 60)
}

/// How many stations get a per-station detail fetch.
fn radio_detail_limit() -> usize {
    std::env::var("MA_RADIO_DETAIL_LIMIT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(10)
}

fn env_secs(name: &str, default: u64) -> Duration {
    Duration::from_secs(
        std::env::var(name)
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(default),
    )
}

/// Optional icon proxy: cover URLs are rewritten through it when set.
fn icon_proxy() -> Option<String> {
    let host = std::env::var("ICON_PROXY_HOST").ok()?;
    if host.is_empty() {
        return None;
    }
    let port = std::env::var("ICON_PROXY_PORT")
        .ok()
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(80);
    Some(format!("http://{host}:{port}"))
}

fn proxied_cover(url: &str) -> String {
    match icon_proxy() {
        Some(base) if !url.is_empty() => {
            format!("{base}/image?url={}", urlencoding::encode(url))
        }
        _ => url.to_string(),
    }
}

/// Display name for the favorites category in search and folder surfaces.
fn favorites_display_name() -> String {
    std::env::var("FAVORITES_CATEGORY_NAME").unwrap_or_else(|_| "Favorites".to_string())
}

// =============================================================================
// Cache keys
// =============================================================================

/// Unifies the spellings a folder or item id may arrive in, so callers
/// cannot forget a variant when reading the cache.
pub(crate) struct CacheKey;

impl CacheKey {
    pub(crate) fn variants(raw: &str) -> Vec<String> {
        let mut keys = vec![raw.to_string()];
        let encoded = urlencoding::encode(raw).into_owned();
        if encoded != raw {
            keys.push(encoded);
        }
        if let Ok(decoded) = urlencoding::decode(raw) {
            if decoded != raw {
                keys.push(decoded.into_owned());
            }
        }
        let lower = raw.to_ascii_lowercase();
        if lower != raw {
            keys.push(lower);
        }
        keys
    }

    /// Canonical lookup key: decoded, lowercased.
    pub(crate) fn normalize(raw: &str) -> String {
        urlencoding::decode(raw)
            .map(|s| s.into_owned())
            .unwrap_or_else(|_| raw.to_string())
            .to_ascii_lowercase()
    }
}

// =============================================================================
// Caches
// =============================================================================

struct TtlCache<T> {
    fetched_at: Option<Instant>,
    value: T,
}

impl<T: Default> Default for TtlCache<T> {
    fn default() -> Self {
        Self {
            fetched_at: None,
            value: T::default(),
        }
    }
}

impl<T: Clone> TtlCache<T> {
    fn fresh(&self, ttl: Duration) -> Option<T> {
        let fetched = self.fetched_at?;
        (fetched.elapsed() < ttl).then(|| self.value.clone())
    }

    fn store(&mut self, value: T) {
        self.fetched_at = Some(Instant::now());
        self.value = value;
    }
}

#[derive(Default)]
struct FolderCache {
    /// Variant key -> item, for O(1) `resolve_media_item`.
    items: HashMap<String, MediaFolderItem>,
    /// Normalized folder id -> listed children.
    folders: HashMap<String, Vec<MediaFolderItem>>,
}

impl FolderCache {
    fn store_folder(&mut self, folder_id: &str, items: &[MediaFolderItem]) {
        self.folders
            .insert(CacheKey::normalize(folder_id), items.to_vec());
        for item in items {
            self.store_item(item);
        }
    }

    fn store_item(&mut self, item: &MediaFolderItem) {
        for key in CacheKey::variants(&item.id) {
            self.items.insert(key, item.clone());
        }
        // The raw vendor item id resolves too.
        if let Some(raw) = parse_identifier(&item.id).item_id {
            for key in CacheKey::variants(&raw) {
                self.items.entry(key).or_insert_with(|| item.clone());
            }
        }
    }

    fn get_item(&self, id: &str) -> Option<MediaFolderItem> {
        for key in CacheKey::variants(id) {
            if let Some(item) = self.items.get(&key) {
                return Some(item.clone());
            }
        }
        None
    }
}

// =============================================================================
// Provider
// =============================================================================

pub struct MusicAssistantProvider {
    client: RpcClient,
    bus: SharedBus,
    radios: StdMutex<TtlCache<Vec<RadioFolderItem>>>,
    radio_refresh: Mutex<()>,
    playlists: StdMutex<TtlCache<Vec<PlaylistItem>>>,
    playlist_refresh: Mutex<()>,
    folder_cache: StdMutex<FolderCache>,
}

impl MusicAssistantProvider {
    pub fn new(config: MusicAssistantConfig, bus: SharedBus) -> Self {
        let url = format!("ws://{}:{}/ws", config.host, config.port);
        Self {
            client: RpcClient::new(url),
            bus,
            radios: StdMutex::new(TtlCache::default()),
            radio_refresh: Mutex::new(()),
            playlists: StdMutex::new(TtlCache::default()),
            playlist_refresh: Mutex::new(()),
            folder_cache: StdMutex::new(FolderCache::default()),
        }
    }

    /// The provider's RPC client, shareable with content adapters.
    pub fn rpc_client(&self) -> RpcClient {
        self.client.clone()
    }

    /// RPC wrapper: provider errors surface as empty results upstream, so
    /// this logs at warn and returns None.
    async fn rpc(&self, command: &str, args: Value) -> Option<Value> {
        match self.client.request(command, args).await {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(command, "provider rpc failed: {e}");
                None
            }
        }
    }

    // -------------------------------------------------------------------------
    // Radio surface
    // -------------------------------------------------------------------------

    /// Cached radio favorites; one in-flight refresh at a time.
    async fn radios_cached(&self) -> Vec<RadioFolderItem> {
        let ttl = radio_ttl();
        {
            #[allow(clippy::unwrap_used)] // lock poisoning is unrecoverable here
            let cache = self.radios.lock().unwrap();
            if let Some(items) = cache.fresh(ttl) {
                return items;
            }
        }

        let _refresh = self.radio_refresh.lock().await;
        // A concurrent caller may have refreshed while we waited.
        {
            #[allow(clippy::unwrap_used)]
            let cache = self.radios.lock().unwrap();
            if let Some(items) = cache.fresh(ttl) {
                return items;
            }
        }

        // A failed fetch answers empty but is not cached, so the next call
        // retries instead of serving a stale miss for the whole TTL.
        let Some(fetched) = self.fetch_radios().await else {
            return Vec::new();
        };
        #[allow(clippy::unwrap_used)]
        let mut cache = self.radios.lock().unwrap();
        cache.store(fetched.clone());
        fetched
    }

    async fn fetch_radios(&self) -> Option<Vec<RadioFolderItem>> {
        let result = self
            .rpc(
                "music/radios/library_items",
                json!({ "favorite": true, "limit": 500 }),
            )
            .await?;
        let raw = result.as_array().cloned().unwrap_or_default();
        let mut stations: Vec<RadioFolderItem> = raw.iter().map(map_radio_item).collect();

        // Per-station detail only for the head of the list.
        let detail_limit = radio_detail_limit();
        for station in stations.iter_mut().take(detail_limit) {
            if station.coverurl.is_some() {
                continue;
            }
            let raw_id = parse_identifier(&station.id).item_id.unwrap_or_default();
            if let Some(detail) = self
                .rpc(
                    "music/radios/get_radio",
                    json!({ "item_id": raw_id, "provider": "library" }),
                )
                .await
            {
                if let Some(cover) = first_image(&detail) {
                    station.coverurl = Some(proxied_cover(&cover));
                }
            }
        }
        Some(stations)
    }

    fn split_stations(stations: &[RadioFolderItem]) -> (Vec<RadioFolderItem>, Vec<RadioFolderItem>) {
        // Custom streams carry a direct URL instead of a station key.
        let (custom, local): (Vec<_>, Vec<_>) = stations
            .iter()
            .cloned()
            .partition(|s| s.audiopath.starts_with("http://") || s.audiopath.starts_with("https://"));
        (local, custom)
    }

    // -------------------------------------------------------------------------
    // Playlist surface
    // -------------------------------------------------------------------------

    async fn playlists_cached(&self) -> Vec<PlaylistItem> {
        let ttl = playlist_ttl();
        {
            #[allow(clippy::unwrap_used)]
            let cache = self.playlists.lock().unwrap();
            if let Some(items) = cache.fresh(ttl) {
                return items;
            }
        }
        let _refresh = self.playlist_refresh.lock().await;
        {
            #[allow(clippy::unwrap_used)]
            let cache = self.playlists.lock().unwrap();
            if let Some(items) = cache.fresh(ttl) {
                return items;
            }
        }

        // Failed fetches are not cached; the next caller retries.
        let Some(result) = self
            .rpc("music/playlists/library_items", json!({ "limit": 500 }))
            .await
        else {
            return Vec::new();
        };
        let fetched: Vec<PlaylistItem> = result
            .as_array()
            .cloned()
            .unwrap_or_default()
            .iter()
            .map(map_playlist_item)
            .collect();
        #[allow(clippy::unwrap_used)]
        let mut cache = self.playlists.lock().unwrap();
        cache.store(fetched.clone());
        fetched
    }

    // -------------------------------------------------------------------------
    // Library surface
    // -------------------------------------------------------------------------

    async fn list_library(&self, kind: &str, offset: u32, limit: u32) -> Vec<MediaFolderItem> {
        let command = match kind {
            "albums" => "music/albums/library_items",
            "artists" => "music/artists/library_items",
            "tracks" => "music/tracks/library_items",
            "playlists" => "music/playlists/library_items",
            "radios" => "music/radios/library_items",
            _ => return Vec::new(),
        };
        let Some(result) = self
            .rpc(command, json!({ "limit": limit, "offset": offset }))
            .await
        else {
            return Vec::new();
        };
        result
            .as_array()
            .cloned()
            .unwrap_or_default()
            .iter()
            .map(map_media_item)
            .collect()
    }

    /// Children of one album/artist/playlist node.
    async fn list_children(&self, kind: &str, raw_id: &str) -> Vec<MediaFolderItem> {
        let (command, id_key) = match kind {
            "album" => ("music/albums/album_tracks", "item_id"),
            "artist" => ("music/artists/artist_albums", "item_id"),
            "playlist" => ("music/playlists/playlist_tracks", "item_id"),
            _ => return Vec::new(),
        };
        let Some(result) = self
            .rpc(command, json!({ id_key: raw_id, "provider": "library" }))
            .await
        else {
            return Vec::new();
        };
        result
            .as_array()
            .cloned()
            .unwrap_or_default()
            .iter()
            .map(map_media_item)
            .collect()
    }

    /// Direct single-item fetch, no folder listing required.
    async fn fetch_single(&self, kind: &str, raw_id: &str) -> Option<MediaFolderItem> {
        let command = match kind {
            "album" => "music/albums/get_album",
            "artist" => "music/artists/get_artist",
            "track" => "music/tracks/get_track",
            "playlist" => "music/playlists/get_playlist",
            "radio" => "music/radios/get_radio",
            _ => return None,
        };
        let result = self
            .rpc(command, json!({ "item_id": raw_id, "provider": "library" }))
            .await?;
        if result.is_null() {
            return None;
        }
        Some(map_media_item(&result))
    }

    // -------------------------------------------------------------------------
    // Search
    // -------------------------------------------------------------------------

    async fn search_rpc(&self, query: &str, media_types: &[&str], limit: u32) -> Vec<Value> {
        let Some(result) = self
            .rpc(
                "music/search",
                json!({
                    "search_query": query,
                    "media_types": media_types,
                    "limit": limit,
                }),
            )
            .await
        else {
            return Vec::new();
        };
        // The server answers either a flat list or a per-type object.
        match result {
            Value::Array(items) => items,
            Value::Object(map) => map
                .into_iter()
                .flat_map(|(_, v)| v.as_array().cloned().unwrap_or_default())
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// Parsed search scope: which categories to request and their limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SearchScope {
    pub source: String,
    /// `(category, limit)` pairs in request order.
    pub categories: Vec<(String, u32)>,
}

/// `<source>:<cat[#limit][,cat...]>[|<more>]`; unknown scopes default to
/// tracks/albums/artists/playlists at 25 apiece.
pub(crate) fn parse_search_scope(scope: &str) -> SearchScope {
    const DEFAULT_LIMIT: u32 = 25;
    let default = || SearchScope {
        source: scope.split(':').next().unwrap_or("library").to_string(),
        categories: ["tracks", "albums", "artists", "playlists"]
            .iter()
            .map(|c| (c.to_string(), DEFAULT_LIMIT))
            .collect(),
    };

    // Only the first scope group drives the request; the remainder is a
    // hint for follow-up pages.
    let first = scope.split('|').next().unwrap_or_default();
    let Some((source, cats)) = first.split_once(':') else {
        return default();
    };
    if cats.is_empty() {
        return default();
    }

    let mut categories = Vec::new();
    for cat in cats.split(',') {
        let (name, limit) = match cat.split_once('#') {
            Some((name, limit)) => (name, limit.parse().unwrap_or(DEFAULT_LIMIT)),
            None => (cat, DEFAULT_LIMIT),
        };
        if !name.is_empty() {
            categories.push((name.to_string(), limit));
        }
    }
    if categories.is_empty() {
        return default();
    }
    SearchScope {
        source: source.to_string(),
        categories,
    }
}

#[async_trait]
impl MediaProvider for MusicAssistantProvider {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    async fn get_radios(&self) -> Vec<RadioEntry> {
        // The two synthetic roots exist regardless of the upstream count.
        let stations = self.radios_cached().await;
        let (local, custom) = Self::split_stations(&stations);
        vec![
            RadioEntry {
                cmd: "local".to_string(),
                name: favorites_display_name(),
                icon: local
                    .first()
                    .and_then(|s| s.coverurl.clone())
                    .unwrap_or_default(),
                root: "local".to_string(),
            },
            RadioEntry {
                cmd: "custom".to_string(),
                name: "Custom Streams".to_string(),
                icon: custom
                    .first()
                    .and_then(|s| s.coverurl.clone())
                    .unwrap_or_default(),
                root: "custom".to_string(),
            },
        ]
    }

    async fn get_service_folder(
        &self,
        service: &str,
        folder_id: &str,
        _user: &str,
        offset: u32,
        limit: u32,
    ) -> FolderResponse {
        let stations = self.radios_cached().await;
        let (local, custom) = Self::split_stations(&stations);
        let items = match service {
            "local" => local,
            "custom" => custom,
            _ => Vec::new(),
        };
        let total = items.len() as u32;
        let window: Vec<RadioFolderItem> = items
            .into_iter()
            .skip(offset as usize)
            .take(if limit == 0 { usize::MAX } else { limit as usize })
            .collect();
        FolderResponse {
            id: folder_id.to_string(),
            name: favorites_display_name(),
            service: service.to_string(),
            start: offset,
            totalitems: total,
            items: window,
        }
    }

    async fn resolve_station(&self, _service: &str, station_id: &str) -> Option<RadioFolderItem> {
        let stations = self.radios_cached().await;
        let wanted = CacheKey::normalize(station_id);
        stations.into_iter().find(|s| {
            CacheKey::normalize(&s.id) == wanted
                || parse_identifier(&s.id)
                    .item_id
                    .map(|raw| CacheKey::normalize(&raw) == wanted)
                    .unwrap_or(false)
        })
    }

    async fn get_playlists(&self, offset: u32, limit: u32) -> PlaylistResponse {
        let playlists = self.playlists_cached().await;
        let total = playlists.len() as u32;
        let window: Vec<PlaylistItem> = playlists
            .into_iter()
            .skip(offset as usize)
            .take(if limit == 0 { usize::MAX } else { limit as usize })
            .collect();
        PlaylistResponse {
            id: "playlists".to_string(),
            name: "Playlists".to_string(),
            start: offset,
            totalitems: total,
            items: window,
        }
    }

    async fn get_playlist_items(
        &self,
        playlist_id: &str,
        offset: u32,
        limit: u32,
    ) -> Option<PlaylistResponse> {
        let raw_id = parse_identifier(playlist_id)
            .item_id
            .unwrap_or_else(|| playlist_id.to_string());

        // Metadata and tracks travel in parallel.
        let (meta, tracks) = tokio::join!(
            self.rpc(
                "music/playlists/get_playlist",
                json!({ "item_id": raw_id, "provider": "library" }),
            ),
            self.rpc(
                "music/playlists/playlist_tracks",
                json!({ "item_id": raw_id, "provider": "library" }),
            ),
        );
        let meta = meta?;
        if meta.is_null() {
            return None;
        }

        let playlist = map_playlist_item(&meta);
        let all: Vec<PlaylistItem> = tracks
            .and_then(|t| t.as_array().cloned())
            .unwrap_or_default()
            .iter()
            .map(map_playlist_track)
            // The playlist cover folds down into children without art.
            .map(|mut item| {
                if item.coverurl.is_none() {
                    item.coverurl = playlist.coverurl.clone();
                }
                item
            })
            .collect();

        let total = all.len() as u32;
        let window: Vec<PlaylistItem> = all
            .into_iter()
            .skip(offset as usize)
            .take(if limit == 0 { usize::MAX } else { limit as usize })
            .collect();
        Some(PlaylistResponse {
            id: playlist.id.clone(),
            name: playlist.name.clone(),
            start: offset,
            totalitems: total,
            items: window,
        })
    }

    async fn resolve_playlist(&self, _service: &str, playlist_id: &str) -> Option<PlaylistItem> {
        let wanted = CacheKey::normalize(playlist_id);
        let cached = self.playlists_cached().await.into_iter().find(|p| {
            CacheKey::normalize(&p.id) == wanted
                || parse_identifier(&p.id)
                    .item_id
                    .map(|raw| CacheKey::normalize(&raw) == wanted)
                    .unwrap_or(false)
        });
        if cached.is_some() {
            return cached;
        }
        let raw_id = parse_identifier(playlist_id)
            .item_id
            .unwrap_or_else(|| playlist_id.to_string());
        let meta = self
            .rpc(
                "music/playlists/get_playlist",
                json!({ "item_id": raw_id, "provider": "library" }),
            )
            .await?;
        if meta.is_null() {
            return None;
        }
        Some(map_playlist_item(&meta))
    }

    async fn get_media_folder(
        &self,
        folder_id: &str,
        offset: u32,
        limit: u32,
    ) -> MediaFolderResponse {
        let limit = if limit == 0 { 50 } else { limit };
        let parsed = parse_identifier(folder_id);

        // Library category lists are windowed by the server; root and child
        // listings arrive complete and are windowed here.
        let mut server_windowed = false;
        let (name, items) = match folder_id {
            "" | "root" | "start" => {
                let roots = ["albums", "artists", "tracks", "playlists", "radios"]
                    .iter()
                    .map(|kind| MediaFolderItem {
                        id: kind.to_string(),
                        name: {
                            let mut n = kind.to_string();
                            if let Some(first) = n.get_mut(0..1) {
                                first.make_ascii_uppercase();
                            }
                            n
                        },
                        kind: MediaKind::Folder,
                        ..MediaFolderItem::default()
                    })
                    .collect();
                ("Library".to_string(), roots)
            }
            "albums" | "artists" | "tracks" | "playlists" | "radios" => {
                server_windowed = true;
                let items = self.list_library(folder_id, offset, limit).await;
                (folder_id.to_string(), items)
            }
            _ => {
                // library:<provider>:<kind>:<id> nodes list their children.
                let kind = parsed.kind.clone().unwrap_or_default();
                let raw_id = parsed.item_id.clone().unwrap_or_default();
                let items = self.list_children(&kind, &raw_id).await;
                (raw_id, items)
            }
        };

        {
            #[allow(clippy::unwrap_used)]
            let mut cache = self.folder_cache.lock().unwrap();
            cache.store_folder(folder_id, &items);
        }

        let (total, window) = if server_windowed {
            (offset + items.len() as u32, items)
        } else {
            let total = items.len() as u32;
            let window: Vec<MediaFolderItem> = items
                .into_iter()
                .skip(offset as usize)
                .take(limit as usize)
                .collect();
            (total, window)
        };
        MediaFolderResponse {
            id: folder_id.to_string(),
            name,
            start: offset,
            totalitems: total,
            items: window,
        }
    }

    async fn resolve_media_item(&self, folder_id: &str, item_id: &str) -> Option<MediaFolderItem> {
        // Cache first: listed folders resolve in O(1) under any spelling.
        {
            #[allow(clippy::unwrap_used)]
            let cache = self.folder_cache.lock().unwrap();
            if let Some(item) = cache.get_item(item_id) {
                return Some(item);
            }
            if let Some(item) = cache.get_item(folder_id) {
                return Some(item);
            }
        }

        // Direct-id shortcut without a preceding folder listing.
        let parsed = parse_identifier(item_id);
        let (kind, raw_id) = match (parsed.kind, parsed.item_id) {
            (Some(kind), Some(raw)) => (kind, raw),
            _ => {
                let parsed = parse_identifier(folder_id);
                (parsed.kind?, parsed.item_id?)
            }
        };
        let item = self.fetch_single(&kind, &raw_id).await?;
        #[allow(clippy::unwrap_used)]
        let mut cache = self.folder_cache.lock().unwrap();
        cache.store_item(&item);
        Some(item)
    }

    async fn get_favorites(&self, _zone_id: u32, offset: u32, limit: u32) -> FavoriteResponse {
        // Five underlying category lists, folded into one favorite shape.
        let mut entries: Vec<FavoriteEntry> = Vec::new();
        for (kind, command) in [
            ("track", "music/tracks/library_items"),
            ("album", "music/albums/library_items"),
            ("artist", "music/artists/library_items"),
            ("playlist", "music/playlists/library_items"),
            ("radio", "music/radios/library_items"),
        ] {
            let Some(result) = self
                .rpc(command, json!({ "favorite": true, "limit": 100 }))
                .await
            else {
                continue;
            };
            for raw in result.as_array().cloned().unwrap_or_default() {
                if let Some(entry) = map_favorite(kind, &raw) {
                    entries.push(entry);
                }
            }
        }

        let total = entries.len() as u32;
        let window: Vec<FavoriteEntry> = entries
            .into_iter()
            .skip(offset as usize)
            .take(if limit == 0 { usize::MAX } else { limit as usize })
            .collect();
        FavoriteResponse {
            start: offset,
            totalitems: total,
            items: window,
        }
    }

    async fn get_recently_played(&self, zone_id: u32, limit: u32) -> RecentResponse {
        let entries = load_recents(zone_id).await;
        let window: Vec<RecentEntry> = entries
            .into_iter()
            .take(if limit == 0 { RECENT_LIMIT } else { limit as usize })
            .collect();
        RecentResponse {
            totalitems: window.len() as u32,
            items: window,
        }
    }

    async fn clear_recently_played(&self, zone_id: u32) {
        let path = recents_path(zone_id);
        if let Err(e) = tokio::fs::remove_file(&path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(zone = zone_id, "clearing recents failed: {e}");
            }
        }
    }

    async fn note_played(&self, zone_id: u32, audiopath: &str, name: &str) {
        let mut entries = load_recents(zone_id).await;
        entries.retain(|e| e.audiopath != audiopath);
        entries.insert(
            0,
            RecentEntry {
                audiopath: audiopath.to_string(),
                name: name.to_string(),
                artist: String::new(),
                coverurl: String::new(),
                audiotype: AudioType::from_path(audiopath),
                played_at: chrono::Utc::now().timestamp_millis(),
            },
        );
        entries.truncate(RECENT_LIMIT);
        save_recents(zone_id, &entries).await;
    }

    async fn global_search(&self, source: &str, query: &str) -> SearchResponse {
        let scope = parse_search_scope(source);

        // Preamble first: fresh correlation id plus the literal command.
        let correlation_id = uuid::Uuid::new_v4().to_string();
        self.bus.publish(PushEvent::GlobalSearchPreamble {
            id: correlation_id.clone(),
            command: format!("audio/cfg/globalsearch/{source}/{query}"),
        });

        let mut sections = Vec::new();
        for (category, limit) in &scope.categories {
            let media_type = match category.as_str() {
                "radio" | "station" | "stations" => "radio",
                "tracks" | "track" => "track",
                "albums" | "album" => "album",
                "artists" | "artist" => "artist",
                "playlists" | "playlist" => "playlist",
                other => other,
            };
            let hits = self.search_rpc(query, &[media_type], *limit).await;
            let items: Vec<MediaFolderItem> = hits.iter().map(map_media_item).collect();

            let section_name = if media_type == "radio" {
                "station".to_string()
            } else {
                format!("{media_type}s")
            };
            // Station sections keep a browse link for "more" and therefore
            // appear even when empty.
            let link = (media_type == "radio")
                .then(|| format!("{}:search:{}", scope.source, query));
            if items.is_empty() && link.is_none() {
                continue;
            }
            sections.push(SearchSection {
                category: section_name,
                totalitems: items.len() as u32,
                items,
                link,
            });
        }

        let response = SearchResponse { sections };
        let results = serde_json::to_value(&response).unwrap_or(Value::Null);
        self.bus.publish(PushEvent::GlobalSearchResult {
            id: correlation_id,
            results,
        });
        response
    }
}

// =============================================================================
// Vendor object mapping
// =============================================================================

fn first_image(item: &Value) -> Option<String> {
    item.get("metadata")
        .and_then(|m| m.get("images"))
        .and_then(Value::as_array)
        .and_then(|a| a.first())
        .and_then(|i| i.get("path").or(i.get("url")))
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| {
            item.get("image_url")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
}

fn vendor_item_id(item: &Value) -> String {
    item.get("item_id")
        .and_then(|v| {
            v.as_str()
                .map(str::to_string)
                .or_else(|| v.as_u64().map(|n| n.to_string()))
        })
        .unwrap_or_default()
}

fn map_radio_item(raw: &Value) -> RadioFolderItem {
    let raw_id = vendor_item_id(raw);
    let name = raw
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    // The playable path prefers the resolved stream URI.
    let audiopath = raw
        .get("uri")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    RadioFolderItem {
        id: build_radio_key(PROVIDER_NAME, &raw_id),
        name: name.clone(),
        kind: FolderItemKind::Station,
        station: Some(name),
        audiopath,
        coverurl: first_image(raw).map(|c| proxied_cover(&c)),
    }
}

fn map_playlist_item(raw: &Value) -> PlaylistItem {
    let raw_id = vendor_item_id(raw);
    PlaylistItem {
        id: build_playlist_uri(&raw_id, Some(PROVIDER_NAME)),
        name: raw
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        audiopath: build_playlist_uri(&raw_id, Some(PROVIDER_NAME)),
        coverurl: first_image(raw).map(|c| proxied_cover(&c)),
        artist: None,
        album: None,
        duration: None,
        items: raw
            .get("metadata")
            .and_then(|m| m.get("item_count"))
            .and_then(Value::as_u64)
            .map(|n| n as u32),
        owner: raw
            .get("owner")
            .and_then(Value::as_str)
            .map(str::to_string),
    }
}

fn map_playlist_track(raw: &Value) -> PlaylistItem {
    let raw_id = vendor_item_id(raw);
    PlaylistItem {
        id: build_library_uri("track", &raw_id, Some(PROVIDER_NAME)),
        name: raw
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        audiopath: build_library_uri("track", &raw_id, Some(PROVIDER_NAME)),
        coverurl: first_image(raw).map(|c| proxied_cover(&c)),
        artist: first_artist(raw),
        album: raw
            .get("album")
            .and_then(|a| a.get("name"))
            .and_then(Value::as_str)
            .map(str::to_string),
        duration: raw.get("duration").and_then(Value::as_f64),
        items: None,
        owner: None,
    }
}

fn first_artist(raw: &Value) -> Option<String> {
    raw.get("artists")
        .and_then(Value::as_array)
        .and_then(|a| a.first())
        .and_then(|a| a.get("name"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn map_media_item(raw: &Value) -> MediaFolderItem {
    let raw_id = vendor_item_id(raw);
    let media_type = raw
        .get("media_type")
        .and_then(Value::as_str)
        .unwrap_or("track");
    let kind = match media_type {
        "album" => MediaKind::Album,
        "artist" => MediaKind::Artist,
        "playlist" => MediaKind::Playlist,
        "radio" => MediaKind::Radio,
        "folder" => MediaKind::Folder,
        _ => MediaKind::Track,
    };
    let id = build_library_uri(kind.as_str(), &raw_id, Some(PROVIDER_NAME));
    MediaFolderItem {
        id: id.clone(),
        name: raw
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        kind,
        audiopath: id,
        artist: first_artist(raw),
        album: raw
            .get("album")
            .and_then(|a| a.get("name"))
            .and_then(Value::as_str)
            .map(str::to_string),
        coverurl: first_image(raw).map(|c| proxied_cover(&c)),
        duration: raw.get("duration").and_then(Value::as_f64),
    }
}

/// Map one favorite category entry; entries that cannot produce a playable
/// `audiopath` are dropped.
fn map_favorite(kind: &str, raw: &Value) -> Option<FavoriteEntry> {
    let raw_id = vendor_item_id(raw);
    if raw_id.is_empty() {
        return None;
    }
    let name = raw
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let (audiopath, audiotype, station) = match kind {
        "radio" => (
            build_radio_key(PROVIDER_NAME, &raw_id),
            AudioType::Radio,
            Some(name.clone()),
        ),
        "playlist" => (
            build_playlist_uri(&raw_id, Some(PROVIDER_NAME)),
            AudioType::Playlist,
            None,
        ),
        kind => (
            build_library_uri(kind, &raw_id, Some(PROVIDER_NAME)),
            AudioType::File,
            None,
        ),
    };
    if audiopath.is_empty() {
        return None;
    }

    Some(FavoriteEntry {
        name: name.clone(),
        title: name,
        artist: first_artist(raw).unwrap_or_default(),
        album: raw
            .get("album")
            .and_then(|a| a.get("name"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        coverurl: first_image(raw).map(|c| proxied_cover(&c)).unwrap_or_default(),
        audiopath,
        audiotype,
        service: PROVIDER_NAME.to_string(),
        provider: PROVIDER_NAME.to_string(),
        raw_id,
        duration: raw.get("duration").and_then(Value::as_f64),
        station,
    })
}

// =============================================================================
// Recently played persistence
// =============================================================================

fn recents_path(zone_id: u32) -> std::path::PathBuf {
    get_data_dir().join("recent").join(format!("{zone_id}.json"))
}

async fn load_recents(zone_id: u32) -> Vec<RecentEntry> {
    match tokio::fs::read(recents_path(zone_id)).await {
        Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_default(),
        Err(_) => Vec::new(),
    }
}

async fn save_recents(zone_id: u32, entries: &[RecentEntry]) {
    let path = recents_path(zone_id);
    if let Some(parent) = path.parent() {
        if let Err(e) = tokio::fs::create_dir_all(parent).await {
            warn!(zone = zone_id, "recents dir: {e}");
            return;
        }
    }
    match serde_json::to_vec_pretty(entries) {
        Ok(bytes) => {
            let tmp = path.with_extension("json.tmp");
            if tokio::fs::write(&tmp, bytes).await.is_ok() {
                if let Err(e) = tokio::fs::rename(&tmp, &path).await {
                    warn!(zone = zone_id, "recents rename: {e}");
                }
            }
        }
        Err(e) => debug!(zone = zone_id, "recents serialize: {e}"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_variants_cover_spellings() {
        let keys = CacheKey::variants("library:ma:track:a b");
        assert!(keys.contains(&"library:ma:track:a b".to_string()));
        assert!(keys.iter().any(|k| k.contains("%20")));

        let keys = CacheKey::variants("A%20B");
        assert!(keys.contains(&"A B".to_string()));
        assert!(keys.contains(&"a%20b".to_string()));
    }

    #[test]
    fn cache_key_normalize_unifies() {
        assert_eq!(
            CacheKey::normalize("A%20B"),
            CacheKey::normalize("a b"),
        );
    }

    #[test]
    fn folder_cache_resolves_any_variant() {
        let mut cache = FolderCache::default();
        let item = MediaFolderItem {
            id: "library:musicassistant:album:42".to_string(),
            name: "Album".to_string(),
            kind: MediaKind::Album,
            ..MediaFolderItem::default()
        };
        cache.store_folder("albums", &[item]);

        assert!(cache.get_item("library:musicassistant:album:42").is_some());
        // Raw vendor id resolves too.
        assert!(cache.get_item("42").is_some());
        assert!(cache.get_item("nope").is_none());
    }

    #[test]
    fn search_scope_parsing() {
        let scope = parse_search_scope("tunein:radio#20");
        assert_eq!(scope.source, "tunein");
        assert_eq!(scope.categories, vec![("radio".to_string(), 20)]);

        let scope = parse_search_scope("spotify:tracks#5,albums");
        assert_eq!(
            scope.categories,
            vec![("tracks".to_string(), 5), ("albums".to_string(), 25)]
        );

        // Unknown scopes fall back to the default category set.
        let scope = parse_search_scope("garbage");
        assert_eq!(scope.categories.len(), 4);
        assert!(scope.categories.iter().all(|(_, l)| *l == 25));

        // Only the first group drives the request.
        let scope = parse_search_scope("tunein:radio|spotify:tracks");
        assert_eq!(scope.categories, vec![("radio".to_string(), 25)]);
    }

    #[test]
    fn favorite_mapping_drops_unplayable() {
        let entry = map_favorite("track", &json!({ "name": "No Id" }));
        assert!(entry.is_none());

        let entry = map_favorite(
            "radio",
            &json!({ "item_id": "7", "name": "Jazz FM" }),
        )
        .unwrap();
        assert_eq!(entry.audiopath, "radio:musicassistant:7");
        assert_eq!(entry.station.as_deref(), Some("Jazz FM"));
    }

    #[test]
    fn media_item_mapping() {
        let raw = json!({
            "item_id": 42,
            "name": "Kind of Blue",
            "media_type": "album",
            "artists": [{ "name": "Miles Davis" }],
            "metadata": { "images": [{ "path": "http://x/cover.jpg" }] },
        });
        let item = map_media_item(&raw);
        assert_eq!(item.id, "library:musicassistant:album:42");
        assert_eq!(item.kind, MediaKind::Album);
        assert_eq!(item.artist.as_deref(), Some("Miles Davis"));
        assert_eq!(item.coverurl.as_deref(), Some("http://x/cover.jpg"));
    }

    #[test]
    fn playlist_track_inherits_cover_shape() {
        let raw = json!({
            "item_id": "t1",
            "name": "Track",
            "duration": 123.0,
        });
        let track = map_playlist_track(&raw);
        assert_eq!(track.id, "library:musicassistant:track:t1");
        assert!(track.coverurl.is_none());
        assert_eq!(track.duration, Some(123.0));
    }

    #[test]
    fn station_split_by_stream_url() {
        let stations = vec![
            RadioFolderItem {
                id: "radio:musicassistant:1".to_string(),
                audiopath: "tunein://s1".to_string(),
                ..RadioFolderItem::default()
            },
            RadioFolderItem {
                id: "radio:musicassistant:2".to_string(),
                audiopath: "http://stream.example/radio.mp3".to_string(),
                ..RadioFolderItem::default()
            },
        ];
        let (local, custom) = MusicAssistantProvider::split_stations(&stations);
        assert_eq!(local.len(), 1);
        assert_eq!(custom.len(), 1);
        assert!(custom[0].audiopath.starts_with("http://"));
    }
}
