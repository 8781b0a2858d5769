//! Persistent per-zone favorites store.
//!
//! One JSON file per zone under `<data>/favorites/<zoneId>.json`. Slots are
//! contiguous 1..n after every mutation; numeric ids derive from slots
//! (`BASE_FAVORITE_ZONE + slot - 1`) and are kept disjoint from other
//! miniserver-assigned ids. Writes are atomic (write-then-rename), unknown
//! JSON keys survive round-trips, and every mutation broadcasts a
//! `roomfavchanged_event`.
//!
//! Reorder keeps item ids stable so the UI can track entries; structural
//! mutations (add/delete/copy) collapse ids back to the slot-derived
//! sequence.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::bus::{PushEvent, SharedBus};
use crate::error::{Result, ServerError};
use crate::ids::{parse_identifier, IdFamily};
use crate::providers::{media_provider, MediaProvider};
use crate::zone::status::AudioType;

/// Base for slot-derived favorite ids.
pub const BASE_FAVORITE_ZONE: u32 = 1_000_000;
/// Upper bound on remembered enrichment lookups.
const ENRICH_CACHE_LIMIT: usize = 512;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FavoriteItem {
    /// Slot-derived numeric id, stable across reorders.
    pub id: u32,
    /// 1-based position.
    pub slot: u32,
    pub name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub artist: String,
    #[serde(default)]
    pub album: String,
    #[serde(default)]
    pub coverurl: String,
    #[serde(default)]
    pub audiopath: String,
    #[serde(rename = "type", default)]
    pub audiotype: AudioType,
    #[serde(default)]
    pub service: String,
    #[serde(default)]
    pub provider: String,
    #[serde(rename = "rawId", default)]
    pub raw_id: String,
    #[serde(default)]
    pub duration: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub station: Option<String>,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub plus: bool,
    /// Canonical id used for playback and enrichment.
    #[serde(rename = "sourceId", default)]
    pub source_id: String,
    /// Forward-compatibility: keys this build does not know survive.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FavoriteFile {
    pub id: String,
    pub name: String,
    pub start: u32,
    pub totalitems: u32,
    /// Milliseconds since epoch of the last write.
    pub ts: i64,
    pub items: Vec<FavoriteItem>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FavoriteFile {
    fn empty(zone_id: u32) -> Self {
        Self {
            id: zone_id.to_string(),
            name: "Favorites".to_string(),
            start: 0,
            totalitems: 0,
            ts: 0,
            items: Vec::new(),
            extra: Map::new(),
        }
    }
}

/// Derive a slug id from a display title (`My Radio!` -> `my-radio`).
fn slugify(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    let mut last_dash = true;
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            out.push('-');
            last_dash = true;
        }
    }
    out.trim_end_matches('-').to_string()
}

#[derive(Default)]
struct EnrichCache {
    /// `source_id` -> resolved metadata; `None` remembers a miss.
    entries: HashMap<String, Option<EnrichData>>,
    order: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct EnrichData {
    coverurl: Option<String>,
    artist: Option<String>,
    album: Option<String>,
    station: Option<String>,
    duration: Option<f64>,
    audiotype: Option<AudioType>,
}

impl EnrichCache {
    fn get(&self, key: &str) -> Option<&Option<EnrichData>> {
        self.entries.get(key)
    }

    fn insert(&mut self, key: String, value: Option<EnrichData>) {
        if !self.entries.contains_key(&key) {
            if self.order.len() >= ENRICH_CACHE_LIMIT {
                let evicted = self.order.remove(0);
                self.entries.remove(&evicted);
            }
            self.order.push(key.clone());
        }
        self.entries.insert(key, value);
    }
}

pub struct FavoritesStore {
    dir: PathBuf,
    bus: SharedBus,
    /// Per-file locks; cross-file operations never hold two at once.
    locks: Mutex<HashMap<u32, Arc<Mutex<()>>>>,
    enrich_cache: std::sync::Mutex<EnrichCache>,
    provider_override: Option<Arc<dyn MediaProvider>>,
}

impl FavoritesStore {
    pub fn new(dir: impl Into<PathBuf>, bus: SharedBus) -> Self {
        Self {
            dir: dir.into(),
            bus,
            locks: Mutex::new(HashMap::new()),
            enrich_cache: std::sync::Mutex::new(EnrichCache::default()),
            provider_override: None,
        }
    }

    /// Dependency-injected provider (tests, embedded use).
    pub fn with_provider(mut self, provider: Arc<dyn MediaProvider>) -> Self {
        self.provider_override = Some(provider);
        self
    }

    fn provider(&self) -> Arc<dyn MediaProvider> {
        self.provider_override
            .clone()
            .unwrap_or_else(media_provider)
    }

    fn file_path(&self, zone_id: u32) -> PathBuf {
        self.dir.join(format!("{zone_id}.json"))
    }

    async fn zone_lock(&self, zone_id: u32) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(zone_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn load(&self, zone_id: u32) -> Result<FavoriteFile> {
        let path = self.file_path(zone_id);
        match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                ServerError::Invariant(format!("{}: unreadable favorites: {e}", path.display()))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(FavoriteFile::empty(zone_id)),
            Err(e) => Err(ServerError::from(e)),
        }
    }

    /// Atomic write-then-rename, then the change broadcast.
    async fn save_and_notify(&self, zone_id: u32, file: &mut FavoriteFile) -> Result<()> {
        file.id = zone_id.to_string();
        file.name = "Favorites".to_string();
        file.totalitems = file.items.len() as u32;
        file.ts = chrono::Utc::now().timestamp_millis();

        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.file_path(zone_id);
        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(file)
            .map_err(|e| ServerError::Resource(format!("serialize favorites: {e}")))?;
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;

        self.bus.publish(PushEvent::RoomFavChangedEvent {
            playerid: zone_id,
            count: file.totalitems,
        });
        Ok(())
    }

    fn check_slots(file: &FavoriteFile) -> Result<()> {
        for (index, item) in file.items.iter().enumerate() {
            if item.slot != index as u32 + 1 {
                return Err(ServerError::Invariant(format!(
                    "slot discontinuity at index {index}: slot {}",
                    item.slot
                )));
            }
        }
        Ok(())
    }

    /// Resequence slots and slot-derived ids after a structural mutation.
    fn resequence(file: &mut FavoriteFile) {
        for (index, item) in file.items.iter_mut().enumerate() {
            item.slot = index as u32 + 1;
            item.id = BASE_FAVORITE_ZONE + index as u32;
        }
    }

    /// Resequence slots only, preserving ids (reorder semantics).
    fn resequence_slots(file: &mut FavoriteFile) {
        for (index, item) in file.items.iter_mut().enumerate() {
            item.slot = index as u32 + 1;
        }
    }

    /// Paginated view; `limit <= 0` returns everything.
    pub async fn get(&self, zone_id: u32, start: u32, limit: i64) -> Result<FavoriteFile> {
        let file = self.load(zone_id).await?;
        let total = file.items.len() as u32;
        let items: Vec<FavoriteItem> = if limit <= 0 {
            file.items.iter().skip(start as usize).cloned().collect()
        } else {
            file.items
                .iter()
                .skip(start as usize)
                .take(limit as usize)
                .cloned()
                .collect()
        };
        Ok(FavoriteFile {
            start,
            totalitems: total,
            items,
            ..file
        })
    }

    /// Append a favorite; a missing `source_id` derives from the title.
    pub async fn add(
        &self,
        zone_id: u32,
        title: &str,
        source_id: Option<&str>,
    ) -> Result<FavoriteFile> {
        let lock = self.zone_lock(zone_id).await;
        let _guard = lock.lock().await;

        let mut file = self.load(zone_id).await?;
        let source_id = source_id
            .map(str::to_string)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| slugify(title));

        let parsed = parse_identifier(&source_id);
        let mut item = FavoriteItem {
            name: title.to_string(),
            title: title.to_string(),
            audiopath: source_id.clone(),
            audiotype: AudioType::from_path(&source_id),
            provider: parsed.provider.clone().unwrap_or_default(),
            service: parsed.provider.unwrap_or_default(),
            raw_id: parsed.item_id.unwrap_or_default(),
            source_id,
            ..FavoriteItem::default()
        };
        self.enrich(&mut item).await;

        file.items.push(item);
        Self::resequence(&mut file);
        self.save_and_notify(zone_id, &mut file).await?;
        Ok(file)
    }

    /// Remove by numeric id, then resequence.
    pub async fn delete(&self, zone_id: u32, id: u32) -> Result<FavoriteFile> {
        let lock = self.zone_lock(zone_id).await;
        let _guard = lock.lock().await;

        let mut file = self.load(zone_id).await?;
        let before = file.items.len();
        file.items.retain(|item| item.id != id);
        if file.items.len() == before {
            // Unknown id: no-op ack, no broadcast.
            return Ok(file);
        }
        Self::resequence(&mut file);
        self.save_and_notify(zone_id, &mut file).await?;
        Ok(file)
    }

    /// Stable reorder: mentioned ids first in the given order, unmentioned
    /// items keep their relative order behind them. Ids are preserved.
    pub async fn reorder(&self, zone_id: u32, ordered_ids: &[u32]) -> Result<FavoriteFile> {
        let lock = self.zone_lock(zone_id).await;
        let _guard = lock.lock().await;

        let mut file = self.load(zone_id).await?;
        let mut mentioned: Vec<FavoriteItem> = Vec::new();
        for id in ordered_ids {
            if let Some(pos) = file.items.iter().position(|i| i.id == *id) {
                mentioned.push(file.items.remove(pos));
            }
        }
        let mut items = mentioned;
        items.append(&mut file.items);
        file.items = items;
        Self::resequence_slots(&mut file);

        if let Err(e) = Self::check_slots(&file) {
            // Roll back by re-reading the persisted state.
            warn!(zone = zone_id, "reorder rejected: {e}");
            return Err(e);
        }
        self.save_and_notify(zone_id, &mut file).await?;
        Ok(file)
    }

    pub async fn set_plus(&self, zone_id: u32, id: u32, plus: bool) -> Result<FavoriteFile> {
        let lock = self.zone_lock(zone_id).await;
        let _guard = lock.lock().await;

        let mut file = self.load(zone_id).await?;
        let Some(item) = file.items.iter_mut().find(|i| i.id == id) else {
            return Ok(file);
        };
        if item.plus == plus {
            return Ok(file);
        }
        item.plus = plus;
        self.save_and_notify(zone_id, &mut file).await?;
        Ok(file)
    }

    /// Overwrite each destination with the source zone's list. Ids collapse
    /// to the slot-derived sequence relative to each destination.
    pub async fn copy(&self, source_zone: u32, dest_zones: &[u32]) -> Result<()> {
        let source = {
            let lock = self.zone_lock(source_zone).await;
            let _guard = lock.lock().await;
            self.load(source_zone).await?
        };

        for dest in dest_zones {
            if *dest == source_zone {
                continue;
            }
            let lock = self.zone_lock(*dest).await;
            let _guard = lock.lock().await;
            let mut file = FavoriteFile {
                items: source.items.clone(),
                ..FavoriteFile::empty(*dest)
            };
            Self::resequence(&mut file);
            self.save_and_notify(*dest, &mut file).await?;
        }
        Ok(())
    }

    /// Favorite lookup for `serviceplay`/`playlistplay`/`favoriteplay`.
    pub async fn get_for_playback(&self, zone_id: u32, id: u32) -> Result<Option<FavoriteItem>> {
        let file = self.load(zone_id).await?;
        Ok(file.items.into_iter().find(|i| i.id == id))
    }

    // =========================================================================
    // Enrichment
    // =========================================================================

    /// Fill missing metadata from the media provider. Failures and misses
    /// never block the caller; both outcomes are remembered per source id.
    async fn enrich(&self, item: &mut FavoriteItem) {
        if !item.coverurl.is_empty() && !item.artist.is_empty() && !item.album.is_empty() {
            return;
        }
        let key = item.source_id.clone();
        if key.is_empty() {
            return;
        }

        let cached = {
            #[allow(clippy::unwrap_used)] // lock poisoning is unrecoverable here
            let cache = self.enrich_cache.lock().unwrap();
            cache.get(&key).cloned()
        };
        let data = match cached {
            Some(data) => data,
            None => {
                let resolved = self.resolve_metadata(&key).await;
                #[allow(clippy::unwrap_used)]
                let mut cache = self.enrich_cache.lock().unwrap();
                cache.insert(key.clone(), resolved.clone());
                resolved
            }
        };

        let Some(data) = data else {
            debug!(source = %key, "no enrichment available");
            return;
        };
        if item.coverurl.is_empty() {
            if let Some(cover) = data.coverurl {
                item.coverurl = cover;
            }
        }
        if item.artist.is_empty() {
            if let Some(artist) = data.artist {
                item.artist = artist;
            }
        }
        if item.album.is_empty() {
            if let Some(album) = data.album {
                item.album = album;
            }
        }
        if item.station.is_none() {
            item.station = data.station;
        }
        if item.duration == 0.0 {
            if let Some(duration) = data.duration {
                item.duration = duration;
            }
        }
        if let Some(audiotype) = data.audiotype {
            item.audiotype = audiotype;
        }
    }

    async fn resolve_metadata(&self, source_id: &str) -> Option<EnrichData> {
        let provider = self.provider();
        let parsed = parse_identifier(source_id);
        let item_id = parsed.item_id.as_deref().unwrap_or_default();
        let service = parsed.provider.as_deref().unwrap_or_default();

        match parsed.family {
            Some(IdFamily::Library) => {
                let resolved = provider.resolve_media_item(source_id, item_id).await?;
                Some(EnrichData {
                    coverurl: resolved.coverurl,
                    artist: resolved.artist,
                    album: resolved.album,
                    station: None,
                    duration: resolved.duration,
                    audiotype: None,
                })
            }
            Some(IdFamily::Playlist) => {
                let resolved = provider.resolve_playlist(service, item_id).await?;
                Some(EnrichData {
                    coverurl: resolved.coverurl,
                    artist: resolved.artist,
                    album: resolved.album,
                    station: None,
                    duration: resolved.duration,
                    audiotype: Some(AudioType::Playlist),
                })
            }
            Some(IdFamily::Radio) => {
                let resolved = provider.resolve_station(service, item_id).await?;
                Some(EnrichData {
                    coverurl: resolved.coverurl,
                    artist: None,
                    album: None,
                    station: Some(resolved.name),
                    duration: None,
                    audiotype: Some(AudioType::Radio),
                })
            }
            _ => None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::bus::create_bus;
    use crate::providers::model::RadioFolderItem;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn store(dir: &Path) -> FavoritesStore {
        FavoritesStore::new(dir, create_bus())
            .with_provider(Arc::new(crate::providers::DummyProvider::default()))
    }

    #[tokio::test]
    async fn add_assigns_contiguous_slots_and_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());

        store.add(7, "First", Some("radio:tunein:s1")).await.unwrap();
        store.add(7, "Second", None).await.unwrap();
        let file = store.add(7, "Third", None).await.unwrap();

        assert_eq!(file.totalitems, 3);
        for (i, item) in file.items.iter().enumerate() {
            assert_eq!(item.slot, i as u32 + 1);
            assert_eq!(item.id, BASE_FAVORITE_ZONE + i as u32);
        }
        // Slug-derived source id.
        assert_eq!(file.items[1].source_id, "second");
    }

    #[tokio::test]
    async fn delete_resequences() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        for name in ["a", "b", "c"] {
            store.add(7, name, None).await.unwrap();
        }
        let file = store.delete(7, BASE_FAVORITE_ZONE + 1).await.unwrap();
        assert_eq!(file.totalitems, 2);
        assert_eq!(file.items[0].name, "a");
        assert_eq!(file.items[1].name, "c");
        assert_eq!(file.items[1].slot, 2);
        assert_eq!(file.items[1].id, BASE_FAVORITE_ZONE + 1);
    }

    #[tokio::test]
    async fn reorder_is_stable_and_preserves_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        for name in ["a", "b", "c", "d"] {
            store.add(7, name, None).await.unwrap();
        }

        let file = store
            .reorder(7, &[BASE_FAVORITE_ZONE + 2, BASE_FAVORITE_ZONE])
            .await
            .unwrap();

        let ids: Vec<u32> = file.items.iter().map(|i| i.id).collect();
        assert_eq!(
            ids,
            vec![
                BASE_FAVORITE_ZONE + 2,
                BASE_FAVORITE_ZONE,
                BASE_FAVORITE_ZONE + 1,
                BASE_FAVORITE_ZONE + 3,
            ]
        );
        let slots: Vec<u32> = file.items.iter().map(|i| i.slot).collect();
        assert_eq!(slots, vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn reorder_emits_change_event() {
        let dir = tempfile::tempdir().unwrap();
        let bus = create_bus();
        let store = FavoritesStore::new(dir.path(), bus.clone())
            .with_provider(Arc::new(crate::providers::DummyProvider::default()));
        for name in ["a", "b"] {
            store.add(7, name, None).await.unwrap();
        }
        let mut rx = bus.subscribe();
        store
            .reorder(7, &[BASE_FAVORITE_ZONE + 1])
            .await
            .unwrap();
        let event = rx.recv().await.unwrap();
        assert_eq!(
            event,
            PushEvent::RoomFavChangedEvent {
                playerid: 7,
                count: 2
            }
        );
    }

    #[tokio::test]
    async fn file_round_trips_and_preserves_unknown_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        store.add(7, "a", None).await.unwrap();

        // Inject an unknown key the way a newer build would.
        let path = dir.path().join("7.json");
        let mut value: Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        value["futureKey"] = Value::String("kept".to_string());
        value["items"][0]["futureItemKey"] = Value::from(42);
        std::fs::write(&path, serde_json::to_vec(&value).unwrap()).unwrap();

        let file = store.add(7, "b", None).await.unwrap();
        assert_eq!(file.extra.get("futureKey").unwrap(), "kept");
        assert_eq!(file.items[0].extra.get("futureItemKey").unwrap(), 42);

        // And it survives on disk too.
        let reread: Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(reread["futureKey"], "kept");
    }

    #[tokio::test]
    async fn copy_overwrites_and_resequences() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        for name in ["a", "b"] {
            store.add(1, name, None).await.unwrap();
        }
        store.add(2, "old", None).await.unwrap();

        store.copy(1, &[2, 3]).await.unwrap();
        let dest2 = store.get(2, 0, 0).await.unwrap();
        let dest3 = store.get(3, 0, 0).await.unwrap();
        assert_eq!(dest2.totalitems, 2);
        assert_eq!(dest2.items[0].name, "a");
        assert_eq!(dest3.items[1].id, BASE_FAVORITE_ZONE + 1);
        assert_eq!(dest3.id, "3");
    }

    #[tokio::test]
    async fn get_pagination() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        for name in ["a", "b", "c", "d"] {
            store.add(7, name, None).await.unwrap();
        }
        let window = store.get(7, 1, 2).await.unwrap();
        assert_eq!(window.start, 1);
        assert_eq!(window.totalitems, 4);
        assert_eq!(window.items.len(), 2);
        assert_eq!(window.items[0].name, "b");

        let all = store.get(7, 0, 0).await.unwrap();
        assert_eq!(all.items.len(), 4);
    }

    #[tokio::test]
    async fn get_for_playback_and_plus() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        store
            .add(7, "Radio", Some("radio:musicassistant:s24940"))
            .await
            .unwrap();

        let item = store
            .get_for_playback(7, BASE_FAVORITE_ZONE)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(item.source_id, "radio:musicassistant:s24940");
        assert!(store.get_for_playback(7, 55).await.unwrap().is_none());

        let file = store.set_plus(7, BASE_FAVORITE_ZONE, true).await.unwrap();
        assert!(file.items[0].plus);
    }

    // A provider that counts resolution calls, for cache behaviour tests.
    struct CountingProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl MediaProvider for CountingProvider {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn resolve_station(
            &self,
            _service: &str,
            station_id: &str,
        ) -> Option<RadioFolderItem> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Some(RadioFolderItem {
                id: station_id.to_string(),
                name: "Jazz FM".to_string(),
                coverurl: Some("http://x/cover.jpg".to_string()),
                ..RadioFolderItem::default()
            })
        }
    }

    #[tokio::test]
    async fn enrichment_fills_missing_fields_and_caches() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
        });
        let store =
            FavoritesStore::new(dir.path(), create_bus()).with_provider(provider.clone());

        let file = store
            .add(7, "My Station", Some("radio:tunein:s24940"))
            .await
            .unwrap();
        assert_eq!(file.items[0].coverurl, "http://x/cover.jpg");
        assert_eq!(file.items[0].station.as_deref(), Some("Jazz FM"));
        assert_eq!(file.items[0].audiotype, AudioType::Radio);

        // Second add with the same source id hits the cache.
        store
            .add(8, "Same Station", Some("radio:tunein:s24940"))
            .await
            .unwrap();
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn slugify_titles() {
        assert_eq!(slugify("My Radio!"), "my-radio");
        assert_eq!(slugify("  Jazz   FM  "), "jazz-fm");
        assert_eq!(slugify("***"), "");
    }

    #[test]
    fn enrich_cache_is_bounded() {
        let mut cache = EnrichCache::default();
        for i in 0..(ENRICH_CACHE_LIMIT + 10) {
            cache.insert(format!("key-{i}"), None);
        }
        assert!(cache.entries.len() <= ENRICH_CACHE_LIMIT);
        // The oldest entries were evicted.
        assert!(cache.get("key-0").is_none());
        assert!(cache.get(&format!("key-{}", ENRICH_CACHE_LIMIT + 9)).is_some());
    }
}
