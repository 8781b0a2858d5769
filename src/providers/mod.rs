//! Media-provider abstraction: contract, registry, and selection.
//!
//! Providers expose the library surface (radios, playlists, media folders,
//! favorites, recently played, global search). Individual operations may be
//! absent; the defaults return empty responses so the router degrades
//! gracefully. Lookup misses are empty responses, never errors - the UI
//! relies on presence, not exceptions.

pub mod model;

mod dummy;
mod musicassistant;

pub use dummy::DummyProvider;
pub use musicassistant::MusicAssistantProvider;

use std::sync::{Arc, OnceLock, RwLock};

use async_trait::async_trait;
use tracing::{info, warn};

use crate::bus::SharedBus;
use crate::config::MusicAssistantConfig;
use model::{
    FavoriteResponse, FolderResponse, MediaFolderItem, MediaFolderResponse, PlaylistItem,
    PlaylistResponse, RadioEntry, RadioFolderItem, RecentResponse, SearchResponse,
};

/// Registry keys accepted in config validation (aliases included).
pub const KNOWN_PROVIDERS: &[&str] = &["dummy", "musicassistant", "ma", "music-assistant"];

/// Pluggable provider contract. Every returned item carries the canonical id
/// grammar; pagination echoes the requested offset in `start`.
#[async_trait]
pub trait MediaProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn get_radios(&self) -> Vec<RadioEntry> {
        Vec::new()
    }

    async fn get_service_folder(
        &self,
        service: &str,
        folder_id: &str,
        _user: &str,
        offset: u32,
        _limit: u32,
    ) -> FolderResponse {
        FolderResponse::empty(service, folder_id, offset)
    }

    async fn resolve_station(&self, _service: &str, _station_id: &str) -> Option<RadioFolderItem> {
        None
    }

    async fn get_playlists(&self, offset: u32, _limit: u32) -> PlaylistResponse {
        PlaylistResponse::empty("playlists", offset)
    }

    async fn get_playlist_items(
        &self,
        _playlist_id: &str,
        _offset: u32,
        _limit: u32,
    ) -> Option<PlaylistResponse> {
        None
    }

    async fn resolve_playlist(&self, _service: &str, _playlist_id: &str) -> Option<PlaylistItem> {
        None
    }

    async fn get_media_folder(
        &self,
        folder_id: &str,
        offset: u32,
        _limit: u32,
    ) -> MediaFolderResponse {
        MediaFolderResponse::empty(folder_id, offset)
    }

    async fn resolve_media_item(
        &self,
        _folder_id: &str,
        _item_id: &str,
    ) -> Option<MediaFolderItem> {
        None
    }

    async fn get_favorites(&self, _zone_id: u32, offset: u32, _limit: u32) -> FavoriteResponse {
        FavoriteResponse::empty(offset)
    }

    async fn get_recently_played(&self, _zone_id: u32, _limit: u32) -> RecentResponse {
        RecentResponse::default()
    }

    async fn clear_recently_played(&self, _zone_id: u32) {}

    /// Record a playback start so it shows up in recently played.
    async fn note_played(&self, _zone_id: u32, _audiopath: &str, _name: &str) {}

    async fn global_search(&self, _source: &str, _query: &str) -> SearchResponse {
        SearchResponse::default()
    }
}

// =============================================================================
// Registry + process-wide selection
// =============================================================================

/// Settings the factory needs to build the selected provider.
#[derive(Clone, Default)]
pub struct ProviderSettings {
    pub key: Option<String>,
    pub musicassistant: Option<MusicAssistantConfig>,
    pub bus: Option<SharedBus>,
}

struct Registry {
    settings: ProviderSettings,
    instance: Option<Arc<dyn MediaProvider>>,
}

static REGISTRY: OnceLock<RwLock<Registry>> = OnceLock::new();

fn registry() -> &'static RwLock<Registry> {
    REGISTRY.get_or_init(|| {
        RwLock::new(Registry {
            settings: ProviderSettings::default(),
            instance: None,
        })
    })
}

/// Install the selection settings at startup (or from tests). Drops any
/// cached instance so the next [`media_provider`] call re-selects.
pub fn configure_providers(settings: ProviderSettings) {
    #[allow(clippy::unwrap_used)] // lock poisoning is unrecoverable here
    let mut reg = registry().write().unwrap();
    reg.settings = settings;
    reg.instance = None;
}

/// Drop the cached provider instance (tests, reconfiguration).
pub fn reset_provider() {
    #[allow(clippy::unwrap_used)]
    let mut reg = registry().write().unwrap();
    reg.instance = None;
}

fn build_provider(settings: &ProviderSettings) -> Arc<dyn MediaProvider> {
    let key = settings.key.as_deref().unwrap_or("dummy");
    match key {
        "musicassistant" | "ma" | "music-assistant" => {
            if let (Some(ma), Some(bus)) = (&settings.musicassistant, &settings.bus) {
                info!("media provider: musicassistant ({}:{})", ma.host, ma.port);
                return Arc::new(MusicAssistantProvider::new(ma.clone(), bus.clone()));
            }
            warn!("musicassistant provider selected but not configured, using dummy");
            Arc::new(DummyProvider::default())
        }
        "dummy" => Arc::new(DummyProvider::default()),
        other => {
            warn!("unknown media provider '{}', using dummy", other);
            Arc::new(DummyProvider::default())
        }
    }
}

/// The process-wide provider, instantiated lazily on first use.
pub fn media_provider() -> Arc<dyn MediaProvider> {
    {
        #[allow(clippy::unwrap_used)]
        let reg = registry().read().unwrap();
        if let Some(instance) = &reg.instance {
            return instance.clone();
        }
    }
    #[allow(clippy::unwrap_used)]
    let mut reg = registry().write().unwrap();
    if let Some(instance) = &reg.instance {
        return instance.clone();
    }
    let instance = build_provider(&reg.settings);
    reg.instance = Some(instance.clone());
    instance
}
