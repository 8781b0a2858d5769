//! Content-adapter layer: cross-backend "play this URI" glue.
//!
//! Adapters are registered per backend kind (optionally per provider) and
//! declare which content verbs they handle. The router asks a zone's adapter
//! to execute a command only after the backend produced no native handling.
//! Adapters may share the backend's RPC client through the context the
//! manager hands them.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use crate::backends::rpc::RpcClient;
use crate::backends::ZoneCommand;
use crate::config::ZoneConfig;

/// Everything an adapter gets for one execution.
pub struct AdapterContext<'a> {
    pub zone_id: u32,
    pub config: &'a ZoneConfig,
    /// The owning backend's RPC client, when it has one to share.
    pub client: Option<RpcClient>,
}

#[async_trait]
pub trait ContentAdapter: Send + Sync {
    fn name(&self) -> &'static str;

    /// Which command verbs this adapter claims.
    fn handles(&self, verb: &str) -> bool;

    /// Execute the command; `Ok(false)` means "not handled after all".
    async fn execute(&self, ctx: &AdapterContext<'_>, command: &ZoneCommand) -> Result<bool>;
}

/// Registry keyed by `<backend>` or `<backend>:<provider>`.
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: RwLock<HashMap<String, Arc<dyn ContentAdapter>>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, key: &str, adapter: Arc<dyn ContentAdapter>) {
        #[allow(clippy::unwrap_used)] // lock poisoning is unrecoverable here
        let mut adapters = self.adapters.write().unwrap();
        adapters.insert(key.to_string(), adapter);
    }

    /// Most specific key wins: `<backend>:<provider>` before `<backend>`.
    pub fn select(&self, backend: &str, provider: Option<&str>) -> Option<Arc<dyn ContentAdapter>> {
        #[allow(clippy::unwrap_used)]
        let adapters = self.adapters.read().unwrap();
        if let Some(provider) = provider {
            if let Some(adapter) = adapters.get(&format!("{backend}:{provider}")) {
                return Some(adapter.clone());
            }
        }
        adapters.get(backend).cloned()
    }
}

// =============================================================================
// Music Assistant content adapter
// =============================================================================

/// Executes content verbs against Music Assistant for zones whose backend
/// has no native content path (or shares the MA backend's client).
pub struct MusicAssistantContentAdapter {
    /// Fallback client (the provider's) for zones whose backend is not MA.
    fallback: Option<RpcClient>,
}

impl MusicAssistantContentAdapter {
    pub fn new(fallback: Option<RpcClient>) -> Self {
        Self { fallback }
    }

    fn client_for(&self, ctx: &AdapterContext<'_>) -> Option<RpcClient> {
        ctx.client.clone().or_else(|| self.fallback.clone())
    }
}

#[async_trait]
impl ContentAdapter for MusicAssistantContentAdapter {
    fn name(&self) -> &'static str {
        "musicassistant-content"
    }

    fn handles(&self, verb: &str) -> bool {
        matches!(verb, "serviceplay" | "playlistplay" | "libraryplay" | "announce")
    }

    async fn execute(&self, ctx: &AdapterContext<'_>, command: &ZoneCommand) -> Result<bool> {
        let Some(player_id) = ctx.config.ma_player_id.as_deref() else {
            debug!(zone = ctx.zone_id, "no player binding for content adapter");
            return Ok(false);
        };
        let Some(client) = self.client_for(ctx) else {
            debug!(zone = ctx.zone_id, "no rpc client for content adapter");
            return Ok(false);
        };

        match command {
            ZoneCommand::ServicePlay { uri }
            | ZoneCommand::PlaylistPlay { uri }
            | ZoneCommand::LibraryPlay { uri } => {
                client
                    .request(
                        "player_queues/play_media",
                        json!({
                            "queue_id": player_id,
                            "media": [uri],
                            "option": "replace",
                        }),
                    )
                    .await?;
                Ok(true)
            }
            ZoneCommand::Announce { url, volume } => {
                let mut args = json!({ "player_id": player_id, "url": url });
                if let Some(v) = volume {
                    args["volume_level"] = json!(v);
                }
                client.request("players/cmd/play_announcement", args).await?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopAdapter;

    #[async_trait]
    impl ContentAdapter for NoopAdapter {
        fn name(&self) -> &'static str {
            "noop"
        }

        fn handles(&self, verb: &str) -> bool {
            verb == "serviceplay"
        }

        async fn execute(&self, _ctx: &AdapterContext<'_>, _cmd: &ZoneCommand) -> Result<bool> {
            Ok(true)
        }
    }

    #[test]
    fn specific_key_wins() {
        let registry = AdapterRegistry::new();
        registry.register("beolink", Arc::new(NoopAdapter));
        registry.register("beolink:musicassistant", Arc::new(MusicAssistantContentAdapter::new(None)));

        let specific = registry.select("beolink", Some("musicassistant"));
        assert_eq!(specific.map(|a| a.name()), Some("musicassistant-content"));

        let generic = registry.select("beolink", Some("other"));
        assert_eq!(generic.map(|a| a.name()), Some("noop"));

        assert!(registry.select("unknown", None).is_none());
    }

    #[test]
    fn ma_adapter_declares_content_verbs() {
        let adapter = MusicAssistantContentAdapter::new(None);
        assert!(adapter.handles("serviceplay"));
        assert!(adapter.handles("announce"));
        assert!(!adapter.handles("volume"));
    }
}
