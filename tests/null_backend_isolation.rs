//! An unconfigured zone stays inert: commands are dropped without vendor
//! traffic and the steady "Unconfigured" status never changes.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use audioserver::bus::{create_bus, PushEvent};
use audioserver::config::ZoneConfig;
use audioserver::content::AdapterRegistry;
use audioserver::favorites::FavoritesStore;
use audioserver::providers::DummyProvider;
use audioserver::router::CommandRouter;
use audioserver::zone::{PlayerMode, ZoneManager};

#[tokio::test]
async fn play_on_unconfigured_zone_changes_nothing() {
    let bus = create_bus();
    let manager = ZoneManager::new(bus.clone(), AdapterRegistry::new());
    manager
        .upsert_zone(ZoneConfig {
            id: 9,
            ..ZoneConfig::default()
        })
        .await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let dir = tempfile::tempdir().unwrap();
    let favorites = Arc::new(
        FavoritesStore::new(dir.path(), bus.clone())
            .with_provider(Arc::new(DummyProvider::default())),
    );
    let router = CommandRouter::new(manager.clone(), favorites);

    // Subscribe after the initial status settles.
    let mut rx = bus.subscribe();
    let response = router.dispatch("audio/9/play", None).await;
    assert_eq!(response.status, 200);

    // No state change broadcast follows the dropped command.
    tokio::time::sleep(Duration::from_millis(150)).await;
    while let Ok(event) = rx.try_recv() {
        assert!(
            !matches!(event, PushEvent::AudioEvent { .. }),
            "dropped command must not change state"
        );
    }

    let status = manager.status(9).await.unwrap();
    assert_eq!(status.title.as_deref(), Some("Unconfigured"));
    assert_eq!(status.mode, Some(PlayerMode::Pause));
}
