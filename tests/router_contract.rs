//! Command-surface contract tests.
//!
//! Every recognised verb answers an envelope that echoes the original
//! command string verbatim, and argument coercions behave at the
//! boundaries the miniserver exercises.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use audioserver::backends::BackendUpdate;
use audioserver::bus::create_bus;
use audioserver::config::ZoneConfig;
use audioserver::content::AdapterRegistry;
use audioserver::favorites::FavoritesStore;
use audioserver::providers::DummyProvider;
use audioserver::router::CommandRouter;
use audioserver::zone::{PlayerStatus, ZoneManager};

async fn router_with_zone(
    zone_id: u32,
) -> (CommandRouter, Arc<ZoneManager>, tempfile::TempDir) {
    let bus = create_bus();
    let manager = ZoneManager::new(bus.clone(), AdapterRegistry::new());
    manager
        .upsert_zone(ZoneConfig {
            id: zone_id,
            ..ZoneConfig::default()
        })
        .await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    let dir = tempfile::tempdir().unwrap();
    let favorites = Arc::new(
        FavoritesStore::new(dir.path(), bus).with_provider(Arc::new(DummyProvider::default())),
    );
    (
        CommandRouter::new(manager.clone(), favorites),
        manager,
        dir,
    )
}

#[tokio::test]
async fn every_recognised_verb_echoes_its_command() {
    let (router, _manager, _dir) = router_with_zone(1).await;

    let commands = [
        "audio/1/play",
        "audio/1/resume",
        "audio/1/pause",
        "audio/1/stop",
        "audio/1/queueplus",
        "audio/1/queueminus",
        "audio/1/position/30",
        "audio/1/volume/5",
        "audio/1/repeat/queue",
        "audio/1/shuffle/enable",
        "audio/1/queue/play/2",
        "audio/1/serviceplay/radio:tunein:s1",
        "audio/1/playlistplay/playlist:ma:7",
        "audio/1/libraryplay/library:ma:track:1",
        "audio/1/announce/40/http%3A%2F%2Fhost%2Fbell.mp3",
        "audio/1/linein/aux1",
        "audio/1/status",
        "audio/1/getqueue/0/10",
        "audio/1/favorites/get",
        "audio/cfg/ready",
        "audio/cfg/getradios",
        "audio/cfg/getservicefolder/local/root/nouser/0/50",
        "audio/cfg/getplaylists/0/50",
        "audio/cfg/getplaylistitems/7/0/50",
        "audio/cfg/getmediafolder/root/0/50",
        "audio/cfg/resolvemediaitem/folder/item",
        "audio/cfg/getfavorites/1/0/50",
        "audio/cfg/getrecent/1/10",
        "audio/cfg/globalsearch/library/jazz",
        "audio/cfg/getsuggestions",
    ];

    for command in commands {
        let response = router.dispatch(command, None).await;
        assert_eq!(
            response.body.get("command").and_then(|v| v.as_str()),
            Some(command),
            "envelope echo for {command}"
        );
        assert!(
            response.status < 500,
            "unexpected server error for {command}: {:?}",
            response.body
        );
    }
}

#[tokio::test]
async fn volume_boundaries_clamp() {
    let (router, manager, _dir) = router_with_zone(1).await;
    let tx = manager.updates_sender();

    tx.send(BackendUpdate::Status {
        zone_id: 1,
        update: PlayerStatus {
            playerid: 1,
            volume: Some(95),
            ..PlayerStatus::default()
        },
    })
    .await
    .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let up = router.dispatch("audio/1/volume/+20", None).await;
    assert_eq!(up.body["volume_result"]["volume"], 100);

    tx.send(BackendUpdate::Status {
        zone_id: 1,
        update: PlayerStatus {
            playerid: 1,
            volume: Some(5),
            ..PlayerStatus::default()
        },
    })
    .await
    .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let down = router.dispatch("audio/1/volume/-20", None).await;
    assert_eq!(down.body["volume_result"]["volume"], 0);
}

#[tokio::test]
async fn shuffle_without_payload_toggles_back() {
    let (router, manager, _dir) = router_with_zone(1).await;

    let first = router.dispatch("audio/1/shuffle", None).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    let second = router.dispatch("audio/1/shuffle", None).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let a = first.body["shuffle_result"]["shuffle"].as_u64().unwrap();
    let b = second.body["shuffle_result"]["shuffle"].as_u64().unwrap();
    assert_ne!(a, b, "two toggles visit both states");

    // Back at the original state after the pair.
    let status = manager.status(1).await.unwrap();
    assert_eq!(status.plshuffle, Some(b == 1));
}

#[tokio::test]
async fn duplicate_group_ids_collapse() {
    let bus = create_bus();
    let manager = ZoneManager::new(bus.clone(), AdapterRegistry::new());
    for id in [5u32, 6, 7] {
        manager
            .upsert_zone(ZoneConfig {
                id,
                ..ZoneConfig::default()
            })
            .await;
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
    let dir = tempfile::tempdir().unwrap();
    let favorites = Arc::new(
        FavoritesStore::new(dir.path(), bus).with_provider(Arc::new(DummyProvider::default())),
    );
    let router = CommandRouter::new(manager.clone(), favorites);

    router
        .dispatch("audio/5/groupJoinMany/6,7,6,7", None)
        .await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let record = manager.group_tracker().get_group_by_leader(5).unwrap();
    assert_eq!(record.members, vec![5, 6, 7]);
}

#[tokio::test]
async fn nan_arguments_are_rejected() {
    let (router, _manager, _dir) = router_with_zone(1).await;
    for command in ["audio/1/volume/NaN", "audio/1/position/nan"] {
        let response = router.dispatch(command, None).await;
        assert_eq!(response.status, 400, "{command}");
        assert!(response.body.get("error").is_some());
    }
}
