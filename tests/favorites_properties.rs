//! Favorites store invariants across mutation sequences.
//!
//! After any sequence of structural mutations: slots are contiguous 1..n,
//! ids follow the slot-derived sequence, `totalitems` matches, and the file
//! parses back to an equivalent structure.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use audioserver::bus::create_bus;
use audioserver::favorites::{FavoriteFile, FavoritesStore, BASE_FAVORITE_ZONE};
use audioserver::providers::DummyProvider;

fn store(dir: &std::path::Path) -> FavoritesStore {
    FavoritesStore::new(dir, create_bus())
        .with_provider(Arc::new(DummyProvider::default()))
}

fn assert_invariants(file: &FavoriteFile) {
    assert_eq!(file.totalitems as usize, file.items.len());
    for (i, item) in file.items.iter().enumerate() {
        assert_eq!(item.slot as usize, i + 1, "slot at {i}");
        assert_eq!(item.id, BASE_FAVORITE_ZONE + i as u32, "id at {i}");
    }
}

#[tokio::test]
async fn structural_mutation_sequences_hold_invariants() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(dir.path());
    let zone = 7;

    for name in ["a", "b", "c", "d", "e"] {
        let file = store.add(zone, name, None).await.unwrap();
        assert_invariants(&file);
    }

    let file = store.delete(zone, BASE_FAVORITE_ZONE + 2).await.unwrap();
    assert_invariants(&file);

    let file = store.delete(zone, BASE_FAVORITE_ZONE).await.unwrap();
    assert_invariants(&file);

    let file = store.add(zone, "f", None).await.unwrap();
    assert_invariants(&file);

    // Deleting an unknown id is a no-op that still holds the invariants.
    let file = store.delete(zone, 42).await.unwrap();
    assert_invariants(&file);

    // The persisted file parses back to an equivalent structure.
    let bytes = std::fs::read(dir.path().join(format!("{zone}.json"))).unwrap();
    let parsed: FavoriteFile = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(parsed.items, file.items);
    assert_invariants(&parsed);
}

#[tokio::test]
async fn reorder_keeps_unmentioned_order() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(dir.path());
    let zone = 7;
    for name in ["a", "b", "c", "d"] {
        store.add(zone, name, None).await.unwrap();
    }

    // reorder(7, [1000002, 1000000]) moves the mentioned ids to the front;
    // everything else keeps its relative order behind them.
    let file = store
        .reorder(zone, &[BASE_FAVORITE_ZONE + 2, BASE_FAVORITE_ZONE])
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
    assert_eq!(file.totalitems, 4);
}

#[tokio::test]
async fn reorder_emits_change_event_with_count() {
    let dir = tempfile::tempdir().unwrap();
    let bus = create_bus();
    let store = FavoritesStore::new(dir.path(), bus.clone())
        .with_provider(Arc::new(DummyProvider::default()));
    let zone = 7;
    for name in ["a", "b", "c", "d"] {
        store.add(zone, name, None).await.unwrap();
    }

    let mut rx = bus.subscribe();
    store
        .reorder(zone, &[BASE_FAVORITE_ZONE + 2, BASE_FAVORITE_ZONE])
        .await
        .unwrap();

    match rx.recv().await.unwrap() {
        audioserver::bus::PushEvent::RoomFavChangedEvent { playerid, count } => {
            assert_eq!(playerid, 7);
            assert_eq!(count, 4);
        }
        other => panic!("unexpected event {other:?}"),
    }
}

#[tokio::test]
async fn copy_resequences_relative_to_destination() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(dir.path());
    for name in ["a", "b", "c"] {
        store.add(1, name, None).await.unwrap();
    }
    // Destination 2 already has content that must be overwritten.
    store.add(2, "stale", None).await.unwrap();

    store.copy(1, &[2]).await.unwrap();
    let dest = store.get(2, 0, 0).await.unwrap();
    assert_eq!(dest.totalitems, 3);
    assert_eq!(dest.id, "2");
    assert_invariants(&dest);
    assert_eq!(dest.items[0].name, "a");
}
