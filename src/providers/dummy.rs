//! Fallback provider used when nothing is configured.
//!
//! Serves the two synthetic radio roots and empty responses everywhere else
//! so the UI renders instead of erroring.

use async_trait::async_trait;

use crate::providers::model::RadioEntry;
use crate::providers::MediaProvider;

#[derive(Default)]
pub struct DummyProvider;

#[async_trait]
impl MediaProvider for DummyProvider {
    fn name(&self) -> &'static str {
        "dummy"
    }

    async fn get_radios(&self) -> Vec<RadioEntry> {
        vec![
            RadioEntry {
                cmd: "local".to_string(),
                name: "Local Radio".to_string(),
                icon: String::new(),
                root: "local".to_string(),
            },
            RadioEntry {
                cmd: "custom".to_string(),
                name: "Custom Streams".to_string(),
                icon: String::new(),
                root: "custom".to_string(),
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_surface_by_default() {
        let p = DummyProvider;
        assert_eq!(p.get_radios().await.len(), 2);
        assert_eq!(p.get_playlists(0, 50).await.totalitems, 0);
        assert!(p.get_playlist_items("x", 0, 50).await.is_none());
        assert!(p.resolve_media_item("f", "i").await.is_none());
        let folder = p.get_service_folder("tunein", "root", "nouser", 5, 10).await;
        assert_eq!(folder.start, 5);
        assert_eq!(folder.totalitems, 0);
    }
}
