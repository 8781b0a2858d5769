//! Alert/media asset resolver.
//!
//! Resolves well-known alert sounds from the public media root and caches
//! generated TTS clips keyed by `sha1(language|text)`. Cached clips live for
//! 7 days; stale files are swept opportunistically at most every 6 hours.
//! The cache directory is a subtree of the media root so served paths can
//! never escape it.

use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use tokio::time::Instant;
use tracing::{debug, warn};

/// Well-known static alert sounds under `<public>/alerts/`.
const STATIC_ALERTS: &[&str] = &["alarm", "bell", "buzzer", "firealarm"];
/// Retention for generated TTS clips.
const TTS_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);
/// Minimum spacing between sweeps.
const SWEEP_INTERVAL: Duration = Duration::from_secs(6 * 60 * 60);

/// Boundary to the actual synthesis engine; the resolver only caches.
#[async_trait]
pub trait TtsSynthesizer: Send + Sync {
    async fn synthesize(&self, language: &str, text: &str) -> Result<Vec<u8>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSource {
    File,
    Tts,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertMediaResource {
    pub source: AlertSource,
    pub absolute_path: PathBuf,
    /// Relative to the public media root, usable in URLs.
    pub relative_path: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct AlertMediaRequest {
    pub kind: String,
    pub text: Option<String>,
    pub language: Option<String>,
}

pub struct AlertResolver {
    public_dir: PathBuf,
    synthesizer: Option<std::sync::Arc<dyn TtsSynthesizer>>,
    last_sweep: Mutex<Option<Instant>>,
}

fn tts_cache_key(language: &str, text: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(format!("{language}|{text}").as_bytes());
    hex::encode(hasher.finalize())
}

impl AlertResolver {
    pub fn new(
        public_dir: impl Into<PathBuf>,
        synthesizer: Option<std::sync::Arc<dyn TtsSynthesizer>>,
    ) -> Self {
        Self {
            public_dir: public_dir.into(),
            synthesizer,
            last_sweep: Mutex::new(None),
        }
    }

    fn alerts_dir(&self) -> PathBuf {
        self.public_dir.join("alerts")
    }

    fn cache_dir(&self) -> PathBuf {
        self.alerts_dir().join("cache")
    }

    /// Resolve a request to a servable media resource.
    pub async fn resolve_alert_media(
        &self,
        request: &AlertMediaRequest,
    ) -> Option<AlertMediaResource> {
        if request.kind == "tts" {
            return self.resolve_tts(request).await;
        }
        if !STATIC_ALERTS.contains(&request.kind.as_str()) {
            debug!(kind = %request.kind, "unknown alert kind");
            return None;
        }
        let relative = format!("alerts/{}.mp3", request.kind);
        let absolute = self.public_dir.join(&relative);
        if !absolute.is_file() {
            warn!(kind = %request.kind, "alert asset missing: {}", absolute.display());
            return None;
        }
        Some(AlertMediaResource {
            source: AlertSource::File,
            absolute_path: absolute,
            relative_path: relative,
            title: request.kind.clone(),
            text: None,
            language: None,
        })
    }

    async fn resolve_tts(&self, request: &AlertMediaRequest) -> Option<AlertMediaResource> {
        let text = request.text.as_deref()?.trim();
        if text.is_empty() {
            return None;
        }
        let language = request.language.as_deref().unwrap_or("en");

        self.maybe_sweep(TTS_TTL).await;

        let key = tts_cache_key(language, text);
        let relative = format!("alerts/cache/tts-{key}.mp3");
        let absolute = self.public_dir.join(&relative);

        if !absolute.is_file() {
            let synthesizer = self.synthesizer.as_ref()?;
            let audio = match synthesizer.synthesize(language, text).await {
                Ok(audio) => audio,
                Err(e) => {
                    warn!("tts synthesis failed: {e}");
                    return None;
                }
            };
            if let Err(e) = tokio::fs::create_dir_all(self.cache_dir()).await {
                warn!("tts cache dir: {e}");
                return None;
            }
            if let Err(e) = tokio::fs::write(&absolute, audio).await {
                warn!("tts cache write: {e}");
                return None;
            }
        }

        Some(AlertMediaResource {
            source: AlertSource::Tts,
            absolute_path: absolute,
            relative_path: relative,
            title: text.chars().take(40).collect(),
            text: Some(text.to_string()),
            language: Some(language.to_string()),
        })
    }

    /// Drop cache files older than `ttl`, at most once per sweep interval.
    async fn maybe_sweep(&self, ttl: Duration) {
        {
            #[allow(clippy::unwrap_used)] // lock poisoning is unrecoverable here
            let mut last = self.last_sweep.lock().unwrap();
            if let Some(at) = *last {
                if at.elapsed() < SWEEP_INTERVAL {
                    return;
                }
            }
            *last = Some(Instant::now());
        }
        self.sweep_cache(ttl).await;
    }

    async fn sweep_cache(&self, ttl: Duration) {
        let dir = self.cache_dir();
        let Ok(mut entries) = tokio::fs::read_dir(&dir).await else {
            return;
        };
        let now = SystemTime::now();
        let mut removed = 0usize;
        while let Ok(Some(entry)) = entries.next_entry().await {
            let Ok(meta) = entry.metadata().await else {
                continue;
            };
            let age = meta
                .modified()
                .ok()
                .and_then(|m| now.duration_since(m).ok())
                .unwrap_or_default();
            if age > ttl && tokio::fs::remove_file(entry.path()).await.is_ok() {
                removed += 1;
            }
        }
        if removed > 0 {
            debug!(removed, "swept stale tts cache files");
        }
    }

    /// Resolve a served path under the media root, refusing traversal.
    pub fn serve_path(&self, relative: &str) -> Option<PathBuf> {
        let relative = relative.trim_start_matches('/');
        if relative.is_empty() || relative.split('/').any(|seg| seg == ".." || seg.is_empty()) {
            return None;
        }
        let path = self.alerts_dir().join(relative);
        path.is_file().then_some(path)
    }

    /// Public URL for a resource, based on the advertised host/port.
    pub fn public_url(&self, base: &str, resource: &AlertMediaResource) -> String {
        format!("{}/{}", base.trim_end_matches('/'), resource.relative_path)
    }
}

/// Build the advertised URL base from config or the local hostname.
pub fn alerts_url_base(host: Option<&str>, port: Option<u16>, fallback_port: u16) -> String {
    let host = match host {
        Some(host) if !host.is_empty() => host.to_string(),
        _ => gethostname::gethostname().to_string_lossy().into_owned(),
    };
    format!("http://{}:{}", host, port.unwrap_or(fallback_port))
}
