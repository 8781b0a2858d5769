//! BeoLink backend driver.
//!
//! Subscribes to the device's NDJSON notification stream (one JSON object
//! per line) and maps notifications to partial status updates through a
//! dispatch table. The stream is redialed 5 s after any lifecycle event
//! (close, end, error).

use std::sync::Mutex;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::StreamExt;
use quick_xml::events::Event as XmlEvent;
use quick_xml::Reader as XmlReader;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backends::{
    basic_auth_header, BackendContext, BackendDriver, BackendUpdate, CommandOutcome, ProbeOptions,
    ZoneCommand, HTTP_PROBE_TIMEOUT,
};
use crate::zone::status::{AudioType, PlayerMode, PlayerStatus, PowerState};

const BACKEND_KIND: &str = "beolink";
const DEFAULT_PORT: u16 = 8080;
/// Redial delay after the notification stream ends for any reason.
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

fn base_url(ip: &str) -> String {
    if ip.contains(':') {
        format!("http://{ip}")
    } else {
        format!("http://{ip}:{DEFAULT_PORT}")
    }
}

/// Reachability probe: fetch and parse the device description document.
pub async fn probe(options: &ProbeOptions) -> Result<()> {
    let host = match options.port {
        Some(port) => format!("{}:{}", options.ip, port),
        None => options.ip.clone(),
    };
    let url = format!("{}/description.xml", base_url(&host));
    let client = reqwest::Client::builder()
        .timeout(HTTP_PROBE_TIMEOUT)
        .build()?;
    let body = client
        .get(&url)
        .send()
        .await
        .map_err(|e| anyhow!("device not reachable: {e}"))?
        .error_for_status()
        .map_err(|e| anyhow!("device rejected probe: {e}"))?
        .text()
        .await?;

    match parse_friendly_name(&body) {
        Some(name) => {
            debug!("probe found device '{name}'");
            Ok(())
        }
        None => Err(anyhow!("no device description at {url}")),
    }
}

/// Pull `<friendlyName>` out of a UPnP-style device description.
fn parse_friendly_name(xml: &str) -> Option<String> {
    let mut reader = XmlReader::from_str(xml);
    let mut inside = false;
    loop {
        match reader.read_event() {
            Ok(XmlEvent::Start(e)) if e.name().as_ref() == b"friendlyName" => inside = true,
            Ok(XmlEvent::Text(t)) if inside => {
                return t.unescape().ok().map(|s| s.into_owned());
            }
            Ok(XmlEvent::End(e)) if e.name().as_ref() == b"friendlyName" => inside = false,
            Ok(XmlEvent::Eof) | Err(_) => return None,
            _ => {}
        }
    }
}

pub struct BeolinkBackend {
    ctx: BackendContext,
    shutdown: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl BeolinkBackend {
    pub fn new(ctx: BackendContext) -> Self {
        Self {
            ctx,
            shutdown: CancellationToken::new(),
            task: Mutex::new(None),
        }
    }

    async fn run(ctx: BackendContext, shutdown: CancellationToken) {
        let host = ctx.config.ip.clone().unwrap_or_default();
        let url = format!("{}/BeoNotify/Notifications", base_url(&host));
        let client = match reqwest::Client::builder()
            .connect_timeout(HTTP_PROBE_TIMEOUT)
            .build()
        {
            Ok(client) => client,
            Err(e) => {
                warn!(zone = ctx.zone_id, "http client build failed: {e}");
                return;
            }
        };

        loop {
            if shutdown.is_cancelled() {
                break;
            }
            match Self::subscribe(&ctx, &client, &url, &shutdown).await {
                Ok(()) => debug!(zone = ctx.zone_id, "notification stream ended"),
                Err(e) => warn!(zone = ctx.zone_id, "notification stream error: {e}"),
            }
            if shutdown.is_cancelled() {
                break;
            }
            ctx.push(BackendUpdate::Status {
                zone_id: ctx.zone_id,
                update: PlayerStatus::offline(ctx.zone_id),
            })
            .await;
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(RECONNECT_DELAY) => {}
            }
        }
    }

    async fn subscribe(
        ctx: &BackendContext,
        client: &reqwest::Client,
        url: &str,
        shutdown: &CancellationToken,
    ) -> Result<()> {
        let mut request = client.get(url);
        // Some firmware wants preemptive Basic credentials on the stream.
        if let (Ok(user), Ok(pass)) = (
            std::env::var("BEOLINK_USERNAME"),
            std::env::var("BEOLINK_PASSWORD"),
        ) {
            request = request.header(reqwest::header::AUTHORIZATION, basic_auth_header(&user, &pass));
        }

        let response = request.send().await?.error_for_status()?;
        info!(zone = ctx.zone_id, "notification stream connected");
        ctx.push(BackendUpdate::Status {
            zone_id: ctx.zone_id,
            update: PlayerStatus {
                playerid: ctx.zone_id,
                power: Some(PowerState::On),
                ..PlayerStatus::default()
            },
        })
        .await;

        let mut stream = response.bytes_stream();
        let mut buffer: Vec<u8> = Vec::new();
        loop {
            let chunk = tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                chunk = stream.next() => chunk,
            };
            let Some(chunk) = chunk else { return Ok(()) };
            let chunk = chunk?;
            buffer.extend_from_slice(&chunk);

            while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=pos).collect();
                let line = String::from_utf8_lossy(&line);
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match serde_json::from_str::<Value>(line) {
                    Ok(frame) => Self::handle_frame(ctx, &frame).await,
                    Err(e) => {
                        // Malformed vendor payload: log a sample, drop it.
                        let sample: String = line.chars().take(120).collect();
                        warn!(zone = ctx.zone_id, "malformed notification ({e}): {sample}");
                    }
                }
            }
        }
    }

    async fn handle_frame(ctx: &BackendContext, frame: &Value) {
        let Some(notification) = frame.get("notification") else {
            return;
        };
        let kind = notification
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let data = notification.get("data").cloned().unwrap_or(Value::Null);

        if let Some(update) = map_notification(ctx.zone_id, kind, &data) {
            ctx.push(BackendUpdate::Status {
                zone_id: ctx.zone_id,
                update,
            })
            .await;
        } else {
            debug!(zone = ctx.zone_id, kind, "unmapped notification");
        }
    }
}

/// Notification dispatch table: vendor type to partial status.
fn map_notification(zone_id: u32, kind: &str, data: &Value) -> Option<PlayerStatus> {
    let mut status = PlayerStatus::new(zone_id);
    match kind {
        "VOLUME" => {
            let level = data
                .get("speaker")
                .and_then(|s| s.get("level"))
                .and_then(Value::as_i64)?;
            status.volume = Some((level as i32).clamp(0, 100));
        }
        "PROGRESS_INFORMATION" => {
            if let Some(state) = data.get("state").and_then(Value::as_str) {
                status.mode = Some(PlayerMode::from_vendor(state));
            }
            if let Some(seconds) = data
                .get("position")
                .and_then(Value::as_f64)
                .or_else(|| data.get("seconds").and_then(Value::as_f64))
            {
                status.time = Some(seconds);
                status.position_ms = Some((seconds * 1000.0) as u64);
            }
            // Auxiliary inputs report progress with no track timeline.
            let aux = data
                .get("source")
                .and_then(Value::as_str)
                .map(|s| s.contains("LINE IN") || s.contains("A.AUX"))
                .unwrap_or(false);
            if aux {
                status.audiotype = Some(AudioType::LineIn);
                status.duration = Some(0.0);
            }
        }
        "NOW_PLAYING_STORED_MUSIC" => {
            status.title = data.get("name").and_then(Value::as_str).map(str::to_string);
            status.artist = data
                .get("artist")
                .and_then(Value::as_str)
                .map(str::to_string);
            status.album = data
                .get("album")
                .and_then(Value::as_str)
                .map(str::to_string);
            status.coverurl = data
                .get("trackImage")
                .and_then(Value::as_array)
                .and_then(|a| a.first())
                .and_then(|i| i.get("url"))
                .and_then(Value::as_str)
                .map(str::to_string);
            if let Some(duration) = data.get("duration").and_then(Value::as_f64) {
                status.duration = Some(duration);
                status.duration_ms = Some((duration * 1000.0) as u64);
            }
            status.audiotype = Some(AudioType::File);
        }
        "NOW_PLAYING_NET_RADIO" => {
            let name = data.get("name").and_then(Value::as_str).map(str::to_string);
            status.station = name.clone();
            status.title = data
                .get("liveDescription")
                .and_then(Value::as_str)
                .map(str::to_string)
                .or(name);
            status.coverurl = data
                .get("stationImage")
                .and_then(Value::as_str)
                .map(str::to_string);
            status.audiotype = Some(AudioType::Radio);
        }
        "SOURCE" => {
            let source_type = data
                .get("primaryExperience")
                .and_then(|e| e.get("source"))
                .and_then(|s| s.get("sourceType"))
                .and_then(|t| t.get("type"))
                .and_then(Value::as_str)
                .unwrap_or_default();
            if source_type.contains("LINE IN") || source_type.contains("A.AUX") {
                status.audiotype = Some(AudioType::LineIn);
                status.duration = Some(0.0);
            }
        }
        "NOW_PLAYING_ENDED" => {
            status.mode = Some(PlayerMode::Stop);
        }
        "SHUTDOWN" => {
            status.power = Some(PowerState::Off);
            status.mode = Some(PlayerMode::Stop);
        }
        _ => return None,
    }
    Some(status)
}

#[async_trait]
impl BackendDriver for BeolinkBackend {
    fn kind(&self) -> &'static str {
        BACKEND_KIND
    }

    async fn initialize(&self) -> Result<()> {
        if self.ctx.config.ip.is_none() {
            anyhow::bail!("zone {} has no device address", self.ctx.zone_id);
        }
        let ctx = self.ctx.clone();
        let shutdown = self.shutdown.clone();
        let handle = tokio::spawn(async move {
            Self::run(ctx, shutdown).await;
        });
        #[allow(clippy::unwrap_used)] // lock poisoning is unrecoverable here
        let mut slot = self.task.lock().unwrap();
        if let Some(old) = slot.replace(handle) {
            old.abort();
        }
        Ok(())
    }

    async fn send_command(&self, command: &ZoneCommand) -> Result<CommandOutcome> {
        // Transport verbs map to the device's stream control endpoints; the
        // content verbs have no native path on this family and fall through
        // to the zone's content adapter.
        match command {
            ZoneCommand::Play
            | ZoneCommand::Resume
            | ZoneCommand::Pause
            | ZoneCommand::Stop
            | ZoneCommand::QueuePlus
            | ZoneCommand::QueueMinus => {
                let verb = match command {
                    ZoneCommand::Play | ZoneCommand::Resume => "Play",
                    ZoneCommand::Pause => "Pause",
                    ZoneCommand::Stop => "Stop",
                    ZoneCommand::QueuePlus => "Forward",
                    ZoneCommand::QueueMinus => "Backward",
                    _ => unreachable!(),
                };
                self.stream_control(verb).await?;
                Ok(CommandOutcome::Handled)
            }
            ZoneCommand::SetVolume(volume) => {
                self.set_volume(*volume).await?;
                Ok(CommandOutcome::Handled)
            }
            ZoneCommand::LineIn(_) => {
                self.stream_control("Play").await?;
                Ok(CommandOutcome::Handled)
            }
            _ => Ok(CommandOutcome::Unhandled),
        }
    }

    async fn cleanup(&self) {
        self.shutdown.cancel();
        #[allow(clippy::unwrap_used)]
        let handle = self.task.lock().unwrap().take();
        if let Some(handle) = handle {
            handle.abort();
        }
    }
}

impl BeolinkBackend {
    async fn stream_control(&self, verb: &str) -> Result<()> {
        let host = self.ctx.config.ip.clone().unwrap_or_default();
        let url = format!("{}/BeoZone/Zone/Stream/{verb}", base_url(&host));
        reqwest::Client::new()
            .post(&url)
            .timeout(HTTP_PROBE_TIMEOUT)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn set_volume(&self, volume: i32) -> Result<()> {
        let host = self.ctx.config.ip.clone().unwrap_or_default();
        let url = format!("{}/BeoZone/Zone/Sound/Volume/Speaker/Level", base_url(&host));
        reqwest::Client::new()
            .put(&url)
            .timeout(HTTP_PROBE_TIMEOUT)
            .json(&serde_json::json!({ "level": volume.clamp(0, 100) }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn friendly_name_from_description() {
        let xml = r#"<?xml version="1.0"?>
            <root><device>
              <friendlyName>Living Room</friendlyName>
              <modelName>BeoSound</modelName>
            </device></root>"#;
        assert_eq!(parse_friendly_name(xml).as_deref(), Some("Living Room"));
        assert!(parse_friendly_name("<root></root>").is_none());
    }

    #[test]
    fn volume_notification() {
        let update =
            map_notification(2, "VOLUME", &json!({ "speaker": { "level": 140 } })).unwrap();
        assert_eq!(update.volume, Some(100));
    }

    #[test]
    fn progress_maps_state_and_zero_keeps_mode() {
        let update = map_notification(
            2,
            "PROGRESS_INFORMATION",
            &json!({ "state": "play", "position": 12.0 }),
        )
        .unwrap();
        assert_eq!(update.mode, Some(PlayerMode::Play));
        assert_eq!(update.position_ms, Some(12000));
    }

    #[test]
    fn progress_on_aux_forces_linein() {
        let update = map_notification(
            2,
            "PROGRESS_INFORMATION",
            &json!({ "state": "play", "source": "LINE IN", "position": 1.0 }),
        )
        .unwrap();
        assert_eq!(update.audiotype, Some(AudioType::LineIn));
        assert_eq!(update.duration, Some(0.0));
    }

    #[test]
    fn net_radio_sets_station() {
        let update = map_notification(
            2,
            "NOW_PLAYING_NET_RADIO",
            &json!({ "name": "Radio Paradise", "liveDescription": "Now: Song" }),
        )
        .unwrap();
        assert_eq!(update.station.as_deref(), Some("Radio Paradise"));
        assert_eq!(update.audiotype, Some(AudioType::Radio));
    }

    #[test]
    fn unknown_notification_is_dropped() {
        assert!(map_notification(2, "SOFTWARE_UPDATE_STATE", &json!({})).is_none());
    }
}
