//! Null driver for zones without a configured backend.
//!
//! Publishes one initial "Unconfigured" status and a minute-interval
//! keep-alive so the miniserver keeps the zone visible. All commands are
//! logged and dropped.

use std::sync::Mutex;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::backends::{BackendContext, BackendDriver, BackendUpdate, CommandOutcome, ZoneCommand};
use crate::zone::status::{PlayerMode, PlayerStatus};

const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(60);

pub struct NullBackend {
    ctx: BackendContext,
    keepalive: Mutex<Option<JoinHandle<()>>>,
}

impl NullBackend {
    pub fn new(ctx: BackendContext) -> Self {
        Self {
            ctx,
            keepalive: Mutex::new(None),
        }
    }
}

#[async_trait]
impl BackendDriver for NullBackend {
    fn kind(&self) -> &'static str {
        "null"
    }

    async fn initialize(&self) -> Result<()> {
        self.ctx
            .push(BackendUpdate::Status {
                zone_id: self.ctx.zone_id,
                update: PlayerStatus::unconfigured(self.ctx.zone_id),
            })
            .await;

        let ctx = self.ctx.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(KEEPALIVE_INTERVAL);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await; // immediate first tick
            loop {
                ticker.tick().await;
                let update = PlayerStatus {
                    playerid: ctx.zone_id,
                    time: Some(0.0),
                    mode: Some(PlayerMode::Pause),
                    ..PlayerStatus::default()
                };
                ctx.push(BackendUpdate::Status {
                    zone_id: ctx.zone_id,
                    update,
                })
                .await;
            }
        });

        #[allow(clippy::unwrap_used)] // lock poisoning is unrecoverable here
        let mut slot = self.keepalive.lock().unwrap();
        if let Some(old) = slot.replace(handle) {
            old.abort();
        }
        Ok(())
    }

    async fn send_command(&self, command: &ZoneCommand) -> Result<CommandOutcome> {
        debug!(
            zone = self.ctx.zone_id,
            verb = command.verb(),
            "unconfigured zone, command dropped"
        );
        Ok(CommandOutcome::Handled)
    }

    async fn cleanup(&self) {
        #[allow(clippy::unwrap_used)]
        let handle = self.keepalive.lock().unwrap().take();
        if let Some(handle) = handle {
            handle.abort();
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::config::ZoneConfig;
    use tokio::sync::mpsc;

    fn make(zone_id: u32) -> (NullBackend, mpsc::Receiver<BackendUpdate>) {
        let (tx, rx) = mpsc::channel(8);
        let backend = NullBackend::new(BackendContext {
            zone_id,
            config: ZoneConfig {
                id: zone_id,
                ..ZoneConfig::default()
            },
            updates: tx,
        });
        (backend, rx)
    }

    #[tokio::test]
    async fn publishes_unconfigured_status_on_init() {
        let (backend, mut rx) = make(9);
        backend.initialize().await.unwrap();

        let update = rx.recv().await.unwrap();
        match update {
            BackendUpdate::Status { zone_id, update } => {
                assert_eq!(zone_id, 9);
                assert_eq!(update.title.as_deref(), Some("Unconfigured"));
                assert_eq!(update.mode, Some(PlayerMode::Pause));
            }
            other => panic!("unexpected update {other:?}"),
        }
        backend.cleanup().await;
    }

    #[tokio::test]
    async fn commands_are_dropped_without_updates() {
        let (backend, mut rx) = make(9);
        backend.initialize().await.unwrap();
        let _ = rx.recv().await; // initial status

        let outcome = backend.send_command(&ZoneCommand::Play).await.unwrap();
        assert_eq!(outcome, CommandOutcome::Handled);
        // No state change follows a dropped command.
        assert!(rx.try_recv().is_err());
        backend.cleanup().await;
    }

    #[tokio::test]
    async fn cleanup_is_idempotent() {
        let (backend, _rx) = make(3);
        backend.initialize().await.unwrap();
        backend.cleanup().await;
        backend.cleanup().await;
    }
}
