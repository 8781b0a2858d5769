//! Zone manager: the authoritative zone registry.
//!
//! Owns the `zoneId -> ZoneEntry` map, accepts partial status updates from
//! backend drivers through one bounded inbox, merges them field-by-field,
//! diffs against the previous snapshot, and broadcasts `audio_event` frames
//! on change. The single ingest task is the per-zone serial point for
//! merges: the broadcast order for a zone follows the order its backend's
//! updates were accepted.
//!
//! Command handlers act on zones only through this type; volume deltas,
//! shuffle toggles and group joins are resolved against the latest snapshot
//! here before a driver sees them.

use std::collections::HashMap;
use std::sync::{Mutex as StdMutex, RwLock as StdRwLock};
use std::time::Duration;

use anyhow::{anyhow, Result};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backends::{
    create_backend, BackendContext, BackendDriver, BackendUpdate, CommandOutcome,
    PlayerSuggestion, ZoneCommand,
};
use crate::bus::{GroupEventEntry, PushEvent, SharedBus};
use crate::config::{Config, ZoneConfig};
use crate::content::{AdapterContext, AdapterRegistry};
use crate::providers::media_provider;
use crate::zone::capabilities::CapabilityMatrix;
use crate::zone::groups::{GroupSource, GroupTracker, GroupUpsert};
use crate::zone::queue::Queue;
use crate::zone::status::PlayerStatus;

/// Manager inbox depth; drivers block briefly rather than dropping updates.
const UPDATE_INBOX_CAPACITY: usize = 1024;
/// Backend init retry: initial delay, doubling to the max.
const INIT_RETRY_INITIAL: Duration = Duration::from_secs(5);
const INIT_RETRY_MAX: Duration = Duration::from_secs(60);
/// Hard deadline for backend cleanup on shutdown.
const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(10);

struct ZoneState {
    status: PlayerStatus,
    queue: Option<Queue>,
    capabilities: CapabilityMatrix,
}

pub struct ZoneHandle {
    zone_id: u32,
    config: StdRwLock<ZoneConfig>,
    backend: RwLock<Arc<dyn BackendDriver>>,
    state: Mutex<ZoneState>,
    init_task: StdMutex<Option<JoinHandle<()>>>,
}

impl ZoneHandle {
    fn config(&self) -> ZoneConfig {
        #[allow(clippy::unwrap_used)] // lock poisoning is unrecoverable here
        let config = self.config.read().unwrap();
        config.clone()
    }
}

pub struct ZoneManager {
    zones: RwLock<HashMap<u32, Arc<ZoneHandle>>>,
    bus: SharedBus,
    groups: GroupTracker,
    adapters: AdapterRegistry,
    updates_tx: mpsc::Sender<BackendUpdate>,
    suggestions: StdRwLock<HashMap<String, Vec<PlayerSuggestion>>>,
    shutdown: CancellationToken,
}

impl ZoneManager {
    /// Create the manager and start its ingest task.
    pub fn new(bus: SharedBus, adapters: AdapterRegistry) -> Arc<Self> {
        let (updates_tx, updates_rx) = mpsc::channel(UPDATE_INBOX_CAPACITY);
        let manager = Arc::new(Self {
            zones: RwLock::new(HashMap::new()),
            bus,
            groups: GroupTracker::new(),
            adapters,
            updates_tx,
            suggestions: StdRwLock::new(HashMap::new()),
            shutdown: CancellationToken::new(),
        });
        let ingest = manager.clone();
        tokio::spawn(async move { ingest.run(updates_rx).await });
        manager
    }

    /// Sender drivers use to push updates (also used by command handlers so
    /// optimistic merges share the same serial point).
    pub fn updates_sender(&self) -> mpsc::Sender<BackendUpdate> {
        self.updates_tx.clone()
    }

    pub fn group_tracker(&self) -> &GroupTracker {
        &self.groups
    }

    // =========================================================================
    // Registry lifecycle
    // =========================================================================

    /// Install every zone from the config; reassignments tear the old driver
    /// down before the replacement starts.
    pub async fn apply_config(&self, config: &Config) {
        for zone in &config.zones {
            self.upsert_zone(zone.clone()).await;
        }
    }

    /// Create or reconfigure one zone.
    pub async fn upsert_zone(&self, zone_config: ZoneConfig) {
        let zone_id = zone_config.id;
        let existing = {
            let zones = self.zones.read().await;
            zones.get(&zone_id).cloned()
        };

        if let Some(handle) = existing {
            let unchanged = {
                #[allow(clippy::unwrap_used)]
                let current = handle.config.read().unwrap();
                current.backend == zone_config.backend
                    && current.ip == zone_config.ip
                    && current.ma_player_id == zone_config.ma_player_id
            };
            if unchanged {
                #[allow(clippy::unwrap_used)]
                let mut current = handle.config.write().unwrap();
                *current = zone_config;
                return;
            }
            // Explicit teardown-then-create: the old driver finishes its
            // cleanup before the replacement exists.
            info!(zone = zone_id, "zone reassigned, tearing down old backend");
            self.teardown_zone(&handle).await;
        }

        let capabilities = match zone_config.backend.as_deref() {
            Some("musicassistant") => CapabilityMatrix::musicassistant(),
            Some("beolink") => CapabilityMatrix::beolink(),
            _ => CapabilityMatrix::unconfigured(),
        };

        let ctx = BackendContext {
            zone_id,
            config: zone_config.clone(),
            updates: self.updates_tx.clone(),
        };
        let backend = create_backend(ctx);

        let handle = Arc::new(ZoneHandle {
            zone_id,
            config: StdRwLock::new(zone_config),
            backend: RwLock::new(backend.clone()),
            state: Mutex::new(ZoneState {
                status: PlayerStatus::new(zone_id),
                queue: None,
                capabilities,
            }),
            init_task: StdMutex::new(None),
        });

        {
            let mut zones = self.zones.write().await;
            zones.insert(zone_id, handle.clone());
        }

        self.spawn_initialize(handle).await;
    }

    /// Initialize with doubling backoff until it succeeds or shutdown.
    async fn spawn_initialize(&self, handle: Arc<ZoneHandle>) {
        let backend = handle.backend.read().await.clone();
        let shutdown = self.shutdown.clone();
        let zone_id = handle.zone_id;
        let task = tokio::spawn(async move {
            let mut delay = INIT_RETRY_INITIAL;
            loop {
                if shutdown.is_cancelled() {
                    break;
                }
                match backend.initialize().await {
                    Ok(()) => break,
                    Err(e) => {
                        warn!(zone = zone_id, "backend init failed: {e}, retry in {delay:?}");
                        tokio::select! {
                            _ = shutdown.cancelled() => break,
                            _ = tokio::time::sleep(delay) => {
                                delay = (delay * 2).min(INIT_RETRY_MAX);
                            }
                        }
                    }
                }
            }
        });
        #[allow(clippy::unwrap_used)]
        let mut slot = handle.init_task.lock().unwrap();
        if let Some(old) = slot.replace(task) {
            old.abort();
        }
    }

    async fn teardown_zone(&self, handle: &Arc<ZoneHandle>) {
        {
            #[allow(clippy::unwrap_used)]
            let task = handle.init_task.lock().unwrap().take();
            if let Some(task) = task {
                task.abort();
            }
        }
        let backend = handle.backend.read().await.clone();
        backend.cleanup().await;
    }

    /// Remove a zone entirely; its backend cleanup runs first.
    pub async fn remove_zone(&self, zone_id: u32) {
        let handle = {
            let mut zones = self.zones.write().await;
            zones.remove(&zone_id)
        };
        if let Some(handle) = handle {
            self.teardown_zone(&handle).await;
        }
        if self.groups.remove_zone_from_groups(zone_id) {
            self.update_zone_group();
        }
    }

    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let handles: Vec<Arc<ZoneHandle>> = {
            let zones = self.zones.read().await;
            zones.values().cloned().collect()
        };
        let cleanups = handles.iter().map(|h| self.teardown_zone(h));
        if tokio::time::timeout(SHUTDOWN_DEADLINE, futures::future::join_all(cleanups))
            .await
            .is_err()
        {
            warn!("backend cleanup exceeded shutdown deadline");
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    async fn zone(&self, zone_id: u32) -> Option<Arc<ZoneHandle>> {
        let zones = self.zones.read().await;
        zones.get(&zone_id).cloned()
    }

    pub async fn zone_ids(&self) -> Vec<u32> {
        let zones = self.zones.read().await;
        let mut ids: Vec<u32> = zones.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub async fn status(&self, zone_id: u32) -> Option<PlayerStatus> {
        let handle = self.zone(zone_id).await?;
        let state = handle.state.lock().await;
        Some(state.status.clone())
    }

    pub async fn all_statuses(&self) -> Vec<PlayerStatus> {
        let handles: Vec<Arc<ZoneHandle>> = {
            let zones = self.zones.read().await;
            let mut entries: Vec<_> = zones.values().cloned().collect();
            entries.sort_by_key(|h| h.zone_id);
            entries
        };
        let mut out = Vec::with_capacity(handles.len());
        for handle in handles {
            let state = handle.state.lock().await;
            out.push(state.status.clone());
        }
        out
    }

    pub async fn queue(&self, zone_id: u32) -> Option<Queue> {
        let handle = self.zone(zone_id).await?;
        let state = handle.state.lock().await;
        state.queue.clone()
    }

    pub async fn capabilities(&self, zone_id: u32) -> Option<CapabilityMatrix> {
        let handle = self.zone(zone_id).await?;
        let state = handle.state.lock().await;
        Some(state.capabilities)
    }

    pub async fn zone_config(&self, zone_id: u32) -> Option<ZoneConfig> {
        let handle = self.zone(zone_id).await?;
        Some(handle.config())
    }

    /// Reverse lookup for adapters that carry vendor-side ids.
    pub async fn find_zone_by_backend_player_id(&self, player_id: &str) -> Option<u32> {
        let zones = self.zones.read().await;
        zones
            .values()
            .find(|h| h.config().ma_player_id.as_deref() == Some(player_id))
            .map(|h| h.zone_id)
    }

    pub fn suggestions(&self, backend: &str) -> Vec<PlayerSuggestion> {
        #[allow(clippy::unwrap_used)]
        let suggestions = self.suggestions.read().unwrap();
        suggestions.get(backend).cloned().unwrap_or_default()
    }

    // =========================================================================
    // Ingest: the per-zone serial point
    // =========================================================================

    async fn run(self: Arc<Self>, mut rx: mpsc::Receiver<BackendUpdate>) {
        info!("zone manager started");
        loop {
            let update = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                update = rx.recv() => update,
            };
            let Some(update) = update else { break };
            self.handle_update(update).await;
        }
        info!("zone manager stopped");
    }

    async fn handle_update(&self, update: BackendUpdate) {
        match update {
            BackendUpdate::Status { zone_id, update } => {
                self.merge_status(zone_id, update).await;
            }
            BackendUpdate::Queue { zone_id, queue } => {
                let Some(handle) = self.zone(zone_id).await else {
                    return;
                };
                let (totalitems, start) = (queue.totalitems, queue.start);
                {
                    let mut state = handle.state.lock().await;
                    state.queue = Some(queue);
                }
                self.update_zone_queue(zone_id, totalitems, start);
            }
            BackendUpdate::GroupTopology {
                backend,
                leader_player,
                member_players,
                external_id,
            } => {
                self.ingest_group_topology(backend, &leader_player, &member_players, external_id)
                    .await;
            }
            BackendUpdate::GroupDissolved {
                backend: _,
                external_id,
                leader_player,
            } => {
                let leader_zone = match (&external_id, &leader_player) {
                    (Some(ext), _) => self.groups.get_group_by_external_id(ext).map(|g| g.leader),
                    (None, Some(player)) => self.find_zone_by_backend_player_id(player).await,
                    _ => None,
                };
                if let Some(leader) = leader_zone {
                    let members = self
                        .groups
                        .get_group_by_leader(leader)
                        .map(|g| g.members)
                        .unwrap_or_default();
                    if self.groups.remove_group_by_leader(leader) {
                        self.update_zone_group();
                        self.push_membership_updates(&members, &[]).await;
                    }
                }
            }
            BackendUpdate::Suggestions { backend, players } => {
                #[allow(clippy::unwrap_used)]
                let mut suggestions = self.suggestions.write().unwrap();
                suggestions.insert(backend.to_string(), players);
            }
        }
    }

    /// Merge one partial status; broadcast only when the snapshot changed.
    async fn merge_status(&self, zone_id: u32, mut update: PlayerStatus) {
        let Some(handle) = self.zone(zone_id).await else {
            debug!(zone = zone_id, "status update for unknown zone dropped");
            return;
        };
        update.playerid = zone_id;

        let changed_snapshot = {
            let mut state = handle.state.lock().await;
            let before = state.status.clone();
            state.status.merge(&update);
            (state.status != before).then(|| state.status.clone())
        };

        if let Some(status) = changed_snapshot {
            self.bus.publish(PushEvent::AudioEvent {
                statuses: vec![status],
            });
        }
    }

    async fn ingest_group_topology(
        &self,
        backend: &'static str,
        leader_player: &str,
        member_players: &[String],
        external_id: Option<String>,
    ) {
        let Some(leader_zone) = self.find_zone_by_backend_player_id(leader_player).await else {
            debug!(player = leader_player, "group leader has no zone, ignored");
            return;
        };
        let mut member_zones = Vec::new();
        for player in member_players {
            if let Some(zone) = self.find_zone_by_backend_player_id(player).await {
                member_zones.push(zone);
            }
        }

        if member_zones.len() < 2 {
            if self.groups.remove_group_by_leader(leader_zone) {
                self.update_zone_group();
                self.push_membership_updates(&[leader_zone], &[]).await;
            }
            return;
        }

        let previous = self
            .groups
            .get_group_by_leader(leader_zone)
            .map(|g| g.members)
            .unwrap_or_default();
        let outcome = self.groups.upsert_group(GroupUpsert {
            leader: leader_zone,
            members: member_zones,
            backend: backend.to_string(),
            external_id,
            source: GroupSource::Backend,
        });
        if outcome.changed {
            self.update_zone_group();
            let members = outcome.record.map(|r| r.members).unwrap_or_default();
            self.push_membership_updates(&previous, &members).await;
        }
    }

    /// Refresh `players`/`syncedzones` on every zone whose membership moved.
    async fn push_membership_updates(&self, before: &[u32], after: &[u32]) {
        for zone_id in before.iter().filter(|z| !after.contains(*z)) {
            let update = PlayerStatus {
                playerid: *zone_id,
                players: Some(Vec::new()),
                syncedzones: Some(Vec::new()),
                ..PlayerStatus::default()
            };
            self.merge_status(*zone_id, update).await;
        }
        for zone_id in after {
            let update = PlayerStatus {
                playerid: *zone_id,
                players: Some(after.to_vec()),
                syncedzones: Some(after.to_vec()),
                ..PlayerStatus::default()
            };
            self.merge_status(*zone_id, update).await;
        }
    }

    // =========================================================================
    // Push-event helpers
    // =========================================================================

    /// Emit the queue push event for a zone.
    pub fn update_zone_queue(&self, zone_id: u32, totalitems: u32, start: u32) {
        self.bus.publish(PushEvent::AudioQueueEvent {
            playerid: zone_id,
            totalitems,
            start,
        });
    }

    /// Broadcast the full current group picture.
    pub fn update_zone_group(&self) {
        let groups = self
            .groups
            .get_all_groups()
            .iter()
            .map(GroupEventEntry::from)
            .collect();
        self.bus
            .publish(PushEvent::AudioGroupChangedEvent { groups });
    }

    // =========================================================================
    // Command dispatch
    // =========================================================================

    /// Dispatch a normalized command: the capability matrix first, then the
    /// backend, then the zone's content adapter, then an "unknown command"
    /// log (still acked upstream).
    pub async fn command(&self, zone_id: u32, command: ZoneCommand) -> Result<()> {
        let handle = self
            .zone(zone_id)
            .await
            .ok_or_else(|| anyhow!("unknown zone {zone_id}"))?;

        let capabilities = {
            let state = handle.state.lock().await;
            state.capabilities
        };
        if is_content_command(&command) && !capabilities.supports_content() {
            debug!(
                zone = zone_id,
                verb = command.verb(),
                "zone has no content path, command dropped"
            );
            return Ok(());
        }

        let backend = handle.backend.read().await.clone();

        match backend.send_command(&command).await {
            Ok(CommandOutcome::Handled) => Ok(()),
            Ok(CommandOutcome::Unhandled) => {
                let provider = media_provider();
                let adapter = self.adapters.select(backend.kind(), Some(provider.name()));
                if let Some(adapter) = adapter {
                    if adapter.handles(command.verb()) {
                        let config = handle.config();
                        let ctx = AdapterContext {
                            zone_id,
                            config: &config,
                            client: backend.rpc_client(),
                        };
                        if adapter.execute(&ctx, &command).await? {
                            return Ok(());
                        }
                    }
                }
                warn!(zone = zone_id, verb = command.verb(), "unknown command");
                Ok(())
            }
            Err(e) => {
                warn!(zone = zone_id, verb = command.verb(), "command failed: {e}");
                Err(e)
            }
        }
    }

    /// Relative volume: clamp `current + delta` into 0..100, push it to the
    /// driver, and optimistically merge so the next status read reflects it.
    pub async fn volume_delta(&self, zone_id: u32, delta: i32) -> Result<i32> {
        let current = self
            .status(zone_id)
            .await
            .and_then(|s| s.volume)
            .unwrap_or(0);
        let target = (current + delta).clamp(0, 100);
        self.command(zone_id, ZoneCommand::SetVolume(target)).await?;
        self.optimistic_status(zone_id, |s| s.volume = Some(target))
            .await;
        Ok(target)
    }

    /// Explicit or toggled shuffle; returns the applied value.
    pub async fn set_shuffle(&self, zone_id: u32, explicit: Option<bool>) -> Result<bool> {
        let current = self
            .status(zone_id)
            .await
            .and_then(|s| s.plshuffle)
            .unwrap_or(false);
        let target = explicit.unwrap_or(!current);
        self.command(zone_id, ZoneCommand::SetShuffle(target)).await?;
        self.optimistic_status(zone_id, |s| s.plshuffle = Some(target))
            .await;
        Ok(target)
    }

    pub async fn set_repeat(
        &self,
        zone_id: u32,
        mode: crate::zone::status::RepeatMode,
    ) -> Result<()> {
        self.command(zone_id, ZoneCommand::SetRepeat(mode)).await?;
        self.optimistic_status(zone_id, |s| s.plrepeat = Some(mode))
            .await;
        Ok(())
    }

    /// Route a command-sourced partial update through the ingest inbox so it
    /// shares the per-zone serial point with backend updates.
    async fn optimistic_status(&self, zone_id: u32, apply: impl FnOnce(&mut PlayerStatus)) {
        let mut update = PlayerStatus::new(zone_id);
        apply(&mut update);
        let _ = self
            .updates_tx
            .send(BackendUpdate::Status { zone_id, update })
            .await;
    }

    /// Group this zone (as leader) with the given members, then realign
    /// member volumes to the leader's.
    pub async fn join_group(&self, leader: u32, member_zones: &[u32]) -> Result<()> {
        let leader_handle = self
            .zone(leader)
            .await
            .ok_or_else(|| anyhow!("unknown zone {leader}"))?;
        let backend_kind = leader_handle.backend.read().await.kind();
        let native_grouping = {
            let state = leader_handle.state.lock().await;
            state.capabilities.supports_grouping()
        };

        let mut members = Vec::new();
        for zone_id in member_zones {
            if *zone_id == leader {
                continue;
            }
            let Some(config) = self.zone_config(*zone_id).await else {
                warn!(zone = zone_id, "group member unknown, skipped");
                continue;
            };
            let player = config.ma_player_id.clone().unwrap_or_default();
            members.push((*zone_id, player));
        }
        if members.is_empty() {
            return Ok(());
        }

        // The vendor RPC goes out only when the leader's driver owns group
        // topology; the tracker keeps the manual picture either way.
        if native_grouping {
            self.command(leader, ZoneCommand::GroupJoin { members: members.clone() })
                .await?;
        } else {
            debug!(zone = leader, "no native grouping, tracking only");
        }

        let mut all_zones: Vec<u32> = members.iter().map(|(z, _)| *z).collect();
        all_zones.push(leader);
        let outcome = self.groups.upsert_group(GroupUpsert {
            leader,
            members: all_zones,
            backend: backend_kind.to_string(),
            external_id: None,
            source: GroupSource::Manual,
        });
        if outcome.changed {
            self.update_zone_group();
            let group_members = outcome.record.map(|r| r.members).unwrap_or_default();
            self.push_membership_updates(&[], &group_members).await;
        }

        // Volume alignment: every member moves to the leader's level via a
        // signed delta against its own current volume.
        let leader_volume = self
            .status(leader)
            .await
            .and_then(|s| s.volume)
            .unwrap_or(0);
        for (zone_id, _) in &members {
            let member_volume = self
                .status(*zone_id)
                .await
                .and_then(|s| s.volume)
                .unwrap_or(0);
            let delta = leader_volume - member_volume;
            if delta != 0 {
                if let Err(e) = self.volume_delta(*zone_id, delta).await {
                    warn!(zone = zone_id, "volume realignment failed: {e}");
                }
            }
        }
        Ok(())
    }

    /// Remove members (or the zone itself) from their group.
    pub async fn leave_group(&self, zone_id: u32, member_zones: &[u32]) -> Result<()> {
        let targets: Vec<u32> = if member_zones.is_empty() {
            vec![zone_id]
        } else {
            member_zones.to_vec()
        };

        // Vendor-side ungroup goes through the commanding zone's backend,
        // and only when that backend owns group topology.
        let native_grouping = self
            .capabilities(zone_id)
            .await
            .map(|c| c.supports_grouping())
            .unwrap_or(false);
        if native_grouping {
            let mut members = Vec::new();
            for target in &targets {
                let player = self
                    .zone_config(*target)
                    .await
                    .and_then(|c| c.ma_player_id)
                    .unwrap_or_default();
                members.push((*target, player));
            }
            let _ = self
                .command(zone_id, ZoneCommand::GroupLeave { members })
                .await;
        }

        let mut changed = false;
        for target in &targets {
            let previous = self
                .groups
                .get_group_by_zone(*target)
                .map(|g| g.members)
                .unwrap_or_default();
            if self.groups.remove_zone_from_groups(*target) {
                changed = true;
                let after = self
                    .groups
                    .get_group_by_zone(
                        previous.iter().copied().find(|z| z != target).unwrap_or(*target),
                    )
                    .map(|g| g.members)
                    .unwrap_or_default();
                self.push_membership_updates(&previous, &after).await;
            }
        }
        if changed {
            self.update_zone_group();
        }
        Ok(())
    }
}

/// Verbs the capability matrix's content column governs.
fn is_content_command(command: &ZoneCommand) -> bool {
    matches!(
        command,
        ZoneCommand::ServicePlay { .. }
            | ZoneCommand::PlaylistPlay { .. }
            | ZoneCommand::LibraryPlay { .. }
            | ZoneCommand::Announce { .. }
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::bus::create_bus;
    use crate::zone::status::{PlayerMode, RepeatMode};
    use std::time::Duration;

    async fn recv_audio_event(
        rx: &mut tokio::sync::broadcast::Receiver<PushEvent>,
    ) -> Vec<PlayerStatus> {
        loop {
            let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
                .await
                .expect("event timeout")
                .unwrap();
            if let PushEvent::AudioEvent { statuses } = event {
                return statuses;
            }
        }
    }

    fn zone_config(id: u32) -> ZoneConfig {
        ZoneConfig {
            id,
            ..ZoneConfig::default()
        }
    }

    async fn manager_with_zones(ids: &[u32]) -> (Arc<ZoneManager>, SharedBus) {
        let bus = create_bus();
        let manager = ZoneManager::new(bus.clone(), AdapterRegistry::new());
        for id in ids {
            manager.upsert_zone(zone_config(*id)).await;
        }
        (manager, bus)
    }

    #[tokio::test]
    async fn merge_diff_broadcast() {
        let (manager, bus) = manager_with_zones(&[1]).await;
        let mut rx = bus.subscribe();

        // Null backend publishes the initial unconfigured status.
        let statuses = recv_audio_event(&mut rx).await;
        assert_eq!(statuses[0].playerid, 1);
        assert_eq!(statuses[0].title.as_deref(), Some("Unconfigured"));

        let tx = manager.updates_sender();
        tx.send(BackendUpdate::Status {
            zone_id: 1,
            update: PlayerStatus {
                playerid: 1,
                mode: Some(PlayerMode::Play),
                ..PlayerStatus::default()
            },
        })
        .await
        .unwrap();

        let statuses = recv_audio_event(&mut rx).await;
        assert_eq!(statuses[0].mode, Some(PlayerMode::Play));
        // Previous fields survive the partial merge.
        assert_eq!(statuses[0].title.as_deref(), Some("Unconfigured"));

        // A no-op update does not broadcast.
        tx.send(BackendUpdate::Status {
            zone_id: 1,
            update: PlayerStatus {
                playerid: 1,
                mode: Some(PlayerMode::Play),
                ..PlayerStatus::default()
            },
        })
        .await
        .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(rx.try_recv().is_err());
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn status_playerid_always_matches_zone() {
        let (manager, _bus) = manager_with_zones(&[4]).await;
        let tx = manager.updates_sender();
        // A driver bug sending the wrong playerid is corrected on merge.
        tx.send(BackendUpdate::Status {
            zone_id: 4,
            update: PlayerStatus {
                playerid: 99,
                volume: Some(10),
                ..PlayerStatus::default()
            },
        })
        .await
        .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(manager.status(4).await.unwrap().playerid, 4);
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn queue_update_emits_push_event() {
        let (manager, bus) = manager_with_zones(&[2]).await;
        let mut rx = bus.subscribe();

        manager
            .updates_sender()
            .send(BackendUpdate::Queue {
                zone_id: 2,
                queue: Queue::with_items(2, vec![], 0, Some(12)),
            })
            .await
            .unwrap();

        loop {
            let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
                .await
                .unwrap()
                .unwrap();
            if let PushEvent::AudioQueueEvent {
                playerid,
                totalitems,
                ..
            } = event
            {
                assert_eq!(playerid, 2);
                assert_eq!(totalitems, 12);
                break;
            }
        }
        assert!(manager.queue(2).await.is_some());
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn volume_delta_clamps() {
        let (manager, _bus) = manager_with_zones(&[1]).await;
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

        assert_eq!(manager.volume_delta(1, 20).await.unwrap(), 100);

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
        assert_eq!(manager.volume_delta(1, -20).await.unwrap(), 0);
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn shuffle_toggles_twice_back_to_original() {
        let (manager, _bus) = manager_with_zones(&[1]).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        let first = manager.set_shuffle(1, None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        let second = manager.set_shuffle(1, None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_ne!(first, second);
        let final_state = manager.status(1).await.unwrap().plshuffle.unwrap();
        assert_eq!(final_state, second);
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn group_join_tracks_and_realigns_volume() {
        let (manager, bus) = manager_with_zones(&[5, 6]).await;
        let tx = manager.updates_sender();
        for (zone, volume) in [(5u32, 40), (6u32, 10)] {
            tx.send(BackendUpdate::Status {
                zone_id: zone,
                update: PlayerStatus {
                    playerid: zone,
                    volume: Some(volume),
                    ..PlayerStatus::default()
                },
            })
            .await
            .unwrap();
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
        let mut rx = bus.subscribe();

        manager.join_group(5, &[6]).await.unwrap();

        // Group change event fires.
        let mut saw_group_event = false;
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while tokio::time::Instant::now() < deadline {
            match tokio::time::timeout_at(deadline, rx.recv()).await {
                Ok(Ok(PushEvent::AudioGroupChangedEvent { groups })) => {
                    assert_eq!(groups.len(), 1);
                    assert_eq!(groups[0].group, 5);
                    assert_eq!(groups[0].players, vec![5, 6]);
                    saw_group_event = true;
                    break;
                }
                Ok(Ok(_)) => continue,
                _ => break,
            }
        }
        assert!(saw_group_event);

        let record = manager.group_tracker().get_group_by_zone(6).unwrap();
        assert_eq!(record.leader, 5);

        // Member volume realigned to the leader's.
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(manager.status(6).await.unwrap().volume, Some(40));
        assert_eq!(manager.status(6).await.unwrap().players, Some(vec![5, 6]));
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn leave_group_collapses_pair() {
        let (manager, _bus) = manager_with_zones(&[5, 6]).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        manager.join_group(5, &[6]).await.unwrap();
        manager.leave_group(6, &[]).await.unwrap();
        assert!(manager.group_tracker().get_group_by_zone(5).is_none());
        assert!(manager.group_tracker().get_group_by_zone(6).is_none());
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn reassignment_replaces_backend() {
        let (manager, _bus) = manager_with_zones(&[3]).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Same id, new backend kind: old driver torn down, new one installed.
        manager
            .upsert_zone(ZoneConfig {
                id: 3,
                backend: Some("beolink".to_string()),
                ip: Some("127.0.0.1".to_string()),
                ..ZoneConfig::default()
            })
            .await;
        let caps = manager.capabilities(3).await.unwrap();
        assert_eq!(caps, CapabilityMatrix::beolink());
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn content_commands_gated_by_capability_matrix() {
        let (manager, bus) = manager_with_zones(&[1]).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        let mut rx = bus.subscribe();

        // An unconfigured zone carries no content capability: the command is
        // acked but never reaches a driver or adapter.
        manager
            .command(
                1,
                ZoneCommand::ServicePlay {
                    uri: "radio:tunein:s1".to_string(),
                },
            )
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        while let Ok(event) = rx.try_recv() {
            assert!(
                !matches!(event, PushEvent::AudioEvent { .. }),
                "gated command must not change state"
            );
        }
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn repeat_command_applies_optimistically() {
        let (manager, _bus) = manager_with_zones(&[1]).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        manager.set_repeat(1, RepeatMode::Track).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(
            manager.status(1).await.unwrap().plrepeat,
            Some(RepeatMode::Track)
        );
        manager.shutdown().await;
    }
}
