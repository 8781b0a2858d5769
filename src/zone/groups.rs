//! Sync-group topology tracker.
//!
//! Keeps the leader/member picture of multi-zone playback groups and three
//! indices over it. Upserts are diffed structurally so no-op updates do not
//! emit redundant group-change broadcasts.

use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

/// Who created a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupSource {
    /// Created through a miniserver group command.
    Manual,
    /// Reported by a vendor backend.
    Backend,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupRecord {
    pub leader: u32,
    /// Leader first, remainder deduped and sorted.
    pub members: Vec<u32>,
    /// Driver that owns the group topology.
    pub backend: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    pub source: GroupSource,
    pub updated_at: i64,
}

/// Input for [`GroupTracker::upsert_group`].
#[derive(Debug, Clone)]
pub struct GroupUpsert {
    pub leader: u32,
    pub members: Vec<u32>,
    pub backend: String,
    pub external_id: Option<String>,
    pub source: GroupSource,
}

#[derive(Debug)]
pub struct UpsertOutcome {
    pub record: Option<GroupRecord>,
    pub changed: bool,
}

#[derive(Default)]
struct Indices {
    groups_by_leader: HashMap<u32, GroupRecord>,
    leader_by_zone: HashMap<u32, u32>,
    leader_by_external_id: HashMap<String, u32>,
}

impl Indices {
    fn install(&mut self, record: GroupRecord) {
        for member in &record.members {
            self.leader_by_zone.insert(*member, record.leader);
        }
        if let Some(ext) = &record.external_id {
            self.leader_by_external_id.insert(ext.clone(), record.leader);
        }
        self.groups_by_leader.insert(record.leader, record);
    }

    fn retire(&mut self, leader: u32) -> Option<GroupRecord> {
        let record = self.groups_by_leader.remove(&leader)?;
        for member in &record.members {
            if self.leader_by_zone.get(member) == Some(&leader) {
                self.leader_by_zone.remove(member);
            }
        }
        if let Some(ext) = &record.external_id {
            if self.leader_by_external_id.get(ext) == Some(&leader) {
                self.leader_by_external_id.remove(ext);
            }
        }
        Some(record)
    }
}

#[derive(Default)]
pub struct GroupTracker {
    inner: RwLock<Indices>,
}

/// Leader first, remainder deduped and ascending.
fn normalize_members(leader: u32, members: &[u32]) -> Vec<u32> {
    let mut rest: Vec<u32> = members.iter().copied().filter(|m| *m != leader).collect();
    rest.sort_unstable();
    rest.dedup();
    let mut out = Vec::with_capacity(rest.len() + 1);
    out.push(leader);
    out.extend(rest);
    out
}

impl GroupTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install or update a group. A group with one effective member collapses
    /// to "no group" (removing any previous record under that leader).
    /// Members are pulled out of any other group they belonged to.
    pub fn upsert_group(&self, upsert: GroupUpsert) -> UpsertOutcome {
        let members = normalize_members(upsert.leader, &upsert.members);

        #[allow(clippy::unwrap_used)] // lock poisoning is unrecoverable here
        let mut idx = self.inner.write().unwrap();

        if members.len() <= 1 {
            let removed = idx.retire(upsert.leader).is_some();
            return UpsertOutcome {
                record: None,
                changed: removed,
            };
        }

        // Structural comparison against the existing record; timestamps are
        // not part of the identity.
        if let Some(existing) = idx.groups_by_leader.get(&upsert.leader) {
            if existing.members == members
                && existing.backend == upsert.backend
                && existing.external_id == upsert.external_id
                && existing.source == upsert.source
            {
                return UpsertOutcome {
                    record: Some(existing.clone()),
                    changed: false,
                };
            }
        }

        // Retire the previous record under this leader so members dropped by
        // this update (and a replaced external id) leave the indices with it.
        idx.retire(upsert.leader);

        // Every member lives in exactly one group: detach members that are
        // currently tracked under a different leader.
        let foreign_leaders: Vec<u32> = members
            .iter()
            .filter_map(|m| idx.leader_by_zone.get(m).copied())
            .filter(|l| *l != upsert.leader)
            .collect();
        for leader in foreign_leaders {
            if let Some(old) = idx.retire(leader) {
                let remaining: Vec<u32> = old
                    .members
                    .iter()
                    .copied()
                    .filter(|m| !members.contains(m))
                    .collect();
                if remaining.len() > 1 {
                    let record = GroupRecord {
                        leader: remaining[0],
                        members: normalize_members(remaining[0], &remaining),
                        backend: old.backend,
                        external_id: old.external_id,
                        source: old.source,
                        updated_at: chrono::Utc::now().timestamp_millis(),
                    };
                    idx.install(record);
                }
            }
        }

        let record = GroupRecord {
            leader: upsert.leader,
            members,
            backend: upsert.backend,
            external_id: upsert.external_id,
            source: upsert.source,
            updated_at: chrono::Utc::now().timestamp_millis(),
        };
        idx.install(record.clone());

        UpsertOutcome {
            record: Some(record),
            changed: true,
        }
    }

    pub fn remove_group_by_leader(&self, leader: u32) -> bool {
        #[allow(clippy::unwrap_used)]
        let mut idx = self.inner.write().unwrap();
        idx.retire(leader).is_some()
    }

    /// Drop a zone from whatever group holds it; collapses the group when
    /// fewer than two members remain. Returns whether anything changed.
    pub fn remove_zone_from_groups(&self, zone_id: u32) -> bool {
        #[allow(clippy::unwrap_used)]
        let mut idx = self.inner.write().unwrap();
        let Some(leader) = idx.leader_by_zone.get(&zone_id).copied() else {
            return false;
        };
        let Some(old) = idx.retire(leader) else {
            return false;
        };

        let remaining: Vec<u32> = old
            .members
            .iter()
            .copied()
            .filter(|m| *m != zone_id)
            .collect();
        if remaining.len() > 1 {
            let new_leader = if leader == zone_id { remaining[0] } else { leader };
            let record = GroupRecord {
                leader: new_leader,
                members: normalize_members(new_leader, &remaining),
                backend: old.backend,
                external_id: old.external_id,
                source: old.source,
                updated_at: chrono::Utc::now().timestamp_millis(),
            };
            idx.install(record);
        }
        true
    }

    pub fn get_group_by_zone(&self, zone_id: u32) -> Option<GroupRecord> {
        #[allow(clippy::unwrap_used)]
        let idx = self.inner.read().unwrap();
        let leader = idx.leader_by_zone.get(&zone_id)?;
        idx.groups_by_leader.get(leader).cloned()
    }

    pub fn get_group_by_leader(&self, leader: u32) -> Option<GroupRecord> {
        #[allow(clippy::unwrap_used)]
        let idx = self.inner.read().unwrap();
        idx.groups_by_leader.get(&leader).cloned()
    }

    pub fn get_group_by_external_id(&self, external_id: &str) -> Option<GroupRecord> {
        #[allow(clippy::unwrap_used)]
        let idx = self.inner.read().unwrap();
        let leader = idx.leader_by_external_id.get(external_id)?;
        idx.groups_by_leader.get(leader).cloned()
    }

    pub fn get_all_groups(&self) -> Vec<GroupRecord> {
        #[allow(clippy::unwrap_used)]
        let idx = self.inner.read().unwrap();
        let mut groups: Vec<GroupRecord> = idx.groups_by_leader.values().cloned().collect();
        groups.sort_by_key(|g| g.leader);
        groups
    }

    pub fn clear_all_groups(&self) {
        #[allow(clippy::unwrap_used)]
        let mut idx = self.inner.write().unwrap();
        *idx = Indices::default();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn upsert(leader: u32, members: &[u32]) -> GroupUpsert {
        GroupUpsert {
            leader,
            members: members.to_vec(),
            backend: "musicassistant".to_string(),
            external_id: None,
            source: GroupSource::Backend,
        }
    }

    #[test]
    fn members_normalized_leader_first() {
        let tracker = GroupTracker::new();
        let out = tracker.upsert_group(upsert(5, &[9, 6, 6, 5, 7]));
        assert!(out.changed);
        assert_eq!(out.record.unwrap().members, vec![5, 6, 7, 9]);
    }

    #[test]
    fn upsert_is_idempotent() {
        let tracker = GroupTracker::new();
        assert!(tracker.upsert_group(upsert(1, &[2, 3])).changed);
        let second = tracker.upsert_group(upsert(1, &[3, 2]));
        assert!(!second.changed, "identical upsert must report no change");
    }

    #[test]
    fn single_member_group_collapses() {
        let tracker = GroupTracker::new();
        let out = tracker.upsert_group(upsert(1, &[1]));
        assert!(out.record.is_none());
        assert!(!out.changed);
        assert!(tracker.get_group_by_zone(1).is_none());

        // Shrinking an existing group below two members removes it.
        tracker.upsert_group(upsert(1, &[2]));
        let out = tracker.upsert_group(upsert(1, &[]));
        assert!(out.changed);
        assert!(tracker.get_group_by_leader(1).is_none());
        assert!(tracker.get_group_by_zone(2).is_none());
    }

    #[test]
    fn remove_by_leader_clears_all_members() {
        let tracker = GroupTracker::new();
        tracker.upsert_group(upsert(5, &[6, 7]));
        assert!(tracker.remove_group_by_leader(5));
        for zone in [5, 6, 7] {
            assert!(tracker.get_group_by_zone(zone).is_none());
        }
        assert!(!tracker.remove_group_by_leader(5));
    }

    #[test]
    fn member_moves_between_groups() {
        let tracker = GroupTracker::new();
        tracker.upsert_group(upsert(1, &[2, 3]));
        tracker.upsert_group(upsert(10, &[3, 11]));

        // Zone 3 now belongs to leader 10 only.
        assert_eq!(tracker.get_group_by_zone(3).unwrap().leader, 10);
        // The old group keeps its other members.
        let old = tracker.get_group_by_leader(1).unwrap();
        assert_eq!(old.members, vec![1, 2]);
    }

    #[test]
    fn remove_zone_collapses_pair() {
        let tracker = GroupTracker::new();
        tracker.upsert_group(upsert(1, &[2]));
        assert!(tracker.remove_zone_from_groups(2));
        assert!(tracker.get_group_by_leader(1).is_none());
        assert!(!tracker.remove_zone_from_groups(2));
    }

    #[test]
    fn remove_leader_promotes_member() {
        let tracker = GroupTracker::new();
        tracker.upsert_group(upsert(1, &[2, 3]));
        assert!(tracker.remove_zone_from_groups(1));
        let g = tracker.get_group_by_zone(2).unwrap();
        assert_eq!(g.leader, 2);
        assert_eq!(g.members, vec![2, 3]);
    }

    #[test]
    fn external_id_reindexes_on_change() {
        let tracker = GroupTracker::new();
        let mut up = upsert(1, &[2]);
        up.external_id = Some("grp-a".to_string());
        tracker.upsert_group(up);
        assert!(tracker.get_group_by_external_id("grp-a").is_some());

        let mut up = upsert(1, &[2]);
        up.external_id = Some("grp-b".to_string());
        let out = tracker.upsert_group(up);
        assert!(out.changed);
        assert!(tracker.get_group_by_external_id("grp-a").is_none());
        assert_eq!(tracker.get_group_by_external_id("grp-b").unwrap().leader, 1);
    }
}
