//! Zone runtime: registry, normalized status, queues, groups.

pub mod capabilities;
pub mod groups;
pub mod manager;
pub mod queue;
pub mod status;

pub use capabilities::{CapabilityLevel, CapabilityMatrix};
pub use manager::ZoneManager;
pub use queue::{Queue, QueueItem};
pub use status::{AudioType, PlayerMode, PlayerStatus, PowerState, RepeatMode};
