//! Audioserver - miniserver-facing audio bridge
//!
//! A drop-in audio server that speaks the miniserver's HTTP/WebSocket command
//! dialect on one side and a zoo of vendor player protocols on the other.
//!
//! This library provides:
//! - Per-zone backend drivers (Music Assistant RPC, BeoLink notification
//!   streams, null driver for unconfigured zones)
//! - A zone manager that normalizes vendor state into one player status model
//!   and broadcasts diffs to every subscriber
//! - A pluggable media-provider layer (radios, playlists, library, favorites,
//!   recently played, global search)
//! - A persistent per-zone favorites store
//! - The miniserver command router and its HTTP/WebSocket surface

// =============================================================================
// Lints - Enforce code quality and consistency
// =============================================================================

// Deny truly dangerous patterns (these will fail the build)
#![deny(unsafe_code)]
#![deny(unused_must_use)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]

pub mod alerts;
pub mod api;
pub mod backends;
pub mod bus;
pub mod config;
pub mod content;
pub mod error;
pub mod favorites;
pub mod ids;
pub mod providers;
pub mod router;
pub mod zone;
