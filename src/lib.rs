//! VN Playback: a runtime for branching visual-novel chapters.
//!
//! Walks a validated graph of dialogue nodes, reveals each line through a
//! markup-aware typewriter, resolves stage assets through a reference-counted
//! cache that never applies a stale load, and snapshots the exact play
//! position for save and resume.

pub mod core;
pub mod schema;

pub use crate::core::cache::{AssetCache, AssetLoader, ResolveOutcome};
pub use crate::core::engine::{EngineError, PlaybackEngine};
pub use crate::core::events::{EngineEvent, Intent, Subscription};
pub use crate::core::graph::ScriptGraph;
pub use crate::schema::state::PlaybackState;
