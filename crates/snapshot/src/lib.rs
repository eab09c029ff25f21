//! Snapshot identity and retention
//!
//! This crate provides:
//! - World and snapshot identities
//! - Versioned snapshot naming (current + legacy schemes)
//! - Retention policies (all, fixed count, daily, GFS)
//! - The persisted policy string codec

pub mod id;
pub mod naming;
pub mod policy;
pub mod retention;

// Re-exports
pub use id::{SnapshotId, WorldId, WORLD_ID_FILE};
pub use naming::{belongs_to, decode, encode, snapshots_by_world, snapshots_for_world, NamingScheme};
pub use policy::{ParamKind, ParamSpec, PolicyKind};
pub use retention::RetentionPolicy;

/// Errors decoding snapshot names
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NameError {
    #[error("Snapshot name '{name}' has {found} segments, expected {expected}")]
    SegmentCount {
        name: String,
        expected: usize,
        found: usize,
    },

    #[error("Snapshot name '{name}' has malformed timestamp '{short}'")]
    BadTimestamp { name: String, short: String },

    #[error("Invalid world id '{0}'")]
    InvalidWorld(String),

    #[error("Unrecognized snapshot name '{0}'")]
    Unrecognized(String),
}
