//! Versioned snapshot naming
//!
//! Two schemes exist. New snapshots are always named with
//! [`NamingScheme::Current`]; [`NamingScheme::Legacy`] names are still
//! decoded so older backups stay visible and prunable.
//!
//! | Scheme  | Store name                          |
//! |---------|-------------------------------------|
//! | Legacy  | `snapshots/<world>/<yyyy-MM-dd_HH-mm-ss>` |
//! | Current | `<world>/<yyyy-MM-dd_HH-mm-ss>`     |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::id::{parse_short_name, SnapshotId, WorldId};
use crate::NameError;

/// Segment separator shared by both schemes
pub const SEPARATOR: char = '/';

/// Leading segment of legacy names
pub const LEGACY_PREFIX: &str = "snapshots";

/// Naming scheme a snapshot name was produced with
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum NamingScheme {
    /// `snapshots/<world>/<short>`
    Legacy,
    /// `<world>/<short>`
    Current,
}

impl NamingScheme {
    /// All schemes that can be decoded, newest first
    pub const ALL: [NamingScheme; 2] = [NamingScheme::Current, NamingScheme::Legacy];

    fn segment_count(self) -> usize {
        match self {
            NamingScheme::Legacy => 3,
            NamingScheme::Current => 2,
        }
    }

    /// Render the store name for a world and short name
    pub fn store_name(self, world: &WorldId, short: &str) -> String {
        match self {
            NamingScheme::Legacy => {
                format!("{LEGACY_PREFIX}{SEPARATOR}{world}{SEPARATOR}{short}")
            }
            NamingScheme::Current => format!("{world}{SEPARATOR}{short}"),
        }
    }

    /// Prefix every snapshot name of `world` starts with under this scheme
    pub fn world_prefix(self, world: &WorldId) -> String {
        match self {
            NamingScheme::Legacy => format!("{LEGACY_PREFIX}{SEPARATOR}{world}{SEPARATOR}"),
            NamingScheme::Current => format!("{world}{SEPARATOR}"),
        }
    }

    /// Snapshot of `world` taken now
    pub fn create(self, world: &WorldId) -> SnapshotId {
        self.create_at(world, Utc::now())
    }

    /// Snapshot of `world` at a given instant
    pub fn create_at(self, world: &WorldId, timestamp: DateTime<Utc>) -> SnapshotId {
        SnapshotId::new(world.clone(), timestamp, self)
    }

    /// Snapshot of `world` from an existing short name
    pub fn create_from_short(self, world: &WorldId, short: &str) -> Result<SnapshotId, NameError> {
        let timestamp = parse_short_name(short).ok_or_else(|| NameError::BadTimestamp {
            name: self.store_name(world, short),
            short: short.to_string(),
        })?;
        Ok(SnapshotId::new(world.clone(), timestamp, self))
    }

    /// Whether `raw` is a snapshot name of `world` under this scheme
    pub fn is_snapshot_name(self, world: &WorldId, raw: &str) -> bool {
        raw.starts_with(&self.world_prefix(world))
            && self.from_name(raw).map(|id| id.world() == world).unwrap_or(false)
    }

    /// Decode a store name with this scheme's structure
    pub fn from_name(self, raw: &str) -> Result<SnapshotId, NameError> {
        let segments: Vec<&str> = raw.split(SEPARATOR).collect();
        if segments.len() != self.segment_count() {
            return Err(NameError::SegmentCount {
                name: raw.to_string(),
                expected: self.segment_count(),
                found: segments.len(),
            });
        }

        let (world, short) = match self {
            NamingScheme::Legacy => {
                if segments[0] != LEGACY_PREFIX {
                    return Err(NameError::Unrecognized(raw.to_string()));
                }
                (segments[1], segments[2])
            }
            NamingScheme::Current => (segments[0], segments[1]),
        };

        let world = WorldId::new(world)?;
        let timestamp = parse_short_name(short).ok_or_else(|| NameError::BadTimestamp {
            name: raw.to_string(),
            short: short.to_string(),
        })?;

        Ok(SnapshotId::new(world, timestamp, self))
    }
}

/// Store name for a new snapshot of `world` at `timestamp`
pub fn encode(world: &WorldId, timestamp: DateTime<Utc>) -> String {
    NamingScheme::Current.create_at(world, timestamp).store_name()
}

/// Decode a store name produced by any known scheme
///
/// The scheme is picked by structure: three segments led by `snapshots`
/// is legacy, two segments is current.
pub fn decode(raw: &str) -> Result<SnapshotId, NameError> {
    let segments = raw.split(SEPARATOR).count();
    let scheme = NamingScheme::ALL
        .into_iter()
        .find(|scheme| scheme.segment_count() == segments)
        .ok_or_else(|| NameError::SegmentCount {
            name: raw.to_string(),
            expected: NamingScheme::Current.segment_count(),
            found: segments,
        })?;
    scheme.from_name(raw)
}

/// Whether `raw` names a snapshot of `world` under any scheme
pub fn belongs_to(world: &WorldId, raw: &str) -> bool {
    NamingScheme::ALL
        .into_iter()
        .any(|scheme| scheme.is_snapshot_name(world, raw))
}

/// Decode every name and keep the snapshots of `world`
///
/// Names that don't parse or belong to another world are skipped.
pub fn snapshots_for_world<'a, I>(names: I, world: &WorldId) -> BTreeSet<SnapshotId>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut snapshots = BTreeSet::new();

    for name in names {
        match decode(name) {
            Ok(id) if id.world() == world => {
                snapshots.insert(id);
            }
            Ok(id) => {
                tracing::debug!("Skipping snapshot {} of other world {}", name, id.world());
            }
            Err(e) => {
                tracing::debug!("Skipping ref {}: {}", name, e);
            }
        }
    }

    snapshots
}

/// Decode every name, grouped by owning world
pub fn snapshots_by_world<'a, I>(names: I) -> BTreeMap<WorldId, BTreeSet<SnapshotId>>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut grouped: BTreeMap<WorldId, BTreeSet<SnapshotId>> = BTreeMap::new();

    for name in names {
        match decode(name) {
            Ok(id) => {
                grouped.entry(id.world().clone()).or_default().insert(id);
            }
            Err(e) => {
                tracing::debug!("Skipping ref {}: {}", name, e);
            }
        }
    }

    grouped
}
