//! World and snapshot identities

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;
use std::str::FromStr;
use ulid::Ulid;

use crate::naming::NamingScheme;
use crate::NameError;

/// File inside the save tree that holds the world id
pub const WORLD_ID_FILE: &str = "worldsnap.id";

/// Fixed-width, lexicographically sortable rendering of a snapshot time
pub const SHORT_NAME_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Stable identifier of one world save
///
/// Generated once and stored in the save tree, so it follows the world
/// wherever its files are copied.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WorldId(String);

impl WorldId {
    /// Generate a fresh id
    pub fn generate() -> Self {
        Self(Ulid::new().to_string())
    }

    /// Validate an existing id string
    pub fn new(raw: impl Into<String>) -> Result<Self, NameError> {
        let raw = raw.into();
        if raw.is_empty() || raw.contains('/') || raw.chars().any(char::is_whitespace) {
            return Err(NameError::InvalidWorld(raw));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Read the id persisted in `world_dir`, if any
    pub fn load(world_dir: &Path) -> io::Result<Option<Self>> {
        let path = world_dir.join(WORLD_ID_FILE);
        if !path.exists() {
            return Ok(None);
        }

        let contents = fs::read_to_string(&path)?;
        Self::new(contents.trim())
            .map(Some)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    /// Read the persisted id, generating and writing one on first use
    pub fn load_or_create(world_dir: &Path) -> io::Result<Self> {
        if let Some(id) = Self::load(world_dir)? {
            return Ok(id);
        }

        let id = Self::generate();
        fs::write(world_dir.join(WORLD_ID_FILE), format!("{}\n", id))?;
        tracing::info!("Assigned world id {} to {}", id, world_dir.display());
        Ok(id)
    }
}

impl fmt::Display for WorldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for WorldId {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for WorldId {
    type Error = NameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<WorldId> for String {
    fn from(id: WorldId) -> Self {
        id.0
    }
}

/// One point-in-time backup of a world
///
/// Ordered by timestamp. World and naming scheme only break ties so that
/// `Ord` agrees with `Eq`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SnapshotId {
    world: WorldId,
    timestamp: DateTime<Utc>,
    scheme: NamingScheme,
}

impl SnapshotId {
    /// Build an id; the timestamp is truncated to whole seconds
    pub fn new(world: WorldId, timestamp: DateTime<Utc>, scheme: NamingScheme) -> Self {
        Self {
            world,
            timestamp: truncate_to_seconds(timestamp),
            scheme,
        }
    }

    pub fn world(&self) -> &WorldId {
        &self.world
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn scheme(&self) -> NamingScheme {
        self.scheme
    }

    /// Canonical `yyyy-MM-dd_HH-mm-ss` rendering (UTC)
    pub fn short_name(&self) -> String {
        self.timestamp.format(SHORT_NAME_FORMAT).to_string()
    }

    /// Fully-qualified name of the snapshot ref in the store
    pub fn store_name(&self) -> String {
        self.scheme.store_name(&self.world, &self.short_name())
    }
}

impl Ord for SnapshotId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.timestamp
            .cmp(&other.timestamp)
            .then_with(|| self.world.cmp(&other.world))
            .then_with(|| self.scheme.cmp(&other.scheme))
    }
}

impl PartialOrd for SnapshotId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.store_name())
    }
}

/// Parse a `yyyy-MM-dd_HH-mm-ss` short name back into a UTC timestamp
pub fn parse_short_name(short: &str) -> Option<DateTime<Utc>> {
    // chrono accepts some non-padded fields, so also insist on the width
    if short.len() != 19 {
        return None;
    }
    NaiveDateTime::parse_from_str(short, SHORT_NAME_FORMAT)
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}

fn truncate_to_seconds(ts: DateTime<Utc>) -> DateTime<Utc> {
    Utc.timestamp_opt(ts.timestamp(), 0).single().unwrap_or(ts)
}
