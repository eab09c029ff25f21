//! Shared utilities for CLI commands

use anyhow::Result;
use chrono::{DateTime, Utc};
use owo_colors::OwoColorize;
use snapshot::{NamingScheme, SnapshotId};
use std::collections::BTreeSet;

/// Resolve a snapshot reference against a set of snapshots
///
/// Supports:
/// - `latest`
/// - Full store name: "01HN8.../2024-03-01_12-00-00"
/// - Short name: "2024-03-01_12-00-00"
/// - Unique short-name prefix: "2024-03-01_12" (at least 4 chars)
pub fn resolve_snapshot(reference: &str, snapshots: &BTreeSet<SnapshotId>) -> Result<SnapshotId> {
    if reference == "latest" {
        return snapshots
            .iter()
            .next_back()
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("No snapshots found"));
    }

    if let Some(id) = snapshots.iter().find(|id| id.store_name() == reference) {
        return Ok(id.clone());
    }
    if snapshot::decode(reference).is_ok() {
        anyhow::bail!("Snapshot not found: {}", reference);
    }

    if reference.len() >= 4 {
        let matching: Vec<_> = snapshots
            .iter()
            .filter(|id| id.short_name().starts_with(reference))
            .collect();

        match matching.as_slice() {
            [single] => return Ok((*single).clone()),
            [] => {}
            many => anyhow::bail!(
                "Ambiguous snapshot reference '{}': matches {} snapshots",
                reference,
                many.len()
            ),
        }
    }

    anyhow::bail!("Unknown snapshot reference: '{}'", reference)
}

/// Format timestamp as relative time ("2 hours ago")
pub fn format_relative_time(ts: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let seconds = (now - ts).num_seconds();
    if seconds < 0 {
        return "in the future".to_string();
    }

    if seconds < 60 {
        format!("{} seconds ago", seconds)
    } else if seconds < 3600 {
        format!("{} minutes ago", seconds / 60)
    } else if seconds < 86400 {
        format!("{} hours ago", seconds / 3600)
    } else if seconds < 604800 {
        format!("{} days ago", seconds / 86400)
    } else {
        format!("{} weeks ago", seconds / 604800)
    }
}

/// Format duration in user-friendly format
/// Shows the most significant unit without being overly granular
pub fn format_duration(secs: u64) -> String {
    const MINUTE: u64 = 60;
    const HOUR: u64 = MINUTE * 60;
    const DAY: u64 = HOUR * 24;

    if secs < MINUTE {
        format!("{} seconds", secs)
    } else if secs < HOUR {
        let mins = secs / MINUTE;
        if mins == 1 { "1 minute".to_string() } else { format!("{} minutes", mins) }
    } else if secs < DAY {
        let hours = secs / HOUR;
        if hours == 1 { "1 hour".to_string() } else { format!("{} hours", hours) }
    } else {
        let days = secs / DAY;
        if days == 1 { "1 day".to_string() } else { format!("{} days", days) }
    }
}

/// Print one snapshot line for `list`
pub fn display_snapshot(id: &SnapshotId, now: DateTime<Utc>) {
    let scheme = match id.scheme() {
        NamingScheme::Current => "",
        NamingScheme::Legacy => " (legacy)",
    };
    println!(
        "{} {}{}",
        id.short_name().yellow(),
        format_relative_time(id.timestamp(), now).dimmed(),
        scheme.dimmed()
    );
}
