//! Integration tests for snapshot naming and retention

use chrono::{Duration, TimeZone, Utc};
use snapshot::{policy, snapshots_for_world, NamingScheme, RetentionPolicy, WorldId};
use std::collections::BTreeSet;

/// Refs as they appear in a store that was migrated from the legacy scheme
fn mixed_store(world: &WorldId, other: &WorldId) -> Vec<String> {
    let start = Utc.with_ymd_and_hms(2023, 1, 1, 6, 0, 0).unwrap();
    let mut names = vec!["main".to_string(), "worldsnap/push-tmp".to_string()];

    // January under the legacy scheme, then current names every 8 hours
    for i in 0..31 {
        let ts = start + Duration::days(i);
        names.push(NamingScheme::Legacy.create_at(world, ts).store_name());
    }
    for i in 0..(28 * 3) {
        let ts = start + Duration::days(31) + Duration::hours(i * 8);
        names.push(NamingScheme::Current.create_at(world, ts).store_name());
        names.push(NamingScheme::Current.create_at(other, ts).store_name());
    }

    names
}

#[test]
fn test_listing_then_pruning_lifecycle() -> anyhow::Result<()> {
    let world = WorldId::new("01HN8WORLDA")?;
    let other = WorldId::new("01HN8WORLDB")?;
    let names = mixed_store(&world, &other);

    let snapshots = snapshots_for_world(names.iter().map(String::as_str), &world);
    assert_eq!(snapshots.len(), 31 + 28 * 3);
    assert!(snapshots.iter().all(|id| id.world() == &world));

    let legacy = snapshots
        .iter()
        .filter(|id| id.scheme() == NamingScheme::Legacy)
        .count();
    assert_eq!(legacy, 31);

    // Every decoded id maps back to a name that exists in the store
    let known: BTreeSet<&str> = names.iter().map(String::as_str).collect();
    for id in &snapshots {
        assert!(known.contains(id.store_name().as_str()));
    }

    let now = Utc.with_ymd_and_hms(2023, 3, 1, 12, 0, 0).unwrap();
    let gfs = policy::decode("gfs").expect("gfs decodes");
    let prune = gfs.snapshots_to_prune_at(&snapshots, now);

    let survivors: BTreeSet<_> = snapshots.difference(&prune.iter().cloned().collect()).cloned().collect();

    // Last two days untouched: three snapshots per day
    let recent = survivors
        .iter()
        .filter(|id| (now - id.timestamp()) < Duration::days(1))
        .count();
    assert!(recent >= 2);

    // The legacy January snapshots collapse to a single monthly survivor
    let january = survivors
        .iter()
        .filter(|id| id.scheme() == NamingScheme::Legacy)
        .count();
    assert_eq!(january, 1);

    Ok(())
}

#[test]
fn test_fixed_count_over_store_listing() -> anyhow::Result<()> {
    let world = WorldId::new("W")?;
    let base = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
    let names: Vec<String> = (0..5)
        .map(|i| snapshot::encode(&world, base + Duration::minutes(i)))
        .collect();

    let snapshots = snapshots_for_world(names.iter().map(String::as_str), &world);
    let policy = policy::decode("fixed count=3").expect("fixed decodes");
    assert_eq!(policy, RetentionPolicy::FixedCount { count: 3 });

    let mut pruned: Vec<String> = policy
        .snapshots_to_prune(&snapshots)
        .iter()
        .map(|id| id.store_name())
        .collect();
    pruned.sort();

    assert_eq!(
        pruned,
        vec![
            "W/2024-06-01_00-01-00".to_string(),
            "W/2024-06-01_00-02-00".to_string(),
        ]
    );

    Ok(())
}
