//! Retention policy selection and its persisted string form
//!
//! A selection is stored as `<kind> key1=val1 key2=val2`, keys sorted.
//! Decoding never fails hard: unknown kinds yield `None` (retention unset)
//! and bad parameters fall back to defaults.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::retention::{RetentionPolicy, DEFAULT_FIXED_COUNT, DEFAULT_GRACE_DAYS};

/// Value type of a policy parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// Positive snapshot count
    Count,
    /// Whole number of days
    Days,
}

/// One configurable parameter of a policy kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamSpec {
    pub key: &'static str,
    pub kind: ParamKind,
    pub default: &'static str,
}

const FIXED_PARAMS: &[ParamSpec] = &[ParamSpec {
    key: "count",
    kind: ParamKind::Count,
    default: "10",
}];

const DAILY_PARAMS: &[ParamSpec] = &[ParamSpec {
    key: "grace_days",
    kind: ParamKind::Days,
    default: "3",
}];

/// The closed set of retention policy families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PolicyKind {
    All,
    FixedCount,
    Daily,
    Gfs,
}

impl PolicyKind {
    pub const ALL: [PolicyKind; 4] = [
        PolicyKind::All,
        PolicyKind::FixedCount,
        PolicyKind::Daily,
        PolicyKind::Gfs,
    ];

    /// Name used in the persisted form
    pub fn name(self) -> &'static str {
        match self {
            PolicyKind::All => "all",
            PolicyKind::FixedCount => "fixed",
            PolicyKind::Daily => "daily",
            PolicyKind::Gfs => "gfs",
        }
    }

    /// Exact-name lookup
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    /// Kind of an existing policy value
    pub fn of(policy: &RetentionPolicy) -> Self {
        match policy {
            RetentionPolicy::All => PolicyKind::All,
            RetentionPolicy::FixedCount { .. } => PolicyKind::FixedCount,
            RetentionPolicy::Daily { .. } => PolicyKind::Daily,
            RetentionPolicy::Gfs => PolicyKind::Gfs,
        }
    }

    pub fn params(self) -> &'static [ParamSpec] {
        match self {
            PolicyKind::FixedCount => FIXED_PARAMS,
            PolicyKind::Daily => DAILY_PARAMS,
            PolicyKind::All | PolicyKind::Gfs => &[],
        }
    }

    /// Human-readable description with `{key}` placeholders
    pub fn description_template(self) -> &'static str {
        match self {
            PolicyKind::All => "Keep every snapshot",
            PolicyKind::FixedCount => "Keep the {count} most recent snapshots",
            PolicyKind::Daily => {
                "Keep everything from the last {grace_days} days, then one snapshot per day"
            }
            PolicyKind::Gfs => {
                "Keep everything from the last 2 days, then one per day for a week, \
                 one per week for a month and one per month after that"
            }
        }
    }

    /// Render the description with `params`, defaults filling the gaps
    pub fn describe(self, params: &BTreeMap<String, String>) -> String {
        let mut text = self.description_template().to_string();
        for spec in self.params() {
            let value = params.get(spec.key).map(String::as_str).unwrap_or(spec.default);
            text = text.replace(&format!("{{{}}}", spec.key), value);
        }
        text
    }

    /// Build a policy from string parameters
    pub fn create(self, params: &BTreeMap<String, String>) -> RetentionPolicy {
        match self {
            PolicyKind::All => RetentionPolicy::All,
            PolicyKind::FixedCount => {
                let count = numeric_param(params, "count", DEFAULT_FIXED_COUNT, |n| n > 0);
                RetentionPolicy::fixed_count(count)
            }
            PolicyKind::Daily => {
                let grace_days = numeric_param(params, "grace_days", DEFAULT_GRACE_DAYS, |_| true);
                RetentionPolicy::daily(grace_days)
            }
            PolicyKind::Gfs => RetentionPolicy::Gfs,
        }
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl RetentionPolicy {
    /// Parameters that reconstruct this policy via [`PolicyKind::create`]
    pub fn params(&self) -> BTreeMap<String, String> {
        let mut params = BTreeMap::new();
        match self {
            RetentionPolicy::FixedCount { count } => {
                params.insert("count".to_string(), count.to_string());
            }
            RetentionPolicy::Daily { grace_days } => {
                params.insert("grace_days".to_string(), grace_days.to_string());
            }
            RetentionPolicy::All | RetentionPolicy::Gfs => {}
        }
        params
    }

    /// Persisted string form of this policy
    pub fn encode(&self) -> String {
        encode(PolicyKind::of(self), &self.params())
    }
}

fn numeric_param<T>(
    params: &BTreeMap<String, String>,
    key: &str,
    default: T,
    valid: impl Fn(T) -> bool,
) -> T
where
    T: FromStr + Copy + fmt::Display,
{
    match params.get(key) {
        None => default,
        Some(raw) => match raw.parse::<T>() {
            Ok(value) if valid(value) => value,
            _ => {
                tracing::warn!("Invalid value '{}' for {}, using default {}", raw, key, default);
                default
            }
        },
    }
}

fn is_token_safe(s: &str) -> bool {
    !s.is_empty() && !s.contains('=') && !s.contains(' ')
}

/// Encode a policy selection as `<kind> k=v ...` with sorted keys
///
/// Keys or values containing `=` or a space can't be represented and are
/// dropped.
pub fn encode(kind: PolicyKind, params: &BTreeMap<String, String>) -> String {
    let mut encoded = kind.name().to_string();

    for (key, value) in params {
        if !is_token_safe(key) || !is_token_safe(value) {
            tracing::warn!("Dropping unencodable policy parameter {:?}={:?}", key, value);
            continue;
        }
        encoded.push(' ');
        encoded.push_str(key);
        encoded.push('=');
        encoded.push_str(value);
    }

    encoded
}

/// Split a persisted selection into its kind and parameters
///
/// Returns `None` for blank text or an unknown kind.
pub fn parse(text: &str) -> Option<(PolicyKind, BTreeMap<String, String>)> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    let (name, blob) = text.split_once(' ').unwrap_or((text, ""));

    let Some(kind) = PolicyKind::from_name(name) else {
        tracing::warn!("Unknown retention policy '{}'", name);
        return None;
    };

    let mut params = BTreeMap::new();
    for token in blob.split(' ').filter(|t| !t.is_empty()) {
        match token.split_once('=') {
            Some((key, value)) if !key.is_empty() && !value.is_empty() && !value.contains('=') => {
                params.insert(key.to_string(), value.to_string());
            }
            _ => {
                tracing::warn!("Ignoring malformed policy parameter '{}'", token);
            }
        }
    }

    Some((kind, params))
}

/// Decode a persisted selection into a policy
pub fn decode(text: &str) -> Option<RetentionPolicy> {
    parse(text).map(|(kind, params)| kind.create(&params))
}

/// Human-readable description of a persisted selection
pub fn describe(text: &str) -> Option<String> {
    parse(text).map(|(kind, params)| kind.describe(&params))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{NamingScheme, SnapshotId, WorldId};
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeSet;

    fn params(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn hourly_snapshots(hours: u32) -> BTreeSet<SnapshotId> {
        let world = WorldId::new("W").unwrap();
        let start = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        (0..hours)
            .map(|h| {
                NamingScheme::Current
                    .create_at(&world, start + chrono::Duration::hours(i64::from(h) * 7))
            })
            .collect()
    }

    #[test]
    fn test_encode_sorts_keys() {
        let encoded = encode(PolicyKind::Daily, &params(&[("z", "1"), ("grace_days", "4")]));
        assert_eq!(encoded, "daily grace_days=4 z=1");
    }

    #[test]
    fn test_encode_drops_unsafe_tokens() {
        let encoded = encode(
            PolicyKind::FixedCount,
            &params(&[("count", "5"), ("bad key", "1"), ("k", "a=b"), ("x", "two words")]),
        );
        assert_eq!(encoded, "fixed count=5");
    }

    #[test]
    fn test_decode_each_kind() {
        assert_eq!(decode("all"), Some(RetentionPolicy::All));
        assert_eq!(decode("gfs"), Some(RetentionPolicy::Gfs));
        assert_eq!(
            decode("fixed count=4"),
            Some(RetentionPolicy::FixedCount { count: 4 })
        );
        assert_eq!(
            decode("daily grace_days=7"),
            Some(RetentionPolicy::Daily { grace_days: 7 })
        );
    }

    #[test]
    fn test_decode_unknown_or_blank_is_none() {
        assert_eq!(decode("weekly"), None);
        assert_eq!(decode("FIXED count=3"), None);
        assert_eq!(decode(""), None);
        assert_eq!(decode("   "), None);
    }

    #[test]
    fn test_decode_skips_malformed_tokens() {
        assert_eq!(
            decode("fixed junk =1 count=6 a=b=c"),
            Some(RetentionPolicy::FixedCount { count: 6 })
        );
    }

    #[test]
    fn test_invalid_numbers_fall_back() {
        assert_eq!(
            decode("fixed count=lots"),
            Some(RetentionPolicy::FixedCount {
                count: DEFAULT_FIXED_COUNT
            })
        );
        assert_eq!(
            decode("fixed count=0"),
            Some(RetentionPolicy::FixedCount {
                count: DEFAULT_FIXED_COUNT
            })
        );
        assert_eq!(
            decode("daily grace_days=-2"),
            Some(RetentionPolicy::Daily {
                grace_days: DEFAULT_GRACE_DAYS
            })
        );
    }

    #[test]
    fn test_roundtrip_preserves_decisions() {
        let snapshots = hourly_snapshots(200);
        let now = Utc.with_ymd_and_hms(2023, 3, 1, 0, 0, 0).unwrap();

        for policy in [
            RetentionPolicy::All,
            RetentionPolicy::fixed_count(7),
            RetentionPolicy::daily(5),
            RetentionPolicy::Gfs,
        ] {
            let decoded = decode(&policy.encode()).unwrap();
            assert_eq!(
                decoded.snapshots_to_prune_at(&snapshots, now),
                policy.snapshots_to_prune_at(&snapshots, now),
                "{}",
                policy.encode()
            );
        }
    }

    #[test]
    fn test_describe_fills_parameters() {
        assert_eq!(
            describe("fixed count=4").unwrap(),
            "Keep the 4 most recent snapshots"
        );
        assert_eq!(
            describe("fixed").unwrap(),
            "Keep the 10 most recent snapshots"
        );
        assert!(describe("nope").is_none());
    }

    #[test]
    fn test_defaults_match_constants() {
        assert_eq!(
            PolicyKind::FixedCount.params()[0].default,
            DEFAULT_FIXED_COUNT.to_string()
        );
        assert_eq!(
            PolicyKind::Daily.params()[0].default,
            DEFAULT_GRACE_DAYS.to_string()
        );
    }
}
