//! Inspect and build retention policy strings

use anyhow::Result;
use owo_colors::OwoColorize;
use snapshot::{policy, PolicyKind};
use std::collections::BTreeMap;

/// Print the description of a persisted policy string
pub fn describe(text: &str) -> Result<()> {
    match policy::describe(text) {
        Some(description) => println!("{}", description),
        None => anyhow::bail!("Unknown retention policy: '{}'", text),
    }
    Ok(())
}

/// Print the persisted form of `kind` with `key=value` parameters
pub fn encode(kind: &str, params: &[String]) -> Result<()> {
    let kind = PolicyKind::from_name(kind)
        .ok_or_else(|| anyhow::anyhow!("Unknown policy kind '{}'", kind))?;

    let mut map = BTreeMap::new();
    for param in params {
        let (key, value) = param
            .split_once('=')
            .ok_or_else(|| anyhow::anyhow!("Expected key=value, got '{}'", param))?;
        if !kind.params().iter().any(|spec| spec.key == key) {
            println!("{} '{}' is not a parameter of {}", "!".yellow(), key, kind);
        }
        map.insert(key.to_string(), value.to_string());
    }

    println!("{}", policy::encode(kind, &map));
    Ok(())
}

/// Print every policy kind with its parameters
pub fn list() -> Result<()> {
    for kind in PolicyKind::ALL {
        println!("{}", kind.name().bold());
        println!("  {}", kind.describe(&BTreeMap::new()).dimmed());
        for spec in kind.params() {
            println!("  {}={} ({:?})", spec.key.cyan(), spec.default, spec.kind);
        }
    }
    Ok(())
}
