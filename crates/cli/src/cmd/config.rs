//! Show the effective configuration

use crate::config::{self, Config};
use anyhow::{Context, Result};
use std::path::Path;

pub fn run(path: Option<&Path>, example: bool) -> Result<()> {
    if example {
        print!("{}", config::example_config());
        return Ok(());
    }

    let location = path.map(Path::to_path_buf).or_else(config::config_file_path);
    if let Some(location) = &location {
        println!("# {}", location.display());
    }

    let effective: Config = config::load(path)?;
    let rendered = toml::to_string_pretty(&effective).context("Failed to serialize config")?;
    print!("{}", rendered);
    Ok(())
}
