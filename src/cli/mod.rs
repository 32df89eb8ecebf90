pub mod exec;
pub mod list;
pub mod run;
pub mod topology;

use anyhow::Result;
use std::path::Path;

use crate::config::Config;

/// Loads `--config` if given, otherwise the default locations.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    Ok(config)
}
