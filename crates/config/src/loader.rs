use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::{Error, GatewayConfig, Result};

/// File looked up in the working directory when no path is given.
pub const CONFIG_FILENAME: &str = "outpost.toml";

/// Load the configuration: defaults, then the TOML file (explicit `path`, or
/// `outpost.toml` in the working directory if present), then environment
/// overrides. The result is validated.
pub fn load(path: Option<&Path>) -> Result<GatewayConfig> {
    let mut config = match path {
        Some(path) => load_file(path)?,
        None => match discover() {
            Some(path) => load_file(&path)?,
            None => {
                debug!("no config file found, using defaults");
                GatewayConfig::default()
            },
        },
    };
    config.apply_env_overrides()?;
    config.validate()?;
    Ok(config)
}

/// Parse a single TOML config file. Missing keys take their defaults.
pub fn load_file(path: &Path) -> Result<GatewayConfig> {
    let raw = std::fs::read_to_string(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config = toml::from_str(&raw).map_err(|source| Error::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    info!(path = %path.display(), "loaded config file");
    Ok(config)
}

fn discover() -> Option<PathBuf> {
    let candidate = PathBuf::from(CONFIG_FILENAME);
    candidate.is_file().then_some(candidate)
}
