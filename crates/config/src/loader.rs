use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{env_subst::substitute_env, schema::AgentdeskConfig};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "agentdesk.toml",
    "agentdesk.yaml",
    "agentdesk.yml",
    "agentdesk.json",
];

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> anyhow::Result<AgentdeskConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./agentdesk.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/agentdesk/agentdesk.{toml,yaml,yml,json}` (user-global)
///
/// Returns `AgentdeskConfig::default()` if no config file is found or the
/// file fails to parse.
pub fn discover_and_load() -> AgentdeskConfig {
    if let Some(path) = find_config_file() {
        debug!(path = %path.display(), "loading config");
        match load_config(&path) {
            Ok(cfg) => return cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            },
        }
    } else {
        debug!("no config file found, using defaults");
    }
    AgentdeskConfig::default()
}

/// Load an explicit config file, or fall back to discovery.
///
/// An explicit path that fails to load is an error rather than a silent default.
pub fn load_or_discover(path: Option<&Path>) -> anyhow::Result<AgentdeskConfig> {
    match path {
        Some(path) => load_config(path),
        None => Ok(discover_and_load()),
    }
}

fn find_config_file() -> Option<PathBuf> {
    for name in CONFIG_FILENAMES {
        let p = PathBuf::from(name);
        if p.exists() {
            return Some(p);
        }
    }

    let config_dir = config_dir()?;
    CONFIG_FILENAMES
        .iter()
        .map(|name| config_dir.join(name))
        .find(|p| p.exists())
}

/// Returns the user-global config directory (`~/.config/agentdesk/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "agentdesk").map(|d| d.config_dir().to_path_buf())
}

fn parse_config(raw: &str, path: &Path) -> anyhow::Result<AgentdeskConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    }
}
