//! Configuration loading with env substitution.
//!
//! Config files: `agentdesk.toml`, `agentdesk.yaml`, or `agentdesk.json`,
//! searched in `./` then `~/.config/agentdesk/`.
//!
//! Supports `${ENV_VAR}` and `${ENV_VAR:-fallback}` substitution in the raw file.

pub mod env_subst;
pub mod loader;
pub mod schema;

pub use {
    loader::{config_dir, discover_and_load, load_config, load_or_discover},
    schema::{
        AgentConfig, AgentdeskConfig, DatabaseConfig, LlmConfig, SchedulerConfig, ServerConfig,
        SmtpConfig,
    },
};
