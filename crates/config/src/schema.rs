//! Config schema types (server, database, scheduler, llm, smtp, agents).

use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentdeskConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub scheduler: SchedulerConfig,
    pub llm: LlmConfig,
    pub smtp: SmtpConfig,
    pub agents: Vec<AgentConfig>,
}

/// Admin API server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to. Defaults to "127.0.0.1".
    pub bind: String,
    /// Port to listen on. Defaults to 8000.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".into(),
            port: 8000,
        }
    }
}

/// Durable task store location.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// sqlx connection URL. Defaults to `sqlite://agentdesk.db?mode=rwc`.
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://agentdesk.db?mode=rwc".into(),
        }
    }
}

/// Scheduled task executor tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Whether scheduled tasks fire at all. The admin API keeps working when off.
    pub enabled: bool,
    /// IANA timezone every cron field is evaluated in.
    pub timezone: String,
    /// How often the firing loop checks for due jobs.
    pub tick_interval_secs: u64,
    /// Missed fires older than this are dropped instead of caught up. `0` disables catch-up.
    pub misfire_grace_secs: u64,
    /// Upper bound on a single task execution, callback included.
    pub execution_timeout_secs: u64,
    /// How long `stop` waits for in-flight executions before abandoning them.
    pub shutdown_grace_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timezone: "Europe/Rome".into(),
            tick_interval_secs: 1,
            misfire_grace_secs: 3600,
            execution_timeout_secs: 2 * 60 * 60,
            shutdown_grace_secs: 30,
        }
    }
}

/// LLM provider used to answer scheduled prompts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    #[serde(
        serialize_with = "serialize_option_secret",
        skip_serializing_if = "Option::is_none"
    )]
    pub api_key: Option<Secret<String>>,
    /// Default model when an agent does not pin one.
    pub model: String,
    /// Bound on one agent query, retries included.
    pub timeout_secs: u64,
    /// Attempts on provider overload (HTTP 529) or rate limiting.
    pub max_retries: u8,
    /// Log full LLM inputs/outputs at debug level. Produces very large logs.
    pub trace_io: bool,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.anthropic.com".into(),
            api_key: None,
            model: "claude-3-5-sonnet-20241022".into(),
            timeout_secs: 300,
            max_retries: 5,
            trace_io: false,
        }
    }
}

/// Outgoing mail for scheduled reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SmtpConfig {
    pub host: String,
    /// 465 uses implicit TLS when `use_ssl` is set; 25 and 587 use STARTTLS.
    pub port: u16,
    pub username: Option<String>,
    #[serde(
        serialize_with = "serialize_option_secret",
        skip_serializing_if = "Option::is_none"
    )]
    pub password: Option<Secret<String>>,
    pub use_ssl: bool,
    pub from_email: String,
    pub from_name: String,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 587,
            username: None,
            password: None,
            use_ssl: false,
            from_email: "reports@localhost".into(),
            from_name: "Agentdesk".into(),
        }
    }
}

/// One named agent a scheduled task can target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub system_prompt: String,
    /// Model override; falls back to `llm.model`.
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

// ── Serde helpers for Secret<String> ────────────────────────────────────────

fn serialize_option_secret<S: serde::Serializer>(
    secret: &Option<Secret<String>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match secret {
        Some(s) => serializer.serialize_some(s.expose_secret()),
        None => serializer.serialize_none(),
    }
}

impl AgentdeskConfig {
    /// Look up an agent section by name.
    pub fn agent(&self, name: &str) -> Option<&AgentConfig> {
        self.agents.iter().find(|a| a.name == name)
    }
}
