use std::path::Path;

use {
    agentdesk_config::AgentdeskConfig,
    agentdesk_cron::parse_timezone,
    clap::Subcommand,
};

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Validate the loaded configuration and print a summary.
    Check,
}

pub fn handle_config(
    action: ConfigAction,
    path: Option<&Path>,
    config: &AgentdeskConfig,
) -> anyhow::Result<()> {
    match action {
        ConfigAction::Check => check(path, config),
    }
}

fn check(path: Option<&Path>, config: &AgentdeskConfig) -> anyhow::Result<()> {
    match path {
        Some(p) => eprintln!("Checking {}\n", p.display()),
        None => eprintln!("Checking discovered config (defaults if none found)\n"),
    }

    let mut errors = Vec::new();
    if let Err(e) = parse_timezone(&config.scheduler.timezone) {
        errors.push(e.to_string());
    }
    if config.llm.api_key.is_none() {
        errors.push("llm.api_key is not set".into());
    }
    for agent in &config.agents {
        if agent.system_prompt.trim().is_empty() {
            errors.push(format!("agent '{}' has an empty system_prompt", agent.name));
        }
    }

    let active = config.agents.iter().filter(|a| a.is_active).count();
    eprintln!("  server     {}:{}", config.server.bind, config.server.port);
    eprintln!("  database   {}", config.database.url);
    eprintln!(
        "  scheduler  {} (enabled: {})",
        config.scheduler.timezone, config.scheduler.enabled
    );
    eprintln!("  llm        {} via {}", config.llm.model, config.llm.base_url);
    eprintln!("  smtp       {}:{}", config.smtp.host, config.smtp.port);
    eprintln!("  agents     {active} active of {}", config.agents.len());
    eprintln!();

    if errors.is_empty() {
        eprintln!("No issues found.");
        return Ok(());
    }
    for e in &errors {
        eprintln!("  error: {e}");
    }
    anyhow::bail!("{} configuration error(s)", errors.len())
}
