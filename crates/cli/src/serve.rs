use std::{sync::Arc, time::Duration};

use {
    agentdesk_agents::AgentDirectory,
    agentdesk_config::AgentdeskConfig,
    agentdesk_cron::{Scheduler, SchedulerOptions, store_sqlite::SqliteTaskStore},
    agentdesk_gateway::{AppState, shutdown_signal, start_server},
    agentdesk_reports::{ScheduledReport, SmtpMailer},
    anyhow::Context,
    tracing::{info, warn},
};

/// Wire store, agents, mailer and scheduler together and serve the admin
/// API until a shutdown signal arrives.
pub async fn run(config: AgentdeskConfig, bind: &str, port: u16) -> anyhow::Result<()> {
    let store = Arc::new(
        SqliteTaskStore::new(&config.database.url)
            .await
            .with_context(|| format!("failed to open task store at {}", config.database.url))?,
    );

    let agents = Arc::new(AgentDirectory::from_config(&config.agents));
    if agents.is_empty() {
        warn!("no agents configured, every run will fail with agent not found");
    }
    let runner = agentdesk_agents::runner_from_config(&config.llm)
        .context("failed to configure the LLM provider")?;
    let mailer =
        Arc::new(SmtpMailer::from_config(&config.smtp).context("failed to configure SMTP")?);

    let options = SchedulerOptions::from_config(&config.scheduler)?;
    let callback = Arc::new(
        ScheduledReport::new(
            Arc::clone(&store) as _,
            agents,
            runner,
            mailer,
            options.timezone,
        )
        .with_agent_timeout(Duration::from_secs(config.llm.timeout_secs.max(1))),
    );
    let scheduler = Scheduler::new(store, callback, options);

    if config.scheduler.enabled {
        let registered = scheduler.start().await?;
        info!(registered, "scheduler running");
    } else {
        warn!("scheduler disabled by config, tasks will only run manually");
    }

    let served = start_server(
        bind,
        port,
        AppState::new(Arc::clone(&scheduler)),
        shutdown_signal(),
    )
    .await;
    scheduler.stop().await;
    served
}
