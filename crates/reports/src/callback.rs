use std::{sync::Arc, time::Duration};

use {
    agentdesk_agents::{AgentDirectory, AgentRunner},
    agentdesk_cron::{
        ExecutionError, RunReport, TaskCallback, store::TaskStore, types::TaskId,
    },
    async_trait::async_trait,
    chrono::Utc,
    chrono_tz::Tz,
    tracing::{info, warn},
};

use crate::{
    html::{ReportContent, format_report_html, report_subject},
    mailer::{EmailMessage, Mailer},
};

const DEFAULT_AGENT_TIMEOUT: Duration = Duration::from_secs(300);

/// Runs a scheduled task: query its agent, then mail the formatted answer.
///
/// The task is reloaded by id on every run, so prompt, agent and recipient
/// edits take effect without touching the scheduler.
pub struct ScheduledReport {
    store: Arc<dyn TaskStore>,
    agents: Arc<AgentDirectory>,
    runner: Arc<dyn AgentRunner>,
    mailer: Arc<dyn Mailer>,
    /// Zone of the execution time shown in the mail; the scheduler's zone.
    timezone: Tz,
    agent_timeout: Duration,
}

impl ScheduledReport {
    pub fn new(
        store: Arc<dyn TaskStore>,
        agents: Arc<AgentDirectory>,
        runner: Arc<dyn AgentRunner>,
        mailer: Arc<dyn Mailer>,
        timezone: Tz,
    ) -> Self {
        Self {
            store,
            agents,
            runner,
            mailer,
            timezone,
            agent_timeout: DEFAULT_AGENT_TIMEOUT,
        }
    }

    /// Bound on one agent query, retries included.
    pub fn with_agent_timeout(mut self, timeout: Duration) -> Self {
        self.agent_timeout = timeout;
        self
    }
}

#[async_trait]
impl TaskCallback for ScheduledReport {
    async fn run(&self, task_id: TaskId) -> Result<RunReport, ExecutionError> {
        let task = self
            .store
            .get_task(task_id)
            .await
            .map_err(|e| ExecutionError::Store(e.to_string()))?
            .ok_or(ExecutionError::TaskNotFound { task_id })?;

        let profile = self.agents.resolve(&task.agent_name).ok_or_else(|| {
            ExecutionError::AgentNotFound {
                name: task.agent_name.clone(),
            }
        })?;

        if task.recipients.is_empty() {
            return Err(ExecutionError::NoRecipients);
        }

        info!(task_id, task = %task.name, agent = %profile.name, "querying agent");
        let response = tokio::time::timeout(
            self.agent_timeout,
            self.runner.ask(profile, &task.prompt),
        )
        .await
        .map_err(|_| ExecutionError::Timeout {
            after: self.agent_timeout,
        })?
        .map_err(|e| {
            warn!(task_id, agent = %profile.name, error = %e, "agent query failed");
            ExecutionError::Agent(e.to_string())
        })?;

        let executed_at = Utc::now()
            .with_timezone(&self.timezone)
            .format("%Y-%m-%d %H:%M:%S %Z")
            .to_string();
        let body_html = format_report_html(&ReportContent {
            task_name: &task.name,
            agent_name: &profile.name,
            prompt: &task.prompt,
            response: &response,
            executed_at: &executed_at,
        });
        let message = EmailMessage {
            to: task.recipients.clone(),
            subject: report_subject(&task.name, &executed_at),
            body_html,
        };

        self.mailer
            .send(&message)
            .await
            .map_err(|e| ExecutionError::Transport(e.to_string()))?;

        Ok(RunReport::new(format!(
            "report sent to {} recipient(s)",
            task.recipients.len()
        )))
    }
}
