//! Agent profiles and the LLM runners that answer scheduled prompts.

pub mod profile;
pub mod providers;
pub mod runner;

use std::sync::Arc;

use agentdesk_config::LlmConfig;

pub use {
    profile::{AgentDirectory, AgentProfile},
    providers::AnthropicRunner,
    runner::{AgentError, AgentRunner, RetryPolicy, RetryingRunner},
};

/// The configured provider wrapped in overload retries.
pub fn runner_from_config(cfg: &LlmConfig) -> Result<Arc<dyn AgentRunner>, AgentError> {
    let policy = RetryPolicy {
        max_attempts: u32::from(cfg.max_retries.max(1)),
        ..RetryPolicy::default()
    };
    let runner = AnthropicRunner::from_config(cfg)?;
    Ok(Arc::new(RetryingRunner::new(runner, policy)))
}
