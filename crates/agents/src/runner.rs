//! The agent-query seam and its retry wrapper.

use std::time::Duration;

use {async_trait::async_trait, thiserror::Error, tracing::warn};

use crate::profile::AgentProfile;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("provider overloaded: {0}")]
    Overloaded(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("provider error HTTP {status}: {body}")]
    Provider { status: u16, body: String },

    #[error("provider returned no text")]
    EmptyResponse,

    #[error("no API key configured for the LLM provider")]
    MissingApiKey,

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

impl AgentError {
    /// Transient provider pressure worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Overloaded(_) | Self::RateLimited(_))
    }
}

/// Answers one prompt as the given agent.
#[async_trait]
pub trait AgentRunner: Send + Sync {
    async fn ask(&self, profile: &AgentProfile, prompt: &str) -> Result<String, AgentError>;
}

/// Capped exponential backoff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Delay after the `attempt`-th failure (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.initial_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }
}

/// Retries overload and rate-limit errors from the inner runner.
pub struct RetryingRunner<R> {
    inner: R,
    policy: RetryPolicy,
}

impl<R> RetryingRunner<R> {
    pub fn new(inner: R, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }
}

#[async_trait]
impl<R: AgentRunner> AgentRunner for RetryingRunner<R> {
    async fn ask(&self, profile: &AgentProfile, prompt: &str) -> Result<String, AgentError> {
        let mut attempt = 1;
        loop {
            match self.inner.ask(profile, prompt).await {
                Err(e) if e.is_retryable() && attempt < self.policy.max_attempts => {
                    let delay = self.policy.delay_for(attempt);
                    warn!(
                        agent = %profile.name,
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "provider busy, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                },
                other => return other,
            }
        }
    }
}
