use std::sync::Arc;

use agentdesk_cron::Scheduler;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub scheduler: Arc<Scheduler>,
}

impl AppState {
    pub fn new(scheduler: Arc<Scheduler>) -> Self {
        Self { scheduler }
    }
}
