use {
    agentdesk_config::AgentdeskConfig, agentdesk_cron::store_sqlite::SqliteTaskStore,
    clap::Subcommand,
};

#[derive(Subcommand)]
pub enum DbAction {
    /// Run all pending database migrations.
    Migrate,
}

pub async fn handle_db(action: DbAction, config: &AgentdeskConfig) -> anyhow::Result<()> {
    match action {
        DbAction::Migrate => {
            // Opening the store applies pending migrations.
            SqliteTaskStore::new(&config.database.url).await?;
            println!("Migrations applied to {}", config.database.url);
            Ok(())
        },
    }
}
