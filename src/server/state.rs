//! Application state shared across all request handlers.

use std::sync::Arc;

use tracing::info;

use crate::auth::accounts::AccountService;
use crate::chat::core::config::AppConfig;
use crate::chat::core::errors::ChatResult;
use crate::chat::engine::core::{ChatBackends, ChatEngine};
use crate::chat::storage::database::Database;
use crate::chat::summarization::queue::{SummaryQueue, SummaryWorkers, summary_queue};
use crate::chat::summarization::summarizer::Summarizer;
use crate::llm::tts::TtsClient;

/// Shared application state.
pub struct AppState {
    /// Effective configuration.
    pub config: AppConfig,
    /// Database handle, used for health checks.
    pub db: Database,
    /// Chat orchestration.
    pub engine: ChatEngine,
    /// Accounts and sessions.
    pub accounts: AccountService,
    /// Speech synthesis.
    pub tts: TtsClient,
}

impl AppState {
    /// Open storage, build clients and the summary queue from `config`.
    ///
    /// The returned workers must be spawned by the caller.
    ///
    /// # Errors
    /// Returns an error if storage cannot be opened or a client cannot be built.
    pub async fn from_config(config: AppConfig) -> ChatResult<(Arc<Self>, SummaryWorkers)> {
        config.validate()?;
        let db = Database::open(&config.storage).await?;
        info!(path = %config.storage.sqlite_path.display(), "Database opened");

        let backends = ChatBackends::sqlite(&db, &config).await?;
        let summarizer = Arc::new(Summarizer::new(
            Arc::clone(&backends.completion),
            Arc::clone(&backends.turns),
            Arc::clone(&backends.conversations),
            &config.summary,
        ));
        let (queue, workers) = summary_queue(summarizer, &config.summary);

        let state = Self::from_parts(config, db, &backends, Some(queue))?;
        Ok((Arc::new(state), workers))
    }

    /// Assemble state from already-built backends.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid or the speech client
    /// cannot be built.
    pub fn from_parts(
        config: AppConfig,
        db: Database,
        backends: &ChatBackends,
        summaries: Option<SummaryQueue>,
    ) -> ChatResult<Self> {
        let engine = ChatEngine::new(&config, backends, summaries)?;
        let accounts = AccountService::new(
            Arc::clone(&backends.users),
            Arc::clone(&backends.sessions),
            Arc::clone(&backends.conversations),
        );
        let tts = TtsClient::new(&config.tts)?;

        Ok(Self {
            config,
            db,
            engine,
            accounts,
            tts,
        })
    }
}
