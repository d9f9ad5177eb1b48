use std::sync::Arc;

use storage::repository::Storage;
use tracing::info;

use crate::Clock;
use crate::ai_service::AiService;
use crate::catalog_service::CatalogService;
use crate::config::Config;
use crate::error::AppServicesError;
use crate::progress_service::ProgressService;
use crate::set_service::SetService;
use crate::study::StudyService;

/// Assembles the app-facing services over one `Storage`.
#[derive(Clone)]
pub struct AppServices {
    storage: Storage,
    catalog: Arc<CatalogService>,
    sets: Arc<SetService>,
    progress: Arc<ProgressService>,
    study: Arc<StudyService>,
    ai: Arc<AiService>,
}

impl AppServices {
    /// Build services backed by `SQLite` storage at `config.database_url`.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization fails.
    pub async fn new_sqlite(config: &Config, clock: Clock) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(&config.database_url).await?;
        info!(db = %config.database_url, ai = config.ai.is_some(), "services ready");
        Ok(Self::from_storage(storage, config, clock))
    }

    /// Build services from environment configuration.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` for bad configuration or storage failures.
    pub async fn from_env(clock: Clock) -> Result<Self, AppServicesError> {
        let config = Config::from_env()?;
        Self::new_sqlite(&config, clock).await
    }

    #[must_use]
    pub fn from_storage(storage: Storage, config: &Config, clock: Clock) -> Self {
        let catalog = Arc::new(CatalogService::new(
            clock,
            Arc::clone(&storage.quotes),
            Arc::clone(&storage.themes),
            Arc::clone(&storage.cards),
        ));
        let sets = Arc::new(SetService::new(clock, Arc::clone(&storage.sets)));
        let progress = Arc::new(
            ProgressService::new(
                clock,
                Arc::clone(&storage.quotes),
                Arc::clone(&storage.cards),
                Arc::clone(&storage.progress),
            )
            .with_mastery(config.mastery),
        );
        let study = Arc::new(StudyService::new(
            clock,
            Arc::clone(&catalog),
            Arc::clone(&sets),
            Arc::clone(&progress),
        ));
        let ai = Arc::new(AiService::new(config.ai.clone()));

        Self {
            storage,
            catalog,
            sets,
            progress,
            study,
            ai,
        }
    }

    #[must_use]
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    #[must_use]
    pub fn catalog(&self) -> Arc<CatalogService> {
        Arc::clone(&self.catalog)
    }

    #[must_use]
    pub fn sets(&self) -> Arc<SetService> {
        Arc::clone(&self.sets)
    }

    #[must_use]
    pub fn progress(&self) -> Arc<ProgressService> {
        Arc::clone(&self.progress)
    }

    #[must_use]
    pub fn study(&self) -> Arc<StudyService> {
        Arc::clone(&self.study)
    }

    #[must_use]
    pub fn ai(&self) -> Arc<AiService> {
        Arc::clone(&self.ai)
    }
}
