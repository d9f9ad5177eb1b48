//! Shared error types for the services crate.

use thiserror::Error;

use hsc_core::generator::GeneratorError;
use hsc_core::model::{CardError, CardId, CardSetError, CardSetId, QuoteId};
use hsc_core::analytics::AnalyticsError;
use hsc_core::scheduler::SchedulerError;
use hsc_core::study::StudyError;
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

use crate::config::ConfigError;

/// Coarse classification shared by every service error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input or an illegal transition; nothing was written.
    Validation,
    NotFound,
    Conflict,
    /// The store or the AI collaborator could not be reached.
    Dependency,
}

fn storage_kind(err: &StorageError) -> ErrorKind {
    match err {
        StorageError::NotFound => ErrorKind::NotFound,
        StorageError::Conflict => ErrorKind::Conflict,
        _ => ErrorKind::Dependency,
    }
}

fn generator_kind(err: &GeneratorError) -> ErrorKind {
    match err {
        GeneratorError::ZeroBlanks | GeneratorError::Card(_) => ErrorKind::Validation,
        _ => ErrorKind::Conflict,
    }
}

/// Errors emitted by `CatalogService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CatalogError {
    #[error("no cards selected")]
    EmptySelection,
    #[error("cannot generate a card for quote {quote_id}: {source}")]
    Generation {
        quote_id: QuoteId,
        #[source]
        source: GeneratorError,
    },
    #[error("cannot regenerate card {card_id}: {source}")]
    Regeneration {
        card_id: CardId,
        #[source]
        source: GeneratorError,
    },
    #[error(transparent)]
    Card(#[from] CardError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl CatalogError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            CatalogError::EmptySelection | CatalogError::Card(_) => ErrorKind::Validation,
            CatalogError::Generation { source, .. } | CatalogError::Regeneration { source, .. } => {
                generator_kind(source)
            }
            CatalogError::Storage(err) => storage_kind(err),
        }
    }
}

/// Errors emitted by `SetService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SetServiceError {
    #[error("set {set_id} belongs to another user")]
    NotOwner { set_id: CardSetId },
    #[error(transparent)]
    Set(#[from] CardSetError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl SetServiceError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            SetServiceError::NotOwner { .. } | SetServiceError::Set(_) => ErrorKind::Validation,
            SetServiceError::Storage(err) => storage_kind(err),
        }
    }
}

/// Errors emitted by `ProgressService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProgressServiceError {
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
    #[error(transparent)]
    Analytics(#[from] AnalyticsError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ProgressServiceError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProgressServiceError::Scheduler(SchedulerError::LedgerMismatch) => ErrorKind::Conflict,
            ProgressServiceError::Scheduler(_) | ProgressServiceError::Analytics(_) => {
                ErrorKind::Validation
            }
            ProgressServiceError::Storage(err) => storage_kind(err),
        }
    }
}

/// Errors emitted by `StudyService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StudyServiceError {
    #[error(transparent)]
    Study(#[from] StudyError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Progress(#[from] ProgressServiceError),
    #[error(transparent)]
    Set(#[from] SetServiceError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl StudyServiceError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            StudyServiceError::Study(_) => ErrorKind::Validation,
            StudyServiceError::Catalog(err) => err.kind(),
            StudyServiceError::Progress(err) => err.kind(),
            StudyServiceError::Set(err) => err.kind(),
            StudyServiceError::Storage(err) => storage_kind(err),
        }
    }
}

/// Errors emitted by the AI collaborator client.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AiError {
    #[error("AI collaborator is not configured")]
    Disabled,
    #[error("AI collaborator returned an empty response")]
    EmptyResponse,
    #[error("AI collaborator returned unusable output: {0}")]
    Malformed(String),
    #[error("AI request failed with status {0}")]
    HttpStatus(reqwest::StatusCode),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

impl AiError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Dependency
    }
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
}

impl AppServicesError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppServicesError::Config(_) => ErrorKind::Validation,
            AppServicesError::Sqlite(_) => ErrorKind::Dependency,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_failures_map_to_kinds() {
        assert_eq!(
            CatalogError::Storage(StorageError::NotFound).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            SetServiceError::Storage(StorageError::Connection("down".into())).kind(),
            ErrorKind::Dependency
        );
        assert_eq!(CatalogError::EmptySelection.kind(), ErrorKind::Validation);
    }

    #[test]
    fn generation_shortfall_is_a_conflict() {
        let err = CatalogError::Generation {
            quote_id: QuoteId::new(1),
            source: GeneratorError::NotEnoughEligibleWords {
                requested: 3,
                available: 1,
            },
        };
        assert_eq!(err.kind(), ErrorKind::Conflict);
        let nested = StudyServiceError::Progress(ProgressServiceError::Scheduler(
            SchedulerError::LedgerMismatch,
        ));
        assert_eq!(nested.kind(), ErrorKind::Conflict);
    }
}
