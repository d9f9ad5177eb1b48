#![forbid(unsafe_code)]

pub mod ai_service;
pub mod app_services;
pub mod catalog_service;
pub mod config;
pub mod error;
pub mod progress_service;
mod retry;
pub mod set_service;
pub mod study;

pub use hsc_core::Clock;

pub use ai_service::{AiConfig, AiService, FeedbackReport, TextGenerator};
pub use app_services::AppServices;
pub use catalog_service::{BookGeneration, CatalogService, GenerationFailure};
pub use config::{Config, ConfigError};
pub use error::{
    AiError, AppServicesError, CatalogError, ErrorKind, ProgressServiceError, SetServiceError,
    StudyServiceError,
};
pub use progress_service::ProgressService;
pub use set_service::SetService;
pub use study::{CheckOutcome, HistoryStore, Restore, StudyNavigator, StudyService, UndoStack};
