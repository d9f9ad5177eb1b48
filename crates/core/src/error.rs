use thiserror::Error;

use crate::analytics::AnalyticsError;
use crate::generator::GeneratorError;
use crate::model::{CardError, CardSetError, ProgressError, ThemeError};
use crate::scheduler::SchedulerError;
use crate::study::StudyError;

/// Any domain rule violation raised by this crate.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Card(#[from] CardError),
    #[error(transparent)]
    CardSet(#[from] CardSetError),
    #[error(transparent)]
    Theme(#[from] ThemeError),
    #[error(transparent)]
    Progress(#[from] ProgressError),
    #[error(transparent)]
    Generator(#[from] GeneratorError),
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
    #[error(transparent)]
    Analytics(#[from] AnalyticsError),
    #[error(transparent)]
    Study(#[from] StudyError),
}
