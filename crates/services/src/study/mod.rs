mod history;
mod service;

pub use history::{HistoryStore, Restore, StudyNavigator, UndoStack};
pub use service::{CheckOutcome, StudyService};
