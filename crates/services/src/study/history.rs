use hsc_core::model::Card;
use hsc_core::study::{HistoryAction, StudySession};
use tracing::warn;

/// Navigation history holding serialized session snapshots.
///
/// Mirrors a browser history: `push` adds an entry and drops anything
/// ahead of the current position, `replace` overwrites the current entry.
pub trait HistoryStore: Send {
    fn push(&mut self, entry: String);
    fn replace(&mut self, entry: String);
    /// Step back and return the entry now current, if there is one.
    fn back(&mut self) -> Option<String>;
    fn forward(&mut self) -> Option<String>;
    fn current(&self) -> Option<&str>;
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-process history for terminals and tests.
#[derive(Debug, Clone, Default)]
pub struct UndoStack {
    entries: Vec<String>,
    position: usize,
}

impl UndoStack {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn position(&self) -> usize {
        self.position
    }
}

impl HistoryStore for UndoStack {
    fn push(&mut self, entry: String) {
        if !self.entries.is_empty() {
            self.entries.truncate(self.position + 1);
        }
        self.entries.push(entry);
        self.position = self.entries.len() - 1;
    }

    fn replace(&mut self, entry: String) {
        match self.entries.get_mut(self.position) {
            Some(slot) => *slot = entry,
            None => self.push(entry),
        }
    }

    fn back(&mut self) -> Option<String> {
        if self.position == 0 {
            return None;
        }
        self.position -= 1;
        self.entries.get(self.position).cloned()
    }

    fn forward(&mut self) -> Option<String> {
        if self.position + 1 >= self.entries.len() {
            return None;
        }
        self.position += 1;
        self.entries.get(self.position).cloned()
    }

    fn current(&self) -> Option<&str> {
        self.entries.get(self.position).map(String::as_str)
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// What a back/forward step did to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Restore {
    /// The entry's snapshot is now the session.
    Snapshot,
    /// The entry was unreadable; a new session over the same cards started.
    Fresh,
    /// Nothing to restore, or a check is in flight.
    Unchanged,
}

/// A study session bound to its navigation history.
pub struct StudyNavigator<H = UndoStack> {
    session: StudySession,
    cards: Vec<Card>,
    history: H,
}

impl<H: HistoryStore> StudyNavigator<H> {
    /// Wrap a freshly started session and record it as the first entry.
    pub fn new(session: StudySession, history: H) -> Self {
        let cards = session.slots().iter().map(|slot| slot.card.clone()).collect();
        let mut navigator = Self {
            session,
            cards,
            history,
        };
        navigator.record(HistoryAction::Push);
        navigator
    }

    #[must_use]
    pub fn session(&self) -> &StudySession {
        &self.session
    }

    /// Mutable access for transitions; follow each with [`StudyNavigator::record`].
    pub fn session_mut(&mut self) -> &mut StudySession {
        &mut self.session
    }

    #[must_use]
    pub fn history(&self) -> &H {
        &self.history
    }

    /// Store the current session as the transition asked.
    pub fn record(&mut self, action: HistoryAction) {
        if action == HistoryAction::None {
            return;
        }
        let entry = match serde_json::to_string(&self.session) {
            Ok(entry) => entry,
            Err(err) => {
                warn!(error = %err, "session snapshot not recorded");
                return;
            }
        };
        match action {
            HistoryAction::Push => self.history.push(entry),
            HistoryAction::Replace => self.history.replace(entry),
            HistoryAction::None => {}
        }
    }

    pub fn back(&mut self, now: chrono::DateTime<chrono::Utc>) -> Restore {
        if self.session.is_check_in_flight() {
            return Restore::Unchanged;
        }
        match self.history.back() {
            Some(entry) => self.restore(&entry, now),
            None => Restore::Unchanged,
        }
    }

    pub fn forward(&mut self, now: chrono::DateTime<chrono::Utc>) -> Restore {
        if self.session.is_check_in_flight() {
            return Restore::Unchanged;
        }
        match self.history.forward() {
            Some(entry) => self.restore(&entry, now),
            None => Restore::Unchanged,
        }
    }

    fn restore(&mut self, entry: &str, now: chrono::DateTime<chrono::Utc>) -> Restore {
        let snapshot = serde_json::from_str::<StudySession>(entry)
            .ok()
            .and_then(|mut snapshot| snapshot.carry_answers(&self.session).then_some(snapshot));
        if let Some(snapshot) = snapshot {
            self.session = snapshot;
            return Restore::Snapshot;
        }

        warn!("history entry unreadable, starting a fresh session");
        match StudySession::start(self.cards.clone(), now) {
            Ok(fresh) => {
                self.session = fresh;
                self.record(HistoryAction::Push);
                Restore::Fresh
            }
            Err(_) => Restore::Unchanged,
        }
    }

    /// Hand back the session, dropping its history.
    #[must_use]
    pub fn into_session(self) -> StudySession {
        self.session
    }
}
