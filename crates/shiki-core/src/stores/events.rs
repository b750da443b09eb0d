use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use tracing::{instrument, warn};

use crate::cache::EntityCache;
use crate::datetime;
use crate::error::{StoreError, StoreResult};
use crate::model::{Event, Task, default_event_type};
use crate::remote::{self, DocId, EVENTS, RemoteStore};

/// User-supplied event fields before validation. `all_day` is derived, never
/// supplied: an event without a start time is all-day.
#[derive(Debug, Clone, Default)]
pub struct EventDraft {
    pub title: String,
    pub date: Option<NaiveDate>,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub location: String,
    pub event_type: Option<String>,
    pub description: String,
}

/// Explicit edit-session state machine. An update is legal only inside an
/// open session; `Submitting` marks the remote call in flight and falls back
/// to `Editing` on failure so the caller can retry or cancel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditSession {
    Idle,
    Editing(DocId),
    Submitting(DocId),
}

pub struct EventStore {
    store: Arc<dyn RemoteStore>,
    cache: EntityCache<Event>,
    session: EditSession,
}

impl EventStore {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        let cache = EntityCache::new(Arc::clone(&store), EVENTS);
        Self {
            store,
            cache,
            session: EditSession::Idle,
        }
    }

    pub fn start(&mut self) -> StoreResult<()> {
        self.cache.start()
    }

    pub fn stop(&mut self) {
        self.cache.stop()
    }

    pub fn on_change(&self, listener: impl Fn(&[Event]) + Send + Sync + 'static) {
        self.cache.on_change(listener)
    }

    pub fn events(&self) -> Vec<Event> {
        self.cache.snapshot()
    }

    pub fn session(&self) -> &EditSession {
        &self.session
    }

    #[instrument(skip(self, draft), fields(title = %draft.title))]
    pub fn add(&self, draft: &EventDraft) -> StoreResult<()> {
        let event = validate(draft)?;
        self.store.create(EVENTS, remote::to_fields(&event)?)?;
        Ok(())
    }

    /// Idle → Editing. The id must still be in the snapshot; a stale id is
    /// the usual benign race.
    #[instrument(skip(self), fields(id = %id))]
    pub fn begin_edit(&mut self, id: &DocId) -> StoreResult<()> {
        match &self.session {
            EditSession::Idle => {}
            other => {
                return Err(StoreError::State(format!(
                    "cannot begin edit, session is {other:?}"
                )));
            }
        }
        if !self.cache.snapshot().iter().any(|event| event.id == *id) {
            warn!(id = %id, "event vanished before edit could begin");
            return Err(StoreError::NotFound(id.clone()));
        }
        self.session = EditSession::Editing(id.clone());
        Ok(())
    }

    /// Editing(id) → Submitting(id) → Idle on success, back to Editing(id)
    /// on remote failure. Illegal without an open session.
    #[instrument(skip(self, draft))]
    pub fn update(&mut self, draft: &EventDraft) -> StoreResult<()> {
        let id = match &self.session {
            EditSession::Editing(id) => id.clone(),
            other => {
                return Err(StoreError::State(format!(
                    "no edit session open, session is {other:?}"
                )));
            }
        };

        let event = validate(draft)?;
        self.session = EditSession::Submitting(id.clone());
        match self.store.update(EVENTS, &id, remote::to_fields(&event)?) {
            Ok(()) => {
                self.session = EditSession::Idle;
                Ok(())
            }
            Err(err) => {
                self.session = EditSession::Editing(id);
                Err(err)
            }
        }
    }

    /// Any open session → Idle.
    pub fn cancel_edit(&mut self) {
        self.session = EditSession::Idle;
    }

    #[instrument(skip(self), fields(id = %id))]
    pub fn delete(&self, id: &DocId) -> StoreResult<()> {
        self.store.delete(EVENTS, id)
    }
}

fn validate(draft: &EventDraft) -> StoreResult<Event> {
    let title = draft.title.trim();
    if title.is_empty() {
        return Err(StoreError::Validation(
            "event title must not be empty".to_string(),
        ));
    }
    let date = draft
        .date
        .ok_or_else(|| StoreError::Validation("event date must be set".to_string()))?;

    let (start, end, all_day) = datetime::combine(date, draft.start_time, draft.end_time);
    Ok(Event {
        id: DocId::default(),
        title: title.to_string(),
        start,
        end,
        all_day,
        location: draft.location.trim().to_string(),
        event_type: draft
            .event_type
            .clone()
            .unwrap_or_else(default_event_type),
        description: draft.description.trim().to_string(),
    })
}

/// One row of the merged calendar: either a stored event or the read-only
/// projection of a task deadline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarEntry {
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
    pub all_day: bool,
    pub color: Option<&'static str>,
    pub kind: EntryKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Scheduled,
    TaskDeadline,
}

/// Union of stored events and every task carrying a deadline, the latter as
/// all-day markers colored by priority. View-only; nothing here is ever
/// written back.
pub fn calendar_entries(events: &[Event], tasks: &[Task]) -> Vec<CalendarEntry> {
    let mut entries: Vec<CalendarEntry> = events
        .iter()
        .map(|event| CalendarEntry {
            title: event.title.clone(),
            start: event.start,
            end: event.end,
            all_day: event.all_day,
            color: None,
            kind: EntryKind::Scheduled,
        })
        .collect();

    entries.extend(tasks.iter().filter_map(|task| {
        let date = task.date?;
        Some(CalendarEntry {
            title: task.text.clone(),
            start: datetime::day_start(date),
            end: None,
            all_day: true,
            color: Some(task.priority.calendar_color()),
            kind: EntryKind::TaskDeadline,
        })
    }));

    entries.sort_by_key(|entry| entry.start);
    entries
}
