use std::cmp::Ordering;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde_json::Value;
use tracing::{instrument, warn};

use crate::cache::EntityCache;
use crate::error::{StoreError, StoreResult};
use crate::model::{Priority, Task};
use crate::remote::{self, DocId, Fields, RemoteStore, TASKS};

pub struct TaskStore {
    store: Arc<dyn RemoteStore>,
    cache: EntityCache<Task>,
}

impl TaskStore {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        let cache = EntityCache::new(Arc::clone(&store), TASKS);
        Self { store, cache }
    }

    pub fn start(&mut self) -> StoreResult<()> {
        self.cache.start()
    }

    pub fn stop(&mut self) {
        self.cache.stop()
    }

    pub fn on_change(&self, listener: impl Fn(&[Task]) + Send + Sync + 'static) {
        self.cache.on_change(listener)
    }

    pub fn tasks(&self) -> Vec<Task> {
        self.cache.snapshot()
    }

    #[instrument(skip(self))]
    pub fn add(
        &self,
        text: &str,
        date: Option<NaiveDate>,
        priority: Priority,
        category: &str,
    ) -> StoreResult<()> {
        let text = text.trim();
        if text.is_empty() {
            return Err(StoreError::Validation(
                "task text must not be empty".to_string(),
            ));
        }

        let task = Task::new(
            text.to_string(),
            date,
            priority,
            category.to_string(),
            Utc::now(),
        );
        self.store.create(TASKS, remote::to_fields(&task)?)?;
        Ok(())
    }

    /// Flips `completed` and refreshes `lastUpdated` through a partial
    /// update. An id missing from the snapshot is a benign race against a
    /// concurrent delete: logged, surfaced as `NotFound`, safe to skip.
    #[instrument(skip(self), fields(id = %id))]
    pub fn toggle_completion(&self, id: &DocId) -> StoreResult<()> {
        let Some(task) = self
            .cache
            .snapshot()
            .into_iter()
            .find(|task| task.id == *id)
        else {
            warn!(id = %id, "task vanished from snapshot before toggle, skipping");
            return Err(StoreError::NotFound(id.clone()));
        };

        let mut fields = Fields::new();
        fields.insert("completed".to_string(), Value::Bool(!task.completed));
        fields.insert(
            "lastUpdated".to_string(),
            serde_json::to_value(Utc::now())
                .map_err(|err| StoreError::Remote(format!("failed to encode timestamp: {err}")))?,
        );
        self.store.update(TASKS, id, fields)
    }

    #[instrument(skip(self), fields(id = %id))]
    pub fn delete(&self, id: &DocId) -> StoreResult<()> {
        self.store.delete(TASKS, id)
    }

    /// Filtered and sorted view of the current snapshot.
    pub fn view(&self, priority: Option<Priority>, category: Option<&str>) -> Vec<Task> {
        let mut tasks = filter(&self.cache.snapshot(), priority, category);
        sort(&mut tasks);
        tasks
    }
}

/// `None` on either dimension matches everything; otherwise exact match,
/// both dimensions must hold.
pub fn filter(tasks: &[Task], priority: Option<Priority>, category: Option<&str>) -> Vec<Task> {
    tasks
        .iter()
        .filter(|task| priority.is_none_or(|wanted| task.priority == wanted))
        .filter(|task| category.is_none_or(|wanted| task.category == wanted))
        .cloned()
        .collect()
}

/// Total order: incomplete before completed; among incomplete, dated tasks
/// chronologically ascending before undated ones; remaining ties by priority
/// rank high < medium < low.
pub fn sort(tasks: &mut [Task]) {
    tasks.sort_by(|a, b| {
        a.completed
            .cmp(&b.completed)
            .then_with(|| compare_dates(a.date, b.date))
            .then_with(|| a.priority.rank().cmp(&b.priority.rank()))
    });
}

fn compare_dates(a: Option<NaiveDate>, b: Option<NaiveDate>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
