use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::cache::EntityCache;
use crate::error::{StoreError, StoreResult};
use crate::model::{Category, FileRecord};
use crate::remote::{self, CATEGORIES, DocId, FILES, RemoteStore};

/// Seeded into an empty remote collection on first run.
pub const DEFAULT_CATEGORIES: [&str; 8] = [
    "会場情報",
    "準備物",
    "タイムテーブル",
    "台本",
    "席次",
    "役員",
    "参加者",
    "配信文書",
];

pub const MAX_NAME_CHARS: usize = 50;

pub struct CategoryStore {
    store: Arc<dyn RemoteStore>,
    cache: EntityCache<Category>,
}

impl CategoryStore {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        let cache = EntityCache::new(Arc::clone(&store), CATEGORIES);
        Self { store, cache }
    }

    pub fn start(&mut self) -> StoreResult<()> {
        self.cache.start()
    }

    pub fn stop(&mut self) {
        self.cache.stop()
    }

    pub fn on_change(&self, listener: impl Fn(&[Category]) + Send + Sync + 'static) {
        self.cache.on_change(listener)
    }

    pub fn categories(&self) -> Vec<Category> {
        self.cache.snapshot()
    }

    pub fn find(&self, name: &str) -> Option<Category> {
        self.cache
            .snapshot()
            .into_iter()
            .find(|category| category.name == name)
    }

    /// Issues the create and returns immediately; the new category shows up
    /// only once the subscription pushes the next snapshot.
    #[instrument(skip(self))]
    pub fn add(&self, name: &str) -> StoreResult<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(StoreError::Validation(
                "category name must not be empty".to_string(),
            ));
        }
        if name.chars().count() > MAX_NAME_CHARS {
            return Err(StoreError::Validation(format!(
                "category name exceeds {MAX_NAME_CHARS} characters"
            )));
        }
        if self
            .cache
            .snapshot()
            .iter()
            .any(|category| category.name == name)
        {
            return Err(StoreError::Validation(format!(
                "category already exists: {name}"
            )));
        }

        let draft = Category {
            id: DocId::default(),
            name: name.to_string(),
        };
        self.store.create(CATEGORIES, remote::to_fields(&draft)?)?;
        Ok(())
    }

    /// Deletes the category, then every file record referencing it by name.
    /// The file set comes from a point query against the store, not the
    /// cache, since the category snapshot may already have moved on.
    ///
    /// This is a two-step, at-least-once cascade with no atomicity: an
    /// interruption after the category delete leaves orphaned file records
    /// behind until the next cleanup. Returns the number of files removed.
    #[instrument(skip(self), fields(id = %id))]
    pub fn delete(&self, id: &DocId, name: &str) -> StoreResult<usize> {
        self.store.delete(CATEGORIES, id)?;

        let file_docs = self.store.list(FILES)?;
        let mut removed = 0usize;
        for doc in &file_docs {
            let record: FileRecord = match remote::from_doc(doc) {
                Ok(record) => record,
                Err(err) => {
                    warn!(id = %doc.id, error = %err, "skipping undecodable file record in cascade");
                    continue;
                }
            };
            if record.category_name != name {
                continue;
            }
            match self.store.delete(FILES, &doc.id) {
                Ok(()) => removed += 1,
                Err(err) => {
                    // No rollback: whatever the completed sub-steps produced
                    // stands, and the failure is visible in the log.
                    warn!(id = %doc.id, error = %err, "cascade delete of file failed, continuing");
                }
            }
        }

        info!(category = name, files_removed = removed, "deleted category");
        Ok(removed)
    }

    /// Seeds the default category list when the remote collection is empty.
    /// Each name is an independent create call; an interruption mid-loop
    /// leaves a partial seed, which the next run completes no further (the
    /// collection is no longer empty).
    #[instrument(skip(self))]
    pub fn seed_defaults(&self) -> StoreResult<usize> {
        if !self.store.list(CATEGORIES)?.is_empty() {
            return Ok(0);
        }

        let mut seeded = 0usize;
        for name in DEFAULT_CATEGORIES {
            let draft = Category {
                id: DocId::default(),
                name: name.to_string(),
            };
            self.store.create(CATEGORIES, remote::to_fields(&draft)?)?;
            seeded += 1;
        }

        info!(seeded, "seeded default categories");
        Ok(seeded)
    }
}
