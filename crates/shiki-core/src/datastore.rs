use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde_json::Value;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::error::{StoreError, StoreResult};
use crate::remote::{
    CATEGORIES, COLLECTIONS, Doc, DocId, Fields, Publisher, RemoteStore, SnapshotFn, Subscription,
    lock,
};

/// File-backed document store: one JSONL file per collection under the data
/// directory, replaced atomically on every mutation. After each mutation the
/// full post-mutation document set fans out to every subscriber of that
/// collection.
pub struct JsonStore {
    pub data_dir: PathBuf,
    io_lock: Mutex<()>,
    publisher: Publisher,
}

impl JsonStore {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> StoreResult<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .map_err(|err| StoreError::Remote(format!("failed to create {}: {err}", data_dir.display())))?;

        for collection in COLLECTIONS {
            let path = collection_path(&data_dir, collection);
            if !path.exists() {
                fs::write(&path, "").map_err(|err| {
                    StoreError::Remote(format!("failed to create {}: {err}", path.display()))
                })?;
            }
        }

        info!(data_dir = %data_dir.display(), "opened datastore");

        Ok(Self {
            data_dir,
            io_lock: Mutex::new(()),
            publisher: Publisher::default(),
        })
    }

    fn load(&self, collection: &str) -> StoreResult<Vec<Doc>> {
        load_jsonl(&collection_path(&self.data_dir, collection))
    }

    fn persist(&self, collection: &str, docs: &[Doc]) -> StoreResult<()> {
        save_jsonl_atomic(&collection_path(&self.data_dir, collection), docs)
    }
}

impl RemoteStore for JsonStore {
    #[tracing::instrument(skip(self))]
    fn list(&self, collection: &str) -> StoreResult<Vec<Doc>> {
        let _guard = lock(&self.io_lock);
        self.load(collection)
    }

    #[tracing::instrument(skip(self, fields))]
    fn create(&self, collection: &str, fields: Fields) -> StoreResult<DocId> {
        let id = DocId::issue();
        let docs = {
            let _guard = lock(&self.io_lock);
            let mut docs = self.load(collection)?;

            // Category names are a business rule the hosted store enforces;
            // the bundled store enforces it too so a client racing its own
            // snapshot cannot create a duplicate.
            if collection == CATEGORIES {
                let name = fields.get("name").and_then(Value::as_str);
                if let Some(name) = name
                    && docs
                        .iter()
                        .any(|doc| doc.fields.get("name").and_then(Value::as_str) == Some(name))
                {
                    return Err(StoreError::Remote(format!(
                        "category name already exists: {name}"
                    )));
                }
            }

            docs.push(Doc {
                id: id.clone(),
                fields,
            });
            self.persist(collection, &docs)?;
            docs
        };

        debug!(collection, id = %id, "created document");
        self.publisher.notify(collection, &docs);
        Ok(id)
    }

    #[tracing::instrument(skip(self, fields), fields(id = %id))]
    fn update(&self, collection: &str, id: &DocId, fields: Fields) -> StoreResult<()> {
        let docs = {
            let _guard = lock(&self.io_lock);
            let mut docs = self.load(collection)?;
            let doc = docs
                .iter_mut()
                .find(|doc| doc.id == *id)
                .ok_or_else(|| StoreError::NotFound(id.clone()))?;
            for (key, value) in fields {
                doc.fields.insert(key, value);
            }
            self.persist(collection, &docs)?;
            docs
        };

        debug!(collection, id = %id, "updated document");
        self.publisher.notify(collection, &docs);
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(id = %id))]
    fn delete(&self, collection: &str, id: &DocId) -> StoreResult<()> {
        let docs = {
            let _guard = lock(&self.io_lock);
            let mut docs = self.load(collection)?;
            let before = docs.len();
            docs.retain(|doc| doc.id != *id);
            if docs.len() == before {
                // Idempotent-tolerant: a concurrent session may have deleted
                // it first.
                debug!(collection, id = %id, "delete of missing id, nothing to do");
                return Ok(());
            }
            self.persist(collection, &docs)?;
            docs
        };

        debug!(collection, id = %id, "deleted document");
        self.publisher.notify(collection, &docs);
        Ok(())
    }

    #[tracing::instrument(skip(self, on_snapshot))]
    fn subscribe(&self, collection: &str, on_snapshot: SnapshotFn) -> StoreResult<Subscription> {
        // Prime the subscriber with the current state before attaching, the
        // way a hosted store delivers an initial snapshot.
        let docs = {
            let _guard = lock(&self.io_lock);
            self.load(collection)?
        };
        on_snapshot(&docs);
        Ok(self.publisher.attach(collection, on_snapshot))
    }
}

fn collection_path(data_dir: &Path, collection: &str) -> PathBuf {
    data_dir.join(format!("{collection}.data"))
}

fn load_jsonl(path: &Path) -> StoreResult<Vec<Doc>> {
    debug!(file = %path.display(), "loading jsonl");
    let file = fs::File::open(path)
        .map_err(|err| StoreError::Remote(format!("failed to open {}: {err}", path.display())))?;
    let reader = BufReader::new(file);

    let mut out = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line
            .map_err(|err| StoreError::Remote(format!("failed to read {}: {err}", path.display())))?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let doc: Doc = serde_json::from_str(trimmed).map_err(|err| {
            StoreError::Remote(format!(
                "failed parsing {} line {}: {err}",
                path.display(),
                idx + 1
            ))
        })?;
        out.push(doc);
    }

    debug!(count = out.len(), "loaded documents from jsonl");
    Ok(out)
}

fn save_jsonl_atomic(path: &Path, docs: &[Doc]) -> StoreResult<()> {
    debug!(file = %path.display(), count = docs.len(), "saving jsonl atomically");

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)
        .map_err(|err| StoreError::Remote(format!("failed to create temp file: {err}")))?;
    for doc in docs {
        let serialized = serde_json::to_string(doc)
            .map_err(|err| StoreError::Remote(format!("failed to encode document: {err}")))?;
        writeln!(temp, "{serialized}")
            .map_err(|err| StoreError::Remote(format!("failed to write temp file: {err}")))?;
    }
    temp.flush()
        .map_err(|err| StoreError::Remote(format!("failed to flush temp file: {err}")))?;

    temp.persist(path)
        .map_err(|err| StoreError::Remote(format!("failed to persist {}: {err}", path.display())))?;

    Ok(())
}
