use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};

pub const CATEGORIES: &str = "categories";
pub const FILES: &str = "files";
pub const TASKS: &str = "tasks";
pub const EVENTS: &str = "events";

pub const COLLECTIONS: [&str; 4] = [CATEGORIES, FILES, TASKS, EVENTS];

/// Server-assigned document identifier. Empty on a draft that has not been
/// created yet; the store issues the real id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocId(String);

impl DocId {
    pub fn issue() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for DocId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

pub type Fields = serde_json::Map<String, Value>;

/// One document as the wire sees it: an id plus a flat key/value map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Doc {
    pub id: DocId,
    #[serde(flatten)]
    pub fields: Fields,
}

pub type SnapshotFn = Box<dyn Fn(&[Doc]) + Send + Sync>;

/// Document collection store: create, list, update, delete, and
/// subscribe-for-changes per named collection. Every notification carries the
/// complete current document set, never an incremental patch.
pub trait RemoteStore: Send + Sync {
    fn list(&self, collection: &str) -> StoreResult<Vec<Doc>>;

    fn create(&self, collection: &str, fields: Fields) -> StoreResult<DocId>;

    /// Merges `fields` into the document. Fails with `NotFound` if the id is
    /// absent.
    fn update(&self, collection: &str, id: &DocId, fields: Fields) -> StoreResult<()>;

    /// Deleting a missing id is not an error.
    fn delete(&self, collection: &str, id: &DocId) -> StoreResult<()>;

    fn subscribe(&self, collection: &str, on_snapshot: SnapshotFn) -> StoreResult<Subscription>;
}

/// Standing subscription handle. Dropping it unsubscribes, so a cache torn
/// down with its owning view cannot leak an open listener.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("live", &self.cancel.is_some())
            .finish()
    }
}

/// Fan-out registry used by store implementations: after every mutation the
/// store hands the full post-mutation document set to every subscriber of
/// that collection, in registration order.
#[derive(Default)]
pub struct Publisher {
    inner: Arc<Mutex<PublisherInner>>,
}

#[derive(Default)]
struct PublisherInner {
    next_token: u64,
    subscribers: HashMap<String, Vec<(u64, Arc<dyn Fn(&[Doc]) + Send + Sync>)>>,
}

impl Publisher {
    pub fn attach(&self, collection: &str, on_snapshot: SnapshotFn) -> Subscription {
        let token = {
            let mut inner = lock(&self.inner);
            let token = inner.next_token;
            inner.next_token += 1;
            inner
                .subscribers
                .entry(collection.to_string())
                .or_default()
                .push((token, Arc::from(on_snapshot)));
            token
        };
        debug!(collection, token, "attached subscriber");

        let registry = Arc::downgrade(&self.inner);
        let name = collection.to_string();
        Subscription::new(move || {
            if let Some(inner) = registry.upgrade() {
                let mut guard = lock(&inner);
                if let Some(subs) = guard.subscribers.get_mut(&name) {
                    subs.retain(|(tok, _)| *tok != token);
                }
                debug!(collection = %name, token, "detached subscriber");
            }
        })
    }

    /// Callbacks run outside the registry lock, so a callback may issue
    /// further store mutations without deadlocking the fan-out.
    pub fn notify(&self, collection: &str, snapshot: &[Doc]) {
        let callbacks: Vec<Arc<dyn Fn(&[Doc]) + Send + Sync>> = {
            let inner = lock(&self.inner);
            inner
                .subscribers
                .get(collection)
                .map(|subs| subs.iter().map(|(_, cb)| Arc::clone(cb)).collect())
                .unwrap_or_default()
        };

        trace!(collection, subscribers = callbacks.len(), docs = snapshot.len(), "fan-out");
        for callback in callbacks {
            callback(snapshot);
        }
    }

    pub fn subscriber_count(&self, collection: &str) -> usize {
        lock(&self.inner)
            .subscribers
            .get(collection)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

/// A poisoned lock still holds the last written snapshot, which is exactly
/// what the caches fall back to.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Serializes an entity into the flat field map sent to the store. The `id`
/// key is stripped: ids travel next to the fields, never inside them.
pub fn to_fields<T: Serialize>(entity: &T) -> StoreResult<Fields> {
    let value = serde_json::to_value(entity)
        .map_err(|err| StoreError::Remote(format!("failed to encode entity: {err}")))?;
    match value {
        Value::Object(mut map) => {
            map.remove("id");
            Ok(map)
        }
        other => Err(StoreError::Remote(format!(
            "entity must encode to an object, got {other}"
        ))),
    }
}

/// Rebuilds a typed entity from a document, injecting the document id.
pub fn from_doc<T: DeserializeOwned>(doc: &Doc) -> StoreResult<T> {
    let mut map = doc.fields.clone();
    map.insert("id".to_string(), Value::String(doc.id.to_string()));
    serde_json::from_value(Value::Object(map))
        .map_err(|err| StoreError::Remote(format!("failed to decode document {}: {err}", doc.id)))
}
