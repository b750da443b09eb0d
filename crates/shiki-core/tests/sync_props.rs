//! Properties of the cache/subscription layer against a store that defers
//! its notifications, the way a hosted backend does: mutations are
//! acknowledged first and the snapshot arrives later.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;
use shiki_core::cache::EntityCache;
use shiki_core::error::{StoreError, StoreResult};
use shiki_core::model::Category;
use shiki_core::remote::{
    CATEGORIES, Doc, DocId, Fields, Publisher, RemoteStore, SnapshotFn, Subscription,
};
use shiki_core::stores::CategoryStore;

/// In-memory store whose snapshots go out only on an explicit `emit`, so a
/// test can interleave mutations with notification delivery. Creates into
/// `categories` enforce name uniqueness, as the hosted store does.
#[derive(Default)]
struct DeferredStore {
    collections: Mutex<HashMap<String, Vec<Doc>>>,
    publisher: Publisher,
}

impl DeferredStore {
    fn emit(&self, collection: &str) {
        let snapshot = self
            .collections
            .lock()
            .expect("lock")
            .get(collection)
            .cloned()
            .unwrap_or_default();
        self.publisher.notify(collection, &snapshot);
    }

    fn emit_raw(&self, collection: &str, docs: &[Doc]) {
        self.publisher.notify(collection, docs);
    }
}

impl RemoteStore for DeferredStore {
    fn list(&self, collection: &str) -> StoreResult<Vec<Doc>> {
        Ok(self
            .collections
            .lock()
            .expect("lock")
            .get(collection)
            .cloned()
            .unwrap_or_default())
    }

    fn create(&self, collection: &str, fields: Fields) -> StoreResult<DocId> {
        let mut collections = self.collections.lock().expect("lock");
        let docs = collections.entry(collection.to_string()).or_default();

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

        let id = DocId::issue();
        docs.push(Doc {
            id: id.clone(),
            fields,
        });
        Ok(id)
    }

    fn update(&self, collection: &str, id: &DocId, fields: Fields) -> StoreResult<()> {
        let mut collections = self.collections.lock().expect("lock");
        let docs = collections.entry(collection.to_string()).or_default();
        let doc = docs
            .iter_mut()
            .find(|doc| doc.id == *id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        for (key, value) in fields {
            doc.fields.insert(key, value);
        }
        Ok(())
    }

    fn delete(&self, collection: &str, id: &DocId) -> StoreResult<()> {
        let mut collections = self.collections.lock().expect("lock");
        if let Some(docs) = collections.get_mut(collection) {
            docs.retain(|doc| doc.id != *id);
        }
        Ok(())
    }

    fn subscribe(&self, collection: &str, on_snapshot: SnapshotFn) -> StoreResult<Subscription> {
        Ok(self.publisher.attach(collection, on_snapshot))
    }
}

/// Store that refuses every call, the way a hosted backend behaves when the
/// connection cannot be established.
struct OfflineStore;

impl OfflineStore {
    fn refused() -> StoreError {
        StoreError::Remote("store unreachable".to_string())
    }
}

impl RemoteStore for OfflineStore {
    fn list(&self, _collection: &str) -> StoreResult<Vec<Doc>> {
        Err(Self::refused())
    }

    fn create(&self, _collection: &str, _fields: Fields) -> StoreResult<DocId> {
        Err(Self::refused())
    }

    fn update(&self, _collection: &str, _id: &DocId, _fields: Fields) -> StoreResult<()> {
        Err(Self::refused())
    }

    fn delete(&self, _collection: &str, _id: &DocId) -> StoreResult<()> {
        Err(Self::refused())
    }

    fn subscribe(&self, _collection: &str, _on_snapshot: SnapshotFn) -> StoreResult<Subscription> {
        Err(Self::refused())
    }
}

#[test]
fn double_add_before_the_snapshot_lands_settles_to_one_entry() {
    let store = Arc::new(DeferredStore::default());
    let mut categories = CategoryStore::new(Arc::clone(&store) as Arc<dyn RemoteStore>);
    categories.start().expect("start");

    // The first snapshot has not arrived, so client-side validation sees an
    // empty cache both times; the store's own uniqueness rule has to hold
    // the line.
    categories.add("役員").expect("first add");
    let err = categories.add("役員").expect_err("second add must be refused");
    assert!(matches!(err, StoreError::Remote(_)));

    store.emit(CATEGORIES);
    let settled = categories.categories();
    assert_eq!(settled.len(), 1);
    assert_eq!(settled[0].name, "役員");
}

#[test]
fn stopping_the_cache_silences_further_snapshots() {
    let store = Arc::new(DeferredStore::default());
    let mut cache: EntityCache<Category> =
        EntityCache::new(Arc::clone(&store) as Arc<dyn RemoteStore>, CATEGORIES);
    cache.start().expect("start");

    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);
    cache.on_change(move |_categories| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    store
        .create(CATEGORIES, doc_fields("参加者"))
        .expect("create");
    store.emit(CATEGORIES);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(cache.len(), 1);

    cache.stop();
    assert!(!cache.is_live());

    store
        .create(CATEGORIES, doc_fields("配信文書"))
        .expect("create");
    store.emit(CATEGORIES);
    assert_eq!(hits.load(Ordering::SeqCst), 1, "no callback after stop");

    // The torn-down cache keeps whatever it last saw; it is a disposable
    // projection, not an authority.
    assert_eq!(cache.len(), 1);
}

#[test]
fn refused_subscription_surfaces_once_and_leaves_the_cache_dead() {
    let store = Arc::new(OfflineStore);
    let mut cache: EntityCache<Category> = EntityCache::new(store, CATEGORIES);

    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);
    cache.on_change(move |_categories| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let err = cache.start().expect_err("subscribe must be refused");
    assert!(matches!(err, StoreError::Remote(_)));
    assert!(!cache.is_live());
    assert!(cache.is_empty());
    assert_eq!(hits.load(Ordering::SeqCst), 0, "no callback without a subscription");

    // The failure does not wedge the cache; a later start is a fresh attempt.
    let err = cache.start().expect_err("still unreachable");
    assert!(matches!(err, StoreError::Remote(_)));
    assert!(!cache.is_live());
}

#[test]
fn start_is_idempotent_and_restart_resumes_delivery() {
    let store = Arc::new(DeferredStore::default());
    let mut cache: EntityCache<Category> =
        EntityCache::new(Arc::clone(&store) as Arc<dyn RemoteStore>, CATEGORIES);

    cache.start().expect("start");
    cache.start().expect("second start is a no-op");

    store.create(CATEGORIES, doc_fields("席次")).expect("create");
    store.emit(CATEGORIES);
    assert_eq!(cache.len(), 1);

    cache.stop();
    cache.start().expect("restart");
    store.emit(CATEGORIES);
    assert_eq!(cache.len(), 1);
}

#[test]
fn an_undecodable_snapshot_keeps_the_last_good_one() {
    let store = Arc::new(DeferredStore::default());
    let mut cache: EntityCache<Category> =
        EntityCache::new(Arc::clone(&store) as Arc<dyn RemoteStore>, CATEGORIES);
    cache.start().expect("start");

    store.create(CATEGORIES, doc_fields("準備物")).expect("create");
    store.emit(CATEGORIES);
    assert_eq!(cache.len(), 1);

    // A document whose name is not a string cannot decode into a Category.
    let mut bad = Fields::new();
    bad.insert("name".to_string(), Value::from(42));
    store.emit_raw(
        CATEGORIES,
        &[Doc {
            id: DocId::from("bad"),
            fields: bad,
        }],
    );

    let snapshot = cache.snapshot();
    assert_eq!(snapshot.len(), 1, "stale-but-present beats empty");
    assert_eq!(snapshot[0].name, "準備物");
}

fn doc_fields(name: &str) -> Fields {
    let mut fields = Fields::new();
    fields.insert("name".to_string(), Value::String(name.to_string()));
    fields
}
