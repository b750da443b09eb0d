use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::StoreResult;
use crate::remote::{self, Doc, RemoteStore, Subscription, lock};

type ChangeFn<T> = Box<dyn Fn(&[T]) + Send + Sync>;

/// In-memory mirror of one remote collection, kept live by a standing
/// subscription. Each notification wholesale-replaces the snapshot; the
/// cache is never patched field-by-field and never authoritative; it must
/// tolerate being discarded and rebuilt from the next push.
pub struct EntityCache<T> {
    collection: &'static str,
    store: Arc<dyn RemoteStore>,
    snapshot: Arc<Mutex<Vec<T>>>,
    listeners: Arc<Mutex<Vec<ChangeFn<T>>>>,
    subscription: Option<Subscription>,
}

impl<T> EntityCache<T>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
{
    pub fn new(store: Arc<dyn RemoteStore>, collection: &'static str) -> Self {
        Self {
            collection,
            store,
            snapshot: Arc::new(Mutex::new(Vec::new())),
            listeners: Arc::new(Mutex::new(Vec::new())),
            subscription: None,
        }
    }

    /// Opens the subscription. A failure here surfaces once to the caller;
    /// once the subscription is live, bad notifications are logged and the
    /// last good snapshot stands.
    pub fn start(&mut self) -> StoreResult<()> {
        if self.subscription.is_some() {
            return Ok(());
        }

        let collection = self.collection;
        let snapshot = Arc::clone(&self.snapshot);
        let listeners = Arc::clone(&self.listeners);

        let subscription = self.store.subscribe(
            collection,
            Box::new(move |docs: &[Doc]| {
                let mut decoded = Vec::with_capacity(docs.len());
                for doc in docs {
                    match remote::from_doc::<T>(doc) {
                        Ok(entity) => decoded.push(entity),
                        Err(err) => {
                            // Stale-but-present beats empty: a snapshot that
                            // fails to decode is dropped whole.
                            warn!(
                                collection,
                                id = %doc.id,
                                error = %err,
                                "undecodable notification, keeping previous snapshot"
                            );
                            return;
                        }
                    }
                }

                *lock(&snapshot) = decoded;
                let current = lock(&snapshot).clone();
                for listener in lock(&listeners).iter() {
                    listener(&current);
                }
            }),
        )?;

        debug!(collection, "cache subscription opened");
        self.subscription = Some(subscription);
        Ok(())
    }

    /// Releases the subscription. No change callback fires afterwards, even
    /// if the store emits another snapshot.
    pub fn stop(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            debug!(collection = self.collection, "cache subscription released");
            subscription.cancel();
        }
    }

    pub fn is_live(&self) -> bool {
        self.subscription.is_some()
    }

    /// Registers a callback invoked synchronously after each snapshot
    /// replace, on the single logical thread that delivered the
    /// notification. Callbacks must not register further listeners on the
    /// same cache.
    pub fn on_change(&self, listener: impl Fn(&[T]) + Send + Sync + 'static) {
        lock(&self.listeners).push(Box::new(listener));
    }

    pub fn snapshot(&self) -> Vec<T> {
        lock(&self.snapshot).clone()
    }

    pub fn len(&self) -> usize {
        lock(&self.snapshot).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.snapshot).is_empty()
    }
}
