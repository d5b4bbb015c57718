/// Per-key in-flight de-duplication: concurrent callers for the same key
/// await one shared computation instead of starting their own.

use std::future::Future;
use std::hash::Hash;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::future::{BoxFuture, FutureExt, Shared};

pub struct SingleFlight<K, V>
where
    V: Clone,
{
    inflight: DashMap<K, Shared<BoxFuture<'static, V>>>,
}

impl<K, V> SingleFlight<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            inflight: DashMap::new(),
        }
    }

    pub async fn run<F, Fut>(&self, key: K, make: F) -> V
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V> + Send + 'static,
    {
        let shared = match self.inflight.entry(key.clone()) {
            Entry::Occupied(existing) => existing.get().clone(),
            Entry::Vacant(slot) => {
                let shared = make().boxed().shared();
                slot.insert(shared.clone());
                shared
            }
        };

        let output = shared.clone().await;
        self.inflight
            .remove_if(&key, |_, current| current.ptr_eq(&shared));
        output
    }

    pub fn in_flight(&self) -> usize {
        self.inflight.len()
    }
}

impl<K, V> Default for SingleFlight<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
