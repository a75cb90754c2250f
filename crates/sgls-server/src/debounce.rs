use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use rustc_hash::FxHashMap;
use tokio::sync::Mutex;

/// Per-key quiet period. Every call to [`settle`](Self::settle) bumps the
/// key's generation; only the call that is still the newest once its delay
/// has passed gets `true`, so a burst of edits runs the work once.
#[derive(Debug)]
pub struct Debouncer<K> {
    generations: Arc<Mutex<FxHashMap<K, u64>>>,
}

impl<K> Clone for Debouncer<K> {
    fn clone(&self) -> Self {
        Self {
            generations: Arc::clone(&self.generations),
        }
    }
}

impl<K> Default for Debouncer<K> {
    fn default() -> Self {
        Self {
            generations: Arc::default(),
        }
    }
}

impl<K> Debouncer<K>
where
    K: Eq + Hash + Clone,
{
    pub async fn settle(&self, key: K, delay: Duration) -> bool {
        let generation = {
            let mut generations = self.generations.lock().await;
            let entry = generations.entry(key.clone()).or_insert(0);
            *entry += 1;
            *entry
        };

        tokio::time::sleep(delay).await;

        self.generations.lock().await.get(&key) == Some(&generation)
    }

    /// Drop the key; pending calls for it resolve to `false`.
    pub async fn forget(&self, key: &K) {
        self.generations.lock().await.remove(key);
    }
}
