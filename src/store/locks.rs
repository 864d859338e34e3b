//! Per-document mutual exclusion for version allocation.
//! Only serializes callers sharing one `DocumentStore`; other processes writing the same
//! table can still race on the next version number.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Default)]
pub struct NameLocks {
    inner: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl NameLocks {
    pub fn new() -> Self { Self::default() }

    /// Wait for exclusive access to `name`. The entry is dropped from the map once no one
    /// else holds or waits on it.
    pub async fn acquire(&self, name: &str) -> NameGuard<'_> {
        let lock = {
            let mut map = self.inner.lock();
            map.entry(name.to_string()).or_default().clone()
        };
        let guard = lock.lock_owned().await;
        NameGuard { locks: self, name: name.to_string(), guard: Some(guard) }
    }

    pub fn held(&self) -> usize { self.inner.lock().len() }
}

pub struct NameGuard<'a> {
    locks: &'a NameLocks,
    name: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for NameGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut map = self.locks.inner.lock();
        // One reference in the map and none elsewhere: nobody is waiting.
        if map.get(&self.name).map(|l| Arc::strong_count(l) == 1).unwrap_or(false) {
            map.remove(&self.name);
        }
    }
}
