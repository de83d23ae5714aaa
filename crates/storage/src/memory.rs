// SPDX-License-Identifier: LGPL-2.1-or-later
// Copyright (C) 2025 Shahzad A. Bhatti <bhatti@plexobject.com>
//
// This file is part of TideMap.
//
// TideMap is free software: you can redistribute it and/or modify
// it under the terms of the GNU Lesser General Public License as published by
// the Free Software Foundation, either version 2.1 of the License, or
// (at your option) any later version.
//
// TideMap is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public License
// along with TideMap. If not, see <https://www.gnu.org/licenses/>.

//! In-memory typed storage.
//!
//! ## Purpose
//! Holds values directly in a `HashMap` behind a readers-writer lock, with no
//! serialization. This is the default engine behind `tidemap::Map::new`.
//!
//! ## Features
//! - Concurrent readers, exclusive writers
//! - `range` walks a snapshot, so visitors never run while the lock is held
//! - `next` removes an entry under a single write lock
//!
//! ## Limitations
//! - Not persistent (data lost on restart)
//! - Limited scalability (all data in RAM)

use crate::{Storage, StorageError, StorageResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::warn;

/// In-memory typed storage.
///
/// ## Example
/// ```rust
/// use tidemap_storage::{InMemoryStorage, Storage};
///
/// # async fn example() {
/// let storage = InMemoryStorage::new();
///
/// storage.store(1, "one".to_string()).await;
/// assert_eq!(storage.load(&1).await, Some("one".to_string()));
/// # }
/// ```
pub struct InMemoryStorage<K, V> {
    data: Arc<RwLock<HashMap<K, V>>>,
    closed: AtomicBool,
}

impl<K, V> InMemoryStorage<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Create a new, empty in-memory storage.
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Create a storage with room for `capacity` entries before reallocating.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Arc::new(RwLock::new(HashMap::with_capacity(capacity))),
            closed: AtomicBool::new(false),
        }
    }

    fn is_closed(&self, op: &str) -> bool {
        let closed = self.closed.load(Ordering::Acquire);
        if closed {
            warn!(op, "In-memory storage used after close");
        }
        closed
    }
}

impl<K, V> Default for InMemoryStorage<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<K, V> Storage<K, V> for InMemoryStorage<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    async fn load(&self, key: &K) -> Option<V> {
        if self.is_closed("load") {
            return None;
        }
        self.data.read().await.get(key).cloned()
    }

    async fn store(&self, key: K, value: V) {
        if self.is_closed("store") {
            return;
        }
        self.data.write().await.insert(key, value);
    }

    async fn store_if_absent(&self, key: K, value: V) -> bool {
        if self.is_closed("store_if_absent") {
            return false;
        }
        let mut data = self.data.write().await;
        if data.contains_key(&key) {
            return false;
        }
        data.insert(key, value);
        true
    }

    async fn delete(&self, keys: &[K]) {
        if self.is_closed("delete") {
            return;
        }
        let mut data = self.data.write().await;
        for key in keys {
            data.remove(key);
        }
    }

    async fn range(&self, visit: &mut (dyn FnMut(K, V) -> bool + Send)) {
        if self.is_closed("range") {
            return;
        }
        let snapshot: Vec<(K, V)> = {
            let data = self.data.read().await;
            data.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
        };
        for (key, value) in snapshot {
            if !visit(key, value) {
                break;
            }
        }
    }

    async fn next(&self) -> Option<(K, V)> {
        if self.is_closed("next") {
            return None;
        }
        let mut data = self.data.write().await;
        let key = data.keys().next().cloned()?;
        data.remove_entry(&key)
    }

    async fn keys(&self) -> Vec<K> {
        if self.is_closed("keys") {
            return Vec::new();
        }
        self.data.read().await.keys().cloned().collect()
    }

    async fn len(&self) -> usize {
        if self.closed.load(Ordering::Acquire) {
            return 0;
        }
        self.data.read().await.len()
    }

    async fn clear(&self) {
        self.data.write().await.clear();
    }

    async fn close(&self) -> StorageResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(StorageError::Closed);
        }
        self.data.write().await.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_store_load_delete() {
        let storage = InMemoryStorage::new();
        storage.store("a".to_string(), 1).await;
        storage.store("b".to_string(), 2).await;
        storage.store("a".to_string(), 3).await;

        assert_eq!(storage.load(&"a".to_string()).await, Some(3));
        assert_eq!(storage.len().await, 2);

        storage.delete(&["a".to_string(), "missing".to_string()]).await;
        assert_eq!(storage.load(&"a".to_string()).await, None);
        assert_eq!(storage.len().await, 1);
    }

    #[tokio::test]
    async fn test_next_drains_each_key_once() {
        let storage = InMemoryStorage::new();
        for i in 0..10 {
            storage.store(i, i * 10).await;
        }

        let mut drained = Vec::new();
        while let Some((k, v)) = storage.next().await {
            assert_eq!(v, k * 10);
            drained.push(k);
        }
        drained.sort();
        assert_eq!(drained, (0..10).collect::<Vec<_>>());
        assert!(storage.is_empty().await);
    }

    #[tokio::test]
    async fn test_next_returns_zero_key() {
        let storage = InMemoryStorage::new();
        storage.store(0, String::new()).await;
        assert_eq!(storage.next().await, Some((0, String::new())));
        assert_eq!(storage.next().await, None);
    }

    #[tokio::test]
    async fn test_range_early_stop() {
        let storage = InMemoryStorage::new();
        for i in 0..5 {
            storage.store(i, i).await;
        }
        let mut visited = 0;
        storage
            .range(&mut |_, _| {
                visited += 1;
                visited < 2
            })
            .await;
        assert_eq!(visited, 2);
    }

    #[tokio::test]
    async fn test_store_if_absent() {
        let storage = InMemoryStorage::new();
        assert!(storage.store_if_absent(1, "x").await);
        assert!(!storage.store_if_absent(1, "y").await);
        assert_eq!(storage.load(&1).await, Some("x"));
    }

    #[tokio::test]
    async fn test_close_twice_fails() {
        let storage: InMemoryStorage<u8, u8> = InMemoryStorage::new();
        storage.store(1, 1).await;
        assert!(storage.close().await.is_ok());
        assert!(matches!(storage.close().await, Err(StorageError::Closed)));
        assert_eq!(storage.load(&1).await, None);
        assert_eq!(storage.len().await, 0);
    }

    #[tokio::test]
    async fn test_concurrent_writers() {
        let storage = Arc::new(InMemoryStorage::new());
        let mut handles = Vec::new();
        for t in 0..8u32 {
            let storage = storage.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..100u32 {
                    storage.store(t * 1000 + i, i).await;
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(storage.len().await, 800);
    }
}
