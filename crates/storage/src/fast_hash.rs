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

//! Fast in-memory byte storage.
//!
//! ## Purpose
//! A byte engine built on `FxHashMap`, pre-sized for large working sets.
//! Values are opaque bytes, so this engine is normally used through the
//! [`crate::EnvelopeAdapter`] via [`crate::ByteStorageExt::typed`].
//!
//! ## Limitations
//! - Not persistent (data lost on restart)
//! - Every value goes through envelope encoding

use crate::{Storage, StorageError, StorageResult};
use async_trait::async_trait;
use rustc_hash::FxHashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use tracing::warn;

/// Default number of entries the table is sized for.
pub const DEFAULT_CAPACITY: usize = 10_000;

/// Options for [`FastHashStorage`].
#[derive(Debug, Clone)]
pub struct FastHashOptions {
    /// Initial capacity hint
    pub capacity: usize,
}

impl Default for FastHashOptions {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
        }
    }
}

impl FastHashOptions {
    /// Sets the initial capacity hint.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }
}

/// Byte storage over an `FxHashMap`.
pub struct FastHashStorage<K> {
    data: RwLock<FxHashMap<K, Vec<u8>>>,
    closed: AtomicBool,
}

impl<K> FastHashStorage<K>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
{
    /// Create a new fast hash storage.
    pub fn new(options: FastHashOptions) -> Self {
        Self {
            data: RwLock::new(FxHashMap::with_capacity_and_hasher(
                options.capacity,
                Default::default(),
            )),
            closed: AtomicBool::new(false),
        }
    }

    fn is_closed(&self, op: &str) -> bool {
        let closed = self.closed.load(Ordering::Acquire);
        if closed {
            warn!(op, "Fast hash storage used after close");
        }
        closed
    }
}

#[async_trait]
impl<K> Storage<K, Vec<u8>> for FastHashStorage<K>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
{
    async fn load(&self, key: &K) -> Option<Vec<u8>> {
        if self.is_closed("load") {
            return None;
        }
        self.data.read().await.get(key).cloned()
    }

    async fn store(&self, key: K, value: Vec<u8>) {
        if self.is_closed("store") {
            return;
        }
        self.data.write().await.insert(key, value);
    }

    async fn store_if_absent(&self, key: K, value: Vec<u8>) -> bool {
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

    async fn range(&self, visit: &mut (dyn FnMut(K, Vec<u8>) -> bool + Send)) {
        if self.is_closed("range") {
            return;
        }
        let snapshot: Vec<(K, Vec<u8>)> = self
            .data
            .read()
            .await
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        for (key, value) in snapshot {
            if !visit(key, value) {
                break;
            }
        }
    }

    async fn next(&self) -> Option<(K, Vec<u8>)> {
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
        let mut data = self.data.write().await;
        let capacity = data.capacity();
        *data = FxHashMap::with_capacity_and_hasher(capacity, Default::default());
    }

    async fn close(&self) -> StorageResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(StorageError::Closed);
        }
        *self.data.write().await = FxHashMap::default();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ByteStorageExt;

    #[test]
    fn test_default_capacity() {
        let options = FastHashOptions::default();
        assert_eq!(options.capacity, DEFAULT_CAPACITY);
        assert_eq!(options.with_capacity(5).capacity, 5);
    }

    #[tokio::test]
    async fn test_bytes_round_trip() {
        let storage = FastHashStorage::new(FastHashOptions::default().with_capacity(16));
        storage.store(7u64, b"seven".to_vec()).await;
        assert_eq!(storage.load(&7).await, Some(b"seven".to_vec()));
        assert_eq!(storage.keys().await, vec![7]);
    }

    #[tokio::test]
    async fn test_clear_keeps_working() {
        let storage = FastHashStorage::new(FastHashOptions::default()).typed::<String>();
        storage.store(1u32, "one".to_string()).await;
        storage.clear().await;
        assert_eq!(storage.len().await, 0);
        storage.store(2u32, "two".to_string()).await;
        assert_eq!(storage.load(&2).await.as_deref(), Some("two"));
    }

    #[tokio::test]
    async fn test_close_then_close_again() {
        let storage = FastHashStorage::<u8>::new(FastHashOptions::default());
        storage.store(1, vec![1]).await;
        storage.close().await.unwrap();
        assert!(storage.load(&1).await.is_none());
        assert!(matches!(storage.close().await, Err(StorageError::Closed)));
    }
}
