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

//! Map facade with a fixed overwrite policy.

use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use tidemap_storage::{InMemoryStorage, Storage, StorageResult};
use tracing::trace;

/// Generic concurrent map over a [`Storage`] engine.
///
/// ## Overwrite Policy
/// With `allow_overwrite == false`, [`Map::store`] keeps the first value
/// written for a key. The check and the write happen atomically inside the
/// engine through [`Storage::store_if_absent`], so concurrent writers cannot
/// both succeed.
///
/// ## Cloning
/// Clones share the same engine.
pub struct Map<K, V>
where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    storage: Arc<dyn Storage<K, V>>,
    allow_overwrite: bool,
}

impl<K, V> Clone for Map<K, V>
where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            storage: self.storage.clone(),
            allow_overwrite: self.allow_overwrite,
        }
    }
}

impl<K, V> fmt::Debug for Map<K, V>
where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Map")
            .field("allow_overwrite", &self.allow_overwrite)
            .finish_non_exhaustive()
    }
}

impl<K, V> Map<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Create a map backed by the in-memory engine.
    pub fn new(allow_overwrite: bool) -> Self {
        Self::with_storage(allow_overwrite, InMemoryStorage::new())
    }
}

impl<K, V> Map<K, V>
where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// Create a map over `storage`.
    ///
    /// ## Examples
    /// ```rust
    /// use tidemap::{ByteStorageExt, FastHashOptions, FastHashStorage, Map};
    ///
    /// # async fn example() {
    /// let map = Map::with_storage(
    ///     true,
    ///     FastHashStorage::<String>::new(FastHashOptions::default()).typed::<Vec<u8>>(),
    /// );
    /// map.store("k".to_string(), vec![1, 2, 3]).await;
    /// # }
    /// ```
    pub fn with_storage<S>(allow_overwrite: bool, storage: S) -> Self
    where
        S: Storage<K, V> + 'static,
    {
        Self::from_shared(allow_overwrite, Arc::new(storage))
    }

    /// Create a map over an already shared engine.
    pub fn from_shared(allow_overwrite: bool, storage: Arc<dyn Storage<K, V>>) -> Self {
        Self {
            storage,
            allow_overwrite,
        }
    }

    /// Whether [`Map::store`] replaces existing values.
    pub fn allows_overwrite(&self) -> bool {
        self.allow_overwrite
    }

    /// Underlying engine.
    pub fn storage(&self) -> &Arc<dyn Storage<K, V>> {
        &self.storage
    }

    /// Returns the value for `key`, if present.
    pub async fn load(&self, key: &K) -> Option<V> {
        self.storage.load(key).await
    }

    /// Returns `true` if `key` is present.
    pub async fn has(&self, key: &K) -> bool {
        self.storage.load(key).await.is_some()
    }

    /// Writes `value` under `key`, subject to the overwrite policy.
    pub async fn store(&self, key: K, value: V) {
        if self.allow_overwrite {
            self.storage.store(key, value).await;
        } else if !self.storage.store_if_absent(key, value).await {
            trace!("Store skipped, key exists and overwrite is disabled");
        }
    }

    /// Removes each listed key; missing keys are ignored.
    pub async fn delete(&self, keys: &[K]) {
        self.storage.delete(keys).await;
    }

    /// Visits entries until `visit` returns `false`.
    pub async fn range<F>(&self, mut visit: F)
    where
        F: FnMut(K, V) -> bool + Send,
    {
        self.storage.range(&mut visit).await;
    }

    /// Returns all keys.
    pub async fn keys(&self) -> Vec<K> {
        self.storage.keys().await
    }

    /// Removes `key` and returns its value.
    ///
    /// This is a load followed by a delete. A concurrent writer may replace the
    /// value in between, in which case the returned value is the older one and
    /// the newer one is removed as well.
    pub async fn pop(&self, key: &K) -> Option<V> {
        let value = self.storage.load(key).await?;
        self.storage.delete(std::slice::from_ref(key)).await;
        Some(value)
    }

    /// Atomically removes and returns some entry, or `None` when empty.
    pub async fn next(&self) -> Option<(K, V)> {
        self.storage.next().await
    }

    /// Number of entries.
    pub async fn len(&self) -> usize {
        self.storage.len().await
    }

    /// Returns `true` if the map holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.storage.is_empty().await
    }

    /// Removes all entries.
    pub async fn clear(&self) {
        self.storage.clear().await;
    }

    /// Releases the engine. A second call returns
    /// [`StorageError::Closed`](tidemap_storage::StorageError::Closed).
    pub async fn close(&self) -> StorageResult<()> {
        self.storage.close().await
    }
}
