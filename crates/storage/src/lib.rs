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

//! # TideMap Storage
//!
//! ## Purpose
//! Defines the storage contract behind the `tidemap::Map` facade and ships the
//! engines that implement it: two in-process maps, an embedded LSM store, a
//! remote Redis cache and embedded SQLite.
//!
//! ## Key Components
//!
//! - [`Storage`]: Typed contract every engine satisfies
//! - [`ByteStorage`]: Same contract with values fixed to byte buffers
//! - [`EnvelopeAdapter`]: Lifts a byte engine to a typed [`Storage`] by wrapping
//!   values in a self-describing MessagePack envelope
//! - [`TypeRegistry`] / [`DynValue`]: Runtime type registry used to restore
//!   concrete types when values are read back as [`DynValue`]
//! - [`StorageConfig`]: Environment driven backend selection
//!
//! ## Backend Support
//!
//! - **InMemory**: `HashMap` behind a `RwLock` (always available)
//! - **FastHash**: `FxHashMap` byte table with a capacity hint (always available)
//! - **LSM**: Persistent, embedded, optionally encrypted (feature: `lsm-backend`)
//! - **Redis**: Remote, optionally shared and expiring (feature: `redis-backend`)
//! - **SQLite**: Embedded relational, file or in-memory (feature: `sql-backend`)
//!
//! ## Examples
//!
//! ```rust
//! use tidemap_storage::{ByteStorageExt, FastHashOptions, FastHashStorage, Storage};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let storage = FastHashStorage::<String>::new(FastHashOptions::default()).typed::<u64>();
//!
//! storage.store("answer".to_string(), 42).await;
//! assert_eq!(storage.load(&"answer".to_string()).await, Some(42));
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::hash::Hash;
use std::sync::Arc;

pub mod adapter;
pub mod codec;
pub mod config;
pub mod error;
pub mod fast_hash;
pub mod memory;
pub mod registry;

#[cfg(feature = "lsm-backend")]
mod crypto;
#[cfg(feature = "lsm-backend")]
pub mod lsm;

#[cfg(feature = "redis-backend")]
pub mod redis;

#[cfg(feature = "sql-backend")]
pub mod sql;

pub use adapter::EnvelopeAdapter;
pub use config::{create_storage_from_config, create_storage_from_env, BackendType, StorageConfig};
pub use error::{CodecError, CodecResult, StorageError, StorageResult};
pub use fast_hash::{FastHashOptions, FastHashStorage};
pub use memory::InMemoryStorage;
pub use registry::{register_type, DynValue, TypeRegistry};

#[cfg(feature = "lsm-backend")]
pub use lsm::{LsmOptions, LsmStorage};

#[cfg(feature = "redis-backend")]
pub use redis::{RedisOptions, RedisStorage};

#[cfg(feature = "sql-backend")]
pub use sql::{SqliteOptions, SqliteStorage};

/// Keys accepted by every engine.
///
/// Byte engines persist keys as MessagePack, so keys must round-trip through serde.
pub trait StorageKey:
    Serialize + DeserializeOwned + Eq + Hash + Clone + Send + Sync + 'static
{
}

impl<T> StorageKey for T where
    T: Serialize + DeserializeOwned + Eq + Hash + Clone + Send + Sync + 'static
{
}

/// Values accepted by byte engines through the [`EnvelopeAdapter`].
pub trait StorageValue: Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> StorageValue for T where T: Serialize + DeserializeOwned + Send + Sync + 'static {}

/// Typed map storage contract.
///
/// ## Purpose
/// Every engine, whether it holds values directly or goes through the
/// [`EnvelopeAdapter`], exposes this same set of operations so that the
/// `tidemap::Map` facade can be pointed at any of them.
///
/// ## Failure Model
/// Engines never surface I/O, network or codec failures from data operations.
/// Failures are logged through `tracing` and the operation degrades to "absent"
/// (`load`, `next`), "skipped" (`range`), "no effect" (`store`, `delete`,
/// `clear`) or a best-effort count (`len`). Only [`Storage::close`] reports an
/// error, and constructors return [`StorageResult`].
///
/// ## Concurrency
/// Implementations are `Send + Sync` and safe for concurrent use. `range`
/// makes no snapshot promise for the remote and embedded engines; entries
/// mutated during a walk may or may not be observed.
#[async_trait]
pub trait Storage<K, V>: Send + Sync
where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// Returns the value stored for `key`, or `None` if absent or unreadable.
    async fn load(&self, key: &K) -> Option<V>;

    /// Inserts or replaces the value for `key`.
    async fn store(&self, key: K, value: V);

    /// Inserts `value` only if `key` is absent.
    ///
    /// ## Returns
    /// `true` if this call inserted the entry, `false` if the key already existed
    /// or the write failed. The check and the insert happen atomically within
    /// the engine.
    async fn store_if_absent(&self, key: K, value: V) -> bool;

    /// Removes each listed key; missing keys are ignored.
    async fn delete(&self, keys: &[K]);

    /// Visits entries until the visitor returns `false` or entries run out.
    ///
    /// The visitor is synchronous. Collect keys during the walk and mutate the
    /// storage afterwards.
    async fn range(&self, visit: &mut (dyn FnMut(K, V) -> bool + Send));

    /// Atomically removes and returns some entry, or `None` when empty.
    ///
    /// The choice of entry is unspecified but each entry is returned to at most
    /// one caller, so draining with `next` never yields the same key twice.
    async fn next(&self) -> Option<(K, V)>;

    /// Returns all keys currently present, in no particular order.
    async fn keys(&self) -> Vec<K>;

    /// Returns the entry count. Engines may serve this from a short-lived cache.
    async fn len(&self) -> usize;

    /// Returns `true` if the storage holds no entries.
    async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Removes all entries.
    async fn clear(&self);

    /// Releases backend resources.
    ///
    /// ## Returns
    /// [`StorageError::Closed`] if the storage was already closed. Data
    /// operations after `close` behave as on an empty storage.
    async fn close(&self) -> StorageResult<()>;
}

#[async_trait]
impl<K, V, S> Storage<K, V> for Arc<S>
where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
    S: Storage<K, V> + ?Sized,
{
    async fn load(&self, key: &K) -> Option<V> {
        (**self).load(key).await
    }

    async fn store(&self, key: K, value: V) {
        (**self).store(key, value).await
    }

    async fn store_if_absent(&self, key: K, value: V) -> bool {
        (**self).store_if_absent(key, value).await
    }

    async fn delete(&self, keys: &[K]) {
        (**self).delete(keys).await
    }

    async fn range(&self, visit: &mut (dyn FnMut(K, V) -> bool + Send)) {
        (**self).range(visit).await
    }

    async fn next(&self) -> Option<(K, V)> {
        (**self).next().await
    }

    async fn keys(&self) -> Vec<K> {
        (**self).keys().await
    }

    async fn len(&self) -> usize {
        (**self).len().await
    }

    async fn clear(&self) {
        (**self).clear().await
    }

    async fn close(&self) -> StorageResult<()> {
        (**self).close().await
    }
}

/// Byte-valued engine contract: [`Storage`] with values fixed to `Vec<u8>`.
pub trait ByteStorage<K>: Storage<K, Vec<u8>>
where
    K: Send + Sync + 'static,
{
}

impl<K, S> ByteStorage<K> for S
where
    K: Send + Sync + 'static,
    S: Storage<K, Vec<u8>> + ?Sized,
{
}

/// Lifts any [`ByteStorage`] to a typed [`Storage`] through the [`EnvelopeAdapter`].
pub trait ByteStorageExt<K>: ByteStorage<K> + Sized
where
    K: StorageKey,
{
    /// Wraps this engine so it stores `V` values inside serialization envelopes.
    fn typed<V: StorageValue>(self) -> EnvelopeAdapter<K, V, Self> {
        EnvelopeAdapter::new(self)
    }
}

impl<K: StorageKey, S: ByteStorage<K>> ByteStorageExt<K> for S {}
