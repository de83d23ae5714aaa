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

//! TideMap: a concurrency-safe generic map over pluggable storage engines
//!
//! A [`Map`] pairs one storage engine with an overwrite policy fixed at
//! construction. Engines range from a lock-protected `HashMap` to remote Redis;
//! all of them honour the same [`Storage`] contract, so code written against a
//! `Map` does not change when the engine does.
//!
//! ```rust
//! use tidemap::Map;
//!
//! # async fn example() {
//! let map = Map::new(false);
//! map.store(1, "one".to_string()).await;
//! map.store(1, "uno".to_string()).await;
//! assert_eq!(map.load(&1).await.as_deref(), Some("one"));
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub use tidemap_storage as storage;

mod map;

pub use map::Map;
pub use storage::{
    create_storage_from_config, create_storage_from_env, BackendType, ByteStorage, ByteStorageExt,
    DynValue, EnvelopeAdapter, FastHashOptions, FastHashStorage, InMemoryStorage, Storage,
    StorageConfig, StorageError, StorageResult, TypeRegistry,
};

#[cfg(feature = "lsm-backend")]
pub use storage::{LsmOptions, LsmStorage};

#[cfg(feature = "redis-backend")]
pub use storage::{RedisOptions, RedisStorage};

#[cfg(feature = "sql-backend")]
pub use storage::{SqliteOptions, SqliteStorage};

/// Registers `T` in the process-wide type registry.
///
/// Needed before reading values stored as [`DynValue`] by an earlier process,
/// so that they come back as `T` rather than as raw data. Registering a type
/// more than once has no effect.
pub fn register_type<T: storage::registry::Registrable>() {
    storage::register_type::<T>();
}

/// Registers the type of `sample`; handy when the type name is awkward to spell.
pub fn register_value<T: storage::registry::Registrable>(sample: &T) {
    TypeRegistry::global().register_value(sample);
}
