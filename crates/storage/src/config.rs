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

//! Configuration support for storage backends.
//!
//! ## Purpose
//! Selects and configures a backend from environment variables, and builds it
//! as a shared `Arc<dyn Storage<K, V>>`.
//!
//! ## Environment Variables
//!
//! ### Backend Selection
//! - `TIDEMAP_BACKEND`: Backend type (default: "in-memory")
//!   - "in-memory" | "memory" → [`InMemoryStorage`]
//!   - "fast-hash" | "swiss" → [`FastHashStorage`]
//!   - "lsm" → `LsmStorage`
//!   - "redis" → `RedisStorage`
//!   - "sqlite" → `SqliteStorage`
//!
//! ### FastHash Configuration
//! - `TIDEMAP_FAST_HASH_CAPACITY`: Initial capacity (default: 10000)
//!
//! ### LSM Configuration
//! - `TIDEMAP_LSM_DIR`: Database directory; when unset the store is temporary
//! - `TIDEMAP_LSM_COMPRESSION`: Compress pages (default: false)
//! - `TIDEMAP_LSM_SYNC_WRITES`: Flush after every write (default: false)
//! - `TIDEMAP_LSM_CACHE_BYTES`: Page cache size (default: 512 MiB)
//! - `TIDEMAP_LSM_ENCRYPTION_KEY`: Master key, 16, 24 or 32 bytes
//!
//! ### Redis Configuration
//! - `TIDEMAP_REDIS_ADDR`: `host:port` (default: "localhost:6379")
//! - `TIDEMAP_REDIS_USERNAME` / `TIDEMAP_REDIS_PASSWORD`: Credentials
//! - `TIDEMAP_REDIS_DB`: Database index (default: 0)
//! - `TIDEMAP_REDIS_POOL_SIZE`: Pooled connections (default: 3)
//! - `TIDEMAP_REDIS_PREFIX`: Key prefix (default: "tidemap_")
//! - `TIDEMAP_REDIS_TLS`: Use TLS (default: false)
//! - `TIDEMAP_REDIS_TIMEOUT_MS`: Per-call timeout (default: 5000)
//! - `TIDEMAP_REDIS_EXPIRE_MS`: Entry expiry (default: none)
//!
//! ### SQLite Configuration
//! - `TIDEMAP_SQLITE_PATH`: Database file (default: ":memory:")
//! - `TIDEMAP_SQLITE_TABLE`: Table name (default: "tidemap_kv")
//!
//! ## Examples
//!
//! ```bash
//! export TIDEMAP_BACKEND=sqlite
//! export TIDEMAP_SQLITE_PATH=/tmp/tidemap.db
//! cargo run
//! ```

use crate::{
    ByteStorageExt, FastHashOptions, FastHashStorage, InMemoryStorage, Storage, StorageError,
    StorageKey, StorageResult, StorageValue,
};
use std::str::FromStr;
use std::sync::Arc;

/// Backend type configuration.
#[derive(Debug, Clone)]
pub enum BackendType {
    /// In-memory HashMap backend (default, always available)
    InMemory,
    /// FxHashMap byte backend behind the envelope adapter (always available)
    FastHash(FastHashOptions),
    /// sled backend (requires lsm-backend feature)
    #[cfg(feature = "lsm-backend")]
    Lsm(crate::LsmOptions),
    /// Redis backend (requires redis-backend feature)
    #[cfg(feature = "redis-backend")]
    Redis(crate::RedisOptions),
    /// SQLite backend (requires sql-backend feature)
    #[cfg(feature = "sql-backend")]
    Sqlite(crate::SqliteOptions),
}

#[allow(clippy::derivable_impls)]
impl Default for BackendType {
    fn default() -> Self {
        Self::InMemory
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Default)]
pub struct StorageConfig {
    /// Backend type
    pub backend: BackendType,
}

impl StorageConfig {
    /// Create configuration with explicit backend.
    pub fn new(backend: BackendType) -> Self {
        Self { backend }
    }

    /// Create configuration from environment variables.
    ///
    /// ## Errors
    /// [`StorageError::ConfigError`] for an unknown backend, a backend whose
    /// feature is disabled, or a variable that does not parse.
    pub fn from_env() -> StorageResult<Self> {
        let backend_str = std::env::var("TIDEMAP_BACKEND")
            .unwrap_or_else(|_| "in-memory".to_string())
            .to_lowercase();

        let backend = match backend_str.as_str() {
            "in-memory" | "memory" => BackendType::InMemory,

            "fast-hash" | "fasthash" | "swiss" => {
                let mut options = FastHashOptions::default();
                if let Some(capacity) = env_parse("TIDEMAP_FAST_HASH_CAPACITY")? {
                    options = options.with_capacity(capacity);
                }
                BackendType::FastHash(options)
            }

            #[cfg(feature = "lsm-backend")]
            "lsm" => BackendType::Lsm(lsm_options_from_env()?),

            #[cfg(feature = "redis-backend")]
            "redis" => BackendType::Redis(redis_options_from_env()?),

            #[cfg(feature = "sql-backend")]
            "sqlite" => {
                let mut options = crate::SqliteOptions::default();
                match std::env::var("TIDEMAP_SQLITE_PATH") {
                    Ok(path) if path != ":memory:" && !path.is_empty() => {
                        options = options.with_path(path)
                    }
                    _ => {}
                }
                if let Ok(table) = std::env::var("TIDEMAP_SQLITE_TABLE") {
                    options = options.with_table(table);
                }
                BackendType::Sqlite(options)
            }

            other => {
                return Err(StorageError::ConfigError(format!(
                    "Unknown or disabled backend type: {}. Valid options: {}",
                    other,
                    available_backends().join(", ")
                )));
            }
        };

        Ok(Self { backend })
    }
}

/// Names of the backends compiled into this build.
pub fn available_backends() -> Vec<&'static str> {
    let mut names = vec!["in-memory", "fast-hash"];
    if cfg!(feature = "lsm-backend") {
        names.push("lsm");
    }
    if cfg!(feature = "redis-backend") {
        names.push("redis");
    }
    if cfg!(feature = "sql-backend") {
        names.push("sqlite");
    }
    names
}

fn env_parse<T: FromStr>(name: &str) -> StorageResult<Option<T>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| StorageError::ConfigError(format!("Invalid value for {}: {}", name, raw))),
        Err(_) => Ok(None),
    }
}

#[cfg(any(feature = "lsm-backend", feature = "redis-backend"))]
fn env_flag(name: &str) -> StorageResult<Option<bool>> {
    match std::env::var(name) {
        Ok(raw) => match raw.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            _ => Err(StorageError::ConfigError(format!(
                "Invalid value for {}: {}",
                name, raw
            ))),
        },
        Err(_) => Ok(None),
    }
}

#[cfg(feature = "lsm-backend")]
fn lsm_options_from_env() -> StorageResult<crate::LsmOptions> {
    let mut options = crate::LsmOptions::default();
    if let Ok(dir) = std::env::var("TIDEMAP_LSM_DIR") {
        options = options.with_dir(dir);
    }
    if let Some(compression) = env_flag("TIDEMAP_LSM_COMPRESSION")? {
        options = options.with_compression(compression);
    }
    if let Some(sync_writes) = env_flag("TIDEMAP_LSM_SYNC_WRITES")? {
        options = options.with_sync_writes(sync_writes);
    }
    if let Some(bytes) = env_parse("TIDEMAP_LSM_CACHE_BYTES")? {
        options = options.with_cache_capacity(bytes);
    }
    if let Ok(key) = std::env::var("TIDEMAP_LSM_ENCRYPTION_KEY") {
        options = options.with_encryption_key(key.into_bytes());
    }
    Ok(options)
}

#[cfg(feature = "redis-backend")]
fn redis_options_from_env() -> StorageResult<crate::RedisOptions> {
    use std::time::Duration;

    let mut options = crate::RedisOptions::default();
    if let Ok(addr) = std::env::var("TIDEMAP_REDIS_ADDR") {
        options = options.with_addr(addr);
    }
    let username = std::env::var("TIDEMAP_REDIS_USERNAME").ok();
    let password = std::env::var("TIDEMAP_REDIS_PASSWORD").ok();
    options = match (username, password) {
        (Some(username), Some(password)) => options.with_credentials(username, password),
        (None, Some(password)) => options.with_password(password),
        (Some(_), None) => {
            return Err(StorageError::ConfigError(
                "TIDEMAP_REDIS_USERNAME requires TIDEMAP_REDIS_PASSWORD".to_string(),
            ))
        }
        (None, None) => options,
    };
    if let Some(db) = env_parse("TIDEMAP_REDIS_DB")? {
        options = options.with_db(db);
    }
    if let Some(pool_size) = env_parse("TIDEMAP_REDIS_POOL_SIZE")? {
        options = options.with_pool_size(pool_size);
    }
    if let Ok(prefix) = std::env::var("TIDEMAP_REDIS_PREFIX") {
        options = options.with_prefix(prefix);
    }
    if let Some(tls) = env_flag("TIDEMAP_REDIS_TLS")? {
        options = options.with_tls(tls);
    }
    if let Some(ms) = env_parse("TIDEMAP_REDIS_TIMEOUT_MS")? {
        options = options.with_timeout(Duration::from_millis(ms));
    }
    if let Some(ms) = env_parse("TIDEMAP_REDIS_EXPIRE_MS")? {
        options = options.with_expire(Duration::from_millis(ms));
    }
    Ok(options)
}

/// Create a storage from environment configuration.
///
/// ## Examples
/// ```rust
/// use tidemap_storage::{create_storage_from_env, Storage};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let storage = create_storage_from_env::<String, String>().await?;
/// storage.store("key".to_string(), "value".to_string()).await;
/// # Ok(())
/// # }
/// ```
pub async fn create_storage_from_env<K, V>() -> StorageResult<Arc<dyn Storage<K, V>>>
where
    K: StorageKey,
    V: StorageValue + Clone,
{
    let config = StorageConfig::from_env()?;
    create_storage_from_config(config).await
}

/// Create a storage from explicit configuration.
///
/// Byte backends are wrapped in the envelope adapter, so `V` only needs to
/// round-trip through serde.
///
/// ## Examples
/// ```rust
/// use tidemap_storage::{create_storage_from_config, BackendType, FastHashOptions, StorageConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = StorageConfig::new(BackendType::FastHash(FastHashOptions::default()));
/// let storage = create_storage_from_config::<u64, String>(config).await?;
/// # Ok(())
/// # }
/// ```
pub async fn create_storage_from_config<K, V>(
    config: StorageConfig,
) -> StorageResult<Arc<dyn Storage<K, V>>>
where
    K: StorageKey,
    V: StorageValue + Clone,
{
    match config.backend {
        BackendType::InMemory => Ok(Arc::new(InMemoryStorage::<K, V>::new())),

        BackendType::FastHash(options) => Ok(Arc::new(FastHashStorage::<K>::new(options).typed::<V>())),

        #[cfg(feature = "lsm-backend")]
        BackendType::Lsm(options) => {
            let storage = crate::LsmStorage::<K>::open(options)?;
            Ok(Arc::new(storage.typed::<V>()))
        }

        #[cfg(feature = "redis-backend")]
        BackendType::Redis(options) => {
            let storage = crate::RedisStorage::<K>::connect(options).await?;
            Ok(Arc::new(storage.typed::<V>()))
        }

        #[cfg(feature = "sql-backend")]
        BackendType::Sqlite(options) => {
            let storage = crate::SqliteStorage::<K>::open(options).await?;
            Ok(Arc::new(storage.typed::<V>()))
        }
    }
}
