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

//! SQLite-backed byte storage.
//!
//! ## Purpose
//! Stores entries as rows of a single table in an embedded SQLite database,
//! either in a file or in memory.
//!
//! ## Features
//! - **Persistent**: Data survives process restarts when backed by a file
//! - **Transactional**: multi-key `delete` runs in one transaction
//! - **Atomic pop**: `next` deletes one row with `DELETE ... RETURNING`
//! - **Cached count**: `len` reuses the last `COUNT(*)` for a configurable
//!   duration; every mutation through this storage invalidates it
//!
//! ## Schema
//! ```sql
//! CREATE TABLE IF NOT EXISTS tidemap_kv (
//!     key BLOB PRIMARY KEY,
//!     value BLOB
//! );
//! ```

use crate::codec::{decode_key, encode_key};
use crate::{Storage, StorageError, StorageKey, StorageResult};
use async_trait::async_trait;
use futures::TryStreamExt;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::Row;
use std::fmt;
use std::marker::PhantomData;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Default table name.
pub const DEFAULT_TABLE: &str = "tidemap_kv";
/// Default lifetime of a cached row count.
pub const DEFAULT_COUNT_CACHE: Duration = Duration::from_secs(5);

/// Options for [`SqliteStorage`].
#[derive(Debug, Clone)]
pub struct SqliteOptions {
    /// Database file; `None` keeps the database in memory
    pub path: Option<PathBuf>,
    /// Table holding the entries
    pub table: String,
    /// Journal mode (`DELETE`, `TRUNCATE`, `PERSIST`, `MEMORY`, `WAL`, `OFF`)
    pub journal_mode: String,
    /// Synchronous mode (`OFF`, `NORMAL`, `FULL`, `EXTRA`)
    pub synchronous: String,
    /// Lifetime of a cached row count
    pub count_cache: Duration,
    /// Upper bound of pooled connections
    pub max_open_connections: u32,
    /// Connections kept open while idle
    pub min_idle_connections: u32,
    /// Extra `PRAGMA name = value` statements run after connecting
    pub pragmas: Vec<(String, String)>,
}

impl Default for SqliteOptions {
    fn default() -> Self {
        Self {
            path: None,
            table: DEFAULT_TABLE.to_string(),
            journal_mode: "WAL".to_string(),
            synchronous: "NORMAL".to_string(),
            count_cache: DEFAULT_COUNT_CACHE,
            max_open_connections: 10,
            min_idle_connections: 5,
            pragmas: Vec::new(),
        }
    }
}

impl SqliteOptions {
    /// Store the database in `path`.
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Keep the database in memory.
    pub fn in_memory(mut self) -> Self {
        self.path = None;
        self
    }

    /// Set the table name.
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// Set the journal mode.
    pub fn with_journal_mode(mut self, mode: impl Into<String>) -> Self {
        self.journal_mode = mode.into();
        self
    }

    /// Set the synchronous mode.
    pub fn with_synchronous(mut self, mode: impl Into<String>) -> Self {
        self.synchronous = mode.into();
        self
    }

    /// Set the row count cache lifetime.
    pub fn with_count_cache(mut self, duration: Duration) -> Self {
        self.count_cache = duration;
        self
    }

    /// Set the pool bounds.
    pub fn with_connections(mut self, max_open: u32, min_idle: u32) -> Self {
        self.max_open_connections = max_open;
        self.min_idle_connections = min_idle;
        self
    }

    /// Add a `PRAGMA name = value` statement.
    pub fn with_pragma(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.pragmas.push((name.into(), value.into()));
        self
    }
}

/// Accepts table and pragma names made of ASCII letters, digits and underscores,
/// not starting with a digit.
fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn is_pragma_value(value: &str) -> bool {
    !value.is_empty() && value.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-'))
}

/// Prebuilt statements for one table.
struct Statements {
    select: String,
    upsert: String,
    insert_absent: String,
    delete: String,
    scan: String,
    pop: String,
    count: String,
    clear: String,
}

impl Statements {
    fn for_table(table: &str) -> Self {
        Self {
            select: format!("SELECT value FROM {} WHERE key = ?", table),
            upsert: format!("INSERT OR REPLACE INTO {} (key, value) VALUES (?, ?)", table),
            insert_absent: format!("INSERT OR IGNORE INTO {} (key, value) VALUES (?, ?)", table),
            delete: format!("DELETE FROM {} WHERE key = ?", table),
            scan: format!("SELECT key, value FROM {}", table),
            pop: format!(
                "DELETE FROM {t} WHERE rowid = (SELECT rowid FROM {t} LIMIT 1) RETURNING key, value",
                t = table
            ),
            count: format!("SELECT COUNT(*) FROM {}", table),
            clear: format!("DELETE FROM {}", table),
        }
    }
}

/// SQLite byte storage.
///
/// ## Example
/// ```rust,no_run
/// use tidemap_storage::{ByteStorageExt, SqliteOptions, SqliteStorage, Storage};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let storage = SqliteStorage::<String>::open(SqliteOptions::default().with_path("/tmp/tidemap.db"))
///     .await?
///     .typed::<Vec<String>>();
///
/// storage.store("tags".to_string(), vec!["a".to_string()]).await;
/// storage.close().await?;
/// # Ok(())
/// # }
/// ```
pub struct SqliteStorage<K> {
    pool: SqlitePool,
    sql: Statements,
    table: String,
    count_cache: Duration,
    cached_count: Mutex<Option<(usize, Instant)>>,
    closed: AtomicBool,
    _key: PhantomData<fn() -> K>,
}

impl<K> fmt::Debug for SqliteStorage<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteStorage").field("table", &self.table).finish()
    }
}

impl<K: StorageKey> SqliteStorage<K> {
    /// Open (or create) the database and table described by `options`.
    ///
    /// ## Errors
    /// - [`StorageError::ConfigError`] for an invalid table name, journal or
    ///   synchronous mode, or pragma
    /// - [`StorageError::BackendError`] if the database cannot be opened
    pub async fn open(options: SqliteOptions) -> StorageResult<Self> {
        if !is_identifier(&options.table) {
            return Err(StorageError::ConfigError(format!(
                "Invalid table name: {}",
                options.table
            )));
        }
        let journal = SqliteJournalMode::from_str(&options.journal_mode).map_err(|_| {
            StorageError::ConfigError(format!("Invalid journal mode: {}", options.journal_mode))
        })?;
        let synchronous = SqliteSynchronous::from_str(&options.synchronous).map_err(|_| {
            StorageError::ConfigError(format!("Invalid synchronous mode: {}", options.synchronous))
        })?;
        for (name, value) in &options.pragmas {
            if !is_identifier(name) || !is_pragma_value(value) {
                return Err(StorageError::ConfigError(format!(
                    "Invalid pragma: {} = {}",
                    name, value
                )));
            }
        }

        let (connect, max_connections) = match &options.path {
            Some(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)?;
                }
                (
                    SqliteConnectOptions::new().filename(path).create_if_missing(true),
                    options.max_open_connections.max(1),
                )
            }
            // Each in-memory connection would see its own empty database.
            None => (SqliteConnectOptions::from_str("sqlite::memory:")?, 1),
        };
        let mut connect = connect.journal_mode(journal).synchronous(synchronous);
        // Applied by sqlx on every new connection, not just the first.
        for (name, value) in &options.pragmas {
            connect = connect.pragma(name.clone(), value.clone());
        }

        let mut pool_options = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .min_connections(options.min_idle_connections.min(max_connections));
        if options.path.is_none() {
            // Recycling the only connection would drop the in-memory database.
            pool_options = pool_options.idle_timeout(None).max_lifetime(None);
        }
        let pool = pool_options.connect_with(connect).await?;

        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {} (key BLOB PRIMARY KEY, value BLOB)",
            options.table
        ))
        .execute(&pool)
        .await?;

        info!(
            path = ?options.path,
            table = %options.table,
            max_connections,
            "Opened SQLite storage"
        );

        Ok(Self {
            pool,
            sql: Statements::for_table(&options.table),
            table: options.table,
            count_cache: options.count_cache,
            cached_count: Mutex::new(None),
            closed: AtomicBool::new(false),
            _key: PhantomData,
        })
    }

    fn invalidate_count(&self) {
        *self.cached_count.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn fresh_count(&self) -> Option<usize> {
        let cached = *self.cached_count.lock().unwrap_or_else(PoisonError::into_inner);
        cached
            .filter(|(_, at)| at.elapsed() < self.count_cache)
            .map(|(count, _)| count)
    }

    fn encode_key(key: &K) -> Option<Vec<u8>> {
        match encode_key(key) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                warn!(error = %e, "SQLite key failed to encode");
                None
            }
        }
    }

    fn decode_row(row: &sqlx::sqlite::SqliteRow) -> Option<(K, Vec<u8>)> {
        let key: Vec<u8> = row.try_get("key").ok()?;
        let value: Vec<u8> = row.try_get::<Option<Vec<u8>>, _>("value").ok()?.unwrap_or_default();
        match decode_key(&key) {
            Ok(key) => Some((key, value)),
            Err(e) => {
                warn!(error = %e, "Skipping SQLite row with undecodable key");
                None
            }
        }
    }

    async fn delete_keys(&self, keys: &[Vec<u8>]) -> StorageResult<u64> {
        let mut tx = self.pool.begin().await?;
        let mut removed = 0;
        for key in keys {
            removed += sqlx::query(&self.sql.delete)
                .bind(key)
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }
        tx.commit().await?;
        Ok(removed)
    }

    async fn count(&self) -> StorageResult<usize> {
        let row = sqlx::query(&self.sql.count).fetch_one(&self.pool).await?;
        let count: i64 = row.try_get(0)?;
        Ok(count.max(0) as usize)
    }

    fn warn_closed(&self, op: &str) -> bool {
        let closed = self.closed.load(Ordering::Acquire);
        if closed {
            warn!(op, "SQLite storage used after close");
        }
        closed
    }
}

#[async_trait]
impl<K: StorageKey> Storage<K, Vec<u8>> for SqliteStorage<K> {
    async fn load(&self, key: &K) -> Option<Vec<u8>> {
        if self.warn_closed("load") {
            return None;
        }
        let key = Self::encode_key(key)?;
        match sqlx::query(&self.sql.select)
            .bind(key)
            .fetch_optional(&self.pool)
            .await
        {
            Ok(row) => row.and_then(|row| row.try_get::<Option<Vec<u8>>, _>("value").ok().flatten()),
            Err(e) => {
                error!(error = %e, "SQLite select failed");
                None
            }
        }
    }

    async fn store(&self, key: K, value: Vec<u8>) {
        if self.warn_closed("store") {
            return;
        }
        let Some(key) = Self::encode_key(&key) else {
            return;
        };
        let result = sqlx::query(&self.sql.upsert)
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await;
        self.invalidate_count();
        if let Err(e) = result {
            error!(error = %e, "SQLite upsert failed");
        }
    }

    async fn store_if_absent(&self, key: K, value: Vec<u8>) -> bool {
        if self.warn_closed("store_if_absent") {
            return false;
        }
        let Some(key) = Self::encode_key(&key) else {
            return false;
        };
        let result = sqlx::query(&self.sql.insert_absent)
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await;
        self.invalidate_count();
        match result {
            Ok(done) => done.rows_affected() == 1,
            Err(e) => {
                error!(error = %e, "SQLite insert failed");
                false
            }
        }
    }

    async fn delete(&self, keys: &[K]) {
        if keys.is_empty() || self.warn_closed("delete") {
            return;
        }
        let encoded: Vec<Vec<u8>> = keys.iter().filter_map(Self::encode_key).collect();
        let result = self.delete_keys(&encoded).await;
        self.invalidate_count();
        match result {
            Ok(removed) => debug!(removed, "SQLite delete committed"),
            Err(e) => error!(error = %e, "SQLite delete transaction failed"),
        }
    }

    async fn range(&self, visit: &mut (dyn FnMut(K, Vec<u8>) -> bool + Send)) {
        if self.warn_closed("range") {
            return;
        }
        let mut rows = sqlx::query(&self.sql.scan).fetch(&self.pool);
        loop {
            match rows.try_next().await {
                Ok(Some(row)) => {
                    if let Some((key, value)) = Self::decode_row(&row) {
                        if !visit(key, value) {
                            return;
                        }
                    }
                }
                Ok(None) => return,
                Err(e) => {
                    error!(error = %e, "SQLite scan failed");
                    return;
                }
            }
        }
    }

    async fn next(&self) -> Option<(K, Vec<u8>)> {
        if self.warn_closed("next") {
            return None;
        }
        loop {
            let result = sqlx::query(&self.sql.pop).fetch_optional(&self.pool).await;
            self.invalidate_count();
            match result {
                Ok(Some(row)) => {
                    if let Some(entry) = Self::decode_row(&row) {
                        return Some(entry);
                    }
                }
                Ok(None) => return None,
                Err(e) => {
                    error!(error = %e, "SQLite pop failed");
                    return None;
                }
            }
        }
    }

    async fn keys(&self) -> Vec<K> {
        let mut keys = Vec::new();
        self.range(&mut |key, _| {
            keys.push(key);
            true
        })
        .await;
        keys
    }

    async fn len(&self) -> usize {
        if self.closed.load(Ordering::Acquire) {
            return 0;
        }
        if let Some(count) = self.fresh_count() {
            return count;
        }
        match self.count().await {
            Ok(count) => {
                *self.cached_count.lock().unwrap_or_else(PoisonError::into_inner) =
                    Some((count, Instant::now()));
                count
            }
            Err(e) => {
                error!(error = %e, "SQLite count failed");
                0
            }
        }
    }

    async fn clear(&self) {
        if self.warn_closed("clear") {
            return;
        }
        let result = sqlx::query(&self.sql.clear).execute(&self.pool).await;
        self.invalidate_count();
        if let Err(e) = result {
            error!(error = %e, "SQLite clear failed");
        }
    }

    async fn close(&self) -> StorageResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(StorageError::Closed);
        }
        self.pool.close().await;
        info!(table = %self.table, "Closed SQLite storage");
        Ok(())
    }
}
