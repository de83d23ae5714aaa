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

//! Redis-backed byte storage.
//!
//! ## Purpose
//! Keeps entries in a remote Redis server so several processes can share one
//! map. Every key is namespaced with a configurable prefix, which lets many
//! logical maps share a single database.
//!
//! ## Features
//! - **Authenticated**: username + password (ACL) or password-only (legacy) auth
//! - **Pooled**: several multiplexed connections, picked round-robin
//! - **Bounded**: every round trip is limited by the configured timeout and
//!   retried on connection-level failures
//! - **Expiring**: optional per-entry expiry via `PX`
//! - **Atomic pop**: `next` removes entries with `GETDEL`
//!
//! ## Performance Characteristics
//! `range`, `keys`, `len`, `clear` and `next` enumerate keys with cursor based
//! `SCAN ... MATCH <prefix>*` pages, so they cost O(n / page size) round trips
//! plus one `MGET` per page for `range`.
//!
//! ## Key Layout
//! `<prefix><MessagePack encoded key>`

use crate::codec::{decode_key, encode_key};
use crate::{Storage, StorageError, StorageKey, StorageResult};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, RedisError, RedisResult};
use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;
use tracing::{debug, error, info, warn};
use url::Url;

/// Default server address.
pub const DEFAULT_ADDR: &str = "localhost:6379";
/// Default key prefix.
pub const DEFAULT_PREFIX: &str = "tidemap_";
/// Default per-call timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default `SCAN COUNT` hint.
pub const DEFAULT_SCAN_COUNT: usize = 2048;

/// Keys removed per `DEL` command.
const DELETE_BATCH: usize = 1000;

/// Options for [`RedisStorage`].
#[derive(Clone)]
pub struct RedisOptions {
    /// Server address as `host:port`
    pub addr: String,
    /// ACL username; requires `password`
    pub username: Option<String>,
    /// Password, alone for legacy auth or paired with `username`
    pub password: Option<String>,
    /// Database index
    pub db: i64,
    /// Number of multiplexed connections
    pub pool_size: usize,
    /// Retries after connection-level failures
    pub max_retries: u32,
    /// Connect with TLS (`rediss://`)
    pub tls: bool,
    /// Skip certificate verification when TLS is on
    pub tls_insecure: bool,
    /// Namespace prepended to every key
    pub prefix: String,
    /// Limit for each round trip
    pub timeout: Duration,
    /// Expiry applied to stored entries
    pub expire: Option<Duration>,
    /// `SCAN COUNT` hint for key enumeration
    pub scan_count: usize,
}

impl Default for RedisOptions {
    fn default() -> Self {
        Self {
            addr: DEFAULT_ADDR.to_string(),
            username: None,
            password: None,
            db: 0,
            pool_size: 3,
            max_retries: 3,
            tls: false,
            tls_insecure: false,
            prefix: DEFAULT_PREFIX.to_string(),
            timeout: DEFAULT_TIMEOUT,
            expire: None,
            scan_count: DEFAULT_SCAN_COUNT,
        }
    }
}

impl RedisOptions {
    /// Set the server address (`host:port`).
    pub fn with_addr(mut self, addr: impl Into<String>) -> Self {
        self.addr = addr.into();
        self
    }

    /// Authenticate with an ACL username and password.
    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Authenticate with a password only.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.username = None;
        self.password = Some(password.into());
        self
    }

    /// Select the database index.
    pub fn with_db(mut self, db: i64) -> Self {
        self.db = db;
        self
    }

    /// Set the number of pooled connections.
    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    /// Set the retry budget for connection-level failures.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Toggle TLS.
    pub fn with_tls(mut self, tls: bool) -> Self {
        self.tls = tls;
        self
    }

    /// Accept any server certificate when TLS is on.
    pub fn with_insecure_tls(mut self, insecure: bool) -> Self {
        self.tls_insecure = insecure;
        self
    }

    /// Set the key namespace prefix.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Set the per-call timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Expire entries after `expire`.
    pub fn with_expire(mut self, expire: Duration) -> Self {
        self.expire = Some(expire);
        self
    }

    /// Set the `SCAN COUNT` hint.
    pub fn with_scan_count(mut self, scan_count: usize) -> Self {
        self.scan_count = scan_count;
        self
    }

    /// Builds the connection URL, including credentials, database and TLS mode.
    pub fn connection_url(&self) -> StorageResult<Url> {
        let scheme = if self.tls { "rediss" } else { "redis" };
        let mut url = Url::parse(&format!("{}://{}/{}", scheme, self.addr, self.db))
            .map_err(|e| StorageError::ConfigError(format!("Invalid Redis address {}: {}", self.addr, e)))?;

        if let Some(username) = &self.username {
            if self.password.is_none() {
                return Err(StorageError::ConfigError(
                    "Redis username requires a password".to_string(),
                ));
            }
            url.set_username(username)
                .map_err(|_| StorageError::ConfigError("Cannot set Redis username".to_string()))?;
        }
        if let Some(password) = &self.password {
            url.set_password(Some(password))
                .map_err(|_| StorageError::ConfigError("Cannot set Redis password".to_string()))?;
        }
        if self.tls && self.tls_insecure {
            url.set_fragment(Some("insecure"));
        }
        Ok(url)
    }
}

impl fmt::Debug for RedisOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisOptions")
            .field("addr", &self.addr)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("db", &self.db)
            .field("pool_size", &self.pool_size)
            .field("max_retries", &self.max_retries)
            .field("tls", &self.tls)
            .field("tls_insecure", &self.tls_insecure)
            .field("prefix", &self.prefix)
            .field("timeout", &self.timeout)
            .field("expire", &self.expire)
            .field("scan_count", &self.scan_count)
            .finish()
    }
}

/// Escapes glob metacharacters so `prefix` matches literally in `SCAN MATCH`.
pub(crate) fn escape_glob(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len());
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Walks every `SCAN` page starting at cursor 0, dropping keys already seen.
///
/// `SCAN` may return a key more than once while the keyspace is rehashing.
pub(crate) async fn scan_all<F, Fut>(mut fetch_page: F) -> StorageResult<Vec<Vec<u8>>>
where
    F: FnMut(u64) -> Fut,
    Fut: Future<Output = StorageResult<(u64, Vec<Vec<u8>>)>>,
{
    let mut seen = HashSet::new();
    let mut keys = Vec::new();
    let mut cursor = 0u64;
    loop {
        let (next_cursor, page) = fetch_page(cursor).await?;
        for key in page {
            if seen.insert(key.clone()) {
                keys.push(key);
            }
        }
        if next_cursor == 0 {
            return Ok(keys);
        }
        cursor = next_cursor;
    }
}

/// Decodes `redis_key` if it belongs to the map using `prefix`.
///
/// `SCAN MATCH prefix*` also returns keys of maps whose prefix merely starts
/// with ours; those fail to decode and are excluded.
fn owned_key<K: StorageKey>(prefix: &str, redis_key: &[u8]) -> Option<K> {
    let encoded = redis_key.strip_prefix(prefix.as_bytes())?;
    match decode_key(encoded) {
        Ok(key) => Some(key),
        Err(e) => {
            debug!(error = %e, "Ignoring foreign key under Redis prefix");
            None
        }
    }
}

fn is_retryable(err: &RedisError) -> bool {
    err.is_io_error() || err.is_connection_dropped() || err.is_connection_refusal() || err.is_timeout()
}

/// Redis byte storage.
///
/// ## Example
/// ```rust,no_run
/// use tidemap_storage::{ByteStorageExt, RedisOptions, RedisStorage, Storage};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let storage = RedisStorage::<String>::connect(
///     RedisOptions::default().with_addr("localhost:6379").with_prefix("sessions_"),
/// )
/// .await?
/// .typed::<String>();
///
/// storage.store("user:1".to_string(), "token".to_string()).await;
/// # Ok(())
/// # }
/// ```
pub struct RedisStorage<K> {
    pool: RwLock<Vec<ConnectionManager>>,
    cursor: AtomicUsize,
    options: RedisOptions,
    pattern: String,
    closed: AtomicBool,
    _key: PhantomData<fn() -> K>,
}

impl<K: StorageKey> RedisStorage<K> {
    /// Connect to the server described by `options`.
    ///
    /// ## Errors
    /// - [`StorageError::ConfigError`] if the address or credentials are malformed
    /// - [`StorageError::BackendError`] if a connection cannot be established
    /// - [`StorageError::Timeout`] if connecting exceeds the configured timeout
    pub async fn connect(options: RedisOptions) -> StorageResult<Self> {
        let url = options.connection_url()?;
        let client = Client::open(url.as_str())?;

        let pool_size = options.pool_size.max(1);
        let mut pool = Vec::with_capacity(pool_size);
        for _ in 0..pool_size {
            let manager = tokio::time::timeout(options.timeout, ConnectionManager::new(client.clone()))
                .await
                .map_err(|_| StorageError::Timeout(format!("connecting to Redis at {}", options.addr)))??;
            pool.push(manager);
        }

        info!(
            addr = %options.addr,
            db = options.db,
            pool_size,
            tls = options.tls,
            prefix = %options.prefix,
            "Connected to Redis"
        );

        Ok(Self {
            pool: RwLock::new(pool),
            cursor: AtomicUsize::new(0),
            pattern: format!("{}*", escape_glob(&options.prefix)),
            options,
            closed: AtomicBool::new(false),
            _key: PhantomData,
        })
    }

    fn connection(&self) -> StorageResult<ConnectionManager> {
        let pool = self.pool.read().unwrap_or_else(PoisonError::into_inner);
        if pool.is_empty() {
            return Err(StorageError::Closed);
        }
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % pool.len();
        Ok(pool[index].clone())
    }

    /// Runs one command with the per-call timeout, retrying connection-level failures.
    async fn execute<T, F, Fut>(&self, op: &'static str, mut call: F) -> StorageResult<T>
    where
        F: FnMut(ConnectionManager) -> Fut,
        Fut: Future<Output = RedisResult<T>>,
    {
        let mut attempt = 0u32;
        loop {
            let conn = self.connection()?;
            match tokio::time::timeout(self.options.timeout, call(conn)).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) if attempt < self.options.max_retries && is_retryable(&e) => {
                    attempt += 1;
                    debug!(op, attempt, error = %e, "Retrying Redis command");
                }
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => {
                    return Err(StorageError::Timeout(format!(
                        "Redis {} exceeded {:?}",
                        op, self.options.timeout
                    )))
                }
            }
        }
    }

    fn redis_key(&self, key: &K) -> Option<Vec<u8>> {
        match encode_key(key) {
            Ok(encoded) => {
                let mut redis_key = Vec::with_capacity(self.options.prefix.len() + encoded.len());
                redis_key.extend_from_slice(self.options.prefix.as_bytes());
                redis_key.extend_from_slice(&encoded);
                Some(redis_key)
            }
            Err(e) => {
                warn!(error = %e, "Redis key failed to encode");
                None
            }
        }
    }

    fn user_key(&self, redis_key: &[u8]) -> Option<K> {
        owned_key(&self.options.prefix, redis_key)
    }

    async fn scan_page(&self, cursor: u64) -> StorageResult<(u64, Vec<Vec<u8>>)> {
        let pattern = &self.pattern;
        let count = self.options.scan_count.max(1);
        self.execute("SCAN", |mut conn| {
            let pattern = pattern.clone();
            async move {
                redis::cmd("SCAN")
                    .cursor_arg(cursor)
                    .arg("MATCH")
                    .arg(&pattern)
                    .arg("COUNT")
                    .arg(count)
                    .query_async::<(u64, Vec<Vec<u8>>)>(&mut conn)
                    .await
            }
        })
        .await
    }

    async fn scan_keys(&self) -> StorageResult<Vec<Vec<u8>>> {
        scan_all(|cursor| self.scan_page(cursor)).await
    }

    async fn delete_raw(&self, keys: &[Vec<u8>]) -> StorageResult<()> {
        for chunk in keys.chunks(DELETE_BATCH) {
            self.execute("DEL", |mut conn| {
                let chunk = chunk.to_vec();
                async move { redis::cmd("DEL").arg(&chunk).query_async::<usize>(&mut conn).await }
            })
            .await?;
        }
        Ok(())
    }

    async fn set(&self, key: Vec<u8>, value: Vec<u8>, only_if_absent: bool) -> StorageResult<bool> {
        let expire = self.options.expire.map(|d| d.as_millis().max(1) as u64);
        let reply = self
            .execute("SET", |mut conn| {
                let mut cmd = redis::cmd("SET");
                cmd.arg(&key).arg(&value);
                if only_if_absent {
                    cmd.arg("NX");
                }
                if let Some(ms) = expire {
                    cmd.arg("PX").arg(ms);
                }
                async move { cmd.query_async::<redis::Value>(&mut conn).await }
            })
            .await?;
        Ok(!matches!(reply, redis::Value::Nil))
    }

    async fn fetch_page(&self, keys: &[Vec<u8>]) -> StorageResult<Vec<Option<Vec<u8>>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        self.execute("MGET", |mut conn| {
            let keys = keys.to_vec();
            async move {
                redis::cmd("MGET")
                    .arg(&keys)
                    .query_async::<Vec<Option<Vec<u8>>>>(&mut conn)
                    .await
            }
        })
        .await
    }

    async fn pop_any(&self) -> StorageResult<Option<(K, Vec<u8>)>> {
        let mut cursor = 0u64;
        loop {
            let (next_cursor, page) = self.scan_page(cursor).await?;
            for raw in page {
                let Some(key) = self.user_key(&raw) else {
                    continue;
                };
                let value = self
                    .execute("GETDEL", |mut conn| {
                        let raw = raw.clone();
                        async move {
                            redis::cmd("GETDEL")
                                .arg(&raw)
                                .query_async::<Option<Vec<u8>>>(&mut conn)
                                .await
                        }
                    })
                    .await?;
                if let Some(value) = value {
                    return Ok(Some((key, value)));
                }
            }
            if next_cursor == 0 {
                return Ok(None);
            }
            cursor = next_cursor;
        }
    }

    async fn range_pages(&self, visit: &mut (dyn FnMut(K, Vec<u8>) -> bool + Send)) -> StorageResult<()> {
        let mut seen = HashSet::new();
        let mut cursor = 0u64;
        loop {
            let (next_cursor, page) = self.scan_page(cursor).await?;
            let fresh: Vec<Vec<u8>> = page.into_iter().filter(|k| seen.insert(k.clone())).collect();
            let values = self.fetch_page(&fresh).await?;
            for (raw, value) in fresh.iter().zip(values) {
                let (Some(key), Some(value)) = (self.user_key(raw), value) else {
                    continue;
                };
                if !visit(key, value) {
                    return Ok(());
                }
            }
            if next_cursor == 0 {
                return Ok(());
            }
            cursor = next_cursor;
        }
    }

    fn warn_closed(&self, op: &str) -> bool {
        let closed = self.closed.load(Ordering::Acquire);
        if closed {
            warn!(op, "Redis storage used after close");
        }
        closed
    }
}

#[async_trait]
impl<K: StorageKey> Storage<K, Vec<u8>> for RedisStorage<K> {
    async fn load(&self, key: &K) -> Option<Vec<u8>> {
        if self.warn_closed("load") {
            return None;
        }
        let key = self.redis_key(key)?;
        let result = self
            .execute("GET", |mut conn| {
                let key = key.clone();
                async move { redis::cmd("GET").arg(&key).query_async::<Option<Vec<u8>>>(&mut conn).await }
            })
            .await;
        match result {
            Ok(value) => value,
            Err(e) => {
                error!(error = %e, "Redis GET failed");
                None
            }
        }
    }

    async fn store(&self, key: K, value: Vec<u8>) {
        if self.warn_closed("store") {
            return;
        }
        let Some(key) = self.redis_key(&key) else {
            return;
        };
        if let Err(e) = self.set(key, value, false).await {
            error!(error = %e, "Redis SET failed");
        }
    }

    async fn store_if_absent(&self, key: K, value: Vec<u8>) -> bool {
        if self.warn_closed("store_if_absent") {
            return false;
        }
        let Some(key) = self.redis_key(&key) else {
            return false;
        };
        match self.set(key, value, true).await {
            Ok(inserted) => inserted,
            Err(e) => {
                error!(error = %e, "Redis SET NX failed");
                false
            }
        }
    }

    async fn delete(&self, keys: &[K]) {
        if keys.is_empty() || self.warn_closed("delete") {
            return;
        }
        let raw: Vec<Vec<u8>> = keys.iter().filter_map(|k| self.redis_key(k)).collect();
        if let Err(e) = self.delete_raw(&raw).await {
            error!(error = %e, "Redis DEL failed");
        }
    }

    async fn range(&self, visit: &mut (dyn FnMut(K, Vec<u8>) -> bool + Send)) {
        if self.warn_closed("range") {
            return;
        }
        if let Err(e) = self.range_pages(visit).await {
            error!(error = %e, "Redis range scan failed");
        }
    }

    async fn next(&self) -> Option<(K, Vec<u8>)> {
        if self.warn_closed("next") {
            return None;
        }
        match self.pop_any().await {
            Ok(entry) => entry,
            Err(e) => {
                error!(error = %e, "Redis pop failed");
                None
            }
        }
    }

    async fn keys(&self) -> Vec<K> {
        if self.warn_closed("keys") {
            return Vec::new();
        }
        match self.scan_keys().await {
            Ok(raw) => raw.iter().filter_map(|k| self.user_key(k)).collect(),
            Err(e) => {
                error!(error = %e, "Redis key scan failed");
                Vec::new()
            }
        }
    }

    async fn len(&self) -> usize {
        if self.closed.load(Ordering::Acquire) {
            return 0;
        }
        match self.scan_keys().await {
            Ok(raw) => raw.iter().filter(|k| self.user_key(k).is_some()).count(),
            Err(e) => {
                error!(error = %e, "Redis key scan failed");
                0
            }
        }
    }

    async fn clear(&self) {
        if self.warn_closed("clear") {
            return;
        }
        let result = match self.scan_keys().await {
            Ok(mut raw) => {
                raw.retain(|k| self.user_key(k).is_some());
                self.delete_raw(&raw).await
            }
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            error!(error = %e, "Redis clear failed");
        }
    }

    async fn close(&self) -> StorageResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(StorageError::Closed);
        }
        self.pool.write().unwrap_or_else(PoisonError::into_inner).clear();
        info!(addr = %self.options.addr, "Closed Redis storage");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ByteStorageExt;
    use std::sync::Mutex;

    #[test]
    fn test_default_options() {
        let options = RedisOptions::default();
        assert_eq!(options.addr, "localhost:6379");
        assert_eq!(options.pool_size, 3);
        assert_eq!(options.max_retries, 3);
        assert_eq!(options.prefix, "tidemap_");
        assert_eq!(options.timeout, Duration::from_secs(5));
        assert_eq!(options.scan_count, 2048);
        assert!(options.expire.is_none());
    }

    #[test]
    fn test_connection_url_modes() {
        let url = RedisOptions::default().connection_url().unwrap();
        assert_eq!(url.as_str(), "redis://localhost:6379/0");

        let url = RedisOptions::default()
            .with_password("secret")
            .with_db(2)
            .connection_url()
            .unwrap();
        assert_eq!(url.as_str(), "redis://:secret@localhost:6379/2");

        let url = RedisOptions::default()
            .with_credentials("app", "pw")
            .with_tls(true)
            .with_insecure_tls(true)
            .connection_url()
            .unwrap();
        assert_eq!(url.scheme(), "rediss");
        assert_eq!(url.username(), "app");
        assert_eq!(url.password(), Some("pw"));
        assert_eq!(url.fragment(), Some("insecure"));
    }

    #[test]
    fn test_username_without_password_is_rejected() {
        let mut options = RedisOptions::default();
        options.username = Some("app".to_string());
        assert!(matches!(
            options.connection_url(),
            Err(StorageError::ConfigError(_))
        ));
    }

    #[test]
    fn test_debug_hides_password() {
        let rendered = format!("{:?}", RedisOptions::default().with_password("hunter2"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn test_escape_glob() {
        assert_eq!(escape_glob("tidemap_"), "tidemap_");
        assert_eq!(escape_glob("a*b?[c]\\"), "a\\*b\\?\\[c\\]\\\\");
    }

    #[tokio::test]
    async fn test_scan_all_collects_every_page_without_duplicates() {
        let keys: Vec<Vec<u8>> = (0..150u32).map(|i| format!("k{}", i).into_bytes()).collect();
        let page_size = 32usize;
        let calls = Mutex::new(Vec::new());

        let collected = scan_all(|cursor| {
            calls.lock().unwrap().push(cursor);
            let start = cursor as usize;
            let end = (start + page_size).min(keys.len());
            let mut page = keys[start..end].to_vec();
            // rehashing can repeat keys across pages
            if start > 0 {
                page.push(keys[start - 1].clone());
            }
            let next = if end == keys.len() { 0 } else { end as u64 };
            async move { Ok((next, page)) }
        })
        .await
        .unwrap();

        assert_eq!(collected.len(), 150);
        let distinct: HashSet<_> = collected.iter().collect();
        assert_eq!(distinct.len(), 150);
        assert_eq!(calls.lock().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_scan_all_propagates_errors() {
        let result = scan_all(|_| async { Err(StorageError::Timeout("SCAN".to_string())) }).await;
        assert!(matches!(result, Err(StorageError::Timeout(_))));
    }

    #[test]
    fn test_overlapping_prefix_keys_are_not_owned() {
        let own = [b"app_".as_slice(), &encode_key(&"k".to_string()).unwrap()].concat();
        let other = [b"app_x".as_slice(), &encode_key(&"k".to_string()).unwrap()].concat();
        assert_eq!(owned_key::<String>("app_", &own), Some("k".to_string()));
        assert_eq!(owned_key::<String>("app_", &other), None);
        assert_eq!(owned_key::<String>("app_x", &other), Some("k".to_string()));

        let own = [b"app_".as_slice(), &encode_key(&3u32).unwrap()].concat();
        let other = [b"app_x".as_slice(), &encode_key(&3u32).unwrap()].concat();
        assert_eq!(owned_key::<u32>("app_", &own), Some(3));
        assert_eq!(owned_key::<u32>("app_", &other), None);
    }

    fn live_options(prefix: &str) -> RedisOptions {
        RedisOptions::default()
            .with_prefix(prefix)
            .with_scan_count(16)
    }

    #[tokio::test]
    #[ignore] // Requires running Redis instance
    async fn test_redis_round_trip() {
        let storage = RedisStorage::<String>::connect(live_options("tidemap_test_rt_"))
            .await
            .unwrap()
            .typed::<String>();
        storage.clear().await;

        storage.store("a".to_string(), "1".to_string()).await;
        assert_eq!(storage.load(&"a".to_string()).await.as_deref(), Some("1"));
        assert!(!storage.store_if_absent("a".to_string(), "2".to_string()).await);
        storage.delete(&["a".to_string(), "a".to_string()]).await;
        assert_eq!(storage.load(&"a".to_string()).await, None);

        storage.close().await.unwrap();
    }

    #[tokio::test]
    #[ignore] // Requires running Redis instance
    async fn test_redis_pagination_150_keys() {
        let storage = RedisStorage::<u32>::connect(live_options("tidemap_test_page_"))
            .await
            .unwrap()
            .typed::<u32>();
        storage.clear().await;

        for i in 0..150u32 {
            storage.store(i, i).await;
        }
        let keys = storage.keys().await;
        let distinct: HashSet<_> = keys.iter().collect();
        assert_eq!(keys.len(), 150);
        assert_eq!(distinct.len(), 150);
        assert_eq!(storage.len().await, 150);

        let mut drained = 0;
        while storage.next().await.is_some() {
            drained += 1;
        }
        assert_eq!(drained, 150);
        storage.close().await.unwrap();
    }

    #[tokio::test]
    #[ignore] // Requires running Redis instance
    async fn test_redis_overlapping_prefixes_stay_apart() {
        let short = RedisStorage::<String>::connect(live_options("tidemap_ovl_"))
            .await
            .unwrap()
            .typed::<String>();
        let long = RedisStorage::<String>::connect(live_options("tidemap_ovl_x"))
            .await
            .unwrap()
            .typed::<String>();
        short.clear().await;
        long.clear().await;

        short.store("a".to_string(), "1".to_string()).await;
        long.store("k".to_string(), "2".to_string()).await;

        assert_eq!(short.len().await, short.keys().await.len());
        assert_eq!(short.len().await, 1);
        short.clear().await;
        assert_eq!(long.load(&"k".to_string()).await.as_deref(), Some("2"));

        long.clear().await;
        short.close().await.unwrap();
        long.close().await.unwrap();
    }

    #[tokio::test]
    #[ignore] // Requires running Redis instance
    async fn test_redis_expiry() {
        let storage = RedisStorage::<String>::connect(
            live_options("tidemap_test_ttl_").with_expire(Duration::from_millis(100)),
        )
        .await
        .unwrap();
        storage.store("short".to_string(), vec![1]).await;
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(storage.load(&"short".to_string()).await, None);
        storage.close().await.unwrap();
    }
}
