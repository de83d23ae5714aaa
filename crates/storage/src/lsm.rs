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

//! Embedded LSM storage backed by sled.
//!
//! ## Purpose
//! Persists byte values in an embedded log-structured store, either on disk or
//! in a temporary location that is removed when the storage is dropped.
//!
//! ## Features
//! - **Persistent**: Data survives process restarts when `temporary` is off
//! - **Atomic**: `next` uses `pop_min`, `store_if_absent` uses compare-and-swap,
//!   multi-key `delete` runs in one transaction
//! - **Counted**: entry count is seeded by one scan at open, then tracked in an atomic
//! - **Encrypted**: optional AES-GCM encryption of values with rotating data keys
//! - **Maintained**: a background task flushes dirty pages and rotates data keys
//!
//! ## Limitations
//! - The entry count drifts if another process writes the same files
//! - Keys are stored in plaintext; only values are encrypted

use crate::codec::{decode_key, encode_key};
use crate::crypto::{ValueCipher, KEYRING_TREE};
use crate::{Storage, StorageError, StorageKey, StorageResult};
use async_trait::async_trait;
use sled::transaction::ConflictableTransactionError;
use std::fmt;
use std::marker::PhantomData;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Default page cache size (512 MiB).
pub const DEFAULT_CACHE_CAPACITY: u64 = 512 * 1024 * 1024;
/// Default interval between background flushes.
pub const DEFAULT_FLUSH_EVERY: Duration = Duration::from_millis(500);
/// Default data key lifetime.
pub const DEFAULT_KEY_ROTATION: Duration = Duration::from_secs(10 * 24 * 60 * 60);
/// Default interval of the maintenance task.
pub const DEFAULT_MAINTENANCE_INTERVAL: Duration = Duration::from_secs(10);

/// Options for [`LsmStorage`].
#[derive(Clone)]
pub struct LsmOptions {
    /// Directory holding the database files
    pub dir: PathBuf,
    /// Remove all files when the storage is dropped
    pub temporary: bool,
    /// Compress pages on disk
    pub compression: bool,
    /// Page cache size in bytes
    pub cache_capacity: u64,
    /// Interval between background flushes
    pub flush_every: Duration,
    /// Flush after every write instead of on an interval
    pub sync_writes: bool,
    /// Master key for value encryption (16, 24 or 32 bytes)
    pub encryption_key: Option<Vec<u8>>,
    /// Lifetime of a data key before rotation
    pub key_rotation: Duration,
    /// Interval of the maintenance task
    pub maintenance_interval: Duration,
}

impl Default for LsmOptions {
    fn default() -> Self {
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        Self {
            dir: std::env::temp_dir().join(format!("tidemap-lsm-{}", stamp)),
            temporary: true,
            compression: false,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            flush_every: DEFAULT_FLUSH_EVERY,
            sync_writes: false,
            encryption_key: None,
            key_rotation: DEFAULT_KEY_ROTATION,
            maintenance_interval: DEFAULT_MAINTENANCE_INTERVAL,
        }
    }
}

impl LsmOptions {
    /// Persist data under `dir` and keep it after the storage is closed.
    pub fn with_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = dir.into();
        self.temporary = false;
        self
    }

    /// Toggle temporary (removed on drop) storage.
    pub fn with_temporary(mut self, temporary: bool) -> Self {
        self.temporary = temporary;
        self
    }

    /// Toggle page compression.
    pub fn with_compression(mut self, compression: bool) -> Self {
        self.compression = compression;
        self
    }

    /// Set the page cache size in bytes.
    pub fn with_cache_capacity(mut self, bytes: u64) -> Self {
        self.cache_capacity = bytes;
        self
    }

    /// Set the background flush interval.
    pub fn with_flush_every(mut self, interval: Duration) -> Self {
        self.flush_every = interval;
        self
    }

    /// Flush after each write.
    pub fn with_sync_writes(mut self, sync_writes: bool) -> Self {
        self.sync_writes = sync_writes;
        self
    }

    /// Encrypt values with `key` (16, 24 or 32 bytes).
    pub fn with_encryption_key(mut self, key: impl Into<Vec<u8>>) -> Self {
        self.encryption_key = Some(key.into());
        self
    }

    /// Set the data key lifetime.
    pub fn with_key_rotation(mut self, interval: Duration) -> Self {
        self.key_rotation = interval;
        self
    }

    /// Set the maintenance task interval.
    pub fn with_maintenance_interval(mut self, interval: Duration) -> Self {
        self.maintenance_interval = interval;
        self
    }
}

impl fmt::Debug for LsmOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LsmOptions")
            .field("dir", &self.dir)
            .field("temporary", &self.temporary)
            .field("compression", &self.compression)
            .field("cache_capacity", &self.cache_capacity)
            .field("flush_every", &self.flush_every)
            .field("sync_writes", &self.sync_writes)
            .field("encrypted", &self.encryption_key.is_some())
            .field("key_rotation", &self.key_rotation)
            .field("maintenance_interval", &self.maintenance_interval)
            .finish()
    }
}

/// Open database handles, dropped together on close to release the file lock.
struct Engine {
    db: sled::Db,
    cipher: Option<ValueCipher>,
}

impl Engine {
    fn seal(&self, value: Vec<u8>) -> StorageResult<Vec<u8>> {
        match &self.cipher {
            Some(cipher) => cipher.encrypt(&value),
            None => Ok(value),
        }
    }

    fn unseal(&self, value: &[u8]) -> StorageResult<Vec<u8>> {
        match &self.cipher {
            Some(cipher) => cipher.decrypt(value),
            None => Ok(value.to_vec()),
        }
    }
}

struct Shared {
    engine: RwLock<Option<Engine>>,
    count: AtomicI64,
    sync_writes: bool,
}

impl Shared {
    fn engine(&self) -> RwLockReadGuard<'_, Option<Engine>> {
        self.engine.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Callers hold the engine read guard, so `clear` cannot interleave.
    fn adjust_count(&self, delta: i64) {
        self.count.fetch_add(delta, Ordering::AcqRel);
    }

    fn maintain(&self) {
        let engine = self.engine();
        let Some(engine) = engine.as_ref() else {
            return;
        };
        if let Err(e) = engine.db.flush() {
            error!(error = %e, "LSM maintenance flush failed");
        }
        if let Some(cipher) = &engine.cipher {
            if let Err(e) = cipher.rotate_if_stale() {
                error!(error = %e, "LSM data key rotation failed");
            }
        }
        match engine.db.size_on_disk() {
            Ok(bytes) => debug!(bytes, "LSM maintenance pass complete"),
            Err(e) => warn!(error = %e, "LSM size query failed"),
        }
    }
}

/// Embedded LSM byte storage.
///
/// ## Example
/// ```rust,no_run
/// use tidemap_storage::{ByteStorageExt, LsmOptions, LsmStorage, Storage};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let storage = LsmStorage::<String>::open(LsmOptions::default().with_dir("/tmp/tidemap"))?
///     .typed::<u64>();
///
/// storage.store("visits".to_string(), 1).await;
/// storage.close().await?;
/// # Ok(())
/// # }
/// ```
pub struct LsmStorage<K> {
    shared: Arc<Shared>,
    maintenance: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
    _key: PhantomData<fn() -> K>,
}

impl<K: StorageKey> LsmStorage<K> {
    /// Open (or create) the store described by `options`.
    ///
    /// Must be called within a tokio runtime; the maintenance task is spawned on it.
    ///
    /// ## Errors
    /// - [`StorageError::InvalidEncryptionKey`] if the key is not 16, 24 or 32 bytes
    /// - [`StorageError::BackendError`] if the files cannot be opened or locked
    /// - [`StorageError::CipherError`] if the key cannot unwrap existing data keys
    pub fn open(options: LsmOptions) -> StorageResult<Self> {
        if let Some(key) = &options.encryption_key {
            if !matches!(key.len(), 16 | 24 | 32) {
                return Err(StorageError::InvalidEncryptionKey(key.len()));
            }
        }

        let flush_every = if options.sync_writes {
            None
        } else {
            Some(options.flush_every.as_millis().max(1) as u64)
        };
        let config = sled::Config::new()
            .path(&options.dir)
            .temporary(options.temporary)
            .use_compression(options.compression)
            .cache_capacity(options.cache_capacity)
            .flush_every_ms(flush_every)
            .mode(sled::Mode::HighThroughput);
        let db = config.open()?;

        let cipher = match &options.encryption_key {
            Some(key) => Some(ValueCipher::open(
                key,
                db.open_tree(KEYRING_TREE)?,
                options.key_rotation,
            )?),
            None => None,
        };

        // Seeded before the handle is shared; afterwards only deltas apply.
        let entries = db.len() as i64;

        info!(
            dir = %options.dir.display(),
            temporary = options.temporary,
            encrypted = cipher.is_some(),
            entries,
            "Opened LSM storage"
        );

        let shared = Arc::new(Shared {
            engine: RwLock::new(Some(Engine { db, cipher })),
            count: AtomicI64::new(entries),
            sync_writes: options.sync_writes,
        });

        let maintenance = spawn_maintenance(shared.clone(), options.maintenance_interval);

        Ok(Self {
            shared,
            maintenance: Mutex::new(Some(maintenance)),
            closed: AtomicBool::new(false),
            _key: PhantomData,
        })
    }

    fn encode_key(key: &K) -> Option<Vec<u8>> {
        match encode_key(key) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                warn!(error = %e, "LSM key failed to encode");
                None
            }
        }
    }

    fn decode_entry(engine: &Engine, key: &[u8], value: &[u8]) -> Option<(K, Vec<u8>)> {
        let key = match decode_key(key) {
            Ok(key) => key,
            Err(e) => {
                warn!(error = %e, "Skipping LSM entry with undecodable key");
                return None;
            }
        };
        match engine.unseal(value) {
            Ok(value) => Some((key, value)),
            Err(e) => {
                warn!(error = %e, "Skipping LSM entry that failed to decrypt");
                None
            }
        }
    }

    fn sync(&self, engine: &Engine) {
        if self.shared.sync_writes {
            if let Err(e) = engine.db.flush() {
                error!(error = %e, "LSM sync flush failed");
            }
        }
    }

    fn warn_closed(&self, op: &str) -> bool {
        let closed = self.closed.load(Ordering::Acquire);
        if closed {
            warn!(op, "LSM storage used after close");
        }
        closed
    }
}

fn spawn_maintenance(shared: Arc<Shared>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every.max(Duration::from_millis(10)));
        interval.tick().await;
        loop {
            interval.tick().await;
            shared.maintain();
        }
    })
}

#[async_trait]
impl<K: StorageKey> Storage<K, Vec<u8>> for LsmStorage<K> {
    async fn load(&self, key: &K) -> Option<Vec<u8>> {
        if self.warn_closed("load") {
            return None;
        }
        let key = Self::encode_key(key)?;
        let guard = self.shared.engine();
        let engine = guard.as_ref()?;
        match engine.db.get(key) {
            Ok(Some(value)) => match engine.unseal(&value) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!(error = %e, "LSM value failed to decrypt");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                error!(error = %e, "LSM get failed");
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
        let guard = self.shared.engine();
        let Some(engine) = guard.as_ref() else {
            return;
        };
        let value = match engine.seal(value) {
            Ok(value) => value,
            Err(e) => {
                error!(error = %e, "Dropping LSM write that failed to encrypt");
                return;
            }
        };
        match engine.db.insert(key, value) {
            Ok(None) => self.shared.adjust_count(1),
            Ok(Some(_)) => {}
            Err(e) => error!(error = %e, "LSM insert failed"),
        }
        self.sync(engine);
    }

    async fn store_if_absent(&self, key: K, value: Vec<u8>) -> bool {
        if self.warn_closed("store_if_absent") {
            return false;
        }
        let Some(key) = Self::encode_key(&key) else {
            return false;
        };
        let guard = self.shared.engine();
        let Some(engine) = guard.as_ref() else {
            return false;
        };
        let value = match engine.seal(value) {
            Ok(value) => value,
            Err(e) => {
                error!(error = %e, "Dropping LSM write that failed to encrypt");
                return false;
            }
        };
        let inserted = match engine.db.compare_and_swap(key, None as Option<&[u8]>, Some(value)) {
            Ok(Ok(())) => {
                self.shared.adjust_count(1);
                true
            }
            Ok(Err(_)) => false,
            Err(e) => {
                error!(error = %e, "LSM compare-and-swap failed");
                false
            }
        };
        self.sync(engine);
        inserted
    }

    async fn delete(&self, keys: &[K]) {
        if keys.is_empty() || self.warn_closed("delete") {
            return;
        }
        let encoded: Vec<Vec<u8>> = keys.iter().filter_map(Self::encode_key).collect();
        let guard = self.shared.engine();
        let Some(engine) = guard.as_ref() else {
            return;
        };
        let result = engine.db.transaction(|tx| {
            let mut removed = 0i64;
            for key in &encoded {
                if tx.remove(key.as_slice())?.is_some() {
                    removed += 1;
                }
            }
            Ok::<_, ConflictableTransactionError<()>>(removed)
        });
        match result {
            Ok(removed) => self.shared.adjust_count(-removed),
            Err(e) => error!(error = ?e, "LSM delete transaction failed"),
        }
        self.sync(engine);
    }

    async fn range(&self, visit: &mut (dyn FnMut(K, Vec<u8>) -> bool + Send)) {
        if self.warn_closed("range") {
            return;
        }
        let guard = self.shared.engine();
        let Some(engine) = guard.as_ref() else {
            return;
        };
        for item in engine.db.iter() {
            let (key, value) = match item {
                Ok(entry) => entry,
                Err(e) => {
                    error!(error = %e, "LSM iteration failed");
                    return;
                }
            };
            if let Some((key, value)) = Self::decode_entry(engine, &key, &value) {
                if !visit(key, value) {
                    return;
                }
            }
        }
    }

    async fn next(&self) -> Option<(K, Vec<u8>)> {
        if self.warn_closed("next") {
            return None;
        }
        let guard = self.shared.engine();
        let engine = guard.as_ref()?;
        loop {
            let (key, value) = match engine.db.pop_min() {
                Ok(Some(entry)) => entry,
                Ok(None) => return None,
                Err(e) => {
                    error!(error = %e, "LSM pop failed");
                    return None;
                }
            };
            self.shared.adjust_count(-1);
            self.sync(engine);
            if let Some(entry) = Self::decode_entry(engine, &key, &value) {
                return Some(entry);
            }
        }
    }

    async fn keys(&self) -> Vec<K> {
        if self.warn_closed("keys") {
            return Vec::new();
        }
        let guard = self.shared.engine();
        let Some(engine) = guard.as_ref() else {
            return Vec::new();
        };
        let mut keys = Vec::new();
        for key in engine.db.iter().keys() {
            match key {
                Ok(key) => match decode_key(&key) {
                    Ok(key) => keys.push(key),
                    Err(e) => warn!(error = %e, "Skipping undecodable LSM key"),
                },
                Err(e) => {
                    error!(error = %e, "LSM key iteration failed");
                    break;
                }
            }
        }
        keys
    }

    async fn len(&self) -> usize {
        if self.closed.load(Ordering::Acquire) {
            return 0;
        }
        let guard = self.shared.engine();
        match guard.as_ref() {
            Some(_) => self.shared.count.load(Ordering::Acquire).max(0) as usize,
            None => 0,
        }
    }

    async fn clear(&self) {
        if self.warn_closed("clear") {
            return;
        }
        // Exclusive, so no writer adjusts the count between the wipe and the reset.
        let guard = self.shared.engine.write().unwrap_or_else(PoisonError::into_inner);
        let Some(engine) = guard.as_ref() else {
            return;
        };
        match engine.db.clear() {
            Ok(()) => self.shared.count.store(0, Ordering::Release),
            Err(e) => {
                error!(error = %e, "LSM clear failed");
                self.shared.count.store(engine.db.len() as i64, Ordering::Release);
            }
        }
        self.sync(engine);
    }

    async fn close(&self) -> StorageResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(StorageError::Closed);
        }
        if let Some(handle) = self
            .maintenance
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
        let engine = self
            .shared
            .engine
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(engine) = engine {
            engine.db.flush()?;
            drop(engine);
        }
        info!("Closed LSM storage");
        Ok(())
    }
}

impl<K> Drop for LsmStorage<K> {
    fn drop(&mut self) {
        if let Some(handle) = self
            .maintenance
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ByteStorageExt;
    use tempfile::TempDir;

    fn temporary() -> LsmStorage<String> {
        LsmStorage::open(LsmOptions::default()).unwrap()
    }

    #[tokio::test]
    async fn test_store_load_and_count() {
        let storage = temporary();
        storage.store("a".to_string(), b"1".to_vec()).await;
        storage.store("b".to_string(), b"2".to_vec()).await;
        storage.store("a".to_string(), b"3".to_vec()).await;

        assert_eq!(storage.load(&"a".to_string()).await, Some(b"3".to_vec()));
        assert_eq!(storage.len().await, 2);

        storage.delete(&["a".to_string(), "zzz".to_string()]).await;
        assert_eq!(storage.len().await, 1);
        storage.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_count_tracks_after_seeding() {
        let storage = temporary();
        assert_eq!(storage.len().await, 0);
        storage.store("x".to_string(), vec![1]).await;
        assert!(storage.store_if_absent("y".to_string(), vec![2]).await);
        assert!(!storage.store_if_absent("y".to_string(), vec![3]).await);
        assert_eq!(storage.len().await, 2);

        assert!(storage.next().await.is_some());
        assert_eq!(storage.len().await, 1);
        storage.clear().await;
        assert_eq!(storage.len().await, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_count_matches_keys_under_concurrent_writers() {
        for _ in 0..5 {
            let storage = Arc::new(temporary());
            let mut handles = Vec::new();
            for writer in 0..6 {
                let storage = storage.clone();
                handles.push(tokio::spawn(async move {
                    for i in 0..300 {
                        storage.store(format!("{writer}-{i}"), vec![1]).await;
                    }
                }));
            }
            let reader = storage.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..50 {
                    reader.len().await;
                    tokio::task::yield_now().await;
                }
            }));
            for handle in handles {
                handle.await.unwrap();
            }

            assert_eq!(storage.keys().await.len(), 1800);
            assert_eq!(storage.len().await, 1800);

            let clearer = storage.clone();
            let writer = storage.clone();
            let (_, _) = tokio::join!(
                tokio::spawn(async move { clearer.clear().await }),
                tokio::spawn(async move {
                    for i in 0..100 {
                        writer.store(format!("late-{i}"), vec![2]).await;
                    }
                })
            );
            assert_eq!(storage.len().await, storage.keys().await.len());
            storage.close().await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_count_seeded_from_existing_files() {
        let dir = TempDir::new().unwrap();
        let options = LsmOptions::default().with_dir(dir.path().join("db"));

        let storage = LsmStorage::<String>::open(options.clone()).unwrap();
        for i in 0..10 {
            storage.store(i.to_string(), vec![i as u8]).await;
        }
        storage.close().await.unwrap();

        let storage = LsmStorage::<String>::open(options).unwrap();
        storage.store("10".to_string(), vec![10]).await;
        assert_eq!(storage.len().await, 11);
        storage.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_next_drains_including_empty_key() {
        let storage = temporary();
        storage.store(String::new(), vec![0]).await;
        storage.store("k".to_string(), vec![1]).await;

        let mut drained = Vec::new();
        while let Some((k, _)) = storage.next().await {
            drained.push(k);
        }
        drained.sort();
        assert_eq!(drained, vec![String::new(), "k".to_string()]);
    }

    #[tokio::test]
    async fn test_reopen_persisted_directory() {
        let dir = TempDir::new().unwrap();
        let options = LsmOptions::default().with_dir(dir.path().join("db"));

        let storage = LsmStorage::<u32>::open(options.clone()).unwrap().typed::<String>();
        storage.store(1, "one".to_string()).await;
        storage.close().await.unwrap();

        let storage = LsmStorage::<u32>::open(options).unwrap().typed::<String>();
        assert_eq!(storage.load(&1).await.as_deref(), Some("one"));
        assert_eq!(storage.len().await, 1);
        storage.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_encrypted_values_are_not_plaintext() {
        let dir = TempDir::new().unwrap();
        let options = LsmOptions::default()
            .with_dir(dir.path().join("db"))
            .with_encryption_key(vec![9u8; 32]);

        let storage = LsmStorage::<String>::open(options.clone()).unwrap();
        storage.store("secret".to_string(), b"plaintext".to_vec()).await;
        let raw = {
            let guard = storage.shared.engine();
            let engine = guard.as_ref().unwrap();
            engine
                .db
                .get(encode_key(&"secret".to_string()).unwrap())
                .unwrap()
                .unwrap()
        };
        assert_ne!(&raw[..], &b"plaintext"[..]);
        storage.close().await.unwrap();

        let storage = LsmStorage::<String>::open(options).unwrap();
        assert_eq!(
            storage.load(&"secret".to_string()).await,
            Some(b"plaintext".to_vec())
        );
        storage.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_invalid_encryption_key_fails_open() {
        let result = LsmStorage::<String>::open(LsmOptions::default().with_encryption_key(vec![0u8; 10]));
        assert!(matches!(result, Err(StorageError::InvalidEncryptionKey(10))));
    }

    #[tokio::test]
    async fn test_compressed_sync_writes() {
        let storage = LsmStorage::<u8>::open(
            LsmOptions::default()
                .with_compression(true)
                .with_sync_writes(true),
        )
        .unwrap();
        storage.store(1, vec![7; 4096]).await;
        assert_eq!(storage.load(&1).await, Some(vec![7; 4096]));
    }

    #[tokio::test]
    async fn test_close_twice_and_use_after_close() {
        let storage = temporary();
        storage.store("k".to_string(), vec![1]).await;
        storage.close().await.unwrap();
        assert!(matches!(storage.close().await, Err(StorageError::Closed)));
        assert_eq!(storage.load(&"k".to_string()).await, None);
        assert_eq!(storage.len().await, 0);
        assert!(storage.keys().await.is_empty());
    }
}
