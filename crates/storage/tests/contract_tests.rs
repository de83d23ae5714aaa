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

//! Contract tests run against every storage backend.
//!
//! Each backend is exercised through `Arc<dyn Storage<i32, String>>`, the same
//! shape the facade consumes. The Redis run needs a live server and is ignored
//! by default.

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;
use tidemap_storage::{
    create_storage_from_config, BackendType, FastHashOptions, Storage, StorageConfig, StorageError,
};

type Shared = Arc<dyn Storage<i32, String>>;

async fn round_trip_and_overwrite(storage: &Shared) {
    storage.store(1, "one".to_string()).await;
    assert_eq!(storage.load(&1).await.as_deref(), Some("one"));
    storage.store(1, "uno".to_string()).await;
    assert_eq!(storage.load(&1).await.as_deref(), Some("uno"));
    assert_eq!(storage.load(&404).await, None);
}

async fn delete_is_idempotent(storage: &Shared) {
    storage.store(10, "ten".to_string()).await;
    storage.store(11, "eleven".to_string()).await;
    storage.delete(&[10]).await;
    storage.delete(&[10, 999]).await;
    storage.delete(&[]).await;
    assert_eq!(storage.load(&10).await, None);
    assert_eq!(storage.load(&11).await.as_deref(), Some("eleven"));
}

async fn store_if_absent_keeps_first(storage: &Shared) {
    assert!(storage.store_if_absent(20, "first".to_string()).await);
    assert!(!storage.store_if_absent(20, "second".to_string()).await);
    assert_eq!(storage.load(&20).await.as_deref(), Some("first"));
}

async fn len_matches_loadable_keys(storage: &Shared) {
    storage.clear().await;
    for i in 0..25 {
        storage.store(i, format!("v{}", i)).await;
    }
    storage.delete(&[3, 4, 5]).await;
    storage.store(7, "seven".to_string()).await;

    let keys = storage.keys().await;
    let mut loadable = 0;
    for key in &keys {
        if storage.load(key).await.is_some() {
            loadable += 1;
        }
    }
    assert_eq!(keys.len(), 22);
    assert_eq!(loadable, 22);
    assert_eq!(storage.len().await, 22);

    storage.clear().await;
    assert_eq!(storage.len().await, 0);
    assert!(storage.is_empty().await);
    assert!(storage.keys().await.is_empty());
}

async fn next_drains_each_key_once(storage: &Shared) {
    storage.clear().await;
    assert_eq!(storage.next().await, None);

    // Zero is a real key here and must come back like any other.
    for i in 0..12 {
        storage.store(i, i.to_string()).await;
    }
    let mut drained = HashSet::new();
    while let Some((key, value)) = storage.next().await {
        assert_eq!(value, key.to_string());
        assert!(drained.insert(key), "key {} returned twice", key);
    }
    assert_eq!(drained, (0..12).collect::<HashSet<_>>());
    assert_eq!(storage.len().await, 0);
}

async fn range_visits_and_stops_early(storage: &Shared) {
    storage.clear().await;
    storage.store(1, "one".to_string()).await;
    storage.store(2, "two".to_string()).await;
    storage.store(3, "three".to_string()).await;

    let mut seen = HashMap::new();
    storage
        .range(&mut |k, v| {
            seen.insert(k, v);
            true
        })
        .await;
    assert_eq!(seen.len(), 3);
    assert_eq!(seen.get(&3).map(String::as_str), Some("three"));

    let mut visits = 0;
    storage
        .range(&mut |_, _| {
            visits += 1;
            false
        })
        .await;
    assert_eq!(visits, 1);
}

async fn close_once(storage: &Shared) {
    storage.close().await.unwrap();
    assert!(matches!(storage.close().await, Err(StorageError::Closed)));
    assert_eq!(storage.load(&1).await, None);
}

async fn run_contract(storage: Shared) {
    round_trip_and_overwrite(&storage).await;
    delete_is_idempotent(&storage).await;
    store_if_absent_keeps_first(&storage).await;
    len_matches_loadable_keys(&storage).await;
    next_drains_each_key_once(&storage).await;
    range_visits_and_stops_early(&storage).await;
    close_once(&storage).await;
}

async fn build(backend: BackendType) -> Shared {
    create_storage_from_config::<i32, String>(StorageConfig::new(backend))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_in_memory_contract() {
    run_contract(build(BackendType::InMemory).await).await;
}

#[tokio::test]
async fn test_fast_hash_contract() {
    run_contract(build(BackendType::FastHash(FastHashOptions::default())).await).await;
}

#[cfg(feature = "lsm-backend")]
#[tokio::test]
async fn test_lsm_contract() {
    use tidemap_storage::LsmOptions;
    run_contract(build(BackendType::Lsm(LsmOptions::default())).await).await;
}

#[cfg(feature = "lsm-backend")]
#[tokio::test]
async fn test_encrypted_lsm_contract() {
    use tidemap_storage::LsmOptions;
    let dir = tempfile::TempDir::new().unwrap();
    let options = LsmOptions::default()
        .with_dir(dir.path().join("db"))
        .with_compression(true)
        .with_encryption_key(b"0123456789abcdef01234567".to_vec());
    run_contract(build(BackendType::Lsm(options)).await).await;
}

#[cfg(feature = "sql-backend")]
#[tokio::test]
async fn test_sqlite_memory_contract() {
    use tidemap_storage::SqliteOptions;
    run_contract(build(BackendType::Sqlite(SqliteOptions::default())).await).await;
}

#[cfg(feature = "sql-backend")]
#[tokio::test]
async fn test_sqlite_file_contract() {
    use tidemap_storage::SqliteOptions;
    let dir = tempfile::TempDir::new().unwrap();
    let options = SqliteOptions::default().with_path(dir.path().join("contract.db"));
    run_contract(build(BackendType::Sqlite(options)).await).await;
}

#[cfg(feature = "redis-backend")]
#[tokio::test]
#[ignore] // Requires running Redis instance
async fn test_redis_contract() {
    use tidemap_storage::RedisOptions;
    let options = RedisOptions::default()
        .with_prefix("tidemap_contract_")
        .with_scan_count(8);
    let storage = build(BackendType::Redis(options)).await;
    storage.clear().await;
    run_contract(storage).await;
}

#[tokio::test]
async fn test_concurrent_store_if_absent_single_winner() {
    let storage = build(BackendType::FastHash(FastHashOptions::default())).await;
    let mut handles = Vec::new();
    for writer in 0..16 {
        let storage = storage.clone();
        handles.push(tokio::spawn(async move {
            storage.store_if_absent(1, format!("writer-{}", writer)).await
        }));
    }
    let mut winners = 0;
    for handle in handles {
        if handle.await.unwrap() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
}
