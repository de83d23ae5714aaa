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

//! Overwrite-policy and pop behaviour of `Map` over every local engine.

#![cfg(all(feature = "lsm-backend", feature = "sql-backend"))]

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tidemap::{
    register_type, ByteStorageExt, DynValue, FastHashOptions, FastHashStorage, InMemoryStorage,
    LsmOptions, LsmStorage, Map, SqliteOptions, SqliteStorage, Storage, StorageError,
};

type Engine = Arc<dyn Storage<String, u64>>;

fn engines() -> Vec<(&'static str, Engine)> {
    let memory: Engine = Arc::new(InMemoryStorage::<String, u64>::new());
    let fast_hash: Engine =
        Arc::new(FastHashStorage::<String>::new(FastHashOptions::default()).typed::<u64>());
    let lsm: Engine =
        Arc::new(LsmStorage::<String>::open(LsmOptions::default()).unwrap().typed::<u64>());
    vec![("memory", memory), ("fast-hash", fast_hash), ("lsm", lsm)]
}

async fn sqlite_engine() -> Engine {
    Arc::new(SqliteStorage::<String>::open(SqliteOptions::default().in_memory()).await.unwrap().typed::<u64>())
}

async fn check_policies(name: &str, storage: Engine) {
    let deny = Map::from_shared(false, storage.clone());
    let allow = Map::from_shared(true, storage);

    deny.store("a".to_string(), 1).await;
    deny.store("a".to_string(), 2).await;
    assert_eq!(deny.load(&"a".to_string()).await, Some(1), "{name}: deny");

    allow.store("a".to_string(), 3).await;
    assert_eq!(allow.load(&"a".to_string()).await, Some(3), "{name}: allow");

    allow.store("b".to_string(), 4).await;
    assert_eq!(allow.pop(&"b".to_string()).await, Some(4), "{name}: pop");
    assert!(!allow.has(&"b".to_string()).await, "{name}: pop removes");
    assert_eq!(allow.pop(&"b".to_string()).await, None, "{name}: pop twice");

    assert_eq!(allow.next().await, Some(("a".to_string(), 3)), "{name}: next");
    assert_eq!(allow.next().await, None, "{name}: next on empty");

    allow.close().await.unwrap();
    assert!(matches!(deny.close().await, Err(StorageError::Closed)), "{name}: close twice");
}

#[tokio::test]
async fn test_policies_on_local_engines() {
    for (name, storage) in engines() {
        check_policies(name, storage).await;
    }
    check_policies("sqlite", sqlite_engine().await).await;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Reading {
    sensor: String,
    celsius: f64,
}

#[tokio::test]
async fn test_heterogeneous_values_in_one_map() {
    register_type::<Reading>();
    let map: Map<String, DynValue> = Map::with_storage(
        true,
        FastHashStorage::<String>::new(FastHashOptions::default()).typed::<DynValue>(),
    );

    let reading = Reading {
        sensor: "north".to_string(),
        celsius: 21.5,
    };
    map.store("reading".to_string(), DynValue::new(reading.clone())).await;
    map.store("label".to_string(), DynValue::new("greenhouse".to_string())).await;

    let loaded = map.load(&"reading".to_string()).await.unwrap();
    assert_eq!(loaded.downcast_ref::<Reading>(), Some(&reading));

    let label = map.load(&"label".to_string()).await.unwrap();
    assert_eq!(label.downcast_ref::<String>().map(String::as_str), Some("greenhouse"));
    assert_eq!(map.len().await, 2);
}
