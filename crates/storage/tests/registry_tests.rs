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

//! Values stored as `DynValue` keep their concrete type across a close and
//! reopen of a persistent backend, once the type is registered.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tidemap_storage::{register_type, DynValue, EnvelopeAdapter, FastHashOptions, FastHashStorage, Storage, TypeRegistry};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
struct Shipment {
    id: u64,
    destination: String,
    items: Vec<String>,
    weight_kg: f64,
}

fn sample() -> Shipment {
    Shipment {
        id: 9001,
        destination: "Lisbon".to_string(),
        items: vec!["crate".to_string(), "pallet".to_string()],
        weight_kg: 42.5,
    }
}

#[cfg(feature = "lsm-backend")]
#[tokio::test]
async fn test_registered_type_survives_lsm_reopen() {
    use tidemap_storage::{ByteStorageExt, LsmOptions, LsmStorage};

    register_type::<Shipment>();
    let dir = tempfile::TempDir::new().unwrap();
    let options = LsmOptions::default().with_dir(dir.path().join("shipments"));

    let storage = LsmStorage::<String>::open(options.clone())
        .unwrap()
        .typed::<DynValue>();
    storage.store("s1".to_string(), DynValue::new(sample())).await;
    storage.close().await.unwrap();

    let storage = LsmStorage::<String>::open(options)
        .unwrap()
        .typed::<DynValue>();
    let loaded = storage.load(&"s1".to_string()).await.unwrap();
    assert_eq!(loaded.downcast_ref::<Shipment>(), Some(&sample()));
    storage.close().await.unwrap();
}

#[cfg(feature = "sql-backend")]
#[tokio::test]
async fn test_registered_type_survives_sqlite_reopen() {
    use tidemap_storage::{ByteStorageExt, SqliteOptions, SqliteStorage};

    register_type::<Shipment>();
    let dir = tempfile::TempDir::new().unwrap();
    let options = SqliteOptions::default().with_path(dir.path().join("shipments.db"));

    let storage = SqliteStorage::<String>::open(options.clone())
        .await
        .unwrap()
        .typed::<DynValue>();
    storage.store("s1".to_string(), DynValue::new(sample())).await;
    storage.close().await.unwrap();

    let storage = SqliteStorage::<String>::open(options)
        .await
        .unwrap()
        .typed::<DynValue>();
    let loaded = storage.load(&"s1".to_string()).await.unwrap();
    assert_eq!(loaded.downcast_ref::<Shipment>(), Some(&sample()));
    storage.close().await.unwrap();
}

#[tokio::test]
async fn test_unregistered_type_reads_back_untyped() {
    let writer_registry = Arc::new(TypeRegistry::new());
    let reader_registry = Arc::new(TypeRegistry::new());
    let bytes = Arc::new(FastHashStorage::<String>::new(FastHashOptions::default()));

    let writer: EnvelopeAdapter<String, DynValue, _> =
        EnvelopeAdapter::with_registry(bytes.clone(), writer_registry);
    writer.store("s1".to_string(), DynValue::new(sample())).await;

    let reader: EnvelopeAdapter<String, DynValue, _> =
        EnvelopeAdapter::with_registry(bytes, reader_registry.clone());
    let loaded = reader.load(&"s1".to_string()).await.unwrap();
    assert!(!loaded.is_typed());
    assert_eq!(loaded.into_typed::<Shipment>().unwrap(), sample());

    reader_registry.register::<Shipment>();
    let loaded = reader.load(&"s1".to_string()).await.unwrap();
    assert_eq!(loaded.downcast_ref::<Shipment>(), Some(&sample()));
}

#[tokio::test]
async fn test_static_type_decodes_without_registry_entry() {
    let bytes = Arc::new(FastHashStorage::<u32>::new(FastHashOptions::default()));
    let writer: EnvelopeAdapter<u32, Shipment, _> =
        EnvelopeAdapter::with_registry(bytes.clone(), Arc::new(TypeRegistry::new()));
    writer.store(1, sample()).await;

    let reader: EnvelopeAdapter<u32, Shipment, _> =
        EnvelopeAdapter::with_registry(bytes, Arc::new(TypeRegistry::new()));
    assert_eq!(reader.load(&1).await, Some(sample()));
}
