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

//! Typed view over a byte engine.
//!
//! ## Purpose
//! [`EnvelopeAdapter`] turns any [`ByteStorage`] into a typed [`Storage`] by
//! encoding values with [`crate::codec::encode_value`] on write and decoding
//! them on read. Keys are passed through untouched; byte engines encode them
//! themselves.
//!
//! ## Failure Handling
//! - Values that fail to encode are not written (logged at `warn`)
//! - Entries that fail to decode read as absent from `load` and are skipped by `range`
//! - `next` discards undecodable entries it pops and keeps looking

use crate::codec::{decode_value, encode_value};
use crate::registry::TypeRegistry;
use crate::{ByteStorage, Storage, StorageKey, StorageResult, StorageValue};
use async_trait::async_trait;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::warn;

/// Typed [`Storage`] backed by a byte engine and serialization envelopes.
pub struct EnvelopeAdapter<K, V, B> {
    inner: B,
    registry: Arc<TypeRegistry>,
    _types: PhantomData<fn() -> (K, V)>,
}

impl<K, V, B> EnvelopeAdapter<K, V, B>
where
    K: StorageKey,
    V: StorageValue,
    B: ByteStorage<K>,
{
    /// Wraps `inner`, resolving type tags through the global registry.
    pub fn new(inner: B) -> Self {
        Self::with_registry(inner, TypeRegistry::global())
    }

    /// Wraps `inner` with a dedicated registry.
    pub fn with_registry(inner: B, registry: Arc<TypeRegistry>) -> Self {
        Self {
            inner,
            registry,
            _types: PhantomData,
        }
    }

    /// Underlying byte engine.
    pub fn inner(&self) -> &B {
        &self.inner
    }

    /// Registry used to resolve type tags.
    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    fn encode(&self, value: &V) -> Option<Vec<u8>> {
        match encode_value(value, &self.registry) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                warn!(error = %e, "Dropping write of value that failed to encode");
                None
            }
        }
    }

    fn decode(&self, bytes: &[u8]) -> Option<V> {
        match decode_value(bytes, &self.registry) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(error = %e, "Stored value failed to decode");
                None
            }
        }
    }
}

#[async_trait]
impl<K, V, B> Storage<K, V> for EnvelopeAdapter<K, V, B>
where
    K: StorageKey,
    V: StorageValue,
    B: ByteStorage<K>,
{
    async fn load(&self, key: &K) -> Option<V> {
        let bytes = self.inner.load(key).await?;
        self.decode(&bytes)
    }

    async fn store(&self, key: K, value: V) {
        if let Some(bytes) = self.encode(&value) {
            self.inner.store(key, bytes).await;
        }
    }

    async fn store_if_absent(&self, key: K, value: V) -> bool {
        match self.encode(&value) {
            Some(bytes) => self.inner.store_if_absent(key, bytes).await,
            None => false,
        }
    }

    async fn delete(&self, keys: &[K]) {
        self.inner.delete(keys).await;
    }

    async fn range(&self, visit: &mut (dyn FnMut(K, V) -> bool + Send)) {
        let registry = &self.registry;
        let mut decode_and_visit = |key: K, bytes: Vec<u8>| match decode_value::<V>(&bytes, registry) {
            Ok(value) => visit(key, value),
            Err(e) => {
                warn!(error = %e, "Skipping entry that failed to decode");
                true
            }
        };
        self.inner.range(&mut decode_and_visit).await;
    }

    async fn next(&self) -> Option<(K, V)> {
        loop {
            let (key, bytes) = self.inner.next().await?;
            if let Some(value) = self.decode(&bytes) {
                return Some((key, value));
            }
        }
    }

    async fn keys(&self) -> Vec<K> {
        self.inner.keys().await
    }

    async fn len(&self) -> usize {
        self.inner.len().await
    }

    async fn clear(&self) {
        self.inner.clear().await;
    }

    async fn close(&self) -> StorageResult<()> {
        self.inner.close().await
    }
}
