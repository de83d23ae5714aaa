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

//! MessagePack codecs for keys and enveloped values.
//!
//! ## Envelope Format
//! Values written by byte engines are encoded as a MessagePack map:
//!
//! - `"data"`: the value itself
//! - `"type"`: optional concrete type name, present only when known
//!
//! Decoding is lenient: bytes that are not an envelope (no `"data"` key) are
//! decoded directly as the target type, and a tag that is missing or not
//! registered falls back to plain data decoding.

use crate::registry::{DynValue, TypeRegistry};
use crate::{CodecError, CodecResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::any::{Any, TypeId};

const DATA_FIELD: &str = "data";
const TYPE_FIELD: &str = "type";

/// Self-describing wrapper persisted by byte engines.
#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    data: rmpv::Value,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    type_name: Option<String>,
}

/// Encodes a key as MessagePack bytes.
pub fn encode_key<K: Serialize>(key: &K) -> CodecResult<Vec<u8>> {
    Ok(rmp_serde::to_vec(key)?)
}

/// Decodes a key previously produced by [`encode_key`].
///
/// The whole input must be one key; trailing bytes are an error.
pub fn decode_key<K: DeserializeOwned>(bytes: &[u8]) -> CodecResult<K> {
    if bytes.is_empty() {
        return Err(CodecError::EmptyPayload);
    }
    let mut cursor = std::io::Cursor::new(bytes);
    let key = rmp_serde::from_read(&mut cursor)?;
    if cursor.position() as usize != bytes.len() {
        return Err(CodecError::DeserializationError(format!(
            "{} trailing bytes after key",
            bytes.len() - cursor.position() as usize
        )));
    }
    Ok(key)
}

/// Wraps `value` in an envelope and encodes it.
///
/// [`DynValue`] inputs are tagged with their concrete type name and that type
/// is registered in `registry`; untyped ones keep the tag they were read with.
/// Other values are tagged with their static type.
pub fn encode_value<V>(value: &V, registry: &TypeRegistry) -> CodecResult<Vec<u8>>
where
    V: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    let envelope = match (value as &dyn Any).downcast_ref::<DynValue>() {
        Some(dynamic) => {
            dynamic.register_in(registry);
            Envelope {
                data: dynamic.to_wire()?,
                type_name: dynamic.type_name().map(str::to_string),
            }
        }
        None => {
            registry.register::<V>();
            Envelope {
                data: rmpv::ext::to_value(value)
                    .map_err(|e| CodecError::SerializationError(e.to_string()))?,
                type_name: Some(TypeRegistry::type_name_of::<V>().to_string()),
            }
        }
    };
    Ok(rmp_serde::to_vec_named(&envelope)?)
}

/// Decodes envelope bytes back into `V`.
///
/// When `V` is [`DynValue`], the `"type"` tag is resolved through `registry`.
pub fn decode_value<V>(bytes: &[u8], registry: &TypeRegistry) -> CodecResult<V>
where
    V: DeserializeOwned + 'static,
{
    if bytes.is_empty() {
        return Err(CodecError::EmptyPayload);
    }
    let raw: rmpv::Value = rmp_serde::from_slice(bytes)?;
    let (data, type_name) = split_envelope(raw);

    if TypeId::of::<V>() == TypeId::of::<DynValue>() {
        let dynamic = match type_name {
            Some(name) => registry.decode(&name, data),
            None => DynValue::untyped(data),
        };
        let boxed: Box<dyn Any> = Box::new(dynamic);
        return boxed
            .downcast::<V>()
            .map(|value| *value)
            .map_err(|_| CodecError::DeserializationError("dynamic value downcast".to_string()));
    }

    Ok(rmpv::ext::from_value(data)?)
}

/// Splits a decoded envelope into its data and optional type tag.
///
/// Values without a `"data"` entry are returned whole with no tag.
fn split_envelope(raw: rmpv::Value) -> (rmpv::Value, Option<String>) {
    let rmpv::Value::Map(entries) = raw else {
        return (raw, None);
    };
    if !entries.iter().any(|(k, _)| k.as_str() == Some(DATA_FIELD)) {
        return (rmpv::Value::Map(entries), None);
    }

    let mut data = rmpv::Value::Nil;
    let mut type_name = None;
    for (key, value) in entries {
        match key.as_str() {
            Some(DATA_FIELD) => data = value,
            Some(TYPE_FIELD) => type_name = value.as_str().map(str::to_string),
            _ => {}
        }
    }
    (data, type_name)
}
