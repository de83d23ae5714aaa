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

//! Runtime type registry and type-erased values.
//!
//! ## Purpose
//! A map whose value type is [`DynValue`] can hold values of many concrete
//! types at once. When such a value is written through the envelope adapter,
//! its concrete type name travels with it. On read, the name is looked up in a
//! [`TypeRegistry`]; a hit restores the concrete type, a miss yields the raw
//! decoded MessagePack data. The raw value keeps the type name, so writing it
//! back out preserves the tag for readers that do know the type.
//!
//! ## Examples
//! ```rust
//! use serde::{Deserialize, Serialize};
//! use tidemap_storage::{register_type, DynValue};
//!
//! #[derive(Serialize, Deserialize, PartialEq, Debug)]
//! struct Point {
//!     x: i32,
//!     y: i32,
//! }
//!
//! register_type::<Point>();
//! let value = DynValue::new(Point { x: 1, y: 2 });
//! assert_eq!(value.downcast_ref::<Point>(), Some(&Point { x: 1, y: 2 }));
//! ```

use crate::{CodecError, CodecResult};
use once_cell::sync::Lazy;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

/// Rebuilds a concrete value from envelope data.
pub type DecodeFn = fn(rmpv::Value) -> CodecResult<DynValue>;

static GLOBAL_REGISTRY: Lazy<Arc<TypeRegistry>> = Lazy::new(|| Arc::new(TypeRegistry::new()));

/// Registers `T` in the process-wide registry.
///
/// Registering the same type again is a no-op. Registration is also done
/// implicitly whenever a value is written, so explicit registration is only
/// needed before reading values written by an earlier process.
pub fn register_type<T: Registrable>() {
    TypeRegistry::global().register::<T>();
}

/// Types that can be stored inside a [`DynValue`] and restored from the registry.
pub trait Registrable: Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> Registrable for T where T: Serialize + DeserializeOwned + Send + Sync + 'static {}

/// Thread-safe mapping from type name to decoder.
pub struct TypeRegistry {
    types: RwLock<HashMap<String, DecodeFn>>,
}

impl TypeRegistry {
    /// Creates an empty registry, independent of the global one.
    pub fn new() -> Self {
        Self {
            types: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the process-wide registry shared by adapters that were not
    /// given one explicitly.
    pub fn global() -> Arc<TypeRegistry> {
        GLOBAL_REGISTRY.clone()
    }

    /// Name under which `T` is registered and tagged in envelopes.
    pub fn type_name_of<T: ?Sized>() -> &'static str {
        std::any::type_name::<T>()
    }

    /// Registers `T`. Idempotent.
    pub fn register<T: Registrable>(&self) {
        let name = Self::type_name_of::<T>();
        if self.is_registered(name) {
            return;
        }
        self.types
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(name.to_string())
            .or_insert(decode_as::<T>);
    }

    /// Registers the type of `sample`; the sample itself is not stored.
    pub fn register_value<T: Registrable>(&self, _sample: &T) {
        self.register::<T>();
    }

    /// Returns `true` if a type with this name has been registered.
    pub fn is_registered(&self, name: &str) -> bool {
        self.types
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Number of registered types.
    pub fn len(&self) -> usize {
        self.types.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Returns `true` if nothing has been registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Decodes `data` as the type registered under `name`.
    ///
    /// Unknown names and data that does not fit the registered type both fall
    /// back to an untyped [`DynValue`].
    pub fn decode(&self, name: &str, data: rmpv::Value) -> DynValue {
        let decoder = self
            .types
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .copied();
        match decoder {
            Some(decode) => match decode(data.clone()) {
                Ok(value) => value,
                Err(e) => {
                    tracing::debug!(type_name = name, error = %e, "Registered type rejected data, keeping raw value");
                    DynValue::tagged(data, name)
                }
            },
            None => DynValue::tagged(data, name),
        }
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("types", &self.len())
            .finish()
    }
}

fn decode_as<T: Registrable>(data: rmpv::Value) -> CodecResult<DynValue> {
    let value: T = rmpv::ext::from_value(data)?;
    Ok(DynValue::new(value))
}

/// Object-safe view of a concrete registrable value.
trait ErasedValue: Send + Sync {
    fn type_name(&self) -> &'static str;
    fn to_wire(&self) -> CodecResult<rmpv::Value>;
    fn register(&self, registry: &TypeRegistry);
    fn as_any(&self) -> &dyn Any;
}

impl<T: Registrable> ErasedValue for T {
    fn type_name(&self) -> &'static str {
        TypeRegistry::type_name_of::<T>()
    }

    fn to_wire(&self) -> CodecResult<rmpv::Value> {
        rmpv::ext::to_value(self).map_err(|e| CodecError::SerializationError(e.to_string()))
    }

    fn register(&self, registry: &TypeRegistry) {
        registry.register::<T>();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Clone)]
enum Repr {
    Typed(Arc<dyn ErasedValue>),
    Untyped {
        data: rmpv::Value,
        type_name: Option<Arc<str>>,
    },
}

/// A value whose concrete type is only known at runtime.
///
/// Either wraps a concrete registrable value, or holds raw MessagePack data
/// when the stored type name was not registered in the reading process.
#[derive(Clone)]
pub struct DynValue {
    repr: Repr,
}

impl DynValue {
    /// Wraps a concrete value.
    pub fn new<T: Registrable>(value: T) -> Self {
        Self {
            repr: Repr::Typed(Arc::new(value)),
        }
    }

    /// Wraps raw decoded data with no known concrete type.
    pub fn untyped(value: rmpv::Value) -> Self {
        Self {
            repr: Repr::Untyped {
                data: value,
                type_name: None,
            },
        }
    }

    /// Wraps raw data stored under a type name this process cannot decode.
    pub fn tagged(value: rmpv::Value, type_name: &str) -> Self {
        Self {
            repr: Repr::Untyped {
                data: value,
                type_name: Some(Arc::from(type_name)),
            },
        }
    }

    /// Type name of the wrapped value.
    ///
    /// Untyped data reports the name it was stored under, if it had one.
    pub fn type_name(&self) -> Option<&str> {
        match &self.repr {
            Repr::Typed(value) => Some(value.type_name()),
            Repr::Untyped { type_name, .. } => type_name.as_deref(),
        }
    }

    /// Returns `true` if the concrete type is known.
    pub fn is_typed(&self) -> bool {
        matches!(self.repr, Repr::Typed(_))
    }

    /// Borrows the wrapped value as `T` if that is its concrete type.
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        match &self.repr {
            Repr::Typed(value) => value.as_any().downcast_ref::<T>(),
            Repr::Untyped { .. } => None,
        }
    }

    /// Borrows the raw data when the concrete type is unknown.
    pub fn as_untyped(&self) -> Option<&rmpv::Value> {
        match &self.repr {
            Repr::Typed(_) => None,
            Repr::Untyped { data, .. } => Some(data),
        }
    }

    /// Converts into `T`, decoding raw data when needed.
    pub fn into_typed<T: Registrable + Clone>(self) -> CodecResult<T> {
        if let Some(value) = self.downcast_ref::<T>() {
            return Ok(value.clone());
        }
        Ok(rmpv::ext::from_value(self.to_wire()?)?)
    }

    /// MessagePack representation of the wrapped value.
    pub fn to_wire(&self) -> CodecResult<rmpv::Value> {
        match &self.repr {
            Repr::Typed(value) => value.to_wire(),
            Repr::Untyped { data, .. } => Ok(data.clone()),
        }
    }

    /// Adds the wrapped value's type to `registry`; untyped data is ignored.
    pub fn register_in(&self, registry: &TypeRegistry) {
        if let Repr::Typed(value) = &self.repr {
            value.register(registry);
        }
    }
}

impl fmt::Debug for DynValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.repr {
            Repr::Typed(value) => write!(f, "DynValue<{}>", value.type_name()),
            Repr::Untyped {
                data,
                type_name: Some(name),
            } => write!(f, "DynValue<{}?>({})", name, data),
            Repr::Untyped { data, .. } => write!(f, "DynValue({})", data),
        }
    }
}

impl Serialize for DynValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let wire = self.to_wire().map_err(serde::ser::Error::custom)?;
        wire.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for DynValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        rmpv::Value::deserialize(deserializer).map(DynValue::untyped)
    }
}
