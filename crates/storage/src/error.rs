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

//! Error types for storage and codec operations.

use thiserror::Error;

/// Result type for storage construction and lifecycle operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type for envelope and key encoding.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while opening, operating or closing a storage backend.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Storage was already closed
    #[error("Storage is closed")]
    Closed,

    /// Encryption key has an unsupported length
    #[error("Invalid encryption key: expected 16, 24 or 32 bytes, got {0}")]
    InvalidEncryptionKey(usize),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Backend error (database, network, etc.)
    #[error("Backend error: {0}")]
    BackendError(String),

    /// Backend did not answer within the configured timeout
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Encryption or decryption failure
    #[error("Cipher error: {0}")]
    CipherError(String),

    /// Encoding or decoding failure
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// IO error
    #[error("IO error: {0}")]
    IOError(#[from] std::io::Error),
}

/// Errors raised while encoding keys and values into bytes or decoding them back.
#[derive(Error, Debug)]
pub enum CodecError {
    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Deserialization error
    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    /// Stored bytes are empty
    #[error("Empty payload")]
    EmptyPayload,
}

impl From<rmp_serde::encode::Error> for CodecError {
    fn from(err: rmp_serde::encode::Error) -> Self {
        CodecError::SerializationError(err.to_string())
    }
}

impl From<rmp_serde::decode::Error> for CodecError {
    fn from(err: rmp_serde::decode::Error) -> Self {
        CodecError::DeserializationError(err.to_string())
    }
}

impl From<rmpv::ext::Error> for CodecError {
    fn from(err: rmpv::ext::Error) -> Self {
        CodecError::DeserializationError(err.to_string())
    }
}

#[cfg(feature = "lsm-backend")]
impl From<sled::Error> for StorageError {
    fn from(err: sled::Error) -> Self {
        StorageError::BackendError(format!("LSM error: {}", err))
    }
}

#[cfg(feature = "sql-backend")]
impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        StorageError::BackendError(format!("SQL error: {}", err))
    }
}

#[cfg(feature = "redis-backend")]
impl From<redis::RedisError> for StorageError {
    fn from(err: redis::RedisError) -> Self {
        StorageError::BackendError(format!("Redis error: {}", err))
    }
}
