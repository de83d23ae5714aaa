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

//! Migration configuration file.
//!
//! The file is TOML with three tables: `[source]` and `[target]` pick a storage
//! engine through their `backend` key, `[migration]` tunes the copy loop.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tidemap_storage::{BackendType, LsmOptions, RedisOptions, SqliteOptions, StorageConfig};

/// Written to the config path when it does not exist yet.
pub const DEFAULT_CONFIG: &str = r#"# tidemap-migrate configuration
#
# backend is one of: lsm, redis, sqlite

[source]
backend = "redis"
addr = "localhost:6379"
db = 0
pool_size = 3
max_retries = 3
tls = false
prefix = "tidemap_legacy_"
timeout_secs = 5

[target]
backend = "redis"
addr = "localhost:6379"
# separate database so source and target never collide
db = 1
pool_size = 3
max_retries = 3
tls = false
prefix = "tidemap_"
timeout_secs = 5

[migration]
batch_size = 1000
log_interval = 100
timeout_secs = 1800
# "*" or empty copies everything, anything else must equal the key
key_pattern = "*"
source_prefix = "tidemap_legacy_"
target_prefix = "tidemap_"
"#;

/// Whole configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct MigrateConfig {
    /// Engine entries are read from
    pub source: EndpointConfig,
    /// Engine entries are written to
    pub target: EndpointConfig,
    /// Copy loop settings
    #[serde(default)]
    pub migration: MigrationConfig,
}

/// One storage engine.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum EndpointConfig {
    /// sled database directory
    Lsm {
        /// Database directory
        dir: PathBuf,
        /// Engine compression
        #[serde(default)]
        compression: bool,
        /// 16, 24 or 32 byte master key
        #[serde(default)]
        encryption_key: Option<String>,
        /// Flush after every write
        #[serde(default)]
        sync_writes: bool,
    },
    /// Redis server
    Redis {
        /// host:port
        #[serde(default = "default_redis_addr")]
        addr: String,
        #[serde(default)]
        /// ACL user name, requires a password
        username: Option<String>,
        #[serde(default)]
        /// Password
        password: Option<String>,
        /// Database index
        #[serde(default)]
        db: i64,
        /// Multiplexed connections
        #[serde(default)]
        pool_size: Option<usize>,
        /// Retries on I/O errors
        #[serde(default)]
        max_retries: Option<u32>,
        /// rediss://
        #[serde(default)]
        tls: bool,
        /// Key namespace
        #[serde(default)]
        prefix: Option<String>,
        /// Per-command timeout
        #[serde(default)]
        timeout_secs: Option<u64>,
        /// Expiry for written keys, 0 or absent keeps them forever
        #[serde(default)]
        expire_secs: Option<u64>,
    },
    /// SQLite database file
    Sqlite {
        /// Database file
        path: PathBuf,
        /// Table name
        #[serde(default)]
        table: Option<String>,
    },
}

fn default_redis_addr() -> String {
    "localhost:6379".to_string()
}

impl EndpointConfig {
    /// Converts to a storage configuration.
    pub fn to_storage_config(&self) -> Result<StorageConfig> {
        let backend = match self {
            Self::Lsm {
                dir,
                compression,
                encryption_key,
                sync_writes,
            } => {
                let mut options = LsmOptions::default()
                    .with_dir(dir)
                    .with_compression(*compression)
                    .with_sync_writes(*sync_writes);
                if let Some(key) = encryption_key {
                    options = options.with_encryption_key(key.as_bytes().to_vec());
                }
                BackendType::Lsm(options)
            }
            Self::Redis {
                addr,
                username,
                password,
                db,
                pool_size,
                max_retries,
                tls,
                prefix,
                timeout_secs,
                expire_secs,
            } => {
                let mut options = RedisOptions::default()
                    .with_addr(addr.clone())
                    .with_db(*db)
                    .with_tls(*tls);
                match (username, password) {
                    (Some(user), Some(pass)) => options = options.with_credentials(user, pass),
                    (None, Some(pass)) => options = options.with_password(pass),
                    (Some(_), None) => bail!("redis username given without a password"),
                    (None, None) => {}
                }
                if let Some(size) = pool_size.filter(|size| *size > 0) {
                    options = options.with_pool_size(size);
                }
                if let Some(retries) = max_retries {
                    options = options.with_max_retries(*retries);
                }
                if let Some(prefix) = prefix {
                    options = options.with_prefix(prefix.clone());
                }
                if let Some(secs) = timeout_secs.filter(|secs| *secs > 0) {
                    options = options.with_timeout(Duration::from_secs(secs));
                }
                if let Some(secs) = expire_secs.filter(|secs| *secs > 0) {
                    options = options.with_expire(Duration::from_secs(secs));
                }
                BackendType::Redis(options)
            }
            Self::Sqlite { path, table } => {
                let mut options = SqliteOptions::default().with_path(path);
                if let Some(table) = table {
                    options = options.with_table(table.clone());
                }
                BackendType::Sqlite(options)
            }
        };
        Ok(StorageConfig::new(backend))
    }

    /// Short human readable location.
    pub fn describe(&self) -> String {
        match self {
            Self::Lsm { dir, .. } => format!("lsm {}", dir.display()),
            Self::Redis { addr, db, prefix, .. } => format!(
                "redis {addr} (db {db}, prefix {})",
                prefix.as_deref().unwrap_or("default")
            ),
            Self::Sqlite { path, .. } => format!("sqlite {}", path.display()),
        }
    }
}

/// Copy loop settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    /// Entries written between short pauses
    pub batch_size: usize,
    /// Progress is logged every this many entries
    pub log_interval: usize,
    /// Overall deadline, 0 disables it
    pub timeout_secs: u64,
    /// `*` or empty matches all keys, anything else must equal the key
    pub key_pattern: String,
    /// Prefix replaced by `target_prefix`
    pub source_prefix: String,
    /// Replacement for `source_prefix`
    pub target_prefix: String,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            log_interval: 100,
            timeout_secs: 30 * 60,
            key_pattern: "*".to_string(),
            source_prefix: String::new(),
            target_prefix: String::new(),
        }
    }
}

impl MigrationConfig {
    /// Deadline for the whole run.
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

/// Result of [`load_or_create`].
#[derive(Debug)]
pub enum Loaded {
    /// Parsed configuration
    Config(Box<MigrateConfig>),
    /// The file did not exist and a default one was written
    Created,
}

/// Reads `path`, or writes [`DEFAULT_CONFIG`] there when it is missing.
pub fn load_or_create(path: &Path) -> Result<Loaded> {
    if !path.exists() {
        std::fs::write(path, DEFAULT_CONFIG)
            .with_context(|| format!("failed to create default config {}", path.display()))?;
        return Ok(Loaded::Created);
    }
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let config = parse(&text).with_context(|| format!("invalid config {}", path.display()))?;
    Ok(Loaded::Config(Box::new(config)))
}

/// Parses configuration text.
pub fn parse(text: &str) -> Result<MigrateConfig> {
    Ok(toml::from_str(text)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_parses() {
        let config = parse(DEFAULT_CONFIG).unwrap();
        assert_eq!(config.migration.batch_size, 1000);
        assert_eq!(config.migration.log_interval, 100);
        assert_eq!(config.migration.timeout(), Some(Duration::from_secs(1800)));
        assert_eq!(config.migration.key_pattern, "*");

        match config.target.to_storage_config().unwrap().backend {
            BackendType::Redis(options) => {
                assert_eq!(options.db, 1);
                assert_eq!(options.prefix, "tidemap_");
            }
            other => panic!("unexpected backend {other:?}"),
        }
    }

    #[test]
    fn test_missing_migration_table_uses_defaults() {
        let config = parse(
            r#"
            [source]
            backend = "sqlite"
            path = "/tmp/a.db"

            [target]
            backend = "lsm"
            dir = "/tmp/b"
            compression = true
            "#,
        )
        .unwrap();
        assert_eq!(config.migration.batch_size, 1000);
        assert!(config.migration.source_prefix.is_empty());
        assert!(matches!(
            config.source.to_storage_config().unwrap().backend,
            BackendType::Sqlite(_)
        ));
        match config.target.to_storage_config().unwrap().backend {
            BackendType::Lsm(options) => {
                assert!(options.compression);
                assert!(!options.temporary);
            }
            other => panic!("unexpected backend {other:?}"),
        }
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let err = parse(
            r#"
            [source]
            backend = "etcd"
            [target]
            backend = "sqlite"
            path = "x.db"
            "#,
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_username_without_password_rejected() {
        let endpoint = EndpointConfig::Redis {
            addr: default_redis_addr(),
            username: Some("app".to_string()),
            password: None,
            db: 0,
            pool_size: None,
            max_retries: None,
            tls: false,
            prefix: None,
            timeout_secs: None,
            expire_secs: None,
        };
        assert!(endpoint.to_storage_config().is_err());
    }

    #[test]
    fn test_load_or_create_writes_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("migrate.toml");

        assert!(matches!(load_or_create(&path).unwrap(), Loaded::Created));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), DEFAULT_CONFIG);
        assert!(matches!(load_or_create(&path).unwrap(), Loaded::Config(_)));
    }
}
