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

//! Copy loop between two maps.

use crate::config::MigrationConfig;
use std::fmt;
use std::time::Duration;
use tidemap::{DynValue, Map};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Pause inserted after every `batch_size` entries.
const BATCH_PAUSE: Duration = Duration::from_millis(10);

/// Errors shown in the summary; the rest are only counted.
const MAX_REPORTED_ERRORS: usize = 10;

/// Outcome of one run.
#[derive(Debug, Default)]
pub struct MigrationStats {
    /// Entries read from the source
    pub total: usize,
    /// Entries written (or that would be, in a dry run)
    pub migrated: usize,
    /// Entries filtered out by the key pattern
    pub skipped: usize,
    /// Per-entry failure messages
    pub errors: Vec<String>,
    /// Wall time of the run
    pub elapsed: Duration,
    /// The deadline stopped the run early
    pub timed_out: bool,
}

impl MigrationStats {
    /// Entries read per second.
    pub fn rate(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.total as f64 / secs
        } else {
            0.0
        }
    }
}

impl fmt::Display for MigrationStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Migration Statistics")?;
        writeln!(f, "====================")?;
        writeln!(f, "Total Keys:     {}", self.total)?;
        writeln!(f, "Migrated:       {}", self.migrated)?;
        writeln!(f, "Skipped:        {}", self.skipped)?;
        writeln!(f, "Errors:         {}", self.errors.len())?;
        writeln!(f, "Duration:       {:?}", self.elapsed)?;
        if self.total > 0 {
            writeln!(f, "Rate:           {:.1} keys/sec", self.rate())?;
        }
        if self.timed_out {
            writeln!(f, "Stopped early: timeout reached")?;
        }
        if !self.errors.is_empty() {
            writeln!(f)?;
            writeln!(f, "Errors:")?;
            for (i, error) in self.errors.iter().take(MAX_REPORTED_ERRORS).enumerate() {
                writeln!(f, "  {}. {}", i + 1, error)?;
            }
            if self.errors.len() > MAX_REPORTED_ERRORS {
                writeln!(f, "  ... and {} more errors", self.errors.len() - MAX_REPORTED_ERRORS)?;
            }
        }
        Ok(())
    }
}

/// `*` and the empty pattern match everything; otherwise the key must be equal.
pub fn matches_pattern(key: &str, pattern: &str) -> bool {
    pattern.is_empty() || pattern == "*" || key == pattern
}

/// Replaces `source_prefix` with `target_prefix`.
///
/// Keys equal to the prefix, keys without it, and settings with either prefix
/// empty are returned unchanged.
pub fn transform_key(key: &str, source_prefix: &str, target_prefix: &str) -> String {
    if source_prefix.is_empty() || target_prefix.is_empty() {
        return key.to_string();
    }
    match key.strip_prefix(source_prefix) {
        Some(rest) if !rest.is_empty() => format!("{target_prefix}{rest}"),
        _ => key.to_string(),
    }
}

/// Copies every matching entry of `source` into `target`.
///
/// With `target == None` the run is dry: entries are read, filtered and
/// renamed, but nothing is written. The source is snapshotted with `range`
/// before any write so that the two maps may share an engine.
pub async fn run_migration(
    source: &Map<String, DynValue>,
    target: Option<&Map<String, DynValue>>,
    settings: &MigrationConfig,
    verify: bool,
) -> MigrationStats {
    let started = Instant::now();
    let deadline = settings.timeout().map(|timeout| started + timeout);
    let mut stats = MigrationStats::default();

    let mut entries = Vec::new();
    source
        .range(|key, value| {
            entries.push((key, value));
            true
        })
        .await;
    debug!(entries = entries.len(), "Source snapshot taken");

    let mut in_batch = 0usize;
    for (key, value) in entries {
        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            warn!(processed = stats.total, "Migration stopped by timeout");
            stats.timed_out = true;
            break;
        }

        stats.total += 1;
        if settings.log_interval > 0 && stats.total % settings.log_interval == 0 {
            info!(processed = stats.total, "Progress");
        }

        if !matches_pattern(&key, &settings.key_pattern) {
            stats.skipped += 1;
            debug!(key = %key, "Skipped by pattern");
            continue;
        }

        let new_key = transform_key(&key, &settings.source_prefix, &settings.target_prefix);
        let type_name = value.type_name().unwrap_or("untyped").to_string();

        let Some(target) = target else {
            info!(from = %key, to = %new_key, value_type = %type_name, "Would migrate");
            stats.migrated += 1;
            continue;
        };

        target.store(new_key.clone(), value).await;
        if verify && !target.has(&new_key).await {
            let message = format!("key {key} not readable from target after write");
            warn!("{}", message);
            stats.errors.push(message);
        } else {
            stats.migrated += 1;
            debug!(from = %key, to = %new_key, value_type = %type_name, "Migrated");
        }

        in_batch += 1;
        if settings.batch_size > 0 && in_batch >= settings.batch_size {
            tokio::time::sleep(BATCH_PAUSE).await;
            in_batch = 0;
        }
    }

    stats.elapsed = started.elapsed();
    stats
}
