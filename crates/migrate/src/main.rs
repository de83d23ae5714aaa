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

//! tidemap-migrate
//!
//! ## Purpose
//! Copies every entry from one storage engine into another, optionally
//! filtering keys and rewriting a key prefix. Values travel as
//! [`tidemap::DynValue`], so their type tags survive the copy.
//!
//! ## Exit Status
//! Non-zero only when the configuration cannot be loaded or an engine cannot
//! be opened. Per-entry failures are reported in the summary.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tidemap::{create_storage_from_config, DynValue, Map};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;
mod migration;

use config::Loaded;

#[derive(Parser)]
#[command(name = "tidemap-migrate")]
#[command(about = "Copy entries between tidemap storage engines", long_about = None)]
struct Cli {
    /// Configuration file (TOML); created with defaults when missing
    #[arg(short, long, default_value = "migrate.toml")]
    config: PathBuf,

    /// Show what would be migrated without writing anything
    #[arg(long)]
    dry_run: bool,

    /// Read every key back from the target after writing it
    #[arg(long)]
    verify: bool,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let config = match config::load_or_create(&cli.config)? {
        Loaded::Config(config) => config,
        Loaded::Created => {
            println!("Created default config file: {}", cli.config.display());
            println!("Please review and modify the configuration before running again.");
            return Ok(());
        }
    };

    if cli.dry_run {
        println!("DRY RUN MODE - No changes will be made");
    }

    let source: Map<String, DynValue> = Map::from_shared(
        true,
        create_storage_from_config(config.source.to_storage_config()?)
            .await
            .context("failed to open source")?,
    );
    info!(source = %config.source.describe(), "Reading");

    let target = if cli.dry_run {
        None
    } else {
        let storage = create_storage_from_config(config.target.to_storage_config()?)
            .await
            .context("failed to open target")?;
        info!(target = %config.target.describe(), "Writing");
        Some(Map::from_shared(true, storage))
    };

    let stats =
        migration::run_migration(&source, target.as_ref(), &config.migration, cli.verify).await;

    if let Some(target) = &target {
        if let Err(e) = target.close().await {
            tracing::warn!(error = %e, "Failed to close target");
        }
    }
    if let Err(e) = source.close().await {
        tracing::warn!(error = %e, "Failed to close source");
    }

    println!();
    print!("{stats}");
    if cli.dry_run {
        println!("\nDry run completed. Run without --dry-run to perform the migration.");
    } else {
        println!("\nMigration completed.");
    }
    Ok(())
}
