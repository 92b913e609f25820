//! Core command implementations and shared utilities
//!
//! This module contains:
//! - `open_db` - Shared utility to open the database
//! - `open_sync` - Wire the bank sync service to the provider from the environment
//! - `cmd_init` - Initialize the database

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use bankline_core::{BankSync, Database};
use tracing::debug;

/// Open database with encryption by default, or unencrypted if --no-encrypt
pub fn open_db(db_path: &Path, no_encrypt: bool) -> Result<Database> {
    let path_str = db_path
        .to_str()
        .context("Database path must be valid UTF-8")?;
    if no_encrypt {
        Database::new_unencrypted(path_str).context("Failed to open database (unencrypted)")
    } else {
        Database::new(path_str).context("Failed to open database")
    }
}

/// Build the sync service for `db` from provider settings in the environment
pub fn open_sync(db: &Database) -> Result<BankSync> {
    let sync = BankSync::from_env(Arc::new(db.clone())).context(
        "Bank provider not configured (set BRIDGE_CLIENT_ID and BRIDGE_CLIENT_SECRET)",
    )?;
    debug!(base_url = %sync.config().base_url, "Bank provider configured");
    Ok(sync)
}

pub fn cmd_init(db_path: &Path, no_encrypt: bool) -> Result<()> {
    println!("🔧 Initializing database at {}...", db_path.display());

    open_db(db_path, no_encrypt)?;

    if no_encrypt {
        println!("   ⚠️  Encryption: DISABLED (--no-encrypt)");
    } else {
        println!("   🔒 Encryption: ENABLED");
    }

    println!("✅ Database initialized successfully!");
    println!();
    println!("Next steps:");
    println!("  1. Set BRIDGE_CLIENT_ID and BRIDGE_CLIENT_SECRET");
    println!("  2. Link a bank: bankline link --user <id>");
    println!("  3. Pull transactions: bankline sync --user <id>");

    Ok(())
}
