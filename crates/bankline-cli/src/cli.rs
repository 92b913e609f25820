//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Bankline - Link bank accounts and keep a reconciled ledger
#[derive(Parser)]
#[command(name = "bankline")]
#[command(about = "Bank-link lifecycle and transaction reconciliation", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Database path
    #[arg(long, default_value = "bankline.db", global = true)]
    pub db: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable database encryption (not recommended for production)
    ///
    /// By default, the database is encrypted using SQLCipher.
    /// Set BANKLINE_DB_KEY environment variable with your passphrase.
    /// Use --no-encrypt only for development or testing.
    #[arg(long, global = true)]
    pub no_encrypt: bool,

    /// Local user the command acts for
    #[arg(short, long, default_value = "default", global = true)]
    pub user: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the database
    Init,

    /// Start linking a bank: prints the hosted session URL
    Link,

    /// Show linked banks
    Connections {
        /// Ask the provider instead of showing what is stored locally
        #[arg(long)]
        remote: bool,
    },

    /// Pull transactions from every linked bank into the ledger
    Sync,

    /// Forget a linked bank and drop the transactions it brought in
    Disconnect {
        /// Provider item id of the connection
        item_id: String,
    },

    /// Ledger commands
    Transactions {
        #[command(subcommand)]
        action: Option<TransactionsAction>,
    },

    /// Start the web server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Disable authentication (for local development only)
        #[arg(long)]
        no_auth: bool,

        /// Allowed CORS origin (repeatable)
        #[arg(long = "allow-origin")]
        allowed_origins: Vec<String>,
    },
}

#[derive(Subcommand)]
pub enum TransactionsAction {
    /// List ledger entries (most recent last)
    List {
        /// Number of entries to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Add a manual entry
    Add {
        /// Date (YYYY-MM-DD)
        #[arg(long)]
        date: String,

        /// Description
        #[arg(short, long)]
        description: String,

        /// Signed amount (negative = expense)
        #[arg(short, long, allow_hyphen_values = true)]
        amount: f64,

        /// Category (groceries, dining, transport, ...)
        #[arg(short, long)]
        category: Option<String>,

        /// Account label
        #[arg(long)]
        account: Option<String>,

        /// Mark as planned instead of completed
        #[arg(long)]
        planned: bool,
    },
}
