//! Bankline CLI - Bank linking and transaction reconciliation
//!
//! Usage:
//!   bankline init                   Initialize database
//!   bankline link --user alice      Start linking a bank
//!   bankline sync --user alice      Pull transactions from linked banks
//!   bankline serve --port 3000      Start web server

mod cli;
mod commands;

#[cfg(test)]
mod tests;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    match cli.command {
        Commands::Init => commands::cmd_init(&cli.db, cli.no_encrypt),
        Commands::Link => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            let sync = commands::open_sync(&db)?;
            commands::cmd_link(&sync, &cli.user).await
        }
        Commands::Connections { remote } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            if remote {
                let sync = commands::open_sync(&db)?;
                commands::cmd_connections_remote(&sync, &cli.user).await
            } else {
                commands::cmd_connections(&db, &cli.user)
            }
        }
        Commands::Sync => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            let sync = commands::open_sync(&db)?;
            commands::cmd_sync(&sync, &cli.user).await
        }
        Commands::Disconnect { item_id } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            let sync = commands::open_sync(&db)?;
            commands::cmd_disconnect(&sync, &cli.user, &item_id).await
        }
        Commands::Transactions { action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            match action {
                None => commands::cmd_transactions_list(&db, &cli.user, 20),
                Some(TransactionsAction::List { limit }) => {
                    commands::cmd_transactions_list(&db, &cli.user, limit)
                }
                Some(TransactionsAction::Add {
                    date,
                    description,
                    amount,
                    category,
                    account,
                    planned,
                }) => commands::cmd_transactions_add(
                    &db,
                    &cli.user,
                    &commands::NewEntry {
                        date: &date,
                        description: &description,
                        amount,
                        category: category.as_deref(),
                        account: account.as_deref(),
                        planned,
                    },
                )
                .map(|_| ()),
            }
        }
        Commands::Serve {
            port,
            host,
            no_auth,
            allowed_origins,
        } => {
            commands::cmd_serve(
                &cli.db,
                &host,
                port,
                no_auth,
                cli.no_encrypt,
                allowed_origins,
            )
            .await
        }
    }
}
