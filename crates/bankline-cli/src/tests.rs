//! CLI command tests
//!
//! This module contains all tests for the CLI commands.

use std::sync::Arc;

use bankline_core::test_utils::{transaction_json, MockBridgeServer};
use bankline_core::{BankSync, Database, TransactionStatus};
use clap::Parser;

use crate::cli::{Cli, Commands, TransactionsAction};
use crate::commands::{self, format_amount, truncate, NewEntry};

const USER: &str = "cli-user";

fn setup_test_db() -> Database {
    Database::in_memory().unwrap()
}

async fn seeded_sync(db: &Database) -> (MockBridgeServer, BankSync) {
    let server = MockBridgeServer::start().await;
    server.add_user(USER);
    server.add_item(USER, "900", "Boursorama");
    server.add_account("900", "acc-1", "Compte courant");
    server.add_transaction("acc-1", transaction_json("t1", "acc-1", -4.2, "2025-04-01"));
    server.add_transaction("acc-1", transaction_json("t2", "acc-1", 950.0, "2025-04-02"));

    let sync = BankSync::new(
        Arc::new(server.client()),
        Arc::new(db.clone()),
        server.config(),
    );
    (server, sync)
}

fn entry<'a>(date: &'a str, description: &'a str, amount: f64) -> NewEntry<'a> {
    NewEntry {
        date,
        description,
        amount,
        category: None,
        account: None,
        planned: false,
    }
}

// ========== Argument Parsing Tests ==========

#[test]
fn test_parse_global_flags() {
    let cli = Cli::try_parse_from([
        "bankline",
        "sync",
        "--user",
        "alice",
        "--db",
        "/tmp/x.db",
        "--no-encrypt",
    ])
    .unwrap();
    assert_eq!(cli.user, "alice");
    assert_eq!(cli.db.to_str(), Some("/tmp/x.db"));
    assert!(cli.no_encrypt);
    assert!(matches!(cli.command, Commands::Sync));
}

#[test]
fn test_parse_defaults() {
    let cli = Cli::try_parse_from(["bankline", "connections"]).unwrap();
    assert_eq!(cli.user, "default");
    assert_eq!(cli.db.to_str(), Some("bankline.db"));
    assert!(matches!(cli.command, Commands::Connections { remote: false }));
}

#[test]
fn test_parse_transactions_add_negative_amount() {
    let cli = Cli::try_parse_from([
        "bankline",
        "transactions",
        "add",
        "--date",
        "2025-04-03",
        "-d",
        "Coffee",
        "-a",
        "-3.5",
        "--planned",
    ])
    .unwrap();
    match cli.command {
        Commands::Transactions {
            action:
                Some(TransactionsAction::Add {
                    amount, planned, ..
                }),
        } => {
            assert_eq!(amount, -3.5);
            assert!(planned);
        }
        _ => panic!("expected transactions add"),
    }
}

#[test]
fn test_parse_disconnect_requires_item() {
    assert!(Cli::try_parse_from(["bankline", "disconnect"]).is_err());
    let cli = Cli::try_parse_from(["bankline", "disconnect", "900"]).unwrap();
    assert!(matches!(cli.command, Commands::Disconnect { ref item_id } if item_id == "900"));
}

#[test]
fn test_parse_serve() {
    let cli = Cli::try_parse_from([
        "bankline",
        "serve",
        "-p",
        "8080",
        "--no-auth",
        "--allow-origin",
        "http://localhost:5173",
    ])
    .unwrap();
    match cli.command {
        Commands::Serve {
            port,
            host,
            no_auth,
            allowed_origins,
        } => {
            assert_eq!(port, 8080);
            assert_eq!(host, "127.0.0.1");
            assert!(no_auth);
            assert_eq!(allowed_origins, vec!["http://localhost:5173"]);
        }
        _ => panic!("expected serve"),
    }
}

// ========== Helper Tests ==========

#[test]
fn test_truncate() {
    assert_eq!(truncate("short", 10), "short");
    assert_eq!(truncate("a long description", 10), "a long ...");
    assert_eq!(truncate("Crédit Agricole", 8), "Crédi...");
}

#[test]
fn test_format_amount_sign() {
    assert!(format_amount(-4.2).contains("-4.20"));
    assert!(format_amount(12.0).contains("+12.00"));
}

// ========== Transactions Command Tests ==========

#[test]
fn test_cmd_transactions_add_and_list() {
    let db = setup_test_db();

    let mut planned = entry("2025-04-10", "Rent", -700.0);
    planned.category = Some("housing");
    planned.planned = true;
    let tx = commands::cmd_transactions_add(&db, USER, &planned).unwrap();
    assert_eq!(tx.status, TransactionStatus::Planned);
    assert_eq!(tx.account, bankline_core::DEFAULT_ACCOUNT_NAME);

    let stored = db.list_ledger(USER).unwrap();
    assert_eq!(stored, vec![tx]);

    assert!(commands::cmd_transactions_list(&db, USER, 20).is_ok());
    assert!(commands::cmd_transactions_list(&db, "nobody", 20).is_ok());
}

#[test]
fn test_cmd_transactions_add_rejects_bad_input() {
    let db = setup_test_db();

    assert!(commands::cmd_transactions_add(&db, USER, &entry("04/10/2025", "Rent", 1.0)).is_err());
    assert!(commands::cmd_transactions_add(&db, USER, &entry("2025-04-10", "  ", 1.0)).is_err());

    let mut unknown = entry("2025-04-10", "Rent", 1.0);
    unknown.category = Some("yachts");
    assert!(commands::cmd_transactions_add(&db, USER, &unknown).is_err());

    assert_eq!(db.count_ledger(USER).unwrap(), 0);
}

#[test]
fn test_cmd_connections_empty() {
    let db = setup_test_db();
    assert!(commands::cmd_connections(&db, USER).is_ok());
}

// ========== Bank Command Tests ==========

#[tokio::test]
async fn test_cmd_link() {
    let db = setup_test_db();
    let (server, sync) = seeded_sync(&db).await;

    commands::cmd_link(&sync, USER).await.unwrap();
    assert_eq!(server.connect_requests().len(), 1);
}

#[tokio::test]
async fn test_cmd_sync_then_disconnect() {
    let db = setup_test_db();
    let (_server, sync) = seeded_sync(&db).await;
    commands::cmd_transactions_add(&db, USER, &entry("2025-04-05", "Market", -9.0)).unwrap();

    commands::cmd_sync(&sync, USER).await.unwrap();
    assert_eq!(db.count_ledger(USER).unwrap(), 3);
    assert_eq!(db.list_connections(USER).unwrap().len(), 1);

    commands::cmd_connections_remote(&sync, USER).await.unwrap();
    commands::cmd_connections(&db, USER).unwrap();

    commands::cmd_disconnect(&sync, USER, "900").await.unwrap();
    let remaining = db.list_ledger(USER).unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].description, "Market");
    assert!(db.list_connections(USER).unwrap().is_empty());
}

#[tokio::test]
async fn test_cmd_sync_surfaces_errors() {
    let db = setup_test_db();
    let (server, sync) = seeded_sync(&db).await;
    server.set_token_always_not_found(true);

    let err = commands::cmd_sync(&sync, USER).await.unwrap_err();
    assert!(err.to_string().contains("Sync failed"));
    assert_eq!(db.count_ledger(USER).unwrap(), 0);
}
