//! Bank linking commands: link, connections, sync, disconnect

use anyhow::{Context, Result};
use bankline_core::{BankConnection, BankSync, Database};

use super::{format_amount, truncate};

pub async fn cmd_link(sync: &BankSync, user_id: &str) -> Result<()> {
    let session = sync
        .request_link(user_id)
        .await
        .context("Failed to start bank link")?;

    println!("🔗 Open this URL to link a bank for {}:", session.user_id);
    println!();
    println!("   {}", session.session_url);
    println!();
    println!("Then run: bankline sync --user {}", session.user_id);

    Ok(())
}

/// Connections recorded locally
pub fn cmd_connections(db: &Database, user_id: &str) -> Result<()> {
    let connections = db.list_connections(user_id)?;
    print_connections(&connections);
    Ok(())
}

/// Connections as the provider reports them (also refreshes the local copy)
pub async fn cmd_connections_remote(sync: &BankSync, user_id: &str) -> Result<()> {
    let connections = sync
        .refresh_connections(user_id)
        .await
        .context("Failed to list connections from the provider")?;
    print_connections(&connections);
    Ok(())
}

fn print_connections(connections: &[BankConnection]) {
    if connections.is_empty() {
        println!("No linked banks. Start one with:");
        println!("  bankline link --user <id>");
        return;
    }

    println!();
    println!("🏦 Linked Banks");
    println!("   ─────────────────────────────────────────────────────────────");
    for c in connections {
        let last_sync = c
            .last_sync_at
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "never".to_string());
        println!(
            "   {:>10} │ {:<30} │ last sync: {}",
            c.item_id,
            truncate(&c.bank_name, 30),
            last_sync
        );
    }
}

pub async fn cmd_sync(sync: &BankSync, user_id: &str) -> Result<()> {
    println!("🔄 Syncing linked banks for {}...", user_id);

    let report = sync.sync(user_id).await.context("Sync failed")?;

    if report.connections.is_empty() {
        println!("   No linked banks. Start one with: bankline link --user {}", user_id);
        return Ok(());
    }

    println!("   Banks: {}", report.connections.len());
    println!("   Fetched: {}", report.fetched_count);
    println!("   New: {}", report.added_count);
    println!("   Ledger size: {}", report.merged_transactions.len());

    if !report.failures.is_empty() {
        println!();
        println!("   ⚠️  {} account(s) could not be fetched:", report.failures.len());
        for f in &report.failures {
            println!("      {} / {}: {}", f.item_id, f.account_id, f.message);
        }
    }

    // Added entries are appended at the end of the ledger
    let first_new = report
        .merged_transactions
        .len()
        .saturating_sub(report.added_count);
    for tx in report.merged_transactions[first_new..].iter().take(10) {
        println!(
            "   + {} │ {:>10} │ {}",
            tx.date,
            format_amount(tx.amount),
            truncate(&tx.description, 40)
        );
    }

    println!("✅ Sync complete");
    Ok(())
}

pub async fn cmd_disconnect(sync: &BankSync, user_id: &str, item_id: &str) -> Result<()> {
    let before = sync.list_transactions(user_id)?.len();
    let remaining = sync
        .disconnect(item_id, user_id)
        .await
        .context("Failed to disconnect bank")?;

    println!(
        "🔌 Disconnected {} ({} transaction(s) removed, {} remaining)",
        item_id,
        before.saturating_sub(remaining.len()),
        remaining.len()
    );
    Ok(())
}
