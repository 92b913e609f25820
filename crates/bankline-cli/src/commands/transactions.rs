//! Ledger commands (list, add)

use anyhow::{anyhow, Context, Result};
use bankline_core::{
    validate_manual_transaction, Category, Database, LocalTransaction, TransactionStatus,
    DEFAULT_ACCOUNT_NAME,
};
use chrono::NaiveDate;

use super::{format_amount, truncate};

pub fn cmd_transactions_list(db: &Database, user_id: &str, limit: usize) -> Result<()> {
    let transactions = db.list_ledger(user_id)?;

    if transactions.is_empty() {
        println!("No transactions yet. Link a bank and sync with:");
        println!("  bankline link --user {}", user_id);
        println!("  bankline sync --user {}", user_id);
        return Ok(());
    }

    println!();
    println!("📝 Ledger for {} ({} entries)", user_id, transactions.len());
    println!("   ─────────────────────────────────────────────────────────────");

    let skip = transactions.len().saturating_sub(limit);
    for tx in &transactions[skip..] {
        let marker = if tx.is_synced() { "🏦" } else { "✍️ " };
        println!(
            "   {} {} │ {:>10} │ {:<10} │ {}",
            marker,
            tx.date,
            format_amount(tx.amount),
            tx.category.as_str(),
            truncate(&tx.description, 40)
        );
    }

    Ok(())
}

/// Arguments for a manual ledger entry
pub struct NewEntry<'a> {
    pub date: &'a str,
    pub description: &'a str,
    pub amount: f64,
    pub category: Option<&'a str>,
    pub account: Option<&'a str>,
    pub planned: bool,
}

pub fn cmd_transactions_add(
    db: &Database,
    user_id: &str,
    entry: &NewEntry<'_>,
) -> Result<LocalTransaction> {
    let date = NaiveDate::parse_from_str(entry.date, "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{}' (expected YYYY-MM-DD)", entry.date))?;
    let category = match entry.category {
        Some(c) => c.parse::<Category>().map_err(|e| anyhow!(e))?,
        None => Category::Other,
    };
    let status = if entry.planned {
        TransactionStatus::Planned
    } else {
        TransactionStatus::Completed
    };

    let transaction = LocalTransaction::manual(
        date,
        entry.description,
        entry.amount,
        category,
        entry.account.unwrap_or(DEFAULT_ACCOUNT_NAME),
        status,
    );
    validate_manual_transaction(&transaction)?;
    db.append_ledger(user_id, &transaction)?;

    println!(
        "✅ Added {} │ {} │ {}",
        transaction.date,
        format_amount(transaction.amount),
        transaction.description
    );
    Ok(transaction)
}
