//! Ledger transaction storage
//!
//! The collection is written wholesale; `position` records the order so a
//! reload returns exactly what was stored. The `read_`/`write_` helpers work on
//! a borrowed connection so several of them can share one write transaction.

use rusqlite::{params, Connection, Row};

use super::{parse_date, Database};
use crate::error::{Error, Result};
use crate::models::LocalTransaction;

const SELECT_COLUMNS: &str = "id, date, description, amount, category, account, status, origin,
    provider_transaction_id, provider_account_id, provider_item_id";

/// Columns as stored, before enum and date parsing
struct StoredRow {
    id: String,
    date: String,
    description: String,
    amount: f64,
    category: String,
    account: String,
    status: String,
    origin: String,
    provider_transaction_id: Option<String>,
    provider_account_id: Option<String>,
    provider_item_id: Option<String>,
}

impl StoredRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            date: row.get(1)?,
            description: row.get(2)?,
            amount: row.get(3)?,
            category: row.get(4)?,
            account: row.get(5)?,
            status: row.get(6)?,
            origin: row.get(7)?,
            provider_transaction_id: row.get(8)?,
            provider_account_id: row.get(9)?,
            provider_item_id: row.get(10)?,
        })
    }

    fn into_transaction(self) -> Result<LocalTransaction> {
        Ok(LocalTransaction {
            date: parse_date(&self.date)?,
            category: self.category.parse().map_err(Error::InvalidData)?,
            status: self.status.parse().map_err(Error::InvalidData)?,
            origin: self.origin.parse().map_err(Error::InvalidData)?,
            id: self.id,
            description: self.description,
            amount: self.amount,
            account: self.account,
            provider_transaction_id: self.provider_transaction_id,
            provider_account_id: self.provider_account_id,
            provider_item_id: self.provider_item_id,
        })
    }
}

fn insert_at(
    conn: &Connection,
    user_id: &str,
    position: i64,
    tx: &LocalTransaction,
) -> rusqlite::Result<usize> {
    conn.execute(
        "INSERT INTO ledger_transactions
         (user_id, id, position, date, description, amount, category, account, status, origin,
          provider_transaction_id, provider_account_id, provider_item_id)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            user_id,
            tx.id,
            position,
            tx.date.format("%Y-%m-%d").to_string(),
            tx.description,
            tx.amount,
            tx.category.as_str(),
            tx.account,
            tx.status.as_str(),
            tx.origin.as_str(),
            tx.provider_transaction_id,
            tx.provider_account_id,
            tx.provider_item_id,
        ],
    )
}

/// A user's ledger in stored order
pub(super) fn read_ledger(conn: &Connection, user_id: &str) -> Result<Vec<LocalTransaction>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM ledger_transactions WHERE user_id = ? ORDER BY position",
        SELECT_COLUMNS
    ))?;

    let rows = stmt
        .query_map(params![user_id], StoredRow::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    rows.into_iter().map(StoredRow::into_transaction).collect()
}

/// Overwrite a user's ledger; the caller owns the surrounding transaction
pub(super) fn write_ledger(
    conn: &Connection,
    user_id: &str,
    transactions: &[LocalTransaction],
) -> Result<()> {
    conn.execute(
        "DELETE FROM ledger_transactions WHERE user_id = ?",
        params![user_id],
    )?;
    for (position, tx) in transactions.iter().enumerate() {
        insert_at(conn, user_id, position as i64, tx)?;
    }
    Ok(())
}

impl Database {
    /// Load a user's ledger in stored order
    pub fn list_ledger(&self, user_id: &str) -> Result<Vec<LocalTransaction>> {
        read_ledger(&*self.conn()?, user_id)
    }

    /// Append one entry after the current last position
    pub fn append_ledger(&self, user_id: &str, tx: &LocalTransaction) -> Result<()> {
        self.write_transaction(|conn| {
            let next: i64 = conn.query_row(
                "SELECT COALESCE(MAX(position) + 1, 0) FROM ledger_transactions WHERE user_id = ?",
                params![user_id],
                |row| row.get(0),
            )?;
            insert_at(conn, user_id, next, tx)?;
            Ok(())
        })
    }

    /// Number of entries in a user's ledger
    pub fn count_ledger(&self, user_id: &str) -> Result<i64> {
        let conn = self.conn()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM ledger_transactions WHERE user_id = ?",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}
