//! Bank connection records

use rusqlite::{params, Connection};

use super::{parse_datetime, Database};
use crate::error::Result;
use crate::models::BankConnection;

/// A user's connections, oldest first
pub(super) fn read_connections(conn: &Connection, user_id: &str) -> Result<Vec<BankConnection>> {
    let mut stmt = conn.prepare(
        "SELECT item_id, bank_name, connected_at, last_sync_at
         FROM bank_connections WHERE user_id = ?
         ORDER BY connected_at, item_id",
    )?;

    let rows = stmt
        .query_map(params![user_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(item_id, bank_name, connected_at, last_sync_at)| {
            Ok(BankConnection {
                item_id,
                bank_name,
                connected_at: parse_datetime(&connected_at)?,
                last_sync_at: last_sync_at.as_deref().map(parse_datetime).transpose()?,
            })
        })
        .collect()
}

/// Overwrite a user's connection records; the caller owns the surrounding transaction
pub(super) fn write_connections(
    conn: &Connection,
    user_id: &str,
    connections: &[BankConnection],
) -> Result<()> {
    conn.execute(
        "DELETE FROM bank_connections WHERE user_id = ?",
        params![user_id],
    )?;
    let mut stmt = conn.prepare(
        "INSERT OR REPLACE INTO bank_connections
         (user_id, item_id, bank_name, connected_at, last_sync_at)
         VALUES (?, ?, ?, ?, ?)",
    )?;
    for c in connections {
        stmt.execute(params![
            user_id,
            c.item_id,
            c.bank_name,
            c.connected_at.to_rfc3339(),
            c.last_sync_at.map(|t| t.to_rfc3339()),
        ])?;
    }
    Ok(())
}

impl Database {
    /// List a user's connections, oldest first
    pub fn list_connections(&self, user_id: &str) -> Result<Vec<BankConnection>> {
        read_connections(&*self.conn()?, user_id)
    }
}
