//! Database access layer with connection pooling and migrations
//!
//! This module is organized by domain:
//! - `connections` - Linked bank connections per user
//! - `ledger` - The per-user transaction collection
//!
//! The sync pipeline only sees storage through `LedgerStore`; `Database` is the
//! SQLite implementation shipped with the CLI and server. Every write runs in a
//! `BEGIN IMMEDIATE` transaction, so writers for the same database are
//! serialized and a read-merge-write never loses a concurrent append.

use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use tracing::info;

use crate::error::{Error, Result};
use crate::models::{BankConnection, LocalTransaction};
use crate::reconcile::{self, Disconnection, MergeResult};

mod connections;
mod ledger;


pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConn = PooledConnection<SqliteConnectionManager>;

/// Environment variable for database encryption key
pub const DB_KEY_ENV: &str = "BANKLINE_DB_KEY";

/// How long a writer waits for another writer before giving up
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// What a sync wrote: the merge outcome and the stamped connection records
#[derive(Debug, Clone, PartialEq)]
pub struct SyncCommit {
    pub merge: MergeResult,
    pub connections: Vec<BankConnection>,
}

/// Persisted state read and written by the sync pipeline, keyed by local user id
///
/// Each write method is atomic: it reads, reconciles and writes under one lock,
/// so concurrent writers for the same user cannot drop each other's changes.
pub trait LedgerStore: Send + Sync {
    /// The user's transaction collection, in ledger order
    fn load_transactions(&self, user_id: &str) -> Result<Vec<LocalTransaction>>;

    fn load_connections(&self, user_id: &str) -> Result<Vec<BankConnection>>;

    /// Append one entry at the end of the ledger
    fn append_transaction(&self, user_id: &str, transaction: &LocalTransaction) -> Result<()>;

    /// Merge freshly normalized entries into the ledger as it stands at commit
    /// time, and record `remote` as the user's connections synced at `synced_at`
    fn commit_sync(
        &self,
        user_id: &str,
        incoming: Vec<LocalTransaction>,
        remote: Vec<BankConnection>,
        synced_at: DateTime<Utc>,
    ) -> Result<SyncCommit>;

    /// Record the provider's connection list, keeping local metadata of known items
    fn record_connections(
        &self,
        user_id: &str,
        remote: Vec<BankConnection>,
    ) -> Result<Vec<BankConnection>>;

    /// Forget one connection and purge the synced entries it brought in
    fn remove_connection(&self, user_id: &str, item_id: &str) -> Result<Disconnection>;
}

/// Derive an encryption key from a passphrase using Argon2
///
/// Uses a fixed application salt so the same passphrase always produces the same key,
/// regardless of database path.
fn derive_key(passphrase: &str) -> Result<String> {
    use argon2::{password_hash::SaltString, Argon2, PasswordHasher};

    // Changing this invalidates every existing encrypted database
    const APP_SALT: &[u8; 16] = b"bankline-salt-v1";

    let salt = SaltString::encode_b64(APP_SALT)
        .map_err(|e| Error::Encryption(format!("Failed to create salt: {}", e)))?;

    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(passphrase.as_bytes(), &salt)
        .map_err(|e| Error::Encryption(format!("Failed to derive key: {}", e)))?;

    let hash_str = hash
        .hash
        .ok_or_else(|| Error::Encryption("No hash output".to_string()))?;
    Ok(hex::encode(hash_str.as_bytes()))
}

/// Parse a stored timestamp (RFC 3339, or SQLite's "YYYY-MM-DD HH:MM:SS")
pub(crate) fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .map(|dt| dt.and_utc())
        .map_err(|e| Error::InvalidData(format!("bad timestamp {:?}: {}", s, e)))
}

pub(crate) fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| Error::InvalidData(format!("bad date {:?}: {}", s, e)))
}

/// Database wrapper with connection pooling
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
    db_path: String,
}

impl Database {
    /// Create a new database connection pool with encryption
    ///
    /// Requires `BANKLINE_DB_KEY` to be set. The database is encrypted with
    /// SQLCipher using a key derived from the passphrase via Argon2.
    pub fn new(path: &str) -> Result<Self> {
        match std::env::var(DB_KEY_ENV).ok() {
            Some(key) => Self::new_with_key(path, Some(&key)),
            None => Err(Error::Encryption(format!(
                "Database encryption required. Set {} environment variable with your passphrase, \
                or use --no-encrypt for unencrypted databases (not recommended for production).",
                DB_KEY_ENV
            ))),
        }
    }

    /// Create a new unencrypted database connection pool
    ///
    /// WARNING: development and testing only.
    pub fn new_unencrypted(path: &str) -> Result<Self> {
        Self::new_with_key(path, None)
    }

    /// Create a new database with an explicit encryption key
    pub fn new_with_key(path: &str, passphrase: Option<&str>) -> Result<Self> {
        let key_pragma = passphrase
            .map(derive_key)
            .transpose()?
            .map(|key| format!("PRAGMA key = 'x\"{}\"';", key));

        // The key must be set on every new pooled connection
        let manager = SqliteConnectionManager::file(path).with_init(move |conn| {
            if let Some(pragma) = &key_pragma {
                conn.execute_batch(pragma)?;
            }
            conn.busy_timeout(BUSY_TIMEOUT)?;
            Ok(())
        });

        let pool = Pool::builder().max_size(8).build(manager)?;

        let db = Self {
            pool,
            db_path: path.to_string(),
        };
        db.run_migrations()?;

        Ok(db)
    }

    /// Get the path to the database file
    pub fn path(&self) -> &str {
        &self.db_path
    }

    /// Create a throwaway database (for testing)
    ///
    /// Note: Uses a temporary file rather than `:memory:` because SQLCipher
    /// has issues with in-memory databases in the connection pool.
    pub fn in_memory() -> Result<Self> {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);

        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        let path = std::env::temp_dir().join(format!(
            "bankline_test_{}_{}.db",
            std::process::id(),
            id
        ));
        let path = path.to_string_lossy().to_string();

        let _ = std::fs::remove_file(&path);

        Self::new_unencrypted(&path)
    }

    /// Get a connection from the pool
    pub fn conn(&self) -> Result<DbConn> {
        Ok(self.pool.get()?)
    }

    /// Run `f` inside one `BEGIN IMMEDIATE` transaction, rolling back on error
    ///
    /// The write lock is taken up front, so the reads inside `f` see the state
    /// that its writes replace.
    pub(crate) fn write_transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn()?;

        conn.execute_batch("BEGIN IMMEDIATE")?;

        let result = f(&conn).and_then(|value| {
            conn.execute_batch("COMMIT")?;
            Ok(value)
        });

        if result.is_err() && !conn.is_autocommit() {
            let _ = conn.execute_batch("ROLLBACK");
        }
        result
    }

    /// Run database migrations
    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;

            -- One row per linked bank (provider item) per user
            CREATE TABLE IF NOT EXISTS bank_connections (
                user_id TEXT NOT NULL,
                item_id TEXT NOT NULL,
                bank_name TEXT NOT NULL,
                connected_at TEXT NOT NULL,
                last_sync_at TEXT,
                PRIMARY KEY (user_id, item_id)
            );

            -- The ledger; position keeps the collection's order stable
            CREATE TABLE IF NOT EXISTS ledger_transactions (
                user_id TEXT NOT NULL,
                id TEXT NOT NULL,
                position INTEGER NOT NULL,
                date TEXT NOT NULL,
                description TEXT NOT NULL,
                amount REAL NOT NULL,
                category TEXT NOT NULL,
                account TEXT NOT NULL,
                status TEXT NOT NULL,
                origin TEXT NOT NULL,
                provider_transaction_id TEXT,
                provider_account_id TEXT,
                provider_item_id TEXT,
                PRIMARY KEY (user_id, id)
            );

            CREATE INDEX IF NOT EXISTS idx_ledger_position
                ON ledger_transactions(user_id, position);

            -- At most one synced row per provider transaction
            CREATE UNIQUE INDEX IF NOT EXISTS idx_ledger_synced_provider_id
                ON ledger_transactions(user_id, provider_transaction_id)
                WHERE origin = 'synced';
            "#,
        )?;

        info!("Database migrations complete");
        Ok(())
    }
}

impl LedgerStore for Database {
    fn load_transactions(&self, user_id: &str) -> Result<Vec<LocalTransaction>> {
        self.list_ledger(user_id)
    }

    fn load_connections(&self, user_id: &str) -> Result<Vec<BankConnection>> {
        self.list_connections(user_id)
    }

    fn append_transaction(&self, user_id: &str, transaction: &LocalTransaction) -> Result<()> {
        self.append_ledger(user_id, transaction)
    }

    fn commit_sync(
        &self,
        user_id: &str,
        incoming: Vec<LocalTransaction>,
        remote: Vec<BankConnection>,
        synced_at: DateTime<Utc>,
    ) -> Result<SyncCommit> {
        self.write_transaction(|conn| {
            let existing = ledger::read_ledger(conn, user_id)?;
            let merge = reconcile::merge(&existing, incoming);
            ledger::write_ledger(conn, user_id, &merge.merged)?;

            let local = connections::read_connections(conn, user_id)?;
            let mut stamped = reconcile::merge_connections(&local, remote);
            for c in &mut stamped {
                c.last_sync_at = Some(synced_at);
            }
            connections::write_connections(conn, user_id, &stamped)?;

            Ok(SyncCommit {
                merge,
                connections: stamped,
            })
        })
    }

    fn record_connections(
        &self,
        user_id: &str,
        remote: Vec<BankConnection>,
    ) -> Result<Vec<BankConnection>> {
        self.write_transaction(|conn| {
            let local = connections::read_connections(conn, user_id)?;
            let merged = reconcile::merge_connections(&local, remote);
            connections::write_connections(conn, user_id, &merged)?;
            Ok(merged)
        })
    }

    fn remove_connection(&self, user_id: &str, item_id: &str) -> Result<Disconnection> {
        self.write_transaction(|conn| {
            let existing = ledger::read_ledger(conn, user_id)?;
            let known = connections::read_connections(conn, user_id)?;
            let outcome = reconcile::forget_connection(&existing, &known, item_id);
            ledger::write_ledger(conn, user_id, &outcome.remaining_transactions)?;
            connections::write_connections(conn, user_id, &outcome.remaining_connections)?;
            Ok(outcome)
        })
    }
}
