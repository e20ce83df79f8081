// SQLite persistence layer for relay checkpoints, relayed posts, and votes.

use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};

/// SQLite-backed persistence for relay checkpoints, relayed posts, and
/// per-user votes.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) a SQLite database at `path` and ensure all tables
    /// exist. Pass `":memory:"` for an ephemeral in-memory database (useful
    /// for tests).
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {path}"))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;
             PRAGMA foreign_keys = ON;",
        )
        .context("failed to set database pragmas")?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS checkpoints (
                account_handle  TEXT PRIMARY KEY,
                last_post_id    TEXT,
                last_checked_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE TABLE IF NOT EXISTS posts (
                post_id    TEXT PRIMARY KEY,
                author     TEXT NOT NULL,
                likes      INTEGER NOT NULL DEFAULT 0 CHECK (likes >= 0),
                dislikes   INTEGER NOT NULL DEFAULT 0 CHECK (dislikes >= 0),
                message_id INTEGER NOT NULL,
                relayed_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE TABLE IF NOT EXISTS user_votes (
                user_id  INTEGER NOT NULL,
                post_id  TEXT NOT NULL REFERENCES posts(post_id),
                kind     TEXT NOT NULL,
                voted_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                PRIMARY KEY (user_id, post_id)
            );
            ",
        )
        .context("failed to create database schema")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Acquire the database connection.
    ///
    /// Panics if the mutex is poisoned (another thread panicked while
    /// holding the lock). This should never happen in normal operation.
    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("database mutex poisoned")
    }

    /// Return the last relayed post id for `account`, or `None` if this
    /// account has never been observed.
    pub fn get_checkpoint(&self, account: &str) -> Result<Option<String>> {
        let conn = self.conn();
        let row: Option<Option<String>> = conn
            .query_row(
                "SELECT last_post_id FROM checkpoints WHERE account_handle = ?1",
                params![account],
                |row| row.get(0),
            )
            .optional()
            .context("failed to query checkpoint")?;
        Ok(row.flatten())
    }

    /// Record `post_id` as the last relayed post for `account`. Upserts the
    /// checkpoint row and refreshes its check timestamp.
    pub fn set_checkpoint(&self, account: &str, post_id: &str) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO checkpoints (account_handle, last_post_id) VALUES (?1, ?2)
             ON CONFLICT(account_handle) DO UPDATE SET
                last_post_id    = excluded.last_post_id,
                last_checked_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
            params![account, post_id],
        )
        .context("failed to set checkpoint")?;
        Ok(())
    }

    /// Create the vote record for a freshly relayed post with zero tallies.
    /// Uses INSERT OR IGNORE for idempotency — seeding an already-known post
    /// is a no-op and never resets its counters.
    pub fn seed_post(&self, post_id: &str, author: &str, message_id: i64) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT OR IGNORE INTO posts (post_id, author, likes, dislikes, message_id)
             VALUES (?1, ?2, 0, 0, ?3)",
            params![post_id, author, message_id],
        )
        .context("failed to seed post record")?;
        Ok(())
    }

    /// Current (likes, dislikes) for a post, or `None` if the post has never
    /// been relayed.
    pub fn post_tallies(&self, post_id: &str) -> Result<Option<(i64, i64)>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT likes, dislikes FROM posts WHERE post_id = ?1",
            params![post_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()
        .context("failed to query post tallies")
    }
}
