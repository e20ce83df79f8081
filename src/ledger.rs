// Vote bookkeeping with toggle/switch semantics over the posts and
// user_votes tables.

use std::sync::Arc;

use anyhow::{Context, Result};
use rusqlite::{params, OptionalExtension};

use crate::db::Database;

// ---------------------------------------------------------------------------
// Vote types
// ---------------------------------------------------------------------------

/// The two kinds of vote a user can cast on a relayed post.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteKind {
    Like,
    Dislike,
}

impl VoteKind {
    /// Stable identifier used in stored rows and control action ids.
    pub fn as_str(self) -> &'static str {
        match self {
            VoteKind::Like => "like",
            VoteKind::Dislike => "dislike",
        }
    }

    /// Inverse of [`as_str`](Self::as_str). Anything else is `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "like" => Some(VoteKind::Like),
            "dislike" => Some(VoteKind::Dislike),
            _ => None,
        }
    }
}

/// Result of applying a vote action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteOutcome {
    /// The vote landed; these are the post's resulting tallies.
    Updated { likes: i64, dislikes: i64 },
    /// The post is unknown (never relayed); nothing was recorded.
    NoChange,
}

// ---------------------------------------------------------------------------
// VoteLedger
// ---------------------------------------------------------------------------

/// Applies vote actions to post tallies.
///
/// Every call runs as a single transaction on the shared connection, so vote
/// applications — including two racing votes for the same (user, post) pair —
/// are serialized and the tallies always equal the count of stored vote rows.
pub struct VoteLedger {
    db: Arc<Database>,
}

impl VoteLedger {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Apply `kind` for `(user_id, post_id)` and return the post's resulting
    /// tallies.
    ///
    /// Semantics:
    /// - no prior vote: record it, bump the matching counter
    /// - same kind as the prior vote: remove it (toggle-off), drop the counter
    /// - opposite kind: switch the recorded vote, adjust both counters
    ///
    /// Voting on a post that was never relayed returns
    /// [`VoteOutcome::NoChange`] without creating any rows; callers must seed
    /// the post record first. Counters never go below zero.
    pub fn apply_vote(&self, user_id: i64, post_id: &str, kind: VoteKind) -> Result<VoteOutcome> {
        let mut conn = self.db.conn();
        let tx = conn
            .transaction()
            .context("failed to begin vote transaction")?;

        let known: bool = tx
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM posts WHERE post_id = ?1)",
                params![post_id],
                |row| row.get(0),
            )
            .context("failed to check post existence")?;
        if !known {
            return Ok(VoteOutcome::NoChange);
        }

        let previous: Option<String> = tx
            .query_row(
                "SELECT kind FROM user_votes WHERE user_id = ?1 AND post_id = ?2",
                params![user_id, post_id],
                |row| row.get(0),
            )
            .optional()
            .context("failed to look up existing vote")?;

        match previous {
            None => {
                tx.execute(
                    "INSERT INTO user_votes (user_id, post_id, kind) VALUES (?1, ?2, ?3)",
                    params![user_id, post_id, kind.as_str()],
                )
                .context("failed to record vote")?;

                let bump = match kind {
                    VoteKind::Like => "UPDATE posts SET likes = likes + 1 WHERE post_id = ?1",
                    VoteKind::Dislike => {
                        "UPDATE posts SET dislikes = dislikes + 1 WHERE post_id = ?1"
                    }
                };
                tx.execute(bump, params![post_id])
                    .context("failed to increment tally")?;
            }
            Some(prev) if VoteKind::parse(&prev) == Some(kind) => {
                // Toggle-off: the user repeated their vote.
                tx.execute(
                    "DELETE FROM user_votes WHERE user_id = ?1 AND post_id = ?2",
                    params![user_id, post_id],
                )
                .context("failed to remove vote")?;

                let lower = match kind {
                    VoteKind::Like => {
                        "UPDATE posts SET likes = MAX(likes - 1, 0) WHERE post_id = ?1"
                    }
                    VoteKind::Dislike => {
                        "UPDATE posts SET dislikes = MAX(dislikes - 1, 0) WHERE post_id = ?1"
                    }
                };
                tx.execute(lower, params![post_id])
                    .context("failed to decrement tally")?;
            }
            Some(_) => {
                // Switch: the user changed their mind.
                tx.execute(
                    "UPDATE user_votes SET kind = ?3 WHERE user_id = ?1 AND post_id = ?2",
                    params![user_id, post_id, kind.as_str()],
                )
                .context("failed to switch vote")?;

                let swap = match kind {
                    VoteKind::Like => {
                        "UPDATE posts SET likes = likes + 1, dislikes = MAX(dislikes - 1, 0)
                         WHERE post_id = ?1"
                    }
                    VoteKind::Dislike => {
                        "UPDATE posts SET dislikes = dislikes + 1, likes = MAX(likes - 1, 0)
                         WHERE post_id = ?1"
                    }
                };
                tx.execute(swap, params![post_id])
                    .context("failed to swap tallies")?;
            }
        }

        let (likes, dislikes) = tx
            .query_row(
                "SELECT likes, dislikes FROM posts WHERE post_id = ?1",
                params![post_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .context("failed to read resulting tallies")?;

        tx.commit().context("failed to commit vote transaction")?;

        Ok(VoteOutcome::Updated { likes, dislikes })
    }
}
