// Relay orchestration: polls monitored accounts and republishes new posts to
// the channel with a fresh vote control.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tracing::{debug, info, warn};

use crate::channel::{vote_keyboard, MessageChannel};
use crate::db::Database;
use crate::feed::{Post, SocialFeed};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Maximum number of images published after the captioned one (10 total).
const GALLERY_CAP: usize = 9;

// ---------------------------------------------------------------------------
// RelayOrchestrator
// ---------------------------------------------------------------------------

/// Polls each monitored account in turn and relays genuinely new posts.
///
/// Relay attempts are at-most-once: the account checkpoint advances whether
/// or not publishing succeeded, so one broken post can never wedge an
/// account's relay stream.
pub struct RelayOrchestrator {
    feed: Arc<dyn SocialFeed>,
    channel: Arc<dyn MessageChannel>,
    db: Arc<Database>,
    accounts: Vec<String>,
    feed_page_size: u32,
}

impl RelayOrchestrator {
    pub fn new(
        feed: Arc<dyn SocialFeed>,
        channel: Arc<dyn MessageChannel>,
        db: Arc<Database>,
        accounts: Vec<String>,
        feed_page_size: u32,
    ) -> Self {
        Self {
            feed,
            channel,
            db,
            accounts,
            feed_page_size,
        }
    }

    /// Run relay cycles forever, sleeping `interval` after each completed
    /// cycle. A slow cycle simply delays the next one; cycles never overlap.
    pub async fn run(&self, interval: Duration) {
        loop {
            self.run_cycle().await;
            tokio::time::sleep(interval).await;
        }
    }

    /// One pass over all monitored accounts. An error on one account is
    /// logged and does not affect the remaining accounts.
    pub async fn run_cycle(&self) {
        for account in &self.accounts {
            if let Err(e) = self.check_account(account).await {
                warn!("relay check failed for @{account}: {e:#}");
            }
        }
    }

    /// Check one account for a new post and relay it when found.
    async fn check_account(&self, account: &str) -> Result<()> {
        let posts = self
            .feed
            .latest_posts(account, self.feed_page_size)
            .await
            .context("feed fetch failed")?;

        let Some(newest) = posts.first() else {
            debug!("feed returned no posts for @{account}");
            return Ok(());
        };

        match self.db.get_checkpoint(account)?.as_deref() {
            None => {
                // First observation of this account: record where the feed
                // currently is and relay nothing. Historical posts are never
                // backfilled.
                self.db.set_checkpoint(account, &newest.id)?;
                info!("seeded checkpoint for @{account} at post {}", newest.id);
            }
            Some(last) if last == newest.id => {
                debug!("no new posts for @{account}");
            }
            Some(_) => {
                if let Err(e) = self.relay_post(account, newest).await {
                    warn!("dropped relay of post {} from @{account}: {e:#}", newest.id);
                }
                // Advances even when publishing failed: one attempt per post.
                self.db.set_checkpoint(account, &newest.id)?;
            }
        }

        Ok(())
    }

    /// Publish one post to the channel and seed its vote record.
    async fn relay_post(&self, account: &str, post: &Post) -> Result<()> {
        let caption = post_caption(account, &post.id);
        let control = vote_keyboard(&post.id, 0, 0);

        let message_id = if post.has_attachments {
            let media = self
                .feed
                .media_for(&post.id)
                .await
                .context("media lookup failed")?;
            if media.is_empty() {
                bail!("post is flagged with attachments but no image URLs resolved");
            }

            let message_id = self
                .channel
                .publish_image(&media[0], &caption, &control)
                .await
                .context("failed to publish captioned image")?;
            self.db.seed_post(&post.id, account, message_id)?;

            if media.len() > 1 {
                let gallery: Vec<String> =
                    media[1..].iter().take(GALLERY_CAP).cloned().collect();
                // The control already lives on the captioned message; a lost
                // gallery degrades the relay but doesn't invalidate it.
                if let Err(e) = self.channel.publish_image_gallery(&gallery).await {
                    warn!("gallery publish failed for post {}: {e:#}", post.id);
                }
            }
            message_id
        } else {
            let message_id = self
                .channel
                .publish_text(&caption, &control)
                .await
                .context("failed to publish text message")?;
            self.db.seed_post(&post.id, account, message_id)?;
            message_id
        };

        info!(
            "relayed post {} from @{account} as message {message_id}",
            post.id
        );
        Ok(())
    }
}

/// Caption for a relayed post: the author handle plus the canonical post URL.
fn post_caption(account: &str, post_id: &str) -> String {
    format!("Author @{account}:\n\nhttps://twitter.com/{account}/status/{post_id}")
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
