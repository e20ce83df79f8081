// Vote interaction handling: applies votes and keeps the displayed control
// in sync with stored tallies.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, warn};

use crate::channel::{vote_keyboard, CallbackQuery, MessageChannel, Update, UpdateSource};
use crate::ledger::{VoteKind, VoteLedger, VoteOutcome};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// How long to wait before retrying after a failed update poll.
const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Action parsing
// ---------------------------------------------------------------------------

/// Parse a control action id (`like_{post_id}` / `dislike_{post_id}`).
///
/// Splits on the *first* underscore, so post ids containing underscores
/// still round-trip. Returns `None` for anything that is not a well-formed
/// vote action.
pub fn parse_action(data: &str) -> Option<(VoteKind, &str)> {
    let (kind, post_id) = data.split_once('_')?;
    let kind = VoteKind::parse(kind)?;
    if post_id.is_empty() {
        return None;
    }
    Some((kind, post_id))
}

/// A vote interaction extracted from a raw callback query.
#[derive(Debug, Clone)]
pub struct VoteAction {
    pub interaction_id: String,
    pub user_id: i64,
    /// The message carrying the pressed control, when the platform still
    /// references it.
    pub message_id: Option<i64>,
    pub data: String,
}

impl VoteAction {
    /// Extract a `VoteAction` from a callback query. Returns `None` when the
    /// query carries no data payload.
    pub fn from_callback(callback: &CallbackQuery) -> Option<Self> {
        let data = callback.data.clone()?;
        Some(VoteAction {
            interaction_id: callback.id.clone(),
            user_id: callback.from.id,
            message_id: callback.message.as_ref().map(|m| m.message_id),
            data,
        })
    }
}

// ---------------------------------------------------------------------------
// InteractionHandler
// ---------------------------------------------------------------------------

/// Applies a vote interaction and reconciles the displayed control with the
/// stored tallies.
pub struct InteractionHandler {
    ledger: VoteLedger,
    channel: Arc<dyn MessageChannel>,
}

impl InteractionHandler {
    pub fn new(ledger: VoteLedger, channel: Arc<dyn MessageChannel>) -> Self {
        Self { ledger, channel }
    }

    /// Handle one vote interaction.
    ///
    /// - Tallies changed: re-render the control on the originating message
    ///   (a failed re-render is swallowed; stored tallies stay authoritative)
    ///   and acknowledge the press.
    /// - Unknown post: nothing happens.
    /// - Store error: no re-render, acknowledge neutrally.
    pub async fn handle(&self, action: &VoteAction) -> Result<()> {
        let Some((kind, post_id)) = parse_action(&action.data) else {
            debug!("ignoring unparseable control action {:?}", action.data);
            return Ok(());
        };

        match self.ledger.apply_vote(action.user_id, post_id, kind) {
            Ok(VoteOutcome::Updated { likes, dislikes }) => {
                if let Some(message_id) = action.message_id {
                    let control = vote_keyboard(post_id, likes, dislikes);
                    if let Err(e) = self.channel.update_control(message_id, &control).await {
                        warn!("failed to refresh control on message {message_id}: {e:#}");
                    }
                }
                self.channel.acknowledge(&action.interaction_id, "✅").await
            }
            Ok(VoteOutcome::NoChange) => {
                debug!("vote for unknown post {post_id} ignored");
                Ok(())
            }
            Err(e) => {
                warn!("vote application failed for post {post_id}: {e:#}");
                self.channel.acknowledge(&action.interaction_id, "").await
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Update dispatch loop
// ---------------------------------------------------------------------------

/// Route one update: callback presses go to the handler, `/start` gets the
/// status reply, everything else is ignored. Returns the offset that
/// excludes this update.
///
/// Exposed so the dispatch logic can be tested without a live poll loop.
pub async fn dispatch(
    update: Update,
    handler: &InteractionHandler,
    source: &dyn UpdateSource,
    status_text: &str,
) -> i64 {
    let next_offset = update.update_id + 1;

    if let Some(callback) = update.callback_query {
        match VoteAction::from_callback(&callback) {
            Some(action) => {
                if let Err(e) = handler.handle(&action).await {
                    warn!("interaction handling failed: {e:#}");
                }
            }
            None => debug!("callback query {} carried no data", callback.id),
        }
    } else if let Some(message) = update.message {
        if message.text.as_deref().is_some_and(|t| t.starts_with("/start")) {
            if let Err(e) = source.reply_direct(message.chat.id, status_text).await {
                warn!("status reply failed: {e:#}");
            }
        }
    }

    next_offset
}

/// Consume updates from `source` forever, routing each through [`dispatch`].
/// A failed poll is logged and retried after a short delay.
pub async fn run(
    source: Arc<dyn UpdateSource>,
    handler: InteractionHandler,
    status_text: String,
) -> Result<()> {
    let mut offset = 0i64;
    loop {
        let updates = match source.next_updates(offset).await {
            Ok(updates) => updates,
            Err(e) => {
                warn!("update poll failed: {e:#}");
                tokio::time::sleep(POLL_RETRY_DELAY).await;
                continue;
            }
        };

        for update in updates {
            offset = offset.max(dispatch(update, &handler, source.as_ref(), &status_text).await);
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use anyhow::bail;
    use async_trait::async_trait;
    use serde_json::Value;

    use crate::channel::{Chat, IncomingMessage, MessageRef, User};
    use crate::db::Database;

    // -- parse_action --

    #[test]
    fn parse_action_accepts_both_kinds() {
        assert_eq!(parse_action("like_1001"), Some((VoteKind::Like, "1001")));
        assert_eq!(
            parse_action("dislike_1001"),
            Some((VoteKind::Dislike, "1001"))
        );
    }

    #[test]
    fn parse_action_keeps_underscores_in_post_id() {
        assert_eq!(
            parse_action("like_post_with_underscores"),
            Some((VoteKind::Like, "post_with_underscores"))
        );
    }

    #[test]
    fn parse_action_rejects_malformed_data() {
        assert_eq!(parse_action(""), None);
        assert_eq!(parse_action("like"), None);
        assert_eq!(parse_action("like_"), None);
        assert_eq!(parse_action("upvote_1001"), None);
        assert_eq!(parse_action("nounderscore"), None);
    }

    #[test]
    fn parse_action_round_trips_rendered_action_ids() {
        for kind in [VoteKind::Like, VoteKind::Dislike] {
            let data = format!("{}_99_01", kind.as_str());
            assert_eq!(parse_action(&data), Some((kind, "99_01")));
        }
    }

    // -- Test doubles --

    /// Records control updates and acknowledgements.
    #[derive(Default)]
    struct RecordingChannel {
        control_updates: Mutex<Vec<(i64, Value)>>,
        acks: Mutex<Vec<(String, String)>>,
        update_control_fails: bool,
    }

    #[async_trait]
    impl MessageChannel for RecordingChannel {
        async fn publish_text(&self, _text: &str, _control: &Value) -> Result<i64> {
            Ok(1)
        }

        async fn publish_image(
            &self,
            _image_url: &str,
            _caption: &str,
            _control: &Value,
        ) -> Result<i64> {
            Ok(1)
        }

        async fn publish_image_gallery(&self, _image_urls: &[String]) -> Result<()> {
            Ok(())
        }

        async fn update_control(&self, message_id: i64, control: &Value) -> Result<()> {
            if self.update_control_fails {
                bail!("scripted edit failure");
            }
            self.control_updates
                .lock()
                .unwrap()
                .push((message_id, control.clone()));
            Ok(())
        }

        async fn acknowledge(&self, interaction_id: &str, text: &str) -> Result<()> {
            self.acks
                .lock()
                .unwrap()
                .push((interaction_id.to_string(), text.to_string()));
            Ok(())
        }
    }

    /// Records direct replies; never polls.
    #[derive(Default)]
    struct RecordingSource {
        replies: Mutex<Vec<(i64, String)>>,
    }

    #[async_trait]
    impl UpdateSource for RecordingSource {
        async fn next_updates(&self, _offset: i64) -> Result<Vec<Update>> {
            Ok(vec![])
        }

        async fn reply_direct(&self, chat_id: i64, text: &str) -> Result<()> {
            self.replies
                .lock()
                .unwrap()
                .push((chat_id, text.to_string()));
            Ok(())
        }
    }

    fn handler_with_post(channel: Arc<RecordingChannel>) -> InteractionHandler {
        let db = Arc::new(Database::open(":memory:").unwrap());
        db.seed_post("1001", "nasa", 77).unwrap();
        InteractionHandler::new(VoteLedger::new(db), channel)
    }

    fn vote_action(data: &str) -> VoteAction {
        VoteAction {
            interaction_id: "cb-1".to_string(),
            user_id: 12345,
            message_id: Some(77),
            data: data.to_string(),
        }
    }

    // -- InteractionHandler --

    #[tokio::test]
    async fn vote_rerenders_control_and_acknowledges() {
        let channel = Arc::new(RecordingChannel::default());
        let handler = handler_with_post(channel.clone());

        handler.handle(&vote_action("like_1001")).await.unwrap();

        let updates = channel.control_updates.lock().unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].0, 77);
        assert_eq!(updates[0].1["inline_keyboard"][0][0]["text"], "👍 1");
        drop(updates);

        let acks = channel.acks.lock().unwrap();
        assert_eq!(acks.as_slice(), &[("cb-1".to_string(), "✅".to_string())]);
    }

    #[tokio::test]
    async fn failed_rerender_is_swallowed_and_still_acknowledged() {
        let channel = Arc::new(RecordingChannel {
            update_control_fails: true,
            ..Default::default()
        });
        let handler = handler_with_post(channel.clone());

        handler.handle(&vote_action("like_1001")).await.unwrap();

        // The vote landed despite the stale display.
        let acks = channel.acks.lock().unwrap();
        assert_eq!(acks.len(), 1);
        assert_eq!(acks[0].1, "✅");
    }

    #[tokio::test]
    async fn unknown_post_does_nothing() {
        let channel = Arc::new(RecordingChannel::default());
        let db = Arc::new(Database::open(":memory:").unwrap());
        let handler = InteractionHandler::new(VoteLedger::new(db), channel.clone());

        handler.handle(&vote_action("like_ghost")).await.unwrap();

        assert!(channel.control_updates.lock().unwrap().is_empty());
        assert!(channel.acks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn malformed_action_is_ignored() {
        let channel = Arc::new(RecordingChannel::default());
        let handler = handler_with_post(channel.clone());

        handler.handle(&vote_action("garbage")).await.unwrap();

        assert!(channel.control_updates.lock().unwrap().is_empty());
        assert!(channel.acks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn vote_without_message_reference_skips_rerender() {
        let channel = Arc::new(RecordingChannel::default());
        let handler = handler_with_post(channel.clone());

        let action = VoteAction {
            message_id: None,
            ..vote_action("like_1001")
        };
        handler.handle(&action).await.unwrap();

        assert!(channel.control_updates.lock().unwrap().is_empty());
        // The vote still landed and was acknowledged.
        assert_eq!(channel.acks.lock().unwrap().len(), 1);
    }

    // -- dispatch --

    fn callback_update(update_id: i64, data: &str) -> Update {
        Update {
            update_id,
            message: None,
            callback_query: Some(CallbackQuery {
                id: format!("cb-{update_id}"),
                from: User { id: 12345 },
                message: Some(MessageRef { message_id: 77 }),
                data: Some(data.to_string()),
            }),
        }
    }

    #[tokio::test]
    async fn dispatch_routes_callback_to_handler() {
        let channel = Arc::new(RecordingChannel::default());
        let handler = handler_with_post(channel.clone());
        let source = RecordingSource::default();

        let next = dispatch(callback_update(9000, "like_1001"), &handler, &source, "hi").await;

        assert_eq!(next, 9001);
        assert_eq!(channel.acks.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn dispatch_replies_to_start_command() {
        let channel = Arc::new(RecordingChannel::default());
        let handler = handler_with_post(channel);
        let source = RecordingSource::default();

        let update = Update {
            update_id: 9001,
            message: Some(IncomingMessage {
                chat: Chat { id: 555 },
                text: Some("/start".to_string()),
            }),
            callback_query: None,
        };
        let next = dispatch(update, &handler, &source, "Relaying to @relay_channel").await;

        assert_eq!(next, 9002);
        let replies = source.replies.lock().unwrap();
        assert_eq!(
            replies.as_slice(),
            &[(555, "Relaying to @relay_channel".to_string())]
        );
    }

    #[tokio::test]
    async fn dispatch_advances_offset_past_unhandled_updates() {
        let channel = Arc::new(RecordingChannel::default());
        let handler = handler_with_post(channel.clone());
        let source = RecordingSource::default();

        // A bare update with neither message nor callback must still advance
        // the offset so the poll loop never sees it again.
        let update = Update {
            update_id: 9002,
            message: None,
            callback_query: None,
        };
        let next = dispatch(update, &handler, &source, "hi").await;

        assert_eq!(next, 9003);
        assert!(channel.acks.lock().unwrap().is_empty());
        assert!(source.replies.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn dispatch_ignores_callback_without_data() {
        let channel = Arc::new(RecordingChannel::default());
        let handler = handler_with_post(channel.clone());
        let source = RecordingSource::default();

        let update = Update {
            update_id: 9003,
            message: None,
            callback_query: Some(CallbackQuery {
                id: "cb-empty".to_string(),
                from: User { id: 12345 },
                message: None,
                data: None,
            }),
        };
        let next = dispatch(update, &handler, &source, "hi").await;

        assert_eq!(next, 9004);
        assert!(channel.acks.lock().unwrap().is_empty());
    }
}
