// Telegram Bot API client: publishing relayed posts, maintaining the vote
// control, and receiving updates via long polling.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

const TELEGRAM_API_URL: &str = "https://api.telegram.org";

/// Long-poll window for getUpdates.
const LONG_POLL_TIMEOUT_SECS: u64 = 30;

// ---------------------------------------------------------------------------
// Vote control rendering
// ---------------------------------------------------------------------------

/// Render the two-button like/dislike control for a post.
///
/// Each button's action id encodes the vote kind and the post id as
/// `{kind}_{post_id}`; [`crate::interaction::parse_action`] is the inverse.
pub fn vote_keyboard(post_id: &str, likes: i64, dislikes: i64) -> Value {
    json!({
        "inline_keyboard": [[
            { "text": format!("👍 {likes}"), "callback_data": format!("like_{post_id}") },
            { "text": format!("👎 {dislikes}"), "callback_data": format!("dislike_{post_id}") }
        ]]
    })
}

// ---------------------------------------------------------------------------
// Channel capabilities
// ---------------------------------------------------------------------------

/// Capability to publish messages and maintain interactive controls in the
/// relay channel.
#[async_trait]
pub trait MessageChannel: Send + Sync {
    /// Publish a text message with an attached control. Returns the channel
    /// message id.
    async fn publish_text(&self, text: &str, control: &Value) -> Result<i64>;

    /// Publish a single captioned image with an attached control. Returns the
    /// channel message id.
    async fn publish_image(&self, image_url: &str, caption: &str, control: &Value)
        -> Result<i64>;

    /// Publish a caption-less image gallery.
    async fn publish_image_gallery(&self, image_urls: &[String]) -> Result<()>;

    /// Replace the control on an existing message.
    async fn update_control(&self, message_id: i64, control: &Value) -> Result<()>;

    /// Acknowledge an interaction back to the initiating user. An empty
    /// `text` acknowledges silently.
    async fn acknowledge(&self, interaction_id: &str, text: &str) -> Result<()>;
}

/// Capability to receive bot updates and reply in direct chats (the command
/// surface, distinct from channel publishing).
#[async_trait]
pub trait UpdateSource: Send + Sync {
    /// Fetch updates with `update_id >= offset`, long-polling until some are
    /// available or the poll window closes.
    async fn next_updates(&self, offset: i64) -> Result<Vec<Update>>;

    /// Reply to a direct chat (status command).
    async fn reply_direct(&self, chat_id: i64, text: &str) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Update payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<IncomingMessage>,
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IncomingMessage {
    pub chat: Chat,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

/// A press on one of the vote-control buttons.
#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    /// The message carrying the pressed control. Absent for controls on
    /// messages too old for the API to reference.
    pub message: Option<MessageRef>,
    pub data: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageRef {
    pub message_id: i64,
}

// ---------------------------------------------------------------------------
// TelegramChannel
// ---------------------------------------------------------------------------

/// Telegram Bot API implementation of [`MessageChannel`] and
/// [`UpdateSource`], bound to one relay channel.
pub struct TelegramChannel {
    http: reqwest::Client,
    bot_token: String,
    chat_id: String,
}

impl TelegramChannel {
    pub fn new(bot_token: String, chat_id: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            bot_token,
            chat_id,
        }
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{TELEGRAM_API_URL}/bot{}/{method}", self.bot_token)
    }

    /// POST a Bot API method and unwrap its response envelope.
    async fn call<T: DeserializeOwned>(&self, method: &str, body: Value) -> Result<T> {
        let resp: ApiResponse<T> = self
            .http
            .post(self.endpoint(method))
            .json(&body)
            .send()
            .await
            .with_context(|| format!("telegram {method} request failed"))?
            .json()
            .await
            .with_context(|| format!("telegram {method} returned malformed JSON"))?;
        resp.into_result(method)
    }
}

#[async_trait]
impl MessageChannel for TelegramChannel {
    async fn publish_text(&self, text: &str, control: &Value) -> Result<i64> {
        let msg: Message = self
            .call(
                "sendMessage",
                json!({
                    "chat_id": self.chat_id,
                    "text": text,
                    "reply_markup": control,
                }),
            )
            .await?;
        Ok(msg.message_id)
    }

    async fn publish_image(
        &self,
        image_url: &str,
        caption: &str,
        control: &Value,
    ) -> Result<i64> {
        let msg: Message = self
            .call(
                "sendPhoto",
                json!({
                    "chat_id": self.chat_id,
                    "photo": image_url,
                    "caption": caption,
                    "reply_markup": control,
                }),
            )
            .await?;
        Ok(msg.message_id)
    }

    async fn publish_image_gallery(&self, image_urls: &[String]) -> Result<()> {
        let media: Vec<Value> = image_urls
            .iter()
            .map(|url| json!({ "type": "photo", "media": url }))
            .collect();
        let _: Vec<Message> = self
            .call(
                "sendMediaGroup",
                json!({
                    "chat_id": self.chat_id,
                    "media": media,
                }),
            )
            .await?;
        Ok(())
    }

    async fn update_control(&self, message_id: i64, control: &Value) -> Result<()> {
        let _: Value = self
            .call(
                "editMessageReplyMarkup",
                json!({
                    "chat_id": self.chat_id,
                    "message_id": message_id,
                    "reply_markup": control,
                }),
            )
            .await?;
        Ok(())
    }

    async fn acknowledge(&self, interaction_id: &str, text: &str) -> Result<()> {
        let mut body = json!({ "callback_query_id": interaction_id });
        if !text.is_empty() {
            body["text"] = json!(text);
        }
        let _: Value = self.call("answerCallbackQuery", body).await?;
        Ok(())
    }
}

#[async_trait]
impl UpdateSource for TelegramChannel {
    async fn next_updates(&self, offset: i64) -> Result<Vec<Update>> {
        self.call(
            "getUpdates",
            json!({
                "offset": offset,
                "timeout": LONG_POLL_TIMEOUT_SECS,
                "allowed_updates": ["message", "callback_query"],
            }),
        )
        .await
    }

    async fn reply_direct(&self, chat_id: i64, text: &str) -> Result<()> {
        let _: Message = self
            .call(
                "sendMessage",
                json!({
                    "chat_id": chat_id,
                    "text": text,
                }),
            )
            .await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Response payloads
// ---------------------------------------------------------------------------

/// The Bot API's uniform response envelope.
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

impl<T> ApiResponse<T> {
    fn into_result(self, method: &str) -> Result<T> {
        if self.ok {
            self.result
                .ok_or_else(|| anyhow!("telegram {method} returned ok without a result"))
        } else {
            Err(anyhow!(
                "telegram {method} failed: {}",
                self.description
                    .unwrap_or_else(|| "unknown error".to_string())
            ))
        }
    }
}

#[derive(Debug, Deserialize)]
struct Message {
    message_id: i64,
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
