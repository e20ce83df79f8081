// Twitter API v2 client for polling monitored accounts.
//
// Two-step timeline fetch (username -> user id -> recent tweets) plus a
// separate media expansion lookup, mirroring the upstream API shape. All
// parsing lives in small typed structs so it can be unit tested against
// recorded JSON payloads.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

const TWITTER_API_URL: &str = "https://api.twitter.com/2";

// ---------------------------------------------------------------------------
// Feed capability
// ---------------------------------------------------------------------------

/// A single post from a monitored account.
#[derive(Debug, Clone)]
pub struct Post {
    pub id: String,
    pub created_at: Option<DateTime<Utc>>,
    /// Whether the upstream flagged this post as carrying media attachments.
    /// The actual image URLs require a separate [`SocialFeed::media_for`]
    /// lookup.
    pub has_attachments: bool,
}

/// Capability to poll a social feed for recent posts and resolve their media.
#[async_trait]
pub trait SocialFeed: Send + Sync {
    /// The most recent non-reply posts for `account`, newest first. An empty
    /// vec means the account currently has nothing to relay.
    async fn latest_posts(&self, account: &str, limit: u32) -> anyhow::Result<Vec<Post>>;

    /// Image URLs attached to a post, in display order. Empty when the post
    /// has no usable images.
    async fn media_for(&self, post_id: &str) -> anyhow::Result<Vec<String>>;
}

// ---------------------------------------------------------------------------
// TwitterFeed
// ---------------------------------------------------------------------------

/// Twitter API v2 implementation of [`SocialFeed`] (bearer-token auth).
pub struct TwitterFeed {
    http: reqwest::Client,
    bearer_token: String,
}

impl TwitterFeed {
    pub fn new(bearer_token: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            bearer_token,
        }
    }

    /// Resolve an account handle to its numeric user id.
    async fn user_id(&self, account: &str) -> anyhow::Result<String> {
        let resp: UserLookupResponse = self
            .http
            .get(format!("{TWITTER_API_URL}/users/by/username/{account}"))
            .bearer_auth(&self.bearer_token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(resp.data.id)
    }
}

#[async_trait]
impl SocialFeed for TwitterFeed {
    async fn latest_posts(&self, account: &str, limit: u32) -> anyhow::Result<Vec<Post>> {
        let user_id = self.user_id(account).await?;

        let resp: TimelineResponse = self
            .http
            .get(format!("{TWITTER_API_URL}/users/{user_id}/tweets"))
            .query(&[
                ("max_results", limit.to_string().as_str()),
                ("exclude", "replies"),
                ("tweet.fields", "created_at,attachments"),
            ])
            .bearer_auth(&self.bearer_token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(resp.data.into_iter().map(Post::from).collect())
    }

    async fn media_for(&self, post_id: &str) -> anyhow::Result<Vec<String>> {
        let resp: MediaLookupResponse = self
            .http
            .get(format!("{TWITTER_API_URL}/tweets/{post_id}"))
            .query(&[
                ("expansions", "attachments.media_keys"),
                ("media.fields", "url,preview_image_url,type"),
            ])
            .bearer_auth(&self.bearer_token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(image_urls(&resp))
    }
}

// ---------------------------------------------------------------------------
// Response payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct UserLookupResponse {
    data: UserData,
}

#[derive(Debug, Deserialize)]
struct UserData {
    id: String,
}

#[derive(Debug, Deserialize)]
struct TimelineResponse {
    /// Absent entirely when the account has no (non-reply) tweets.
    #[serde(default)]
    data: Vec<TweetItem>,
}

#[derive(Debug, Deserialize)]
struct TweetItem {
    id: String,
    created_at: Option<DateTime<Utc>>,
    attachments: Option<Attachments>,
}

#[derive(Debug, Deserialize)]
struct Attachments {
    #[serde(default)]
    media_keys: Vec<String>,
}

impl From<TweetItem> for Post {
    fn from(tweet: TweetItem) -> Self {
        let has_attachments = tweet
            .attachments
            .as_ref()
            .is_some_and(|a| !a.media_keys.is_empty());
        Post {
            id: tweet.id,
            created_at: tweet.created_at,
            has_attachments,
        }
    }
}

#[derive(Debug, Deserialize)]
struct MediaLookupResponse {
    includes: Option<Includes>,
}

#[derive(Debug, Deserialize)]
struct Includes {
    #[serde(default)]
    media: Vec<MediaItem>,
}

#[derive(Debug, Deserialize)]
struct MediaItem {
    #[serde(rename = "type")]
    kind: String,
    url: Option<String>,
    preview_image_url: Option<String>,
}

/// Extract usable image URLs from a media expansion: photos and animated
/// GIFs count, and the full `url` is preferred over `preview_image_url`.
/// Videos and media without any URL are skipped.
fn image_urls(resp: &MediaLookupResponse) -> Vec<String> {
    let Some(includes) = &resp.includes else {
        return Vec::new();
    };

    includes
        .media
        .iter()
        .filter(|m| m.kind == "photo" || m.kind == "animated_gif")
        .filter_map(|m| m.url.clone().or_else(|| m.preview_image_url.clone()))
        .collect()
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeline_parses_ids_and_attachments() {
        let data = r#"{
            "data": [
                {
                    "id": "1001",
                    "created_at": "2026-08-01T12:30:00.000Z",
                    "attachments": { "media_keys": ["3_1"] }
                },
                { "id": "1000", "created_at": "2026-07-31T08:00:00.000Z" }
            ]
        }"#;

        let resp: TimelineResponse = serde_json::from_str(data).unwrap();
        let posts: Vec<Post> = resp.data.into_iter().map(Post::from).collect();

        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0].id, "1001");
        assert!(posts[0].has_attachments);
        assert!(posts[0].created_at.is_some());
        assert_eq!(posts[1].id, "1000");
        assert!(!posts[1].has_attachments);
    }

    #[test]
    fn empty_attachments_list_means_no_attachments() {
        let data = r#"{ "data": [ { "id": "1", "attachments": { "media_keys": [] } } ] }"#;
        let resp: TimelineResponse = serde_json::from_str(data).unwrap();
        let posts: Vec<Post> = resp.data.into_iter().map(Post::from).collect();
        assert!(!posts[0].has_attachments);
    }

    #[test]
    fn timeline_without_data_field_is_empty() {
        // The API omits `data` entirely for accounts with no tweets.
        let resp: TimelineResponse = serde_json::from_str(r#"{ "meta": { "result_count": 0 } }"#)
            .unwrap();
        assert!(resp.data.is_empty());
    }

    #[test]
    fn user_lookup_parses_id() {
        let data = r#"{ "data": { "id": "2244994945", "name": "NASA", "username": "nasa" } }"#;
        let resp: UserLookupResponse = serde_json::from_str(data).unwrap();
        assert_eq!(resp.data.id, "2244994945");
    }

    #[test]
    fn image_urls_keeps_photos_and_gifs_only() {
        let data = r#"{
            "includes": {
                "media": [
                    { "media_key": "3_1", "type": "photo", "url": "https://pbs.example/a.jpg" },
                    { "media_key": "3_2", "type": "video", "preview_image_url": "https://pbs.example/v.jpg" },
                    { "media_key": "3_3", "type": "animated_gif", "preview_image_url": "https://pbs.example/g.png" }
                ]
            }
        }"#;

        let resp: MediaLookupResponse = serde_json::from_str(data).unwrap();
        assert_eq!(
            image_urls(&resp),
            vec![
                "https://pbs.example/a.jpg".to_string(),
                "https://pbs.example/g.png".to_string(),
            ]
        );
    }

    #[test]
    fn image_urls_prefers_full_url_over_preview() {
        let data = r#"{
            "includes": {
                "media": [
                    {
                        "type": "photo",
                        "url": "https://pbs.example/full.jpg",
                        "preview_image_url": "https://pbs.example/preview.jpg"
                    }
                ]
            }
        }"#;

        let resp: MediaLookupResponse = serde_json::from_str(data).unwrap();
        assert_eq!(image_urls(&resp), vec!["https://pbs.example/full.jpg".to_string()]);
    }

    #[test]
    fn image_urls_empty_without_includes() {
        let resp: MediaLookupResponse =
            serde_json::from_str(r#"{ "data": { "id": "1" } }"#).unwrap();
        assert!(image_urls(&resp).is_empty());
    }

    #[test]
    fn media_without_any_url_is_skipped() {
        let data = r#"{ "includes": { "media": [ { "type": "photo" } ] } }"#;
        let resp: MediaLookupResponse = serde_json::from_str(data).unwrap();
        assert!(image_urls(&resp).is_empty());
    }
}
