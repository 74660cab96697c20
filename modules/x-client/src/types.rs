use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use replyflow_common::{CandidateItem, Provenance};

/// Author info nested inside a post. Field names vary across API versions,
/// so everything is optional and access goes through fallback methods.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawAuthor {
    #[serde(rename = "userName")]
    pub user_name: Option<String>,
    #[serde(rename = "screen_name")]
    pub screen_name: Option<String>,
    pub name: Option<String>,
    pub followers: Option<i64>,
    #[serde(rename = "followersCount")]
    pub followers_count: Option<i64>,
}

impl RawAuthor {
    /// The author's handle, trying `userName` then `screen_name`.
    pub fn handle(&self) -> Option<&str> {
        self.user_name.as_deref().or(self.screen_name.as_deref())
    }

    pub fn follower_count(&self) -> Option<i64> {
        self.followers.or(self.followers_count)
    }
}

/// A single post as returned by the scraper API. Response shapes are not
/// contractually stable: every field is optional and a post missing its
/// essentials is skipped, never an error.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawPost {
    pub id: Option<String>,
    #[serde(rename = "id_str")]
    pub id_str: Option<String>,
    pub text: Option<String>,
    #[serde(rename = "full_text")]
    pub full_text: Option<String>,
    pub url: Option<String>,
    #[serde(rename = "created_at")]
    pub created_at: Option<String>,
    pub author: Option<RawAuthor>,
    #[serde(rename = "isReply")]
    pub is_reply: Option<bool>,
    #[serde(rename = "inReplyToId")]
    pub in_reply_to_id: Option<String>,
    #[serde(rename = "likeCount")]
    pub like_count: Option<i64>,
    #[serde(rename = "retweetCount")]
    pub retweet_count: Option<i64>,
    #[serde(rename = "viewCount")]
    pub view_count: Option<i64>,
    #[serde(rename = "replyCount")]
    pub reply_count: Option<i64>,
}

impl RawPost {
    /// Whichever text field is populated, preferring `full_text`.
    pub fn content(&self) -> Option<&str> {
        self.full_text.as_deref().or(self.text.as_deref())
    }

    /// Whichever id field is populated, preferring `id`.
    pub fn post_id(&self) -> Option<&str> {
        self.id.as_deref().or(self.id_str.as_deref())
    }

    /// Reply flag, falling back to the presence of `inReplyToId`.
    pub fn reply_flag(&self) -> Option<bool> {
        self.is_reply.or(Some(self.in_reply_to_id.is_some()))
    }

    /// Timestamp parsed from RFC 3339 or Twitter's legacy RFC 2822 layout.
    /// Unparseable timestamps yield None, not an error.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        let raw = self.created_at.as_deref()?;
        if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
            return Some(ts.with_timezone(&Utc));
        }
        if let Ok(ts) = DateTime::parse_from_str(raw, "%a %b %d %H:%M:%S %z %Y") {
            return Some(ts.with_timezone(&Utc));
        }
        None
    }

    /// Convert to a pipeline CandidateItem. Posts missing an id, text, or
    /// author are dropped here — absence means "skip this item".
    pub fn into_candidate(self, provenance: Provenance) -> Option<CandidateItem> {
        let post_id = self.post_id()?.to_string();
        let text = self.content()?.to_string();
        let author = self.author.as_ref()?.handle()?.to_string();
        let url = self
            .url
            .clone()
            .unwrap_or_else(|| format!("https://x.com/{author}/status/{post_id}"));
        Some(CandidateItem {
            created_at: self.timestamp(),
            follower_count: self.author.as_ref().and_then(|a| a.follower_count()),
            is_reply: self.reply_flag(),
            post_id,
            text,
            author,
            url,
            provenance,
        })
    }
}

/// Request body for creating a reply.
#[derive(Debug, Clone, Serialize)]
pub struct CreatePostInput {
    pub text: String,
    #[serde(rename = "replyToId", skip_serializing_if = "Option::is_none")]
    pub reply_to_id: Option<String>,
}

/// Response from a successful post creation.
#[derive(Debug, Clone, Deserialize)]
pub struct CreatedPost {
    pub id: Option<String>,
    #[serde(rename = "id_str")]
    pub id_str: Option<String>,
}

impl CreatedPost {
    pub fn post_id(&self) -> Option<&str> {
        self.id.as_deref().or(self.id_str.as_deref())
    }
}

/// One entry in the operator's follower list.
#[derive(Debug, Clone, Deserialize)]
pub struct FollowerEntry {
    #[serde(rename = "userName")]
    pub user_name: Option<String>,
    #[serde(rename = "screen_name")]
    pub screen_name: Option<String>,
}

impl FollowerEntry {
    pub fn handle(&self) -> Option<&str> {
        self.user_name.as_deref().or(self.screen_name.as_deref())
    }
}

/// Wrapper most list endpoints use. Some deployments return a bare array,
/// so the client tries both shapes.
#[derive(Debug, Clone, Deserialize)]
pub struct ListResponse<T> {
    pub data: Option<Vec<T>>,
    pub items: Option<Vec<T>>,
}

impl<T> ListResponse<T> {
    pub fn into_items(self) -> Vec<T> {
        self.data.or(self.items).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use replyflow_common::SourceKind;

    fn provenance() -> Provenance {
        Provenance {
            kind: SourceKind::Search,
            label: "rustlang".to_string(),
        }
    }

    #[test]
    fn content_prefers_full_text() {
        let post = RawPost {
            text: Some("short".to_string()),
            full_text: Some("the full text".to_string()),
            ..Default::default()
        };
        assert_eq!(post.content(), Some("the full text"));
    }

    #[test]
    fn missing_author_skips_item() {
        let post = RawPost {
            id: Some("1".to_string()),
            text: Some("hello".to_string()),
            ..Default::default()
        };
        assert!(post.into_candidate(provenance()).is_none());
    }

    #[test]
    fn legacy_timestamp_parses() {
        let post = RawPost {
            created_at: Some("Wed Oct 10 20:19:24 +0000 2018".to_string()),
            ..Default::default()
        };
        assert!(post.timestamp().is_some());
    }

    #[test]
    fn garbage_timestamp_is_none_not_error() {
        let post = RawPost {
            created_at: Some("not a date".to_string()),
            ..Default::default()
        };
        assert!(post.timestamp().is_none());
    }

    #[test]
    fn candidate_url_synthesized_when_missing() {
        let post = RawPost {
            id: Some("99".to_string()),
            text: Some("hello world".to_string()),
            author: Some(RawAuthor {
                user_name: Some("alice".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let candidate = post.into_candidate(provenance()).unwrap();
        assert_eq!(candidate.url, "https://x.com/alice/status/99");
    }

    #[test]
    fn reply_flag_falls_back_to_in_reply_to_id() {
        let post = RawPost {
            in_reply_to_id: Some("5".to_string()),
            ..Default::default()
        };
        assert_eq!(post.reply_flag(), Some(true));
    }
}
