//! Quality filter — cheap, pure checks that run before any generation call.
//!
//! Generation is the expensive, rate-limited step, so everything here is
//! deterministic string work: no I/O, no clock reads (the caller passes
//! `now`).

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use regex::Regex;

use replyflow_common::{CandidateItem, SourceKind};

/// Why a candidate was dropped. Surfaced in debug logs and discovery stats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    IsReply,
    TooShort,
    LinkOnly,
    HashtagSpam,
    SpamPattern,
    Stale,
    ExcludedAuthor,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::IsReply => "is_reply",
            RejectReason::TooShort => "too_short",
            RejectReason::LinkOnly => "link_only",
            RejectReason::HashtagSpam => "hashtag_spam",
            RejectReason::SpamPattern => "spam_pattern",
            RejectReason::Stale => "stale",
            RejectReason::ExcludedAuthor => "excluded_author",
        }
    }
}

const DEFAULT_SPAM_PATTERNS: &[&str] = &[
    r"(?i)\b(giveaway|airdrop|whitelist|presale)\b",
    r"(?i)\b(dm me|link in bio|check my profile)\b",
    r"(?i)\b(buy now|limited offer|50% off|discount code)\b",
    r"(?i)\bfollow\s+(me|back|for follow)\b",
];

pub struct QualityFilter {
    min_chars: usize,
    min_non_url_chars: usize,
    max_hashtags: usize,
    max_search_age: Duration,
    reject_replies: bool,
    spam_patterns: Vec<Regex>,
    url_pattern: Regex,
    hashtag_pattern: Regex,
    excluded_authors: HashSet<String>,
}

impl QualityFilter {
    pub fn new(excluded_authors: impl IntoIterator<Item = String>) -> Self {
        Self {
            min_chars: 20,
            min_non_url_chars: 15,
            max_hashtags: 3,
            max_search_age: Duration::hours(24),
            reject_replies: true,
            spam_patterns: DEFAULT_SPAM_PATTERNS
                .iter()
                .map(|p| Regex::new(p).expect("spam pattern must compile"))
                .collect(),
            url_pattern: Regex::new(r"https?://\S+").expect("url pattern must compile"),
            hashtag_pattern: Regex::new(r"#\w+").expect("hashtag pattern must compile"),
            excluded_authors: excluded_authors
                .into_iter()
                .map(|a| a.to_lowercase())
                .collect(),
        }
    }

    pub fn accepts(&self, candidate: &CandidateItem, now: DateTime<Utc>) -> bool {
        self.check(candidate, now).is_ok()
    }

    /// Run every check in cheapest-first order and return the first failure.
    pub fn check(&self, candidate: &CandidateItem, now: DateTime<Utc>) -> Result<(), RejectReason> {
        if self
            .excluded_authors
            .contains(&candidate.author.to_lowercase())
        {
            return Err(RejectReason::ExcludedAuthor);
        }
        if self.reject_replies && candidate.is_reply.unwrap_or(false) {
            return Err(RejectReason::IsReply);
        }

        let text = candidate.text.trim();
        if text.chars().count() < self.min_chars {
            return Err(RejectReason::TooShort);
        }

        let without_urls = self.url_pattern.replace_all(text, "");
        if without_urls.trim().chars().count() < self.min_non_url_chars {
            return Err(RejectReason::LinkOnly);
        }

        if self.hashtag_pattern.find_iter(text).count() > self.max_hashtags {
            return Err(RejectReason::HashtagSpam);
        }

        if self.spam_patterns.iter().any(|p| p.is_match(text)) {
            return Err(RejectReason::SpamPattern);
        }

        // Staleness only applies to search and community results. Account
        // polling enforces its own (tighter) window upstream.
        if candidate.provenance.kind != SourceKind::Account {
            if let Some(created) = candidate.created_at {
                if now - created > self.max_search_age {
                    return Err(RejectReason::Stale);
                }
            }
        }

        Ok(())
    }
}
