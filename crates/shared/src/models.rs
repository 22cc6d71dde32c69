use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// The user that owns episodes when no `--user` is given
pub const DEFAULT_USER: &str = "global";

/// Lowercase a subreddit name and strip any `r/` prefix
pub fn normalize_subreddit(name: &str) -> String {
    let trimmed = name.trim().to_lowercase();
    trimmed
        .strip_prefix("r/")
        .map(str::to_string)
        .unwrap_or(trimmed)
}

/// A Reddit post saved by the fetch step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    /// Reddit's own id, e.g. `1abcde`
    pub id: String,
    pub subreddit: String,
    pub title: String,
    pub content: String,
    pub url: String,
    pub author: String,
    pub score: i64,
    pub num_comments: i64,
    pub created_utc: DateTime<Utc>,
    pub fetched_at: DateTime<Utc>,
    /// Users whose episodes already consumed this post. Only ever grows.
    #[serde(default)]
    pub used_by: BTreeSet<String>,
}

impl Post {
    pub fn is_used_by(&self, user_id: &str) -> bool {
        self.used_by.contains(user_id)
    }

    /// Score plus comment count, for `--sort engagement`
    pub fn engagement(&self) -> i64 {
        self.score.saturating_add(self.num_comments)
    }
}

/// A top-level comment saved alongside its post
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub author: String,
    pub body: String,
    pub score: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EpisodeStatus {
    Pending,
    Ready,
    Failed,
}

impl EpisodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EpisodeStatus::Pending => "pending",
            EpisodeStatus::Ready => "ready",
            EpisodeStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for EpisodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for EpisodeStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(EpisodeStatus::Pending),
            "ready" => Ok(EpisodeStatus::Ready),
            "failed" => Ok(EpisodeStatus::Failed),
            other => Err(format!("unknown episode status: {}", other)),
        }
    }
}

/// A generated (or attempted) podcast episode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    pub id: i64,
    pub user_id: String,
    /// Posts the episode was built from, in selection order
    pub post_ids: Vec<String>,
    pub title: String,
    pub description: String,
    pub audio_url: Option<String>,
    pub transcript_path: Option<String>,
    pub status: EpisodeStatus,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Episode {
    pub fn post_count(&self) -> usize {
        self.post_ids.len()
    }
}

/// How the selector ranks eligible posts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    #[default]
    Score,
    Recency,
    Engagement,
}

impl FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "score" => Ok(SortKey::Score),
            "recency" | "new" => Ok(SortKey::Recency),
            "engagement" => Ok(SortKey::Engagement),
            other => Err(format!(
                "Invalid sort: {}. Use 'score', 'recency' or 'engagement'",
                other
            )),
        }
    }
}

/// Voices handed to the TTS stage of the generator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceSettings {
    pub question: String,
    pub answer: String,
    pub tts_model: String,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            question: "okH1aHncYRU2dc9TP3hV".to_string(),
            answer: "WIX8boagHAO6uMUqxXLz".to_string(),
            tts_model: "eleven_multilingual_v2".to_string(),
        }
    }
}

/// Per-user generation settings; read-only input to selection and assembly
#[derive(Debug, Clone, PartialEq)]
pub struct UserConfig {
    pub user_id: String,
    pub subreddits: BTreeSet<String>,
    pub limit: i64,
    pub sort: SortKey,
    pub word_count: u32,
    pub longform: bool,
    pub voices: VoiceSettings,
}

impl UserConfig {
    pub fn new<I, S>(user_id: impl Into<String>, subreddits: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            user_id: user_id.into(),
            subreddits: subreddits
                .into_iter()
                .map(|s| normalize_subreddit(s.as_ref()))
                .collect(),
            limit: 5,
            sort: SortKey::default(),
            word_count: 500,
            longform: true,
            voices: VoiceSettings::default(),
        }
    }

    pub fn is_subscribed(&self, subreddit: &str) -> bool {
        self.subreddits.contains(&normalize_subreddit(subreddit))
    }
}
