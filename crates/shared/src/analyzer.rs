use anyhow::{Context, Result};
use futures::stream::{self, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::models::Post;

/// Claude's verdict on whether a post deserves a deep dive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Analysis {
    /// 0-10 "juiciness" rating
    pub score: u8,
    /// Worth pulling in the discussion (top comments)
    pub deep_dive: bool,
    pub reasoning: String,
}

impl Default for Analysis {
    fn default() -> Self {
        Self {
            score: 5,
            deep_dive: false,
            reasoning: "Analysis unavailable. Using default score.".to_string(),
        }
    }
}

#[derive(Serialize)]
struct ClaudeRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<Message>,
}

#[derive(Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ClaudeResponse {
    content: Vec<Content>,
}

#[derive(Deserialize)]
struct Content {
    text: String,
}

pub struct ClaudeAnalyzer {
    client: Client,
    api_key: String,
}

impl ClaudeAnalyzer {
    pub fn new(api_key: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client, api_key })
    }

    /// Rate a post. Any API or parse failure falls back to the default analysis.
    pub async fn analyze_post(&self, post: &Post) -> Analysis {
        match self.try_analyze(post).await {
            Ok(analysis) => analysis,
            Err(e) => {
                warn!("Analysis failed for {}: {:#}", post.id, e);
                Analysis::default()
            }
        }
    }

    async fn try_analyze(&self, post: &Post) -> Result<Analysis> {
        let content = if post.content.trim().is_empty() {
            "No text content (link post)"
        } else {
            post.content.as_str()
        };

        let prompt = format!(
            r#"Analyze this Reddit post to determine if it's worth deep-diving in a podcast episode.

Post Title: {}
Subreddit: r/{}
URL: {}
Content: {}

Rate this post 0-10 for podcast "juiciness" based on:
1. Is the title intriguing, controversial, or discussion-worthy?
2. Would listeners find this interesting or entertaining?
3. Is there a story, drama, hot take, or useful insight here?
4. Would the comment discussion add value? (yes for debates and stories, no for image/video posts)

Be generous with scores - anything mildly interesting should be 5+. Only score 0-2 for truly boring posts.

Respond in this exact format:
SCORE: [0-10]
FETCH_URL: [yes/no]
REASONING: [1-2 sentence explanation]"#,
            post.title, post.subreddit, post.url, content
        );

        let request = ClaudeRequest {
            model: "claude-haiku-4-5".to_string(),
            max_tokens: 256,
            messages: vec![Message {
                role: "user".to_string(),
                content: prompt,
            }],
        };

        let response = self
            .client
            .post("https://api.anthropic.com/v1/messages")
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .context("Failed to send request to Claude API")?;

        if !response.status().is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("unknown error"));
            anyhow::bail!("Claude API error: {}", error_text);
        }

        let claude_response = response
            .json::<ClaudeResponse>()
            .await
            .context("Failed to parse Claude API response")?;

        let text = claude_response
            .content
            .first()
            .map(|c| c.text.as_str())
            .unwrap_or("");

        Ok(parse_analysis(text))
    }

    /// Analyze posts two at a time; results come back in input order
    pub async fn analyze_posts(&self, posts: &[Post]) -> Vec<Analysis> {
        stream::iter(posts)
            .map(|post| self.analyze_post(post))
            .buffered(2)
            .collect()
            .await
    }
}

/// Parse the `SCORE:` / `FETCH_URL:` / `REASONING:` reply format
pub fn parse_analysis(text: &str) -> Analysis {
    let mut analysis = Analysis {
        reasoning: String::new(),
        ..Analysis::default()
    };

    for line in text.lines() {
        let trimmed = line.trim();
        let Some((key, value)) = trimmed.split_once(':') else {
            continue;
        };
        let value = value.trim();

        match key.trim().to_uppercase().as_str() {
            "SCORE" => {
                // Handles "7", "7/10", "[7]"
                let digits: String = value
                    .chars()
                    .skip_while(|c| !c.is_ascii_digit())
                    .take_while(|c| c.is_ascii_digit())
                    .collect();
                if let Ok(score) = digits.parse::<u32>() {
                    analysis.score = score.min(10) as u8;
                }
            }
            "FETCH_URL" => analysis.deep_dive = value.to_lowercase().contains("yes"),
            "REASONING" => analysis.reasoning = value.to_string(),
            _ => {}
        }
    }

    analysis
}
