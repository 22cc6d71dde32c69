//! Renders selected posts into the text handed to the podcast generator.

use std::collections::BTreeSet;

use crate::models::{Comment, Post};

const POST_SEPARATOR: &str = "\n---\n\n";
const MAX_COMMENT_CHARS: usize = 500;

/// Comments included per post when it gets a deep dive
pub const MAX_COMMENTS: usize = 5;

/// Seconds of audio per post, from past episodes
pub const SECONDS_PER_POST_LONGFORM: u32 = 180;
pub const SECONDS_PER_POST_SHORTFORM: u32 = 50;

pub fn format_post(post: &Post, comments: &[Comment]) -> String {
    let mut parts = vec![
        format!("**{}**", post.title),
        format!("From r/{} by {}", post.subreddit, post.author),
    ];

    if !post.content.trim().is_empty() {
        parts.push(format!("\n{}", post.content.trim()));
    }

    if !comments.is_empty() {
        parts.push("\n**Top Comments:**".to_string());
        for (i, comment) in comments.iter().take(MAX_COMMENTS).enumerate() {
            parts.push(format!(
                "{}. {} ({} points): {}",
                i + 1,
                comment.author,
                comment.score,
                truncate(&comment.body, MAX_COMMENT_CHARS)
            ));
        }
    }

    parts.join("\n")
}

/// Join rendered posts into a single generator input
pub fn build_text_input(sections: &[String]) -> String {
    sections.join(POST_SEPARATOR)
}

/// "Reddit Digest: r/a, r/b, r/c and N more", subreddits in first-seen order
pub fn episode_title(posts: &[Post]) -> String {
    let mut seen = BTreeSet::new();
    let subreddits: Vec<&str> = posts
        .iter()
        .map(|p| p.subreddit.as_str())
        .filter(|s| seen.insert(*s))
        .collect();

    let listed = subreddits
        .iter()
        .take(3)
        .map(|s| format!("r/{}", s))
        .collect::<Vec<_>>()
        .join(", ");

    let mut title = format!("Reddit Digest: {}", listed);
    if subreddits.len() > 3 {
        title.push_str(&format!(" and {} more", subreddits.len() - 3));
    }
    title
}

pub fn episode_description(post_count: usize) -> String {
    format!("Generated from {} Reddit posts", post_count)
}

/// Post count that fills roughly `minutes` of longform audio
pub fn limit_for_duration(minutes: u32) -> i64 {
    let posts = (f64::from(minutes) * 60.0 / f64::from(SECONDS_PER_POST_LONGFORM)).round() as i64;
    posts.max(1)
}

/// Estimated episode length in minutes
pub fn estimated_minutes(post_count: i64, longform: bool) -> f64 {
    let per_post = if longform {
        SECONDS_PER_POST_LONGFORM
    } else {
        SECONDS_PER_POST_SHORTFORM
    };
    post_count as f64 * f64::from(per_post) / 60.0
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
