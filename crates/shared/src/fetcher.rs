use anyhow::Result;
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::debug;

use crate::models::{Comment, Post};
use crate::reddit::{adaptive_delay, ListingSort, RateLimit, RedditClient, TimeFilter};
use crate::store::Store;

/// Base delay between comment requests; keeps unauthenticated use under 10 QPM
pub const COMMENT_DELAY: Duration = Duration::from_secs(6);

#[derive(Debug, Clone, Copy)]
pub struct FetchOptions {
    pub sort: ListingSort,
    pub time_filter: TimeFilter,
    pub post_limit: u32,
    pub comment_limit: usize,
    pub comment_delay: Duration,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            sort: ListingSort::Hot,
            time_filter: TimeFilter::Day,
            post_limit: 100,
            comment_limit: 10,
            comment_delay: COMMENT_DELAY,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FetchSummary {
    pub new_posts: usize,
    pub new_comments: usize,
    pub rate_limit: RateLimit,
}

/// Fetch a subreddit listing and save the posts we haven't seen yet.
///
/// Comments are only fetched for new posts. Everything is collected first and
/// saved at the end, so a failure part-way leaves the subreddit untouched.
pub async fn fetch_and_save_subreddit<F>(
    client: &RedditClient,
    store: &Store,
    subreddit: &str,
    options: &FetchOptions,
    mut on_progress: F,
) -> Result<FetchSummary>
where
    F: FnMut(&str),
{
    on_progress("fetching posts...");
    let (posts, mut rate_limit) = client
        .fetch_subreddit(
            subreddit,
            options.sort,
            options.time_filter,
            options.post_limit,
        )
        .await?;

    let ids: Vec<String> = posts.iter().map(|p| p.id.clone()).collect();
    let existing = store.existing_post_ids(&ids)?;
    let new_posts = unseen_posts(posts, &existing);
    debug!(
        "r/{}: {} new posts, {} already stored",
        subreddit,
        new_posts.len(),
        existing.len()
    );

    let mut with_comments: Vec<(Post, Vec<Comment>)> = Vec::with_capacity(new_posts.len());
    let total = new_posts.len();
    for (i, post) in new_posts.into_iter().enumerate() {
        let delay = adaptive_delay(&rate_limit, options.comment_delay);
        let eta = delay.as_secs() * (total - i) as u64;
        on_progress(&format!(
            "fetching comments ({}/{}) - ~{}m{:02}s remaining",
            i + 1,
            total,
            eta / 60,
            eta % 60
        ));
        tokio::time::sleep(delay).await;

        let (comments, last) = client.fetch_comments(&post.url, options.comment_limit).await;
        if last != RateLimit::default() {
            rate_limit = last;
        }
        with_comments.push((post, comments));
    }

    on_progress("saving to database...");
    let mut summary = save_batch(store, &with_comments)?;
    summary.rate_limit = rate_limit;
    Ok(summary)
}

/// Posts not in `existing`, in listing order, each id at most once
pub fn unseen_posts(posts: Vec<Post>, existing: &BTreeSet<String>) -> Vec<Post> {
    let mut seen = BTreeSet::new();
    posts
        .into_iter()
        .filter(|p| !existing.contains(&p.id) && seen.insert(p.id.clone()))
        .collect()
}

/// Insert a fetched batch, counting only rows that were actually new
pub fn save_batch(store: &Store, batch: &[(Post, Vec<Comment>)]) -> Result<FetchSummary> {
    let mut summary = FetchSummary::default();
    for (post, comments) in batch {
        if store.insert_post(post, comments)? {
            summary.new_posts += 1;
            summary.new_comments += comments.len();
        }
    }
    Ok(summary)
}

/// Rough upper bound on fetch time, assuming every post is new
pub fn estimate_fetch_time(subreddits: usize, post_limit: u32, delay: Duration) -> String {
    let seconds = delay.as_secs() * subreddits as u64 * post_limit as u64;
    let (hours, rem) = (seconds / 3600, seconds % 3600);
    let (minutes, seconds) = (rem / 60, rem % 60);

    if hours > 0 {
        format!("~{}h {}m max", hours, minutes)
    } else if minutes > 0 {
        format!("~{}m {}s max", minutes, seconds)
    } else {
        format!("~{}s max", seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn post(id: &str) -> Post {
        let at = Utc.with_ymd_and_hms(2026, 2, 4, 7, 30, 0).unwrap();
        Post {
            id: id.to_string(),
            subreddit: "rust".to_string(),
            title: format!("Title {}", id),
            content: String::new(),
            url: format!("https://www.reddit.com/r/rust/comments/{}/", id),
            author: "poster".to_string(),
            score: 1,
            num_comments: 0,
            created_utc: at,
            fetched_at: at,
            used_by: BTreeSet::new(),
        }
    }

    fn comment(body: &str) -> Comment {
        Comment {
            author: "commenter".to_string(),
            body: body.to_string(),
            score: 2,
        }
    }

    #[test]
    fn test_unseen_posts_skips_stored_and_repeated_ids() {
        let existing: BTreeSet<String> = ["b".to_string()].into();
        let listing = vec![post("a"), post("b"), post("c"), post("a")];

        let fresh = unseen_posts(listing, &existing);
        let ids: Vec<&str> = fresh.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[test]
    fn test_save_batch_counts_only_new_rows() {
        let store = Store::open_in_memory().unwrap();
        store.insert_post(&post("old"), &[]).unwrap();

        let batch = vec![
            (post("old"), vec![comment("ignored")]),
            (post("new"), vec![comment("first"), comment("second")]),
        ];
        let summary = save_batch(&store, &batch).unwrap();
        assert_eq!(summary.new_posts, 1);
        assert_eq!(summary.new_comments, 2);
        assert_eq!(store.count_posts().unwrap(), 2);
        assert!(store.comments("old", 10).unwrap().is_empty());

        let again = save_batch(&store, &batch).unwrap();
        assert_eq!(again.new_posts, 0);
        assert_eq!(again.new_comments, 0);
    }

    #[test]
    fn test_listing_then_save_skips_known_posts() {
        let store = Store::open_in_memory().unwrap();
        store.insert_post(&post("p1"), &[]).unwrap();

        let listing = vec![post("p1"), post("p2"), post("p3")];
        let ids: Vec<String> = listing.iter().map(|p| p.id.clone()).collect();
        let existing = store.existing_post_ids(&ids).unwrap();
        let batch: Vec<(Post, Vec<Comment>)> = unseen_posts(listing, &existing)
            .into_iter()
            .map(|p| (p, Vec::new()))
            .collect();

        assert_eq!(batch.len(), 2);
        assert_eq!(save_batch(&store, &batch).unwrap().new_posts, 2);
        assert_eq!(store.count_posts().unwrap(), 3);
    }

    #[test]
    fn test_estimate_fetch_time() {
        let delay = Duration::from_secs(6);
        assert_eq!(estimate_fetch_time(1, 5, delay), "~30s max");
        assert_eq!(estimate_fetch_time(2, 25, delay), "~5m 0s max");
        assert_eq!(estimate_fetch_time(3, 100, delay), "~30m 0s max");
        assert_eq!(estimate_fetch_time(10, 100, delay), "~1h 40m max");
    }
}
