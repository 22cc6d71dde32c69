//! Picks the next batch of posts for a user's episode.
//!
//! Selection is pure: it filters and ranks a candidate pool and never touches
//! the store. Posts are only marked used once an episode has been generated.

use std::cmp::Ordering;

use crate::error::{Error, Result};
use crate::models::{Post, SortKey, UserConfig};

/// Select up to `limit` posts ranked by the user's sort key
pub fn select(user: &UserConfig, limit: i64, pool: &[Post]) -> Result<Vec<Post>> {
    let sort = user.sort;
    select_with(user, limit, pool, |a, b| compare_by_key(sort, a, b))
}

/// Select with a caller-supplied ranking.
///
/// `compare` orders the best post first. Ties it leaves are broken by fetch
/// time (oldest first, to work through the backlog) and then by post id, so
/// the result is fully deterministic.
pub fn select_with<F>(user: &UserConfig, limit: i64, pool: &[Post], compare: F) -> Result<Vec<Post>>
where
    F: Fn(&Post, &Post) -> Ordering,
{
    if limit <= 0 {
        return Err(Error::InvalidLimit(limit));
    }

    let mut eligible: Vec<&Post> = pool
        .iter()
        .filter(|post| user.is_subscribed(&post.subreddit))
        .filter(|post| !post.is_used_by(&user.user_id))
        .collect();

    if eligible.is_empty() {
        return Err(Error::EmptyCandidatePool);
    }

    eligible.sort_by(|a, b| {
        compare(*a, *b)
            .then_with(|| a.fetched_at.cmp(&b.fetched_at))
            .then_with(|| a.id.cmp(&b.id))
    });

    let take = usize::try_from(limit).unwrap_or(usize::MAX);
    Ok(eligible.into_iter().take(take).cloned().collect())
}

fn compare_by_key(sort: SortKey, a: &Post, b: &Post) -> Ordering {
    match sort {
        SortKey::Score => b.score.cmp(&a.score),
        SortKey::Recency => b.created_utc.cmp(&a.created_utc),
        SortKey::Engagement => b.engagement().cmp(&a.engagement()),
    }
}
