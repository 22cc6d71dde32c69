use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::models::{normalize_subreddit, Comment, Post};

const REDDIT_BASE: &str = "https://www.reddit.com";
const MAX_LISTING_LIMIT: u32 = 100;
const MAX_RETRIES: u32 = 3;

/// Listing order for a subreddit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingSort {
    Hot,
    New,
    Top,
    Rising,
    Controversial,
}

impl ListingSort {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListingSort::Hot => "hot",
            ListingSort::New => "new",
            ListingSort::Top => "top",
            ListingSort::Rising => "rising",
            ListingSort::Controversial => "controversial",
        }
    }

    /// Only these listings accept a `t=` time filter
    fn takes_time_filter(&self) -> bool {
        matches!(self, ListingSort::Top | ListingSort::Controversial)
    }
}

impl fmt::Display for ListingSort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ListingSort {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hot" => Ok(ListingSort::Hot),
            "new" => Ok(ListingSort::New),
            "top" => Ok(ListingSort::Top),
            "rising" => Ok(ListingSort::Rising),
            "controversial" => Ok(ListingSort::Controversial),
            other => Err(format!(
                "Invalid sort: {}. Use hot, new, top, rising or controversial",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeFilter {
    Hour,
    Day,
    Week,
    Month,
    Year,
    All,
}

impl TimeFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeFilter::Hour => "hour",
            TimeFilter::Day => "day",
            TimeFilter::Week => "week",
            TimeFilter::Month => "month",
            TimeFilter::Year => "year",
            TimeFilter::All => "all",
        }
    }
}

impl FromStr for TimeFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hour" => Ok(TimeFilter::Hour),
            "day" => Ok(TimeFilter::Day),
            "week" => Ok(TimeFilter::Week),
            "month" => Ok(TimeFilter::Month),
            "year" => Ok(TimeFilter::Year),
            "all" => Ok(TimeFilter::All),
            other => Err(format!(
                "Invalid time filter: {}. Use hour, day, week, month, year or all",
                other
            )),
        }
    }
}

/// Reddit's `X-Ratelimit-*` headers from the last response
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RateLimit {
    pub remaining: Option<f64>,
    pub reset_seconds: Option<f64>,
}

impl RateLimit {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        // Reddit sends these as floats, e.g. "99.0"
        let read = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<f64>().ok())
                .filter(|v| v.is_finite())
        };
        Self {
            remaining: read("x-ratelimit-remaining"),
            reset_seconds: read("x-ratelimit-reset"),
        }
    }

    /// The reset window as a wait, clamped to `0..=MAX_RESET_WAIT`
    pub fn reset_delay(&self) -> Option<Duration> {
        self.reset_seconds
            .filter(|secs| secs.is_finite())
            .map(|secs| secs.clamp(0.0, MAX_RESET_WAIT.as_secs_f64()))
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
    }
}

/// Longest we will sleep on a reset header
const MAX_RESET_WAIT: Duration = Duration::from_secs(3600);

/// How long to wait before the next request given the last rate limit headers
pub fn adaptive_delay(rate_limit: &RateLimit, base: Duration) -> Duration {
    let remaining = rate_limit
        .remaining
        .filter(|r| r.is_finite())
        .unwrap_or(100.0);

    if remaining < 5.0 {
        // Almost out, wait for the window to reset
        rate_limit.reset_delay().unwrap_or(Duration::from_secs(60))
    } else if remaining < 20.0 {
        base * 2
    } else {
        base
    }
}

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    children: Vec<Thing>,
}

#[derive(Debug, Deserialize)]
struct Thing {
    kind: String,
    data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct RedditPost {
    id: String,
    title: String,
    #[serde(default)]
    selftext: String,
    permalink: String,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    score: i64,
    #[serde(default)]
    num_comments: i64,
    created_utc: f64,
}

#[derive(Debug, Deserialize)]
struct RedditComment {
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    body: String,
    #[serde(default)]
    score: i64,
}

/// Turn a subreddit listing into posts, keeping only `t3` (link) entries
pub fn parse_listing(body: &str, subreddit: &str, fetched_at: DateTime<Utc>) -> Result<Vec<Post>> {
    let listing: Listing =
        serde_json::from_str(body).context("Failed to parse Reddit listing JSON")?;
    let subreddit = normalize_subreddit(subreddit);

    let mut posts = Vec::new();
    for child in listing.data.children {
        if child.kind != "t3" {
            continue;
        }
        let raw: RedditPost = match serde_json::from_value(child.data) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Skipping malformed post in r/{}: {}", subreddit, e);
                continue;
            }
        };
        let created_utc = DateTime::from_timestamp(raw.created_utc as i64, 0).unwrap_or(fetched_at);
        posts.push(Post {
            id: raw.id,
            subreddit: subreddit.clone(),
            title: raw.title,
            content: raw.selftext,
            url: format!("{}{}", REDDIT_BASE, raw.permalink),
            author: raw.author.unwrap_or_else(|| "[deleted]".to_string()),
            score: raw.score,
            num_comments: raw.num_comments,
            created_utc,
            fetched_at,
            used_by: Default::default(),
        });
    }

    Ok(posts)
}

/// Top-level comments from a post page (`[post_listing, comment_listing]`)
pub fn parse_comments(body: &str, limit: usize) -> Result<Vec<Comment>> {
    let listings: Vec<Listing> =
        serde_json::from_str(body).context("Failed to parse Reddit comments JSON")?;

    let Some(comment_listing) = listings.into_iter().nth(1) else {
        return Ok(Vec::new());
    };

    let mut comments: Vec<Comment> = comment_listing
        .data
        .children
        .into_iter()
        .filter(|child| child.kind == "t1")
        .filter_map(|child| serde_json::from_value::<RedditComment>(child.data).ok())
        .map(|c| Comment {
            author: c.author.unwrap_or_else(|| "[deleted]".to_string()),
            body: c.body,
            score: c.score,
        })
        .collect();

    comments.sort_by(|a, b| b.score.cmp(&a.score));
    comments.truncate(limit);
    Ok(comments)
}

pub fn listing_url(
    subreddit: &str,
    sort: ListingSort,
    time_filter: TimeFilter,
    limit: u32,
) -> Result<Url> {
    if limit > MAX_LISTING_LIMIT {
        anyhow::bail!(
            "Limit of {} exceeds Reddit's max of {} per request",
            limit,
            MAX_LISTING_LIMIT
        );
    }

    let mut url = Url::parse(&format!(
        "{}/r/{}/{}.json",
        REDDIT_BASE,
        normalize_subreddit(subreddit),
        sort
    ))
    .context("Failed to build subreddit URL")?;

    {
        let mut query = url.query_pairs_mut();
        query.append_pair("limit", &limit.to_string());
        if sort.takes_time_filter() {
            query.append_pair("t", time_filter.as_str());
        }
    }
    Ok(url)
}

/// `<post url>.json?limit=N`
pub fn comments_url(post_url: &str, limit: usize) -> Result<Url> {
    let mut url = Url::parse(post_url).context("Invalid post URL")?;
    let path = format!("{}.json", url.path().trim_end_matches('/'));
    url.set_path(&path);
    url.query_pairs_mut().append_pair("limit", &limit.to_string());
    Ok(url)
}

pub struct RedditClient {
    client: Client,
}

impl RedditClient {
    pub fn new(user_agent: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .user_agent(user_agent)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client })
    }

    pub async fn fetch_subreddit(
        &self,
        subreddit: &str,
        sort: ListingSort,
        time_filter: TimeFilter,
        limit: u32,
    ) -> Result<(Vec<Post>, RateLimit)> {
        let url = listing_url(subreddit, sort, time_filter, limit)?;
        let response = self
            .get_with_retry(url)
            .await
            .with_context(|| format!("Failed to fetch r/{}", subreddit))?;

        let rate_limit = RateLimit::from_headers(response.headers());
        let body = response
            .text()
            .await
            .context("Failed to read Reddit response body")?;

        let posts = parse_listing(&body, subreddit, Utc::now())?;
        debug!("Fetched {} posts from r/{}", posts.len(), subreddit);
        Ok((posts, rate_limit))
    }

    /// Top comments for a post. Failures are logged and yield no comments.
    pub async fn fetch_comments(&self, post_url: &str, limit: usize) -> (Vec<Comment>, RateLimit) {
        match self.try_fetch_comments(post_url, limit).await {
            Ok(result) => result,
            Err(e) => {
                warn!("Failed to fetch comments for {}: {:#}", post_url, e);
                (Vec::new(), RateLimit::default())
            }
        }
    }

    async fn try_fetch_comments(
        &self,
        post_url: &str,
        limit: usize,
    ) -> Result<(Vec<Comment>, RateLimit)> {
        let url = comments_url(post_url, limit)?;
        let response = self.get_with_retry(url).await?;
        let rate_limit = RateLimit::from_headers(response.headers());
        let body = response.text().await.context("Failed to read response body")?;
        Ok((parse_comments(&body, limit)?, rate_limit))
    }

    /// GET with backoff on HTTP 429, honoring Reddit's reset header
    async fn get_with_retry(&self, url: Url) -> Result<Response> {
        let mut backoff = Duration::from_secs(1);

        for attempt in 0..=MAX_RETRIES {
            let response = self
                .client
                .get(url.clone())
                .send()
                .await
                .context("Failed to send request to Reddit")?;

            let status = response.status();
            if status == StatusCode::TOO_MANY_REQUESTS && attempt < MAX_RETRIES {
                let reset = RateLimit::from_headers(response.headers())
                    .reset_delay()
                    .unwrap_or(backoff);
                let wait = reset.max(backoff);
                warn!(
                    "Reddit is rate limiting us for {}s (retry {}/{})",
                    wait.as_secs(),
                    attempt + 1,
                    MAX_RETRIES
                );
                tokio::time::sleep(wait).await;
                backoff *= 2;
                continue;
            }

            if !status.is_success() {
                let error_text = response
                    .text()
                    .await
                    .unwrap_or_else(|_| String::from("unknown error"));
                anyhow::bail!("Reddit returned error: {} - {}", status, error_text);
            }

            return Ok(response);
        }

        anyhow::bail!("Max retries exhausted for {}", url)
    }
}
