//! SQLite-backed content store for posts, users and episodes.
//!
//! Which users have consumed a post lives in the `post_usage` relation rather
//! than on the post row; it is loaded into [`Post::used_by`] on read.

use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::models::{normalize_subreddit, Comment, Episode, EpisodeStatus, Post};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS users (
        name TEXT PRIMARY KEY,
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS user_subreddits (
        user_name TEXT NOT NULL REFERENCES users(name) ON DELETE CASCADE,
        subreddit TEXT NOT NULL,
        PRIMARY KEY (user_name, subreddit)
    );

    CREATE TABLE IF NOT EXISTS posts (
        id TEXT PRIMARY KEY,
        subreddit TEXT NOT NULL,
        title TEXT NOT NULL,
        content TEXT NOT NULL DEFAULT '',
        url TEXT NOT NULL,
        author TEXT NOT NULL,
        score INTEGER NOT NULL DEFAULT 0,
        num_comments INTEGER NOT NULL DEFAULT 0,
        created_utc TEXT NOT NULL,
        fetched_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_posts_subreddit ON posts(subreddit);

    CREATE TABLE IF NOT EXISTS post_comments (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        post_id TEXT NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
        author TEXT NOT NULL,
        body TEXT NOT NULL,
        score INTEGER NOT NULL DEFAULT 0
    );

    CREATE INDEX IF NOT EXISTS idx_post_comments_post ON post_comments(post_id);

    CREATE TABLE IF NOT EXISTS post_usage (
        post_id TEXT NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
        user_name TEXT NOT NULL,
        used_at TEXT NOT NULL,
        PRIMARY KEY (post_id, user_name)
    );

    CREATE TABLE IF NOT EXISTS episodes (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_name TEXT NOT NULL REFERENCES users(name),
        title TEXT NOT NULL,
        description TEXT NOT NULL,
        audio_url TEXT,
        transcript_path TEXT,
        status TEXT NOT NULL,
        error TEXT,
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS episode_posts (
        episode_id INTEGER NOT NULL REFERENCES episodes(id) ON DELETE CASCADE,
        position INTEGER NOT NULL,
        post_id TEXT NOT NULL REFERENCES posts(id),
        PRIMARY KEY (episode_id, position)
    );
"#;

const POST_COLUMNS: &str =
    "id, subreddit, title, content, url, author, score, num_comments, created_utc, fetched_at";

/// Keeps bound `IN (...)` lists well below SQLite's variable limit
const USAGE_BATCH: usize = 500;

pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        debug!("Opened content store at {}", path.display());
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    // Users and subscriptions

    pub fn get_or_create_user(&self, name: &str) -> Result<String> {
        ensure_user(&self.conn, name)?;
        Ok(name.to_string())
    }

    pub fn users(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare("SELECT name FROM users ORDER BY name")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(names)
    }

    /// Follow subreddits; returns (added, already followed)
    pub fn add_subreddits(
        &self,
        user: &str,
        names: &[String],
    ) -> Result<(Vec<String>, Vec<String>)> {
        ensure_user(&self.conn, user)?;
        let mut added = Vec::new();
        let mut existing = Vec::new();

        for name in names {
            let name = normalize_subreddit(name);
            let inserted = self.conn.execute(
                "INSERT OR IGNORE INTO user_subreddits (user_name, subreddit) VALUES (?1, ?2)",
                params![user, name],
            )?;
            if inserted > 0 {
                added.push(name);
            } else {
                existing.push(name);
            }
        }

        Ok((added, existing))
    }

    /// Unfollow subreddits; returns (removed, not followed)
    pub fn remove_subreddits(
        &self,
        user: &str,
        names: &[String],
    ) -> Result<(Vec<String>, Vec<String>)> {
        let mut removed = Vec::new();
        let mut not_found = Vec::new();

        for name in names {
            let name = normalize_subreddit(name);
            let deleted = self.conn.execute(
                "DELETE FROM user_subreddits WHERE user_name = ?1 AND subreddit = ?2",
                params![user, name],
            )?;
            if deleted > 0 {
                removed.push(name);
            } else {
                not_found.push(name);
            }
        }

        Ok((removed, not_found))
    }

    pub fn subreddits(&self, user: &str) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT subreddit FROM user_subreddits WHERE user_name = ?1 ORDER BY subreddit",
        )?;
        let subs = stmt
            .query_map([user], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(subs)
    }

    // Posts

    /// Which of `ids` are already stored
    pub fn existing_post_ids(&self, ids: &[String]) -> Result<BTreeSet<String>> {
        if ids.is_empty() {
            return Ok(BTreeSet::new());
        }
        let sql = format!(
            "SELECT id FROM posts WHERE id IN ({})",
            placeholders(ids.len())
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let found = stmt
            .query_map(params_from_iter(ids.iter()), |row| row.get(0))?
            .collect::<rusqlite::Result<BTreeSet<String>>>()?;
        Ok(found)
    }

    /// Save a post with its comments. Returns false if the post already exists.
    pub fn insert_post(&self, post: &Post, comments: &[Comment]) -> Result<bool> {
        let tx = self.conn.unchecked_transaction()?;

        let inserted = tx.execute(
            "INSERT OR IGNORE INTO posts
                (id, subreddit, title, content, url, author, score, num_comments, created_utc, fetched_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                post.id,
                normalize_subreddit(&post.subreddit),
                post.title,
                post.content,
                post.url,
                post.author,
                post.score,
                post.num_comments,
                post.created_utc,
                post.fetched_at,
            ],
        )?;

        if inserted == 0 {
            return Ok(false);
        }

        for comment in comments {
            tx.execute(
                "INSERT INTO post_comments (post_id, author, body, score) VALUES (?1, ?2, ?3, ?4)",
                params![post.id, comment.author, comment.body, comment.score],
            )?;
        }

        tx.commit()?;
        Ok(true)
    }

    /// All posts from the given subreddits, with their used-by sets loaded
    pub fn candidate_pool(&self, subreddits: &BTreeSet<String>) -> Result<Vec<Post>> {
        if subreddits.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT {} FROM posts WHERE subreddit IN ({})",
            POST_COLUMNS,
            placeholders(subreddits.len())
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut posts = stmt
            .query_map(params_from_iter(subreddits.iter()), post_from_row)?
            .collect::<rusqlite::Result<Vec<Post>>>()?;

        let sql = format!(
            "SELECT u.post_id, u.user_name FROM post_usage u
             JOIN posts p ON p.id = u.post_id
             WHERE p.subreddit IN ({})",
            placeholders(subreddits.len())
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut usage = HashMap::new();
        collect_usage(&mut stmt, params_from_iter(subreddits.iter()), &mut usage)?;
        apply_usage(&mut posts, usage);

        debug!(
            "Loaded {} candidate posts from {} subreddit(s)",
            posts.len(),
            subreddits.len()
        );
        Ok(posts)
    }

    /// Stored posts, most recently fetched first
    pub fn list_posts(&self, subreddit: Option<&str>, limit: usize) -> Result<Vec<Post>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut posts = match subreddit {
            Some(sub) => {
                let sql = format!(
                    "SELECT {} FROM posts WHERE subreddit = ?1 ORDER BY fetched_at DESC, id LIMIT ?2",
                    POST_COLUMNS
                );
                let mut stmt = self.conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(params![normalize_subreddit(sub), limit], post_from_row)?
                    .collect::<rusqlite::Result<Vec<Post>>>()?;
                rows
            }
            None => {
                let sql = format!(
                    "SELECT {} FROM posts ORDER BY fetched_at DESC, id LIMIT ?1",
                    POST_COLUMNS
                );
                let mut stmt = self.conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(params![limit], post_from_row)?
                    .collect::<rusqlite::Result<Vec<Post>>>()?;
                rows
            }
        };
        self.load_used_by(&mut posts)?;
        Ok(posts)
    }

    /// Top comments for a post, highest score first
    pub fn comments(&self, post_id: &str, limit: usize) -> Result<Vec<Comment>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut stmt = self.conn.prepare(
            "SELECT author, body, score FROM post_comments
             WHERE post_id = ?1 ORDER BY score DESC, id LIMIT ?2",
        )?;
        let comments = stmt
            .query_map(params![post_id, limit], |row| {
                Ok(Comment {
                    author: row.get(0)?,
                    body: row.get(1)?,
                    score: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<Comment>>>()?;
        Ok(comments)
    }

    /// Record that `user` consumed these posts. Re-marking is a no-op.
    pub fn mark_used(&self, user: &str, post_ids: &[String]) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        let marked = mark_used_in(&tx, user, post_ids)?;
        tx.commit()?;
        Ok(marked)
    }

    fn load_used_by(&self, posts: &mut [Post]) -> Result<()> {
        let mut usage = HashMap::new();
        for chunk in posts.chunks(USAGE_BATCH) {
            let sql = format!(
                "SELECT post_id, user_name FROM post_usage WHERE post_id IN ({})",
                placeholders(chunk.len())
            );
            let mut stmt = self.conn.prepare(&sql)?;
            collect_usage(
                &mut stmt,
                params_from_iter(chunk.iter().map(|p| p.id.as_str())),
                &mut usage,
            )?;
        }
        apply_usage(posts, usage);
        Ok(())
    }

    // Episodes

    /// Record a pending episode before generation starts
    pub fn create_episode(
        &self,
        user: &str,
        title: &str,
        description: &str,
        post_ids: &[String],
    ) -> Result<Episode> {
        let tx = self.conn.unchecked_transaction()?;
        ensure_user(&tx, user)?;

        let created_at = Utc::now();
        tx.execute(
            "INSERT INTO episodes (user_name, title, description, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![user, title, description, EpisodeStatus::Pending.as_str(), created_at],
        )?;
        let id = tx.last_insert_rowid();

        for (position, post_id) in post_ids.iter().enumerate() {
            tx.execute(
                "INSERT INTO episode_posts (episode_id, position, post_id) VALUES (?1, ?2, ?3)",
                params![id, position as i64, post_id],
            )?;
        }
        tx.commit()?;

        Ok(Episode {
            id,
            user_id: user.to_string(),
            post_ids: post_ids.to_vec(),
            title: title.to_string(),
            description: description.to_string(),
            audio_url: None,
            transcript_path: None,
            status: EpisodeStatus::Pending,
            error: None,
            created_at,
        })
    }

    /// Mark the episode's posts used and flip it to ready, atomically
    pub fn complete_episode(
        &self,
        episode_id: i64,
        audio_url: &str,
        transcript_path: Option<&str>,
    ) -> Result<Episode> {
        let episode = self.episode(episode_id)?;

        let tx = self.conn.unchecked_transaction()?;
        let marked = mark_used_in(&tx, &episode.user_id, &episode.post_ids)?;
        tx.execute(
            "UPDATE episodes SET status = ?1, audio_url = ?2, transcript_path = ?3, error = NULL
             WHERE id = ?4",
            params![
                EpisodeStatus::Ready.as_str(),
                audio_url,
                transcript_path,
                episode_id
            ],
        )?;
        tx.commit()?;

        info!(
            "Episode {} ready; marked {} post(s) used for {}",
            episode_id, marked, episode.user_id
        );
        self.episode(episode_id)
    }

    pub fn fail_episode(&self, episode_id: i64, message: &str) -> Result<Episode> {
        let updated = self.conn.execute(
            "UPDATE episodes SET status = ?1, error = ?2 WHERE id = ?3",
            params![EpisodeStatus::Failed.as_str(), message, episode_id],
        )?;
        if updated == 0 {
            return Err(Error::EpisodeNotFound(episode_id));
        }
        self.episode(episode_id)
    }

    pub fn episode(&self, id: i64) -> Result<Episode> {
        let episode = self
            .conn
            .query_row(
                "SELECT id, user_name, title, description, audio_url, transcript_path, status, error, created_at
                 FROM episodes WHERE id = ?1",
                [id],
                episode_from_row,
            )
            .optional()?
            .ok_or(Error::EpisodeNotFound(id))?;
        self.with_post_ids(episode)
    }

    /// Episodes newest first, optionally for one user
    pub fn list_episodes(&self, user: Option<&str>) -> Result<Vec<Episode>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_name, title, description, audio_url, transcript_path, status, error, created_at
             FROM episodes
             WHERE ?1 IS NULL OR user_name = ?1
             ORDER BY created_at DESC, id DESC",
        )?;
        let episodes = stmt
            .query_map([user], episode_from_row)?
            .collect::<rusqlite::Result<Vec<Episode>>>()?;

        episodes
            .into_iter()
            .map(|episode| self.with_post_ids(episode))
            .collect()
    }

    fn with_post_ids(&self, mut episode: Episode) -> Result<Episode> {
        let mut stmt = self.conn.prepare(
            "SELECT post_id FROM episode_posts WHERE episode_id = ?1 ORDER BY position",
        )?;
        episode.post_ids = stmt
            .query_map([episode.id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(episode)
    }

    // Bulk clear

    pub fn count_posts(&self) -> Result<usize> {
        count(&self.conn, "SELECT COUNT(*) FROM posts")
    }

    pub fn count_episodes(&self) -> Result<usize> {
        count(&self.conn, "SELECT COUNT(*) FROM episodes")
    }

    /// Delete every post, its comments and usage rows.
    ///
    /// Refused while episodes exist so episode history never points at posts
    /// that are gone.
    pub fn clear_posts(&self) -> Result<usize> {
        let episodes = self.count_episodes()?;
        if episodes > 0 {
            return Err(Error::PostsReferenced { episodes });
        }
        let deleted = self.conn.execute("DELETE FROM posts", [])?;
        info!("Cleared {} posts", deleted);
        Ok(deleted)
    }

    /// Delete every episode. Post usage is kept: a used post stays used.
    pub fn clear_episodes(&self) -> Result<usize> {
        let deleted = self.conn.execute("DELETE FROM episodes", [])?;
        info!("Cleared {} episodes", deleted);
        Ok(deleted)
    }
}

fn ensure_user(conn: &Connection, name: &str) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO users (name, created_at) VALUES (?1, ?2)",
        params![name, Utc::now()],
    )?;
    Ok(())
}

fn mark_used_in(conn: &Connection, user: &str, post_ids: &[String]) -> Result<usize> {
    let now = Utc::now();
    let mut stmt = conn.prepare(
        "INSERT OR IGNORE INTO post_usage (post_id, user_name, used_at) VALUES (?1, ?2, ?3)",
    )?;
    let mut marked = 0;
    for post_id in post_ids {
        marked += stmt.execute(params![post_id, user, now])?;
    }
    Ok(marked)
}

fn count(conn: &Connection, sql: &str) -> Result<usize> {
    let n: i64 = conn.query_row(sql, [], |row| row.get(0))?;
    Ok(n as usize)
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

fn collect_usage<P: rusqlite::Params>(
    stmt: &mut rusqlite::Statement<'_>,
    params: P,
    usage: &mut HashMap<String, BTreeSet<String>>,
) -> Result<()> {
    let rows = stmt.query_map(params, |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;
    for row in rows {
        let (post_id, user) = row?;
        usage.entry(post_id).or_default().insert(user);
    }
    Ok(())
}

fn apply_usage(posts: &mut [Post], mut usage: HashMap<String, BTreeSet<String>>) {
    for post in posts.iter_mut() {
        post.used_by = usage.remove(&post.id).unwrap_or_default();
    }
}

fn post_from_row(row: &Row<'_>) -> rusqlite::Result<Post> {
    Ok(Post {
        id: row.get(0)?,
        subreddit: row.get(1)?,
        title: row.get(2)?,
        content: row.get(3)?,
        url: row.get(4)?,
        author: row.get(5)?,
        score: row.get(6)?,
        num_comments: row.get(7)?,
        created_utc: row.get::<_, DateTime<Utc>>(8)?,
        fetched_at: row.get::<_, DateTime<Utc>>(9)?,
        used_by: BTreeSet::new(),
    })
}

fn episode_from_row(row: &Row<'_>) -> rusqlite::Result<Episode> {
    let status: String = row.get(6)?;
    let status = status.parse::<EpisodeStatus>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            6,
            rusqlite::types::Type::Text,
            e.into(),
        )
    })?;

    Ok(Episode {
        id: row.get(0)?,
        user_id: row.get(1)?,
        post_ids: Vec::new(),
        title: row.get(2)?,
        description: row.get(3)?,
        audio_url: row.get(4)?,
        transcript_path: row.get(5)?,
        status,
        error: row.get(7)?,
        created_at: row.get(8)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn post(id: &str, subreddit: &str, score: i64) -> Post {
        let base = Utc.with_ymd_and_hms(2026, 2, 3, 8, 0, 0).unwrap();
        Post {
            id: id.to_string(),
            subreddit: subreddit.to_string(),
            title: format!("Title {}", id),
            content: "body".to_string(),
            url: format!("https://www.reddit.com/r/{}/comments/{}/", subreddit, id),
            author: "author".to_string(),
            score,
            num_comments: 3,
            created_utc: base,
            fetched_at: base + Duration::minutes(score),
            used_by: BTreeSet::new(),
        }
    }

    fn ids(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_insert_post_deduplicates_by_reddit_id() {
        let store = Store::open_in_memory().unwrap();
        let p = post("abc", "rust", 10);

        assert!(store.insert_post(&p, &[]).unwrap());
        assert!(!store.insert_post(&p, &[]).unwrap());
        assert_eq!(store.count_posts().unwrap(), 1);

        let existing = store.existing_post_ids(&ids(&["abc", "zzz"])).unwrap();
        assert_eq!(existing.into_iter().collect::<Vec<_>>(), vec!["abc"]);
    }

    #[test]
    fn test_post_round_trips_through_sqlite() {
        let store = Store::open_in_memory().unwrap();
        let p = post("abc", "R/Rust", 10);
        store.insert_post(&p, &[]).unwrap();

        let subs: BTreeSet<String> = ["rust".to_string()].into();
        let pool = store.candidate_pool(&subs).unwrap();
        assert_eq!(pool.len(), 1);
        assert_eq!(pool[0].subreddit, "rust");
        assert_eq!(pool[0].created_utc, p.created_utc);
        assert_eq!(pool[0].fetched_at, p.fetched_at);
        assert!(pool[0].used_by.is_empty());
    }

    #[test]
    fn test_candidate_pool_filters_subreddits_and_loads_usage() {
        let store = Store::open_in_memory().unwrap();
        store.insert_post(&post("a", "python", 1), &[]).unwrap();
        store.insert_post(&post("b", "rust", 2), &[]).unwrap();
        store.mark_used("alice", &ids(&["a"])).unwrap();

        let subs: BTreeSet<String> = ["python".to_string()].into();
        let pool = store.candidate_pool(&subs).unwrap();
        assert_eq!(pool.len(), 1);
        assert!(pool[0].is_used_by("alice"));
        assert!(!pool[0].is_used_by("bob"));

        assert!(store.candidate_pool(&BTreeSet::new()).unwrap().is_empty());
    }

    #[test]
    fn test_candidate_pool_scales_past_sqlite_variable_limit() {
        let store = Store::open_in_memory().unwrap();
        let base = post("seed", "rust", 0);
        for i in 0..33_000 {
            let mut p = base.clone();
            p.id = format!("p{}", i);
            store.insert_post(&p, &[]).unwrap();
        }
        store.mark_used("alice", &ids(&["p0", "p32999"])).unwrap();

        let subs: BTreeSet<String> = ["rust".to_string()].into();
        let pool = store.candidate_pool(&subs).unwrap();
        assert_eq!(pool.len(), 33_000);
        assert_eq!(pool.iter().filter(|p| p.is_used_by("alice")).count(), 2);

        let listed = store.list_posts(Some("rust"), 40_000).unwrap();
        assert_eq!(listed.len(), 33_000);
        assert_eq!(listed.iter().filter(|p| p.is_used_by("alice")).count(), 2);
    }

    #[test]
    fn test_mark_used_is_idempotent() {
        let store = Store::open_in_memory().unwrap();
        store.insert_post(&post("a", "rust", 1), &[]).unwrap();

        assert_eq!(store.mark_used("alice", &ids(&["a"])).unwrap(), 1);
        assert_eq!(store.mark_used("alice", &ids(&["a"])).unwrap(), 0);

        let posts = store.list_posts(None, 10).unwrap();
        assert_eq!(posts[0].used_by.len(), 1);
    }

    #[test]
    fn test_comments_are_ordered_by_score() {
        let store = Store::open_in_memory().unwrap();
        let comments = vec![
            Comment {
                author: "low".to_string(),
                body: "meh".to_string(),
                score: 1,
            },
            Comment {
                author: "high".to_string(),
                body: "great point".to_string(),
                score: 99,
            },
        ];
        store.insert_post(&post("a", "rust", 1), &comments).unwrap();

        let top = store.comments("a", 1).unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].author, "high");
    }

    #[test]
    fn test_subscriptions() {
        let store = Store::open_in_memory().unwrap();
        let (added, existing) = store
            .add_subreddits("global", &ids(&["r/Rust", "python"]))
            .unwrap();
        assert_eq!(added, vec!["rust", "python"]);
        assert!(existing.is_empty());

        let (added, existing) = store.add_subreddits("global", &ids(&["rust"])).unwrap();
        assert!(added.is_empty());
        assert_eq!(existing, vec!["rust"]);

        assert_eq!(store.subreddits("global").unwrap(), vec!["python", "rust"]);

        let (removed, not_found) = store
            .remove_subreddits("global", &ids(&["python", "golang"]))
            .unwrap();
        assert_eq!(removed, vec!["python"]);
        assert_eq!(not_found, vec!["golang"]);
        assert_eq!(store.users().unwrap(), vec!["global"]);
    }

    #[test]
    fn test_episode_lifecycle() {
        let store = Store::open_in_memory().unwrap();
        store.insert_post(&post("a", "rust", 1), &[]).unwrap();
        store.insert_post(&post("b", "rust", 2), &[]).unwrap();

        let episode = store
            .create_episode("alice", "Reddit Digest: r/rust", "Generated from 2 Reddit posts", &ids(&["b", "a"]))
            .unwrap();
        assert_eq!(episode.status, EpisodeStatus::Pending);

        let loaded = store.episode(episode.id).unwrap();
        assert_eq!(loaded.post_ids, ids(&["b", "a"]));
        assert_eq!(loaded.status, EpisodeStatus::Pending);

        let ready = store
            .complete_episode(episode.id, "/tmp/alice/episode-1.mp3", None)
            .unwrap();
        assert_eq!(ready.status, EpisodeStatus::Ready);
        assert_eq!(ready.audio_url.as_deref(), Some("/tmp/alice/episode-1.mp3"));

        let posts = store.list_posts(Some("rust"), 10).unwrap();
        assert!(posts.iter().all(|p| p.is_used_by("alice")));
    }

    #[test]
    fn test_failed_episode_leaves_posts_unused() {
        let store = Store::open_in_memory().unwrap();
        store.insert_post(&post("a", "rust", 1), &[]).unwrap();

        let episode = store.create_episode("alice", "t", "d", &ids(&["a"])).unwrap();
        let failed = store.fail_episode(episode.id, "tts exploded").unwrap();
        assert_eq!(failed.status, EpisodeStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("tts exploded"));

        let posts = store.list_posts(None, 10).unwrap();
        assert!(posts[0].used_by.is_empty());

        assert!(matches!(
            store.fail_episode(999, "x"),
            Err(Error::EpisodeNotFound(999))
        ));
    }

    #[test]
    fn test_list_episodes_by_user() {
        let store = Store::open_in_memory().unwrap();
        store.insert_post(&post("a", "rust", 1), &[]).unwrap();
        store.create_episode("alice", "t1", "d", &ids(&["a"])).unwrap();
        store.create_episode("bob", "t2", "d", &ids(&["a"])).unwrap();

        assert_eq!(store.list_episodes(None).unwrap().len(), 2);
        let alice = store.list_episodes(Some("alice")).unwrap();
        assert_eq!(alice.len(), 1);
        assert_eq!(alice[0].title, "t1");
        assert_eq!(alice[0].post_ids, ids(&["a"]));
    }

    #[test]
    fn test_clear_posts_refused_while_episodes_exist() {
        let store = Store::open_in_memory().unwrap();
        store.insert_post(&post("a", "rust", 1), &[]).unwrap();
        store.create_episode("alice", "t", "d", &ids(&["a"])).unwrap();

        assert!(matches!(
            store.clear_posts(),
            Err(Error::PostsReferenced { episodes: 1 })
        ));
        assert_eq!(store.count_posts().unwrap(), 1);

        assert_eq!(store.clear_episodes().unwrap(), 1);
        assert_eq!(store.clear_posts().unwrap(), 1);
        assert_eq!(store.count_posts().unwrap(), 0);
    }

    #[test]
    fn test_clear_episodes_keeps_usage() {
        let store = Store::open_in_memory().unwrap();
        store.insert_post(&post("a", "rust", 1), &[]).unwrap();
        let episode = store.create_episode("alice", "t", "d", &ids(&["a"])).unwrap();
        store.complete_episode(episode.id, "/tmp/a.mp3", None).unwrap();

        store.clear_episodes().unwrap();
        let posts = store.list_posts(None, 10).unwrap();
        assert!(posts[0].is_used_by("alice"));
    }

    #[test]
    fn test_open_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("podcast.db");
        let store = Store::open(&path).unwrap();
        store.insert_post(&post("a", "rust", 1), &[]).unwrap();
        drop(store);

        let reopened = Store::open(&path).unwrap();
        assert_eq!(reopened.count_posts().unwrap(), 1);
    }
}
