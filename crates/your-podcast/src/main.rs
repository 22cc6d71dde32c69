use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use shared::content::{estimated_minutes, limit_for_duration};
use shared::fetcher::estimate_fetch_time;
use shared::generator::{LLM_MODEL, TTS_BACKEND};
use shared::reddit::adaptive_delay;
use shared::{
    append_generation_log, fetch_and_save_subreddit, get_default_log_path, select, Assembler,
    ClaudeAnalyzer, Config, Error, FetchOptions, GenerationStats, ListingSort, PodcastfyGenerator,
    RedditClient, SortKey, Store, TimeFilter, UserConfig, DEFAULT_USER,
};
use std::io::{self as stdio, Write};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

const DEFAULT_POST_LIMIT: i64 = 5;

#[derive(Parser)]
#[command(name = "your-podcast")]
#[command(about = "Generate personalized podcasts from Reddit content")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch posts and comments from Reddit via the JSON API
    Fetch {
        /// Subreddits to fetch (defaults to the user's subscriptions)
        subreddits: Vec<String>,

        /// Listing to read (hot, new, top, rising, controversial)
        #[arg(short, long, default_value = "hot")]
        sort: ListingSort,

        /// Time filter for top/controversial (hour, day, week, month, year, all)
        #[arg(short, long, default_value = "day")]
        time: TimeFilter,

        /// Posts per subreddit (max 100)
        #[arg(short, long, default_value = "100")]
        limit: u32,

        /// Comments per post
        #[arg(short, long, default_value = "10")]
        comments: usize,

        /// User whose subscriptions to fetch when no subreddits are given
        #[arg(short, long, default_value = DEFAULT_USER)]
        user: String,
    },

    /// Generate a podcast episode from posts not yet used for this user
    Generate {
        /// Number of posts to include (default 5)
        #[arg(short, long, conflicts_with = "duration")]
        limit: Option<i64>,

        /// Target duration in minutes; picks the post count for you
        #[arg(short, long)]
        duration: Option<u32>,

        /// Only use these subreddits (defaults to the user's subscriptions)
        #[arg(short, long = "subreddit")]
        subreddits: Vec<String>,

        /// Ranking: score, recency or engagement
        #[arg(long, default_value = "score")]
        sort: SortKey,

        /// Output directory for podcast audio (defaults to PODCAST_OUTPUT_DIR)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Shorter podcast (2-5 min); may truncate with many posts
        #[arg(long)]
        shortform: bool,

        /// Skip the Claude pass that picks which posts get their comments included
        #[arg(long)]
        no_analysis: bool,

        /// User the episode is for (tracks which posts they've heard)
        #[arg(short, long, default_value = DEFAULT_USER)]
        user: String,
    },

    /// Clear data from the database
    Clear {
        /// Clear all posts (refused while episodes exist)
        #[arg(long)]
        posts: bool,

        /// Clear all episodes
        #[arg(long)]
        episodes: bool,

        /// Clear episodes, then posts
        #[arg(long)]
        all: bool,

        /// Skip confirmation
        #[arg(short, long)]
        force: bool,
    },

    /// Manage subreddit subscriptions
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// List stored posts, most recently fetched first
    Posts {
        /// Only this subreddit
        #[arg(short, long)]
        subreddit: Option<String>,

        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// List generated episodes, newest first
    Episodes {
        /// Only this user's episodes
        #[arg(short, long)]
        user: Option<String>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Follow subreddits
    Add {
        subreddits: Vec<String>,
        #[arg(short, long, default_value = DEFAULT_USER)]
        user: String,
    },
    /// Show followed subreddits
    List {
        #[arg(short, long, default_value = DEFAULT_USER)]
        user: String,
    },
    /// Unfollow subreddits
    Remove {
        subreddits: Vec<String>,
        #[arg(short, long, default_value = DEFAULT_USER)]
        user: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    let config = Config::from_env()?;
    let store = Store::open(&config.database_path).with_context(|| {
        format!(
            "Failed to open database at {}",
            config.database_path.display()
        )
    })?;

    match args.command {
        Command::Fetch {
            subreddits,
            sort,
            time,
            limit,
            comments,
            user,
        } => {
            let options = FetchOptions {
                sort,
                time_filter: time,
                post_limit: limit,
                comment_limit: comments,
                ..Default::default()
            };
            run_fetch(&config, &store, subreddits, &user, &options).await
        }
        Command::Generate {
            limit,
            duration,
            subreddits,
            sort,
            output,
            shortform,
            no_analysis,
            user,
        } => {
            let request = GenerateArgs {
                limit,
                duration,
                subreddits,
                sort,
                output,
                longform: !shortform,
                analyze: !no_analysis,
                user,
            };
            run_generate(&config, &store, request).await
        }
        Command::Clear {
            posts,
            episodes,
            all,
            force,
        } => run_clear(&store, posts || all, episodes || all, force),
        Command::Config { action } => run_config(&store, action),
        Command::Posts { subreddit, limit } => run_posts(&store, subreddit.as_deref(), limit),
        Command::Episodes { user } => run_episodes(&store, user.as_deref()),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(stdio::stderr)
        .init();
}

async fn run_fetch(
    config: &Config,
    store: &Store,
    subreddits: Vec<String>,
    user: &str,
    options: &FetchOptions,
) -> Result<()> {
    let subreddits = if subreddits.is_empty() {
        store.subreddits(user)?
    } else {
        subreddits
            .iter()
            .map(|s| shared::normalize_subreddit(s))
            .collect()
    };

    if subreddits.is_empty() {
        anyhow::bail!(
            "No subreddits given and none configured for '{}'.\n\
            Run `your-podcast config add <subreddit>` or pass subreddits to fetch.",
            user
        );
    }

    println!(
        "📥 Fetching from {} subreddit(s)... ({})",
        subreddits.len(),
        estimate_fetch_time(subreddits.len(), options.post_limit, options.comment_delay)
    );

    let client = RedditClient::new(&config.user_agent)?;
    let mut total_posts = 0;
    let mut total_comments = 0;
    let mut last_rate_limit = None;

    for name in &subreddits {
        // Wait between subreddits (adaptive rate limiting)
        if let Some(rate_limit) = &last_rate_limit {
            tokio::time::sleep(adaptive_delay(rate_limit, Duration::from_secs(1))).await;
        }

        let result = fetch_and_save_subreddit(&client, store, name, options, |status| {
            print!("\r  r/{}: {:<70}", name, status);
            let _ = stdio::stdout().flush();
        })
        .await;

        match result {
            Ok(summary) => {
                println!(
                    "\r  ✓ r/{} ({} posts, {} comments){:<40}",
                    name, summary.new_posts, summary.new_comments, ""
                );
                total_posts += summary.new_posts;
                total_comments += summary.new_comments;
                last_rate_limit = Some(summary.rate_limit);
            }
            Err(e) => {
                println!("\r  ✗ r/{}: {:#}{:<20}", name, e, "");
            }
        }
    }

    println!(
        "\n✅ Done! Fetched {} new posts with {} comments.",
        total_posts, total_comments
    );
    Ok(())
}

struct GenerateArgs {
    limit: Option<i64>,
    duration: Option<u32>,
    subreddits: Vec<String>,
    sort: SortKey,
    output: Option<PathBuf>,
    longform: bool,
    analyze: bool,
    user: String,
}

async fn run_generate(config: &Config, store: &Store, args: GenerateArgs) -> Result<()> {
    let limit = match (args.limit, args.duration) {
        (Some(_), Some(_)) => anyhow::bail!("Specify either --limit or --duration, not both"),
        (_, Some(minutes)) => {
            let limit = limit_for_duration(minutes);
            println!(
                "Target: {} min → using {} posts (est. ~{:.0} min)",
                minutes,
                limit,
                estimated_minutes(limit, true)
            );
            limit
        }
        (Some(limit), None) => limit,
        (None, None) => DEFAULT_POST_LIMIT,
    };

    let user = store.get_or_create_user(&args.user)?;
    let subreddits = if args.subreddits.is_empty() {
        store.subreddits(&user)?
    } else {
        args.subreddits
    };
    if subreddits.is_empty() {
        anyhow::bail!(
            "No subreddits configured for '{}'.\n\
            Run `your-podcast config add <subreddit>` or pass --subreddit.",
            user
        );
    }

    let mut user_config = UserConfig::new(user.clone(), &subreddits);
    user_config.limit = limit;
    user_config.sort = args.sort;
    user_config.word_count = config.word_count;
    user_config.longform = args.longform;
    user_config.voices = config.voices.clone();

    let pool = store.candidate_pool(&user_config.subreddits)?;
    let selected = match select(&user_config, limit, &pool) {
        Ok(posts) => posts,
        Err(e) if e.is_nothing_to_do() => {
            println!(
                "Nothing new to generate for '{}': every stored post from these subreddits has been used.",
                user
            );
            println!("Run `your-podcast fetch` to pull fresh posts.");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    println!(
        "🎙  Generating podcast episode (~{:.0} min from {} posts) for user '{}'...",
        estimated_minutes(selected.len() as i64, args.longform),
        selected.len(),
        user
    );
    for post in &selected {
        println!("  • r/{} [{}] {}", post.subreddit, post.score, truncate_title(&post.title));
    }

    let generator = PodcastfyGenerator::new(config)?;
    let analyzer = match (&config.anthropic_api_key, args.analyze) {
        (Some(key), true) => Some(ClaudeAnalyzer::new(key.clone())?),
        _ => None,
    };
    let output_dir = args.output.unwrap_or_else(|| config.output_dir.clone());

    let mut assembler = Assembler::new(store, &generator, output_dir);
    if let Some(analyzer) = &analyzer {
        println!("\n🤖 Analyzing posts with Claude to pick deep-dive candidates...");
        assembler = assembler.with_analyzer(analyzer);
    }

    println!("\n🔊 Generating with Podcastfy + ElevenLabs (this can take several minutes)...");
    let start = Instant::now();
    let episode = match assembler.assemble(&user_config, &selected).await {
        Ok(episode) => episode,
        Err(Error::GenerationFailure {
            episode_id,
            message,
        }) => {
            println!("\n✗ Failed to generate podcast (episode #{} marked failed)", episode_id);
            println!("  Posts were not marked as used; they'll be picked up on the next run.");
            anyhow::bail!("Generation failed: {}", message);
        }
        Err(e) => return Err(e.into()),
    };
    let render_seconds = start.elapsed().as_secs_f64();

    println!("\n✅ Podcast episode generated:");
    println!("  Title: {}", episode.title);
    println!("  Description: {}", episode.description);
    println!("  Posts: {}", episode.post_count());
    if let Some(transcript) = &episode.transcript_path {
        println!("  Transcript: {}", transcript);
    }
    if let Some(audio) = &episode.audio_url {
        println!("  Audio: {}", audio);
    }
    println!("  Render time: {:.1}s", render_seconds);

    let stats = GenerationStats {
        timestamp: chrono::Utc::now(),
        user: user.clone(),
        episode_id: episode.id,
        post_count: episode.post_count(),
        render_seconds,
        llm_model: LLM_MODEL.to_string(),
        tts_model: format!("{}/{}", TTS_BACKEND, config.voices.tts_model),
        longform: args.longform,
    };
    let logged = get_default_log_path().and_then(|path| append_generation_log(&path, &stats));
    if let Err(e) = logged {
        tracing::warn!("Could not write generation log: {:#}", e);
    }

    Ok(())
}

fn run_clear(store: &Store, posts: bool, episodes: bool, force: bool) -> Result<()> {
    if !(posts || episodes) {
        anyhow::bail!("Specify what to clear: --posts, --episodes, or --all");
    }

    // Episodes go first so `--all` can clear the posts they reference
    if episodes {
        let count = store.count_episodes()?;
        if !force && !confirm(&format!("Delete {} episodes?", count))? {
            println!("Cancelled.");
            return Ok(());
        }
        store.clear_episodes()?;
        println!("✓ Deleted {} episodes", count);
    }

    if posts {
        let count = store.count_posts()?;
        if !force && !confirm(&format!("Delete {} posts?", count))? {
            println!("Cancelled.");
            return Ok(());
        }
        let deleted = store.clear_posts()?;
        println!("✓ Deleted {} posts", deleted);
    }

    Ok(())
}

fn run_config(store: &Store, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Add { subreddits, user } => {
            let (added, existing) = store.add_subreddits(&user, &subreddits)?;
            if !added.is_empty() {
                println!("✓ Added: {}", format_subreddits(&added));
            }
            if !existing.is_empty() {
                println!("Already following: {}", format_subreddits(&existing));
            }
        }
        ConfigAction::List { user } => {
            let subs = store.subreddits(&user)?;
            if subs.is_empty() {
                println!("No subreddits configured for '{}'.", user);
                println!("Run `your-podcast config add <subreddit>` to add some.");
            } else {
                println!("Subreddits for '{}':", user);
                for sub in subs {
                    println!("  r/{}", sub);
                }
            }
        }
        ConfigAction::Remove { subreddits, user } => {
            let (removed, not_found) = store.remove_subreddits(&user, &subreddits)?;
            if !removed.is_empty() {
                println!("✓ Removed: {}", format_subreddits(&removed));
            }
            if !not_found.is_empty() {
                println!("Not found: {}", format_subreddits(&not_found));
            }
        }
    }
    Ok(())
}

fn run_posts(store: &Store, subreddit: Option<&str>, limit: usize) -> Result<()> {
    let posts = store.list_posts(subreddit, limit)?;
    if posts.is_empty() {
        println!("No posts stored. Run `your-podcast fetch` first.");
        return Ok(());
    }

    for post in posts {
        let used_by = if post.used_by.is_empty() {
            "unused".to_string()
        } else {
            format!(
                "used by {}",
                post.used_by.iter().cloned().collect::<Vec<_>>().join(", ")
            )
        };
        println!(
            "{}  r/{:<16} {:>6}  {}  ({})",
            post.fetched_at.format("%Y-%m-%d %H:%M"),
            post.subreddit,
            post.score,
            truncate_title(&post.title),
            used_by
        );
    }
    Ok(())
}

fn run_episodes(store: &Store, user: Option<&str>) -> Result<()> {
    let episodes = store.list_episodes(user)?;
    if episodes.is_empty() {
        println!("No episodes yet. Run `your-podcast generate` to make one.");
        return Ok(());
    }

    for episode in episodes {
        println!(
            "#{:<4} {:<8} {}  {}  {} ({} posts)",
            episode.id,
            episode.status,
            episode.created_at.format("%Y-%m-%d %H:%M"),
            episode.user_id,
            episode.title,
            episode.post_count()
        );
        if let Some(audio) = &episode.audio_url {
            println!("       audio: {}", audio);
        }
        if let Some(error) = &episode.error {
            println!("       error: {}", error);
        }
    }
    Ok(())
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{} [y/N]: ", prompt);
    stdio::stdout().flush()?;

    let mut input = String::new();
    stdio::stdin().read_line(&mut input)?;
    Ok(matches!(input.trim().to_lowercase().as_str(), "y" | "yes"))
}

fn format_subreddits(names: &[String]) -> String {
    names
        .iter()
        .map(|s| format!("r/{}", s))
        .collect::<Vec<_>>()
        .join(", ")
}

fn truncate_title(title: &str) -> String {
    match title.char_indices().nth(60) {
        Some((idx, _)) => format!("{}...", &title[..idx]),
        None => title.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_defaults() {
        let args = Args::try_parse_from(["your-podcast", "generate"]).unwrap();
        match args.command {
            Command::Generate {
                limit,
                duration,
                sort,
                shortform,
                user,
                ..
            } => {
                assert_eq!(limit, None);
                assert_eq!(duration, None);
                assert_eq!(sort, SortKey::Score);
                assert!(!shortform);
                assert_eq!(user, DEFAULT_USER);
            }
            _ => panic!("expected generate"),
        }
    }

    #[test]
    fn test_limit_and_duration_conflict() {
        assert!(Args::try_parse_from(["your-podcast", "generate", "-l", "3", "-d", "10"]).is_err());
    }

    #[test]
    fn test_fetch_args() {
        let args = Args::try_parse_from([
            "your-podcast",
            "fetch",
            "rust",
            "r/python",
            "--sort",
            "top",
            "--time",
            "week",
            "--limit",
            "25",
        ])
        .unwrap();
        match args.command {
            Command::Fetch {
                subreddits,
                sort,
                time,
                limit,
                comments,
                ..
            } => {
                assert_eq!(subreddits, vec!["rust", "r/python"]);
                assert_eq!(sort, ListingSort::Top);
                assert_eq!(time, TimeFilter::Week);
                assert_eq!(limit, 25);
                assert_eq!(comments, 10);
            }
            _ => panic!("expected fetch"),
        }
    }

    #[test]
    fn test_bad_sort_rejected() {
        assert!(Args::try_parse_from(["your-podcast", "generate", "--sort", "random"]).is_err());
        assert!(Args::try_parse_from(["your-podcast", "fetch", "--sort", "best"]).is_err());
    }

    #[test]
    fn test_config_subcommands() {
        let args =
            Args::try_parse_from(["your-podcast", "config", "add", "rust", "-u", "alice"]).unwrap();
        match args.command {
            Command::Config {
                action: ConfigAction::Add { subreddits, user },
            } => {
                assert_eq!(subreddits, vec!["rust"]);
                assert_eq!(user, "alice");
            }
            _ => panic!("expected config add"),
        }
    }

    #[test]
    fn test_clear_requires_a_target() {
        let store = Store::open_in_memory().unwrap();
        assert!(run_clear(&store, false, false, true).is_err());
        assert!(run_clear(&store, true, true, true).is_ok());
    }

    #[test]
    fn test_truncate_title() {
        assert_eq!(truncate_title("short"), "short");
        let long = "x".repeat(80);
        assert_eq!(truncate_title(&long), format!("{}...", "x".repeat(60)));
    }
}
