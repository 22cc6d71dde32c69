// Public modules
pub mod analyzer;
pub mod assembler;
pub mod config;
pub mod content;
pub mod error;
pub mod fetcher;
pub mod generator;
pub mod io;
pub mod models;
pub mod reddit;
pub mod selector;
pub mod store;

// Re-export commonly used types
pub use analyzer::{Analysis, ClaudeAnalyzer};
pub use assembler::Assembler;
pub use config::Config;
pub use error::Error;
pub use fetcher::{fetch_and_save_subreddit, FetchOptions, FetchSummary};
pub use generator::{EpisodeGenerator, GeneratedAudio, GenerationRequest, PodcastfyGenerator};
pub use io::{append_generation_log, get_default_log_path, GenerationStats};
pub use models::{
    normalize_subreddit, Comment, Episode, EpisodeStatus, Post, SortKey, UserConfig,
    VoiceSettings, DEFAULT_USER,
};
pub use reddit::{ListingSort, RedditClient, TimeFilter};
pub use selector::{select, select_with};
pub use store::Store;
