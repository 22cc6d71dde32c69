use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;

use crate::models::VoiceSettings;

const APP_DIR: &str = "your-podcast";

#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: PathBuf,
    pub user_agent: String,
    pub anthropic_api_key: Option<String>,
    pub elevenlabs_api_key: Option<String>,
    pub output_dir: PathBuf,
    pub transcripts_dir: PathBuf,
    pub podcastfy_python: String,
    pub word_count: u32,
    pub voices: VoiceSettings,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        // Try to load .env from multiple locations
        Self::try_load_dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the config from any key lookup (the process environment in practice)
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let database_path = match get("DATABASE_PATH") {
            Some(path) => PathBuf::from(path),
            None => default_data_dir()?.join("podcast.db"),
        };

        let word_count = match get("PODCAST_WORD_COUNT") {
            Some(raw) => raw
                .trim()
                .parse::<u32>()
                .with_context(|| format!("PODCAST_WORD_COUNT must be a number, got '{}'", raw))?,
            None => 500,
        };

        let defaults = VoiceSettings::default();
        let voices = VoiceSettings {
            question: get("PODCAST_QUESTION_VOICE").unwrap_or(defaults.question),
            answer: get("PODCAST_ANSWER_VOICE").unwrap_or(defaults.answer),
            tts_model: get("PODCAST_TTS_MODEL").unwrap_or(defaults.tts_model),
        };

        Ok(Self {
            database_path,
            user_agent: get("REDDIT_USER_AGENT")
                .unwrap_or_else(|| "your-podcast:v0.1.0 (JSON reader)".to_string()),
            anthropic_api_key: get("ANTHROPIC_API_KEY"),
            elevenlabs_api_key: get("ELEVENLABS_API_KEY"),
            output_dir: get("PODCAST_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./data/podcasts")),
            transcripts_dir: get("PODCAST_TRANSCRIPTS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./data/transcripts")),
            podcastfy_python: get("PODCASTFY_PYTHON").unwrap_or_else(|| "python3".to_string()),
            word_count,
            voices,
        })
    }

    /// Keys needed to run the generation pipeline
    pub fn require_generation_keys(&self) -> Result<(&str, &str)> {
        let anthropic = self.anthropic_api_key.as_deref().context(
            "ANTHROPIC_API_KEY not found.\n\n\
            To fix this, create ~/.config/your-podcast/.env with:\n  \
            ANTHROPIC_API_KEY=your_key_here\n  \
            ELEVENLABS_API_KEY=your_key_here\n\n\
            Get your Anthropic API key from: https://console.anthropic.com/settings/keys",
        )?;
        let elevenlabs = self.elevenlabs_api_key.as_deref().context(
            "ELEVENLABS_API_KEY not found.\n\n\
            To fix this, add ELEVENLABS_API_KEY=your_key_here to ~/.config/your-podcast/.env\n\n\
            Get your ElevenLabs API key from: https://elevenlabs.io/app/settings/api-keys",
        )?;
        Ok((anthropic, elevenlabs))
    }

    fn try_load_dotenv() {
        // Try locations in order of preference:

        // 1. Current directory (for development)
        if dotenvy::dotenv().is_ok() {
            return;
        }

        // 2. ~/.config/your-podcast/.env (standard config location)
        if let Some(config_dir) = dirs::config_dir() {
            let config_path = config_dir.join(APP_DIR).join(".env");
            if config_path.exists() && dotenvy::from_path(&config_path).is_ok() {
                return;
            }
        }

        // 3. ~/.env (home directory)
        if let Some(home_dir) = dirs::home_dir() {
            let home_path = home_dir.join(".env");
            if home_path.exists() {
                let _ = dotenvy::from_path(&home_path);
            }
        }
    }
}

/// `<local data dir>/your-podcast`, home of the database and generation log
pub fn default_data_dir() -> Result<PathBuf> {
    Ok(dirs::data_local_dir()
        .context("Could not determine local data directory")?
        .join(APP_DIR))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[("DATABASE_PATH", "/tmp/podcast.db")]).unwrap();
        assert_eq!(config.database_path, PathBuf::from("/tmp/podcast.db"));
        assert_eq!(config.user_agent, "your-podcast:v0.1.0 (JSON reader)");
        assert_eq!(config.output_dir, PathBuf::from("./data/podcasts"));
        assert_eq!(config.word_count, 500);
        assert_eq!(config.voices, VoiceSettings::default());
        assert!(config.anthropic_api_key.is_none());
    }

    #[test]
    fn test_overrides_and_blank_values() {
        let config = config_from(&[
            ("DATABASE_PATH", "/tmp/podcast.db"),
            ("ANTHROPIC_API_KEY", "   "),
            ("ELEVENLABS_API_KEY", "el-key"),
            ("PODCAST_WORD_COUNT", "1500"),
            ("PODCAST_ANSWER_VOICE", "voice-b"),
        ])
        .unwrap();

        assert!(config.anthropic_api_key.is_none());
        assert_eq!(config.elevenlabs_api_key.as_deref(), Some("el-key"));
        assert_eq!(config.word_count, 1500);
        assert_eq!(config.voices.answer, "voice-b");
        assert!(config.require_generation_keys().is_err());
    }

    #[test]
    fn test_bad_word_count() {
        let err = config_from(&[
            ("DATABASE_PATH", "/tmp/podcast.db"),
            ("PODCAST_WORD_COUNT", "lots"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("PODCAST_WORD_COUNT"));
    }

    #[test]
    fn test_generation_keys_present() {
        let config = config_from(&[
            ("DATABASE_PATH", "/tmp/podcast.db"),
            ("ANTHROPIC_API_KEY", "a-key"),
            ("ELEVENLABS_API_KEY", "e-key"),
        ])
        .unwrap();
        assert_eq!(config.require_generation_keys().unwrap(), ("a-key", "e-key"));
    }
}
