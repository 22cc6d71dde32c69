//! The external generation pipeline (script + TTS) behind a trait.
//!
//! Production runs the Podcastfy Python client as a subprocess; tests plug in
//! their own [`EpisodeGenerator`].

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::json;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::models::VoiceSettings;

pub const LLM_MODEL: &str = "anthropic/claude-sonnet-4-5";
pub const TTS_BACKEND: &str = "elevenlabs";

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub text: String,
    pub word_count: u32,
    pub longform: bool,
    pub voices: VoiceSettings,
    pub podcast_name: String,
    pub tagline: String,
}

impl GenerationRequest {
    pub fn new(text: String, word_count: u32, longform: bool, voices: VoiceSettings) -> Self {
        Self {
            text,
            word_count,
            longform,
            voices,
            podcast_name: "Reddit Digest".to_string(),
            tagline: "Your Daily Dose of Reddit".to_string(),
        }
    }

    /// Podcastfy `conversation_config` for this request
    pub fn conversation_config(&self) -> serde_json::Value {
        json!({
            "word_count": self.word_count,
            "conversation_style": ["casual", "informative"],
            "podcast_name": self.podcast_name,
            "podcast_tagline": self.tagline,
            "text_to_speech": {
                "elevenlabs": {
                    "default_voices": {
                        "question": self.voices.question,
                        "answer": self.voices.answer,
                    },
                    "model": self.voices.tts_model,
                }
            }
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedAudio {
    pub audio_path: PathBuf,
    pub transcript_path: Option<PathBuf>,
}

#[async_trait]
pub trait EpisodeGenerator: Send + Sync {
    /// Turn text into an audio file. May take many minutes.
    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedAudio>;
}

pub struct PodcastfyGenerator {
    python: String,
    anthropic_api_key: String,
    elevenlabs_api_key: String,
    transcripts_dir: PathBuf,
}

impl PodcastfyGenerator {
    pub fn new(config: &Config) -> Result<Self> {
        let (anthropic, elevenlabs) = config.require_generation_keys()?;
        Ok(Self {
            python: config.podcastfy_python.clone(),
            anthropic_api_key: anthropic.to_string(),
            elevenlabs_api_key: elevenlabs.to_string(),
            transcripts_dir: config.transcripts_dir.clone(),
        })
    }
}

#[async_trait]
impl EpisodeGenerator for PodcastfyGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedAudio> {
        let config_path = std::env::temp_dir().join(format!(
            "your-podcast-conversation-{}.json",
            std::process::id()
        ));
        let config_json = serde_json::to_string_pretty(&request.conversation_config())
            .context("Failed to serialize conversation config")?;
        fs::write(&config_path, config_json).context("Failed to write conversation config")?;

        let before = list_transcripts(&self.transcripts_dir);

        let mut command = Command::new(&self.python);
        command
            .args(["-m", "podcastfy.client"])
            .arg("--text")
            .arg(&request.text)
            .args(["--tts-model", TTS_BACKEND])
            .args(["--llm-model-name", LLM_MODEL])
            .args(["--api-key-label", "ANTHROPIC_API_KEY"])
            .arg("--conversation-config")
            .arg(&config_path)
            .env("ANTHROPIC_API_KEY", &self.anthropic_api_key)
            .env("ELEVENLABS_API_KEY", &self.elevenlabs_api_key)
            .stdin(Stdio::null());
        if request.longform {
            command.arg("--longform");
        }

        info!(
            "Running Podcastfy ({} words, longform: {})",
            request.word_count, request.longform
        );
        let output = command
            .output()
            .await
            .with_context(|| format!("Failed to run {} -m podcastfy.client", self.python));

        // Clean up temp file
        fs::remove_file(&config_path).ok();
        let output = output?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!(
                "Podcastfy exited with {}: {}",
                output.status,
                last_lines(&stderr, 5)
            );
        }

        let audio_path = parse_audio_path(&stdout)
            .context("Podcast generation failed - no audio file produced")?;
        if !audio_path.exists() {
            anyhow::bail!("Podcastfy reported {} but it does not exist", audio_path.display());
        }

        let after = list_transcripts(&self.transcripts_dir);
        let transcript_path = newest_new_file(&before, &after);
        if transcript_path.is_none() {
            warn!("Could not find transcript file in {}", self.transcripts_dir.display());
        }
        debug!("Podcastfy produced {}", audio_path.display());

        Ok(GeneratedAudio {
            audio_path,
            transcript_path,
        })
    }
}

/// Podcastfy prints "Podcast generated successfully using <model> TTS model: <path>"
pub fn parse_audio_path(stdout: &str) -> Option<PathBuf> {
    stdout
        .lines()
        .rev()
        .filter(|line| line.contains("Podcast generated successfully"))
        .find_map(|line| line.rsplit_once(": ").map(|(_, path)| path.trim()))
        .filter(|path| !path.is_empty())
        .map(PathBuf::from)
}

fn list_transcripts(dir: &Path) -> BTreeSet<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return BTreeSet::new();
    };
    entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with("transcript_") && n.ends_with(".txt"))
                .unwrap_or(false)
        })
        .collect()
}

/// The most recently modified file in `after` that wasn't in `before`
fn newest_new_file(before: &BTreeSet<PathBuf>, after: &BTreeSet<PathBuf>) -> Option<PathBuf> {
    after
        .difference(before)
        .max_by_key(|path| fs::metadata(path).and_then(|m| m.modified()).ok())
        .map(|path| fs::canonicalize(path).unwrap_or_else(|_| path.clone()))
}

fn last_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.trim().lines().collect();
    lines[lines.len().saturating_sub(n)..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_audio_path() {
        let stdout = "Generating transcript...\n\
            Podcast generated successfully using elevenlabs TTS model: ./data/audio/podcast_abc.mp3\n";
        assert_eq!(
            parse_audio_path(stdout),
            Some(PathBuf::from("./data/audio/podcast_abc.mp3"))
        );
        assert_eq!(parse_audio_path("Traceback (most recent call last):"), None);
    }

    #[test]
    fn test_conversation_config_uses_voices() {
        let request = GenerationRequest::new(
            "text".to_string(),
            1200,
            true,
            VoiceSettings {
                question: "q-voice".to_string(),
                answer: "a-voice".to_string(),
                tts_model: "eleven_turbo_v2_5".to_string(),
            },
        );
        let config = request.conversation_config();
        assert_eq!(config["word_count"], 1200);
        assert_eq!(config["podcast_name"], "Reddit Digest");
        assert_eq!(
            config["text_to_speech"]["elevenlabs"]["default_voices"]["answer"],
            "a-voice"
        );
        assert_eq!(
            config["text_to_speech"]["elevenlabs"]["model"],
            "eleven_turbo_v2_5"
        );
    }

    #[test]
    fn test_new_transcript_detection() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("transcript_old.txt"), "old").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        let before = list_transcripts(dir.path());
        assert_eq!(before.len(), 1);

        fs::write(dir.path().join("transcript_new.txt"), "new").unwrap();
        let after = list_transcripts(dir.path());

        let found = newest_new_file(&before, &after).unwrap();
        assert!(found.ends_with("transcript_new.txt"));
        assert!(newest_new_file(&after, &after).is_none());
    }

    #[test]
    fn test_missing_transcript_dir() {
        assert!(list_transcripts(Path::new("/definitely/not/here")).is_empty());
    }

    #[test]
    fn test_last_lines() {
        assert_eq!(last_lines("a\nb\nc\n", 2), "b\nc");
        assert_eq!(last_lines("only", 5), "only");
    }
}
