//! Builds an episode from selected posts.
//!
//! Posts are marked used only after the generator succeeds and the audio is
//! filed; any failure leaves them eligible for the next run.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::analyzer::ClaudeAnalyzer;
use crate::content::{build_text_input, episode_description, episode_title, format_post, MAX_COMMENTS};
use crate::error::{Error, Result};
use crate::generator::{EpisodeGenerator, GeneratedAudio, GenerationRequest};
use crate::models::{Episode, Post, UserConfig};
use crate::store::Store;

pub struct Assembler<'a, G: EpisodeGenerator + ?Sized> {
    store: &'a Store,
    generator: &'a G,
    analyzer: Option<&'a ClaudeAnalyzer>,
    output_dir: PathBuf,
}

impl<'a, G: EpisodeGenerator + ?Sized> Assembler<'a, G> {
    pub fn new(store: &'a Store, generator: &'a G, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            generator,
            analyzer: None,
            output_dir: output_dir.into(),
        }
    }

    /// Let Claude pick which posts get their comment threads included
    pub fn with_analyzer(mut self, analyzer: &'a ClaudeAnalyzer) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    pub async fn assemble(&self, user: &UserConfig, posts: &[Post]) -> Result<Episode> {
        if posts.is_empty() {
            return Err(Error::EmptyCandidatePool);
        }

        let text = self.build_input(posts).await?;
        let post_ids: Vec<String> = posts.iter().map(|p| p.id.clone()).collect();
        let episode = self.store.create_episode(
            &user.user_id,
            &episode_title(posts),
            &episode_description(posts.len()),
            &post_ids,
        )?;
        info!(
            "Generating episode {} for {} from {} posts",
            episode.id,
            user.user_id,
            posts.len()
        );

        let request =
            GenerationRequest::new(text, user.word_count, user.longform, user.voices.clone());

        let filed = match self.generator.generate(&request).await {
            Ok(audio) => self.file_audio(&user.user_id, episode.id, &audio),
            Err(e) => Err(format!("{:#}", e)),
        };

        match filed {
            Ok((audio_path, transcript_path)) => {
                let completed = self.store.complete_episode(
                    episode.id,
                    &audio_path.to_string_lossy(),
                    transcript_path.as_deref(),
                );
                if let Err(e) = &completed {
                    self.mark_failed(
                        episode.id,
                        &format!(
                            "Could not record finished episode: {} (audio kept at {})",
                            e,
                            audio_path.display()
                        ),
                    );
                }
                completed
            }
            Err(message) => {
                self.mark_failed(episode.id, &message);
                Err(Error::GenerationFailure {
                    episode_id: episode.id,
                    message,
                })
            }
        }
    }

    /// Best effort; a pending episode must not outlive the run
    fn mark_failed(&self, episode_id: i64, message: &str) {
        warn!("Episode {} failed: {}", episode_id, message);
        if let Err(e) = self.store.fail_episode(episode_id, message) {
            warn!("Could not mark episode {} failed: {}", episode_id, e);
        }
    }

    async fn build_input(&self, posts: &[Post]) -> Result<String> {
        let deep_dives: Vec<bool> = match self.analyzer {
            Some(analyzer) => analyzer
                .analyze_posts(posts)
                .await
                .into_iter()
                .map(|analysis| analysis.deep_dive)
                .collect(),
            None => vec![true; posts.len()],
        };

        let mut sections = Vec::with_capacity(posts.len());
        for (post, deep_dive) in posts.iter().zip(deep_dives) {
            let comments = if deep_dive {
                self.store.comments(&post.id, MAX_COMMENTS)?
            } else {
                Vec::new()
            };
            sections.push(format_post(post, &comments));
        }

        Ok(build_text_input(&sections))
    }

    /// Move the audio to `<output_dir>/<user>/episode-<id>.<ext>`
    fn file_audio(
        &self,
        user_id: &str,
        episode_id: i64,
        audio: &GeneratedAudio,
    ) -> std::result::Result<(PathBuf, Option<String>), String> {
        let dir = self.output_dir.join(path_component(user_id));
        let extension = audio
            .audio_path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("mp3");
        let dest = dir.join(format!("episode-{}.{}", episode_id, extension));

        move_file(&audio.audio_path, &dir, &dest).map_err(|e| {
            format!(
                "Failed to move audio {} to {}: {}",
                audio.audio_path.display(),
                dest.display(),
                e
            )
        })?;

        let dest = fs::canonicalize(&dest).unwrap_or(dest);
        let transcript = audio
            .transcript_path
            .as_ref()
            .map(|p| p.to_string_lossy().into_owned());
        Ok((dest, transcript))
    }
}

fn move_file(src: &Path, dir: &Path, dest: &Path) -> std::io::Result<()> {
    fs::create_dir_all(dir)?;
    if fs::rename(src, dest).is_err() {
        // Different filesystem
        fs::copy(src, dest)?;
        fs::remove_file(src)?;
    }
    Ok(())
}

/// Keep user names safe to use as a directory name
fn path_component(user_id: &str) -> String {
    let cleaned: String = user_id
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned
    }
}
