use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::config::default_data_dir;

const LOG_HEADER: &str =
    "timestamp,user,episode_id,post_count,render_seconds,llm_model,tts_model,longform";

/// One row of the generation log, used to tune post counts and durations
#[derive(Debug, Clone)]
pub struct GenerationStats {
    pub timestamp: DateTime<Utc>,
    pub user: String,
    pub episode_id: i64,
    pub post_count: usize,
    pub render_seconds: f64,
    pub llm_model: String,
    pub tts_model: String,
    pub longform: bool,
}

impl GenerationStats {
    fn to_csv_row(&self) -> String {
        format!(
            "{},{},{},{},{:.1},{},{},{}",
            self.timestamp.to_rfc3339(),
            csv_escape(&self.user),
            self.episode_id,
            self.post_count,
            self.render_seconds,
            csv_escape(&self.llm_model),
            csv_escape(&self.tts_model),
            self.longform
        )
    }
}

/// Get the default generation log location
pub fn get_default_log_path() -> Result<PathBuf> {
    Ok(default_data_dir()?.join("generation_log.csv"))
}

/// Append stats to the CSV log, writing the header for a new file
pub fn append_generation_log(path: &Path, stats: &GenerationStats) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("Failed to create log directory")?;
    }

    let is_new = !path.exists();
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open generation log: {}", path.display()))?;

    if is_new {
        writeln!(file, "{}", LOG_HEADER)?;
    }
    writeln!(file, "{}", stats.to_csv_row()).context("Failed to write generation log")?;

    Ok(())
}

fn csv_escape(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
