//! Conversation history as JSON lines
//!
//! Every exchanged message is appended as one `{time, role, content}` line.
//! The history is replayed into the prompt of later turns.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use voxchat_core::{ChatMessage, Error, Result, Role};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LogEntry {
    time: DateTime<Local>,
    role: Role,
    content: String,
}

/// Append-only prompt history file
#[derive(Debug, Clone)]
pub struct PromptLog {
    path: PathBuf,
}

impl PromptLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the whole history, creating an empty file when missing
    pub async fn load(&self) -> Result<Vec<ChatMessage>> {
        if !tokio::fs::try_exists(&self.path).await? {
            if let Some(parent) = self.path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&self.path, b"").await?;
            tracing::info!(path = %self.path.display(), "created prompt history");
            return Ok(Vec::new());
        }

        let text = tokio::fs::read_to_string(&self.path).await?;
        text.lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(n, line)| {
                let entry: LogEntry = serde_json::from_str(line).map_err(|e| {
                    Error::Config(format!(
                        "{}:{}: invalid history entry: {}",
                        self.path.display(),
                        n + 1,
                        e
                    ))
                })?;
                Ok(ChatMessage::new(entry.role, entry.content))
            })
            .collect()
    }

    /// Most recent `limit` messages (all when `None`)
    pub async fn recent(&self, limit: Option<usize>) -> Result<Vec<ChatMessage>> {
        let mut history = self.load().await?;
        if let Some(limit) = limit {
            let skip = history.len().saturating_sub(limit);
            history.drain(..skip);
        }
        Ok(history)
    }

    /// Append one message
    pub async fn append(&self, message: &ChatMessage) -> Result<()> {
        let entry = LogEntry {
            time: Local::now(),
            role: message.role,
            content: message.content.clone(),
        };
        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}
