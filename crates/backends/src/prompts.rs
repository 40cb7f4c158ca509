//! Prompt files and prompt assembly
//!
//! System and character prompts are YAML lists of messages:
//!
//! ```yaml
//! - role: system
//!   content: You are a cheerful voice assistant.
//! - role: assistant
//!   content: こんにちは！
//! ```

use std::path::Path;
use voxchat_core::{ChatMessage, Error, Result};

/// Load a YAML list of `{role, content}` messages
pub fn load_prompt_file(path: impl AsRef<Path>) -> Result<Vec<ChatMessage>> {
    let path = path.as_ref();
    let yaml = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read prompt file {}: {}", path.display(), e))
    })?;
    let messages: Vec<ChatMessage> = serde_yaml::from_str(&yaml)?;
    Ok(messages)
}

/// System prompt, then character prompt, then history, then the question
pub fn build_prompt(
    system: &[ChatMessage],
    character: &[ChatMessage],
    history: &[ChatMessage],
    question: &str,
) -> Vec<ChatMessage> {
    system
        .iter()
        .chain(character)
        .chain(history)
        .cloned()
        .chain(std::iter::once(ChatMessage::user(question)))
        .collect()
}
