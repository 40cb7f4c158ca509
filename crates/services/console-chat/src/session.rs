//! Chat session state shared by the console commands

use anyhow::{Context, Result};
use std::sync::Arc;
use voxchat_backends::{
    build_llm_client, build_prompt, build_tts_client, load_prompt_file, CommandAudioSink,
    PromptLog,
};
use voxchat_core::{BotConfig, ChatMessage, LlmClient, SpeechPipeline, TurnConfig, TurnReport};

/// Pipeline plus the prompt material replayed into every turn
pub struct ChatSession {
    pipeline: SpeechPipeline,
    turn: TurnConfig,
    system: Vec<ChatMessage>,
    character: Vec<ChatMessage>,
    history: Option<PromptLog>,
    history_limit: Option<usize>,
}

impl ChatSession {
    /// Session talking to the configured LLM backend
    pub async fn open(config: &BotConfig, text_only: bool) -> Result<Self> {
        let llm = build_llm_client(&config.llm).context("Failed to create LLM client")?;
        Self::with_llm(config, llm, text_only).await
    }

    /// Session with an explicit LLM client (e.g. a fixed reply)
    pub async fn with_llm(
        config: &BotConfig,
        llm: Arc<dyn LlmClient>,
        text_only: bool,
    ) -> Result<Self> {
        let tts = build_tts_client(&config.tts).context("Failed to create TTS client")?;
        let sink = Arc::new(CommandAudioSink::new(&config.audio));

        let mut turn = config.turn_config();
        if text_only {
            turn = turn.text_only();
        }

        if let Some(voice) = &turn.voice {
            match tts.speaker_name(voice.speaker_id).await {
                Ok(name) => tracing::info!(
                    tts = tts.name(),
                    speaker_id = voice.speaker_id,
                    speaker = name.as_deref().unwrap_or("unknown"),
                    "voice enabled"
                ),
                Err(e) => tracing::warn!(
                    speaker_id = voice.speaker_id,
                    "Could not resolve speaker name: {}",
                    e
                ),
            }
        } else {
            tracing::info!("text-only mode");
        }

        let prompts = &config.prompts;
        let system = match &prompts.system {
            Some(path) => load_prompt_file(path)
                .with_context(|| format!("Failed to load system prompt {}", path.display()))?,
            None => Vec::new(),
        };
        let character = match &prompts.character {
            Some(path) => load_prompt_file(path)
                .with_context(|| format!("Failed to load character prompt {}", path.display()))?,
            None => Vec::new(),
        };

        let history = match &prompts.history_log {
            Some(path) => {
                let log = PromptLog::new(path);
                let entries = log.load().await.context("Failed to load prompt history")?;
                tracing::info!(path = %path.display(), messages = entries.len(), "prompt history loaded");
                Some(log)
            }
            None => None,
        };

        Ok(Self {
            pipeline: SpeechPipeline::new(llm, tts, sink),
            turn,
            system,
            character,
            history,
            history_limit: prompts.history_limit,
        })
    }

    /// Stop reading and writing the prompt history
    pub fn without_history(mut self) -> Self {
        self.history = None;
        self
    }

    /// Run one turn for `question` and record the exchange in the history
    pub async fn ask(&self, question: &str) -> Result<TurnReport> {
        let history = match &self.history {
            Some(log) => log.recent(self.history_limit).await?,
            None => Vec::new(),
        };
        let prompt = build_prompt(&self.system, &self.character, &history, question);

        // The question is kept even when the turn fails
        if let Some(log) = &self.history {
            log.append(&ChatMessage::user(question)).await?;
        }

        let report = self.pipeline.run_turn(&prompt, &self.turn).await?;

        if let Some(log) = &self.history {
            log.append(&ChatMessage::assistant(report.transcript.as_str()))
                .await?;
        }
        Ok(report)
    }
}
