//! VOICEVOX engine backend
//!
//! Synthesis is the engine's two-step protocol:
//! 1. `POST /audio_query?text=..&speaker=..` returns a JSON query
//! 2. `POST /synthesis?speaker=..` with the (patched) query returns WAV bytes
//!
//! `speedScale` and `volumeScale` in the query are overridden from
//! [`VoiceConfig`] before step 2.

use crate::http::{build_client, describe_failure, endpoint, parse_base_url};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;
use voxchat_core::{Error, Result, TtsClient, TtsSettings, VoiceConfig};

/// Speaker entry of `GET /speakers`
#[derive(Debug, Clone, Deserialize)]
pub struct Speaker {
    pub name: String,
    #[serde(default)]
    pub styles: Vec<SpeakerStyle>,
}

/// One voice style; its `id` is the speaker id used for synthesis
#[derive(Debug, Clone, Deserialize)]
pub struct SpeakerStyle {
    pub name: String,
    pub id: u32,
}

/// Flattened speaker list entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VoiceEntry {
    pub id: u32,
    pub speaker: String,
    pub style: String,
}

impl VoiceEntry {
    /// "name (style)"
    pub fn display_name(&self) -> String {
        format!("{} ({})", self.speaker, self.style)
    }
}

/// Flatten `GET /speakers` into one entry per style id
pub fn voice_entries(speakers: &[Speaker]) -> Vec<VoiceEntry> {
    speakers
        .iter()
        .flat_map(|speaker| {
            speaker.styles.iter().map(move |style| VoiceEntry {
                id: style.id,
                speaker: speaker.name.clone(),
                style: style.name.clone(),
            })
        })
        .collect()
}

/// Override voice parameters in an audio query
pub fn apply_voice(query: &mut serde_json::Value, voice: &VoiceConfig) -> Result<()> {
    let object = query
        .as_object_mut()
        .ok_or_else(|| Error::Synthesis("audio_query response is not a JSON object".to_string()))?;
    object.insert("speedScale".to_string(), serde_json::json!(voice.speed_scale));
    object.insert("volumeScale".to_string(), serde_json::json!(voice.volume_scale));
    Ok(())
}

/// VOICEVOX engine client
pub struct VoicevoxClient {
    base_url: Url,
    client: reqwest::Client,
}

impl VoicevoxClient {
    pub fn new(settings: &TtsSettings) -> Result<Self> {
        Self::with_endpoint(
            &settings.endpoint,
            Duration::from_secs(settings.request_timeout_secs),
        )
    }

    pub fn with_endpoint(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            base_url: parse_base_url(base_url)?,
            client: build_client(timeout)?,
        })
    }

    async fn audio_query(&self, text: &str, speaker_id: u32) -> Result<serde_json::Value> {
        let response = self
            .client
            .post(endpoint(&self.base_url, "/audio_query"))
            .query(&[("text", text.to_string()), ("speaker", speaker_id.to_string())])
            .send()
            .await
            .map_err(|e| Error::Synthesis(format!("audio_query request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::Synthesis(format!(
                "audio_query failed: {}",
                describe_failure(response).await
            )));
        }

        response
            .json()
            .await
            .map_err(|e| Error::Synthesis(format!("Failed to parse audio_query: {}", e)))
    }

    /// All voices offered by the engine
    pub async fn voices(&self) -> Result<Vec<VoiceEntry>> {
        let response = self
            .client
            .get(endpoint(&self.base_url, "/speakers"))
            .send()
            .await
            .map_err(|e| Error::Synthesis(format!("speakers request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::Synthesis(format!(
                "speakers failed: {}",
                describe_failure(response).await
            )));
        }

        let speakers: Vec<Speaker> = response
            .json()
            .await
            .map_err(|e| Error::Synthesis(format!("Failed to parse speakers: {}", e)))?;
        Ok(voice_entries(&speakers))
    }
}

#[async_trait]
impl TtsClient for VoicevoxClient {
    fn name(&self) -> &str {
        "voicevox"
    }

    async fn synthesize(&self, text: &str, voice: &VoiceConfig) -> Result<Vec<u8>> {
        let mut query = self.audio_query(text, voice.speaker_id).await?;
        apply_voice(&mut query, voice)?;

        let response = self
            .client
            .post(endpoint(&self.base_url, "/synthesis"))
            .query(&[("speaker", voice.speaker_id)])
            .json(&query)
            .send()
            .await
            .map_err(|e| Error::Synthesis(format!("synthesis request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::Synthesis(format!(
                "synthesis failed: {}",
                describe_failure(response).await
            )));
        }

        let audio = response
            .bytes()
            .await
            .map_err(|e| Error::Synthesis(format!("Failed to read synthesized audio: {}", e)))?;
        tracing::debug!(bytes = audio.len(), speaker_id = voice.speaker_id, "synthesized segment");
        Ok(audio.to_vec())
    }

    async fn speaker_name(&self, speaker_id: u32) -> Result<Option<String>> {
        Ok(self
            .voices()
            .await?
            .into_iter()
            .find(|v| v.id == speaker_id)
            .map(|v| v.display_name()))
    }
}
