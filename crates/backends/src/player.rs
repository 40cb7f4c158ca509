//! Audio sink playing clips through an external player command
//!
//! Synthesized audio is written to a persisted temp `.wav`, optionally
//! faded in/out, played with e.g. `aplay -q <file>` and removed afterwards.
//! Pre-recorded clips (filler) are played in place and never removed.

use async_trait::async_trait;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use voxchat_core::{AudioHandle, AudioSettings, AudioSink, Error, Result};

/// Apply a linear fade-in and fade-out of `fade_secs` to a WAV clip
///
/// Only 16-bit integer PCM is rewritten; any other format is returned
/// unchanged. Clips shorter than two fades get a shorter fade.
pub fn apply_fade(wav: &[u8], fade_secs: f32) -> Result<Vec<u8>> {
    let reader = hound::WavReader::new(Cursor::new(wav))
        .map_err(|e| Error::Playback(format!("Invalid WAV data: {}", e)))?;
    let spec = reader.spec();

    if fade_secs <= 0.0 || spec.sample_format != hound::SampleFormat::Int || spec.bits_per_sample != 16 {
        return Ok(wav.to_vec());
    }

    let mut samples: Vec<i16> = reader
        .into_samples::<i16>()
        .collect::<std::result::Result<_, _>>()
        .map_err(|e| Error::Playback(format!("Failed to read WAV samples: {}", e)))?;

    let channels = spec.channels.max(1) as usize;
    let frames = samples.len() / channels;
    let fade_frames = ((fade_secs * spec.sample_rate as f32) as usize).min(frames / 2);

    if fade_frames > 0 {
        for frame in 0..fade_frames {
            let gain = frame as f32 / fade_frames as f32;
            let head = frame * channels;
            let tail = (frames - 1 - frame) * channels;
            for ch in 0..channels {
                samples[head + ch] = (samples[head + ch] as f32 * gain) as i16;
                samples[tail + ch] = (samples[tail + ch] as f32 * gain) as i16;
            }
        }
    }

    let mut out = Cursor::new(Vec::with_capacity(wav.len()));
    {
        let mut writer = hound::WavWriter::new(&mut out, spec)
            .map_err(|e| Error::Playback(format!("Failed to create WAV writer: {}", e)))?;
        for sample in samples {
            writer
                .write_sample(sample)
                .map_err(|e| Error::Playback(format!("Failed to write WAV sample: {}", e)))?;
        }
        writer
            .finalize()
            .map_err(|e| Error::Playback(format!("Failed to finalize WAV: {}", e)))?;
    }
    Ok(out.into_inner())
}

/// Plays clips with an external command (`aplay`, `afplay`, `paplay`, ...)
#[derive(Debug, Clone)]
pub struct CommandAudioSink {
    player: String,
    args: Vec<String>,
    fade_secs: f32,
    temp_dir: PathBuf,
}

impl CommandAudioSink {
    pub fn new(settings: &AudioSettings) -> Self {
        Self {
            player: settings.player.clone(),
            args: settings.player_args.clone(),
            fade_secs: settings.fade_secs,
            temp_dir: settings
                .temp_dir
                .clone()
                .unwrap_or_else(std::env::temp_dir),
        }
    }

    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    fn write_clip(&self, audio: &[u8]) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.temp_dir)?;
        let mut file = tempfile::Builder::new()
            .prefix("voxchat-")
            .suffix(".wav")
            .tempfile_in(&self.temp_dir)?;
        file.write_all(audio)?;
        file.flush()?;
        let (_, path) = file
            .keep()
            .map_err(|e| Error::Playback(format!("Failed to keep temp audio file: {}", e)))?;
        Ok(path)
    }

    async fn run_player(&self, path: &Path) -> Result<()> {
        let output = Command::new(&self.player)
            .args(&self.args)
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| Error::Playback(format!("Failed to run {}: {}", self.player, e)))?;

        if !output.status.success() {
            return Err(Error::Playback(format!(
                "{} exited with {}: {}",
                self.player,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl AudioSink for CommandAudioSink {
    async fn write_temp_audio(&self, audio: Vec<u8>) -> Result<AudioHandle> {
        let audio = match apply_fade(&audio, self.fade_secs) {
            Ok(faded) => faded,
            Err(e) => {
                tracing::warn!(error = %e, "Could not fade clip, playing it unchanged");
                audio
            }
        };

        let sink = self.clone();
        let path = tokio::task::spawn_blocking(move || sink.write_clip(&audio)).await??;
        tracing::debug!(path = %path.display(), "wrote temp audio");
        Ok(AudioHandle::temporary(path))
    }

    async fn play(&self, handle: AudioHandle) -> Result<()> {
        let result = self.run_player(handle.path()).await;

        if handle.is_temporary() {
            if let Err(e) = tokio::fs::remove_file(handle.path()).await {
                tracing::debug!(path = %handle.path().display(), "Failed to remove temp audio: {}", e);
            }
        }
        result
    }
}
