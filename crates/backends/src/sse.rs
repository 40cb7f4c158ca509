//! Server-Sent Events decoding for streamed LLM responses
//!
//! [`SseDecoder`] works on raw bytes, so an event (or a multi-byte UTF-8
//! character) split across network chunks is reassembled before decoding.
//! [`chunk_stream`] runs the decoder in a background task and forwards JSON
//! payloads as [`LlmChunk`]s over a channel.

use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::fmt::Display;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use voxchat_core::{ChunkStream, Error, LlmChunk, Result};

/// Marker some APIs send as the final `data:` payload
pub const DONE_MARKER: &str = "[DONE]";

/// One dispatched SSE event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// `event:` field, if any
    pub event: Option<String>,
    /// `data:` lines joined with `\n`
    pub data: String,
}

/// Incremental byte-level SSE decoder
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes; returns every event completed by them
    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(bytes);
        let mut events = Vec::new();

        while let Some(newline) = self.buffer.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=newline).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line);
            if let Some(event) = self.process_line(&line) {
                events.push(event);
            }
        }

        events
    }

    /// Flush an event left unterminated at end of stream
    pub fn finish(&mut self) -> Option<SseEvent> {
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            let line = String::from_utf8_lossy(&rest).trim_end_matches('\r').to_string();
            if let Some(event) = self.process_line(&line) {
                return Some(event);
            }
        }
        self.dispatch()
    }

    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "data" => self.data.push(value.to_string()),
            "event" => self.event = Some(value.to_string()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        if self.data.is_empty() {
            self.event = None;
            return None;
        }
        Some(SseEvent {
            event: self.event.take(),
            data: std::mem::take(&mut self.data).join("\n"),
        })
    }
}

/// Error object embedded in a streamed payload (`{"error": {"message": ...}}`)
fn embedded_error(payload: &serde_json::Value) -> Option<String> {
    let error = payload.get("error")?;
    Some(
        error
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string()),
    )
}

fn parse_event(backend: &str, event: &SseEvent) -> Result<LlmChunk> {
    let payload: serde_json::Value = serde_json::from_str(&event.data).map_err(|e| {
        Error::Generation(format!("{}: malformed stream payload: {}", backend, e))
    })?;
    if let Some(message) = embedded_error(&payload) {
        return Err(Error::Generation(format!("{}: {}", backend, message)));
    }
    Ok(LlmChunk(payload))
}

/// Decode an SSE byte stream into LLM chunks
///
/// The stream ends at [`DONE_MARKER`], at end of body, or after the first
/// error (which is delivered as the last item).
pub fn chunk_stream<S, E>(bytes: S, backend: &'static str) -> ChunkStream
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
    E: Display + Send + 'static,
{
    let (tx, rx) = mpsc::channel::<Result<LlmChunk>>(64);

    tokio::spawn(async move {
        let mut bytes = Box::pin(bytes);
        let mut decoder = SseDecoder::new();

        while let Some(next) = bytes.next().await {
            let chunk = match next {
                Ok(chunk) => chunk,
                Err(e) => {
                    tracing::error!(backend, "SSE stream error: {}", e);
                    let _ = tx
                        .send(Err(Error::Generation(format!(
                            "{}: stream interrupted: {}",
                            backend, e
                        ))))
                        .await;
                    return;
                }
            };

            for event in decoder.push(&chunk) {
                if event.data.trim() == DONE_MARKER {
                    tracing::debug!(backend, "SSE stream completed");
                    return;
                }
                let item = parse_event(backend, &event);
                let failed = item.is_err();
                if tx.send(item).await.is_err() {
                    tracing::debug!(backend, "SSE receiver dropped, stopping stream");
                    return;
                }
                if failed {
                    return;
                }
            }
        }

        if let Some(event) = decoder.finish() {
            if event.data.trim() != DONE_MARKER {
                let _ = tx.send(parse_event(backend, &event)).await;
            }
        }
    });

    ReceiverStream::new(rx).boxed()
}
