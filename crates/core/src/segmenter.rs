//! Sentence Segmenter
//!
//! Accumulates streamed text one character at a time and yields speakable
//! segments on sentence / clause boundaries.
//!
//! A boundary character does not close the segment by itself: the segment is
//! confirmed by the first following character that is neither another
//! boundary mark nor a closing quote. That keeps `！！？` and `。」` together
//! and lets a digit after `3.` or `12,` cancel the split so numbers survive.
//!
//! ```text
//! "Hello. How are you?"  ->  ["Hello.", "How are you?"]
//! ```

use serde::{Deserialize, Serialize};

/// Segmenter rule set
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmenterConfig {
    /// Sentence-ending punctuation (always a boundary)
    pub sentence_terminators: String,

    /// Soft pause punctuation (boundary only once the buffer is long enough)
    pub soft_pauses: String,

    /// Closing quotes/brackets kept with the sentence they close
    pub closing_quotes: String,

    /// Minimum buffered characters before a soft pause becomes a boundary
    pub soft_pause_min_chars: usize,

    /// Treat `\n` as a boundary (it is dropped from the text either way)
    pub break_on_newline: bool,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            sentence_terminators: "。！？.!?．".to_string(),
            soft_pauses: "、，,;；:：".to_string(),
            closing_quotes: "」』）)】\"'”’".to_string(),
            soft_pause_min_chars: 40,
            break_on_newline: true,
        }
    }
}

/// Classification of a single character
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LetterClass {
    /// Character marks a speak boundary
    pub is_speak_boundary: bool,
    /// Soft pause punctuation
    pub is_punctuation: bool,
    /// Sentence terminator
    pub is_sentence_end: bool,
    /// Closing quote or bracket
    pub is_quote: bool,
    /// Formatting character dropped from the buffer
    pub is_suppressed: bool,
    /// Digit directly after a digit separator candidate (`3.` or `12,` then a digit)
    pub continues_number: bool,
}

/// Character classifier with the minimal look-behind state
#[derive(Debug, Clone)]
pub struct WordMarks {
    config: SegmenterConfig,
    /// Previous character was `.` or `,` directly after an ASCII digit
    after_digit_separator: bool,
    prev: Option<char>,
}

impl WordMarks {
    pub fn new(config: SegmenterConfig) -> Self {
        Self {
            config,
            after_digit_separator: false,
            prev: None,
        }
    }

    /// Classify the next character of the stream and update look-behind state
    pub fn classify(&mut self, ch: char) -> LetterClass {
        let mut class = LetterClass::default();

        if ch == '\n' {
            class.is_suppressed = true;
            class.is_speak_boundary = self.config.break_on_newline;
        } else if ch == '\r' {
            class.is_suppressed = true;
        } else if self.config.sentence_terminators.contains(ch) {
            class.is_sentence_end = true;
            class.is_speak_boundary = true;
        } else if self.config.soft_pauses.contains(ch) {
            class.is_punctuation = true;
        } else if self.config.closing_quotes.contains(ch) {
            class.is_quote = true;
        }

        class.continues_number = self.after_digit_separator && ch.is_ascii_digit();

        self.after_digit_separator =
            matches!(ch, '.' | ',') && self.prev.is_some_and(|p| p.is_ascii_digit());
        self.prev = Some(ch);

        class
    }

    pub fn config(&self) -> &SegmenterConfig {
        &self.config
    }
}

/// Incremental sentence segmenter
#[derive(Debug, Clone)]
pub struct Segmenter {
    marks: WordMarks,
    buffer: String,
    /// Characters currently in `buffer`
    buffered_chars: usize,
    /// A boundary was seen and awaits confirmation
    pending_boundary: bool,
}

impl Default for Segmenter {
    fn default() -> Self {
        Self::new(SegmenterConfig::default())
    }
}

impl Segmenter {
    pub fn new(config: SegmenterConfig) -> Self {
        Self {
            marks: WordMarks::new(config),
            buffer: String::new(),
            buffered_chars: 0,
            pending_boundary: false,
        }
    }

    /// Feed one character; returns a finalized segment if this character
    /// confirmed a boundary
    pub fn push_char(&mut self, ch: char) -> Option<String> {
        let class = self.marks.classify(ch);
        let mut emitted = None;

        if self.pending_boundary {
            if class.continues_number {
                self.pending_boundary = false;
            } else if !(class.is_speak_boundary || class.is_quote) {
                emitted = self.take_segment();
            }
        }

        if !class.is_suppressed {
            self.buffer.push(ch);
            self.buffered_chars += 1;
        }

        let soft_break = class.is_punctuation
            && self.buffered_chars >= self.marks.config().soft_pause_min_chars;
        if class.is_speak_boundary || soft_break {
            self.pending_boundary = true;
        }

        emitted
    }

    /// Feed a text fragment of any length
    pub fn push_str(&mut self, fragment: &str) -> Vec<String> {
        fragment.chars().filter_map(|ch| self.push_char(ch)).collect()
    }

    /// Flush the trailing buffer once the stream has ended
    pub fn finish(&mut self) -> Option<String> {
        self.take_segment()
    }

    /// Text buffered but not yet emitted
    pub fn buffered(&self) -> &str {
        &self.buffer
    }

    fn take_segment(&mut self) -> Option<String> {
        self.pending_boundary = false;
        self.buffered_chars = 0;
        let raw = std::mem::take(&mut self.buffer);
        let segment = raw.trim();
        if segment.is_empty() {
            None
        } else {
            Some(segment.to_string())
        }
    }
}

/// Split a complete text into segments in one call
pub fn split_text(text: &str, config: &SegmenterConfig) -> Vec<String> {
    let mut segmenter = Segmenter::new(config.clone());
    let mut segments = segmenter.push_str(text);
    segments.extend(segmenter.finish());
    segments
}
