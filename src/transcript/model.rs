use std::path::Path;

use anyhow::Context as _;

use crate::foundation::error::HiliteResult;

/// One transcribed word with its spoken time span in seconds.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Word {
    /// The word text as spoken (punctuation preserved).
    #[serde(rename = "word")]
    pub text: String,
    /// Start of the word in seconds from the start of the video.
    pub start_time: f64,
    /// End of the word in seconds from the start of the video.
    pub end_time: f64,
}

/// Ordered word-level transcript.
///
/// The word index is the canonical position identity used by segments and
/// subtitle blocks. A transcript is immutable once built.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Transcript {
    words: Vec<Word>,
}

impl Transcript {
    /// Build a transcript from an ordered word list.
    pub fn new(words: Vec<Word>) -> Self {
        Self { words }
    }

    /// Number of words.
    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// `true` when the transcript has no words.
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Word at `idx`, if in bounds.
    pub fn get(&self, idx: usize) -> Option<&Word> {
        self.words.get(idx)
    }

    /// All words in order.
    pub fn words(&self) -> &[Word] {
        &self.words
    }

    /// Normalised token per word, for fuzzy phrase matching.
    pub fn normalized_tokens(&self) -> Vec<String> {
        self.words.iter().map(|w| normalize_token(&w.text)).collect()
    }

    /// Time span `[start, end]` in seconds covered by an inclusive word
    /// range. Indices must be in bounds.
    pub fn time_span(&self, start_word: usize, end_word: usize) -> (f64, f64) {
        (
            self.words[start_word].start_time,
            self.words[end_word].end_time,
        )
    }

    /// Synthesise a transcript by distributing the words of `text`
    /// uniformly across `total_duration` seconds.
    ///
    /// Used when a plain-text transcript is supplied instead of word-level
    /// timings. A non-positive duration falls back to half a second per
    /// word.
    pub fn evenly_spaced(text: &str, total_duration: f64) -> Self {
        let tokens: Vec<&str> = text.split_whitespace().collect();
        if tokens.is_empty() {
            return Self::default();
        }

        let per_word = if total_duration > 0.0 {
            total_duration / tokens.len() as f64
        } else {
            0.5
        };

        let mut words = Vec::with_capacity(tokens.len());
        let mut cursor = 0.0;
        for token in tokens {
            words.push(Word {
                text: token.to_string(),
                start_time: cursor,
                end_time: cursor + per_word,
            });
            cursor += per_word;
        }
        Self { words }
    }

    /// Load a transcript from a JSON word list file.
    pub fn from_json_file(path: &Path) -> HiliteResult<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("read transcript '{}'", path.display()))?;
        let transcript = serde_json::from_slice(&bytes)
            .with_context(|| format!("parse transcript JSON '{}'", path.display()))?;
        Ok(transcript)
    }

    /// Save the transcript as a JSON word list file.
    pub fn to_json_file(&self, path: &Path) -> HiliteResult<()> {
        let json = serde_json::to_vec_pretty(self)
            .with_context(|| "serialize transcript JSON")?;
        std::fs::write(path, json)
            .with_context(|| format!("write transcript '{}'", path.display()))?;
        Ok(())
    }
}

/// Lower-case alphanumeric normalisation used for fuzzy token matching.
pub fn normalize_token(token: &str) -> String {
    token
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}
