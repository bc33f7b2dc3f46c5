use crate::foundation::error::{HiliteError, HiliteResult};
use crate::project::{CaptionSentence, HighlightAssignment};
use crate::transcript::model::{Transcript, normalize_token};

/// A contiguous transcript word range carrying an optional overlay clip
/// and/or music cue. Produced by [`resolve_assignments`].
#[derive(Clone, Debug, PartialEq)]
pub struct HighlightSegment {
    /// First word index (inclusive).
    pub start_word: usize,
    /// Last word index (inclusive, `>= start_word`).
    pub end_word: usize,
    /// Overlay clip played while the segment is active.
    pub clip_path: Option<std::path::PathBuf>,
    /// Music cue spanning the segment.
    pub music_path: Option<std::path::PathBuf>,
    /// Gain applied to the music cue.
    pub music_gain: f64,
}

/// A contiguous transcript word range rendered as one on-screen caption.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SubtitleBlock {
    /// First word index (inclusive).
    pub start_word: usize,
    /// Last word index (inclusive).
    pub end_word: usize,
}

/// A caption sentence aligned onto the transcript: the block gives timing,
/// `text` is what is actually rendered.
#[derive(Clone, Debug, PartialEq)]
pub struct AlignedCaption {
    /// Word range the caption is timed against.
    pub block: SubtitleBlock,
    /// Display text (may contain explicit line breaks).
    pub text: String,
}

/// Locate the `occurrence`-th (1-indexed) match of `phrase` within the
/// normalised transcript tokens, returning inclusive word indices.
pub fn find_phrase_occurrence(
    tokens: &[String],
    phrase: &str,
    occurrence: usize,
) -> HiliteResult<(usize, usize)> {
    if phrase.trim().is_empty() {
        return Err(HiliteError::resolution(
            "phrase must be provided when start/end indices are omitted",
        ));
    }

    let target: Vec<String> = phrase.split_whitespace().map(normalize_token).collect();
    if target.is_empty() {
        return Err(HiliteError::resolution(
            "phrase must contain at least one word",
        ));
    }

    let mut matches = Vec::<(usize, usize)>::new();
    if tokens.len() >= target.len() {
        for idx in 0..=(tokens.len() - target.len()) {
            if tokens[idx..idx + target.len()] == target[..] {
                matches.push((idx, idx + target.len() - 1));
            }
        }
    }

    if occurrence == 0 || matches.len() < occurrence {
        return Err(HiliteError::resolution(format!(
            "phrase '{phrase}' occurrence {occurrence} not found in transcript"
        )));
    }
    Ok(matches[occurrence - 1])
}

/// Convert user highlight selections into render-ready segments.
///
/// Explicit `start_word`/`end_word` pairs bypass phrase matching but are
/// still validated against transcript bounds. An empty transcript resolves
/// to an empty segment list.
pub fn resolve_assignments(
    transcript: &Transcript,
    assignments: &[HighlightAssignment],
) -> HiliteResult<Vec<HighlightSegment>> {
    if transcript.is_empty() {
        return Ok(Vec::new());
    }

    let tokens = transcript.normalized_tokens();
    let mut segments = Vec::with_capacity(assignments.len());

    for assignment in assignments {
        let (start_word, end_word) = match (assignment.start_word, assignment.end_word) {
            (Some(start), Some(end)) => (start, end),
            _ => find_phrase_occurrence(
                &tokens,
                assignment.phrase.as_deref().unwrap_or(""),
                assignment.occurrence,
            )?,
        };

        if end_word >= transcript.len() || start_word > end_word {
            return Err(HiliteError::resolution(format!(
                "invalid word indices {start_word}..={end_word} for highlight \
                 (transcript has {} words)",
                transcript.len()
            )));
        }

        segments.push(HighlightSegment {
            start_word,
            end_word,
            clip_path: assignment.clip_path.clone(),
            music_path: assignment.music_path.clone(),
            music_gain: assignment.music_volume,
        });
    }

    Ok(segments)
}

/// Align custom caption sentences with the transcript.
///
/// A monotonic search cursor guarantees deterministic left-to-right
/// alignment: each sentence is matched from just past the previous match,
/// so repeated or overlapping phrases resolve in transcript order.
pub fn align_caption_sentences(
    transcript: &Transcript,
    sentences: &[CaptionSentence],
) -> HiliteResult<Vec<AlignedCaption>> {
    if transcript.is_empty() || sentences.is_empty() {
        return Ok(Vec::new());
    }

    let tokens = transcript.normalized_tokens();
    let mut aligned = Vec::new();
    let mut search_start = 0usize;

    for sentence in sentences {
        let text = sentence.text.trim();
        if text.is_empty() {
            continue;
        }
        let phrase = sentence.phrase.as_deref().unwrap_or(&sentence.text).trim();

        let (start_word, end_word) = match (sentence.start_word, sentence.end_word) {
            (Some(start), Some(end)) => (start, end),
            _ => {
                let target: Vec<String> = phrase
                    .split_whitespace()
                    .map(normalize_token)
                    .filter(|t| !t.is_empty())
                    .collect();
                if target.is_empty() {
                    return Err(HiliteError::resolution(format!(
                        "caption sentence '{text}' does not contain any alignable words"
                    )));
                }

                let wanted = sentence.occurrence.max(1);
                let mut seen = 0usize;
                let mut found = None;
                if tokens.len() >= target.len() {
                    for idx in search_start..=(tokens.len() - target.len()) {
                        if tokens[idx..idx + target.len()] == target[..] {
                            seen += 1;
                            if seen == wanted {
                                found = Some((idx, idx + target.len() - 1));
                                break;
                            }
                        }
                    }
                }
                found.ok_or_else(|| {
                    HiliteError::resolution(format!(
                        "unable to align caption sentence '{text}' with the transcript"
                    ))
                })?
            }
        };

        if end_word >= transcript.len() || start_word > end_word {
            return Err(HiliteError::resolution(format!(
                "invalid indices resolved for caption sentence '{text}'"
            )));
        }

        aligned.push(AlignedCaption {
            block: SubtitleBlock {
                start_word,
                end_word,
            },
            text: text.to_string(),
        });
        search_start = search_start.max(end_word + 1);
    }

    Ok(aligned)
}

/// Partition the transcript into steady caption blocks of `block_size`
/// words, carving out each highlight interval as its own standalone block.
///
/// A highlight range is never split across a block boundary, even when its
/// length differs from `block_size`.
pub fn default_subtitle_blocks(
    transcript: &Transcript,
    highlights: &[HighlightSegment],
    block_size: usize,
) -> Vec<SubtitleBlock> {
    let total_words = transcript.len();
    if total_words == 0 || block_size == 0 {
        return Vec::new();
    }

    let mut sorted: Vec<(usize, usize)> = highlights
        .iter()
        .map(|h| (h.start_word, h.end_word))
        .collect();
    sorted.sort_by_key(|&(start, _)| start);

    let mut blocks = Vec::new();
    let mut highlight_idx = 0usize;
    let mut current_word = 0usize;

    while current_word < total_words {
        let next_highlight_start = if highlight_idx < sorted.len() {
            let (h_start, h_end) = sorted[highlight_idx];
            if current_word > h_end {
                highlight_idx += 1;
                continue;
            }
            if current_word == h_start {
                blocks.push(SubtitleBlock {
                    start_word: h_start,
                    end_word: h_end,
                });
                current_word = h_end + 1;
                highlight_idx += 1;
                continue;
            }
            h_start
        } else {
            total_words
        };

        let block_end = next_highlight_start
            .saturating_sub(1)
            .min(current_word + block_size - 1);
        if block_end < current_word {
            current_word = next_highlight_start;
            continue;
        }
        blocks.push(SubtitleBlock {
            start_word: current_word,
            end_word: block_end,
        });
        current_word = block_end + 1;
    }

    blocks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript::model::Word;

    fn transcript(words: &[&str]) -> Transcript {
        Transcript::new(
            words
                .iter()
                .enumerate()
                .map(|(i, w)| Word {
                    text: (*w).to_string(),
                    start_time: i as f64,
                    end_time: (i + 1) as f64,
                })
                .collect(),
        )
    }

    fn assignment(phrase: &str, occurrence: usize) -> HighlightAssignment {
        HighlightAssignment {
            phrase: Some(phrase.to_string()),
            occurrence,
            ..HighlightAssignment::default()
        }
    }

    #[test]
    fn finds_nth_occurrence_left_to_right() {
        let t = transcript(&["we", "go", "up", "and", "we", "go", "down"]);
        let tokens = t.normalized_tokens();
        assert_eq!(find_phrase_occurrence(&tokens, "we go", 1).unwrap(), (0, 1));
        assert_eq!(find_phrase_occurrence(&tokens, "we go", 2).unwrap(), (4, 5));
        assert!(find_phrase_occurrence(&tokens, "we go", 3).is_err());
    }

    #[test]
    fn matching_is_case_and_punctuation_insensitive() {
        let t = transcript(&["Hello,", "World!"]);
        let tokens = t.normalized_tokens();
        assert_eq!(
            find_phrase_occurrence(&tokens, "hello world", 1).unwrap(),
            (0, 1)
        );
    }

    #[test]
    fn resolution_is_stable_across_calls() {
        let t = transcript(&["a", "b", "a", "b"]);
        let tokens = t.normalized_tokens();
        let first = find_phrase_occurrence(&tokens, "a b", 2).unwrap();
        for _ in 0..8 {
            assert_eq!(find_phrase_occurrence(&tokens, "a b", 2).unwrap(), first);
        }
    }

    #[test]
    fn empty_phrase_and_zero_occurrence_fail() {
        let t = transcript(&["a"]);
        let tokens = t.normalized_tokens();
        assert!(find_phrase_occurrence(&tokens, "", 1).is_err());
        assert!(find_phrase_occurrence(&tokens, "a", 0).is_err());
    }

    #[test]
    fn explicit_indices_bypass_matching_but_are_validated() {
        let t = transcript(&["a", "b", "c"]);
        let ok = resolve_assignments(
            &t,
            &[HighlightAssignment {
                start_word: Some(1),
                end_word: Some(2),
                ..HighlightAssignment::default()
            }],
        )
        .unwrap();
        assert_eq!(ok[0].start_word, 1);
        assert_eq!(ok[0].end_word, 2);

        let inverted = resolve_assignments(
            &t,
            &[HighlightAssignment {
                start_word: Some(2),
                end_word: Some(1),
                ..HighlightAssignment::default()
            }],
        );
        assert!(inverted.is_err());

        let out_of_bounds = resolve_assignments(
            &t,
            &[HighlightAssignment {
                start_word: Some(0),
                end_word: Some(3),
                ..HighlightAssignment::default()
            }],
        );
        assert!(out_of_bounds.is_err());
    }

    #[test]
    fn single_word_segment_is_valid() {
        let t = transcript(&["only", "word"]);
        let segs = resolve_assignments(&t, &[assignment("only", 1)]).unwrap();
        assert_eq!(segs[0].start_word, 0);
        assert_eq!(segs[0].end_word, 0);
    }

    #[test]
    fn empty_transcript_resolves_to_nothing() {
        let t = Transcript::default();
        assert!(resolve_assignments(&t, &[assignment("x", 1)])
            .unwrap()
            .is_empty());
        assert!(default_subtitle_blocks(&t, &[], 8).is_empty());
    }

    #[test]
    fn caption_alignment_advances_monotonically() {
        // The same sentence twice must land on the first and then the
        // second occurrence, in transcript order.
        let t = transcript(&["go", "on", "then", "go", "on"]);
        let sentences = vec![
            CaptionSentence {
                text: "go on".to_string(),
                ..CaptionSentence::default()
            },
            CaptionSentence {
                text: "go on".to_string(),
                ..CaptionSentence::default()
            },
        ];
        let aligned = align_caption_sentences(&t, &sentences).unwrap();
        assert_eq!(aligned[0].block, SubtitleBlock { start_word: 0, end_word: 1 });
        assert_eq!(aligned[1].block, SubtitleBlock { start_word: 3, end_word: 4 });
    }

    #[test]
    fn caption_alignment_fails_when_cursor_passes_phrase() {
        let t = transcript(&["one", "two", "three"]);
        let sentences = vec![
            CaptionSentence {
                text: "three".to_string(),
                ..CaptionSentence::default()
            },
            CaptionSentence {
                text: "one".to_string(),
                ..CaptionSentence::default()
            },
        ];
        assert!(align_caption_sentences(&t, &sentences).is_err());
    }

    #[test]
    fn default_blocks_use_fixed_size() {
        let t = transcript(&["a"; 20]);
        let blocks = default_subtitle_blocks(&t, &[], 8);
        assert_eq!(
            blocks,
            vec![
                SubtitleBlock { start_word: 0, end_word: 7 },
                SubtitleBlock { start_word: 8, end_word: 15 },
                SubtitleBlock { start_word: 16, end_word: 19 },
            ]
        );
    }

    #[test]
    fn default_blocks_carve_out_highlights() {
        let t = transcript(&["a"; 20]);
        let highlight = HighlightSegment {
            start_word: 5,
            end_word: 14,
            clip_path: None,
            music_path: None,
            music_gain: 1.0,
        };
        let blocks = default_subtitle_blocks(&t, &[highlight], 8);
        // The highlight interval is one standalone block, never split.
        assert!(blocks.contains(&SubtitleBlock { start_word: 5, end_word: 14 }));
        assert_eq!(blocks[0], SubtitleBlock { start_word: 0, end_word: 4 });
        assert_eq!(blocks[2], SubtitleBlock { start_word: 15, end_word: 19 });
        // Blocks partition the transcript without overlap.
        let mut covered = 0usize;
        for b in &blocks {
            assert_eq!(b.start_word, covered);
            covered = b.end_word + 1;
        }
        assert_eq!(covered, 20);
    }

    #[test]
    fn highlight_at_word_zero_is_carved_first() {
        let t = transcript(&["a"; 6]);
        let highlight = HighlightSegment {
            start_word: 0,
            end_word: 2,
            clip_path: None,
            music_path: None,
            music_gain: 1.0,
        };
        let blocks = default_subtitle_blocks(&t, &[highlight], 8);
        assert_eq!(blocks[0], SubtitleBlock { start_word: 0, end_word: 2 });
        assert_eq!(blocks[1], SubtitleBlock { start_word: 3, end_word: 5 });
    }
}
