//! Pure overlay playback logic: per-segment frame windows, the continuity
//! merge pre-pass, and the per-clip playback state machine. Nothing here
//! touches a decoder, which keeps the state machine testable in isolation.

use crate::foundation::core::{FrameIndex, FrameRange, Fps};
use crate::transcript::model::Transcript;
use crate::transcript::resolve::{HighlightSegment, SubtitleBlock};

/// One highlight segment projected onto the frame timeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SegmentWindow {
    /// Index of the segment this window belongs to.
    pub segment: usize,
    /// Frames during which the segment is active (half-open).
    pub range: FrameRange,
    /// Index into the compositor's distinct-clip table, if the segment has
    /// an overlay clip.
    pub clip: Option<usize>,
    /// Subtitle block the segment falls into, when grouping is active.
    pub block: Option<usize>,
}

/// Decision taken when an overlay clip transitions to a new segment.
///
/// Computed once per transition so the continuation heuristic stays in one
/// auditable place.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Continuation {
    /// The new segment is the immediate successor of the clip's previous
    /// segment: keep playing from the saved read cursor.
    ResumeAt(u64),
    /// Unrelated reuse of the clip: restart from its first frame.
    RestartFromZero,
}

/// Mutable playback state for one distinct overlay clip during one render
/// pass. Owned exclusively by the compositor via [`OverlayPlaybackTable`].
#[derive(Clone, Debug)]
pub struct OverlayPlayback {
    /// Total frames available in the clip.
    pub total_frames: u64,
    /// Next clip frame to read; never exceeds `total_frames`.
    pub read_cursor: u64,
    /// Segment currently driving this clip.
    pub active_segment: Option<usize>,
    /// Subtitle block of the active segment.
    pub active_block: Option<usize>,
    /// Segment that last used this clip before the active one.
    pub last_segment: Option<usize>,
    /// Subtitle block of `last_segment`.
    pub last_block: Option<usize>,
    /// Seek the decoder must perform before the next read, to guarantee
    /// exact frame alignment even if the decoder cursor drifted.
    pub pending_seek: Option<u64>,
    /// Frames the decoder still has to drop to satisfy a forward seek.
    pub frames_to_skip: u64,
    /// The clip ran out of frames (or failed to decode) and no longer
    /// contributes.
    pub exhausted: bool,
}

impl OverlayPlayback {
    /// Fresh state for a clip with `total_frames` frames.
    pub fn new(total_frames: u64) -> Self {
        Self {
            total_frames,
            read_cursor: 0,
            active_segment: None,
            active_block: None,
            last_segment: None,
            last_block: None,
            pending_seek: Some(0),
            frames_to_skip: 0,
            exhausted: total_frames == 0,
        }
    }

    /// Handle a transition of this clip to `segment`, returning the
    /// continuation decision that was applied.
    ///
    /// With subtitle grouping the successor test uses block indices;
    /// without it, raw segment indices.
    pub fn begin_segment(
        &mut self,
        segment: usize,
        block: Option<usize>,
        grouping: bool,
    ) -> Continuation {
        if let Some(current) = self.active_segment.take() {
            self.last_segment = Some(current);
        }
        if let Some(current) = self.active_block.take() {
            self.last_block = Some(current);
        }

        let decision = if grouping {
            match (self.last_block, block) {
                (Some(prev), Some(next)) if next == prev + 1 => {
                    Continuation::ResumeAt(self.read_cursor)
                }
                _ => Continuation::RestartFromZero,
            }
        } else {
            match self.last_segment {
                Some(prev) if segment == prev + 1 => Continuation::ResumeAt(self.read_cursor),
                _ => Continuation::RestartFromZero,
            }
        };

        match decision {
            Continuation::ResumeAt(at) => {
                self.pending_seek = Some(at);
            }
            Continuation::RestartFromZero => {
                self.read_cursor = 0;
                self.pending_seek = Some(0);
            }
        }
        self.frames_to_skip = 0;
        self.exhausted = self.total_frames == 0;
        self.active_segment = Some(segment);
        self.active_block = block;
        decision
    }

    /// Keep the active block current while the active segment is unchanged.
    pub fn touch_block(&mut self, block: Option<usize>) {
        self.active_block = block;
    }

    /// Whether another clip frame can still be produced.
    pub fn can_render(&self) -> bool {
        !self.exhausted && self.read_cursor < self.total_frames
    }

    /// Account for one successfully decoded clip frame.
    pub fn note_frame_read(&mut self) {
        self.read_cursor = (self.read_cursor + 1).min(self.total_frames);
        if self.read_cursor >= self.total_frames {
            self.exhausted = true;
        }
    }

    /// Stop the clip contributing for the remainder of the render.
    pub fn mark_exhausted(&mut self) {
        self.exhausted = true;
        self.read_cursor = self.total_frames;
    }
}

/// Explicit per-clip state table owned by the compositor for the duration
/// of one render pass; created at setup, released at end of render.
#[derive(Clone, Debug, Default)]
pub struct OverlayPlaybackTable {
    states: Vec<OverlayPlayback>,
}

impl OverlayPlaybackTable {
    /// Create one state per distinct clip, given each clip's frame count.
    pub fn new(clip_frame_counts: &[u64]) -> Self {
        Self {
            states: clip_frame_counts
                .iter()
                .map(|&total| OverlayPlayback::new(total))
                .collect(),
        }
    }

    /// State for clip index `clip`.
    pub fn get_mut(&mut self, clip: usize) -> Option<&mut OverlayPlayback> {
        self.states.get_mut(clip)
    }

    /// Read-only view of all states.
    pub fn states(&self) -> &[OverlayPlayback] {
        &self.states
    }
}

/// Assign each segment the first subtitle block overlapping its word range.
pub fn assign_subtitle_blocks(
    segments: &[HighlightSegment],
    blocks: &[SubtitleBlock],
) -> Vec<Option<usize>> {
    segments
        .iter()
        .map(|segment| {
            for (idx, block) in blocks.iter().enumerate() {
                if block.end_word < segment.start_word {
                    continue;
                }
                if block.start_word > segment.end_word {
                    break;
                }
                return Some(idx);
            }
            None
        })
        .collect()
}

/// Project highlight segments onto the frame timeline.
///
/// `clip_ids` maps each segment to its distinct-clip index (parallel to
/// `segments`). The window of a segment over words `[s, e]` is
/// `[floor(start_time(s) * fps), floor(end_time(e) * fps)]` inclusive,
/// stored half-open.
pub fn build_segment_windows(
    transcript: &Transcript,
    segments: &[HighlightSegment],
    clip_ids: &[Option<usize>],
    blocks: Option<&[SubtitleBlock]>,
    fps: Fps,
) -> Vec<SegmentWindow> {
    let block_ids = blocks.map(|blocks| assign_subtitle_blocks(segments, blocks));

    segments
        .iter()
        .enumerate()
        .map(|(idx, segment)| {
            let (start_time, end_time) = transcript.time_span(segment.start_word, segment.end_word);
            let start_frame = fps.secs_to_frames_floor(start_time);
            let end_frame = fps.secs_to_frames_floor(end_time);
            SegmentWindow {
                segment: idx,
                range: FrameRange {
                    start: FrameIndex(start_frame),
                    end: FrameIndex(end_frame + 1),
                },
                clip: clip_ids.get(idx).copied().flatten(),
                block: block_ids.as_ref().and_then(|ids| ids[idx]),
            }
        })
        .collect()
}

/// Continuity merge pre-pass.
///
/// Adjacent windows that share a clip and are "consecutive" (adjacent
/// subtitle blocks when grouping is active, else contiguous or overlapping
/// frame ranges) get their boundary adjusted so the earlier window ends
/// immediately before the later one starts. This prevents a visible
/// seek/restart of the shared overlay clip between two segments meant to
/// read as one continuous insert.
pub fn merge_continuity(windows: &mut [SegmentWindow], grouping: bool) {
    for idx in 1..windows.len() {
        let (head, tail) = windows.split_at_mut(idx);
        let prev = &mut head[idx - 1];
        let curr = &mut tail[0];
        if curr.range.is_empty() {
            continue;
        }

        let same_clip = prev.clip.is_some() && prev.clip == curr.clip;
        let consecutive = if grouping {
            matches!((prev.block, curr.block), (Some(p), Some(c)) if c == p + 1)
        } else {
            curr.range.start.0 <= prev.range.end.0
        };
        if !(same_clip && consecutive) {
            continue;
        }

        let curr_start = curr.range.start.0;
        if curr_start > prev.range.end.0 {
            // Non-contiguous because of subtitle-driven adjustment: extend
            // the earlier window so it ends right where the later begins.
            prev.range.end = FrameIndex(curr_start);
        } else {
            prev.range.end =
                FrameIndex(prev.range.end.0.min(curr_start).max(prev.range.start.0 + 1));
        }

        let adjusted_start = curr_start.max(prev.range.end.0);
        curr.range.start = FrameIndex(adjusted_start.min(curr.range.end.0 - 1));
    }
}

/// Linear scan for the window containing `frame`, in timeline order.
pub fn active_window(windows: &[SegmentWindow], frame: FrameIndex) -> Option<&SegmentWindow> {
    windows.iter().find(|w| w.range.contains(frame))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript::model::Word;

    fn transcript_1s_words(n: usize) -> Transcript {
        Transcript::new(
            (0..n)
                .map(|i| Word {
                    text: format!("w{i}"),
                    start_time: i as f64,
                    end_time: (i + 1) as f64,
                })
                .collect(),
        )
    }

    fn segment(start: usize, end: usize, clip: bool) -> HighlightSegment {
        HighlightSegment {
            start_word: start,
            end_word: end,
            clip_path: clip.then(|| std::path::PathBuf::from("overlay.mp4")),
            music_path: None,
            music_gain: 1.0,
        }
    }

    fn fps30() -> Fps {
        Fps { num: 30, den: 1 }
    }

    #[test]
    fn windows_follow_word_times() {
        // Scenario A timing: words 2..=4 of 1s each at 30 fps.
        let t = transcript_1s_words(10);
        let segs = vec![segment(2, 4, true)];
        let windows = build_segment_windows(&t, &segs, &[Some(0)], None, fps30());
        assert_eq!(windows[0].range.start, FrameIndex(60));
        assert_eq!(windows[0].range.end, FrameIndex(151));
    }

    #[test]
    fn single_word_segment_has_nonempty_window() {
        let t = transcript_1s_words(3);
        let segs = vec![segment(1, 1, false)];
        let windows = build_segment_windows(&t, &segs, &[None], None, fps30());
        assert!(!windows[0].range.is_empty());
        assert_eq!(windows[0].range.start, FrameIndex(30));
    }

    #[test]
    fn block_assignment_picks_first_overlap() {
        let segs = vec![segment(5, 6, true), segment(9, 9, true)];
        let blocks = vec![
            SubtitleBlock { start_word: 0, end_word: 4 },
            SubtitleBlock { start_word: 5, end_word: 8 },
            SubtitleBlock { start_word: 9, end_word: 12 },
        ];
        assert_eq!(assign_subtitle_blocks(&segs, &blocks), vec![Some(1), Some(2)]);
    }

    #[test]
    fn merge_bridges_gap_for_adjacent_blocks() {
        // Scenario B: same clip, adjacent subtitle blocks, ranges apart.
        let mut windows = vec![
            SegmentWindow {
                segment: 0,
                range: FrameRange { start: FrameIndex(60), end: FrameIndex(91) },
                clip: Some(0),
                block: Some(3),
            },
            SegmentWindow {
                segment: 1,
                range: FrameRange { start: FrameIndex(120), end: FrameIndex(151) },
                clip: Some(0),
                block: Some(4),
            },
        ];
        merge_continuity(&mut windows, true);
        // Earlier end pulled to immediately precede the later start.
        assert_eq!(windows[0].range.end, FrameIndex(120));
        assert_eq!(windows[1].range.start, FrameIndex(120));
        assert_eq!(windows[0].range.len_frames() + windows[1].range.len_frames(), 91);
    }

    #[test]
    fn merge_clamps_overlapping_ranges() {
        let mut windows = vec![
            SegmentWindow {
                segment: 0,
                range: FrameRange { start: FrameIndex(0), end: FrameIndex(100) },
                clip: Some(0),
                block: Some(0),
            },
            SegmentWindow {
                segment: 1,
                range: FrameRange { start: FrameIndex(80), end: FrameIndex(150) },
                clip: Some(0),
                block: Some(1),
            },
        ];
        merge_continuity(&mut windows, true);
        assert_eq!(windows[0].range.end, FrameIndex(80));
        assert_eq!(windows[1].range.start, FrameIndex(80));
        // No frame belongs to both windows.
        for f in 0..150 {
            let hits = windows.iter().filter(|w| w.range.contains(FrameIndex(f))).count();
            assert!(hits <= 1, "frame {f} assigned to {hits} windows");
        }
    }

    #[test]
    fn merge_without_grouping_uses_contiguity() {
        let mut windows = vec![
            SegmentWindow {
                segment: 0,
                range: FrameRange { start: FrameIndex(0), end: FrameIndex(50) },
                clip: Some(0),
                block: None,
            },
            SegmentWindow {
                segment: 1,
                range: FrameRange { start: FrameIndex(50), end: FrameIndex(90) },
                clip: Some(0),
                block: None,
            },
        ];
        let before = windows.clone();
        merge_continuity(&mut windows, false);
        assert_eq!(windows, before);

        // A gap without grouping is not consecutive: nothing changes.
        let mut gapped = vec![
            SegmentWindow {
                segment: 0,
                range: FrameRange { start: FrameIndex(0), end: FrameIndex(50) },
                clip: Some(0),
                block: None,
            },
            SegmentWindow {
                segment: 1,
                range: FrameRange { start: FrameIndex(70), end: FrameIndex(90) },
                clip: Some(0),
                block: None,
            },
        ];
        let before = gapped.clone();
        merge_continuity(&mut gapped, false);
        assert_eq!(gapped, before);
    }

    #[test]
    fn merge_ignores_different_clips() {
        let mut windows = vec![
            SegmentWindow {
                segment: 0,
                range: FrameRange { start: FrameIndex(0), end: FrameIndex(50) },
                clip: Some(0),
                block: Some(0),
            },
            SegmentWindow {
                segment: 1,
                range: FrameRange { start: FrameIndex(60), end: FrameIndex(90) },
                clip: Some(1),
                block: Some(1),
            },
        ];
        let before = windows.clone();
        merge_continuity(&mut windows, true);
        assert_eq!(windows, before);
    }

    #[test]
    fn merge_is_idempotent() {
        let mut windows = vec![
            SegmentWindow {
                segment: 0,
                range: FrameRange { start: FrameIndex(60), end: FrameIndex(91) },
                clip: Some(0),
                block: Some(3),
            },
            SegmentWindow {
                segment: 1,
                range: FrameRange { start: FrameIndex(120), end: FrameIndex(151) },
                clip: Some(0),
                block: Some(4),
            },
        ];
        merge_continuity(&mut windows, true);
        let once = windows.clone();
        merge_continuity(&mut windows, true);
        assert_eq!(windows, once);
    }

    #[test]
    fn restart_for_unrelated_reuse() {
        let mut pb = OverlayPlayback::new(40);
        assert_eq!(pb.begin_segment(0, Some(1), true), Continuation::RestartFromZero);
        for _ in 0..10 {
            pb.note_frame_read();
        }
        // Blocks 1 -> 5: not adjacent, restart.
        assert_eq!(pb.begin_segment(3, Some(5), true), Continuation::RestartFromZero);
        assert_eq!(pb.read_cursor, 0);
        assert_eq!(pb.pending_seek, Some(0));
    }

    #[test]
    fn resume_for_adjacent_blocks_keeps_cursor() {
        // Scenario B state machine half: playback resumes from the saved
        // cursor instead of restarting at 0.
        let mut pb = OverlayPlayback::new(40);
        pb.begin_segment(0, Some(3), true);
        pb.pending_seek = None;
        for _ in 0..17 {
            pb.note_frame_read();
        }
        assert_eq!(pb.read_cursor, 17);

        let decision = pb.begin_segment(1, Some(4), true);
        assert_eq!(decision, Continuation::ResumeAt(17));
        assert_eq!(pb.read_cursor, 17);
        assert_eq!(pb.pending_seek, Some(17));
        assert_eq!(pb.last_segment, Some(0));
        assert_eq!(pb.last_block, Some(3));
    }

    #[test]
    fn resume_without_grouping_uses_segment_index() {
        let mut pb = OverlayPlayback::new(40);
        pb.begin_segment(2, None, false);
        for _ in 0..5 {
            pb.note_frame_read();
        }
        assert_eq!(pb.begin_segment(3, None, false), Continuation::ResumeAt(5));
        assert_eq!(pb.begin_segment(7, None, false), Continuation::RestartFromZero);
    }

    #[test]
    fn cursor_never_exceeds_total_frames() {
        let mut pb = OverlayPlayback::new(3);
        pb.begin_segment(0, None, false);
        for _ in 0..10 {
            if pb.can_render() {
                pb.note_frame_read();
            }
        }
        assert_eq!(pb.read_cursor, 3);
        assert!(pb.exhausted);
        assert!(!pb.can_render());
    }

    #[test]
    fn zero_frame_clip_is_born_exhausted() {
        let pb = OverlayPlayback::new(0);
        assert!(pb.exhausted);
        assert!(!pb.can_render());
    }

    #[test]
    fn active_window_scans_in_order() {
        let windows = vec![
            SegmentWindow {
                segment: 0,
                range: FrameRange { start: FrameIndex(10), end: FrameIndex(20) },
                clip: None,
                block: None,
            },
            SegmentWindow {
                segment: 1,
                range: FrameRange { start: FrameIndex(30), end: FrameIndex(40) },
                clip: None,
                block: None,
            },
        ];
        assert_eq!(active_window(&windows, FrameIndex(15)).map(|w| w.segment), Some(0));
        assert_eq!(active_window(&windows, FrameIndex(25)), None);
        assert_eq!(active_window(&windows, FrameIndex(39)).map(|w| w.segment), Some(1));
    }
}
