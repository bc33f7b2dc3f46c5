//! hilite overlays short highlight clips and auto-laid-out subtitles onto a
//! base video, driven by a word-level transcript, then muxes the result
//! with multiple optionally-looped audio layers.
//!
//! # Pipeline overview
//!
//! 1. **Resolve**: phrases / word-index ranges -> `HighlightSegment`s and
//!    `SubtitleBlock`s ([`resolve_assignments`], [`default_subtitle_blocks`])
//! 2. **Render**: stream the base video frame by frame, advance each
//!    overlay clip through its playback state machine, draw the caption
//!    bar, and encode a silent MP4 ([`render_silent_video`])
//! 3. **Mix**: layer base audio, global music, and per-segment music cues
//!    (looped and gain-adjusted) and mux into the final file
//!    ([`mix_and_mux`])
//!
//! The key design constraints:
//!
//! - **No unsafe**: `unsafe` is forbidden in this crate.
//! - **Deterministic timing**: segment windows, the continuity merge, and
//!   the continuation state machine are pure and stable for a given input.
//! - **Sequential core**: one frame is fully decoded, composited, and
//!   encoded before the next begins; decoders are scoped to one render
//!   pass and released on every exit path.
//! - **One media backend**: probing, decoding, encoding, and muxing all go
//!   through the system `ffmpeg`/`ffprobe` binaries over pipes.
#![forbid(unsafe_code)]

mod assets;
mod audio;
mod encode;
mod foundation;
mod project;
mod render;
mod subtitle;
mod transcript;

pub use assets::media::{
    AudioPcm, MIX_SAMPLE_RATE, VideoFrameStream, VideoMetadata, decode_audio_f32_stereo,
    is_ffmpeg_on_path, probe_video,
};
pub use audio::mix::{
    AudioLayer, MixInputs, build_audio_layers, loop_to_frames, mix_and_mux, mix_layers,
    write_mix_to_f32le_file,
};
pub use encode::ffmpeg::{
    EncodeConfig, FfmpegEncoder, ensure_parent_dir, mux_video_with_audio,
};
pub use foundation::core::{Canvas, FrameIndex, FrameRange, FrameRgba, Fps};
pub use foundation::error::{HiliteError, HiliteResult};
pub use project::{CaptionSentence, HighlightAssignment, ProjectConfig, SubtitleDesign};
pub use render::compositor::{
    CompositorInputs, RenderStats, TARGET_ASPECT_RATIO, compute_cropped_dimensions,
    overlay_target_size, render_silent_video,
};
pub use render::overlay::{
    Continuation, OverlayPlayback, OverlayPlaybackTable, SegmentWindow, active_window,
    assign_subtitle_blocks, build_segment_windows, merge_continuity,
};
pub use render::pipeline::{RenderReport, render_project};
pub use subtitle::draw::{CaptionContext, active_block_index, blur_rgba8_premul, draw_caption_at};
pub use subtitle::layout::{
    BoxGeometry, CaptionLayout, CaptionToken, CaptionWord, Line, balance_two_lines, caption_box,
    layout_caption, line_width, split_score, wrap_greedy,
};
pub use subtitle::measure::{FontGlyphs, GlyphBackend, RasterGlyph, StrokeGlyphs, WordMetrics};
pub use transcript::model::{Transcript, Word, normalize_token};
pub use transcript::resolve::{
    AlignedCaption, HighlightSegment, SubtitleBlock, align_caption_sentences,
    default_subtitle_blocks, find_phrase_occurrence, resolve_assignments,
};
