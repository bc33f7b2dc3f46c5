use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::foundation::error::HiliteResult;

/// Input description of one highlight selected by the user.
///
/// Either `phrase` (+ `occurrence`) or both explicit word indices must be
/// present; explicit indices win when both are given.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct HighlightAssignment {
    /// Natural-language selection, matched fuzzily against the transcript.
    pub phrase: Option<String>,
    /// Overlay clip played while the highlight is active.
    pub clip_path: Option<PathBuf>,
    /// Music cue spanning the highlight.
    pub music_path: Option<PathBuf>,
    /// Gain applied to the music cue.
    #[serde(default = "default_volume")]
    pub music_volume: f64,
    /// 1-indexed ordinal when the phrase appears multiple times.
    #[serde(default = "default_occurrence")]
    pub occurrence: usize,
    /// Manual override for the first word index.
    pub start_word: Option<usize>,
    /// Manual override for the last word index.
    pub end_word: Option<usize>,
}

impl Default for HighlightAssignment {
    fn default() -> Self {
        Self {
            phrase: None,
            clip_path: None,
            music_path: None,
            music_volume: 1.0,
            occurrence: 1,
            start_word: None,
            end_word: None,
        }
    }
}

/// Optional per-sentence caption override.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct CaptionSentence {
    /// Text rendered on screen (may contain explicit line breaks).
    pub text: String,
    /// Phrase aligned within the transcript; defaults to `text`.
    pub phrase: Option<String>,
    /// Which occurrence to align when the phrase repeats.
    #[serde(default = "default_occurrence")]
    pub occurrence: usize,
    /// Manual override for the first word index.
    pub start_word: Option<usize>,
    /// Manual override for the last word index.
    pub end_word: Option<usize>,
}

impl Default for CaptionSentence {
    fn default() -> Self {
        Self {
            text: String::new(),
            phrase: None,
            occurrence: 1,
            start_word: None,
            end_word: None,
        }
    }
}

/// Configuration controlling the look of rendered captions.
///
/// Consumed read-only by the layout engine and the compositor. Unknown JSON
/// keys are ignored; missing ones take the defaults below.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct SubtitleDesign {
    /// Caption bar fill colour (RGB).
    pub bar_color: [u8; 3],
    /// Opacity of the caption bar, 0..=1.
    pub bar_opacity: f64,
    /// Primary caption text colour (RGB).
    pub text_color: [u8; 3],
    /// Highlight pill colour (RGB), used only when
    /// [`SubtitleDesign::apply_highlight_style`] is on.
    pub highlight_color: [u8; 3],
    /// Text colour inside a highlight pill.
    pub highlight_text_color: [u8; 3],
    /// Horizontal padding inside the caption bar, pixels.
    pub margin_x: u32,
    /// Vertical padding inside the caption bar, pixels.
    pub margin_y: u32,
    /// Gap between the caption bar and the frame bottom, pixels.
    pub bottom_margin: u32,
    /// Max text block width relative to frame width.
    pub max_line_width_ratio: f64,
    /// Pixels between lines inside the caption bar.
    pub line_spacing: u32,
    /// Rounded corner radius, pixels.
    pub corner_radius: u32,
    /// Extra padding around highlighted words `(x, y)`, pixels.
    pub highlight_padding: (u32, u32),
    /// Drop shadow offset for the bar `(x, y)`, pixels.
    pub box_shadow_offset: (i32, i32),
    /// Gaussian blur radius for the bar shadow, pixels.
    pub box_shadow_blur: u32,
    /// Alpha applied to the bar shadow, 0..=1.
    pub box_shadow_alpha: f64,
    /// Path to a TTF/OTF font; the fixed-stroke fallback is used when the
    /// file is absent.
    pub font_path: Option<PathBuf>,
    /// Font size in pixels.
    pub font_size_px: u32,
    /// Apply highlight pill styling to words inside highlight segments.
    ///
    /// The overlap itself is always computed; rendering it ships disabled.
    pub apply_highlight_style: bool,
}

impl Default for SubtitleDesign {
    fn default() -> Self {
        Self {
            bar_color: [0, 0, 0],
            bar_opacity: 1.0,
            text_color: [255, 255, 255],
            highlight_color: [0, 0, 0],
            highlight_text_color: [255, 255, 255],
            margin_x: 6,
            margin_y: 0,
            bottom_margin: 30,
            max_line_width_ratio: 0.72,
            line_spacing: 10,
            corner_radius: 4,
            highlight_padding: (3, 1),
            box_shadow_offset: (8, 10),
            box_shadow_blur: 25,
            box_shadow_alpha: 0.55,
            font_path: Some(PathBuf::from("fonts/Montserrat-SemiBold.ttf")),
            font_size_px: 54,
            apply_highlight_style: false,
        }
    }
}

/// All inputs required to render a project.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// Base video the overlays and captions are composited onto.
    pub main_video_path: PathBuf,
    /// Destination of the rendered (and muxed) video.
    pub output_path: PathBuf,
    /// Word-level transcript JSON; takes precedence over `transcript_text`.
    pub transcript_path: Option<PathBuf>,
    /// Plain transcript text, distributed evenly across the video duration.
    pub transcript_text: Option<String>,
    /// User highlight selections.
    pub highlight_assignments: Vec<HighlightAssignment>,
    /// Keep the base video's own audio track in the final mix.
    pub preserve_audio: bool,
    /// Background music for the entire video.
    pub global_music_path: Option<PathBuf>,
    /// Gain applied to the global music track.
    pub global_music_volume: f64,
    /// Caption styling.
    pub subtitle_design: SubtitleDesign,
    /// Explicit caption blocks as inclusive word-index pairs.
    pub subtitle_segments: Option<Vec<(usize, usize)>>,
    /// Custom caption sentences aligned onto the transcript.
    pub subtitle_sentences: Vec<CaptionSentence>,
    /// Words per caption block when no explicit captions are given.
    pub subtitle_block_size: usize,
    /// Fraction of the canvas an overlay clip may cover.
    pub overlay_coverage: f64,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            main_video_path: PathBuf::new(),
            output_path: PathBuf::from("output.mp4"),
            transcript_path: None,
            transcript_text: None,
            highlight_assignments: Vec::new(),
            preserve_audio: true,
            global_music_path: None,
            global_music_volume: 1.0,
            subtitle_design: SubtitleDesign::default(),
            subtitle_segments: None,
            subtitle_sentences: Vec::new(),
            subtitle_block_size: 8,
            overlay_coverage: 1.0,
        }
    }
}

impl ProjectConfig {
    /// Load a project description from a JSON file. Missing keys take
    /// defaults, unknown keys are ignored.
    pub fn from_json_file(path: &Path) -> HiliteResult<Self> {
        let bytes =
            std::fs::read(path).with_context(|| format!("read project '{}'", path.display()))?;
        let config = serde_json::from_slice(&bytes)
            .with_context(|| format!("parse project JSON '{}'", path.display()))?;
        Ok(config)
    }

    /// `true` when any highlight carries a music cue.
    pub fn any_segment_music(&self) -> bool {
        self.highlight_assignments
            .iter()
            .any(|a| a.music_path.is_some())
    }

    /// `true` when the final output needs an audio mix pass at all.
    pub fn needs_audio_mix(&self) -> bool {
        self.preserve_audio || self.global_music_path.is_some() || self.any_segment_music()
    }
}

fn default_volume() -> f64 {
    1.0
}

fn default_occurrence() -> usize {
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn design_defaults_match_documented_values() {
        let d = SubtitleDesign::default();
        assert_eq!(d.max_line_width_ratio, 0.72);
        assert_eq!(d.bottom_margin, 30);
        assert_eq!(d.corner_radius, 4);
        assert_eq!(d.box_shadow_offset, (8, 10));
        assert!(!d.apply_highlight_style);
    }

    #[test]
    fn unknown_and_missing_keys_are_tolerated() {
        let json = r#"{
            "main_video_path": "in.mp4",
            "subtitle_design": { "bottom_margin": 44, "mystery_option": true },
            "highlight_assignments": [ { "phrase": "hello", "unknown": 1 } ]
        }"#;
        let cfg: ProjectConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.subtitle_design.bottom_margin, 44);
        assert_eq!(cfg.subtitle_design.corner_radius, 4);
        assert_eq!(cfg.highlight_assignments[0].occurrence, 1);
        assert_eq!(cfg.output_path, PathBuf::from("output.mp4"));
    }

    #[test]
    fn needs_audio_mix_tracks_music_sources() {
        let mut cfg = ProjectConfig {
            preserve_audio: false,
            ..ProjectConfig::default()
        };
        assert!(!cfg.needs_audio_mix());
        cfg.global_music_path = Some(PathBuf::from("bed.mp3"));
        assert!(cfg.needs_audio_mix());
    }
}
