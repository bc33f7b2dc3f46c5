use std::path::{Path, PathBuf};

use tracing::info;

use crate::assets::media::probe_video;
use crate::audio::mix::{MixInputs, mix_and_mux};
use crate::foundation::core::{Canvas, Fps};
use crate::foundation::error::{HiliteError, HiliteResult};
use crate::project::ProjectConfig;
use crate::render::compositor::{CompositorInputs, render_silent_video};
use crate::transcript::model::Transcript;
use crate::transcript::resolve::{
    HighlightSegment, SubtitleBlock, align_caption_sentences, default_subtitle_blocks,
    resolve_assignments,
};

/// Everything a caller may want to inspect after a successful render.
#[derive(Clone, Debug)]
pub struct RenderReport {
    /// The transcript the render was driven by.
    pub transcript: Transcript,
    /// Resolved highlight segments, sorted by start word.
    pub segments: Vec<HighlightSegment>,
    /// Caption blocks used for subtitle timing.
    pub blocks: Vec<SubtitleBlock>,
    /// Custom display text per block, when caption sentences were given.
    pub custom_texts: Option<Vec<String>>,
    /// Where the final output landed.
    pub output_path: PathBuf,
    /// Frames written to the silent render.
    pub frames_written: u64,
    /// Output canvas dimensions.
    pub canvas: Canvas,
    /// Output frame rate.
    pub fps: Fps,
}

/// Run the full pipeline: resolve segments and captions, render the silent
/// video, then mix and mux audio.
///
/// Resolution and asset errors surface before any rendering work begins;
/// the intermediate silent file is removed once muxing succeeds.
pub fn render_project(config: &ProjectConfig) -> HiliteResult<RenderReport> {
    let base = probe_video(&config.main_video_path)?;

    let transcript = match (&config.transcript_path, &config.transcript_text) {
        (Some(path), _) => Transcript::from_json_file(path)?,
        (None, Some(text)) => Transcript::evenly_spaced(text, base.duration),
        (None, None) => {
            return Err(HiliteError::validation(
                "a transcript is required: set transcript_path or transcript_text",
            ));
        }
    };

    let mut segments = resolve_assignments(&transcript, &config.highlight_assignments)?;
    segments.sort_by_key(|s| s.start_word);

    let mut custom_texts: Option<Vec<String>> = None;
    let blocks: Vec<SubtitleBlock> = if !config.subtitle_sentences.is_empty() {
        let aligned = align_caption_sentences(&transcript, &config.subtitle_sentences)?;
        custom_texts = Some(aligned.iter().map(|a| a.text.clone()).collect());
        aligned.into_iter().map(|a| a.block).collect()
    } else if let Some(explicit) = &config.subtitle_segments {
        let mut blocks = Vec::with_capacity(explicit.len());
        for &(start_word, end_word) in explicit {
            if start_word > end_word || end_word >= transcript.len() {
                return Err(HiliteError::resolution(format!(
                    "invalid subtitle segment {start_word}..={end_word} \
                     (transcript has {} words)",
                    transcript.len()
                )));
            }
            blocks.push(SubtitleBlock {
                start_word,
                end_word,
            });
        }
        blocks.sort_by_key(|b| b.start_word);
        blocks
    } else {
        default_subtitle_blocks(&transcript, &segments, config.subtitle_block_size)
    };

    let needs_audio = config.needs_audio_mix();
    let silent_path = if needs_audio {
        silent_output_path(&config.output_path)
    } else {
        config.output_path.clone()
    };

    let stats = render_silent_video(&CompositorInputs {
        base: &base,
        transcript: &transcript,
        segments: &segments,
        blocks: (!blocks.is_empty()).then_some(&blocks[..]),
        custom_texts: custom_texts.as_deref(),
        design: &config.subtitle_design,
        overlay_coverage: config.overlay_coverage,
        out_path: &silent_path,
    })?;

    if needs_audio {
        mix_and_mux(&MixInputs {
            silent_video_path: &silent_path,
            base_video_path: &config.main_video_path,
            transcript: &transcript,
            segments: &segments,
            preserve_audio: config.preserve_audio,
            global_music_path: config.global_music_path.as_deref(),
            global_music_volume: config.global_music_volume,
            video_duration: stats.fps.frames_to_secs(stats.frames_written),
            final_output_path: &config.output_path,
        })?;
        if silent_path != config.output_path && silent_path.exists() {
            std::fs::remove_file(&silent_path).map_err(|e| {
                HiliteError::encode(format!(
                    "failed to remove intermediate '{}': {e}",
                    silent_path.display()
                ))
            })?;
        }
    }

    info!(out = %config.output_path.display(), "render complete");

    Ok(RenderReport {
        transcript,
        segments,
        blocks,
        custom_texts,
        output_path: config.output_path.clone(),
        frames_written: stats.frames_written,
        canvas: stats.canvas,
        fps: stats.fps,
    })
}

/// `out.mp4` -> `out.silent.mp4`, next to the final output.
fn silent_output_path(output: &Path) -> PathBuf {
    let ext = output
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("mp4")
        .to_string();
    output.with_extension(format!("silent.{ext}"))
}
