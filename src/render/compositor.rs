use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::assets::media::{VideoFrameStream, VideoMetadata, probe_video};
use crate::encode::ffmpeg::{EncodeConfig, FfmpegEncoder};
use crate::foundation::core::{Canvas, FrameIndex, FrameRgba, Fps};
use crate::foundation::error::{HiliteError, HiliteResult};
use crate::project::SubtitleDesign;
use crate::render::overlay::{
    OverlayPlaybackTable, SegmentWindow, active_window, build_segment_windows, merge_continuity,
};
use crate::subtitle::draw::{CaptionContext, draw_caption_at};
use crate::subtitle::measure::GlyphBackend;
use crate::transcript::model::Transcript;
use crate::transcript::resolve::{HighlightSegment, SubtitleBlock};

/// Output frames are centre-cropped to this fixed width/height ratio.
pub const TARGET_ASPECT_RATIO: f64 = 4.0 / 5.0;

/// Everything the compositor needs for one render pass.
pub struct CompositorInputs<'a> {
    /// Probed base video metadata.
    pub base: &'a VideoMetadata,
    /// The word-level transcript.
    pub transcript: &'a Transcript,
    /// Highlight segments, sorted by `start_word`.
    pub segments: &'a [HighlightSegment],
    /// Subtitle blocks, sorted by `start_word`, when grouping is active.
    pub blocks: Option<&'a [SubtitleBlock]>,
    /// Custom display text per block.
    pub custom_texts: Option<&'a [String]>,
    /// Caption styling.
    pub design: &'a SubtitleDesign,
    /// Fraction of the canvas an overlay clip may cover.
    pub overlay_coverage: f64,
    /// Destination of the silent render.
    pub out_path: &'a Path,
}

/// Result of a silent render pass.
#[derive(Clone, Copy, Debug)]
pub struct RenderStats {
    /// Frames actually written to the encoder.
    pub frames_written: u64,
    /// Output canvas dimensions.
    pub canvas: Canvas,
    /// Output frame rate (the base video's native rate).
    pub fps: Fps,
}

struct ClipSource {
    path: PathBuf,
    filter: String,
    out_width: u32,
    out_height: u32,
    fps: Fps,
    stream: VideoFrameStream,
    scratch: Vec<u8>,
}

/// Stream the base video frame by frame, blending the active highlight
/// overlay and the caption bar into each frame, and encode the result.
///
/// Overlay decoders are opened once here and released when the pass ends,
/// on every exit path.
pub fn render_silent_video(inputs: &CompositorInputs<'_>) -> HiliteResult<RenderStats> {
    let base = inputs.base;
    let (canvas_width, canvas_height) = even_dimensions(compute_cropped_dimensions(
        base.width,
        base.height,
        TARGET_ASPECT_RATIO,
    ));
    let canvas = Canvas {
        width: canvas_width,
        height: canvas_height,
    };
    let fps = base.fps;

    // Setup: one decoder per distinct overlay clip path. A missing file is
    // a fatal configuration error before any frame is written.
    let mut clip_ids_by_path = HashMap::<PathBuf, usize>::new();
    let mut sources = Vec::<ClipSource>::new();
    let mut clip_frame_counts = Vec::<u64>::new();
    let mut segment_clip_ids = Vec::<Option<usize>>::with_capacity(inputs.segments.len());

    for segment in inputs.segments {
        let Some(path) = segment.clip_path.as_ref() else {
            segment_clip_ids.push(None);
            continue;
        };
        if let Some(&id) = clip_ids_by_path.get(path) {
            segment_clip_ids.push(Some(id));
            continue;
        }
        if !path.exists() {
            return Err(HiliteError::asset_missing(format!(
                "overlay clip not found: {}",
                path.display()
            )));
        }

        let meta = probe_video(path)?;
        let (crop_w, crop_h) =
            compute_cropped_dimensions(meta.width, meta.height, TARGET_ASPECT_RATIO);
        let (out_w, out_h) = overlay_target_size(
            canvas_width,
            canvas_height,
            TARGET_ASPECT_RATIO,
            inputs.overlay_coverage,
        );
        let filter = format!("crop={crop_w}:{crop_h},scale={out_w}:{out_h}");
        let stream = VideoFrameStream::open(path, Some(&filter), out_w, out_h, 0, meta.fps)?;

        let id = sources.len();
        clip_ids_by_path.insert(path.clone(), id);
        clip_frame_counts.push(meta.frame_count);
        sources.push(ClipSource {
            path: path.clone(),
            filter,
            out_width: out_w,
            out_height: out_h,
            fps: meta.fps,
            stream,
            scratch: vec![0u8; out_w as usize * out_h as usize * 4],
        });
        segment_clip_ids.push(Some(id));
    }

    // Continuity merge pre-pass over the segment windows.
    let mut windows = build_segment_windows(
        inputs.transcript,
        inputs.segments,
        &segment_clip_ids,
        inputs.blocks,
        fps,
    );
    merge_continuity(&mut windows, inputs.blocks.is_some());

    let mut playback = OverlayPlaybackTable::new(&clip_frame_counts);
    let mut encoder = FfmpegEncoder::start(EncodeConfig {
        out_path: inputs.out_path.to_path_buf(),
        width: canvas_width,
        height: canvas_height,
        fps,
        overwrite: true,
    })?;

    let mut base_stream = VideoFrameStream::open(
        &base.source_path,
        Some(&format!("crop={canvas_width}:{canvas_height}")),
        canvas_width,
        canvas_height,
        0,
        fps,
    )?;

    let highlight_ranges: Vec<(usize, usize)> = inputs
        .segments
        .iter()
        .map(|s| (s.start_word, s.end_word))
        .collect();
    let caption_ctx = CaptionContext {
        transcript: inputs.transcript,
        design: inputs.design,
        highlight_ranges: &highlight_ranges,
        blocks: inputs.blocks,
        custom_texts: inputs.custom_texts,
    };
    let mut glyphs = GlyphBackend::from_design(inputs.design);

    info!(
        base = %base.source_path.display(),
        width = canvas_width,
        height = canvas_height,
        fps = fps.as_f64(),
        clips = sources.len(),
        "starting silent render"
    );

    let mut frame = FrameRgba::black(canvas_width, canvas_height);
    let grouping = inputs.blocks.is_some();

    loop {
        match base_stream.read_frame(&mut frame.data) {
            Ok(true) => {}
            Ok(false) => break,
            Err(err) => {
                // Mid-stream decode failure on the base video: terminate
                // the stream cleanly and finalize what was written.
                warn!(%err, "base video decode ended early");
                break;
            }
        }

        let frame_index = FrameIndex(encoder.frames_written());
        let current_time = fps.frames_to_secs(frame_index.0);

        if let Some(window) = active_window(&windows, frame_index).copied()
            && let Some(clip_id) = window.clip
        {
            step_overlay(
                &mut frame,
                &window,
                clip_id,
                grouping,
                &mut playback,
                &mut sources,
            );
        }

        draw_caption_at(&mut frame, current_time, &caption_ctx, &mut glyphs);
        encoder.push_frame(&frame)?;
    }

    let frames_written = encoder.finish()?;
    info!(frames = frames_written, out = %inputs.out_path.display(), "silent render complete");

    Ok(RenderStats {
        frames_written,
        canvas,
        fps,
    })
}

/// Advance one overlay clip for the current frame and blend its frame,
/// centred, into the canvas. Decode failures degrade to "no overlay".
fn step_overlay(
    frame: &mut FrameRgba,
    window: &SegmentWindow,
    clip_id: usize,
    grouping: bool,
    playback: &mut OverlayPlaybackTable,
    sources: &mut [ClipSource],
) {
    let (Some(state), Some(source)) = (playback.get_mut(clip_id), sources.get_mut(clip_id)) else {
        return;
    };

    if state.active_segment != Some(window.segment) {
        let decision = state.begin_segment(window.segment, window.block, grouping);
        debug!(clip = clip_id, segment = window.segment, ?decision, "overlay transition");
    } else {
        state.touch_block(window.block);
    }

    if !state.can_render() {
        return;
    }

    // Resolve a pending seek into either a forward skip on the open stream
    // or an exact reopen at the target frame.
    if let Some(target) = state.pending_seek.take() {
        let target = target.min(state.total_frames.saturating_sub(1));
        let position = source.stream.position();
        if target >= position {
            state.frames_to_skip = target - position;
        } else {
            match VideoFrameStream::open(
                &source.path,
                Some(&source.filter),
                source.out_width,
                source.out_height,
                target,
                source.fps,
            ) {
                Ok(stream) => {
                    source.stream = stream;
                    state.frames_to_skip = 0;
                }
                Err(err) => {
                    warn!(clip = %source.path.display(), %err, "overlay reopen failed, disabling clip");
                    state.mark_exhausted();
                    return;
                }
            }
        }
        state.read_cursor = target;
    }

    if state.frames_to_skip > 0 {
        match source.stream.skip_frames(state.frames_to_skip, &mut source.scratch) {
            Ok(skipped) if skipped == state.frames_to_skip => state.frames_to_skip = 0,
            Ok(_) => {
                state.mark_exhausted();
                return;
            }
            Err(err) => {
                warn!(clip = %source.path.display(), %err, "overlay decode failed, disabling clip");
                state.mark_exhausted();
                return;
            }
        }
    }

    match source.stream.read_frame(&mut source.scratch) {
        Ok(true) => {
            state.note_frame_read();
            blit_centered(frame, &source.scratch, source.out_width, source.out_height);
        }
        Ok(false) => state.mark_exhausted(),
        Err(err) => {
            warn!(clip = %source.path.display(), %err, "overlay decode failed, disabling clip");
            state.mark_exhausted();
        }
    }
}

/// Copy an opaque RGBA tile into the centre of the frame.
fn blit_centered(frame: &mut FrameRgba, tile: &[u8], tile_width: u32, tile_height: u32) {
    let src_stride = tile_width as usize;
    let copy_width = tile_width.min(frame.width) as usize;
    let copy_height = tile_height.min(frame.height) as usize;
    let x0 = (frame.width as usize - copy_width) / 2;
    let y0 = (frame.height as usize - copy_height) / 2;

    for row in 0..copy_height {
        let src_off = row * src_stride * 4;
        let dst_off = ((y0 + row) * frame.width as usize + x0) * 4;
        frame.data[dst_off..dst_off + copy_width * 4]
            .copy_from_slice(&tile[src_off..src_off + copy_width * 4]);
    }
}

/// Dimensions after centre-cropping `width x height` to `target_ratio`
/// (width / height).
pub fn compute_cropped_dimensions(width: u32, height: u32, target_ratio: f64) -> (u32, u32) {
    if width == 0 || height == 0 {
        return (width, height);
    }
    let current_ratio = f64::from(width) / f64::from(height);
    if (current_ratio - target_ratio).abs() < 1e-6 {
        return (width, height);
    }
    if current_ratio > target_ratio {
        let cropped_width = (f64::from(height) * target_ratio) as u32;
        (cropped_width.max(1), height)
    } else {
        let cropped_height = (f64::from(width) / target_ratio) as u32;
        (width, cropped_height.max(1))
    }
}

/// Size an overlay so it fits within a `coverage` fraction of the canvas
/// while keeping `aspect_ratio`.
pub fn overlay_target_size(
    canvas_width: u32,
    canvas_height: u32,
    aspect_ratio: f64,
    coverage: f64,
) -> (u32, u32) {
    let coverage = coverage.clamp(0.0, 1.0);
    let mut target_height = (f64::from(canvas_height) * coverage) as u32;
    let mut target_width = (f64::from(target_height) * aspect_ratio) as u32;
    if f64::from(target_width) > f64::from(canvas_width) * coverage {
        target_width = (f64::from(canvas_width) * coverage) as u32;
        target_height = (f64::from(target_width) / aspect_ratio) as u32;
    }
    (
        target_width.clamp(1, canvas_width),
        target_height.clamp(1, canvas_height),
    )
}

fn even_dimensions((width, height): (u32, u32)) -> (u32, u32) {
    ((width & !1).max(2), (height & !1).max(2))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crop_wide_source_to_4_5() {
        let (w, h) = compute_cropped_dimensions(1920, 1080, TARGET_ASPECT_RATIO);
        assert_eq!(h, 1080);
        assert_eq!(w, 864);
    }

    #[test]
    fn crop_tall_source_to_4_5() {
        let (w, h) = compute_cropped_dimensions(720, 1280, TARGET_ASPECT_RATIO);
        assert_eq!(w, 720);
        assert_eq!(h, 900);
    }

    #[test]
    fn crop_matching_source_is_untouched() {
        assert_eq!(
            compute_cropped_dimensions(720, 900, TARGET_ASPECT_RATIO),
            (720, 900)
        );
    }

    #[test]
    fn even_dimensions_round_down() {
        assert_eq!(even_dimensions((721, 901)), (720, 900));
        assert_eq!(even_dimensions((720, 900)), (720, 900));
        assert_eq!(even_dimensions((1, 1)), (2, 2));
    }

    #[test]
    fn overlay_full_coverage_fills_canvas() {
        let (w, h) = overlay_target_size(720, 900, TARGET_ASPECT_RATIO, 1.0);
        assert_eq!((w, h), (720, 900));
    }

    #[test]
    fn overlay_partial_coverage_shrinks_proportionally() {
        let (w, h) = overlay_target_size(720, 900, TARGET_ASPECT_RATIO, 0.5);
        assert_eq!(h, 450);
        assert_eq!(w, 360);
    }

    #[test]
    fn blit_centers_tile() {
        let mut frame = FrameRgba::black(8, 8);
        let tile = vec![200u8; 4 * 4 * 4];
        blit_centered(&mut frame, &tile, 4, 4);
        let centre = ((4 * 8) + 4) * 4;
        assert_eq!(frame.data[centre], 200);
        assert_eq!(frame.data[0], 0);
    }
}
