use crate::foundation::core::FrameRgba;
use crate::foundation::math::{mul_div255_u8, over_premul};
use crate::project::SubtitleDesign;
use crate::subtitle::layout::{
    BoxGeometry, CaptionLayout, CaptionToken, CaptionWord, caption_box, layout_caption,
};
use crate::subtitle::measure::GlyphBackend;
use crate::transcript::model::Transcript;
use crate::transcript::resolve::SubtitleBlock;

/// Everything the caption renderer needs besides the frame itself.
pub struct CaptionContext<'a> {
    /// The word-level transcript.
    pub transcript: &'a Transcript,
    /// Caption styling.
    pub design: &'a SubtitleDesign,
    /// Inclusive word ranges of all highlight segments.
    pub highlight_ranges: &'a [(usize, usize)],
    /// Explicit caption blocks, if any.
    pub blocks: Option<&'a [SubtitleBlock]>,
    /// Custom display text per block (parallel to `blocks`).
    pub custom_texts: Option<&'a [String]>,
}

/// Pick the caption block active at `current_time`.
///
/// Between blocks the previous caption stays on screen until the next one
/// starts; before the first block nothing is shown.
pub fn active_block_index(
    transcript: &Transcript,
    blocks: &[SubtitleBlock],
    current_time: f64,
) -> Option<usize> {
    let mut previous: Option<usize> = None;
    for (idx, block) in blocks.iter().enumerate() {
        let (Some(first), Some(last)) =
            (transcript.get(block.start_word), transcript.get(block.end_word))
        else {
            continue;
        };
        if first.start_time <= current_time && current_time <= last.end_time {
            return Some(idx);
        }
        if current_time < first.start_time {
            return previous;
        }
        previous = Some(idx);
    }
    previous
}

/// Draw the caption bar and text for `current_time` onto `frame`.
pub fn draw_caption_at(
    frame: &mut FrameRgba,
    current_time: f64,
    ctx: &CaptionContext<'_>,
    backend: &mut GlyphBackend,
) {
    if ctx.transcript.is_empty() {
        return;
    }

    let tokens = match collect_tokens(current_time, ctx, backend) {
        Some(tokens) if !tokens.is_empty() => tokens,
        _ => return,
    };

    let max_line_width =
        ((frame.width as f64 * ctx.design.max_line_width_ratio) as u32).max(1);
    let space_width = backend.space_width();
    let Some(layout) =
        layout_caption(&tokens, space_width, max_line_width, ctx.design.line_spacing)
    else {
        return;
    };

    let geometry = caption_box(&layout, ctx.design, frame.width, frame.height);
    draw_shadowed_box(frame, geometry, ctx.design);
    draw_caption_text(frame, &layout, geometry, ctx.design, space_width, backend);
}

/// Gather measured word tokens for the current instant: either the active
/// block's custom text (split on explicit line breaks), the active block's
/// transcript words, or a sliding time window when no blocks exist.
fn collect_tokens(
    current_time: f64,
    ctx: &CaptionContext<'_>,
    backend: &mut GlyphBackend,
) -> Option<Vec<CaptionToken>> {
    let transcript = ctx.transcript;

    if let Some(blocks) = ctx.blocks {
        let active = active_block_index(transcript, blocks, current_time)?;
        let block = blocks.get(active)?;

        if let Some(texts) = ctx.custom_texts
            && let Some(custom) = texts.get(active)
        {
            // Word-level overlap with highlights is computed per block; it
            // only affects rendering when highlight styling is enabled.
            let highlighted = ctx.highlight_ranges.iter().any(|&(start, end)| {
                !(end < block.start_word || start > block.end_word)
            });

            let cleaned = custom.replace('\r', "");
            let mut lines: Vec<String> = cleaned
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(String::from)
                .collect();
            if lines.is_empty() {
                lines = vec![custom.trim().to_string()];
            }

            let mut tokens = Vec::new();
            for (idx, line) in lines.iter().enumerate() {
                for word in line.split_whitespace() {
                    tokens.push(CaptionToken::Word(CaptionWord {
                        text: word.to_string(),
                        highlighted,
                        metrics: backend.measure_word(word),
                    }));
                }
                if idx != lines.len() - 1 {
                    tokens.push(CaptionToken::Break);
                }
            }
            return Some(tokens);
        }

        let mut tokens = Vec::new();
        for idx in block.start_word..=block.end_word {
            let Some(word) = transcript.get(idx) else {
                continue;
            };
            let highlighted = ctx
                .highlight_ranges
                .iter()
                .any(|&(start, end)| start <= idx && idx <= end);
            tokens.push(CaptionToken::Word(CaptionWord {
                text: word.text.clone(),
                highlighted,
                metrics: backend.measure_word(&word.text),
            }));
        }
        return Some(tokens);
    }

    // No explicit grouping: show words whose midpoint falls inside a
    // sliding display window around the current instant.
    const DISPLAY_WINDOW: f64 = 2.6;
    let mut tokens = Vec::new();
    for (idx, word) in transcript.words().iter().enumerate() {
        let midpoint = (word.start_time + word.end_time) / 2.0;
        if (midpoint - current_time).abs() <= DISPLAY_WINDOW / 2.0 {
            let highlighted = ctx
                .highlight_ranges
                .iter()
                .any(|&(start, end)| start <= idx && idx <= end);
            tokens.push(CaptionToken::Word(CaptionWord {
                text: word.text.clone(),
                highlighted,
                metrics: backend.measure_word(&word.text),
            }));
        }
    }
    Some(tokens)
}

/// Draw the caption bar with its blurred drop shadow.
pub fn draw_shadowed_box(frame: &mut FrameRgba, geometry: BoxGeometry, design: &SubtitleDesign) {
    if geometry.width == 0 || geometry.height == 0 {
        return;
    }
    let radius = design
        .corner_radius
        .min(geometry.width.min(geometry.height) / 2);

    if design.box_shadow_alpha > 0.0 && design.box_shadow_blur > 0 {
        let mut layer = vec![0u8; frame.data.len()];
        fill_rounded_rect(
            &mut layer,
            frame.width,
            frame.height,
            geometry.left + design.box_shadow_offset.0,
            geometry.top + design.box_shadow_offset.1,
            geometry.width,
            geometry.height,
            radius,
            [0, 0, 0, 255],
        );
        let blur_radius = design.box_shadow_blur / 2;
        let sigma = gaussian_sigma_for_kernel(design.box_shadow_blur | 1);
        let blurred = blur_rgba8_premul(&layer, frame.width, frame.height, blur_radius, sigma);
        composite_layer_over(frame, &blurred, design.box_shadow_alpha);
    }

    let mut layer = vec![0u8; frame.data.len()];
    let fill = premul_color(design.bar_color, 255);
    fill_rounded_rect(
        &mut layer,
        frame.width,
        frame.height,
        geometry.left,
        geometry.top,
        geometry.width,
        geometry.height,
        radius,
        fill,
    );
    composite_layer_over(frame, &layer, design.bar_opacity);
}

/// Draw the laid-out caption text (and highlight pills when enabled).
fn draw_caption_text(
    frame: &mut FrameRgba,
    layout: &CaptionLayout,
    geometry: BoxGeometry,
    design: &SubtitleDesign,
    space_width: u32,
    backend: &mut GlyphBackend,
) {
    let mut y_cursor = geometry.top + design.margin_y as i32;

    for (line_index, line) in layout.lines.iter().enumerate() {
        if line.words.is_empty() {
            continue;
        }
        let ascent = layout.line_ascents[line_index] as i32;
        let descent = layout.line_descents[line_index] as i32;
        let top_line = y_cursor;
        let baseline = top_line + ascent;

        // Lines are centred on the frame, not on the bar.
        let mut x_cursor = (frame.width as i64 - line.width as i64) as i32 / 2;

        for (word_index, word) in line.words.iter().enumerate() {
            if word_index > 0 {
                x_cursor += space_width as i32;
            }

            let text_color = if design.apply_highlight_style && word.highlighted {
                let (pad_x, pad_y) = design.highlight_padding;
                fill_rect(
                    frame,
                    x_cursor - pad_x as i32,
                    top_line - pad_y as i32,
                    word.metrics.width as i32 + 2 * pad_x as i32,
                    ascent + descent + 2 * pad_y as i32,
                    premul_color(design.highlight_color, 255),
                );
                design.highlight_text_color
            } else {
                design.text_color
            };

            draw_word(frame, backend, &word.text, x_cursor, baseline, text_color);
            x_cursor += word.metrics.width as i32;
        }

        y_cursor = baseline + descent + design.line_spacing as i32;
    }
}

fn draw_word(
    frame: &mut FrameRgba,
    backend: &mut GlyphBackend,
    text: &str,
    x: i32,
    baseline: i32,
    color: [u8; 3],
) {
    let mut pen = x as f32;
    for ch in text.chars() {
        let glyph = backend.glyph(ch);
        let left = pen.round() as i32 + glyph.xmin;
        let top = baseline - glyph.ymin - glyph.height as i32;
        for gy in 0..glyph.height {
            for gx in 0..glyph.width {
                let coverage = glyph.coverage[gy * glyph.width + gx];
                if coverage == 0 {
                    continue;
                }
                blend_pixel(
                    frame,
                    left + gx as i32,
                    top + gy as i32,
                    premul_color(color, coverage),
                );
            }
        }
        pen += glyph.advance;
    }
}

/// Fill an axis-aligned rounded rectangle into a premultiplied RGBA layer.
#[allow(clippy::too_many_arguments)]
fn fill_rounded_rect(
    layer: &mut [u8],
    layer_width: u32,
    layer_height: u32,
    x: i32,
    y: i32,
    width: u32,
    height: u32,
    radius: u32,
    color: [u8; 4],
) {
    let radius = radius.min(width.min(height) / 2) as i32;
    let (w, h) = (width as i32, height as i32);

    fill_layer_rect(layer, layer_width, layer_height, x + radius, y, w - 2 * radius, h, color);
    fill_layer_rect(layer, layer_width, layer_height, x, y + radius, w, h - 2 * radius, color);
    for (cx, cy) in [
        (x + radius, y + radius),
        (x + w - radius - 1, y + radius),
        (x + radius, y + h - radius - 1),
        (x + w - radius - 1, y + h - radius - 1),
    ] {
        fill_layer_circle(layer, layer_width, layer_height, cx, cy, radius, color);
    }
}

fn fill_layer_rect(
    layer: &mut [u8],
    layer_width: u32,
    layer_height: u32,
    x: i32,
    y: i32,
    width: i32,
    height: i32,
    color: [u8; 4],
) {
    if width <= 0 || height <= 0 {
        return;
    }
    let x0 = x.max(0);
    let y0 = y.max(0);
    let x1 = (x + width).min(layer_width as i32);
    let y1 = (y + height).min(layer_height as i32);
    for py in y0..y1 {
        for px in x0..x1 {
            let idx = (py as usize * layer_width as usize + px as usize) * 4;
            layer[idx..idx + 4].copy_from_slice(&color);
        }
    }
}

fn fill_layer_circle(
    layer: &mut [u8],
    layer_width: u32,
    layer_height: u32,
    cx: i32,
    cy: i32,
    radius: i32,
    color: [u8; 4],
) {
    for dy in -radius..=radius {
        let span = ((radius * radius - dy * dy) as f64).sqrt() as i32;
        fill_layer_rect(
            layer,
            layer_width,
            layer_height,
            cx - span,
            cy + dy,
            span * 2 + 1,
            1,
            color,
        );
    }
}

fn fill_rect(frame: &mut FrameRgba, x: i32, y: i32, width: i32, height: i32, color: [u8; 4]) {
    if width <= 0 || height <= 0 {
        return;
    }
    for py in y.max(0)..(y + height).min(frame.height as i32) {
        for px in x.max(0)..(x + width).min(frame.width as i32) {
            blend_pixel(frame, px, py, color);
        }
    }
}

/// Composite a premultiplied layer over the frame with an extra uniform
/// alpha factor.
fn composite_layer_over(frame: &mut FrameRgba, layer: &[u8], alpha: f64) {
    let alpha = ((alpha.clamp(0.0, 1.0) * 255.0).round()) as u16;
    if alpha == 0 {
        return;
    }
    for (dst, src) in frame.data.chunks_exact_mut(4).zip(layer.chunks_exact(4)) {
        if src[3] == 0 {
            continue;
        }
        let scaled = [
            mul_div255_u8(u16::from(src[0]), alpha),
            mul_div255_u8(u16::from(src[1]), alpha),
            mul_div255_u8(u16::from(src[2]), alpha),
            mul_div255_u8(u16::from(src[3]), alpha),
        ];
        let out = over_premul([dst[0], dst[1], dst[2], dst[3]], scaled);
        dst.copy_from_slice(&out);
    }
}

fn blend_pixel(frame: &mut FrameRgba, x: i32, y: i32, src: [u8; 4]) {
    if x < 0 || y < 0 || x >= frame.width as i32 || y >= frame.height as i32 {
        return;
    }
    let idx = (y as usize * frame.width as usize + x as usize) * 4;
    let dst = [
        frame.data[idx],
        frame.data[idx + 1],
        frame.data[idx + 2],
        frame.data[idx + 3],
    ];
    let out = over_premul(dst, src);
    frame.data[idx..idx + 4].copy_from_slice(&out);
}

fn premul_color(rgb: [u8; 3], alpha: u8) -> [u8; 4] {
    [
        mul_div255_u8(u16::from(rgb[0]), u16::from(alpha)),
        mul_div255_u8(u16::from(rgb[1]), u16::from(alpha)),
        mul_div255_u8(u16::from(rgb[2]), u16::from(alpha)),
        alpha,
    ]
}

/// Sigma matched to an odd gaussian kernel size the way OpenCV derives it.
fn gaussian_sigma_for_kernel(ksize: u32) -> f32 {
    0.3 * (((ksize as f32 - 1.0) * 0.5) - 1.0) + 0.8
}

/// Separable gaussian blur over premultiplied RGBA8, fixed-point Q16
/// weights, clamp-to-edge sampling.
pub fn blur_rgba8_premul(src: &[u8], width: u32, height: u32, radius: u32, sigma: f32) -> Vec<u8> {
    if radius == 0 || src.len() != (width as usize) * (height as usize) * 4 {
        return src.to_vec();
    }

    let kernel = gaussian_kernel_q16(radius, sigma);
    let mut tmp = vec![0u8; src.len()];
    let mut out = vec![0u8; src.len()];
    blur_pass(src, &mut tmp, width, height, &kernel, true);
    blur_pass(&tmp, &mut out, width, height, &kernel, false);
    out
}

fn gaussian_kernel_q16(radius: u32, sigma: f32) -> Vec<u32> {
    let sigma = f64::from(if sigma.is_finite() && sigma > 0.0 { sigma } else { 1.0 });
    let r = radius as i32;
    let denom = 2.0 * sigma * sigma;

    let mut weights_f = Vec::<f64>::with_capacity((2 * r + 1) as usize);
    let mut sum = 0.0f64;
    for i in -r..=r {
        let x = f64::from(i);
        let w = (-x * x / denom).exp();
        weights_f.push(w);
        sum += w;
    }

    let mut weights = Vec::<u32>::with_capacity(weights_f.len());
    let mut acc: i64 = 0;
    for &wf in &weights_f {
        let q = (((wf / sum) * 65536.0).round() as i64).clamp(0, 65536);
        weights.push(q as u32);
        acc += q;
    }
    // Nudge the centre weight so the kernel sums to exactly 1.0 in Q16.
    let mid = weights.len() / 2;
    let adjusted = (i64::from(weights[mid]) + (65536 - acc)).clamp(0, 65536);
    weights[mid] = adjusted as u32;
    weights
}

fn blur_pass(src: &[u8], dst: &mut [u8], width: u32, height: u32, k: &[u32], horizontal: bool) {
    let radius = (k.len() / 2) as i32;
    let (w, h) = (width as i32, height as i32);
    for y in 0..h {
        for x in 0..w {
            let mut acc = [0u64; 4];
            for (ki, &kw) in k.iter().enumerate() {
                let d = ki as i32 - radius;
                let (sx, sy) = if horizontal {
                    ((x + d).clamp(0, w - 1), y)
                } else {
                    (x, (y + d).clamp(0, h - 1))
                };
                let idx = ((sy * w + sx) as usize) * 4;
                for c in 0..4 {
                    acc[c] += u64::from(kw) * u64::from(src[idx + c]);
                }
            }
            let out_idx = ((y * w + x) as usize) * 4;
            for c in 0..4 {
                dst[out_idx + c] = (((acc[c] + 32768) >> 16).min(255)) as u8;
            }
        }
    }
}
