use crate::project::SubtitleDesign;
use crate::subtitle::measure::WordMetrics;

/// One measured caption word ready for line building.
#[derive(Clone, Debug, PartialEq)]
pub struct CaptionWord {
    /// The rendered text.
    pub text: String,
    /// Whether the word lies inside any highlight segment.
    pub highlighted: bool,
    /// Measured pixel metrics.
    pub metrics: WordMetrics,
}

/// Input token stream for the wrapper: words, with explicit line breaks
/// for custom caption text.
#[derive(Clone, Debug, PartialEq)]
pub enum CaptionToken {
    /// A measured word.
    Word(CaptionWord),
    /// A forced line break from custom caption text.
    Break,
}

/// One wrapped caption line.
#[derive(Clone, Debug, PartialEq)]
pub struct Line {
    /// Words on the line, in order.
    pub words: Vec<CaptionWord>,
    /// Total advance width including inter-word spaces.
    pub width: u32,
}

/// Fully laid out caption block.
#[derive(Clone, Debug, PartialEq)]
pub struct CaptionLayout {
    /// At most two lines after balancing (unless forced breaks demand more).
    pub lines: Vec<Line>,
    /// Per-line max ascent.
    pub line_ascents: Vec<u32>,
    /// Per-line max descent.
    pub line_descents: Vec<u32>,
    /// Widest line width.
    pub block_width: u32,
    /// Sum of line heights plus inter-line spacing.
    pub block_height: u32,
}

/// Caption bar placement on the frame, pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoxGeometry {
    /// Left edge.
    pub left: i32,
    /// Top edge.
    pub top: i32,
    /// Bar width.
    pub width: u32,
    /// Bar height.
    pub height: u32,
}

/// Advance width of `words` laid out on one line with `space_width` gaps.
pub fn line_width(words: &[CaptionWord], space_width: u32) -> u32 {
    let mut acc = 0u32;
    for (idx, word) in words.iter().enumerate() {
        if idx > 0 {
            acc += space_width;
        }
        acc += word.metrics.width;
    }
    acc
}

/// Greedy word wrap: words are appended while they fit `max_line_width`;
/// forced breaks always start a new line.
pub fn wrap_greedy(tokens: &[CaptionToken], space_width: u32, max_line_width: u32) -> Vec<Line> {
    let mut lines = Vec::<Line>::new();
    let mut current = Vec::<CaptionWord>::new();
    let mut current_width = 0u32;

    for token in tokens {
        let word = match token {
            CaptionToken::Break => {
                if !current.is_empty() {
                    lines.push(Line {
                        words: std::mem::take(&mut current),
                        width: current_width,
                    });
                    current_width = 0;
                }
                continue;
            }
            CaptionToken::Word(word) => word,
        };

        let prospective = if current.is_empty() {
            word.metrics.width
        } else {
            current_width + space_width + word.metrics.width
        };

        if !current.is_empty() && prospective > max_line_width {
            lines.push(Line {
                words: std::mem::take(&mut current),
                width: current_width,
            });
            current_width = word.metrics.width;
        } else {
            current_width = prospective;
        }
        current.push(word.clone());
    }

    if !current.is_empty() {
        lines.push(Line {
            words: current,
            width: current_width,
        });
    }
    lines
}

/// Split score used by the balancing pass: width imbalance plus a 5x
/// penalty on overflow past `max_line_width`.
pub fn split_score(width1: u32, width2: u32, max_line_width: u32) -> u64 {
    let imbalance = u64::from(width1.abs_diff(width2));
    let overflow = u64::from(width1.saturating_sub(max_line_width))
        + u64::from(width2.saturating_sub(max_line_width));
    imbalance + overflow * 5
}

/// Re-flow a too-tall block into exactly two lines.
///
/// All words are flattened back into a single sequence and every split
/// point is scored; the lowest-scoring split wins. Strict wrap-width
/// adherence is traded away for visual balance.
pub fn balance_two_lines(lines: Vec<Line>, space_width: u32, max_line_width: u32) -> Vec<Line> {
    if lines.len() <= 2 {
        return lines;
    }

    let words: Vec<CaptionWord> = lines.into_iter().flat_map(|l| l.words).collect();
    if words.len() < 2 {
        let width = line_width(&words, space_width);
        return vec![Line { words, width }];
    }

    let mut best_split = 1usize;
    let mut best_score = u64::MAX;
    for split in 1..words.len() {
        let width1 = line_width(&words[..split], space_width);
        let width2 = line_width(&words[split..], space_width);
        let score = split_score(width1, width2, max_line_width);
        if score < best_score {
            best_score = score;
            best_split = split;
        }
    }

    let (first, second) = words.split_at(best_split);
    vec![
        Line {
            words: first.to_vec(),
            width: line_width(first, space_width),
        },
        Line {
            words: second.to_vec(),
            width: line_width(second, space_width),
        },
    ]
}

/// Wrap, balance, and measure a caption token stream. Returns `None` when
/// nothing would be rendered.
pub fn layout_caption(
    tokens: &[CaptionToken],
    space_width: u32,
    max_line_width: u32,
    line_spacing: u32,
) -> Option<CaptionLayout> {
    let lines = wrap_greedy(tokens, space_width, max_line_width);
    let lines = balance_two_lines(lines, space_width, max_line_width);
    if lines.is_empty() {
        return None;
    }

    let mut line_ascents = Vec::with_capacity(lines.len());
    let mut line_descents = Vec::with_capacity(lines.len());
    for line in &lines {
        line_ascents.push(
            line.words
                .iter()
                .map(|w| w.metrics.ascent)
                .max()
                .unwrap_or(0),
        );
        line_descents.push(
            line.words
                .iter()
                .map(|w| w.metrics.descent)
                .max()
                .unwrap_or(0),
        );
    }

    let block_width = lines.iter().map(|l| l.width).max().unwrap_or(0);
    let heights: u32 = line_ascents
        .iter()
        .zip(&line_descents)
        .map(|(a, d)| a + d)
        .sum();
    let block_height = heights + (lines.len().saturating_sub(1) as u32) * line_spacing;

    Some(CaptionLayout {
        lines,
        line_ascents,
        line_descents,
        block_width,
        block_height,
    })
}

/// Compute the caption bar rectangle for a laid-out block.
///
/// The bar is horizontally centred; the bottom margin tightens for a
/// single line and widens for two or more, then the bar is clamped into
/// the frame.
pub fn caption_box(
    layout: &CaptionLayout,
    design: &SubtitleDesign,
    frame_width: u32,
    frame_height: u32,
) -> BoxGeometry {
    let width = layout.block_width + 2 * design.margin_x;
    let height = layout.block_height + 2 * design.margin_y;

    let left = ((frame_width as i64 - width as i64) / 2).max(0) as i32;

    let bottom_margin = match layout.lines.len() {
        1 => (design.bottom_margin as f64 * 0.85).floor() as i64,
        _ => design.bottom_margin as i64 + 8,
    };
    let bottom = frame_height as i64 - bottom_margin.max(0);
    let mut top = bottom - height as i64;
    if top < 0 {
        top = 0;
    }

    BoxGeometry {
        left,
        top: top as i32,
        width,
        height,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(text: &str, width: u32) -> CaptionWord {
        CaptionWord {
            text: text.to_string(),
            highlighted: false,
            metrics: WordMetrics {
                width,
                ascent: 40,
                descent: 12,
            },
        }
    }

    fn tokens(widths: &[u32]) -> Vec<CaptionToken> {
        widths
            .iter()
            .enumerate()
            .map(|(i, &w)| CaptionToken::Word(word(&format!("w{i}"), w)))
            .collect()
    }

    #[test]
    fn greedy_wrap_fills_lines() {
        let toks = tokens(&[100, 100, 100]);
        let lines = wrap_greedy(&toks, 10, 220);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].words.len(), 2);
        assert_eq!(lines[0].width, 210);
        assert_eq!(lines[1].width, 100);
    }

    #[test]
    fn oversized_word_gets_its_own_line() {
        let toks = tokens(&[500, 100]);
        let lines = wrap_greedy(&toks, 10, 220);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].width, 500);
    }

    #[test]
    fn forced_break_starts_new_line() {
        let mut toks = tokens(&[50, 50]);
        toks.insert(1, CaptionToken::Break);
        let lines = wrap_greedy(&toks, 10, 1000);
        assert_eq!(lines.len(), 2);
    }

    #[test]
    fn balance_returns_exactly_two_lines() {
        // Narrow limit forces four greedy lines, balance collapses to two.
        let toks = tokens(&[100, 100, 100, 100]);
        let lines = wrap_greedy(&toks, 10, 110);
        assert!(lines.len() > 2);
        let balanced = balance_two_lines(lines, 10, 110);
        assert_eq!(balanced.len(), 2);
    }

    #[test]
    fn balance_picks_minimum_score_split_exhaustively() {
        let widths = [120u32, 40, 80, 60, 90];
        let toks = tokens(&widths);
        let space = 10u32;
        let max = 100u32;

        let lines = wrap_greedy(&toks, space, max);
        assert!(lines.len() > 2);
        let balanced = balance_two_lines(lines, space, max);
        let got = split_score(balanced[0].width, balanced[1].width, max);

        let words: Vec<CaptionWord> = widths
            .iter()
            .enumerate()
            .map(|(i, &w)| word(&format!("w{i}"), w))
            .collect();
        let best = (1..words.len())
            .map(|s| {
                split_score(
                    line_width(&words[..s], space),
                    line_width(&words[s..], space),
                    max,
                )
            })
            .min()
            .unwrap();
        assert_eq!(got, best);
    }

    #[test]
    fn two_greedy_lines_are_left_alone() {
        let toks = tokens(&[100, 100]);
        let lines = wrap_greedy(&toks, 10, 110);
        assert_eq!(lines.len(), 2);
        let balanced = balance_two_lines(lines.clone(), 10, 110);
        assert_eq!(balanced, lines);
    }

    #[test]
    fn layout_measures_block_dimensions() {
        let toks = tokens(&[100, 80]);
        let layout = layout_caption(&toks, 10, 500, 10).unwrap();
        assert_eq!(layout.lines.len(), 1);
        assert_eq!(layout.block_width, 190);
        assert_eq!(layout.block_height, 52);

        let layout = layout_caption(&toks, 10, 100, 10).unwrap();
        assert_eq!(layout.lines.len(), 2);
        assert_eq!(layout.block_width, 100);
        assert_eq!(layout.block_height, 52 * 2 + 10);
    }

    #[test]
    fn empty_tokens_produce_no_layout() {
        assert!(layout_caption(&[], 10, 100, 10).is_none());
    }

    #[test]
    fn caption_box_is_centred_and_clamped() {
        let design = SubtitleDesign::default();
        let toks = tokens(&[100, 80]);
        let layout = layout_caption(&toks, 10, 500, 10).unwrap();
        let geo = caption_box(&layout, &design, 720, 900);

        assert_eq!(geo.width, layout.block_width + 2 * design.margin_x);
        let centre = geo.left as i64 * 2 + geo.width as i64;
        assert!((centre - 720).abs() <= 1);
        // One line: tightened bottom margin.
        let expected_bottom = 900 - (design.bottom_margin as f64 * 0.85).floor() as i64;
        assert_eq!(geo.top as i64 + geo.height as i64, expected_bottom);
    }

    #[test]
    fn caption_box_two_lines_widens_bottom_margin() {
        let design = SubtitleDesign::default();
        let toks = tokens(&[100, 80]);
        let layout = layout_caption(&toks, 10, 100, 10).unwrap();
        assert_eq!(layout.lines.len(), 2);
        let geo = caption_box(&layout, &design, 720, 900);
        let expected_bottom = 900 - (design.bottom_margin as i64 + 8);
        assert_eq!(geo.top as i64 + geo.height as i64, expected_bottom);
    }
}
