use std::collections::HashMap;

use tracing::warn;

use crate::project::SubtitleDesign;

/// Pixel metrics of one laid-out word.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WordMetrics {
    /// Advance width of the whole word.
    pub width: u32,
    /// Pixels above the baseline.
    pub ascent: u32,
    /// Pixels below the baseline.
    pub descent: u32,
}

impl WordMetrics {
    /// Total line-box height of the word.
    pub fn height(self) -> u32 {
        self.ascent + self.descent
    }
}

/// One rasterised glyph: a coverage bitmap positioned relative to the pen.
#[derive(Clone, Debug)]
pub struct RasterGlyph {
    /// 8-bit coverage, `width * height` bytes.
    pub coverage: Vec<u8>,
    /// Bitmap width in pixels.
    pub width: usize,
    /// Bitmap height in pixels.
    pub height: usize,
    /// Horizontal bitmap offset from the pen position.
    pub xmin: i32,
    /// Vertical offset of the bitmap bottom from the baseline (y-up).
    pub ymin: i32,
    /// Pen advance after this glyph.
    pub advance: f32,
}

/// Text measuring/rendering capability with two variants, selected once at
/// configuration time: a rasterising font engine, and a basic fixed-stroke
/// renderer used when no usable font file is available.
pub enum GlyphBackend {
    /// TTF/OTF rasterisation via fontdue.
    Font(FontGlyphs),
    /// Fixed-metric placeholder boxes.
    Stroke(StrokeGlyphs),
}

impl GlyphBackend {
    /// Select the backend for `design`, falling back to the stroke renderer
    /// (with a warning) when the configured font cannot be loaded.
    pub fn from_design(design: &SubtitleDesign) -> Self {
        let size = design.font_size_px.max(1) as f32;
        if let Some(path) = design.font_path.as_deref() {
            match std::fs::read(path) {
                Ok(bytes) => match FontGlyphs::from_bytes(&bytes, size) {
                    Ok(font) => return Self::Font(font),
                    Err(err) => {
                        warn!(font = %path.display(), %err, "font unusable, using stroke renderer");
                    }
                },
                Err(err) => {
                    warn!(font = %path.display(), %err, "font not readable, using stroke renderer");
                }
            }
        }
        Self::Stroke(StrokeGlyphs::new(size))
    }

    /// Measure one word; results are memoised per word string.
    pub fn measure_word(&mut self, word: &str) -> WordMetrics {
        match self {
            Self::Font(f) => f.measure_word(word),
            Self::Stroke(s) => s.measure_word(word),
        }
    }

    /// Advance width of a single space.
    pub fn space_width(&mut self) -> u32 {
        match self {
            Self::Font(f) => f.space_width(),
            Self::Stroke(s) => s.space_width(),
        }
    }

    /// Rasterise one character, cached per char.
    pub fn glyph(&mut self, ch: char) -> &RasterGlyph {
        match self {
            Self::Font(f) => f.glyph(ch),
            Self::Stroke(s) => s.glyph(ch),
        }
    }
}

/// fontdue-backed glyph source for one (font, size) pair.
pub struct FontGlyphs {
    font: fontdue::Font,
    size: f32,
    ascent: u32,
    descent: u32,
    word_cache: HashMap<String, WordMetrics>,
    glyph_cache: HashMap<char, RasterGlyph>,
}

impl FontGlyphs {
    /// Load a font from raw TTF/OTF bytes at a fixed pixel size.
    pub fn from_bytes(bytes: &[u8], size: f32) -> Result<Self, &'static str> {
        let font = fontdue::Font::from_bytes(bytes, fontdue::FontSettings::default())?;
        let (ascent, descent) = match font.horizontal_line_metrics(size) {
            Some(m) => (
                m.ascent.ceil().max(0.0) as u32,
                (-m.descent).ceil().max(0.0) as u32,
            ),
            None => ((size * 0.8).ceil() as u32, (size * 0.2).ceil() as u32),
        };
        Ok(Self {
            font,
            size,
            ascent,
            descent,
            word_cache: HashMap::new(),
            glyph_cache: HashMap::new(),
        })
    }

    fn measure_word(&mut self, word: &str) -> WordMetrics {
        if let Some(m) = self.word_cache.get(word) {
            return *m;
        }

        let text = if word.is_empty() { " " } else { word };
        let mut advance = 0.0f32;
        let mut prev: Option<char> = None;
        for ch in text.chars() {
            if let Some(p) = prev
                && let Some(kern) = self.font.horizontal_kern(p, ch, self.size)
            {
                advance += kern;
            }
            advance += self.font.metrics(ch, self.size).advance_width;
            prev = Some(ch);
        }

        let metrics = WordMetrics {
            width: advance.ceil().max(1.0) as u32,
            ascent: self.ascent,
            descent: self.descent,
        };
        self.word_cache.insert(word.to_string(), metrics);
        metrics
    }

    fn space_width(&mut self) -> u32 {
        let w = self.font.metrics(' ', self.size).advance_width.ceil() as u32;
        if w == 0 { 6 } else { w }
    }

    fn glyph(&mut self, ch: char) -> &RasterGlyph {
        self.glyph_cache.entry(ch).or_insert_with(|| {
            let (m, coverage) = self.font.rasterize(ch, self.size);
            RasterGlyph {
                coverage,
                width: m.width,
                height: m.height,
                xmin: m.xmin,
                ymin: m.ymin,
                advance: m.advance_width,
            }
        })
    }
}

/// Fixed-metric fallback that renders each character as an outlined box.
pub struct StrokeGlyphs {
    advance: u32,
    ascent: u32,
    descent: u32,
    glyph_cache: HashMap<char, RasterGlyph>,
}

impl StrokeGlyphs {
    /// Build the fallback renderer for one pixel size.
    pub fn new(size: f32) -> Self {
        Self {
            advance: (size * 0.6).round().max(2.0) as u32,
            ascent: (size * 0.78).round().max(2.0) as u32,
            descent: (size * 0.22).round().max(1.0) as u32,
            glyph_cache: HashMap::new(),
        }
    }

    fn measure_word(&mut self, word: &str) -> WordMetrics {
        let chars = word.chars().count().max(1) as u32;
        WordMetrics {
            width: chars * self.advance,
            ascent: self.ascent,
            descent: self.descent,
        }
    }

    fn space_width(&mut self) -> u32 {
        (self.advance * 3) / 5
    }

    fn glyph(&mut self, ch: char) -> &RasterGlyph {
        let advance = self.advance;
        let ascent = self.ascent;
        self.glyph_cache.entry(ch).or_insert_with(|| {
            if ch.is_whitespace() {
                return RasterGlyph {
                    coverage: Vec::new(),
                    width: 0,
                    height: 0,
                    xmin: 0,
                    ymin: 0,
                    advance: advance as f32,
                };
            }

            // Outline box standing on the baseline, with a 1px side bearing.
            let w = advance.saturating_sub(2).max(2) as usize;
            let h = ascent as usize;
            let stroke = ((ascent / 12).max(1)) as usize;
            let mut coverage = vec![0u8; w * h];
            for y in 0..h {
                for x in 0..w {
                    let edge =
                        x < stroke || x >= w - stroke || y < stroke || y >= h - stroke;
                    if edge {
                        coverage[y * w + x] = 255;
                    }
                }
            }
            RasterGlyph {
                coverage,
                width: w,
                height: h,
                xmin: 1,
                ymin: 0,
                advance: advance as f32,
            }
        })
    }
}
