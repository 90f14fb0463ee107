//! Resamples corrected luma frames onto the character grid and maps cells to glyphs.

use crate::config::ConversionConfig;
use crate::ramp::CharacterRamp;
use image::imageops::{self, FilterType};
use image::GrayImage;

/// One frame of glyph rows, all of the configured width.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextFrame {
    rows: Vec<String>,
}

impl TextFrame {
    pub fn from_rows(rows: Vec<String>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[String] {
        &self.rows
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    /// Rows joined by `\n`, without a trailing separator.
    pub fn to_text(&self) -> String {
        self.rows.join("\n")
    }
}

/// Maps corrected luminance grids onto a character ramp.
#[derive(Debug, Clone)]
pub struct GlyphMapper {
    ramp: CharacterRamp,
    columns: u32,
    rows: u32,
}

impl GlyphMapper {
    pub fn new(config: &ConversionConfig) -> Self {
        Self::with_ramp(config.style().ramp(), config.width(), config.height())
    }

    pub fn with_ramp(ramp: CharacterRamp, columns: u32, rows: u32) -> Self {
        Self {
            ramp,
            columns: columns.max(1),
            rows: rows.max(1),
        }
    }

    pub fn ramp(&self) -> &CharacterRamp {
        &self.ramp
    }

    pub fn grid_size(&self) -> (u32, u32) {
        (self.columns, self.rows)
    }

    pub fn map(&self, luma: &GrayImage) -> TextFrame {
        let resized = self.resample(luma);
        let mut rows = Vec::with_capacity(self.rows as usize);
        for y in 0..self.rows {
            let mut line = String::with_capacity(self.columns as usize);
            for x in 0..self.columns {
                let sample = f32::from(resized.get_pixel(x, y)[0]) / 255.0;
                line.push(self.ramp.glyph_for(sample));
            }
            rows.push(line);
        }
        TextFrame { rows }
    }

    fn resample(&self, luma: &GrayImage) -> GrayImage {
        let (w, h) = luma.dimensions();
        if w == 0 || h == 0 {
            return GrayImage::new(self.columns, self.rows);
        }
        if (w, h) == (self.columns, self.rows) {
            return luma.clone();
        }
        imageops::resize(luma, self.columns, self.rows, FilterType::Triangle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConversionOptions;
    use crate::ramp::Style;
    use image::Luma;

    fn config(width: u32) -> ConversionConfig {
        ConversionOptions::default().with_width(width).build().unwrap()
    }

    #[test]
    fn grid_matches_configured_shape() {
        for width in [10, 40, 240] {
            let cfg = config(width);
            let mapper = GlyphMapper::new(&cfg);
            let luma = GrayImage::from_fn(320, 240, |x, _| Luma([(x % 256) as u8]));
            let frame = mapper.map(&luma);
            assert_eq!(frame.height(), cfg.height() as usize);
            assert!(frame
                .rows()
                .iter()
                .all(|row| row.chars().count() == width as usize));
        }
    }

    #[test]
    fn text_has_no_trailing_separator() {
        let mapper = GlyphMapper::new(&config(10));
        let text = mapper.map(&GrayImage::new(100, 50)).to_text();
        assert!(!text.ends_with('\n'));
        assert_eq!(text.lines().count(), 5);
        assert_eq!(text.matches('\n').count(), 4);
    }

    #[test]
    fn flat_frames_map_to_ramp_ends() {
        let mapper = GlyphMapper::new(&config(20));
        let black = mapper.map(&GrayImage::new(64, 64));
        assert!(black.rows().iter().all(|r| r.chars().all(|c| c == ' ')));
        let white = mapper.map(&GrayImage::from_pixel(64, 64, Luma([255])));
        assert!(white.rows().iter().all(|r| r.chars().all(|c| c == '@')));
    }

    #[test]
    fn mapping_is_deterministic() {
        let mapper = GlyphMapper::new(&config(57));
        let luma = GrayImage::from_fn(333, 211, |x, y| Luma([((x * 7 + y * 13) % 256) as u8]));
        assert_eq!(mapper.map(&luma).to_text(), mapper.map(&luma).to_text());
    }

    #[test]
    fn horizontal_gradient_is_non_decreasing_along_rows() {
        let mapper = GlyphMapper::with_ramp(Style::Normal.ramp(), 16, 4);
        let luma = GrayImage::from_fn(256, 64, |x, _| Luma([x as u8]));
        let frame = mapper.map(&luma);
        let ramp = mapper.ramp().glyphs();
        for row in frame.rows() {
            let idx: Vec<usize> = row
                .chars()
                .map(|c| ramp.iter().position(|&g| g == c).unwrap())
                .collect();
            assert!(idx.windows(2).all(|w| w[0] <= w[1]), "row {row:?}");
        }
    }

    #[test]
    fn empty_input_maps_to_darkest_glyph() {
        let mapper = GlyphMapper::with_ramp(Style::Inverted.ramp(), 4, 2);
        let frame = mapper.map(&GrayImage::new(0, 0));
        assert_eq!(frame.to_text(), "@@@@\n@@@@");
    }
}
