//! Character ramps used to turn luminance into glyphs.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Rendering style; each selects one character ramp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Style {
    #[default]
    Normal,
    Inverted,
    Dots,
    Gradient,
    Blocks,
    Thick,
    Thin,
}

impl Style {
    pub const ALL: [Style; 7] = [
        Style::Normal,
        Style::Inverted,
        Style::Dots,
        Style::Gradient,
        Style::Blocks,
        Style::Thick,
        Style::Thin,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Style::Normal => "normal",
            Style::Inverted => "inverted",
            Style::Dots => "dots",
            Style::Gradient => "gradient",
            Style::Blocks => "blocks",
            Style::Thick => "thick",
            Style::Thin => "thin",
        }
    }

    /// Case-insensitive lookup by name.
    pub fn from_name(name: &str) -> Option<Style> {
        let name = name.trim();
        Style::ALL
            .into_iter()
            .find(|style| style.name().eq_ignore_ascii_case(name))
    }

    /// Glyphs ordered from darkest to lightest sample.
    fn glyphs(self) -> &'static str {
        match self {
            Style::Normal => " .:-=+*#%@",
            Style::Inverted => "@%#*+=-:. ",
            Style::Dots => " ∙·∘○◎●",
            Style::Gradient => " ░▒▓█",
            Style::Blocks => " ▁▂▃▄▅▆▇█",
            Style::Thick => " ███░",
            Style::Thin => " ·┉┊─",
        }
    }

    pub fn ramp(self) -> CharacterRamp {
        CharacterRamp {
            glyphs: self.glyphs().chars().collect(),
        }
    }
}

impl fmt::Display for Style {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Ordered, non-empty glyph sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacterRamp {
    glyphs: Vec<char>,
}

impl CharacterRamp {
    /// Builds a ramp from a custom glyph string. Returns `None` for an empty string.
    pub fn from_glyphs(glyphs: &str) -> Option<Self> {
        let glyphs: Vec<char> = glyphs.chars().collect();
        if glyphs.is_empty() {
            None
        } else {
            Some(Self { glyphs })
        }
    }

    pub fn len(&self) -> usize {
        self.glyphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.glyphs.is_empty()
    }

    pub fn glyphs(&self) -> &[char] {
        &self.glyphs
    }

    /// Ramp index for a normalised sample in `[0, 1]`: `floor(sample * (len - 1))`, clamped.
    #[inline]
    pub fn index_for(&self, sample: f32) -> usize {
        let last = self.glyphs.len() - 1;
        let idx = (sample.clamp(0.0, 1.0) * last as f32).floor() as usize;
        idx.min(last)
    }

    #[inline]
    pub fn glyph_for(&self, sample: f32) -> char {
        self.glyphs[self.index_for(sample)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_style_has_a_non_empty_ramp() {
        for style in Style::ALL {
            assert!(!style.ramp().is_empty(), "{style} ramp is empty");
        }
    }

    #[test]
    fn index_is_monotonic_in_luminance() {
        for style in Style::ALL {
            let ramp = style.ramp();
            let mut prev = 0usize;
            for luma in 0..=255u16 {
                let idx = ramp.index_for(f32::from(luma) / 255.0);
                assert!(idx >= prev, "{style}: index fell at luminance {luma}");
                assert!(idx < ramp.len());
                prev = idx;
            }
            assert_eq!(prev, ramp.len() - 1);
        }
    }

    #[test]
    fn extremes_map_to_ends_of_ramp() {
        let ramp = Style::Normal.ramp();
        assert_eq!(ramp.glyph_for(0.0), ' ');
        assert_eq!(ramp.glyph_for(1.0), '@');
        assert_eq!(Style::Inverted.ramp().glyph_for(0.0), '@');
    }

    #[test]
    fn names_round_trip_case_insensitively() {
        assert_eq!(Style::from_name("BLOCKS"), Some(Style::Blocks));
        assert_eq!(Style::from_name(" thin "), Some(Style::Thin));
        assert_eq!(Style::from_name("neon"), None);
    }

    #[test]
    fn single_glyph_ramp_always_maps_to_it() {
        let ramp = CharacterRamp::from_glyphs("#").unwrap();
        assert_eq!(ramp.glyph_for(0.0), '#');
        assert_eq!(ramp.glyph_for(1.0), '#');
        assert!(CharacterRamp::from_glyphs("").is_none());
    }
}
