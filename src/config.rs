//! Conversion options and the validated configuration the pipeline consumes.

use crate::error::ConfigError;
use crate::ramp::Style;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Character height per unit of character width.
pub const CHAR_ASPECT_RATIO: f32 = 0.5;

pub const MIN_WIDTH: u32 = 10;
pub const MAX_WIDTH: u32 = 240;
pub const MIN_FACTOR: f32 = 0.5;
pub const MAX_FACTOR: f32 = 2.0;
pub const MIN_FPS: u32 = 1;
pub const MAX_FPS: u32 = 60;
pub const MAX_CRF: u8 = 51;

pub const DEFAULT_VIDEO_NAME: &str = "ascii_video";

/// Zero-padded artifact name, e.g. `frame_000042.png`.
pub fn frame_file_name(index: u64, ext: &str) -> String {
    format!("frame_{:06}.{}", index, ext)
}

pub fn video_file_name(basename: &str) -> String {
    format!("{}.mp4", basename)
}

/// 8-bit RGB colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    pub const BLACK: Rgb = Rgb(0, 0, 0);
    pub const GREEN: Rgb = Rgb(0, 255, 0);

    /// Parses `#RRGGBB` (the leading `#` is optional).
    pub fn from_hex(hex: &str) -> Option<Rgb> {
        let digits = hex.trim().strip_prefix('#').unwrap_or(hex.trim());
        if digits.len() != 6 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(&digits[i..i + 2], 16).ok();
        Some(Rgb(channel(0)?, channel(2)?, channel(4)?))
    }

    pub fn to_hex(self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.0, self.1, self.2)
    }

    pub fn to_pixel(self) -> image::Rgb<u8> {
        image::Rgb([self.0, self.1, self.2])
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Named foreground/background pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Palette {
    Green,
    Amber,
    Blue,
    Purple,
    White,
    Monochrome,
}

impl Palette {
    pub const ALL: [Palette; 6] = [
        Palette::Green,
        Palette::Amber,
        Palette::Blue,
        Palette::Purple,
        Palette::White,
        Palette::Monochrome,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Palette::Green => "green",
            Palette::Amber => "amber",
            Palette::Blue => "blue",
            Palette::Purple => "purple",
            Palette::White => "white",
            Palette::Monochrome => "monochrome",
        }
    }

    pub fn from_name(name: &str) -> Option<Palette> {
        let name = name.trim();
        Palette::ALL
            .into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(name))
    }

    /// `(foreground, background)`
    pub fn colors(self) -> (Rgb, Rgb) {
        let fg = match self {
            Palette::Green => Rgb(0x00, 0xFF, 0x00),
            Palette::Amber => Rgb(0xFF, 0xAA, 0x00),
            Palette::Blue => Rgb(0x00, 0xAA, 0xFF),
            Palette::Purple => Rgb(0xFF, 0x00, 0xFF),
            Palette::White => Rgb(0xFF, 0xFF, 0xFF),
            Palette::Monochrome => Rgb(0xCC, 0xCC, 0xCC),
        };
        (fg, Rgb::BLACK)
    }
}

/// Output resolution class of rendered frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Resolution {
    Low,
    Medium,
    #[default]
    High,
    Uhd4k,
}

impl Resolution {
    pub const ALL: [Resolution; 4] = [
        Resolution::Low,
        Resolution::Medium,
        Resolution::High,
        Resolution::Uhd4k,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Resolution::Low => "low",
            Resolution::Medium => "medium",
            Resolution::High => "high",
            Resolution::Uhd4k => "4k",
        }
    }

    pub fn from_name(name: &str) -> Option<Resolution> {
        let name = name.trim();
        Resolution::ALL
            .into_iter()
            .find(|r| r.name().eq_ignore_ascii_case(name))
    }

    /// Canvas size in pixels `(width, height)`.
    pub fn dimensions(self) -> (u32, u32) {
        match self {
            Resolution::Low => (640, 480),
            Resolution::Medium => (1280, 720),
            Resolution::High => (1920, 1080),
            Resolution::Uhd4k => (3840, 2160),
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn default_width() -> u32 {
    120
}
fn default_style() -> String {
    Style::Normal.name().to_string()
}
fn default_factor() -> f32 {
    1.0
}
fn default_bg() -> String {
    Rgb::BLACK.to_hex()
}
fn default_fg() -> String {
    Rgb::GREEN.to_hex()
}
fn default_fps() -> u32 {
    30
}
fn default_crf() -> u8 {
    23
}
fn default_resolution() -> String {
    Resolution::High.name().to_string()
}
fn default_true() -> bool {
    true
}
fn default_video_name() -> String {
    DEFAULT_VIDEO_NAME.to_string()
}

/// Unvalidated conversion request, as read from the CLI or a settings file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionOptions {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_style")]
    pub style: String,
    #[serde(default = "default_factor")]
    pub brightness: f32,
    #[serde(default = "default_factor")]
    pub contrast: f32,
    #[serde(default = "default_factor")]
    pub gamma: f32,
    #[serde(default = "default_bg")]
    pub bg_color: String,
    #[serde(default = "default_fg")]
    pub text_color: String,
    /// Named palette; overrides both colours when set.
    #[serde(default)]
    pub palette: Option<String>,
    #[serde(default = "default_fps")]
    pub fps: u32,
    #[serde(default = "default_crf")]
    pub crf: u8,
    #[serde(default = "default_resolution")]
    pub resolution: String,
    #[serde(default)]
    pub save_txt: bool,
    #[serde(default = "default_true")]
    pub save_png: bool,
    #[serde(default = "default_true")]
    pub save_mp4: bool,
    #[serde(default = "default_video_name")]
    pub video_name: String,
}

impl Default for ConversionOptions {
    fn default() -> Self {
        Self {
            width: default_width(),
            style: default_style(),
            brightness: 1.0,
            contrast: 1.0,
            gamma: 1.0,
            bg_color: default_bg(),
            text_color: default_fg(),
            palette: None,
            fps: default_fps(),
            crf: default_crf(),
            resolution: default_resolution(),
            save_txt: false,
            save_png: true,
            save_mp4: true,
            video_name: default_video_name(),
        }
    }
}

impl ConversionOptions {
    pub fn with_width(mut self, width: u32) -> Self {
        self.width = width;
        self
    }

    pub fn with_style(mut self, style: impl Into<String>) -> Self {
        self.style = style.into();
        self
    }

    pub fn with_corrections(mut self, brightness: f32, contrast: f32, gamma: f32) -> Self {
        self.brightness = brightness;
        self.contrast = contrast;
        self.gamma = gamma;
        self
    }

    pub fn with_colors(mut self, bg: impl Into<String>, fg: impl Into<String>) -> Self {
        self.bg_color = bg.into();
        self.text_color = fg.into();
        self
    }

    pub fn with_palette(mut self, palette: impl Into<String>) -> Self {
        self.palette = Some(palette.into());
        self
    }

    pub fn with_resolution(mut self, resolution: impl Into<String>) -> Self {
        self.resolution = resolution.into();
        self
    }

    pub fn with_encoding(mut self, fps: u32, crf: u8) -> Self {
        self.fps = fps;
        self.crf = crf;
        self
    }

    /// Selects which artifact kinds are persisted: text, image, video.
    pub fn with_outputs(mut self, txt: bool, png: bool, mp4: bool) -> Self {
        self.save_txt = txt;
        self.save_png = png;
        self.save_mp4 = mp4;
        self
    }

    pub fn with_video_name(mut self, name: impl Into<String>) -> Self {
        self.video_name = name.into();
        self
    }

    /// Validates numeric ranges and normalises identifiers.
    ///
    /// Out-of-range numbers are rejected. Unknown styles, resolutions, palettes and
    /// malformed colours fall back to their defaults with one warning each.
    pub fn build(&self) -> Result<ConversionConfig, ConfigError> {
        check_range("width", self.width as f64, MIN_WIDTH as f64, MAX_WIDTH as f64)?;
        for (name, value) in [
            ("brightness", self.brightness),
            ("contrast", self.contrast),
            ("gamma", self.gamma),
        ] {
            check_range(name, value as f64, MIN_FACTOR as f64, MAX_FACTOR as f64)?;
        }
        check_range("fps", self.fps as f64, MIN_FPS as f64, MAX_FPS as f64)?;
        check_range("crf", self.crf as f64, 0.0, MAX_CRF as f64)?;

        let video_name = self.video_name.trim();
        if video_name.is_empty()
            || video_name.contains(['/', '\\'])
            || video_name == "."
            || video_name == ".."
        {
            return Err(ConfigError::InvalidVideoName(self.video_name.clone()));
        }

        let style = Style::from_name(&self.style).unwrap_or_else(|| {
            log::warn!("Unknown style '{}', using '{}'", self.style, Style::Normal);
            Style::Normal
        });
        let resolution = Resolution::from_name(&self.resolution).unwrap_or_else(|| {
            log::warn!(
                "Unknown resolution '{}', using '{}'",
                self.resolution,
                Resolution::High
            );
            Resolution::High
        });

        let mut background = parse_color("background", &self.bg_color, Rgb::BLACK);
        let mut foreground = parse_color("text", &self.text_color, Rgb::GREEN);
        if let Some(name) = self.palette.as_deref() {
            match Palette::from_name(name) {
                Some(palette) => (foreground, background) = palette.colors(),
                None => log::warn!("Unknown palette '{}', keeping explicit colours", name),
            }
        }

        Ok(ConversionConfig {
            width: self.width,
            style,
            brightness: self.brightness,
            contrast: self.contrast,
            gamma: self.gamma,
            background,
            foreground,
            resolution,
            fps: self.fps,
            crf: self.crf,
            save_txt: self.save_txt,
            save_png: self.save_png,
            save_mp4: self.save_mp4,
            video_name: video_name.to_string(),
        })
    }
}

fn check_range(name: &'static str, value: f64, min: f64, max: f64) -> Result<(), ConfigError> {
    if value.is_nan() || value < min || value > max {
        return Err(ConfigError::OutOfRange {
            name,
            min,
            max,
            value,
        });
    }
    Ok(())
}

fn parse_color(which: &str, hex: &str, fallback: Rgb) -> Rgb {
    Rgb::from_hex(hex).unwrap_or_else(|| {
        log::warn!(
            "Invalid {} colour '{}', using {}",
            which,
            hex,
            fallback.to_hex()
        );
        fallback
    })
}

/// Validated, immutable configuration of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionConfig {
    width: u32,
    style: Style,
    brightness: f32,
    contrast: f32,
    gamma: f32,
    background: Rgb,
    foreground: Rgb,
    resolution: Resolution,
    fps: u32,
    crf: u8,
    save_txt: bool,
    save_png: bool,
    save_mp4: bool,
    video_name: String,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        let defaults = ConversionOptions::default();
        // Defaults are within every range.
        ConversionConfig {
            width: defaults.width,
            style: Style::Normal,
            brightness: 1.0,
            contrast: 1.0,
            gamma: 1.0,
            background: Rgb::BLACK,
            foreground: Rgb::GREEN,
            resolution: Resolution::High,
            fps: defaults.fps,
            crf: defaults.crf,
            save_txt: defaults.save_txt,
            save_png: defaults.save_png,
            save_mp4: defaults.save_mp4,
            video_name: defaults.video_name,
        }
    }
}

impl ConversionConfig {
    /// Grid width in characters.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Grid height in characters, always derived from the width.
    pub fn height(&self) -> u32 {
        ((self.width as f32 * CHAR_ASPECT_RATIO) as u32).max(1)
    }

    pub fn style(&self) -> Style {
        self.style
    }
    pub fn brightness(&self) -> f32 {
        self.brightness
    }
    pub fn contrast(&self) -> f32 {
        self.contrast
    }
    pub fn gamma(&self) -> f32 {
        self.gamma
    }
    pub fn background(&self) -> Rgb {
        self.background
    }
    pub fn foreground(&self) -> Rgb {
        self.foreground
    }
    pub fn resolution(&self) -> Resolution {
        self.resolution
    }
    pub fn fps(&self) -> u32 {
        self.fps
    }
    pub fn crf(&self) -> u8 {
        self.crf
    }
    pub fn save_txt(&self) -> bool {
        self.save_txt
    }
    pub fn save_png(&self) -> bool {
        self.save_png
    }
    pub fn save_mp4(&self) -> bool {
        self.save_mp4
    }
    pub fn video_name(&self) -> &str {
        &self.video_name
    }
}
