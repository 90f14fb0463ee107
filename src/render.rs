//! Rasterizes text frames onto fixed-size canvases.

use crate::bitmap_font;
use crate::config::{ConversionConfig, Rgb};
use crate::error::ConvertError;
use crate::glyph::TextFrame;
use ab_glyph::{point, Font, FontVec, PxScale};
use image::imageops::{self, FilterType};
use image::{ImageFormat, RgbImage};
use rayon::prelude::*;
use std::collections::HashMap;
use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Largest font size tried when fitting the grid.
pub const MAX_FONT_SIZE: u32 = 40;
/// Smallest font size; also the best-effort size when nothing fits.
pub const MIN_FONT_SIZE: u32 = 5;
/// Share of each canvas axis the glyph block may occupy.
pub const FILL_RATIO: f64 = 0.9;

/// Monospace fonts looked up in the system font directories, in order.
const FONT_CANDIDATES: [&str; 3] = ["DejaVuSansMono.ttf", "Courier New.ttf", "consola.ttf"];

/// Glyph used to measure cell size.
const REFERENCE_GLYPH: char = 'X';

/// Source of glyph shapes.
pub enum GlyphFace {
    TrueType { font: FontVec, path: PathBuf },
    /// Built-in 8x8 bitmap glyphs.
    Bitmap,
}

impl GlyphFace {
    /// Loads `font_path` if given, otherwise the first known monospace font on the system.
    /// Falls back to the built-in bitmap face when nothing usable is found.
    pub fn load(font_path: Option<&Path>) -> Self {
        let candidate = match font_path {
            Some(path) => Some(path.to_path_buf()),
            None => find_system_font(),
        };
        let Some(path) = candidate else {
            log::warn!("No monospace TrueType font found, using built-in bitmap glyphs");
            return GlyphFace::Bitmap;
        };
        match fs::read(&path)
            .map_err(|e| e.to_string())
            .and_then(|bytes| FontVec::try_from_vec(bytes).map_err(|e| e.to_string()))
        {
            Ok(font) => {
                log::debug!("Loaded font {}", path.display());
                GlyphFace::TrueType { font, path }
            }
            Err(e) => {
                log::warn!(
                    "Cannot load font {} ({}), using built-in bitmap glyphs",
                    path.display(),
                    e
                );
                GlyphFace::Bitmap
            }
        }
    }

    pub fn is_builtin(&self) -> bool {
        matches!(self, GlyphFace::Bitmap)
    }

    /// Cell size `(width, height)` in pixels, from the bounding box of the reference glyph.
    pub fn cell_size(&self, size: u32) -> (u32, u32) {
        match self {
            GlyphFace::TrueType { font, .. } => {
                let scale = PxScale::from(size as f32);
                let glyph = font
                    .glyph_id(REFERENCE_GLYPH)
                    .with_scale_and_position(scale, point(0.0, 0.0));
                match font.outline_glyph(glyph) {
                    Some(outline) => {
                        let b = outline.px_bounds();
                        (
                            (b.width().ceil() as u32).max(1),
                            (b.height().ceil() as u32).max(1),
                        )
                    }
                    None => bitmap_cell(size),
                }
            }
            GlyphFace::Bitmap => bitmap_cell(size),
        }
    }

    fn rasterize(&self, ch: char, size: u32, cell: (u32, u32)) -> GlyphMask {
        let GlyphFace::TrueType { font, .. } = self else {
            return bitmap_mask(ch, cell);
        };
        let id = font.glyph_id(ch);
        if id.0 == 0 {
            // Not covered by the font.
            return bitmap_mask(ch, cell);
        }
        let scale = PxScale::from(size as f32);
        // Align the reference glyph's bounding box with the cell's top-left corner.
        let anchor = font
            .outline_glyph(
                font.glyph_id(REFERENCE_GLYPH)
                    .with_scale_and_position(scale, point(0.0, 0.0)),
            )
            .map(|o| o.px_bounds().min)
            .unwrap_or(point(0.0, -(size as f32)));
        let glyph = id.with_scale_and_position(scale, point(-anchor.x, -anchor.y));
        let Some(outline) = font.outline_glyph(glyph) else {
            return GlyphMask::empty();
        };
        let bounds = outline.px_bounds();
        let width = bounds.width().ceil() as u32;
        let height = bounds.height().ceil() as u32;
        let mut coverage = vec![0u8; (width * height) as usize];
        outline.draw(|x, y, v| {
            if x < width && y < height {
                coverage[(y * width + x) as usize] = (v.clamp(0.0, 1.0) * 255.0).round() as u8;
            }
        });
        GlyphMask {
            left: bounds.min.x as i64,
            top: bounds.min.y as i64,
            width,
            height,
            coverage,
        }
    }
}

fn bitmap_cell(size: u32) -> (u32, u32) {
    ((size * 3 / 4).max(1), size.max(1))
}

fn bitmap_mask(ch: char, cell: (u32, u32)) -> GlyphMask {
    let pattern = bitmap_font::pattern(ch);
    if pattern == [0; 8] {
        return GlyphMask::empty();
    }
    let (width, height) = cell;
    let mut coverage = vec![0u8; (width * height) as usize];
    for y in 0..height {
        for x in 0..width {
            if bitmap_font::bit(&pattern, x * 8 / width, y * 8 / height) {
                coverage[(y * width + x) as usize] = 255;
            }
        }
    }
    GlyphMask {
        left: 0,
        top: 0,
        width,
        height,
        coverage,
    }
}

fn find_system_font() -> Option<PathBuf> {
    let mut roots: Vec<PathBuf> = Vec::new();
    if let Some(dir) = dirs::font_dir() {
        roots.push(dir);
    }
    for dir in [
        "/usr/share/fonts",
        "/usr/local/share/fonts",
        "/Library/Fonts",
        "/System/Library/Fonts",
        "C:\\Windows\\Fonts",
    ] {
        roots.push(PathBuf::from(dir));
    }

    for name in FONT_CANDIDATES {
        for root in roots.iter().filter(|r| r.is_dir()) {
            let found = WalkDir::new(root)
                .max_depth(4)
                .into_iter()
                .filter_map(|e| e.ok())
                .find(|e| {
                    e.file_type().is_file()
                        && e.file_name()
                            .to_str()
                            .is_some_and(|f| f.eq_ignore_ascii_case(name))
                });
            if let Some(entry) = found {
                return Some(entry.into_path());
            }
        }
    }
    None
}

/// Coverage bitmap of one glyph, positioned relative to its cell's top-left corner.
struct GlyphMask {
    left: i64,
    top: i64,
    width: u32,
    height: u32,
    coverage: Vec<u8>,
}

impl GlyphMask {
    fn empty() -> Self {
        Self {
            left: 0,
            top: 0,
            width: 0,
            height: 0,
            coverage: Vec::new(),
        }
    }
}

/// Placement of the glyph grid on the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub font_size: u32,
    pub cell_width: u32,
    pub cell_height: u32,
    pub columns: u32,
    pub rows: u32,
    /// Left edge of the block; negative when the block overflows.
    pub x_offset: i64,
    pub y_offset: i64,
    /// False when no size in range fit and the minimum size was used.
    pub fits: bool,
}

impl Layout {
    pub fn text_width(&self) -> u64 {
        u64::from(self.cell_width) * u64::from(self.columns)
    }

    pub fn text_height(&self) -> u64 {
        u64::from(self.cell_height) * u64::from(self.rows)
    }
}

/// Largest font size in `MAX_FONT_SIZE..=MIN_FONT_SIZE` whose grid fits in 90% of the canvas.
pub fn fit_layout(face: &GlyphFace, columns: u32, rows: u32, canvas: (u32, u32)) -> Layout {
    let (canvas_w, canvas_h) = canvas;
    let max_w = f64::from(canvas_w) * FILL_RATIO;
    let max_h = f64::from(canvas_h) * FILL_RATIO;

    let fitted = (MIN_FONT_SIZE..=MAX_FONT_SIZE).rev().find_map(|size| {
        let (cw, ch) = face.cell_size(size);
        let text_w = f64::from(cw) * f64::from(columns);
        let text_h = f64::from(ch) * f64::from(rows);
        (text_w <= max_w && text_h <= max_h).then_some((size, cw, ch))
    });
    let fits = fitted.is_some();
    let (font_size, cell_width, cell_height) = fitted.unwrap_or_else(|| {
        let (cw, ch) = face.cell_size(MIN_FONT_SIZE);
        (MIN_FONT_SIZE, cw, ch)
    });

    let text_w = i64::from(cell_width) * i64::from(columns);
    let text_h = i64::from(cell_height) * i64::from(rows);
    Layout {
        font_size,
        cell_width,
        cell_height,
        columns,
        rows,
        x_offset: (i64::from(canvas_w) - text_w) / 2,
        y_offset: (i64::from(canvas_h) - text_h) / 2,
        fits,
    }
}

/// Draws text frames in the configured colours at a fixed canvas size.
pub struct FrameRenderer {
    face: GlyphFace,
    canvas: (u32, u32),
    columns: u32,
    background: Rgb,
    foreground: Rgb,
    layout: Option<Layout>,
    glyphs: HashMap<char, GlyphMask>,
}

impl FrameRenderer {
    pub fn new(config: &ConversionConfig, font_path: Option<&Path>) -> Self {
        Self::with_canvas(
            config,
            GlyphFace::load(font_path),
            config.resolution().dimensions(),
        )
    }

    pub fn with_canvas(config: &ConversionConfig, face: GlyphFace, canvas: (u32, u32)) -> Self {
        Self {
            face,
            canvas: (canvas.0.max(1), canvas.1.max(1)),
            columns: config.width(),
            background: config.background(),
            foreground: config.foreground(),
            layout: None,
            glyphs: HashMap::new(),
        }
    }

    pub fn face(&self) -> &GlyphFace {
        &self.face
    }

    /// Layout for a frame of `rows` rows; computed once per row count.
    pub fn layout(&mut self, rows: u32) -> Layout {
        let rows = rows.max(1);
        if let Some(layout) = self.layout.filter(|l| l.rows == rows) {
            return layout;
        }
        let layout = fit_layout(&self.face, self.columns, rows, self.canvas);
        if layout.fits {
            log::debug!(
                "Font size {} ({}x{} px cells) for a {}x{} grid on {}x{}",
                layout.font_size,
                layout.cell_width,
                layout.cell_height,
                layout.columns,
                layout.rows,
                self.canvas.0,
                self.canvas.1
            );
        } else {
            log::warn!(
                "A {}x{} grid does not fit {}x{} at any font size, rendering at size {}",
                layout.columns,
                layout.rows,
                self.canvas.0,
                self.canvas.1,
                layout.font_size
            );
        }
        if self.layout.map(|l| l.font_size) != Some(layout.font_size) {
            self.glyphs.clear();
        }
        self.layout = Some(layout);
        layout
    }

    pub fn render(&mut self, frame: &TextFrame) -> RgbImage {
        let layout = self.layout(frame.height() as u32);
        let cell = (layout.cell_width, layout.cell_height);

        let grid: Vec<Vec<char>> = frame
            .rows()
            .iter()
            .map(|row| {
                let mut chars: Vec<char> = row.chars().collect();
                if chars.len() < self.columns as usize {
                    chars.resize(self.columns as usize, ' ');
                }
                chars
            })
            .collect();
        for &ch in grid.iter().flatten() {
            if !self.glyphs.contains_key(&ch) {
                let mask = self.face.rasterize(ch, layout.font_size, cell);
                self.glyphs.insert(ch, mask);
            }
        }

        let (width, height) = self.canvas;
        let mut data = vec![0u8; width as usize * height as usize * 3];
        let glyphs = &self.glyphs;
        let extent = GlyphExtent::of(grid.iter().flatten().filter_map(|ch| glyphs.get(ch)));
        let bg = self.background;
        let fg = self.foreground;

        data.par_chunks_exact_mut(width as usize * 3)
            .enumerate()
            .for_each(|(py, line)| {
                let coverage = line_coverage(py as i64, width, &layout, &grid, glyphs, extent);
                for (px, &cov) in coverage.iter().enumerate() {
                    let out = &mut line[px * 3..px * 3 + 3];
                    out[0] = blend(bg.0, fg.0, cov);
                    out[1] = blend(bg.1, fg.1, cov);
                    out[2] = blend(bg.2, fg.2, cov);
                }
            });

        let image = RgbImage::from_raw(width, height, data)
            .unwrap_or_else(|| RgbImage::from_pixel(width, height, bg.to_pixel()));
        ensure_even_height(image)
    }

    /// Renders and writes the frame as PNG.
    pub fn render_to_file(&mut self, frame: &TextFrame, path: &Path) -> Result<(), ConvertError> {
        let image = self.render(frame);
        image
            .save_with_format(path, ImageFormat::Png)
            .map_err(|e| ConvertError::render_failure(path, e))
    }
}

/// Vertical reach of the glyph masks in use, relative to the cell top.
/// Glyphs may overhang their cell above (`top < 0`) or below (`bottom > cell_height`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct GlyphExtent {
    top: i64,
    bottom: i64,
}

impl GlyphExtent {
    fn of<'a>(masks: impl Iterator<Item = &'a GlyphMask>) -> Self {
        masks
            .filter(|m| m.width > 0 && m.height > 0)
            .fold(GlyphExtent { top: 0, bottom: 0 }, |acc, m| GlyphExtent {
                top: acc.top.min(m.top),
                bottom: acc.bottom.max(m.top + i64::from(m.height)),
            })
    }
}

/// Grid rows whose glyphs can reach canvas row `py`.
fn rows_touching(py: i64, layout: &Layout, extent: GlyphExtent, rows: usize) -> Range<usize> {
    if extent.bottom <= extent.top {
        return 0..0;
    }
    let cell_h = i64::from(layout.cell_height.max(1));
    let rel = py - layout.y_offset;
    let first = (rel - extent.bottom).div_euclid(cell_h) + 1;
    let last = (rel - extent.top).div_euclid(cell_h);
    let first = first.clamp(0, rows as i64) as usize;
    let end = (last + 1).clamp(0, rows as i64) as usize;
    first..end.max(first)
}

/// Maximum glyph coverage of every pixel on canvas row `py`.
fn line_coverage(
    py: i64,
    width: u32,
    layout: &Layout,
    grid: &[Vec<char>],
    glyphs: &HashMap<char, GlyphMask>,
    extent: GlyphExtent,
) -> Vec<u8> {
    let mut coverage = vec![0u8; width as usize];
    let cell_w = i64::from(layout.cell_width);
    let cell_h = i64::from(layout.cell_height);

    for row in rows_touching(py, layout, extent, grid.len()) {
        let chars = &grid[row];
        let cell_top = layout.y_offset + row as i64 * cell_h;
        for (col, ch) in chars.iter().enumerate() {
            let Some(mask) = glyphs.get(ch) else {
                continue;
            };
            let my = py - (cell_top + mask.top);
            if mask.width == 0 || my < 0 || my >= i64::from(mask.height) {
                continue;
            }
            let origin_x = layout.x_offset + col as i64 * cell_w + mask.left;
            let src = &mask.coverage[(my as usize) * mask.width as usize..][..mask.width as usize];
            for (mx, &v) in src.iter().enumerate() {
                let px = origin_x + mx as i64;
                if v == 0 || px < 0 || px >= i64::from(width) {
                    continue;
                }
                let slot = &mut coverage[px as usize];
                *slot = (*slot).max(v);
            }
        }
    }
    coverage
}

#[inline]
fn blend(bg: u8, fg: u8, coverage: u8) -> u8 {
    let (bg, fg, a) = (i32::from(bg), i32::from(fg), i32::from(coverage));
    (bg + ((fg - bg) * a + if fg >= bg { 127 } else { -127 }) / 255) as u8
}

/// H.264 with yuv420p needs an even frame height.
pub fn ensure_even_height(image: RgbImage) -> RgbImage {
    let (w, h) = image.dimensions();
    if h % 2 == 0 {
        return image;
    }
    imageops::resize(&image, w, h + 1, FilterType::Nearest)
}
