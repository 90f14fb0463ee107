//! Photometric correction applied to each decoded frame before glyph mapping.

use crate::config::ConversionConfig;
use image::{GrayImage, RgbImage};

/// Brightness, contrast and gamma factors. `1.0` is neutral for each.
#[derive(Debug, Clone)]
pub struct Correction {
    brightness: f32,
    contrast: f32,
    gamma: f32,
    gamma_lut: Option<[u8; 256]>,
}

impl Correction {
    pub fn new(brightness: f32, contrast: f32, gamma: f32) -> Self {
        let gamma_lut = if gamma == 1.0 {
            None
        } else {
            Some(gamma_table(gamma))
        };
        Self {
            brightness,
            contrast,
            gamma,
            gamma_lut,
        }
    }

    pub fn from_config(config: &ConversionConfig) -> Self {
        Self::new(config.brightness(), config.contrast(), config.gamma())
    }

    pub fn is_identity(&self) -> bool {
        self.brightness == 1.0 && self.contrast == 1.0 && self.gamma == 1.0
    }

    /// Grayscale conversion followed by brightness, contrast and gamma, in that order.
    pub fn apply(&self, frame: &RgbImage) -> GrayImage {
        let mut gray = grayscale(frame);
        self.apply_brightness(&mut gray);
        self.apply_contrast(&mut gray);
        self.apply_gamma(&mut gray);
        gray
    }

    fn apply_brightness(&self, gray: &mut GrayImage) {
        if self.brightness == 1.0 {
            return;
        }
        let factor = self.brightness;
        for v in gray.iter_mut() {
            *v = (f32::from(*v) * factor).clamp(0.0, 255.0) as u8;
        }
    }

    fn apply_contrast(&self, gray: &mut GrayImage) {
        if self.contrast == 1.0 || gray.is_empty() {
            return;
        }
        // Mean of the already brightness-corrected samples.
        let sum: u64 = gray.iter().map(|&v| u64::from(v)).sum();
        let mean = sum as f64 / gray.len() as f64;
        let factor = f64::from(self.contrast);
        for v in gray.iter_mut() {
            *v = ((f64::from(*v) - mean) * factor + mean).clamp(0.0, 255.0) as u8;
        }
    }

    fn apply_gamma(&self, gray: &mut GrayImage) {
        let Some(lut) = self.gamma_lut.as_ref() else {
            return;
        };
        for v in gray.iter_mut() {
            *v = lut[*v as usize];
        }
    }
}

impl Default for Correction {
    fn default() -> Self {
        Self::new(1.0, 1.0, 1.0)
    }
}

/// `lut[i] = 255 * (i / 255) ^ (1 / gamma)`, truncated.
pub fn gamma_table(gamma: f32) -> [u8; 256] {
    let inv = 1.0 / f64::from(gamma);
    let mut table = [0u8; 256];
    for (i, slot) in table.iter_mut().enumerate() {
        *slot = ((i as f64 / 255.0).powf(inv) * 255.0).clamp(0.0, 255.0) as u8;
    }
    table
}

/// ITU-R BT.601 luma, rounded to nearest.
#[inline]
pub fn luma(r: u8, g: u8, b: u8) -> u8 {
    // Fixed-point weights summing to 1 << 16.
    const WR: u32 = 19_595;
    const WG: u32 = 38_470;
    const WB: u32 = 7_471;
    let y = WR * u32::from(r) + WG * u32::from(g) + WB * u32::from(b);
    ((y + (1 << 15)) >> 16) as u8
}

/// Plain grayscale conversion with no correction.
pub fn grayscale(frame: &RgbImage) -> GrayImage {
    let (w, h) = frame.dimensions();
    let data = frame
        .pixels()
        .map(|p| luma(p[0], p[1], p[2]))
        .collect::<Vec<u8>>();
    // Buffer length is exactly w * h.
    GrayImage::from_raw(w, h, data).unwrap_or_else(|| GrayImage::new(w, h))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn gradient(w: u32, h: u32) -> RgbImage {
        RgbImage::from_fn(w, h, |x, y| {
            Rgb([
                (x * 255 / w.max(1)) as u8,
                (y * 255 / h.max(1)) as u8,
                ((x + y) % 256) as u8,
            ])
        })
    }

    #[test]
    fn luma_extremes_and_weights() {
        assert_eq!(luma(0, 0, 0), 0);
        assert_eq!(luma(255, 255, 255), 255);
        assert_eq!(luma(255, 0, 0), 76);
        assert_eq!(luma(0, 255, 0), 150);
        assert_eq!(luma(0, 0, 255), 29);
    }

    #[test]
    fn neutral_factors_equal_plain_grayscale() {
        let frame = gradient(64, 48);
        let corrected = Correction::default().apply(&frame);
        assert_eq!(corrected, grayscale(&frame));
        assert!(Correction::default().is_identity());
    }

    #[test]
    fn brightness_scales_and_clamps() {
        let frame = RgbImage::from_pixel(2, 2, Rgb([200, 200, 200]));
        let out = Correction::new(2.0, 1.0, 1.0).apply(&frame);
        assert!(out.iter().all(|&v| v == 255));
        let out = Correction::new(0.5, 1.0, 1.0).apply(&frame);
        assert!(out.iter().all(|&v| v == 100));
    }

    #[test]
    fn contrast_uses_brightness_corrected_mean() {
        // Samples 50 and 150; brightness 1.2 gives 60 and 180, mean 120.
        let frame = RgbImage::from_fn(2, 1, |x, _| {
            if x == 0 {
                Rgb([50, 50, 50])
            } else {
                Rgb([150, 150, 150])
            }
        });
        let out = Correction::new(1.2, 2.0, 1.0).apply(&frame);
        assert_eq!(out.get_pixel(0, 0)[0], 0);
        assert_eq!(out.get_pixel(1, 0)[0], 240);
    }

    #[test]
    fn flat_frame_is_unchanged_by_contrast() {
        let frame = RgbImage::from_pixel(3, 3, Rgb([90, 90, 90]));
        let out = Correction::new(1.0, 1.7, 1.0).apply(&frame);
        assert!(out.iter().all(|&v| v == 90));
    }

    #[test]
    fn gamma_table_endpoints_and_direction() {
        let brighten = gamma_table(2.0);
        let darken = gamma_table(0.5);
        assert_eq!(brighten[0], 0);
        assert_eq!(brighten[255], 255);
        assert_eq!(darken[255], 255);
        assert!(brighten[64] > 64);
        assert!(darken[64] < 64);
        assert!(brighten.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn empty_frame_is_handled() {
        let frame = RgbImage::new(0, 0);
        let out = Correction::new(1.5, 1.5, 1.5).apply(&frame);
        assert_eq!(out.dimensions(), (0, 0));
    }
}
