use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, Rgb, RgbImage};
use rand::Rng;
use serde::{Serialize, Deserialize};

use crate::layers::pool::InputShape;

/// ImageNet channel statistics the pretrained backbones were trained with.
const MEAN: [f64; 3] = [0.485, 0.456, 0.406];
const STD: [f64; 3] = [0.229, 0.224, 0.225];

/// Augmented images are rotated by up to this many degrees either way.
const MAX_ROTATION_DEGREES: f64 = 30.0;

/// Attempts at a random crop before falling back to a centre crop.
const CROP_ATTEMPTS: usize = 10;

/// Image preprocessing applied before flattening.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Transform {
    /// Random rotation (±30°), random resized crop (scale 0.08–1, aspect
    /// 3/4–4/3) and random horizontal flip.
    Augment { size: u32 },
    /// Resize the short side to size·256/224, then centre crop.
    Deterministic { size: u32 },
}

impl Transform {
    pub fn size(&self) -> u32 {
        match self {
            Transform::Augment { size } | Transform::Deterministic { size } => *size,
        }
    }

    pub fn input_shape(&self) -> InputShape {
        let side = self.size() as usize;
        InputShape { channels: 3, height: side, width: side }
    }

    /// Transforms, normalizes and flattens one image channel-major.
    pub fn apply<R: Rng + ?Sized>(&self, image: &DynamicImage, rng: &mut R) -> Vec<f64> {
        let size = self.size();
        let prepared = match self {
            Transform::Augment { .. } => {
                let degrees = rng.gen_range(-MAX_ROTATION_DEGREES..=MAX_ROTATION_DEGREES);
                let rotated = rotate_about_centre(image, degrees);
                let cropped = random_resized_crop(&rotated, size, rng);
                if rng.gen_bool(0.5) { cropped.fliph() } else { cropped }
            }
            Transform::Deterministic { .. } => {
                let resize_to = (size * 256 / 224).max(size);
                let (w, h) = image.dimensions();
                let scale = resize_to as f64 / w.min(h).max(1) as f64;
                let nw = ((w as f64 * scale).round() as u32).max(size);
                let nh = ((h as f64 * scale).round() as u32).max(size);
                let resized = image.resize_exact(nw, nh, FilterType::Triangle);
                resized.crop_imm((nw - size) / 2, (nh - size) / 2, size, size)
            }
        };
        to_normalized_chw(&prepared)
    }
}

/// Rotates by `degrees` about the image centre, keeping the original size. Nearest-neighbour sampling; corners uncovered by the source are black.
fn rotate_about_centre(image: &DynamicImage, degrees: f64) -> DynamicImage {
    let src = image.to_rgb8();
    let (w, h) = src.dimensions();
    let (sin, cos) = degrees.to_radians().sin_cos();
    let (cx, cy) = ((w as f64 - 1.0) / 2.0, (h as f64 - 1.0) / 2.0);

    let rotated = RgbImage::from_fn(w, h, |x, y| {
        let (dx, dy) = (x as f64 - cx, y as f64 - cy);
        // Inverse mapping: where did this output pixel come from?
        let sx = (cos * dx - sin * dy + cx).round();
        let sy = (sin * dx + cos * dy + cy).round();
        if sx >= 0.0 && sy >= 0.0 && sx < w as f64 && sy < h as f64 {
            *src.get_pixel(sx as u32, sy as u32)
        } else {
            Rgb([0, 0, 0])
        }
    });
    DynamicImage::ImageRgb8(rotated)
}

fn random_resized_crop<R: Rng + ?Sized>(image: &DynamicImage, size: u32, rng: &mut R) -> DynamicImage {
    let (w, h) = image.dimensions();
    let area = w as f64 * h as f64;
    let (log_lo, log_hi) = ((3.0f64 / 4.0).ln(), (4.0f64 / 3.0).ln());

    for _ in 0..CROP_ATTEMPTS {
        let target_area = area * rng.gen_range(0.08..=1.0);
        let ratio = rng.gen_range(log_lo..=log_hi).exp();
        let cw = (target_area * ratio).sqrt().round() as u32;
        let ch = (target_area / ratio).sqrt().round() as u32;
        if cw > 0 && ch > 0 && cw <= w && ch <= h {
            let x = rng.gen_range(0..=w - cw);
            let y = rng.gen_range(0..=h - ch);
            return image.crop_imm(x, y, cw, ch).resize_exact(size, size, FilterType::Triangle);
        }
    }

    let side = w.min(h);
    image
        .crop_imm((w - side) / 2, (h - side) / 2, side, side)
        .resize_exact(size, size, FilterType::Triangle)
}

fn to_normalized_chw(image: &DynamicImage) -> Vec<f64> {
    let rgb = image.to_rgb8();
    let (w, h) = rgb.dimensions();
    let mut out = Vec::with_capacity(3 * (w * h) as usize);
    for c in 0..3 {
        for y in 0..h {
            for x in 0..w {
                let value = rgb.get_pixel(x, y).0[c] as f64 / 255.0;
                out.push((value - MEAN[c]) / STD[c]);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn gradient(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(w, h, |x, y| Rgb([(x * 7) as u8, (y * 5) as u8, 128])))
    }

    #[test]
    fn test_output_width_matches_shape() {
        let mut rng = StdRng::seed_from_u64(0);
        for transform in [Transform::Augment { size: 8 }, Transform::Deterministic { size: 8 }] {
            let row = transform.apply(&gradient(20, 13), &mut rng);
            assert_eq!(row.len(), transform.input_shape().len());
            assert!(row.iter().all(|v| v.is_finite()));
        }
    }

    #[test]
    fn test_rotation_keeps_size_and_moves_pixels() {
        let image = gradient(5, 5);
        assert_eq!(rotate_about_centre(&image, 0.0).to_rgb8(), image.to_rgb8());

        let half_turn = rotate_about_centre(&image, 180.0).to_rgb8();
        assert_eq!(half_turn.dimensions(), (5, 5));
        assert_eq!(half_turn.get_pixel(0, 0), image.to_rgb8().get_pixel(4, 4));

        let tilted = rotate_about_centre(&gradient(9, 9), 30.0).to_rgb8();
        assert_eq!(tilted.get_pixel(0, 0), &Rgb([0, 0, 0]));
    }

    #[test]
    fn test_deterministic_is_repeatable() {
        let transform = Transform::Deterministic { size: 8 };
        let image = gradient(30, 17);
        let a = transform.apply(&image, &mut StdRng::seed_from_u64(1));
        let b = transform.apply(&image, &mut StdRng::seed_from_u64(2));
        assert_eq!(a, b);
    }

    #[test]
    fn test_normalization() {
        let white = DynamicImage::ImageRgb8(RgbImage::from_pixel(2, 2, Rgb([255, 255, 255])));
        let row = to_normalized_chw(&white);
        assert!((row[0] - (1.0 - MEAN[0]) / STD[0]).abs() < 1e-12);
        assert!((row[11] - (1.0 - MEAN[2]) / STD[2]).abs() < 1e-12);
    }
}
