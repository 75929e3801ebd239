//! SFace recognizer: eye-based alignment followed by embedding extraction.

use anyhow::Result;
use image::{DynamicImage, Rgb, RgbImage};
use ort::{session::Session, value::Value};

use crate::detector::Detection;
use crate::tensor;

/// SFace input side.
pub const FACE_SIZE: u32 = 112;

// ArcFace eye template for a 112x112 crop (image-left eye first).
const TEMPLATE_EYES: [(f32, f32); 2] = [(38.2946, 51.6963), (73.5318, 51.5014)];

/// Similarity transform `dst = [a -b; b a] * src + [tx, ty]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Similarity {
    pub a: f32,
    pub b: f32,
    pub tx: f32,
    pub ty: f32,
}

impl Similarity {
    /// Transform that carries the two detected eyes onto the template eyes,
    /// scaled to a `size`x`size` crop.
    pub fn from_eyes(left: (f32, f32), right: (f32, f32), size: u32) -> Self {
        let k = size as f32 / FACE_SIZE as f32;
        let (t0, t1) = (TEMPLATE_EYES[0], TEMPLATE_EYES[1]);
        let (tl, tr) = ((t0.0 * k, t0.1 * k), (t1.0 * k, t1.1 * k));

        // Complex-number form: dst_vec = z * src_vec with z = a + ib.
        let (sx, sy) = (right.0 - left.0, right.1 - left.1);
        let (dx, dy) = (tr.0 - tl.0, tr.1 - tl.1);
        let denom = (sx * sx + sy * sy).max(f32::EPSILON);
        let a = (dx * sx + dy * sy) / denom;
        let b = (dy * sx - dx * sy) / denom;

        Self {
            a,
            b,
            tx: tl.0 - (a * left.0 - b * left.1),
            ty: tl.1 - (b * left.0 + a * left.1),
        }
    }

    pub fn apply(&self, x: f32, y: f32) -> (f32, f32) {
        (
            self.a * x - self.b * y + self.tx,
            self.b * x + self.a * y + self.ty,
        )
    }

    pub fn inverse(&self) -> Self {
        let n = (self.a * self.a + self.b * self.b).max(f32::EPSILON);
        let (a, b) = (self.a / n, -self.b / n);
        Self {
            a,
            b,
            tx: -(a * self.tx - b * self.ty),
            ty: -(b * self.tx + a * self.ty),
        }
    }
}

/// Warps the face described by `detection` into an upright `size`x`size` crop.
/// Pixels that fall outside the source stay black.
pub fn align_face(img: &DynamicImage, detection: &Detection, size: u32) -> RgbImage {
    let src = img.to_rgb8();
    let (w, h) = src.dimensions();
    let back = Similarity::from_eyes(detection.landmark(0), detection.landmark(1), size).inverse();

    let mut out = RgbImage::new(size, size);
    if w == 0 || h == 0 {
        return out;
    }
    for (x, y, px) in out.enumerate_pixels_mut() {
        let (sx, sy) = back.apply(x as f32, y as f32);
        if sx < 0.0 || sy < 0.0 || sx > (w - 1) as f32 || sy > (h - 1) as f32 {
            continue;
        }
        *px = bilinear(&src, sx, sy);
    }
    out
}

fn bilinear(img: &RgbImage, x: f32, y: f32) -> Rgb<u8> {
    let (w, h) = img.dimensions();
    let (x0, y0) = (x.floor() as u32, y.floor() as u32);
    let (x1, y1) = ((x0 + 1).min(w - 1), (y0 + 1).min(h - 1));
    let (fx, fy) = (x - x0 as f32, y - y0 as f32);

    let taps = [
        (img.get_pixel(x0, y0), (1.0 - fx) * (1.0 - fy)),
        (img.get_pixel(x1, y0), fx * (1.0 - fy)),
        (img.get_pixel(x0, y1), (1.0 - fx) * fy),
        (img.get_pixel(x1, y1), fx * fy),
    ];
    let mut acc = [0.0f32; 3];
    for (p, wgt) in taps {
        for c in 0..3 {
            acc[c] += p[c] as f32 * wgt;
        }
    }
    Rgb(acc.map(|v| v.round().clamp(0.0, 255.0) as u8))
}

/// L2-normalises `v` in place; a zero vector is left untouched.
pub fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter_mut().for_each(|x| *x /= norm);
    }
}

pub struct FaceEncoder {
    session: Session,
}

impl FaceEncoder {
    pub fn new(session: Session) -> Self {
        Self { session }
    }

    /// Encodes an aligned face crop into an L2-normalised embedding.
    pub fn encode(&mut self, face: &RgbImage) -> Result<Vec<f32>> {
        let face = if face.dimensions() == (FACE_SIZE, FACE_SIZE) {
            face.clone()
        } else {
            image::imageops::resize(
                face,
                FACE_SIZE,
                FACE_SIZE,
                image::imageops::FilterType::Triangle,
            )
        };

        let input = Value::from_array(tensor::bgr_planar(&face)?)?;
        let outputs = self.session.run(ort::inputs![input])?;
        let (shape, data) = outputs[0].try_extract_tensor::<f32>()?;

        let len = match shape.len() {
            2 => shape[1] as usize,
            _ => data.len(),
        };
        if len == 0 || len > data.len() {
            anyhow::bail!(
                "recognizer returned an unexpected shape {:?}",
                shape.iter().collect::<Vec<_>>()
            );
        }

        let mut embedding = data[..len].to_vec();
        l2_normalize(&mut embedding);
        Ok(embedding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: (f32, f32), b: (f32, f32)) -> bool {
        (a.0 - b.0).abs() < 1e-3 && (a.1 - b.1).abs() < 1e-3
    }

    #[test]
    fn eyes_land_on_template() {
        let left = (210.0, 330.0);
        let right = (290.0, 310.0);
        let t = Similarity::from_eyes(left, right, FACE_SIZE);
        assert!(close(t.apply(left.0, left.1), TEMPLATE_EYES[0]));
        assert!(close(t.apply(right.0, right.1), TEMPLATE_EYES[1]));
    }

    #[test]
    fn inverse_undoes_transform() {
        let t = Similarity::from_eyes((40.0, 60.0), (90.0, 75.0), 224);
        let back = t.inverse();
        let (x, y) = t.apply(12.0, 34.0);
        assert!(close(back.apply(x, y), (12.0, 34.0)));
    }

    #[test]
    fn align_face_produces_requested_size() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(200, 200, Rgb([90, 120, 150])));
        let det = Detection {
            bbox: [50.0, 50.0, 100.0, 100.0],
            score: 0.9,
            landmarks: [80.0, 90.0, 120.0, 90.0, 100.0, 110.0, 85.0, 130.0, 115.0, 130.0],
        };
        let face = align_face(&img, &det, FACE_SIZE);
        assert_eq!(face.dimensions(), (FACE_SIZE, FACE_SIZE));
        assert_eq!(face.get_pixel(56, 56), &Rgb([90, 120, 150]));
    }

    #[test]
    fn normalize_handles_zero_vector() {
        let mut z = vec![0.0f32; 4];
        l2_normalize(&mut z);
        assert_eq!(z, vec![0.0; 4]);

        let mut v = vec![3.0f32, 4.0];
        l2_normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6 && (v[1] - 0.8).abs() < 1e-6);
    }
}
