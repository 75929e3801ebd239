//! YuNet face detector.
//!
//! YuNet is anchor-free: for each stride (8, 16, 32) the network emits, per
//! grid cell, a class score, an objectness score, four box deltas and ten
//! landmark deltas. Decoding follows the OpenCV reference:
//!
//! ```text
//! score = sqrt(clamp(cls) * clamp(obj))
//! cx    = (col + dx) * stride        w = exp(dw) * stride
//! cy    = (row + dy) * stride        h = exp(dh) * stride
//! lm_k  = (col + kx, row + ky) * stride
//! ```

use anyhow::{Context, Result};
use image::{DynamicImage, GenericImageView, RgbImage};
use ort::{session::Session, value::Value};

use crate::tensor;

/// Side of the square network input.
pub const INPUT_SIZE: u32 = 640;

const STRIDES: [usize; 3] = [8, 16, 32];
const HEADS: [(&str, usize); 4] = [("cls", 1), ("obj", 1), ("bbox", 4), ("kps", 10)];

/// A detected face in source image pixel coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub bbox: [f32; 4], // x, y, w, h
    pub score: f32,
    pub landmarks: [f32; 10], // right eye, left eye, nose, mouth right, mouth left
}

impl Detection {
    pub fn landmark(&self, idx: usize) -> (f32, f32) {
        (self.landmarks[idx * 2], self.landmarks[idx * 2 + 1])
    }

    fn map(self, lb: &Letterbox) -> Self {
        let (x, y) = lb.to_source(self.bbox[0], self.bbox[1]);
        let mut landmarks = [0.0f32; 10];
        for k in 0..5 {
            let (lx, ly) = lb.to_source(self.landmarks[k * 2], self.landmarks[k * 2 + 1]);
            landmarks[k * 2] = lx;
            landmarks[k * 2 + 1] = ly;
        }
        Self {
            bbox: [x, y, self.bbox[2] / lb.scale, self.bbox[3] / lb.scale],
            score: self.score,
            landmarks,
        }
    }
}

/// Aspect-preserving fit of a source image into the square network input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub scale: f32,
    pub offset_x: f32,
    pub offset_y: f32,
    width: u32,
    height: u32,
}

impl Letterbox {
    pub fn fit(width: u32, height: u32, target: u32) -> Self {
        let scale = target as f32 / width.max(height).max(1) as f32;
        let w = ((width as f32 * scale) as u32).clamp(1, target);
        let h = ((height as f32 * scale) as u32).clamp(1, target);
        Self {
            scale,
            offset_x: ((target - w) / 2) as f32,
            offset_y: ((target - h) / 2) as f32,
            width: w,
            height: h,
        }
    }

    pub fn render(&self, img: &DynamicImage, target: u32) -> RgbImage {
        let resized = img
            .resize_exact(self.width, self.height, image::imageops::FilterType::Triangle)
            .to_rgb8();
        let mut canvas = RgbImage::new(target, target);
        image::imageops::overlay(
            &mut canvas,
            &resized,
            self.offset_x as i64,
            self.offset_y as i64,
        );
        canvas
    }

    /// Maps a canvas pixel position back into the source image.
    pub fn to_source(&self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.offset_x) / self.scale, (y - self.offset_y) / self.scale)
    }
}

pub struct FaceDetector {
    session: Session,
    pub score_threshold: f32,
    pub nms_threshold: f32,
}

impl FaceDetector {
    pub fn new(session: Session, score_threshold: f32, nms_threshold: f32) -> Self {
        Self {
            session,
            score_threshold,
            nms_threshold,
        }
    }

    /// Detects every face in `img`, best score first.
    pub fn detect(&mut self, img: &DynamicImage) -> Result<Vec<Detection>> {
        let (width, height) = img.dimensions();
        let lb = Letterbox::fit(width, height, INPUT_SIZE);
        let canvas = lb.render(img, INPUT_SIZE);

        let input = Value::from_array(tensor::bgr_planar(&canvas)?)?;
        let outputs = self.session.run(ort::inputs![input])?;

        let mut raw = Vec::new();
        for (name, output) in outputs.iter() {
            let (shape, data) = output.try_extract_tensor::<f32>()?;
            raw.push(RawOutput {
                name: name.to_string(),
                shape: shape.iter().copied().collect(),
                data: data.to_vec(),
            });
        }

        let heads = split_heads(&raw, INPUT_SIZE as usize).context("parsing yunet outputs")?;
        let candidates = decode(&heads, self.score_threshold);
        log::debug!(
            "yunet: {} candidates above {:.2} for {}x{} image",
            candidates.len(),
            self.score_threshold,
            width,
            height
        );

        Ok(nms(candidates, self.nms_threshold)
            .into_iter()
            .map(|d| d.map(&lb))
            .collect())
    }
}

#[derive(Debug, Clone)]
pub struct RawOutput {
    pub name: String,
    pub shape: Vec<i64>,
    pub data: Vec<f32>,
}

/// Per-stride view over the four YuNet output heads.
#[derive(Debug)]
pub struct Head<'a> {
    pub stride: usize,
    pub cls: &'a [f32],
    pub obj: &'a [f32],
    pub bbox: &'a [f32],
    pub kps: &'a [f32],
}

/// Groups the twelve YuNet outputs by stride. Outputs are looked up by their
/// exported name (`cls_8`, `bbox_16`, ...) and otherwise by position
/// (cls_8, cls_16, cls_32, obj_8, ..., kps_32).
pub fn split_heads(outputs: &[RawOutput], input_size: usize) -> Result<Vec<Head<'_>>> {
    let mut heads = Vec::with_capacity(STRIDES.len());
    for (s_idx, &stride) in STRIDES.iter().enumerate() {
        let cells = (input_size / stride) * (input_size / stride);
        let mut slices: [&[f32]; 4] = [&[]; 4];

        for (h_idx, &(kind, width)) in HEADS.iter().enumerate() {
            let name = format!("{}_{}", kind, stride);
            let out = outputs
                .iter()
                .find(|o| o.name == name)
                .or_else(|| outputs.get(h_idx * STRIDES.len() + s_idx))
                .with_context(|| format!("missing output {}", name))?;

            let expected = [1, cells as i64, width as i64];
            if out.shape != expected {
                anyhow::bail!(
                    "unexpected shape for {}: {:?}, expected {:?}",
                    name,
                    out.shape,
                    expected
                );
            }
            if out.data.len() != cells * width {
                anyhow::bail!(
                    "output {} holds {} values, expected {}",
                    name,
                    out.data.len(),
                    cells * width
                );
            }
            slices[h_idx] = &out.data;
        }

        heads.push(Head {
            stride,
            cls: slices[0],
            obj: slices[1],
            bbox: slices[2],
            kps: slices[3],
        });
    }
    Ok(heads)
}

/// Decodes candidate faces in canvas pixel coordinates.
pub fn decode(heads: &[Head<'_>], score_threshold: f32) -> Vec<Detection> {
    let mut out = Vec::new();
    for head in heads {
        let s = head.stride as f32;
        let cols = (head.cls.len() as f64).sqrt() as usize;

        for (idx, (&cls, &obj)) in head.cls.iter().zip(head.obj).enumerate() {
            let score = (cls.clamp(0.0, 1.0) * obj.clamp(0.0, 1.0)).sqrt();
            if score < score_threshold {
                continue;
            }
            let row = (idx / cols) as f32;
            let col = (idx % cols) as f32;

            let b = &head.bbox[idx * 4..idx * 4 + 4];
            let cx = (col + b[0]) * s;
            let cy = (row + b[1]) * s;
            let w = b[2].exp() * s;
            let h = b[3].exp() * s;

            let k = &head.kps[idx * 10..idx * 10 + 10];
            let mut landmarks = [0.0f32; 10];
            for p in 0..5 {
                landmarks[p * 2] = (col + k[p * 2]) * s;
                landmarks[p * 2 + 1] = (row + k[p * 2 + 1]) * s;
            }

            out.push(Detection {
                bbox: [cx - w / 2.0, cy - h / 2.0, w, h],
                score,
                landmarks,
            });
        }
    }
    out
}

/// Greedy non-maximum suppression. The result is sorted by descending score.
pub fn nms(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| b.score.total_cmp(&a.score));
    if iou_threshold >= 1.0 {
        return detections;
    }

    let mut keep: Vec<Detection> = Vec::with_capacity(detections.len());
    for det in detections {
        if keep.iter().all(|k| iou(&k.bbox, &det.bbox) <= iou_threshold) {
            keep.push(det);
        }
    }
    keep
}

fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let x1 = a[0].max(b[0]);
    let y1 = a[1].max(b[1]);
    let x2 = (a[0] + a[2]).min(b[0] + b[2]);
    let y2 = (a[1] + a[3]).min(b[1] + b[3]);
    if x2 <= x1 || y2 <= y1 {
        return 0.0;
    }
    let inter = (x2 - x1) * (y2 - y1);
    inter / (a[2] * a[3] + b[2] * b[3] - inter)
}
