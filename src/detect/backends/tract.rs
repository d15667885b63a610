#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tract_onnx::prelude::*;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::Detection;
use crate::frame::Frame;

const DEFAULT_IOU_THRESHOLD: f32 = 0.45;

/// Tract-based backend for YOLOv8-style ONNX detectors.
///
/// The model takes a square `1x3xSxS` RGB tensor and produces `1x(4+C)xN`
/// rows of `cx, cy, w, h` followed by one score per class. Boxes are mapped
/// back to frame pixels before they leave the backend.
pub struct TractBackend {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>>,
    labels: Vec<String>,
    input_size: u32,
    confidence_threshold: f32,
    iou_threshold: f32,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, labels: Vec<String>, input_size: u32) -> Result<Self> {
        if labels.is_empty() {
            return Err(anyhow!("tract backend needs at least one class label"));
        }
        if input_size == 0 {
            return Err(anyhow!("model input size must be positive"));
        }
        let model_path = model_path.as_ref();
        let side = input_size as usize;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, side, side)),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            labels,
            input_size,
            confidence_threshold: 0.5,
            iou_threshold: DEFAULT_IOU_THRESHOLD,
        })
    }

    /// Override the default confidence threshold.
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    /// Nearest-neighbour resize into the model's square input.
    fn build_input(&self, frame: &Frame) -> Result<Tensor> {
        if frame.width == 0 || frame.height == 0 {
            return Err(anyhow!("cannot run inference on an empty frame"));
        }
        let pixels = frame.pixels();
        let side = self.input_size as usize;
        let src_w = frame.width as usize;
        let src_h = frame.height as usize;
        let input = tract_ndarray::Array4::from_shape_fn((1, 3, side, side), |(_, channel, y, x)| {
            let sx = x * src_w / side;
            let sy = y * src_h / side;
            pixels[(sy * src_w + sx) * 3 + channel] as f32 / 255.0
        });
        Ok(input.into_tensor())
    }

    fn decode(&self, outputs: TVec<TValue>, frame: &Frame) -> Result<Vec<Detection>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let shape = view.shape().to_vec();
        if shape.len() != 3 || shape[0] != 1 || shape[1] != 4 + self.labels.len() {
            return Err(anyhow!(
                "unexpected output shape {:?} for {} classes",
                shape,
                self.labels.len()
            ));
        }
        let view = view
            .into_dimensionality::<tract_ndarray::Ix3>()
            .context("model output is not three-dimensional")?;

        let scale_x = frame.width as f32 / self.input_size as f32;
        let scale_y = frame.height as f32 / self.input_size as f32;
        let mut candidates = Vec::new();
        for i in 0..shape[2] {
            let (class, score) = (0..self.labels.len())
                .map(|c| (c, view[[0, 4 + c, i]]))
                .fold((0, f32::NEG_INFINITY), |best, cur| {
                    if cur.1 > best.1 {
                        cur
                    } else {
                        best
                    }
                });
            if !(score >= self.confidence_threshold) {
                continue;
            }
            let (cx, cy, w, h) = (view[[0, 0, i]], view[[0, 1, i]], view[[0, 2, i]], view[[0, 3, i]]);
            let xyxy = [
                ((cx - w / 2.0) * scale_x).max(0.0),
                ((cy - h / 2.0) * scale_y).max(0.0),
                ((cx + w / 2.0) * scale_x).min(frame.width as f32),
                ((cy + h / 2.0) * scale_y).min(frame.height as f32),
            ];
            match Detection::from_xyxy(&self.labels[class], xyxy, score) {
                Ok(det) => candidates.push(det),
                Err(e) => log::debug!("tract: dropping malformed box: {}", e),
            }
        }
        Ok(non_max_suppression(candidates, self.iou_threshold))
    }
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn labels(&self) -> &[String] {
        &self.labels
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        let input = self.build_input(frame)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        self.decode(outputs, frame)
    }
}

fn iou(a: &Detection, b: &Detection) -> f32 {
    let (a, b) = (&a.bounding_box, &b.bounding_box);
    let ix = (a.x2.min(b.x2) - a.x1.max(b.x1)).max(0) as f32;
    let iy = (a.y2.min(b.y2) - a.y1.max(b.y1)).max(0) as f32;
    let inter = ix * iy;
    let area_a = (a.width() * a.height()) as f32;
    let area_b = (b.width() * b.height()) as f32;
    let union = area_a + area_b - inter;
    if union <= 0.0 {
        0.0
    } else {
        inter / union
    }
}

/// Greedy per-class suppression, highest confidence first.
fn non_max_suppression(mut candidates: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    candidates.sort_by(|a, b| {
        b.confidence
            .unwrap_or(0.0)
            .total_cmp(&a.confidence.unwrap_or(0.0))
    });
    let mut kept: Vec<Detection> = Vec::new();
    for cand in candidates {
        let overlaps = kept
            .iter()
            .any(|k| k.class_label == cand.class_label && iou(k, &cand) > iou_threshold);
        if !overlaps {
            kept.push(cand);
        }
    }
    kept
}
