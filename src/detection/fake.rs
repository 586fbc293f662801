use std::sync::atomic::{AtomicUsize, Ordering};

use crate::detection::ObjectDetector;
use crate::error::DetectionError;
use crate::models::{BoundingBox, Prediction};

/// Detector that ignores the image and returns a fixed set of predictions.
#[derive(Debug)]
pub struct FakeObjectDetector {
    predictions: Vec<Prediction>,
    calls: AtomicUsize,
}

impl FakeObjectDetector {
    pub fn new(predictions: Vec<Prediction>) -> Self {
        Self {
            predictions,
            calls: AtomicUsize::new(0),
        }
    }

    /// How many times `predict` has been called.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for FakeObjectDetector {
    fn default() -> Self {
        let prediction = |class_name: &str, score: f32, bbox: [f32; 4]| Prediction {
            class_name: class_name.to_string(),
            score,
            bbox: BoundingBox {
                xmin: bbox[0],
                ymin: bbox[1],
                xmax: bbox[2],
                ymax: bbox[3],
            },
        };
        Self::new(vec![
            prediction("cat", 0.999, [0.05, 0.10, 0.45, 0.80]),
            prediction("cat", 0.90, [0.50, 0.15, 0.90, 0.85]),
            prediction("dog", 0.75, [0.30, 0.40, 0.70, 0.95]),
            prediction("cat", 0.40, [0.00, 0.00, 0.20, 0.20]),
            prediction("person", 0.20, [0.60, 0.00, 1.00, 0.60]),
        ])
    }
}

impl ObjectDetector for FakeObjectDetector {
    async fn predict(&self, _image: &[u8]) -> Result<Vec<Prediction>, DetectionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(predictions = self.predictions.len(), "Fake detector called");
        Ok(self.predictions.clone())
    }
}
