//! Client for a TensorFlow Serving REST endpoint running a COCO detection model.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::TfServingConfig;
use crate::detection::ObjectDetector;
use crate::detection::labels::coco_label;
use crate::error::{DetectionError, Error, Result};
use crate::models::{BoundingBox, Prediction};

#[derive(Debug)]
pub struct TfServingDetector {
    client: reqwest::Client,
    url: String,
}

impl TfServingDetector {
    pub fn new(config: &TfServingConfig, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            url: predict_url(config),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

fn predict_url(config: &TfServingConfig) -> String {
    format!(
        "http://{}:{}/v1/models/{}:predict",
        config.host, config.port, config.model
    )
}

#[derive(Debug, Serialize)]
struct PredictRequest {
    /// One image as rows of RGB pixels
    instances: Vec<Vec<Vec<[u8; 3]>>>,
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    predictions: Vec<RawDetections>,
}

#[derive(Debug, Deserialize)]
struct RawDetections {
    /// `[ymin, xmin, ymax, xmax]`, normalized
    detection_boxes: Vec<[f32; 4]>,
    detection_classes: Vec<f32>,
    detection_scores: Vec<f32>,
    num_detections: f32,
}

/// Decode an encoded image and lay it out as the model's input tensor.
fn encode_instances(image: &[u8]) -> std::result::Result<PredictRequest, DetectionError> {
    let rgb = image::load_from_memory(image)
        .map_err(|e| DetectionError::Image(e.to_string()))?
        .to_rgb8();

    let rows = rgb
        .rows()
        .map(|row| row.map(|pixel| pixel.0).collect())
        .collect();

    Ok(PredictRequest {
        instances: vec![rows],
    })
}

fn parse_predictions(
    response: PredictResponse,
) -> std::result::Result<Vec<Prediction>, DetectionError> {
    let detections = response
        .predictions
        .into_iter()
        .next()
        .ok_or_else(|| DetectionError::Malformed("response has no predictions".to_string()))?;

    if !detections.num_detections.is_finite() || detections.num_detections < 0.0 {
        return Err(DetectionError::Malformed(format!(
            "invalid num_detections {}",
            detections.num_detections
        )));
    }
    let num = detections.num_detections as usize;
    if detections.detection_boxes.len() < num
        || detections.detection_classes.len() < num
        || detections.detection_scores.len() < num
    {
        return Err(DetectionError::Malformed(format!(
            "expected {} detections, got {} boxes, {} classes and {} scores",
            num,
            detections.detection_boxes.len(),
            detections.detection_classes.len(),
            detections.detection_scores.len()
        )));
    }

    (0..num)
        .map(|i| {
            let class_id = detections.detection_classes[i];
            let class_name = coco_label(class_id as u32)
                .filter(|_| class_id.fract() == 0.0 && class_id > 0.0)
                .ok_or_else(|| DetectionError::Malformed(format!("unknown class id {}", class_id)))?;
            let [ymin, xmin, ymax, xmax] = detections.detection_boxes[i];
            Ok(Prediction {
                class_name: class_name.to_string(),
                score: detections.detection_scores[i],
                bbox: BoundingBox {
                    xmin,
                    ymin,
                    xmax,
                    ymax,
                },
            })
        })
        .collect()
}

impl ObjectDetector for TfServingDetector {
    async fn predict(&self, image: &[u8]) -> std::result::Result<Vec<Prediction>, DetectionError> {
        let request = encode_instances(image)?;

        tracing::debug!(url = %self.url, "Sending predict request");
        let response = self.client.post(&self.url).json(&request).send().await?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(url = %self.url, status = status.as_u16(), "Detector rejected request");
            return Err(DetectionError::Status(status.as_u16()));
        }

        let body: PredictResponse = response.json().await?;
        let predictions = parse_predictions(body)?;
        tracing::debug!(predictions = predictions.len(), "Detector responded");
        Ok(predictions)
    }
}
