//! The two request flows: detect-and-count with persistence, and detect only.

use std::sync::Arc;

use tracing::Instrument;
use uuid::Uuid;

use crate::core::db::ObjectCountRepository;
use crate::detection::{DebugSink, NoopDebugSink, ObjectDetector, aggregate, filter_by_threshold};
use crate::error::{Error, Result, StoreFailure};
use crate::models::{CountResponse, Prediction};

/// Reject thresholds the score comparison cannot make sense of.
pub fn validate_threshold(threshold: f32) -> Result<()> {
    if threshold.is_nan() || !(0.0..=1.0).contains(&threshold) {
        return Err(Error::Validation(format!(
            "threshold must be within [0, 1], got {}",
            threshold
        )));
    }
    Ok(())
}

/// Run the detector and keep predictions scoring at least `threshold`.
/// Both the raw and the filtered predictions go to the debug sink.
async fn detect<D: ObjectDetector>(
    detector: &D,
    debug_sink: &dyn DebugSink,
    request_id: &Uuid,
    image: &[u8],
    threshold: f32,
) -> Result<Vec<Prediction>> {
    let predictions = detector.predict(image).await.inspect_err(|e| {
        tracing::warn!(error = %e, "Detector failed");
    })?;

    debug_sink.record(
        image,
        &predictions,
        &format!("{}_all_predictions", request_id),
    );

    let valid: Vec<Prediction> = filter_by_threshold(&predictions, threshold).cloned().collect();
    tracing::debug!(
        raw = predictions.len(),
        valid = valid.len(),
        threshold,
        "Filtered predictions"
    );

    debug_sink.record(
        image,
        &valid,
        &format!("{}_valid_predictions_with_threshold_{}", request_id, threshold),
    );

    Ok(valid)
}

/// Detects objects in an image, adds the per-class counts to the running
/// totals and returns both.
pub struct CountDetectedObjects<D, R> {
    detector: D,
    repo: R,
    debug_sink: Arc<dyn DebugSink>,
}

impl<D: ObjectDetector, R: ObjectCountRepository> CountDetectedObjects<D, R> {
    pub fn new(detector: D, repo: R) -> Self {
        Self {
            detector,
            repo,
            debug_sink: Arc::new(NoopDebugSink),
        }
    }

    pub fn with_debug_sink(mut self, debug_sink: Arc<dyn DebugSink>) -> Self {
        self.debug_sink = debug_sink;
        self
    }

    pub fn detector(&self) -> &D {
        &self.detector
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    /// A detector failure leaves every store untouched. A failed write is not
    /// rolled back on the stores that accepted it.
    pub async fn execute(&self, image: &[u8], threshold: f32) -> Result<CountResponse> {
        validate_threshold(threshold)?;
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!("count", request_id = %request_id);

        async {
            let valid =
                detect(&self.detector, self.debug_sink.as_ref(), &request_id, image, threshold)
                    .await?;
            let current_objects = aggregate(&valid);

            self.repo
                .update_values(&current_objects)
                .await
                .map_err(|err| into_persistence(err, self.repo.name()))?;

            let total_objects = self.repo.read_values(None).await?;

            tracing::info!(
                classes = current_objects.len(),
                objects = valid.len(),
                "Counted objects"
            );
            Ok::<_, Error>(CountResponse {
                current_objects,
                total_objects,
            })
        }
        .instrument(span)
        .await
    }
}

/// Write-path failures always surface as `Error::Persistence`.
fn into_persistence(err: Error, store: &str) -> Error {
    match err {
        Error::StoreUnavailable { store, message } => Error::Persistence {
            failures: vec![StoreFailure { store, message }],
        },
        Error::Persistence { .. } | Error::Validation(_) => err,
        other => Error::Persistence {
            failures: vec![StoreFailure {
                store: store.to_string(),
                message: other.to_string(),
            }],
        },
    }
}

/// Detects objects in an image without touching any store.
pub struct DetectObjects<D> {
    detector: D,
    debug_sink: Arc<dyn DebugSink>,
}

impl<D: ObjectDetector> DetectObjects<D> {
    pub fn new(detector: D) -> Self {
        Self {
            detector,
            debug_sink: Arc::new(NoopDebugSink),
        }
    }

    pub fn with_debug_sink(mut self, debug_sink: Arc<dyn DebugSink>) -> Self {
        self.debug_sink = debug_sink;
        self
    }

    pub async fn execute(&self, image: &[u8], threshold: f32) -> Result<Vec<Prediction>> {
        validate_threshold(threshold)?;
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!("detect", request_id = %request_id);

        detect(&self.detector, self.debug_sink.as_ref(), &request_id, image, threshold)
            .instrument(span)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_bounds() {
        assert!(validate_threshold(0.0).is_ok());
        assert!(validate_threshold(0.5).is_ok());
        assert!(validate_threshold(1.0).is_ok());
        assert!(matches!(validate_threshold(-0.01), Err(Error::Validation(_))));
        assert!(matches!(validate_threshold(1.01), Err(Error::Validation(_))));
        assert!(matches!(validate_threshold(f32::NAN), Err(Error::Validation(_))));
        assert!(matches!(
            validate_threshold(f32::INFINITY),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_unavailable_store_becomes_persistence() {
        let err = into_persistence(Error::store_unavailable("sqlite://a.db", "locked"), "fanout");
        match err {
            Error::Persistence { failures } => {
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].store, "sqlite://a.db");
                assert_eq!(failures[0].message, "locked");
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let err = into_persistence(Error::Validation("too long".to_string()), "memory");
        assert!(matches!(err, Error::Validation(_)));
    }
}
