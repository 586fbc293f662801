pub mod debug;
pub mod fake;
pub mod labels;
pub mod predictions;
pub mod tfs;

use std::future::Future;

use crate::error::DetectionError;
use crate::models::Prediction;

pub use debug::{DebugSink, ImageDebugSink, NoopDebugSink};
pub use fake::FakeObjectDetector;
pub use predictions::{aggregate, filter_by_threshold};
pub use tfs::TfServingDetector;

/// Remote or local object-detection model.
pub trait ObjectDetector: Send + Sync {
    /// Raw, unfiltered predictions for an encoded image.
    fn predict(
        &self,
        image: &[u8],
    ) -> impl Future<Output = Result<Vec<Prediction>, DetectionError>> + Send;
}

/// The detector selected by configuration.
#[derive(Debug)]
pub enum Detector {
    Fake(FakeObjectDetector),
    TfServing(TfServingDetector),
}

impl ObjectDetector for Detector {
    async fn predict(&self, image: &[u8]) -> Result<Vec<Prediction>, DetectionError> {
        match self {
            Detector::Fake(detector) => detector.predict(image).await,
            Detector::TfServing(detector) => detector.predict(image).await,
        }
    }
}

impl<D: ObjectDetector> ObjectDetector for std::sync::Arc<D> {
    fn predict(
        &self,
        image: &[u8],
    ) -> impl Future<Output = Result<Vec<Prediction>, DetectionError>> + Send {
        (**self).predict(image)
    }
}
