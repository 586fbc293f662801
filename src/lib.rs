pub mod actions;
pub mod config;
pub mod core;
pub mod detection;
pub mod error;
pub mod models;

pub use actions::{CountDetectedObjects, DetectObjects};
pub use config::AppConfig;
pub use core::db::{CountRepository, FanOutCountRepo, ObjectCountRepository};
pub use detection::{Detector, ObjectDetector};
pub use error::{DetectionError, Error, Result};
pub use models::{BoundingBox, CountResponse, ObjectCount, Prediction};
