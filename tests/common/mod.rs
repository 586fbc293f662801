mod fixtures;
pub use fixtures::*;

// Re-export commonly used types from counter for tests
pub use counter::core::db::{
    CountRepository, FanOutCountRepo, InMemoryCountRepo, ObjectCountRepository, SqliteCountRepo,
};
pub use counter::detection::{FakeObjectDetector, ObjectDetector};
pub use counter::{CountDetectedObjects, DetectObjects, Error, ObjectCount};
