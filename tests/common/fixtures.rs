use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use counter::config::SqliteConfig;
use counter::core::db::{InMemoryCountRepo, ObjectCountRepository, SqliteCountRepo};
use counter::detection::ObjectDetector;
use counter::{BoundingBox, DetectionError, Error, ObjectCount, Prediction, Result};
use image::{ImageBuffer, Rgb};

/// Encodes a 64x64 red PNG, enough for any detector that ignores content.
pub fn create_test_image() -> Vec<u8> {
    let img = ImageBuffer::from_fn(64, 64, |_, _| Rgb([255u8, 0u8, 0u8]));
    let mut bytes = std::io::Cursor::new(Vec::new());
    img.write_to(&mut bytes, image::ImageFormat::Png)
        .expect("Failed to encode test image");
    bytes.into_inner()
}

/// A prediction covering the middle of the image.
pub fn prediction(class_name: &str, score: f32) -> Prediction {
    Prediction {
        class_name: class_name.to_string(),
        score,
        bbox: BoundingBox {
            xmin: 0.25,
            ymin: 0.25,
            xmax: 0.75,
            ymax: 0.75,
        },
    }
}

pub fn counts(pairs: &[(&str, u64)]) -> Vec<ObjectCount> {
    pairs
        .iter()
        .map(|(object_class, count)| ObjectCount::new(*object_class, *count))
        .collect()
}

/// Opens (or creates) a counter table in the given SQLite file.
pub fn open_sqlite_repo(path: &Path) -> SqliteCountRepo {
    SqliteCountRepo::new(
        SqliteConfig {
            path: path.to_path_buf(),
            table: "counter".to_string(),
        },
        Duration::from_secs(5),
    )
    .expect("Failed to create SQLite repository")
}

/// Creates a SQLite repository in a fresh temp directory.
/// Returns both the repository and the directory (which must be kept alive).
pub fn create_sqlite_repo() -> (SqliteCountRepo, tempfile::TempDir) {
    let dir = tempfile::TempDir::new().expect("Failed to create temp directory");
    let repo = open_sqlite_repo(&dir.path().join("counter.db"));
    (repo, dir)
}

/// In-memory store that can be switched into a failing state.
#[derive(Debug)]
pub struct FlakyRepo {
    name: String,
    inner: InMemoryCountRepo,
    failing: AtomicBool,
}

impl FlakyRepo {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            inner: InMemoryCountRepo::new(),
            failing: AtomicBool::new(false),
        }
    }

    pub fn failing(name: &str) -> Self {
        let repo = Self::new(name);
        repo.set_failing(true);
        repo
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Totals as stored, regardless of the failure switch.
    pub async fn snapshot(&self) -> Vec<ObjectCount> {
        self.inner
            .read_values(None)
            .await
            .expect("In-memory reads do not fail")
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(Error::store_unavailable(&self.name, "connection refused"))
        } else {
            Ok(())
        }
    }
}

impl ObjectCountRepository for FlakyRepo {
    fn name(&self) -> &str {
        &self.name
    }

    async fn read_values(&self, object_classes: Option<&[String]>) -> Result<Vec<ObjectCount>> {
        self.check()?;
        self.inner.read_values(object_classes).await
    }

    async fn update_values(&self, new_values: &[ObjectCount]) -> Result<()> {
        self.check()?;
        self.inner.update_values(new_values).await
    }
}

/// Detector that is always unreachable.
#[derive(Debug, Default)]
pub struct FailingDetector {
    calls: AtomicUsize,
}

impl FailingDetector {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ObjectDetector for FailingDetector {
    async fn predict(&self, _image: &[u8]) -> std::result::Result<Vec<Prediction>, DetectionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(DetectionError::Transport("connection refused".to_string()))
    }
}
