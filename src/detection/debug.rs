use std::path::{Path, PathBuf};

use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

use crate::models::Prediction;

const BOX_COLOR: Rgb<u8> = Rgb([255, 0, 0]);

/// Receives annotated copies of processed images for offline inspection.
///
/// Recording is best effort: implementations log their own failures and
/// never fail the request that produced the image.
pub trait DebugSink: Send + Sync {
    fn record(&self, image: &[u8], predictions: &[Prediction], artifact_name: &str);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopDebugSink;

impl DebugSink for NoopDebugSink {
    fn record(&self, _image: &[u8], _predictions: &[Prediction], _artifact_name: &str) {}
}

/// Draws every prediction box onto the image and writes `<name>.jpg`
/// into an output directory.
#[derive(Debug, Clone)]
pub struct ImageDebugSink {
    output_dir: PathBuf,
}

impl ImageDebugSink {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn write(
        &self,
        image: &[u8],
        predictions: &[Prediction],
        artifact_name: &str,
    ) -> anyhow::Result<PathBuf> {
        let mut canvas = image::load_from_memory(image)?.to_rgb8();
        draw_boxes(&mut canvas, predictions);

        std::fs::create_dir_all(&self.output_dir)?;
        let path = self.output_dir.join(format!("{}.jpg", artifact_name));
        canvas.save(&path)?;
        Ok(path)
    }
}

fn draw_boxes(canvas: &mut RgbImage, predictions: &[Prediction]) {
    let (width, height) = canvas.dimensions();
    for prediction in predictions {
        if let Some((x, y, w, h)) = prediction.bbox.to_pixels(width, height) {
            draw_hollow_rect_mut(canvas, Rect::at(x, y).of_size(w, h), BOX_COLOR);
        }
    }
}

impl DebugSink for ImageDebugSink {
    fn record(&self, image: &[u8], predictions: &[Prediction], artifact_name: &str) {
        match self.write(image, predictions, artifact_name) {
            Ok(path) => tracing::debug!(path = %path.display(), "Saved debug artifact"),
            Err(e) => tracing::warn!(
                artifact = artifact_name,
                error = %e,
                "Failed to save debug artifact"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BoundingBox;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let mut bytes = std::io::Cursor::new(Vec::new());
        RgbImage::new(width, height)
            .write_to(&mut bytes, image::ImageFormat::Png)
            .unwrap();
        bytes.into_inner()
    }

    fn cat() -> Prediction {
        Prediction {
            class_name: "cat".to_string(),
            score: 0.9,
            bbox: BoundingBox {
                xmin: 0.25,
                ymin: 0.25,
                xmax: 0.75,
                ymax: 0.75,
            },
        }
    }

    #[test]
    fn test_draw_boxes_marks_outline() {
        let mut canvas = RgbImage::new(40, 40);
        draw_boxes(&mut canvas, &[cat()]);
        assert_eq!(*canvas.get_pixel(10, 10), BOX_COLOR);
        assert_eq!(*canvas.get_pixel(20, 20), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_record_writes_named_file() {
        let dir = tempfile::tempdir().unwrap();
        let sink = ImageDebugSink::new(dir.path().join("debug"));

        sink.record(&png(32, 32), &[cat()], "abc_all_predictions");

        assert!(dir.path().join("debug/abc_all_predictions.jpg").exists());
    }

    #[test]
    fn test_record_swallows_bad_image() {
        let dir = tempfile::tempdir().unwrap();
        let sink = ImageDebugSink::new(dir.path());

        sink.record(b"garbage", &[cat()], "broken");

        assert!(!dir.path().join("broken.jpg").exists());
    }
}
