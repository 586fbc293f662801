use serde::{Deserialize, Serialize};

/// Detection box, normalized to the image size (0.0 ..= 1.0)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub xmin: f32,
    pub ymin: f32,
    pub xmax: f32,
    pub ymax: f32,
}

impl BoundingBox {
    pub fn width(&self) -> f32 {
        self.xmax - self.xmin
    }

    pub fn height(&self) -> f32 {
        self.ymax - self.ymin
    }

    /// Pixel rectangle `(x, y, width, height)` inside an image of the given size.
    /// Returns `None` for boxes that collapse to nothing once clamped.
    pub fn to_pixels(&self, img_width: u32, img_height: u32) -> Option<(i32, i32, u32, u32)> {
        let w = img_width as f32;
        let h = img_height as f32;
        let x1 = (self.xmin.clamp(0.0, 1.0) * w) as i32;
        let y1 = (self.ymin.clamp(0.0, 1.0) * h) as i32;
        let x2 = (self.xmax.clamp(0.0, 1.0) * w) as i32;
        let y2 = (self.ymax.clamp(0.0, 1.0) * h) as i32;
        if x2 <= x1 || y2 <= y1 {
            return None;
        }
        Some((x1, y1, (x2 - x1) as u32, (y2 - y1) as u32))
    }
}

/// One detected object instance as reported by the detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub class_name: String,
    pub score: f32,
    #[serde(rename = "box")]
    pub bbox: BoundingBox,
}

/// Count for one object class. Depending on where it comes from this is either
/// the delta found in a single image or the running total for the class.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectCount {
    pub object_class: String,
    pub count: u64,
}

impl ObjectCount {
    pub fn new(object_class: impl Into<String>, count: u64) -> Self {
        Self {
            object_class: object_class.into(),
            count,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountResponse {
    /// Objects found in the latest image
    pub current_objects: Vec<ObjectCount>,
    /// Running totals for every class seen so far
    pub total_objects: Vec<ObjectCount>,
}
