use crate::ml::error::{MlError, MlResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Row-major RGB8 pixel grid.
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedImage {
    pub dimensions: Dimensions,
    pub rgb: Vec<u8>,
}

impl DecodedImage {
    pub fn new(width: u32, height: u32, rgb: Vec<u8>) -> MlResult<Self> {
        let expected_len = width as usize * height as usize * 3;
        if rgb.len() != expected_len {
            return Err(MlError::InvalidRequest(format!(
                "invalid RGB buffer length {}, expected {} for {}x{}",
                rgb.len(),
                expected_len,
                width,
                height
            )));
        }
        Ok(Self {
            dimensions: Dimensions { width, height },
            rgb,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.dimensions.width == 0 || self.dimensions.height == 0
    }
}

/// Axis-aligned pixel rectangle. Covers `[x, x + width) × [y, y + height)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    pub fn right(&self) -> u32 {
        self.x.saturating_add(self.width)
    }

    pub fn bottom(&self) -> u32 {
        self.y.saturating_add(self.height)
    }

    pub fn fits_within(&self, dimensions: Dimensions) -> bool {
        self.right() <= dimensions.width && self.bottom() <= dimensions.height
    }

    /// The part of the rect that lies inside an image of `dimensions`, or
    /// `None` when nothing does.
    pub fn intersect(&self, dimensions: Dimensions) -> Option<Rect> {
        let right = self.right().min(dimensions.width);
        let bottom = self.bottom().min(dimensions.height);
        if right <= self.x || bottom <= self.y {
            return None;
        }
        Some(Rect::new(self.x, self.y, right - self.x, bottom - self.y))
    }

    pub fn iou(&self, other: &Rect) -> f32 {
        let left = self.x.max(other.x);
        let top = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        if right <= left || bottom <= top {
            return 0.0;
        }

        let intersection = u64::from(right - left) * u64::from(bottom - top);
        let union = self.area() + other.area() - intersection;
        if union == 0 {
            return 0.0;
        }
        intersection as f32 / union as f32
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Detection {
    pub rect: Rect,
    pub confidence: f32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SelectionMode {
    /// Only the detection with the largest box.
    #[default]
    Largest,
    /// Every detection, largest first, capped at `max_faces`.
    All,
}

pub const DEFAULT_MIN_CONFIDENCE: f32 = 0.6;
pub const DEFAULT_MARGIN_PCT: f32 = 10.0;
pub const DEFAULT_MAX_FACES: usize = 5;

#[derive(Clone, Debug, PartialEq)]
pub struct CropRequest {
    pub min_confidence: f32,
    /// Extra border as a percentage of the box size, split evenly between
    /// opposite sides.
    pub margin_pct: f32,
    pub mode: SelectionMode,
    pub max_faces: usize,
}

impl Default for CropRequest {
    fn default() -> Self {
        Self {
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            margin_pct: DEFAULT_MARGIN_PCT,
            mode: SelectionMode::default(),
            max_faces: DEFAULT_MAX_FACES,
        }
    }
}

impl CropRequest {
    pub fn validate(&self) -> MlResult<()> {
        if !self.min_confidence.is_finite() || !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(MlError::InvalidRequest(format!(
                "min_confidence must be within [0, 1], got {}",
                self.min_confidence
            )));
        }
        if !self.margin_pct.is_finite() || self.margin_pct < 0.0 {
            return Err(MlError::InvalidRequest(format!(
                "margin_pct must be a non-negative number, got {}",
                self.margin_pct
            )));
        }
        if self.max_faces == 0 {
            return Err(MlError::InvalidRequest(
                "max_faces must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Number of crops the request may yield at most.
    pub fn crop_limit(&self) -> usize {
        match self.mode {
            SelectionMode::Largest => 1,
            SelectionMode::All => self.max_faces,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FaceCrop {
    pub detection: Detection,
    /// Margin-expanded, image-clamped region the pixels were taken from.
    pub rect: Rect,
    pub image: DecodedImage,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct CropResult {
    pub crops: Vec<FaceCrop>,
}

impl CropResult {
    pub fn is_empty(&self) -> bool {
        self.crops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.crops.len()
    }

    /// The largest face, if any survived filtering.
    pub fn main(&self) -> Option<&FaceCrop> {
        self.crops.first()
    }
}
