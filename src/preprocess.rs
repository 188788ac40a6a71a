// file: preprocess.rs
// desc: turn a freehand canvas raster into the square tensor the classifier expects

use crate::error::RecognizeError;

/// Channel values at or above this are treated as paper, anything darker is ink.
pub const INK_THRESHOLD: u8 = 250;
/// Margin kept around the ink before squaring.
pub const CROP_PADDING: usize = 10;
/// Background fill used while the raster is still white-on-black.
pub const BACKGROUND: u8 = 255;

const MAX_SAMPLE: f32 = 255.0;

/// Numeric policy of the preprocessing chain for one classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreprocessConfig {
    /// Edge of the square input the classifier takes (64 for the bundled model)
    pub input_edge: usize,
    /// Padding around the ink bounding box, in raster pixels
    pub padding: usize,
    pub ink_threshold: u8,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            input_edge: 64,
            padding: CROP_PADDING,
            ink_threshold: INK_THRESHOLD,
        }
    }
}

/// Borrowed view over canvas pixels, row-major, `channels` samples per pixel.
///
/// Accepts grayscale (1), RGB (3) and RGBA (4) layouts. The view is never
/// written to; everything derived from it is a copy.
#[derive(Debug, Clone, Copy)]
pub struct Raster<'a> {
    data: &'a [u8],
    width: usize,
    height: usize,
    channels: usize,
}

impl<'a> Raster<'a> {
    pub fn new(
        data: &'a [u8],
        width: usize,
        height: usize,
        channels: usize,
    ) -> Result<Self, RecognizeError> {
        let expected = width
            .checked_mul(height)
            .and_then(|pixels| pixels.checked_mul(channels));

        if width == 0 || height == 0 || !matches!(channels, 1 | 3 | 4) || expected != Some(data.len())
        {
            return Err(RecognizeError::InvalidRaster {
                width,
                height,
                channels,
                len: data.len(),
            });
        }

        Ok(Self {
            data,
            width,
            height,
            channels,
        })
    }

    /// Canvas `ImageData` layout.
    pub fn rgba(data: &'a [u8], width: usize, height: usize) -> Result<Self, RecognizeError> {
        Self::new(data, width, height, 4)
    }

    pub fn gray(data: &'a [u8], width: usize, height: usize) -> Result<Self, RecognizeError> {
        Self::new(data, width, height, 1)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    fn pixel(&self, x: usize, y: usize) -> &'a [u8] {
        let start = (y * self.width + x) * self.channels;
        &self.data[start..start + self.channels]
    }

    /// Single-channel value of a pixel: its first sample (red for colour rasters).
    pub fn sample(&self, x: usize, y: usize) -> u8 {
        self.data[(y * self.width + x) * self.channels]
    }

    /// A pixel is ink when any colour sample is below `threshold`; alpha is ignored.
    pub fn is_ink(&self, x: usize, y: usize, threshold: u8) -> bool {
        self.pixel(x, y).iter().take(3).any(|&v| v < threshold)
    }
}

/// Tight inclusive rectangle around the ink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub min_x: usize,
    pub min_y: usize,
    pub max_x: usize,
    pub max_y: usize,
}

impl BoundingBox {
    pub fn width(&self) -> usize {
        self.max_x - self.min_x + 1
    }

    pub fn height(&self) -> usize {
        self.max_y - self.min_y + 1
    }
}

/// Scan for ink with the default threshold. `None` means nothing was drawn.
pub fn extract_bounds(raster: &Raster<'_>) -> Option<BoundingBox> {
    extract_bounds_with(raster, INK_THRESHOLD)
}

pub fn extract_bounds_with(raster: &Raster<'_>, threshold: u8) -> Option<BoundingBox> {
    let mut min_x = raster.width;
    let mut max_x = 0;
    let mut min_y = raster.height;
    let mut max_y = 0;
    let mut found = false;

    for y in 0..raster.height {
        for x in 0..raster.width {
            if raster.is_ink(x, y, threshold) {
                found = true;
                min_x = min_x.min(x);
                max_x = max_x.max(x);
                min_y = min_y.min(y);
                max_y = max_y.max(y);
            }
        }
    }

    if found {
        Some(BoundingBox {
            min_x,
            min_y,
            max_x,
            max_y,
        })
    } else {
        None
    }
}

/// Region of the raster that gets squared and resampled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRegion {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

/// Expand `bounds` by `padding`, clamped to the raster.
///
/// The extent is the box span plus twice the padding, cut at the raster
/// edge; a box touching the leading edge keeps the full extent, so the
/// trailing margin grows by what the leading margin lost.
pub fn crop_region(
    bounds: &BoundingBox,
    raster_width: usize,
    raster_height: usize,
    padding: usize,
) -> CropRegion {
    let x = bounds.min_x.saturating_sub(padding);
    let y = bounds.min_y.saturating_sub(padding);
    let width = (raster_width - x)
        .min(bounds.max_x - bounds.min_x + 2 * padding)
        .max(1);
    let height = (raster_height - y)
        .min(bounds.max_y - bounds.min_y + 2 * padding)
        .max(1);

    CropRegion {
        x,
        y,
        width,
        height,
    }
}

/// Split the padding needed to grow `shorter` to `side`; the odd pixel goes last.
pub fn pad_split(shorter: usize, side: usize) -> (usize, usize) {
    let total = side.saturating_sub(shorter);
    let before = total / 2;
    (before, total - before)
}

/// Classifier input: `edge x edge` single-channel values in `[0, 1]`,
/// ink high and background low.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalTensor {
    edge: usize,
    values: Vec<f32>,
}

impl CanonicalTensor {
    pub fn edge(&self) -> usize {
        self.edge
    }

    /// Row-major values, `edge * edge` long.
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn value(&self, x: usize, y: usize) -> f32 {
        self.values[y * self.edge + x]
    }

    pub fn into_values(self) -> Vec<f32> {
        self.values
    }

    /// Total ink intensity.
    pub fn mass(&self) -> f32 {
        self.values.iter().sum()
    }
}

/// Crop, square, resample, invert and normalize with the default padding.
pub fn canonicalize(raster: &Raster<'_>, bounds: &BoundingBox, edge: usize) -> CanonicalTensor {
    canonicalize_with(
        raster,
        bounds,
        &PreprocessConfig {
            input_edge: edge,
            ..PreprocessConfig::default()
        },
    )
}

pub fn canonicalize_with(
    raster: &Raster<'_>,
    bounds: &BoundingBox,
    config: &PreprocessConfig,
) -> CanonicalTensor {
    let edge = config.input_edge.max(1);
    let crop = crop_region(bounds, raster.width, raster.height, config.padding);
    let (side, square) = square_crop(raster, &crop);

    let values = resample_bilinear(&square, side, edge)
        .into_iter()
        .map(|v| ((MAX_SAMPLE - v) / MAX_SAMPLE).clamp(0.0, 1.0))
        .collect();

    CanonicalTensor { edge, values }
}

// Copy the crop into a background-filled square, centred on the shorter axis.
fn square_crop(raster: &Raster<'_>, crop: &CropRegion) -> (usize, Vec<u8>) {
    let side = crop.width.max(crop.height);
    let (pad_x, _) = pad_split(crop.width, side);
    let (pad_y, _) = pad_split(crop.height, side);

    let mut square = vec![BACKGROUND; side * side];
    for row in 0..crop.height {
        let dst = (pad_y + row) * side + pad_x;
        for col in 0..crop.width {
            square[dst + col] = raster.sample(crop.x + col, crop.y + row);
        }
    }

    (side, square)
}

// Bilinear resize of a square, no corner alignment and no half-pixel offset:
// output pixel `o` reads source coordinate `o * side / edge`.
fn resample_bilinear(src: &[u8], side: usize, edge: usize) -> Vec<f32> {
    let scale = side as f32 / edge as f32;
    let at = |x: usize, y: usize| f32::from(src[y * side + x]);

    let mut out = Vec::with_capacity(edge * edge);
    for oy in 0..edge {
        let sy = oy as f32 * scale;
        let y0 = (sy.floor() as usize).min(side - 1);
        let y1 = (y0 + 1).min(side - 1);
        let fy = sy - y0 as f32;

        for ox in 0..edge {
            let sx = ox as f32 * scale;
            let x0 = (sx.floor() as usize).min(side - 1);
            let x1 = (x0 + 1).min(side - 1);
            let fx = sx - x0 as f32;

            let top = at(x0, y0) + (at(x1, y0) - at(x0, y0)) * fx;
            let bottom = at(x0, y1) + (at(x1, y1) - at(x0, y1)) * fx;
            out.push(top + (bottom - top) * fy);
        }
    }

    out
}
