//! Deterministic mock providers.
//!
//! Drop-in substitutes for the model-backed family: identical signatures,
//! identical validation, identical dimensional and no-op contracts, with a
//! placeholder transform and bounded near-constant latency. The registry
//! installs them when real weights are missing, disabled, or impractical
//! on the probed device.

use std::thread;
use std::time::Duration;

use crate::{InpaintError, Mask, Raster, SelectionHint};

use super::{check_mask, check_prompt, check_selection, GenerativeFiller, MaskInpainter, Segmenter};

const DEFAULT_LATENCY: Duration = Duration::from_millis(5);

/// Half-size of the square window painted around each selection point.
fn window_half_size(raster: &Raster) -> i64 {
    (raster.width().min(raster.height()) as i64 / 8).max(4)
}

fn paint_window(mask: &mut Mask, x: i64, y: i64, half: i64, value: bool) {
    let y0 = (y - half).max(0);
    let y1 = (y + half).min(mask.height() as i64);
    let x0 = (x - half).max(0);
    let x1 = (x + half).min(mask.width() as i64);
    for wy in y0..y1 {
        for wx in x0..x1 {
            mask.set(wx as u32, wy as u32, value);
        }
    }
}

/// Mock segmenter: a fixed-size window around each inclusion point, minus
/// the windows around exclusion points.
pub struct MockSegmenter {
    latency: Duration,
}

impl MockSegmenter {
    pub fn new() -> Self {
        Self {
            latency: DEFAULT_LATENCY,
        }
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self { latency }
    }
}

impl Default for MockSegmenter {
    fn default() -> Self {
        Self::new()
    }
}

impl Segmenter for MockSegmenter {
    fn segment(&self, raster: &Raster, hint: &SelectionHint) -> Result<Mask, InpaintError> {
        check_selection(raster, hint)?;
        thread::sleep(self.latency);

        let half = window_half_size(raster);
        let mut mask = Mask::blank(raster.width(), raster.height());
        for (point, label) in hint.points.iter().zip(&hint.labels) {
            if label.is_include() && raster.contains(point) {
                paint_window(&mut mask, point.x as i64, point.y as i64, half, true);
            }
        }
        for (point, label) in hint.points.iter().zip(&hint.labels) {
            if !label.is_include() && raster.contains(point) {
                paint_window(&mut mask, point.x as i64, point.y as i64, half, false);
            }
        }
        Ok(mask.dilated(hint.dilate_radius))
    }
}

/// Mock inpainter: replaces the masked region with the mean colour of the
/// unmasked pixels. Pixels outside the mask are byte-identical to the
/// input, which makes this a faithful test double for the no-op contract.
pub struct MockInpainter {
    latency: Duration,
}

impl MockInpainter {
    pub fn new() -> Self {
        Self {
            latency: DEFAULT_LATENCY,
        }
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self { latency }
    }
}

impl Default for MockInpainter {
    fn default() -> Self {
        Self::new()
    }
}

impl MaskInpainter for MockInpainter {
    fn inpaint(&self, raster: &Raster, mask: &Mask) -> Result<Raster, InpaintError> {
        check_mask(raster, mask)?;
        thread::sleep(self.latency);

        let mut sums = [0u64; 3];
        let mut count = 0u64;
        for y in 0..raster.height() {
            for x in 0..raster.width() {
                if !mask.get(x, y) {
                    let rgb = raster.pixel(x, y);
                    sums[0] += rgb[0] as u64;
                    sums[1] += rgb[1] as u64;
                    sums[2] += rgb[2] as u64;
                    count += 1;
                }
            }
        }
        // A fully masked raster has no surrounding context; fall back to
        // mid grey rather than divide by zero.
        let fill = if count == 0 {
            [128, 128, 128]
        } else {
            [
                (sums[0] / count) as u8,
                (sums[1] / count) as u8,
                (sums[2] / count) as u8,
            ]
        };

        let mut output = raster.clone();
        for y in 0..raster.height() {
            for x in 0..raster.width() {
                if mask.get(x, y) {
                    output.set_pixel(x, y, fill);
                }
            }
        }
        Ok(output)
    }
}

/// Mock generative filler: floods the masked region with a colour chosen
/// deterministically from prompt keywords.
pub struct MockGenerator {
    latency: Duration,
}

impl MockGenerator {
    pub fn new() -> Self {
        Self {
            latency: DEFAULT_LATENCY,
        }
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self { latency }
    }
}

impl Default for MockGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Keyword-to-colour mapping used by the mock generator.
pub fn prompt_colour(prompt: &str) -> [u8; 3] {
    let lowered = prompt.to_lowercase();
    if lowered.contains("red") {
        [255, 0, 0]
    } else if lowered.contains("blue") {
        [0, 0, 255]
    } else if lowered.contains("green") {
        [0, 255, 0]
    } else if lowered.contains("flower") {
        [255, 192, 203]
    } else if lowered.contains("sky") {
        [135, 206, 235]
    } else {
        [128, 128, 128]
    }
}

impl GenerativeFiller for MockGenerator {
    fn generate(
        &self,
        raster: &Raster,
        mask: &Mask,
        prompt: &str,
    ) -> Result<Raster, InpaintError> {
        check_prompt(prompt)?;
        check_mask(raster, mask)?;
        thread::sleep(self.latency);

        let fill = prompt_colour(prompt);
        let mut output = raster.clone();
        for y in 0..raster.height() {
            for x in 0..raster.width() {
                if mask.get(x, y) {
                    output.set_pixel(x, y, fill);
                }
            }
        }
        Ok(output)
    }
}
