//! ONNX Runtime backed providers for the model-backed family.
//!
//! One session per capability, loaded once from an exported checkpoint.
//! Inputs are resized to the model's square working resolution, run as
//! NCHW tensors, and results are resized back so every provider honours
//! the dimensional contract regardless of the model's native resolution.

use std::collections::hash_map::DefaultHasher;
use std::hash::Hasher;
use std::path::Path;
use std::sync::Mutex;

use image::imageops;
use ndarray::{Array2, Array3, Array4};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::TensorRef;

use crate::codec::{raster_from_rgb, rgb_from_raster};
use crate::registry::device::ComputeDevice;
use crate::{CapabilityKind, InpaintError, Mask, Raster, SelectionHint};

use super::{check_mask, check_prompt, check_selection, GenerativeFiller, MaskInpainter, Segmenter};

/// Square working resolution of the exported checkpoints.
const MODEL_INPUT_SIZE: u32 = 512;
/// Threshold above which a matte value counts as a positive mask pixel.
const MATTE_THRESHOLD: f32 = 0.5;
/// Width of the conditioning vector the generative checkpoint expects.
const PROMPT_EMBED_DIM: usize = 64;
const INTRA_THREADS: usize = 4;

fn provider_fault(kind: CapabilityKind, err: impl std::fmt::Display) -> InpaintError {
    InpaintError::ProviderFault {
        kind,
        message: err.to_string(),
    }
}

fn build_session(
    kind: CapabilityKind,
    checkpoint: &Path,
    device: ComputeDevice,
) -> Result<Session, InpaintError> {
    if !checkpoint.exists() {
        return Err(InpaintError::Config(format!(
            "{kind} checkpoint not found: {}",
            checkpoint.display()
        )));
    }

    tracing::info!(capability = %kind, checkpoint = %checkpoint.display(), %device, "loading session");

    let mut builder = Session::builder()
        .map_err(|err| provider_fault(kind, err))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|err| provider_fault(kind, err))?
        .with_intra_threads(INTRA_THREADS)
        .map_err(|err| provider_fault(kind, err))?;
    if device == ComputeDevice::Accelerated {
        use ort::execution_providers::{CUDAExecutionProvider, ExecutionProvider as _};
        builder = builder
            .with_execution_providers([CUDAExecutionProvider::default().build()])
            .map_err(|err| provider_fault(kind, err))?;
    }
    builder
        .commit_from_file(checkpoint)
        .map_err(|err| provider_fault(kind, err))
}

/// Resizes a raster and converts it to a normalized `[1, 3, H, W]` tensor.
fn raster_to_nchw(raster: &Raster, size: u32) -> Result<Array4<f32>, InpaintError> {
    let rgb = rgb_from_raster(raster)?;
    let resized = if rgb.dimensions() != (size, size) {
        imageops::resize(&rgb, size, size, imageops::FilterType::Lanczos3)
    } else {
        rgb
    };
    let mut tensor = Array4::<f32>::zeros((1, 3, size as usize, size as usize));
    for y in 0..size {
        for x in 0..size {
            let pixel = resized.get_pixel(x, y);
            tensor[[0, 0, y as usize, x as usize]] = pixel[0] as f32 / 255.0;
            tensor[[0, 1, y as usize, x as usize]] = pixel[1] as f32 / 255.0;
            tensor[[0, 2, y as usize, x as usize]] = pixel[2] as f32 / 255.0;
        }
    }
    Ok(tensor)
}

/// Nearest-samples a mask into a `[1, 1, H, W]` tensor at the model size.
fn mask_to_nchw(mask: &Mask, size: u32) -> Array4<f32> {
    let mut tensor = Array4::<f32>::zeros((1, 1, size as usize, size as usize));
    for y in 0..size {
        for x in 0..size {
            let sx = (x as u64 * mask.width() as u64 / size as u64) as u32;
            let sy = (y as u64 * mask.height() as u64 / size as u64) as u32;
            if mask.get(sx.min(mask.width() - 1), sy.min(mask.height() - 1)) {
                tensor[[0, 0, y as usize, x as usize]] = 1.0;
            }
        }
    }
    tensor
}

/// Converts a flat `[1, 3, H, W]` output back into a raster at the model
/// size, then resizes to the requested dimensions.
fn nchw_to_raster(
    kind: CapabilityKind,
    values: &[f32],
    size: u32,
    out_width: u32,
    out_height: u32,
) -> Result<Raster, InpaintError> {
    let plane = size as usize * size as usize;
    if values.len() != 3 * plane {
        return Err(provider_fault(
            kind,
            format!("unexpected output tensor length {}", values.len()),
        ));
    }
    let rgb = image::RgbImage::from_fn(size, size, |x, y| {
        let idx = y as usize * size as usize + x as usize;
        image::Rgb([
            (values[idx] * 255.0).clamp(0.0, 255.0) as u8,
            (values[plane + idx] * 255.0).clamp(0.0, 255.0) as u8,
            (values[2 * plane + idx] * 255.0).clamp(0.0, 255.0) as u8,
        ])
    });
    let resized = if (out_width, out_height) != (size, size) {
        imageops::resize(&rgb, out_width, out_height, imageops::FilterType::Lanczos3)
    } else {
        rgb
    };
    raster_from_rgb(resized)
}

/// Resizes a flat matte at the model resolution back to raster dimensions
/// and thresholds it into a binary mask.
fn matte_to_mask(
    kind: CapabilityKind,
    matte: &[f32],
    size: u32,
    out_width: u32,
    out_height: u32,
) -> Result<Mask, InpaintError> {
    if matte.len() < size as usize * size as usize {
        return Err(provider_fault(
            kind,
            format!("unexpected matte tensor length {}", matte.len()),
        ));
    }
    let gray = image::GrayImage::from_fn(size, size, |x, y| {
        let idx = y as usize * size as usize + x as usize;
        image::Luma([(matte[idx] * 255.0).clamp(0.0, 255.0) as u8])
    });
    let resized = if (out_width, out_height) != (size, size) {
        imageops::resize(&gray, out_width, out_height, imageops::FilterType::Lanczos3)
    } else {
        gray
    };
    let mut mask = Mask::blank(out_width, out_height);
    for y in 0..out_height {
        for x in 0..out_width {
            if resized.get_pixel(x, y)[0] as f32 / 255.0 > MATTE_THRESHOLD {
                mask.set(x, y, true);
            }
        }
    }
    Ok(mask)
}

/// Copies model output inside the mask and input pixels outside it, so the
/// no-op-outside-mask contract holds exactly even for lossy models.
fn composite(input: &Raster, synthesized: &Raster, mask: &Mask) -> Raster {
    let mut output = input.clone();
    for y in 0..input.height() {
        for x in 0..input.width() {
            if mask.get(x, y) {
                output.set_pixel(x, y, synthesized.pixel(x, y));
            }
        }
    }
    output
}

/// Folds a free-text prompt into the fixed-width conditioning vector the
/// exported generative checkpoint was trained against.
fn embed_prompt(prompt: &str) -> Array2<f32> {
    let mut bins = vec![0f32; PROMPT_EMBED_DIM];
    for token in prompt.split_whitespace() {
        let mut hasher = DefaultHasher::new();
        hasher.write(token.to_lowercase().as_bytes());
        bins[(hasher.finish() % PROMPT_EMBED_DIM as u64) as usize] += 1.0;
    }
    let norm = bins.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in bins.iter_mut() {
            *v /= norm;
        }
    }
    Array2::from_shape_vec((1, PROMPT_EMBED_DIM), bins)
        .unwrap_or_else(|_| Array2::zeros((1, PROMPT_EMBED_DIM)))
}

/// Point-prompted segmentation session.
pub struct OnnxSegmenter {
    session: Mutex<Session>,
}

impl OnnxSegmenter {
    pub fn from_file(checkpoint: &Path, device: ComputeDevice) -> Result<Self, InpaintError> {
        let session = build_session(CapabilityKind::Segmentation, checkpoint, device)?;
        Ok(Self {
            session: Mutex::new(session),
        })
    }
}

impl Segmenter for OnnxSegmenter {
    fn segment(&self, raster: &Raster, hint: &SelectionHint) -> Result<Mask, InpaintError> {
        let kind = CapabilityKind::Segmentation;
        check_selection(raster, hint)?;

        let image = raster_to_nchw(raster, MODEL_INPUT_SIZE)?;
        let scale_x = MODEL_INPUT_SIZE as f32 / raster.width() as f32;
        let scale_y = MODEL_INPUT_SIZE as f32 / raster.height() as f32;
        let count = hint.points.len();
        let mut coords = Array3::<f32>::zeros((1, count, 2));
        let mut labels = Array2::<f32>::zeros((1, count));
        for (i, (point, label)) in hint.points.iter().zip(&hint.labels).enumerate() {
            coords[[0, i, 0]] = point.x * scale_x;
            coords[[0, i, 1]] = point.y * scale_y;
            labels[[0, i]] = if label.is_include() { 1.0 } else { 0.0 };
        }

        let mut session = self
            .session
            .lock()
            .map_err(|_| provider_fault(kind, "session lock poisoned"))?;
        let outputs = session
            .run(ort::inputs![
                TensorRef::from_array_view(image.view())
                    .map_err(|err| provider_fault(kind, err))?,
                TensorRef::from_array_view(coords.view())
                    .map_err(|err| provider_fault(kind, err))?,
                TensorRef::from_array_view(labels.view())
                    .map_err(|err| provider_fault(kind, err))?,
            ])
            .map_err(|err| provider_fault(kind, err))?;
        let matte = outputs[0]
            .try_extract_array::<f32>()
            .map_err(|err| provider_fault(kind, err))?;
        let values: Vec<f32> = matte.view().iter().copied().collect();

        let mask = matte_to_mask(
            kind,
            &values,
            MODEL_INPUT_SIZE,
            raster.width(),
            raster.height(),
        )?;
        Ok(mask.dilated(hint.dilate_radius))
    }
}

/// Context-driven inpainting session.
pub struct OnnxInpainter {
    session: Mutex<Session>,
}

impl OnnxInpainter {
    pub fn from_file(checkpoint: &Path, device: ComputeDevice) -> Result<Self, InpaintError> {
        let session = build_session(CapabilityKind::MaskInpaint, checkpoint, device)?;
        Ok(Self {
            session: Mutex::new(session),
        })
    }
}

impl MaskInpainter for OnnxInpainter {
    fn inpaint(&self, raster: &Raster, mask: &Mask) -> Result<Raster, InpaintError> {
        let kind = CapabilityKind::MaskInpaint;
        check_mask(raster, mask)?;

        let image = raster_to_nchw(raster, MODEL_INPUT_SIZE)?;
        let mask_tensor = mask_to_nchw(mask, MODEL_INPUT_SIZE);

        let mut session = self
            .session
            .lock()
            .map_err(|_| provider_fault(kind, "session lock poisoned"))?;
        let outputs = session
            .run(ort::inputs![
                TensorRef::from_array_view(image.view())
                    .map_err(|err| provider_fault(kind, err))?,
                TensorRef::from_array_view(mask_tensor.view())
                    .map_err(|err| provider_fault(kind, err))?,
            ])
            .map_err(|err| provider_fault(kind, err))?;
        let tensor = outputs[0]
            .try_extract_array::<f32>()
            .map_err(|err| provider_fault(kind, err))?;
        let values: Vec<f32> = tensor.view().iter().copied().collect();

        let synthesized = nchw_to_raster(
            kind,
            &values,
            MODEL_INPUT_SIZE,
            raster.width(),
            raster.height(),
        )?;
        Ok(composite(raster, &synthesized, mask))
    }
}

/// Prompt-conditioned generative fill session.
pub struct OnnxGenerator {
    session: Mutex<Session>,
}

impl OnnxGenerator {
    pub fn from_file(checkpoint: &Path, device: ComputeDevice) -> Result<Self, InpaintError> {
        let session = build_session(CapabilityKind::GenerativeFill, checkpoint, device)?;
        Ok(Self {
            session: Mutex::new(session),
        })
    }
}

impl GenerativeFiller for OnnxGenerator {
    fn generate(
        &self,
        raster: &Raster,
        mask: &Mask,
        prompt: &str,
    ) -> Result<Raster, InpaintError> {
        let kind = CapabilityKind::GenerativeFill;
        check_prompt(prompt)?;
        check_mask(raster, mask)?;

        let image = raster_to_nchw(raster, MODEL_INPUT_SIZE)?;
        let mask_tensor = mask_to_nchw(mask, MODEL_INPUT_SIZE);
        let embedding = embed_prompt(prompt);

        let mut session = self
            .session
            .lock()
            .map_err(|_| provider_fault(kind, "session lock poisoned"))?;
        let outputs = session
            .run(ort::inputs![
                TensorRef::from_array_view(image.view())
                    .map_err(|err| provider_fault(kind, err))?,
                TensorRef::from_array_view(mask_tensor.view())
                    .map_err(|err| provider_fault(kind, err))?,
                TensorRef::from_array_view(embedding.view())
                    .map_err(|err| provider_fault(kind, err))?,
            ])
            .map_err(|err| provider_fault(kind, err))?;
        let tensor = outputs[0]
            .try_extract_array::<f32>()
            .map_err(|err| provider_fault(kind, err))?;
        let values: Vec<f32> = tensor.view().iter().copied().collect();

        let synthesized = nchw_to_raster(
            kind,
            &values,
            MODEL_INPUT_SIZE,
            raster.width(),
            raster.height(),
        )?;
        Ok(composite(raster, &synthesized, mask))
    }
}
