//! Capability provider contracts shared by the real and mock families.
//!
//! Provider bodies are blocking; the orchestrator always runs them inside
//! dispatcher worker slots. Both families enforce the same input checks so
//! callers cannot tell which family answered from the error surface.

pub mod mock;
pub mod onnx;

use crate::{InpaintError, Mask, Raster, SelectionHint};

/// Produces a binary selection mask from point hints.
pub trait Segmenter: Send + Sync {
    fn segment(&self, raster: &Raster, hint: &SelectionHint) -> Result<Mask, InpaintError>;
}

/// Synthesizes plausible content inside a mask from surrounding context.
pub trait MaskInpainter: Send + Sync {
    fn inpaint(&self, raster: &Raster, mask: &Mask) -> Result<Raster, InpaintError>;
}

/// Synthesizes prompt-directed content inside a mask.
pub trait GenerativeFiller: Send + Sync {
    fn generate(&self, raster: &Raster, mask: &Mask, prompt: &str)
        -> Result<Raster, InpaintError>;
}

/// Selection invariants every segmenter enforces: labels parallel the
/// points, and at least one point lands inside the raster.
pub fn check_selection(raster: &Raster, hint: &SelectionHint) -> Result<(), InpaintError> {
    if hint.points.is_empty() {
        return Err(InpaintError::InvalidSelection(
            "selection hint has no points".to_string(),
        ));
    }
    if hint.labels.len() != hint.points.len() {
        return Err(InpaintError::InvalidSelection(format!(
            "{} labels for {} points",
            hint.labels.len(),
            hint.points.len()
        )));
    }
    if hint.points.iter().all(|point| !raster.contains(point)) {
        return Err(InpaintError::InvalidSelection(format!(
            "no selection point inside {}x{} raster",
            raster.width(),
            raster.height()
        )));
    }
    Ok(())
}

/// Mask invariants every second-stage provider enforces.
pub fn check_mask(raster: &Raster, mask: &Mask) -> Result<(), InpaintError> {
    if !mask.matches(raster) {
        return Err(InpaintError::Validation(format!(
            "mask {}x{} does not match raster {}x{}",
            mask.width(),
            mask.height(),
            raster.width(),
            raster.height()
        )));
    }
    if mask.is_blank() {
        return Err(InpaintError::EmptyMask);
    }
    Ok(())
}

/// Prompt invariant for the generative stage.
pub fn check_prompt(prompt: &str) -> Result<(), InpaintError> {
    if prompt.trim().is_empty() {
        return Err(InpaintError::EmptyPrompt);
    }
    Ok(())
}
