//! Pre-dispatch validation of rasters, selection hints, and prompts.
//!
//! Violations terminate the request before any provider is invoked.

use crate::config::Limits;
use crate::{InpaintError, Raster, SelectionHint};

pub(crate) fn validate_raster(raster: &Raster, limits: &Limits) -> Result<(), InpaintError> {
    if raster.width() == 0 || raster.height() == 0 {
        return Err(InpaintError::Validation(
            "raster has a zero dimension".to_string(),
        ));
    }
    if raster.width().max(raster.height()) > limits.max_image_dimension {
        return Err(InpaintError::Validation(format!(
            "raster {}x{} exceeds dimension cap {}",
            raster.width(),
            raster.height(),
            limits.max_image_dimension
        )));
    }
    Ok(())
}

pub(crate) fn validate_hint(raster: &Raster, hint: &SelectionHint) -> Result<(), InpaintError> {
    if hint.points.is_empty() {
        return Err(InpaintError::Validation(
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
    for point in &hint.points {
        if !raster.contains(point) {
            return Err(InpaintError::InvalidSelection(format!(
                "point ({}, {}) outside {}x{} raster",
                point.x,
                point.y,
                raster.width(),
                raster.height()
            )));
        }
    }
    Ok(())
}

pub(crate) fn validate_prompt(prompt: &str) -> Result<(), InpaintError> {
    if prompt.trim().is_empty() {
        return Err(InpaintError::EmptyPrompt);
    }
    Ok(())
}
