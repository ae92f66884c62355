//! Core library for the inpaintd service.
//!
//! The crate exposes the request-scoped data model shared across the
//! orchestration layers, the error taxonomy surfaced to callers, and the
//! bootstrap entry point used by the CLI application. The HTTP layer,
//! model weights, and deployment glue live outside this crate; everything
//! between decoded bytes and encoded bytes lives here.

pub mod codec;
pub mod config;
pub mod dispatch;
pub mod orchestrator;
pub mod providers;
pub mod registry;
pub mod telemetry;

use std::fmt::Display;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, instrument};

/// The three inference stages the service can host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CapabilityKind {
    Segmentation,
    MaskInpaint,
    GenerativeFill,
}

impl Display for CapabilityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CapabilityKind::Segmentation => "segmentation",
            CapabilityKind::MaskInpaint => "mask-inpaint",
            CapabilityKind::GenerativeFill => "generative-fill",
        };
        f.write_str(name)
    }
}

/// Logical operations the orchestrator exposes to the ingress boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Remove,
    Fill,
    Replace,
}

impl OperationKind {
    /// Capability that consumes the segmentation mask for this operation.
    pub fn second_stage(&self) -> CapabilityKind {
        match self {
            OperationKind::Remove => CapabilityKind::MaskInpaint,
            OperationKind::Fill | OperationKind::Replace => CapabilityKind::GenerativeFill,
        }
    }
}

impl Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            OperationKind::Remove => "remove",
            OperationKind::Fill => "fill",
            OperationKind::Replace => "replace",
        };
        f.write_str(name)
    }
}

/// A decoded 3-channel RGB image, row-major, owned by a single request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Raster {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Raster {
    /// Builds a raster from raw RGB bytes, checking the buffer length.
    pub fn from_vec(width: u32, height: u32, data: Vec<u8>) -> Result<Self, InpaintError> {
        let expected = width as usize * height as usize * 3;
        if data.len() != expected {
            return Err(InpaintError::Validation(format!(
                "raster buffer holds {} bytes, {}x{} rgb needs {}",
                data.len(),
                width,
                height,
                expected
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Builds a raster filled with a single colour.
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let mut data = Vec::with_capacity(width as usize * height as usize * 3);
        for _ in 0..(width as usize * height as usize) {
            data.extend_from_slice(&rgb);
        }
        Self {
            width,
            height,
            data,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        let idx = (y as usize * self.width as usize + x as usize) * 3;
        [self.data[idx], self.data[idx + 1], self.data[idx + 2]]
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, rgb: [u8; 3]) {
        let idx = (y as usize * self.width as usize + x as usize) * 3;
        self.data[idx..idx + 3].copy_from_slice(&rgb);
    }

    /// True when the point lies inside `[0, width) x [0, height)`.
    pub fn contains(&self, point: &Point) -> bool {
        point.x >= 0.0
            && point.y >= 0.0
            && point.x < self.width as f32
            && point.y < self.height as f32
    }
}

/// Binary selection mask with the same dimensions as its source raster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    width: u32,
    height: u32,
    data: Vec<bool>,
}

impl Mask {
    /// Builds an all-negative mask.
    pub fn blank(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![false; width as usize * height as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn get(&self, x: u32, y: u32) -> bool {
        self.data[y as usize * self.width as usize + x as usize]
    }

    pub fn set(&mut self, x: u32, y: u32, value: bool) {
        self.data[y as usize * self.width as usize + x as usize] = value;
    }

    /// True when no pixel is positive.
    pub fn is_blank(&self) -> bool {
        !self.data.iter().any(|v| *v)
    }

    pub fn positive_count(&self) -> usize {
        self.data.iter().filter(|v| **v).count()
    }

    /// True when the mask covers the given raster pixel for pixel.
    pub fn matches(&self, raster: &Raster) -> bool {
        self.width == raster.width() && self.height == raster.height()
    }

    /// Returns the complement mask.
    pub fn inverted(&self) -> Mask {
        Mask {
            width: self.width,
            height: self.height,
            data: self.data.iter().map(|v| !v).collect(),
        }
    }

    /// Grows the positive region outward by `radius` pixels (Chebyshev
    /// distance). Radius zero returns the mask unchanged; the positive
    /// region is monotone in the radius.
    pub fn dilated(&self, radius: u32) -> Mask {
        if radius == 0 || self.is_blank() {
            return self.clone();
        }
        let mut out = self.clone();
        let r = radius as i64;
        for y in 0..self.height as i64 {
            for x in 0..self.width as i64 {
                if !self.get(x as u32, y as u32) {
                    continue;
                }
                let y0 = (y - r).max(0);
                let y1 = (y + r).min(self.height as i64 - 1);
                let x0 = (x - r).max(0);
                let x1 = (x + r).min(self.width as i64 - 1);
                for wy in y0..=y1 {
                    for wx in x0..=x1 {
                        out.set(wx as u32, wy as u32, true);
                    }
                }
            }
        }
        out
    }
}

/// A single caller-supplied coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Whether a selection point marks the object or the surroundings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PointLabel {
    Exclude,
    Include,
}

impl PointLabel {
    pub fn is_include(&self) -> bool {
        matches!(self, PointLabel::Include)
    }
}

/// Spatial instruction describing what the caller wants segmented.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionHint {
    pub points: Vec<Point>,
    pub labels: Vec<PointLabel>,
    pub dilate_radius: u32,
}

impl SelectionHint {
    pub fn new(points: Vec<Point>, labels: Vec<PointLabel>) -> Self {
        Self {
            points,
            labels,
            dilate_radius: 0,
        }
    }

    pub fn with_dilation(mut self, radius: u32) -> Self {
        self.dilate_radius = radius;
        self
    }
}

/// Errors surfaced by the service core.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InpaintError {
    #[error("validation failure: {0}")]
    Validation(String),
    #[error("invalid image: {0}")]
    InvalidImage(String),
    #[error("capability {0} unavailable: {1}")]
    CapabilityUnavailable(CapabilityKind, String),
    #[error("invalid selection: {0}")]
    InvalidSelection(String),
    #[error("mask has no positive pixels")]
    EmptyMask,
    #[error("text prompt must not be empty")]
    EmptyPrompt,
    #[error("processing budget of {budget_ms}ms exceeded during {stage}")]
    ProcessingTimeout { stage: &'static str, budget_ms: u64 },
    #[error("dispatcher queue full")]
    Overloaded,
    #[error("{kind} provider fault: {message}")]
    ProviderFault {
        kind: CapabilityKind,
        message: String,
    },
    #[error("configuration error: {0}")]
    Config(String),
    #[error("task join failure: {0}")]
    Join(String),
}

impl From<tokio::task::JoinError> for InpaintError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Join(err.to_string())
    }
}

/// Result alias for orchestration and provider calls.
pub type InpaintResult<T> = Result<T, InpaintError>;

/// Boots the service core and drives one synthetic operation end to end.
///
/// The HTTP layer is an external collaborator; this entry point proves the
/// registry, dispatcher, and orchestrator wiring the same way a caller
/// behind the ingress boundary would exercise it.
#[instrument(skip_all)]
pub async fn run(config: config::ServiceConfig) -> Result<(), InpaintError> {
    let telemetry = telemetry::TelemetrySink::default();
    let registry = Arc::new(registry::ProviderRegistry::new(config.device));
    registry.initialize(&config).await?;

    let dispatcher =
        dispatch::Dispatcher::new(config.limits.worker_pool_size, config.limits.queue_depth);
    let orchestrator = orchestrator::Orchestrator::new(
        Arc::clone(&registry),
        dispatcher,
        config.limits.clone(),
        telemetry.clone(),
    );

    let status = registry.status();
    for descriptor in &status.capabilities {
        info!(
            capability = %descriptor.kind,
            backing = %descriptor.backing,
            readiness = %descriptor.readiness,
            "capability installed"
        );
    }

    let raster = Raster::filled(64, 64, [128, 128, 128]);
    let hint = SelectionHint::new(vec![Point::new(32.0, 32.0)], vec![PointLabel::Include]);
    let output = orchestrator.remove(raster, hint).await?;
    let encoded = codec::encode_png(&output)?;
    info!(
        width = output.width(),
        height = output.height(),
        bytes = encoded.len(),
        "smoke operation completed"
    );

    let snapshot = telemetry.snapshot();
    info!(
        completed = snapshot.completed_operations,
        failed = snapshot.failed_operations,
        "telemetry snapshot"
    );

    Ok(())
}
