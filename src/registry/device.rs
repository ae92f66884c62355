//! Compute device selection, fixed once per process.

use std::fmt::Display;

use ort::execution_providers::{CUDAExecutionProvider, ExecutionProvider};
use tracing::info;

use crate::config::DevicePreference;

/// The compute tier every provider in this process runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputeDevice {
    /// GPU-class execution provider is available.
    Accelerated,
    /// CPU-only execution; some capabilities become impractical here.
    Fallback,
}

impl Display for ComputeDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ComputeDevice::Accelerated => "accelerated",
            ComputeDevice::Fallback => "fallback",
        };
        f.write_str(name)
    }
}

/// Resolves the configured preference, probing at most once.
pub fn resolve(preference: DevicePreference) -> ComputeDevice {
    let device = match preference {
        DevicePreference::Accelerated => ComputeDevice::Accelerated,
        DevicePreference::Fallback => ComputeDevice::Fallback,
        DevicePreference::Auto => {
            if accelerator_available() {
                ComputeDevice::Accelerated
            } else {
                ComputeDevice::Fallback
            }
        }
    };
    info!(preference = %preference, %device, "compute device resolved");
    device
}

/// Probes the CUDA execution provider.
pub fn accelerator_available() -> bool {
    CUDAExecutionProvider::default()
        .is_available()
        .unwrap_or(false)
}
