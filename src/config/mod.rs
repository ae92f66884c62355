//! Configuration loading and validation utilities.

use std::fmt::Display;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use serde::Deserialize;
use tokio::fs;
use tracing::instrument;

use crate::{CapabilityKind, InpaintError};

/// Command-line arguments used to bootstrap the runtime.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Inpaintd image inpainting service core")]
pub struct CliArgs {
    /// Location of the service configuration document.
    #[arg(long, value_name = "PATH", default_value = "inpaintd.toml")]
    pub config: PathBuf,
    /// Compute device override.
    #[arg(long, value_name = "DEVICE", env = "INPAINTD_DEVICE")]
    pub device: Option<DevicePreference>,
    /// Per-request processing budget override in milliseconds.
    #[arg(long, value_name = "MS", env = "INPAINTD_BUDGET_MS")]
    pub request_budget_ms: Option<u64>,
    /// Worker pool size override.
    #[arg(long, value_name = "SLOTS", env = "INPAINTD_POOL_SIZE")]
    pub worker_pool_size: Option<usize>,
    /// Dispatcher queue depth override.
    #[arg(long, value_name = "DEPTH", env = "INPAINTD_QUEUE_DEPTH")]
    pub queue_depth: Option<usize>,
    /// Force the mock provider family for every capability.
    #[arg(long, env = "INPAINTD_MOCK")]
    pub mock: bool,
}

/// Requested compute device; `Auto` is resolved once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DevicePreference {
    Auto,
    Accelerated,
    Fallback,
}

impl Display for DevicePreference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DevicePreference::Auto => "auto",
            DevicePreference::Accelerated => "accelerated",
            DevicePreference::Fallback => "fallback",
        };
        f.write_str(name)
    }
}

/// Limits enforced at runtime.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Limits {
    pub max_image_dimension: u32,
    pub max_payload_bytes: usize,
    pub request_budget_ms: u64,
    pub worker_pool_size: usize,
    pub queue_depth: usize,
}

/// What to install when the real provider cannot be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FallbackPolicy {
    Mock,
    Unavailable,
}

/// What to do when the process is pinned to degraded (fallback) compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DegradedPolicy {
    Run,
    Mock,
}

/// Per-capability configuration.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct CapabilitySettings {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub checkpoint: Option<PathBuf>,
    #[serde(default = "default_fallback")]
    pub fallback: FallbackPolicy,
    #[serde(default = "default_degraded")]
    pub degraded: DegradedPolicy,
}

fn default_enabled() -> bool {
    true
}

fn default_fallback() -> FallbackPolicy {
    FallbackPolicy::Mock
}

fn default_degraded() -> DegradedPolicy {
    DegradedPolicy::Run
}

impl Default for CapabilitySettings {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            checkpoint: None,
            fallback: default_fallback(),
            degraded: default_degraded(),
        }
    }
}

/// Capability sections of the configuration document.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct CapabilityTable {
    #[serde(default)]
    pub segmentation: CapabilitySettings,
    #[serde(default)]
    pub mask_inpaint: CapabilitySettings,
    #[serde(default)]
    pub generative_fill: CapabilitySettings,
}

#[derive(Debug, Clone, Deserialize)]
struct ComputeSection {
    device: DevicePreference,
}

#[derive(Debug, Clone, Deserialize)]
struct ConfigDocument {
    limits: Limits,
    compute: ComputeSection,
    #[serde(default)]
    capability: CapabilityTable,
}

/// Fully merged configuration set.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub limits: Limits,
    pub device: DevicePreference,
    pub capabilities: CapabilityTable,
    pub mock_only: bool,
}

impl ServiceConfig {
    #[instrument(skip_all)]
    pub async fn load(cli: CliArgs) -> Result<Self, InpaintError> {
        let raw = fs::read_to_string(&cli.config).await.map_err(|err| {
            InpaintError::Config(format!(
                "failed to read {}: {err}",
                cli.config.display()
            ))
        })?;
        let document: ConfigDocument = toml::from_str(&raw)
            .map_err(|err| InpaintError::Config(format!("invalid configuration: {err}")))?;

        let mut limits = document.limits;
        if let Some(budget) = cli.request_budget_ms {
            limits.request_budget_ms = budget;
        }
        if let Some(pool) = cli.worker_pool_size {
            limits.worker_pool_size = pool;
        }
        if let Some(depth) = cli.queue_depth {
            limits.queue_depth = depth;
        }

        let config = Self {
            limits,
            device: cli.device.unwrap_or(document.compute.device),
            capabilities: document.capability,
            mock_only: cli.mock,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), InpaintError> {
        if self.limits.worker_pool_size == 0 {
            return Err(InpaintError::Config(
                "worker pool size must be positive".to_string(),
            ));
        }
        if self.limits.request_budget_ms == 0 {
            return Err(InpaintError::Config(
                "request budget must be positive".to_string(),
            ));
        }
        if self.limits.max_image_dimension == 0 {
            return Err(InpaintError::Config(
                "image dimension cap must be positive".to_string(),
            ));
        }
        if self.limits.max_payload_bytes == 0 {
            return Err(InpaintError::Config(
                "payload cap must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Settings for one capability section.
    pub fn capability(&self, kind: CapabilityKind) -> &CapabilitySettings {
        match kind {
            CapabilityKind::Segmentation => &self.capabilities.segmentation,
            CapabilityKind::MaskInpaint => &self.capabilities.mask_inpaint,
            CapabilityKind::GenerativeFill => &self.capabilities.generative_fill,
        }
    }
}
