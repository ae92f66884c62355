//! Lifecycle-managed registry owning the loaded capability providers.
//!
//! Provider construction is the only heavyweight resource acquisition in
//! the process (minutes and gigabytes for real checkpoints), so it happens
//! at most once per capability: `initialize` is serialized by an async
//! guard and later calls are no-ops. A failed or impractical real load
//! never aborts the other capabilities; the configured fallback policy
//! decides between the mock family and marking the capability failed.

pub mod device;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::task;
use tracing::{debug, info, instrument, warn};

use crate::config::{CapabilitySettings, DegradedPolicy, DevicePreference, FallbackPolicy, ServiceConfig};
use crate::providers::mock::{MockGenerator, MockInpainter, MockSegmenter};
use crate::providers::onnx::{OnnxGenerator, OnnxInpainter, OnnxSegmenter};
use crate::providers::{GenerativeFiller, MaskInpainter, Segmenter};
use crate::{CapabilityKind, InpaintError};

use device::ComputeDevice;

/// Non-blocking readiness state of one capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    NotLoaded,
    Loading,
    Ready,
    Failed,
}

impl std::fmt::Display for Readiness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Readiness::NotLoaded => "not-loaded",
            Readiness::Loading => "loading",
            Readiness::Ready => "ready",
            Readiness::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Registry record describing one installed (or failed) capability.
#[derive(Debug, Clone)]
pub struct ProviderDescriptor {
    pub kind: CapabilityKind,
    pub backing: String,
    pub device: ComputeDevice,
    pub readiness: Readiness,
}

/// Aggregate view for the readiness boundary.
#[derive(Debug, Clone)]
pub struct ServiceStatus {
    pub device: ComputeDevice,
    pub uptime: Duration,
    pub capabilities: Vec<ProviderDescriptor>,
    pub all_ready: bool,
}

/// Seam for constructing real providers. The production factory builds
/// ONNX sessions; tests substitute counting or failing factories.
#[async_trait]
pub trait ProviderFactory: Send + Sync {
    async fn segmenter(
        &self,
        settings: &CapabilitySettings,
        device: ComputeDevice,
    ) -> Result<Arc<dyn Segmenter>, InpaintError>;

    async fn mask_inpainter(
        &self,
        settings: &CapabilitySettings,
        device: ComputeDevice,
    ) -> Result<Arc<dyn MaskInpainter>, InpaintError>;

    async fn generative_filler(
        &self,
        settings: &CapabilitySettings,
        device: ComputeDevice,
    ) -> Result<Arc<dyn GenerativeFiller>, InpaintError>;
}

/// Default factory backed by ONNX Runtime sessions.
#[derive(Debug, Default)]
pub struct OnnxProviderFactory;

fn require_checkpoint(
    kind: CapabilityKind,
    settings: &CapabilitySettings,
) -> Result<std::path::PathBuf, InpaintError> {
    settings.checkpoint.clone().ok_or_else(|| {
        InpaintError::Config(format!("{kind} has no checkpoint configured"))
    })
}

#[async_trait]
impl ProviderFactory for OnnxProviderFactory {
    async fn segmenter(
        &self,
        settings: &CapabilitySettings,
        device: ComputeDevice,
    ) -> Result<Arc<dyn Segmenter>, InpaintError> {
        let checkpoint = require_checkpoint(CapabilityKind::Segmentation, settings)?;
        let provider =
            task::spawn_blocking(move || OnnxSegmenter::from_file(&checkpoint, device)).await??;
        Ok(Arc::new(provider))
    }

    async fn mask_inpainter(
        &self,
        settings: &CapabilitySettings,
        device: ComputeDevice,
    ) -> Result<Arc<dyn MaskInpainter>, InpaintError> {
        let checkpoint = require_checkpoint(CapabilityKind::MaskInpaint, settings)?;
        let provider =
            task::spawn_blocking(move || OnnxInpainter::from_file(&checkpoint, device)).await??;
        Ok(Arc::new(provider))
    }

    async fn generative_filler(
        &self,
        settings: &CapabilitySettings,
        device: ComputeDevice,
    ) -> Result<Arc<dyn GenerativeFiller>, InpaintError> {
        let checkpoint = require_checkpoint(CapabilityKind::GenerativeFill, settings)?;
        let provider =
            task::spawn_blocking(move || OnnxGenerator::from_file(&checkpoint, device)).await??;
        Ok(Arc::new(provider))
    }
}

#[derive(Default)]
struct RegistryState {
    descriptors: HashMap<CapabilityKind, ProviderDescriptor>,
    segmenter: Option<Arc<dyn Segmenter>>,
    inpainter: Option<Arc<dyn MaskInpainter>>,
    generator: Option<Arc<dyn GenerativeFiller>>,
}

/// How `initialize` resolved a capability before touching the factory.
enum Resolution {
    Real,
    Mock(&'static str),
    Unavailable(&'static str),
}

/// Process-wide owner of the loaded providers.
pub struct ProviderRegistry {
    device: ComputeDevice,
    factory: Arc<dyn ProviderFactory>,
    init_gate: tokio::sync::Mutex<bool>,
    state: RwLock<RegistryState>,
    started: Instant,
}

impl ProviderRegistry {
    /// Creates the registry, probing the compute device exactly once.
    pub fn new(preference: DevicePreference) -> Self {
        Self {
            device: device::resolve(preference),
            factory: Arc::new(OnnxProviderFactory),
            init_gate: tokio::sync::Mutex::new(false),
            state: RwLock::new(RegistryState::default()),
            started: Instant::now(),
        }
    }

    /// Substitutes the provider factory (tests, alternative backends).
    pub fn with_factory<F: ProviderFactory + 'static>(mut self, factory: F) -> Self {
        self.factory = Arc::new(factory);
        self
    }

    pub fn device(&self) -> ComputeDevice {
        self.device
    }

    /// Installs providers for every configured capability. Idempotent;
    /// concurrent calls are serialized and later ones are no-ops.
    #[instrument(skip_all, fields(device = %self.device))]
    pub async fn initialize(&self, config: &ServiceConfig) -> Result<(), InpaintError> {
        let mut initialized = self.init_gate.lock().await;
        if *initialized {
            debug!("registry already initialized");
            return Ok(());
        }
        info!("initializing provider registry");

        self.install_segmentation(config).await;
        self.install_mask_inpaint(config).await;
        self.install_generative_fill(config).await;

        *initialized = true;
        Ok(())
    }

    /// Non-blocking readiness probe for one capability.
    pub fn is_ready(&self, kind: CapabilityKind) -> Readiness {
        let state = self.state.read().expect("registry lock poisoned");
        state
            .descriptors
            .get(&kind)
            .map(|descriptor| descriptor.readiness)
            .unwrap_or(Readiness::NotLoaded)
    }

    /// Descriptor for one capability. Fails when neither a real nor a
    /// mock provider ended up installed.
    pub fn get(&self, kind: CapabilityKind) -> Result<ProviderDescriptor, InpaintError> {
        let state = self.state.read().expect("registry lock poisoned");
        let descriptor = state.descriptors.get(&kind).cloned().ok_or_else(|| {
            InpaintError::CapabilityUnavailable(kind, "no provider installed".to_string())
        })?;
        if descriptor.readiness == Readiness::Failed {
            return Err(InpaintError::CapabilityUnavailable(
                kind,
                descriptor.backing,
            ));
        }
        Ok(descriptor)
    }

    pub fn segmenter(&self) -> Result<Arc<dyn Segmenter>, InpaintError> {
        let state = self.state.read().expect("registry lock poisoned");
        state.segmenter.clone().ok_or_else(|| {
            InpaintError::CapabilityUnavailable(
                CapabilityKind::Segmentation,
                "no provider installed".to_string(),
            )
        })
    }

    pub fn inpainter(&self) -> Result<Arc<dyn MaskInpainter>, InpaintError> {
        let state = self.state.read().expect("registry lock poisoned");
        state.inpainter.clone().ok_or_else(|| {
            InpaintError::CapabilityUnavailable(
                CapabilityKind::MaskInpaint,
                "no provider installed".to_string(),
            )
        })
    }

    pub fn generator(&self) -> Result<Arc<dyn GenerativeFiller>, InpaintError> {
        let state = self.state.read().expect("registry lock poisoned");
        state.generator.clone().ok_or_else(|| {
            InpaintError::CapabilityUnavailable(
                CapabilityKind::GenerativeFill,
                "no provider installed".to_string(),
            )
        })
    }

    /// Aggregate readiness view for the health boundary.
    pub fn status(&self) -> ServiceStatus {
        let state = self.state.read().expect("registry lock poisoned");
        let mut capabilities: Vec<ProviderDescriptor> =
            state.descriptors.values().cloned().collect();
        capabilities.sort_by_key(|descriptor| format!("{}", descriptor.kind));
        let all_ready = !capabilities.is_empty()
            && capabilities
                .iter()
                .all(|descriptor| descriptor.readiness == Readiness::Ready);
        ServiceStatus {
            device: self.device,
            uptime: self.started.elapsed(),
            capabilities,
            all_ready,
        }
    }

    fn set_descriptor(&self, kind: CapabilityKind, backing: &str, readiness: Readiness) {
        let mut state = self.state.write().expect("registry lock poisoned");
        state.descriptors.insert(
            kind,
            ProviderDescriptor {
                kind,
                backing: backing.to_string(),
                device: self.device,
                readiness,
            },
        );
    }

    /// Policy decision made before the factory is consulted.
    fn resolve_family(&self, settings: &CapabilitySettings, mock_only: bool) -> Resolution {
        if mock_only {
            return Resolution::Mock("mock family forced by configuration");
        }
        if !settings.enabled {
            return match settings.fallback {
                FallbackPolicy::Mock => Resolution::Mock("capability disabled"),
                FallbackPolicy::Unavailable => Resolution::Unavailable("capability disabled"),
            };
        }
        if self.device == ComputeDevice::Fallback && settings.degraded == DegradedPolicy::Mock {
            return Resolution::Mock("impractical on degraded compute");
        }
        Resolution::Real
    }

    async fn install_segmentation(&self, config: &ServiceConfig) {
        let kind = CapabilityKind::Segmentation;
        let settings = config.capability(kind).clone();
        self.set_descriptor(kind, "pending", Readiness::Loading);

        match self.resolve_family(&settings, config.mock_only) {
            Resolution::Mock(reason) => {
                info!(capability = %kind, reason, "installing mock provider");
                let mut state = self.state.write().expect("registry lock poisoned");
                state.segmenter = Some(Arc::new(MockSegmenter::new()));
                drop(state);
                self.set_descriptor(kind, "mock", Readiness::Ready);
            }
            Resolution::Unavailable(reason) => {
                warn!(capability = %kind, reason, "capability unavailable");
                self.set_descriptor(kind, reason, Readiness::Failed);
            }
            Resolution::Real => match self.factory.segmenter(&settings, self.device).await {
                Ok(provider) => {
                    let backing = settings
                        .checkpoint
                        .as_ref()
                        .map(|path| path.display().to_string())
                        .unwrap_or_else(|| "real".to_string());
                    let mut state = self.state.write().expect("registry lock poisoned");
                    state.segmenter = Some(provider);
                    drop(state);
                    self.set_descriptor(kind, &backing, Readiness::Ready);
                    info!(capability = %kind, backing = %backing, "provider loaded");
                }
                Err(error) => {
                    warn!(capability = %kind, %error, "real provider load failed");
                    match settings.fallback {
                        FallbackPolicy::Mock => {
                            let mut state = self.state.write().expect("registry lock poisoned");
                            state.segmenter = Some(Arc::new(MockSegmenter::new()));
                            drop(state);
                            self.set_descriptor(kind, "mock", Readiness::Ready);
                        }
                        FallbackPolicy::Unavailable => {
                            self.set_descriptor(kind, "load failed", Readiness::Failed);
                        }
                    }
                }
            },
        }
    }

    async fn install_mask_inpaint(&self, config: &ServiceConfig) {
        let kind = CapabilityKind::MaskInpaint;
        let settings = config.capability(kind).clone();
        self.set_descriptor(kind, "pending", Readiness::Loading);

        match self.resolve_family(&settings, config.mock_only) {
            Resolution::Mock(reason) => {
                info!(capability = %kind, reason, "installing mock provider");
                let mut state = self.state.write().expect("registry lock poisoned");
                state.inpainter = Some(Arc::new(MockInpainter::new()));
                drop(state);
                self.set_descriptor(kind, "mock", Readiness::Ready);
            }
            Resolution::Unavailable(reason) => {
                warn!(capability = %kind, reason, "capability unavailable");
                self.set_descriptor(kind, reason, Readiness::Failed);
            }
            Resolution::Real => match self.factory.mask_inpainter(&settings, self.device).await {
                Ok(provider) => {
                    let backing = settings
                        .checkpoint
                        .as_ref()
                        .map(|path| path.display().to_string())
                        .unwrap_or_else(|| "real".to_string());
                    let mut state = self.state.write().expect("registry lock poisoned");
                    state.inpainter = Some(provider);
                    drop(state);
                    self.set_descriptor(kind, &backing, Readiness::Ready);
                    info!(capability = %kind, backing = %backing, "provider loaded");
                }
                Err(error) => {
                    warn!(capability = %kind, %error, "real provider load failed");
                    match settings.fallback {
                        FallbackPolicy::Mock => {
                            let mut state = self.state.write().expect("registry lock poisoned");
                            state.inpainter = Some(Arc::new(MockInpainter::new()));
                            drop(state);
                            self.set_descriptor(kind, "mock", Readiness::Ready);
                        }
                        FallbackPolicy::Unavailable => {
                            self.set_descriptor(kind, "load failed", Readiness::Failed);
                        }
                    }
                }
            },
        }
    }

    async fn install_generative_fill(&self, config: &ServiceConfig) {
        let kind = CapabilityKind::GenerativeFill;
        let settings = config.capability(kind).clone();
        self.set_descriptor(kind, "pending", Readiness::Loading);

        match self.resolve_family(&settings, config.mock_only) {
            Resolution::Mock(reason) => {
                info!(capability = %kind, reason, "installing mock provider");
                let mut state = self.state.write().expect("registry lock poisoned");
                state.generator = Some(Arc::new(MockGenerator::new()));
                drop(state);
                self.set_descriptor(kind, "mock", Readiness::Ready);
            }
            Resolution::Unavailable(reason) => {
                warn!(capability = %kind, reason, "capability unavailable");
                self.set_descriptor(kind, reason, Readiness::Failed);
            }
            Resolution::Real => match self.factory.generative_filler(&settings, self.device).await
            {
                Ok(provider) => {
                    let backing = settings
                        .checkpoint
                        .as_ref()
                        .map(|path| path.display().to_string())
                        .unwrap_or_else(|| "real".to_string());
                    let mut state = self.state.write().expect("registry lock poisoned");
                    state.generator = Some(provider);
                    drop(state);
                    self.set_descriptor(kind, &backing, Readiness::Ready);
                    info!(capability = %kind, backing = %backing, "provider loaded");
                }
                Err(error) => {
                    warn!(capability = %kind, %error, "real provider load failed");
                    match settings.fallback {
                        FallbackPolicy::Mock => {
                            let mut state = self.state.write().expect("registry lock poisoned");
                            state.generator = Some(Arc::new(MockGenerator::new()));
                            drop(state);
                            self.set_descriptor(kind, "mock", Readiness::Ready);
                        }
                        FallbackPolicy::Unavailable => {
                            self.set_descriptor(kind, "load failed", Readiness::Failed);
                        }
                    }
                }
            },
        }
    }
}
