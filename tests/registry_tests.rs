use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use inpaintd::config::{
    CapabilitySettings, CapabilityTable, DegradedPolicy, DevicePreference, FallbackPolicy, Limits,
    ServiceConfig,
};
use inpaintd::providers::mock::{MockGenerator, MockInpainter, MockSegmenter};
use inpaintd::providers::{GenerativeFiller, MaskInpainter, Segmenter};
use inpaintd::registry::device::ComputeDevice;
use inpaintd::registry::{ProviderFactory, ProviderRegistry, Readiness};
use inpaintd::{CapabilityKind, InpaintError};

/// Stand-in for the heavyweight ONNX factory that counts constructions.
struct CountingFactory {
    loads: Arc<AtomicUsize>,
    fail: bool,
}

impl CountingFactory {
    fn new(loads: Arc<AtomicUsize>) -> Self {
        Self { loads, fail: false }
    }

    fn failing(loads: Arc<AtomicUsize>) -> Self {
        Self { loads, fail: true }
    }

    fn outcome<T>(&self, provider: T) -> Result<T, InpaintError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            Err(InpaintError::Config("weights missing".to_string()))
        } else {
            Ok(provider)
        }
    }
}

#[async_trait]
impl ProviderFactory for CountingFactory {
    async fn segmenter(
        &self,
        _settings: &CapabilitySettings,
        _device: ComputeDevice,
    ) -> Result<Arc<dyn Segmenter>, InpaintError> {
        self.outcome(Arc::new(MockSegmenter::new()) as Arc<dyn Segmenter>)
    }

    async fn mask_inpainter(
        &self,
        _settings: &CapabilitySettings,
        _device: ComputeDevice,
    ) -> Result<Arc<dyn MaskInpainter>, InpaintError> {
        self.outcome(Arc::new(MockInpainter::new()) as Arc<dyn MaskInpainter>)
    }

    async fn generative_filler(
        &self,
        _settings: &CapabilitySettings,
        _device: ComputeDevice,
    ) -> Result<Arc<dyn GenerativeFiller>, InpaintError> {
        self.outcome(Arc::new(MockGenerator::new()) as Arc<dyn GenerativeFiller>)
    }
}

fn test_limits() -> Limits {
    Limits {
        max_image_dimension: 2048,
        max_payload_bytes: 10 * 1024 * 1024,
        request_budget_ms: 5_000,
        worker_pool_size: 2,
        queue_depth: 4,
    }
}

fn test_config(capabilities: CapabilityTable, mock_only: bool) -> ServiceConfig {
    ServiceConfig {
        limits: test_limits(),
        device: DevicePreference::Fallback,
        capabilities,
        mock_only,
    }
}

const ALL_KINDS: [CapabilityKind; 3] = [
    CapabilityKind::Segmentation,
    CapabilityKind::MaskInpaint,
    CapabilityKind::GenerativeFill,
];

#[tokio::test]
async fn initialize_is_idempotent_and_loads_once() {
    let loads = Arc::new(AtomicUsize::new(0));
    let registry = ProviderRegistry::new(DevicePreference::Fallback)
        .with_factory(CountingFactory::new(Arc::clone(&loads)));
    let config = test_config(CapabilityTable::default(), false);

    assert_eq!(registry.is_ready(CapabilityKind::Segmentation), Readiness::NotLoaded);

    registry.initialize(&config).await.expect("first init");
    registry.initialize(&config).await.expect("second init");

    assert_eq!(loads.load(Ordering::SeqCst), 3);
    for kind in ALL_KINDS {
        assert_eq!(registry.is_ready(kind), Readiness::Ready);
    }
}

#[tokio::test]
async fn concurrent_initialization_is_serialized() {
    let loads = Arc::new(AtomicUsize::new(0));
    let registry = Arc::new(
        ProviderRegistry::new(DevicePreference::Fallback)
            .with_factory(CountingFactory::new(Arc::clone(&loads))),
    );
    let config = test_config(CapabilityTable::default(), false);

    let (first, second) = tokio::join!(registry.initialize(&config), registry.initialize(&config));
    first.expect("first init");
    second.expect("second init");

    assert_eq!(loads.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn load_failure_falls_back_to_mock() {
    let loads = Arc::new(AtomicUsize::new(0));
    let registry = ProviderRegistry::new(DevicePreference::Fallback)
        .with_factory(CountingFactory::failing(Arc::clone(&loads)));
    let config = test_config(CapabilityTable::default(), false);

    registry.initialize(&config).await.expect("init");

    for kind in ALL_KINDS {
        assert_eq!(registry.is_ready(kind), Readiness::Ready);
        assert_eq!(registry.get(kind).expect("descriptor").backing, "mock");
    }
    registry.segmenter().expect("mock segmenter installed");
}

#[tokio::test]
async fn load_failure_with_unavailable_policy_marks_failed() {
    let loads = Arc::new(AtomicUsize::new(0));
    let registry = ProviderRegistry::new(DevicePreference::Fallback)
        .with_factory(CountingFactory::failing(Arc::clone(&loads)));
    let mut capabilities = CapabilityTable::default();
    capabilities.segmentation.fallback = FallbackPolicy::Unavailable;
    let config = test_config(capabilities, false);

    registry.initialize(&config).await.expect("init");

    assert_eq!(
        registry.is_ready(CapabilityKind::Segmentation),
        Readiness::Failed
    );
    let err = registry.segmenter().err().expect("nothing installed");
    assert!(matches!(
        err,
        InpaintError::CapabilityUnavailable(CapabilityKind::Segmentation, _)
    ));
    // The other capabilities still came up on their own fallback policy.
    assert_eq!(registry.is_ready(CapabilityKind::MaskInpaint), Readiness::Ready);
    assert_eq!(
        registry.is_ready(CapabilityKind::GenerativeFill),
        Readiness::Ready
    );
}

#[tokio::test]
async fn disabled_capability_skips_the_factory() {
    let loads = Arc::new(AtomicUsize::new(0));
    let registry = ProviderRegistry::new(DevicePreference::Fallback)
        .with_factory(CountingFactory::new(Arc::clone(&loads)));
    let mut capabilities = CapabilityTable::default();
    capabilities.segmentation.enabled = false;
    let config = test_config(capabilities, false);

    registry.initialize(&config).await.expect("init");

    assert_eq!(loads.load(Ordering::SeqCst), 2);
    assert_eq!(
        registry.get(CapabilityKind::Segmentation).expect("descriptor").backing,
        "mock"
    );
}

#[tokio::test]
async fn degraded_device_policy_maps_generative_fill_to_mock() {
    let loads = Arc::new(AtomicUsize::new(0));
    let registry = ProviderRegistry::new(DevicePreference::Fallback)
        .with_factory(CountingFactory::new(Arc::clone(&loads)));
    let mut capabilities = CapabilityTable::default();
    capabilities.generative_fill.degraded = DegradedPolicy::Mock;
    let config = test_config(capabilities, false);

    registry.initialize(&config).await.expect("init");

    assert_eq!(loads.load(Ordering::SeqCst), 2);
    assert_eq!(
        registry
            .get(CapabilityKind::GenerativeFill)
            .expect("descriptor")
            .backing,
        "mock"
    );
    assert_eq!(
        registry.is_ready(CapabilityKind::GenerativeFill),
        Readiness::Ready
    );
}

#[tokio::test]
async fn mock_only_configuration_never_touches_the_factory() {
    let loads = Arc::new(AtomicUsize::new(0));
    let registry = ProviderRegistry::new(DevicePreference::Fallback)
        .with_factory(CountingFactory::new(Arc::clone(&loads)));
    let config = test_config(CapabilityTable::default(), true);

    registry.initialize(&config).await.expect("init");

    assert_eq!(loads.load(Ordering::SeqCst), 0);
    let status = registry.status();
    assert!(status.all_ready);
    assert_eq!(status.capabilities.len(), 3);
    for descriptor in &status.capabilities {
        assert_eq!(descriptor.backing, "mock");
        assert_eq!(descriptor.device, ComputeDevice::Fallback);
    }
}
