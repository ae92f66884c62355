//! Request orchestration composing segmentation with a second-stage
//! provider.
//!
//! Every operation walks the same lifecycle: received, validated, mask
//! computed, result computed; terminal on the first failure. Provider
//! calls run through the bounded dispatcher under the remaining share of
//! the per-request budget; a timed-out call is abandoned, never retried.

mod validation;

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::timeout;
use tracing::{info, instrument};

use crate::config::Limits;
use crate::dispatch::Dispatcher;
use crate::registry::{ProviderRegistry, Readiness};
use crate::telemetry::TelemetrySink;
use crate::{CapabilityKind, InpaintError, Mask, OperationKind, Raster, SelectionHint};

/// Request-facing coordinator for the three inpainting operations.
pub struct Orchestrator {
    registry: Arc<ProviderRegistry>,
    dispatcher: Dispatcher,
    limits: Limits,
    telemetry: TelemetrySink,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        dispatcher: Dispatcher,
        limits: Limits,
        telemetry: TelemetrySink,
    ) -> Self {
        Self {
            registry,
            dispatcher,
            limits,
            telemetry,
        }
    }

    pub fn telemetry(&self) -> TelemetrySink {
        self.telemetry.clone()
    }

    /// Removes the selected object and fills the hole from context.
    #[instrument(skip_all)]
    pub async fn remove(
        &self,
        raster: Raster,
        hint: SelectionHint,
    ) -> Result<Raster, InpaintError> {
        self.execute(OperationKind::Remove, raster, hint, None).await
    }

    /// Replaces the selected object with prompt-directed content.
    #[instrument(skip_all)]
    pub async fn fill(
        &self,
        raster: Raster,
        hint: SelectionHint,
        prompt: &str,
    ) -> Result<Raster, InpaintError> {
        self.execute(OperationKind::Fill, raster, hint, Some(prompt))
            .await
    }

    /// Keeps the selected object and synthesizes a new background around
    /// it; the generative stage runs against the inverse of the object
    /// mask.
    #[instrument(skip_all)]
    pub async fn replace(
        &self,
        raster: Raster,
        hint: SelectionHint,
        prompt: &str,
    ) -> Result<Raster, InpaintError> {
        self.execute(OperationKind::Replace, raster, hint, Some(prompt))
            .await
    }

    async fn execute(
        &self,
        kind: OperationKind,
        raster: Raster,
        hint: SelectionHint,
        prompt: Option<&str>,
    ) -> Result<Raster, InpaintError> {
        let ticket = self.telemetry.begin(kind);
        let result = self
            .execute_stages(kind, ticket.started, raster, hint, prompt)
            .await;
        match &result {
            Ok(_) => self.telemetry.record_completed(&ticket),
            Err(error) => self.telemetry.record_failed(&ticket, error),
        }
        result
    }

    async fn execute_stages(
        &self,
        kind: OperationKind,
        started: Instant,
        raster: Raster,
        hint: SelectionHint,
        prompt: Option<&str>,
    ) -> Result<Raster, InpaintError> {
        self.telemetry.record_stage("received");
        let deadline = started + Duration::from_millis(self.limits.request_budget_ms);

        validation::validate_raster(&raster, &self.limits)?;
        validation::validate_hint(&raster, &hint)?;
        if kind != OperationKind::Remove {
            validation::validate_prompt(prompt.unwrap_or(""))?;
        }
        self.telemetry.record_stage("validated");

        self.require_ready(CapabilityKind::Segmentation)?;
        self.require_ready(kind.second_stage())?;

        let raster = Arc::new(raster);

        let mask = {
            let segmenter = self.registry.segmenter()?;
            let raster = Arc::clone(&raster);
            let hint = hint.clone();
            self.with_deadline("segmentation", deadline, move || {
                segmenter.segment(&raster, &hint)
            })
            .await?
        };
        self.telemetry.record_stage("mask_computed");

        if mask.is_blank() {
            return match kind {
                // Nothing was selected; removing or filling nothing is a
                // successful no-op rather than a hard error.
                OperationKind::Remove | OperationKind::Fill => {
                    info!(operation = %kind, "blank mask, returning input unchanged");
                    Ok(unwrap_raster(raster))
                }
                // Inverting a blank object mask would synthesize the whole
                // frame and discard the object; surface the soft failure.
                OperationKind::Replace => Err(InpaintError::EmptyMask),
            };
        }

        let output = self
            .second_stage(kind, deadline, &raster, mask, prompt)
            .await?;
        self.telemetry.record_stage("result_computed");
        Ok(output)
    }

    async fn second_stage(
        &self,
        kind: OperationKind,
        deadline: Instant,
        raster: &Arc<Raster>,
        mask: Mask,
        prompt: Option<&str>,
    ) -> Result<Raster, InpaintError> {
        match kind {
            OperationKind::Remove => {
                let inpainter = self.registry.inpainter()?;
                let raster = Arc::clone(raster);
                self.with_deadline("mask-inpaint", deadline, move || {
                    inpainter.inpaint(&raster, &mask)
                })
                .await
            }
            OperationKind::Fill => {
                let generator = self.registry.generator()?;
                let raster = Arc::clone(raster);
                let prompt = prompt.unwrap_or("").to_string();
                self.with_deadline("generative-fill", deadline, move || {
                    generator.generate(&raster, &mask, &prompt)
                })
                .await
            }
            OperationKind::Replace => {
                let generator = self.registry.generator()?;
                let raster = Arc::clone(raster);
                let prompt = prompt.unwrap_or("").to_string();
                let background = mask.inverted();
                self.with_deadline("generative-fill", deadline, move || {
                    generator.generate(&raster, &background, &prompt)
                })
                .await
            }
        }
    }

    fn require_ready(&self, kind: CapabilityKind) -> Result<(), InpaintError> {
        match self.registry.is_ready(kind) {
            Readiness::Ready => Ok(()),
            state => Err(InpaintError::CapabilityUnavailable(
                kind,
                format!("capability is {state}"),
            )),
        }
    }

    /// Dispatches one provider call under the remaining request budget.
    /// On expiry the worker keeps its slot until it finishes, but the
    /// result is discarded and the caller sees `ProcessingTimeout`.
    async fn with_deadline<T, F>(
        &self,
        stage: &'static str,
        deadline: Instant,
        task: F,
    ) -> Result<T, InpaintError>
    where
        F: FnOnce() -> Result<T, InpaintError> + Send + 'static,
        T: Send + 'static,
    {
        let timed_out = InpaintError::ProcessingTimeout {
            stage,
            budget_ms: self.limits.request_budget_ms,
        };
        let remaining = deadline
            .checked_duration_since(Instant::now())
            .ok_or(timed_out.clone())?;
        match timeout(remaining, self.dispatcher.submit(task)).await {
            Ok(result) => result,
            Err(_) => Err(timed_out),
        }
    }
}

/// Recovers the owned raster; clones only if an abandoned worker still
/// holds a reference.
fn unwrap_raster(raster: Arc<Raster>) -> Raster {
    Arc::try_unwrap(raster).unwrap_or_else(|shared| (*shared).clone())
}
