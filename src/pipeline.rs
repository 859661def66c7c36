use crate::config::AppConfig;
use crate::ebay::FindingClient;
use crate::listing::ListingPayload;
use crate::llm::{GeneratedMetadata, LlmClient, LlmError, MetadataGenerator};
use crate::models::{RunReport, ScannedCode, StageReport};
use crate::pricing::{PriceError, PriceEstimate, PriceEstimator};
use crate::scanner::{BarcodeSource, CaptureError, LineScanner, ProvidedCode};
use crate::sellbrite::{ListingBackend, SellbriteClient, SellbriteError, SubmissionReceipt};
use crate::sku::{CounterError, FileCounterStore, IdentifierAllocator, ProductIdentifier};
use serde::Serialize;
use serde_json::{Value, json};
use std::{fmt, future::Future, time::Instant};
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Pipeline stages in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Scanning,
    GeneratingMetadata,
    EstimatingPrice,
    AllocatingIdentifier,
    BuildingListing,
    Submitting,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Scanning => "scan",
            Stage::GeneratingMetadata => "generate_metadata",
            Stage::EstimatingPrice => "estimate_price",
            Stage::AllocatingIdentifier => "allocate_identifier",
            Stage::BuildingListing => "build_listing",
            Stage::Submitting => "submit_listing",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PipelineState {
    Idle,
    Scanning,
    GeneratingMetadata,
    EstimatingPrice,
    AllocatingIdentifier,
    BuildingListing,
    Submitting,
    Done,
    Failed { stage: Stage, reason: String },
}

impl From<Stage> for PipelineState {
    fn from(stage: Stage) -> Self {
        match stage {
            Stage::Scanning => PipelineState::Scanning,
            Stage::GeneratingMetadata => PipelineState::GeneratingMetadata,
            Stage::EstimatingPrice => PipelineState::EstimatingPrice,
            Stage::AllocatingIdentifier => PipelineState::AllocatingIdentifier,
            Stage::BuildingListing => PipelineState::BuildingListing,
            Stage::Submitting => PipelineState::Submitting,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineErrorKind {
    Capture,
    Generation,
    NoPriceData,
    PriceBackend,
    CorruptCounter,
    CounterStorage,
    ListingSubmission,
}

#[derive(Debug, Error)]
#[error("stage `{stage}` failed: {message}")]
pub struct PipelineError {
    stage: Stage,
    kind: PipelineErrorKind,
    message: String,
    identifier: Option<ProductIdentifier>,
}

impl PipelineError {
    pub fn new(stage: Stage, kind: PipelineErrorKind, message: impl Into<String>) -> Self {
        Self {
            stage,
            kind,
            message: message.into(),
            identifier: None,
        }
    }

    fn with_identifier(mut self, identifier: ProductIdentifier) -> Self {
        self.identifier = Some(identifier);
        self
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn kind(&self) -> PipelineErrorKind {
        self.kind
    }

    pub fn detail(&self) -> &str {
        &self.message
    }

    /// Identifier that was allocated (and persisted) but never listed.
    pub fn burned_identifier(&self) -> Option<&ProductIdentifier> {
        self.identifier.as_ref()
    }
}

impl From<CaptureError> for PipelineError {
    fn from(err: CaptureError) -> Self {
        Self::new(Stage::Scanning, PipelineErrorKind::Capture, err.to_string())
    }
}

impl From<LlmError> for PipelineError {
    fn from(err: LlmError) -> Self {
        Self::new(
            Stage::GeneratingMetadata,
            PipelineErrorKind::Generation,
            err.to_string(),
        )
    }
}

impl From<PriceError> for PipelineError {
    fn from(err: PriceError) -> Self {
        let kind = if err.is_no_price_data() {
            PipelineErrorKind::NoPriceData
        } else {
            PipelineErrorKind::PriceBackend
        };
        Self::new(Stage::EstimatingPrice, kind, err.to_string())
    }
}

impl From<CounterError> for PipelineError {
    fn from(err: CounterError) -> Self {
        let kind = match err {
            CounterError::Corrupt { .. } => PipelineErrorKind::CorruptCounter,
            CounterError::Io { .. } => PipelineErrorKind::CounterStorage,
        };
        Self::new(Stage::AllocatingIdentifier, kind, err.to_string())
    }
}

impl From<SellbriteError> for PipelineError {
    fn from(err: SellbriteError) -> Self {
        Self::new(
            Stage::Submitting,
            PipelineErrorKind::ListingSubmission,
            err.to_string(),
        )
    }
}

#[derive(Debug)]
pub struct StageOutcome<T> {
    pub value: T,
    pub output: Value,
}

impl<T> StageOutcome<T> {
    fn new(value: T, output: Value) -> Self {
        Self { value, output }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Build the listing without consuming an identifier or submitting it.
    pub dry_run: bool,
}

/// Drives one barcode through metadata, pricing, identifier allocation and
/// submission. `run` takes `&mut self`, so runs never overlap.
pub struct Pipeline {
    scanner: Box<dyn BarcodeSource>,
    metadata: MetadataGenerator,
    pricing: PriceEstimator,
    allocator: IdentifierAllocator,
    listings: Box<dyn ListingBackend>,
    history: Vec<PipelineState>,
}

impl Pipeline {
    pub fn new(
        scanner: Box<dyn BarcodeSource>,
        metadata: MetadataGenerator,
        pricing: PriceEstimator,
        allocator: IdentifierAllocator,
        listings: Box<dyn ListingBackend>,
    ) -> Self {
        Self {
            scanner,
            metadata,
            pricing,
            allocator,
            listings,
            history: vec![PipelineState::Idle],
        }
    }

    /// Wires the production collaborators; `code` bypasses the capture source.
    pub fn from_config(config: &AppConfig, code: Option<ScannedCode>) -> Self {
        let scanner: Box<dyn BarcodeSource> = match code {
            Some(code) => Box::new(ProvidedCode::new(code)),
            None => Box::new(LineScanner::new(config.scanner.source.clone())),
        };
        let llm = LlmClient::new(config.openai.clone(), &config.http);
        let sales = FindingClient::new(config.ebay.clone(), &config.http);
        let store = FileCounterStore::new(config.counter.path.clone());
        let listings = SellbriteClient::new(config.sellbrite.clone(), &config.http);
        Self::new(
            scanner,
            MetadataGenerator::new(Box::new(llm)),
            PriceEstimator::new(Box::new(sales), config.pricing.clone()),
            IdentifierAllocator::new(Box::new(store)),
            Box::new(listings),
        )
    }

    /// States visited by the most recent run, starting at `Idle`.
    pub fn history(&self) -> &[PipelineState] {
        &self.history
    }

    pub async fn run(&mut self, options: RunOptions) -> Result<RunReport, PipelineError> {
        self.history = vec![PipelineState::Idle];
        let run_id = Uuid::new_v4().simple().to_string();
        info!(target = "lister.pipeline", %run_id, dry_run = options.dry_run, "pipeline run started");

        match self.run_stages(&run_id, options).await {
            Ok(report) => {
                self.history.push(PipelineState::Done);
                info!(
                    target = "lister.pipeline",
                    %run_id,
                    sku = %report.sku,
                    price = report.payload.price,
                    warnings = report.warnings.len(),
                    "pipeline run finished"
                );
                Ok(RunReport {
                    states: self.history.clone(),
                    ..report
                })
            }
            Err(err) => {
                self.history.push(PipelineState::Failed {
                    stage: err.stage(),
                    reason: err.detail().to_string(),
                });
                error!(
                    target = "lister.pipeline",
                    %run_id,
                    stage = %err.stage(),
                    kind = ?err.kind(),
                    burned_identifier = err.burned_identifier().map(|id| id.as_str()),
                    error = %err.detail(),
                    "pipeline run failed"
                );
                Err(err)
            }
        }
    }

    async fn run_stages(
        &mut self,
        run_id: &str,
        options: RunOptions,
    ) -> Result<RunReport, PipelineError> {
        let mut stages = Vec::new();

        self.enter(Stage::Scanning);
        let code = capture_stage(
            Stage::Scanning,
            &mut stages,
            stages::scan(self.scanner.as_mut()),
        )
        .await?;

        self.enter(Stage::GeneratingMetadata);
        let generated = capture_stage(
            Stage::GeneratingMetadata,
            &mut stages,
            stages::generate_metadata(&self.metadata, &code),
        )
        .await?;
        for warning in &generated.warnings {
            warn!(target = "lister.pipeline", %run_id, field = warning.field, raw = %warning.raw, reason = %warning.reason, "field_parse_warning");
        }

        self.enter(Stage::EstimatingPrice);
        let estimate = capture_stage(
            Stage::EstimatingPrice,
            &mut stages,
            stages::estimate_price(&self.pricing, &generated, &code),
        )
        .await?;

        self.enter(Stage::AllocatingIdentifier);
        let identifier = capture_stage(
            Stage::AllocatingIdentifier,
            &mut stages,
            stages::allocate_identifier(
                &mut self.allocator,
                self.listings.as_ref(),
                options.dry_run,
            ),
        )
        .await?;

        self.enter(Stage::BuildingListing);
        let payload = capture_stage(
            Stage::BuildingListing,
            &mut stages,
            stages::build_listing(&code, &generated, &estimate, &identifier),
        )
        .await?;

        if !options.dry_run {
            self.enter(Stage::Submitting);
            capture_stage(
                Stage::Submitting,
                &mut stages,
                stages::submit_listing(self.listings.as_ref(), &payload),
            )
            .await
            .map_err(|err| err.with_identifier(identifier.clone()))?;
        }

        Ok(RunReport {
            run_id: run_id.to_string(),
            sku: identifier.to_string(),
            dry_run: options.dry_run,
            payload,
            warnings: generated.warnings,
            states: Vec::new(),
            stages,
        })
    }

    fn enter(&mut self, stage: Stage) {
        self.history.push(stage.into());
    }
}

async fn capture_stage<T, Fut>(
    stage: Stage,
    stages: &mut Vec<StageReport>,
    fut: Fut,
) -> Result<T, PipelineError>
where
    Fut: Future<Output = Result<StageOutcome<T>, PipelineError>>,
{
    let started = Instant::now();
    let outcome = fut.await?;
    let report = StageReport::new(stage.as_str(), started.elapsed().as_millis(), outcome.output);
    crate::metrics::stage_recorded(&report);
    stages.push(report);
    Ok(outcome.value)
}

pub mod stages {
    use super::*;

    pub async fn scan(
        source: &mut dyn BarcodeSource,
    ) -> Result<StageOutcome<ScannedCode>, PipelineError> {
        let code = source.capture_next_code().await?;
        let output = json!({
            "code": code.as_str(),
            "source": source.label(),
        });
        Ok(StageOutcome::new(code, output))
    }

    pub async fn generate_metadata(
        generator: &MetadataGenerator,
        code: &ScannedCode,
    ) -> Result<StageOutcome<GeneratedMetadata>, PipelineError> {
        let generated = generator.generate(code).await?;
        let output = json!({
            "title": generated.metadata.title,
            "brand": generated.metadata.brand,
            "category": generated.metadata.category,
            "msrp": generated.metadata.msrp,
            "warnings": generated.warnings.len(),
        });
        Ok(StageOutcome::new(generated, output))
    }

    pub async fn estimate_price(
        estimator: &PriceEstimator,
        generated: &GeneratedMetadata,
        code: &ScannedCode,
    ) -> Result<StageOutcome<PriceEstimate>, PipelineError> {
        let terms = estimator.policy().query.terms(&generated.metadata.title, code);
        let estimate = estimator.estimate(&terms).await?;
        let output = json!({
            "terms": terms,
            "estimate": estimate,
        });
        Ok(StageOutcome::new(estimate, output))
    }

    /// A live run only spends an identifier once the listing backend is able
    /// to accept a submission.
    pub async fn allocate_identifier(
        allocator: &mut IdentifierAllocator,
        listings: &dyn ListingBackend,
        dry_run: bool,
    ) -> Result<StageOutcome<ProductIdentifier>, PipelineError> {
        let identifier = if dry_run {
            allocator.peek_next()?
        } else {
            listings.preflight().map_err(|err| {
                PipelineError::new(
                    Stage::AllocatingIdentifier,
                    PipelineErrorKind::ListingSubmission,
                    err.to_string(),
                )
            })?;
            allocator.allocate_next()?
        };
        let output = json!({
            "identifier": identifier,
            "persisted": !dry_run,
        });
        Ok(StageOutcome::new(identifier, output))
    }

    pub async fn build_listing(
        code: &ScannedCode,
        generated: &GeneratedMetadata,
        estimate: &PriceEstimate,
        identifier: &ProductIdentifier,
    ) -> Result<StageOutcome<ListingPayload>, PipelineError> {
        let payload = crate::listing::build(code, &generated.metadata, estimate, identifier);
        let output = json!({
            "sku": payload.sku,
            "price": payload.price,
            "msrp": payload.msrp,
        });
        Ok(StageOutcome::new(payload, output))
    }

    pub async fn submit_listing(
        backend: &dyn ListingBackend,
        payload: &ListingPayload,
    ) -> Result<StageOutcome<SubmissionReceipt>, PipelineError> {
        let receipt = backend.submit(payload).await?;
        let output = json!({
            "status": receipt.status,
            "sku": receipt.sku,
        });
        Ok(StageOutcome::new(receipt, output))
    }
}
