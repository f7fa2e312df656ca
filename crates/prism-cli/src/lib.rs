//! Building blocks for the `prism` operator CLI

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use prism_core::{
    fingerprint, AppError, Config, ErrorCategory, ErrorMetadata, LogLevel, TransformationSpec,
};
use prism_db::{PgImageRepository, PgVariantRepository};
use prism_processing::ImageTransformer;
use prism_queue::PgJobQueue;
use prism_services::{
    ImageQueryService, PipelineMetrics, TransformPublisher, TransformService, UploadService,
    VariantPipeline,
};
use prism_storage::create_storage;
use serde::Serialize;
use sqlx::PgPool;

/// Initialize tracing for CLI binaries. Logs go to stderr so stdout stays JSON.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();
}

pub fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize output")?;
    println!("{}", out);
    Ok(())
}

/// What the operator sees when a command fails. Internal detail goes to the log only.
#[derive(Debug, Serialize)]
pub struct ErrorReport {
    pub error: &'static str,
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<&'static str>,
    #[serde(skip)]
    category: ErrorCategory,
}

impl ErrorReport {
    pub fn from_error(err: &anyhow::Error) -> Self {
        match err.downcast_ref::<AppError>() {
            Some(app) => Self {
                error: app.category().as_str(),
                code: app.error_code(),
                message: app.client_message(),
                hint: app.suggested_action(),
                category: app.category(),
            },
            // Config, IO and argument failures raised by the CLI itself
            None => Self {
                error: ErrorCategory::BadRequest.as_str(),
                code: "CLI_ERROR",
                message: format!("{:#}", err),
                hint: None,
                category: ErrorCategory::BadRequest,
            },
        }
    }

    pub fn exit_status(&self) -> u8 {
        match self.category {
            ErrorCategory::BadRequest => 2,
            ErrorCategory::NotFound => 3,
            ErrorCategory::ServerError => 1,
        }
    }

    pub fn exit_code(&self) -> ExitCode {
        ExitCode::from(self.exit_status())
    }
}

/// Log the full error chain at the level its metadata asks for
pub fn log_error(err: &anyhow::Error) {
    let Some(app) = err.downcast_ref::<AppError>() else {
        tracing::error!(error = format!("{:#}", err), "Command failed");
        return;
    };

    let detail = app.detailed_message();
    match app.log_level() {
        LogLevel::Debug => {
            tracing::debug!(error_type = app.error_type(), error = %detail, "Command failed")
        }
        LogLevel::Warn => {
            tracing::warn!(error_type = app.error_type(), error = %detail, "Command failed")
        }
        LogLevel::Error => {
            tracing::error!(error_type = app.error_type(), error = %detail, "Command failed")
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FingerprintOutput {
    pub spec_hash: String,
    pub canonical: String,
}

/// Parse and validate a spec, returning its canonical form and fingerprint
pub fn describe_spec(json: &str) -> anyhow::Result<FingerprintOutput> {
    let spec = TransformationSpec::from_json(json)?;
    Ok(FingerprintOutput {
        spec_hash: fingerprint(&spec)?,
        canonical: spec.canonical_json()?,
    })
}

/// Final path component, used as the recorded filename of an upload
pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string())
}

/// Services wired against Postgres and the configured object store
pub struct Services {
    pub uploads: UploadService,
    pub transforms: TransformService,
    pub publisher: TransformPublisher,
    pub queries: ImageQueryService,
}

impl Services {
    pub async fn build(config: &Config, pool: PgPool) -> anyhow::Result<Self> {
        let storage = create_storage(config)
            .await
            .context("Failed to initialize storage")?;
        let images = Arc::new(PgImageRepository::new(pool.clone()));
        let engine = Arc::new(ImageTransformer::new(config.limits().clone()));
        let pipeline = VariantPipeline::new(
            images.clone(),
            Arc::new(PgVariantRepository::new(pool.clone())),
            storage.clone(),
            engine.clone(),
            PipelineMetrics::from_global(),
        );

        Ok(Self {
            uploads: UploadService::new(
                images.clone(),
                storage,
                engine,
                config.limits().clone(),
            ),
            transforms: TransformService::new(pipeline),
            publisher: TransformPublisher::new(
                images.clone(),
                Arc::new(PgJobQueue::new(pool, config.queue())),
            ),
            queries: ImageQueryService::new(images),
        })
    }
}
