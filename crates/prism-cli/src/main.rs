//! Prism CLI: operate the image catalog and the transform pipeline directly
//! against Postgres and the configured object store.
//!
//! Reads the same environment as `prism-worker` (see `.env`).

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use bytes::Bytes;
use clap::{Parser, Subcommand};
use prism_cli::{
    describe_spec, file_name, init_tracing, log_error, print_json, ErrorReport, Services,
};
use prism_core::{AppError, Config, TransformationSpec};
use prism_db::{connect, run_migrations};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "prism", about = "Prism image variant CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Apply pending database migrations
    Migrate,
    /// Upload an original image
    Upload {
        /// Owner UUID
        #[arg(long)]
        owner: Uuid,
        /// Path to the image file
        file: PathBuf,
    },
    /// Produce (or fetch) a variant synchronously
    Transform {
        image_id: Uuid,
        /// Transformation spec as JSON, e.g. '{"resize":{"width":200,"height":200}}'
        #[arg(long)]
        spec: String,
    },
    /// Queue a variant for the worker and print the job id
    Enqueue {
        image_id: Uuid,
        /// Transformation spec as JSON
        #[arg(long)]
        spec: String,
    },
    /// Show the queue state of a job
    JobStatus { job_id: String },
    /// Get an image with its variants
    Get { image_id: Uuid },
    /// List an owner's images, newest first
    List {
        #[arg(long)]
        owner: Uuid,
        #[arg(long, default_value = "0")]
        offset: i64,
        #[arg(long, default_value = "20")]
        limit: i64,
    },
    /// Print the canonical form and fingerprint of a spec
    Fingerprint {
        #[arg(long)]
        spec: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log_error(&err);
            let report = ErrorReport::from_error(&err);
            if let Err(e) = print_json(&report) {
                eprintln!("{:#}", e);
            }
            report.exit_code()
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    if let Commands::Fingerprint { spec } = &cli.command {
        return print_json(&describe_spec(spec)?);
    }

    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate()?;
    let pool = connect(&config).await?;

    if let Commands::Migrate = cli.command {
        run_migrations(&pool).await?;
        return print_json(&serde_json::json!({ "migrated": true }));
    }

    let services = Services::build(&config, pool.clone()).await?;
    let cancel = CancellationToken::new();

    match cli.command {
        Commands::Upload { owner, file } => {
            let data = tokio::fs::read(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let image = services
                .uploads
                .upload(owner, &file_name(&file), Bytes::from(data), &cancel)
                .await?;
            print_json(&image)?;
        }
        Commands::Transform { image_id, spec } => {
            let spec = TransformationSpec::from_json(&spec)?;
            let output = services
                .transforms
                .transform(image_id, &spec, &cancel)
                .await?;
            print_json(&output)?;
        }
        Commands::Enqueue { image_id, spec } => {
            let spec = TransformationSpec::from_json(&spec)?;
            let job_id = services.publisher.enqueue(image_id, &spec, &cancel).await?;
            print_json(&serde_json::json!({ "job_id": job_id }))?;
        }
        Commands::JobStatus { job_id } => {
            let state = services
                .publisher
                .job_status(&job_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Job {} not found", job_id)))?;
            print_json(&state)?;
        }
        Commands::Get { image_id } => {
            let image = services.queries.get_image(image_id).await?;
            print_json(&image)?;
        }
        Commands::List {
            owner,
            offset,
            limit,
        } => {
            let page = services.queries.list_images(owner, offset, limit).await?;
            print_json(&page)?;
        }
        Commands::Migrate | Commands::Fingerprint { .. } => {}
    }

    pool.close().await;
    Ok(())
}
