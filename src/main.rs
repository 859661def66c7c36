mod config;
mod ebay;
mod http;
mod listing;
mod llm;
mod metrics;
mod models;
mod pipeline;
mod pricing;
mod scanner;
mod sellbrite;
mod sku;

use clap::Parser;
use config::AppConfig;
use eyre::{WrapErr, eyre};
use models::{RunReport, ScannedCode};
use pipeline::{Pipeline, PipelineError, RunOptions};
use std::path::PathBuf;
use tracing::{debug, error, info};
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser, Debug)]
#[command(
    name = "upc-lister",
    version,
    about = "Scan a barcode, price it from sold listings and publish it"
)]
struct Cli {
    /// YAML config file (falls back to $UPC_LISTER_CONFIG); environment variables override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Use this barcode instead of reading the capture source.
    #[arg(long)]
    code: Option<String>,

    /// Build the listing but leave the counter and the listing backend untouched.
    #[arg(long, default_value_t = false)]
    dry_run: bool,

    #[arg(long, help = "Print the run report as JSON on stdout")]
    json: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    dotenvy::dotenv().ok();
    init_tracing();

    if let Err(err) = run(Cli::parse()).await {
        match err.downcast_ref::<PipelineError>() {
            Some(failure) => error!(
                target = "lister.cli",
                stage = %failure.stage(),
                kind = ?failure.kind(),
                "{failure}"
            ),
            None => error!(target = "lister.cli", "{err:#}"),
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> eyre::Result<()> {
    let config = AppConfig::load(cli.config.as_deref()).wrap_err("loading configuration")?;
    let code = cli
        .code
        .as_deref()
        .map(|raw| ScannedCode::parse(raw).ok_or_else(|| eyre!("--code {raw:?} is not a barcode")))
        .transpose()?;

    let mut pipeline = Pipeline::from_config(&config, code);
    let report = match pipeline
        .run(RunOptions {
            dry_run: cli.dry_run,
        })
        .await
    {
        Ok(report) => report,
        Err(err) => {
            debug!(target = "lister.cli", states = ?pipeline.history(), "run aborted");
            return Err(err.into());
        }
    };

    summarize(&report);
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    Ok(())
}

fn summarize(report: &RunReport) {
    info!(
        target = "lister.cli",
        sku = %report.sku,
        title = %report.payload.title,
        price = report.payload.price,
        dry_run = report.dry_run,
        "listing {}",
        if report.dry_run { "prepared" } else { "submitted" }
    );
    for warning in &report.warnings {
        info!(target = "lister.cli", "warning: {warning}");
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_writer(std::io::stderr).try_init();
}
