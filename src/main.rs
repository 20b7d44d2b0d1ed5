//! ocrlayer
//!
//! Makes scanned PDFs and images searchable by writing the OCR result back
//! as invisible text, either for one file or for every file dropped into a
//! watched folder.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ocrlayer::ocr::OcrProvider;
use ocrlayer::watch::watch;
use ocrlayer::{Config, Pipeline, ProcessReport};

#[derive(Parser, Debug)]
#[command(name = "ocrlayer", version, about)]
struct Cli {
    /// Input PDF or image (directory with --watch)
    input: PathBuf,

    /// Output PDF (directory with --watch)
    output: PathBuf,

    /// Request GPU inference
    #[arg(long)]
    use_gpu: bool,

    /// Watch INPUT for new files and write results into OUTPUT
    #[arg(long)]
    watch: bool,

    /// OCR language, e.g. chi_sim+eng
    #[arg(short = 'l', long = "lang")]
    lang: Option<String>,

    /// OCR engine: tesseract-cli or tesseract
    #[arg(long)]
    engine: Option<OcrProvider>,

    /// Tesseract page segmentation mode
    #[arg(long)]
    psm: Option<u8>,

    /// Drop words below this confidence (0-100)
    #[arg(long)]
    min_confidence: Option<f32>,

    /// Leave pages that already contain text untouched
    #[arg(long)]
    skip_text: bool,

    /// Resolution for pages rendered by MuPDF
    #[arg(long)]
    render_dpi: Option<f32>,

    /// Resolution assumed for images that store none
    #[arg(long)]
    image_dpi: Option<f32>,

    /// Use the polling watcher
    #[arg(long)]
    poll: bool,

    /// In watch mode, also process files already in INPUT
    #[arg(long)]
    process_existing: bool,

    /// Hide the progress bar
    #[arg(long)]
    no_progress: bool,

    /// Write the processing report as JSON
    #[arg(long, value_name = "PATH")]
    report_json: Option<PathBuf>,
}

impl Cli {
    fn apply(&self, config: &mut Config) {
        if let Some(lang) = &self.lang {
            config.ocr.language = lang.clone();
        }
        if let Some(engine) = self.engine {
            config.ocr.engine = engine;
        }
        if let Some(psm) = self.psm {
            config.ocr.psm = psm;
        }
        if let Some(min_confidence) = self.min_confidence {
            config.ocr.min_confidence = min_confidence;
        }
        if let Some(dpi) = self.render_dpi {
            config.render.render_dpi = dpi;
        }
        if let Some(dpi) = self.image_dpi {
            config.render.image_dpi = dpi;
        }
        config.ocr.use_gpu |= self.use_gpu;
        config.render.skip_text |= self.skip_text;
        config.watch.poll |= self.poll;
        config.watch.process_existing |= self.process_existing;
        if self.no_progress {
            config.render.show_progress = false;
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "ocrlayer=info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::from_env().unwrap_or_else(|e| {
        tracing::warn!("Failed to load config from env: {}, using defaults", e);
        Config::default()
    });
    cli.apply(&mut config);
    config.validate().context("Invalid command line option")?;

    tracing::info!("ocrlayer v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        "OCR: {} ({}, psm {})",
        config.ocr.engine,
        config.ocr.language,
        config.ocr.psm
    );

    let pipeline = Pipeline::new(config);
    pipeline.check().await.context("OCR engine check failed")?;

    if cli.watch {
        if cli.report_json.is_some() {
            tracing::warn!("--report-json is ignored in watch mode");
        }
        watch(&pipeline, &cli.input, &cli.output, shutdown_signal()).await?;
        tracing::info!("Watch stopped");
        return Ok(());
    }

    let report = pipeline
        .process_file(&cli.input, &cli.output)
        .await
        .with_context(|| format!("Failed to process {}", cli.input.display()))?;

    if let Some(path) = &cli.report_json {
        write_report(path, &report).await?;
    }
    Ok(())
}

async fn write_report(path: &Path, report: &ProcessReport) -> anyhow::Result<()> {
    let json = serde_json::to_vec_pretty(report)?;
    tokio::fs::write(path, json)
        .await
        .with_context(|| format!("Failed to write report to {}", path.display()))?;
    tracing::info!("Report written to {}", path.display());
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
