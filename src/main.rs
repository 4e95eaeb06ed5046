use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use voice_screening::clinical_scales::{ClinicalScale, ScaleScore};
use voice_screening::config::ScreeningConfig;
use voice_screening::personalization::{BaselineTracker, SampleKind};
use voice_screening::pipeline::ScreeningPipeline;
use voice_screening::submission::SubmissionClient;
use voice_screening::transport::{HttpTransport, StaticToken};
use voice_screening::{AudioArtifact, ScreeningError};

/// Environment variable holding the backend bearer token
const TOKEN_ENV: &str = "VOICESCREEN_TOKEN";

/// Headless client for voice-based mental-health screening
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the config file (defaults to ~/.voicescreen/config.json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the analysis backend base URL
    #[arg(long)]
    api_url: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Classify a raw score on a clinical scale (PHQ-9, GAD-7, PSS, WEMWBS)
    Classify {
        scale: ClinicalScale,
        score: f64,
    },

    /// Upload a mono 16 kHz 16-bit WAV recording and wait for its analysis
    Submit {
        path: PathBuf,

        /// Language code (e.g., "en")
        #[arg(short, long)]
        language: Option<String>,

        /// Do not count this sample toward the personal baseline
        #[arg(long)]
        demo: bool,
    },

    /// Show backend processing status of an uploaded sample
    Status { sample_id: String },

    /// Show personal baseline progress
    Baseline,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .init();

    let mut config = match &args.config {
        Some(path) => ScreeningConfig::load(path)?,
        None => ScreeningConfig::load_or_default(),
    };
    if let Some(url) = &args.api_url {
        config.api_base_url = url.clone();
        config.validate()?;
    }
    debug!("Using config: {:?}", config);

    match args.command {
        Command::Classify { scale, score } => classify(scale, score),
        Command::Submit {
            path,
            language,
            demo,
        } => submit(&config, path, language, demo).await,
        Command::Status { sample_id } => status(&config, &sample_id).await,
        Command::Baseline => baseline(&config),
    }
}

fn classify(scale: ClinicalScale, score: f64) -> Result<()> {
    let scored = ScaleScore::evaluate(scale, score)?;
    let summary = scored.summary();
    println!("{}", summary.description);
    println!("  severity:   {}", summary.severity);
    println!("  normalized: {}%", summary.percent);
    if summary.concerning {
        println!("  this band is of clinical concern");
    }
    Ok(())
}

fn submission_client(config: &ScreeningConfig) -> Result<SubmissionClient> {
    let token = std::env::var(TOKEN_ENV).unwrap_or_default();
    if token.is_empty() {
        warn!("{} is not set, the backend will likely reject requests", TOKEN_ENV);
    }
    let transport = HttpTransport::new(
        &config.api_base_url,
        config.request_timeout(),
        Arc::new(StaticToken(token)),
    )?;
    Ok(SubmissionClient::new(
        Arc::new(transport),
        config.submission(),
    ))
}

fn load_tracker(config: &ScreeningConfig) -> Result<(BaselineTracker, PathBuf)> {
    let path = ScreeningConfig::baseline_path()?;
    let tracker = BaselineTracker::load_or_new(config.baseline(), &path)?;
    Ok((tracker, path))
}

async fn submit(
    config: &ScreeningConfig,
    path: PathBuf,
    language: Option<String>,
    demo: bool,
) -> Result<()> {
    let artifact = AudioArtifact::from_wav_file(&path)?;
    info!("Submitting {:?} ({:.1}s)", path, artifact.duration_secs);

    let client = submission_client(config)?;
    let (tracker, baseline_path) = load_tracker(config)?;
    let tracker = Arc::new(tracker);
    let language = language.unwrap_or_else(|| config.language.clone());
    let pipeline = ScreeningPipeline::new(Arc::new(client), tracker.clone(), language);

    let kind = if demo {
        SampleKind::Demo
    } else {
        SampleKind::Standard
    };

    let outcome = tokio::select! {
        outcome = pipeline.submit(&artifact, kind) => outcome,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, local audio left at {:?}", path);
            bail!("Submission interrupted");
        }
    };

    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(ScreeningError::Submission(e)) if e.requires_reauth() => {
            bail!("Backend rejected the credentials in {}: {}", TOKEN_ENV, e);
        }
        Err(e) => return Err(e.into()),
    };

    tracker
        .save(&baseline_path)
        .context("Failed to persist baseline progress")?;

    println!("{}", serde_json::to_string_pretty(&outcome.result)?);
    for summary in outcome.result.scale_summaries() {
        println!("{}", summary.description);
    }
    if outcome.baseline.baseline_just_established {
        println!("Personal baseline established");
    }
    Ok(())
}

async fn status(config: &ScreeningConfig, sample_id: &str) -> Result<()> {
    let client = submission_client(config)?;
    let status = client.get_status(sample_id).await?;
    match status.quality_score {
        Some(quality) => println!("{}: {} (quality {:.2})", sample_id, status.processing_status, quality),
        None => println!("{}: {}", sample_id, status.processing_status),
    }
    if let Some(error) = status.error {
        println!("  error: {}", error);
    }
    Ok(())
}

fn baseline(config: &ScreeningConfig) -> Result<()> {
    let (tracker, _) = load_tracker(config)?;
    let progress = tracker.snapshot();
    println!(
        "Samples: {}/{}{}",
        progress.samples_collected,
        progress.target_samples,
        if progress.baseline_established {
            " (established)"
        } else {
            ""
        }
    );
    println!("Remaining today: {}", progress.daily_samples_remaining);
    println!("Streak: {} day(s)", progress.streak_days);
    if let Some(score) = progress.personalization_score {
        println!("Personalization score: {:.1}", score);
    }
    Ok(())
}
