use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use facereg::{
    config, EnrollmentService, FileRegistry, IdentityRegistry, MatchEngine, MatchResult,
    OnnxExtractor, RecognitionService,
};
use log::info;
use serde_json::json;

#[derive(Parser)]
#[command(name = "facereg")]
#[command(version, about = "Face enrollment and recognition against an embedding registry")]
struct Cli {
    /// Config file (defaults to the installed location)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enroll or re-enroll an identity from one or more images
    Enroll {
        /// External identifier of the person
        #[arg(short, long)]
        id: String,
        /// Display name
        #[arg(short, long)]
        name: String,
        /// Image files (encoded images or base64 data URIs)
        #[arg(required = true)]
        images: Vec<PathBuf>,
    },
    /// Recognize the face in an image
    Recognize {
        image: PathBuf,
    },
    /// List enrolled identities
    List,
    /// Open config file in editor
    Config,
}

fn main() -> Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .format_target(false)
        .format_timestamp(None)
        .parse_default_env()
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Enroll { id, name, images } => enroll(&cfg, &id, &name, &images),
        Commands::Recognize { image } => recognize(&cfg, &image),
        Commands::List => list(&cfg),
        Commands::Config => open_config(cli.config.as_deref()),
    }
}

fn open_registry(cfg: &config::Config) -> Result<Arc<dyn IdentityRegistry>> {
    let store = cfg.store_dir();
    let registry = FileRegistry::open(&store, cfg.dimension)
        .with_context(|| format!("Failed to open identity store at {}", store.display()))?;
    Ok(Arc::new(registry))
}

fn open_extractor(cfg: &config::Config) -> Result<OnnxExtractor> {
    let model = cfg
        .model
        .path
        .as_deref()
        .context("No face model configured. Set [model] path in the config file.")?;
    OnnxExtractor::new(model, cfg.model.input_size, cfg.model.face_selection)
        .context("Failed to initialize face embedding model")
}

fn enroll(cfg: &config::Config, id: &str, name: &str, paths: &[PathBuf]) -> Result<()> {
    info!("Enrolling {} ({}) from {} image(s)", id, name, paths.len());

    let images = paths
        .iter()
        .map(|p| std::fs::read(p).with_context(|| format!("reading {}", p.display())))
        .collect::<Result<Vec<_>>>()?;

    let mut service = EnrollmentService::new(open_registry(cfg)?, open_extractor(cfg)?);
    let outcome = service.enroll(id, name, &images)?;

    let message = match outcome.status {
        facereg::UpsertStatus::Created => "Face registered successfully.",
        facereg::UpsertStatus::Updated => "Face embedding updated successfully.",
    };
    let skipped: Vec<_> = outcome
        .skipped
        .iter()
        .map(|s| json!({ "image": paths[s.index].display().to_string(), "reason": s.reason }))
        .collect();
    let body = json!({
        "message": message,
        "status": outcome.status,
        "external_id": outcome.record.external_id,
        "name": outcome.record.display_name,
        "samples_used": outcome.samples_used,
        "skipped": skipped,
        "face_embedding": outcome.embedding(),
    });
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

fn recognize(cfg: &config::Config, path: &Path) -> Result<()> {
    let image = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;

    let mut service = RecognitionService::new(
        open_registry(cfg)?,
        open_extractor(cfg)?,
        MatchEngine::new(cfg.threshold),
    );
    let outcome = service.recognize(&image)?;

    let body = match &outcome.result {
        MatchResult::Matched {
            external_id,
            display_name,
            distance,
            ..
        } => json!({
            "status": "success",
            "message": format!("Face recognized as {} (ID: {})", display_name, external_id),
            "external_id": external_id,
            "name": display_name,
            "confidence": outcome.result.confidence_percent(),
            "distance": distance,
        }),
        MatchResult::NoMatch => json!({
            "status": "failure",
            "message": "Face not recognized or no strong match found.",
            "external_id": "UNKNOWN",
            "name": "UNKNOWN",
            "confidence": 0.0,
        }),
    };
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

fn list(cfg: &config::Config) -> Result<()> {
    let snapshot = open_registry(cfg)?
        .snapshot()
        .context("Failed to read identity store")?;

    let identities: Vec<_> = snapshot
        .records
        .iter()
        .map(|r| json!({ "id": r.id, "external_id": r.external_id, "name": r.display_name }))
        .collect();
    let body = json!({ "identities": identities, "skipped": snapshot.skipped });
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

fn open_config(path: Option<&Path>) -> Result<()> {
    let config_path = path.unwrap_or(&config::CONFIG_PATH);
    let editor = env::var("EDITOR").unwrap_or_else(|_| "vi".to_string());

    info!("Opening config file: {:?}", config_path);

    let status = std::process::Command::new(editor)
        .arg(config_path)
        .status()
        .context("Failed to open editor")?;

    if !status.success() {
        anyhow::bail!("Editor exited with non-zero status");
    }

    Ok(())
}
