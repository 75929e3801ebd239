use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use facesort::{
    config, corpus, report::SortReport, router::OutputRouter, storage, Pipeline, PhotoClassifier,
    ReferenceDatabase,
};
use log::{info, warn};

#[derive(Parser)]
#[command(name = "facesort")]
#[command(version, about = "Sort photos into per-person folders by face recognition")]
struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log per-label similarity scores for every face
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ReferenceArgs {
    /// Directory holding one sub-directory of reference images per person
    #[arg(short, long)]
    references: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify every photo and copy it into the folder of each recognised person
    Sort {
        #[command(flatten)]
        refs: ReferenceArgs,
        /// Directory of photos to sort
        #[arg(short, long)]
        photos: Option<PathBuf>,
        /// Directory receiving the per-person folders
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Minimum cosine similarity for a match
        #[arg(short, long)]
        threshold: Option<f32>,
        /// Load the reference database from a snapshot instead of the reference images
        #[arg(short, long)]
        snapshot: Option<PathBuf>,
        /// Write a JSON summary of the run
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Build the reference database and print a summary
    Index {
        #[command(flatten)]
        refs: ReferenceArgs,
        /// Save the database as a snapshot
        #[arg(long)]
        save: Option<PathBuf>,
    },
    /// Open config file in editor
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_target(false)
        .format_timestamp(None)
        .init();

    let mut cfg = config::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Sort {
            refs,
            photos,
            output,
            threshold,
            snapshot,
            report,
        } => {
            if let Some(dir) = refs.references {
                cfg.reference_dir = dir;
            }
            if let Some(dir) = photos {
                cfg.photos_dir = dir;
            }
            if let Some(dir) = output {
                cfg.output_dir = dir;
            }
            if let Some(t) = threshold {
                cfg.threshold = t;
            }
            cfg.validate()?;
            sort(&cfg, snapshot, report)
        }
        Commands::Index { refs, save } => {
            if let Some(dir) = refs.references {
                cfg.reference_dir = dir;
            }
            index(&cfg, save)
        }
        Commands::Config => open_config(cli.config),
    }
}

fn pipeline(cfg: &config::Config) -> Result<Pipeline> {
    Pipeline::new(
        &cfg.model_paths(),
        cfg.detection.score_threshold,
        cfg.detection.nms_threshold,
    )
    .context("Failed to initialize face recognition pipeline")
}

fn build_references(cfg: &config::Config, pipeline: &mut Pipeline) -> Result<ReferenceDatabase> {
    let corpus = corpus::reference_corpus(&cfg.reference_dir)?;
    let db = ReferenceDatabase::from_corpus(&corpus, pipeline)
        .context("Failed to build reference database")?;
    Ok(db)
}

fn sort(
    cfg: &config::Config,
    snapshot: Option<PathBuf>,
    report_path: Option<PathBuf>,
) -> Result<()> {
    info!("=== STEP 1: LOADING DATA ===");
    let mut pipeline = pipeline(cfg)?;
    let db = match snapshot {
        Some(path) => {
            info!("Loading reference database from snapshot {}", path.display());
            storage::load(&path)?
        }
        None => build_references(cfg, &mut pipeline)?,
    };
    let photos = corpus::photo_files(&cfg.photos_dir)?;

    info!("=== STEP 2: REFERENCE DATABASE ===");
    db.log_summary();
    let labels: Vec<String> = db.labels().map(str::to_string).collect();
    let classifier = PhotoClassifier::new(Arc::new(db), cfg.threshold);

    info!("=== STEP 3: CREATING OUTPUT STRUCTURE ===");
    let router = OutputRouter::new(&cfg.output_dir);
    router.create_label_dirs(labels.iter().map(String::as_str))?;

    info!("=== STEP 4: PROCESSING PHOTOS ===");
    let mut report = SortReport::new(cfg.threshold, labels);
    for photo in &photos {
        let recognized = classifier
            .process_photo(photo, &mut pipeline)
            .with_context(|| format!("classifying {}", photo.display()))?;
        let copies = router.route(photo, &recognized);
        if copies.len() < recognized.len() {
            warn!(
                "{} copied to {} of {} folder(s)",
                photo.display(),
                copies.len(),
                recognized.len()
            );
        }
        report.record(photo, recognized, copies);
    }

    info!(
        "=== PROCESSING COMPLETE: {} of {} photo(s) matched ===",
        report.matched(),
        photos.len()
    );
    if let Some(path) = report_path {
        report.write(&path)?;
        info!("Report written to {}", path.display());
    }
    Ok(())
}

fn index(cfg: &config::Config, save: Option<PathBuf>) -> Result<()> {
    let mut pipeline = pipeline(cfg)?;
    let db = build_references(cfg, &mut pipeline)?;
    db.log_summary();

    if let Some(path) = save {
        storage::save(&db, &path).context("Failed to save snapshot")?;
        info!("✓ Snapshot saved to {}", path.display());
    }
    Ok(())
}

fn open_config(path: Option<PathBuf>) -> Result<()> {
    let config_path = path.unwrap_or_else(|| config::CONFIG_PATH.clone());
    if !config_path.exists() {
        config::save_config(&config::Config::default(), Some(&config_path))
            .context("Failed to write default config")?;
    }
    let editor = env::var("EDITOR").unwrap_or_else(|_| "vi".to_string());

    info!("Opening config file: {}", config_path.display());

    let status = std::process::Command::new(editor)
        .arg(&config_path)
        .status()
        .context("Failed to open editor")?;

    if !status.success() {
        anyhow::bail!("Editor exited with non-zero status");
    }

    Ok(())
}
