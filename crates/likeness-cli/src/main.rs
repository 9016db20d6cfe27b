use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing_subscriber::EnvFilter;

use likeness_core::{ImageSource, MatchingEngine};
use likeness_store::RegistryStore;

mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "likeness", about = "Likeness face-matching CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a reference photo for an identity
    Enroll {
        /// Path to the reference photo
        image: PathBuf,
        /// Display label for this identity
        #[arg(short, long)]
        label: String,
        /// Identity id (generated when omitted)
        #[arg(long)]
        id: Option<String>,
    },
    /// Search the registry for the best match to a photo
    Identify {
        /// Path to the query photo
        image: PathBuf,
        /// Override the backend's acceptance threshold
        #[arg(short, long)]
        threshold: Option<f32>,
    },
    /// Compare two photos directly
    Compare {
        image_a: PathBuf,
        image_b: PathBuf,
    },
    /// List registered identities
    List,
    /// Remove a registered identity
    Remove {
        /// Identity id to remove
        id: String,
    },
    /// Show the active backend and configuration
    Status,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();

    match cli.command {
        Commands::Enroll { image, label, id } => enroll(&config, image, label, id),
        Commands::Identify { image, threshold } => identify(&config, image, threshold),
        Commands::Compare { image_a, image_b } => compare(&config, image_a, image_b),
        Commands::List => list(&config),
        Commands::Remove { id } => remove(&config, &id),
        Commands::Status => status(&config),
    }
}

fn open_store(config: &Config) -> Result<RegistryStore> {
    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(RegistryStore::open(&config.db_path)?)
}

fn enroll(config: &Config, image: PathBuf, label: String, id: Option<String>) -> Result<()> {
    let mut engine = MatchingEngine::probe(&config.engine_config());
    let store = open_store(config)?;

    if engine.backend().is_none() {
        println!("feature unavailable");
        return Ok(());
    }

    let descriptor = engine.extract(&ImageSource::Path(image));
    if descriptor.is_none() {
        // The identity is still registered; matching will skip it until a
        // usable photo is re-registered.
        println!("no face found");
    }

    let record = store.enroll(id, &label, descriptor.as_ref())?;
    println!(
        "{}",
        json!({
            "id": record.id,
            "label": record.label,
            "backend": record.backend.map(|b| b.tag()),
            "created_at": record.created_at,
        })
    );
    Ok(())
}

fn identify(config: &Config, image: PathBuf, threshold: Option<f32>) -> Result<()> {
    let mut engine = MatchingEngine::probe(&config.engine_config());
    let store = open_store(config)?;

    let Some(backend) = engine.backend() else {
        println!("feature unavailable");
        return Ok(());
    };

    let Some(query) = engine.extract(&ImageSource::Path(image)) else {
        println!("no face found");
        return Ok(());
    };

    let candidates = store.candidates(backend)?;
    let result = match threshold {
        Some(t) => engine.search_with_threshold(&query, &candidates, t),
        None => engine.search(&query, &candidates),
    };

    match result {
        Some(matched) => println!(
            "{}",
            json!({
                "id": matched.identity_id,
                "score": matched.score,
                "backend": matched.backend.tag(),
            })
        ),
        None => println!("no match found"),
    }
    Ok(())
}

fn compare(config: &Config, image_a: PathBuf, image_b: PathBuf) -> Result<()> {
    let mut engine = MatchingEngine::probe(&config.engine_config());

    if engine.backend().is_none() {
        println!("feature unavailable");
        return Ok(());
    }

    match engine.compare_images(&ImageSource::Path(image_a), &ImageSource::Path(image_b)) {
        Some(verification) => println!(
            "{}",
            json!({
                "score": verification.score,
                "matched": verification.matched,
                "backend": verification.backend.tag(),
            })
        ),
        None => println!("no face found"),
    }
    Ok(())
}

fn list(config: &Config) -> Result<()> {
    let store = open_store(config)?;
    for record in store.list()? {
        println!(
            "{}",
            json!({
                "id": record.id,
                "label": record.label,
                "backend": record.backend.map(|b| b.tag()),
                "created_at": record.created_at,
            })
        );
    }
    Ok(())
}

fn remove(config: &Config, id: &str) -> Result<()> {
    let store = open_store(config)?;
    if store.remove(id)? {
        println!("removed {id}");
    } else {
        println!("unknown identity {id}");
    }
    Ok(())
}

fn status(config: &Config) -> Result<()> {
    let engine = MatchingEngine::probe(&config.engine_config());
    println!(
        "{}",
        json!({
            "backend": engine.backend().map(|b| b.tag()),
            "acceptance_threshold": engine.acceptance_threshold(),
            "model_dir": config.model_dir.display().to_string(),
            "db_path": config.db_path.display().to_string(),
        })
    );
    Ok(())
}
