use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use vigil_core::{
    run_attempt, AccessDecisionEngine, CancelFlag, Config, EnrollmentStore, FeatureExtractor, FixedRegions,
    ImageFile, LogNotifier, ProbeSource, ScrfdDetector,
};
use vigil_hw::CameraSource;
use vigil_store::{SqliteEventSink, SqliteMirror};

#[derive(Parser)]
#[command(name = "vigil", about = "Vigil face access control CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enroll an identity from an image file or the camera
    Enroll {
        /// Identity name (also the reference image file stem)
        name: String,
        /// Read the face from this image instead of the camera
        #[arg(short, long)]
        image: Option<PathBuf>,
    },
    /// Run one access attempt and record it
    Verify {
        /// Use this image as the probe instead of the camera
        #[arg(short, long)]
        image: Option<PathBuf>,
    },
    /// List enrolled identities
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Remove an enrolled identity
    Remove {
        /// Identity name
        name: String,
    },
    /// Mark an identity active
    Activate {
        /// Identity name
        name: String,
    },
    /// Mark an identity inactive
    Deactivate {
        /// Identity name
        name: String,
    },
    /// Show recent access events for a name
    History {
        /// Declared name (use "unknown" for denied attempts)
        name: String,
        #[arg(short, long, default_value_t = 50)]
        limit: usize,
    },
    /// Rebuild the catalog from the reference image directory
    Sync,
    /// List V4L2 capture devices
    Devices,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    let conn = vigil_store::open(&config.db_path)
        .with_context(|| format!("opening database {}", config.db_path.display()))?;
    vigil_store::migrate(&conn)?;

    match cli.command {
        Commands::Enroll { name, image } => {
            let store = enrollment_store(&config, detecting_extractor(&config)?);
            let cancel = cancel_on_ctrl_c();
            let probe = probe_source(&config, image, cancel)?.capture()?;
            let identity = store.enroll(&name, &probe)?;
            println!(
                "Enrolled {} ({} features, reference {})",
                identity.name,
                identity.features.len(),
                identity.source_image.display()
            );
        }
        Commands::Verify { image } => {
            let extractor = detecting_extractor(&config)?;
            let store = Arc::new(enrollment_store(&config, extractor.clone()));
            let summary = store.load()?;
            tracing::info!(loaded = summary.loaded, skipped = summary.skipped, "catalog loaded");

            let engine = AccessDecisionEngine::new(extractor, store, config.similarity_threshold);
            let cancel = cancel_on_ctrl_c();
            let mut source = probe_source(&config, image, cancel)?;
            let sink = SqliteEventSink::new(&config.db_path);
            let decision = run_attempt(
                &engine,
                source.as_mut(),
                &sink,
                &LogNotifier,
                config.evidence_dir.as_deref(),
            )?;

            println!(
                "{} {} (similarity {:.3}, threshold {:.3})",
                decision.outcome,
                decision.matched_name,
                decision.similarity,
                engine.threshold()
            );
            if !decision.is_admitted() {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::List { json } => {
            let identities = vigil_store::list_identities(&conn)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&identities)?);
            } else if identities.is_empty() {
                println!("No identities enrolled");
            } else {
                println!("{:<4} {:<24} {:<20} {:<20} ACTIVE", "ID", "NAME", "CREATED", "LAST ACCESS");
                for r in &identities {
                    println!(
                        "{:<4} {:<24} {:<20} {:<20} {}",
                        r.id,
                        r.name,
                        r.created_at,
                        r.last_access.as_deref().unwrap_or("-"),
                        if r.active { "yes" } else { "no" }
                    );
                }
            }
        }
        Commands::Remove { name } => {
            // Removal never extracts features, so no model is needed.
            let extractor = Arc::new(FeatureExtractor::new(Box::new(FixedRegions::default())));
            let store = enrollment_store(&config, extractor);
            if store.remove(&name)? {
                println!("Removed {name}");
            } else {
                println!("No identity named {name}");
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Activate { name } => {
            if !set_status(&conn, &name, true)? {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Deactivate { name } => {
            if !set_status(&conn, &name, false)? {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::History { name, limit } => {
            let events = vigil_store::events_for(&conn, &name, limit)?;
            if events.is_empty() {
                println!("No access events for {name}");
            }
            for e in &events {
                println!(
                    "{}  {:<8}  {:>6.1}%  {}",
                    e.occurred_at,
                    e.outcome,
                    e.similarity * 100.0,
                    e.evidence_ref.as_deref().unwrap_or("")
                );
            }
        }
        Commands::Sync => {
            let store = enrollment_store(&config, detecting_extractor(&config)?);
            let summary = store.load()?;
            println!("Loaded {} identities ({} skipped)", summary.loaded, summary.skipped);
        }
        Commands::Devices => {
            let devices = vigil_hw::list_devices();
            if devices.is_empty() {
                println!("No V4L2 capture devices found");
            }
            for d in devices {
                println!("{}  {} ({}, {})", d.path, d.name, d.driver, d.bus);
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn set_status(conn: &vigil_store::Connection, name: &str, active: bool) -> Result<bool> {
    let found = vigil_store::set_active(conn, name, active)?;
    if found {
        println!("{name} {}", if active { "activated" } else { "deactivated" });
    } else {
        println!("No identity named {name}");
    }
    Ok(found)
}

fn detecting_extractor(config: &Config) -> Result<Arc<FeatureExtractor>> {
    let model_path = config.detector_model_path();
    let detector = ScrfdDetector::load(&model_path)
        .with_context(|| format!("loading face detector {}", model_path.display()))?;
    tracing::info!(path = %model_path.display(), "SCRFD detector loaded");
    Ok(Arc::new(FeatureExtractor::new(Box::new(detector))))
}

fn enrollment_store(config: &Config, extractor: Arc<FeatureExtractor>) -> EnrollmentStore {
    EnrollmentStore::new(
        &config.faces_dir,
        extractor,
        Arc::new(SqliteMirror::new(&config.db_path)),
    )
}

fn probe_source(config: &Config, image: Option<PathBuf>, cancel: CancelFlag) -> Result<Box<dyn ProbeSource>> {
    Ok(match image {
        Some(path) => Box::new(ImageFile::new(path)),
        None => Box::new(CameraSource::open(&config.camera_device, config.warmup_frames, cancel)?),
    })
}

/// Flag set by Ctrl-C so a running capture stops between frames.
fn cancel_on_ctrl_c() -> CancelFlag {
    let flag = CancelFlag::new();
    let handle = flag.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received; cancelling capture");
            handle.cancel();
        }
    });
    flag
}
