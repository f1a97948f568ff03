use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use gpsmax::analyze::{analyze_track, format_report, format_tsv_row, TSV_HEADER};
use gpsmax::app::ports::{MountInfo, MountOutcome, MountService, Picker};
use gpsmax::config::{load_config, EffectiveConfig};
use gpsmax::db::import_manifest;
use gpsmax::error::DeviceError;
use gpsmax::formats::preview_file;
use gpsmax::infra::gio_mount::gvfs_root;
use gpsmax::infra::{FzfPicker, GioMountService, StdinPrompter};
use gpsmax::ingest::{derive_device_id, run_ingest, IngestOptions};
use gpsmax::logging::init_logging;
use gpsmax::normalize::{
    list_gpx_candidates, FileState, GeotagOverride, IntentOverrides, NormalizeRun, RunOptions,
};
use std::path::PathBuf;
use std::process::exit;
use tracing::{info, warn};

/// Exit status when a candidate root holds no GPX files at all.
const EXIT_NO_CANDIDATES: i32 = 2;

#[derive(Parser)]
#[command(name = "gpsmax")]
#[command(about = "Personal GPS track workflow: ingest, normalize, import and analyze GPX files")]
#[command(version)]
struct Cli {
    /// Debug-level logging (RUST_LOG still wins when set)
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Copy GPX files from a mounted Garmin device into the raw archive
    Ingest(IngestArgs),
    /// Normalize archived GPX files into the working tree
    Normalize(NormalizeArgs),
    /// Load an ingest manifest.json into the SQLite database
    Import(ImportArgs),
    /// Print distance, duration and speed statistics for GPX files
    Analyze(AnalyzeArgs),
    /// Summarize one GPX file for the picker's preview pane
    #[command(hide = true)]
    Preview { file: PathBuf },
}

#[derive(Args)]
struct IngestArgs {
    /// Device URI such as mtp://Garmin_GPSMAP_67_0000abcd12/ (discovered when omitted)
    #[arg(long)]
    mtp_uri: Option<String>,
    /// Do not try to mount the device first
    #[arg(long)]
    no_mount: bool,
    /// Also write manifest.csv
    #[arg(long)]
    csv: bool,
    /// Download date folder, YYYY-MM-DD (default: today)
    #[arg(long)]
    download_date: Option<String>,
    /// Year folder (default: current year)
    #[arg(long)]
    year: Option<String>,
    #[arg(long)]
    device_id: Option<String>,
    #[arg(long)]
    raw_root: Option<PathBuf>,
    /// Show what would be copied without copying
    #[arg(long)]
    dry_run: bool,
}

#[derive(Args)]
struct NormalizeArgs {
    /// GPX files to normalize (picked interactively from the raw root when omitted)
    gpx: Vec<PathBuf>,
    #[arg(long)]
    raw_root: Option<PathBuf>,
    #[arg(long)]
    work_root: Option<PathBuf>,
    #[arg(long)]
    device_id: Option<String>,
    /// Preset name from the [normalize.presets] config table
    #[arg(long)]
    preset: Option<String>,
    #[arg(long)]
    activity: Option<String>,
    #[arg(long)]
    title: Option<String>,
    /// Mark as a photo-geotagging candidate
    #[arg(long, conflicts_with = "no_geotag")]
    geotag: bool,
    #[arg(long)]
    no_geotag: bool,
    #[arg(long)]
    photos_pending: bool,
    #[arg(long)]
    notes: Option<String>,
    /// Ask for each intent field interactively
    #[arg(long)]
    prompt: bool,
    /// Plan names and paths without writing anything
    #[arg(long)]
    dry_run: bool,
}

#[derive(Args)]
struct ImportArgs {
    /// Path to an ingest manifest.json
    manifest: PathBuf,
    /// SQLite database (default: configured sqlite_path)
    #[arg(long)]
    db: Option<PathBuf>,
}

#[derive(Args)]
struct AnalyzeArgs {
    /// GPX files to analyze (picked interactively from the working root when omitted)
    gpx: Vec<PathBuf>,
    #[arg(long)]
    work_root: Option<PathBuf>,
    /// Tab-separated output with a header row
    #[arg(long)]
    tsv: bool,
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    // Runs once per highlighted line inside fzf; keep it free of config and log setup.
    if let Commands::Preview { file } = &cli.command {
        print!("{}", preview_file(file));
        return Ok(());
    }

    let (cli_raw, cli_work) = match &cli.command {
        Commands::Ingest(args) => (args.raw_root.as_deref(), None),
        Commands::Normalize(args) => (args.raw_root.as_deref(), args.work_root.as_deref()),
        Commands::Analyze(args) => (None, args.work_root.as_deref()),
        Commands::Import(_) | Commands::Preview { .. } => (None, None),
    };
    let config = load_config(cli_raw, cli_work).context("Failed to load configuration")?;

    let log_guard = init_logging(Some(&config.runtime_root.join("logs")), cli.verbose);
    for (key, source) in &config.provenance {
        tracing::debug!(key = %key, source = %source, "Config value");
    }

    let code = match cli.command {
        Commands::Ingest(args) => ingest(&config, args)?,
        Commands::Normalize(args) => normalize(config, args)?,
        Commands::Import(args) => import(&config, args)?,
        Commands::Analyze(args) => analyze(&config, args)?,
        Commands::Preview { .. } => 0,
    };
    if code != 0 {
        // exit() skips destructors; flush the file log first.
        drop(log_guard);
        exit(code);
    }
    Ok(())
}

/// fzf picker whose preview pane calls back into this executable.
fn picker() -> FzfPicker {
    match std::env::current_exe() {
        Ok(exe) => FzfPicker::default().with_preview_program(&exe),
        Err(e) => {
            warn!(error = %e, "Cannot locate own executable; preview uses gpsmax from PATH");
            FzfPicker::default()
        }
    }
}

fn ingest(config: &EffectiveConfig, args: IngestArgs) -> Result<i32> {
    let service = GioMountService::default();
    let mount = match &args.mtp_uri {
        Some(uri) => MountInfo::from_uri(uri, &gvfs_root())
            .with_context(|| format!("Not an mtp:// URI: {uri}"))?,
        None => service.discover().context("Device discovery failed")?,
    };
    info!(uri = %mount.uri, mount = %mount.gvfs_mount.display(), "Using device");

    if !args.no_mount {
        match service.ensure(&mount.uri)? {
            MountOutcome::Mounted => info!("Mounted device"),
            MountOutcome::AlreadyMounted => info!("Device already mounted"),
            MountOutcome::Failed(reason) => warn!(reason = %reason, "Mount attempt failed"),
        }
    }
    if !mount.gvfs_mount.is_dir() {
        return Err(DeviceError::MountMissing(mount.gvfs_mount.clone()).into());
    }

    let device_id = args
        .device_id
        .clone()
        .unwrap_or_else(|| derive_device_id(&mount));
    let options = IngestOptions {
        year: args.year,
        download_date: args.download_date,
        write_csv: args.csv,
        dry_run: args.dry_run,
    };
    let report = run_ingest(&config.raw_root, &mount, &device_id, &options)?;

    println!("Device:      {}", device_id);
    println!("Destination: {}", report.dest_base.display());
    println!("Planned:     {}", report.planned.len());
    if args.dry_run {
        for plan in &report.planned {
            println!("  [{}] {} -> {}", plan.category, plan.source_relpath, plan.dest.display());
        }
        return Ok(0);
    }
    println!("Copied:      {}", report.copied());
    println!("Identical:   {}", report.skipped_identical);
    if let Some(path) = &report.manifest_path {
        println!("Manifest:    {}", path.display());
    }
    Ok(0)
}

fn normalize(config: EffectiveConfig, args: NormalizeArgs) -> Result<i32> {
    let selected = if args.gpx.is_empty() {
        let candidates = list_gpx_candidates(&config.raw_root);
        if candidates.is_empty() {
            eprintln!("No GPX files found under {}", config.raw_root.display());
            return Ok(EXIT_NO_CANDIDATES);
        }
        picker().select(&candidates, "Select GPX file(s) to normalize:")?
    } else {
        args.gpx
    };

    let geotag = match (args.geotag, args.no_geotag) {
        (true, _) => GeotagOverride::Force(true),
        (_, true) => GeotagOverride::Force(false),
        _ => GeotagOverride::Unset,
    };
    let options = RunOptions {
        preset: args.preset,
        overrides: IntentOverrides {
            title: args.title,
            activity: args.activity,
            geotag,
            photos_pending: args.photos_pending,
            notes: args.notes,
            device_id: args.device_id,
        },
        prompt: args.prompt,
        dry_run: args.dry_run,
        ..RunOptions::default()
    };

    let mut run = NormalizeRun::new(config).with_prompter(Box::new(StdinPrompter::stdio()));
    let summary = run.run(&selected, &options)?;

    for outcome in &summary.outcomes {
        match (outcome.state, &outcome.normalized_path) {
            (FileState::Failed, _) => println!(
                "FAILED   {} ({})",
                outcome.source.display(),
                outcome.error.as_deref().unwrap_or("unknown error")
            ),
            (FileState::Skipped, _) => println!("SKIPPED  {}", outcome.source.display()),
            (_, Some(dest)) if args.dry_run => {
                println!("PLAN     {} -> {}", outcome.source.display(), dest.display())
            }
            (_, Some(dest)) => println!("OK       {} -> {}", outcome.source.display(), dest.display()),
            (_, None) => {}
        }
    }
    if let Some(path) = &summary.manifest_path {
        println!("Manifest: {}", path.display());
    }
    Ok(summary.status.exit_code())
}

fn import(config: &EffectiveConfig, args: ImportArgs) -> Result<i32> {
    let db_path = args.db.unwrap_or_else(|| config.db_path.clone());
    let report = import_manifest(&db_path, &args.manifest)
        .with_context(|| format!("Failed to import {}", args.manifest.display()))?;
    println!(
        "Imported run {} into {}: {} inserted, {} already present",
        report.run_id,
        db_path.display(),
        report.inserted,
        report.skipped
    );
    Ok(0)
}

fn analyze(config: &EffectiveConfig, args: AnalyzeArgs) -> Result<i32> {
    let selected = if args.gpx.is_empty() {
        let candidates = list_gpx_candidates(&config.work_root);
        if candidates.is_empty() {
            bail!("No GPX files found under {}", config.work_root.display());
        }
        picker().select(&candidates, "Select GPX file(s) to analyze:")?
    } else {
        args.gpx
    };

    if args.tsv {
        println!("{}", TSV_HEADER);
    }
    for path in &selected {
        if !path.is_file() {
            eprintln!("Skipping (not a file): {}", path.display());
            continue;
        }
        match analyze_track(path) {
            Ok(stats) if args.tsv => println!("{}", format_tsv_row(path, &stats)),
            Ok(stats) => println!("\n{}", format_report(path, &stats).trim_end()),
            Err(e) => warn!(path = %path.display(), error = %e, "Analysis failed"),
        }
    }
    Ok(0)
}
