use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};

use evidence_triage::application::dto::{TriageConfig, TriageReport};
use evidence_triage::application::TriagePipeline;
use evidence_triage::domain::services::EvidenceContainer;
use evidence_triage::infrastructure::block_device::{
    collect_image_metadata, detect_filesystem, discover_segments,
};
use evidence_triage::infrastructure::file_systems::HostMount;
use evidence_triage::infrastructure::persistence::clean_csv;
use evidence_triage::presentation::cli::{Cli, Commands, ProgressReporter, init_logging};

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet, cli.log_file.as_deref())
        .context("Failed to initialize logging")?;

    let mut config = match &cli.config {
        Some(path) => TriageConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => TriageConfig::default(),
    };

    match cli.command {
        Commands::Run {
            evidence,
            mount,
            output,
            container,
            walk,
            registry,
            anomaly,
        } => {
            container.apply(&mut config);
            walk.apply(&mut config);
            registry.apply(&mut config);
            anomaly.apply(&mut config);
            config.validate().context("Invalid configuration")?;
            run_triage(config, evidence.as_deref(), &mount, &output, cli.quiet)
        }
        Commands::Walk {
            mount,
            output,
            walk,
            anomaly,
        } => {
            walk.apply(&mut config);
            anomaly.apply(&mut config);
            config.validate().context("Invalid configuration")?;
            run_walk(config, &mount, &output, cli.quiet)
        }
        Commands::Registry {
            mount,
            hive,
            name,
            output,
            registry,
        } => {
            registry.apply(&mut config);
            config.validate().context("Invalid configuration")?;
            run_registry(config, mount, hive, name, &output, cli.quiet)
        }
        Commands::Info { evidence } => show_info(&evidence),
        Commands::Clean { input, output } => {
            let table = clean_csv(&input, &output)
                .with_context(|| format!("Failed to clean {}", input.display()))?;
            println!(
                "Wrote {} rows x {} columns to {}",
                table.rows.len(),
                table.headers.len(),
                output.display()
            );
            Ok(())
        }
        Commands::Config => {
            println!("{}", config.to_json()?);
            Ok(())
        }
    }
}

fn open_mount(mount: &Path) -> Result<HostMount> {
    HostMount::open(mount).with_context(|| format!("Failed to open mount {}", mount.display()))
}

fn spinner(quiet: bool) -> ProgressReporter {
    if quiet {
        ProgressReporter::hidden()
    } else {
        ProgressReporter::for_walk()
    }
}

fn run_triage(
    config: TriageConfig,
    evidence: Option<&Path>,
    mount: &Path,
    output: &Path,
    quiet: bool,
) -> Result<()> {
    let fs = open_mount(mount)?;
    let progress = spinner(quiet);
    let pipeline = TriagePipeline::new(config, output)
        .with_entry_progress(progress.entry_callback())
        .with_hive_progress(progress.hive_callback());

    let result = pipeline.run(evidence, &fs);
    progress.finish("Triage finished");
    let report = result.context("Triage failed")?;
    print_report(&report);
    Ok(())
}

fn run_walk(config: TriageConfig, mount: &Path, output: &Path, quiet: bool) -> Result<()> {
    let fs = open_mount(mount)?;
    let progress = spinner(quiet);
    let pipeline =
        TriagePipeline::new(config, output).with_entry_progress(progress.entry_callback());

    let result = pipeline.run_walk(&fs);
    progress.finish("Walk finished");
    let report = result.context("Walk failed")?;
    print_report(&report);
    Ok(())
}

fn run_registry(
    config: TriageConfig,
    mount: Option<PathBuf>,
    hive: Option<PathBuf>,
    name: Option<String>,
    output: &Path,
    quiet: bool,
) -> Result<()> {
    let expected = config.registry.targets.hives.len() as u64;
    let progress = if quiet {
        ProgressReporter::hidden()
    } else {
        ProgressReporter::for_hives(expected)
    };
    let pipeline = TriagePipeline::new(config, output).with_hive_progress(progress.hive_callback());

    let result = match (hive, mount) {
        (Some(hive), _) => {
            let hive_name = name.unwrap_or_else(|| hive_name_from_file(&hive));
            pipeline.run_hive_file(&hive, &hive_name)
        }
        (None, Some(mount)) => {
            let fs = open_mount(&mount)?;
            pipeline.run_registry(&fs)
        }
        (None, None) => anyhow::bail!("either --mount or --hive is required"),
    };
    progress.finish("Registry extraction finished");
    let report = result.context("Registry extraction failed")?;
    print_report(&report);
    Ok(())
}

/// `SOFTWARE.hive` becomes `SOFTWARE`
fn hive_name_from_file(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_uppercase())
        .unwrap_or_else(|| "UNKNOWN".to_string())
}

fn show_info(evidence: &Path) -> Result<()> {
    let segments = discover_segments(evidence)
        .with_context(|| format!("No evidence segments at {}", evidence.display()))?;
    let metadata = collect_image_metadata(evidence, &segments)?;
    let container =
        EvidenceContainer::open(&segments.paths).context("Failed to open evidence container")?;
    let fs_type = detect_filesystem(&container);

    println!("Evidence: {}", metadata.path);
    println!("Format: {}", metadata.file_format);
    println!("Segments: {}", metadata.segment_count);
    for file in &metadata.files {
        println!("  {}", file);
    }
    println!(
        "Size: {} bytes ({:.2} GB)",
        metadata.total_size,
        metadata.total_size as f64 / (1024.0 * 1024.0 * 1024.0)
    );
    if let Some(created) = &metadata.creation_time {
        println!("Created: {}", created);
    }
    if let Some(modified) = &metadata.modification_time {
        println!("Modified: {}", modified);
    }
    println!("Filesystem: {}", fs_type.name());
    if !container.bad_chunks().is_empty() {
        println!("Unreadable chunks: {}", container.bad_chunks().len());
    }
    container.close();
    Ok(())
}

fn print_report(report: &TriageReport) {
    println!();
    print!("{}", report.summary());
    println!("Output: {}", report.output_dir.display());
}
