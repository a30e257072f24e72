use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;
use tracing_subscriber::EnvFilter;

use videocompo_build::config::{Cli, Config, Mode};
use videocompo_build::flows::{self, Project};
use videocompo_build::tasks::{collect_results, TaskReport, TaskStats, TaskStatus};

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(2)
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = Config::from_cli(cli)?;
    init_logging(config.verbose);

    let manifest_path = config.layout.manifest_path();
    if !manifest_path.exists() {
        bail!(
            "Not a player project: {} (package.json not found)",
            config.layout.root.display()
        );
    }

    // Configure Rayon thread pool
    rayon::ThreadPoolBuilder::new()
        .num_threads(config.jobs)
        .build_global()
        .ok();

    let mut project = Project::load(config.layout.clone(), config.theme.clone(), config.toolchain.clone())
        .with_context(|| format!("Failed to load {}", manifest_path.display()))?;

    match config.mode {
        Mode::Serve { server, minify } => {
            project.serve_minify = minify;
            info!(
                theme = %project.theme,
                version = project.version(),
                addr = %server.addr(),
                "starting serve"
            );
            flows::serve(Arc::new(project), server).context("Dev server stopped")?;
            Ok(ExitCode::SUCCESS)
        }
        Mode::Build => build(Arc::new(project), config.verbose),
    }
}

fn build(project: Arc<Project>, verbose: bool) -> Result<ExitCode> {
    let graph = project.build_graph();
    if verbose {
        eprintln!(
            "Building {} v{} with theme {}: {} task(s) in {} stage(s)",
            project.manifest.name,
            project.version(),
            project.theme,
            graph.task_count(),
            graph.stage_count()
        );
    }

    let start = Instant::now();
    let stats = TaskStats::new();

    // Progress bar only in verbose mode
    let progress = if verbose {
        let pb = ProgressBar::new(graph.task_count() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        Some(pb)
    } else {
        None
    };

    let reports = graph.run(&stats, &|report: &TaskReport| {
        if let Some(ref pb) = progress {
            pb.set_message(report.name);
            pb.inc(1);
        }
    });

    if let Some(pb) = progress {
        pb.finish_with_message("Complete");
    }

    let (reports, has_success, has_failure) = collect_results(reports);
    let duration = start.elapsed();

    // Print summary
    println!(
        "Built {} v{}: {} files, {} bytes in {:.2}s",
        project.manifest.name,
        project.version(),
        stats.files_written.get(),
        stats.bytes_written.get(),
        duration.as_secs_f64()
    );

    // Per-task breakdown
    for report in &reports {
        let status_str = match &report.status {
            TaskStatus::Success => format!("{} files ({:.2}s)", report.output.files, report.duration.as_secs_f64()),
            TaskStatus::Failed(e) => format!("FAILED: {e}"),
        };
        println!("  {}: {}", report.name, status_str);
    }

    if !has_failure {
        println!(
            "Archive: {}",
            project.layout.archive_path(project.version()).display()
        );
    }

    // Determine exit code
    if has_failure && !has_success {
        Ok(ExitCode::from(2))
    } else if has_failure {
        Ok(ExitCode::from(1))
    } else {
        Ok(ExitCode::SUCCESS)
    }
}
