use anyhow::{Context, Result};
use chart_watch::chart_version::{CandidateSelection, FreshnessChecker, FreshnessCheckerConfig};
use chart_watch::cmd::helm::{Helm, HelmConfig};
use chart_watch::declarator::{ReleaseDeclarator, WatchedDeclarator};
use chart_watch::helm::ChartRequest;
use chart_watch::io_models::manifest::ReleaseManifest;
use chart_watch::logger::{self, LogFormat};
use chart_watch::runtime::{self, TaskSupervisor};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Declares chart releases and warns about outdated chart versions.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(long, global = true, env = "CHART_WATCH_LOG_FORMAT", default_value = "text")]
    log_format: LogFormat,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check every release of the manifest against its chart repository
    Check(CheckOpts),
    /// Declare every release of the manifest with helm
    Declare(DeclareOpts),
}

#[derive(Args, Debug)]
struct ManifestOpts {
    /// Release manifest
    #[arg(long, env = "CHART_WATCH_MANIFEST")]
    manifest: PathBuf,

    /// How the latest published version is picked from repository indexes
    #[arg(long, default_value = "index-order")]
    selection: CandidateSelection,

    /// Timeout of a repository index download, none by default
    #[arg(long, value_parser = parse_duration)]
    index_timeout: Option<Duration>,
}

#[derive(Args, Debug)]
struct CheckOpts {
    #[command(flatten)]
    manifest: ManifestOpts,
}

#[derive(Args, Debug)]
struct DeclareOpts {
    #[command(flatten)]
    manifest: ManifestOpts,

    #[arg(long, env = "HELM_BIN", default_value = "helm")]
    helm_bin: PathBuf,

    #[arg(long, env = "KUBECONFIG")]
    kubeconfig: Option<PathBuf>,

    #[arg(long)]
    dry_run: bool,

    /// Helm `--timeout`, helm default when absent
    #[arg(long, value_parser = parse_duration)]
    helm_timeout: Option<Duration>,

    /// Time left to running freshness checks once every release is declared
    #[arg(long, value_parser = parse_duration, default_value = "10s")]
    check_grace_period: Duration,
}

fn parse_duration(value: &str) -> Result<Duration, String> {
    duration_str::parse(value).map_err(|e| e.to_string())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logger::init(cli.log_format);

    match cli.command {
        Command::Check(opts) => check(opts),
        Command::Declare(opts) => declare(opts),
    }
}

fn load_requests(manifest: &Path) -> Result<Vec<ChartRequest>> {
    let requests = ReleaseManifest::from_file(manifest)
        .and_then(|m| m.to_chart_requests())
        .with_context(|| format!("cannot load releases from {}", manifest.display()))?;

    info!("{} release(s) loaded from {}", requests.len(), manifest.display());
    Ok(requests)
}

fn freshness_checker(opts: &ManifestOpts) -> Result<Arc<FreshnessChecker>> {
    let config = FreshnessCheckerConfig {
        candidate_selection: opts.selection,
        request_timeout: opts.index_timeout,
        ..FreshnessCheckerConfig::default()
    };

    Ok(Arc::new(FreshnessChecker::new(config)?))
}

fn check(opts: CheckOpts) -> Result<()> {
    let requests = load_requests(&opts.manifest.manifest)?;
    let checker = freshness_checker(&opts.manifest)?;

    let results = runtime::block_on(futures::future::join_all(
        requests.iter().map(|request| checker.check_release(request)),
    ));

    for (request, result) in requests.iter().zip(results) {
        match result {
            Some(result) => println!("{}: {}", request.release_name(), result),
            None => println!("{}: not checked, version or repository missing", request.release_name()),
        }
    }

    // freshness is advisory, stale releases don't fail the run
    Ok(())
}

fn declare(opts: DeclareOpts) -> Result<()> {
    let requests = load_requests(&opts.manifest.manifest)?;
    let checker = freshness_checker(&opts.manifest)?;

    let helm = Helm::new(HelmConfig {
        binary: opts.helm_bin,
        kubeconfig: opts.kubeconfig,
        dry_run: opts.dry_run,
        timeout: opts.helm_timeout,
        ..HelmConfig::default()
    });
    let supervisor = Arc::new(TaskSupervisor::new(runtime::handle()));
    let declarator = WatchedDeclarator::new(helm, checker, supervisor.clone());

    let mut failures = 0;
    for request in &requests {
        match declarator.declare(request) {
            Ok(release) => info!(
                "Release '{}' declared in namespace '{}'.",
                release.release_name, release.namespace
            ),
            Err(err) => {
                error!("Release '{}' could not be declared: {}", request.release_name(), err);
                failures += 1;
            }
        }
    }

    runtime::block_on(supervisor.shutdown(opts.check_grace_period));

    if failures > 0 {
        anyhow::bail!("{} release(s) out of {} could not be declared", failures, requests.len());
    }

    Ok(())
}
