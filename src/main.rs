mod cli;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use futures::{StreamExt, TryStreamExt, pin_mut};
use miette::miette;
use snapsort_cache::{Database, Repository};
use snapsort_config::{Config, GeocodeConfig};
use snapsort_extract::{Extractor, Scanner};
use snapsort_geo::providers::{LocationIq, Nominatim};
use snapsort_geo::{
    CacheHandle, GeoResolver, MemoryCache, NamingPolicy, ProviderHandle, ProviderSlot, ResolverStats, RetryPolicy,
    TokenBucket,
};
use snapsort_library::{
    DUPLICATES_REPORT_NAME, ExecutionReport, FilenamePattern, LocationClusterer, OrganizeEvent, OrganizeOptions,
    OrganizePlan, PathGenerator, TRANSACTION_LOG_NAME, organize, replay,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received; letting in-flight operations finish");
                cancel.cancel();
            }
        }
    });

    match run(cli, cancel).await {
        Ok((report, stats)) => {
            info!(
                "{report}; {} unique locations, {} geocode cache hits, {} provider calls",
                report.unique_locations, stats.cache_hits, stats.provider_calls,
            );
            if report.fatal.is_some() {
                ExitCode::from(2)
            } else if report.is_full_success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(1)
            }
        },
        Err(error) => {
            eprintln!("{error:?}");
            ExitCode::from(2)
        },
    }
}

async fn run(cli: Cli, cancel: CancellationToken) -> miette::Result<(ExecutionReport, ResolverStats)> {
    let mut config = Config::load(cli.config.as_deref()).map_err(|error| miette!("{error}"))?;
    if let Some(threads) = cli.threads {
        config.workers = threads.max(1);
    }
    if let Some(recursive) = cli.recursive {
        config.recursive = recursive;
    }
    config.exclude.extend(cli.exclude.iter().cloned());

    let cache = open_cache(&config).await;
    let providers = build_providers(&config.geocode)?;
    let retry = RetryPolicy::new(
        config.geocode.retry.max_attempts,
        std::time::Duration::from_millis(config.geocode.retry.base_delay_ms),
        config.geocode.retry.jitter,
    );
    let resolver = Arc::new(
        GeoResolver::new(cache, providers)
            .with_naming(NamingPolicy::new(
                config.geocode.major_cities.iter().cloned(),
                config.geocode.national_parks.iter().cloned(),
            ))
            .with_retry(retry)
            .with_precision(config.geocode.precision)
            .with_failure_ttl(time::Duration::hours(i64::try_from(config.geocode.failed_ttl_hours).unwrap_or(24))),
    );

    let scanner = Scanner::new(config.recursive, &config.exclude).map_err(|error| miette!("{error}"))?;
    let paths: Vec<PathBuf> =
        scanner.scan(&cli.source).try_collect().await.map_err(|error| miette!("{error}"))?;
    info!(files = paths.len(), source = %cli.source.display(), "scan complete");

    let records = Extractor::new().extract(&paths).await.map_err(|error| miette!("{error}"))?;
    let with_gps = records.iter().filter(|r| r.coordinate.is_some()).count();
    let with_date = records.iter().filter(|r| r.captured_at.is_some()).count();
    info!(
        total = records.len(),
        with_gps,
        without_gps = records.len() - with_gps,
        with_date,
        without_date = records.len() - with_date,
        "metadata extracted",
    );
    let clusterer = LocationClusterer::new(resolver.clone())
        .with_distance_threshold(config.cluster.distance_threshold_miles)
        .with_city_vote_threshold(config.cluster.city_vote_threshold)
        .with_concurrency(config.workers);
    let clusters = clusterer.cluster(records).await.map_err(|error| miette!("{error}"))?;

    let pattern: FilenamePattern = config.filename_pattern.parse().map_err(|error| miette!("{error}"))?;
    let plan = OrganizePlan::build(&clusters, &PathGenerator::new(pattern)).map_err(|error| miette!("{error}"))?;

    audit_previous_run(&cli.destination).await;

    let options = OrganizeOptions {
        mode: cli.mode.into(),
        dry_run: cli.dry_run,
        verify: config.verify,
        concurrency: config.workers,
    };
    let events = organize(plan, cli.destination.clone(), options, cancel);
    pin_mut!(events);

    let mut report = ExecutionReport::default();
    while let Some(event) = events.next().await {
        match event.map_err(|error| miette!("{error}"))? {
            OrganizeEvent::Started { total } => info!(total, "organizing"),
            OrganizeEvent::FileDone(action) => debug!(?action, "file processed"),
            OrganizeEvent::Complete(finished) => report = finished,
        }
    }

    if !report.duplicates.is_empty() && !cli.dry_run {
        let path = cli.destination.join(DUPLICATES_REPORT_NAME);
        snapsort_library::write_duplicates_report(&path, &report.duplicates)
            .await
            .map_err(|error| miette!("{error}"))?;
        info!(duplicates = report.duplicates.len(), report = %path.display(), "duplicates report written");
    }

    Ok((report, resolver.stats()))
}

/// Replay a transaction log left by an earlier run before appending to it.
///
/// Operations logged as pending but never confirmed mean that run died
/// mid-mutation; the file may sit at either end, so they are surfaced for
/// manual inspection rather than silently re-planned.
async fn audit_previous_run(root: &std::path::Path) {
    let path = root.join(TRANSACTION_LOG_NAME);
    if !path.is_file() {
        return;
    }
    match replay(&path).await {
        Ok(replayed) => {
            let prior = ExecutionReport::from_replay(&replayed);
            let uncommitted = replayed.uncommitted().count();
            if uncommitted == 0 {
                debug!(%prior, "previous run's transaction log replayed cleanly");
            } else {
                warn!(%prior, uncommitted, "previous run left unconfirmed operations");
                for op in replayed.uncommitted() {
                    warn!(
                        seq = op.seq,
                        source = %op.source.display(),
                        planned = %op.planned_destination.display(),
                        "logged but unconfirmed; verify which side holds the file",
                    );
                }
            }
        },
        Err(error) => warn!(%error, log = %path.display(), "existing transaction log could not be replayed"),
    }
}

/// Open the persistent geocode cache, degrading to an in-memory cache
/// when the database cannot be opened.
async fn open_cache(config: &Config) -> CacheHandle {
    if let Some(path) = config.cache_path() {
        if let Some(parent) = path.parent() {
            let _ = tokio::fs::create_dir_all(parent).await;
        }
        match Database::connect(&path).await {
            Ok(db) => {
                let repository = Repository::from(&db);
                match repository.prune_failures().await {
                    Ok(pruned) if pruned > 0 => debug!(pruned, "dropped expired geocode failure entries"),
                    Ok(_) => {},
                    Err(error) => warn!(%error, "could not prune expired cache entries"),
                }
                debug!(cache = %path.display(), "persistent geocode cache open");
                return Arc::new(repository);
            },
            Err(error) => {
                warn!(%error, cache = %path.display(), "geocode cache unavailable; results will not persist");
            },
        }
    }
    Arc::new(MemoryCache::new())
}

/// Instantiate the configured provider chain, in priority order.
fn build_providers(config: &GeocodeConfig) -> miette::Result<Vec<ProviderSlot>> {
    let mut slots = Vec::with_capacity(config.providers.len());
    for provider in &config.providers {
        let handle: ProviderHandle = match provider.name.as_str() {
            "nominatim" => Arc::new(Nominatim::new()),
            "locationiq" => match &provider.api_key {
                Some(key) => Arc::new(LocationIq::new(key)),
                None => return Err(miette!("provider `locationiq` requires an api_key")),
            },
            other => return Err(miette!("unrecognized geocoding provider `{other}`")),
        };
        slots.push(ProviderSlot::new(handle, TokenBucket::new(provider.burst, provider.quota_per_second)));
    }
    Ok(slots)
}
