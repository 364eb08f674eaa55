//! tally CLI - values a user's collection and prints the running total.
//!
//! # Architecture
//!
//! ```text
//! main() -> Settings (config file + flags) -> Credential (TALLY_TOKEN or token file)
//!        -> ApiClient -> Aggregator<CollectionFetcher, OfferCache<PricingClient, _>>
//!                                  |
//!                                  v
//!                       StderrProgress spinner (each snapshot) -> stdout (final state)
//! ```

mod args;
mod render;

use std::env;
use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use tally_cache::{CacheStorage, FileStorage, MemoryStorage, OfferCache};
use tally_config::{Settings, TallyConfig, tally_dir};
use tally_engine::{AggregateState, Aggregator};
use tally_providers::{
    ApiClient, CollectionFetcher, FileCredentialStore, HttpSettings, PricingClient, TokenProvider,
    build_http_client,
};
use tally_types::{AccessToken, Credential};

use crate::args::Cli;
use crate::render::{StderrProgress, summary_line};

/// Environment variable carrying a bare access token. Bypasses the token file.
const TOKEN_ENV: &str = "TALLY_TOKEN";

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let (log_file, init_warnings) = open_tally_log_file();

    if let Some((log_path, file)) = log_file {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
            .with(env_filter)
            .init();

        tracing::info!(path = %log_path.display(), "Logging initialized");
        for warning in init_warnings {
            tracing::warn!("{warning}");
        }
        return;
    }

    // stdout carries the result, so logs go to stderr.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();
    for warning in init_warnings {
        tracing::warn!("{warning}");
    }
}

fn open_tally_log_file() -> (Option<(PathBuf, fs::File)>, Vec<String>) {
    let mut warnings = Vec::new();

    for candidate in tally_log_file_candidates() {
        if let Some(parent) = candidate.parent()
            && let Err(e) = fs::create_dir_all(parent)
        {
            warnings.push(format!(
                "Failed to create log dir {}: {e}",
                parent.display()
            ));
            continue;
        }

        match OpenOptions::new()
            .create(true)
            .append(true)
            .open(&candidate)
        {
            Ok(file) => return (Some((candidate, file)), warnings),
            Err(e) => {
                warnings.push(format!(
                    "Failed to open log file {}: {e}",
                    candidate.display()
                ));
            }
        }
    }

    (None, warnings)
}

fn tally_log_file_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    // Primary: ~/.tally/logs/tally.log
    if let Some(dir) = tally_dir() {
        candidates.push(dir.join("logs").join("tally.log"));
    }

    // Fallback: ./.tally/logs/tally.log
    candidates.push(PathBuf::from(".tally").join("logs").join("tally.log"));

    candidates
}

fn load_settings(cli: &Cli) -> Result<Settings> {
    let config = match &cli.config {
        Some(path) => TallyConfig::load_from(path)?,
        None => TallyConfig::load()?.unwrap_or_default(),
    };
    Ok(config.resolve(&cli.overrides())?)
}

/// `token_env` is the value of [`TOKEN_ENV`], if set. It wins over the token file.
async fn obtain_credential(settings: &Settings, token_env: Option<String>) -> Result<Credential> {
    if let Some(raw) = token_env {
        let token = AccessToken::new(raw.trim())
            .with_context(|| format!("{TOKEN_ENV} is set but empty"))?;
        tracing::debug!("Using credential from {TOKEN_ENV}");
        return Ok(Credential::new(token));
    }

    let token_file = settings.require_token_file()?;
    let provider = TokenProvider::new(FileCredentialStore::new(token_file))
        .with_poll_interval(settings.poll_interval);
    match settings.wait_timeout {
        Some(ceiling) => Ok(provider.acquire_within(ceiling).await?),
        None => Ok(provider.acquire().await),
    }
}

async fn value_collection<S: CacheStorage>(
    cli: &Cli,
    settings: &Settings,
    api: ApiClient,
    storage: S,
) -> Result<AggregateState> {
    let offers = OfferCache::new(PricingClient::new(api.clone()), storage);
    let mut aggregator = Aggregator::new(CollectionFetcher::new(api), offers)
        .with_error_policy(settings.on_item_error);

    let outcome = if cli.quiet {
        aggregator
            .run(&cli.username, &mut |_: AggregateState| {})
            .await
    } else {
        let mut progress = StderrProgress::new();
        let outcome = aggregator.run(&cli.username, &mut progress).await;
        progress.finish();
        outcome
    };

    outcome.with_context(|| format!("valuation of {}'s collection failed", cli.username))
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let settings = load_settings(&cli)?;
    tracing::debug!(?settings, "Settings resolved");

    let http = build_http_client(&HttpSettings {
        timeout: settings.http_timeout,
        https_only: settings.base_url.scheme() == "https",
        ..HttpSettings::default()
    })
    .context("failed to build HTTP client")?;

    let credential = obtain_credential(&settings, env::var(TOKEN_ENV).ok()).await?;
    let api = ApiClient::new(http, settings.base_url.clone(), credential);

    let state = match &settings.cache_file {
        Some(path) => {
            let storage = FileStorage::open(path)?;
            value_collection(&cli, &settings, api, storage).await?
        }
        None => value_collection(&cli, &settings, api, MemoryStorage::new()).await?,
    };

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&state)?);
    } else {
        println!("{}", summary_line(&state));
    }

    Ok(())
}
