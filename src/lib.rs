use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing_subscriber::EnvFilter;
use tubegrab_core::core::dependencies;
use tubegrab_core::core::engine::EngineConfig;
use tubegrab_core::core::ytdlp::YtDlpEngine;
use tubegrab_core::{AppSettings, ChannelEmitter, Dispatcher, DownloadSpec, Event, FormatCatalog};

pub mod cli;
pub mod console;
pub mod storage;

use crate::cli::Cli;
use crate::console::Console;
use crate::storage::config;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

pub fn run() -> ExitCode {
    let cli = Cli::parse_args();
    let settings_path = config::settings_path();
    let (settings, load_error) = match config::load_settings(&settings_path) {
        Ok(settings) => (settings, None),
        Err(e) => (AppSettings::default(), Some(e)),
    };

    init_logging(&settings.log_level, cli.verbose);
    if let Some(e) = load_error {
        tracing::warn!("using default settings: {:#}", e);
    }

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!("failed to start runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(session(cli, settings, settings_path)) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn configured_level(level: &str) -> Option<&'static str> {
    let wanted = level.trim().to_lowercase();
    LOG_LEVELS.iter().copied().find(|known| *known == wanted)
}

fn init_logging(level: &str, verbose: bool) {
    let configured = configured_level(level);

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        let fallback = configured.unwrap_or("info");
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if configured.is_none() {
        tracing::warn!("unknown log level '{}' in settings, using info", level);
    }
}

/// One search plus the downloads picked from it. Returns whether every
/// download succeeded.
async fn session(cli: Cli, mut settings: AppSettings, settings_path: PathBuf) -> anyhow::Result<bool> {
    let ytdlp = dependencies::require_ytdlp(&settings).await?;
    let ffmpeg = dependencies::optional_ffmpeg(&settings).await.map(|tool| tool.path);

    let engine = Arc::new(YtDlpEngine::new(ytdlp.path));
    let engine_config = EngineConfig::from_settings(&settings, ffmpeg);
    let (emitter, mut events) = ChannelEmitter::new();
    // -j applies to this run only and is not written back to settings.
    let pool_size = cli.jobs.unwrap_or_else(|| settings.pool_size());
    let dispatcher = Dispatcher::new(engine, engine_config, emitter, pool_size);

    let Some(catalog) = search(&dispatcher, &cli.url, &mut events).await? else {
        return Ok(false);
    };
    print!("{}", console::render_catalog(&catalog));
    if cli.list_formats {
        return Ok(true);
    }

    let selection = console::select_formats(&catalog, &cli.formats);
    for id in &selection.unknown {
        eprintln!("format '{id}' is not available for this video; skipped");
    }
    if selection.formats.is_empty() {
        bail!("nothing to download");
    }

    let destination_dir = cli
        .output
        .clone()
        .unwrap_or_else(|| settings.effective_download_dir().to_path_buf());

    let mut console = Console::new();
    for format in selection.formats {
        let spec = DownloadSpec {
            url: cli.url.clone(),
            media_title: catalog.metadata().title.clone(),
            format,
            destination_dir: destination_dir.clone(),
        };
        if let Some(handle) = dispatcher.submit_download(spec) {
            console.track(&handle);
        }
    }

    let mut interrupted = false;
    while !console.is_idle() {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                if let Some(line) = console.on_event(&event, dispatcher.registry()) {
                    println!("{line}");
                }
            }
            _ = tokio::signal::ctrl_c(), if !interrupted => {
                interrupted = true;
                let cancelled = dispatcher.cancel_all();
                eprintln!("interrupted; cancelling {cancelled} download(s)");
            }
        }
    }
    dispatcher.wait_idle().await;

    let summary = console.into_summary();
    if !summary.completed.is_empty() {
        settings.remember_download_dir(&destination_dir);
        if let Err(e) = config::save_settings(&settings_path, &settings) {
            tracing::warn!("could not save settings: {:#}", e);
        }
    }
    tracing::info!(
        "{} completed, {} failed, {} cancelled",
        summary.completed.len(),
        summary.failed,
        summary.cancelled
    );
    Ok(summary.success() && summary.cancelled == 0)
}

/// Resolves `url` to a catalog. `None` means the search was cancelled.
async fn search(
    dispatcher: &Dispatcher<ChannelEmitter>,
    url: &str,
    events: &mut UnboundedReceiver<Event>,
) -> anyhow::Result<Option<FormatCatalog>> {
    let handle = dispatcher.submit_search(url);
    let mut interrupted = false;
    loop {
        tokio::select! {
            event = events.recv() => {
                match event.context("event channel closed")? {
                    Event::SearchCompleted { search_id, catalog } if search_id == handle.id() => {
                        return Ok(Some(catalog));
                    }
                    Event::SearchFailed { search_id, message } if search_id == handle.id() => {
                        bail!("could not read formats for {url}: {message}");
                    }
                    Event::SearchCancelled { search_id } if search_id == handle.id() => {
                        return Ok(None);
                    }
                    _ => {}
                }
            }
            _ = tokio::signal::ctrl_c(), if !interrupted => {
                interrupted = true;
                handle.cancel();
                eprintln!("interrupted; waiting for the format lookup to stop");
            }
        }
    }
}
