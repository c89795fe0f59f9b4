// src/main.rs

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use tunedex::config::resolve_config_path;
use tunedex::{Settings, StalePolicy, Tunedex};

const SHOWN_HITS: usize = 50;

struct Args {
    music_root: Option<PathBuf>,
    data_dir: Option<PathBuf>,
    json: bool,
    watch: bool,
}

fn parse_args() -> Args {
    let mut args = Args { music_root: None, data_dir: None, json: false, watch: true };
    for arg in env::args().skip(1) {
        match arg.as_str() {
            "--json" => args.json = true,
            "--no-watch" => args.watch = false,
            _ if args.music_root.is_none() => args.music_root = Some(PathBuf::from(arg)),
            _ if args.data_dir.is_none() => args.data_dir = Some(PathBuf::from(arg)),
            _ => eprintln!("Ignoring extra argument: {}", arg),
        }
    }
    args
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = parse_args();
    let mut settings = Settings::load().context("Failed to load settings")?;
    if let Some(root) = args.music_root {
        settings.library.music_root = root;
    }
    if let Some(data_dir) = args.data_dir {
        settings.library.data_dir = data_dir;
    }

    if let Some(path) = resolve_config_path().filter(|p| p.exists()) {
        tracing::info!("Config file: {}", path.display());
    }
    tracing::info!("Music root: {}", settings.library.music_root.display());
    tracing::info!("Data dir: {}", settings.library.data_dir.display());

    let on_stale = settings.sync.on_stale;
    let tunedex = tokio::task::block_in_place(move || -> Result<Tunedex> {
        let tunedex = Tunedex::open(settings)?;
        if on_stale != StalePolicy::Ignore && tunedex.is_stale()? {
            match on_stale {
                StalePolicy::Resync => {
                    tunedex.resync()?;
                }
                StalePolicy::Rebuild => {
                    tunedex.rebuild()?;
                }
                StalePolicy::Ignore => {}
            }
        }
        Ok(tunedex)
    })?;
    let tunedex = Arc::new(tunedex);
    tracing::info!("✓ Catalog ready ({} tracks)", tunedex.track_count()?);

    if args.watch {
        tunedex.start_watching()?;
        tracing::info!("✓ Librarian (watcher) started");
    }

    eprintln!("Type a query, :resync, :rebuild or :quit");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let line = line.trim();
                match line {
                    "" => continue,
                    ":quit" | ":q" => break,
                    ":resync" => {
                        let report = tokio::task::block_in_place(|| tunedex.resync())?;
                        println!("+{} -{}", report.added, report.removed);
                    }
                    ":rebuild" => {
                        let count = tokio::task::block_in_place(|| tunedex.rebuild())?;
                        println!("{} tracks indexed", count);
                    }
                    query if args.json => {
                        let summary = tokio::task::block_in_place(|| tunedex.summarize(query));
                        println!("{}", serde_json::to_string_pretty(&summary)?);
                    }
                    query => {
                        let hits = tokio::task::block_in_place(|| tunedex.search(query));
                        for hit in hits.iter().take(SHOWN_HITS) {
                            println!("{}", hit);
                        }
                        if hits.len() > SHOWN_HITS {
                            println!("... and {} more", hits.len() - SHOWN_HITS);
                        }
                        if hits.is_empty() {
                            println!("No results");
                        }
                    }
                }
            }
        }
    }

    tracing::info!("tunedex shutting down...");
    tokio::task::block_in_place(|| tunedex.stop_watching())?;
    Ok(())
}
