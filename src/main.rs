//! Rustscape Cache Inspector
//!
//! Command line tool for inspecting a dat2/idx game cache: listing
//! channels, dumping reference tables, extracting files and verifying
//! archive checksums.
//!
//! Usage:
//!   jagcache --cache <path> info
//!   jagcache --cache <path> table 2 --json
//!   jagcache --cache <path> read 2 5 --decode --output file.bin
//!   jagcache --cache <path> checksum
//!   jagcache --cache <path> verify 2

use std::io::Write;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rayon::prelude::*;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use rustscape_cache::cache::{CacheStore, SharedCacheStore};
use rustscape_cache::config::CacheConfig;
use rustscape_cache::VERSION;

#[derive(Debug, Parser)]
#[command(name = "jagcache", version = VERSION, about = "Inspect a dat2/idx game cache")]
struct Cli {
    /// Path to the cache directory (overrides the configuration file)
    #[arg(short, long, global = true)]
    cache: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List channels and their file counts
    Info,

    /// Dump the reference table of a channel
    Table {
        channel: u8,

        /// Print the full table as JSON
        #[arg(long)]
        json: bool,
    },

    /// Read one file out of the cache
    Read {
        channel: u8,
        file: u32,

        /// Strip the compression container
        #[arg(short, long)]
        decode: bool,

        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the checksum table
    Checksum,

    /// Read and decode every archive of a channel, checking CRCs
    Verify { channel: u8 },
}

fn main() {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    if let Err(e) = run(cli) {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

/// Initialize the tracing subscriber
fn init_logging(verbose: bool) {
    let default = if verbose {
        "info,rustscape_cache=trace"
    } else {
        "info,rustscape_cache=debug"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .with_level(true)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let mut config = CacheConfig::load()?;
    if let Some(path) = cli.cache {
        config.cache_path = path;
    }

    match cli.command {
        Command::Info => info_command(&config),
        Command::Table { channel, json } => table_command(&config, channel, json),
        Command::Read {
            channel,
            file,
            decode,
            output,
        } => read_command(&config, channel, file, decode, output),
        Command::Checksum => checksum_command(&config),
        Command::Verify { channel } => {
            config.verify_checksums = true;
            verify_command(&config, channel)
        }
    }
}

fn open(config: &CacheConfig) -> Result<CacheStore> {
    CacheStore::open_with(config)
        .with_context(|| format!("Failed to open cache at {}", config.cache_path.display()))
}

fn info_command(config: &CacheConfig) -> Result<()> {
    let store = open(config)?;

    println!("Cache: {}", store.path().display());
    println!("Channels: {}", store.channel_count());
    for channel in 0..store.channel_count() as u8 {
        match store.file_count(channel) {
            Some(count) => println!("  {:>3}: {} files", channel, count),
            None => println!("  {:>3}: missing", channel),
        }
    }

    Ok(())
}

fn table_command(config: &CacheConfig, channel: u8, json: bool) -> Result<()> {
    let mut store = open(config)?;
    let table = store
        .reference_table(channel)
        .with_context(|| format!("Failed to load reference table for channel {}", channel))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&table)?);
        return Ok(());
    }

    println!(
        "Channel {}: format {}, version {}, flags {:?}",
        channel, table.format, table.version, table.flags
    );
    println!("{} archives, {} files", table.len(), table.file_count());
    for archive in &table.archives {
        println!(
            "  archive {:>6}  crc {:08x}  version {:>10}  files {}",
            archive.id,
            archive.crc,
            archive.version,
            archive.files.len()
        );
    }

    Ok(())
}

fn read_command(
    config: &CacheConfig,
    channel: u8,
    file: u32,
    decode: bool,
    output: Option<PathBuf>,
) -> Result<()> {
    let mut store = open(config)?;

    let data = if decode {
        store.read_container(channel, file)?.into_bytes().to_vec()
    } else {
        store.read(channel, file)?
    };
    info!("Read {} bytes from {}/{}", data.len(), channel, file);

    match output {
        Some(path) => std::fs::write(&path, &data)
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => std::io::stdout().write_all(&data)?,
    }

    Ok(())
}

fn checksum_command(config: &CacheConfig) -> Result<()> {
    let mut store = open(config)?;
    let table = store.checksum_table();

    for (channel, entry) in table.entries.iter().enumerate() {
        println!(
            "{:>3}: crc {:08x}  version {}",
            channel, entry.crc, entry.version
        );
    }

    Ok(())
}

fn verify_command(config: &CacheConfig, channel: u8) -> Result<()> {
    let start_time = Instant::now();
    let store = SharedCacheStore::new(open(config)?);

    let table = store
        .reference_table(channel)
        .with_context(|| format!("Failed to load reference table for channel {}", channel))?;

    info!(
        "Verifying {} archives in channel {} ({} threads)",
        table.len(),
        channel,
        rayon::current_num_threads()
    );

    let failures: Vec<(u32, String)> = table
        .archives
        .par_iter()
        .filter_map(|archive| {
            store
                .read_archive(channel, archive)
                .err()
                .map(|e| (archive.id, e.to_string()))
        })
        .collect();

    for (archive, reason) in &failures {
        warn!("Archive {}: {}", archive, reason);
    }

    info!(
        "Verified {} archives in {:.2?}: {} failed",
        table.len(),
        start_time.elapsed(),
        failures.len()
    );

    if !failures.is_empty() {
        anyhow::bail!("{} archives failed verification", failures.len());
    }

    Ok(())
}
