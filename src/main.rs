//! Sensor Seed Agent CLI
//!
//! Collects sensor noise and prints seed material derived from it.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use sensor_seed_agent::{
    collector::create_source,
    config::{ChannelConfig, Config, SeedMode},
    core::{SeedService, DEFAULT_SAMPLE_WAIT},
    transparency::{create_shared_log_with_persistence, PersistedStats},
    SensorKind, COLLECTION_NOTICE, VERSION,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "sensor-seed")]
#[command(version = VERSION)]
#[command(about = "Entropy accumulation from sensor noise", long_about = None)]
struct Cli {
    /// Sample source to drive (jitter or noop); overrides the config file
    #[arg(long, global = true)]
    source: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the sampling service in the foreground
    Start {
        /// Channels to sample (comma separated, or all)
        #[arg(long)]
        channels: Option<String>,

        /// Seconds between sampling windows
        #[arg(long)]
        interval: Option<u64>,

        /// Print the current seed every N seconds
        #[arg(long, default_value = "10")]
        print_every: u64,
    },

    /// Sample once and print a seed
    Seed {
        /// How long to collect before reading the seed
        #[arg(long, default_value_t = DEFAULT_SAMPLE_WAIT.as_millis() as u64)]
        wait_ms: u64,

        /// Print the raw accumulator instead of its digest
        #[arg(long)]
        raw: bool,
    },

    /// List sensor channels and whether the source supports them
    Channels,

    /// Show configuration and cumulative statistics
    Status,

    /// Display the collection notice
    Notice,

    /// Show configuration
    Config,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let mut config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Warning: Ignoring configuration file: {e}");
            Config::default()
        }
    };
    if let Some(source) = cli.source {
        config.source = source;
    }

    match cli.command {
        Commands::Start {
            channels,
            interval,
            print_every,
        } => cmd_start(config, channels.as_deref(), interval, print_every),
        Commands::Seed { wait_ms, raw } => cmd_seed(config, wait_ms, raw),
        Commands::Channels => cmd_channels(&config),
        Commands::Status => {
            cmd_status(&config);
            Ok(())
        }
        Commands::Notice => {
            println!("{COLLECTION_NOTICE}");
            Ok(())
        }
        Commands::Config => {
            cmd_config(&config);
            Ok(())
        }
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sensor_seed_agent=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn cmd_start(
    mut config: Config,
    channels: Option<&str>,
    interval: Option<u64>,
    print_every: u64,
) -> Result<()> {
    println!("Sensor Seed Agent v{VERSION}");
    println!();

    if let Some(csv) = channels {
        config.channels = ChannelConfig::from_csv(csv)?;
    }
    if !config.channels.any_enabled() {
        bail!("At least one sensor channel must be enabled");
    }
    if let Some(secs) = interval {
        if secs == 0 {
            bail!("--interval must be at least one second");
        }
        config.tick_interval = Duration::from_secs(secs);
    }
    if let Err(e) = config.ensure_directories() {
        eprintln!("Warning: Could not create directories: {e}");
    }

    let source = create_source(&config.source)?;
    println!("Starting collection...");
    println!("  Source: {}", source.name());
    for kind in config.channels.kinds() {
        let state = if source.supports(*kind) {
            "requested"
        } else {
            "unavailable"
        };
        println!("  {kind}: {state}");
    }
    println!("  Window interval: {}s", config.tick_interval.as_secs());
    println!("  Digest: {}", config.digest_algorithm);
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let transparency_log = create_shared_log_with_persistence(config.transparency_path());
    let mut service = SeedService::new(source, &config, transparency_log.clone())?;

    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(running.clone())?;

    service.start()?;

    let print_every = Duration::from_secs(print_every.max(1));
    let mut last_print = Instant::now();
    while running.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_millis(100));
        if last_print.elapsed() < print_every {
            continue;
        }
        last_print = Instant::now();

        match service.get_seed() {
            Ok(seed) => println!(
                "[{}] {} ({} bytes buffered)",
                Utc::now().format("%H:%M:%S"),
                seed.to_hex(),
                service.accumulator_len()
            ),
            Err(e) => eprintln!("Error extracting seed: {e}"),
        }
    }

    println!();
    println!("Stopping collection...");
    service.stop();

    if let Err(e) = transparency_log.save() {
        eprintln!("Error saving transparency stats: {e}");
    }

    println!();
    println!("{}", transparency_log.summary());
    Ok(())
}

fn cmd_seed(mut config: Config, wait_ms: u64, raw: bool) -> Result<()> {
    if raw {
        config.seed_mode = SeedMode::Raw;
    }

    let source = create_source(&config.source)?;
    let transparency_log = create_shared_log_with_persistence(config.transparency_path());
    let mut service = SeedService::new(source, &config, transparency_log.clone())?;

    service.start()?;
    let seed = service.sample_now(Duration::from_millis(wait_ms));
    service.stop();

    if let Err(e) = transparency_log.save() {
        eprintln!("Error saving transparency stats: {e}");
    }

    let seed = seed.context("Could not extract seed")?;
    println!("{}", seed.to_hex());
    Ok(())
}

fn cmd_channels(config: &Config) -> Result<()> {
    let source = create_source(&config.source)?;

    println!("Sensor channels ({} source)", source.name());
    println!("========================");
    println!();
    for kind in SensorKind::ALL {
        println!(
            "  {:<18} {:<12} rate: {:?}, values: {}",
            kind.as_str(),
            if source.supports(kind) {
                "supported"
            } else {
                "unsupported"
            },
            kind.default_rate(),
            kind.value_count()
        );
    }
    Ok(())
}

fn cmd_status(config: &Config) {
    println!("Sensor Seed Agent Status");
    println!("========================");
    println!();

    println!("Configuration:");
    println!("  Source: {}", config.source);
    let channels: Vec<&str> = config.channels.kinds().iter().map(|k| k.as_str()).collect();
    println!("  Channels: {}", channels.join(", "));
    println!("  Window interval: {}s", config.tick_interval.as_secs());
    println!("  Close delay: {}ms", config.close_delay.as_millis());
    println!("  Digest: {}", config.digest_algorithm);
    println!("  Seed mode: {:?}", config.seed_mode);
    println!("  Salted readings: {}", config.salt_readings);
    println!();

    let stats_path = config.transparency_path();
    if !stats_path.exists() {
        println!("No previous session data found.");
        return;
    }

    let stats = std::fs::read_to_string(&stats_path)
        .ok()
        .and_then(|content| serde_json::from_str::<PersistedStats>(&content).ok());
    match stats {
        Some(stats) => {
            println!("Cumulative Statistics:");
            println!("  Scheduler ticks: {}", stats.ticks);
            println!(
                "  Sampling windows opened/closed: {}/{}",
                stats.windows_opened, stats.windows_closed
            );
            println!("  Readings received: {}", stats.readings_received);
            println!("  Readings converted: {}", stats.readings_processed);
            println!("  Readings dropped: {}", stats.readings_dropped);
            println!("  Measurements appended: {}", stats.measurements_appended);
            println!("  Measurements rejected: {}", stats.measurements_rejected);
            println!("  Overflow resets: {}", stats.overflow_resets);
            println!("  Seeds extracted: {}", stats.seeds_extracted);
            println!("  Last updated: {}", stats.last_updated.to_rfc3339());
        }
        None => eprintln!("Could not read statistics from {stats_path:?}"),
    }
}

fn cmd_config(config: &Config) {
    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(config).unwrap_or_else(|_| "Error".to_string())
    );
}

/// Set up Ctrl+C handler.
fn ctrlc_handler(running: Arc<AtomicBool>) -> Result<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .context("Error setting Ctrl+C handler")
}
