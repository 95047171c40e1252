//! Demonstration of the Sensor Seed Agent pipeline.
//!
//! This example shows how to:
//! 1. Pick a sample source and look at the channels it supports
//! 2. Build and start a seed service
//! 3. Trigger extra sampling windows
//! 4. Read seeds as the accumulator fills up
//!
//! Run with: cargo run --example seed_demo

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use sensor_seed_agent::{
    collector::JitterSource,
    core::{SeedService, DEFAULT_SAMPLE_WAIT},
    transparency::create_shared_log,
    Config, SampleSource, COLLECTION_NOTICE,
};

fn main() {
    println!("Sensor Seed Agent - Seed Demo");
    println!("=============================");
    println!();

    println!("{COLLECTION_NOTICE}");
    println!();

    let source = JitterSource::new();
    println!("Source: {}", source.name());
    for kind in source.supported_channels() {
        println!("  {kind} ({:?} rate)", kind.default_rate());
    }
    println!();

    // Short windows so the demo shows several of them
    let config = Config {
        tick_interval: Duration::from_secs(3),
        close_delay: Duration::from_millis(500),
        ..Config::default()
    };
    let transparency_log = create_shared_log();

    let mut service = match SeedService::new(Box::new(source), &config, transparency_log.clone()) {
        Ok(service) => service,
        Err(e) => {
            eprintln!("Error creating service: {e}");
            return;
        }
    };

    println!("Instance ID: {}", transparency_log.instance_id());
    println!("Sampling for 15 seconds...");
    println!();

    if let Err(e) = service.start() {
        eprintln!("Error starting service: {e}");
        return;
    }

    // Set up stop flag
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();

    // Set up Ctrl+C handler
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .expect("Error setting Ctrl+C handler");

    let start = Instant::now();
    while running.load(Ordering::SeqCst) && start.elapsed() < Duration::from_secs(15) {
        match service.sample_now(DEFAULT_SAMPLE_WAIT) {
            Ok(seed) => {
                let hex = seed.to_hex();
                println!(
                    "  [{:>4.1}s] {} bytes buffered, seed {}...",
                    start.elapsed().as_secs_f32(),
                    service.accumulator_len(),
                    &hex[..32]
                );
            }
            Err(e) => eprintln!("  Seed extraction failed: {e}"),
        }
    }

    service.stop();

    println!();
    println!("{}", transparency_log.summary());
}
