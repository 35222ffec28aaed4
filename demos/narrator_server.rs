//! MJPEG server streaming a background-removed test pattern
//!
//! Run with: cargo run --example narrator_server [PREFERENCES_JSON]
//!
//! Examples:
//!   cargo run --example narrator_server                     # defaults, port 8081
//!   cargo run --example narrator_server prefs.json          # preferences from file
//!
//! ## Watching the stream
//!
//! In a browser:
//!   http://localhost:8081/
//!
//! With ffplay:
//!   ffplay -f mjpeg http://localhost:8081/
//!
//! Latest frame only:
//!   curl -o frame.jpg http://localhost:8081/frame.jpg

use std::sync::Arc;
use std::time::Duration;

use narrator::capture::{DeviceSelector, TestPatternBackend};
use narrator::segmentation::LuminanceSegmenter;
use narrator::{Pipeline, Preferences, StreamServer};

fn print_usage() {
    eprintln!("Usage: narrator_server [PREFERENCES_JSON]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  PREFERENCES_JSON    Preferences file (default: built-in defaults)");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  RUST_LOG            Log filter (default: narrator=debug)");
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("narrator=debug".parse()?)
                .add_directive("narrator_server=debug".parse()?),
        )
        .init();

    let prefs = match args.get(1) {
        Some(path) => match Preferences::load(path) {
            Ok(prefs) => prefs,
            Err(e) => {
                eprintln!("Error: {}", e);
                eprintln!();
                print_usage();
                std::process::exit(1);
            }
        },
        None => Preferences::default(),
    };

    let mut pipeline = Pipeline::new(
        Box::new(TestPatternBackend::default()),
        Arc::new(LuminanceSegmenter),
        &prefs,
    );

    // A capture failure is reported but the server still starts
    match pipeline.start(&DeviceSelector::Default).await {
        Ok(device) => println!("Capturing from {} ({})", device.label, device.id),
        Err(e) => eprintln!("Capture unavailable: {}", e),
    }

    let config = prefs.server_config();
    println!("Starting MJPEG server on {}", config.bind_addr);
    println!();
    println!("=== Watch the stream ===");
    println!("Browser: http://localhost:{}/", config.bind_addr.port());
    println!("ffplay:  ffplay -f mjpeg http://localhost:{}/", config.bind_addr.port());
    println!("Still:   curl -o frame.jpg http://localhost:{}{}", config.bind_addr.port(), config.snapshot_path);
    println!();

    let server = StreamServer::new(config, Arc::clone(pipeline.hub()));
    let hub = Arc::clone(pipeline.hub());

    let stats_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(10));
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let stats = hub.stats();
            println!(
                "Stats: viewers={} published={} skipped={} dropped={} encode_failures={}",
                stats.subscribers,
                stats.frames_published,
                stats.chunks_skipped,
                stats.subscribers_dropped,
                stats.encode_failures,
            );
        }
    });

    let result = server
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
            println!("\nShutting down...");
        })
        .await;

    stats_task.abort();
    pipeline.shutdown().await;

    if let Err(e) = result {
        eprintln!("Server error: {}", e);
        std::process::exit(1);
    }

    Ok(())
}
