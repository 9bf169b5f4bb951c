use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use ack6wd_zenoh_runtime::config::RuntimeConfig;

/// Motion-control runtime for the 4WS/6WD base
#[derive(Parser)]
struct Args {
    /// Path to a JSON runtime configuration (defaults apply if omitted)
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init(); // installs the subscriber globally

    let args = Args::parse();
    let config = match args.config {
        Some(path) => match RuntimeConfig::load(&path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Config error: {}", e);
                std::process::exit(1);
            }
        },
        None => RuntimeConfig::default(),
    };

    if let Err(e) = ack6wd_zenoh_runtime::runtime::run(config).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}
