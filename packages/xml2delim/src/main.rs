//! CLI entry point for the transcoder.

use tracing_subscriber::EnvFilter;
use xml2delim::cli;

fn main() {
    // Initialize tracing with WARN level by default, respecting RUST_LOG
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = cli::run() {
        eprintln!("Error: {e}");
        // configuration and input problems are distinguished from failures mid-run
        std::process::exit(if e.is_setup_error() { 2 } else { 1 });
    }
}
