//! streamhub command-line entry point
//!
//! ```bash
//! streamhub --in-memory count-by-genre
//! streamhub --uri mongodb://localhost:27017 seed
//! streamhub search "in" --format json
//! ```

use tracing::Level;
use tracing_subscriber::EnvFilter;

use streamhub::Result;
use streamhub::cli::CliInterface;

/// Application entry point
#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Parse arguments, load configuration, initialize logging, run the command
async fn run() -> Result<()> {
    let cli = CliInterface::new()?;
    initialize_logging(&cli);
    cli.run().await
}

/// Initialize logging
///
/// `-v`/`--vv` win; otherwise `RUST_LOG` when set; otherwise the configured
/// level. Logs go to stderr so command output can be piped.
fn initialize_logging(cli: &CliInterface) {
    let args = cli.args();
    let level: Level = cli.config().logging.level.to_tracing_level();

    let filter = if args.verbose || args.very_verbose {
        EnvFilter::new(level.as_str())
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()))
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    if cli.config().logging.timestamps {
        subscriber.init();
    } else {
        subscriber.without_time().init();
    }
}
