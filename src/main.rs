use clap::Parser;
use ftp2gcs::config::{Args, MirrorConfig};
use ftp2gcs::engine::SyncEngine;
use tracing::{error, Level};
use tracing_subscriber::FmtSubscriber;

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose || args.ftp.debug {
        Level::DEBUG
    } else if args.quiet {
        Level::ERROR
    } else {
        Level::INFO
    };

    // Logs go to stderr so stdout stays clean for piping.
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = match MirrorConfig::from_args(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            std::process::exit(2);
        }
    };

    let engine = SyncEngine::new(config);
    if let Err(e) = engine.run() {
        error!("Sync failed: {}", e);
        std::process::exit(1);
    }

    Ok(())
}
