//! Print every file under an FTP path, one per line.

use clap::Parser;
use ftp2gcs::config::{ftp_config, listing_policy, parse_source, ListArgs};
use ftp2gcs::mtime::unix_seconds;
use ftp2gcs::scanner::{RemoteScanner, Scanner};
use ftp2gcs::transport::FtpConnection;
use std::time::Duration;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

fn main() -> anyhow::Result<()> {
    let args = ListArgs::parse();

    let log_level = if args.verbose || args.ftp.debug { Level::DEBUG } else { Level::WARN };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let source = match parse_source(&args.source) {
        Ok(source) => source,
        Err(e) => {
            error!("{}", e);
            std::process::exit(2);
        }
    };

    let config = ftp_config(
        &source,
        &args.ftp.user,
        &args.ftp.password,
        Duration::from_secs(args.ftp.timeout),
        args.ftp.insecure,
        args.ftp.debug,
    );

    let result = FtpConnection::connect(&config).and_then(|mut conn| {
        let mut scanner = RemoteScanner::new(&mut conn).with_policy(listing_policy(args.skip_unreadable));
        scanner.scan(&source.path)
    });

    match result {
        Ok(manifest) => {
            for (path, entry) in &manifest.entries {
                println!("{}\t{}\t{}", path, entry.size, unix_seconds(entry.mod_time));
            }
            info!("{} files", manifest.len());
            Ok(())
        }
        Err(e) => {
            error!("Listing files failed: {}", e);
            std::process::exit(1);
        }
    }
}
