use crate::scanner::ListingPolicy;
use crate::transport::ftp::{FtpConfig, DEFAULT_PORT};
use crate::{MirrorError, Result};
use clap::{Args as ClapArgs, Parser};
use percent_encoding::percent_decode_str;
use std::time::Duration;
use url::Url;

/// FTP session options shared by every binary.
#[derive(ClapArgs, Debug, Clone)]
pub struct FtpArgs {
    /// FTP user name
    #[arg(long, default_value = "anonymous")]
    pub user: String,

    /// FTP password
    #[arg(long, env = "FTP_PASSWORD", default_value = "anonymous", hide_env_values = true)]
    pub password: String,

    /// Timeout in seconds for connecting and for each FTP operation
    #[arg(long, default_value_t = 5)]
    pub timeout: u64,

    /// Disable TLS server name verification
    #[arg(long, default_value_t = false)]
    pub insecure: bool,

    /// Output protocol debug to stderr
    #[arg(long, default_value_t = false)]
    pub debug: bool,
}

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Copy new and changed files from FTP to Google Cloud Storage", long_about = None)]
pub struct Args {
    /// Source tree (ftp://host/path or ftps://host/path)
    #[arg(value_name = "SOURCE")]
    pub source: String,

    /// Destination bucket and prefix (gs://bucket/prefix)
    #[arg(value_name = "DESTINATION")]
    pub destination: String,

    #[command(flatten)]
    pub ftp: FtpArgs,

    /// Perform a trial run with no changes made
    #[arg(short = 'n', long, default_value_t = false)]
    pub dry_run: bool,

    /// Show progress during transfer
    #[arg(short = 'P', long, default_value_t = false)]
    pub progress: bool,

    /// Skip subdirectories that cannot be listed instead of aborting
    #[arg(long, default_value_t = false)]
    pub skip_unreadable: bool,

    /// Suppress non-error messages
    #[arg(short, long, default_value_t = false)]
    pub quiet: bool,

    /// Increase verbosity
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "List every file under an FTP path", long_about = None)]
pub struct ListArgs {
    /// Tree to list (ftp://host/path or ftps://host/path)
    #[arg(value_name = "SOURCE")]
    pub source: String,

    #[command(flatten)]
    pub ftp: FtpArgs,

    /// Skip subdirectories that cannot be listed instead of aborting
    #[arg(long, default_value_t = false)]
    pub skip_unreadable: bool,

    /// Increase verbosity
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocator {
    /// ftps:// was requested
    pub secure: bool,
    pub host: String,
    pub port: u16,
    /// Root of the tree to mirror
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestLocator {
    pub bucket: String,
    /// Raw prefix from the URL path; normalized when listing
    pub prefix: String,
}

/// Everything one mirror run needs, fixed at startup.
#[derive(Debug, Clone)]
pub struct MirrorConfig {
    pub source: SourceLocator,
    pub destination: DestLocator,
    pub user: String,
    pub password: String,
    pub timeout: Duration,
    pub insecure: bool,
    pub debug: bool,
    pub dry_run: bool,
    pub progress: bool,
    pub listing_policy: ListingPolicy,
}

impl MirrorConfig {
    pub fn from_args(args: &Args) -> Result<Self> {
        Ok(Self {
            source: parse_source(&args.source)?,
            destination: parse_destination(&args.destination)?,
            user: args.ftp.user.clone(),
            password: args.ftp.password.clone(),
            timeout: Duration::from_secs(args.ftp.timeout),
            insecure: args.ftp.insecure,
            debug: args.ftp.debug,
            dry_run: args.dry_run,
            progress: args.progress,
            listing_policy: listing_policy(args.skip_unreadable),
        })
    }

    pub fn ftp_config(&self) -> FtpConfig {
        ftp_config(&self.source, &self.user, &self.password, self.timeout, self.insecure, self.debug)
    }
}

pub fn ftp_config(
    source: &SourceLocator,
    user: &str,
    password: &str,
    timeout: Duration,
    insecure: bool,
    debug: bool,
) -> FtpConfig {
    FtpConfig {
        host: source.host.clone(),
        port: source.port,
        secure: source.secure,
        user: user.to_string(),
        password: password.to_string(),
        timeout,
        insecure,
        debug,
    }
}

pub fn listing_policy(skip_unreadable: bool) -> ListingPolicy {
    if skip_unreadable {
        ListingPolicy::SkipUnreadable
    } else {
        ListingPolicy::FailFast
    }
}

fn decoded_path(url: &Url) -> Result<String> {
    percent_decode_str(url.path())
        .decode_utf8()
        .map(|p| p.into_owned())
        .map_err(|e| MirrorError::Config(format!("Invalid URL path in {}: {}", url, e)))
}

/// Parse `ftp://host[:port]/path` or `ftps://...`. Nothing is contacted.
pub fn parse_source(s: &str) -> Result<SourceLocator> {
    let url = Url::parse(s).map_err(|e| MirrorError::Config(format!("Invalid URL {:?}: {}", s, e)))?;

    let secure = match url.scheme() {
        "ftp" => false,
        "ftps" => true,
        _ => return Err(MirrorError::Config(format!("Invalid URL: missing ftp:// or ftps:// prefix: {}", s))),
    };
    let host = url
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| MirrorError::Config(format!("Invalid URL: missing host name: {}", s)))?;

    let path = decoded_path(&url)?;
    Ok(SourceLocator {
        secure,
        host: host.to_string(),
        port: url.port().unwrap_or(DEFAULT_PORT),
        path: if path.is_empty() { "/".to_string() } else { path },
    })
}

/// Parse `gs://bucket/prefix`.
pub fn parse_destination(s: &str) -> Result<DestLocator> {
    let url = Url::parse(s).map_err(|e| MirrorError::Config(format!("Invalid GS URL {:?}: {}", s, e)))?;

    if url.scheme() != "gs" {
        return Err(MirrorError::Config(format!("Invalid GS URL: missing gs:// prefix: {}", s)));
    }
    let bucket = url
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| MirrorError::Config(format!("Invalid GS URL: missing bucket: {}", s)))?;

    Ok(DestLocator {
        bucket: bucket.to_string(),
        prefix: decoded_path(&url)?,
    })
}
