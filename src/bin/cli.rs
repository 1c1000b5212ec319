//
// Copyright, 2025.  Signal65 / Futurum Group.
// 
//! Command line front end for the S3 transport.
//!
//! Examples:
//! ```bash
//! apt-s3 download s3://bucket/pool/main/h/hello_1.0_amd64.deb          # into ./hello_1.0_amd64.deb
//! apt-s3 download s3://bucket/dists/stable/InRelease /tmp/InRelease   # explicit path
//! apt-s3 stat     s3://bucket/dists/stable/InRelease
//! apt-s3 --credential-source environment download s3://bucket/key
//! ```

use anyhow::{bail, Result};
use clap::{ArgAction, Parser, Subcommand};
use regex::Regex;
use std::io::{self, Write, ErrorKind};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use apt_s3::{
    CredentialFallback, CredentialSource, KeyMatching, ResolverConfig, S3Downloader,
};

/// Macro to safely print with broken pipe handling
macro_rules! safe_println {
    ($($arg:tt)*) => {
        match writeln!(io::stdout(), $($arg)*) {
            Ok(_) => {},
            Err(e) if e.kind() == ErrorKind::BrokenPipe => {
                // Gracefully exit on broken pipe (e.g., when piped to head/tail)
                std::process::exit(0);
            }
            Err(e) => return Err(e.into())
        }
    };
}

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[arg(short = 'v', 
        long, 
        action = ArgAction::Count,
        help = "Increase log verbosity: -v = Info, -vv = Debug",
    )]
    verbose: u8,

    /// Credentials file (default: /etc/apt/s3creds or $APT_S3_CREDENTIALS).
    #[arg(long = "credentials", value_name = "FILE")]
    credentials: Option<PathBuf>,

    /// Where endpoint and region overrides come from.
    #[arg(long = "credential-source", value_enum)]
    credential_source: Option<CredentialSource>,

    /// Access mode used when the credentials file does not exist.
    #[arg(long = "credential-fallback", value_enum)]
    credential_fallback: Option<CredentialFallback>,

    /// How credentials file lines are matched to directives.
    #[arg(long = "key-matching", value_enum, default_value_t = KeyMatching::Exact)]
    key_matching: KeyMatching,

    /// Request this region instead of $AWS_DEFAULT_REGION / us-east-1.
    #[arg(long = "region")]
    region: Option<String>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Download a single object to a local file.
    Download {
        /// Full S3 URI (e.g. s3://bucket/pool/main/p/pkg.deb)
        uri: String,

        /// Local path; defaults to the last segment of the key.
        path: Option<String>,
    },
    /// Show last-modified time and size of a single object.
    Stat {
        /// Full S3 URI (e.g. s3://bucket/dists/stable/Release)
        uri: String,
    },
}

fn check_reference(uri: &str) -> Result<()> {
    let re = Regex::new(r"^s3://.*")?;
    if !re.is_match(uri) {
        bail!("Incorrect bucket format: {uri} (expected s3://<bucket>/<key>)");
    }
    Ok(())
}

fn resolver_config(cli: &Cli) -> Result<ResolverConfig> {
    let mut config = ResolverConfig::from_env()?.with_key_matching(cli.key_matching);
    if let Some(path) = &cli.credentials {
        config = config.with_credentials_path(path);
    }
    if let Some(source) = cli.credential_source {
        config = config.with_source(source);
    }
    if let Some(fallback) = cli.credential_fallback {
        config = config.with_fallback(fallback);
    }
    Ok(config)
}

/// Main CLI function
#[tokio::main]
async fn main() -> Result<()> {
    // Loads any variables from .env file that are not already set
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Initialize tracing subscriber based on verbosity
    let filter = match cli.verbose {
        0 => "warn",        // no -v: WARN level
        1 => "info",        // -v: INFO level
        _ => "debug",       // -vv or more: DEBUG level
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let mut downloader = S3Downloader::new(resolver_config(&cli)?);
    if let Some(region) = &cli.region {
        downloader = downloader.with_region(region.clone());
    }

    match &cli.cmd {
        Command::Download { uri, path } => {
            check_reference(uri)?;
            let path = path.as_deref().unwrap_or_default();
            info!("Downloading {} (region {})", uri, downloader.requested_region());
            let filename = downloader.download_file_async(uri, path).await?;
            safe_println!("Downloaded {}", filename);
        }
        Command::Stat { uri } => {
            check_reference(uri)?;
            let attrs = downloader.get_file_attributes_async(uri).await?;
            safe_println!("Last-Modified: {}", attrs.last_modified);
            safe_println!("Size: {}", attrs.size);
        }
    }

    Ok(())
}
