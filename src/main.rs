use anyhow::Context;
use clap::{Args as ClapArgs, Parser, Subcommand};
use indicatif::HumanBytes;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use ydmirror::paths::{default_full_dir, default_sync_dir, is_public_link};
use ydmirror::{
    Credentials, Mirror, ResourceType, SyncConfig, SyncOptions, SyncOutcome, CREDENTIALS_FILE,
};

#[derive(Parser, Debug)]
#[command(name = "ydmirror")]
#[command(about = "Mirror public Yandex.Disk resources to a local directory", long_about = None)]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    network: NetworkArgs,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(ClapArgs, Debug)]
struct NetworkArgs {
    /// Disk API base URL
    #[arg(long, global = true, default_value = "https://cloud-api.yandex.net/v1/disk")]
    api_url: String,

    /// Request timeout (e.g. "30s", "2m")
    #[arg(long, global = true, default_value = "30s", value_parser = humantime::parse_duration)]
    timeout: Duration,

    /// Retries on 429/5xx and network failures
    #[arg(long, global = true, default_value_t = 3)]
    retries: u32,

    /// Exponential backoff factor in seconds
    #[arg(long, global = true, default_value_t = 1.0)]
    backoff: f64,

    /// Download files with this aria2c executable instead of streaming them
    #[arg(long, global = true)]
    aria2: Option<PathBuf>,

    /// Credentials file holding the OAuth key
    #[arg(long, global = true, default_value = CREDENTIALS_FILE)]
    credentials: PathBuf,

    /// Disable progress bars
    #[arg(long, global = true)]
    no_progress: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Download the whole resource as one file (directories come as a ZIP archive)
    Full {
        /// Public resource URL
        #[arg(short, long)]
        url: String,

        /// Output directory (defaults to the link id)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output file name (defaults to the name the server sends)
        #[arg(short, long)]
        filename: Option<String>,

        /// Also save the resource metadata as _metadata.json
        #[arg(short, long)]
        metadata: bool,
    },
    /// Mirror the resource tree file by file
    Sync {
        /// Public resource URL
        #[arg(short, long)]
        url: String,

        /// Output directory (defaults to the link id)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Skip files that already exist locally
        #[arg(long)]
        update: bool,

        /// Store listings only, no file contents
        #[arg(short, long, visible_alias = "nofiles")]
        metadata_only: bool,
    },
    /// Save and print a single directory listing
    List {
        /// Public resource URL
        #[arg(short, long)]
        url: String,

        /// Path inside the resource
        #[arg(short, long, default_value = "")]
        path: String,

        /// Output directory (defaults to the link id)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Store an OAuth key in the credentials file
    Configure {
        /// OAuth key
        #[arg(short, long)]
        key: String,
    },
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize tracing
    let log_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("ydmirror={}", log_level)));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Err(e) = run(args).await {
        eprintln!("❌ Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let network = args.network;

    match args.command {
        Command::Full {
            url,
            output,
            filename,
            metadata,
        } => {
            check_link(&url);
            let mirror = build_mirror(&network)?;
            let output = output.unwrap_or_else(|| default_full_dir(&url));
            info!("Output directory: {}", output.display());

            let report = mirror
                .full_fetch(&url, &output, filename.as_deref(), metadata)
                .await
                .with_context(|| format!("failed to fetch {}", url))?;

            match (report.resource_type, report.archive_contents) {
                (ResourceType::Directory, Some(stats)) => println!(
                    "Downloaded ZIP archive of {} file(s), {}",
                    stats.file_count,
                    HumanBytes(stats.total_bytes)
                ),
                (kind, _) => println!("Downloaded {}", kind),
            }
            println!(
                "Saved to {} ({} bytes written)",
                report.receipt.path.display(),
                report.receipt.bytes_written
            );
        }
        Command::Sync {
            url,
            output,
            update,
            metadata_only,
        } => {
            check_link(&url);
            let mirror = build_mirror(&network)?;
            let output = output.unwrap_or_else(|| default_sync_dir(&url));
            info!("Output directory: {}", output.display());

            let options = SyncOptions {
                update_only: update,
                metadata_only,
            };
            let outcome = mirror
                .sync(&url, &output, options)
                .await
                .with_context(|| format!("failed to sync {}", url))?;

            match outcome {
                SyncOutcome::UpToDate => println!("All files are already up to date."),
                SyncOutcome::NothingToDownload => println!("No files found to download."),
                SyncOutcome::Completed { planned, summary } => {
                    if let Some(stats) = planned {
                        println!(
                            "Planned: {} file(s), {}",
                            stats.file_count,
                            HumanBytes(stats.total_bytes)
                        );
                    }
                    println!(
                        "✅ {} director(ies), {} downloaded, {} skipped, {} failed",
                        summary.directories,
                        summary.files_downloaded,
                        summary.files_skipped,
                        summary.failures
                    );
                    if summary.failures > 0 {
                        warn!("Some entries failed; run again to resume them");
                    }
                }
            }
        }
        Command::List { url, path, output } => {
            check_link(&url);
            let mirror = build_mirror(&network)?;
            let output = output.unwrap_or_else(|| default_sync_dir(&url));
            let page = mirror
                .list(&url, &path, &output)
                .await
                .with_context(|| format!("failed to list {}", url))?;

            println!(
                "{} ({})",
                page.name.as_deref().unwrap_or("<unnamed>"),
                page.resource_type
            );
            for entry in &page.items {
                let size = entry
                    .size
                    .map(|size| format!(" ({})", HumanBytes(size)))
                    .unwrap_or_default();
                println!("  {:<9} {}{}", entry.kind, entry.remote_path, size);
            }
        }
        Command::Configure { key } => {
            Credentials::save_oauth_token(&network.credentials, &key)
                .context("failed to store the OAuth key")?;
        }
    }

    Ok(())
}

/// Reads the credentials file and builds the one config used for the whole run.
fn build_mirror(network: &NetworkArgs) -> anyhow::Result<Mirror> {
    let path = &network.credentials;
    let credentials = Credentials::load(path)
        .with_context(|| format!("failed to read {}", path.display()))?;

    let config = SyncConfig {
        api_base_url: network.api_url.clone(),
        timeout: network.timeout,
        max_retries: network.retries,
        backoff_factor: network.backoff,
        oauth_token: credentials.oauth_token().map(str::to_string),
        helper_path: network.aria2.clone(),
        show_progress: !network.no_progress && atty::is(atty::Stream::Stderr),
        ..SyncConfig::default()
    };
    Mirror::new(config).context("failed to set up the mirror")
}

fn check_link(url: &str) {
    if !is_public_link(url) {
        warn!("{} does not look like a public Yandex.Disk link", url);
    }
}
