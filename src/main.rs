use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use sitefind::index::bundle::DEFAULT_BUNDLE_DIR;
use sitefind::index::stats;
use sitefind::{DirectoryOptions, Index, IndexConfig, SiteDirectory, WriteOptions};
use std::path::PathBuf;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sitefind")]
#[command(version, about = "Build static, client-side search bundles for websites")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index a built site and write its search bundle
    Index {
        /// Root directory of the built site
        site: PathBuf,

        /// Glob selecting the files to index, relative to the site root
        #[arg(short, long)]
        glob: Option<String>,

        /// Output directory for the bundle (defaults to <site>/_sitefind)
        #[arg(short, long)]
        bundle_dir: Option<PathBuf>,

        /// JSON config file (defaults to <site>/sitefind.json when present)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Only print warnings and errors
        #[arg(short, long)]
        quiet: bool,
    },
    /// Show statistics for a written bundle
    Stats {
        /// Bundle directory
        bundle: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let quiet = matches!(cli.command, Commands::Index { quiet: true, .. });
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if quiet { "warn" } else { "info" }));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Index {
            site,
            glob,
            bundle_dir,
            config,
            quiet,
        } => run_index(site, glob, bundle_dir, config, quiet),
        Commands::Stats { bundle } => stats::show_stats(&bundle),
    }
}

fn run_index(
    site: PathBuf,
    glob: Option<String>,
    bundle_dir: Option<PathBuf>,
    config: Option<PathBuf>,
    quiet: bool,
) -> Result<()> {
    let config = match config {
        Some(path) => IndexConfig::load(&path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => IndexConfig::load_from_site(&site).context("Failed to load site config")?,
    };

    let created = Index::create(config);
    let Some(index) = created.index else {
        bail!("Failed to create index: {}", created.errors.join("; "));
    };

    if !quiet {
        println!("Indexing: {}", site.display());
    }
    let indexed = index.add_directory_with(
        SiteDirectory {
            path: site.clone(),
            glob,
        },
        DirectoryOptions {
            cancel: None,
            progress: !quiet,
        },
    );
    for error in &indexed.errors {
        warn!("{}", error);
    }
    if indexed.page_count == 0 && !indexed.errors.is_empty() {
        bail!("No pages indexed ({} errors)", indexed.errors.len());
    }

    let target = bundle_dir.unwrap_or_else(|| site.join(DEFAULT_BUNDLE_DIR));
    let written = index.write_files(Some(WriteOptions {
        bundle_path: Some(target),
    }));
    let Some(bundle_path) = written.bundle_path else {
        bail!("Failed to write bundle: {}", written.errors.join("; "));
    };

    if !quiet {
        println!("Indexed {} pages", indexed.page_count);
        if !indexed.errors.is_empty() {
            println!("({} files could not be indexed)", indexed.errors.len());
        }
        println!("Bundle stored at: {}", bundle_path.display());
    }
    Ok(())
}
