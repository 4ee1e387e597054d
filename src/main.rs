use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use env_logger::Env;
use log::{debug, info, LevelFilter};
use std::path::PathBuf;

use ee_inventory::naming;
use ee_inventory::report;
use ee_inventory::snapshot;
use ee_inventory::{ContainerEngine, InventoryProcessor, PodmanEngine, TagDiscovery};

const DEFAULT_REPO: &str = "registry.redhat.io/ansible-automation-platform-25/ee-minimal-rhel9";
const DEFAULT_REGISTRY: &str = "registry.redhat.io";

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(
        short,
        long,
        global = true,
        action = clap::ArgAction::Count,
        help = "Verbose mode (-v for info, -vv for debug, -vvv for trace). Also switches to text-based progress"
    )]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Export RPM/Python/Collection inventories from images to XML files
    Extract(ExtractArgs),
    /// Build an HTML diff report from a directory of inventory XML files
    Report(ReportArgs),
}

#[derive(Args)]
struct ExtractArgs {
    #[arg(
        long,
        default_value = DEFAULT_REPO,
        help = "Repository with registry, e.g. registry.redhat.io/namespace/name"
    )]
    repo: String,

    #[arg(long, default_value = DEFAULT_REGISTRY, help = "Registry host to log in to")]
    registry: String,

    #[arg(long, help = "Registry username (if provided, a login will be attempted)")]
    username: Option<String>,

    #[arg(
        long,
        help = "Registry password; if omitted but username is provided, you will be prompted"
    )]
    password: Option<String>,

    #[arg(long, help = "Comma-separated list of tags OR 'all' to discover every tag")]
    tags: Option<String>,

    #[arg(long, help = "File with one tag (or full image ref) per line")]
    tags_file: Option<PathBuf>,

    #[arg(long, help = "Comma-separated full image refs (can include tags or digests)")]
    images: Option<String>,

    #[arg(short, long, default_value = "./xml-out", help = "Output directory for XML files")]
    out: PathBuf,

    #[arg(long, help = "Do not remove images after processing (debug)")]
    no_rmi: bool,
}

#[derive(Args)]
struct ReportArgs {
    #[arg(default_value = "./xml-out", help = "Directory of inventory XML files")]
    input: PathBuf,

    #[arg(default_value = "./ee_diff_report.html", help = "Output HTML file")]
    output: PathBuf,

    #[arg(
        long,
        default_value_t = report::DEFAULT_SAMPLE_LIMIT,
        help = "Max inline sample entries per cell before collapsing"
    )]
    sample_limit: usize,
}

/// User-input/configuration problem: report and exit with status 2.
fn config_error(message: &str) -> ! {
    eprintln!("{}", message);
    std::process::exit(2);
}

fn main() {
    let cli = Cli::parse();

    // Setup logging based on verbosity level
    let log_level = match cli.verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::from_env(Env::default())
        .filter_level(log_level)
        .init();

    let use_beautiful_progress = cli.verbose == 0;

    let result = match cli.command {
        Commands::Extract(args) => run_extract(args, use_beautiful_progress),
        Commands::Report(args) => run_report(args),
    };

    if let Err(err) = result {
        eprintln!("Error: {:#}", err);
        std::process::exit(1);
    }
}

fn run_extract(args: ExtractArgs, use_beautiful_progress: bool) -> Result<()> {
    let engine = PodmanEngine::new()?;

    if let Some(username) = &args.username {
        let password = match &args.password {
            Some(password) => password.clone(),
            None => dialoguer::Password::new()
                .with_prompt(format!("Password for {}@{}", username, args.registry))
                .interact()?,
        };
        info!("Logging in to {} as {}", args.registry, username);
        engine.login(&args.registry, username, &password)?;
    }

    let images = resolve_image_refs(&args)?;
    if images.is_empty() {
        config_error(
            "No images specified. Use --images and/or --tags/--tags-file (or --tags all).",
        );
    }
    debug!("Resolved {} image reference(s)", images.len());

    let processor = InventoryProcessor::new(engine, args.no_rmi);
    processor.process_all(&images, &args.out, use_beautiful_progress)?;
    Ok(())
}

fn resolve_image_refs(args: &ExtractArgs) -> Result<Vec<String>> {
    let mut refs = Vec::new();

    if let Some(images) = &args.images {
        refs.extend(
            images
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        );
    }

    if let Some(tags) = &args.tags {
        if tags.trim().eq_ignore_ascii_case("all") {
            info!("Discovering all tags for {}", args.repo);
            let discovered = match TagDiscovery::new()
                .and_then(|d| d.discover_tags(&args.registry, &args.repo))
            {
                Ok(discovered) => discovered,
                Err(err) => config_error(&format!("Could not fetch tags: {:#}", err)),
            };
            if discovered.is_empty() {
                config_error("No tags returned by the catalog service for this repo.");
            }
            info!("Found {} tags", discovered.len());
            refs.extend(discovered.iter().map(|t| format!("{}:{}", args.repo, t)));
        } else {
            refs.extend(naming::refs_from_tag_list(&args.repo, tags));
        }
    }

    if let Some(tags_file) = &args.tags_file {
        let content = std::fs::read_to_string(tags_file)
            .map_err(|e| anyhow::anyhow!("Could not read {}: {}", tags_file.display(), e))?;
        refs.extend(naming::refs_from_tags_file(&args.repo, &content));
    }

    Ok(naming::dedupe_refs(refs))
}

fn run_report(args: ReportArgs) -> Result<()> {
    if !args.input.exists() {
        config_error(&format!("Input directory not found: {}", args.input.display()));
    }

    let snapshots = snapshot::load_directory(&args.input)?;
    if snapshots.is_empty() {
        config_error(&format!("No XML files found in {}", args.input.display()));
    }

    report::write_report(snapshots, &args.output, args.sample_limit)?;
    info!("Wrote {}", args.output.display());
    Ok(())
}
