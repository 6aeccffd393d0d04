use clap::{Parser, Subcommand};
use pagefold::config::{self, ConverterConfig, PipelineOptions};
use pagefold::{output, pipeline, source};
use std::io;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Flags that override the configuration file for one run.
#[derive(clap::Args, Clone)]
struct ConvertArgs {
    /// Device profile code (see `pagefold profiles`)
    #[arg(long)]
    profile: Option<String>,

    /// JPEG quality, 0-100
    #[arg(long)]
    quality: Option<u32>,

    /// Number of parallel workers (capped at CPU cores)
    #[arg(long)]
    workers: Option<usize>,

    /// Keep page margins instead of trimming them
    #[arg(long)]
    no_crop: bool,

    /// Never split double-page spreads
    #[arg(long)]
    no_split: bool,

    /// Treat the first page as a regular page (it may be split)
    #[arg(long)]
    no_cover: bool,

    /// Keep 1x1 spacer images
    #[arg(long)]
    keep_blank: bool,

    /// List the pages that would be converted, without decoding them
    #[arg(long)]
    dry_run: bool,
}

#[derive(Parser)]
#[command(name = "pagefold")]
#[command(about = "Turn comic sources into ordered, e-reader ready pages")]
#[command(long_about = "\
Turn comic sources into ordered, e-reader ready pages

Accepted inputs:

  book/               Folder of images (jpg, jpeg, png, webp), any depth
  book.cbz, .zip      Zip archive of images
  book.cbr, .rar      Rar archive of images (solid archives supported)
  book.pdf            PDF; the largest image of each page is extracted

Pages are ordered by natural sort of their path (p2 before p10). Each page
has its blank margins trimmed, is scaled down to fit the device, reduced to
the device palette and encoded as JPEG. Wide spreads are split into a left
and a right page. A page that cannot be read is replaced by a page saying
so, and the conversion carries on.

Run 'pagefold gen-config' to generate a documented config.toml.")]
#[command(version)]
struct Cli {
    /// Configuration file (TOML); stock defaults when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the pages of a source in reading order
    Scan {
        /// Folder, cbz/zip, cbr/rar or pdf
        input: PathBuf,
        /// Print the listing as JSON
        #[arg(long)]
        json: bool,
    },
    /// Convert a source into page images
    Convert {
        /// Folder, cbz/zip, cbr/rar or pdf
        input: PathBuf,
        /// Directory the pages are written to
        #[arg(long, short, default_value = "pages")]
        output: PathBuf,
        #[command(flatten)]
        args: ConvertArgs,
    },
    /// List the known device profiles
    Profiles,
    /// Print a stock config.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Scan { input, json } => {
            let source = source::open_source(&input)?;
            if json {
                let listing = serde_json::json!({
                    "kind": source.kind(),
                    "entries": source.entries(),
                });
                println!("{}", serde_json::to_string_pretty(&listing)?);
            } else {
                output::print_scan_output(&input, source.kind(), source.entries());
            }
        }
        Command::Convert {
            input,
            output: output_dir,
            args,
        } => {
            let config = config::load_config(cli.config.as_deref())?;
            let options = resolve_options(config, &args)?;
            convert(&input, &output_dir, &options)?;
        }
        Command::Profiles => {
            for line in output::format_profiles(config::PROFILES) {
                println!("{}", line);
            }
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Overlay command-line flags on the loaded config.
///
/// Value flags go through config validation; switches can only turn
/// behaviour off, so they apply directly to the resolved options.
fn resolve_options(
    mut config: ConverterConfig,
    args: &ConvertArgs,
) -> Result<PipelineOptions, config::ConfigError> {
    if let Some(profile) = &args.profile {
        config.profile = Some(profile.clone());
    }
    if let Some(quality) = args.quality {
        config.images.quality = quality;
    }
    if let Some(workers) = args.workers {
        config.processing.workers = Some(workers);
    }
    config.validate()?;

    let mut options = PipelineOptions::from_config(&config);
    options.crop &= !args.no_crop;
    options.auto_split_double_page &= !args.no_split;
    options.has_cover &= !args.no_cover;
    options.drop_blank_pages &= !args.keep_blank;
    options.dry_run = args.dry_run;
    Ok(options)
}

fn convert(
    input: &Path,
    output_dir: &Path,
    options: &PipelineOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let (tx, rx) = std::sync::mpsc::channel();
    let printer = std::thread::spawn(move || {
        for event in rx {
            for line in output::format_pipeline_event(&event) {
                println!("{}", line);
            }
        }
    });
    let result = pipeline::run(input, options, Some(tx));
    // The sender is dropped with the run, so the printer always finishes
    printer
        .join()
        .map_err(|_| "progress printer thread panicked")?;
    let conversion = result?;

    if options.dry_run {
        output::print_scan_output(input, conversion.kind, &conversion.entries);
        return Ok(());
    }

    pipeline::write_pages(&conversion.pages, output_dir)?;
    output::print_convert_summary(&conversion, output_dir);
    Ok(())
}
