use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use wikidump_sections::extract::{HeadingSink, JsonLinesSink, OutlineSink, TextSink};
use wikidump_sections::remote::{self, DumpLocation};
use wikidump_sections::settings::Settings;
use wikidump_sections::{run, ArticleRecord, DumpReader, ExtractOptions, LevelSet, RunSummary};

#[derive(Parser)]
#[command(
    name = "wikidump",
    about = "Article titles and section headings from Wikipedia XML dumps"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Find the latest pages-articles dump and its size
    Locate {
        /// Wiki database name (default: bnwiki)
        #[arg(short, long)]
        wiki: Option<String>,
    },
    /// Download the latest pages-articles dump
    Download {
        /// Wiki database name (default: bnwiki)
        #[arg(short, long)]
        wiki: Option<String>,
        /// Destination file (default: the dump's file name)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print every article title
    Titles {
        /// Dump file (.xml or .xml.bz2)
        path: PathBuf,
        /// Max articles to print (default: all)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Print section headings per article
    Sections {
        /// Dump file (.xml or .xml.bz2)
        path: PathBuf,
        /// Max articles to process (default: all)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        /// Heading levels to keep, e.g. "2,3" or "2-4" (default: 2-6)
        #[arg(short, long)]
        levels: Option<LevelSet>,
        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
        /// Only main-namespace articles (skip talk, template, category, ... pages)
        #[arg(long)]
        articles_only: bool,
        /// Articles parsed in parallel per batch (1 = sequential)
        #[arg(short = 'j', long)]
        batch_size: Option<usize>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Title line, then indented headings
    Text,
    /// One JSON object per article
    Json,
    /// Section tree per article
    Outline,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(io::stderr)
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let mut settings = Settings::load().context("Invalid WIKIDUMP_* configuration")?;

    let result = match cli.command {
        Commands::Locate { wiki } => {
            if let Some(wiki) = wiki {
                settings.wiki = wiki;
            }
            let client = remote::http_client()?;
            let location = remote::locate_latest(&client, &settings.directory_url()).await?;
            print_location(&location);
            Ok(())
        }
        Commands::Download { wiki, output } => {
            if let Some(wiki) = wiki {
                settings.wiki = wiki;
            }
            let client = remote::http_client()?;
            let location = remote::locate_latest(&client, &settings.directory_url()).await?;
            print_location(&location);

            let dest = output.unwrap_or_else(|| PathBuf::from(location.file_name()));
            let pb = ProgressBar::new(location.size_bytes);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template(
                        "[{elapsed_precise}] {bar:40} {bytes}/{total_bytes} ({bytes_per_sec}, eta {eta})",
                    )?
                    .progress_chars("=> "),
            );
            let bytes = remote::download(&client, &location, &dest, &pb).await?;
            pb.finish_and_clear();
            println!(
                "Saved {} ({}) to {}",
                location.file_name(),
                format_size(bytes),
                dest.display()
            );
            Ok(())
        }
        Commands::Titles { path, limit } => {
            let options = ExtractOptions {
                stop: Some(stop_on_ctrl_c()),
                ..titles_options(limit, &settings)
            };
            extract(&path, &settings, &options, OutputFormat::Text)
        }
        Commands::Sections {
            path,
            limit,
            levels,
            format,
            articles_only,
            batch_size,
        } => {
            let levels = match levels {
                Some(levels) => levels,
                None => settings.levels()?,
            };
            let options = ExtractOptions {
                levels,
                max_records: limit.or(settings.max_records),
                namespaces: articles_only.then(|| vec![0]),
                batch_size: batch_size.unwrap_or(settings.batch_size),
                stop: Some(stop_on_ctrl_c()),
            };
            info!(
                levels = %options.levels,
                max_records = ?options.max_records,
                batch_size = options.batch_size,
                "Extracting sections"
            );
            extract(&path, &settings, &options, format)
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        eprintln!("\nDone in {}", format_duration(elapsed));
    }

    result
}

/// Titles only: no heading levels, same record cutoff as `sections`.
fn titles_options(limit: Option<usize>, settings: &Settings) -> ExtractOptions {
    ExtractOptions {
        levels: LevelSet::empty(),
        max_records: limit.or(settings.max_records),
        ..Default::default()
    }
}

/// Stream the dump through the driver into the chosen output on stdout.
fn extract(
    path: &Path,
    settings: &Settings,
    options: &ExtractOptions,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] \
                 {bytes}/{total_bytes} ({bytes_per_sec}, eta {eta})",
            )?
            .progress_chars("#>-"),
    );

    let reader = DumpReader::open_with_progress(path, pb.clone())
        .with_context(|| format!("Failed to open {}", path.display()))?
        .with_namespace(&settings.export_namespace);

    let out = BufWriter::new(io::stdout().lock());
    let summary = match format {
        OutputFormat::Text => run_into(reader, options, TextSink::new(out)),
        OutputFormat::Json => run_into(reader, options, JsonLinesSink::new(out)),
        OutputFormat::Outline => run_into(reader, options, OutlineSink::new(out)),
    };
    pb.finish_and_clear();

    eprintln!(
        "Processed {} articles, {} headings ({} skipped, stopped: {:?}).",
        summary.records, summary.headings, summary.skipped, summary.stop
    );
    match summary.error {
        Some(e) => Err(anyhow::Error::new(e))
            .with_context(|| format!("Extraction stopped after {} articles", summary.records)),
        None => Ok(()),
    }
}

fn run_into<I, S>(records: I, options: &ExtractOptions, mut sink: S) -> RunSummary
where
    I: IntoIterator<Item = wikidump_sections::error::Result<ArticleRecord>>,
    S: HeadingSink,
{
    run(records, options, &mut sink)
}

/// Flag raised on the first Ctrl-C; the driver stops at the next record boundary.
fn stop_on_ctrl_c() -> Arc<AtomicBool> {
    let flag = Arc::new(AtomicBool::new(false));
    let signal_flag = Arc::clone(&flag);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nInterrupted, finishing current article...");
            signal_flag.store(true, Ordering::Relaxed);
        }
    });
    flag
}

fn print_location(location: &DumpLocation) {
    println!("Latest dump URL: {}", location.url);
    println!("Size: {} bytes ({})", location.size_bytes, format_size(location.size_bytes));
}

fn format_size(bytes: u64) -> String {
    const GIB: f64 = 1024.0 * 1024.0 * 1024.0;
    const MIB: f64 = 1024.0 * 1024.0;
    let b = bytes as f64;
    if b >= GIB {
        format!("{:.2} GB", b / GIB)
    } else {
        format!("{:.1} MB", b / MIB)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
