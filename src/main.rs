use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use mora_core::{
    create_record_table, normalize, write_csv, write_json, CrawlConfig, ListingSourceRef, RawPage,
};
use mora_scrapers::{Crawler, HttpFetcher, ParserFactory, SourceKind};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;
use url::Url;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl listing pages into a property dataset
    #[command(about = "Crawl listing pages into a property dataset")]
    #[command(
        long_about = "Crawl listing pages starting from one or more seed URLs, following pagination and per-listing detail links, and emit normalized property records."
    )]
    Crawl(CrawlCommand),

    /// Parse a saved HTML page offline
    #[command(about = "Parse a saved HTML page offline")]
    #[command(
        long_about = "Parse a locally saved listings page without touching the network. Useful for checking whether a source's layout still matches the parser."
    )]
    Parse(ParseCommand),
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliSource {
    Inmuebles24,
}

impl From<CliSource> for SourceKind {
    fn from(value: CliSource) -> Self {
        match value {
            CliSource::Inmuebles24 => SourceKind::Inmuebles24,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Csv,
    Json,
}

#[derive(Parser)]
#[command(about = "Crawl listing pages into a property dataset")]
struct CrawlCommand {
    /// Seed listing URLs (-u, --url). Can be specified multiple times.
    #[arg(short = 'u', long = "url", required = true, num_args = 1..)]
    urls: Vec<Url>,

    /// The listing source to parse as (-x, --source)
    #[arg(short = 'x', long, value_enum, default_value_t = CliSource::Inmuebles24)]
    source: CliSource,

    /// Maximum number of pages to fetch (-c, --max-pages)
    #[arg(short = 'c', long, default_value_t = 50)]
    max_pages: usize,

    /// Stop once this many records have been accumulated (-r, --max-records)
    #[arg(short = 'r', long)]
    max_records: Option<usize>,

    /// Number of concurrent fetches (-j, --concurrency)
    #[arg(short = 'j', long, default_value_t = 4)]
    concurrency: usize,

    /// Minimum milliseconds between consecutive requests (-i, --rate-limit-ms)
    #[arg(short = 'i', long, default_value_t = 500)]
    rate_limit_ms: u64,

    /// Fetch attempts per page before it is skipped (-a, --max-attempts)
    #[arg(short = 'a', long, default_value_t = 3)]
    max_attempts: u32,

    /// Only follow pagination, not per-listing detail links
    #[arg(long)]
    no_details: bool,

    /// Output file path (-o, --output)
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,

    /// Output format (-f, --format)
    #[arg(short = 'f', long, value_enum, default_value_t = OutputFormat::Csv)]
    format: OutputFormat,
}

#[derive(Parser)]
#[command(about = "Parse a saved HTML page offline")]
struct ParseCommand {
    /// Saved HTML file to parse
    file: PathBuf,

    /// URL to resolve relative links against (-u, --url)
    #[arg(
        short = 'u',
        long,
        default_value = "https://www.example-portal.com.mx/saved.html"
    )]
    url: Url,

    /// The listing source to parse as (-x, --source)
    #[arg(short = 'x', long, value_enum, default_value_t = CliSource::Inmuebles24)]
    source: CliSource,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Crawl(cmd) => {
            let config = CrawlConfig {
                max_pages: cmd.max_pages,
                max_records: cmd.max_records,
                concurrency: cmd.concurrency,
                rate_limit: Duration::from_millis(cmd.rate_limit_ms),
                max_attempts: cmd.max_attempts,
                follow_details: !cmd.no_details,
                ..CrawlConfig::default()
            };

            let fetcher = Arc::new(HttpFetcher::new(config.clone())?);
            let parser = ParserFactory::create_parser(cmd.source.into());
            let crawler = Crawler::new(fetcher, parser, config)?;

            let cancel = CancellationToken::new();
            let signal_token = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("interrupt received, finishing in-flight pages");
                    signal_token.cancel();
                }
            });

            let seeds = cmd.urls.into_iter().map(ListingSourceRef::seed).collect();
            let outcome = crawler.crawl_with_cancellation(seeds, cancel).await;

            println!("{}", create_record_table(&outcome.records));
            print!("{}", outcome.summary.render());

            if let Some(path) = cmd.output {
                match cmd.format {
                    OutputFormat::Csv => write_csv(&path, &outcome.records)
                        .with_context(|| format!("writing {}", path.display()))?,
                    OutputFormat::Json => write_json(&path, &outcome.records)
                        .with_context(|| format!("writing {}", path.display()))?,
                }
                info!(
                    "wrote {} records to {}",
                    outcome.records.len(),
                    path.display()
                );
            }
        }
        Commands::Parse(cmd) => {
            let body = std::fs::read_to_string(&cmd.file)
                .with_context(|| format!("reading {}", cmd.file.display()))?;

            let parser = ParserFactory::create_parser(cmd.source.into());
            let page = RawPage {
                source: ListingSourceRef::seed(cmd.url),
                status: 200,
                body,
                fetched_at: chrono::Utc::now(),
            };

            let parsed = parser.parse(&page)?;
            let records: Vec<_> = parsed
                .candidates
                .iter()
                .filter_map(|candidate| normalize(candidate, page.fetched_at))
                .collect();

            info!(
                "{} candidates, {} navigation refs, {} records",
                parsed.candidates.len(),
                parsed.next_refs.len(),
                records.len()
            );
            println!("{}", create_record_table(&records));
        }
    }

    Ok(())
}
