use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use school_feeds::config::{Config, NoticeSource};
use school_feeds::feed::regenerate_feed;
use school_feeds::fetcher::Fetcher;
use school_feeds::meal::build_meal_page;
use school_feeds::notice::{crawl_notices, envelope_file_name};

#[derive(Parser)]
#[command(name = "school-feeds", version, about = "School meal pages and notice feeds")]
struct Cli {
    /// TOML configuration file; defaults apply when it does not exist
    #[arg(long, default_value = "school.toml")]
    config: PathBuf,

    /// Append logs to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Render this week's meals (next week's on weekends) as HTML
    Meal {
        #[arg(long)]
        output: Option<PathBuf>,
        /// Pretend today is this date (YYYY-MM-DD)
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Crawl notice feeds into JSON envelopes
    Notices {
        /// Crawl this feed instead of the configured ones
        #[arg(long)]
        url: Option<String>,
        #[arg(long, requires = "url")]
        name: Option<String>,
        #[arg(long, requires = "url")]
        output: Option<PathBuf>,
    },
    /// Regenerate RSS feeds from JSON envelopes
    Feed {
        /// Envelope files; every *_notices_api.json in the output directory when empty
        inputs: Vec<PathBuf>,
        #[arg(long)]
        output: Option<PathBuf>,
        #[arg(long)]
        self_link: Option<String>,
    },
}

fn init_logging(log_file: Option<&Path>) -> anyhow::Result<()> {
    let registry = tracing_subscriber::registry().with(
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "school_feeds=info".into()),
    );

    match log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(Arc::new(file)),
                )
                .init();
        }
        None => registry.with(tracing_subscriber::fmt::layer()).init(),
    }

    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load_or_default(&cli.config)?.with_env();

    let log_file = cli.log_file.as_deref().or(config.log_file.as_deref());
    init_logging(log_file)?;
    info!("Loaded configuration from {}", cli.config.display());

    match cli.command {
        Command::Meal { output, date } => run_meal(&config, output, date).await,
        Command::Notices { url, name, output } => {
            let sources = match url {
                Some(url) => vec![NoticeSource { name, url, output }],
                None => config.notices.clone(),
            };
            run_notices(&config, &sources).await
        }
        Command::Feed {
            inputs,
            output,
            self_link,
        } => run_feed(&config, inputs, output, self_link),
    }
}

async fn run_meal(
    config: &Config,
    output: Option<PathBuf>,
    date: Option<NaiveDate>,
) -> anyhow::Result<()> {
    let fetcher = Fetcher::new(Duration::from_secs(config.timeout_secs))?;
    let mut meal = config.meal.clone();
    if let Some(output) = output {
        meal.output = output;
    }
    let today = date.unwrap_or_else(|| Local::now().date_naive());

    if let Err(e) = build_meal_page(&fetcher, &meal, &config.weather, today).await {
        error!("Meal page not generated: {}", e);
    }
    Ok(())
}

async fn run_notices(config: &Config, sources: &[NoticeSource]) -> anyhow::Result<()> {
    if sources.is_empty() {
        warn!("No notice feeds configured; pass --url or add [[notices]] to the config");
        return Ok(());
    }

    let fetcher = Fetcher::new(Duration::from_secs(config.timeout_secs))?;
    for source in sources {
        let envelope = crawl_notices(&fetcher, &source.url, source.name.as_deref()).await;

        let path = source.output.clone().unwrap_or_else(|| {
            config
                .feed
                .output_dir
                .join(envelope_file_name(&envelope.meta.source))
        });
        std::fs::write(&path, envelope.to_json()?)?;
        info!(
            "Saved {} notices from {} to {}",
            envelope.meta.total_count,
            envelope.meta.source,
            path.display()
        );
    }
    Ok(())
}

fn run_feed(
    config: &Config,
    inputs: Vec<PathBuf>,
    output: Option<PathBuf>,
    self_link: Option<String>,
) -> anyhow::Result<()> {
    let inputs = if inputs.is_empty() {
        find_envelopes(&config.feed.output_dir)?
    } else {
        inputs
    };

    if output.is_some() && inputs.len() > 1 {
        anyhow::bail!("--output can only be used with a single input");
    }

    for input in &inputs {
        info!("Converting {} to an RSS feed", input.display());
        if regenerate_feed(input, output.as_deref(), self_link.as_deref(), &config.feed).is_none() {
            error!("RSS feed not generated for {}", input.display());
        }
    }
    Ok(())
}

fn find_envelopes(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let is_envelope = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.ends_with("_notices_api.json"));
        if is_envelope {
            found.push(path);
        }
    }
    found.sort();
    Ok(found)
}
