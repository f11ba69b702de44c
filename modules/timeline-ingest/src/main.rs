use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use timeline_common::{Config, FetchFailure, ImportanceScorer, ScoringConfig};
use tracing_subscriber::EnvFilter;
use wikidata_client::{WikidataClient, WikimediaClient, YearRange, DEFAULT_MIN_SITELINKS};

use timeline_ingest::{
    assign_all, backfill_extracts, load_catalog, recategorize, refresh_scores, CatalogPlan,
    EventFilter, EventLoader, LoadOptions, PgEventStore, TracingReporter,
};

#[derive(Parser)]
#[command(name = "timeline", about = "Ingest historical events from Wikidata")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct YearArgs {
    /// First year to include (negative for BCE)
    #[arg(long, allow_hyphen_values = true)]
    start_year: Option<i32>,
    /// Last year to include (negative for BCE)
    #[arg(long, allow_hyphen_values = true)]
    end_year: Option<i32>,
}

impl YearArgs {
    fn range(&self) -> YearRange {
        YearRange::new(self.start_year, self.end_year)
    }
}

#[derive(Subcommand)]
enum Command {
    /// Load events under a category (instance-of/subclass closure)
    Load {
        category: String,
        #[command(flatten)]
        years: YearArgs,
        #[arg(long)]
        limit: Option<u32>,
        /// Skip pageview and backlink requests
        #[arg(long)]
        no_engagement: bool,
    },
    /// Load events of one curated type, by id or label
    LoadByType {
        event_type: String,
        #[command(flatten)]
        years: YearArgs,
        #[arg(long)]
        limit: Option<u32>,
        #[arg(long, default_value_t = DEFAULT_MIN_SITELINKS)]
        min_sitelinks: u32,
        #[arg(long)]
        no_engagement: bool,
    },
    /// Load every type in year windows, recording progress per chunk
    LoadCatalog {
        /// Comma-separated type ids or labels; defaults to every curated type
        #[arg(long, value_delimiter = ',')]
        types: Vec<String>,
        #[arg(long, allow_hyphen_values = true)]
        start_year: i32,
        #[arg(long, allow_hyphen_values = true)]
        end_year: i32,
        #[arg(long, default_value_t = 50)]
        window: u32,
        #[arg(long)]
        limit: Option<u32>,
        /// Skip chunks refreshed after this RFC 3339 timestamp
        #[arg(long)]
        skip_refreshed_since: Option<DateTime<Utc>>,
        #[arg(long)]
        no_engagement: bool,
    },
    /// Recompute importance scores from stored metrics
    UpdateScores,
    /// Re-resolve categories, or assign one category to the selection
    UpdateCategories {
        /// Assign this category to every selected event instead of resolving
        #[arg(long)]
        category: Option<String>,
        /// Comma-separated event ids to restrict the selection
        #[arg(long, value_delimiter = ',')]
        ids: Vec<String>,
        #[arg(long)]
        only_uncategorized: bool,
        /// Compute changes without writing
        #[arg(long)]
        dry_run: bool,
    },
    /// Fetch article lead extracts
    FetchExtracts {
        /// Refetch events that already have an extract
        #[arg(long)]
        all: bool,
    },
    /// List entities belonging to a time period
    PeriodItems {
        period: String,
        #[arg(long, default_value_t = 500)]
        limit: u32,
    },
    /// Print the English label of an entity
    Label { qid: String },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")) {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn connect_store(config: &Config) -> Result<Arc<PgEventStore>> {
    let url = config.require_database_url()?;
    let store = PgEventStore::connect(url)
        .await
        .context("Failed to connect to database")?;
    store.migrate().await.context("Failed to run migrations")?;
    tracing::info!("Connected to database, migrations complete");
    Ok(Arc::new(store))
}

fn print_failures(failures: &[FetchFailure]) {
    if failures.is_empty() {
        return;
    }
    eprintln!("{} enrichment failures:", failures.len());
    for failure in failures {
        eprintln!("  {failure}");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = Config::from_env()?;

    let graph = Arc::new(WikidataClient::from_config(&config)?);
    let wikimedia = Arc::new(WikimediaClient::from_config(&config)?);

    match &cli.command {
        Command::PeriodItems { period, limit } => {
            let items = graph.items_by_time_period(period, *limit).await?;
            for item in &items {
                println!("{}\t{}", item.qid, item.label);
            }
            eprintln!("{} items", items.len());
            return Ok(());
        }
        Command::Label { qid } => {
            match graph.item_label(qid).await? {
                Some(label) => println!("{label}"),
                None => eprintln!("No label for {qid}"),
            }
            return Ok(());
        }
        _ => {}
    }

    let store = connect_store(&config).await?;
    let scorer = ImportanceScorer::new(ScoringConfig::default());
    let loader = EventLoader::builder()
        .graph(graph.clone())
        .engagement(wikimedia.clone())
        .store(store.clone())
        .scorer(scorer.clone())
        .reporter(Arc::new(TracingReporter))
        .build();

    match cli.command {
        Command::Load {
            category,
            years,
            limit,
            no_engagement,
        } => {
            let options = LoadOptions {
                years: years.range(),
                limit,
                fetch_engagement: !no_engagement,
                ..LoadOptions::default()
            };
            let outcome = loader.load_category(&category, &options).await?;
            println!("Created: {}, updated: {}", outcome.created, outcome.updated);
            print_failures(&outcome.failures);
        }
        Command::LoadByType {
            event_type,
            years,
            limit,
            min_sitelinks,
            no_engagement,
        } => {
            let options = LoadOptions {
                years: years.range(),
                limit,
                min_sitelinks,
                fetch_engagement: !no_engagement,
            };
            let outcome = loader.load_by_type(&event_type, &options).await?;
            println!("Created: {}, updated: {}", outcome.created, outcome.updated);
            print_failures(&outcome.failures);
        }
        Command::LoadCatalog {
            types,
            start_year,
            end_year,
            window,
            limit,
            skip_refreshed_since,
            no_engagement,
        } => {
            let plan = CatalogPlan {
                types,
                year_start: start_year,
                year_end: end_year,
                window,
                limit,
                skip_refreshed_since,
                fetch_engagement: !no_engagement,
            };
            let outcome = load_catalog(&loader, &plan).await?;
            println!(
                "Batches run: {}, skipped: {}, created: {}, updated: {}, failures: {}",
                outcome.batches_run,
                outcome.batches_skipped,
                outcome.created,
                outcome.updated,
                outcome.failures
            );
        }
        Command::UpdateScores => {
            let updated = refresh_scores(&*store, &scorer).await?;
            println!("Scores updated: {updated}");
        }
        Command::UpdateCategories {
            category,
            ids,
            only_uncategorized,
            dry_run,
        } => {
            let filter = EventFilter::all()
                .with_ids(ids)
                .uncategorized(only_uncategorized);
            match category {
                Some(category_id) => {
                    let changed = assign_all(&*store, &filter, &category_id).await?;
                    println!("Assigned {category_id} to {changed} events");
                }
                None => {
                    let outcome =
                        recategorize(&*graph, &*store, &filter, dry_run).await?;
                    let verb = if dry_run { "Would update" } else { "Updated" };
                    println!(
                        "{verb}: {}, already correct: {}, no match: {}",
                        outcome.updated,
                        outcome.already_correct,
                        outcome.no_match.len()
                    );
                    if !outcome.no_match.is_empty() {
                        eprintln!("No category match: {}", outcome.no_match.join(", "));
                    }
                }
            }
        }
        Command::FetchExtracts { all } => {
            let outcome =
                backfill_extracts(&*store, &*wikimedia, &TracingReporter, !all).await?;
            println!(
                "Extracts fetched: {}, failed or empty: {}",
                outcome.fetched, outcome.failed_or_empty
            );
            print_failures(&outcome.failures);
        }
        Command::PeriodItems { .. } | Command::Label { .. } => {}
    }

    Ok(())
}
