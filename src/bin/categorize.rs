use std::{env, fs, path::PathBuf, process::ExitCode};

use clap::Parser;
use tracing_subscriber::{Layer, filter, layer::SubscriberExt, util::SubscriberInitExt};

use centsort::{
    CategorizationPipeline, CategorizationResult, Error, HttpClassifier, PatternCache,
    PipelineConfig, RuleTable, TransactionInput,
};

/// Categorizes bank transactions into budget categories.
///
/// Reads a JSON array of transactions, resolves as many as possible from the
/// pattern cache and the deterministic rules, classifies the rest with the
/// configured service, and prints the categorized results as JSON on stdout.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// File path to a JSON array of transactions to categorize.
    #[arg(long)]
    input: PathBuf,

    /// File path to the pattern cache document.
    #[arg(long, default_value = "pattern_cache.json")]
    cache_path: PathBuf,

    /// URL of the chat-completions endpoint used for classification.
    #[arg(long, default_value = "https://api.openai.com/v1/chat/completions")]
    api_url: String,

    /// Model name passed to the classification service.
    #[arg(long, default_value = "gpt-4.1-mini")]
    model: String,

    /// Maximum number of transactions per classification request.
    #[arg(long, default_value_t = 50)]
    batch_size: usize,
}

fn main() -> ExitCode {
    setup_logging();

    let args = Args::parse();

    let api_key = env::var("CLASSIFIER_API_KEY")
        .expect("The environment variable 'CLASSIFIER_API_KEY' must be set");

    let text = fs::read_to_string(&args.input).expect("Could not read the input file");
    let transactions: Vec<TransactionInput> = serde_json::from_str(&text)
        .expect("Could not parse the input file as a JSON array of transactions");

    let classifier = HttpClassifier::new(&args.api_url, &args.model, &api_key);
    let cache = PatternCache::load(&args.cache_path);
    let config = PipelineConfig {
        batch_size: args.batch_size,
        ..PipelineConfig::default()
    };
    let mut pipeline = CategorizationPipeline::new(classifier, RuleTable::new(), cache, config);

    tracing::info!("Categorizing {} transactions", transactions.len());

    match pipeline.categorize(&transactions) {
        Ok(results) => {
            print_results(&results);
            ExitCode::SUCCESS
        }
        Err(Error::PartialCategorization {
            results,
            failed_ids,
        }) => {
            tracing::error!(
                "{} transactions could not be categorized: {failed_ids:?}",
                failed_ids.len()
            );
            print_results(&results);
            ExitCode::FAILURE
        }
        Err(error) => {
            tracing::error!("Categorization failed: {error}");
            ExitCode::FAILURE
        }
    }
}

/// Print categorized results as JSON on stdout. Logging goes to stderr, so
/// the output stays machine-readable.
fn print_results(results: &[CategorizationResult]) {
    let json =
        serde_json::to_string_pretty(results).expect("Could not serialize the results as JSON");
    println!("{json}");
}

fn setup_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .pretty()
                .with_writer(std::io::stderr)
                .with_filter(filter::LevelFilter::INFO),
        )
        .init();
}
