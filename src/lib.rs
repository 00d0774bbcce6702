//! Centsort is the transaction categorization engine behind a personal
//! budgeting dashboard.
//!
//! Raw bank transactions are turned into categorized results by composing
//! three strategies, cheapest first:
//!
//! 1. a persistent [PatternCache] that remembers high-confidence
//!    categorizations keyed by normalized transaction description,
//! 2. a deterministic [RuleTable] that maps the bank's own category pairs to
//!    budget types,
//! 3. batched calls to a generative classification service behind the
//!    [Classifier] trait, with bounded retry and partial-failure recovery.
//!
//! The [CategorizationPipeline] orchestrates the three and merges their
//! results into one list, ordered by transaction ID.

#![warn(missing_docs)]

mod cache;
mod classifier;
mod models;
mod normalize;
mod pipeline;
mod rules;

pub use cache::{CachedCategorization, MIN_CACHE_CONFIDENCE, PatternCache, STALE_AFTER_DAYS};
pub use classifier::{
    Classifier, ParsedClassification, SYSTEM_PROMPT, TransactionSummary, build_user_prompt,
    http::HttpClassifier, parse_response,
};
pub use models::{BudgetType, CategorizationResult, TransactionId, TransactionInput};
pub use normalize::KeyNormalizer;
pub use pipeline::{CategorizationPipeline, PipelineConfig, RetryPolicy};
pub use rules::RuleTable;

/// The errors that may occur while categorizing transactions.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum Error {
    /// The classification service could not be reached, timed out, or
    /// answered with a server error.
    ///
    /// This failure kind is transient and is retried by the pipeline's retry
    /// policy.
    #[error("the classification service could not be reached: {0}")]
    ServiceUnreachable(String),

    /// The classification service refused the request because too many
    /// requests were sent in a short period.
    ///
    /// Like [Error::ServiceUnreachable], this failure kind is retried.
    #[error("the classification service rate limited the request: {0}")]
    RateLimited(String),

    /// The classification service rejected the request for a reason that
    /// retrying will not fix, e.g. an invalid API key or a malformed request.
    #[error("the classification service rejected the request: {0}")]
    ClassifierRequest(String),

    /// The classification service replied, but the reply did not contain a
    /// payload in the expected shape.
    ///
    /// The raw response text is kept so the failure can be diagnosed later.
    /// This failure kind is not retried.
    #[error("could not parse the classifier response: {reason}")]
    UnparseableResponse {
        /// Why the response could not be parsed.
        reason: String,
        /// The full text of the offending response.
        response_text: String,
    },

    /// One or more batches could not be categorized after retries were
    /// exhausted.
    ///
    /// Carries everything that *was* categorized (cache hits, rule hits, and
    /// results from the batches that succeeded) so the caller can decide
    /// whether partial results are acceptable.
    #[error("{} transactions could not be categorized", .failed_ids.len())]
    PartialCategorization {
        /// The successfully categorized results, sorted by transaction ID.
        results: Vec<CategorizationResult>,
        /// The IDs of the transactions whose batches failed.
        failed_ids: Vec<TransactionId>,
    },

    /// The pattern cache could not be written to disk.
    #[error("could not save the pattern cache: {0}")]
    CacheSave(String),

    /// A value could not be serialized as JSON.
    #[error("could not serialize as JSON: {0}")]
    Serialization(String),

    /// A string did not name one of the five budget types.
    #[error("\"{0}\" is not a valid budget type")]
    UnknownBudgetType(String),

    /// A normalization pattern was not a valid regular expression.
    #[error("invalid normalization pattern: {0}")]
    InvalidPattern(String),
}
