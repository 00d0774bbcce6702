//! The orchestrator that turns raw transactions into categorized results.
//!
//! [CategorizationPipeline::categorize] composes the three strategies in cost
//! order: pattern cache hits first, then deterministic rules, then batched
//! classifier calls under a bounded retry policy. Batches are dispatched
//! sequentially, one at a time; a failed batch is recorded and the remaining
//! batches still run.

use std::{
    collections::{HashMap, HashSet},
    thread::sleep,
    time::Duration,
};

use crate::{
    Error,
    cache::PatternCache,
    classifier::{Classifier, ParsedClassification, TransactionSummary, parse_response},
    models::{BudgetType, CategorizationResult, TransactionId, TransactionInput},
    rules::RuleTable,
};

/// Tuning knobs for one [CategorizationPipeline].
///
/// The defaults are the production values; tests shrink the retry delay so
/// retry behaviour can be exercised quickly.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// The maximum number of transactions submitted to the classifier in one
    /// request. The last batch may be smaller, never empty.
    pub batch_size: usize,

    /// The total number of attempts per batch, including the first.
    pub max_attempts: u32,

    /// The wait before the first retry. Each further retry doubles the wait.
    pub retry_base_delay: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            max_attempts: 3,
            retry_base_delay: Duration::from_secs(1),
        }
    }
}

/// The bounded exponential-backoff policy applied to each batch.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
}

impl RetryPolicy {
    /// Create a policy allowing `max_attempts` total attempts with waits
    /// starting at `base_delay` and doubling per failed attempt.
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// The wait after failed attempt number `attempt` (1-based): the base
    /// delay doubled once per preceding failure, i.e. 1s, 2s, 4s, ...
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);

        self.base_delay * (1u32 << exponent)
    }

    /// Whether another attempt is allowed after failed attempt `attempt`.
    pub fn allows_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Whether `error` is worth retrying. Only transport failures are: an
    /// unparseable response or a rejected request will not improve by asking
    /// again.
    pub fn is_retryable(error: &Error) -> bool {
        matches!(
            error,
            Error::ServiceUnreachable(_) | Error::RateLimited(_)
        )
    }
}

/// What one batch contributed to the run.
struct BatchOutcome {
    results: Vec<CategorizationResult>,
    failed_ids: Vec<TransactionId>,
}

/// Orchestrates the pattern cache, the rule table, and the classifier to
/// categorize a list of transactions.
///
/// The pipeline owns its collaborators for the duration of a run; a single
/// instance must not be shared across concurrent `categorize` calls. The
/// cache is loaded once at construction (by the caller) and saved exactly
/// once per non-empty run.
pub struct CategorizationPipeline<C: Classifier> {
    classifier: C,
    rules: RuleTable,
    cache: PatternCache,
    config: PipelineConfig,
    retry: RetryPolicy,
}

impl<C: Classifier> CategorizationPipeline<C> {
    /// Create a pipeline from its collaborators.
    pub fn new(classifier: C, rules: RuleTable, cache: PatternCache, config: PipelineConfig) -> Self {
        let retry = RetryPolicy::new(config.max_attempts, config.retry_base_delay);

        Self {
            classifier,
            rules,
            cache,
            config,
            retry,
        }
    }

    /// The pattern cache owned by this pipeline.
    pub fn cache(&self) -> &PatternCache {
        &self.cache
    }

    /// Categorize `transactions` into budget categories.
    ///
    /// Results come from the pattern cache, the rule table, and the
    /// classifier, merged into one list sorted by transaction ID. An empty
    /// input returns an empty list immediately without touching the cache,
    /// the rules, or the classifier.
    ///
    /// # Errors
    /// This function will return an [Error::PartialCategorization] if one or
    /// more batches could not be classified after retries. The error carries
    /// every successfully categorized result alongside the failed transaction
    /// IDs, so the caller can decide whether to accept partial results.
    pub fn categorize(
        &mut self,
        transactions: &[TransactionInput],
    ) -> Result<Vec<CategorizationResult>, Error> {
        if transactions.is_empty() {
            return Ok(Vec::new());
        }

        let mut results = Vec::with_capacity(transactions.len());

        let remaining = self.apply_cache(transactions, &mut results);
        let unresolved = self.apply_rules(remaining, &mut results);

        let mut failed_ids = Vec::new();
        for batch in unresolved.chunks(self.config.batch_size.max(1)) {
            let outcome = self.categorize_batch(batch);
            results.extend(outcome.results);
            failed_ids.extend(outcome.failed_ids);
        }

        // The cache is flushed exactly once per run, after every batch has
        // been attempted, whether or not any of them failed.
        if let Err(error) = self.cache.save() {
            tracing::warn!("Could not save the pattern cache: {error}");
        }

        results.sort_by_key(|result| result.id);

        if failed_ids.is_empty() {
            Ok(results)
        } else {
            failed_ids.sort_unstable();
            Err(Error::PartialCategorization {
                results,
                failed_ids,
            })
        }
    }

    /// Resolve what the pattern cache already knows, returning the misses.
    fn apply_cache<'a>(
        &mut self,
        transactions: &'a [TransactionInput],
        results: &mut Vec<CategorizationResult>,
    ) -> Vec<&'a TransactionInput> {
        let mut misses = Vec::new();

        for transaction in transactions {
            match self.cache.get(&transaction.description) {
                Some(entry) => results.push(CategorizationResult {
                    id: transaction.id,
                    budget_type: entry.budget_type,
                    budget_subcategory: entry.budget_subcategory,
                    confidence: entry.confidence,
                }),
                None => misses.push(transaction),
            }
        }

        tracing::debug!(
            "Pattern cache resolved {} of {} transactions",
            transactions.len() - misses.len(),
            transactions.len()
        );

        misses
    }

    /// Resolve what the rule table covers, returning the transactions that
    /// need the classifier.
    ///
    /// The internal-transfer check runs before the pair lookup: a transfer
    /// between the user's own accounts is excluded no matter what the source
    /// taxonomy says.
    fn apply_rules<'a>(
        &self,
        transactions: Vec<&'a TransactionInput>,
        results: &mut Vec<CategorizationResult>,
    ) -> Vec<&'a TransactionInput> {
        let total = transactions.len();
        let mut unresolved = Vec::new();

        for transaction in transactions {
            if self.rules.is_internal_transfer(&transaction.description) {
                results.push(CategorizationResult {
                    id: transaction.id,
                    budget_type: BudgetType::Excluded,
                    budget_subcategory: Some("Internal Transfer".to_string()),
                    confidence: 1.0,
                });
            } else if let Some((budget_type, budget_subcategory)) = self
                .rules
                .lookup_deterministic(&transaction.source_category, &transaction.source_subcategory)
            {
                results.push(CategorizationResult {
                    id: transaction.id,
                    budget_type,
                    budget_subcategory: budget_subcategory.map(str::to_string),
                    confidence: 1.0,
                });
            } else {
                unresolved.push(transaction);
            }
        }

        tracing::debug!(
            "Rule table resolved {} of {} transactions",
            total - unresolved.len(),
            total
        );

        unresolved
    }

    /// Classify one batch, caching high-confidence results as they arrive.
    ///
    /// A batch that fails (retries exhausted, or an unparseable response)
    /// never aborts the run; its transaction IDs are recorded as failed and
    /// whatever records its response did cover are kept as recovered results.
    fn categorize_batch(&mut self, batch: &[&TransactionInput]) -> BatchOutcome {
        let summaries: Vec<TransactionSummary> =
            batch.iter().map(|&transaction| transaction.into()).collect();

        let parsed = match self.classify_with_retry(&summaries) {
            Ok(parsed) => parsed,
            Err(error) => {
                tracing::warn!(
                    "Batch of {} transactions failed permanently: {error}",
                    batch.len()
                );
                return BatchOutcome {
                    results: Vec::new(),
                    failed_ids: batch.iter().map(|transaction| transaction.id).collect(),
                };
            }
        };

        let by_id: HashMap<TransactionId, &TransactionInput> = batch
            .iter()
            .map(|&transaction| (transaction.id, transaction))
            .collect();
        let mut results = Vec::with_capacity(parsed.len());

        for record in parsed {
            let Some(transaction) = by_id.get(&record.id) else {
                tracing::warn!(
                    "Classifier returned a record for unknown transaction {}; ignoring it",
                    record.id
                );
                continue;
            };

            let result = CategorizationResult {
                id: record.id,
                budget_type: record.budget_type,
                budget_subcategory: record.budget_subcategory,
                confidence: record.confidence,
            };

            // High-confidence classifier answers become cache entries right
            // away; `put` ignores anything below the confidence threshold.
            self.cache.put(&transaction.description, &result);
            results.push(result);
        }

        let covered: HashSet<TransactionId> = results.iter().map(|result| result.id).collect();
        let failed_ids: Vec<TransactionId> = batch
            .iter()
            .map(|transaction| transaction.id)
            .filter(|id| !covered.contains(id))
            .collect();

        if !failed_ids.is_empty() {
            tracing::warn!(
                "Classifier response covered only {} of {} transactions in the batch",
                covered.len(),
                batch.len()
            );
        }

        BatchOutcome {
            results,
            failed_ids,
        }
    }

    /// Submit one batch under the retry policy and parse its response.
    ///
    /// Only transport failures are retried; an unparseable response fails the
    /// batch on the spot, keeping the raw text for diagnostics.
    fn classify_with_retry(
        &self,
        summaries: &[TransactionSummary],
    ) -> Result<Vec<ParsedClassification>, Error> {
        let mut attempt = 1;

        loop {
            let outcome = self
                .classifier
                .classify(summaries)
                .and_then(|text| parse_response(&text));

            match outcome {
                Ok(parsed) => return Ok(parsed),
                Err(error)
                    if RetryPolicy::is_retryable(&error) && self.retry.allows_retry(attempt) =>
                {
                    let delay = self.retry.delay_for_attempt(attempt);
                    tracing::warn!(
                        "Attempt {attempt} of {} failed ({error}), retrying in {delay:?}",
                        self.retry.max_attempts
                    );
                    sleep(delay);
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }
}
