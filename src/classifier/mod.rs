//! The boundary with the generative classification service.
//!
//! This module defines the contract the pipeline expects from the service:
//! the request shape ([TransactionSummary] batches plus a fixed instruction
//! payload), the reply shape (a JSON array of per-transaction records,
//! possibly wrapped in prose or code fences), and the failure kinds the
//! pipeline must distinguish. The service itself lives behind the
//! [Classifier] trait; [http::HttpClassifier] is the concrete transport.

pub mod http;

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::Date;

use crate::{
    Error,
    models::{BudgetType, TransactionId, TransactionInput},
};

/// The fixed instruction payload sent with every classification request.
pub const SYSTEM_PROMPT: &str = "\
You are a personal budgeting assistant that classifies bank transactions.

For each transaction you are given, assign:
- \"budget_type\": one of \"income\", \"core\", \"choice\", \"compound\" or \"excluded\".
  income: money coming in, e.g. salary, interest, refunds.
  core: essential spending, e.g. housing, utilities, groceries, transport, insurance, health.
  choice: discretionary spending, e.g. eating out, entertainment, hobbies, shopping.
  compound: transfers into savings or investments that grow over time.
  excluded: transfers between the user's own accounts and anything else that should not count towards the budget.
- \"budget_subcategory\": a short subcategory such as \"Groceries\" or \"Streaming\", or null if unsure.
- \"confidence\": your certainty from 0.0 to 1.0.

Reply with only a JSON array of objects of the form
{\"id\": <transaction id>, \"budget_type\": \"...\", \"budget_subcategory\": \"...\", \"confidence\": 0.0}
containing exactly one object per input transaction, in any order.
Do not include any other text.";

/// The per-transaction fields included in a classification request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionSummary {
    /// The ID of the transaction, echoed back by the service.
    pub id: TransactionId,
    /// When the transaction happened.
    pub date: Date,
    /// The bank's description of the transaction.
    pub description: String,
    /// The amount of money moved, negative for debits.
    pub amount: f64,
    /// The category assigned by the bank export.
    pub source_category: String,
    /// The subcategory assigned by the bank export.
    pub source_subcategory: String,
}

impl From<&TransactionInput> for TransactionSummary {
    fn from(transaction: &TransactionInput) -> Self {
        Self {
            id: transaction.id,
            date: transaction.date,
            description: transaction.description.clone(),
            amount: transaction.amount,
            source_category: transaction.source_category.clone(),
            source_subcategory: transaction.source_subcategory.clone(),
        }
    }
}

/// A service that classifies batches of transactions into budget categories.
///
/// Implementations return the raw response text; the pipeline parses it with
/// [parse_response].
///
/// # Errors
/// `classify` must map its failures onto the three transport failure kinds:
/// [Error::ServiceUnreachable] and [Error::RateLimited] (retried by the
/// pipeline), and [Error::ClassifierRequest] (not retried).
pub trait Classifier {
    /// Submit one batch of transactions and return the raw response text.
    fn classify(&self, batch: &[TransactionSummary]) -> Result<String, Error>;
}

/// Build the user prompt for one batch: the batch as a JSON array.
///
/// # Errors
/// This function will return an [Error::Serialization] if the batch cannot
/// be serialized, e.g. a non-finite amount.
pub fn build_user_prompt(batch: &[TransactionSummary]) -> Result<String, Error> {
    let transactions = serde_json::to_string_pretty(batch)
        .map_err(|error| Error::Serialization(error.to_string()))?;

    Ok(format!("Classify these transactions:\n{transactions}"))
}

/// One per-transaction record parsed out of a classification response.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedClassification {
    /// The ID of the transaction the record refers to.
    pub id: TransactionId,
    /// The budget type the service assigned.
    pub budget_type: BudgetType,
    /// The subcategory the service assigned, if any.
    pub budget_subcategory: Option<String>,
    /// The service's certainty, clamped into `[0.0, 1.0]`. Defaults to 1.0
    /// when the response omits the field.
    pub confidence: f64,
}

/// The wire shape of one record in a classification response.
#[derive(Debug, Deserialize)]
struct RawClassification {
    id: TransactionId,
    budget_type: String,
    #[serde(default)]
    budget_subcategory: Option<String>,
    #[serde(default)]
    confidence: Option<f64>,
}

/// Parse a classification response into per-transaction records.
///
/// The service is instructed to reply with bare JSON, but in practice the
/// payload sometimes arrives wrapped in explanatory prose or code-fence
/// markers. Such wrapping is stripped before structural parsing.
///
/// # Errors
/// This function will return an [Error::UnparseableResponse], carrying the
/// full response text for diagnostics, if no JSON array can be located or the
/// array does not decode into the expected record shape.
pub fn parse_response(text: &str) -> Result<Vec<ParsedClassification>, Error> {
    let unparseable = |reason: String| Error::UnparseableResponse {
        reason,
        response_text: text.to_string(),
    };

    let payload = extract_json_array(text)
        .ok_or_else(|| unparseable("no JSON array found in response".to_string()))?;

    let records: Vec<RawClassification> =
        serde_json::from_str(payload).map_err(|error| unparseable(error.to_string()))?;

    records
        .into_iter()
        .map(|record| {
            let budget_type = BudgetType::from_str(&record.budget_type).map_err(|_| {
                unparseable(format!(
                    "unknown budget type \"{}\" for transaction {}",
                    record.budget_type, record.id
                ))
            })?;

            Ok(ParsedClassification {
                id: record.id,
                budget_type,
                budget_subcategory: record.budget_subcategory,
                confidence: record.confidence.unwrap_or(1.0).clamp(0.0, 1.0),
            })
        })
        .collect()
}

/// Locate the JSON array inside a possibly prose- or fence-wrapped response.
fn extract_json_array(text: &str) -> Option<&str> {
    slice_json_array(strip_code_fences(text)).or_else(|| slice_json_array(text))
}

/// The substring from the first `[` to the last `]`, if both are present.
fn slice_json_array(text: &str) -> Option<&str> {
    let start = text.find('[')?;
    let end = text.rfind(']')?;

    (start < end).then(|| &text[start..=end])
}

/// Return the content between the first pair of ``` fence markers, or the
/// whole text when there is no fence.
fn strip_code_fences(text: &str) -> &str {
    let Some(open) = text.find("```") else {
        return text;
    };

    // Skip the fence marker and its language tag, e.g. "```json".
    let after_open = &text[open + 3..];
    let body_start = after_open.find('\n').map_or(0, |index| index + 1);
    let body = &after_open[body_start..];

    match body.find("```") {
        Some(close) => &body[..close],
        None => body,
    }
}

#[cfg(test)]
mod parse_response_tests {
    use crate::{
        Error,
        classifier::{ParsedClassification, parse_response},
        models::BudgetType,
    };

    #[test]
    fn parses_bare_json_array() {
        let text = r#"[
            {"id": 1, "budget_type": "core", "budget_subcategory": "Groceries", "confidence": 0.98},
            {"id": 2, "budget_type": "choice", "budget_subcategory": null, "confidence": 0.6}
        ]"#;

        let records = parse_response(text).expect("Could not parse response");

        assert_eq!(
            records,
            vec![
                ParsedClassification {
                    id: 1,
                    budget_type: BudgetType::Core,
                    budget_subcategory: Some("Groceries".to_string()),
                    confidence: 0.98,
                },
                ParsedClassification {
                    id: 2,
                    budget_type: BudgetType::Choice,
                    budget_subcategory: None,
                    confidence: 0.6,
                },
            ]
        );
    }

    #[test]
    fn strips_code_fence_wrapping() {
        let text = "```json\n[{\"id\": 7, \"budget_type\": \"income\"}]\n```";

        let records = parse_response(text).expect("Could not parse response");

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, 7);
        assert_eq!(records[0].budget_type, BudgetType::Income);
    }

    #[test]
    fn strips_surrounding_prose() {
        let text = "Here are the classifications you asked for:\n\
            [{\"id\": 3, \"budget_type\": \"excluded\", \"confidence\": 1.0}]\n\
            Let me know if you need anything else!";

        let records = parse_response(text).expect("Could not parse response");

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].budget_type, BudgetType::Excluded);
    }

    #[test]
    fn missing_confidence_defaults_to_one() {
        let text = r#"[{"id": 1, "budget_type": "core"}]"#;

        let records = parse_response(text).expect("Could not parse response");

        assert_eq!(records[0].confidence, 1.0);
        assert_eq!(records[0].budget_subcategory, None);
    }

    #[test]
    fn out_of_range_confidence_is_clamped() {
        let text = r#"[
            {"id": 1, "budget_type": "core", "confidence": 1.7},
            {"id": 2, "budget_type": "core", "confidence": -0.3}
        ]"#;

        let records = parse_response(text).expect("Could not parse response");

        assert_eq!(records[0].confidence, 1.0);
        assert_eq!(records[1].confidence, 0.0);
    }

    #[test]
    fn response_without_array_is_unparseable() {
        let result = parse_response("I could not classify these transactions.");

        match result {
            Err(Error::UnparseableResponse { response_text, .. }) => {
                assert_eq!(response_text, "I could not classify these transactions.");
            }
            other => panic!("Expected UnparseableResponse, got {other:?}"),
        }
    }

    #[test]
    fn malformed_array_is_unparseable() {
        let result = parse_response(r#"[{"id": "not a number", "budget_type": "core"}]"#);

        assert!(matches!(result, Err(Error::UnparseableResponse { .. })));
    }

    #[test]
    fn unknown_budget_type_is_unparseable() {
        let result = parse_response(r#"[{"id": 1, "budget_type": "luxury"}]"#);

        match result {
            Err(Error::UnparseableResponse { reason, .. }) => {
                assert!(reason.contains("luxury"), "got reason {reason}");
            }
            other => panic!("Expected UnparseableResponse, got {other:?}"),
        }
    }
}
