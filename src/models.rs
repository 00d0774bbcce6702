//! Defines the core data models for the categorization pipeline.

use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};
use time::Date;

use crate::Error;

/// Uniquely identifies a transaction within one pipeline run.
pub type TransactionId = i64;

/// The five top-level budget classifications a transaction can receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
#[serde(rename_all = "lowercase")]
pub enum BudgetType {
    /// Money coming in, e.g. salary, interest, refunds.
    Income,
    /// Essential spending, e.g. rent, utilities, groceries.
    Core,
    /// Discretionary spending, e.g. eating out, streaming, hobbies.
    Choice,
    /// Transfers into savings or investments that grow over time.
    Compound,
    /// Transactions that should not count towards the budget at all, e.g.
    /// transfers between the user's own accounts.
    Excluded,
}

impl BudgetType {
    /// The lowercase name used in serialized payloads and prompts.
    pub fn as_str(&self) -> &'static str {
        match self {
            BudgetType::Income => "income",
            BudgetType::Core => "core",
            BudgetType::Choice => "choice",
            BudgetType::Compound => "compound",
            BudgetType::Excluded => "excluded",
        }
    }
}

impl Display for BudgetType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for BudgetType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "income" => Ok(BudgetType::Income),
            "core" => Ok(BudgetType::Core),
            "choice" => Ok(BudgetType::Choice),
            "compound" => Ok(BudgetType::Compound),
            "excluded" => Ok(BudgetType::Excluded),
            _ => Err(Error::UnknownBudgetType(s.to_string())),
        }
    }
}

/// A bank transaction awaiting categorization.
///
/// Instances are produced by the upstream import step (outside this crate)
/// and are never mutated by the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionInput {
    /// The ID of the transaction, unique within one pipeline run.
    pub id: TransactionId,

    /// When the transaction happened.
    pub date: Date,

    /// The bank's free-text description of the transaction, e.g.
    /// `"NETFLIX.COM 12/05"` or `"POS W/D LOBSTER SEAFOO-19:47"`.
    pub description: String,

    /// The amount of money moved. Positive values are credits, negative
    /// values are debits.
    pub amount: f64,

    /// The category assigned by the bank export, e.g. `"Food"`.
    pub source_category: String,

    /// The subcategory assigned by the bank export, e.g. `"Groceries"`.
    pub source_subcategory: String,
}

/// The categorization assigned to a single transaction.
///
/// Produced by the pattern cache (confidence inherited from the stored
/// entry), the rule table (confidence fixed at 1.0), or the classifier
/// (confidence as reported, defaulting to 1.0 when absent).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorizationResult {
    /// The ID of the transaction this result belongs to.
    pub id: TransactionId,

    /// The budget type assigned to the transaction.
    pub budget_type: BudgetType,

    /// A free-text subcategory, e.g. `"Groceries"`, if one was assigned.
    pub budget_subcategory: Option<String>,

    /// How certain the source of this result was, from 0.0 to 1.0 inclusive.
    pub confidence: f64,
}
