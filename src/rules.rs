//! Defines the deterministic rule table that maps the bank export's own
//! category pairs to budget types, and the internal-transfer detector.
//!
//! Rules are the cheap middle layer of the pipeline: anything they resolve
//! never reaches the classifier.

use std::collections::HashMap;

use crate::models::BudgetType;

/// The source taxonomy pairs with a known, fixed budget categorization.
///
/// Pairs not listed here fall through to the classifier.
const DETERMINISTIC_RULES: &[(&str, &str, BudgetType, Option<&str>)] = &[
    ("income", "salary", BudgetType::Income, Some("Salary")),
    ("income", "wages", BudgetType::Income, Some("Wages")),
    ("income", "interest", BudgetType::Income, Some("Interest")),
    ("income", "refund", BudgetType::Income, Some("Refund")),
    ("housing", "rent", BudgetType::Core, Some("Rent")),
    ("housing", "mortgage", BudgetType::Core, Some("Mortgage")),
    ("bills", "utilities", BudgetType::Core, Some("Utilities")),
    ("bills", "insurance", BudgetType::Core, Some("Insurance")),
    ("bills", "phone & internet", BudgetType::Core, Some("Phone & Internet")),
    ("food", "groceries", BudgetType::Core, Some("Groceries")),
    ("food", "restaurants", BudgetType::Choice, Some("Eating Out")),
    ("food", "takeaway", BudgetType::Choice, Some("Takeaway")),
    ("transport", "public transport", BudgetType::Core, Some("Public Transport")),
    ("transport", "fuel", BudgetType::Core, Some("Fuel")),
    ("health", "pharmacy", BudgetType::Core, Some("Health")),
    ("health", "doctor", BudgetType::Core, Some("Health")),
    ("entertainment", "streaming", BudgetType::Choice, Some("Streaming")),
    ("entertainment", "events", BudgetType::Choice, Some("Events")),
    ("shopping", "clothing", BudgetType::Choice, Some("Clothing")),
    ("savings", "investments", BudgetType::Compound, Some("Investments")),
    ("savings", "term deposit", BudgetType::Compound, Some("Term Deposit")),
    ("transfers", "savings", BudgetType::Compound, Some("Savings")),
    ("transfers", "internal", BudgetType::Excluded, Some("Internal Transfer")),
    ("transfers", "credit card payment", BudgetType::Excluded, Some("Credit Card Payment")),
];

/// Keywords that mark a transaction as a transfer between the user's own
/// accounts, matched case-insensitively anywhere in the description.
const INTERNAL_TRANSFER_KEYWORDS: &[&str] = &[
    "internal transfer",
    "transfer between accounts",
    "own account transfer",
    "transfer to savings",
    "transfer from savings",
];

/// A static mapping from the bank export's (category, subcategory) pairs to
/// budget categorizations, plus a keyword-based internal-transfer detector.
///
/// The table holds no state and performs no I/O, so it is safe to share
/// between any number of callers.
#[derive(Debug)]
pub struct RuleTable {
    rules: HashMap<(String, String), (BudgetType, Option<&'static str>)>,
}

impl RuleTable {
    /// Create a rule table holding the builtin rules.
    pub fn new() -> Self {
        let rules = DETERMINISTIC_RULES
            .iter()
            .map(|&(category, subcategory, budget_type, budget_subcategory)| {
                (
                    (category.to_string(), subcategory.to_string()),
                    (budget_type, budget_subcategory),
                )
            })
            .collect();

        Self { rules }
    }

    /// Look up the budget categorization for a source taxonomy pair.
    ///
    /// The lookup is an exact pair match, ignoring case. Unknown pairs return
    /// `None` so the caller can fall through to the classifier.
    pub fn lookup_deterministic(
        &self,
        source_category: &str,
        source_subcategory: &str,
    ) -> Option<(BudgetType, Option<&'static str>)> {
        let key = (
            source_category.trim().to_lowercase(),
            source_subcategory.trim().to_lowercase(),
        );

        self.rules.get(&key).copied()
    }

    /// Whether `description` marks a transfer between the user's own
    /// accounts.
    ///
    /// A match overrides any category lookup and forces
    /// [BudgetType::Excluded], since money moving between the user's own
    /// accounts is neither income nor spending.
    pub fn is_internal_transfer(&self, description: &str) -> bool {
        let description = description.to_lowercase();

        INTERNAL_TRANSFER_KEYWORDS
            .iter()
            .any(|keyword| description.contains(keyword))
    }
}

impl Default for RuleTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod rule_table_tests {
    use crate::{models::BudgetType, rules::RuleTable};

    #[test]
    fn lookup_matches_known_pair() {
        let rules = RuleTable::new();

        let result = rules.lookup_deterministic("Food", "Groceries");

        assert_eq!(result, Some((BudgetType::Core, Some("Groceries"))));
    }

    #[test]
    fn lookup_ignores_case_and_surrounding_whitespace() {
        let rules = RuleTable::new();

        let result = rules.lookup_deterministic(" TRANSFERS ", "Internal");

        assert_eq!(
            result,
            Some((BudgetType::Excluded, Some("Internal Transfer")))
        );
    }

    #[test]
    fn lookup_returns_none_for_unknown_pair() {
        let rules = RuleTable::new();

        assert_eq!(rules.lookup_deterministic("Pets", "Grooming"), None);
        assert_eq!(rules.lookup_deterministic("", ""), None);
    }

    #[test]
    fn lookup_requires_both_parts_to_match() {
        let rules = RuleTable::new();

        // The category exists, but not with this subcategory.
        assert_eq!(rules.lookup_deterministic("Food", "Wine"), None);
    }

    #[test]
    fn internal_transfer_matches_keywords_case_insensitively() {
        let rules = RuleTable::new();

        assert!(rules.is_internal_transfer("INTERNAL TRANSFER - 01"));
        assert!(rules.is_internal_transfer("Weekly transfer to savings"));
        assert!(rules.is_internal_transfer("abc Own Account Transfer xyz"));
    }

    #[test]
    fn internal_transfer_does_not_match_ordinary_descriptions() {
        let rules = RuleTable::new();

        assert!(!rules.is_internal_transfer("COUNTDOWN AUCKLAND"));
        assert!(!rules.is_internal_transfer("wire transfer fee"));
        assert!(!rules.is_internal_transfer(""));
    }
}
