//! Normalizes transaction descriptions into stable cache keys.
//!
//! Bank descriptions for the same merchant differ in incidental detail, e.g.
//! `"NETFLIX.COM 12/05"` and `"netflix.com 12/06"`. Stripping the variable
//! parts lets the pattern cache recognise repeat merchants across statements.

use regex::Regex;

use crate::Error;

/// The variable substrings stripped from descriptions by default: date-like
/// tokens (`12/05`, `2025-01-31`), time-like tokens (`19:47`), reference
/// tokens (`REF: 8A3B99`, `#4411923`), and long digit runs.
const DEFAULT_STRIP_PATTERNS: [&str; 6] = [
    r"\b\d{1,2}/\d{1,2}(?:/\d{2,4})?\b",
    r"\b\d{4}-\d{2}-\d{2}\b",
    r"\b\d{1,2}:\d{2}\b",
    r"\bref[:#]\s*[a-z0-9]+\b",
    r"#[a-z0-9]+\b",
    r"\b\d{6,}\b",
];

/// Turns free-text transaction descriptions into canonical cache keys.
///
/// Normalization lowercases, trims, collapses internal whitespace runs to a
/// single space, and removes every match of the configured strip patterns.
/// The function is idempotent: normalizing an already-normalized string
/// returns it unchanged.
#[derive(Debug)]
pub struct KeyNormalizer {
    strip_patterns: Vec<Regex>,
}

impl KeyNormalizer {
    /// Create a normalizer with a custom set of strip patterns.
    ///
    /// Patterns are matched against the lowercased description, so they
    /// should be written in lowercase.
    ///
    /// # Errors
    /// This function will return an [Error::InvalidPattern] if any pattern is
    /// not a valid regular expression.
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self, Error> {
        let strip_patterns = patterns
            .iter()
            .map(|pattern| {
                Regex::new(pattern.as_ref())
                    .map_err(|error| Error::InvalidPattern(error.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { strip_patterns })
    }

    /// Normalize `description` into a cache key.
    pub fn normalize(&self, description: &str) -> String {
        let mut key = description.to_lowercase();

        for pattern in &self.strip_patterns {
            key = pattern.replace_all(&key, " ").into_owned();
        }

        key.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

impl Default for KeyNormalizer {
    fn default() -> Self {
        Self::new(&DEFAULT_STRIP_PATTERNS).expect("The builtin strip patterns must compile")
    }
}

#[cfg(test)]
mod key_normalizer_tests {
    use crate::normalize::KeyNormalizer;

    #[test]
    fn lowercases_trims_and_collapses_whitespace() {
        let normalizer = KeyNormalizer::default();

        let key = normalizer.normalize("  COUNTDOWN   Auckland  ");

        assert_eq!(key, "countdown auckland");
    }

    #[test]
    fn strips_date_like_tokens() {
        let normalizer = KeyNormalizer::default();

        assert_eq!(normalizer.normalize("NETFLIX.COM 12/05"), "netflix.com");
        assert_eq!(
            normalizer.normalize("SPOTIFY P2AB3C 01/02/2025"),
            "spotify p2ab3c"
        );
        assert_eq!(normalizer.normalize("PAYPAL 2025-01-31"), "paypal");
    }

    #[test]
    fn strips_time_like_tokens() {
        let normalizer = KeyNormalizer::default();

        let key = normalizer.normalize("POS W/D LOBSTER SEAFOO-19:47");

        assert!(!key.contains("19:47"), "got {key}");
    }

    #[test]
    fn strips_reference_like_tokens() {
        let normalizer = KeyNormalizer::default();

        assert_eq!(
            normalizer.normalize("Power Co REF: 8A3B99 payment"),
            "power co payment"
        );
        assert_eq!(normalizer.normalize("UBER *EATS #4411923"), "uber *eats");
    }

    #[test]
    fn keeps_words_that_merely_start_with_ref() {
        let normalizer = KeyNormalizer::default();

        assert_eq!(normalizer.normalize("REFUND ACME STORE"), "refund acme store");
    }

    #[test]
    fn is_idempotent() {
        let normalizer = KeyNormalizer::default();
        let descriptions = [
            "NETFLIX.COM 12/05",
            "  COUNTDOWN   Auckland  ",
            "Power Co REF: 8A3B99 payment",
            "UBER *EATS #4411923",
            "plain merchant",
            "",
        ];

        for description in descriptions {
            let once = normalizer.normalize(description);
            let twice = normalizer.normalize(&once);

            assert_eq!(once, twice, "not idempotent for {description:?}");
        }
    }

    #[test]
    fn custom_patterns_replace_the_defaults() {
        let normalizer = KeyNormalizer::new(&[r"\bbranch \d+\b"]).unwrap();

        let key = normalizer.normalize("ACME Branch 42 12/05");

        // The default date pattern is gone, so the date survives.
        assert_eq!(key, "acme 12/05");
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        let result = KeyNormalizer::new(&["(unclosed"]);

        assert!(result.is_err());
    }
}
