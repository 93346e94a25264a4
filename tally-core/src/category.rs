//! Spending categories assigned by the classifier

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Closed set of spending categories, plus the `unknown` fallback.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Category {
    #[serde(rename = "food and dining")]
    FoodAndDining,
    #[serde(rename = "transportation")]
    Transportation,
    #[serde(rename = "housing")]
    Housing,
    #[serde(rename = "entertainment")]
    Entertainment,
    #[serde(rename = "shopping")]
    Shopping,
    #[serde(rename = "healthcare")]
    Healthcare,
    #[serde(rename = "education and training")]
    EducationAndTraining,
    #[serde(rename = "communication")]
    Communication,
    #[serde(rename = "finance and investment")]
    FinanceAndInvestment,
    #[serde(rename = "transfer accounts")]
    TransferAccounts,
    #[serde(rename = "unknown")]
    Unknown,
}

impl Category {
    /// Every assignable label, in matching priority order. `Unknown` is not part of it.
    pub const LABELS: [Category; 10] = [
        Category::FoodAndDining,
        Category::Transportation,
        Category::Housing,
        Category::Entertainment,
        Category::Shopping,
        Category::Healthcare,
        Category::EducationAndTraining,
        Category::Communication,
        Category::FinanceAndInvestment,
        Category::TransferAccounts,
    ];

    /// Label as stored in the record's type field
    pub fn label(&self) -> &'static str {
        match self {
            Category::FoodAndDining => "food and dining",
            Category::Transportation => "transportation",
            Category::Housing => "housing",
            Category::Entertainment => "entertainment",
            Category::Shopping => "shopping",
            Category::Healthcare => "healthcare",
            Category::EducationAndTraining => "education and training",
            Category::Communication => "communication",
            Category::FinanceAndInvestment => "finance and investment",
            Category::TransferAccounts => "transfer accounts",
            Category::Unknown => "unknown",
        }
    }

    /// Map a free-text classifier answer onto the label set.
    ///
    /// Lower-cases, replaces non-letters with spaces, collapses whitespace, then
    /// takes the first label contained in what is left.
    pub fn normalize(raw: &str) -> Category {
        let letters: String = raw
            .to_lowercase()
            .chars()
            .map(|c| if c.is_ascii_lowercase() { c } else { ' ' })
            .collect();
        let cleaned = letters.split_whitespace().collect::<Vec<_>>().join(" ");

        Category::LABELS
            .into_iter()
            .find(|c| cleaned.contains(c.label()))
            .unwrap_or(Category::Unknown)
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Category::Unknown)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Category {
    type Err = String;

    /// Strict parse of an exact label (case-insensitive), for user input.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Category::LABELS
            .into_iter()
            .chain([Category::Unknown])
            .find(|c| c.label() == wanted)
            .ok_or_else(|| format!("unknown category: {s}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_exact_label() {
        assert_eq!(Category::normalize("shopping"), Category::Shopping);
    }

    #[test]
    fn test_normalize_noisy_answer() {
        assert_eq!(
            Category::normalize("Category: **Food & Dining**."),
            Category::Unknown,
            "ampersand is not the word 'and'"
        );
        assert_eq!(
            Category::normalize("  Food-and-Dining!\n"),
            Category::FoodAndDining
        );
        assert_eq!(
            Category::normalize("I think it is TRANSFER   ACCOUNTS"),
            Category::TransferAccounts
        );
    }

    #[test]
    fn test_normalize_unmatched_is_unknown() {
        assert_eq!(Category::normalize("groceries"), Category::Unknown);
        assert_eq!(Category::normalize(""), Category::Unknown);
    }

    #[test]
    fn test_normalize_first_label_wins() {
        // both "housing" and "shopping" appear; label order decides
        assert_eq!(
            Category::normalize("shopping or housing"),
            Category::Housing
        );
    }

    #[test]
    fn test_from_str_round_trips_labels() {
        for c in Category::LABELS {
            assert_eq!(c.label().parse::<Category>().unwrap(), c);
        }
        assert_eq!("Unknown".parse::<Category>().unwrap(), Category::Unknown);
        assert!("groceries".parse::<Category>().is_err());
    }
}
