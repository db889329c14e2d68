//! The canonical category vocabulary and the one shared normalizer.
//!
//! Every part of the app that buckets transactions by category (ingestion,
//! budgets, alerts, the financial summary) must go through
//! [normalize_category]. Keeping a single normalizer is what guarantees that
//! a budget named "Transport" matches the spending the summary reports for
//! "Transport".

/// The label used when no category could be derived.
pub const UNCATEGORIZED: &str = "Uncategorized";

/// The label used when a transaction matched no keyword rule.
pub const OTHER: &str = "Other";

/// Classifier output sometimes arrives wrapped in a label, e.g.
/// "Category: Food". These prefixes are stripped case-insensitively.
const LABEL_PREFIXES: [&str; 10] = [
    "spending category:",
    "expense category:",
    "transaction category:",
    "the category is:",
    "category is:",
    "classified as:",
    "categorized as:",
    "category:",
    "this is:",
    "type:",
];

// "cat:" is kept separate because it must only be stripped from the very
// start of the label, never from words like "catering".
const SHORT_PREFIX: &str = "cat:";

/// Synonym clusters mapped onto the canonical vocabulary.
const SYNONYMS: [(&str, &str); 21] = [
    ("food", "Food"),
    ("food & dining", "Food"),
    ("food and dining", "Food"),
    ("dining", "Food"),
    ("restaurant", "Food"),
    ("groceries", "Food"),
    ("grocery", "Food"),
    ("entertainment", "Entertainment"),
    ("bills", "Bills"),
    ("utilities", "Bills"),
    ("insurance", "Bills"),
    ("salary", "Salary"),
    ("income", "Salary"),
    ("wages", "Salary"),
    ("payroll", "Salary"),
    ("health", "Health"),
    ("healthcare", "Health"),
    ("medical", "Health"),
    ("shopping", "Shopping"),
    ("retail", "Shopping"),
    ("other", "Other"),
];

/// Map an arbitrary free-text category label onto the canonical vocabulary.
///
/// The function strips classifier artifacts (leading "Category:"-style
/// prefixes, quotes, trailing periods), folds known synonym clusters onto one
/// canonical label, and otherwise returns the cleaned input capitalized.
/// Empty input yields [UNCATEGORIZED].
///
/// This is a pure function and it is idempotent:
/// `normalize_category(normalize_category(x)) == normalize_category(x)`.
pub fn normalize_category(raw: &str) -> String {
    let mut label = raw.trim().to_owned();

    loop {
        let lowered = label.to_lowercase();
        let stripped = LABEL_PREFIXES
            .iter()
            .find(|prefix| lowered.starts_with(**prefix))
            .map(|prefix| label[prefix.len()..].to_owned())
            .or_else(|| {
                lowered
                    .starts_with(SHORT_PREFIX)
                    .then(|| label[SHORT_PREFIX.len()..].to_owned())
            });

        match stripped {
            Some(rest) => label = rest.trim().to_owned(),
            None => break,
        }
    }

    let label = label
        .replace(['\'', '"'], "")
        .trim_end_matches('.')
        .trim()
        .to_owned();

    if label.is_empty() {
        return UNCATEGORIZED.to_owned();
    }

    let lowered = label.to_lowercase();

    // Transport shows up as "transport", "transportation", "travel", and
    // assorted phrases containing them, so it gets a substring match rather
    // than an exact synonym entry.
    if lowered.contains("transport") || lowered.contains("travel") {
        return "Transport".to_owned();
    }

    if lowered.contains("unknown") || lowered.contains("uncategorized") {
        return UNCATEGORIZED.to_owned();
    }

    if let Some((_, canonical)) = SYNONYMS.iter().find(|(synonym, _)| *synonym == lowered) {
        return (*canonical).to_owned();
    }

    capitalize(&lowered)
}

fn capitalize(label: &str) -> String {
    let mut chars = label.chars();

    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => UNCATEGORIZED.to_owned(),
    }
}

/// Keyword rules for expense descriptions, checked in order.
const EXPENSE_KEYWORDS: [(&str, &str); 7] = [
    (
        "grocery|groceries|supermarket|restaurant|cafe|bakery|takeaway",
        "Food",
    ),
    (
        "fuel|petrol|gas station|shell|bp |uber|taxi|parking|bus |train|transport",
        "Transport",
    ),
    ("rent|mortgage|electricity|power|water|internet|phone bill", "Bills"),
    ("insurance", "Bills"),
    ("pharmacy|doctor|dentist|hospital|clinic|medical", "Health"),
    ("amazon|clothing|warehouse|store|shopping", "Shopping"),
    ("cinema|netflix|spotify|steam|concert|entertainment", "Entertainment"),
];

/// Keyword rules for income descriptions.
const INCOME_KEYWORDS: &str = "salary|payroll|wages|wage payment|bonus";

/// Derive a category from a transaction description without the classifier.
///
/// This is the deterministic fallback used when the external classifier
/// fails or times out. Income heuristics run only for positive amounts,
/// expense heuristics only for negative amounts; anything unmatched is
/// [OTHER]. Refunds, reimbursements, and interest are income but not
/// salary; they land in the default bucket.
pub fn categorize_by_keywords(description: &str, amount: f64) -> &'static str {
    let description = description.to_lowercase();

    if amount > 0.0 {
        if matches_any(&description, INCOME_KEYWORDS) {
            return "Salary";
        }

        return OTHER;
    }

    expense_category(&description).unwrap_or(OTHER)
}

/// Derive a category from a description alone, when the amount is unknown.
///
/// Income keywords are checked first; merchants rarely contain them, so
/// false positives on debits are unlikely.
pub fn categorize_description(description: &str) -> &'static str {
    let description = description.to_lowercase();

    if matches_any(&description, INCOME_KEYWORDS) {
        return "Salary";
    }

    expense_category(&description).unwrap_or(OTHER)
}

fn expense_category(description: &str) -> Option<&'static str> {
    EXPENSE_KEYWORDS
        .iter()
        .find(|(keywords, _)| matches_any(description, keywords))
        .map(|(_, category)| *category)
}

fn matches_any(description: &str, keywords: &str) -> bool {
    keywords
        .split('|')
        .any(|keyword| description.contains(keyword))
}

#[cfg(test)]
mod normalize_category_tests {
    use super::{UNCATEGORIZED, normalize_category};

    #[test]
    fn strips_classifier_prefixes() {
        assert_eq!(normalize_category("Category: Food"), "Food");
        assert_eq!(normalize_category("type: Bills"), "Bills");
        assert_eq!(normalize_category("cat: Shopping"), "Shopping");
        assert_eq!(normalize_category("Spending Category: Health"), "Health");
        assert_eq!(normalize_category("classified as: Entertainment"), "Entertainment");
    }

    #[test]
    fn strips_quotes_and_trailing_periods() {
        assert_eq!(normalize_category("\"Food\"."), "Food");
        assert_eq!(normalize_category("'Bills'"), "Bills");
        assert_eq!(normalize_category("  Health.  "), "Health");
    }

    #[test]
    fn transport_synonyms_all_map_to_transport() {
        for label in [
            "transport",
            "Transportation",
            "Travel",
            "Public Transport",
            "travel expenses",
        ] {
            assert_eq!(normalize_category(label), "Transport", "input: {label}");
        }
    }

    #[test]
    fn synonym_clusters_collapse() {
        assert_eq!(normalize_category("groceries"), "Food");
        assert_eq!(normalize_category("Dining"), "Food");
        assert_eq!(normalize_category("utilities"), "Bills");
        assert_eq!(normalize_category("wages"), "Salary");
        assert_eq!(normalize_category("medical"), "Health");
        assert_eq!(normalize_category("retail"), "Shopping");
    }

    #[test]
    fn empty_input_is_uncategorized() {
        assert_eq!(normalize_category(""), UNCATEGORIZED);
        assert_eq!(normalize_category("   "), UNCATEGORIZED);
        assert_eq!(normalize_category("\"\"."), UNCATEGORIZED);
    }

    #[test]
    fn unrecognized_labels_are_capitalized() {
        assert_eq!(normalize_category("subscriptions"), "Subscriptions");
        assert_eq!(normalize_category("PET SUPPLIES"), "Pet supplies");
    }

    #[test]
    fn normalization_is_idempotent() {
        for label in [
            "Category: Food",
            "travel",
            "  'Bills'. ",
            "pet supplies",
            "",
            "Uncategorized",
            "cat: cat: Shopping",
        ] {
            let once = normalize_category(label);
            let twice = normalize_category(&once);

            assert_eq!(once, twice, "input: {label:?}");
        }
    }
}
