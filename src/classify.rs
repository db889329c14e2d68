//! The seam for the external transaction classifier.
//!
//! The real collaborator is a chat-completion style service that maps a
//! transaction description to a short category label. It may fail or time
//! out; callers must fall back to [crate::category::categorize_by_keywords].

use async_trait::async_trait;

/// Errors reported by a [Categorizer].
#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    /// The classifier could not be reached or returned an unusable response.
    #[error("classifier unavailable: {0}")]
    Unavailable(String),
}

/// Maps a transaction description to a free-text category label.
#[async_trait]
pub trait Categorizer: Send + Sync {
    /// Return a short category label for `description`.
    ///
    /// The label may contain classifier artifacts ("Category: Food"); callers
    /// are expected to pass it through
    /// [crate::category::normalize_category].
    async fn categorize(&self, description: &str) -> Result<String, ClassifyError>;
}

/// A categorizer that answers from the deterministic keyword table.
///
/// Used by the server binary when no remote classifier is configured, and as
/// a stand-in during tests.
pub struct KeywordCategorizer;

#[async_trait]
impl Categorizer for KeywordCategorizer {
    async fn categorize(&self, description: &str) -> Result<String, ClassifyError> {
        Ok(crate::category::categorize_description(description).to_owned())
    }
}
