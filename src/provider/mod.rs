//! The seam for the external bank-data aggregator.
//!
//! The aggregator issues access tokens, creates requisitions (consent
//! sessions) that the user completes in their browser, and exposes account
//! and transaction listings. Only the contract is modeled here; a concrete
//! HTTP client lives outside this crate.

mod sandbox;
mod token;

pub use sandbox::SandboxBankClient;
pub use token::{AccessToken, TokenProvider, TokenSource};

use async_trait::async_trait;

use crate::transaction::RawTransaction;

/// Errors reported by a [BankDataClient].
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ProviderError {
    /// The provider rejected the request with HTTP 429.
    ///
    /// `retry_after_seconds` carries the provider's own retry hint so the
    /// caller can surface it instead of a generic failure.
    #[error("rate limited, retry after {retry_after_seconds} seconds")]
    RateLimited {
        /// Seconds until the provider will accept another request.
        retry_after_seconds: u64,
    },

    /// The requisition ID is unknown to the provider.
    #[error("requisition not found")]
    RequisitionNotFound,

    /// Any other failed request (network error, 5xx, malformed response).
    #[error("request failed: {0}")]
    Request(String),
}

impl From<ProviderError> for crate::Error {
    fn from(value: ProviderError) -> Self {
        match value {
            ProviderError::RateLimited {
                retry_after_seconds,
            } => crate::Error::RateLimited {
                retry_after_seconds,
            },
            ProviderError::RequisitionNotFound => crate::Error::NotFound,
            ProviderError::Request(message) => crate::Error::Provider(message),
        }
    }
}

/// A consent session created at the provider.
#[derive(Debug, Clone, PartialEq)]
pub struct Requisition {
    /// The provider's identifier for the session.
    pub id: String,
    /// The URL the user must visit to authorize access to their bank.
    pub link: String,
}

/// Whether the user has completed the consent flow for a requisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequisitionStatus {
    /// The user has not finished the bank login yet.
    Pending,
    /// The requisition has at least one linked account.
    Succeeded,
}

/// Details of the account behind a completed requisition.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountDetails {
    /// The display name of the institution.
    pub bank_name: String,
    /// The current balance reported by the provider.
    pub balance: f64,
    /// ISO currency code.
    pub currency: String,
}

/// The bank-data aggregator contract.
#[async_trait]
pub trait BankDataClient: Send + Sync {
    /// Create a consent session and return its redirect link.
    async fn create_requisition(
        &self,
        reference: &str,
        redirect_url: &str,
    ) -> Result<Requisition, ProviderError>;

    /// Check whether the user completed the consent flow.
    async fn requisition_status(
        &self,
        requisition_id: &str,
    ) -> Result<RequisitionStatus, ProviderError>;

    /// Fetch the details of the account behind `requisition_id`.
    async fn account_details(&self, requisition_id: &str)
    -> Result<AccountDetails, ProviderError>;

    /// Fetch the booked transactions for the account behind `requisition_id`.
    ///
    /// The same movements may be returned on every call; deduplication is the
    /// caller's job.
    async fn fetch_transactions(
        &self,
        requisition_id: &str,
    ) -> Result<Vec<RawTransaction>, ProviderError>;
}
