//! An in-memory bank-data client that mimics the provider's sandbox
//! institution.
//!
//! The server binary uses this when no real aggregator credentials are
//! configured, so the whole connect/sync flow can be exercised end to end.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use time::{Duration, OffsetDateTime};

use crate::transaction::RawTransaction;

use super::{AccountDetails, BankDataClient, ProviderError, Requisition, RequisitionStatus};

/// A deterministic stand-in for the aggregator's sandbox institution.
pub struct SandboxBankClient {
    counter: AtomicU64,
}

impl SandboxBankClient {
    /// Create a sandbox client.
    pub fn new() -> Self {
        Self {
            counter: AtomicU64::new(0),
        }
    }
}

impl Default for SandboxBankClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BankDataClient for SandboxBankClient {
    async fn create_requisition(
        &self,
        reference: &str,
        redirect_url: &str,
    ) -> Result<Requisition, ProviderError> {
        let id = format!(
            "sandbox-req-{}-{reference}",
            self.counter.fetch_add(1, Ordering::SeqCst)
        );

        Ok(Requisition {
            link: format!("https://sandbox.example.com/start/{id}?redirect={redirect_url}"),
            id,
        })
    }

    async fn requisition_status(
        &self,
        _requisition_id: &str,
    ) -> Result<RequisitionStatus, ProviderError> {
        // The sandbox institution auto-approves consent.
        Ok(RequisitionStatus::Succeeded)
    }

    async fn account_details(
        &self,
        _requisition_id: &str,
    ) -> Result<AccountDetails, ProviderError> {
        Ok(AccountDetails {
            bank_name: "Sandbox Finance".to_owned(),
            balance: 1203.54,
            currency: "EUR".to_owned(),
        })
    }

    async fn fetch_transactions(
        &self,
        requisition_id: &str,
    ) -> Result<Vec<RawTransaction>, ProviderError> {
        let today = OffsetDateTime::now_utc().date();

        // A small fixed feed; external IDs are stable per requisition so a
        // second sync exercises the dedup path.
        Ok(vec![
            RawTransaction {
                external_id: Some(format!("{requisition_id}-001")),
                name: "Acme Payroll".to_owned(),
                amount: 2750.0,
                date: today - Duration::days(14),
            },
            RawTransaction {
                external_id: Some(format!("{requisition_id}-002")),
                name: "PAK N SAVE SUPERMARKET".to_owned(),
                amount: -86.21,
                date: today - Duration::days(9),
            },
            RawTransaction {
                external_id: Some(format!("{requisition_id}-003")),
                name: "Shell Gas Station".to_owned(),
                amount: -35.0,
                date: today - Duration::days(7),
            },
            RawTransaction {
                external_id: None,
                name: "Corner Cafe".to_owned(),
                amount: -5.5,
                date: today - Duration::days(2),
            },
        ])
    }
}
