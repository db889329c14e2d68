//! The ingestion pipeline: categorize a batch of externally-fetched records
//! and persist only the ones not already stored.

use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use serde::Serialize;
use time::Date;

use crate::{
    Error,
    category::{categorize_by_keywords, normalize_category},
    classify::Categorizer,
    connection::ConnectionId,
    user::UserId,
};

use super::{
    NewTransaction, Transaction, create_transaction, transaction_exists_by_external_id,
    transaction_exists_by_fields,
};

/// One record as fetched from the bank-data aggregator.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTransaction {
    /// The aggregator's identifier for the movement, when it provides one.
    pub external_id: Option<String>,
    /// The merchant name or remittance text.
    pub name: String,
    /// The signed amount.
    pub amount: f64,
    /// The booking date.
    pub date: Date,
}

/// What happened to a batch of raw records.
#[derive(Debug, Default, Serialize)]
pub struct IngestOutcome {
    /// The transactions stored by this run, in input order.
    pub imported: Vec<Transaction>,
    /// Records skipped because they were already stored.
    pub duplicates: usize,
    /// Records dropped because storing them failed.
    pub failures: usize,
}

/// Categorize and store a batch of raw records for one bank connection.
///
/// Each record is categorized through `categorizer`; when the classifier
/// fails the deterministic keyword table takes over, so a classifier outage
/// never fails a sync. A record is a duplicate if a stored transaction
/// matches its external ID or, for records without one, all of
/// (connection, name, amount, date). Duplicates are skipped silently.
///
/// Individual record failures are logged and counted; the rest of the batch
/// continues. Running the same batch twice therefore stores each movement
/// exactly once.
///
/// # Errors
/// Returns an [Error::DatabaseLockError] if the database lock is poisoned.
/// Per-record storage errors are reported through
/// [IngestOutcome::failures], not as an `Err`.
pub async fn ingest_transactions(
    user_id: UserId,
    connection_id: ConnectionId,
    records: Vec<RawTransaction>,
    categorizer: &dyn Categorizer,
    db_connection: &Arc<Mutex<Connection>>,
) -> Result<IngestOutcome, Error> {
    // Categorize first, without holding the database lock: the classifier is
    // a remote call and must not serialize other requests.
    let mut categorized = Vec::with_capacity(records.len());

    for record in records {
        let raw_label = match categorizer.categorize(&record.name).await {
            Ok(label) => label,
            Err(error) => {
                tracing::debug!(
                    name = record.name,
                    "classifier failed ({error}), using keyword fallback"
                );
                categorize_by_keywords(&record.name, record.amount).to_owned()
            }
        };

        categorized.push((record, raw_label));
    }

    let connection = db_connection
        .lock()
        .map_err(|_| Error::DatabaseLockError)?;

    let mut outcome = IngestOutcome::default();

    for (record, raw_label) in categorized {
        match store_record(user_id, connection_id, record, raw_label, &connection) {
            Ok(Some(transaction)) => outcome.imported.push(transaction),
            Ok(None) => outcome.duplicates += 1,
            Err(error) => {
                tracing::warn!("skipping record that could not be stored: {error}");
                outcome.failures += 1;
            }
        }
    }

    Ok(outcome)
}

/// Store one record unless it is already present. Returns `Ok(None)` for
/// duplicates.
fn store_record(
    user_id: UserId,
    connection_id: ConnectionId,
    record: RawTransaction,
    raw_label: String,
    connection: &Connection,
) -> Result<Option<Transaction>, Error> {
    let is_duplicate = match &record.external_id {
        Some(external_id) => transaction_exists_by_external_id(user_id, external_id, connection)?,
        None => transaction_exists_by_fields(
            user_id,
            connection_id,
            &record.name,
            record.amount,
            record.date,
            connection,
        )?,
    };

    if is_duplicate {
        return Ok(None);
    }

    let normalized = normalize_category(&raw_label);

    let result = create_transaction(
        NewTransaction {
            user_id,
            connection_id,
            amount: record.amount,
            name: record.name,
            category: raw_label,
            normalized_category: normalized,
            date: record.date,
            external_id: record.external_id,
        },
        connection,
    );

    match result {
        Ok(transaction) => Ok(Some(transaction)),
        // A concurrent sync won the race between the existence check and the
        // insert; the unique index caught it.
        Err(Error::DuplicateTransaction) => Ok(None),
        Err(error) => Err(error),
    }
}

#[cfg(test)]
mod ingest_tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use rusqlite::Connection;
    use time::macros::date;

    use crate::{
        classify::{Categorizer, ClassifyError},
        db::initialize,
        transaction::count_transactions,
    };

    use super::{RawTransaction, ingest_transactions};

    struct StubCategorizer {
        label: &'static str,
    }

    #[async_trait]
    impl Categorizer for StubCategorizer {
        async fn categorize(&self, _description: &str) -> Result<String, ClassifyError> {
            Ok(self.label.to_owned())
        }
    }

    struct FailingCategorizer;

    #[async_trait]
    impl Categorizer for FailingCategorizer {
        async fn categorize(&self, _description: &str) -> Result<String, ClassifyError> {
            Err(ClassifyError::Unavailable("timed out".to_owned()))
        }
    }

    fn get_test_connection() -> Arc<Mutex<Connection>> {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        Arc::new(Mutex::new(conn))
    }

    fn sample_batch() -> Vec<RawTransaction> {
        vec![
            RawTransaction {
                external_id: Some("ext-1".to_owned()),
                name: "Acme Payroll".to_owned(),
                amount: 2750.0,
                date: date!(2025 - 06 - 01),
            },
            RawTransaction {
                external_id: Some("ext-2".to_owned()),
                name: "Shell Gas Station".to_owned(),
                amount: -35.0,
                date: date!(2025 - 06 - 02),
            },
            RawTransaction {
                external_id: None,
                name: "Corner Cafe".to_owned(),
                amount: -5.5,
                date: date!(2025 - 06 - 03),
            },
        ]
    }

    #[tokio::test]
    async fn ingesting_a_batch_stores_every_record() {
        let db = get_test_connection();
        let categorizer = StubCategorizer { label: "Food" };

        let outcome = ingest_transactions(1, 1, sample_batch(), &categorizer, &db)
            .await
            .unwrap();

        assert_eq!(outcome.imported.len(), 3);
        assert_eq!(outcome.duplicates, 0);
        assert_eq!(outcome.failures, 0);
        assert_eq!(count_transactions(1, &db.lock().unwrap()).unwrap(), 3);
    }

    #[tokio::test]
    async fn ingesting_the_same_batch_twice_is_idempotent() {
        let db = get_test_connection();
        let categorizer = StubCategorizer { label: "Food" };

        ingest_transactions(1, 1, sample_batch(), &categorizer, &db)
            .await
            .unwrap();
        let second = ingest_transactions(1, 1, sample_batch(), &categorizer, &db)
            .await
            .unwrap();

        assert_eq!(second.imported.len(), 0);
        assert_eq!(second.duplicates, 3);
        assert_eq!(count_transactions(1, &db.lock().unwrap()).unwrap(), 3);
    }

    #[tokio::test]
    async fn records_without_external_id_dedupe_on_fields() {
        let db = get_test_connection();
        let categorizer = StubCategorizer { label: "Food" };
        let record = RawTransaction {
            external_id: None,
            name: "Corner Cafe".to_owned(),
            amount: -5.5,
            date: date!(2025 - 06 - 03),
        };

        ingest_transactions(1, 1, vec![record.clone()], &categorizer, &db)
            .await
            .unwrap();
        let second = ingest_transactions(1, 1, vec![record], &categorizer, &db)
            .await
            .unwrap();

        assert_eq!(second.duplicates, 1);
        assert_eq!(count_transactions(1, &db.lock().unwrap()).unwrap(), 1);
    }

    #[tokio::test]
    async fn classifier_failure_falls_back_to_keywords() {
        let db = get_test_connection();

        let outcome = ingest_transactions(1, 1, sample_batch(), &FailingCategorizer, &db)
            .await
            .unwrap();

        let by_name = |name: &str| {
            outcome
                .imported
                .iter()
                .find(|transaction| transaction.name == name)
                .unwrap()
        };
        assert_eq!(by_name("Shell Gas Station").normalized_category, "Transport");
        assert_eq!(by_name("Acme Payroll").normalized_category, "Salary");
        assert_eq!(by_name("Corner Cafe").normalized_category, "Food");
    }

    #[tokio::test]
    async fn classifier_artifacts_are_normalized_before_storage() {
        let db = get_test_connection();
        let categorizer = StubCategorizer {
            label: "Category: Travel.",
        };

        let outcome = ingest_transactions(1, 1, sample_batch(), &categorizer, &db)
            .await
            .unwrap();

        assert!(
            outcome
                .imported
                .iter()
                .all(|transaction| transaction.normalized_category == "Transport")
        );
        // The raw label is kept for auditing.
        assert!(
            outcome
                .imported
                .iter()
                .all(|transaction| transaction.category == "Category: Travel.")
        );
    }
}
