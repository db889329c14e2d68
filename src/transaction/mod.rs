//! Transactions: immutable records of money movements fetched from the
//! bank-data aggregator, deduplicated and categorized at ingestion time.

mod core;
mod endpoints;
mod ingest;

pub use core::{
    Direction, NewTransaction, Transaction, TransactionId, count_transactions, create_transaction,
    create_transaction_table, list_transactions_in_range, map_transaction_row,
    transaction_exists_by_fields, transaction_exists_by_external_id,
};
pub use endpoints::sync_transactions;
pub use ingest::{IngestOutcome, RawTransaction, ingest_transactions};
