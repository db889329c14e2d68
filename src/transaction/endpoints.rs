//! Route handler for syncing transactions from the aggregator.

use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use time::OffsetDateTime;

use crate::{
    Error,
    auth::AuthenticatedUser,
    connection::{ConnectionId, get_bank_connection, mark_synced},
    state::SyncState,
};

use super::ingest::ingest_transactions;

/// Route handler for fetching, categorizing, and storing a connection's
/// transactions.
///
/// Safe to call repeatedly: records already stored are skipped. A rate
/// limit from the aggregator aborts the whole batch and surfaces the
/// provider's retry hint as a 429 with a Retry-After header.
pub async fn sync_transactions(
    State(state): State<SyncState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Path(connection_id): Path<ConnectionId>,
) -> Result<impl IntoResponse, Error> {
    let requisition_id = {
        let connection = state
            .db_connection
            .lock()
            .map_err(|_| Error::DatabaseLockError)?;
        get_bank_connection(connection_id, user_id, &connection)?.requisition_id
    };

    let records = state
        .bank_client
        .fetch_transactions(&requisition_id)
        .await?;
    let record_count = records.len();

    let outcome = ingest_transactions(
        user_id,
        connection_id,
        records,
        state.categorizer.as_ref(),
        &state.db_connection,
    )
    .await?;

    // Balance refresh is best-effort: a failure here must not discard the
    // transactions that were just stored.
    match state.bank_client.account_details(&requisition_id).await {
        Ok(details) => {
            let connection = state
                .db_connection
                .lock()
                .map_err(|_| Error::DatabaseLockError)?;
            mark_synced(
                connection_id,
                details.balance,
                OffsetDateTime::now_utc(),
                &connection,
            )?;
        }
        Err(error) => {
            tracing::warn!(connection_id, "could not refresh balance: {error}");
        }
    }

    tracing::info!(
        user_id,
        connection_id,
        fetched = record_count,
        imported = outcome.imported.len(),
        duplicates = outcome.duplicates,
        failures = outcome.failures,
        "sync completed"
    );

    Ok(Json(outcome))
}
