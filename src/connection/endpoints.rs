//! Route handlers for managing bank connections.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;
use time::OffsetDateTime;

use crate::{
    Error,
    auth::AuthenticatedUser,
    provider::RequisitionStatus,
    state::ConnectionState,
    subscription::can_connect,
};

use super::core::{
    BankConnection, ConnectionId, create_bank_connection, delete_bank_connection,
    list_connections,
};

/// Route handler for starting the bank consent flow.
///
/// Checks the plan limit, creates a requisition at the aggregator, and
/// returns the link the user must visit. Nothing is stored until the flow is
/// finalized.
pub async fn connect_bank(
    State(state): State<ConnectionState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
) -> Result<impl IntoResponse, Error> {
    let now = OffsetDateTime::now_utc();

    {
        let connection = state
            .db_connection
            .lock()
            .map_err(|_| Error::DatabaseLockError)?;
        let gate = can_connect(user_id, now, &connection)?;

        if !gate.allowed {
            return Err(Error::ConnectionLimitReached {
                limit: gate.limit.unwrap_or(gate.current),
                current: gate.current,
            });
        }
    }

    let requisition = state
        .bank_client
        .create_requisition(&format!("user-{user_id}"), &state.redirect_url)
        .await?;

    Ok(Json(json!({
        "requisition_id": requisition.id,
        "link": requisition.link,
    })))
}

/// The body for finalizing a bank connection.
#[derive(Debug, Deserialize)]
pub struct FinalizeConnectionBody {
    /// The requisition returned by the connect step.
    pub requisition_id: String,
}

/// Route handler for finalizing a bank connection after the consent flow.
///
/// The plan limit is re-checked here because the check at connect time is
/// advisory and the consent flow can take minutes.
pub async fn finalize_connection(
    State(state): State<ConnectionState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Json(body): Json<FinalizeConnectionBody>,
) -> Result<impl IntoResponse, Error> {
    let status = state
        .bank_client
        .requisition_status(&body.requisition_id)
        .await?;

    if status != RequisitionStatus::Succeeded {
        return Err(Error::ConsentPending);
    }

    let details = state
        .bank_client
        .account_details(&body.requisition_id)
        .await?;

    let now = OffsetDateTime::now_utc();
    let connection = state
        .db_connection
        .lock()
        .map_err(|_| Error::DatabaseLockError)?;

    let gate = can_connect(user_id, now, &connection)?;
    if !gate.allowed {
        return Err(Error::ConnectionLimitReached {
            limit: gate.limit.unwrap_or(gate.current),
            current: gate.current,
        });
    }

    let bank_connection = create_bank_connection(
        user_id,
        &body.requisition_id,
        &details.bank_name,
        details.balance,
        &details.currency,
        now,
        &connection,
    )?;

    tracing::info!(user_id, bank = details.bank_name, "bank connected");

    Ok((StatusCode::CREATED, Json(bank_connection)))
}

/// Route handler for listing the user's bank connections.
pub async fn list_banks(
    State(state): State<ConnectionState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
) -> Result<Json<Vec<BankConnection>>, Error> {
    let connection = state
        .db_connection
        .lock()
        .map_err(|_| Error::DatabaseLockError)?;

    Ok(Json(list_connections(user_id, &connection)?))
}

/// Route handler for disconnecting a bank.
///
/// Deletes the connection and its transactions.
pub async fn remove_bank(
    State(state): State<ConnectionState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Path(connection_id): Path<ConnectionId>,
) -> Result<impl IntoResponse, Error> {
    let connection = state
        .db_connection
        .lock()
        .map_err(|_| Error::DatabaseLockError)?;

    delete_bank_connection(connection_id, user_id, &connection)?;

    Ok(Json(json!({ "deleted": connection_id })))
}
