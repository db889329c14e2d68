//! Route handlers for the subscription lifecycle.

use axum::{Json, extract::State, response::IntoResponse};
use serde::Deserialize;
use serde_json::json;
use time::OffsetDateTime;

use crate::{Error, auth::AuthenticatedUser, state::SubscriptionState};

use super::{
    cancel_to_free,
    core::{Plan, ensure_subscription},
    limits::{can_connect, enforce_connection_limit},
};

/// Route handler for reading the user's subscription.
///
/// The free-tier row is created on first read.
pub async fn get_my_subscription(
    State(state): State<SubscriptionState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
) -> Result<impl IntoResponse, Error> {
    let connection = state
        .db_connection
        .lock()
        .map_err(|_| Error::DatabaseLockError)?;
    let subscription = ensure_subscription(user_id, OffsetDateTime::now_utc(), &connection)?;

    Ok(Json(subscription))
}

/// The body for a plan change request.
#[derive(Debug, Deserialize)]
pub struct UpdateSubscriptionBody {
    /// The requested plan name.
    pub plan: String,
}

/// Route handler for changing plans.
///
/// Switching to a paid plan does not change local state: it creates a
/// checkout session at the billing provider and returns its URL. The
/// subscription only becomes active when the provider's webhook reports the
/// completed checkout. Switching to free takes effect immediately and
/// enforces the free-tier connection limit.
pub async fn update_subscription(
    State(state): State<SubscriptionState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Json(body): Json<UpdateSubscriptionBody>,
) -> Result<impl IntoResponse, Error> {
    let plan = Plan::parse(&body.plan)?;

    if !plan.is_paid() {
        let now = OffsetDateTime::now_utc();
        let connection = state
            .db_connection
            .lock()
            .map_err(|_| Error::DatabaseLockError)?;
        let subscription = cancel_to_free(user_id, now, &connection)?;
        let removed = enforce_connection_limit(user_id, now, &connection)?;

        return Ok(Json(json!({
            "subscription": subscription,
            "removed_connections": removed,
        })));
    }

    let session = state
        .billing_client
        .create_checkout_session(user_id, plan)
        .await?;

    Ok(Json(json!({ "checkout": session })))
}

/// Route handler for a user-initiated cancel.
///
/// Drops to the free tier immediately and enforces the free-tier connection
/// limit in the same request, keeping only the oldest connection.
pub async fn cancel_subscription(
    State(state): State<SubscriptionState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
) -> Result<impl IntoResponse, Error> {
    let now = OffsetDateTime::now_utc();
    let connection = state
        .db_connection
        .lock()
        .map_err(|_| Error::DatabaseLockError)?;

    let subscription = cancel_to_free(user_id, now, &connection)?;
    let removed = enforce_connection_limit(user_id, now, &connection)?;

    tracing::info!(user_id, removed = removed.len(), "subscription canceled");

    Ok(Json(json!({
        "subscription": subscription,
        "removed_connections": removed,
    })))
}

/// Route handler for checking whether another bank may be connected.
pub async fn can_connect_endpoint(
    State(state): State<SubscriptionState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
) -> Result<impl IntoResponse, Error> {
    let connection = state
        .db_connection
        .lock()
        .map_err(|_| Error::DatabaseLockError)?;
    let gate = can_connect(user_id, OffsetDateTime::now_utc(), &connection)?;

    Ok(Json(gate))
}
