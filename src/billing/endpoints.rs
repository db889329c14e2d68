//! The webhook intake endpoint for the billing provider.

use axum::{Json, body::Bytes, extract::State, http::HeaderMap, response::IntoResponse};
use serde_json::json;
use time::OffsetDateTime;

use crate::{Error, state::WebhookState};

use super::{SIGNATURE_HEADER, apply_event, parse_event, verify_signature};

/// Route handler for billing provider webhooks.
///
/// The signature is checked before the payload is even parsed; a failed
/// check changes no state and returns 400 so the provider retries. Unknown
/// event types are acknowledged with 200 so the provider stops redelivering
/// them.
pub async fn billing_webhook(
    State(state): State<WebhookState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, Error> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or(Error::InvalidSignature)?;

    let now = OffsetDateTime::now_utc();
    verify_signature(&body, signature, &state.webhook_secret, now)?;

    let event = parse_event(&body)?;
    tracing::debug!("billing webhook received: {event:?}");

    let connection = state
        .db_connection
        .lock()
        .map_err(|_| Error::DatabaseLockError)?;
    apply_event(event, now, &connection)?;

    Ok(Json(json!({ "received": true })))
}
