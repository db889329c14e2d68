//! Plan-based limits on connected banks.

use rusqlite::Connection;
use serde::Serialize;
use time::OffsetDateTime;

use crate::{
    Error,
    connection::{ConnectionId, count_connected, delete_bank_connection, list_connected_oldest_first},
    user::UserId,
};

use super::{Plan, read_subscription};

/// The maximum number of connected banks for `plan`. `None` is unbounded.
pub fn connection_limit(plan: Plan) -> Option<usize> {
    match plan {
        Plan::Free => Some(1),
        Plan::ProMonthly | Plan::ProYearly => None,
    }
}

/// The result of a "may this user connect another bank" check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectGate {
    /// Whether another connection is allowed.
    pub allowed: bool,
    /// The plan's limit. `None` is unbounded.
    pub limit: Option<usize>,
    /// How many banks are currently connected.
    pub current: usize,
    /// The plan the check was made against.
    pub plan: Plan,
}

/// Check whether `user_id` may connect another bank under their plan.
///
/// This check is advisory, not transactional: two concurrent connect
/// attempts can both pass before either commits. The consequence is at most
/// one extra connection, corrected by [enforce_connection_limit] on the next
/// downgrade.
///
/// # Errors
/// Returns an [Error::SqlError] if there is an unexpected SQL error.
pub fn can_connect(
    user_id: UserId,
    now: OffsetDateTime,
    connection: &Connection,
) -> Result<ConnectGate, Error> {
    let plan = read_subscription(user_id, now, connection)?.effective_plan();
    let limit = connection_limit(plan);
    let current = count_connected(user_id, connection)?;

    Ok(ConnectGate {
        allowed: limit.is_none_or(|limit| current < limit),
        limit,
        current,
        plan,
    })
}

/// Remove connections beyond what `user_id`'s plan allows.
///
/// The oldest connections (by creation time, then ID) are kept; the rest are
/// deleted along with their transactions. Returns the IDs of the removed
/// connections.
///
/// # Errors
/// Returns an [Error::SqlError] if there is an unexpected SQL error.
pub fn enforce_connection_limit(
    user_id: UserId,
    now: OffsetDateTime,
    connection: &Connection,
) -> Result<Vec<ConnectionId>, Error> {
    let plan = read_subscription(user_id, now, connection)?.effective_plan();

    let Some(limit) = connection_limit(plan) else {
        return Ok(Vec::new());
    };

    let connected = list_connected_oldest_first(user_id, connection)?;
    let mut removed = Vec::new();

    for bank_connection in connected.into_iter().skip(limit) {
        delete_bank_connection(bank_connection.id, user_id, connection)?;
        removed.push(bank_connection.id);
    }

    if !removed.is_empty() {
        tracing::info!(
            user_id,
            removed = removed.len(),
            "removed connections over the {} plan limit",
            plan.as_str()
        );
    }

    Ok(removed)
}
