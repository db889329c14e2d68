//! Defines the core data model and database queries for subscriptions.

use rusqlite::{Connection, Row};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{Error, user::UserId};

/// The billing tier a user is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Plan {
    /// The default tier. One connected bank.
    Free,
    /// The paid tier, billed monthly. Unlimited connected banks.
    ProMonthly,
    /// The paid tier, billed yearly. Unlimited connected banks.
    ProYearly,
}

impl Plan {
    /// The plan's database and API representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Plan::Free => "free",
            Plan::ProMonthly => "pro_monthly",
            Plan::ProYearly => "pro_yearly",
        }
    }

    /// Parse a plan name from client input.
    ///
    /// # Errors
    /// Returns an [Error::InvalidPlan] for anything outside the vocabulary.
    pub fn parse(value: &str) -> Result<Self, Error> {
        match value {
            "free" => Ok(Plan::Free),
            "pro_monthly" => Ok(Plan::ProMonthly),
            "pro_yearly" => Ok(Plan::ProYearly),
            other => Err(Error::InvalidPlan(other.to_owned())),
        }
    }

    /// Whether this is a paid tier.
    pub fn is_paid(self) -> bool {
        !matches!(self, Plan::Free)
    }

    fn from_db(value: &str) -> Self {
        // Unknown values in storage are treated as the most restrictive tier.
        Self::parse(value).unwrap_or(Plan::Free)
    }
}

/// The billing status of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Payments are current (or the plan is free).
    Active,
    /// The last payment failed; access is not revoked yet.
    PastDue,
    /// The billing provider ended the subscription.
    Canceled,
}

impl SubscriptionStatus {
    /// The status's database representation.
    pub fn as_str(self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Canceled => "canceled",
        }
    }

    fn from_db(value: &str) -> Self {
        match value {
            "past_due" => SubscriptionStatus::PastDue,
            "canceled" => SubscriptionStatus::Canceled,
            _ => SubscriptionStatus::Active,
        }
    }
}

/// A user's billing state. Created lazily, never hard-deleted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Subscription {
    /// The user this subscription belongs to.
    pub user_id: UserId,
    /// The billing tier.
    pub plan: Plan,
    /// The billing status.
    pub status: SubscriptionStatus,
    /// The billing provider's customer identifier.
    pub provider_customer_id: Option<String>,
    /// The billing provider's subscription identifier.
    ///
    /// Webhook events carry this, not the user ID, so reconciliation looks
    /// rows up by it. It also keys idempotent replay of checkout events.
    pub provider_subscription_id: Option<String>,
    /// When the paid period ends, as reported by the billing provider.
    #[serde(with = "time::serde::rfc3339::option")]
    pub current_period_end: Option<OffsetDateTime>,
    /// When the user canceled, if they did.
    #[serde(with = "time::serde::rfc3339::option")]
    pub canceled_at: Option<OffsetDateTime>,
    /// When this row last changed.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Subscription {
    /// The free-tier state a user has before any row exists.
    pub fn default_free(user_id: UserId, now: OffsetDateTime) -> Self {
        Self {
            user_id,
            plan: Plan::Free,
            status: SubscriptionStatus::Active,
            provider_customer_id: None,
            provider_subscription_id: None,
            current_period_end: None,
            canceled_at: None,
            updated_at: now,
        }
    }

    /// The plan used for limit checks.
    ///
    /// A canceled paid subscription no longer grants its tier; it counts as
    /// free until the user re-subscribes.
    pub fn effective_plan(&self) -> Plan {
        if self.status == SubscriptionStatus::Canceled {
            Plan::Free
        } else {
            self.plan
        }
    }
}

/// Create the subscription table in the database.
pub fn create_subscription_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS subscription (
                user_id INTEGER PRIMARY KEY,
                plan TEXT NOT NULL,
                status TEXT NOT NULL,
                provider_customer_id TEXT,
                provider_subscription_id TEXT,
                current_period_end TEXT,
                canceled_at TEXT,
                updated_at TEXT NOT NULL
                )",
        (),
    )?;

    Ok(())
}

const SUBSCRIPTION_COLUMNS: &str = "user_id, plan, status, provider_customer_id, \
     provider_subscription_id, current_period_end, canceled_at, updated_at";

/// Retrieve `user_id`'s subscription row.
///
/// # Errors
/// This function will return a:
/// - [Error::NotFound] if no row exists yet,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn get_subscription(user_id: UserId, connection: &Connection) -> Result<Subscription, Error> {
    let subscription = connection
        .prepare(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscription WHERE user_id = ?1"
        ))?
        .query_row([user_id], map_subscription_row)?;

    Ok(subscription)
}

/// Read `user_id`'s subscription, defaulting to free when no row exists.
///
/// Unlike [ensure_subscription] this never writes, so it is safe to call
/// from read-only paths like limit checks.
///
/// # Errors
/// Returns an [Error::SqlError] if there is an unexpected SQL error.
pub fn read_subscription(
    user_id: UserId,
    now: OffsetDateTime,
    connection: &Connection,
) -> Result<Subscription, Error> {
    match get_subscription(user_id, connection) {
        Ok(subscription) => Ok(subscription),
        Err(Error::NotFound) => Ok(Subscription::default_free(user_id, now)),
        Err(error) => Err(error),
    }
}

/// Retrieve `user_id`'s subscription, creating the default free row first if
/// none exists.
///
/// # Errors
/// Returns an [Error::SqlError] if there is an unexpected SQL error.
pub fn ensure_subscription(
    user_id: UserId,
    now: OffsetDateTime,
    connection: &Connection,
) -> Result<Subscription, Error> {
    connection.execute(
        "INSERT OR IGNORE INTO subscription (user_id, plan, status, updated_at)
             VALUES (?1, 'free', 'active', ?2)",
        (user_id, now),
    )?;

    get_subscription(user_id, connection)
}

/// Find the subscription tracking the provider's `subscription_id`.
///
/// Returns `Ok(None)` when no row matches; webhook handlers log and ignore
/// events for subscriptions this service never saw.
///
/// # Errors
/// Returns an [Error::SqlError] if there is an unexpected SQL error.
pub fn find_by_provider_subscription(
    subscription_id: &str,
    connection: &Connection,
) -> Result<Option<Subscription>, Error> {
    match connection
        .prepare(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscription WHERE provider_subscription_id = ?1"
        ))?
        .query_row([subscription_id], map_subscription_row)
    {
        Ok(subscription) => Ok(Some(subscription)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(error) => Err(error.into()),
    }
}

/// Apply a completed checkout: activate `plan` for `user_id`.
///
/// Idempotent by the provider subscription ID: replaying the same event
/// writes the same values, so the row converges to one active state. When
/// the row already tracks this provider subscription, a period end is never
/// moved backwards (the provider does not guarantee delivery order).
///
/// # Errors
/// Returns an [Error::SqlError] if there is an unexpected SQL error.
pub fn upsert_from_checkout(
    user_id: UserId,
    plan: Plan,
    customer_id: Option<&str>,
    subscription_id: &str,
    period_end: Option<OffsetDateTime>,
    now: OffsetDateTime,
    connection: &Connection,
) -> Result<Subscription, Error> {
    let existing = match get_subscription(user_id, connection) {
        Ok(subscription) => Some(subscription),
        Err(Error::NotFound) => None,
        Err(error) => return Err(error),
    };

    let effective_period_end = match &existing {
        Some(subscription)
            if subscription.provider_subscription_id.as_deref() == Some(subscription_id) =>
        {
            latest(subscription.current_period_end, period_end)
        }
        _ => period_end,
    };

    connection.execute(
        "INSERT INTO subscription
             (user_id, plan, status, provider_customer_id, provider_subscription_id,
              current_period_end, canceled_at, updated_at)
         VALUES (?1, ?2, 'active', ?3, ?4, ?5, NULL, ?6)
         ON CONFLICT(user_id) DO UPDATE SET
             plan = excluded.plan,
             status = 'active',
             provider_customer_id = excluded.provider_customer_id,
             provider_subscription_id = excluded.provider_subscription_id,
             current_period_end = excluded.current_period_end,
             canceled_at = NULL,
             updated_at = excluded.updated_at",
        (
            user_id,
            plan.as_str(),
            customer_id,
            subscription_id,
            effective_period_end,
            now,
        ),
    )?;

    get_subscription(user_id, connection)
}

/// Set the status of the subscription tracking the provider's
/// `subscription_id`.
///
/// Returns the updated row, or `Ok(None)` when no row matches.
///
/// # Errors
/// Returns an [Error::SqlError] if there is an unexpected SQL error.
pub fn set_status(
    subscription_id: &str,
    status: SubscriptionStatus,
    canceled_at: Option<OffsetDateTime>,
    now: OffsetDateTime,
    connection: &Connection,
) -> Result<Option<Subscription>, Error> {
    let Some(subscription) = find_by_provider_subscription(subscription_id, connection)? else {
        return Ok(None);
    };

    connection.execute(
        "UPDATE subscription SET status = ?1, canceled_at = COALESCE(?2, canceled_at), updated_at = ?3
             WHERE user_id = ?4",
        (status.as_str(), canceled_at, now, subscription.user_id),
    )?;

    get_subscription(subscription.user_id, connection).map(Some)
}

/// Refresh the status and period end of the subscription tracking the
/// provider's `subscription_id`.
///
/// The stored period end only ever moves forward: the event's own period
/// fields are the source of truth, and an older event arriving late must not
/// shorten a period a newer event already extended.
///
/// Returns the updated row, or `Ok(None)` when no row matches.
///
/// # Errors
/// Returns an [Error::SqlError] if there is an unexpected SQL error.
pub fn refresh_period(
    subscription_id: &str,
    status: SubscriptionStatus,
    period_end: Option<OffsetDateTime>,
    now: OffsetDateTime,
    connection: &Connection,
) -> Result<Option<Subscription>, Error> {
    let Some(subscription) = find_by_provider_subscription(subscription_id, connection)? else {
        return Ok(None);
    };

    let effective_period_end = latest(subscription.current_period_end, period_end);

    connection.execute(
        "UPDATE subscription SET status = ?1, current_period_end = ?2, updated_at = ?3
             WHERE user_id = ?4",
        (
            status.as_str(),
            effective_period_end,
            now,
            subscription.user_id,
        ),
    )?;

    get_subscription(subscription.user_id, connection).map(Some)
}

/// A user-initiated cancel: drop to the free tier immediately.
///
/// The provider identifiers are kept so late webhook events for the old
/// subscription still find the row.
///
/// # Errors
/// Returns an [Error::SqlError] if there is an unexpected SQL error.
pub fn cancel_to_free(
    user_id: UserId,
    now: OffsetDateTime,
    connection: &Connection,
) -> Result<Subscription, Error> {
    connection.execute(
        "INSERT INTO subscription (user_id, plan, status, canceled_at, updated_at)
             VALUES (?1, 'free', 'active', ?2, ?2)
         ON CONFLICT(user_id) DO UPDATE SET
             plan = 'free',
             status = 'active',
             current_period_end = NULL,
             canceled_at = excluded.canceled_at,
             updated_at = excluded.updated_at",
        (user_id, now),
    )?;

    get_subscription(user_id, connection)
}

fn latest(
    stored: Option<OffsetDateTime>,
    incoming: Option<OffsetDateTime>,
) -> Option<OffsetDateTime> {
    match (stored, incoming) {
        (Some(stored), Some(incoming)) => Some(stored.max(incoming)),
        (stored, incoming) => incoming.or(stored),
    }
}

fn map_subscription_row(row: &Row) -> Result<Subscription, rusqlite::Error> {
    let plan: String = row.get(1)?;
    let status: String = row.get(2)?;

    Ok(Subscription {
        user_id: row.get(0)?,
        plan: Plan::from_db(&plan),
        status: SubscriptionStatus::from_db(&status),
        provider_customer_id: row.get(3)?,
        provider_subscription_id: row.get(4)?,
        current_period_end: row.get(5)?,
        canceled_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

#[cfg(test)]
mod subscription_tests {
    use rusqlite::Connection;
    use time::{Duration, OffsetDateTime};

    use crate::db::initialize;

    use super::{
        Plan, SubscriptionStatus, cancel_to_free, ensure_subscription, read_subscription,
        refresh_period, set_status, upsert_from_checkout,
    };

    fn get_test_connection() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        conn
    }

    #[test]
    fn read_defaults_to_free_without_writing() {
        let conn = get_test_connection();
        let now = OffsetDateTime::now_utc();

        let subscription = read_subscription(1, now, &conn).unwrap();

        assert_eq!(subscription.plan, Plan::Free);
        assert_eq!(subscription.status, SubscriptionStatus::Active);
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM subscription", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn ensure_creates_the_row_once() {
        let conn = get_test_connection();
        let now = OffsetDateTime::now_utc();

        ensure_subscription(1, now, &conn).unwrap();
        ensure_subscription(1, now + Duration::hours(1), &conn).unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM subscription", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn checkout_replay_converges_to_one_state() {
        let conn = get_test_connection();
        let now = OffsetDateTime::now_utc();
        let period_end = now + Duration::days(30);

        let first = upsert_from_checkout(
            1,
            Plan::ProMonthly,
            Some("cus_1"),
            "sub_1",
            Some(period_end),
            now,
            &conn,
        )
        .unwrap();
        let second = upsert_from_checkout(
            1,
            Plan::ProMonthly,
            Some("cus_1"),
            "sub_1",
            Some(period_end),
            now + Duration::seconds(5),
            &conn,
        )
        .unwrap();

        assert_eq!(first.plan, second.plan);
        assert_eq!(first.status, second.status);
        assert_eq!(first.current_period_end, second.current_period_end);
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM subscription", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn stale_checkout_event_does_not_shorten_the_period() {
        let conn = get_test_connection();
        let now = OffsetDateTime::now_utc();
        let newer = now + Duration::days(60);
        let older = now + Duration::days(30);

        upsert_from_checkout(1, Plan::ProMonthly, None, "sub_1", Some(newer), now, &conn).unwrap();
        let result =
            upsert_from_checkout(1, Plan::ProMonthly, None, "sub_1", Some(older), now, &conn)
                .unwrap();

        assert_eq!(result.current_period_end, Some(newer));
    }

    #[test]
    fn refresh_period_never_regresses() {
        let conn = get_test_connection();
        let now = OffsetDateTime::now_utc();
        let newer = now + Duration::days(60);
        let older = now + Duration::days(30);
        upsert_from_checkout(1, Plan::ProMonthly, None, "sub_1", Some(newer), now, &conn).unwrap();

        let result = refresh_period("sub_1", SubscriptionStatus::Active, Some(older), now, &conn)
            .unwrap()
            .unwrap();

        assert_eq!(result.current_period_end, Some(newer));
        assert_eq!(result.status, SubscriptionStatus::Active);
    }

    #[test]
    fn refresh_for_unknown_subscription_is_none() {
        let conn = get_test_connection();
        let now = OffsetDateTime::now_utc();

        let result =
            refresh_period("sub_404", SubscriptionStatus::Active, None, now, &conn).unwrap();

        assert!(result.is_none());
    }

    #[test]
    fn payment_failure_marks_past_due() {
        let conn = get_test_connection();
        let now = OffsetDateTime::now_utc();
        upsert_from_checkout(1, Plan::ProMonthly, None, "sub_1", None, now, &conn).unwrap();

        let result = set_status("sub_1", SubscriptionStatus::PastDue, None, now, &conn)
            .unwrap()
            .unwrap();

        assert_eq!(result.status, SubscriptionStatus::PastDue);
        assert_eq!(result.plan, Plan::ProMonthly);
    }

    #[test]
    fn canceled_subscription_counts_as_free() {
        let conn = get_test_connection();
        let now = OffsetDateTime::now_utc();
        upsert_from_checkout(1, Plan::ProMonthly, None, "sub_1", None, now, &conn).unwrap();

        let result = set_status(
            "sub_1",
            SubscriptionStatus::Canceled,
            Some(now),
            now,
            &conn,
        )
        .unwrap()
        .unwrap();

        assert_eq!(result.effective_plan(), Plan::Free);
    }

    #[test]
    fn user_cancel_drops_to_free_immediately() {
        let conn = get_test_connection();
        let now = OffsetDateTime::now_utc();
        upsert_from_checkout(
            1,
            Plan::ProYearly,
            None,
            "sub_1",
            Some(now + Duration::days(365)),
            now,
            &conn,
        )
        .unwrap();

        let result = cancel_to_free(1, now, &conn).unwrap();

        assert_eq!(result.plan, Plan::Free);
        assert_eq!(result.status, SubscriptionStatus::Active);
        assert_eq!(result.current_period_end, None);
        assert_eq!(result.canceled_at, Some(now));
    }

    #[test]
    fn invalid_plan_names_are_rejected() {
        assert!(matches!(
            Plan::parse("platinum"),
            Err(crate::Error::InvalidPlan(_))
        ));
    }
}
