//! Route handlers for budgets and budget alerts.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;
use time::OffsetDateTime;

use crate::{Error, auth::AuthenticatedUser, state::BudgetState};

use super::{
    alerts::{compute_alerts, dispatch_alert_emails},
    core::{BudgetId, Period, budget_statuses, deactivate_budget, upsert_budget},
};

/// Query parameters shared by the budget read endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct BudgetQuery {
    /// The budget period to read. Defaults to month.
    pub period: Option<String>,
}

impl BudgetQuery {
    fn period(&self) -> Result<Period, Error> {
        self.period
            .as_deref()
            .map(Period::parse)
            .unwrap_or(Ok(Period::Month))
    }
}

/// Route handler for listing budgets with derived spending figures.
pub async fn get_budgets(
    State(state): State<BudgetState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Query(query): Query<BudgetQuery>,
) -> Result<impl IntoResponse, Error> {
    let period = query.period()?;
    let connection = state
        .db_connection
        .lock()
        .map_err(|_| Error::DatabaseLockError)?;
    let statuses = budget_statuses(user_id, period, OffsetDateTime::now_utc(), &connection)?;

    Ok(Json(statuses))
}

/// The body for creating or updating a budget.
#[derive(Debug, Deserialize)]
pub struct SetBudgetBody {
    /// The category the limit applies to.
    pub category: String,
    /// The spending ceiling. Must be positive.
    pub limit: f64,
    /// The budget period. Defaults to month.
    pub period: Option<String>,
}

/// Route handler for creating or updating a budget.
pub async fn set_budget(
    State(state): State<BudgetState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Json(body): Json<SetBudgetBody>,
) -> Result<impl IntoResponse, Error> {
    if body.category.trim().is_empty() {
        return Err(Error::InvalidBudget("a category is required".to_owned()));
    }

    if !body.limit.is_finite() || body.limit <= 0.0 {
        return Err(Error::InvalidBudget(
            "the limit must be a positive amount".to_owned(),
        ));
    }

    let period = body
        .period
        .as_deref()
        .map(Period::parse)
        .unwrap_or(Ok(Period::Month))?;

    let connection = state
        .db_connection
        .lock()
        .map_err(|_| Error::DatabaseLockError)?;
    let budget = upsert_budget(user_id, &body.category, body.limit, period, &connection)?;

    Ok((StatusCode::CREATED, Json(budget)))
}

/// Route handler for deleting (deactivating) a budget.
pub async fn delete_budget(
    State(state): State<BudgetState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Path(budget_id): Path<BudgetId>,
) -> Result<impl IntoResponse, Error> {
    let connection = state
        .db_connection
        .lock()
        .map_err(|_| Error::DatabaseLockError)?;

    deactivate_budget(budget_id, user_id, &connection)?;

    Ok(Json(json!({ "deleted": budget_id })))
}

/// Route handler for reading budget alerts.
///
/// Alerts over the email threshold are also dispatched through the mailer,
/// subject to the cooldown ledger. Email failures never fail this request.
pub async fn get_budget_alerts(
    State(state): State<BudgetState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Query(query): Query<BudgetQuery>,
) -> Result<impl IntoResponse, Error> {
    let period = query.period()?;
    let now = OffsetDateTime::now_utc();

    let alerts = {
        let connection = state
            .db_connection
            .lock()
            .map_err(|_| Error::DatabaseLockError)?;
        let statuses = budget_statuses(user_id, period, now, &connection)?;
        compute_alerts(&statuses)
    };

    let sent = dispatch_alert_emails(
        user_id,
        &alerts,
        state.mailer.as_ref(),
        &state.db_connection,
        now,
    )
    .await?;

    Ok(Json(json!({ "alerts": alerts, "emails_sent": sent })))
}

#[cfg(test)]
mod budget_endpoint_tests {
    use axum::http::StatusCode;
    use serde_json::{Value, json};
    use time::OffsetDateTime;

    use crate::{
        auth::USER_ID_HEADER,
        connection::create_bank_connection,
        endpoints,
        test_utils::{test_server, test_state},
        transaction::NewTransaction,
        user::create_user,
    };

    fn seed_spending(state: &crate::AppState, amount: f64, category: &str) {
        let connection = state.db_connection.lock().unwrap();
        let now = OffsetDateTime::now_utc();

        if crate::connection::list_connections(1, &connection)
            .unwrap()
            .is_empty()
        {
            create_bank_connection(1, "req-1", "Bank", 0.0, "EUR", now, &connection).unwrap();
        }

        let external_id = format!("ext-{category}-{amount}");
        crate::transaction::create_transaction(
            NewTransaction {
                user_id: 1,
                connection_id: 1,
                amount,
                name: "merchant".to_owned(),
                category: category.to_owned(),
                normalized_category: crate::category::normalize_category(category),
                date: now.date(),
                external_id: Some(external_id),
            },
            &connection,
        )
        .unwrap();
    }

    #[tokio::test]
    async fn set_and_read_budgets_with_spending() {
        let state = test_state();
        seed_spending(&state, -150.0, "Food");
        let server = test_server(state);

        server
            .post(endpoints::BUDGETS)
            .add_header(USER_ID_HEADER, "1")
            .json(&json!({ "category": "Food", "limit": 200.0 }))
            .await
            .assert_status(StatusCode::CREATED);

        let response = server
            .get(endpoints::BUDGETS)
            .add_header(USER_ID_HEADER, "1")
            .await;

        response.assert_status(StatusCode::OK);
        let body: Value = response.json();
        let budgets = body.as_array().unwrap();
        assert_eq!(budgets.len(), 1);
        assert_eq!(budgets[0]["category"], "Food");
        assert_eq!(budgets[0]["spent"], 150.0);
        assert_eq!(budgets[0]["percentage"], 75.0);
    }

    #[tokio::test]
    async fn budgets_without_limits_are_rejected() {
        let state = test_state();
        let server = test_server(state);

        let response = server
            .post(endpoints::BUDGETS)
            .add_header(USER_ID_HEADER, "1")
            .json(&json!({ "category": "Food", "limit": 0.0 }))
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn alerts_fire_and_send_one_email_per_cooldown() {
        let state = test_state();
        {
            let connection = state.db_connection.lock().unwrap();
            create_user("jo@example.com", "Jo", &connection).unwrap();
        }
        seed_spending(&state, -95.0, "Food");
        let server = test_server(state.clone());

        server
            .post(endpoints::BUDGETS)
            .add_header(USER_ID_HEADER, "1")
            .json(&json!({ "category": "Food", "limit": 100.0 }))
            .await
            .assert_status(StatusCode::CREATED);

        let first = server
            .get(endpoints::BUDGET_ALERTS)
            .add_header(USER_ID_HEADER, "1")
            .await;
        first.assert_status(StatusCode::OK);
        let first: Value = first.json();
        assert_eq!(first["alerts"].as_array().unwrap().len(), 1);
        assert_eq!(first["alerts"][0]["severity"], "warning");
        assert_eq!(first["emails_sent"], 1);

        // The identical breach within the cooldown window reports the alert
        // but sends no second email.
        let second = server
            .get(endpoints::BUDGET_ALERTS)
            .add_header(USER_ID_HEADER, "1")
            .await;
        let second: Value = second.json();
        assert_eq!(second["alerts"].as_array().unwrap().len(), 1);
        assert_eq!(second["emails_sent"], 0);
    }

    #[tokio::test]
    async fn delete_hides_the_budget_from_listings() {
        let state = test_state();
        let server = test_server(state);

        let created = server
            .post(endpoints::BUDGETS)
            .add_header(USER_ID_HEADER, "1")
            .json(&json!({ "category": "Food", "limit": 200.0 }))
            .await;
        let created: Value = created.json();
        let id = created["id"].as_i64().unwrap();

        server
            .delete(&format!("/api/budgets/{id}"))
            .add_header(USER_ID_HEADER, "1")
            .await
            .assert_status(StatusCode::OK);

        let listed = server
            .get(endpoints::BUDGETS)
            .add_header(USER_ID_HEADER, "1")
            .await;
        let listed: Value = listed.json();
        assert!(listed.as_array().unwrap().is_empty());
    }
}
