//! Budget threshold alerts and their email dispatch.
//!
//! Breaches at [ALERT_THRESHOLD] are reported to the client; breaches at
//! [EMAIL_THRESHOLD] also trigger an email, deduplicated through the
//! 24-hour notification ledger.

use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use serde::Serialize;
use time::OffsetDateTime;

use crate::{
    Error,
    notify::{EmailMessage, Mailer, Severity, record_notification, was_recently_sent},
    user::{User, UserId, get_user},
};

use super::core::BudgetStatus;

/// Spending percentage at which a breach appears in the alert list.
pub const ALERT_THRESHOLD: f64 = 80.0;

/// Spending percentage at which a breach also sends an email.
pub const EMAIL_THRESHOLD: f64 = 90.0;

/// A budget that has crossed the alert threshold.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BudgetAlert {
    /// The normalized category of the breached budget.
    pub category: String,
    /// The budget's limit.
    pub limit: f64,
    /// Spending over the budget's window.
    pub spent: f64,
    /// `spent / limit` as a percentage.
    pub percentage: f64,
    /// Warning below 100%, critical at or above it.
    pub severity: Severity,
}

/// Find the budgets over [ALERT_THRESHOLD], most severe first.
pub fn compute_alerts(statuses: &[BudgetStatus]) -> Vec<BudgetAlert> {
    let mut alerts: Vec<BudgetAlert> = statuses
        .iter()
        .filter(|status| status.percentage >= ALERT_THRESHOLD)
        .map(|status| BudgetAlert {
            category: status.category.clone(),
            limit: status.limit,
            spent: status.spent,
            percentage: status.percentage,
            severity: if status.percentage >= 100.0 {
                Severity::Critical
            } else {
                Severity::Warning
            },
        })
        .collect();

    alerts.sort_by(|a, b| b.percentage.total_cmp(&a.percentage));

    alerts
}

/// Send alert emails for breaches at or over [EMAIL_THRESHOLD].
///
/// Alerts already sent for the same (user, category, severity) within the
/// cooldown window are suppressed. Send failures are logged and skipped;
/// they never fail the request that triggered the alert check. Returns the
/// number of emails sent.
///
/// # Errors
/// Returns an [Error::DatabaseLockError] if the database lock is poisoned.
pub async fn dispatch_alert_emails(
    user_id: UserId,
    alerts: &[BudgetAlert],
    mailer: &dyn Mailer,
    db_connection: &Arc<Mutex<Connection>>,
    now: OffsetDateTime,
) -> Result<usize, Error> {
    // Work out who to mail and which alerts are not in cooldown, then drop
    // the lock before any sending happens.
    let (user, due) = {
        let connection = db_connection
            .lock()
            .map_err(|_| Error::DatabaseLockError)?;

        let user = match get_user(user_id, &connection) {
            Ok(user) => user,
            Err(Error::NotFound) => {
                tracing::warn!(user_id, "cannot send budget alerts for unknown user");
                return Ok(0);
            }
            Err(error) => return Err(error),
        };

        let mut due = Vec::new();

        for alert in alerts {
            if alert.percentage < EMAIL_THRESHOLD {
                continue;
            }

            if was_recently_sent(user_id, &alert.category, alert.severity, now, &connection)? {
                tracing::debug!(
                    user_id,
                    category = alert.category,
                    "alert suppressed by cooldown"
                );
                continue;
            }

            due.push(alert.clone());
        }

        (user, due)
    };

    let mut sent = 0;

    for alert in due {
        let message = build_alert_email(&user, &alert);

        match mailer.send(message).await {
            Ok(()) => {
                let connection = db_connection
                    .lock()
                    .map_err(|_| Error::DatabaseLockError)?;
                record_notification(
                    user_id,
                    &alert.category,
                    alert.severity,
                    alert.percentage,
                    now,
                    &connection,
                )?;
                sent += 1;
            }
            Err(error) => {
                tracing::error!(
                    user_id,
                    category = alert.category,
                    "could not send budget alert email: {error}"
                );
            }
        }
    }

    Ok(sent)
}

fn build_alert_email(user: &User, alert: &BudgetAlert) -> EmailMessage {
    let subject = match alert.severity {
        Severity::Critical => format!("Budget limit exceeded: {}", alert.category),
        Severity::Warning => format!("Budget limit warning: {}", alert.category),
    };

    let body = format!(
        "Hello {},\n\n\
         Your {} spending has reached {:.0}% of your limit.\n\n\
         Spent: {:.2}\n\
         Limit: {:.2}\n\
         Remaining: {:.2}\n\n\
         You can adjust your budget limits in the dashboard.",
        user.name,
        alert.category,
        alert.percentage,
        alert.spent,
        alert.limit,
        alert.limit - alert.spent,
    );

    EmailMessage {
        to: user.email.clone(),
        subject,
        body,
    }
}
