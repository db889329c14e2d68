//! Implements the structs that hold the state of the REST server.

use std::sync::{Arc, Mutex};

use axum::extract::FromRef;
use rusqlite::Connection;

use crate::{
    billing::BillingClient, classify::Categorizer, notify::Mailer, provider::BankDataClient,
};

/// The state of the REST server.
#[derive(Clone)]
pub struct AppState {
    /// The database connection.
    pub db_connection: Arc<Mutex<Connection>>,
    /// The client for the bank-data aggregator.
    pub bank_client: Arc<dyn BankDataClient>,
    /// The external transaction classifier.
    pub categorizer: Arc<dyn Categorizer>,
    /// The transactional email service.
    pub mailer: Arc<dyn Mailer>,
    /// The billing provider client used to start checkout sessions.
    pub billing_client: Arc<dyn BillingClient>,
    /// The shared secret used to verify billing webhook signatures.
    pub webhook_secret: String,
    /// Where the aggregator redirects the user after the consent flow.
    pub redirect_url: String,
}

impl AppState {
    /// Create a new [AppState].
    pub fn new(
        db_connection: Arc<Mutex<Connection>>,
        bank_client: Arc<dyn BankDataClient>,
        categorizer: Arc<dyn Categorizer>,
        mailer: Arc<dyn Mailer>,
        billing_client: Arc<dyn BillingClient>,
        webhook_secret: &str,
        redirect_url: &str,
    ) -> Self {
        Self {
            db_connection,
            bank_client,
            categorizer,
            mailer,
            billing_client,
            webhook_secret: webhook_secret.to_owned(),
            redirect_url: redirect_url.to_owned(),
        }
    }
}

/// The state needed for managing bank connections.
#[derive(Clone)]
pub struct ConnectionState {
    /// The database connection.
    pub db_connection: Arc<Mutex<Connection>>,
    /// The client for the bank-data aggregator.
    pub bank_client: Arc<dyn BankDataClient>,
    /// Where the aggregator redirects the user after the consent flow.
    pub redirect_url: String,
}

impl FromRef<AppState> for ConnectionState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
            bank_client: state.bank_client.clone(),
            redirect_url: state.redirect_url.clone(),
        }
    }
}

/// The state needed for syncing transactions.
#[derive(Clone)]
pub struct SyncState {
    /// The database connection.
    pub db_connection: Arc<Mutex<Connection>>,
    /// The client for the bank-data aggregator.
    pub bank_client: Arc<dyn BankDataClient>,
    /// The external transaction classifier.
    pub categorizer: Arc<dyn Categorizer>,
}

impl FromRef<AppState> for SyncState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
            bank_client: state.bank_client.clone(),
            categorizer: state.categorizer.clone(),
        }
    }
}

/// The state needed for handling billing webhooks.
#[derive(Clone)]
pub struct WebhookState {
    /// The database connection.
    pub db_connection: Arc<Mutex<Connection>>,
    /// The shared secret used to verify webhook signatures.
    pub webhook_secret: String,
}

impl FromRef<AppState> for WebhookState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
            webhook_secret: state.webhook_secret.clone(),
        }
    }
}

/// The state needed for budgets and budget alerts.
#[derive(Clone)]
pub struct BudgetState {
    /// The database connection.
    pub db_connection: Arc<Mutex<Connection>>,
    /// The transactional email service.
    pub mailer: Arc<dyn Mailer>,
}

impl FromRef<AppState> for BudgetState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
            mailer: state.mailer.clone(),
        }
    }
}

/// The state needed for the subscription lifecycle endpoints.
#[derive(Clone)]
pub struct SubscriptionState {
    /// The database connection.
    pub db_connection: Arc<Mutex<Connection>>,
    /// The billing provider client used to start checkout sessions.
    pub billing_client: Arc<dyn BillingClient>,
}

impl FromRef<AppState> for SubscriptionState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
            billing_client: state.billing_client.clone(),
        }
    }
}

/// The state needed by handlers that only touch the database.
#[derive(Clone)]
pub struct DbState {
    /// The database connection.
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for DbState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}
