//! Ledgerly is the backend for a personal-finance dashboard: users link
//! their bank accounts through a data aggregator, transactions are fetched,
//! deduplicated, and categorized, budgets watch per-category spending and
//! email the user when limits are breached, and a billing provider's
//! webhooks drive the subscription tier that gates how many banks can be
//! connected.
//!
//! This library provides a JSON REST API.

#![warn(missing_docs)]

use std::{net::SocketAddr, time::Duration};

use axum_server::Handle;
use tokio::signal;

pub mod auth;
pub mod billing;
pub mod budget;
pub mod category;
pub mod classify;
pub mod connection;
pub mod db;
pub mod endpoints;
mod error;
pub mod notify;
pub mod provider;
mod routing;
mod state;
pub mod subscription;
pub mod summary;
pub mod transaction;
pub mod user;

#[cfg(test)]
mod test_utils;

pub use db::initialize as initialize_db;
pub use error::Error;
pub use routing::build_router;
pub use state::{
    AppState, BudgetState, ConnectionState, DbState, SubscriptionState, SyncState, WebhookState,
};

/// An async task that waits for either the ctrl+c or terminate signal,
/// whichever comes first, and then signals the server to shut down
/// gracefully.
///
/// `handle` is a handle to an Axum `Server`.
pub async fn graceful_shutdown(handle: Handle<SocketAddr>) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::debug!("Received ctrl+c signal.");
            handle.graceful_shutdown(Some(Duration::from_secs(1)));
        },
        _ = terminate => {
            tracing::debug!("Received terminate signal.");
            handle.graceful_shutdown(Some(Duration::from_secs(1)));
        },
    }
}
