//! Helpers shared by the endpoint tests.

use std::sync::{Arc, Mutex};

use axum_test::TestServer;
use rusqlite::Connection;

use crate::{
    AppState, billing::SandboxBillingClient, build_router, classify::KeywordCategorizer,
    db::initialize, notify::LogMailer, provider::SandboxBankClient,
};

/// The webhook secret test states are built with.
pub const TEST_WEBHOOK_SECRET: &str = "whsec_test123secret456";

/// An [AppState] over a fresh in-memory database and sandbox collaborators.
pub fn test_state() -> AppState {
    let conn = Connection::open_in_memory().unwrap();
    initialize(&conn).unwrap();

    AppState::new(
        Arc::new(Mutex::new(conn)),
        Arc::new(SandboxBankClient::new()),
        Arc::new(KeywordCategorizer),
        Arc::new(LogMailer),
        Arc::new(SandboxBillingClient),
        TEST_WEBHOOK_SECRET,
        "http://localhost:3000/dashboard",
    )
}

/// A [TestServer] over the full application router.
pub fn test_server(state: AppState) -> TestServer {
    TestServer::new(build_router(state))
}
