use std::{
    env,
    net::SocketAddr,
    sync::{Arc, Mutex},
};

use axum::{
    Router,
    extract::{MatchedPath, Request},
};
use axum_server::Handle;
use clap::Parser;
use rusqlite::Connection;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use ledgerly::{
    AppState, billing::SandboxBillingClient, build_router, classify::KeywordCategorizer,
    graceful_shutdown, initialize_db, notify::LogMailer, provider::SandboxBankClient,
};

/// The REST API server for ledgerly.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// File path to the application SQLite database.
    #[arg(long)]
    db_path: String,

    /// The URL the bank consent flow redirects back to.
    #[arg(long, default_value = "http://localhost:3000/dashboard")]
    redirect_url: String,

    /// The port to serve the API from.
    #[arg(short, long, default_value_t = 3000)]
    port: u16,
}

#[tokio::main]
async fn main() {
    setup_logging();

    let args = Args::parse();

    let webhook_secret = env::var("WEBHOOK_SECRET")
        .expect("The environment variable 'WEBHOOK_SECRET' must be set");

    let conn = Connection::open(&args.db_path).expect("Could not open the database");
    initialize_db(&conn).expect("Could not initialize the database");

    // The sandbox collaborators stand in for the real aggregator, classifier,
    // mailer, and billing provider until their credentials are configured.
    let state = AppState::new(
        Arc::new(Mutex::new(conn)),
        Arc::new(SandboxBankClient::new()),
        Arc::new(KeywordCategorizer),
        Arc::new(LogMailer),
        Arc::new(SandboxBillingClient),
        &webhook_secret,
        &args.redirect_url,
    );

    let handle = Handle::new();
    tokio::spawn(graceful_shutdown(handle.clone()));

    let router = add_tracing_layer(build_router(state));

    let addr = SocketAddr::from(([127, 0, 0, 1], args.port));
    tracing::info!("HTTP server listening on {}", addr);
    axum_server::bind(addr)
        .handle(handle)
        .serve(router.into_make_service())
        .await
        .unwrap();
}

fn setup_logging() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().pretty())
        .init();
}

fn add_tracing_layer(router: Router) -> Router {
    let tracing_layer = TraceLayer::new_for_http()
        .make_span_with(|req: &Request| {
            let method = req.method();
            let uri = req.uri();

            let matched_path = req
                .extensions()
                .get::<MatchedPath>()
                .map(|matched_path| matched_path.as_str());

            tracing::debug_span!("request", %method, %uri, matched_path)
        })
        // By default, `TraceLayer` will log 5xx responses but we're doing our
        // specific logging of errors so disable that
        .on_failure(());

    router.layer(tracing_layer)
}
