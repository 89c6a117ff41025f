//! The HTTP server exposing the service health.
//!
//! - `GET /healthz` returns the [`HealthReport`] of the service;
//! - any other path is answered with a `404` [`Problem`].
use anyhow::Context;
use axum::extract::State;
use axum::http::Uri;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

mod health;
mod problem;

pub use health::{
    BrokerConnectionCheck, Component, Health, HealthCheck, HealthReport, HealthStatus, SystemInfo,
};
pub use problem::Problem;

/// Build the router serving `health` on `/healthz`.
pub fn router(health: Health) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(health))
}

async fn healthz(State(health): State<Arc<Health>>) -> Response {
    let report = health.measure().await;
    (report.status.status_code(), Json(report)).into_response()
}

async fn not_found(uri: Uri) -> Problem {
    let problem = Problem::not_found();
    tracing::warn!(
        status_code = problem.status.as_u16(),
        path = %uri,
        "no response available"
    );
    problem
}

/// An HTTP server bound to its listening socket, ready to serve requests.
pub struct Server {
    listener: TcpListener,
    router: Router,
}

impl Server {
    /// Bind `router` to `address`.
    ///
    /// Use port `0` to let the OS pick a free port - see [`Server::local_addr`].
    pub async fn bind(address: SocketAddr, router: Router) -> Result<Self, anyhow::Error> {
        let listener = TcpListener::bind(address)
            .await
            .with_context(|| format!("Failed to bind the HTTP server to {address}"))?;
        Ok(Self { listener, router })
    }

    /// The address the server is listening on.
    pub fn local_addr(&self) -> Result<SocketAddr, anyhow::Error> {
        self.listener
            .local_addr()
            .context("Failed to read the address of the HTTP server")
    }

    /// Serve requests until `shutdown` completes, then wait for in-flight requests to be answered.
    pub async fn run_until_shutdown(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), anyhow::Error> {
        let port = self.local_addr()?.port();
        tracing::info!(port, "server started");
        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await
            .context("The HTTP server failed")?;
        tracing::info!("server stopped");
        Ok(())
    }
}
