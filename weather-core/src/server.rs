//! axum wiring for both roles, plus the shared serve loop.

use std::{future::Future, sync::Arc, time::Duration};

use anyhow::{Context as _, Result};
use axum::{
    Json, Router,
    body::Bytes,
    extract::{Request, State},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::post,
};
use http::HeaderMap;
use tokio::{net::TcpListener, signal};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::{error::ServiceError, gateway::Gateway, model::ComposedResponse, resolver::Resolver};

/// A role plus the deadline applied to each of its requests.
struct Served<S> {
    service: Arc<S>,
    deadline: Duration,
}

impl<S> Clone for Served<S> {
    fn clone(&self) -> Self {
        Self { service: Arc::clone(&self.service), deadline: self.deadline }
    }
}

pub fn gateway_router(gateway: Gateway, deadline: Duration) -> Router {
    let state = Served { service: Arc::new(gateway), deadline };

    Router::new()
        .route("/cep", post(gateway_cep))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

pub fn resolver_router(resolver: Resolver, deadline: Duration) -> Router {
    let state = Served { service: Arc::new(resolver), deadline };

    Router::new()
        .route("/cep", post(resolver_cep))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn gateway_cep(
    State(state): State<Served<Gateway>>,
    body: Bytes,
) -> Result<Json<ComposedResponse>, ServiceError> {
    within_deadline(state.deadline, state.service.handle(&body)).await.map(Json)
}

async fn resolver_cep(
    State(state): State<Served<Resolver>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ComposedResponse>, ServiceError> {
    within_deadline(state.deadline, state.service.handle(&headers, &body)).await.map(Json)
}

/// Dropping the handling future on expiry cancels every outbound call it has
/// in flight.
async fn within_deadline<F, T>(deadline: Duration, work: F) -> Result<T, ServiceError>
where
    F: Future<Output = Result<T, ServiceError>>,
{
    match tokio::time::timeout(deadline, work).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(deadline_ms = deadline.as_millis() as u64, "request deadline exceeded");
            Err(ServiceError::DeadlineExceeded)
        }
    }
}

/// How long aborted requests get to write their error response once the
/// grace period is over.
const ABORT_FLUSH: Duration = Duration::from_secs(1);

/// Serve `router` until `shutdown` resolves, then give in-flight requests
/// `grace` to finish. Requests still running after that are aborted: their
/// handler futures are dropped and the client gets a 500.
pub async fn serve<F>(listener: TcpListener, router: Router, grace: Duration, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        shutdown.await;
        trigger.cancel();
    });

    let abort = CancellationToken::new();
    let router = router.layer(middleware::from_fn_with_state(abort.clone(), abort_on_expiry));

    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "HTTP server listening");
    }

    let server = axum::serve(listener, router)
        .with_graceful_shutdown(cancel.clone().cancelled_owned())
        .into_future();
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => return result.context("HTTP server failed"),
        () = cancel.cancelled() => {}
    }

    tracing::info!(grace_secs = grace.as_secs(), "draining in-flight requests");
    if let Ok(result) = tokio::time::timeout(grace, &mut server).await {
        return result.context("HTTP server failed while shutting down");
    }

    tracing::warn!("grace period elapsed, aborting remaining requests");
    abort.cancel();
    match tokio::time::timeout(ABORT_FLUSH, server).await {
        Ok(result) => result.context("HTTP server failed while aborting requests"),
        Err(_) => {
            tracing::warn!("connections still open after abort, giving up on them");
            Ok(())
        }
    }
}

/// Races every request against the abort token. Losing the race drops the
/// handler, and with it any outbound call in flight.
async fn abort_on_expiry(State(abort): State<CancellationToken>, req: Request, next: Next) -> Response {
    tokio::select! {
        res = next.run(req) => res,
        () = abort.cancelled() => ServiceError::ShuttingDown.into_response(),
    }
}

/// Resolves on Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(%err, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
        tracing::info!("received Ctrl+C");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                tracing::info!("received SIGTERM");
            }
            Err(err) => {
                tracing::error!(%err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
