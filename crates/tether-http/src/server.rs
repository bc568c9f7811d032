//! Inbound side: serves exported endpoints over HTTP.
//!
//! `POST /service/{service_id}/{interface}` hands the request body to the
//! matching export's handler and answers with its reply. Calls for unknown
//! services get `404` with an empty body.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tether_admin::RemoteServiceAdmin;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

/// Build the endpoint router for `admin`.
pub fn router(admin: Arc<RemoteServiceAdmin>) -> Router {
    Router::new()
        .route("/service/{service_id}/{interface}", post(handle_call))
        .layer(TraceLayer::new_for_http())
        .with_state(admin)
}

async fn handle_call(
    State(admin): State<Arc<RemoteServiceAdmin>>,
    Path((service_id, interface)): Path<(String, String)>,
    body: Bytes,
) -> Response {
    let Ok(service_id) = service_id.parse::<i64>() else {
        debug!(%service_id, "Call for non-numeric service id");
        return StatusCode::NOT_FOUND.into_response();
    };
    // Cloned out of the registry; the lock is not held while the call runs.
    let Some(handler) = admin.endpoint_handler(service_id, &interface) else {
        debug!(service_id, %interface, "No export matches call");
        return StatusCode::NOT_FOUND.into_response();
    };
    match handler.handle_request(body).await {
        Some(reply) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            reply,
        )
            .into_response(),
        None => StatusCode::OK.into_response(),
    }
}

/// Handle to a running listener. Dropping it stops the listener too.
#[derive(Debug)]
pub struct HttpServerHandle {
    local_addr: SocketAddr,
    shutdown_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl HttpServerHandle {
    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting calls and wait for the listener task to finish.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        info!(addr = %self.local_addr, "HTTP endpoint listener stopped");
    }
}

impl Drop for HttpServerHandle {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}

/// Serve `admin`'s exports on an already bound listener.
pub fn serve(listener: TcpListener, admin: Arc<RemoteServiceAdmin>) -> std::io::Result<HttpServerHandle> {
    let local_addr = listener.local_addr()?;
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let app = router(admin);

    let task = tokio::spawn(async move {
        let server = axum::serve(listener, app).with_graceful_shutdown(async move {
            let _ = shutdown_rx.wait_for(|v| *v).await;
            debug!("HTTP endpoint listener received shutdown signal");
        });
        if let Err(e) = server.await {
            error!("HTTP endpoint listener error: {e}");
        }
    });

    info!(addr = %local_addr, "HTTP endpoint listener started");
    Ok(HttpServerHandle {
        local_addr,
        shutdown_tx,
        task: Some(task),
    })
}
