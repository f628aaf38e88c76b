//! Admission-controlled HTTP service.
//!
//! # Responsibilities
//! - Wrap an Axum router with an admission middleware
//! - Wire up tracing and per-request timeout layers
//! - Run the serve loop with graceful shutdown tied to the stop signal
//! - Record how the serve loop ended
//!
//! # Shutdown Protocol
//! ```text
//! stop()           → admission refuses new requests (503)
//!                  → axum graceful shutdown: listener closed, keep-alive off
//! wait_requests()  → returns once every admitted request has finished
//! stopped()        → fires when the serve loop has returned
//! ```

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    Router,
};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::admission::{AdmissionControl, DoneSignal, ExecutionFault, Outcome};
use crate::config::ServiceConfig;

pub const UNAVAILABLE_BODY: &str = "Service Unavailable!";
pub const BUSY_BODY: &str = "Service Busy!";

/// Errors from binding or running the service.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("serve loop failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("serve loop panicked: {0}")]
    Panicked(String),

    #[error("busy status {0} is not a valid HTTP status")]
    InvalidStatus(u16),
}

/// State handed to the admission middleware.
#[derive(Clone)]
struct AdmissionState {
    admission: AdmissionControl,
    busy_status: StatusCode,
}

struct Inner {
    admission: AdmissionControl,
    local_addr: SocketAddr,
    pending: Mutex<Option<(TcpListener, Router)>>,
    stopped: DoneSignal,
    error: Mutex<Option<Arc<ServiceError>>>,
}

/// An HTTP service whose requests pass through an admission gate.
///
/// Cheap to clone; clones control the same service.
#[derive(Clone)]
pub struct HttpService {
    inner: Arc<Inner>,
}

impl HttpService {
    /// Wrap `router` for serving on `listener`. Nothing is served until [`HttpService::start`].
    pub fn new(listener: TcpListener, router: Router, config: &ServiceConfig) -> Result<Self, ServiceError> {
        let local_addr = listener.local_addr()?;
        let busy_status = StatusCode::from_u16(config.busy_status)
            .map_err(|_| ServiceError::InvalidStatus(config.busy_status))?;
        let admission = AdmissionControl::new("http", &config.admission);

        let state = AdmissionState {
            admission: admission.clone(),
            busy_status,
        };
        let router = build_router(router, state, Duration::from_secs(config.request_timeout_secs));

        Ok(Self {
            inner: Arc::new(Inner {
                admission,
                local_addr,
                pending: Mutex::new(Some((listener, router))),
                stopped: DoneSignal::new(),
                error: Mutex::new(None),
            }),
        })
    }

    /// Bind `config.bind_address` and wrap `router`.
    pub async fn bind(router: Router, config: &ServiceConfig) -> Result<Self, ServiceError> {
        let listener = TcpListener::bind(&config.bind_address)
            .await
            .map_err(|source| ServiceError::Bind {
                address: config.bind_address.clone(),
                source,
            })?;
        Self::new(listener, router, config)
    }

    /// Spawn the serve loop. Only the first call starts it.
    pub fn start(&self) -> bool {
        let Some((listener, router)) = self.take_pending() else {
            return false;
        };

        let stop = self.inner.admission.stop_signal();
        let serve = axum::serve(listener, router).with_graceful_shutdown(async move { stop.wait().await });
        let serving = tokio::spawn(async move { serve.await });

        tracing::info!(address = %self.inner.local_addr, "HTTP service starting");

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let err = match serving.await {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(ServiceError::Io(e)),
                Err(e) if e.is_panic() => Some(ServiceError::Panicked(
                    ExecutionFault::from_panic(e.into_panic()).message().to_string(),
                )),
                Err(_) => Some(ServiceError::Panicked("serve task cancelled".to_string())),
            };
            inner.finish(err);
        });
        true
    }

    /// Refuse new requests and begin graceful shutdown.
    pub fn stop(&self) {
        self.inner.admission.stop();
        // Never started: nothing will fire `stopped` for us.
        if self.take_pending().is_some() {
            self.inner.finish(None);
        }
    }

    /// Fires once the serve loop has returned.
    pub fn stopped(&self) -> DoneSignal {
        self.inner.stopped.clone()
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.is_set()
    }

    /// Why the serve loop ended, if it ended abnormally.
    pub fn error(&self) -> Option<Arc<ServiceError>> {
        self.inner.lock_error().clone()
    }

    /// Wait until every admitted request has finished.
    pub async fn wait_requests(&self) {
        self.inner.admission.wait_drain().await;
    }

    /// Fires when the service starts stopping. Long-running handlers should watch it.
    pub fn quit_signal(&self) -> DoneSignal {
        self.inner.admission.stop_signal()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.inner.local_addr
    }

    pub fn admission(&self) -> &AdmissionControl {
        &self.inner.admission
    }

    fn take_pending(&self) -> Option<(TcpListener, Router)> {
        self.inner
            .pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }
}

impl Inner {
    fn finish(&self, err: Option<ServiceError>) {
        // The loop can also end on its own (listener failure); refuse from here on.
        self.admission.stop();
        match err {
            Some(e) => {
                tracing::error!(address = %self.local_addr, error = %e, "HTTP service stopped with error");
                *self.lock_error() = Some(Arc::new(e));
            }
            None => tracing::info!(address = %self.local_addr, "HTTP service stopped"),
        }
        self.stopped.fire();
    }

    fn lock_error(&self) -> std::sync::MutexGuard<'_, Option<Arc<ServiceError>>> {
        self.error.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for HttpService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpService")
            .field("local_addr", &self.inner.local_addr)
            .field("admission", &self.inner.admission)
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

/// Build the router with all middleware layers.
#[allow(deprecated)]
fn build_router(router: Router, state: AdmissionState, request_timeout: Duration) -> Router {
    router.layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(TimeoutLayer::new(request_timeout))
            .layer(middleware::from_fn_with_state(state, admit_request)),
    )
}

/// Admission middleware: every request takes a slot for its whole lifetime.
async fn admit_request(State(state): State<AdmissionState>, request: Request, next: Next) -> Response {
    match state.admission.handle(None, || next.run(request)).await {
        Ok(Outcome::Admitted(response)) => response,
        Ok(Outcome::Unavailable) => (StatusCode::SERVICE_UNAVAILABLE, UNAVAILABLE_BODY).into_response(),
        Ok(Outcome::Busy) => (state.busy_status, BUSY_BODY).into_response(),
        Err(fault) => {
            tracing::error!(error = %fault, "Request handler panicked");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::get;

    async fn service(router: Router, config: ServiceConfig) -> HttpService {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        HttpService::new(listener, router, &config).unwrap()
    }

    #[tokio::test]
    async fn start_only_once() {
        let svc = service(Router::new(), ServiceConfig::default()).await;
        assert!(svc.start());
        assert!(!svc.start());
        svc.stop();
        tokio::time::timeout(Duration::from_secs(5), svc.stopped().wait())
            .await
            .unwrap();
        assert!(svc.error().is_none());
    }

    #[tokio::test]
    async fn stop_before_start_fires_stopped() {
        let svc = service(Router::new(), ServiceConfig::default()).await;
        svc.stop();
        assert!(svc.is_stopped());
        assert!(!svc.start());
    }

    #[tokio::test]
    async fn invalid_busy_status_is_rejected() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let config = ServiceConfig {
            busy_status: 1000,
            ..ServiceConfig::default()
        };
        assert!(matches!(
            HttpService::new(listener, Router::new(), &config),
            Err(ServiceError::InvalidStatus(1000))
        ));
    }

    #[tokio::test]
    async fn panicking_handler_answers_500() {
        let router = Router::new().route(
            "/boom",
            get(|| async {
                if true {
                    panic!("handler exploded");
                }
                "unreachable"
            }),
        );
        let svc = service(router, ServiceConfig::default()).await;
        svc.start();

        let url = format!("http://{}/boom", svc.local_addr());
        let resp = reqwest::get(&url).await.unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(svc.admission().in_flight(), 0);

        svc.stop();
        svc.stopped().wait().await;
    }
}
