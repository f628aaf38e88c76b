//! Shared utilities for integration testing.

#![allow(dead_code)]

use axum::{extract::State, routing::get, Router};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

use svckit::config::{AdmissionConfig, ServiceConfig};
use svckit::http::HttpService;

/// Tracks how many handlers run at once.
#[derive(Default)]
pub struct Peak {
    current: AtomicUsize,
    max: AtomicUsize,
    served: AtomicUsize,
}

impl Peak {
    pub fn max(&self) -> usize {
        self.max.load(Ordering::SeqCst)
    }

    pub fn served(&self) -> usize {
        self.served.load(Ordering::SeqCst)
    }

    async fn run(&self, delay: Duration) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(delay).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        self.served.fetch_add(1, Ordering::SeqCst);
    }
}

/// `/slow` sleeps for `delay` while counted by `peak`; `/fast` answers at once.
pub fn slow_router(delay: Duration, peak: Arc<Peak>) -> Router {
    Router::new()
        .route(
            "/slow",
            get(move |State(peak): State<Arc<Peak>>| async move {
                peak.run(delay).await;
                "slow"
            }),
        )
        .route("/fast", get(|| async { "fast" }))
        .with_state(peak)
}

pub fn service_config(capacity: usize, hesitation_ms: u64) -> ServiceConfig {
    ServiceConfig {
        admission: AdmissionConfig {
            capacity,
            hesitation_ms,
        },
        ..ServiceConfig::default()
    }
}

/// Start `router` on an ephemeral local port.
pub async fn start_service(router: Router, config: &ServiceConfig) -> HttpService {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let service = HttpService::new(listener, router, config).unwrap();
    assert!(service.start());
    service
}

pub fn url(service: &HttpService, path: &str) -> String {
    format!("http://{}{}", service.local_addr(), path)
}

/// Poll `cond` until it holds or a second passes.
pub async fn eventually(mut cond: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(1), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
