//! Failure paths: panics, cancellation and exhausted gates.

use axum::{routing::get, Router};
use reqwest::StatusCode;
use std::sync::Arc;
use std::time::Duration;

use svckit::admission::{AdmissionError, DoneSignal, Refusal};
use svckit::config::{AdmissionConfig, ClientConfig};
use svckit::http::{ClientError, HttpClient};

mod common;
use common::{eventually, service_config, slow_router, start_service, url, Peak};

fn client(capacity: usize, hesitation_ms: u64) -> HttpClient {
    HttpClient::new(&ClientConfig {
        admission: AdmissionConfig {
            capacity,
            hesitation_ms,
        },
        ..ClientConfig::default()
    })
    .unwrap()
}

#[tokio::test]
async fn handler_panic_answers_500_and_frees_the_slot() {
    let router = Router::new().route(
        "/boom",
        get(|| async {
            if true {
                panic!("injected failure");
            }
            "unreachable"
        }),
    );
    let svc = start_service(router, &service_config(1, 50)).await;

    for _ in 0..3 {
        let resp = reqwest::get(url(&svc, "/boom")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
    assert_eq!(svc.admission().held(), 0);
    assert!(!svc.is_stopped());
}

#[tokio::test]
async fn client_call_cancelled_mid_flight() {
    let peak = Arc::new(Peak::default());
    let svc = start_service(slow_router(Duration::from_secs(5), peak), &service_config(0, 0)).await;
    let client = client(2, 0);

    let cancel = DoneSignal::new();
    cancel.fire_after(Duration::from_millis(50));
    let err = client.get(Some(&cancel), url(&svc, "/slow")).await.unwrap_err();
    assert!(matches!(err, ClientError::Cancelled));
    assert_eq!(client.admission().held(), 0);

    // The fired signal now refuses before a slot is taken.
    let err = client.get(Some(&cancel), url(&svc, "/fast")).await.unwrap_err();
    assert!(matches!(
        err,
        ClientError::Admission(AdmissionError::Refused(Refusal::Cancelled))
    ));
}

#[tokio::test]
async fn client_gate_times_out_when_full() {
    let peak = Arc::new(Peak::default());
    let svc = start_service(
        slow_router(Duration::from_millis(300), peak),
        &service_config(0, 0),
    )
    .await;
    let client = client(1, 30);

    let first = {
        let client = client.clone();
        let target = url(&svc, "/slow");
        tokio::spawn(async move { client.get(None, target).await })
    };
    eventually(|| client.admission().held() == 1).await;

    let err = client.get(None, url(&svc, "/fast")).await.unwrap_err();
    assert!(matches!(
        err,
        ClientError::Admission(AdmissionError::Refused(Refusal::TimedOut))
    ));

    assert_eq!(first.await.unwrap().unwrap().status(), StatusCode::OK);
    assert_eq!(client.get(None, url(&svc, "/fast")).await.unwrap().status(), StatusCode::OK);
}

#[tokio::test]
async fn client_close_waits_for_in_flight_calls() {
    let peak = Arc::new(Peak::default());
    let svc = start_service(
        slow_router(Duration::from_millis(150), peak.clone()),
        &service_config(0, 0),
    )
    .await;
    let client = client(4, 0);

    let call = {
        let client = client.clone();
        let target = url(&svc, "/slow");
        tokio::spawn(async move { client.get(None, target).await })
    };
    eventually(|| client.admission().in_flight() == 1).await;

    client.close().await;
    assert_eq!(peak.served(), 1);
    assert!(call.await.unwrap().is_ok());
    assert!(client.get(None, url(&svc, "/fast")).await.is_err());
}
