//! Admission-controlled outbound HTTP client.

use reqwest::{Client, IntoUrl, Method, Request, Response};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

use crate::admission::{AdmissionControl, AdmissionError, DoneSignal};
use crate::config::ClientConfig;
use crate::pool::idle_capacity;

/// Errors from an outbound call.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Admission was refused, or the call panicked.
    #[error(transparent)]
    Admission(#[from] AdmissionError),

    /// The caller's signal fired while the request was in flight.
    #[error("request cancelled")]
    Cancelled,

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// An HTTP client bounding the number of concurrent outbound requests.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    admission: AdmissionControl,
}

impl HttpClient {
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let mut builder = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .tcp_keepalive(Duration::from_secs(config.tcp_keepalive_secs))
            // reqwest's own default when the gate gives no hint
            .pool_max_idle_per_host(idle_capacity(config.admission.capacity, usize::MAX));
        if config.timeout_secs > 0 {
            builder = builder.timeout(Duration::from_secs(config.timeout_secs));
        }

        Ok(Self {
            client: builder.build()?,
            admission: AdmissionControl::new("client", &config.admission),
        })
    }

    pub fn admission(&self) -> &AdmissionControl {
        &self.admission
    }

    /// Send `request` once a slot is free.
    ///
    /// The slot is held until response headers arrive. Reading the body
    /// happens outside admission.
    pub async fn execute(&self, cancel: Option<&DoneSignal>, request: Request) -> Result<Response, ClientError> {
        let method = request.method().clone();
        let url = request.url().clone();
        let client = self.client.clone();

        let res = self
            .admission
            .call(cancel, || async move {
                match cancel {
                    Some(signal) => tokio::select! {
                        biased;
                        _ = signal.wait() => Err(ClientError::Cancelled),
                        res = client.execute(request) => res.map_err(ClientError::Request),
                    },
                    None => client.execute(request).await.map_err(ClientError::Request),
                }
            })
            .await?;

        if let Err(e) = &res {
            tracing::debug!(method = %method, url = %url, error = %e, "Outbound request failed");
        }
        res
    }

    pub async fn get(&self, cancel: Option<&DoneSignal>, url: impl IntoUrl) -> Result<Response, ClientError> {
        let request = self.client.request(Method::GET, url).build()?;
        self.execute(cancel, request).await
    }

    pub async fn head(&self, cancel: Option<&DoneSignal>, url: impl IntoUrl) -> Result<Response, ClientError> {
        let request = self.client.request(Method::HEAD, url).build()?;
        self.execute(cancel, request).await
    }

    pub async fn post(
        &self,
        cancel: Option<&DoneSignal>,
        url: impl IntoUrl,
        content_type: &str,
        body: impl Into<reqwest::Body>,
    ) -> Result<Response, ClientError> {
        let request = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(body)
            .build()?;
        self.execute(cancel, request).await
    }

    /// POST `form` as `application/x-www-form-urlencoded`.
    pub async fn post_form<T: Serialize + ?Sized>(
        &self,
        cancel: Option<&DoneSignal>,
        url: impl IntoUrl,
        form: &T,
    ) -> Result<Response, ClientError> {
        let request = self.client.post(url).form(form).build()?;
        self.execute(cancel, request).await
    }

    /// Stop admitting calls and wait for in-flight ones.
    pub async fn close(&self) {
        self.admission.stop();
        self.admission.wait_drain().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn closed_client_refuses() {
        let client = HttpClient::new(&ClientConfig::default()).unwrap();
        client.close().await;
        let err = client.get(None, "http://127.0.0.1:9/").await.unwrap_err();
        assert!(matches!(err, ClientError::Admission(AdmissionError::Refused(_))));
    }

    #[tokio::test]
    async fn invalid_url_fails_before_admission() {
        let client = HttpClient::new(&ClientConfig::default()).unwrap();
        assert!(matches!(client.get(None, "not a url").await, Err(ClientError::Request(_))));
        assert_eq!(client.admission().in_flight(), 0);
    }
}
