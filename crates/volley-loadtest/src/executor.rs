//! Request executors
//!
//! The engine treats a request as an opaque, possibly slow, possibly failing
//! operation. [`HttpExecutor`] is the production implementation on top of
//! `reqwest`; tests plug in scripted executors.

use async_trait::async_trait;
use chrono::Utc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use volley_core::{HttpMethod, InvocationOutcome, RequestSpec, Result, VolleyError, WorkerId};

/// One HTTP round-trip.
#[async_trait]
pub trait RequestExecutor: Send + Sync {
    /// Perform the request described by `request` on behalf of `worker_id`.
    ///
    /// Returns `Ok(None)` when the request was refused before anything was
    /// sent (invalid URL). Transport failures and non-2xx responses are
    /// reported as an outcome with `succeeded == false`, not as `Err`.
    async fn execute(
        &self,
        request: &RequestSpec,
        worker_id: WorkerId,
        verbose: bool,
    ) -> Result<Option<InvocationOutcome>>;
}

/// Accepts absolute http and https URLs only
pub fn is_valid_url(url: &str) -> bool {
    match reqwest::Url::parse(url) {
        Ok(parsed) => matches!(parsed.scheme(), "http" | "https"),
        Err(_) => false,
    }
}

/// `reqwest`-backed executor. Cheap to share: the client pools connections.
#[derive(Clone, Debug)]
pub struct HttpExecutor {
    client: reqwest::Client,
}

impl HttpExecutor {
    /// Executor whose client gives up on a request after `request_timeout`
    pub fn new(request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| VolleyError::HttpClient(e.to_string()))?;
        Ok(Self { client })
    }

    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

fn to_reqwest_method(method: HttpMethod) -> reqwest::Method {
    match method {
        HttpMethod::Get => reqwest::Method::GET,
        HttpMethod::Post => reqwest::Method::POST,
        HttpMethod::Put => reqwest::Method::PUT,
        HttpMethod::Patch => reqwest::Method::PATCH,
        HttpMethod::Delete => reqwest::Method::DELETE,
        HttpMethod::Head => reqwest::Method::HEAD,
    }
}

#[async_trait]
impl RequestExecutor for HttpExecutor {
    async fn execute(
        &self,
        request: &RequestSpec,
        worker_id: WorkerId,
        verbose: bool,
    ) -> Result<Option<InvocationOutcome>> {
        let url = request.target_url();
        if !is_valid_url(&url) {
            debug!("Invalid URL: {}", url);
            return Ok(None);
        }

        let mut builder = self.client.request(to_reqwest_method(request.method), &url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.json_body() {
            builder = builder.json(&body);
        }

        let started_at = Utc::now();
        let start = Instant::now();

        let outcome = match builder.send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                let body = response.text().await.ok();
                let duration_ms = start.elapsed().as_millis() as u64;

                if verbose {
                    info!(
                        worker_id,
                        status,
                        duration_ms,
                        "API Response: {}",
                        body.as_deref().unwrap_or("null")
                    );
                }
                InvocationOutcome::completed(worker_id, request, status, body, started_at, duration_ms)
            }
            Err(e) => {
                let duration_ms = start.elapsed().as_millis() as u64;
                warn!("API call failed for {}: {}", url, e);
                InvocationOutcome::failed(worker_id, request, e.to_string(), started_at, duration_ms)
            }
        };

        Ok(Some(outcome))
    }
}
