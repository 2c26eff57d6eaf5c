use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::Deserialize;

use crate::config::{normalize_base_url, ClientConfig};
use crate::error::TransportError;
use crate::types::{JobParameters, JobStatus, ResultRecord, SubmissionAck};

/// The two calls the job service offers.
///
/// [`ScrapeClient`] is the HTTP implementation; tests substitute scripted
/// transports. Implementations must resolve every failure to a
/// [`TransportError`] and never touch shared job state.
pub trait JobTransport: Send + Sync {
    /// Ask the service to start a job. Issued once, never retried.
    fn submit_job(
        &self,
        params: &JobParameters,
    ) -> impl Future<Output = Result<SubmissionAck, TransportError>> + Send;

    /// Fetch the current job snapshot.
    fn fetch_status(&self) -> impl Future<Output = Result<JobStatus, TransportError>> + Send;
}

/// Async HTTP client for the scraper job service.
///
/// # Example
/// ```no_run
/// use scrape_job_client::{JobTransport, ScrapeClient};
///
/// # async fn example() -> Result<(), scrape_job_client::TransportError> {
/// let client = ScrapeClient::new("http://localhost:5000");
/// let status = client.fetch_status().await?;
/// println!("{}% {}", status.progress_percent, status.headline());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ScrapeClient {
    http: Client,
    endpoint: String,
    timeout: Duration,
}

impl ScrapeClient {
    /// Create a new client pointing at the given service base URL.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            endpoint: normalize_base_url(endpoint),
            timeout: ClientConfig::default().request_timeout,
        }
    }

    /// Create a client using the base URL and timeout from `config`.
    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.base_url.clone()).with_timeout(config.request_timeout)
    }

    /// Use a custom `reqwest::Client` (for connection pooling, proxies, TLS).
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http = client;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns the configured endpoint URL.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn unreachable(&self, context: &str, err: reqwest::Error) -> TransportError {
        let reason = if err.is_timeout() {
            "request timed out".to_string()
        } else {
            err.to_string()
        };
        TransportError::unreachable(format!(
            "{context} at {} (is the service running?): {reason}",
            self.endpoint
        ))
    }
}

impl JobTransport for ScrapeClient {
    async fn submit_job(&self, params: &JobParameters) -> Result<SubmissionAck, TransportError> {
        let url = format!("{}/api/scrape", self.endpoint);
        let resp = self
            .http
            .post(&url)
            .timeout(self.timeout)
            .json(params)
            .send()
            .await
            .map_err(|e| self.unreachable("Cannot submit scrape job", e))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| self.unreachable("Failed to read /api/scrape response", e))?;

        if !status.is_success() {
            return Err(TransportError::rejected(
                status.as_u16(),
                rejection_detail(status, &text),
            ));
        }

        serde_json::from_str(&text)
            .map_err(|e| TransportError::malformed(format!("Invalid /api/scrape response: {e}")))
    }

    async fn fetch_status(&self) -> Result<JobStatus, TransportError> {
        let url = format!("{}/api/status", self.endpoint);
        let resp = self
            .http
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.unreachable("Cannot fetch job status", e))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| self.unreachable("Failed to read /api/status response", e))?;

        if !status.is_success() {
            return Err(TransportError::rejected(
                status.as_u16(),
                rejection_detail(status, &text),
            ));
        }

        parse_status(&text)
    }
}

/// Build the most useful description of a non-success response.
///
/// The service reports failures as `{"error": "..."}`; fall back to the raw
/// body, then to the status line.
fn rejection_detail(status: StatusCode, body: &str) -> String {
    let status_line = match status.canonical_reason() {
        Some(reason) => format!("HTTP {} {}", status.as_u16(), reason),
        None => format!("HTTP {}", status.as_u16()),
    };

    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|json| json.get("error").and_then(|e| e.as_str()).map(String::from))
        .or_else(|| {
            let trimmed = body.trim();
            (!trimmed.is_empty()).then(|| trimmed.chars().take(200).collect())
        });

    match message {
        Some(msg) => format!("{status_line}: {msg}"),
        None => status_line,
    }
}

#[derive(Deserialize)]
struct StatusBody {
    is_running: bool,
    #[serde(default)]
    progress: Option<f64>,
    #[serde(default)]
    status_message: Option<String>,
    #[serde(default)]
    results: Option<Vec<RecordBody>>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct RecordBody {
    code: CodeBody,
    #[serde(default)]
    price: Option<f64>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CodeBody {
    Text(String),
    Number(serde_json::Number),
}

impl CodeBody {
    fn into_string(self) -> String {
        match self {
            CodeBody::Text(s) => s.trim().to_string(),
            CodeBody::Number(n) => n.to_string(),
        }
    }
}

pub(crate) fn parse_status(text: &str) -> Result<JobStatus, TransportError> {
    if text.trim().is_empty() {
        return Err(TransportError::malformed("empty response body from /api/status"));
    }
    let body: StatusBody = serde_json::from_str(text)
        .map_err(|e| TransportError::malformed(format!("Invalid /api/status response: {e}")))?;
    Ok(reconcile(body))
}

/// Turn a loosely-typed status body into a snapshot that upholds the
/// `JobStatus` invariants.
fn reconcile(body: StatusBody) -> JobStatus {
    let progress_percent = match body.progress {
        Some(p) if p.is_finite() => {
            if !(0.0..=100.0).contains(&p) {
                tracing::warn!(progress = p, "Status progress out of range, clamping");
            }
            p.round().clamp(0.0, 100.0) as u8
        }
        Some(p) => {
            tracing::warn!(progress = p, "Status progress is not finite, using 0");
            0
        }
        None => 0,
    };

    let mut seen = HashSet::new();
    let mut results = Vec::new();
    for record in body.results.unwrap_or_default() {
        let code = record.code.into_string();
        let price = match record.price {
            Some(p) if p.is_finite() && p >= 0.0 => p,
            other => {
                tracing::warn!(%code, price = ?other, "Dropping result with invalid price");
                continue;
            }
        };
        if code.is_empty() {
            tracing::warn!("Dropping result with empty code");
            continue;
        }
        if !seen.insert(code.clone()) {
            tracing::warn!(%code, "Dropping duplicate result code");
            continue;
        }
        results.push(ResultRecord { code, price });
    }

    let error = body
        .error
        .map(|e| e.trim().to_string())
        .filter(|e| !e.is_empty());

    JobStatus {
        is_running: body.is_running,
        progress_percent,
        status_message: body.status_message.unwrap_or_default(),
        results,
        error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportErrorKind;

    #[test]
    fn test_client_builder() {
        let client = ScrapeClient::new("http://127.0.0.1:5000/")
            .with_timeout(Duration::from_secs(3));
        assert_eq!(client.endpoint(), "http://127.0.0.1:5000");
        assert_eq!(client.timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_client_from_config() {
        let config = ClientConfig::builder()
            .with_base_url("https://jobs.example.com/")
            .with_request_timeout(Duration::from_secs(7))
            .build();
        let client = ScrapeClient::from_config(&config);
        assert_eq!(client.endpoint(), "https://jobs.example.com");
        assert_eq!(client.timeout, Duration::from_secs(7));
    }

    #[test]
    fn test_parse_full_status() {
        let status = parse_status(
            r#"{
            "is_running": true,
            "progress": 55,
            "status_message": "Fetching prices (55/100)",
            "results": [
                {"code": "7203", "price": 1500.0},
                {"code": "9984", "price": 3000}
            ],
            "error": null
        }"#,
        )
        .unwrap();

        assert!(status.is_running);
        assert_eq!(status.progress_percent, 55);
        assert_eq!(status.status_message, "Fetching prices (55/100)");
        assert_eq!(status.results.len(), 2);
        assert_eq!(status.results[1], ResultRecord::new("9984", 3000.0));
        assert_eq!(status.error, None);
    }

    #[test]
    fn test_parse_partial_status() {
        let status = parse_status(r#"{"is_running": false}"#).unwrap();
        assert!(!status.is_running);
        assert_eq!(status.progress_percent, 0);
        assert!(status.results.is_empty());
        assert!(status.error.is_none());
    }

    #[test]
    fn test_empty_body_is_malformed() {
        let err = parse_status("  \n").unwrap_err();
        assert_eq!(err.kind, TransportErrorKind::MalformedResponse);
        assert!(err.detail.contains("empty"));
    }

    #[test]
    fn test_invalid_json_is_malformed() {
        let err = parse_status("<html>502 Bad Gateway</html>").unwrap_err();
        assert_eq!(err.kind, TransportErrorKind::MalformedResponse);

        // is_running is the one field a snapshot cannot do without
        let err = parse_status(r#"{"progress": 10}"#).unwrap_err();
        assert_eq!(err.kind, TransportErrorKind::MalformedResponse);
    }

    #[test]
    fn test_progress_is_clamped() {
        let status = parse_status(r#"{"is_running": true, "progress": 140}"#).unwrap();
        assert_eq!(status.progress_percent, 100);
        let status = parse_status(r#"{"is_running": true, "progress": -3}"#).unwrap();
        assert_eq!(status.progress_percent, 0);
        let status = parse_status(r#"{"is_running": true, "progress": 33.6}"#).unwrap();
        assert_eq!(status.progress_percent, 34);
    }

    #[test]
    fn test_blank_error_is_no_error() {
        let status = parse_status(r#"{"is_running": false, "error": "   "}"#).unwrap();
        assert!(status.error.is_none());
        let status = parse_status(r#"{"is_running": false, "error": "blocked by upstream"}"#).unwrap();
        assert_eq!(status.error.as_deref(), Some("blocked by upstream"));
    }

    #[test]
    fn test_results_are_reconciled() {
        let status = parse_status(
            r#"{
            "is_running": false,
            "results": [
                {"code": "1301", "price": 2500},
                {"code": 1332, "price": 800.5},
                {"code": "1301", "price": 9999},
                {"code": "1333", "price": -1},
                {"code": "1334", "price": null},
                {"code": "", "price": 10}
            ]
        }"#,
        )
        .unwrap();

        assert_eq!(
            status.results,
            vec![
                ResultRecord::new("1301", 2500.0),
                ResultRecord::new("1332", 800.5),
            ]
        );
    }

    #[test]
    fn test_rejection_detail_prefers_error_field() {
        let detail = rejection_detail(
            StatusCode::BAD_REQUEST,
            r#"{"error": "scrape already running"}"#,
        );
        assert_eq!(detail, "HTTP 400 Bad Request: scrape already running");

        let detail = rejection_detail(StatusCode::BAD_GATEWAY, "upstream down");
        assert_eq!(detail, "HTTP 502 Bad Gateway: upstream down");

        let detail = rejection_detail(StatusCode::INTERNAL_SERVER_ERROR, "");
        assert_eq!(detail, "HTTP 500 Internal Server Error");
    }
}
