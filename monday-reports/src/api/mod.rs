//! Google API plumbing shared by the Gmail and Drive clients
//!
//! Direct HTTP via reqwest against the v1/v3 REST endpoints. The mailbox and
//! remote-storage surfaces the pipeline actually touches are narrowed to the
//! [`MailSource`] and [`RemoteStore`] traits so the runner, fetcher, and
//! upload reconciler can be exercised against in-memory fakes.

pub mod auth;
pub mod drive;
pub mod gmail;

pub use auth::GoogleSession;
pub use drive::DriveClient;
pub use gmail::GmailClient;

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;

/// Errors from session management and raw API calls.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("HTTP: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Token expired or revoked")]
    AuthExpired,
    #[error("Token not found at {0}")]
    TokenNotFound(PathBuf),
    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl ApiError {
    /// True when the whole run should stop rather than skip-and-continue.
    pub fn is_fatal_auth(&self) -> bool {
        matches!(
            self,
            ApiError::AuthExpired | ApiError::TokenNotFound(_) | ApiError::RefreshFailed(_)
        )
    }
}

/// One MIME part of a fetched message.
#[derive(Debug, Clone, Default)]
pub struct MessagePart {
    pub filename: String,
    pub mime_type: String,
    pub attachment_id: Option<String>,
}

/// A fetched message, reduced to what attachment discovery needs.
#[derive(Debug, Clone)]
pub struct MessageDetail {
    pub id: String,
    pub parts: Vec<MessagePart>,
}

/// A remote object found by name.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteFile {
    pub id: String,
    pub name: String,
}

/// Authenticated mailbox operations used by the fetcher and delivery layer.
#[async_trait]
pub trait MailSource: Send + Sync {
    /// Search messages; returns message ids in source order.
    async fn search(&self, query: &str) -> Result<Vec<String>, ApiError>;
    async fn get_message(&self, id: &str) -> Result<MessageDetail, ApiError>;
    async fn fetch_attachment(
        &self,
        message_id: &str,
        attachment_id: &str,
    ) -> Result<Vec<u8>, ApiError>;
    async fn send_message(
        &self,
        to: &[String],
        subject: &str,
        body: &str,
        attachments: &[PathBuf],
    ) -> Result<(), ApiError>;
}

/// Remote storage operations used by the upload reconciler.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Exact-name lookup inside a folder, trashed objects excluded.
    async fn find_by_name(&self, parent_id: &str, name: &str)
    -> Result<Option<RemoteFile>, ApiError>;
    async fn create_folder(&self, parent_id: &str, name: &str) -> Result<String, ApiError>;
    async fn create_file(
        &self,
        parent_id: &str,
        name: &str,
        local_path: &Path,
    ) -> Result<String, ApiError>;
    async fn update_file(&self, file_id: &str, local_path: &Path) -> Result<String, ApiError>;
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 250,
            max_backoff_ms: 2_000,
        }
    }
}

fn is_retryable_status(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::TOO_MANY_REQUESTS
        || status == reqwest::StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}

fn retry_delay(
    attempt: u32,
    policy: &RetryPolicy,
    retry_after: Option<&reqwest::header::HeaderValue>,
) -> Duration {
    if let Some(value) = retry_after.and_then(|v| v.to_str().ok()) {
        if let Ok(secs) = value.parse::<u64>() {
            return Duration::from_secs(secs.min(30));
        }
    }
    let exponent = 2u64.saturating_pow(attempt.saturating_sub(1));
    let base = policy
        .initial_backoff_ms
        .saturating_mul(exponent)
        .min(policy.max_backoff_ms);
    Duration::from_millis(base)
}

/// Send a request, retrying 429/408/5xx and transport errors with bounded
/// exponential backoff. Non-cloneable bodies fall through to a single send.
pub async fn send_with_retry(
    request: reqwest::RequestBuilder,
    policy: &RetryPolicy,
) -> Result<reqwest::Response, ApiError> {
    let attempts = policy.max_attempts.max(1);
    for attempt in 1..=attempts {
        let Some(cloned) = request.try_clone() else {
            return request.send().await.map_err(ApiError::Http);
        };

        match cloned.send().await {
            Ok(response) => {
                let status = response.status();
                if is_retryable_status(status) && attempt < attempts {
                    let delay = retry_delay(
                        attempt,
                        policy,
                        response.headers().get(reqwest::header::RETRY_AFTER),
                    );
                    log::warn!(
                        "retry {}/{} after status {} (sleep {:?})",
                        attempt,
                        attempts,
                        status,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
                return Ok(response);
            }
            Err(err) => {
                if (err.is_timeout() || err.is_connect()) && attempt < attempts {
                    let delay = retry_delay(attempt, policy, None);
                    log::warn!(
                        "retry {}/{} after transport error: {} (sleep {:?})",
                        attempt,
                        attempts,
                        err,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
                return Err(ApiError::Http(err));
            }
        }
    }

    Err(ApiError::RefreshFailed("request exhausted retries".into()))
}

/// Turn a failed response into an [`ApiError`], mapping 401 to `AuthExpired`.
pub(crate) async fn error_for_response(response: reqwest::Response) -> ApiError {
    let status = response.status();
    if status == reqwest::StatusCode::UNAUTHORIZED {
        return ApiError::AuthExpired;
    }
    let message = response.text().await.unwrap_or_default();
    ApiError::Api {
        status: status.as_u16(),
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_delay_backoff_is_bounded() {
        let policy = RetryPolicy::default();
        assert_eq!(retry_delay(1, &policy, None), Duration::from_millis(250));
        assert_eq!(retry_delay(2, &policy, None), Duration::from_millis(500));
        assert_eq!(retry_delay(10, &policy, None), Duration::from_millis(2_000));
    }

    #[test]
    fn test_retry_delay_honors_retry_after() {
        let policy = RetryPolicy::default();
        let header = reqwest::header::HeaderValue::from_static("7");
        assert_eq!(
            retry_delay(1, &policy, Some(&header)),
            Duration::from_secs(7)
        );
        // Capped at 30 seconds.
        let header = reqwest::header::HeaderValue::from_static("600");
        assert_eq!(
            retry_delay(1, &policy, Some(&header)),
            Duration::from_secs(30)
        );
    }

    #[test]
    fn test_retryable_statuses() {
        assert!(is_retryable_status(reqwest::StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable_status(
            reqwest::StatusCode::INTERNAL_SERVER_ERROR
        ));
        assert!(!is_retryable_status(reqwest::StatusCode::NOT_FOUND));
        assert!(!is_retryable_status(reqwest::StatusCode::UNAUTHORIZED));
    }

    #[test]
    fn test_fatal_auth_classification() {
        assert!(ApiError::AuthExpired.is_fatal_auth());
        assert!(ApiError::RefreshFailed("x".into()).is_fatal_auth());
        assert!(
            !ApiError::Api {
                status: 500,
                message: String::new()
            }
            .is_fatal_auth()
        );
    }
}
