//! OAuth2 session management
//!
//! One [`GoogleSession`] is constructed during run setup and injected into
//! both API clients. The persisted token file uses the same field names the
//! google-auth libraries write, so a token minted by the usual consent flow
//! tooling works as-is. There is no interactive flow here: a missing or
//! unrefreshable token is fatal to the run.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::ApiError;

/// Scopes required by the pipeline: read mail, send mail, manage Drive files.
pub const SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/gmail.readonly",
    "https://www.googleapis.com/auth/gmail.send",
    "https://www.googleapis.com/auth/drive",
];

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

/// Persisted OAuth2 token, compatible with google-auth's JSON layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleToken {
    /// Access token ("token" on disk; "access_token" accepted on read).
    #[serde(alias = "access_token")]
    pub token: String,
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    pub client_id: String,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
    /// ISO 8601 expiry time.
    #[serde(default)]
    pub expiry: Option<String>,
}

impl GoogleToken {
    /// Expired (or unknowable) within a 60 second skew window.
    pub fn is_expired(&self) -> bool {
        match &self.expiry {
            None => true,
            Some(expiry_str) => {
                match chrono::DateTime::parse_from_rfc3339(&expiry_str.replace('Z', "+00:00"))
                    .or_else(|_| chrono::DateTime::parse_from_rfc3339(expiry_str))
                {
                    Ok(expiry) => expiry <= chrono::Utc::now() + chrono::Duration::seconds(60),
                    Err(_) => true,
                }
            }
        }
    }
}

/// Default on-disk token location.
pub fn token_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_default()
        .join("monday-reports")
        .join("token.json")
}

/// An authenticated session shared by the Gmail and Drive clients.
///
/// Cheap to clone; the token is behind a mutex so a refresh triggered by one
/// client is visible to the other.
#[derive(Debug, Clone)]
pub struct GoogleSession {
    client: reqwest::Client,
    token: Arc<Mutex<GoogleToken>>,
    token_path: PathBuf,
}

impl GoogleSession {
    /// Establish the session from the persisted token, refreshing up front if
    /// it is already expired. Any failure here is fatal to the run.
    pub async fn establish() -> Result<GoogleSession, ApiError> {
        Self::establish_from(token_path()).await
    }

    pub async fn establish_from(path: PathBuf) -> Result<GoogleSession, ApiError> {
        if !path.exists() {
            return Err(ApiError::TokenNotFound(path));
        }
        let content = std::fs::read_to_string(&path)?;
        let token: GoogleToken = serde_json::from_str(&content)?;

        let session = GoogleSession {
            client: reqwest::Client::new(),
            token: Arc::new(Mutex::new(token)),
            token_path: path,
        };
        // Fail now, not mid-pipeline.
        session.access_token().await?;
        Ok(session)
    }

    /// Build a session from an in-memory token. Test seam; never refreshes.
    #[cfg(test)]
    pub fn for_tests(token: GoogleToken) -> GoogleSession {
        GoogleSession {
            client: reqwest::Client::new(),
            token: Arc::new(Mutex::new(token)),
            token_path: PathBuf::from("/dev/null"),
        }
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.client
    }

    /// A valid bearer token, refreshed through the token endpoint if needed.
    pub async fn access_token(&self) -> Result<String, ApiError> {
        let mut token = self.token.lock().await;
        if !token.is_expired() {
            return Ok(token.token.clone());
        }

        let refresh_token = token
            .refresh_token
            .clone()
            .ok_or(ApiError::AuthExpired)?;

        log::info!("Refreshing Google access token");
        let mut form = vec![
            ("client_id", token.client_id.clone()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token".to_string()),
        ];
        if let Some(secret) = &token.client_secret {
            form.push(("client_secret", secret.clone()));
        }

        let response = self
            .client
            .post(&token.token_uri)
            .form(&form)
            .send()
            .await?;
        let status = response.status();
        let body_text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            let lowered = body_text.to_lowercase();
            if (status.as_u16() == 400 || status.as_u16() == 401)
                && lowered.contains("invalid_grant")
            {
                return Err(ApiError::AuthExpired);
            }
            return Err(ApiError::RefreshFailed(format!(
                "HTTP {}: {}",
                status, body_text
            )));
        }

        let body: serde_json::Value = serde_json::from_str(&body_text)?;
        let access_token = body["access_token"]
            .as_str()
            .ok_or_else(|| ApiError::RefreshFailed("No access_token in response".into()))?;
        let expires_in = body["expires_in"].as_u64().unwrap_or(3600);
        let expiry = chrono::Utc::now() + chrono::Duration::seconds(expires_in as i64);

        token.token = access_token.to_string();
        token.expiry = Some(expiry.to_rfc3339());
        self.persist(&token)?;

        Ok(token.token.clone())
    }

    fn persist(&self, token: &GoogleToken) -> Result<(), ApiError> {
        if let Some(parent) = self.token_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.token_path, serde_json::to_string_pretty(token)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(expiry: Option<String>) -> GoogleToken {
        GoogleToken {
            token: "ya29.test".to_string(),
            refresh_token: Some("1//refresh".to_string()),
            token_uri: default_token_uri(),
            client_id: "client.apps.googleusercontent.com".to_string(),
            client_secret: None,
            scopes: SCOPES.iter().map(|s| s.to_string()).collect(),
            expiry,
        }
    }

    #[test]
    fn test_token_google_auth_compat() {
        let json = r#"{
            "token": "ya29.on-disk-token",
            "refresh_token": "1//on-disk-refresh",
            "token_uri": "https://oauth2.googleapis.com/token",
            "client_id": "client.apps.googleusercontent.com",
            "client_secret": "secret",
            "scopes": ["https://www.googleapis.com/auth/gmail.readonly"],
            "expiry": "2026-02-08T12:00:00.000000Z"
        }"#;
        let token: GoogleToken = serde_json::from_str(json).unwrap();
        assert_eq!(token.token, "ya29.on-disk-token");
        assert_eq!(token.client_secret.as_deref(), Some("secret"));
    }

    #[test]
    fn test_token_access_token_alias() {
        let json = r#"{
            "access_token": "ya29.alias",
            "client_id": "c"
        }"#;
        let token: GoogleToken = serde_json::from_str(json).unwrap();
        assert_eq!(token.token, "ya29.alias");
    }

    #[test]
    fn test_expiry_checks() {
        assert!(token(None).is_expired());
        let past = (chrono::Utc::now() - chrono::Duration::hours(1)).to_rfc3339();
        assert!(token(Some(past)).is_expired());
        let future = (chrono::Utc::now() + chrono::Duration::hours(1)).to_rfc3339();
        assert!(!token(Some(future)).is_expired());
    }

    #[tokio::test]
    async fn test_missing_token_file_is_fatal() {
        let err = GoogleSession::establish_from(PathBuf::from("/nonexistent/token.json"))
            .await
            .unwrap_err();
        assert!(err.is_fatal_auth());
    }

    #[tokio::test]
    async fn test_valid_token_used_without_refresh() {
        let future = (chrono::Utc::now() + chrono::Duration::hours(1)).to_rfc3339();
        let session = GoogleSession::for_tests(token(Some(future)));
        assert_eq!(session.access_token().await.unwrap(), "ya29.test");
    }
}
