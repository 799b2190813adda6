//! Google OAuth token plumbing: load a persisted token, refresh it when
//! expired, persist the refreshed copy.
//!
//! Token in, token out; there is no consent flow here. The token file is
//! compatible with what google-auth tooling writes (`token` holds the
//! access token; `access_token` is accepted as an alias on read).

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::mailbox::MailboxError;

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleToken {
    #[serde(alias = "access_token")]
    pub token: String,
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
    /// ISO 8601 expiry of the access token.
    #[serde(default)]
    pub expiry: Option<String>,
}

pub fn load_token(path: &Path) -> Result<GoogleToken, MailboxError> {
    if !path.exists() {
        return Err(MailboxError::TokenNotFound(path.to_path_buf()));
    }
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

pub fn save_token(path: &Path, token: &GoogleToken) -> Result<(), MailboxError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(token)?)?;
    Ok(())
}

/// Expired means within 60 seconds of (or past) the recorded expiry.
/// No expiry, or an unparsable one, counts as expired: refresh and see.
pub fn is_token_expired(token: &GoogleToken) -> bool {
    match &token.expiry {
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

/// Exchange the refresh token for a new access token and persist it.
pub async fn refresh_access_token(
    http: &reqwest::Client,
    token_path: &Path,
    token: &GoogleToken,
) -> Result<GoogleToken, MailboxError> {
    let refresh_token = token
        .refresh_token
        .as_deref()
        .ok_or(MailboxError::AuthExpired)?;

    let mut form = vec![
        ("client_id", token.client_id.as_str()),
        ("refresh_token", refresh_token),
        ("grant_type", "refresh_token"),
    ];
    if let Some(secret) = token.client_secret.as_deref() {
        form.push(("client_secret", secret));
    }

    let resp = http.post(&token.token_uri).form(&form).send().await?;
    let status = resp.status();
    let body_text = resp.text().await.unwrap_or_default();

    if !status.is_success() {
        let lowered = body_text.to_lowercase();
        if lowered.contains("invalid_grant") || lowered.contains("expired") {
            return Err(MailboxError::AuthExpired);
        }
        return Err(MailboxError::RefreshFailed(format!(
            "HTTP {}: {}",
            status, body_text
        )));
    }

    let body: serde_json::Value = serde_json::from_str(&body_text)?;
    let access_token = body["access_token"]
        .as_str()
        .ok_or_else(|| MailboxError::RefreshFailed("no access_token in response".to_string()))?;
    let expires_in = body["expires_in"].as_u64().unwrap_or(3600);
    let expiry = chrono::Utc::now() + chrono::Duration::seconds(expires_in as i64);

    let mut refreshed = token.clone();
    refreshed.token = access_token.to_string();
    refreshed.expiry = Some(expiry.to_rfc3339());

    save_token(token_path, &refreshed)?;
    Ok(refreshed)
}

/// Main entry point: a valid access token, refreshing and persisting
/// if the stored one is stale.
pub async fn get_valid_access_token(
    http: &reqwest::Client,
    config: &Config,
) -> Result<String, MailboxError> {
    let token = load_token(&config.google_token_path)?;
    if is_token_expired(&token) {
        log::info!("Google access token expired; refreshing");
        let refreshed = refresh_access_token(http, &config.google_token_path, &token).await?;
        Ok(refreshed.token)
    } else {
        Ok(token.token)
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
            client_id: "client".to_string(),
            client_secret: None,
            scopes: vec![],
            expiry,
        }
    }

    #[test]
    fn test_access_token_alias_accepted() {
        let json = r#"{"access_token": "ya29.alias", "refresh_token": "r", "client_id": "c"}"#;
        let parsed: GoogleToken = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.token, "ya29.alias");
    }

    #[test]
    fn test_no_expiry_counts_as_expired() {
        assert!(is_token_expired(&token(None)));
    }

    #[test]
    fn test_future_expiry_not_expired() {
        let future = (chrono::Utc::now() + chrono::Duration::hours(1)).to_rfc3339();
        assert!(!is_token_expired(&token(Some(future))));
    }

    #[test]
    fn test_past_and_garbage_expiry_expired() {
        let past = (chrono::Utc::now() - chrono::Duration::hours(1)).to_rfc3339();
        assert!(is_token_expired(&token(Some(past))));
        assert!(is_token_expired(&token(Some("soon".to_string()))));
    }

    #[test]
    fn test_token_roundtrip_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        save_token(&path, &token(Some("2026-08-06T00:00:00Z".to_string()))).unwrap();
        let loaded = load_token(&path).unwrap();
        assert_eq!(loaded.token, "ya29.test");
        assert_eq!(loaded.refresh_token.as_deref(), Some("1//refresh"));
    }

    #[test]
    fn test_missing_token_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.json");
        assert!(matches!(
            load_token(&missing),
            Err(MailboxError::TokenNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_refresh_persists_new_token() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .with_status(200)
            .with_body(r#"{"access_token": "ya29.fresh", "expires_in": 3600}"#)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        let mut stale = token(None);
        stale.token_uri = server.url();
        save_token(&path, &stale).unwrap();

        let http = reqwest::Client::new();
        let refreshed = refresh_access_token(&http, &path, &stale).await.unwrap();
        assert_eq!(refreshed.token, "ya29.fresh");
        assert!(!is_token_expired(&refreshed));

        let on_disk = load_token(&path).unwrap();
        assert_eq!(on_disk.token, "ya29.fresh");
    }
}
