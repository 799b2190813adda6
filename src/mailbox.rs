//! Mailbox collaborator: the `Mailbox` trait the orchestrator depends on,
//! and the Gmail API v1 implementation.
//!
//! Listing fetches message stubs then per-message metadata headers
//! (From, Subject, Date); body expansion requests `format=full` and walks
//! the MIME tree. An individual message that fails to fetch is logged and
//! skipped; it never fails the batch.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;

use crate::config::Config;
use crate::google_auth;
use crate::types::{EmailBody, EmailSummary};

const GMAIL_BASE_URL: &str = "https://gmail.googleapis.com/gmail/v1";

#[derive(Debug, Error)]
pub enum MailboxError {
    #[error("HTTP: {0}")]
    Http(#[from] reqwest::Error),
    #[error("token expired or revoked")]
    AuthExpired,
    #[error("token not found at {0}")]
    TokenNotFound(PathBuf),
    #[error("token refresh failed: {0}")]
    RefreshFailed(String),
    #[error("mailbox API error {status}: {message}")]
    ApiError { status: u16, message: String },
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Abstract mailbox the orchestrator talks to.
#[async_trait]
pub trait Mailbox: Send + Sync {
    /// Unread INBOX messages received at or after `since`.
    async fn list_summaries_since(
        &self,
        since: DateTime<Utc>,
        max_results: u32,
    ) -> Result<Vec<EmailSummary>, MailboxError>;

    /// INBOX messages (read and unread) in `[start, end)`.
    async fn list_summaries_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        max_results: u32,
    ) -> Result<Vec<EmailSummary>, MailboxError>;

    /// Full bodies for exactly the given message ids.
    async fn fetch_bodies(&self, message_ids: &[String]) -> Result<Vec<EmailBody>, MailboxError>;
}

// ============================================================================
// Retry plumbing
// ============================================================================

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            initial_backoff_ms: 250,
            max_backoff_ms: 2_000,
        }
    }
}

fn status_is_retryable(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::TOO_MANY_REQUESTS
        || status == reqwest::StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}

fn retry_delay(
    attempt: u32,
    policy: &RetryPolicy,
    retry_after: Option<&reqwest::header::HeaderValue>,
) -> Duration {
    if let Some(secs) = retry_after
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
    {
        return Duration::from_secs(secs.min(30));
    }
    let exponent = 2u64.saturating_pow(attempt.saturating_sub(1));
    let base = policy
        .initial_backoff_ms
        .saturating_mul(exponent)
        .min(policy.max_backoff_ms);
    Duration::from_millis(base)
}

async fn send_with_retry(
    request: reqwest::RequestBuilder,
    policy: &RetryPolicy,
) -> Result<reqwest::Response, MailboxError> {
    let attempts = policy.max_attempts.max(1);
    for attempt in 1..=attempts {
        let Some(cloned) = request.try_clone() else {
            return request.send().await.map_err(MailboxError::Http);
        };

        match cloned.send().await {
            Ok(response) => {
                let status = response.status();
                if status_is_retryable(status) && attempt < attempts {
                    let delay = retry_delay(
                        attempt,
                        policy,
                        response.headers().get(reqwest::header::RETRY_AFTER),
                    );
                    log::warn!(
                        "gmail retry {}/{} after status {} (sleep {:?})",
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
                        "gmail retry {}/{} after transport error: {} (sleep {:?})",
                        attempt,
                        attempts,
                        err,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
                return Err(MailboxError::Http(err));
            }
        }
    }
    Err(MailboxError::RefreshFailed(
        "request exhausted retries".to_string(),
    ))
}

// ============================================================================
// Gmail wire types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageListResponse {
    #[serde(default)]
    messages: Vec<MessageStub>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageStub {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageDetail {
    #[serde(default)]
    id: String,
    #[serde(default)]
    thread_id: String,
    #[serde(default)]
    snippet: String,
    #[serde(default)]
    payload: Option<MessagePayload>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct MessagePayload {
    #[serde(default)]
    mime_type: String,
    #[serde(default)]
    headers: Vec<Header>,
    #[serde(default)]
    body: Option<PayloadBody>,
    #[serde(default)]
    parts: Vec<MessagePayload>,
}

#[derive(Debug, Deserialize)]
struct Header {
    #[serde(default)]
    name: String,
    #[serde(default)]
    value: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PayloadBody {
    #[serde(default)]
    data: Option<String>,
}

// ============================================================================
// Header and body parsing
// ============================================================================

/// Split a From header like `"Alice Smith" <alice@example.org>` into
/// (display name, email). A bare address yields no name.
fn parse_from_header(from_value: &str) -> (Option<String>, String) {
    let trimmed = from_value.trim();
    if trimmed.is_empty() {
        return (None, String::new());
    }

    if let (Some(lt), Some(gt)) = (trimmed.find('<'), trimmed.rfind('>')) {
        if gt > lt {
            let email = trimmed[lt + 1..gt].trim().to_string();
            let name = trimmed[..lt].trim().trim_matches('"').trim();
            let name = if name.is_empty() {
                None
            } else {
                Some(name.to_string())
            };
            return (name, email);
        }
    }

    (None, trimmed.to_string())
}

/// RFC 2822 Date header to UTC; unparsable dates fall back to now so a
/// single odd header never drops a message.
fn parse_date_header(date_value: &str) -> DateTime<Utc> {
    if date_value.is_empty() {
        return Utc::now();
    }
    match DateTime::parse_from_rfc2822(date_value) {
        Ok(dt) => dt.with_timezone(&Utc),
        Err(_) => {
            log::warn!("unparsable Date header {:?}; using now", date_value);
            Utc::now()
        }
    }
}

fn decode_body_data(body: &Option<PayloadBody>) -> String {
    let Some(data) = body.as_ref().and_then(|b| b.data.as_deref()) else {
        return String::new();
    };
    match base64::engine::general_purpose::URL_SAFE_NO_PAD.decode(data) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(_) => {
            log::debug!("undecodable body data; skipping part");
            String::new()
        }
    }
}

/// Walk the MIME tree collecting plain-text and HTML bodies.
fn extract_bodies(payload: &MessagePayload) -> (String, Option<String>) {
    if payload.mime_type == "text/plain" {
        return (decode_body_data(&payload.body), None);
    }
    if payload.mime_type == "text/html" {
        return (String::new(), Some(decode_body_data(&payload.body)));
    }
    if payload.mime_type.starts_with("multipart/") {
        let mut text_chunks = Vec::new();
        let mut html_chunks = Vec::new();
        for part in &payload.parts {
            let (text, html) = extract_bodies(part);
            if !text.is_empty() {
                text_chunks.push(text);
            }
            if let Some(html) = html {
                if !html.is_empty() {
                    html_chunks.push(html);
                }
            }
        }
        let html = if html_chunks.is_empty() {
            None
        } else {
            Some(html_chunks.join("\n"))
        };
        return (text_chunks.join("\n"), html);
    }
    // Unknown leaf type: best effort.
    (decode_body_data(&payload.body), None)
}

fn build_since_query(since: DateTime<Utc>) -> String {
    format!("label:INBOX is:unread after:{}", since.timestamp())
}

fn build_between_query(start: DateTime<Utc>, end: DateTime<Utc>) -> String {
    format!(
        "label:INBOX after:{} before:{}",
        start.timestamp(),
        end.timestamp()
    )
}

// ============================================================================
// Gmail client
// ============================================================================

pub struct GmailClient {
    http: reqwest::Client,
    access_token: String,
    base_url: String,
    retry: RetryPolicy,
}

impl GmailClient {
    /// Load (and if needed refresh) the stored token, then build a client.
    pub async fn connect(config: &Config) -> Result<Self, MailboxError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        let access_token = google_auth::get_valid_access_token(&http, config).await?;
        Ok(GmailClient {
            http,
            access_token,
            base_url: GMAIL_BASE_URL.to_string(),
            retry: RetryPolicy::default(),
        })
    }

    #[cfg(test)]
    fn with_base_url(base_url: String) -> Self {
        GmailClient {
            http: reqwest::Client::new(),
            access_token: "test-token".to_string(),
            base_url,
            retry: RetryPolicy {
                max_attempts: 1,
                ..RetryPolicy::default()
            },
        }
    }

    async fn list_message_ids(
        &self,
        query: &str,
        max_results: u32,
    ) -> Result<Vec<String>, MailboxError> {
        let url = format!("{}/users/me/messages", self.base_url);
        let resp = send_with_retry(
            self.http
                .get(&url)
                .bearer_auth(&self.access_token)
                .query(&[("q", query), ("maxResults", &max_results.to_string())]),
            &self.retry,
        )
        .await?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(MailboxError::AuthExpired);
        }
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(MailboxError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        let list: MessageListResponse = resp.json().await?;
        Ok(list.messages.into_iter().map(|m| m.id).collect())
    }

    async fn fetch_summary(&self, message_id: &str) -> Result<EmailSummary, MailboxError> {
        let url = format!("{}/users/me/messages/{}", self.base_url, message_id);
        let resp = send_with_retry(
            self.http
                .get(&url)
                .bearer_auth(&self.access_token)
                .query(&[
                    ("format", "metadata"),
                    ("metadataHeaders", "From"),
                    ("metadataHeaders", "Subject"),
                    ("metadataHeaders", "Date"),
                ]),
            &self.retry,
        )
        .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let message = resp.text().await.unwrap_or_default();
            return Err(MailboxError::ApiError { status, message });
        }

        let detail: MessageDetail = resp.json().await?;
        let headers = detail
            .payload
            .as_ref()
            .map(|p| &p.headers[..])
            .unwrap_or(&[]);

        let get_header = |name: &str| -> String {
            headers
                .iter()
                .find(|h| h.name.eq_ignore_ascii_case(name))
                .map(|h| h.value.clone())
                .unwrap_or_default()
        };

        let (sender_name, sender_email) = parse_from_header(&get_header("From"));
        let subject = {
            let s = get_header("Subject");
            if s.is_empty() {
                "(no subject)".to_string()
            } else {
                s
            }
        };

        let thread_id = if detail.thread_id.is_empty() {
            detail.id.clone()
        } else {
            detail.thread_id
        };

        Ok(EmailSummary {
            id: detail.id,
            thread_id,
            sender_name,
            sender_email,
            received_at: parse_date_header(&get_header("Date")),
            subject,
            snippet: if detail.snippet.is_empty() {
                None
            } else {
                Some(detail.snippet)
            },
        })
    }

    async fn list_summaries(
        &self,
        query: &str,
        max_results: u32,
    ) -> Result<Vec<EmailSummary>, MailboxError> {
        log::info!("Listing messages with query={:?} max={}", query, max_results);
        let ids = self.list_message_ids(query, max_results).await?;

        let mut summaries = Vec::with_capacity(ids.len());
        for id in &ids {
            match self.fetch_summary(id).await {
                Ok(summary) => summaries.push(summary),
                Err(e) => {
                    log::warn!("skipping message {}: {}", id, e);
                    continue;
                }
            }
        }
        Ok(summaries)
    }
}

#[async_trait]
impl Mailbox for GmailClient {
    async fn list_summaries_since(
        &self,
        since: DateTime<Utc>,
        max_results: u32,
    ) -> Result<Vec<EmailSummary>, MailboxError> {
        self.list_summaries(&build_since_query(since), max_results)
            .await
    }

    async fn list_summaries_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        max_results: u32,
    ) -> Result<Vec<EmailSummary>, MailboxError> {
        self.list_summaries(&build_between_query(start, end), max_results)
            .await
    }

    async fn fetch_bodies(&self, message_ids: &[String]) -> Result<Vec<EmailBody>, MailboxError> {
        let mut bodies = Vec::with_capacity(message_ids.len());

        for id in message_ids {
            let url = format!("{}/users/me/messages/{}", self.base_url, id);
            let resp = match send_with_retry(
                self.http
                    .get(&url)
                    .bearer_auth(&self.access_token)
                    .query(&[("format", "full")]),
                &self.retry,
            )
            .await
            {
                Ok(resp) if resp.status().is_success() => resp,
                Ok(resp) => {
                    log::warn!("skipping body fetch for {}: HTTP {}", id, resp.status());
                    continue;
                }
                Err(e) => {
                    log::warn!("skipping body fetch for {}: {}", id, e);
                    continue;
                }
            };

            let detail: MessageDetail = match resp.json().await {
                Ok(detail) => detail,
                Err(e) => {
                    log::warn!("skipping undecodable message {}: {}", id, e);
                    continue;
                }
            };

            let (body_text, body_html) = detail
                .payload
                .as_ref()
                .map(extract_bodies)
                .unwrap_or_default();

            let thread_id = if detail.thread_id.is_empty() {
                id.clone()
            } else {
                detail.thread_id
            };

            bodies.push(EmailBody {
                id: id.clone(),
                thread_id,
                body_text,
                body_html,
            });
        }

        Ok(bodies)
    }
}

// ============================================================================
// Tests
// ============================================================================
