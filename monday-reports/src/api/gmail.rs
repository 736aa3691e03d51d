//! Gmail API v1 client
//!
//! Covers the three mailbox operations the pipeline needs: subject search,
//! attachment download, and sending the delivery email. Outbound messages
//! are assembled as RFC 2822 multipart/mixed and posted through
//! `messages/send` as a URL-safe base64 `raw` payload.

use std::path::PathBuf;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use serde::Deserialize;

use super::{
    ApiError, GoogleSession, MailSource, MessageDetail, MessagePart, RetryPolicy,
    error_for_response, send_with_retry,
};

const GMAIL_BASE: &str = "https://gmail.googleapis.com/gmail/v1/users/me";

#[derive(Debug, Deserialize)]
struct MessageListResponse {
    #[serde(default)]
    messages: Vec<MessageStub>,
}

#[derive(Debug, Deserialize)]
struct MessageStub {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageResponse {
    #[serde(default)]
    id: String,
    #[serde(default)]
    payload: Option<Payload>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Payload {
    #[serde(default)]
    parts: Vec<PayloadPart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PayloadPart {
    #[serde(default)]
    filename: String,
    #[serde(default)]
    mime_type: String,
    #[serde(default)]
    body: Option<PartBody>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PartBody {
    #[serde(default)]
    attachment_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AttachmentResponse {
    data: String,
}

/// Gmail-backed [`MailSource`].
#[derive(Debug, Clone)]
pub struct GmailClient {
    session: GoogleSession,
    retry: RetryPolicy,
}

impl GmailClient {
    pub fn new(session: GoogleSession) -> GmailClient {
        GmailClient {
            session,
            retry: RetryPolicy::default(),
        }
    }
}

#[async_trait]
impl MailSource for GmailClient {
    async fn search(&self, query: &str) -> Result<Vec<String>, ApiError> {
        let token = self.session.access_token().await?;
        let response = send_with_retry(
            self.session
                .http()
                .get(format!("{}/messages", GMAIL_BASE))
                .bearer_auth(&token)
                .query(&[("q", query)]),
            &self.retry,
        )
        .await?;

        if !response.status().is_success() {
            return Err(error_for_response(response).await);
        }
        let list: MessageListResponse = response.json().await?;
        Ok(list.messages.into_iter().map(|m| m.id).collect())
    }

    async fn get_message(&self, id: &str) -> Result<MessageDetail, ApiError> {
        let token = self.session.access_token().await?;
        let response = send_with_retry(
            self.session
                .http()
                .get(format!("{}/messages/{}", GMAIL_BASE, id))
                .bearer_auth(&token)
                .query(&[("format", "full")]),
            &self.retry,
        )
        .await?;

        if !response.status().is_success() {
            return Err(error_for_response(response).await);
        }
        let message: MessageResponse = response.json().await?;
        Ok(MessageDetail {
            id: message.id,
            parts: message
                .payload
                .map(|p| p.parts)
                .unwrap_or_default()
                .into_iter()
                .map(|part| MessagePart {
                    filename: part.filename,
                    mime_type: part.mime_type,
                    attachment_id: part.body.and_then(|b| b.attachment_id),
                })
                .collect(),
        })
    }

    async fn fetch_attachment(
        &self,
        message_id: &str,
        attachment_id: &str,
    ) -> Result<Vec<u8>, ApiError> {
        let token = self.session.access_token().await?;
        let response = send_with_retry(
            self.session
                .http()
                .get(format!(
                    "{}/messages/{}/attachments/{}",
                    GMAIL_BASE, message_id, attachment_id
                ))
                .bearer_auth(&token),
            &self.retry,
        )
        .await?;

        if !response.status().is_success() {
            return Err(error_for_response(response).await);
        }
        let attachment: AttachmentResponse = response.json().await?;
        URL_SAFE_NO_PAD
            .decode(attachment.data.trim_end_matches('='))
            .map_err(|e| ApiError::Api {
                status: 0,
                message: format!("Invalid attachment encoding: {}", e),
            })
    }

    async fn send_message(
        &self,
        to: &[String],
        subject: &str,
        body: &str,
        attachments: &[PathBuf],
    ) -> Result<(), ApiError> {
        let mime = build_mime_message(to, subject, body, attachments)?;
        let raw = URL_SAFE_NO_PAD.encode(mime.as_bytes());

        let token = self.session.access_token().await?;
        let response = send_with_retry(
            self.session
                .http()
                .post(format!("{}/messages/send", GMAIL_BASE))
                .bearer_auth(&token)
                .json(&serde_json::json!({ "raw": raw })),
            &self.retry,
        )
        .await?;

        if !response.status().is_success() {
            return Err(error_for_response(response).await);
        }
        Ok(())
    }
}

/// Assemble a multipart/mixed RFC 2822 message with file attachments.
fn build_mime_message(
    to: &[String],
    subject: &str,
    body: &str,
    attachments: &[PathBuf],
) -> Result<String, ApiError> {
    let boundary = format!("monday_reports_{}", uuid::Uuid::new_v4().simple());
    let mut message = String::new();

    message.push_str(&format!("To: {}\r\n", to.join(", ")));
    message.push_str(&format!("Subject: {}\r\n", subject));
    message.push_str("MIME-Version: 1.0\r\n");
    message.push_str(&format!(
        "Content-Type: multipart/mixed; boundary=\"{}\"\r\n\r\n",
        boundary
    ));

    message.push_str(&format!("--{}\r\n", boundary));
    message.push_str("Content-Type: text/plain; charset=\"utf-8\"\r\n\r\n");
    message.push_str(body);
    message.push_str("\r\n");

    for path in attachments {
        let bytes = std::fs::read(path)?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "attachment".to_string());

        message.push_str(&format!("--{}\r\n", boundary));
        message.push_str("Content-Type: application/octet-stream\r\n");
        message.push_str("Content-Transfer-Encoding: base64\r\n");
        message.push_str(&format!(
            "Content-Disposition: attachment; filename=\"{}\"\r\n\r\n",
            filename
        ));
        message.push_str(&wrap_base64(&STANDARD.encode(&bytes)));
        message.push_str("\r\n");
    }

    message.push_str(&format!("--{}--\r\n", boundary));
    Ok(message)
}

/// Hard-wrap a base64 string at the RFC 2045 line limit.
fn wrap_base64(encoded: &str) -> String {
    encoded
        .as_bytes()
        .chunks(76)
        .map(|chunk| std::str::from_utf8(chunk).unwrap_or_default())
        .collect::<Vec<_>>()
        .join("\r\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_list_deserialization() {
        let json = r#"{
            "messages": [{"id": "m1", "threadId": "t1"}, {"id": "m2", "threadId": "t2"}],
            "resultSizeEstimate": 2
        }"#;
        let list: MessageListResponse = serde_json::from_str(json).unwrap();
        assert_eq!(list.messages.len(), 2);
        assert_eq!(list.messages[0].id, "m1");
    }

    #[test]
    fn test_message_list_empty() {
        let json = r#"{"resultSizeEstimate": 0}"#;
        let list: MessageListResponse = serde_json::from_str(json).unwrap();
        assert!(list.messages.is_empty());
    }

    #[test]
    fn test_message_parts_with_attachment_id() {
        let json = r#"{
            "id": "m1",
            "payload": {
                "parts": [
                    {"filename": "", "mimeType": "text/plain", "body": {"size": 10}},
                    {
                        "filename": "Report-2026-02-09.xlsx",
                        "mimeType": "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
                        "body": {"attachmentId": "att-123", "size": 2048}
                    }
                ]
            }
        }"#;
        let message: MessageResponse = serde_json::from_str(json).unwrap();
        let parts = message.payload.unwrap().parts;
        assert_eq!(parts.len(), 2);
        assert!(parts[0].body.as_ref().unwrap().attachment_id.is_none());
        assert_eq!(
            parts[1].body.as_ref().unwrap().attachment_id.as_deref(),
            Some("att-123")
        );
    }

    #[test]
    fn test_build_mime_message_headers_and_body() {
        let message = build_mime_message(
            &["a@example.com".to_string(), "b@example.com".to_string()],
            "Monday Reports",
            "Hello,\n\nAttached.",
            &[],
        )
        .unwrap();

        assert!(message.starts_with("To: a@example.com, b@example.com\r\n"));
        assert!(message.contains("Subject: Monday Reports\r\n"));
        assert!(message.contains("Content-Type: multipart/mixed"));
        assert!(message.contains("Hello,\n\nAttached."));
        assert!(message.trim_end().ends_with("--"));
    }

    #[test]
    fn test_build_mime_message_attaches_file() {
        let dir = std::env::temp_dir().join(format!("mr-mime-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("weekly report.xlsx");
        std::fs::write(&path, b"not really a workbook").unwrap();

        let message =
            build_mime_message(&["a@example.com".to_string()], "S", "B", &[path]).unwrap();
        assert!(message.contains("filename=\"weekly report.xlsx\""));
        assert!(message.contains(&STANDARD.encode(b"not really a workbook")));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_wrap_base64_line_length() {
        let encoded = "A".repeat(200);
        let wrapped = wrap_base64(&encoded);
        assert!(wrapped.lines().all(|line| line.len() <= 76));
        assert_eq!(wrapped.replace("\r\n", ""), encoded);
    }
}
