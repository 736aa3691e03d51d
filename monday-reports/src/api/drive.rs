//! Google Drive v3 client
//!
//! Implements the [`RemoteStore`] contract with shared-drive-aware listing
//! and resumable uploads. Transfers go up in 5 MiB chunks; progress is
//! reported at whole-percent steps at least 10% apart so the status channel
//! is not flooded.

use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;

use super::{
    ApiError, GoogleSession, RemoteFile, RemoteStore, RetryPolicy, error_for_response,
    send_with_retry,
};
use crate::progress::{StatusSender, format_file_size};

const DRIVE_FILES: &str = "https://www.googleapis.com/drive/v3/files";
const DRIVE_UPLOAD: &str = "https://www.googleapis.com/upload/drive/v3/files";
const FOLDER_MIME: &str = "application/vnd.google-apps.folder";

/// Resumable upload chunk size. Must stay a multiple of 256 KiB.
const CHUNK_SIZE: u64 = 5 * 1024 * 1024;

#[derive(Debug, Deserialize)]
struct FileListResponse {
    #[serde(default)]
    files: Vec<FileResource>,
}

#[derive(Debug, Deserialize)]
struct FileResource {
    id: String,
    #[serde(default)]
    name: String,
}

/// Drive-backed [`RemoteStore`].
#[derive(Debug, Clone)]
pub struct DriveClient {
    session: GoogleSession,
    status: StatusSender,
    retry: RetryPolicy,
}

impl DriveClient {
    pub fn new(session: GoogleSession, status: StatusSender) -> DriveClient {
        DriveClient {
            session,
            status,
            retry: RetryPolicy::default(),
        }
    }

    /// Start a resumable upload session and stream the file through it.
    async fn upload_resumable(
        &self,
        session_request: reqwest::RequestBuilder,
        local_path: &Path,
    ) -> Result<String, ApiError> {
        let response = send_with_retry(session_request, &self.retry).await?;
        if !response.status().is_success() {
            return Err(error_for_response(response).await);
        }
        let session_uri = response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| ApiError::Api {
                status: 0,
                message: "Resumable upload session returned no location".into(),
            })?;

        let bytes = std::fs::read(local_path)?;
        let total = bytes.len() as u64;
        let filename = local_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        if total == 0 {
            let response = send_with_retry(
                self.session
                    .http()
                    .put(&session_uri)
                    .header(reqwest::header::CONTENT_RANGE, "bytes */0")
                    .body(Vec::new()),
                &self.retry,
            )
            .await?;
            if !response.status().is_success() {
                return Err(error_for_response(response).await);
            }
            let file: FileResource = response.json().await?;
            return Ok(file.id);
        }

        let mut last_reported: u8 = 0;
        let mut final_response = None;

        for (start, end) in chunk_ranges(total, CHUNK_SIZE) {
            let chunk = bytes[start as usize..=end as usize].to_vec();
            let response = send_with_retry(
                self.session
                    .http()
                    .put(&session_uri)
                    .header(
                        reqwest::header::CONTENT_RANGE,
                        format!("bytes {}-{}/{}", start, end, total),
                    )
                    .body(chunk),
                &self.retry,
            )
            .await?;

            let status = response.status();
            // 308 Resume Incomplete between chunks; 200/201 on the last one.
            if status.as_u16() != 308 && !status.is_success() {
                return Err(error_for_response(response).await);
            }

            let sent = end + 1;
            let percent = transfer_percent(sent, total);
            if percent >= last_reported.saturating_add(10) {
                self.status.progress(&filename, percent, sent, total);
                log::debug!(
                    "upload progress {}: {}% ({} / {})",
                    filename,
                    percent,
                    format_file_size(sent),
                    format_file_size(total)
                );
                last_reported = percent;
            }

            if status.is_success() {
                final_response = Some(response);
            }
        }

        let response = final_response.ok_or_else(|| ApiError::Api {
            status: 0,
            message: "Resumable upload ended without a final response".into(),
        })?;
        let file: FileResource = response.json().await?;
        Ok(file.id)
    }
}

#[async_trait]
impl RemoteStore for DriveClient {
    async fn find_by_name(
        &self,
        parent_id: &str,
        name: &str,
    ) -> Result<Option<RemoteFile>, ApiError> {
        let token = self.session.access_token().await?;
        let query = format!(
            "'{}' in parents and name = '{}' and trashed = false",
            parent_id,
            escape_query_value(name)
        );
        let response = send_with_retry(
            self.session
                .http()
                .get(DRIVE_FILES)
                .bearer_auth(&token)
                .query(&[
                    ("q", query.as_str()),
                    ("fields", "files(id, name)"),
                    ("supportsAllDrives", "true"),
                    ("includeItemsFromAllDrives", "true"),
                ]),
            &self.retry,
        )
        .await?;

        if !response.status().is_success() {
            return Err(error_for_response(response).await);
        }
        let list: FileListResponse = response.json().await?;
        Ok(list.files.into_iter().next().map(|f| RemoteFile {
            id: f.id,
            name: f.name,
        }))
    }

    async fn create_folder(&self, parent_id: &str, name: &str) -> Result<String, ApiError> {
        let token = self.session.access_token().await?;
        let response = send_with_retry(
            self.session
                .http()
                .post(DRIVE_FILES)
                .bearer_auth(&token)
                .query(&[("supportsAllDrives", "true"), ("fields", "id, name")])
                .json(&serde_json::json!({
                    "name": name,
                    "mimeType": FOLDER_MIME,
                    "parents": [parent_id],
                })),
            &self.retry,
        )
        .await?;

        if !response.status().is_success() {
            return Err(error_for_response(response).await);
        }
        let folder: FileResource = response.json().await?;
        Ok(folder.id)
    }

    async fn create_file(
        &self,
        parent_id: &str,
        name: &str,
        local_path: &Path,
    ) -> Result<String, ApiError> {
        let token = self.session.access_token().await?;
        let request = self
            .session
            .http()
            .post(DRIVE_UPLOAD)
            .bearer_auth(&token)
            .query(&[
                ("uploadType", "resumable"),
                ("supportsAllDrives", "true"),
                ("fields", "id, name, webViewLink"),
            ])
            .json(&serde_json::json!({
                "name": name,
                "parents": [parent_id],
            }));
        self.upload_resumable(request, local_path).await
    }

    async fn update_file(&self, file_id: &str, local_path: &Path) -> Result<String, ApiError> {
        let token = self.session.access_token().await?;
        let request = self
            .session
            .http()
            .patch(format!("{}/{}", DRIVE_UPLOAD, file_id))
            .bearer_auth(&token)
            .query(&[
                ("uploadType", "resumable"),
                ("supportsAllDrives", "true"),
                ("fields", "id, name, webViewLink"),
            ])
            .json(&serde_json::json!({}));
        self.upload_resumable(request, local_path).await
    }
}

/// Escape a value for embedding in a Drive `q` expression.
fn escape_query_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Inclusive (start, end) byte ranges covering `total` bytes in `chunk`-sized
/// steps. Zero-byte files are handled before chunking.
fn chunk_ranges(total: u64, chunk: u64) -> Vec<(u64, u64)> {
    let mut ranges = Vec::new();
    let mut start = 0;
    while start < total {
        let end = (start + chunk).min(total) - 1;
        ranges.push((start, end));
        start = end + 1;
    }
    ranges
}

fn transfer_percent(sent: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    ((sent.saturating_mul(100)) / total) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_query_value() {
        assert_eq!(escape_query_value("plain.xlsx"), "plain.xlsx");
        assert_eq!(
            escape_query_value("Cameron's Report.xlsx"),
            "Cameron\\'s Report.xlsx"
        );
    }

    #[test]
    fn test_chunk_ranges_exact_multiple() {
        let ranges = chunk_ranges(20, 10);
        assert_eq!(ranges, vec![(0, 9), (10, 19)]);
    }

    #[test]
    fn test_chunk_ranges_with_remainder() {
        let ranges = chunk_ranges(25, 10);
        assert_eq!(ranges, vec![(0, 9), (10, 19), (20, 24)]);
    }

    #[test]
    fn test_chunk_ranges_small_file_single_request() {
        assert_eq!(chunk_ranges(3, CHUNK_SIZE), vec![(0, 2)]);
        assert!(chunk_ranges(0, CHUNK_SIZE).is_empty());
    }

    #[test]
    fn test_transfer_percent() {
        assert_eq!(transfer_percent(0, 100), 0);
        assert_eq!(transfer_percent(33, 100), 33);
        assert_eq!(transfer_percent(100, 100), 100);
        assert_eq!(transfer_percent(0, 0), 100);
    }

    #[test]
    fn test_file_list_deserialization() {
        let json = r#"{"files": [{"id": "f1", "name": "Report-2026-02-09.xlsx"}]}"#;
        let list: FileListResponse = serde_json::from_str(json).unwrap();
        assert_eq!(list.files[0].id, "f1");
        assert_eq!(list.files[0].name, "Report-2026-02-09.xlsx");
    }
}
