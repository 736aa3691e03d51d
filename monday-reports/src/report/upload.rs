//! Drive upload reconciliation
//!
//! Mirrors the working directory's spreadsheets into a configured Drive
//! folder, under a dated subfolder. Files that already exist remotely by
//! name are updated in place; everything else is created. One file failing
//! never stops the rest.

use std::path::{Path, PathBuf};

use anyhow::Result;
use log::{info, warn};
use regex::Regex;

use crate::api::RemoteStore;
use crate::progress::StatusSender;

use super::deliver::collect_spreadsheets;

#[derive(Debug, Clone, PartialEq)]
pub enum UploadAction {
    Created,
    Updated,
}

#[derive(Debug, Clone)]
pub struct UploadRecord {
    pub filename: String,
    pub action: UploadAction,
    pub file_id: String,
}

#[derive(Debug, Default)]
pub struct UploadSummary {
    pub records: Vec<UploadRecord>,
    pub failures: Vec<(String, String)>,
}

impl UploadSummary {
    pub fn created(&self) -> usize {
        self.records
            .iter()
            .filter(|r| r.action == UploadAction::Created)
            .count()
    }

    pub fn updated(&self) -> usize {
        self.records
            .iter()
            .filter(|r| r.action == UploadAction::Updated)
            .count()
    }

    pub fn all_succeeded(&self) -> bool {
        self.failures.is_empty()
    }
}

/// First ISO date found in any of the filenames. Reports embed the week's
/// Monday, so this names the dated subfolder.
pub fn date_label(files: &[PathBuf]) -> Option<String> {
    // Panic-free: fixed pattern.
    let pattern = Regex::new(r"\d{4}-\d{2}-\d{2}").unwrap_or_else(|_| unreachable!());
    files.iter().find_map(|path| {
        let name = path.file_name()?.to_string_lossy();
        pattern.find(&name).map(|m| m.as_str().to_string())
    })
}

/// Get or create the dated subfolder. Falls back to the parent folder when
/// the subfolder cannot be resolved; uploads still land somewhere useful.
async fn resolve_target_folder<S: RemoteStore + ?Sized>(
    store: &S,
    parent_id: &str,
    label: Option<&str>,
    status: &StatusSender,
) -> String {
    let Some(label) = label else {
        return parent_id.to_string();
    };
    match store.find_by_name(parent_id, label).await {
        Ok(Some(existing)) => existing.id,
        Ok(None) => match store.create_folder(parent_id, label).await {
            Ok(id) => {
                info!("Created Drive subfolder '{}'", label);
                id
            }
            Err(e) => {
                warn!("Could not create subfolder '{}': {}", label, e);
                status.warn(format!(
                    "Uploading to parent folder; subfolder '{}' could not be created",
                    label
                ));
                parent_id.to_string()
            }
        },
        Err(e) => {
            warn!("Could not look up subfolder '{}': {}", label, e);
            status.warn(format!(
                "Uploading to parent folder; subfolder '{}' could not be resolved",
                label
            ));
            parent_id.to_string()
        }
    }
}

/// Upload every spreadsheet in `work_dir` into `parent_folder_id`.
pub async fn upload_all<S: RemoteStore + ?Sized>(
    store: &S,
    work_dir: &Path,
    parent_folder_id: &str,
    status: &StatusSender,
) -> Result<UploadSummary> {
    let files = collect_spreadsheets(work_dir)?;
    let mut summary = UploadSummary::default();
    if files.is_empty() {
        status.warn(format!("No spreadsheets in {} to upload", work_dir.display()));
        return Ok(summary);
    }

    let label = date_label(&files);
    let target = resolve_target_folder(store, parent_folder_id, label.as_deref(), status).await;

    for path in &files {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let result = upload_one(store, &target, &name, path).await;
        match result {
            Ok(record) => {
                let verb = match record.action {
                    UploadAction::Created => "Uploaded",
                    UploadAction::Updated => "Updated",
                };
                status.info(format!("{} {}", verb, record.filename));
                summary.records.push(record);
            }
            Err(e) => {
                warn!("Upload failed for {}: {}", name, e);
                status.error(format!("Upload failed for {}: {}", name, e));
                summary.failures.push((name, e.to_string()));
            }
        }
    }

    info!(
        "Drive upload done: {} created, {} updated, {} failed",
        summary.created(),
        summary.updated(),
        summary.failures.len()
    );
    Ok(summary)
}

async fn upload_one<S: RemoteStore + ?Sized>(
    store: &S,
    folder_id: &str,
    name: &str,
    path: &Path,
) -> Result<UploadRecord> {
    let record = match store.find_by_name(folder_id, name).await? {
        Some(existing) => UploadRecord {
            filename: name.to_string(),
            file_id: store.update_file(&existing.id, path).await?,
            action: UploadAction::Updated,
        },
        None => UploadRecord {
            filename: name.to_string(),
            file_id: store.create_file(folder_id, name, path).await?,
            action: UploadAction::Created,
        },
    };
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_date_label_picks_first_match() {
        let files = vec![
            PathBuf::from("/tmp/Plain Report.xlsx"),
            PathBuf::from("/tmp/Weekly 2026-02-09 Andy.xlsx"),
            PathBuf::from("/tmp/Weekly 2026-02-16 Greg.xlsx"),
        ];
        assert_eq!(date_label(&files), Some("2026-02-09".to_string()));
        assert_eq!(date_label(&[PathBuf::from("/tmp/none.xlsx")]), None);
        assert_eq!(date_label(&[]), None);
    }

    #[test]
    fn test_summary_counts() {
        let mut summary = UploadSummary::default();
        summary.records.push(UploadRecord {
            filename: "a.xlsx".into(),
            action: UploadAction::Created,
            file_id: "1".into(),
        });
        summary.records.push(UploadRecord {
            filename: "b.xlsx".into(),
            action: UploadAction::Updated,
            file_id: "2".into(),
        });
        assert_eq!(summary.created(), 1);
        assert_eq!(summary.updated(), 1);
        assert!(summary.all_succeeded());

        summary.failures.push(("c.xlsx".into(), "boom".into()));
        assert!(!summary.all_succeeded());
    }
}
