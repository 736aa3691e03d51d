//! Report download
//!
//! Finds the most recent report email for a subject filter and saves its
//! spreadsheet attachment to the working directory.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{Datelike, NaiveDate, Weekday};
use log::{debug, info};
use regex::Regex;

use crate::api::{MailSource, MessagePart};
use crate::progress::StatusSender;

pub const XLSX_MIME: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// The Monday the current reporting week starts on: today when run on a
/// Monday, otherwise the most recent Monday before today.
pub fn target_monday(today: NaiveDate) -> NaiveDate {
    let days_back = match today.weekday() {
        Weekday::Mon => 0,
        other => other.num_days_from_monday() as i64,
    };
    today - chrono::Duration::days(days_back)
}

/// Gmail search query for a report delivered on or after the target Monday.
pub fn search_query(subject_filter: &str, monday: NaiveDate) -> String {
    format!(
        "subject:\"{}\" after:{}",
        subject_filter,
        monday.format("%Y/%m/%d")
    )
}

/// Replace filesystem-hostile characters so attachment names are safe to
/// write anywhere.
pub fn sanitize_filename(name: &str) -> String {
    // Panic-free: the pattern is a fixed character class.
    let pattern = Regex::new(r#"[\\/*?:"<>|]"#).unwrap_or_else(|_| unreachable!());
    pattern.replace_all(name, "_").into_owned()
}

fn is_spreadsheet_part(part: &MessagePart) -> bool {
    !part.filename.is_empty() && part.mime_type == XLSX_MIME && part.attachment_id.is_some()
}

/// Download this week's report for one subject filter.
///
/// Returns `Ok(None)` when no matching message carries a spreadsheet
/// attachment, which the caller treats as a skip rather than a failure.
pub async fn fetch<M: MailSource + ?Sized>(
    mail: &M,
    subject_filter: &str,
    save_dir: &Path,
    status: &StatusSender,
) -> Result<Option<PathBuf>> {
    let monday = target_monday(chrono::Local::now().date_naive());
    let query = search_query(subject_filter, monday);
    debug!("Gmail query: {}", query);

    let message_ids = mail
        .search(&query)
        .await
        .with_context(|| format!("Gmail search failed for '{}'", subject_filter))?;
    if message_ids.is_empty() {
        status.warn(format!("No messages match '{}'", subject_filter));
        return Ok(None);
    }

    for id in &message_ids {
        let detail = mail
            .get_message(id)
            .await
            .with_context(|| format!("Failed to read message {}", id))?;
        let Some(part) = detail.parts.iter().find(|p| is_spreadsheet_part(p)) else {
            debug!("Message {} has no spreadsheet attachment", id);
            continue;
        };
        let Some(attachment_id) = part.attachment_id.as_deref() else {
            continue;
        };

        let bytes = mail
            .fetch_attachment(id, attachment_id)
            .await
            .with_context(|| format!("Failed to download attachment from message {}", id))?;

        let filename = sanitize_filename(&part.filename);
        let path = save_dir.join(&filename);
        std::fs::write(&path, &bytes)
            .with_context(|| format!("Failed to save attachment: {}", path.display()))?;

        info!("Saved {} ({} bytes)", path.display(), bytes.len());
        status.info(format!("Downloaded {}", filename));
        return Ok(Some(path));
    }

    status.warn(format!(
        "Messages matched '{}' but none had a spreadsheet attachment",
        subject_filter
    ));
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_monday() {
        // 2026-02-09 is a Monday.
        let monday = NaiveDate::from_ymd_opt(2026, 2, 9).unwrap();
        assert_eq!(target_monday(monday), monday);
        // Tuesday through Sunday all roll back to it.
        for offset in 1..=6 {
            let day = monday + chrono::Duration::days(offset);
            assert_eq!(target_monday(day), monday);
        }
        // The next Monday maps to itself, not the previous one.
        let next = monday + chrono::Duration::days(7);
        assert_eq!(target_monday(next), next);
    }

    #[test]
    fn test_search_query() {
        let monday = NaiveDate::from_ymd_opt(2026, 2, 9).unwrap();
        assert_eq!(
            search_query("Weekly Report - Andy", monday),
            "subject:\"Weekly Report - Andy\" after:2026/02/09"
        );
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(
            sanitize_filename("Report: Andy/Greg 2026-02-09?.xlsx"),
            "Report_ Andy_Greg 2026-02-09_.xlsx"
        );
        assert_eq!(sanitize_filename("clean-name.xlsx"), "clean-name.xlsx");
        assert_eq!(sanitize_filename(r#"a\b*c"d<e>f|g"#), "a_b_c_d_e_f_g");
    }

    #[test]
    fn test_is_spreadsheet_part() {
        let good = MessagePart {
            filename: "report.xlsx".to_string(),
            mime_type: XLSX_MIME.to_string(),
            attachment_id: Some("att-1".to_string()),
        };
        assert!(is_spreadsheet_part(&good));

        let inline = MessagePart {
            filename: String::new(),
            ..good.clone()
        };
        assert!(!is_spreadsheet_part(&inline));

        let pdf = MessagePart {
            mime_type: "application/pdf".to_string(),
            ..good.clone()
        };
        assert!(!is_spreadsheet_part(&pdf));

        let no_id = MessagePart {
            attachment_id: None,
            ..good
        };
        assert!(!is_spreadsheet_part(&no_id));
    }
}
