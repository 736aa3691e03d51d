//! Email delivery
//!
//! Sends the transformed reports to their recipients. Every `.xlsx` file in
//! the working directory goes out in a single message.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use log::info;

use crate::api::MailSource;
use crate::progress::StatusSender;

/// All spreadsheet files in `dir`, sorted by name for a stable attachment
/// order.
pub fn collect_spreadsheets(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory: {}", dir.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("xlsx"))
        })
        .collect();
    files.sort();
    Ok(files)
}

/// Email everything in the working directory. Fails when there is nothing
/// to send or nobody to send it to.
pub async fn deliver<M: MailSource + ?Sized>(
    mail: &M,
    work_dir: &Path,
    recipients: &[String],
    subject: &str,
    body: &str,
    status: &StatusSender,
) -> Result<()> {
    if recipients.is_empty() {
        bail!("No recipients configured for email delivery");
    }
    let attachments = collect_spreadsheets(work_dir)?;
    if attachments.is_empty() {
        bail!("No spreadsheets in {} to deliver", work_dir.display());
    }

    info!(
        "Emailing {} attachment(s) to {}",
        attachments.len(),
        recipients.join(", ")
    );
    mail.send_message(recipients, subject, body, &attachments)
        .await
        .context("Failed to send report email")?;
    status.info(format!(
        "Emailed {} report(s) to {} recipient(s)",
        attachments.len(),
        recipients.len()
    ));
    Ok(())
}
