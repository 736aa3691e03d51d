//! Report run orchestration
//!
//! A run processes one configured report end to end: clear the working
//! directory, download and transform the spreadsheet for every subject
//! filter, then optionally email the results and mirror them to Drive.
//! Individual filters failing never abort the run; expired credentials do.

pub mod deliver;
pub mod fetch;
pub mod upload;

use std::path::PathBuf;

use anyhow::{Context, Result};
use log::{error, info, warn};

use crate::api::{ApiError, MailSource, RemoteStore};
use crate::config::{ReportDefinition, RunnerConfig};
use crate::excel;
use crate::progress::StatusSender;

use upload::UploadSummary;

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub email: bool,
    pub drive: bool,
    /// Extra recipients beyond the report's defaults, shorthand or address.
    pub extra_recipients: Vec<String>,
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub report_key: String,
    pub downloaded: Vec<PathBuf>,
    /// Subject filters that matched no usable message this week.
    pub missing: Vec<String>,
    /// Per-filter fetch or transform failures, with reasons.
    pub failures: Vec<(String, String)>,
    pub emailed: bool,
    pub upload: Option<UploadSummary>,
}

impl RunSummary {
    pub fn succeeded(&self) -> bool {
        self.failures.is_empty()
            && self.upload.as_ref().is_none_or(UploadSummary::all_succeeded)
    }
}

/// True when the error chain bottoms out in revoked or expired credentials.
/// Nothing downstream can work, so the whole run stops.
pub fn is_fatal_auth(err: &anyhow::Error) -> bool {
    err.chain()
        .any(|cause| cause.downcast_ref::<ApiError>().is_some_and(ApiError::is_fatal_auth))
}

pub struct Runner<'a, M: MailSource + ?Sized, S: RemoteStore + ?Sized> {
    mail: &'a M,
    store: &'a S,
    config: &'a RunnerConfig,
    status: StatusSender,
}

impl<'a, M: MailSource + ?Sized, S: RemoteStore + ?Sized> Runner<'a, M, S> {
    pub fn new(
        mail: &'a M,
        store: &'a S,
        config: &'a RunnerConfig,
        status: StatusSender,
    ) -> Runner<'a, M, S> {
        Runner {
            mail,
            store,
            config,
            status,
        }
    }

    pub async fn run(&self, report_key: &str, options: &RunOptions) -> Result<RunSummary> {
        let report = self.config.report(report_key)?;
        let work_dir = self.config.save_directory(report);
        self.prepare_work_dir(&work_dir)?;

        self.status
            .info(format!("Running report: {}", report.display_name));
        let mut summary = RunSummary {
            report_key: report_key.to_string(),
            ..RunSummary::default()
        };

        for filter in &report.subject_filters {
            match fetch::fetch(self.mail, filter, &work_dir, &self.status).await {
                Ok(Some(path)) => {
                    if let Err(e) = excel::transform(&path, &report.pivot_sheets) {
                        warn!("Transform failed for '{}': {:#}", filter, e);
                        self.status
                            .error(format!("Transform failed for '{}': {}", filter, e));
                        summary.failures.push((filter.clone(), format!("{:#}", e)));
                    }
                    summary.downloaded.push(path);
                }
                Ok(None) => summary.missing.push(filter.clone()),
                Err(e) if is_fatal_auth(&e) => {
                    return Err(e.context("Google credentials are no longer valid"));
                }
                Err(e) => {
                    error!("Fetch failed for '{}': {:#}", filter, e);
                    self.status
                        .error(format!("Fetch failed for '{}': {}", filter, e));
                    summary.failures.push((filter.clone(), format!("{:#}", e)));
                }
            }
        }

        // Delivery and upload fail independently: a bad send or an
        // unconfigured folder loses that stage, not the other one.
        if options.email {
            match self.email_stage(report, &work_dir, options).await {
                Ok(()) => summary.emailed = true,
                Err(e) if is_fatal_auth(&e) => {
                    return Err(e.context("Google credentials are no longer valid"));
                }
                Err(e) => {
                    error!("Email delivery failed: {:#}", e);
                    self.status.error(format!("Email delivery failed: {}", e));
                    summary
                        .failures
                        .push(("email delivery".to_string(), format!("{:#}", e)));
                }
            }
        }

        if options.drive {
            match self.drive_stage(report, &work_dir).await {
                Ok(upload) => summary.upload = Some(upload),
                Err(e) if is_fatal_auth(&e) => {
                    return Err(e.context("Google credentials are no longer valid"));
                }
                Err(e) => {
                    error!("Drive upload failed: {:#}", e);
                    self.status.error(format!("Drive upload failed: {}", e));
                    summary
                        .failures
                        .push(("drive upload".to_string(), format!("{:#}", e)));
                }
            }
        }

        info!(
            "Report '{}' finished: {} downloaded, {} missing, {} failed",
            report_key,
            summary.downloaded.len(),
            summary.missing.len(),
            summary.failures.len()
        );
        Ok(summary)
    }

    async fn email_stage(
        &self,
        report: &ReportDefinition,
        work_dir: &PathBuf,
        options: &RunOptions,
    ) -> Result<()> {
        let mut recipients = self.config.default_emails(report)?;
        recipients.extend(self.config.resolve_recipients(&options.extra_recipients)?);
        recipients.dedup();
        deliver::deliver(
            self.mail,
            work_dir,
            &recipients,
            &report.email_subject,
            &report.email_body,
            &self.status,
        )
        .await
    }

    async fn drive_stage(
        &self,
        report: &ReportDefinition,
        work_dir: &PathBuf,
    ) -> Result<UploadSummary> {
        let folder_id = self.config.drive_folder_id(&report.drive_folder_name)?;
        upload::upload_all(self.store, work_dir, folder_id, &self.status).await
    }

    /// The working directory starts every run empty so stale spreadsheets
    /// from a previous week never get delivered.
    fn prepare_work_dir(&self, dir: &PathBuf) -> Result<()> {
        if dir.exists() {
            std::fs::remove_dir_all(dir)
                .with_context(|| format!("Failed to clear working directory: {}", dir.display()))?;
        }
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create working directory: {}", dir.display()))?;
        Ok(())
    }
}

pub fn describe(report: &ReportDefinition) -> String {
    format!(
        "{} ({} subject filter(s), {} summary sheet(s))",
        report.display_name,
        report.subject_filters.len(),
        report.pivot_sheets.len()
    )
}
