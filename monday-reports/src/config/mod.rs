//! Report configuration
//!
//! One static table drives every report type: subject filters, pivot sheet
//! names, save directory, Drive folder, email template, and recipients.
//! Built-in defaults are compiled in; a `reports.toml` next to the rest of
//! the user's config replaces the whole table when present.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::excel::DATA_SHEET_NAME;

/// Compiled-in configuration, identical in shape to a user `reports.toml`.
const DEFAULT_REPORTS_TOML: &str = include_str!("default_reports.toml");

/// Definition of one report type. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportDefinition {
    pub display_name: String,
    /// Subdirectory of the base output dir used as the working directory.
    pub save_subdir: String,
    /// Display name of the Drive destination, resolved via `drive_folders`.
    pub drive_folder_name: String,
    pub email_subject: String,
    pub email_body: String,
    /// Shorthand names, resolved via `recipients`.
    pub default_recipients: Vec<String>,
    /// Pivot sheet names in final workbook order (after the data sheet).
    pub pivot_sheets: Vec<String>,
    /// Exact-match subject lines, processed in order.
    pub subject_filters: Vec<String>,
}

/// The full configuration surface for one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Base directory for all working directories. Defaults to
    /// `<home>/Monday Reports` when absent.
    #[serde(default)]
    pub base_output_dir: Option<PathBuf>,
    /// Shorthand name -> email address.
    pub recipients: BTreeMap<String, String>,
    /// Drive folder display name -> Drive folder id.
    pub drive_folders: BTreeMap<String, String>,
    pub reports: BTreeMap<String, ReportDefinition>,
}

impl RunnerConfig {
    /// Load the user's `reports.toml` if present, else the built-in defaults.
    pub fn load() -> Result<RunnerConfig> {
        if let Some(path) = Self::user_config_path() {
            if path.exists() {
                let content = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read config: {}", path.display()))?;
                let config: RunnerConfig = toml::from_str(&content)
                    .with_context(|| format!("Failed to parse config: {}", path.display()))?;
                config.validate()?;
                log::info!("Loaded report configuration from {}", path.display());
                return Ok(config);
            }
        }
        Self::builtin()
    }

    /// The compiled-in default configuration.
    pub fn builtin() -> Result<RunnerConfig> {
        let config: RunnerConfig = toml::from_str(DEFAULT_REPORTS_TOML)
            .context("Built-in report configuration is invalid")?;
        config.validate()?;
        Ok(config)
    }

    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("monday-reports").join("reports.toml"))
    }

    /// Enforce the invariants every component downstream relies on.
    pub fn validate(&self) -> Result<()> {
        for (key, report) in &self.reports {
            if report.subject_filters.is_empty() {
                bail!("Report '{}' has no subject filters", key);
            }
            for sheet in &report.pivot_sheets {
                if sheet == DATA_SHEET_NAME {
                    bail!(
                        "Report '{}' uses the reserved data sheet name '{}' as a pivot sheet",
                        key,
                        DATA_SHEET_NAME
                    );
                }
            }
            for name in &report.default_recipients {
                if !self.recipients.contains_key(name) {
                    bail!("Report '{}' references unknown recipient '{}'", key, name);
                }
            }
            if !self.drive_folders.contains_key(&report.drive_folder_name) {
                bail!(
                    "Report '{}' references unconfigured Drive folder '{}'",
                    key,
                    report.drive_folder_name
                );
            }
        }
        Ok(())
    }

    pub fn report(&self, key: &str) -> Result<&ReportDefinition> {
        self.reports.get(key).with_context(|| {
            format!(
                "Unknown report '{}'. Known reports: {}",
                key,
                self.reports.keys().cloned().collect::<Vec<_>>().join(", ")
            )
        })
    }

    /// Working directory for a report type, one per key.
    pub fn save_directory(&self, report: &ReportDefinition) -> PathBuf {
        self.base_output_dir
            .clone()
            .unwrap_or_else(|| {
                dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("Monday Reports")
            })
            .join(&report.save_subdir)
    }

    /// Resolve shorthand names to addresses. Anything containing '@' passes
    /// through unchanged so the CLI can accept raw addresses as overrides.
    pub fn resolve_recipients(&self, names: &[String]) -> Result<Vec<String>> {
        names
            .iter()
            .map(|name| {
                if name.contains('@') {
                    Ok(name.clone())
                } else {
                    self.recipients
                        .get(name)
                        .cloned()
                        .with_context(|| format!("Unknown recipient shorthand '{}'", name))
                }
            })
            .collect()
    }

    /// Default recipient addresses for a report.
    pub fn default_emails(&self, report: &ReportDefinition) -> Result<Vec<String>> {
        self.resolve_recipients(&report.default_recipients)
    }

    /// Drive parent folder id for a report's destination. Unconfigured names
    /// are a hard failure for the whole upload batch.
    pub fn drive_folder_id(&self, folder_name: &str) -> Result<&str> {
        self.drive_folders
            .get(folder_name)
            .map(String::as_str)
            .with_context(|| format!("Drive folder not configured for '{}'", folder_name))
    }
}
