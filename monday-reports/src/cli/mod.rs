//! Command-line surface

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "monday-reports",
    version,
    about = "Download, transform, and deliver the weekly Monday reports"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run one or more configured reports end to end
    Run {
        /// Report keys, as shown by `list`
        #[arg(required = true)]
        reports: Vec<String>,

        /// Email the transformed spreadsheets to the report's recipients
        #[arg(long)]
        email: bool,

        /// Mirror the transformed spreadsheets to Google Drive
        #[arg(long)]
        drive: bool,

        /// Additional recipient, shorthand or full address (repeatable)
        #[arg(long = "to", value_name = "RECIPIENT")]
        to: Vec<String>,
    },
    /// List the configured reports
    List,
}
