//! Weekly Monday report automation
//!
//! Pulls the week's report spreadsheets out of Gmail, reshapes them, and
//! hands them back out by email and Google Drive.

mod api;
mod cli;
mod config;
mod excel;
mod progress;
mod report;

use anyhow::Result;
use clap::Parser;
use colored::Colorize;

use api::{DriveClient, GmailClient, GoogleSession};
use cli::{Cli, Command};
use config::RunnerConfig;
use progress::{StatusEvent, StatusSender, format_file_size};
use report::{RunOptions, Runner};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    match cli.command {
        Command::List => list_reports(),
        Command::Run {
            reports,
            email,
            drive,
            to,
        } => {
            run_reports(
                reports,
                RunOptions {
                    email,
                    drive,
                    extra_recipients: to,
                },
            )
            .await
        }
    }
}

fn list_reports() -> Result<()> {
    let config = RunnerConfig::load()?;
    for (key, definition) in &config.reports {
        println!("{}  {}", key.bold(), report::describe(definition));
    }
    Ok(())
}

async fn run_reports(report_keys: Vec<String>, options: RunOptions) -> Result<()> {
    let config = RunnerConfig::load()?;
    let session = GoogleSession::establish().await?;

    let (status, mut events) = StatusSender::channel();
    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            print_event(&event);
        }
    });

    let gmail = GmailClient::new(session.clone());
    let drive = DriveClient::new(session, status.clone());
    let runner = Runner::new(&gmail, &drive, &config, status.clone());

    let mut failed_reports = Vec::new();
    for key in &report_keys {
        // One bad report never blocks the rest of the batch; dead
        // credentials block everything.
        match runner.run(key, &options).await {
            Ok(summary) if summary.succeeded() => {}
            Ok(_) => failed_reports.push(key.clone()),
            Err(e) if report::is_fatal_auth(&e) => {
                status.error(format!("Stopping batch: {:#}", e));
                failed_reports.push(key.clone());
                break;
            }
            Err(e) => {
                status.error(format!("Report '{}' aborted: {:#}", key, e));
                failed_reports.push(key.clone());
            }
        }
    }

    // Every sender must go before the printer can drain to completion.
    drop(runner);
    drop(drive);
    drop(status);
    let _ = printer.await;

    if failed_reports.is_empty() {
        println!("{}", "All reports completed".green());
        Ok(())
    } else {
        anyhow::bail!("Reports with failures: {}", failed_reports.join(", "))
    }
}

fn print_event(event: &StatusEvent) {
    match event {
        StatusEvent::Info(message) => println!("{} {}", "•".green(), message),
        StatusEvent::Warn(message) => println!("{} {}", "!".yellow(), message),
        StatusEvent::Error(message) => eprintln!("{} {}", "✗".red(), message),
        StatusEvent::Progress {
            filename,
            percent,
            bytes_sent,
            bytes_total,
        } => {
            println!(
                "  {} {}% ({} / {})",
                filename.dimmed(),
                percent,
                format_file_size(*bytes_sent),
                format_file_size(*bytes_total)
            );
        }
    }
}
