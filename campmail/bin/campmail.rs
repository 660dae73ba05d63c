use std::{path::PathBuf, process::ExitCode};

use anyhow::Context;
use campmail::{Config, EmailMessage, Mailer};
use clap::{Parser, Subcommand};

/// Send camp notification emails over SMTP
#[derive(Parser, Debug)]
#[command(name = "campmail")]
#[command(about = "Send camp notification emails over SMTP", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file, instead of searching the default locations
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Send one HTML message
    Send {
        /// Recipient address
        #[arg(long)]
        to: String,

        #[arg(long)]
        subject: String,

        /// HTML body
        #[arg(long, required_unless_present = "html_file", conflicts_with = "html_file")]
        html: Option<String>,

        /// Read the HTML body from a file
        #[arg(long)]
        html_file: Option<PathBuf>,

        /// Plain-text rendition, logged in mock mode
        #[arg(long, default_value = "")]
        text: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    campmail_common::logging::init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::from_path(path)?,
        None => Config::load()?,
    };
    let mailer = Mailer::from_config(&config);

    match cli.command {
        Commands::Send {
            to,
            subject,
            html,
            html_file,
            text,
        } => {
            let html = match (html, html_file) {
                (Some(html), _) => html,
                (None, Some(path)) => std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read HTML from {}", path.display()))?,
                (None, None) => anyhow::bail!("either --html or --html-file is required"),
            };

            let message = EmailMessage::new(to, subject, text, html);
            let result = mailer.send(&message).await;

            if result.success {
                if mailer.is_mock() {
                    println!("Not sent (SMTP not configured): {}", message.to);
                } else {
                    println!("Delivered to {}", message.to);
                }
                Ok(ExitCode::SUCCESS)
            } else {
                eprintln!(
                    "Delivery to {} failed: {}",
                    message.to,
                    result.error.unwrap_or_default()
                );
                Ok(ExitCode::FAILURE)
            }
        }
    }
}
