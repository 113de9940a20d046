use anyhow::Result;
use chrono::{DateTime, Local};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use linkbox::analytics::ClickContext;
use linkbox::config::Config;
use linkbox::submission::SubmissionRow;
use linkbox::LinkApp;

#[derive(Parser)]
#[command(name = "linkbox")]
#[command(about = "Local short-link manager with click analytics", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Shorten up to a batch of URLs; all rows succeed or none are added
    Shorten {
        /// Row as URL[,VALIDITY_MINUTES[,SHORTCODE]]; validity 0 never expires
        #[arg(required = true)]
        rows: Vec<String>,
    },
    /// List links with their status
    List,
    /// Show click details, for one link or all of them
    Stats {
        id: Option<String>,
    },
    /// Record a click on a link and print its target URL
    Open {
        id: String,
        /// Referrer to record with the click
        #[arg(long)]
        referrer: Option<String>,
    },
    /// Remove expired links now
    Sweep,
    /// Show log events buffered locally
    Logs,
    /// Keep sweeping expired links until interrupted
    Watch,
}

fn parse_row(line: &str) -> SubmissionRow {
    let mut parts = line.splitn(3, ',');
    let original = parts.next().unwrap_or_default().trim().to_string();
    SubmissionRow {
        original,
        validity: parts.next().map(|v| v.trim().to_string()),
        preferred: parts.next().map(|p| p.trim().to_string()),
    }
}

fn format_time(millis: i64) -> String {
    DateTime::from_timestamp_millis(millis)
        .map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| millis.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("linkbox=info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    let mut app = LinkApp::from_config(config)?;
    let base_url = app.config().short_base_url.clone();
    let mut failed = false;

    match cli.command {
        Commands::Shorten { rows } => {
            let rows: Vec<SubmissionRow> = rows.iter().map(String::as_str).map(parse_row).collect();
            match app.submit(&rows) {
                Ok(records) => {
                    for record in records {
                        let expiry = record
                            .expires_at
                            .map(|t| format!("expires {}", format_time(t)))
                            .unwrap_or_else(|| "never expires".to_string());
                        println!(
                            "✓ {} -> {} ({})",
                            record.short_url(&base_url),
                            record.original,
                            expiry
                        );
                    }
                }
                Err(e) => {
                    eprintln!("✗ Nothing was added: {e}");
                    failed = true;
                }
            }
        }
        Commands::List => {
            let stats = app.stats();
            if stats.is_empty() {
                println!("No links yet.");
            }
            for link in stats {
                let status = if link.expired {
                    "Expired".to_string()
                } else {
                    format!("{} clicks", link.clicks)
                };
                let expiry = link
                    .expires_at
                    .map(|t| format!("Expires: {}", format_time(t)))
                    .unwrap_or_else(|| "Never expires".to_string());
                println!("{:<40} [{}]", link.short_url, status);
                println!("    Original: {}", link.original);
                println!("    Created: {} | {}", format_time(link.created_at), expiry);
            }
        }
        Commands::Stats { id } => {
            let stats: Vec<_> = app
                .stats()
                .into_iter()
                .filter(|s| id.as_deref().is_none_or(|id| s.id == id))
                .collect();
            if stats.is_empty() {
                println!("No shortened URLs available.");
            }
            for link in stats {
                println!(
                    "{}\n  Original: {} | Clicks: {} | Created: {}",
                    link.short_url,
                    link.original,
                    link.clicks,
                    format_time(link.created_at)
                );
                if link.click_details.is_empty() {
                    println!("  No clicks yet.");
                }
                for click in &link.click_details {
                    println!(
                        "  - {} | source: {} | referrer: {} | geo: {}",
                        format_time(click.timestamp),
                        click.source_label(),
                        click.referrer_label(),
                        click.geo_label()
                    );
                }
                println!("{}", "-".repeat(60));
            }
        }
        Commands::Open { id, referrer } => {
            let context = ClickContext::new(
                referrer,
                Some(format!("linkbox-cli/{}", env!("CARGO_PKG_VERSION"))),
            );
            match app.open(&id, context).await {
                Some(url) => println!("{url}"),
                None => {
                    eprintln!("⚠ Link '{id}' does not exist or has expired");
                    failed = true;
                }
            }
        }
        Commands::Sweep => {
            let removed = app.sweep();
            println!("Removed {removed} expired link(s)");
        }
        Commands::Logs => {
            let entries = app.log_entries();
            if entries.is_empty() {
                println!("No buffered log events.");
            }
            for event in entries {
                println!(
                    "{} {:?} {:?} {} {}",
                    event.timestamp,
                    event.stack,
                    event.level,
                    event.package,
                    event.message
                );
            }
        }
        Commands::Watch => {
            app.start_sweeper();
            info!("Watching for expired links, press Ctrl-C to stop");
            tokio::signal::ctrl_c().await?;
            info!("Shutdown signal received");
        }
    }

    // Pending log deliveries settle before the runtime goes away
    app.shutdown().await;
    if failed {
        std::process::exit(1);
    }
    Ok(())
}
