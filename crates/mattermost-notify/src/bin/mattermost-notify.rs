//! Mattermost notify CLI - post messages and files to Mattermost channels.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use mattermost_notify::setup;
use mattermost_notify::{MattermostChannel, NotificationRequest, NotifyConfig, SendReport};

/// Mattermost notify CLI - send notifications through a Mattermost bot.
#[derive(Parser)]
#[command(name = "mattermost-notify")]
#[command(about = "Post notifications to Mattermost channels with a bot token")]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// TOML config file (environment variables override its values)
    #[arg(short, long, global = true, env = "MATTERMOST_CONFIG")]
    config: Option<PathBuf>,

    /// Mattermost server URL
    #[arg(long, global = true)]
    url: Option<String>,

    /// Bot access token
    #[arg(long, global = true)]
    token: Option<String>,

    /// Channel used when no target is given
    #[arg(long, global = true)]
    default_channel: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check connectivity and credentials, as done at setup time
    Validate,

    /// Resolve a channel name to its team and channel ids
    Resolve {
        /// Channel name (leading '#' is ignored)
        channel: String,
    },

    /// Send a message
    Send {
        /// Message body
        message: String,

        /// Title rendered as a heading above the message
        #[arg(long)]
        title: Option<String>,

        /// Target channel (repeatable; defaults to the default channel)
        #[arg(short, long = "target")]
        targets: Vec<String>,

        /// Local file to attach
        #[arg(long, conflicts_with = "file_url")]
        file: Option<PathBuf>,

        /// Remote file to download and attach
        #[arg(long)]
        file_url: Option<String>,

        /// Basic auth user for --file-url
        #[arg(long, requires = "file_url", requires = "file_password")]
        file_username: Option<String>,

        /// Basic auth password for --file-url
        #[arg(long, requires = "file_username")]
        file_password: Option<String>,

        /// Message attachments as a JSON array
        #[arg(long, conflicts_with_all = ["file", "file_url"])]
        attachments: Option<String>,
    },

    /// Send a JSON notification request, as a host platform would
    Request {
        /// File holding the request (reads stdin when omitted)
        #[arg(long)]
        input: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose {
        EnvFilter::new("mattermost_notify=debug,info")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("mattermost_notify=info,warn"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let config = load_config(&cli)?;

    match cli.command {
        Commands::Validate => {
            let credentials = config.credentials()?;
            let info = setup::validate_input(credentials, &config)
                .await
                .context("Validation failed")?;

            println!("Connected as {}", info.title);
            println!("Unique id: {}", info.unique_id);
            if info.default_channel_ok {
                println!("Default channel '{}' is reachable", config.default_channel);
            } else {
                println!(
                    "Warning: default channel '{}' could not be resolved",
                    config.default_channel
                );
            }
        }

        Commands::Resolve { channel } => {
            let credentials = config.credentials()?;
            let bridge = MattermostChannel::new(credentials, &config)?;
            let name = channel.trim_start_matches('#');
            let resolved = bridge
                .client()
                .resolve_channel(name)
                .await
                .with_context(|| format!("Failed to resolve '{channel}'"))?;

            println!("{}", serde_json::to_string_pretty(&resolved)?);
        }

        Commands::Send {
            message,
            title,
            targets,
            file,
            file_url,
            file_username,
            file_password,
            attachments,
        } => {
            let mut request = NotificationRequest::new(message);
            if let Some(title) = title {
                request = request.with_title(title);
            }
            if !targets.is_empty() {
                request = request.with_targets(targets);
            }

            if let Some(path) = file {
                request = request.with_data(json!({ "file": { "path": path.to_string_lossy() } }));
            } else if let Some(url) = file_url {
                let mut source = json!({ "url": url });
                if let (Some(username), Some(password)) = (file_username, file_password) {
                    source["username"] = json!(username);
                    source["password"] = json!(password);
                }
                request = request.with_data(json!({ "file": source }));
            } else if let Some(raw) = attachments {
                let attachments: serde_json::Value =
                    serde_json::from_str(&raw).context("--attachments is not valid JSON")?;
                request = request.with_data(json!({ "attachments": attachments }));
            }

            send(&config, &request).await?;
        }

        Commands::Request { input } => {
            let text = match input {
                Some(path) => std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read {}", path.display()))?,
                None => std::io::read_to_string(std::io::stdin())
                    .context("Failed to read request from stdin")?,
            };
            let request: NotificationRequest =
                serde_json::from_str(&text).context("Invalid notification request")?;

            send(&config, &request).await?;
        }
    }

    Ok(())
}

/// Load configuration, then apply command-line overrides.
fn load_config(cli: &Cli) -> Result<NotifyConfig> {
    let mut config =
        NotifyConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

    if let Some(url) = &cli.url {
        config.server_url = Some(url.clone());
    }
    if let Some(token) = &cli.token {
        config.token = Some(token.clone());
    }
    if let Some(channel) = &cli.default_channel {
        config.default_channel.clone_from(channel);
    }

    Ok(config)
}

async fn send(config: &NotifyConfig, request: &NotificationRequest) -> Result<()> {
    if config.disabled {
        println!("Notifications are disabled, nothing sent");
        return Ok(());
    }

    let credentials = config.credentials()?;
    let (channel, _bot) = MattermostChannel::connect(credentials, config)
        .await
        .context("Failed to connect to Mattermost")?;

    let report = channel.send_request(request).await;
    print_report(&report);

    let failed = report.failures().count();
    if failed > 0 {
        bail!("{failed} of {} targets failed", report.outcomes.len());
    }
    Ok(())
}

fn print_report(report: &SendReport) {
    for outcome in &report.outcomes {
        match &outcome.result {
            Ok(delivery) => println!(
                "ok      {} (channel {}, post {})",
                outcome.target, delivery.channel.channel_id, delivery.post_id
            ),
            Err(e) => println!("failed  {} [{}] {e}", outcome.target, e.kind()),
        }
    }
}
