mod gateway;
mod service;

use clap::{Parser, Subcommand};
use murmur_channels::telegram::TelegramChannel;
use murmur_core::{config, shellexpand, traits::Summarizer};
use murmur_dedup::DedupStore;
use murmur_providers::{OpenAiSummarizer, WhisperTranscriber};
use std::sync::Arc;

#[derive(Parser)]
#[command(
    name = "murmur",
    version,
    about = "Murmur — Telegram group assistant: voice transcripts, forward summaries, forward dedup"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file.
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the bot.
    Start,
    /// Check configuration and provider availability.
    Status,
    /// Manage the OS service (LaunchAgent / systemd user unit).
    Service {
        #[command(subcommand)]
        action: ServiceAction,
    },
}

#[derive(Subcommand)]
enum ServiceAction {
    /// Install and activate the service.
    Install,
    /// Stop and remove the service.
    Uninstall,
    /// Show service installation and running status.
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load(&cli.config)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cfg.murmur.log_level)),
        )
        .init();

    match cli.command {
        Commands::Start => {
            // Missing credentials abort startup; everything else is handled
            // per-message.
            if cfg.telegram.bot_token.is_empty() {
                anyhow::bail!(
                    "Telegram bot_token is not set. \
                     Set it in config.toml or the TELEGRAM_BOT_TOKEN env var."
                );
            }
            if cfg.openai.api_key.is_empty() {
                anyhow::bail!(
                    "OpenAI api_key is not set. \
                     Set it in config.toml or the OPENAI_API_KEY env var."
                );
            }
            let error_chat_id: i64 = cfg.telegram.error_chat_id.parse().map_err(|_| {
                anyhow::anyhow!(
                    "error_chat_id '{}' is not a valid chat id. \
                     Set it in config.toml or the MURMUR_ERROR_CHAT_ID env var.",
                    cfg.telegram.error_chat_id
                )
            })?;

            let channel = Arc::new(TelegramChannel::new(cfg.telegram.clone()));
            let summarizer = Arc::new(OpenAiSummarizer::from_config(
                &cfg.openai,
                cfg.messages.summary_prompt.clone(),
            ));
            let transcriber = Arc::new(WhisperTranscriber::from_config(&cfg.openai));

            if !summarizer.is_available().await {
                tracing::warn!(
                    "summarizer '{}' is not reachable; forwards will fail until it recovers",
                    summarizer.name()
                );
            }

            let dedup = cfg
                .dedup
                .enabled
                .then(|| DedupStore::load(shellexpand(&cfg.dedup.path)));

            println!("Murmur — Starting bot...");
            let gw = gateway::Gateway::new(
                channel,
                transcriber,
                summarizer,
                dedup,
                cfg.messages.clone(),
                cfg.openai.language.clone(),
                error_chat_id,
            );
            gw.run().await?;
        }
        Commands::Status => {
            println!("Murmur — Status Check\n");
            println!("Config: {}", cli.config);
            println!(
                "  telegram: {}",
                if cfg.telegram.bot_token.is_empty() {
                    "missing bot_token"
                } else {
                    "configured"
                }
            );
            println!(
                "  error sink: {}",
                if cfg.telegram.error_chat_id.is_empty() {
                    "not configured".to_string()
                } else {
                    format!("chat {}", cfg.telegram.error_chat_id)
                }
            );

            let summarizer = Arc::new(OpenAiSummarizer::from_config(
                &cfg.openai,
                cfg.messages.summary_prompt.clone(),
            ));
            println!(
                "  openai ({}): {}",
                cfg.openai.model,
                if summarizer.is_available().await {
                    "available"
                } else {
                    "not available"
                }
            );

            if cfg.dedup.enabled {
                let store = DedupStore::load(shellexpand(&cfg.dedup.path));
                println!(
                    "  dedup: enabled, {} entries at {}",
                    store.len().await,
                    cfg.dedup.path
                );
            } else {
                println!("  dedup: disabled");
            }
        }
        Commands::Service { action } => match action {
            ServiceAction::Install => service::install(&cli.config)?,
            ServiceAction::Uninstall => service::uninstall()?,
            ServiceAction::Status => service::status()?,
        },
    }

    Ok(())
}
