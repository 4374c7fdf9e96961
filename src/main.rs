//! # Korona: daily county incidence bot
//!
//! Sends every subscribed Telegram chat a picture for the 7-day incidence of
//! its county, once a day, and answers county selection commands.
//!
//! Usage:
//!   korona                          # Run the bot (~/.korona/config.toml)
//!   korona --config bot.toml        # Custom config file
//!   korona --check-config           # Validate config, print next fire, exit
//!   korona --dispatch-now           # Send today's pictures once and exit

mod commands;

use anyhow::{Context, Result, bail};
use clap::Parser;
use futures::StreamExt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use commands::Bot;
use korona_cases::{AssetCatalog, MetricCache, RkiClient, SqliteUserStore};
use korona_channels::{TelegramChannel, TelegramConfig};
use korona_core::KoronaConfig;
use korona_core::config::expand_path;
use korona_scheduler::{Dispatcher, RecurringTrigger, TimeExpression};

#[derive(Parser)]
#[command(
    name = "korona",
    version,
    about = "🦠 Korona: daily county incidence pictures on Telegram"
)]
struct Cli {
    /// Config file (default: ~/.korona/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Refresh the case data, notify every user once, and exit
    #[arg(long)]
    dispatch_now: bool,

    /// Validate the configuration and exit
    #[arg(long)]
    check_config: bool,
}

fn load_config(path: Option<&PathBuf>) -> Result<KoronaConfig> {
    let mut config = match path {
        Some(p) => KoronaConfig::load_from(p)
            .with_context(|| format!("loading {}", p.display()))?,
        None => KoronaConfig::load()?,
    };
    config.apply_env();
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "korona=debug,korona_core=debug,korona_scheduler=debug,korona_cases=debug,korona_channels=debug"
    } else {
        "korona=info,korona_core=info,korona_scheduler=info,korona_cases=info,korona_channels=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    let config = load_config(cli.config.as_ref())?;
    config.validate()?;
    let expression = TimeExpression::parse(&config.schedule.expression)
        .with_context(|| format!("invalid schedule '{}'", config.schedule.expression))?;
    let assets = AssetCatalog::new(expand_path(&config.assets.dir));

    if cli.check_config {
        let next = expression.next_fire_after(&chrono::Local::now())?;
        println!("✅ Configuration OK");
        println!("   Schedule:  {expression} (next: {next})");
        println!("   Users DB:  {}", expand_path(&config.storage.users_db).display());
        println!("   Data:      {}/{}", config.data.api_base, config.data.dataset);
        let missing = assets.missing();
        if missing.is_empty() {
            println!("   Assets:    {} (complete)", assets.dir().display());
        } else {
            println!("   Assets:    {} ({} pictures missing)", assets.dir().display(), missing.len());
        }
        return Ok(());
    }

    if !config.telegram.enabled {
        bail!("telegram channel is disabled, nothing to deliver to");
    }

    let missing = assets.missing();
    if !missing.is_empty() {
        let names: Vec<String> = missing.iter().map(|b| b.file_name()).collect();
        tracing::warn!(
            "⚠️ {} pictures missing in {}: {}",
            missing.len(),
            assets.dir().display(),
            names.join(", ")
        );
    }

    let users = Arc::new(SqliteUserStore::open(&expand_path(&config.storage.users_db))?);
    tracing::info!("💾 User store: {} users", users.count()?);
    let cases = Arc::new(MetricCache::new(Arc::new(RkiClient::new(&config.data))));
    let telegram = TelegramChannel::new(TelegramConfig::from(&config.telegram));
    let transport = Arc::new(telegram.clone());

    let dispatcher = Arc::new(
        Dispatcher::new(users.clone(), cases.clone(), transport.clone(), assets)
            .with_concurrency(config.schedule.dispatch_concurrency),
    );

    if cli.dispatch_now {
        let report = dispatcher.refresh_and_dispatch_all(true).await?;
        println!(
            "📣 {} users: {} delivered, {} need a county, {} failed",
            report.total, report.delivered, report.needs_region, report.failed
        );
        return Ok(());
    }

    let me = telegram.get_me().await.context("telegram getMe")?;
    tracing::info!(
        "🤖 Logged in as @{}",
        me.username.as_deref().unwrap_or(&me.first_name)
    );

    let trigger = RecurringTrigger::new();
    let refresh = config.schedule.refresh_before_dispatch;
    let scheduled = Arc::clone(&dispatcher);
    trigger.start(expression, move || {
        let dispatcher = Arc::clone(&scheduled);
        async move { dispatcher.refresh_and_dispatch_all(refresh).await.map(|_| ()) }
    })?;

    let bot = Arc::new(Bot::new(users, cases, transport, dispatcher));
    let mut incoming = telegram.start_polling();
    tracing::info!("👂 Listening for messages (Ctrl-C to stop)");

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            msg = incoming.next() => {
                let Some(msg) = msg else {
                    tracing::warn!("Telegram polling ended");
                    break;
                };
                let bot = Arc::clone(&bot);
                tokio::spawn(async move {
                    if let Err(e) = bot.handle(&msg).await {
                        tracing::error!("❌ Handling message from {} failed: {e}", msg.chat_id);
                    }
                });
            }
            _ = &mut ctrl_c => {
                tracing::info!("🛑 Shutting down");
                break;
            }
        }
    }

    trigger.stop();
    drop(incoming);
    Ok(())
}
