//! Fake Crypto Casino Bot
//!
//! Telegram bot for fake-money crypto trading and games.

use clap::{Parser, Subcommand};
use fake_crypto_bot::{
    commands::{format, Dispatcher},
    config::Config,
    games::{GameEngine, Notifier, SettlementScheduler},
    ledger::Ledger,
    price::{run_refresher, CoinGeckoSource, PriceCache},
    stats::StatsView,
    storage::Database,
    telegram::{TelegramApi, TelegramBot},
};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "fake-crypto-bot")]
#[command(about = "Telegram bot for fake-money crypto trading and casino games")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the Telegram bot
    Run,
    /// Print current prices
    Prices,
    /// Print the top players
    Leaderboard {
        /// Number of players to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },
    /// Settle due predictions once and exit
    Settle,
}

/// Shared components every subcommand builds on
struct App {
    config: Arc<Config>,
    ledger: Arc<Ledger>,
    prices: Arc<PriceCache>,
    games: Arc<GameEngine>,
}

impl App {
    async fn build(config: Config) -> anyhow::Result<Self> {
        let db = Database::connect_with(&config.database).await?;
        let ledger = Arc::new(Ledger::new(db, config.economy.starting_balance));
        let source = Arc::new(CoinGeckoSource::new(&config.prices)?);
        let prices = Arc::new(PriceCache::new(source, &config.prices));
        let games = Arc::new(GameEngine::new(
            ledger.clone(),
            prices.clone(),
            config.games.clone(),
            config.economy.clone(),
        ));

        Ok(Self {
            config: Arc::new(config),
            ledger,
            prices,
            games,
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(&cli.config)?;
    let app = App::build(config).await?;

    match cli.command {
        Commands::Run => run_bot(app).await,
        Commands::Prices => show_prices(app).await,
        Commands::Leaderboard { limit } => show_leaderboard(app, limit).await,
        Commands::Settle => settle_once(app).await,
    }
}

async fn run_bot(app: App) -> anyhow::Result<()> {
    tracing::info!("Starting fake crypto bot");

    let api = Arc::new(TelegramApi::new(&app.config.telegram)?);
    if app.config.telegram.admin_ids.is_empty() {
        tracing::warn!("No admin ids configured, /adminstats is disabled");
    }

    // Warm the cache before taking commands
    app.prices.refresh().await;

    let refresher = tokio::spawn(run_refresher(
        app.prices.clone(),
        Duration::from_secs(app.config.prices.refresh_interval_secs),
    ));

    let notifier: Arc<dyn Notifier> = api.clone();
    let scheduler = SettlementScheduler::new(
        app.games.clone(),
        notifier,
        Duration::from_secs(app.config.games.prediction.poll_interval_secs),
    );
    let settlement = tokio::spawn(scheduler.run());

    let dispatcher = Arc::new(Dispatcher::new(
        app.config.clone(),
        app.ledger.clone(),
        app.prices.clone(),
        app.games.clone(),
    ));
    let bot = Arc::new(TelegramBot::new(api, dispatcher));
    let polling = tokio::spawn(bot.start_polling());

    tracing::info!(
        "Bot running with {} assets, starting balance {}",
        app.prices.assets().len(),
        app.config.economy.starting_balance
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");

    polling.abort();
    settlement.abort();
    refresher.abort();
    app.ledger.database().pool().close().await;
    Ok(())
}

async fn show_prices(app: App) -> anyhow::Result<()> {
    let quotes = app.prices.all_prices().await?;

    println!("\n📊 Current Prices:\n");
    println!("{:<8} {:>16}", "Symbol", "Price");
    println!("{}", "-".repeat(26));

    for quote in quotes {
        println!(
            "{:<8} {:>16}{}",
            quote.symbol,
            format::price(quote.price),
            if quote.stale { " (stale)" } else { "" }
        );
    }

    Ok(())
}

async fn show_leaderboard(app: App, limit: usize) -> anyhow::Result<()> {
    // Net worth uses cached prices, so fetch once first
    app.prices.refresh().await;
    let stats = StatsView::new(app.ledger.clone(), app.prices.clone());
    let entries = stats.leaderboard(limit).await?;

    println!("\n🏆 Top {} Players:\n", limit);
    println!("{:<5} {:<24} {:>16} {:>16}", "Rank", "Player", "Cash", "Net Worth");
    println!("{}", "-".repeat(64));

    for entry in entries {
        println!(
            "{:<5} {:<24} {:>16} {:>16}",
            entry.rank,
            entry.user.label(),
            format::money(entry.user.balance),
            format::money(entry.net_worth)
        );
    }

    Ok(())
}

async fn settle_once(app: App) -> anyhow::Result<()> {
    let settled = app.games.resolve_due(chrono::Utc::now()).await?;

    // Tell players when a bot token is available
    let api = TelegramApi::new(&app.config.telegram).ok();

    for receipt in &settled {
        let round = &receipt.round;
        println!(
            "{} user {} {} payout {}",
            round.id,
            round.user_id,
            round.status.as_str(),
            format::money(round.payout)
        );

        if let (Some(api), Some(p)) = (&api, &round.prediction) {
            if let Err(e) = api.notify(p.chat_id, &format::prediction_settled(receipt)).await {
                tracing::warn!("Could not notify chat {}: {}", p.chat_id, e);
            }
        }
    }

    let paid: Decimal = settled.iter().map(|r| r.round.payout).sum();
    println!("\n✅ Settled {} predictions, paid {}", settled.len(), format::money(paid));
    Ok(())
}
