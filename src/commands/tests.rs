use super::*;
use crate::config::Config;
use crate::testing::{test_config, Harness};
use rust_decimal_macros::dec;

struct Bot {
    h: Harness,
    dispatcher: Dispatcher,
}

impl Bot {
    async fn new() -> Self {
        Self::with_config(test_config()).await
    }

    async fn with_config(mut config: Config) -> Self {
        // Cooldowns get their own tests
        config.cooldowns.0.clear();
        Self::build(config).await
    }

    async fn build(config: Config) -> Self {
        let h = Harness::with_config(config).await;
        let games = Arc::new(GameEngine::with_rng(
            h.ledger.clone(),
            h.prices.clone(),
            h.config.games.clone(),
            h.config.economy.clone(),
            5,
        ));
        let dispatcher = Dispatcher::new(
            Arc::new(h.config.clone()),
            h.ledger.clone(),
            h.prices.clone(),
            games,
        );
        Self { h, dispatcher }
    }

    async fn send(&self, user_id: UserId, text: &str) -> String {
        self.dispatcher
            .handle(&IncomingMessage {
                user_id,
                chat_id: user_id,
                display_name: Some(format!("player{}", user_id)),
                text: text.to_string(),
            })
            .await
            .expect("command should get a reply")
    }
}

#[test]
fn test_split_command() {
    assert_eq!(
        split_command("/buy@FakeCryptoBot btc 100"),
        Some(("buy".to_string(), vec!["btc", "100"]))
    );
    assert_eq!(split_command("  /HELP  "), Some(("help".to_string(), vec![])));
    assert_eq!(split_command("hello there"), None);
    assert_eq!(split_command("/"), None);
}

#[test]
fn test_parse_commands() {
    assert_eq!(
        Command::from_parts("buy", &["BTC", "$1,000"]).unwrap(),
        Command::Buy {
            symbol: "BTC".into(),
            amount: dec!(1000)
        }
    );
    assert_eq!(
        Command::from_parts("predict", &["eth", "down", "25.5"]).unwrap(),
        Command::Predict {
            symbol: "eth".into(),
            direction: Direction::Down,
            bet: dec!(25.5)
        }
    );
    assert_eq!(
        Command::from_parts("roll", &["5"]).unwrap(),
        Command::Roll { bet: dec!(5) }
    );
    assert_eq!(
        Command::from_parts("moon", &[]).unwrap(),
        Command::Unknown("moon".into())
    );
}

#[test]
fn test_parse_rejects_bad_arguments() {
    for (name, args) in [
        ("buy", vec!["BTC"]),
        ("buy", vec!["BTC", "lots"]),
        ("sell", vec![]),
        ("coinflip", vec!["1", "2"]),
        ("predict", vec!["BTC", "SIDEWAYS", "10"]),
        ("predict", vec!["BTC", "UP"]),
    ] {
        let result = Command::from_parts(name, &args);
        assert!(
            matches!(result, Err(BotError::Validation(_))),
            "/{} {:?} gave {:?}",
            name,
            args,
            result
        );
    }
}

#[tokio::test]
async fn test_non_commands_are_ignored() {
    let bot = Bot::new().await;
    let reply = bot
        .dispatcher
        .handle(&IncomingMessage {
            user_id: 1,
            chat_id: 1,
            display_name: None,
            text: "gm".into(),
        })
        .await;
    assert!(reply.is_none());
}

#[tokio::test]
async fn test_start_then_trade() {
    let bot = Bot::new().await;

    let welcome = bot.send(1, "/start").await;
    assert!(welcome.contains("Welcome to Fake Crypto World"));
    assert!(welcome.contains("$10,000.00"));
    assert!(bot.send(1, "/start").await.contains("Welcome back"));

    let buy = bot.send(1, "/buy btc 1000").await;
    assert!(buy.contains("Purchase Successful"), "{}", buy);
    assert!(buy.contains("0.02 BTC"));
    assert!(buy.contains("$9,000.00"));

    let portfolio = bot.send(1, "/portfolio").await;
    assert!(portfolio.contains("BTC: 0.02"));

    let sell = bot.send(1, "/sell BTC").await;
    assert!(sell.contains("Sale Successful"));
    assert!(sell.contains("$10,000.00"));

    let again = bot.send(1, "/sell BTC").await;
    assert_eq!(again, "❌ You don't own any BTC!");
}

#[tokio::test]
async fn test_unregistered_user_is_asked_to_start() {
    let bot = Bot::new().await;
    let reply = bot.send(5, "/coinflip 10").await;
    assert!(reply.contains("/start"));
    assert!(bot.h.ledger.user(5).await.is_err());
}

#[tokio::test]
async fn test_user_errors_become_messages() {
    let bot = Bot::new().await;
    bot.send(1, "/start").await;

    assert!(bot.send(1, "/buy DOGE 10").await.contains("Unsupported coin: DOGE"));
    assert!(bot.send(1, "/buy BTC 20000").await.contains("Insufficient funds! You have $10,000.00"));
    assert!(bot.send(1, "/buy BTC").await.contains("Usage: /buy"));
    assert!(bot.send(1, "/slots 0.5").await.contains("minimum bet"));
    assert!(bot.send(1, "/teleport").await.contains("Unknown command: /teleport"));
}

#[tokio::test]
async fn test_prices_lists_every_asset() {
    let bot = Bot::new().await;
    let reply = bot.send(2, "/prices").await;
    assert!(reply.contains("<b>BTC</b>: $50,000.00"));
    assert!(reply.contains("<b>ETH</b>: $3,000.00"));
    assert!(reply.contains("<b>SOL</b>: $150.00"));
}

#[tokio::test]
async fn test_prices_when_feed_never_answered() {
    let bot = Bot::new().await;
    bot.h.source.fail(true);
    assert!(bot.send(2, "/prices").await.contains("Price data unavailable"));
}

#[tokio::test]
async fn test_games_through_chat() {
    let bot = Bot::new().await;
    bot.send(1, "/start").await;

    assert!(bot.send(1, "/coinflip 100").await.contains("COIN FLIP"));
    assert!(bot.send(1, "/slots 100").await.contains("SLOT MACHINE"));
    assert!(bot.send(1, "/roll 100").await.contains("DICE ROLL"));

    let predict = bot.send(1, "/predict eth up 100").await;
    assert!(predict.contains("PRICE PREDICTION ACTIVE"), "{}", predict);
    let open = bot.send(1, "/predictions").await;
    assert!(open.contains("ETH UP from $3,000.00"));

    let user = bot.h.ledger.user(1).await.unwrap();
    assert_eq!(user.total_rounds, 4);
    assert_eq!(user.wagered, dec!(400));
}

#[tokio::test]
async fn test_admin_stats_is_restricted() {
    let bot = Bot::new().await;
    bot.send(1, "/start").await;
    bot.send(2, "/start").await;

    assert!(bot.send(2, "/adminstats").await.contains("admins only"));

    let stats = bot.send(1, "/adminstats").await;
    assert!(stats.contains("Total Users</b>: 2"));
    assert!(stats.contains("$20,000.00"));
}

#[tokio::test]
async fn test_leaderboard_and_stats() {
    let bot = Bot::new().await;
    assert!(bot.send(1, "/leaderboard").await.contains("No players yet"));

    bot.send(1, "/start").await;
    bot.send(2, "/start").await;
    bot.send(2, "/buy SOL 1500").await;

    let board = bot.send(3, "/leaderboard").await;
    assert!(board.contains("🥇 <b>player1</b>"));
    assert!(board.contains("🥈 <b>player2</b>"));

    let stats = bot.send(2, "/stats").await;
    assert!(stats.contains("Total Trades</b>: 1"));
    assert!(stats.contains("📈 Bought 10 SOL @ $150.00"));
}

#[tokio::test]
async fn test_cooldown_applies_before_validation() {
    let bot = Bot::build(test_config()).await;
    bot.send(1, "/start").await;

    assert!(bot.send(1, "/buy BTC nope").await.contains("Invalid amount"));
    let throttled = bot.send(1, "/buy BTC 10").await;
    assert!(throttled.contains("speed trader"), "{}", throttled);

    // Other commands are unaffected
    assert!(bot.send(1, "/sell BTC").await.contains("don't own any BTC"));
}

#[tokio::test]
async fn test_slow_command_times_out() {
    let mut bot = Bot::new().await;
    bot.dispatcher = bot.dispatcher.with_command_timeout(Duration::from_millis(20));
    bot.h.source.set_delay(Duration::from_millis(200));

    assert!(bot.send(1, "/prices").await.contains("took too long"));
}
