use super::scheduler::MockNotifier;
use super::*;
use crate::config::Config;
use crate::testing::{fast_cache, test_config, Harness, ScriptedPrices};
use rust_decimal_macros::dec;
use std::time::Duration;

fn engine(h: &Harness, seed: u64) -> GameEngine {
    GameEngine::with_rng(
        h.ledger.clone(),
        h.prices.clone(),
        h.config.games.clone(),
        h.config.economy.clone(),
        seed,
    )
}

fn rigged_coin(win_probability: f64) -> Config {
    let mut config = test_config();
    config.games.coinflip.win_probability = win_probability;
    config
}

#[tokio::test]
async fn test_coin_flip_win_pays_double() {
    let h = Harness::with_config(rigged_coin(1.0)).await;
    h.register(1).await;

    let result = engine(&h, 0).coin_flip(1, dec!(100)).await.unwrap();
    assert!(result.won());
    assert_eq!(result.detail, GameDetail::CoinFlip(CoinSide::Heads));
    assert_eq!(result.round.payout, dec!(200));
    assert_eq!(result.round.net(), dec!(100));
    assert_eq!(result.balance, dec!(10100));
}

#[tokio::test]
async fn test_coin_flip_loss_costs_the_bet() {
    let h = Harness::with_config(rigged_coin(0.0)).await;
    h.register(1).await;

    let result = engine(&h, 0).coin_flip(1, dec!(100)).await.unwrap();
    assert!(!result.won());
    assert_eq!(result.round.status, RoundStatus::Lost);
    assert_eq!(result.balance, dec!(9900));
}

#[tokio::test]
async fn test_same_seed_same_outcomes() {
    let first = Harness::new().await;
    let second = Harness::new().await;
    first.register(1).await;
    second.register(1).await;
    let a = engine(&first, 42);
    let b = engine(&second, 42);

    for _ in 0..10 {
        let x = a.coin_flip(1, dec!(10)).await.unwrap();
        let y = b.coin_flip(1, dec!(10)).await.unwrap();
        assert_eq!(x.detail, y.detail);

        let x = a.roll_dice(1, dec!(10)).await.unwrap();
        let y = b.roll_dice(1, dec!(10)).await.unwrap();
        assert_eq!(x.detail, y.detail);
        assert_eq!(x.multiplier, y.multiplier);
    }
    assert_eq!(
        first.ledger.user(1).await.unwrap().balance,
        second.ledger.user(1).await.unwrap().balance
    );
}

#[tokio::test]
async fn test_balance_matches_round_history() {
    let h = Harness::new().await;
    h.register(1).await;
    let games = engine(&h, 7);

    let mut net = Decimal::ZERO;
    for i in 0..30 {
        let result = match i % 3 {
            0 => games.coin_flip(1, dec!(25)).await,
            1 => games.slots(1, dec!(25)).await,
            _ => games.roll_dice(1, dec!(25)).await,
        }
        .unwrap();
        assert!(result.balance >= Decimal::ZERO);
        assert_eq!(result.round.payout, result.round.bet * result.multiplier);
        net += result.round.net();
    }

    assert_eq!(h.ledger.user(1).await.unwrap().balance, dec!(10000) + net);
}

#[tokio::test]
async fn test_slots_outcome_is_recorded() {
    let h = Harness::new().await;
    h.register(1).await;

    let result = engine(&h, 11).slots(1, dec!(50)).await.unwrap();
    let GameDetail::Slots(reels) = &result.detail else {
        panic!("expected slot reels, got {:?}", result.detail);
    };
    assert_eq!(result.round.outcome, reels.join(" | "));
    assert_eq!(
        result.multiplier,
        outcomes::slot_multiplier(reels, &h.config.games.slots)
    );
}

#[tokio::test]
async fn test_bet_limits() {
    let mut config = test_config();
    config.economy.max_bet_fraction = dec!(0.5);
    let h = Harness::with_config(config).await;
    h.register(1).await;
    let games = engine(&h, 0);

    assert!(matches!(games.coin_flip(1, dec!(0.5)).await, Err(BotError::Validation(_))));
    assert!(matches!(games.slots(1, dec!(5000.01)).await, Err(BotError::Validation(_))));
    assert!(matches!(
        games.roll_dice(1, dec!(10000.01)).await,
        Err(BotError::InsufficientFunds { .. })
    ));
    assert!(matches!(
        games.coin_flip(2, dec!(10)).await,
        Err(BotError::NotRegistered(2))
    ));
    assert!(games.slots(1, dec!(5000)).await.is_ok());
    assert_eq!(h.ledger.user(1).await.unwrap().total_rounds, 1);
}

#[tokio::test]
async fn test_default_ceiling_is_half_the_balance() {
    let h = Harness::new().await;
    h.register(1).await;
    let games = engine(&h, 0);

    let err = games.coin_flip(1, dec!(5000.01)).await.unwrap_err();
    assert!(matches!(&err, BotError::Validation(msg) if msg.contains("5000")), "{}", err);
    let result = games.coin_flip(1, dec!(5000)).await.unwrap();
    assert_eq!(result.round.bet, dec!(5000));
}

#[tokio::test]
async fn test_prediction_up_wins_on_rise() {
    let h = Harness::new().await;
    h.register(1).await;
    let games = engine(&h, 0);

    let ticket = games
        .place_prediction(1, 42, "btc", Direction::Up, dec!(100))
        .await
        .unwrap();
    assert_eq!(ticket.start_price, dec!(50000));
    assert_eq!(ticket.balance, dec!(9900));
    assert_eq!(ticket.round.status, RoundStatus::Pending);
    assert!(ticket.settle_at > Utc::now());

    h.move_price("BTC", dec!(50500)).await;
    let receipt = games.resolve_prediction(&ticket.round.id).await.unwrap().unwrap();
    assert_eq!(receipt.round.status, RoundStatus::Won);
    assert_eq!(receipt.round.payout, dec!(200));
    assert_eq!(receipt.balance, dec!(10100));

    // Second resolution is a no-op
    assert!(games.resolve_prediction(&ticket.round.id).await.unwrap().is_none());
    assert_eq!(h.ledger.user(1).await.unwrap().balance, dec!(10100));
}

#[tokio::test]
async fn test_prediction_unchanged_price_loses() {
    let h = Harness::new().await;
    h.register(1).await;
    let games = engine(&h, 0);

    let ticket = games
        .place_prediction(1, 1, "ETH", Direction::Down, dec!(100))
        .await
        .unwrap();
    h.move_price("ETH", dec!(3000)).await;
    let receipt = games.resolve_prediction(&ticket.round.id).await.unwrap().unwrap();
    assert_eq!(receipt.round.status, RoundStatus::Lost);
    assert_eq!(receipt.balance, dec!(9900));
    assert_eq!(
        receipt.round.prediction.unwrap().end_price,
        Some(dec!(3000))
    );
}

#[tokio::test]
async fn test_prediction_refunded_without_any_price() {
    let h = Harness::new().await;
    h.register(1).await;
    let ticket = engine(&h, 0)
        .place_prediction(1, 1, "SOL", Direction::Up, dec!(100))
        .await
        .unwrap();

    // A restarted process whose feed is down has no price at all
    let dead = ScriptedPrices::new(&[]);
    dead.fail(true);
    let restarted = GameEngine::new(
        h.ledger.clone(),
        Arc::new(fast_cache(dead)),
        h.config.games.clone(),
        h.config.economy.clone(),
    );

    let receipt = restarted.resolve_prediction(&ticket.round.id).await.unwrap().unwrap();
    assert_eq!(receipt.round.status, RoundStatus::Refunded);
    assert_eq!(receipt.round.payout, dec!(100));
    assert_eq!(receipt.balance, dec!(10000));
}

#[tokio::test]
async fn test_prediction_refunded_when_feed_died_before_the_bet() {
    let h = Harness::new().await;
    h.register(1).await;
    let games = engine(&h, 0);
    h.prices.get_price("BTC").await.unwrap();
    h.source.fail(true);
    tokio::time::sleep(Duration::from_millis(60)).await;

    let ticket = games
        .place_prediction(1, 1, "BTC", Direction::Up, dec!(100))
        .await
        .unwrap();
    assert!(ticket.price_stale);
    assert_eq!(ticket.start_price, dec!(50000));

    // Only the pre-bet snapshot is cached at settlement
    tokio::time::sleep(Duration::from_millis(60)).await;
    let receipt = games.resolve_prediction(&ticket.round.id).await.unwrap().unwrap();
    assert_eq!(receipt.round.status, RoundStatus::Refunded);
    assert_eq!(receipt.round.payout, dec!(100));
    assert_eq!(receipt.round.prediction.unwrap().end_price, None);
    assert_eq!(receipt.balance, dec!(10000));
}

#[tokio::test]
async fn test_prediction_settles_once_feed_recovers() {
    let h = Harness::new().await;
    h.register(1).await;
    let games = engine(&h, 0);
    h.prices.get_price("SOL").await.unwrap();
    h.source.fail(true);
    tokio::time::sleep(Duration::from_millis(60)).await;

    let ticket = games
        .place_prediction(1, 1, "SOL", Direction::Down, dec!(50))
        .await
        .unwrap();
    h.source.fail(false);
    h.move_price("SOL", dec!(140)).await;

    let receipt = games.resolve_prediction(&ticket.round.id).await.unwrap().unwrap();
    assert_eq!(receipt.round.status, RoundStatus::Won);
    assert_eq!(receipt.balance, dec!(10050));
}

#[tokio::test]
async fn test_resolve_due_only_settles_expired_rounds() {
    let h = Harness::new().await;
    h.register(1).await;
    let games = engine(&h, 0);
    games
        .place_prediction(1, 1, "BTC", Direction::Down, dec!(10))
        .await
        .unwrap();

    assert!(games.resolve_due(Utc::now()).await.unwrap().is_empty());

    let later = Utc::now() + chrono::Duration::seconds(301);
    let settled = games.resolve_due(later).await.unwrap();
    assert_eq!(settled.len(), 1);
    assert!(games.resolve_due(later).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_scheduler_notifies_the_betting_chat() {
    let h = Harness::new().await;
    h.register(1).await;
    let games = Arc::new(engine(&h, 0));
    games
        .place_prediction(1, 4242, "BTC", Direction::Up, dec!(10))
        .await
        .unwrap();
    h.move_price("BTC", dec!(60000)).await;

    let mut notifier = MockNotifier::new();
    notifier
        .expect_notify()
        .withf(|chat_id, text| *chat_id == 4242 && text.contains("BTC"))
        .times(1)
        .returning(|_, _| Ok(()));

    let scheduler = SettlementScheduler::new(games, Arc::new(notifier), Duration::from_secs(5));
    let later = Utc::now() + chrono::Duration::seconds(301);
    assert_eq!(scheduler.tick(later).await.unwrap(), 1);
    assert_eq!(scheduler.tick(later).await.unwrap(), 0);
}

#[tokio::test]
async fn test_scheduler_survives_notify_failure() {
    let h = Harness::new().await;
    h.register(1).await;
    let games = Arc::new(engine(&h, 0));
    games
        .place_prediction(1, 9, "ETH", Direction::Up, dec!(10))
        .await
        .unwrap();

    let mut notifier = MockNotifier::new();
    notifier
        .expect_notify()
        .returning(|_, _| Err(BotError::Api("chat not found".into())));

    let scheduler = SettlementScheduler::new(games, Arc::new(notifier), Duration::from_secs(5));
    let later = Utc::now() + chrono::Duration::seconds(301);
    assert_eq!(scheduler.tick(later).await.unwrap(), 1);
    assert_eq!(h.ledger.user(1).await.unwrap().total_rounds, 1);
}
