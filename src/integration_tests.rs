//! End-to-end flows across trading, games and the ledger

#[cfg(test)]
mod tests {
    use crate::commands::{Dispatcher, IncomingMessage};
    use crate::games::GameEngine;
    use crate::storage::Counter;
    use crate::testing::{test_config, Harness};
    use crate::trading::TradingEngine;
    use crate::types::{Direction, RoundStatus};
    use chrono::Utc;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn games(h: &Harness, seed: u64) -> Arc<GameEngine> {
        Arc::new(GameEngine::with_rng(
            h.ledger.clone(),
            h.prices.clone(),
            h.config.games.clone(),
            h.config.economy.clone(),
            seed,
        ))
    }

    #[tokio::test]
    async fn test_new_player_buys_and_sells_bitcoin() {
        let mut config = test_config();
        config.cooldowns.0.clear();
        let h = Harness::with_config(config).await;
        let dispatcher = Dispatcher::new(
            Arc::new(h.config.clone()),
            h.ledger.clone(),
            h.prices.clone(),
            games(&h, 1),
        );
        let dispatcher = &dispatcher;
        let send = move |text: &str| {
            let msg = IncomingMessage {
                user_id: 100,
                chat_id: 100,
                display_name: Some("hodler".into()),
                text: text.to_string(),
            };
            async move { dispatcher.handle(&msg).await.unwrap() }
        };

        assert!(send("/start").await.contains("$10,000.00"));
        send("/buy BTC 1000").await;

        let user = h.ledger.user(100).await.unwrap();
        let holding = h.db.get_holding(100, "BTC").await.unwrap().unwrap();
        assert_eq!(user.balance, dec!(9000));
        assert_eq!(holding.quantity, dec!(0.02));

        h.move_price("BTC", dec!(55000)).await;
        let sell = send("/sell BTC").await;
        assert!(sell.contains("$10,100.00"), "{}", sell);
        assert!(h.db.get_holding(100, "BTC").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_coin_flip_of_one_hundred() {
        let mut config = test_config();
        config.games.coinflip.win_probability = 1.0;
        let h = Harness::with_config(config).await;
        h.register(1).await;

        let result = games(&h, 3).coin_flip(1, dec!(100)).await.unwrap();
        assert_eq!(result.round.payout, dec!(200));
        assert_eq!(result.balance, dec!(10100));

        let user = h.ledger.user(1).await.unwrap();
        assert_eq!(user.wagered, dec!(100));
        assert_eq!(user.paid_out, dec!(200));
    }

    #[tokio::test]
    async fn test_balance_equals_history_across_mixed_activity() {
        let h = Harness::new().await;
        h.register(1).await;
        let trading = TradingEngine::new(h.ledger.clone(), h.prices.clone());
        let engine = games(&h, 11);

        let mut cash_flow = Decimal::ZERO;
        let mut round_net = Decimal::ZERO;

        for (symbol, amount) in [("BTC", dec!(1200)), ("ETH", dec!(450.55)), ("SOL", dec!(99.99))] {
            cash_flow += trading.buy(1, symbol, amount).await.unwrap().receipt.trade.cash_flow();
        }
        for _ in 0..5 {
            round_net += engine.coin_flip(1, dec!(20)).await.unwrap().round.net();
            round_net += engine.slots(1, dec!(15)).await.unwrap().round.net();
            round_net += engine.roll_dice(1, dec!(10)).await.unwrap().round.net();
        }

        let ticket = engine
            .place_prediction(1, 1, "ETH", Direction::Down, dec!(50))
            .await
            .unwrap();
        h.move_price("ETH", dec!(2900)).await;
        h.move_price("SOL", dec!(180)).await;
        cash_flow += trading.sell(1, "SOL").await.unwrap().receipt.trade.cash_flow();

        let later = Utc::now() + chrono::Duration::seconds(301);
        let settled = engine.resolve_due(later).await.unwrap();
        assert_eq!(settled.len(), 1);
        assert_eq!(settled[0].round.id, ticket.round.id);
        assert_eq!(settled[0].round.status, RoundStatus::Won);
        round_net += settled[0].round.net();

        let user = h.ledger.user(1).await.unwrap();
        assert_eq!(user.balance, dec!(10000) + cash_flow + round_net);
        assert_eq!(user.total_trades, 4);
        assert_eq!(user.total_rounds, 16);
        assert_eq!(user.paid_out - user.wagered, round_net);

        let counters = h.db.counters().await.unwrap();
        assert_eq!(counters.get(Counter::CirculatingCash), user.balance);
        assert_eq!(counters.get(Counter::TotalRounds), dec!(16));
        assert_eq!(counters.get(Counter::TotalWagered), user.wagered);
    }

    #[tokio::test]
    async fn test_players_do_not_affect_each_other() {
        let h = Harness::new().await;
        h.register(1).await;
        h.register(2).await;
        let trading = TradingEngine::new(h.ledger.clone(), h.prices.clone());

        let (a, b) = tokio::join!(
            trading.buy(1, "BTC", dec!(5000)),
            trading.buy(2, "ETH", dec!(6000))
        );
        a.unwrap();
        b.unwrap();

        assert_eq!(h.ledger.user(1).await.unwrap().balance, dec!(5000));
        assert_eq!(h.ledger.user(2).await.unwrap().balance, dec!(4000));
        assert!(h.db.get_holding(1, "ETH").await.unwrap().is_none());
        assert!(h.db.get_holding(2, "BTC").await.unwrap().is_none());
    }
}
