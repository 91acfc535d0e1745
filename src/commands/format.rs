//! HTML chat replies

use crate::error::BotError;
use crate::games::{GameDetail, GameResult, PredictionTicket};
use crate::ledger::RoundReceipt;
use crate::stats::{AdminStats, LeaderboardEntry, PortfolioView, UserStats};
use crate::storage::Counter;
use crate::trading::TradeConfirmation;
use crate::types::{GameRound, PriceQuote, RoundStatus, TradeSide, User};
use chrono::Utc;
use rust_decimal::Decimal;
use std::fmt::Write;

const BUY_QUIPS: &[&str] = &[
    "Congratulations! You just bought the top! 📈",
    "Bold move! Let's see if this ages well... 🍷",
    "Another satisfied customer enters the casino! 🎰",
    "You're either a genius or about to learn an expensive lesson! 🧠",
    "Welcome to the rollercoaster of emotions! 🎢",
];

const SELL_QUIPS: &[&str] = &[
    "Not bad! You managed to exit before total destruction! 🎯",
    "Profit is profit, even if it's fake! 💰",
    "You sold! Someone else is holding the bag now! 💼",
    "Cashed out like a true paper hands champion! 🙌",
    "Timing the market? In this economy?! 📈",
];

const MEDALS: [&str; 3] = ["🥇", "🥈", "🥉"];

pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// `$1,234.56`
pub fn money(amount: Decimal) -> String {
    let rounded = amount.round_dp(2);
    let sign = if rounded.is_sign_negative() && !rounded.is_zero() { "-" } else { "" };
    let text = format!("{:.2}", rounded.abs());
    let (whole, cents) = text.split_once('.').unwrap_or((text.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, digit) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    format!("{}${}.{}", sign, grouped, cents)
}

/// `+$12.50` / `-$3.00`
fn signed_money(amount: Decimal) -> String {
    if amount > Decimal::ZERO {
        format!("+{}", money(amount))
    } else {
        money(amount)
    }
}

/// Unit price: cents from $1 up, up to six decimals below
pub fn price(amount: Decimal) -> String {
    if amount.abs() >= Decimal::ONE {
        return money(amount);
    }
    let mut rounded = amount.round_dp(6).normalize();
    if rounded.scale() < 2 {
        rounded.rescale(2);
    }
    let sign = if rounded.is_sign_negative() && !rounded.is_zero() { "-" } else { "" };
    format!("{}${}", sign, rounded.abs())
}

fn signed_price(amount: Decimal) -> String {
    if amount > Decimal::ZERO {
        format!("+{}", price(amount))
    } else {
        price(amount)
    }
}

/// Asset quantity with trailing zeros dropped
pub fn quantity(amount: Decimal) -> String {
    amount.round_dp(8).normalize().to_string()
}

fn multiplier(m: Decimal) -> String {
    format!("x{}", m.normalize())
}

fn pick<'a>(quips: &[&'a str], seed: usize) -> &'a str {
    quips[seed % quips.len()]
}

pub fn welcome(user: &User, created: bool) -> String {
    let greeting = if created {
        "🎮 <b>Welcome to Fake Crypto World!</b> 🎮"
    } else {
        "🎮 <b>Welcome back to Fake Crypto World!</b> 🎮"
    };
    format!(
        "{}\n\n💵 Balance: {}\n📈 Trade crypto with REAL prices using FAKE money!\n\
         🎲 Gamble your fake fortune in mini-games!\n\nSend /help for the list of commands.\n\n\
         Remember: This is FAKE money, but your regret is REAL! 😄",
        greeting,
        money(user.balance)
    )
}

pub fn help(symbols: &[&str], settle_delay_secs: u64) -> String {
    let minutes = settle_delay_secs.div_ceil(60);
    format!(
        "🎮 <b>Fake Crypto World Commands</b> 🎮\n\n\
         <b>📈 Trading:</b>\n\
         /prices - Current market prices\n\
         /buy &lt;COIN&gt; &lt;AMOUNT&gt; - Buy crypto (e.g. /buy BTC 1000)\n\
         /sell &lt;COIN&gt; - Sell all of a coin (e.g. /sell ETH)\n\
         /portfolio - View your holdings\n\n\
         <b>🎲 Gambling:</b>\n\
         /coinflip &lt;AMOUNT&gt; - Double or nothing\n\
         /slots &lt;AMOUNT&gt; - 3-reel slot machine\n\
         /predict &lt;COIN&gt; &lt;UP|DOWN&gt; &lt;AMOUNT&gt; - Predict the price in {} min\n\
         /predictions - Your open predictions\n\
         /roll &lt;AMOUNT&gt; - Roll 1-100, higher pays more\n\n\
         <b>📊 Stats:</b>\n\
         /leaderboard - Top players\n\
         /stats - Your statistics\n\
         /help - Show this message\n\n\
         <b>💰 Supported Coins:</b>\n{}\n\n\
         Remember: All money is FAKE! Trade responsibly! 😄",
        minutes,
        symbols.join(", ")
    )
}

pub fn prices(quotes: &[PriceQuote], ttl_secs: u64) -> String {
    let mut out = String::from("📊 <b>Current Crypto Prices</b> 📊\n\n");
    for quote in quotes {
        let _ = write!(out, "<b>{}</b>: {}", quote.symbol, price(quote.price));
        if quote.stale {
            out.push_str(" ⚠️");
        }
        out.push('\n');
    }
    if quotes.iter().any(|q| q.stale) {
        out.push_str("\n⚠️ Some prices are outdated, the price feed is not responding");
    }
    let _ = write!(out, "\n💡 Prices update every {} seconds", ttl_secs);
    out
}

fn stale_note(stale: bool) -> &'static str {
    if stale {
        "\n⚠️ Price feed is lagging, last known price used"
    } else {
        ""
    }
}

pub fn trade(confirmation: &TradeConfirmation) -> String {
    let trade = &confirmation.receipt.trade;
    let seed = trade.id.unsigned_abs() as usize;
    match trade.side {
        TradeSide::Buy => format!(
            "✅ <b>Purchase Successful!</b> ✅\n\n\
             💰 Bought: {} {}\n💵 Spent: {}\n📊 Price: {}\n💳 Remaining Balance: {}{}\n\n{}",
            quantity(trade.quantity),
            trade.symbol,
            money(trade.total_value),
            price(trade.price),
            money(confirmation.receipt.balance),
            stale_note(confirmation.price_stale),
            pick(BUY_QUIPS, seed)
        ),
        TradeSide::Sell => format!(
            "✅ <b>Sale Successful!</b> ✅\n\n\
             💎 Sold: {} {}\n💵 Received: {}\n📊 Price: {}\n💳 New Balance: {}{}\n\n{}",
            quantity(trade.quantity),
            trade.symbol,
            money(trade.total_value),
            price(trade.price),
            money(confirmation.receipt.balance),
            stale_note(confirmation.price_stale),
            pick(SELL_QUIPS, seed)
        ),
    }
}

pub fn portfolio(view: &PortfolioView) -> String {
    let mut out = format!(
        "💼 <b>Your Portfolio</b> 💼\n\n💵 <b>Cash</b>: {}\n📈 <b>Crypto Value</b>: {}\n\
         💎 <b>Total Net Worth</b>: {}\n\n",
        money(view.user.balance),
        money(view.holdings_value),
        money(view.net_worth)
    );

    if view.positions.is_empty() {
        out.push_str("No crypto holdings yet. Start trading with /buy!\n");
    } else {
        out.push_str("<b>Holdings:</b>\n");
        for position in &view.positions {
            let value = position.value.map(money).unwrap_or_else(|| "price unknown".into());
            let _ = writeln!(out, "• {}: {} ({})", position.symbol, quantity(position.quantity), value);
        }
    }
    let _ = write!(out, "\n📊 Total Trades: {}", view.user.total_trades);
    out
}

fn game_footer(result: &GameResult) -> String {
    let outcome = if result.won() {
        format!("🎉 You won {}! ({})", money(result.round.payout), multiplier(result.multiplier))
    } else {
        format!("💸 You lost {}!", money(result.round.bet))
    };
    format!(
        "💰 Bet: {}\n{}\n💳 New Balance: {}",
        money(result.round.bet),
        outcome,
        money(result.balance)
    )
}

pub fn game(result: &GameResult) -> String {
    match &result.detail {
        GameDetail::CoinFlip(side) => format!(
            "🪙 <b>COIN FLIP</b> 🪙\n\n🪙 <b>{}!</b>\n{}\n\n{}",
            side.as_str(),
            game_footer(result),
            if result.won() {
                "Lady Luck smiles upon you!"
            } else {
                "Better luck next time, gambler!"
            }
        ),
        GameDetail::Slots(reels) => {
            let quip = if result.multiplier >= Decimal::TEN {
                "Jackpot vibes!"
            } else if result.won() {
                "Small wins count too!"
            } else {
                "The house always wins... eventually!"
            };
            format!(
                "🎰 <b>SLOT MACHINE</b> 🎰\n\n{}\n\n{}\n\n{}",
                reels.join(" | "),
                game_footer(result),
                quip
            )
        }
        GameDetail::Dice(roll) => {
            let quip = match roll {
                95..=u8::MAX => "Incredible luck!",
                85..=94 => "Great roll!",
                70..=84 => "Not bad!",
                50..=69 => "Close!",
                _ => "Ouch! Try again!",
            };
            format!(
                "🎲 <b>DICE ROLL</b> 🎲\n\n🎯 Roll: {}/100\n{}\n\n{}",
                roll,
                game_footer(result),
                quip
            )
        }
    }
}

pub fn prediction_placed(ticket: &PredictionTicket) -> String {
    let prediction = ticket.round.prediction.as_ref();
    let symbol = prediction.map(|p| p.symbol.as_str()).unwrap_or("?");
    let direction = prediction.map(|p| p.direction.as_str()).unwrap_or("?");
    let secs = (ticket.settle_at - Utc::now()).num_seconds().max(0) as u64;

    format!(
        "🔮 <b>PRICE PREDICTION ACTIVE</b> 🔮\n\n💰 Coin: {}\n📊 Current Price: {}{}\n🎯 Prediction: {}\n\
         💵 Bet: {}\n💳 Balance: {}\n\n⏰ Settles in about {} min, I'll message you the result.\n\n\
         Fortune favors the bold... or does it? 🤔",
        symbol,
        price(ticket.start_price),
        stale_note(ticket.price_stale),
        direction,
        money(ticket.round.bet),
        money(ticket.balance),
        secs.div_ceil(60)
    )
}

pub fn prediction_settled(receipt: &RoundReceipt) -> String {
    let round = &receipt.round;
    let Some(p) = round.prediction.as_ref() else {
        return format!("🔮 Round {} resolved: {}", round.id, round.status.as_str());
    };

    match (round.status, p.end_price) {
        (RoundStatus::Won, Some(end)) => format!(
            "🎉 <b>PREDICTION WON!</b> 🎉\n\n💰 {}: {} → {}\n📈 Change: {}\n🎯 Your Prediction: {} ✅\n\
             💵 Winnings: {}\n💳 New Balance: {}\n\nYou're either psychic or lucky! 🔮",
            p.symbol,
            price(p.start_price),
            price(end),
            signed_price(end - p.start_price),
            p.direction.as_str(),
            money(round.payout),
            money(receipt.balance)
        ),
        (RoundStatus::Lost, Some(end)) => format!(
            "💸 <b>PREDICTION LOST</b> 💸\n\n💰 {}: {} → {}\n📉 Change: {}\n🎯 Your Prediction: {} ❌\n\
             💸 Lost: {}\n💳 Balance: {}\n\nThe market giveth, the market taketh! 📉",
            p.symbol,
            price(p.start_price),
            price(end),
            signed_price(end - p.start_price),
            p.direction.as_str(),
            money(round.bet),
            money(receipt.balance)
        ),
        _ => format!(
            "🔮 Your {} prediction was refunded because no price was available. {} returned.\n\
             💳 Balance: {}",
            p.symbol,
            money(round.payout),
            money(receipt.balance)
        ),
    }
}

pub fn pending_predictions(rounds: &[GameRound]) -> String {
    if rounds.is_empty() {
        return "🔮 No open predictions. Try /predict BTC UP 100".to_string();
    }

    let now = Utc::now();
    let mut out = String::from("🔮 <b>Open Predictions</b> 🔮\n\n");
    for round in rounds {
        if let Some(p) = &round.prediction {
            let left = (p.settle_at - now).num_seconds().max(0);
            let _ = writeln!(
                out,
                "• {} {} from {} for {} (settles in {}s)",
                p.symbol,
                p.direction.as_str(),
                price(p.start_price),
                money(round.bet),
                left
            );
        }
    }
    out
}

pub fn leaderboard(entries: &[LeaderboardEntry]) -> String {
    if entries.is_empty() {
        return "📊 No players yet! Be the first to start trading!".to_string();
    }

    let mut out = String::from("🏆 <b>TOP FAKE CRYPTO MILLIONAIRES</b> 🏆\n\n");
    for entry in entries {
        let rank = MEDALS
            .get(entry.rank - 1)
            .map(|m| m.to_string())
            .unwrap_or_else(|| format!("{}.", entry.rank));
        let _ = write!(
            out,
            "{} <b>{}</b>\n💵 Cash: {}\n📈 Crypto: {}\n💎 Net Worth: {}\n📊 Trades: {}\n\n",
            rank,
            escape_html(&entry.user.label()),
            money(entry.user.balance),
            money(entry.holdings_value),
            money(entry.net_worth),
            entry.user.total_trades
        );
    }
    out.push_str("💡 Ranked by cash balance");
    out
}

pub fn user_stats(stats: &UserStats) -> String {
    let view = &stats.portfolio;
    let user = &view.user;
    let mut out = format!(
        "📊 <b>Your Trading Statistics</b> 📊\n\n💎 <b>Net Worth</b>: {}\n💵 <b>Cash</b>: {}\n\
         📈 <b>Crypto Value</b>: {}\n\n💰 <b>Profit/Loss</b>: {} ({}{}%)\n📊 <b>Total Trades</b>: {}\n\
         🎲 <b>Games Played</b>: {}\n🎰 <b>Wagered</b>: {}\n🏦 <b>Paid Out</b>: {}\n\
         🔮 <b>Open Predictions</b>: {}\n📅 <b>Member Since</b>: {}\n\n<b>📈 Recent Trades:</b>\n",
        money(view.net_worth),
        money(user.balance),
        money(view.holdings_value),
        signed_money(stats.profit_loss),
        if stats.profit_pct > Decimal::ZERO { "+" } else { "" },
        stats.profit_pct,
        user.total_trades,
        user.total_rounds,
        money(user.wagered),
        money(user.paid_out),
        stats.pending_predictions,
        user.created_at.format("%Y-%m-%d")
    );

    if stats.recent_trades.is_empty() {
        out.push_str("No trades yet! Start with /buy or /sell");
    }
    for trade in &stats.recent_trades {
        let action = match trade.side {
            TradeSide::Buy => "📈 Bought",
            TradeSide::Sell => "📉 Sold",
        };
        let _ = writeln!(
            out,
            "{} {} {} @ {}",
            action,
            quantity(trade.quantity),
            trade.symbol,
            price(trade.price)
        );
    }
    out
}

pub fn admin_stats(stats: &AdminStats) -> String {
    let c = &stats.counters;
    let last_update = stats
        .cache
        .last_success
        .map(|at| format!("{}s ago", (Utc::now() - at).num_seconds().max(0)))
        .unwrap_or_else(|| "never".to_string());

    let mut out = format!(
        "🔧 <b>Bot Admin Statistics</b> 🔧\n\n👥 <b>Total Users</b>: {}\n📊 <b>Total Trades</b>: {}\n\
         🎲 <b>Total Rounds</b>: {}\n🔥 <b>Active Users (24h)</b>: {}\n💱 <b>Trade Volume</b>: {}\n\
         🎰 <b>Wagered</b>: {}\n🏦 <b>Paid Out</b>: {}\n💰 <b>Total Fake Money</b>: {}\n\n\
         <b>📈 Price Cache Status:</b>\n{}/{} coins cached\nLast update: {}",
        c.get(Counter::TotalUsers),
        c.get(Counter::TotalTrades),
        c.get(Counter::TotalRounds),
        stats.active_24h,
        money(c.get(Counter::TradeVolume)),
        money(c.get(Counter::TotalWagered)),
        money(c.get(Counter::TotalPaidOut)),
        money(c.get(Counter::CirculatingCash)),
        stats.cache.cached_assets,
        stats.cache.total_assets,
        last_update
    );
    if let Some(error) = &stats.cache.last_error {
        let _ = write!(out, "\nLast error: {}", escape_html(error));
    }
    out
}

fn cooldown_quip(command: &str) -> &'static str {
    match command {
        "buy" => "⏰ Slow down there, speed trader! Wait a moment.",
        "sell" => "⏰ Easy there, day trader! Take a breath.",
        "coinflip" => "🪙 The coin is still spinning from your last flip!",
        "slots" => "🎰 The slots are still spinning!",
        "predict" => "🔮 Your crystal ball is still charging!",
        "roll" => "🎲 The dice are still rolling!",
        _ => "⏰ Slow down!",
    }
}

/// Chat text for a failed command
pub fn error(err: &BotError) -> String {
    match err {
        BotError::Validation(msg) => format!("❌ {}", escape_html(msg)),
        BotError::InsufficientFunds { available, .. } => {
            format!("❌ Insufficient funds! You have {}", money(*available))
        }
        BotError::UnsupportedAsset(symbol) => format!(
            "❌ Unsupported coin: {}. See /prices for the list.",
            escape_html(symbol)
        ),
        BotError::NoHolding(symbol) => format!("❌ You don't own any {}!", escape_html(symbol)),
        BotError::UpstreamUnavailable(_) => "🚫 Price data unavailable. Try again later!".to_string(),
        BotError::RateLimited { command, retry_after } => format!(
            "{} (try again in {}s)",
            cooldown_quip(command),
            retry_after.as_secs_f64().ceil() as u64
        ),
        BotError::PermissionDenied => "🚫 That command is for admins only.".to_string(),
        BotError::NotRegistered(_) => "👋 You don't have an account yet. Send /start to begin!".to_string(),
        _ => "😵 Something went wrong on our side. Please try again later.".to_string(),
    }
}

pub fn unknown_command(name: &str) -> String {
    format!(
        "❓ Unknown command: /{}\nUse /help for available commands",
        escape_html(name)
    )
}

pub fn timed_out() -> String {
    "⌛ That took too long. Please try again in a moment.".to_string()
}
