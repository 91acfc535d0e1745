//! Pure game outcome rules

use crate::config::{CoinFlipConfig, DiceConfig, SlotsConfig};
use rand::seq::IndexedRandom;
use rand::Rng;
use rust_decimal::Decimal;

/// Which side the coin landed on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoinSide {
    Heads,
    Tails,
}

impl CoinSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            CoinSide::Heads => "HEADS",
            CoinSide::Tails => "TAILS",
        }
    }
}

/// Heads wins
pub fn flip<R: Rng + ?Sized>(rng: &mut R, config: &CoinFlipConfig) -> CoinSide {
    if rng.random_bool(config.win_probability.clamp(0.0, 1.0)) {
        CoinSide::Heads
    } else {
        CoinSide::Tails
    }
}

pub fn spin<R: Rng + ?Sized>(rng: &mut R, config: &SlotsConfig) -> [String; 3] {
    let mut draw = || config.symbols.choose(rng).cloned().unwrap_or_default();
    [draw(), draw(), draw()]
}

/// Multiplier for a set of reels
pub fn slot_multiplier(reels: &[String; 3], config: &SlotsConfig) -> Decimal {
    let [a, b, c] = reels;
    if a == b && b == c {
        return config
            .jackpots
            .iter()
            .find(|j| &j.symbol == a)
            .map(|j| j.multiplier)
            .unwrap_or(config.three_match);
    }
    if a == b || b == c || a == c {
        return config.two_match;
    }
    Decimal::ZERO
}

/// Uniform roll in 1..=100
pub fn roll<R: Rng + ?Sized>(rng: &mut R) -> u8 {
    rng.random_range(1..=100)
}

/// Multiplier of the highest tier the roll reaches, zero below every tier
pub fn dice_multiplier(roll: u8, config: &DiceConfig) -> Decimal {
    config
        .tiers
        .iter()
        .filter(|t| roll >= t.min_roll)
        .max_by_key(|t| t.min_roll)
        .map(|t| t.multiplier)
        .unwrap_or(Decimal::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rust_decimal_macros::dec;

    fn reels(a: &str, b: &str, c: &str) -> [String; 3] {
        [a.to_string(), b.to_string(), c.to_string()]
    }

    #[test]
    fn test_slot_payout_table() {
        let config = SlotsConfig::default();
        assert_eq!(slot_multiplier(&reels("💎", "💎", "💎"), &config), dec!(50));
        assert_eq!(slot_multiplier(&reels("7️⃣", "7️⃣", "7️⃣"), &config), dec!(25));
        assert_eq!(slot_multiplier(&reels("🍒", "🍒", "🍒"), &config), dec!(10));
        assert_eq!(slot_multiplier(&reels("🍒", "🍋", "🍒"), &config), dec!(2));
        assert_eq!(slot_multiplier(&reels("💎", "💎", "🍋"), &config), dec!(2));
        assert_eq!(slot_multiplier(&reels("🍒", "🍋", "🍊"), &config), Decimal::ZERO);
    }

    #[test]
    fn test_dice_tiers() {
        let config = DiceConfig::default();
        let cases = [
            (100, dec!(10)),
            (95, dec!(10)),
            (94, dec!(5)),
            (85, dec!(5)),
            (70, dec!(3)),
            (69, dec!(2)),
            (50, dec!(2)),
            (49, dec!(0)),
            (1, dec!(0)),
        ];
        for (roll, expected) in cases {
            assert_eq!(dice_multiplier(roll, &config), expected, "roll {}", roll);
        }
    }

    #[test]
    fn test_rolls_stay_in_range() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1_000 {
            let r = roll(&mut rng);
            assert!((1..=100).contains(&r));
        }
    }

    #[test]
    fn test_flip_extremes() {
        let mut rng = StdRng::seed_from_u64(1);
        let always = CoinFlipConfig {
            win_probability: 1.0,
            ..CoinFlipConfig::default()
        };
        let never = CoinFlipConfig {
            win_probability: 0.0,
            ..CoinFlipConfig::default()
        };
        for _ in 0..100 {
            assert_eq!(flip(&mut rng, &always), CoinSide::Heads);
            assert_eq!(flip(&mut rng, &never), CoinSide::Tails);
        }
    }

    #[test]
    fn test_spin_uses_configured_symbols() {
        let mut rng = StdRng::seed_from_u64(3);
        let config = SlotsConfig::default();
        for _ in 0..200 {
            for reel in spin(&mut rng, &config) {
                assert!(config.symbols.contains(&reel));
            }
        }
    }
}
