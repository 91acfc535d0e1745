//! Per-user, per-command cooldown windows

use crate::config::CooldownConfig;
use crate::error::{BotError, Result};
use crate::types::UserId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Entries are pruned once the map grows past this
const PRUNE_THRESHOLD: usize = 10_000;

pub struct Cooldowns {
    config: CooldownConfig,
    /// (user, command) -> when the window ends
    until: Mutex<HashMap<(UserId, String), Instant>>,
}

impl Cooldowns {
    pub fn new(config: CooldownConfig) -> Self {
        Self {
            config,
            until: Mutex::new(HashMap::new()),
        }
    }

    /// Consume the cooldown for `command` if it is not running
    pub fn check(&self, user_id: UserId, command: &str) -> Result<()> {
        self.check_at(user_id, command, Instant::now())
    }

    pub fn check_at(&self, user_id: UserId, command: &str, now: Instant) -> Result<()> {
        let Some(window) = self.config.get(command) else {
            return Ok(());
        };

        let mut until = self.until.lock();
        if until.len() > PRUNE_THRESHOLD {
            until.retain(|_, end| *end > now);
        }

        let key = (user_id, command.to_string());
        if let Some(end) = until.get(&key) {
            if *end > now {
                return Err(BotError::RateLimited {
                    command: command.to_string(),
                    retry_after: *end - now,
                });
            }
        }
        until.insert(key, now + window);
        Ok(())
    }

    pub fn window(&self, command: &str) -> Option<Duration> {
        self.config.get(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cooldown_blocks_until_window_passes() {
        let cooldowns = Cooldowns::new(CooldownConfig::default());
        let t0 = Instant::now();

        assert!(cooldowns.check_at(1, "buy", t0).is_ok());
        let err = cooldowns
            .check_at(1, "buy", t0 + Duration::from_secs(1))
            .unwrap_err();
        match err {
            BotError::RateLimited { command, retry_after } => {
                assert_eq!(command, "buy");
                assert_eq!(retry_after, Duration::from_secs(2));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(cooldowns.check_at(1, "buy", t0 + Duration::from_secs(3)).is_ok());
    }

    #[test]
    fn test_cooldowns_are_per_user_and_command() {
        let cooldowns = Cooldowns::new(CooldownConfig::default());
        let t0 = Instant::now();

        cooldowns.check_at(1, "slots", t0).unwrap();
        assert!(cooldowns.check_at(2, "slots", t0).is_ok());
        assert!(cooldowns.check_at(1, "roll", t0).is_ok());
        assert!(cooldowns.check_at(1, "slots", t0).is_err());
    }

    #[test]
    fn test_commands_without_cooldown() {
        let mut config = CooldownConfig::default();
        config.0.insert("buy".to_string(), 0);
        let cooldowns = Cooldowns::new(config);
        let t0 = Instant::now();

        for _ in 0..5 {
            assert!(cooldowns.check_at(1, "buy", t0).is_ok());
            assert!(cooldowns.check_at(1, "prices", t0).is_ok());
        }
        assert_eq!(cooldowns.window("predict"), Some(Duration::from_secs(5)));
    }
}
