//! Tiered reconnect backoff
//!
//! Failed connection cycles walk through an ordered table of
//! (sleep, attempts) tiers. Any cycle that delivers data resets the walk.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One row of the backoff table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryTier {
    /// Sleep before each retry at this tier
    pub sleep_secs: u64,
    /// Retries spent at this tier before moving to the next
    pub max_attempts: u32,
}

impl RetryTier {
    pub fn sleep(&self) -> Duration {
        Duration::from_secs(self.sleep_secs)
    }
}

/// What to do after a failed connection cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep for the given duration, then try again
    Retry(Duration),
    /// Every tier is used up
    GiveUp,
}

/// Position in the backoff table
#[derive(Debug, Clone)]
pub struct RetryState {
    tiers: Vec<RetryTier>,
    tier_index: usize,
    attempts: u32,
}

impl RetryState {
    pub fn new(tiers: Vec<RetryTier>) -> Self {
        Self {
            tiers,
            tier_index: 0,
            attempts: 0,
        }
    }

    /// A cycle delivered data: start over from the first tier
    pub fn on_connected(&mut self) {
        self.tier_index = 0;
        self.attempts = 0;
    }

    /// A cycle failed without delivering data
    pub fn on_failure(&mut self) -> RetryDecision {
        let Some(tier) = self.tiers.get(self.tier_index) else {
            return RetryDecision::GiveUp;
        };

        if self.attempts >= tier.max_attempts {
            self.attempts = 0;
            self.tier_index += 1;
        }

        match self.tiers.get(self.tier_index) {
            Some(tier) => {
                self.attempts += 1;
                RetryDecision::Retry(tier.sleep())
            }
            None => RetryDecision::GiveUp,
        }
    }

    pub fn tier_index(&self) -> usize {
        self.tier_index
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn is_exhausted(&self) -> bool {
        self.tier_index >= self.tiers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;

    fn default_state() -> RetryState {
        RetryState::new(RetryConfig::default().tiers)
    }

    fn sleeps_until_give_up(state: &mut RetryState) -> Vec<u64> {
        let mut sleeps = Vec::new();
        while let RetryDecision::Retry(sleep) = state.on_failure() {
            sleeps.push(sleep.as_secs());
            assert!(sleeps.len() < 100, "backoff never gave up");
        }
        sleeps
    }

    #[test]
    fn test_default_sequence() {
        let mut state = default_state();
        let sleeps = sleeps_until_give_up(&mut state);

        let mut expected = vec![5; 12];
        expected.extend([20; 6]);
        expected.extend([60; 2]);
        assert_eq!(sleeps, expected);
        assert!(state.is_exhausted());
        assert_eq!(state.on_failure(), RetryDecision::GiveUp);
    }

    #[test]
    fn test_connected_resets_to_first_tier() {
        let mut state = default_state();
        for _ in 0..15 {
            state.on_failure();
        }
        assert_eq!(state.tier_index(), 1);

        state.on_connected();
        assert_eq!((state.tier_index(), state.attempts()), (0, 0));
        assert_eq!(sleeps_until_give_up(&mut state).len(), 20);
    }

    #[test]
    fn test_reset_from_last_tier() {
        let mut state = default_state();
        for _ in 0..19 {
            state.on_failure();
        }
        assert_eq!(state.tier_index(), 2);

        state.on_connected();
        assert_eq!(state.on_failure(), RetryDecision::Retry(Duration::from_secs(5)));
    }

    #[test]
    fn test_empty_table_gives_up() {
        let mut state = RetryState::new(Vec::new());
        assert_eq!(state.on_failure(), RetryDecision::GiveUp);
    }
}
