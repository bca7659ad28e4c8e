use rand::Rng;
use std::time::Duration;

/// Reconnection delays: `initial * multiplier^n`, capped, plus upward jitter.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    pub initial: Duration,
    pub max: Duration,
    pub multiplier: f64,
    /// Upper bound of the random extra delay as a fraction of the base
    /// delay. Must stay below `multiplier - 1` so delays never shrink.
    pub jitter_factor: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(30),
            multiplier: 2.0,
            jitter_factor: 0.2,
        }
    }
}

/// Tracks consecutive failures and hands out the next delay.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: BackoffConfig,
    attempt: u32,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        Self { config, attempt: 0 }
    }

    /// Delay before the next attempt; advances the failure count.
    pub fn next_delay(&mut self) -> Duration {
        let jitter = if self.config.jitter_factor > 0.0 {
            rand::thread_rng().gen_range(0.0..self.config.jitter_factor)
        } else {
            0.0
        };
        let delay = self.delay_for(self.attempt, jitter);
        self.attempt = self.attempt.saturating_add(1);
        delay
    }

    /// `jitter` is the fraction actually added, in `[0, jitter_factor)`.
    fn delay_for(&self, attempt: u32, jitter: f64) -> Duration {
        let cfg = &self.config;
        let max = cfg.max.as_secs_f64();
        let exp = attempt.min(64) as i32;
        let base = (cfg.initial.as_secs_f64() * cfg.multiplier.powi(exp)).min(max);
        Duration::from_secs_f64((base * (1.0 + jitter)).min(max))
    }

    /// Consecutive failures since the last reset.
    pub fn attempts(&self) -> u32 {
        self.attempt
    }

    /// Called once a subscription goes Active.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_from_one_second_and_caps_at_thirty() {
        let b = Backoff::new(BackoffConfig::default());
        let secs: Vec<u64> = (0..8).map(|n| b.delay_for(n, 0.0).as_secs()).collect();
        assert_eq!(secs, vec![1, 2, 4, 8, 16, 30, 30, 30]);
    }

    #[test]
    fn jittered_delays_never_shrink_and_respect_cap() {
        let mut b = Backoff::new(BackoffConfig::default());
        let mut prev = Duration::ZERO;
        for _ in 0..50 {
            let d = b.next_delay();
            assert!(d >= prev, "{d:?} < {prev:?}");
            assert!(d >= Duration::from_secs(1));
            assert!(d <= Duration::from_secs(30));
            prev = d;
        }
        assert_eq!(b.attempts(), 50);
    }

    #[test]
    fn worst_case_jitter_still_monotonic() {
        let b = Backoff::new(BackoffConfig::default());
        for n in 0..10 {
            let high = b.delay_for(n, 0.1999);
            let next_low = b.delay_for(n + 1, 0.0);
            assert!(next_low >= high, "attempt {n}");
        }
    }

    #[test]
    fn reset_starts_over() {
        let mut b = Backoff::new(BackoffConfig {
            jitter_factor: 0.0,
            ..Default::default()
        });
        b.next_delay();
        b.next_delay();
        b.reset();
        assert_eq!(b.next_delay(), Duration::from_secs(1));
    }
}
