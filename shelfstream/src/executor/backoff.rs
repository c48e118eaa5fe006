//! Exponential backoff with jitter.

use rand::Rng;
use std::time::Duration;

/// Maximum uniform jitter added to every retry delay.
const JITTER_MAX: Duration = Duration::from_millis(500);

/// Deterministic part of the backoff delay: `factor ** attempt` seconds.
///
/// Attempt numbering starts at 0, so the first retry waits one second
/// regardless of the factor.
pub fn base_delay(attempt: u32, factor: f64) -> Duration {
    Duration::from_secs_f64(factor.powi(attempt as i32))
}

/// Full retry delay for an attempt: exponential base plus random jitter,
/// plus an extra random outage delay when one is configured.
///
/// The jitter avoids synchronized retries across concurrent tasks; the
/// outage delay spreads retry pressure out further while the network is at
/// its least reliable.
pub fn retry_delay(
    attempt: u32,
    factor: f64,
    outage_delay: Option<(Duration, Duration)>,
) -> Duration {
    let mut rng = rand::thread_rng();
    let mut delay = base_delay(attempt, factor) + JITTER_MAX.mul_f64(rng.gen::<f64>());

    if let Some((min, max)) = outage_delay {
        delay += Duration::from_secs_f64(
            rng.gen_range(min.as_secs_f64()..=max.as_secs_f64().max(min.as_secs_f64())),
        );
    }

    delay
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_delay_strictly_increases() {
        let factor = 1.5;
        let mut previous = Duration::ZERO;
        for attempt in 0..6 {
            let delay = base_delay(attempt, factor);
            assert!(delay > previous, "attempt {} did not increase", attempt);
            previous = delay;
        }
    }

    #[test]
    fn test_larger_factor_scales_delays_up() {
        // Outage-suspected conditions scale the backoff factor, so every
        // retry after the first must wait longer than under normal factor.
        for attempt in 1..6 {
            assert!(base_delay(attempt, 2.25) > base_delay(attempt, 1.5));
        }
    }

    #[test]
    fn test_retry_delay_bounds_without_outage() {
        for attempt in 0..4 {
            let base = base_delay(attempt, 1.5);
            let delay = retry_delay(attempt, 1.5, None);
            assert!(delay >= base);
            assert!(delay <= base + JITTER_MAX);
        }
    }

    #[test]
    fn test_retry_delay_includes_outage_component() {
        let outage = Some((Duration::from_secs(3), Duration::from_secs(10)));
        let base = base_delay(0, 1.5);
        let delay = retry_delay(0, 1.5, outage);
        assert!(delay >= base + Duration::from_secs(3));
        assert!(delay <= base + JITTER_MAX + Duration::from_secs(10));
    }
}
