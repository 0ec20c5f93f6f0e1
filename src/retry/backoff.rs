//! Exponential backoff with jitter for task retries

use std::time::Duration;

/// Base delay for the first retry attempt.
const BASE_DELAY_MS: u64 = 100;
/// Attempts beyond this use the same base delay as attempt 7.
const MAX_ATTEMPT_EXPONENT: u32 = 7;
/// Upper bound (exclusive) of the uniform jitter added to every delay.
const JITTER_MS: u64 = 200;

/// Computes the retry delay for the given attempt number.
///
/// The base delay doubles with each attempt, starting at 100ms, with the
/// exponent clamped to attempt 7 (6.4s base). A uniform random jitter in
/// `[0, 200ms)` is added so that a burst of simultaneous failures does not
/// re-submit in lockstep.
pub fn backoff_delay(attempt: u32) -> Duration {
    let attempt = attempt.clamp(1, MAX_ATTEMPT_EXPONENT);
    let base = BASE_DELAY_MS << (attempt - 1);
    Duration::from_millis(base + fastrand::u64(..JITTER_MS))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_of(attempt: u32) -> Duration {
        Duration::from_millis(BASE_DELAY_MS << (attempt.clamp(1, MAX_ATTEMPT_EXPONENT) - 1))
    }

    #[test]
    fn test_delay_grows_exponentially() {
        for attempt in 1..=7 {
            let delay = backoff_delay(attempt);
            let base = base_of(attempt);
            assert!(delay >= base, "attempt {}: {:?} < base {:?}", attempt, delay, base);
            assert!(
                delay < base + Duration::from_millis(JITTER_MS),
                "attempt {}: {:?} exceeds jitter bound",
                attempt,
                delay
            );
        }
    }

    #[test]
    fn test_attempt_zero_treated_as_one() {
        let delay = backoff_delay(0);
        assert!(delay >= Duration::from_millis(BASE_DELAY_MS));
        assert!(delay < Duration::from_millis(BASE_DELAY_MS + JITTER_MS));
    }

    #[test]
    fn test_base_is_clamped_above_seven() {
        // Attempts 7, 8, and 100 share the same base delay
        let ceiling = base_of(7) + Duration::from_millis(JITTER_MS);
        for attempt in [7, 8, 100] {
            let delay = backoff_delay(attempt);
            assert!(delay >= base_of(7));
            assert!(delay < ceiling);
        }
    }
}
