//! Retry backoff (§4.5): `min(cap, base * 2^(attempts-1)) * jitter`, jitter
//! drawn uniformly from `0.8..=1.2` so a burst of tasks failing together
//! doesn't retry in lockstep.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::Rng;

pub const BASE: std::time::Duration = std::time::Duration::from_secs(10);
pub const CAP: std::time::Duration = std::time::Duration::from_secs(600);

/// `attempts` is the task's attempt count *after* the failing attempt
/// (i.e. `GenerationTask::attempts` as returned by the lease that just failed).
pub fn delay_for(attempts: i32) -> std::time::Duration {
    let exponent = (attempts - 1).max(0);
    let scaled = BASE.as_secs_f64() * 2f64.powi(exponent);
    let capped = scaled.min(CAP.as_secs_f64());
    let jitter = rand::thread_rng().gen_range(0.8..=1.2);
    std::time::Duration::from_secs_f64(capped * jitter)
}

pub fn available_at(attempts: i32, now: DateTime<Utc>) -> DateTime<Utc> {
    let delay = delay_for(attempts);
    now + ChronoDuration::milliseconds(delay.as_millis() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grows_exponentially_and_caps() {
        let first = delay_for(1).as_secs_f64();
        let second = delay_for(2).as_secs_f64();
        assert!(first >= BASE.as_secs_f64() * 0.8 && first <= BASE.as_secs_f64() * 1.2);
        assert!(second > first);
        let huge = delay_for(20).as_secs_f64();
        assert!(huge <= CAP.as_secs_f64() * 1.2);
    }
}
