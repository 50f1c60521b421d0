use std::time::Duration;

/// Capped exponential reconnect delay: `min(base * 2^(attempt-1), max)`.
///
/// `attempt` is 1-based; `0` is treated as the first attempt.
pub fn reconnect_delay(base_ms: u64, max_ms: u64, attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1);
    let factor = 1u64.checked_shl(exp).unwrap_or(u64::MAX);
    Duration::from_millis(base_ms.saturating_mul(factor).min(max_ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_schedule() {
        let delays: Vec<u64> = (1..=6)
            .map(|n| reconnect_delay(3_000, 30_000, n).as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![3_000, 6_000, 12_000, 24_000, 30_000, 30_000]);
    }

    #[test]
    fn huge_attempt_counts_saturate_at_max() {
        assert_eq!(reconnect_delay(3_000, 30_000, 64), Duration::from_millis(30_000));
        assert_eq!(reconnect_delay(3_000, 30_000, u32::MAX), Duration::from_millis(30_000));
    }

    #[test]
    fn attempt_zero_uses_base() {
        assert_eq!(reconnect_delay(1_000, 30_000, 0), Duration::from_millis(1_000));
    }
}
