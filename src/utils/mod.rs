// Small helpers shared by the producer and consumer threads

pub mod validation {
    use crate::errors::{FeedError, FeedResult};
    use std::time::Duration;

    /// Longest symbol accepted (Finnhub crypto symbols like `BINANCE:BTCUSDT` included)
    pub const MAX_SYMBOL_LEN: usize = 32;

    /// Validate that a symbol is not empty and has no whitespace
    pub fn is_valid_symbol(symbol: &str) -> bool {
        !symbol.is_empty()
            && symbol.len() <= MAX_SYMBOL_LEN
            && !symbol.chars().any(char::is_whitespace)
    }

    pub fn validate_symbol(symbol: &str) -> FeedResult<()> {
        if is_valid_symbol(symbol) {
            Ok(())
        } else {
            Err(FeedError::InvalidConfiguration(format!(
                "invalid symbol name: {:?}",
                symbol
            )))
        }
    }

    /// Validate that a speed-up factor is usable as a divisor
    pub fn is_valid_factor(factor: f64) -> bool {
        factor.is_finite() && factor > 0.0
    }

    /// `base / factor`, or `None` when the factor is invalid or the result overflows a `Duration`
    pub fn scaled_delay(base: Duration, factor: f64) -> Option<Duration> {
        if !is_valid_factor(factor) {
            return None;
        }
        Duration::try_from_secs_f64(base.as_secs_f64() / factor).ok()
    }
}

pub mod timing {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;
    use std::time::{Duration, Instant};

    /// Longest uninterrupted sleep; bounds how long a stop request can go unnoticed
    pub const SLEEP_SLICE: Duration = Duration::from_millis(25);

    /// Sleep until `deadline` unless `cancel` is raised first
    ///
    /// Returns `false` if the sleep was cut short by `cancel`.
    pub fn sleep_until(deadline: Instant, cancel: &AtomicBool) -> bool {
        loop {
            if cancel.load(Ordering::Acquire) {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            thread::sleep((deadline - now).min(SLEEP_SLICE));
        }
    }

    /// Stand-in for deadlines past what `Instant` can hold; only a cancel ends such a wait
    const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 3600);

    /// `start + offset`, saturating to a far-future deadline when the offset is
    /// missing or does not fit
    pub fn deadline_after(start: Instant, offset: Option<Duration>) -> Instant {
        offset
            .and_then(|offset| start.checked_add(offset))
            .or_else(|| start.checked_add(FAR_FUTURE))
            .unwrap_or(start)
    }

    /// Relative form of [`sleep_until`]
    pub fn sleep_for(duration: Duration, cancel: &AtomicBool) -> bool {
        sleep_until(Instant::now() + duration, cancel)
    }

    /// Thread names used in logs and panics
    pub fn thread_name(component: &str) -> String {
        format!("mdf-{}", component)
    }
}
