use std::time::Duration;

use hs_cloud_api::Error;

/// Exponential retry schedule for queued operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
	pub max_retries: u32,
	pub base_delay: Duration,
	pub max_delay: Duration,
}

impl RetryPolicy {
	/// Delay before retry `retries` (1-based): `min(base * 2^(retries - 1), max)`.
	pub fn delay_for(&self, retries: u32) -> Duration {
		let factor = 2u32.saturating_pow(retries.saturating_sub(1));
		self.base_delay.saturating_mul(factor).min(self.max_delay)
	}

	/// Whether an item that has failed `retries` times with `error` is dropped.
	pub fn gives_up(&self, retries: u32, error: &Error) -> bool {
		!error.is_transient() || retries > self.max_retries
	}
}
