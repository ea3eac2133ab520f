//! Session-level guards of the replication service.
//!
//! One pass at a time. Download passes observe a cooldown after each attempt,
//! and a run of failed passes puts the service into backoff. A refused pass is
//! reported as a successful no-op.

use std::{
	sync::{
		atomic::{AtomicBool, Ordering},
		Mutex,
	},
	time::Duration,
};

use tokio::time::Instant;
use tracing::warn;

use crate::{
	config::ReplicationConfig,
	infra::event::{SkipReason, SyncDirection},
};

#[derive(Debug, Default)]
struct SessionState {
	last_download: Option<Instant>,
	consecutive_failures: u32,
	backoff_until: Option<Instant>,
}

pub(crate) struct SessionGuard {
	in_progress: AtomicBool,
	state: Mutex<SessionState>,
	cooldown: Duration,
	failure_threshold: u32,
	failure_backoff: Duration,
}

/// Held for the duration of a pass.
pub(crate) struct SessionPermit<'a> {
	guard: &'a SessionGuard,
	direction: SyncDirection,
}

impl SessionGuard {
	pub fn new(config: &ReplicationConfig) -> Self {
		Self {
			in_progress: AtomicBool::new(false),
			state: Mutex::new(SessionState::default()),
			cooldown: config.cooldown(),
			failure_threshold: config.failure_threshold.max(1),
			failure_backoff: config.failure_backoff(),
		}
	}

	pub fn is_in_progress(&self) -> bool {
		self.in_progress.load(Ordering::SeqCst)
	}

	/// `force` skips the download cooldown, never the failure backoff.
	pub fn try_begin(
		&self,
		direction: SyncDirection,
		force: bool,
	) -> Result<SessionPermit<'_>, SkipReason> {
		if self.in_progress.swap(true, Ordering::SeqCst) {
			return Err(SkipReason::InProgress);
		}

		let refusal = {
			let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
			let now = Instant::now();

			if state.backoff_until.is_some_and(|until| now < until) {
				Some(SkipReason::Backoff)
			} else if direction == SyncDirection::Download
				&& !force
				&& state
					.last_download
					.is_some_and(|last| now < last + self.cooldown)
			{
				Some(SkipReason::Cooldown)
			} else {
				None
			}
		};

		match refusal {
			Some(reason) => {
				self.in_progress.store(false, Ordering::SeqCst);
				Err(reason)
			}
			None => Ok(SessionPermit {
				guard: self,
				direction,
			}),
		}
	}
}

impl SessionPermit<'_> {
	/// Records the outcome of the pass and releases the session.
	pub fn finish(self, succeeded: bool) {
		let mut state = self.guard.state.lock().unwrap_or_else(|e| e.into_inner());
		let now = Instant::now();

		if self.direction == SyncDirection::Download {
			state.last_download = Some(now);
		}

		if succeeded {
			state.consecutive_failures = 0;
			state.backoff_until = None;
		} else {
			state.consecutive_failures += 1;

			if state.consecutive_failures >= self.guard.failure_threshold {
				warn!(
					failures = state.consecutive_failures,
					backoff = ?self.guard.failure_backoff,
					"Replication keeps failing, backing off"
				);
				state.backoff_until = Some(now + self.guard.failure_backoff);
				state.consecutive_failures = 0;
			}
		}
	}
}

impl Drop for SessionPermit<'_> {
	fn drop(&mut self) {
		self.guard.in_progress.store(false, Ordering::SeqCst);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn guard() -> SessionGuard {
		SessionGuard::new(&ReplicationConfig {
			cooldown_ms: 30_000,
			failure_threshold: 2,
			failure_backoff_ms: 60_000,
			..Default::default()
		})
	}

	#[tokio::test(start_paused = true)]
	async fn only_one_pass_at_a_time() {
		let guard = guard();

		let permit = guard.try_begin(SyncDirection::Upload, false).unwrap();
		assert!(matches!(
			guard.try_begin(SyncDirection::Download, true),
			Err(SkipReason::InProgress)
		));

		permit.finish(true);
		assert!(!guard.is_in_progress());
		assert!(guard.try_begin(SyncDirection::Upload, false).is_ok());
	}

	#[tokio::test(start_paused = true)]
	async fn downloads_cool_down_unless_forced() {
		let guard = guard();

		guard
			.try_begin(SyncDirection::Download, false)
			.unwrap()
			.finish(true);

		assert!(matches!(
			guard.try_begin(SyncDirection::Download, false),
			Err(SkipReason::Cooldown)
		));
		assert!(guard.try_begin(SyncDirection::Upload, false).is_ok());
		assert!(guard.try_begin(SyncDirection::Download, true).is_ok());

		tokio::time::advance(Duration::from_secs(31)).await;
		assert!(guard.try_begin(SyncDirection::Download, false).is_ok());
	}

	#[tokio::test(start_paused = true)]
	async fn consecutive_failures_trigger_backoff() {
		let guard = guard();

		guard.try_begin(SyncDirection::Upload, false).unwrap().finish(false);
		assert!(guard.try_begin(SyncDirection::Upload, false).is_ok());

		guard.try_begin(SyncDirection::Upload, false).unwrap().finish(false);
		assert!(matches!(
			guard.try_begin(SyncDirection::Download, true),
			Err(SkipReason::Backoff)
		));

		tokio::time::advance(Duration::from_secs(61)).await;
		guard.try_begin(SyncDirection::Upload, false).unwrap().finish(true);
		assert!(guard.try_begin(SyncDirection::Upload, false).is_ok());
	}
}
