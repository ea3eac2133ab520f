//! Background services
//!
//! The sync queue worker and the replication service run as long-lived tasks
//! owned by [`crate::Core`]. Both implement [`Service`] so the core can start
//! and stop them uniformly.

use anyhow::Result;

pub mod replication;
pub mod sync_queue;

/// Trait for background services
#[async_trait::async_trait]
pub trait Service: Send + Sync {
	/// Start the service
	async fn start(&self) -> Result<()>;

	/// Stop the service gracefully
	async fn stop(&self) -> Result<()>;

	/// Check if the service is running
	fn is_running(&self) -> bool;

	/// Get service name for logging
	fn name(&self) -> &'static str;
}
