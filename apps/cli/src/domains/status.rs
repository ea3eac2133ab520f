use anyhow::Result;
use hs_core::{access::IdentityProvider, service::sync_queue::QueueStats};
use serde::Serialize;

use crate::context::Context;

#[derive(Debug, Serialize)]
struct StatusOutput {
	data_dir: String,
	user_id: Option<String>,
	organization: Option<String>,
	assets: Option<usize>,
	queue: QueueStats,
	syncing: bool,
}

pub async fn run(ctx: &Context) -> Result<()> {
	let core = &ctx.core;

	let output = StatusOutput {
		data_dir: ctx.data_dir.display().to_string(),
		user_id: core.identity.current_user_id(),
		organization: core
			.identity
			.current_organization()
			.map(|organization| organization.name),
		// Without a session there is no visible subtree.
		assets: core.store.assets().ok().map(|assets| assets.len()),
		queue: core.queue.stats().await,
		syncing: core.replication.is_syncing(),
	};

	ctx.print(&output, |status| {
		println!("Data directory: {}", status.data_dir);

		match (&status.user_id, &status.organization) {
			(Some(user), Some(organization)) => println!("Signed in as {user} ({organization})"),
			_ => println!("Not signed in"),
		}

		if let Some(assets) = status.assets {
			println!("Local assets:   {assets}");
		}

		println!(
			"Sync queue:     {} pending, {} in flight, {} diverged",
			status.queue.pending, status.queue.processing, status.queue.diverged
		);
	})
}
