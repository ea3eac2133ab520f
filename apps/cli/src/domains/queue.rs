use anyhow::Result;
use clap::Subcommand;
use hs_core::service::sync_queue::DrainOutcome;

use crate::context::Context;

#[derive(Subcommand, Debug)]
pub enum QueueCmd {
	/// List queued remote operations
	List,
	/// Deliver queued operations now
	Drain,
	/// Operations that permanently failed
	Divergence {
		/// Discard the recorded failures
		#[arg(long, default_value_t = false)]
		clear: bool,
	},
}

pub async fn run(ctx: &Context, cmd: QueueCmd) -> Result<()> {
	let queue = &ctx.core.queue;

	match cmd {
		QueueCmd::List => {
			let items = queue.pending_items().await;

			ctx.print(&items, |items| {
				if items.is_empty() {
					println!("Sync queue is empty");
				}
				for item in items {
					print!(
						"- {} [{}] {} (queued {}",
						item.id,
						item.status,
						item.operation.summary(),
						item.enqueued_at.to_rfc3339()
					);
					match &item.last_error {
						Some(error) => println!(", {} retries, last error: {error})", item.retries),
						None => println!(")"),
					}
				}
			})
		}
		QueueCmd::Drain => {
			let outcome = queue.drain().await;
			let remaining = queue.len().await;

			match outcome {
				DrainOutcome::Drained => println!("Sync queue drained"),
				DrainOutcome::Busy => println!("A drain is already running"),
				DrainOutcome::Interrupted => {
					println!("Drain interrupted, {remaining} operations still queued")
				}
			}

			Ok(())
		}
		QueueCmd::Divergence { clear } => {
			if clear {
				let cleared = queue.divergence().clear().await?;
				println!("Cleared {cleared} divergence records");
				return Ok(());
			}

			let records = queue.divergence().records().await;

			ctx.print(&records, |records| {
				if records.is_empty() {
					println!("No divergence recorded");
				}
				for record in records {
					println!(
						"- {} {} failed at {} after {} retries: {}",
						record.item.id,
						record.item.operation.summary(),
						record.failed_at.to_rfc3339(),
						record.item.retries,
						record.item.last_error.as_deref().unwrap_or("unknown error"),
					);
				}
			})
		}
	}
}
