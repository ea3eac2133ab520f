use anyhow::Result;
use clap::Subcommand;
use hs_core::service::replication::{DownloadOptions, SyncReport};

use crate::context::Context;

#[derive(Subcommand, Debug)]
pub enum SyncCmd {
	/// Fetch remote data into the local store
	Download {
		/// Assets only, without vessels and their records
		#[arg(long, default_value_t = false)]
		metadata_only: bool,
		/// Ignore the download cooldown
		#[arg(long, default_value_t = false)]
		force: bool,
	},
	/// Insert local entities the backend does not have yet
	Upload,
	/// Upload, then download
	All,
}

pub async fn run(ctx: &Context, cmd: SyncCmd) -> Result<()> {
	let replication = &ctx.core.replication;

	match cmd {
		SyncCmd::Download {
			metadata_only,
			force,
		} => {
			let report = replication
				.download_all(DownloadOptions {
					metadata_only,
					force,
				})
				.await?;

			ctx.print(&report, |report| print_report("Download", report))
		}
		SyncCmd::Upload => {
			let report = replication.upload_all().await?;

			ctx.print(&report, |report| print_report("Upload", report))
		}
		SyncCmd::All => {
			let report = replication.sync_all().await?;

			ctx.print(&report, |report| {
				print_report("Upload", &report.upload);
				print_report("Download", &report.download);
			})
		}
	}
}

fn print_report(label: &str, report: &SyncReport) {
	if report.in_progress {
		println!("{label}: skipped, another pass is running");
		return;
	}
	if report.backoff {
		println!("{label}: skipped, backing off after repeated failures");
		return;
	}
	if report.cooldown {
		println!("{label}: skipped, cooling down (use --force to override)");
		return;
	}

	let tally = &report.tally;
	println!(
		"{label}: {} entities ({} assets, {} vessels, {} strakes, {} images, {} scans, {} log entries, {} reports), {} already present, {} failed",
		report.count,
		tally.assets,
		tally.vessels,
		tally.strakes,
		tally.images,
		tally.scans,
		tally.log_entries,
		tally.reports,
		report.skipped,
		report.failed,
	);

	for error in &report.errors {
		println!("  - {error}");
	}
}
