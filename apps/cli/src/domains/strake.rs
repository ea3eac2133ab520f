use anyhow::Result;
use clap::Subcommand;

use crate::context::Context;

#[derive(Subcommand, Debug)]
pub enum StrakeCmd {
	/// Scanned area against the strake's coverage target
	Coverage { strake_id: String },
}

pub async fn run(ctx: &Context, cmd: StrakeCmd) -> Result<()> {
	match cmd {
		StrakeCmd::Coverage { strake_id } => {
			let coverage = ctx.core.store.strake_coverage(&strake_id)?;

			ctx.print(&coverage, |coverage| {
				println!(
					"Strake {}: {:.2} of {:.2} m² scanned across {} scans, {:.1}% ({:.1}% raw){}",
					coverage.strake_id,
					coverage.scanned_area,
					coverage.target_area,
					coverage.scan_count,
					coverage.percentage,
					coverage.raw_percentage,
					if coverage.is_complete { ", complete" } else { "" },
				);
			})
		}
	}
}
