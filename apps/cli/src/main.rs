use std::{path::PathBuf, sync::Arc};

use anyhow::Result;
use clap::{Parser, Subcommand};
use hs_cloud_api::rest::{RestBackend, RestBlobStore};
use hs_core::{
	access::SessionIdentity,
	config::{default_data_dir, AppConfig},
	Core,
};

mod context;
mod domains;
mod identity;

use context::{Context, OutputFormat};
use domains::{queue::QueueCmd, strake::StrakeCmd, sync::SyncCmd};

#[derive(Parser, Debug)]
#[command(name = "hullsync", about = "Offline-first inspection data sync")]
struct Cli {
	/// Path to the hullsync data directory
	#[arg(long)]
	data_dir: Option<PathBuf>,

	/// Output format
	#[arg(long, value_enum, default_value = "human")]
	format: OutputFormat,

	#[command(subcommand)]
	command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
	/// Session, local data and queue overview
	Status,
	/// Replication passes
	#[command(subcommand)]
	Sync(SyncCmd),
	/// Pending remote operations
	#[command(subcommand)]
	Queue(QueueCmd),
	/// Strake coverage
	#[command(subcommand)]
	Strake(StrakeCmd),
}

#[tokio::main]
async fn main() -> Result<()> {
	let cli = Cli::parse();

	let data_dir = match cli.data_dir {
		Some(dir) => dir,
		None => default_data_dir()?,
	};
	let config = AppConfig::load_or_create(&data_dir)?;
	hs_core::init_tracing(&config.logs_dir(), &config.log_level)?;

	let identity = Arc::new(match identity::session_from_env() {
		Some(session) => SessionIdentity::signed_in(session),
		None => SessionIdentity::new(),
	});
	let credentials = Arc::new(identity::EnvCredentials::new(&config.remote)?);

	let core = Core::new(
		&config,
		identity,
		Arc::new(RestBackend::new(credentials.clone())),
		Arc::new(RestBlobStore::new(credentials)),
	)
	.await?;

	let ctx = Context::new(core, cli.format, data_dir);

	let result = match cli.command {
		Commands::Status => domains::status::run(&ctx).await,
		Commands::Sync(cmd) => domains::sync::run(&ctx, cmd).await,
		Commands::Queue(cmd) => domains::queue::run(&ctx, cmd).await,
		Commands::Strake(cmd) => domains::strake::run(&ctx, cmd).await,
	};

	ctx.core.shutdown().await?;

	result
}
