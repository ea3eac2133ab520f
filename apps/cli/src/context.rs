use std::path::PathBuf;

use anyhow::Result;
use hs_core::Core;
use serde::Serialize;

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum OutputFormat {
	Human,
	Json,
}

pub struct Context {
	pub core: Core,
	pub format: OutputFormat,
	pub data_dir: PathBuf,
}

impl Context {
	pub fn new(core: Core, format: OutputFormat, data_dir: PathBuf) -> Self {
		Self {
			core,
			format,
			data_dir,
		}
	}

	/// Prints `output` as pretty JSON, or through `human` otherwise.
	pub fn print<T: Serialize>(&self, output: &T, human: impl FnOnce(&T)) -> Result<()> {
		match self.format {
			OutputFormat::Human => human(output),
			OutputFormat::Json => println!("{}", serde_json::to_string_pretty(output)?),
		}

		Ok(())
	}
}
