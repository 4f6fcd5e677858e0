//! Main entry point for the relayer service.
//!
//! The binary loads and validates the relayer configuration and exposes the
//! offline codec tooling operators use to inspect aggregator state: config
//! digest computation and median report decoding.

use clap::{Parser, Subcommand};
use relayer_config::Config;
use std::path::PathBuf;

mod commands;

/// Command-line arguments for the relayer service.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Path to configuration file
	#[arg(short, long, default_value = "config.toml")]
	config: PathBuf,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, default_value = "info")]
	log_level: String,

	#[command(subcommand)]
	command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Load and validate the configuration (default)
	CheckConfig,
	/// Compute the digest of a JSON-encoded contract config
	Digest {
		/// Path to the JSON contract config
		#[arg(long)]
		config_file: PathBuf,
	},
	/// Decode the median of a hex-encoded report
	Median {
		/// Report bytes as hex, with or without 0x prefix
		report: String,
		/// The report carries a trailing gas price word
		#[arg(long)]
		with_gas_price: bool,
	},
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	use tracing_subscriber::{fmt, EnvFilter};

	let default_directive = args.log_level.to_string();
	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

	fmt()
		.with_env_filter(env_filter)
		.with_thread_ids(true)
		.with_target(true)
		.init();

	match args.command.unwrap_or(Command::CheckConfig) {
		Command::CheckConfig => {
			let config = Config::from_file(&args.config).await?;
			let summary = commands::check_config(&config)?;
			println!("{}", summary);
		}
		Command::Digest { config_file } => {
			let config = Config::from_file(&args.config).await?;
			let digest = commands::digest(&config, &config_file).await?;
			tracing::info!(digest = %digest, "Computed config digest");
			println!("{}", digest);
		}
		Command::Median {
			report,
			with_gas_price,
		} => {
			let median = commands::median(&report, with_gas_price)?;
			tracing::info!(median = %median, "Decoded median report");
			println!("{}", median);
		}
	}

	Ok(())
}
