use std::{fs, time::Duration};

use clap::{command, Parser};
use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use swarm_canary_core::{
	appender::Settings,
	network::{DownloadOptions, UploadOptions},
	retry::RetryConfig,
	types::{duration_seconds_format, tracing_level_format, BatchId, ExhaustionPolicy},
};
use tracing::Level;

#[derive(Parser)]
#[command(version)]
pub struct CliOpts {
	/// Sets path to the yaml configuration file.
	#[arg(short, long, value_name = "FILE")]
	pub config: Option<String>,
	/// Sets verbosity level.
	#[arg(long)]
	pub verbosity: Option<Level>,
	/// Sets logs format to JSON.
	#[arg(long)]
	pub logs_json: bool,
	/// What to do once retries run out.
	#[arg(long, value_enum)]
	pub on_exhaustion: Option<ExhaustionPolicy>,
	/// Stops after the given number of successful append cycles.
	#[arg(long)]
	pub max_cycles: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
	/// Log level.
	#[serde(with = "tracing_level_format")]
	pub log_level: Level,
	/// Log format: JSON for `true`, plain text for `false`.
	pub log_format_json: bool,
	/// Client alias for use in logs.
	pub client_alias: String,
	/// Gateway receiving uploads and feed updates (default: https://gateway-proxy-bee-7-0.gateway.ethswarm.org)
	pub uploader_host: String,
	/// Gateway serving downloads and feed lookups (default: https://gateway-proxy-bee-4-0.gateway.ethswarm.org)
	pub downloader_host: String,
	/// Postage batch used for every upload (default: all zeros)
	pub stamp: BatchId,
	/// Retries of feed reads, downloads and feed updates.
	pub retry: RetryConfig,
	/// Pause between two append cycles, in seconds. (default: 20)
	#[serde(with = "duration_seconds_format")]
	pub cycle_interval: Duration,
	/// What to do once retries run out: "restart" or "terminate". (default: "terminate")
	pub on_exhaustion: ExhaustionPolicy,
	/// Number of append cycles after which the canary stops. Runs forever if not set.
	pub max_cycles: Option<u64>,
}

impl Default for Config {
	fn default() -> Self {
		Self {
			log_level: Level::INFO,
			log_format_json: false,
			client_alias: "feed-canary".to_string(),
			uploader_host: "https://gateway-proxy-bee-7-0.gateway.ethswarm.org".to_string(),
			downloader_host: "https://gateway-proxy-bee-4-0.gateway.ethswarm.org".to_string(),
			stamp: BatchId::zero(),
			retry: RetryConfig::new(180, Duration::from_secs(20)),
			cycle_interval: Duration::from_secs(20),
			on_exhaustion: ExhaustionPolicy::Terminate,
			max_cycles: None,
		}
	}
}

impl Config {
	pub fn validate(&self) -> Result<()> {
		if self.retry.attempts == 0 {
			return Err(eyre!("At least one retry attempt is required"));
		}
		Ok(())
	}

	/// Requests use the HTTP client timeouts, uploads are confirmed before they return.
	pub fn settings(&self) -> Settings {
		Settings {
			stamp: self.stamp,
			upload: UploadOptions::default(),
			download: DownloadOptions::default(),
			retry: self.retry.clone(),
			cycle_interval: self.cycle_interval,
			on_exhaustion: self.on_exhaustion,
			max_cycles: self.max_cycles,
		}
	}
}

pub fn load(opts: &CliOpts) -> Result<Config> {
	let mut config = match &opts.config {
		Some(path) => {
			fs::metadata(path)?;
			confy::load_path(path)?
		},
		None => Config::default(),
	};

	config.log_level = opts.verbosity.unwrap_or(config.log_level);
	config.log_format_json = opts.logs_json || config.log_format_json;
	config.on_exhaustion = opts.on_exhaustion.unwrap_or(config.on_exhaustion);
	config.max_cycles = opts.max_cycles.or(config.max_cycles);

	config.validate()?;
	Ok(config)
}
