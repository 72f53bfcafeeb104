use std::{fs, time::Duration};

use clap::{command, Parser};
use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use swarm_canary_core::{
	appender::Settings,
	network::{DownloadOptions, UploadOptions},
	retry::RetryConfig,
	types::{
		duration_seconds_format, option_duration_seconds_format, tracing_level_format, BatchId,
		ExhaustionPolicy,
	},
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
	/// Uploads with deferred confirmation, through the deferred uploader host.
	#[arg(long)]
	pub deferred: bool,
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
	/// Gateway receiving uploads (default: https://gateway-proxy-bee-7-0.gateway.ethswarm.org)
	pub uploader_host: String,
	/// Gateway receiving uploads when deferred uploads are on (default: https://gateway-proxy-bee-3-0.gateway.ethswarm.org)
	pub deferred_uploader_host: String,
	/// Gateway serving downloads (default: https://gateway-proxy-bee-4-0.gateway.ethswarm.org)
	pub downloader_host: String,
	/// Postage batch used for every upload (default: all zeros)
	pub stamp: BatchId,
	/// Requests deferred upload confirmation. (default: false)
	pub deferred: bool,
	/// Download retries.
	pub retry: RetryConfig,
	/// Timeout of a single upload or download, in seconds. (default: 30)
	#[serde(with = "option_duration_seconds_format")]
	pub timeout: Option<Duration>,
	/// Pause between two append cycles, in seconds. (default: 10)
	#[serde(with = "duration_seconds_format")]
	pub cycle_interval: Duration,
	/// What to do once retries run out: "restart" or "terminate". (default: "restart")
	pub on_exhaustion: ExhaustionPolicy,
	/// Number of append cycles after which the canary stops. Runs forever if not set.
	pub max_cycles: Option<u64>,
}

impl Default for Config {
	fn default() -> Self {
		Self {
			log_level: Level::INFO,
			log_format_json: false,
			client_alias: "reference-canary".to_string(),
			uploader_host: "https://gateway-proxy-bee-7-0.gateway.ethswarm.org".to_string(),
			deferred_uploader_host: "https://gateway-proxy-bee-3-0.gateway.ethswarm.org"
				.to_string(),
			downloader_host: "https://gateway-proxy-bee-4-0.gateway.ethswarm.org".to_string(),
			stamp: BatchId::zero(),
			deferred: false,
			retry: RetryConfig::new(3, Duration::from_secs(10)),
			timeout: Some(Duration::from_secs(30)),
			cycle_interval: Duration::from_secs(10),
			on_exhaustion: ExhaustionPolicy::Restart,
			max_cycles: None,
		}
	}
}

impl Config {
	/// Host receiving uploads, depending on the deferred upload switch.
	pub fn upload_host(&self) -> &str {
		if self.deferred {
			&self.deferred_uploader_host
		} else {
			&self.uploader_host
		}
	}

	pub fn validate(&self) -> Result<()> {
		if self.retry.attempts == 0 {
			return Err(eyre!("At least one retry attempt is required"));
		}
		Ok(())
	}

	pub fn settings(&self) -> Settings {
		Settings {
			stamp: self.stamp,
			upload: UploadOptions {
				deferred: self.deferred,
				timeout: self.timeout,
			},
			download: DownloadOptions {
				timeout: self.timeout,
			},
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
	config.deferred = opts.deferred || config.deferred;
	config.on_exhaustion = opts.on_exhaustion.unwrap_or(config.on_exhaustion);
	config.max_cycles = opts.max_cycles.or(config.max_cycles);

	config.validate()?;
	Ok(config)
}
