use clap::Parser;
use color_eyre::Result;
use config::Config;
use rand::{rngs::StdRng, SeedableRng};
use swarm_canary_core::{
	appender::FeedAppender,
	crypto::Identity,
	network::bee::{
		self,
		feed::{SequenceReader, SequenceWriter},
	},
	shutdown::user_signal,
	types::Topic,
	utils::{default_subscriber, install_panic_hooks, json_subscriber},
};
use tracing::{info, span, Level};

mod config;

#[tokio::main]
pub async fn main() -> Result<()> {
	let opts = config::CliOpts::parse();
	let config = config::load(&opts)?;

	if config.log_format_json {
		tracing::subscriber::set_global_default(json_subscriber(config.log_level))?;
	} else {
		tracing::subscriber::set_global_default(default_subscriber(config.log_level))?;
	}

	install_panic_hooks()?;

	let span = span!(Level::INFO, "run", client_alias = config.client_alias);
	let _enter = span.enter();

	tokio::select! {
		result = run(config) => result,
		name = user_signal() => {
			info!("Received {name}, shutting down");
			Ok(())
		},
	}
}

async fn run(config: Config) -> Result<()> {
	let version = clap::crate_version!();
	info!("Running Swarm feed canary v{version}");
	info!("Using configuration: {config:?}");
	info!("Using uploader host {}", config.uploader_host);
	info!("Using downloader host {}", config.downloader_host);

	let mut rng = StdRng::from_entropy();
	let identity = Identity::random();
	let topic = Topic::random(&mut rng);
	info!(owner = %identity.address(), %topic, "Generated feed identity");

	let uploader = bee::Client::new(&config.uploader_host)?;
	let downloader = bee::Client::new(&config.downloader_host)?;
	let writer = SequenceWriter::new(uploader.clone(), topic, identity.clone());
	let reader = SequenceReader::new(downloader.clone(), topic, identity.address());

	let mut appender = FeedAppender::new(
		uploader,
		downloader,
		writer,
		reader,
		rng,
		config.settings(),
	);
	appender.run().await?;

	appender.stats().print_stats();
	Ok(())
}
