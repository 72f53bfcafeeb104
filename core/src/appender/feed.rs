use super::{append_random, on_failure, record, Randomness, Settings};
use crate::{
	network::{FeedReader, FeedWriter, Storage},
	retry::{retry, StaleRead},
	stats::CanaryStats,
	types::Reference,
};
use color_eyre::{Report, Result};
use tokio::time::sleep;
use tracing::info;

/// Append loop which publishes every upload into a feed and resolves the text through it.
///
/// Feed reads are eventually consistent, so a read may return an update older than one already
/// seen. Such reads are retried until an index newer than the last accepted one shows up. This
/// holds only while the loop is the single writer of its feed.
pub struct FeedAppender<S, W, F, R> {
	uploader: S,
	downloader: S,
	writer: W,
	reader: F,
	rng: R,
	settings: Settings,
	last_index: Option<u64>,
	stats: CanaryStats,
}

impl<S, W, F, R> FeedAppender<S, W, F, R>
where
	S: Storage,
	W: FeedWriter,
	F: FeedReader,
	R: Randomness,
{
	pub fn new(
		uploader: S,
		downloader: S,
		writer: W,
		reader: F,
		rng: R,
		settings: Settings,
	) -> Self {
		Self {
			uploader,
			downloader,
			writer,
			reader,
			rng,
			settings,
			last_index: None,
			stats: CanaryStats::new(),
		}
	}

	pub fn stats(&self) -> &CanaryStats {
		&self.stats
	}

	/// Highest feed index accepted so far.
	pub fn last_index(&self) -> Option<u64> {
		self.last_index
	}

	/// Runs append sequences until the cycle limit is reached.
	///
	/// Feed indices keep growing across restarts, so the last accepted index survives them.
	pub async fn run(&mut self) -> Result<()> {
		loop {
			match self.run_sequence().await {
				Ok(()) => return Ok(()),
				Err(report) => on_failure(&self.settings, &mut self.stats, report).await?,
			}
		}
	}

	async fn run_sequence(&mut self) -> Result<()> {
		self.initial_write().await?;
		while !self.settings.cycles_done(&self.stats) {
			self.append_byte().await?;
			self.stats.print_stats();
			sleep(self.settings.cycle_interval).await;
		}
		Ok(())
	}

	async fn upload(&self, data: &str) -> Result<Reference> {
		info!("Uploading data \"{data}\"");
		let reference = self
			.uploader
			.upload(&self.settings.stamp, data.as_bytes().to_vec(), &self.settings.upload)
			.await?;
		info!(%reference, "Uploaded \"{data}\" and got reference \"{reference}\"");
		Ok(reference)
	}

	/// Uploads a single character seed and publishes it into the feed. Failures are not retried.
	pub async fn initial_write(&mut self) -> Result<Reference> {
		let data = append_random("", &mut self.rng);
		let reference = self.upload(&data).await?;
		self.writer.publish(&self.settings.stamp, &reference).await?;
		info!(%reference, "Published initial reference to feed");

		self.stats.payload_len = data.len();
		Ok(reference)
	}

	/// Resolves the latest text through the feed, appends one character and publishes the result.
	pub async fn append_byte(&mut self) -> Result<String> {
		let reference = self.resolve_latest().await?;
		let text = self.download_with_retry(&reference).await?;
		info!(%reference, "Got text \"{text}\" which is correct");

		let appended = append_random(&text, &mut self.rng);
		let reference = self.upload(&appended).await?;
		self.publish_with_retry(&reference).await?;

		self.stats.cycles += 1;
		self.stats.payload_len = appended.len();
		Ok(appended)
	}

	/// Reads the feed until it returns an index newer than the last accepted one.
	pub async fn resolve_latest(&mut self) -> Result<Reference> {
		let reader = &self.reader;
		let last_index = self.last_index;
		let result = retry(&self.settings.retry, "read feed", |_| async move {
			let update = reader.read().await?;
			match last_index {
				Some(last_seen) if update.index <= last_seen => Err(Report::new(StaleRead {
					index: update.index,
					last_seen,
				})),
				_ => Ok(update),
			}
		})
		.await;

		let update = record(&mut self.stats, result)?;
		info!(
			index = update.index,
			reference = %update.reference,
			"Accepted feed update {}",
			update.index
		);
		self.last_index = Some(update.index);
		Ok(update.reference)
	}

	async fn download_with_retry(&mut self, reference: &Reference) -> Result<String> {
		let downloader = &self.downloader;
		let options = &self.settings.download;
		let result = retry(
			&self.settings.retry,
			&format!("download reference {reference}"),
			|_| downloader.download(reference, options),
		)
		.await;

		let bytes = record(&mut self.stats, result)?;
		Ok(String::from_utf8_lossy(&bytes).into_owned())
	}

	async fn publish_with_retry(&mut self, reference: &Reference) -> Result<()> {
		let writer = &self.writer;
		let stamp = &self.settings.stamp;
		let result = retry(
			&self.settings.retry,
			&format!("publish reference {reference} to feed"),
			|_| writer.publish(stamp, reference),
		)
		.await;

		record(&mut self.stats, result)?;
		info!(%reference, "Published reference to feed");
		Ok(())
	}
}
