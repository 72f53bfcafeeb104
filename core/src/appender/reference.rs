use super::{append_random, on_failure, record, Randomness, Settings};
use crate::{
	network::Storage,
	retry::retry,
	stats::CanaryStats,
	types::Reference,
};
use color_eyre::{eyre::eyre, Result};
use tokio::time::sleep;
use tracing::info;

/// Append loop which tracks the content address returned by the latest upload.
pub struct ReferenceAppender<S, R> {
	uploader: S,
	downloader: S,
	rng: R,
	settings: Settings,
	last_reference: Option<Reference>,
	stats: CanaryStats,
}

impl<S: Storage, R: Randomness> ReferenceAppender<S, R> {
	pub fn new(uploader: S, downloader: S, rng: R, settings: Settings) -> Self {
		Self {
			uploader,
			downloader,
			rng,
			settings,
			last_reference: None,
			stats: CanaryStats::new(),
		}
	}

	pub fn stats(&self) -> &CanaryStats {
		&self.stats
	}

	pub fn last_reference(&self) -> Option<&Reference> {
		self.last_reference.as_ref()
	}

	/// Runs append sequences until the cycle limit is reached.
	///
	/// A failed sequence is either restarted from a new seed or returned, depending on the
	/// configured exhaustion policy.
	pub async fn run(&mut self) -> Result<()> {
		loop {
			match self.run_sequence().await {
				Ok(()) => return Ok(()),
				Err(report) => {
					self.last_reference = None;
					on_failure(&self.settings, &mut self.stats, report).await?;
				},
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

	/// Uploads a fresh single character seed. Failures are not retried.
	pub async fn initial_write(&mut self) -> Result<Reference> {
		let data = append_random("", &mut self.rng);
		info!("Uploading initial data \"{data}\"");
		let reference = self
			.uploader
			.upload(&self.settings.stamp, data.clone().into_bytes(), &self.settings.upload)
			.await?;
		info!(%reference, "Uploaded \"{data}\" and got reference \"{reference}\"");

		self.stats.payload_len = data.len();
		self.last_reference = Some(reference.clone());
		Ok(reference)
	}

	/// Downloads the latest text, appends one character and uploads the result.
	pub async fn append_byte(&mut self) -> Result<String> {
		let reference = self
			.last_reference
			.clone()
			.ok_or_else(|| eyre!("Nothing uploaded yet, initial write is needed"))?;

		let text = self.download_with_retry(&reference).await?;
		info!(%reference, "Got text \"{text}\" which is correct");

		let appended = append_random(&text, &mut self.rng);
		info!("Uploading appended data \"{appended}\"");
		let reference = self
			.uploader
			.upload(
				&self.settings.stamp,
				appended.clone().into_bytes(),
				&self.settings.upload,
			)
			.await?;
		info!(%reference, "Uploaded \"{appended}\" and got reference \"{reference}\"");

		self.last_reference = Some(reference);
		self.stats.cycles += 1;
		self.stats.payload_len = appended.len();
		Ok(appended)
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
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{
		appender::tests::{reference, settings, Scripted},
		network::MockStorage,
		retry::Exhausted,
		types::ExhaustionPolicy,
	};
	use color_eyre::eyre::eyre;
	use std::{
		collections::HashMap,
		sync::{Arc, Mutex},
	};

	type Store = Arc<Mutex<HashMap<Reference, Vec<u8>>>>;

	/// Uploader storing payloads in `store` under references 1, 2, 3...
	fn uploader(store: Store, uploads: Arc<Mutex<Vec<String>>>) -> MockStorage {
		let mut uploader = MockStorage::new();
		uploader.expect_upload().returning(move |_, payload, _| {
			let mut store = store.lock().unwrap();
			let reference = reference(store.len() as u8 + 1);
			store.insert(reference.clone(), payload.clone());
			uploads
				.lock()
				.unwrap()
				.push(String::from_utf8(payload).unwrap());
			Box::pin(async move { Ok(reference) })
		});
		uploader
	}

	/// Downloader reading from `store`, failing the calls listed in `failing`.
	fn downloader(store: Store, failing: Vec<usize>) -> MockStorage {
		let mut downloader = MockStorage::new();
		let mut calls = 0;
		downloader.expect_download().returning(move |reference, _| {
			calls += 1;
			let result = if failing.contains(&calls) {
				Err(eyre!("gateway timeout"))
			} else {
				Ok(store.lock().unwrap()[reference].clone())
			};
			Box::pin(async move { result })
		});
		downloader
	}

	#[tokio::test(start_paused = true)]
	async fn grows_text_one_character_per_cycle() {
		let store = Store::default();
		let uploads: Arc<Mutex<Vec<String>>> = Arc::default();
		let mut appender = ReferenceAppender::new(
			uploader(store.clone(), Arc::clone(&uploads)),
			downloader(store, vec![]),
			Scripted::new("a7q"),
			settings(3, 10, 2),
		);

		appender.run().await.unwrap();

		assert_eq!(*uploads.lock().unwrap(), vec!["a", "a7", "a7q"]);
		assert_eq!(appender.last_reference(), Some(&reference(3)));
		assert_eq!(appender.stats().cycles, 2);
		assert_eq!(appender.stats().payload_len, 3);
		assert_eq!(appender.stats().restarts, 0);
	}

	#[tokio::test(start_paused = true)]
	async fn exhausted_download_restarts_from_new_seed() {
		let store = Store::default();
		let uploads: Arc<Mutex<Vec<String>>> = Arc::default();
		let mut appender = ReferenceAppender::new(
			uploader(store.clone(), Arc::clone(&uploads)),
			// Second cycle downloads fail three times in a row
			downloader(store, vec![2, 3, 4]),
			Scripted::new("a7mx"),
			settings(3, 10, 2),
		);

		appender.run().await.unwrap();

		assert_eq!(*uploads.lock().unwrap(), vec!["a", "a7", "m", "mx"]);
		assert_eq!(appender.last_reference(), Some(&reference(4)));
		assert_eq!(appender.stats().restarts, 1);
		assert_eq!(appender.stats().failed_attempts, 3);
	}

	#[tokio::test(start_paused = true)]
	async fn transient_download_failures_are_retried() {
		let store = Store::default();
		let uploads: Arc<Mutex<Vec<String>>> = Arc::default();
		let mut appender = ReferenceAppender::new(
			uploader(store.clone(), Arc::clone(&uploads)),
			downloader(store, vec![1, 2]),
			Scripted::new("a7"),
			settings(3, 10, 1),
		);

		appender.run().await.unwrap();

		assert_eq!(*uploads.lock().unwrap(), vec!["a", "a7"]);
		assert_eq!(appender.stats().failed_attempts, 2);
		assert_eq!(appender.stats().restarts, 0);
	}

	#[tokio::test(start_paused = true)]
	async fn terminate_policy_returns_exhaustion() {
		let store = Store::default();
		let uploads: Arc<Mutex<Vec<String>>> = Arc::default();
		let mut downloader = MockStorage::new();
		downloader
			.expect_download()
			.times(3)
			.returning(|_, _| Box::pin(async { Err(eyre!("not found")) }));
		let mut appender = ReferenceAppender::new(
			uploader(store, Arc::clone(&uploads)),
			downloader,
			Scripted::new("a"),
			Settings {
				on_exhaustion: ExhaustionPolicy::Terminate,
				..settings(3, 10, 5)
			},
		);

		let report = appender.run().await.unwrap_err();

		let exhausted = report.downcast_ref::<Exhausted>().unwrap();
		assert_eq!(exhausted.attempts, 3);
		assert_eq!(
			exhausted.operation,
			format!("download reference {}", reference(1))
		);
		assert_eq!(appender.last_reference(), None);
	}

	#[tokio::test(start_paused = true)]
	async fn failed_initial_upload_restarts() {
		let mut attempts = 0;
		let mut uploader = MockStorage::new();
		uploader.expect_upload().returning(move |_, _, _| {
			attempts += 1;
			let result = match attempts {
				1 => Err(eyre!("service unavailable")),
				n => Ok(reference(n as u8)),
			};
			Box::pin(async move { result })
		});
		let mut downloader = MockStorage::new();
		downloader
			.expect_download()
			.returning(|_, _| Box::pin(async { Ok(b"b".to_vec()) }));

		let mut appender = ReferenceAppender::new(
			uploader,
			downloader,
			Scripted::new("abc"),
			settings(3, 10, 1),
		);

		appender.run().await.unwrap();

		assert_eq!(appender.stats().restarts, 1);
		assert_eq!(appender.last_reference(), Some(&reference(3)));
	}

	#[tokio::test(start_paused = true)]
	async fn refused_uploads_pause_before_restart() {
		let mut attempts = 0;
		let mut uploader = MockStorage::new();
		uploader.expect_upload().times(7).returning(move |_, _, _| {
			attempts += 1;
			let result = match attempts {
				1..=5 => Err(eyre!("connection refused")),
				n => Ok(reference(n as u8)),
			};
			Box::pin(async move { result })
		});
		let mut downloader = MockStorage::new();
		downloader
			.expect_download()
			.returning(|_, _| Box::pin(async { Ok(b"f".to_vec()) }));

		let mut appender = ReferenceAppender::new(
			uploader,
			downloader,
			Scripted::new("abcdefg"),
			settings(3, 10, 1),
		);

		let start = tokio::time::Instant::now();
		appender.run().await.unwrap();

		assert_eq!(appender.stats().restarts, 5);
		// Five restart pauses and one cycle pause
		assert!(start.elapsed() >= std::time::Duration::from_secs(60));
	}

	#[tokio::test]
	async fn append_needs_initial_write() {
		let mut appender = ReferenceAppender::new(
			MockStorage::new(),
			MockStorage::new(),
			Scripted::new(""),
			settings(3, 10, 1),
		);
		assert!(appender.append_byte().await.is_err());
	}
}
