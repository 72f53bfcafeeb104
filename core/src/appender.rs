//! Append-verify loops exercising the storage network.
//!
//! Both loops start from a single random character and then keep reading the latest text back,
//! appending one random character and uploading the result. The reference loop remembers the last
//! content address, the feed loop resolves it through a feed on every cycle.

use crate::{
	network::{DownloadOptions, UploadOptions},
	retry::{Exhausted, Retried, RetryConfig},
	stats::CanaryStats,
	types::{BatchId, ExhaustionPolicy},
};
use color_eyre::{Report, Result};
use rand::{distributions::Alphanumeric, Rng, RngCore};
use std::time::Duration;
use tokio::time::sleep;
use tracing::error;

pub mod feed;
pub mod reference;

pub use feed::FeedAppender;
pub use reference::ReferenceAppender;

/// Source of the characters appended to the payload.
pub trait Randomness {
	fn alphanumeric(&mut self) -> char;
}

impl<R: RngCore> Randomness for R {
	fn alphanumeric(&mut self) -> char {
		char::from(self.sample(Alphanumeric))
	}
}

pub fn append_random(text: &str, rng: &mut impl Randomness) -> String {
	let mut appended = String::with_capacity(text.len() + 1);
	appended.push_str(text);
	appended.push(rng.alphanumeric());
	appended
}

#[derive(Clone, Debug)]
pub struct Settings {
	pub stamp: BatchId,
	pub upload: UploadOptions,
	pub download: DownloadOptions,
	pub retry: RetryConfig,
	/// Pause between two append cycles.
	pub cycle_interval: Duration,
	pub on_exhaustion: ExhaustionPolicy,
	/// Number of successful cycles after which the loop returns, runs forever if not set.
	pub max_cycles: Option<u64>,
}

impl Default for Settings {
	fn default() -> Self {
		Self {
			stamp: BatchId::zero(),
			upload: UploadOptions::default(),
			download: DownloadOptions::default(),
			retry: RetryConfig::default(),
			cycle_interval: Duration::from_secs(10),
			on_exhaustion: ExhaustionPolicy::Restart,
			max_cycles: None,
		}
	}
}

impl Settings {
	fn cycles_done(&self, stats: &CanaryStats) -> bool {
		self.max_cycles.is_some_and(|max| stats.cycles >= max)
	}
}

/// Adds retry counters to the stats, keeping the retried value or the exhaustion error.
fn record<T>(stats: &mut CanaryStats, result: Result<Retried<T>, Exhausted>) -> Result<T> {
	match result {
		Ok(retried) => {
			stats.failed_attempts += retried.failed_attempts() as u64;
			stats.stale_reads += retried.stale_reads as u64;
			Ok(retried.value)
		},
		Err(exhausted) => {
			stats.failed_attempts += exhausted.attempts as u64;
			stats.stale_reads += exhausted.stale_reads as u64;
			Err(exhausted.into())
		},
	}
}

/// Decides whether the outer loop goes on after the append sequence failed.
///
/// A restart waits one cycle interval first, so an unreachable gateway is not hammered.
async fn on_failure(settings: &Settings, stats: &mut CanaryStats, report: Report) -> Result<()> {
	let reason = if report.downcast_ref::<Exhausted>().is_some() {
		"Ran out of retry attempts"
	} else {
		"Append sequence failed"
	};

	match settings.on_exhaustion {
		ExhaustionPolicy::Restart => {
			let pause = settings.cycle_interval;
			error!(
				restarts = stats.restarts + 1,
				"{reason}, restarting loop in {pause:?}: {report:#}"
			);
			stats.restarts += 1;
			sleep(pause).await;
			Ok(())
		},
		ExhaustionPolicy::Terminate => {
			error!("{reason}, exiting: {report:#}");
			Err(report)
		},
	}
}

#[cfg(test)]
pub(crate) mod tests {
	use super::*;
	use crate::types::Reference;
	use rand::{rngs::StdRng, SeedableRng};
	use std::collections::VecDeque;

	/// Hands out a fixed sequence of characters.
	pub struct Scripted(VecDeque<char>);

	impl Scripted {
		pub fn new(chars: &str) -> Self {
			Scripted(chars.chars().collect())
		}
	}

	impl Randomness for Scripted {
		fn alphanumeric(&mut self) -> char {
			self.0.pop_front().expect("script has enough characters")
		}
	}

	pub fn reference(tag: u8) -> Reference {
		Reference::try_from(vec![tag; 32]).unwrap()
	}

	pub fn settings(attempts: usize, interval: u64, max_cycles: u64) -> Settings {
		Settings {
			retry: RetryConfig::new(attempts, Duration::from_secs(interval)),
			cycle_interval: Duration::from_secs(interval),
			max_cycles: Some(max_cycles),
			..Default::default()
		}
	}

	#[test]
	fn appends_exactly_one_alphanumeric_char() {
		let mut rng = StdRng::seed_from_u64(42);
		let mut text = String::new();
		for _ in 0..100 {
			let appended = append_random(&text, &mut rng);
			assert_eq!(appended.len(), text.len() + 1);
			assert!(appended.starts_with(&text));
			assert!(appended.chars().last().unwrap().is_ascii_alphanumeric());
			text = appended;
		}
	}

	#[test]
	fn scripted_randomness_is_used_in_order() {
		let mut rng = Scripted::new("7q");
		let text = append_random("a", &mut rng);
		assert_eq!(append_random(&text, &mut rng), "a7q");
	}

	#[tokio::test(start_paused = true)]
	async fn policy_decides_on_failure() {
		let mut stats = CanaryStats::new();
		let report = Report::new(Exhausted {
			operation: "download reference".to_string(),
			attempts: 3,
			stale_reads: 0,
			last_error: "timeout".to_string(),
		});
		let terminate = Settings {
			on_exhaustion: ExhaustionPolicy::Terminate,
			..settings(3, 10, 1)
		};
		assert!(on_failure(&terminate, &mut stats, report).await.is_err());
		assert_eq!(stats.restarts, 0);

		let start = tokio::time::Instant::now();
		let report = Report::msg("upload failed");
		assert!(on_failure(&settings(3, 10, 1), &mut stats, report).await.is_ok());
		assert_eq!(stats.restarts, 1);
		assert!(start.elapsed() >= Duration::from_secs(10));
	}
}
