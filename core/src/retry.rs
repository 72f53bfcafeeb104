//! Bounded attempts with a fixed delay between them.
//!
//! Every attempt is logged with its sequence number. Failed attempts are logged at error level,
//! except [`StaleRead`] failures, which are expected while a feed update propagates through the
//! network and are logged as warnings.

use crate::types::duration_seconds_format;
use color_eyre::Result;
use serde::{Deserialize, Serialize};
use std::{
	future::Future,
	iter::Take,
	sync::atomic::{AtomicUsize, Ordering},
	time::Duration,
};
use thiserror::Error;
use tokio_retry::{strategy::FixedInterval, Retry};
use tracing::{error, info, warn};

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct RetryConfig {
	/// Maximum number of attempts, including the first one.
	pub attempts: usize,
	/// Delay between two consecutive attempts, in seconds.
	#[serde(with = "duration_seconds_format")]
	pub interval: Duration,
}

impl RetryConfig {
	pub fn new(attempts: usize, interval: Duration) -> Self {
		Self { attempts, interval }
	}
}

impl Default for RetryConfig {
	fn default() -> Self {
		Self {
			attempts: 3,
			interval: Duration::from_secs(10),
		}
	}
}

impl IntoIterator for RetryConfig {
	type Item = Duration;
	type IntoIter = Take<FixedInterval>;

	fn into_iter(self) -> Self::IntoIter {
		// First attempt is not delayed, so there is one delay less than attempts
		FixedInterval::new(self.interval).take(self.attempts.saturating_sub(1))
	}
}

/// Structurally valid response which is older than what was already observed.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("feed index {index} is not newer than last seen index {last_seen}")]
pub struct StaleRead {
	pub index: u64,
	pub last_seen: u64,
}

#[derive(Debug, Error)]
#[error("Failed to {operation} after {attempts} attempts: {last_error}")]
pub struct Exhausted {
	pub operation: String,
	pub attempts: usize,
	pub stale_reads: usize,
	pub last_error: String,
}

#[derive(Debug)]
pub struct Retried<T> {
	pub value: T,
	/// Number of attempts used, the successful one included.
	pub attempts: usize,
	pub stale_reads: usize,
}

impl<T> Retried<T> {
	pub fn failed_attempts(&self) -> usize {
		self.attempts - 1
	}
}

/// Runs `action` until it succeeds or `config.attempts` attempts have failed.
///
/// The action receives the 1-based attempt number. Attempts never overlap. With zero configured
/// attempts the action is never run and the call is exhausted right away.
pub async fn retry<T, A, F>(
	config: &RetryConfig,
	operation: &str,
	mut action: A,
) -> Result<Retried<T>, Exhausted>
where
	A: FnMut(usize) -> F,
	F: Future<Output = Result<T>>,
{
	if config.attempts == 0 {
		return Err(Exhausted {
			operation: operation.to_string(),
			attempts: 0,
			stale_reads: 0,
			last_error: "no attempts configured".to_string(),
		});
	}

	let attempts = AtomicUsize::new(0);
	let stale_reads = AtomicUsize::new(0);

	let result = Retry::spawn(config.clone(), || {
		let attempt = attempts.fetch_add(1, Ordering::Relaxed) + 1;
		info!(attempt, "Attempt {attempt} to {operation}");
		let future = action(attempt);
		let stale_reads = &stale_reads;
		async move {
			future.await.map_err(|report| {
				if let Some(stale) = report.downcast_ref::<StaleRead>() {
					stale_reads.fetch_add(1, Ordering::Relaxed);
					warn!(attempt, "Attempt {attempt} to {operation} got stale data: {stale}");
				} else {
					error!(attempt, "Attempt {attempt} to {operation} failed: {report:#}");
				}
				report
			})
		}
	})
	.await;

	let attempts = attempts.into_inner();
	let stale_reads = stale_reads.into_inner();
	match result {
		Ok(value) => Ok(Retried {
			value,
			attempts,
			stale_reads,
		}),
		Err(report) => Err(Exhausted {
			operation: operation.to_string(),
			attempts,
			stale_reads,
			last_error: format!("{report:#}"),
		}),
	}
}
