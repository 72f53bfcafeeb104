use std::time::Duration;
use tokio::time::Instant;
use tracing::info;

/// Counters of a running canary, logged after every cycle.
#[derive(Debug, Clone)]
pub struct CanaryStats {
	pub cycles: u64,
	pub restarts: u64,
	pub failed_attempts: u64,
	pub stale_reads: u64,
	pub payload_len: usize,
	start_time: Instant,
}

impl Default for CanaryStats {
	fn default() -> Self {
		Self::new()
	}
}

impl CanaryStats {
	pub fn new() -> Self {
		Self {
			cycles: 0,
			restarts: 0,
			failed_attempts: 0,
			stale_reads: 0,
			payload_len: 0,
			start_time: Instant::now(),
		}
	}

	pub fn uptime(&self) -> Duration {
		self.start_time.elapsed()
	}

	pub fn cycles_per_hour(&self) -> f64 {
		let elapsed = self.uptime().as_secs();
		if elapsed == 0 {
			return 0.0;
		}
		self.cycles as f64 * 3600.0 / elapsed as f64
	}

	pub fn print_stats(&self) {
		info!(
			cycles = self.cycles,
			restarts = self.restarts,
			failed_attempts = self.failed_attempts,
			stale_reads = self.stale_reads,
			payload_len = self.payload_len,
			"Stats - Cycles: {}, Restarts: {}, Failed attempts: {}, Stale reads: {}, Payload length: {}, Cycles/hour: {:.2}",
			self.cycles,
			self.restarts,
			self.failed_attempts,
			self.stale_reads,
			self.payload_len,
			self.cycles_per_hour()
		);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test(start_paused = true)]
	async fn rate_follows_uptime() {
		let mut stats = CanaryStats::new();
		assert_eq!(stats.cycles_per_hour(), 0.0);

		stats.cycles = 90;
		tokio::time::advance(Duration::from_secs(1800)).await;
		assert_eq!(stats.uptime(), Duration::from_secs(1800));
		assert_eq!(stats.cycles_per_hour(), 180.0);
	}
}
