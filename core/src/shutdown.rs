use tokio::signal;
use tracing::warn;

/// Waits for the user to stop the canary and returns the name of the received signal.
///
/// Ctrl-C is always watched. SIGTERM is watched on Unix and Ctrl-Close/Ctrl-Shutdown on Windows.
/// A platform signal whose handler can't be installed is logged and ignored.
pub async fn user_signal() -> &'static str {
	tokio::select! {
		_ = ctrl_c() => "Ctrl-C",
		name = platform_signal() => name,
	}
}

async fn ctrl_c() {
	if let Err(error) = signal::ctrl_c().await {
		warn!("Cannot listen for Ctrl-C: {error}");
		std::future::pending::<()>().await;
	}
}

#[cfg(unix)]
async fn platform_signal() -> &'static str {
	match signal::unix::signal(signal::unix::SignalKind::terminate()) {
		Ok(mut terminate) => {
			terminate.recv().await;
			"SIGTERM"
		},
		Err(error) => {
			warn!("Cannot listen for SIGTERM: {error}");
			std::future::pending().await
		},
	}
}

#[cfg(windows)]
async fn platform_signal() -> &'static str {
	match (signal::windows::ctrl_close(), signal::windows::ctrl_shutdown()) {
		(Ok(mut close), Ok(mut shutdown)) => tokio::select! {
			_ = close.recv() => "Ctrl-Close",
			_ = shutdown.recv() => "Ctrl-Shutdown",
		},
		_ => {
			warn!("Cannot listen for Ctrl-Close and Ctrl-Shutdown");
			std::future::pending().await
		},
	}
}

#[cfg(not(any(unix, windows)))]
async fn platform_signal() -> &'static str {
	std::future::pending().await
}

#[cfg(all(test, unix))]
mod tests {
	use super::*;
	use std::{process::Command, time::Duration};
	use tokio::{
		signal::unix::{signal, SignalKind},
		time::timeout,
	};

	#[tokio::test]
	async fn sigterm_is_reported() {
		// Keeps SIGTERM from ending the test process whatever happens below
		let _guard = signal(SignalKind::terminate()).unwrap();

		let waiting = tokio::spawn(user_signal());
		tokio::task::yield_now().await;

		let status = Command::new("kill")
			.args(["-TERM", &std::process::id().to_string()])
			.status()
			.unwrap();
		assert!(status.success());

		let name = timeout(Duration::from_secs(5), waiting)
			.await
			.unwrap()
			.unwrap();
		assert_eq!(name, "SIGTERM");
	}
}
