use crate::types::{BatchId, FeedUpdate, Reference};
use async_trait::async_trait;
use color_eyre::Result;
use mockall::automock;
use std::time::Duration;

pub mod bee;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UploadOptions {
	/// Acknowledge the upload before the network confirms persistence.
	pub deferred: bool,
	pub timeout: Option<Duration>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DownloadOptions {
	pub timeout: Option<Duration>,
}

/// Upload and download of opaque payloads by content address.
#[async_trait]
#[automock]
pub trait Storage {
	async fn upload(
		&self,
		stamp: &BatchId,
		payload: Vec<u8>,
		options: &UploadOptions,
	) -> Result<Reference>;

	async fn download(&self, reference: &Reference, options: &DownloadOptions) -> Result<Vec<u8>>;
}

/// Read side of a sequence feed, bound to a topic and owner.
#[async_trait]
#[automock]
pub trait FeedReader {
	/// Returns the latest update visible to this reader, which may lag the latest published one.
	async fn read(&self) -> Result<FeedUpdate>;
}

/// Write side of a sequence feed, bound to a topic and signing identity.
#[async_trait]
#[automock]
pub trait FeedWriter {
	/// Appends `reference` to the feed under the next free index.
	async fn publish(&self, stamp: &BatchId, reference: &Reference) -> Result<()>;
}
