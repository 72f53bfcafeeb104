use super::{chunk::FeedUpdateChunk, Client};
use crate::{
	crypto::Identity,
	network::{FeedReader, FeedWriter},
	types::{BatchId, EthAddress, FeedUpdate, Reference, Topic},
};
use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

/// Reads the latest update of a sequence feed.
#[derive(Clone, Debug)]
pub struct SequenceReader {
	client: Client,
	topic: Topic,
	owner: EthAddress,
}

impl SequenceReader {
	pub fn new(client: Client, topic: Topic, owner: EthAddress) -> Self {
		Self {
			client,
			topic,
			owner,
		}
	}
}

#[async_trait]
impl FeedReader for SequenceReader {
	async fn read(&self) -> Result<FeedUpdate> {
		let Some(lookup) = self.client.feed_lookup(&self.owner, &self.topic).await? else {
			return Err(eyre!(
				"Feed {} of {} has no updates yet",
				self.topic,
				self.owner
			));
		};

		Ok(FeedUpdate {
			index: lookup.index,
			reference: lookup.reference,
		})
	}
}

/// Signs and uploads sequence feed updates, one index after another.
#[derive(Clone, Debug)]
pub struct SequenceWriter {
	client: Client,
	topic: Topic,
	identity: Identity,
}

impl SequenceWriter {
	pub fn new(client: Client, topic: Topic, identity: Identity) -> Self {
		Self {
			client,
			topic,
			identity,
		}
	}

	async fn next_index(&self) -> Result<u64> {
		let lookup = self
			.client
			.feed_lookup(&self.identity.address(), &self.topic)
			.await?;
		Ok(lookup.map_or(0, |lookup| lookup.index_next))
	}
}

fn unix_timestamp() -> u64 {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.map(|elapsed| elapsed.as_secs())
		.unwrap_or_default()
}

#[async_trait]
impl FeedWriter for SequenceWriter {
	async fn publish(&self, stamp: &BatchId, reference: &Reference) -> Result<()> {
		let index = self.next_index().await?;
		let update =
			FeedUpdateChunk::new(&self.identity, &self.topic, index, unix_timestamp(), reference)?;

		let address = self
			.client
			.upload_soc(
				stamp,
				&self.identity.address(),
				&update.identifier,
				&update.signature,
				update.chunk.data.clone(),
			)
			.await?;

		debug!(
			index,
			%reference,
			%address,
			expected = hex::encode(update.address(&self.identity)),
			"Feed update uploaded"
		);
		Ok(())
	}
}
