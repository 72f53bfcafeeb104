//! Chunk layout of sequence feed updates.
//!
//! A feed update is a single owner chunk wrapping a content addressed chunk whose payload is the
//! update timestamp followed by the referenced content address.

use crate::{
	crypto::{keccak256, keccak256_concat, Identity, SIGNATURE_SIZE},
	types::{Reference, Topic},
};
use color_eyre::{eyre::eyre, Result};

pub const SEGMENT_SIZE: usize = 32;
pub const MAX_PAYLOAD_SIZE: usize = 4096;
pub const SPAN_SIZE: usize = 8;

/// Root of the binary Merkle tree over payload padded to [`MAX_PAYLOAD_SIZE`].
pub fn bmt_root(payload: &[u8]) -> Result<[u8; 32]> {
	if payload.len() > MAX_PAYLOAD_SIZE {
		return Err(eyre!(
			"Chunk payload of {} bytes exceeds {MAX_PAYLOAD_SIZE} bytes",
			payload.len()
		));
	}

	let mut padded = vec![0u8; MAX_PAYLOAD_SIZE];
	padded[..payload.len()].copy_from_slice(payload);

	let mut level: Vec<[u8; 32]> = padded
		.chunks(2 * SEGMENT_SIZE)
		.map(keccak256)
		.collect();
	while level.len() > 1 {
		level = level
			.chunks(2)
			.map(|pair| keccak256_concat(&[&pair[0][..], &pair[1][..]]))
			.collect();
	}
	Ok(level[0])
}

/// Content addressed chunk: little endian span followed by the payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContentChunk {
	pub data: Vec<u8>,
	pub address: [u8; 32],
}

impl ContentChunk {
	pub fn new(payload: &[u8]) -> Result<Self> {
		let span = (payload.len() as u64).to_le_bytes();
		let address = keccak256_concat(&[&span[..], &bmt_root(payload)?[..]]);
		let mut data = Vec::with_capacity(SPAN_SIZE + payload.len());
		data.extend_from_slice(&span);
		data.extend_from_slice(payload);
		Ok(Self { data, address })
	}

	pub fn payload(&self) -> &[u8] {
		&self.data[SPAN_SIZE..]
	}
}

pub fn feed_identifier(topic: &Topic, index: u64) -> [u8; 32] {
	keccak256_concat(&[&topic.as_bytes()[..], &index.to_be_bytes()[..]])
}

/// Signed feed update ready to be uploaded as a single owner chunk.
#[derive(Clone, Debug)]
pub struct FeedUpdateChunk {
	pub identifier: [u8; 32],
	pub signature: [u8; SIGNATURE_SIZE],
	pub chunk: ContentChunk,
}

impl FeedUpdateChunk {
	pub fn new(
		identity: &Identity,
		topic: &Topic,
		index: u64,
		timestamp: u64,
		reference: &Reference,
	) -> Result<Self> {
		let mut payload = Vec::with_capacity(8 + reference.as_bytes().len());
		payload.extend_from_slice(&timestamp.to_be_bytes());
		payload.extend_from_slice(reference.as_bytes());
		let chunk = ContentChunk::new(&payload)?;

		let identifier = feed_identifier(topic, index);
		let digest = keccak256_concat(&[&identifier[..], &chunk.address[..]]);
		let signature = identity.sign(&digest)?;

		Ok(Self {
			identifier,
			signature,
			chunk,
		})
	}

	/// Address of the single owner chunk, derived from identifier and owner.
	pub fn address(&self, identity: &Identity) -> [u8; 32] {
		keccak256_concat(&[&self.identifier[..], &identity.address().as_bytes()[..]])
	}
}
