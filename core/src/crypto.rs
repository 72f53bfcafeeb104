//! Hashing and signing needed to author feed updates.
use crate::types::{EthAddress, ADDRESS_SIZE};
use color_eyre::{eyre::eyre, Result};
use k256::ecdsa::SigningKey;
use rand::rngs::OsRng;
use sha3::{Digest, Keccak256};

pub const SIGNATURE_SIZE: usize = 65;

pub fn keccak256(data: &[u8]) -> [u8; 32] {
	Keccak256::digest(data).into()
}

/// Hashes concatenation of all parts, without allocating the concatenated input.
pub fn keccak256_concat(parts: &[&[u8]]) -> [u8; 32] {
	let mut hasher = Keccak256::new();
	for part in parts {
		hasher.update(part);
	}
	hasher.finalize().into()
}

fn ethereum_message_digest(data: &[u8]) -> [u8; 32] {
	let prefix = format!("\x19Ethereum Signed Message:\n{}", data.len());
	keccak256_concat(&[prefix.as_bytes(), data])
}

/// Key pair authorizing feed publications, never persisted.
#[derive(Clone)]
pub struct Identity {
	signing_key: SigningKey,
	address: EthAddress,
}

impl Identity {
	pub fn random() -> Self {
		Self::from_signing_key(SigningKey::random(&mut OsRng))
	}

	pub fn from_secret(secret: &[u8]) -> Result<Self> {
		let signing_key =
			SigningKey::from_slice(secret).map_err(|error| eyre!("Invalid secret key: {error}"))?;
		Ok(Self::from_signing_key(signing_key))
	}

	fn from_signing_key(signing_key: SigningKey) -> Self {
		let public_key = signing_key.verifying_key().to_encoded_point(false);
		// Uncompressed point is prefixed with a single 0x04 tag byte
		let hash = keccak256(&public_key.as_bytes()[1..]);
		let mut address = [0u8; ADDRESS_SIZE];
		address.copy_from_slice(&hash[32 - ADDRESS_SIZE..]);
		Self {
			signing_key,
			address: EthAddress(address),
		}
	}

	pub fn address(&self) -> EthAddress {
		self.address
	}

	/// Signs `data` as an Ethereum personal message.
	///
	/// Signature is encoded as `r || s || v`, with `v` being 27 or 28.
	pub fn sign(&self, data: &[u8]) -> Result<[u8; SIGNATURE_SIZE]> {
		let digest = ethereum_message_digest(data);
		let (signature, recovery_id) = self
			.signing_key
			.sign_prehash_recoverable(&digest)
			.map_err(|error| eyre!("Signing failed: {error}"))?;

		let mut encoded = [0u8; SIGNATURE_SIZE];
		encoded[..64].copy_from_slice(&signature.to_bytes());
		encoded[64] = recovery_id.to_byte() + 27;
		Ok(encoded)
	}
}

impl std::fmt::Debug for Identity {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Identity")
			.field("address", &self.address)
			.finish_non_exhaustive()
	}
}
