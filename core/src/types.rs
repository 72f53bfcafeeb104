//! Shared canary structs and enums.
use clap::ValueEnum;
use color_eyre::{eyre::eyre, Report, Result};
use derive_more::derive::Display;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Formatter};
use std::str::FromStr;
use std::time::Duration;

pub const REFERENCE_SIZE: usize = 32;
pub const ENCRYPTED_REFERENCE_SIZE: usize = 64;
pub const BATCH_ID_SIZE: usize = 32;
pub const TOPIC_SIZE: usize = 32;
pub const ADDRESS_SIZE: usize = 20;

fn decode_hex<const N: usize>(value: &str, what: &str) -> Result<[u8; N]> {
	let bytes = hex::decode(value.trim_start_matches("0x"))
		.map_err(|error| eyre!("Invalid {what} {value:?}: {error}"))?;
	bytes
		.try_into()
		.map_err(|bytes: Vec<u8>| eyre!("Invalid {what} length {}, expected {N}", bytes.len()))
}

macro_rules! fixed_hex {
	($(#[$meta:meta])* $name:ident, $size:expr, $what:literal) => {
		$(#[$meta])*
		#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
		#[serde(try_from = "String", into = "String")]
		pub struct $name(pub [u8; $size]);

		impl $name {
			pub fn as_bytes(&self) -> &[u8; $size] {
				&self.0
			}
		}

		impl FromStr for $name {
			type Err = Report;

			fn from_str(value: &str) -> Result<Self> {
				decode_hex::<$size>(value, $what).map(Self)
			}
		}

		impl TryFrom<String> for $name {
			type Error = Report;

			fn try_from(value: String) -> Result<Self> {
				value.parse()
			}
		}

		impl From<$name> for String {
			fn from(value: $name) -> Self {
				value.to_string()
			}
		}

		impl fmt::Display for $name {
			fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
				f.write_str(&hex::encode(self.0))
			}
		}

		impl fmt::Debug for $name {
			fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
				write!(f, "{}({})", stringify!($name), self)
			}
		}
	};
}

fixed_hex!(
	/// Postage batch identifier authorizing storage of uploaded data.
	BatchId,
	BATCH_ID_SIZE,
	"postage batch ID"
);

fixed_hex!(
	/// Feed topic, together with the owner it identifies a feed.
	Topic,
	TOPIC_SIZE,
	"feed topic"
);

fixed_hex!(
	/// Ethereum style address of a feed owner.
	EthAddress,
	ADDRESS_SIZE,
	"owner address"
);

impl BatchId {
	/// Placeholder stamp accepted by gateways which attach their own postage.
	pub fn zero() -> Self {
		BatchId([0u8; BATCH_ID_SIZE])
	}
}

impl Default for BatchId {
	fn default() -> Self {
		Self::zero()
	}
}

impl Topic {
	pub fn random(rng: &mut impl Rng) -> Self {
		let mut topic = [0u8; TOPIC_SIZE];
		rng.fill(&mut topic);
		Topic(topic)
	}
}

/// Content address returned by the storage network for uploaded data.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Reference(Vec<u8>);

impl Reference {
	pub fn as_bytes(&self) -> &[u8] {
		&self.0
	}
}

impl TryFrom<Vec<u8>> for Reference {
	type Error = Report;

	fn try_from(bytes: Vec<u8>) -> Result<Self> {
		match bytes.len() {
			REFERENCE_SIZE | ENCRYPTED_REFERENCE_SIZE => Ok(Reference(bytes)),
			length => Err(eyre!(
				"Invalid reference length {length}, expected {REFERENCE_SIZE} or {ENCRYPTED_REFERENCE_SIZE}"
			)),
		}
	}
}

impl FromStr for Reference {
	type Err = Report;

	fn from_str(value: &str) -> Result<Self> {
		let bytes = hex::decode(value.trim_start_matches("0x"))
			.map_err(|error| eyre!("Invalid reference {value:?}: {error}"))?;
		bytes.try_into()
	}
}

impl TryFrom<String> for Reference {
	type Error = Report;

	fn try_from(value: String) -> Result<Self> {
		value.parse()
	}
}

impl From<Reference> for String {
	fn from(value: Reference) -> Self {
		value.to_string()
	}
}

impl fmt::Display for Reference {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.write_str(&hex::encode(&self.0))
	}
}

impl fmt::Debug for Reference {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		write!(f, "Reference({self})")
	}
}

/// Latest feed entry visible to a reader.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeedUpdate {
	pub index: u64,
	pub reference: Reference,
}

/// What the outer loop does once a sub-operation runs out of retry attempts.
#[derive(Serialize, Deserialize, Debug, Display, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExhaustionPolicy {
	/// Log the failure, drop all payload state and start over from a new seed.
	#[serde(rename = "restart")]
	#[value(name = "restart")]
	#[display("restart")]
	Restart,
	/// Return the failure and end the process.
	#[serde(rename = "terminate")]
	#[value(name = "terminate")]
	#[display("terminate")]
	Terminate,
}

pub mod tracing_level_format {
	use serde::{self, Deserialize, Deserializer, Serializer};
	use std::str::FromStr;
	use tracing::Level;

	pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_str(&level.to_string())
	}

	pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
	where
		D: Deserializer<'de>,
	{
		let value = String::deserialize(deserializer)?;
		Level::from_str(&value).map_err(serde::de::Error::custom)
	}
}

pub mod option_duration_seconds_format {
	use super::duration_seconds_format;
	use super::Duration;
	use serde::{self, Deserialize, Deserializer, Serializer};

	pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		match duration {
			Some(duration) => duration_seconds_format::serialize(duration, serializer),
			None => serializer.serialize_none(),
		}
	}

	pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
	where
		D: Deserializer<'de>,
	{
		let value = Option::<u64>::deserialize(deserializer)?;
		Ok(value.map(Duration::from_secs))
	}
}

pub mod duration_seconds_format {
	use super::Duration;
	use serde::{self, Deserialize, Deserializer, Serializer};

	pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_u64(duration.as_secs())
	}

	pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
	where
		D: Deserializer<'de>,
	{
		let value = u64::deserialize(deserializer)?;
		Ok(Duration::from_secs(value))
	}
}
