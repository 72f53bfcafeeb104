//! HTTP client for the Bee node API, as exposed by public gateways.
use super::{DownloadOptions, Storage, UploadOptions};
use crate::types::{BatchId, EthAddress, Reference, Topic};
use async_trait::async_trait;
use color_eyre::{
	eyre::{eyre, WrapErr},
	Result,
};
use reqwest::{
	header::{HeaderMap, CONTENT_TYPE},
	Request, StatusCode,
};
use serde::Deserialize;
use tracing::debug;

pub mod chunk;
pub mod feed;

pub const POSTAGE_BATCH_ID_HEADER: &str = "swarm-postage-batch-id";
pub const DEFERRED_UPLOAD_HEADER: &str = "swarm-deferred-upload";
pub const FEED_INDEX_HEADER: &str = "swarm-feed-index";
pub const FEED_INDEX_NEXT_HEADER: &str = "swarm-feed-index-next";

#[derive(Deserialize, Debug)]
struct ReferenceResponse {
	reference: Reference,
}

/// Latest feed update as resolved by the node, with the index the next update should use.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeedLookup {
	pub index: u64,
	pub index_next: u64,
	pub reference: Reference,
}

#[derive(Clone, Debug)]
pub struct Client {
	http: reqwest::Client,
	host: String,
}

impl Client {
	pub fn new(host: &str) -> Result<Self> {
		let http = reqwest::Client::builder()
			.user_agent(concat!("swarm-canary/", env!("CARGO_PKG_VERSION")))
			.build()
			.wrap_err("Failed to build HTTP client")?;
		Ok(Self::with_http_client(http, host))
	}

	pub fn with_http_client(http: reqwest::Client, host: &str) -> Self {
		Self {
			http,
			host: host.trim_end_matches('/').to_string(),
		}
	}

	pub fn host(&self) -> &str {
		&self.host
	}

	fn url(&self, path: &str) -> String {
		format!("{}/{path}", self.host)
	}

	/// Request resolving the latest update of a sequence feed.
	pub fn feed_lookup_request(&self, owner: &EthAddress, topic: &Topic) -> Result<Request> {
		self.http
			.get(self.url(&format!("feeds/{owner}/{topic}")))
			.query(&[("type", "sequence")])
			.build()
			.wrap_err("Failed to build feed lookup request")
	}

	/// Looks up the latest update of a sequence feed. Returns `None` if the feed has no updates.
	pub async fn feed_lookup(&self, owner: &EthAddress, topic: &Topic) -> Result<Option<FeedLookup>> {
		let response = self
			.http
			.execute(self.feed_lookup_request(owner, topic)?)
			.await
			.wrap_err_with(|| format!("Failed to look up feed {topic} of {owner}"))?;

		if response.status() == StatusCode::NOT_FOUND {
			return Ok(None);
		}

		let response = response
			.error_for_status()
			.wrap_err_with(|| format!("Feed {topic} of {owner} lookup rejected"))?;
		let (index, index_next) = feed_indices(response.headers())?;
		let ReferenceResponse { reference } = response
			.json()
			.await
			.wrap_err("Failed to parse feed lookup response")?;

		debug!(index, index_next, %reference, "Feed lookup");
		Ok(Some(FeedLookup {
			index,
			index_next,
			reference,
		}))
	}

	/// Request uploading a signed single owner chunk. `data` is the chunk span followed by its
	/// payload.
	pub fn upload_soc_request(
		&self,
		stamp: &BatchId,
		owner: &EthAddress,
		identifier: &[u8; 32],
		signature: &[u8],
		data: Vec<u8>,
	) -> Result<Request> {
		self.http
			.post(self.url(&format!("soc/{owner}/{}", hex::encode(identifier))))
			.query(&[("sig", hex::encode(signature))])
			.header(POSTAGE_BATCH_ID_HEADER, stamp.to_string())
			.header(CONTENT_TYPE, "application/octet-stream")
			.body(data)
			.build()
			.wrap_err("Failed to build single owner chunk upload request")
	}

	pub async fn upload_soc(
		&self,
		stamp: &BatchId,
		owner: &EthAddress,
		identifier: &[u8; 32],
		signature: &[u8],
		data: Vec<u8>,
	) -> Result<Reference> {
		let request = self.upload_soc_request(stamp, owner, identifier, signature, data)?;
		self.send_for_reference(request, "Single owner chunk upload").await
	}

	pub fn upload_request(
		&self,
		stamp: &BatchId,
		payload: Vec<u8>,
		options: &UploadOptions,
	) -> Result<Request> {
		let mut request = self
			.http
			.post(self.url("bytes"))
			.header(POSTAGE_BATCH_ID_HEADER, stamp.to_string())
			.header(DEFERRED_UPLOAD_HEADER, options.deferred.to_string())
			.header(CONTENT_TYPE, "application/octet-stream")
			.body(payload);
		if let Some(timeout) = options.timeout {
			request = request.timeout(timeout);
		}
		request.build().wrap_err("Failed to build upload request")
	}

	pub fn download_request(&self, reference: &Reference, options: &DownloadOptions) -> Result<Request> {
		let mut request = self.http.get(self.url(&format!("bytes/{reference}")));
		if let Some(timeout) = options.timeout {
			request = request.timeout(timeout);
		}
		request.build().wrap_err("Failed to build download request")
	}

	async fn send_for_reference(&self, request: Request, what: &str) -> Result<Reference> {
		let ReferenceResponse { reference } = self
			.http
			.execute(request)
			.await
			.wrap_err_with(|| format!("{what} failed"))?
			.error_for_status()
			.wrap_err_with(|| format!("{what} rejected"))?
			.json()
			.await
			.wrap_err_with(|| format!("{what} returned invalid response"))?;
		Ok(reference)
	}
}

/// Feed indices are hex encoded big endian integers.
pub fn parse_feed_index(value: &str) -> Result<u64> {
	u64::from_str_radix(value.trim(), 16).map_err(|error| eyre!("Invalid feed index {value:?}: {error}"))
}

fn feed_indices(headers: &HeaderMap) -> Result<(u64, u64)> {
	let header = |name: &str| -> Result<Option<u64>> {
		headers
			.get(name)
			.map(|value| {
				value
					.to_str()
					.map_err(|error| eyre!("Invalid {name} header: {error}"))
					.and_then(parse_feed_index)
			})
			.transpose()
	};

	let index = header(FEED_INDEX_HEADER)?.ok_or_else(|| eyre!("Missing {FEED_INDEX_HEADER} header"))?;
	let index_next = header(FEED_INDEX_NEXT_HEADER)?.unwrap_or(index.saturating_add(1));
	Ok((index, index_next))
}

#[async_trait]
impl Storage for Client {
	async fn upload(
		&self,
		stamp: &BatchId,
		payload: Vec<u8>,
		options: &UploadOptions,
	) -> Result<Reference> {
		let request = self.upload_request(stamp, payload, options)?;
		self.send_for_reference(request, "Upload").await
	}

	async fn download(&self, reference: &Reference, options: &DownloadOptions) -> Result<Vec<u8>> {
		let request = self.download_request(reference, options)?;
		let bytes = self
			.http
			.execute(request)
			.await
			.wrap_err_with(|| format!("Download of {reference} failed"))?
			.error_for_status()
			.wrap_err_with(|| format!("Download of {reference} rejected"))?
			.bytes()
			.await
			.wrap_err_with(|| format!("Download of {reference} interrupted"))?;
		Ok(bytes.to_vec())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use reqwest::header::HeaderValue;
	use std::time::Duration;
	use test_case::test_case;

	#[test_case("0000000000000005" => 5 ; "padded")]
	#[test_case("1a" => 26 ; "short")]
	#[test_case("ffffffffffffffff" => u64::MAX ; "max")]
	fn feed_index_is_hex(value: &str) -> u64 {
		parse_feed_index(value).unwrap()
	}

	#[test]
	fn feed_index_rejects_garbage() {
		assert!(parse_feed_index("index").is_err());
	}

	#[test]
	fn next_index_defaults_to_following_index() {
		let mut headers = HeaderMap::new();
		headers.insert(FEED_INDEX_HEADER, HeaderValue::from_static("0000000000000006"));
		assert_eq!(feed_indices(&headers).unwrap(), (6, 7));

		headers.insert(
			FEED_INDEX_NEXT_HEADER,
			HeaderValue::from_static("0000000000000009"),
		);
		assert_eq!(feed_indices(&headers).unwrap(), (6, 9));
	}

	#[test]
	fn missing_index_is_an_error() {
		assert!(feed_indices(&HeaderMap::new()).is_err());
	}

	fn client() -> Client {
		Client::with_http_client(reqwest::Client::new(), "https://gateway.example")
	}

	fn header<'a>(request: &'a Request, name: &str) -> Option<&'a str> {
		request
			.headers()
			.get(name)
			.and_then(|value| value.to_str().ok())
	}

	#[test_case(false, None ; "confirmed without timeout")]
	#[test_case(true, Some(Duration::from_secs(30)) ; "deferred with timeout")]
	fn upload_request_carries_stamp_and_options(deferred: bool, timeout: Option<Duration>) {
		let stamp: BatchId = "ab".repeat(32).parse().unwrap();
		let options = UploadOptions { deferred, timeout };

		let request = client()
			.upload_request(&stamp, b"a7".to_vec(), &options)
			.unwrap();

		assert_eq!(request.method(), &reqwest::Method::POST);
		assert_eq!(request.url().as_str(), "https://gateway.example/bytes");
		assert_eq!(header(&request, POSTAGE_BATCH_ID_HEADER), Some(&*"ab".repeat(32)));
		assert_eq!(
			header(&request, DEFERRED_UPLOAD_HEADER),
			Some(deferred.to_string().as_str())
		);
		assert_eq!(request.timeout(), timeout.as_ref());
		assert_eq!(
			request.body().and_then(|body| body.as_bytes()),
			Some(&b"a7"[..])
		);
	}

	#[test]
	fn download_request_addresses_reference() {
		let reference: Reference = "0f".repeat(32).parse().unwrap();
		let options = DownloadOptions {
			timeout: Some(Duration::from_secs(30)),
		};

		let request = client().download_request(&reference, &options).unwrap();

		assert_eq!(request.method(), &reqwest::Method::GET);
		assert_eq!(
			request.url().as_str(),
			format!("https://gateway.example/bytes/{}", "0f".repeat(32))
		);
		assert_eq!(request.timeout(), Some(&Duration::from_secs(30)));
		assert!(client()
			.download_request(&reference, &DownloadOptions::default())
			.unwrap()
			.timeout()
			.is_none());
	}

	#[test]
	fn soc_upload_request_signs_in_query() {
		let owner: EthAddress = "7e5f4552091a69125d5dfcb7b8c2659029395bdf".parse().unwrap();
		let identifier = [0xaa; 32];
		let signature = [0xbb; 65];

		let request = client()
			.upload_soc_request(&BatchId::zero(), &owner, &identifier, &signature, vec![1, 2])
			.unwrap();

		assert_eq!(request.method(), &reqwest::Method::POST);
		assert_eq!(
			request.url().path(),
			format!("/soc/7e5f4552091a69125d5dfcb7b8c2659029395bdf/{}", "aa".repeat(32))
		);
		let query: Vec<(String, String)> = request.url().query_pairs().into_owned().collect();
		assert_eq!(query, vec![("sig".to_string(), "bb".repeat(65))]);
		assert_eq!(header(&request, POSTAGE_BATCH_ID_HEADER), Some(&*"00".repeat(32)));
	}

	#[test]
	fn feed_lookup_request_asks_for_sequence() {
		let owner: EthAddress = "7e5f4552091a69125d5dfcb7b8c2659029395bdf".parse().unwrap();
		let topic = Topic([0x01; 32]);

		let request = client().feed_lookup_request(&owner, &topic).unwrap();

		assert_eq!(
			request.url().as_str(),
			format!(
				"https://gateway.example/feeds/7e5f4552091a69125d5dfcb7b8c2659029395bdf/{}?type=sequence",
				"01".repeat(32)
			)
		);
	}

	#[test]
	fn host_trailing_slash_is_ignored() {
		let client = Client::with_http_client(reqwest::Client::new(), "https://gateway.example/");
		assert_eq!(client.url("bytes"), "https://gateway.example/bytes");
	}
}
