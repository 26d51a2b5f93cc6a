//!
//! Minimal REST plumbing shared by the explorer backends.
//!
//! Idempotent GET requests are retried with exponential backoff on network
//! failures, rate limiting and server errors. POST requests go out exactly once:
//! a broadcast must never be replayed behind the caller's back.

use super::ProviderError;
use backoff::{ExponentialBackoff, future::retry};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Clone)]
pub(crate) struct RestClient {
	http_client: Client,
	base_url: String,
	max_retry_elapsed: Duration,
}

impl RestClient {
	pub fn new(
		base_url: &str,
		timeout: Duration,
		max_retry_elapsed: Duration,
	) -> Result<Self, ProviderError> {
		let http_client = Client::builder().timeout(timeout).build()?;

		Ok(Self {
			http_client,
			base_url: base_url.trim_end_matches('/').to_string(),
			max_retry_elapsed,
		})
	}

	pub fn url(&self, path: &str) -> String {
		format!("{}{}", self.base_url, path)
	}

	/// GET `path` and return the body as text, retrying transient failures.
	pub async fn get_text(&self, path: &str) -> Result<String, ProviderError> {
		let url = self.url(path);
		let url = url.as_str();
		let http_client = &self.http_client;

		let policy = ExponentialBackoff {
			max_elapsed_time: Some(self.max_retry_elapsed),
			..ExponentialBackoff::default()
		};

		retry(policy, || async move {
			debug!("GET {}", url);
			let response = http_client.get(url).send().await.map_err(|e| {
				warn!("GET {} failed: {}", url, e);
				backoff::Error::transient(ProviderError::from(e))
			})?;

			let status = response.status();
			let body = response
				.text()
				.await
				.map_err(|e| backoff::Error::transient(ProviderError::from(e)))?;

			if status.is_success() {
				return Ok::<String, backoff::Error<ProviderError>>(body);
			}

			let error = ProviderError::StatusError {
				status: status.as_u16(),
				body,
			};
			if is_retryable(status) {
				warn!("GET {} returned {}, retrying", url, status);
				Err(backoff::Error::transient(error))
			} else {
				Err(backoff::Error::permanent(error))
			}
		})
		.await
	}

	/// GET `path` and decode the JSON body.
	pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ProviderError> {
		let body = self.get_text(path).await?;
		Ok(serde_json::from_str(&body)?)
	}

	/// POST a plain-text body once and return the response body.
	pub async fn post_text(&self, path: &str, body: String) -> Result<String, ProviderError> {
		let url = self.url(path);
		debug!("POST {}", url);

		let response = self
			.http_client
			.post(&url)
			.header("Content-Type", "text/plain")
			.body(body)
			.send()
			.await?;

		Self::read_body(response).await
	}

	/// POST a JSON body once and decode the JSON response.
	pub async fn post_json<T: DeserializeOwned>(
		&self,
		path: &str,
		body: &serde_json::Value,
	) -> Result<T, ProviderError> {
		let url = self.url(path);
		debug!("POST {}", url);

		let response = self
			.http_client
			.post(&url)
			.header("Content-Type", "application/json")
			.json(body)
			.send()
			.await?;

		let text = Self::read_body(response).await?;
		Ok(serde_json::from_str(&text)?)
	}

	async fn read_body(response: reqwest::Response) -> Result<String, ProviderError> {
		let status = response.status();
		let body = response.text().await?;
		if !status.is_success() {
			return Err(ProviderError::StatusError {
				status: status.as_u16(),
				body,
			});
		}
		Ok(body)
	}
}

fn is_retryable(status: StatusCode) -> bool {
	status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}
