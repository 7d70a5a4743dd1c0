//! Delivers translated alerts through the telegram bot api.
//!
//! There are no retries: a message that can't be delivered is reported to the
//! caller and counted, the next one is attempted regardless.
use std::time::Duration;

use anyhow::{Context, Result};
use prometheus::{histogram_opts, opts, Histogram, IntCounter, IntCounterVec, Registry};
use reqwest::StatusCode;
use serde::{de::DeserializeOwned, de::IgnoredAny, Deserialize};
use serde_json::json;
use serde_with::{serde_as, DurationSeconds};
use thiserror::Error;
use url::Url;

use crate::translator::Destination;

#[serde_as]
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
/// bot api endpoint options
pub struct TelegramSettings {
	/// base url of the bot api
	pub api_url: Url,
	/// no timeout if unset
	#[serde_as(as = "Option<DurationSeconds<f64>>")]
	pub request_timeout: Option<Duration>,
}

impl Default for TelegramSettings {
	fn default() -> Self {
		#[allow(clippy::expect_used)]
		let api_url = Url::parse("https://api.telegram.org").expect("default api url is valid");

		Self { api_url, request_timeout: None }
	}
}

/// Error occuring when calling the bot api
#[derive(Debug, Error)]
pub enum SendError {
	/// the config doesn't contain a bot token
	#[error("no telegram bot token configured")]
	MissingToken,
	/// the request couldn't be sent or the response couldn't be read
	#[error("telegram request failed: {0}")]
	Http(#[from] reqwest::Error),
	/// the bot api rejected the request
	#[error("telegram api returned {status}: {description}")]
	Api { status: StatusCode, description: String },
}

impl SendError {
	/// label value for [Metrics::messages_failed]
	fn reason(&self) -> &'static str {
		match self {
			SendError::MissingToken => "missing_token",
			SendError::Http(_) => "http",
			SendError::Api { .. } => "api",
		}
	}
}

#[derive(Debug, Deserialize)]
/// envelope of every bot api response
struct ApiResponse<T> {
	ok: bool,
	#[serde(default)]
	description: Option<String>,
	result: Option<T>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
/// account the bot token belongs to, as returned by `getMe`
pub struct BotUser {
	pub id: i64,
	#[serde(default)]
	pub first_name: String,
	#[serde(default)]
	pub username: Option<String>,
}

#[derive(Debug, Clone)]
/// prometheus meters for the bot api client
struct Metrics {
	/// number of delivered messages
	messages_sent: IntCounter,
	/// number of messages that couldn't be delivered
	messages_failed: IntCounterVec,
	/// time spent by bot api requests
	request_duration: Histogram,
}

impl Metrics {
	/// construct and register prometheus meters
	fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
		let messages_sent = IntCounter::with_opts(
			opts!("messages_sent_total", "number of messages delivered to telegram")
				.namespace("alertgram")
				.subsystem("telegram"),
		)?;

		let messages_failed = IntCounterVec::new(
			opts!("messages_failed_total", "number of messages telegram didn't accept")
				.namespace("alertgram")
				.subsystem("telegram"),
			&["reason"],
		)?;

		let request_duration = Histogram::with_opts(
			histogram_opts!(
				"request_duration_seconds",
				"total time of a bot api request in seconds",
				prometheus::exponential_buckets(0.01, 2., 12)?
			)
			.namespace("alertgram")
			.subsystem("telegram"),
		)?;

		registry.register(Box::new(messages_sent.clone()))?;
		registry.register(Box::new(messages_failed.clone()))?;
		registry.register(Box::new(request_duration.clone()))?;

		Ok(Self { messages_sent, messages_failed, request_duration })
	}
}

#[derive(Debug, Clone)]
/// Bot api client. Without a token every call fails with
/// [SendError::MissingToken].
pub struct TelegramClient {
	/// http client
	client: reqwest::Client,
	/// base url of the bot api
	api_url: Url,
	/// bot token
	token: Option<String>,
	/// prometheus meters for bot api requests
	metrics: Metrics,
}

impl TelegramClient {
	/// construct bot api client
	pub fn new(settings: &TelegramSettings, token: Option<String>, registry: &Registry) -> Result<Self> {
		let mut builder = reqwest::Client::builder();
		if let Some(timeout) = settings.request_timeout {
			builder = builder.timeout(timeout);
		}

		Ok(Self {
			client: builder.build().context("failed to build reqwest client")?,
			api_url: settings.api_url.clone(),
			token,
			metrics: Metrics::new(registry).context("failed to register prometheus meters")?,
		})
	}

	/// Sends `text` to the chat `destination`.
	pub async fn send_message(&self, destination: &Destination, text: &str) -> Result<(), SendError> {
		let body = json!({
			"chat_id": destination.as_str(),
			"text": text,
		});

		match self.call::<IgnoredAny>("sendMessage", &body).await {
			Ok(_) => {
				self.metrics.messages_sent.inc();
				Ok(())
			}
			Err(err) => {
				self.metrics.messages_failed.with_label_values(&[err.reason()]).inc();
				Err(err)
			}
		}
	}

	/// Returns the account of the configured bot token.
	pub async fn get_me(&self) -> Result<BotUser, SendError> {
		self.call("getMe", &json!({})).await
	}

	/// POST a bot api method and unwrap the response envelope
	async fn call<T: DeserializeOwned>(
		&self,
		method: &str,
		body: &serde_json::Value,
	) -> Result<T, SendError> {
		let token = self.token.as_deref().ok_or(SendError::MissingToken)?;
		let url = format!("{}/bot{}/{}", self.api_url.as_str().trim_end_matches('/'), token, method);

		let timer = self.metrics.request_duration.start_timer();
		let response = self.client.post(url).json(body).send().await;
		timer.observe_duration();

		// reqwest errors print the url, which contains the token
		let response = response.map_err(reqwest::Error::without_url)?;
		let status = response.status();
		let raw = response.text().await.map_err(reqwest::Error::without_url)?;

		match serde_json::from_str::<ApiResponse<T>>(&raw) {
			Ok(ApiResponse { ok: true, result: Some(result), .. }) if status.is_success() => Ok(result),
			Ok(ApiResponse { description, .. }) => {
				Err(SendError::Api { status, description: description.unwrap_or_default() })
			}
			Err(_) => Err(SendError::Api { status, description: raw }),
		}
	}
}
