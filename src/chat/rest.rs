use crate::chat::client::{ChatAttachment, ChatClient, ChatMessage};
use crate::error::VaultError;
use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use reqwest::blocking::{Client, Response};
use serde_json::Value;
use std::thread;
use std::time::Duration;

const API_BASE: &str = "https://discord.com/api/v10";
const TRANSIENT_RETRIES: usize = 3;

/// Blocking Discord REST client. Rate limiting (429) is absorbed by
/// sleeping out the advertised delay and retrying; transient server errors
/// get a bounded retry before surfacing as a fetch error.
pub struct DiscordRestClient {
    client: Client,
    token: String,
    base: String,
}

impl DiscordRestClient {
    pub fn new(token: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .user_agent(concat!("chanvault/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build Discord HTTP client")?;
        Ok(Self {
            client,
            token: token.into(),
            base: API_BASE.to_string(),
        })
    }

    #[cfg(test)]
    pub fn with_base(token: impl Into<String>, base: impl Into<String>) -> Result<Self> {
        let mut out = Self::new(token)?;
        out.base = base.into();
        Ok(out)
    }

    fn retry_after(response: &Response) -> Duration {
        let header_secs = response
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<f64>().ok())
            .unwrap_or(1.0);
        Duration::from_millis((header_secs.max(0.1) * 1000.0) as u64)
    }

    /// GET `url`, returning the parsed body, `None` for 404. Loops through
    /// rate limits, retries transient failures a few times.
    fn get_json(&self, url: &str) -> Result<Option<Value>> {
        let mut transient_left = TRANSIENT_RETRIES;
        loop {
            let response = match self
                .client
                .get(url)
                .header("Authorization", format!("Bot {}", self.token))
                .send()
            {
                Ok(r) => r,
                Err(err) => {
                    if transient_left == 0 {
                        return Err(VaultError::Fetch(format!("GET {url}: {err}")).into());
                    }
                    transient_left -= 1;
                    thread::sleep(Duration::from_millis(500));
                    continue;
                }
            };

            match response.status() {
                StatusCode::NOT_FOUND => return Ok(None),
                StatusCode::TOO_MANY_REQUESTS => {
                    let wait = Self::retry_after(&response);
                    eprintln!("rate limited, sleeping {}ms", wait.as_millis());
                    thread::sleep(wait);
                    continue;
                }
                status if status.is_server_error() => {
                    if transient_left == 0 {
                        return Err(
                            VaultError::Fetch(format!("GET {url}: status {status}")).into()
                        );
                    }
                    transient_left -= 1;
                    thread::sleep(Duration::from_millis(500));
                    continue;
                }
                status if !status.is_success() => {
                    return Err(VaultError::Fetch(format!("GET {url}: status {status}")).into());
                }
                _ => {}
            }

            let body: Value = response
                .json()
                .map_err(|err| VaultError::Fetch(format!("GET {url}: invalid JSON: {err}")))?;
            return Ok(Some(body));
        }
    }
}

fn parse_timestamp(value: &Value, field: &str) -> Result<Option<DateTime<Utc>>> {
    match value.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(raw)) => {
            let parsed = DateTime::parse_from_rfc3339(raw)
                .map_err(|err| anyhow!("invalid `{field}` timestamp `{raw}`: {err}"))?;
            Ok(Some(parsed.with_timezone(&Utc)))
        }
        Some(other) => Err(anyhow!("unexpected `{field}` value: {other}")),
    }
}

fn parse_u64_id(value: &Value, field: &str) -> Result<u64> {
    value
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("message missing `{field}`"))?
        .parse::<u64>()
        .map_err(|err| anyhow!("message `{field}` is not a u64: {err}"))
}

fn parse_message(value: &Value) -> Result<ChatMessage> {
    let author = value.get("author").cloned().unwrap_or(Value::Null);
    let attachments = value
        .get("attachments")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .map(|a| {
                    let url = a
                        .get("url")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string();
                    ChatAttachment {
                        filename: a
                            .get("filename")
                            .and_then(Value::as_str)
                            .unwrap_or("attachment")
                            .to_string(),
                        proxy_url: a
                            .get("proxy_url")
                            .and_then(Value::as_str)
                            .map(str::to_string)
                            .unwrap_or_else(|| url.clone()),
                        url,
                    }
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(ChatMessage {
        id: parse_u64_id(value, "id")?,
        channel_id: parse_u64_id(value, "channel_id")?,
        timestamp: parse_timestamp(value, "timestamp")?
            .ok_or_else(|| anyhow!("message missing `timestamp`"))?,
        edited_timestamp: parse_timestamp(value, "edited_timestamp")?,
        author_name: author
            .get("username")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string(),
        author_discriminator: author
            .get("discriminator")
            .and_then(Value::as_str)
            .unwrap_or("0000")
            .to_string(),
        content: value
            .get("content")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        embeds: value
            .get("embeds")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default(),
        attachments,
        pinned: value.get("pinned").and_then(Value::as_bool).unwrap_or(false),
        tts: value.get("tts").and_then(Value::as_bool).unwrap_or(false),
    })
}

impl ChatClient for DiscordRestClient {
    fn messages_before(
        &self,
        channel_id: u64,
        before_id: u64,
        limit: u8,
    ) -> Result<Vec<ChatMessage>> {
        let url = format!(
            "{}/channels/{channel_id}/messages?limit={limit}&before={before_id}",
            self.base
        );
        let Some(body) = self.get_json(&url)? else {
            return Err(VaultError::Fetch(format!("channel {channel_id} not found")).into());
        };
        let items = body
            .as_array()
            .ok_or_else(|| VaultError::Fetch("message page is not a JSON array".into()))?;
        items.iter().map(parse_message).collect()
    }

    fn message_by_id(&self, channel_id: u64, message_id: u64) -> Result<Option<ChatMessage>> {
        let url = format!("{}/channels/{channel_id}/messages/{message_id}", self.base);
        match self.get_json(&url)? {
            None => Ok(None),
            Some(body) => Ok(Some(parse_message(&body)?)),
        }
    }
}
