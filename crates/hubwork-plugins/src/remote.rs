//! Forwarding client shared by the `remote_http` task and target.

use std::time::Duration;

use hubwork_core::{Backoff, BackoffConfig, BackoffError, CanonicalRequest, HubError, HubResult};
use hubwork_telemetry::tracing::inject_current;
use reqwest::Client;
use serde::Deserialize;

use crate::envelope::{RequestEnvelope, ResponseEnvelope};
use crate::error::PluginError;

/// Configuration of a `remote_http` plugin instance.
///
/// ```yaml
/// config:
///   host: http://recipes.internal:9000
///   pathPrefix: v1
///   timeoutMs: 2000
///   backoff: { initialDelay: 0.2, maxDelay: 5, multiplier: 2, maxRetries: 4 }
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RemoteHttpConfig {
    /// Scheme, host and port of the upstream.
    pub host: String,

    /// Prefix inserted between host and request path.
    #[serde(default)]
    pub path_prefix: String,

    /// Per-attempt timeout in milliseconds; no timeout when absent.
    #[serde(default)]
    pub timeout_ms: Option<u64>,

    /// Retry policy.
    #[serde(default)]
    pub backoff: RetrySettings,
}

/// Retry policy with delays in (fractional) seconds.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct RetrySettings {
    /// Delay before the second attempt.
    pub initial_delay: f64,
    /// Upper bound for any delay.
    pub max_delay: f64,
    /// Delay growth factor.
    pub multiplier: f64,
    /// Total number of attempts.
    pub max_retries: u32,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let defaults = BackoffConfig::default();
        Self {
            initial_delay: defaults.initial_delay.as_secs_f64(),
            max_delay: defaults.max_delay.as_secs_f64(),
            multiplier: defaults.multiplier,
            max_retries: defaults.max_retries,
        }
    }
}

impl RetrySettings {
    fn to_backoff(self, plugin: &str) -> HubResult<BackoffConfig> {
        let seconds = |field: &str, value: f64| {
            Duration::try_from_secs_f64(value)
                .map_err(|e| HubError::invalid_plugin_config(plugin, format!("backoff.{field}: {e}")))
        };
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(HubError::invalid_plugin_config(
                plugin,
                "backoff.multiplier must be at least 1",
            ));
        }
        Ok(BackoffConfig {
            initial_delay: seconds("initialDelay", self.initial_delay)?,
            max_delay: seconds("maxDelay", self.max_delay)?,
            multiplier: self.multiplier,
            max_retries: self.max_retries,
        })
    }
}

/// Ensures a non-empty prefix starts and ends with `/`.
///
/// ```
/// use hubwork_plugins::remote::normalize_prefix;
///
/// assert_eq!(normalize_prefix("v1"), "/v1/");
/// assert_eq!(normalize_prefix("/v1/"), "/v1/");
/// assert_eq!(normalize_prefix(""), "");
/// ```
#[must_use]
pub fn normalize_prefix(prefix: &str) -> String {
    if prefix.is_empty() {
        return String::new();
    }
    let mut normalized = String::with_capacity(prefix.len() + 2);
    if !prefix.starts_with('/') {
        normalized.push('/');
    }
    normalized.push_str(prefix);
    if !prefix.ends_with('/') {
        normalized.push('/');
    }
    normalized
}

/// Posts request envelopes upstream and decodes the reply envelope.
#[derive(Debug, Clone)]
pub struct RemoteClient {
    client: Client,
    host: String,
    path_prefix: String,
    backoff: Backoff,
}

impl RemoteClient {
    /// Builds a client from its plugin configuration.
    pub fn new(plugin: &str, config: RemoteHttpConfig) -> HubResult<Self> {
        let host = config.host.trim_end_matches('/').to_string();
        if host.is_empty() {
            return Err(HubError::invalid_plugin_config(plugin, "host must not be empty"));
        }

        let mut builder = Client::builder();
        if let Some(ms) = config.timeout_ms.filter(|ms| *ms > 0) {
            builder = builder.timeout(Duration::from_millis(ms));
        }
        let client = builder
            .build()
            .map_err(|e| HubError::invalid_plugin_config(plugin, format!("http client: {e}")))?;

        Ok(Self {
            client,
            host,
            path_prefix: normalize_prefix(&config.path_prefix),
            backoff: Backoff::new(config.backoff.to_backoff(plugin)?),
        })
    }

    /// Upstream URL for a request path.
    #[must_use]
    pub fn url_for(&self, path: &str) -> String {
        if self.path_prefix.is_empty() {
            format!("{}{path}", self.host)
        } else {
            let path = path.trim_start_matches('/');
            format!("{}{}{path}", self.host, self.path_prefix)
        }
    }

    /// Active retry policy.
    #[must_use]
    pub fn backoff(&self) -> &BackoffConfig {
        self.backoff.config()
    }

    /// Forwards `request` with retries.
    ///
    /// Every attempt carries the active trace context as `traceparent`.
    pub async fn forward(&self, request: &CanonicalRequest) -> HubResult<ResponseEnvelope> {
        let envelope = RequestEnvelope::from_request(request);
        let url = self.url_for(&envelope.path);

        self.backoff
            .execute_classified(
                || self.send_once(&url, &envelope),
                |err: &PluginError| !err.is_retryable(),
            )
            .await
            .map_err(|err| match err {
                BackoffError::Unrecoverable(err) => HubError::from(err),
                exhausted @ BackoffError::Exhausted { .. } => {
                    PluginError::transport(exhausted.to_string()).into()
                }
            })
    }

    async fn send_once(
        &self,
        url: &str,
        envelope: &RequestEnvelope,
    ) -> Result<ResponseEnvelope, PluginError> {
        let mut headers = http::HeaderMap::new();
        inject_current(&mut headers);
        let response = self
            .client
            .post(url)
            .headers(headers)
            .json(envelope)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PluginError::UpstreamStatus {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await.map_err(|e| PluginError::malformed(e.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| PluginError::malformed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn client(config: serde_json::Value) -> HubResult<RemoteClient> {
        let config: RemoteHttpConfig = hubwork_core::decode_config("remote_http", &config)?;
        RemoteClient::new("remote_http", config)
    }

    #[test]
    fn test_url_joins_prefix_and_path() {
        let plain = client(json!({"host": "http://up:9000/"})).unwrap();
        assert_eq!(plain.url_for("/kitchen/recipes"), "http://up:9000/kitchen/recipes");

        let prefixed = client(json!({"host": "http://up:9000", "pathPrefix": "v1"})).unwrap();
        assert_eq!(
            prefixed.url_for("/kitchen/recipes"),
            "http://up:9000/v1/kitchen/recipes"
        );
    }

    #[test]
    fn test_backoff_seconds_converted() {
        let client = client(json!({
            "host": "http://up",
            "backoff": {"initialDelay": 0.25, "maxDelay": 2, "multiplier": 3, "maxRetries": 5}
        }))
        .unwrap();
        let backoff = client.backoff();
        assert_eq!(backoff.initial_delay, Duration::from_millis(250));
        assert_eq!(backoff.max_delay, Duration::from_secs(2));
        assert_eq!(backoff.max_retries, 5);
    }

    #[test]
    fn test_invalid_configs_rejected() {
        assert!(client(json!({"host": ""})).is_err());
        assert!(client(json!({"host": "http://up", "backoff": {"initialDelay": -1.0}})).is_err());
        assert!(client(json!({"host": "http://up", "backoff": {"multiplier": 0.5}})).is_err());
        assert!(client(json!({"host": "http://up", "retries": 2})).is_err());
        assert!(client(json!({})).is_err());
    }
}
