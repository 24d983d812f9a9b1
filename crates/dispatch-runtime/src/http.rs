//! Shared HTTP plumbing for engine adapters
//!
//! Every adapter sends JSON and reads JSON; this module turns transport
//! failures and non-2xx statuses into `Provider` errors and unreadable bodies
//! into `Decode` errors, and owns the short connectivity probe.

use std::time::Duration;

use dispatch_core::error::{DispatchError, Result};
use dispatch_core::provider::PROBE_TIMEOUT;
use reqwest::{RequestBuilder, Url};
use serde_json::{Map, Value};

/// Shared reqwest client for one adapter
pub fn client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .build()
        .map_err(|e| DispatchError::Config(format!("http client: {e}")))
}

/// Send a request and decode a JSON body
pub async fn send_json(engine: &str, request: RequestBuilder, timeout: Duration) -> Result<Value> {
    let response = request
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| DispatchError::Provider {
            engine: engine.to_string(),
            status: e.status().map(|s| s.as_u16()),
            message: e.to_string(),
        })?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(DispatchError::Provider {
            engine: engine.to_string(),
            status: Some(status.as_u16()),
            message: format!("{status}: {}", api_error_message(&body)),
        });
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| DispatchError::provider(engine, e.to_string()))?;

    serde_json::from_slice(&bytes)
        .map_err(|e| DispatchError::decode(engine, format!("invalid JSON body: {e}")))
}

/// `true` when `url` answers 2xx within the probe timeout
pub async fn probe(request: RequestBuilder) -> bool {
    match request.timeout(PROBE_TIMEOUT).send().await {
        Ok(response) => response.status().is_success(),
        Err(e) => {
            tracing::debug!(error = %e, "connectivity probe failed");
            false
        }
    }
}

/// Scheme, host and port of `url`
pub fn origin(url: &str) -> Result<String> {
    let parsed = Url::parse(url).map_err(|e| DispatchError::Config(format!("bad url '{url}': {e}")))?;
    Ok(parsed.origin().ascii_serialization())
}

/// Pull the human-readable message out of a provider error body
pub fn api_error_message(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return body.trim().to_string();
    };

    match &value["error"] {
        Value::String(message) => message.clone(),
        Value::Object(error) => error
            .get("message")
            .and_then(Value::as_str)
            .map_or_else(|| body.trim().to_string(), str::to_string),
        _ => body.trim().to_string(),
    }
}

/// Tool-call arguments arrive as an object or as a JSON-encoded string
pub fn parse_arguments(engine: &str, value: &Value) -> Result<Map<String, Value>> {
    match value {
        Value::Null => Ok(Map::new()),
        Value::Object(map) => Ok(map.clone()),
        Value::String(s) if s.trim().is_empty() => Ok(Map::new()),
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(other) => Err(DispatchError::decode(
                engine,
                format!("tool arguments are not an object: {other}"),
            )),
            Err(e) => Err(DispatchError::decode(
                engine,
                format!("tool arguments are not valid JSON: {e}"),
            )),
        },
        other => Err(DispatchError::decode(
            engine,
            format!("unexpected tool arguments: {other}"),
        )),
    }
}

/// Required string field, or a decode error naming its path
pub fn str_field<'a>(engine: &str, value: &'a Value, path: &str) -> Result<&'a str> {
    value
        .as_str()
        .ok_or_else(|| DispatchError::decode(engine, format!("missing {path}")))
}
