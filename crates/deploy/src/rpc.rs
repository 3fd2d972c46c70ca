//! Minimal JSON-RPC plumbing for talking to an EVM node.

use std::time::Duration;

use anyhow::Context;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Default timeout for a single RPC request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Interval between polls while waiting on the node.
pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Create an HTTP client configured for JSON-RPC requests.
pub fn create_client() -> Result<reqwest::Client, anyhow::Error> {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .context("Failed to create HTTP client")
}

/// Check that `rpc_url` is an http(s) URL.
pub fn validate_url(rpc_url: &str) -> Result<url::Url, anyhow::Error> {
    let url = url::Url::parse(rpc_url).with_context(|| format!("Invalid RPC URL: {rpc_url}"))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => anyhow::bail!("Unsupported RPC URL scheme {scheme}: {rpc_url}"),
    }
}

/// Make a JSON-RPC call and deserialize the result.
///
/// A `null` result deserializes fine into an `Option<_>`; error responses
/// are turned into an `Err` carrying the node's message.
pub async fn json_rpc_call<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
    method: &str,
    params: Vec<Value>,
) -> Result<T, anyhow::Error> {
    let response = client
        .post(url)
        .json(&serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        }))
        .send()
        .await
        .with_context(|| format!("Failed to send {} request", method))?;

    let body: Value = response
        .json()
        .await
        .with_context(|| format!("Failed to parse {} response", method))?;

    if let Some(error) = body.get("error") {
        anyhow::bail!(
            "{} failed: {}",
            method,
            error
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown RPC error")
        );
    }

    let result = body.get("result").cloned().unwrap_or(Value::Null);

    serde_json::from_value(result)
        .with_context(|| format!("Failed to deserialize {} result", method))
}

/// Poll `check_fn` until it yields a value or `timeout` elapses.
pub async fn poll_until<T, F, Fut>(
    what: &str,
    timeout: Duration,
    check_fn: F,
) -> Result<T, anyhow::Error>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<Option<T>, anyhow::Error>>,
{
    let start = std::time::Instant::now();

    loop {
        if let Some(value) = check_fn().await? {
            return Ok(value);
        }

        if start.elapsed() >= timeout {
            anyhow::bail!("Timeout after {}s waiting for {}", timeout.as_secs(), what);
        }

        tracing::trace!(what, "Not ready yet, polling again...");
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn test_validate_url() {
        assert!(validate_url("http://127.0.0.1:8545").is_ok());
        assert!(validate_url("https://ethereum-sepolia-rpc.publicnode.com").is_ok());
        assert!(validate_url("ws://127.0.0.1:8545").is_err());
        assert!(validate_url("not a url").is_err());
    }

    #[tokio::test]
    async fn test_poll_until_returns_first_value() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let value = poll_until("counter", Duration::from_secs(5), move || async move {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            Ok((n == 2).then_some(n))
        })
        .await
        .unwrap();

        assert_eq!(value, 2);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_poll_until_times_out() {
        let result: Result<(), _> =
            poll_until("nothing", Duration::ZERO, || async { Ok(None) }).await;
        assert!(result.unwrap_err().to_string().contains("nothing"));
    }

    #[tokio::test]
    async fn test_poll_until_propagates_errors() {
        let result: Result<(), _> = poll_until("broken", Duration::from_secs(5), || async {
            Err::<Option<()>, _>(anyhow::anyhow!("node unreachable"))
        })
        .await;
        assert_eq!(result.unwrap_err().to_string(), "node unreachable");
    }
}
