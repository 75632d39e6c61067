use crate::error::{ProbeError, ProbeOutcome};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct RestTarget {
    /// Scheme, host and port; `/api/v2` is appended per request.
    pub base_url: String,
    pub username: String,
    pub password: String,
    pub timeout: Duration,
}

/// One Basic-authenticated GET below `/api/v2`; the body is returned only on 200.
pub async fn get(target: &RestTarget, path: &str) -> ProbeOutcome<String> {
    let client = Client::builder()
        .danger_accept_invalid_certs(true)
        .timeout(target.timeout)
        .build()
        .map_err(|err| ProbeError::transport(err.to_string()))?;

    let path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    };
    let url = format!("{}/api/v2{path}", target.base_url.trim_end_matches('/'));

    let resp = client
        .get(&url)
        .basic_auth(&target.username, Some(&target.password))
        .send()
        .await
        .map_err(|err| {
            warn!(url = %url, error = %err, "api request failed");
            ProbeError::from(err)
        })?;

    let status = resp.status();
    if status != StatusCode::OK {
        warn!(url = %url, status = status.as_u16(), "api request rejected");
        return Err(ProbeError::protocol(format!("HTTP {}", status.as_u16())));
    }
    debug!(url = %url, "api request done");
    Ok(resp.text().await?)
}
