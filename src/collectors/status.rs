use crate::error::{ProbeError, ProbeOutcome};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{debug, warn};

const STATUS_PATH: &str = "/status/status.html";
const CORE_OK_MARKER: &str = "MOBILEIRON-STATUS: OK";
const CONNECTOR_MARKER: &str = "theConnectorNameString";
const HEALTHY_MARKER: &str = "isHealthytrue";

/// Fetches the unauthenticated appliance status page.
pub async fn fetch(base_url: &str, timeout: Duration) -> ProbeOutcome<String> {
    let client = Client::builder()
        .danger_accept_invalid_certs(true)
        .timeout(timeout)
        .build()
        .map_err(|err| ProbeError::transport(err.to_string()))?;
    let url = format!("{}{STATUS_PATH}", base_url.trim_end_matches('/'));

    let resp = client.get(&url).send().await.map_err(|err| {
        warn!(url = %url, error = %err, "status page request failed");
        ProbeError::from(err)
    })?;
    let status = resp.status();
    if status != StatusCode::OK {
        warn!(url = %url, status = status.as_u16(), "status page rejected");
        return Err(ProbeError::protocol(format!("HTTP {}", status.as_u16())));
    }
    debug!(url = %url, "status page fetched");
    Ok(resp.text().await?)
}

pub fn core_is_up(page: &str) -> bool {
    page.contains(CORE_OK_MARKER)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connector {
    pub name: String,
    pub healthy: bool,
}

/// One entry per `theConnectorNameString=<name>;...` line, in page order.
pub fn connectors(page: &str) -> Vec<Connector> {
    page.lines()
        .filter(|line| line.contains(CONNECTOR_MARKER))
        .map(|line| {
            let stripped = line.replace("theConnectorNameString=", "");
            let name = stripped.split(';').next().unwrap_or_default().trim();
            Connector {
                name: name.to_string(),
                healthy: line.contains(HEALTHY_MARKER),
            }
        })
        .collect()
}
