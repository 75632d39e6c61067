pub mod certificate;
pub mod console;
pub mod rest;
pub mod snmp;
pub mod status;
pub mod tcp;

use crate::error::ProbeOutcome;
use crate::state::{CertificateExpiry, LatencyStat, SnmpRow};
use async_trait::async_trait;
use console::{ConsoleRequest, ConsoleTarget};
use rest::RestTarget;
use snmp::SnmpTarget;
use std::collections::HashMap;
use std::time::Duration;

/// Acquisition seam between check logic and the network.
///
/// Checks only talk to the appliance through this trait, so their
/// evaluation can be driven by a scripted implementation in tests.
#[async_trait]
pub trait Probes: Send + Sync {
    async fn tcp_ping(
        &self,
        host: &str,
        port: u16,
        timeout: Duration,
        attempts: u32,
    ) -> ProbeOutcome<LatencyStat>;

    async fn certificate(
        &self,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> ProbeOutcome<CertificateExpiry>;

    async fn snmp_get(
        &self,
        target: &SnmpTarget,
        oids: &[&str],
    ) -> ProbeOutcome<HashMap<String, String>>;

    async fn snmp_table(&self, target: &SnmpTarget, columns: &[&str])
        -> ProbeOutcome<Vec<SnmpRow>>;

    async fn console_fetch(
        &self,
        target: &ConsoleTarget,
        request: &ConsoleRequest,
    ) -> ProbeOutcome<String>;

    async fn rest_get(&self, target: &RestTarget, path: &str) -> ProbeOutcome<String>;

    async fn status_page(&self, base_url: &str, timeout: Duration) -> ProbeOutcome<String>;
}

/// Probes backed by real sockets.
#[derive(Debug, Default, Clone, Copy)]
pub struct LiveProbes;

#[async_trait]
impl Probes for LiveProbes {
    async fn tcp_ping(
        &self,
        host: &str,
        port: u16,
        timeout: Duration,
        attempts: u32,
    ) -> ProbeOutcome<LatencyStat> {
        tcp::ping(host, port, timeout, attempts).await
    }

    async fn certificate(
        &self,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> ProbeOutcome<CertificateExpiry> {
        certificate::inspect(host, port, timeout).await
    }

    async fn snmp_get(
        &self,
        target: &SnmpTarget,
        oids: &[&str],
    ) -> ProbeOutcome<HashMap<String, String>> {
        snmp::get(target, oids).await
    }

    async fn snmp_table(
        &self,
        target: &SnmpTarget,
        columns: &[&str],
    ) -> ProbeOutcome<Vec<SnmpRow>> {
        snmp::table(target, columns).await
    }

    async fn console_fetch(
        &self,
        target: &ConsoleTarget,
        request: &ConsoleRequest,
    ) -> ProbeOutcome<String> {
        console::fetch(target, request).await
    }

    async fn rest_get(&self, target: &RestTarget, path: &str) -> ProbeOutcome<String> {
        rest::get(target, path).await
    }

    async fn status_page(&self, base_url: &str, timeout: Duration) -> ProbeOutcome<String> {
        status::fetch(base_url, timeout).await
    }
}
