mod console;
mod devices;
mod host;
mod network;

use crate::collectors::Probes;
use crate::config::CheckConfig;
use crate::error::ProbeOutcome;
use crate::report::{Finding, Report};
use tracing::{debug, warn};

/// One row of the check catalogue, resolved from product and command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Check {
    TcpPing,
    CoreStatus,
    ConnectorStatus,
    Certificate(CertificateTarget),
    Storage,
    Memory,
    Cpu,
    Uptime,
    CoreLogging,
    SentryLogging,
    Diagnostic(DiagnosticService),
    SentryDevices,
    ActiveDevices,
    NonCompliantDevices,
    QuarantinedDevices,
    FilteredDevices,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertificateTarget {
    PortalHttps,
    ClientTls,
    Sentry(u16),
}

impl CertificateTarget {
    pub fn port(self) -> u16 {
        match self {
            Self::PortalHttps => 443,
            Self::ClientTls => 9997,
            Self::Sentry(port) => port,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticService {
    Dns,
    Ntp,
}

impl DiagnosticService {
    pub fn name(self) -> &'static str {
        match self {
            Self::Dns => "DNS",
            Self::Ntp => "NTP",
        }
    }
}

impl Check {
    pub fn title(&self, cfg: &CheckConfig) -> String {
        match self {
            Self::TcpPing => format!("TCP PORT {}", cfg.tcp.port),
            Self::CoreStatus => "CORE STATUS".to_string(),
            Self::ConnectorStatus => "CONNECTOR STATUS".to_string(),
            Self::Certificate(CertificateTarget::PortalHttps) => {
                "CERTIFICATE 'PORTAL HTTPS'".to_string()
            }
            Self::Certificate(CertificateTarget::ClientTls) => "CERTIFICATE 'CLIENT TLS'".to_string(),
            Self::Certificate(CertificateTarget::Sentry(port)) => format!("CERTIFICATE PORT {port}"),
            Self::Storage => "STORAGE".to_string(),
            Self::Memory => "MEMORY".to_string(),
            Self::Cpu => "CPU".to_string(),
            Self::Uptime => "UPTIME".to_string(),
            Self::CoreLogging | Self::SentryLogging => "LOGGING".to_string(),
            Self::Diagnostic(service) => service.name().to_string(),
            Self::SentryDevices | Self::FilteredDevices => "DEVICES".to_string(),
            Self::ActiveDevices => "ACTIVE DEVICES".to_string(),
            Self::NonCompliantDevices => "NON-COMPLIANT DEVICES".to_string(),
            Self::QuarantinedDevices => "QUARANTINED DEVICES".to_string(),
        }
    }

    pub async fn execute(&self, cfg: &CheckConfig, probes: &dyn Probes) -> ProbeOutcome<Finding> {
        match self {
            Self::TcpPing => network::tcp_ping(cfg, probes).await,
            Self::CoreStatus => network::core_status(cfg, probes).await,
            Self::ConnectorStatus => network::connector_status(cfg, probes).await,
            Self::Certificate(target) => network::certificate(cfg, *target, probes).await,
            Self::Storage => host::storage(cfg, probes).await,
            Self::Memory => host::memory(cfg, probes).await,
            Self::Cpu => host::cpu(cfg, probes).await,
            Self::Uptime => host::uptime(cfg, probes).await,
            Self::CoreLogging => console::core_logging(cfg, probes).await,
            Self::SentryLogging => console::sentry_logging(cfg, probes).await,
            Self::Diagnostic(service) => console::diagnostic(cfg, *service, probes).await,
            Self::SentryDevices => console::sentry_devices(cfg, probes).await,
            Self::ActiveDevices => devices::active(cfg, probes).await,
            Self::NonCompliantDevices => {
                devices::share(cfg, devices::Subset::NonCompliant, probes).await
            }
            Self::QuarantinedDevices => {
                devices::share(cfg, devices::Subset::Quarantined, probes).await
            }
            Self::FilteredDevices => devices::share(cfg, devices::Subset::Filter, probes).await,
        }
    }
}

/// Runs the configured check; any acquisition failure becomes an UNKNOWN report.
pub async fn run(cfg: &CheckConfig, probes: &dyn Probes) -> Report {
    let title = cfg.check.title(cfg);
    match cfg.check.execute(cfg, probes).await {
        Ok(finding) => {
            debug!(check = %title, verdict = %finding.verdict, "check finished");
            Report::new(title, finding)
        }
        Err(err) => {
            warn!(check = %title, kind = err.kind(), error = %err, "check could not acquire data");
            Report::unknown(title, &err)
        }
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use crate::collectors::console::{ConsoleRequest, ConsoleTarget};
    use crate::collectors::rest::RestTarget;
    use crate::collectors::snmp::{SnmpTarget, SnmpVersion};
    use crate::config::{ApiSettings, ConsoleSettings, StatusSettings, TcpSettings};
    use crate::error::ProbeError;
    use crate::evaluate::{Levels, ThresholdPair};
    use crate::state::{CertificateExpiry, LatencyStat, SnmpRow};
    use async_trait::async_trait;
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Probes that replay canned answers and count how often they were asked.
    #[derive(Default)]
    pub struct FakeProbes {
        pub tcp: Option<ProbeOutcome<LatencyStat>>,
        pub certificate: Option<ProbeOutcome<CertificateExpiry>>,
        pub snmp_get: Option<ProbeOutcome<HashMap<String, String>>>,
        pub snmp_table: Option<ProbeOutcome<Vec<SnmpRow>>>,
        pub console: Option<ProbeOutcome<String>>,
        pub status: Option<ProbeOutcome<String>>,
        pub rest: Mutex<VecDeque<ProbeOutcome<String>>>,
        pub console_requests: Mutex<Vec<ConsoleRequest>>,
        pub rest_paths: Mutex<Vec<String>>,
        pub calls: AtomicUsize,
    }

    impl FakeProbes {
        pub fn with_rest(answers: Vec<ProbeOutcome<String>>) -> Self {
            Self {
                rest: Mutex::new(answers.into()),
                ..Self::default()
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn replay<T: Clone>(&self, slot: &Option<ProbeOutcome<T>>) -> ProbeOutcome<T> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            slot.clone()
                .unwrap_or_else(|| Err(ProbeError::transport("unexpected probe call")))
        }
    }

    #[async_trait]
    impl Probes for FakeProbes {
        async fn tcp_ping(&self, _: &str, _: u16, _: Duration, _: u32) -> ProbeOutcome<LatencyStat> {
            self.replay(&self.tcp)
        }

        async fn certificate(&self, _: &str, _: u16, _: Duration) -> ProbeOutcome<CertificateExpiry> {
            self.replay(&self.certificate)
        }

        async fn snmp_get(&self, _: &SnmpTarget, _: &[&str]) -> ProbeOutcome<HashMap<String, String>> {
            self.replay(&self.snmp_get)
        }

        async fn snmp_table(&self, _: &SnmpTarget, _: &[&str]) -> ProbeOutcome<Vec<SnmpRow>> {
            self.replay(&self.snmp_table)
        }

        async fn console_fetch(
            &self,
            _: &ConsoleTarget,
            request: &ConsoleRequest,
        ) -> ProbeOutcome<String> {
            self.console_requests.lock().expect("lock").push(request.clone());
            self.replay(&self.console)
        }

        async fn rest_get(&self, _: &RestTarget, path: &str) -> ProbeOutcome<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.rest_paths.lock().expect("lock").push(path.to_string());
            self.rest
                .lock()
                .expect("lock")
                .pop_front()
                .unwrap_or_else(|| Err(ProbeError::transport("unexpected probe call")))
        }

        async fn status_page(&self, _: &str, _: Duration) -> ProbeOutcome<String> {
            self.replay(&self.status)
        }
    }

    /// A fully credentialed configuration with default thresholds.
    pub fn config(check: Check) -> CheckConfig {
        CheckConfig {
            host: "appliance.test".to_string(),
            check,
            thresholds: ThresholdPair::default(),
            tcp: TcpSettings {
                port: 443,
                attempts: 20,
                timeout: Duration::from_secs(1),
                failed: Levels::new(50.0, 100.0),
            },
            certificate_timeout: Duration::from_secs(10),
            snmp: SnmpTarget {
                host: "appliance.test".to_string(),
                port: 161,
                version: SnmpVersion::V2c,
                community: "public".to_string(),
                timeout: Duration::from_secs(2),
            },
            console: ConsoleSettings {
                username: "admin".to_string(),
                password: Some("secret".to_string()),
                port: 8443,
                timeout: Duration::from_secs(10),
            },
            api: ApiSettings {
                username: Some("api".to_string()),
                password: Some("secret".to_string()),
                filter: None,
                port: 443,
                timeout: Duration::from_secs(10),
                maximum_devices: 5000,
            },
            status: StatusSettings {
                port: 443,
                timeout: Duration::from_secs(10),
            },
        }
    }
}
