use crate::checks::{CertificateTarget, Check, DiagnosticService};
use crate::cli::{
    CertificateChoice, CoreCommand, DevicesCommand, Product, SentryCommand, StatusComponent,
};
use crate::collectors::console::ConsoleTarget;
use crate::collectors::rest::RestTarget;
use crate::collectors::snmp::{SnmpTarget, SnmpVersion};
use crate::error::{ProbeError, ProbeOutcome};
use crate::evaluate::{Levels, ThresholdPair};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Protocol settings and credentials, read from YAML and overridden by flags.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub snmp: SnmpConfig,
    #[serde(default)]
    pub console: ConsoleConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub tcp: TcpConfig,
    #[serde(default)]
    pub certificate: CertificateConfig,
    #[serde(default)]
    pub status: StatusConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SnmpConfig {
    #[serde(default = "default_community")]
    pub community: String,
    #[serde(default = "default_snmp_version")]
    pub version: SnmpVersion,
    #[serde(default = "default_snmp_port")]
    pub port: u16,
    #[serde(default = "default_snmp_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConsoleConfig {
    #[serde(default = "default_console_username")]
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_console_port")]
    pub port: u16,
    #[serde(default = "default_http_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_https_port")]
    pub port: u16,
    #[serde(default = "default_http_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TcpConfig {
    #[serde(default = "default_tcp_attempts")]
    pub attempts: u32,
    #[serde(default = "default_tcp_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_tcp_failed_warning")]
    pub failed_warning: f64,
    #[serde(default = "default_tcp_failed_critical")]
    pub failed_critical: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CertificateConfig {
    #[serde(default = "default_http_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StatusConfig {
    #[serde(default = "default_https_port")]
    pub port: u16,
    #[serde(default = "default_http_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for SnmpConfig {
    fn default() -> Self {
        Self {
            community: default_community(),
            version: default_snmp_version(),
            port: default_snmp_port(),
            timeout_ms: default_snmp_timeout_ms(),
        }
    }
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            username: default_console_username(),
            password: None,
            port: default_console_port(),
            timeout_ms: default_http_timeout_ms(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            username: None,
            password: None,
            port: default_https_port(),
            timeout_ms: default_http_timeout_ms(),
        }
    }
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            attempts: default_tcp_attempts(),
            timeout_ms: default_tcp_timeout_ms(),
            failed_warning: default_tcp_failed_warning(),
            failed_critical: default_tcp_failed_critical(),
        }
    }
}

impl Default for CertificateConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_http_timeout_ms(),
        }
    }
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            port: default_https_port(),
            timeout_ms: default_http_timeout_ms(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("cannot parse YAML in {path}: {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },
    #[error("invalid configuration: {0}")]
    Validation(String),
}

impl From<ConfigError> for ProbeError {
    fn from(err: ConfigError) -> Self {
        ProbeError::Config(err.to_string())
    }
}

impl Config {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        let path_display = path_ref.display().to_string();
        let text = fs::read_to_string(path_ref).map_err(|source| ConfigError::Read {
            path: path_display.clone(),
            source,
        })?;

        let cfg: Config = serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path_display,
            source,
        })?;

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_snmp(&self.snmp)?;
        validate_tcp(&self.tcp)?;
        validate_endpoint("console", self.console.port, self.console.timeout_ms)?;
        validate_endpoint("api", self.api.port, self.api.timeout_ms)?;
        validate_endpoint("status", self.status.port, self.status.timeout_ms)?;
        if self.certificate.timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "certificate.timeout_ms must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn example_yaml() -> &'static str {
        include_str!("../config.yaml.example")
    }

    /// Folds command-line flags over the file values, then resolves the check.
    pub fn resolve(mut self, product: &Product) -> Result<CheckConfig, ConfigError> {
        let (host, common) = match product {
            Product::Core(args) => {
                self.apply_tcp(&args.tcp);
                self.apply_snmp(&args.snmp);
                self.apply_console(&args.console);
                (&args.host, &args.common)
            }
            Product::Sentry(args) => {
                self.apply_tcp(&args.tcp);
                self.apply_snmp(&args.snmp);
                self.apply_console(&args.console);
                (&args.host, &args.common)
            }
            Product::Devices(args) => {
                let api = &args.api;
                if api.api_username.is_some() {
                    self.api.username.clone_from(&api.api_username);
                }
                if api.api_password.is_some() {
                    self.api.password.clone_from(&api.api_password);
                }
                if let Some(port) = api.api_port {
                    self.api.port = port;
                }
                (&args.host, &args.common)
            }
        };
        self.validate()?;

        if host.trim().is_empty() {
            return Err(ConfigError::Validation("host must not be empty".to_string()));
        }

        let (check, tcp_port, api_filter, maximum_devices) = match product {
            Product::Core(args) => (
                core_check(args.command, args.status_component, args.certificate),
                args.tcp_port,
                None,
                0,
            ),
            Product::Sentry(args) => (
                sentry_check(args.command, args.sentry_port),
                args.sentry_port,
                None,
                0,
            ),
            Product::Devices(args) => (
                devices_check(args.command),
                0,
                args.api.api_filter.clone(),
                args.api.maximum_devices,
            ),
        };

        Ok(CheckConfig {
            host: host.clone(),
            check,
            thresholds: ThresholdPair::new(common.warning, common.critical),
            tcp: TcpSettings {
                port: tcp_port,
                attempts: self.tcp.attempts,
                timeout: Duration::from_millis(self.tcp.timeout_ms),
                failed: Levels::new(self.tcp.failed_warning, self.tcp.failed_critical),
            },
            certificate_timeout: Duration::from_millis(self.certificate.timeout_ms),
            snmp: SnmpTarget {
                host: host.clone(),
                port: self.snmp.port,
                version: self.snmp.version,
                community: self.snmp.community,
                timeout: Duration::from_millis(self.snmp.timeout_ms),
            },
            console: ConsoleSettings {
                username: self.console.username,
                password: self.console.password,
                port: self.console.port,
                timeout: Duration::from_millis(self.console.timeout_ms),
            },
            api: ApiSettings {
                username: self.api.username,
                password: self.api.password,
                filter: api_filter,
                port: self.api.port,
                timeout: Duration::from_millis(self.api.timeout_ms),
                maximum_devices,
            },
            status: StatusSettings {
                port: self.status.port,
                timeout: Duration::from_millis(self.status.timeout_ms),
            },
        })
    }

    fn apply_tcp(&mut self, args: &crate::cli::TcpArgs) {
        if let Some(attempts) = args.tcp_attempt {
            self.tcp.attempts = attempts;
        }
        if let Some(timeout) = args.tcp_timeout {
            self.tcp.timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        }
        if let Some(warning) = args.tcp_failed_warning {
            self.tcp.failed_warning = warning;
        }
        if let Some(critical) = args.tcp_failed_critical {
            self.tcp.failed_critical = critical;
        }
    }

    fn apply_snmp(&mut self, args: &crate::cli::SnmpArgs) {
        if let Some(community) = &args.snmp_community {
            self.snmp.community.clone_from(community);
        }
        if let Some(version) = args.snmp_version.and_then(SnmpVersion::from_model) {
            self.snmp.version = version;
        }
    }

    fn apply_console(&mut self, args: &crate::cli::ConsoleArgs) {
        if let Some(username) = &args.mics_username {
            self.console.username.clone_from(username);
        }
        if args.mics_password.is_some() {
            self.console.password.clone_from(&args.mics_password);
        }
    }
}

fn core_check(
    command: CoreCommand,
    component: StatusComponent,
    certificate: CertificateChoice,
) -> Check {
    match command {
        CoreCommand::TcpPing => Check::TcpPing,
        CoreCommand::Status => match component {
            StatusComponent::Core => Check::CoreStatus,
            StatusComponent::Connector => Check::ConnectorStatus,
        },
        CoreCommand::Certificate => Check::Certificate(match certificate {
            CertificateChoice::PortalHttps => CertificateTarget::PortalHttps,
            CertificateChoice::ClientTls => CertificateTarget::ClientTls,
        }),
        CoreCommand::Storage => Check::Storage,
        CoreCommand::Memory => Check::Memory,
        CoreCommand::Cpu => Check::Cpu,
        CoreCommand::Uptime => Check::Uptime,
        CoreCommand::Logging => Check::CoreLogging,
        CoreCommand::Dns => Check::Diagnostic(DiagnosticService::Dns),
        CoreCommand::Ntp => Check::Diagnostic(DiagnosticService::Ntp),
    }
}

fn sentry_check(command: SentryCommand, port: u16) -> Check {
    match command {
        SentryCommand::TcpPing => Check::TcpPing,
        SentryCommand::Certificate => Check::Certificate(CertificateTarget::Sentry(port)),
        SentryCommand::Storage => Check::Storage,
        SentryCommand::Memory => Check::Memory,
        SentryCommand::Cpu => Check::Cpu,
        SentryCommand::Uptime => Check::Uptime,
        SentryCommand::Logging => Check::SentryLogging,
        SentryCommand::Dns => Check::Diagnostic(DiagnosticService::Dns),
        SentryCommand::Ntp => Check::Diagnostic(DiagnosticService::Ntp),
        SentryCommand::Devices => Check::SentryDevices,
    }
}

fn devices_check(command: DevicesCommand) -> Check {
    match command {
        DevicesCommand::Active => Check::ActiveDevices,
        DevicesCommand::NonCompliant => Check::NonCompliantDevices,
        DevicesCommand::Quarantined => Check::QuarantinedDevices,
        DevicesCommand::Filter => Check::FilteredDevices,
    }
}

fn validate_snmp(cfg: &SnmpConfig) -> Result<(), ConfigError> {
    if cfg.community.trim().is_empty() {
        return Err(ConfigError::Validation(
            "snmp.community must not be empty".to_string(),
        ));
    }
    validate_endpoint("snmp", cfg.port, cfg.timeout_ms)
}

fn validate_tcp(cfg: &TcpConfig) -> Result<(), ConfigError> {
    if cfg.attempts < 1 {
        return Err(ConfigError::Validation(
            "tcp.attempts must be >= 1".to_string(),
        ));
    }
    if cfg.timeout_ms == 0 {
        return Err(ConfigError::Validation(
            "tcp.timeout_ms must be > 0".to_string(),
        ));
    }
    Ok(())
}

fn validate_endpoint(section: &str, port: u16, timeout_ms: u64) -> Result<(), ConfigError> {
    if port == 0 {
        return Err(ConfigError::Validation(format!(
            "{section}.port must be in range 1..65535"
        )));
    }
    if timeout_ms == 0 {
        return Err(ConfigError::Validation(format!(
            "{section}.timeout_ms must be > 0"
        )));
    }
    Ok(())
}

/// Everything one check needs, resolved once before any network access.
#[derive(Debug, Clone)]
pub struct CheckConfig {
    pub host: String,
    pub check: Check,
    pub thresholds: ThresholdPair,
    pub tcp: TcpSettings,
    pub certificate_timeout: Duration,
    pub snmp: SnmpTarget,
    pub console: ConsoleSettings,
    pub api: ApiSettings,
    pub status: StatusSettings,
}

#[derive(Debug, Clone)]
pub struct TcpSettings {
    pub port: u16,
    pub attempts: u32,
    pub timeout: Duration,
    /// Failed-attempt counts, compared strictly.
    pub failed: Levels,
}

#[derive(Debug, Clone)]
pub struct ConsoleSettings {
    pub username: String,
    pub password: Option<String>,
    pub port: u16,
    pub timeout: Duration,
}

impl ConsoleSettings {
    pub fn target(&self, host: &str) -> ProbeOutcome<ConsoleTarget> {
        let password = present(&self.password)
            .ok_or_else(|| ProbeError::config("MICS password required"))?;
        Ok(ConsoleTarget {
            base_url: format!("https://{host}:{}", self.port),
            username: self.username.clone(),
            password: password.to_string(),
            timeout: self.timeout,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub username: Option<String>,
    pub password: Option<String>,
    pub filter: Option<String>,
    pub port: u16,
    pub timeout: Duration,
    pub maximum_devices: u64,
}

impl ApiSettings {
    pub fn target(&self, host: &str) -> ProbeOutcome<RestTarget> {
        match (present(&self.username), present(&self.password)) {
            (Some(username), Some(password)) => Ok(RestTarget {
                base_url: format!("https://{host}:{}", self.port),
                username: username.to_string(),
                password: password.to_string(),
                timeout: self.timeout,
            }),
            _ => Err(ProbeError::config("API username and password required")),
        }
    }

    pub fn filter(&self) -> ProbeOutcome<&str> {
        present(&self.filter).ok_or_else(|| ProbeError::config("Filter required"))
    }
}

#[derive(Debug, Clone)]
pub struct StatusSettings {
    pub port: u16,
    pub timeout: Duration,
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

fn default_community() -> String {
    "public".to_string()
}

const fn default_snmp_version() -> SnmpVersion {
    SnmpVersion::V2c
}

const fn default_snmp_port() -> u16 {
    161
}

const fn default_snmp_timeout_ms() -> u64 {
    2000
}

fn default_console_username() -> String {
    "admin".to_string()
}

const fn default_console_port() -> u16 {
    8443
}

const fn default_https_port() -> u16 {
    443
}

const fn default_http_timeout_ms() -> u64 {
    10_000
}

const fn default_tcp_attempts() -> u32 {
    20
}

const fn default_tcp_timeout_ms() -> u64 {
    1000
}

const fn default_tcp_failed_warning() -> f64 {
    50.0
}

const fn default_tcp_failed_critical() -> f64 {
    100.0
}
