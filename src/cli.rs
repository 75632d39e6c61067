use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "appliance-health")]
#[command(version, about = "Health checks for MobileIron Core and Sentry appliances")]
pub struct Cli {
    #[command(subcommand)]
    pub product: Option<Product>,
    /// YAML file with credentials and protocol settings; flags take precedence.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    #[arg(long)]
    pub print_default_config: bool,
    /// Log protocol steps to stderr.
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Product {
    /// Checks against a Core appliance.
    Core(CoreArgs),
    /// Device counts through the Core REST API.
    Devices(DevicesArgs),
    /// Checks against a Sentry appliance.
    Sentry(SentryArgs),
}

#[derive(Args, Debug)]
pub struct CoreArgs {
    pub host: String,
    #[arg(value_enum)]
    pub command: CoreCommand,
    #[arg(long, default_value_t = 443)]
    pub tcp_port: u16,
    #[arg(long, value_enum, default_value_t = StatusComponent::Core)]
    pub status_component: StatusComponent,
    #[arg(long, value_enum, default_value_t = CertificateChoice::PortalHttps)]
    pub certificate: CertificateChoice,
    #[command(flatten)]
    pub common: CommonArgs,
    #[command(flatten)]
    pub tcp: TcpArgs,
    #[command(flatten)]
    pub snmp: SnmpArgs,
    #[command(flatten)]
    pub console: ConsoleArgs,
}

#[derive(Args, Debug)]
pub struct SentryArgs {
    pub host: String,
    #[arg(value_enum)]
    pub command: SentryCommand,
    /// Port used by tcp_ping and certificate.
    #[arg(long, default_value_t = 443, value_parser = parse_sentry_port)]
    pub sentry_port: u16,
    #[command(flatten)]
    pub common: CommonArgs,
    #[command(flatten)]
    pub tcp: TcpArgs,
    #[command(flatten)]
    pub snmp: SnmpArgs,
    #[command(flatten)]
    pub console: ConsoleArgs,
}

#[derive(Args, Debug)]
pub struct DevicesArgs {
    pub host: String,
    #[arg(value_enum)]
    pub command: DevicesCommand,
    #[command(flatten)]
    pub common: CommonArgs,
    #[command(flatten)]
    pub api: ApiArgs,
}

#[derive(Args, Debug, Default)]
pub struct CommonArgs {
    #[arg(short, long)]
    pub warning: Option<f64>,
    #[arg(short, long)]
    pub critical: Option<f64>,
}

#[derive(Args, Debug, Default)]
pub struct TcpArgs {
    #[arg(long)]
    pub tcp_attempt: Option<u32>,
    /// Per-attempt connect timeout, e.g. `1s` or `500ms`.
    #[arg(long, value_parser = humantime::parse_duration)]
    pub tcp_timeout: Option<Duration>,
    /// Failed-attempt count; warns when exceeded.
    #[arg(long)]
    pub tcp_failed_warning: Option<f64>,
    #[arg(long)]
    pub tcp_failed_critical: Option<f64>,
}

#[derive(Args, Debug, Default)]
pub struct SnmpArgs {
    #[arg(long)]
    pub snmp_community: Option<String>,
    /// 0 = v1, 1 = v2c.
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=1))]
    pub snmp_version: Option<u8>,
}

#[derive(Args, Debug, Default)]
pub struct ConsoleArgs {
    #[arg(long)]
    pub mics_username: Option<String>,
    #[arg(long)]
    pub mics_password: Option<String>,
}

#[derive(Args, Debug, Default)]
pub struct ApiArgs {
    #[arg(long)]
    pub api_username: Option<String>,
    #[arg(long)]
    pub api_password: Option<String>,
    /// Device query used by the `filter` command.
    #[arg(long)]
    pub api_filter: Option<String>,
    #[arg(long)]
    pub api_port: Option<u16>,
    #[arg(long, default_value_t = 5000, value_parser = parse_maximum_devices)]
    pub maximum_devices: u64,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
#[value(rename_all = "snake_case")]
pub enum CoreCommand {
    TcpPing,
    Status,
    Certificate,
    Storage,
    Memory,
    Cpu,
    Uptime,
    Logging,
    Dns,
    Ntp,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
#[value(rename_all = "snake_case")]
pub enum SentryCommand {
    TcpPing,
    Certificate,
    Storage,
    Memory,
    Cpu,
    Uptime,
    Logging,
    Dns,
    Ntp,
    Devices,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DevicesCommand {
    Active,
    NonCompliant,
    Quarantined,
    Filter,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusComponent {
    Core,
    Connector,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
#[value(rename_all = "snake_case")]
pub enum CertificateChoice {
    PortalHttps,
    ClientTls,
}

fn parse_sentry_port(s: &str) -> Result<u16, String> {
    match s.parse::<u16>() {
        Ok(port @ (443 | 8443)) => Ok(port),
        _ => Err(format!("{s} is not one of 443, 8443")),
    }
}

fn parse_maximum_devices(s: &str) -> Result<u64, String> {
    match s.parse::<u64>() {
        Ok(max @ (5000 | 20000 | 50000 | 100000)) => Ok(max),
        _ => Err(format!("{s} is not one of 5000, 20000, 50000, 100000")),
    }
}
