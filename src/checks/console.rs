use super::DiagnosticService;
use crate::collectors::console::ConsoleRequest;
use crate::collectors::Probes;
use crate::config::CheckConfig;
use crate::error::{ProbeError, ProbeOutcome};
use crate::evaluate::{judge, Direction, Levels};
use crate::perfdata::{PerfDatum, Unit};
use crate::report::Finding;
use crate::state::{Measurement, Verdict};
use chrono::Utc;
use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Value};

const CONSOLE_PAGE: &str = "/mics/mics.html";
const MAX_CORE_LOG_LEVEL: u8 = 5;
const MAX_SENTRY_LOG_LEVEL: u8 = 4;

#[derive(Debug, Deserialize)]
struct CoreLogSettings {
    #[serde(rename = "logLevelsForPackages")]
    packages: Map<String, Value>,
    mifs: String,
}

#[derive(Debug, Deserialize)]
struct SentryLogSettings {
    asproxy: String,
}

#[derive(Debug, Deserialize)]
struct DiagnosticResponse {
    results: Vec<DiagnosticResult>,
}

#[derive(Debug, Deserialize)]
struct DiagnosticResult {
    status: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct Utilization {
    utilization: String,
    #[serde(rename = "systemScale")]
    system_scale: String,
}

fn log_level(name: &str) -> Option<u8> {
    match name {
        "OFF" => Some(0),
        "ERROR" => Some(1),
        "WARN" => Some(2),
        "INFO" => Some(3),
        "DEBUG" => Some(4),
        "TRACE" => Some(5),
        _ => None,
    }
}

fn scale_maximum(scale: &str) -> Option<u64> {
    match scale {
        "Small" => Some(2000),
        "Medium" => Some(8000),
        "Large" => Some(20000),
        _ => None,
    }
}

/// First capture group of `pattern` in `haystack`.
fn scrape(pattern: &str, haystack: &str, what: &str) -> ProbeOutcome<String> {
    let re = Regex::new(pattern).map_err(|err| ProbeError::parse(err.to_string()))?;
    re.captures(haystack)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| ProbeError::parse(format!("{what} not found in console response")))
}

/// Cache-busting query parameter the console UI appends to every GET.
fn cache_buster() -> i64 {
    Utc::now().timestamp_millis()
}

async fn fetch(
    cfg: &CheckConfig,
    request: ConsoleRequest,
    probes: &dyn Probes,
) -> ProbeOutcome<String> {
    let target = cfg.console.target(&cfg.host)?;
    probes.console_fetch(&target, &request).await
}

fn get_logs(product_type: &str) -> ConsoleRequest {
    ConsoleRequest::post(
        CONSOLE_PAGE,
        &[
            ("action", "getLogs"),
            ("productType", product_type),
            ("command", "getLogs"),
        ],
    )
}

pub async fn core_logging(cfg: &CheckConfig, probes: &dyn Probes) -> ProbeOutcome<Finding> {
    let body = fetch(cfg, get_logs("VSP"), probes).await?;
    let settings: CoreLogSettings = serde_json::from_str(&body)?;
    core_logging_finding(&settings, cfg.thresholds.or_defaults(2.0, 4.0))
}

fn core_logging_finding(settings: &CoreLogSettings, levels: Levels) -> ProbeOutcome<Finding> {
    let enabled = settings.mifs == "enable";
    let mut verdict = Verdict::Ok;
    let mut perfdata = Vec::with_capacity(settings.packages.len());

    for (package, value) in &settings.packages {
        if package == "EnablePackages" {
            continue;
        }
        let name = value.as_str().unwrap_or_default();
        let level = log_level(name).ok_or_else(|| {
            ProbeError::parse(format!("unknown log level {value} for package {package}"))
        })?;
        // A disabled MIFS log writes nothing, whatever the package says.
        let level = if enabled { level } else { 0 };

        verdict = verdict.escalate(levels.evaluate(f64::from(level), Direction::Above));
        perfdata.push(
            PerfDatum::new(package.as_str(), level)
                .levels(levels)
                .bounds(0, MAX_CORE_LOG_LEVEL),
        );
    }

    let message = if enabled {
        "MIFS logging enabled"
    } else {
        "MIFS logging disabled"
    };
    Ok(Finding::new(verdict, message).with_perfdata(perfdata))
}

pub async fn sentry_logging(cfg: &CheckConfig, probes: &dyn Probes) -> ProbeOutcome<Finding> {
    let body = fetch(cfg, get_logs("Sentry"), probes).await?;
    let settings: SentryLogSettings = serde_json::from_str(&body)?;
    sentry_logging_finding(&settings.asproxy, cfg.thresholds.or_defaults(1.0, 3.0))
}

fn sentry_logging_finding(asproxy: &str, levels: Levels) -> ProbeOutcome<Finding> {
    let enabled = scrape(r#""enable":"(\w+)""#, asproxy, "enable flag")? == "true";
    let level: u8 = scrape(r#""verbosity":"level([0-9])""#, asproxy, "verbosity")?
        .parse()
        .map_err(|_| ProbeError::parse("verbosity is not a number"))?;

    let verdict = if enabled {
        levels.evaluate(f64::from(level), Direction::Above)
    } else {
        Verdict::Ok
    };
    let message = format!(
        "Sentry logging {} (level: {level})",
        if enabled { "enabled" } else { "disabled" }
    );
    Ok(Finding::new(verdict, message).with_perfdata(vec![PerfDatum::new("log_level", level)
        .levels(levels)
        .bounds(0, MAX_SENTRY_LOG_LEVEL)]))
}

pub async fn diagnostic(
    cfg: &CheckConfig,
    service: DiagnosticService,
    probes: &dyn Probes,
) -> ProbeOutcome<Finding> {
    let path = format!(
        "{CONSOLE_PAGE}?_dc={}&servicename={}&action=testDiagnosticService&command=testDiagnosticService",
        cache_buster(),
        service.name()
    );
    let body = fetch(cfg, ConsoleRequest::get(path), probes).await?;
    let response: DiagnosticResponse = serde_json::from_str(&body)?;
    diagnostic_finding(response)
}

fn diagnostic_finding(response: DiagnosticResponse) -> ProbeOutcome<Finding> {
    let result = response
        .results
        .into_iter()
        .next()
        .ok_or_else(|| ProbeError::parse("diagnostic response has no result"))?;

    let message = result
        .message
        .replace("&lt;br&gt;", " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    let verdict = if result.status == "Failed" {
        Verdict::Critical
    } else {
        Verdict::Ok
    };
    Ok(Finding::new(verdict, message))
}

pub async fn sentry_devices(cfg: &CheckConfig, probes: &dyn Probes) -> ProbeOutcome<Finding> {
    let path = format!(
        "{CONSOLE_PAGE}?_dc={}&action=getSentryUtilization&command=getSentryUtilization",
        cache_buster()
    );
    let body = fetch(cfg, ConsoleRequest::get(path), probes).await?;
    let utilization: Utilization = serde_json::from_str(&body)?;
    sentry_devices_finding(&utilization, cfg.thresholds.or_defaults(80.0, 100.0))
}

fn sentry_devices_finding(utilization: &Utilization, levels: Levels) -> ProbeOutcome<Finding> {
    let connected: u64 = scrape(
        r"Number of Connected Devices  : ([0-9]+)",
        &utilization.utilization,
        "connected device count",
    )?
    .parse()
    .map_err(|_| ProbeError::parse("connected device count is not a number"))?;
    let scale = scrape(r"SYSTEM_SCALE=(\w+)", &utilization.system_scale, "system scale")?;
    let maximum = scale_maximum(&scale)
        .ok_or_else(|| ProbeError::parse(format!("unknown system scale {scale}")))?;

    let share = Measurement::percentage(connected as f64, maximum as f64);
    let verdict = judge(&share, levels, Direction::Above).unwrap_or(Verdict::Ok);
    let max = maximum as f64;
    Ok(Finding::new(
        verdict,
        format!("Number of Connected Devices  : {connected} ({scale})"),
    )
    .with_perfdata(vec![PerfDatum::new("devices", connected as f64)
        .unit(Unit::Devices)
        .levels(levels.map(|pct| (pct * max / 100.0).trunc()))
        .bounds(0, max)]))
}
