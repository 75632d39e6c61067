use crate::collectors::rest::RestTarget;
use crate::collectors::Probes;
use crate::config::CheckConfig;
use crate::error::{ProbeError, ProbeOutcome};
use crate::evaluate::{judge, Direction, Levels};
use crate::perfdata::{PerfDatum, Unit};
use crate::report::Finding;
use crate::state::{Measurement, Verdict};
use serde::Deserialize;

const ACTIVE_QUERY: &str = r#""common.status"="ACTIVE""#;

#[derive(Debug, Deserialize)]
struct DeviceCount {
    #[serde(rename = "totalCount")]
    total_count: u64,
}

/// Device populations measured against the active fleet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subset {
    NonCompliant,
    Quarantined,
    Filter,
}

impl Subset {
    fn label(self) -> &'static str {
        match self {
            Self::NonCompliant => "Non-compliant devices",
            Self::Quarantined => "quarantined devices",
            Self::Filter => "devices",
        }
    }
}

fn count_path(query: &str) -> String {
    format!("/devices/count?adminDeviceSpaceId=1&query={query}")
}

async fn count(target: &RestTarget, query: &str, probes: &dyn Probes) -> ProbeOutcome<u64> {
    let body = probes.rest_get(target, &count_path(query)).await?;
    let count: DeviceCount = serde_json::from_str(&body)?;
    Ok(count.total_count)
}

pub async fn active(cfg: &CheckConfig, probes: &dyn Probes) -> ProbeOutcome<Finding> {
    let target = cfg.api.target(&cfg.host)?;
    let active = count(&target, ACTIVE_QUERY, probes).await?;
    Ok(active_finding(
        active,
        cfg.api.maximum_devices,
        cfg.thresholds.or_defaults(90.0, 100.0),
    ))
}

fn active_finding(active: u64, maximum: u64, levels: Levels) -> Finding {
    let max = maximum as f64;
    let levels = levels.map(|pct| (pct / 100.0 * max).trunc());
    let verdict = judge(&Measurement::Count(active), levels, Direction::Above).unwrap_or(Verdict::Ok);
    Finding::new(verdict, format!("Number of Active devices : {active}")).with_perfdata(vec![
        PerfDatum::new("devices", active as f64)
            .unit(Unit::Devices)
            .levels(levels)
            .bounds(0, max),
    ])
}

/// Counts the active fleet, then the subset, and judges the subset's share.
pub async fn share(cfg: &CheckConfig, subset: Subset, probes: &dyn Probes) -> ProbeOutcome<Finding> {
    let target = cfg.api.target(&cfg.host)?;
    let query = match subset {
        Subset::NonCompliant => format!(r#"{ACTIVE_QUERY} AND "common.compliant" = false"#),
        Subset::Quarantined => format!(r#"{ACTIVE_QUERY} AND "common.quarantined" = true"#),
        Subset::Filter => cfg.api.filter()?.to_string(),
    };

    let active = count(&target, ACTIVE_QUERY, probes).await?;
    let matched = count(&target, &query, probes).await?;
    Ok(share_finding(
        subset,
        matched,
        active,
        cfg.api.maximum_devices,
        cfg.thresholds.or_defaults(5.0, 10.0),
    ))
}

fn share_finding(subset: Subset, matched: u64, active: u64, maximum: u64, levels: Levels) -> Finding {
    let active_f = active as f64;
    let levels = levels.map(|pct| (pct / 100.0 * active_f).ceil());
    let verdict = judge(&Measurement::Count(matched), levels, Direction::Above).unwrap_or(Verdict::Ok);
    let percent = Measurement::percentage(matched as f64, active_f)
        .value()
        .unwrap_or_default()
        .trunc();

    Finding::new(
        verdict,
        format!("Number of {} : {matched} ({percent}%)", subset.label()),
    )
    .with_perfdata(vec![PerfDatum::new("devices", matched as f64)
        .unit(Unit::Devices)
        .levels(levels)
        .bounds(0, maximum as f64)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::fake::{config, FakeProbes};
    use crate::checks::{run, Check};

    fn total(n: u64) -> ProbeOutcome<String> {
        Ok(format!(r#"{{"totalCount":{n},"results":[]}}"#))
    }

    #[tokio::test]
    async fn active_devices_against_maximum() {
        let probes = FakeProbes::with_rest(vec![total(4600)]);
        let report = run(&config(Check::ActiveDevices), &probes).await;
        assert_eq!(
            report.to_string(),
            "ACTIVE DEVICES WARNING - Number of Active devices : 4600;\
             |'devices'=4600devices;4500;5000;0;5000;"
        );
        assert_eq!(
            probes.rest_paths.lock().expect("lock")[0],
            r#"/devices/count?adminDeviceSpaceId=1&query="common.status"="ACTIVE""#
        );
    }

    #[tokio::test]
    async fn non_compliant_share_makes_two_calls() {
        let probes = FakeProbes::with_rest(vec![total(200), total(11)]);
        let report = run(&config(Check::NonCompliantDevices), &probes).await;

        assert_eq!(
            report.to_string(),
            "NON-COMPLIANT DEVICES WARNING - Number of Non-compliant devices : 11 (5%);\
             |'devices'=11devices;10;20;0;5000;"
        );
        let paths = probes.rest_paths.lock().expect("lock");
        assert_eq!(paths.len(), 2);
        assert!(paths[1].ends_with(r#"AND "common.compliant" = false"#));
    }

    #[tokio::test]
    async fn quarantined_uses_its_own_query() {
        let probes = FakeProbes::with_rest(vec![total(1000), total(150)]);
        let report = run(&config(Check::QuarantinedDevices), &probes).await;
        assert_eq!(report.verdict, Verdict::Critical);
        assert_eq!(report.message, "Number of quarantined devices : 150 (15%)");
        assert!(probes.rest_paths.lock().expect("lock")[1].contains(r#""common.quarantined" = true"#));
    }

    #[tokio::test]
    async fn filter_requires_a_query() {
        let probes = FakeProbes::default();
        let report = run(&config(Check::FilteredDevices), &probes).await;
        assert_eq!(report.to_string(), "DEVICES UNKNOWN - Filter required;");
        assert_eq!(probes.calls(), 0);
    }

    #[tokio::test]
    async fn filter_sends_the_operator_query() {
        let mut cfg = config(Check::FilteredDevices);
        cfg.api.filter = Some(r#""common.platform"="iOS""#.to_string());
        let probes = FakeProbes::with_rest(vec![total(100), total(3)]);

        let report = run(&cfg, &probes).await;
        assert_eq!(report.verdict, Verdict::Ok);
        assert_eq!(report.message, "Number of devices : 3 (3%)");
        assert_eq!(
            probes.rest_paths.lock().expect("lock")[1],
            r#"/devices/count?adminDeviceSpaceId=1&query="common.platform"="iOS""#
        );
    }

    #[tokio::test]
    async fn missing_api_credentials_skip_the_network() {
        let mut cfg = config(Check::ActiveDevices);
        cfg.api.password = Some(String::new());
        let probes = FakeProbes::default();

        let report = run(&cfg, &probes).await;
        assert_eq!(
            report.to_string(),
            "ACTIVE DEVICES UNKNOWN - API username and password required;"
        );
        assert_eq!(probes.calls(), 0);
    }

    #[tokio::test]
    async fn http_failure_on_second_call_is_unknown() {
        let probes = FakeProbes::with_rest(vec![total(10), Err(ProbeError::protocol("HTTP 401"))]);
        let report = run(&config(Check::QuarantinedDevices), &probes).await;
        assert_eq!(report.to_string(), "QUARANTINED DEVICES UNKNOWN - HTTP 401;");
    }

    #[test]
    fn empty_fleet_reports_zero_percent() {
        let finding = share_finding(Subset::Quarantined, 0, 0, 5000, Levels::new(5.0, 10.0));
        assert_eq!(finding.message, "Number of quarantined devices : 0 (0%)");
    }
}
