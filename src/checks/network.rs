use super::CertificateTarget;
use crate::collectors::status;
use crate::collectors::Probes;
use crate::config::CheckConfig;
use crate::error::{ProbeError, ProbeOutcome};
use crate::evaluate::{judge, Direction, Levels};
use crate::perfdata::{PerfDatum, Unit};
use crate::report::Finding;
use crate::state::{LatencyStat, Measurement, Verdict};

pub async fn tcp_ping(cfg: &CheckConfig, probes: &dyn Probes) -> ProbeOutcome<Finding> {
    let stat = probes
        .tcp_ping(&cfg.host, cfg.tcp.port, cfg.tcp.timeout, cfg.tcp.attempts)
        .await?;
    let levels = cfg.thresholds.or_defaults(1000.0, 2000.0);
    Ok(ping_finding(stat, levels, cfg.tcp.failed))
}

fn ping_finding(stat: LatencyStat, levels: Levels, failed_levels: Levels) -> Finding {
    let failed_percent = stat.failed_percent();
    let (passed, failed, average_ms) = (stat.passed, stat.failed, stat.average_ms);

    // No successful connect means no latency to judge.
    let latency_verdict =
        judge(&Measurement::Latency(stat), levels, Direction::Above).unwrap_or(Verdict::Critical);
    let failed_verdict = match f64::from(failed) {
        n if n > failed_levels.crit => Verdict::Critical,
        n if n > failed_levels.warn => Verdict::Warning,
        _ => Verdict::Ok,
    };

    let mut perfdata = Vec::with_capacity(2);
    let message = match average_ms {
        Some(avg) => {
            let avg = avg.trunc();
            perfdata.push(
                PerfDatum::new("time", avg)
                    .unit(Unit::Millis)
                    .levels(levels)
                    .bounds(0, (levels.crit * 1.5).trunc()),
            );
            format!("time={avg}ms passed={passed} failed={failed}")
        }
        None => format!("time=n/a passed={passed} failed={failed}"),
    };
    perfdata.push(
        PerfDatum::new("failed", failed_percent)
            .unit(Unit::Percent)
            .levels(failed_levels)
            .bounds(0, 100),
    );

    Finding::new(latency_verdict.escalate(failed_verdict), message).with_perfdata(perfdata)
}

pub async fn certificate(
    cfg: &CheckConfig,
    target: CertificateTarget,
    probes: &dyn Probes,
) -> ProbeOutcome<Finding> {
    let expiry = probes
        .certificate(&cfg.host, target.port(), cfg.certificate_timeout)
        .await?;
    let levels = cfg.thresholds.or_defaults(60.0, 30.0);

    let message = expiry.message.clone();
    let verdict = if expiry.expired {
        Verdict::Critical
    } else {
        judge(&Measurement::CertificateExpiry(expiry), levels, Direction::Below).unwrap_or(Verdict::Unknown)
    };
    Ok(Finding::new(verdict, message))
}

pub async fn core_status(cfg: &CheckConfig, probes: &dyn Probes) -> ProbeOutcome<Finding> {
    let page = probes
        .status_page(&status_url(cfg), cfg.status.timeout)
        .await?;
    Ok(if status::core_is_up(&page) {
        Finding::new(Verdict::Ok, "Core OK")
    } else {
        Finding::new(Verdict::Critical, "Core KO")
    })
}

pub async fn connector_status(cfg: &CheckConfig, probes: &dyn Probes) -> ProbeOutcome<Finding> {
    let page = probes
        .status_page(&status_url(cfg), cfg.status.timeout)
        .await?;
    connector_finding(&status::connectors(&page))
}

fn connector_finding(connectors: &[status::Connector]) -> ProbeOutcome<Finding> {
    if connectors.is_empty() {
        return Err(ProbeError::parse("No connector found"));
    }
    let (up, down): (Vec<_>, Vec<_>) = connectors.iter().partition(|c| c.healthy);
    let names = |list: &[&status::Connector]| {
        list.iter()
            .map(|c| c.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    };

    Ok(match (up.is_empty(), down.is_empty()) {
        (true, _) => Finding::new(Verdict::Critical, format!("DOWN: [{}]", names(&down))),
        (false, false) => Finding::new(
            Verdict::Warning,
            format!("UP: [{}], DOWN: [{}]", names(&up), names(&down)),
        ),
        (false, true) => Finding::new(Verdict::Ok, format!("UP: [{}]", names(&up))),
    })
}

fn status_url(cfg: &CheckConfig) -> String {
    format!("https://{}:{}", cfg.host, cfg.status.port)
}
