use crate::collectors::Probes;
use crate::config::CheckConfig;
use crate::error::{ProbeError, ProbeOutcome};
use crate::evaluate::{judge, Direction, Levels};
use crate::perfdata::{PerfDatum, Unit};
use crate::report::Finding;
use crate::state::{Measurement, SnmpRow, Verdict};
use std::collections::HashMap;

const STORAGE_DESCR: &str = "1.3.6.1.2.1.25.2.3.1.3";
const STORAGE_UNITS: &str = "1.3.6.1.2.1.25.2.3.1.4";
const STORAGE_SIZE: &str = "1.3.6.1.2.1.25.2.3.1.5";
const STORAGE_USED: &str = "1.3.6.1.2.1.25.2.3.1.6";

// hrStorage index 1 is physical memory.
const MEMORY_UNITS: &str = "1.3.6.1.2.1.25.2.3.1.4.1";
const MEMORY_SIZE: &str = "1.3.6.1.2.1.25.2.3.1.5.1";
const MEMORY_USED: &str = "1.3.6.1.2.1.25.2.3.1.6.1";

const PROCESSOR_ID: &str = "1.3.6.1.2.1.25.3.3.1.1";
const PROCESSOR_LOAD: &str = "1.3.6.1.2.1.25.3.3.1.2";

const SYSTEM_UPTIME: &str = "1.3.6.1.2.1.25.1.1.0";
const UPTIME_MAX_DAYS: u32 = 400;

const ROOT: &str = "/";
const GB: f64 = 1e9;

#[derive(Debug, Clone, PartialEq)]
struct Volume {
    name: String,
    used: u64,
    size: u64,
}

impl Volume {
    fn from_row(row: &SnmpRow) -> ProbeOutcome<Self> {
        let units = number(row.get(STORAGE_UNITS), STORAGE_UNITS)?;
        Ok(Self {
            name: row.get(STORAGE_DESCR).unwrap_or_default().to_string(),
            used: number(row.get(STORAGE_USED), STORAGE_USED)?.saturating_mul(units),
            size: number(row.get(STORAGE_SIZE), STORAGE_SIZE)?.saturating_mul(units),
        })
    }

    /// Used share rounded to one decimal, the precision thresholds are compared at.
    fn measurement(&self) -> Measurement {
        match Measurement::percentage(self.used as f64, self.size as f64) {
            Measurement::Percentage {
                used,
                total,
                percent_used,
            } => Measurement::Percentage {
                used,
                total,
                percent_used: (percent_used * 10.0).round() / 10.0,
            },
            other => other,
        }
    }

    fn summary(&self) -> String {
        let percent = self.measurement().value().unwrap_or_default();
        format!(
            "Used: {:.1}/{:.1}GB ({percent:.1}%)",
            self.used as f64 / GB,
            self.size as f64 / GB
        )
    }

    /// Thresholds rendered in bytes of this volume.
    fn byte_levels(&self, levels: Levels) -> Levels {
        let size = self.size as f64;
        levels.map(|pct| (pct * size / 100.0).round())
    }
}

fn number(value: Option<&str>, oid: &str) -> ProbeOutcome<u64> {
    let raw = value.ok_or_else(|| ProbeError::parse(format!("missing value for {oid}")))?;
    raw.trim()
        .parse()
        .map_err(|_| ProbeError::parse(format!("{oid}: expected a number, got {raw:?}")))
}

pub async fn storage(cfg: &CheckConfig, probes: &dyn Probes) -> ProbeOutcome<Finding> {
    let rows = probes
        .snmp_table(
            &cfg.snmp,
            &[STORAGE_DESCR, STORAGE_UNITS, STORAGE_SIZE, STORAGE_USED],
        )
        .await?;
    let volumes = rows
        .iter()
        .map(Volume::from_row)
        .collect::<ProbeOutcome<Vec<_>>>()?;
    storage_finding(&volumes, cfg.thresholds.or_defaults(70.0, 90.0))
}

fn storage_finding(volumes: &[Volume], levels: Levels) -> ProbeOutcome<Finding> {
    let root = volumes
        .iter()
        .find(|v| v.name == ROOT)
        .ok_or_else(|| ProbeError::parse("No '/' storage found"))?;
    let verdict = judge(&root.measurement(), levels, Direction::Above).unwrap_or(Verdict::Ok);

    let mut perfdata = vec![PerfDatum::new(ROOT, root.used as f64)
        .unit(Unit::Bytes)
        .levels(root.byte_levels(levels))
        .bounds(0, root.size as f64)];
    perfdata.extend(
        volumes
            .iter()
            .filter(|v| v.name.starts_with('/') && v.name != ROOT)
            .map(|v| {
                PerfDatum::new(v.name.as_str(), v.used as f64)
                    .unit(Unit::Bytes)
                    .bounds(0, v.size as f64)
            }),
    );

    Ok(Finding::new(verdict, root.summary()).with_perfdata(perfdata))
}

pub async fn memory(cfg: &CheckConfig, probes: &dyn Probes) -> ProbeOutcome<Finding> {
    let values = probes
        .snmp_get(&cfg.snmp, &[MEMORY_UNITS, MEMORY_SIZE, MEMORY_USED])
        .await?;
    let get = |oid: &str| number(values.get(oid).map(String::as_str), oid);
    let units = get(MEMORY_UNITS)?;
    let memory = Volume {
        name: "memory".to_string(),
        used: get(MEMORY_USED)?.saturating_mul(units),
        size: get(MEMORY_SIZE)?.saturating_mul(units),
    };

    let levels = cfg.thresholds.or_defaults(90.0, 100.0);
    let verdict = judge(&memory.measurement(), levels, Direction::Above).unwrap_or(Verdict::Ok);
    Ok(Finding::new(verdict, memory.summary()).with_perfdata(vec![PerfDatum::new(
        "memory",
        memory.used as f64,
    )
    .unit(Unit::Bytes)
    .levels(memory.byte_levels(levels))
    .bounds(0, memory.size as f64)]))
}

pub async fn cpu(cfg: &CheckConfig, probes: &dyn Probes) -> ProbeOutcome<Finding> {
    let rows = probes
        .snmp_table(&cfg.snmp, &[PROCESSOR_ID, PROCESSOR_LOAD])
        .await?;
    let loads = rows
        .iter()
        .map(|row| number(row.get(PROCESSOR_LOAD), PROCESSOR_LOAD))
        .collect::<ProbeOutcome<Vec<_>>>()?;
    cpu_finding(&loads, cfg.thresholds.or_defaults(90.0, 100.0))
}

fn cpu_finding(loads: &[u64], levels: Levels) -> ProbeOutcome<Finding> {
    if loads.is_empty() {
        return Err(ProbeError::parse("No processor found"));
    }
    let average = loads.iter().sum::<u64>() as f64 / loads.len() as f64;
    let verdict = levels.evaluate(average, Direction::Above);

    let mut perfdata = Vec::with_capacity(loads.len() + 1);
    perfdata.push(
        PerfDatum::new("avg", average.trunc())
            .unit(Unit::Percent)
            .levels(levels.map(f64::round))
            .bounds(0, 100),
    );
    for (index, load) in loads.iter().enumerate() {
        perfdata.push(
            PerfDatum::new(format!("cpu{index}"), *load as f64)
                .unit(Unit::Percent)
                .bounds(0, 100),
        );
    }

    let message = format!("Load: {}% ({} CPUs)", average.trunc(), loads.len());
    Ok(Finding::new(verdict, message).with_perfdata(perfdata))
}

pub async fn uptime(cfg: &CheckConfig, probes: &dyn Probes) -> ProbeOutcome<Finding> {
    let values = probes.snmp_get(&cfg.snmp, &[SYSTEM_UPTIME]).await?;
    let ticks = ticks(&values)?;
    Ok(uptime_finding(ticks, cfg.thresholds.or_defaults(183.0, 365.0)))
}

fn ticks(values: &HashMap<String, String>) -> ProbeOutcome<u64> {
    number(values.get(SYSTEM_UPTIME).map(String::as_str), SYSTEM_UPTIME)
}

/// `ticks` are hundredths of a second.
fn uptime_finding(ticks: u64, levels: Levels) -> Finding {
    let seconds = ticks / 100;
    let days = seconds / 86_400;
    let hours = seconds % 86_400 / 3600;
    let minutes = seconds % 3600 / 60;

    let verdict = judge(&Measurement::Count(days), levels, Direction::Above).unwrap_or(Verdict::Ok);
    let message = format!("Uptime: {days} days {hours} hours {minutes} minutes");
    Finding::new(verdict, message).with_perfdata(vec![PerfDatum::new("uptime", days as f64)
        .unit(Unit::Days)
        .levels(levels)
        .bounds(0, UPTIME_MAX_DAYS)])
}
