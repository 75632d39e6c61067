use std::fmt;

/// Health state reported to the monitoring supervisor.
///
/// The discriminants are the process exit codes and must not change.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Verdict {
    #[default]
    Ok = 0,
    Warning = 1,
    Critical = 2,
    Unknown = 3,
}

impl Verdict {
    pub fn exit_code(self) -> i32 {
        self as i32
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Warning => "WARNING",
            Self::Critical => "CRITICAL",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Keeps the more severe of two verdicts.
    pub fn escalate(self, other: Verdict) -> Verdict {
        self.max(other)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Normalized value produced by a collector, before thresholds are applied.
#[derive(Debug, Clone, PartialEq)]
pub enum Measurement {
    Latency(LatencyStat),
    CertificateExpiry(CertificateExpiry),
    Percentage {
        used: f64,
        total: f64,
        percent_used: f64,
    },
    Count(u64),
}

impl Measurement {
    /// Builds a percentage, reporting 0% for an empty total.
    pub fn percentage(used: f64, total: f64) -> Self {
        let percent_used = if total > 0.0 {
            used / total * 100.0
        } else {
            0.0
        };
        Self::Percentage {
            used,
            total,
            percent_used,
        }
    }

    /// The number thresholds are compared against, if the measurement has one.
    pub fn value(&self) -> Option<f64> {
        match self {
            Self::Latency(stat) => stat.average_ms,
            Self::CertificateExpiry(expiry) => Some(expiry.days_remaining as f64),
            Self::Percentage { percent_used, .. } => Some(*percent_used),
            Self::Count(value) => Some(*value as f64),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LatencyStat {
    /// Mean over successful attempts; `None` when no attempt succeeded.
    pub average_ms: Option<f64>,
    pub passed: u32,
    pub failed: u32,
}

impl LatencyStat {
    pub fn attempts(&self) -> u32 {
        self.passed + self.failed
    }

    pub fn failed_percent(&self) -> u32 {
        match self.attempts() {
            0 => 100,
            total => self.failed * 100 / total,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CertificateExpiry {
    pub days_remaining: i64,
    pub expired: bool,
    /// Operator-facing summary, e.g. `Days remaining before expiration: 42`.
    pub message: String,
}

/// One entity of an SNMP table, column OID to rendered value, in column order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnmpRow {
    columns: Vec<(String, String)>,
}

impl SnmpRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, column: impl Into<String>, value: impl Into<String>) {
        self.columns.push((column.into(), value.into()));
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value.as_str())
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }
}
