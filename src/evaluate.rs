use crate::state::{Measurement, Verdict};

/// Direction in which a measurement makes health worse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Worse as the value grows (latency, usage, uptime days).
    Above,
    /// Worse as the value shrinks (certificate days remaining).
    Below,
}

impl Direction {
    fn breaches(self, value: f64, threshold: f64) -> bool {
        match self {
            Self::Above => value >= threshold,
            Self::Below => value < threshold,
        }
    }
}

/// Operator overrides as given on the command line; either side may be absent.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ThresholdPair {
    pub warning: Option<f64>,
    pub critical: Option<f64>,
}

impl ThresholdPair {
    pub fn new(warning: Option<f64>, critical: Option<f64>) -> Self {
        Self { warning, critical }
    }

    /// Fills missing sides with the check's own defaults.
    pub fn or_defaults(self, warning: f64, critical: f64) -> Levels {
        Levels {
            warn: self.warning.unwrap_or(warning),
            crit: self.critical.unwrap_or(critical),
        }
    }
}

/// Resolved warning/critical thresholds for one evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Levels {
    pub warn: f64,
    pub crit: f64,
}

impl Levels {
    pub fn new(warn: f64, crit: f64) -> Self {
        Self { warn, crit }
    }

    /// Rescales both thresholds, e.g. from percent to bytes of a volume.
    pub fn map(self, f: impl Fn(f64) -> f64) -> Levels {
        Levels {
            warn: f(self.warn),
            crit: f(self.crit),
        }
    }

    pub fn evaluate(&self, value: f64, direction: Direction) -> Verdict {
        evaluate(value, self.warn, self.crit, direction)
    }
}

pub fn evaluate(value: f64, warn: f64, crit: f64, direction: Direction) -> Verdict {
    if direction.breaches(value, crit) {
        Verdict::Critical
    } else if direction.breaches(value, warn) {
        Verdict::Warning
    } else {
        Verdict::Ok
    }
}

/// Applies levels to a measurement's number; `None` when it has none to compare.
pub fn judge(measurement: &Measurement, levels: Levels, direction: Direction) -> Option<Verdict> {
    measurement
        .value()
        .map(|value| levels.evaluate(value, direction))
}
