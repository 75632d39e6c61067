use crate::evaluate::Levels;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Unit {
    #[default]
    None,
    Millis,
    Percent,
    Bytes,
    Devices,
    Days,
}

impl Unit {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "",
            Self::Millis => "ms",
            Self::Percent => "%",
            Self::Bytes => "B",
            Self::Devices => "devices",
            Self::Days => "days",
        }
    }
}

impl FromStr for Unit {
    type Err = PerfDataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" => Ok(Self::None),
            "ms" => Ok(Self::Millis),
            "%" => Ok(Self::Percent),
            "B" => Ok(Self::Bytes),
            "devices" => Ok(Self::Devices),
            "days" => Ok(Self::Days),
            other => Err(PerfDataError::Unit(other.to_string())),
        }
    }
}

/// One graphable series value with its thresholds and bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct PerfDatum {
    pub label: String,
    pub value: f64,
    pub unit: Unit,
    pub warn: Option<f64>,
    pub crit: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl PerfDatum {
    pub fn new(label: impl Into<String>, value: impl Into<f64>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
            unit: Unit::None,
            warn: None,
            crit: None,
            min: None,
            max: None,
        }
    }

    pub fn unit(mut self, unit: Unit) -> Self {
        self.unit = unit;
        self
    }

    pub fn levels(mut self, levels: Levels) -> Self {
        self.warn = Some(levels.warn);
        self.crit = Some(levels.crit);
        self
    }

    pub fn bounds(mut self, min: impl Into<f64>, max: impl Into<f64>) -> Self {
        self.min = Some(min.into());
        self.max = Some(max.into());
        self
    }
}

impl fmt::Display for PerfDatum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let field = |v: Option<f64>| v.map(|v| v.to_string()).unwrap_or_default();
        write!(
            f,
            "'{}'={}{};{};{};{};{};",
            self.label.replace('\'', "''"),
            self.value,
            self.unit.as_str(),
            field(self.warn),
            field(self.crit),
            field(self.min),
            field(self.max),
        )
    }
}

/// Renders a series in input order, each datum closed by its own `;`.
pub fn format(data: &[PerfDatum]) -> String {
    data.iter().map(ToString::to_string).collect()
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PerfDataError {
    #[error("perfdata label must be quoted: {0}")]
    Label(String),
    #[error("perfdata value is not a number: {0}")]
    Value(String),
    #[error("unknown perfdata unit: {0}")]
    Unit(String),
    #[error("perfdata datum has {0} threshold fields, expected 4")]
    Fields(usize),
}

impl FromStr for PerfDatum {
    type Err = PerfDataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s
            .strip_prefix('\'')
            .ok_or_else(|| PerfDataError::Label(s.to_string()))?;
        let (label, rest) = split_label(rest).ok_or_else(|| PerfDataError::Label(s.to_string()))?;

        let mut fields = rest.strip_suffix(';').unwrap_or(rest).split(';');
        let head = fields.next().unwrap_or_default();
        let split = head
            .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-'))
            .unwrap_or(head.len());
        let (number, unit) = head.split_at(split);
        let value = parse_number(number)?.ok_or_else(|| PerfDataError::Value(head.to_string()))?;

        let rest: Vec<&str> = fields.collect();
        if rest.len() != 4 {
            return Err(PerfDataError::Fields(rest.len()));
        }

        Ok(Self {
            label,
            value,
            unit: unit.parse()?,
            warn: parse_number(rest[0])?,
            crit: parse_number(rest[1])?,
            min: parse_number(rest[2])?,
            max: parse_number(rest[3])?,
        })
    }
}

/// Reads a quoted label up to its closing `'=`; a doubled `''` stands for one quote.
fn split_label(quoted: &str) -> Option<(String, &str)> {
    let mut label = String::new();
    let mut chars = quoted.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if c != '\'' {
            label.push(c);
        } else if chars.next_if(|&(_, next)| next == '\'').is_some() {
            label.push('\'');
        } else {
            return quoted[i + 1..].strip_prefix('=').map(|rest| (label, rest));
        }
    }
    None
}

fn parse_number(s: &str) -> Result<Option<f64>, PerfDataError> {
    if s.is_empty() {
        return Ok(None);
    }
    s.parse::<f64>()
        .map(Some)
        .map_err(|_| PerfDataError::Value(s.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_full_datum() {
        let datum = PerfDatum::new("time", 12)
            .unit(Unit::Millis)
            .levels(Levels::new(1000.0, 2000.0))
            .bounds(0, 3000);
        assert_eq!(datum.to_string(), "'time'=12ms;1000;2000;0;3000;");
    }

    #[test]
    fn empty_thresholds_render_as_empty_fields() {
        let datum = PerfDatum::new("cpu0", 7).unit(Unit::Percent).bounds(0, 100);
        assert_eq!(datum.to_string(), "'cpu0'=7%;;;0;100;");

        let bare = PerfDatum::new("label", 3).bounds(0, 5);
        assert_eq!(bare.to_string(), "'label'=3;;;0;5;");
    }

    #[test]
    fn format_preserves_order_without_separator() {
        let data = vec![
            PerfDatum::new("avg", 50).unit(Unit::Percent),
            PerfDatum::new("cpu0", 40).unit(Unit::Percent),
        ];
        assert_eq!(format(&data), "'avg'=50%;;;;;'cpu0'=40%;;;;;");
        assert_eq!(format(&[]), "");
    }

    #[test]
    fn parses_back_the_numeric_fields() {
        let datum = PerfDatum::new("label", 42)
            .unit(Unit::Percent)
            .levels(Levels::new(50.0, 80.0))
            .bounds(0, 100);
        let parsed: PerfDatum = datum.to_string().parse().unwrap();
        assert_eq!(parsed, datum);
        assert_eq!(
            (parsed.value, parsed.warn, parsed.crit, parsed.min, parsed.max),
            (42.0, Some(50.0), Some(80.0), Some(0.0), Some(100.0))
        );
    }

    #[test]
    fn parses_labels_with_slashes_and_fractions() {
        let parsed: PerfDatum = "'/var/log'=1.5B;;;0;2048;".parse().unwrap();
        assert_eq!(parsed.label, "/var/log");
        assert_eq!(parsed.value, 1.5);
        assert_eq!(parsed.unit, Unit::Bytes);
        assert_eq!(parsed.warn, None);
        assert_eq!(parsed.max, Some(2048.0));
    }

    #[test]
    fn quotes_in_labels_are_doubled() {
        let datum = PerfDatum::new("admin's share", 3).bounds(0, 10);
        assert_eq!(datum.to_string(), "'admin''s share'=3;;;0;10;");

        let parsed: PerfDatum = datum.to_string().parse().unwrap();
        assert_eq!(parsed, datum);
        assert_eq!(parsed.label, "admin's share");
    }

    #[test]
    fn rejects_malformed_input() {
        assert_eq!(
            "time=1ms;;;;;".parse::<PerfDatum>(),
            Err(PerfDataError::Label("time=1ms;;;;;".to_string()))
        );
        assert_eq!(
            "'t'=1parsecs;;;;;".parse::<PerfDatum>(),
            Err(PerfDataError::Unit("parsecs".to_string()))
        );
        assert_eq!("'t'=1ms;2;".parse::<PerfDatum>(), Err(PerfDataError::Fields(1)));
        assert_eq!(
            "'unterminated=1;;;;;".parse::<PerfDatum>(),
            Err(PerfDataError::Label("'unterminated=1;;;;;".to_string()))
        );
    }
}
