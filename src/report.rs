use crate::error::ProbeError;
use crate::perfdata::{self, PerfDatum};
use crate::state::Verdict;
use std::fmt;

/// Body of a check result before the title is attached.
#[derive(Debug, Clone, PartialEq)]
pub struct Finding {
    pub verdict: Verdict,
    pub message: String,
    pub perfdata: Vec<PerfDatum>,
}

impl Finding {
    pub fn new(verdict: Verdict, message: impl Into<String>) -> Self {
        Self {
            verdict,
            message: message.into(),
            perfdata: Vec::new(),
        }
    }

    pub fn with_perfdata(mut self, perfdata: Vec<PerfDatum>) -> Self {
        self.perfdata = perfdata;
        self
    }
}

/// The one-line status a supervisor reads: `TITLE VERDICT - message;|perfdata`.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub title: String,
    pub verdict: Verdict,
    pub message: String,
    pub perfdata: Vec<PerfDatum>,
}

impl Report {
    pub fn new(title: impl Into<String>, finding: Finding) -> Self {
        Self {
            title: title.into(),
            verdict: finding.verdict,
            message: finding.message,
            perfdata: finding.perfdata,
        }
    }

    /// Acquisition failures are always UNKNOWN, whatever the thresholds say.
    pub fn unknown(title: impl Into<String>, err: &ProbeError) -> Self {
        Self {
            title: title.into(),
            verdict: Verdict::Unknown,
            message: err.to_string(),
            perfdata: Vec::new(),
        }
    }

    pub fn exit_code(&self) -> i32 {
        self.verdict.exit_code()
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Newlines would break the single-line contract, and `|` opens the perfdata section.
        let message = self.message.replace(['\r', '\n'], " ").replace('|', "/");
        write!(f, "{} {} - {};", self.title, self.verdict, message)?;
        if !self.perfdata.is_empty() {
            write!(f, "|{}", perfdata::format(&self.perfdata))?;
        }
        Ok(())
    }
}

/// Prints the report to stdout and terminates with the verdict's exit code.
pub fn emit(report: &Report) -> ! {
    println!("{report}");
    std::process::exit(report.exit_code())
}
