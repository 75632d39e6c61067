use thiserror::Error;

/// Why a collector could not produce a measurement.
///
/// The payload is the diagnostic text shown to the operator; it ends up as the
/// report message of an UNKNOWN result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeError {
    /// DNS, connect, socket or timeout problems outside of a counted attempt.
    #[error("{0}")]
    Transport(String),
    /// The peer answered, but not the way the protocol requires.
    #[error("{0}")]
    Protocol(String),
    /// The response arrived but its content has an unexpected shape.
    #[error("{0}")]
    Parse(String),
    /// A required option is missing or invalid; raised before any network I/O.
    #[error("{0}")]
    Config(String),
}

impl ProbeError {
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport",
            Self::Protocol(_) => "protocol",
            Self::Parse(_) => "parse",
            Self::Config(_) => "config",
        }
    }
}

impl From<reqwest::Error> for ProbeError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for ProbeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(format!("invalid JSON response: {err}"))
    }
}

/// Result of a single collector call: `Ok` carries the measurement.
pub type ProbeOutcome<T> = Result<T, ProbeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_the_bare_diagnostic() {
        let err = ProbeError::protocol("REQUEST: HTTP 403");
        assert_eq!(err.to_string(), "REQUEST: HTTP 403");
        assert_eq!(err.kind(), "protocol");
    }

    #[test]
    fn json_errors_are_parse_failures() {
        let err: ProbeError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert!(matches!(err, ProbeError::Parse(_)));
    }
}
