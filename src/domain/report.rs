//! Per-command results and per-host reports

use std::fmt;

/// First output line of one command executed on one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub command: String,
    /// First line of stdout, without the line terminator
    pub first_line: String,
    /// `None` when the server never reported a status
    pub exit_code: Option<u32>,
}

/// Output of one host: the trimmed first line of each configured command.
///
/// The first value is the core count when the default probe runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreCountReport {
    pub hostname: String,
    pub values: Vec<String>,
}

impl CoreCountReport {
    #[must_use]
    pub fn from_results(hostname: &str, results: &[CommandResult]) -> Self {
        Self {
            hostname: hostname.to_string(),
            values: results
                .iter()
                .map(|r| r.first_line.trim().to_string())
                .collect(),
        }
    }

    #[must_use]
    pub fn core_count(&self) -> Option<&str> {
        self.values.first().map(String::as_str)
    }
}

/// `<hostname>\t:\t<value>`, with extra command values appended the same way
impl fmt::Display for CoreCountReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.hostname)?;
        for value in &self.values {
            write!(f, "\t:\t{value}")?;
        }
        Ok(())
    }
}
