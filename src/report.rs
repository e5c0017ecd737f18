/// Change reports written to stdout whenever the watched output changes.
use crate::config::OutputFormat;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::io::Write;
use std::time::Duration;

/// Timestamp for the text format: `date(1)` layout with a numeric UTC offset
/// in place of the zone abbreviation.
const TEXT_TIMESTAMP: &str = "%a %b %e %H:%M:%S %z %Y";

/// What a report carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "body", rename_all = "snake_case")]
pub enum ReportBody {
    /// Full output: first poll, or no usable diff against the baseline.
    Contents(String),
    /// Unified diff against the baseline.
    Differences(String),
}

/// One change report.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub timestamp: DateTime<Local>,
    pub iteration: u64,
    /// Exit code of the invocation that produced this output (None if it
    /// was killed by a signal or never started).
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
    #[serde(flatten)]
    pub body: ReportBody,
}

impl Report {
    pub fn new(iteration: u64, body: ReportBody) -> Self {
        Self {
            timestamp: Local::now(),
            iteration,
            exit_code: None,
            duration_ms: 0,
            body,
        }
    }

    /// Attach how the invocation behind this report ended.
    pub fn with_command_result(mut self, exit_code: Option<i32>, duration: Duration) -> Self {
        self.exit_code = exit_code;
        self.duration_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        self
    }
}

/// Errors writing reports.
#[derive(Debug)]
pub enum ReportError {
    Write { source: std::io::Error },
    Serialize { source: serde_json::Error },
}

impl std::fmt::Display for ReportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReportError::Write { source } => write!(f, "failed to write report: {}", source),
            ReportError::Serialize { source } => {
                write!(f, "failed to serialize report: {}", source)
            }
        }
    }
}

impl std::error::Error for ReportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ReportError::Write { source } => Some(source),
            ReportError::Serialize { source } => Some(source),
        }
    }
}

/// Encodes reports onto a writer, flushing after each one.
pub struct ReportWriter<W: Write> {
    out: W,
    format: OutputFormat,
    written: u64,
}

impl<W: Write> ReportWriter<W> {
    pub fn new(out: W, format: OutputFormat) -> Self {
        Self {
            out,
            format,
            written: 0,
        }
    }

    pub fn write(&mut self, report: &Report) -> Result<(), ReportError> {
        match self.format {
            OutputFormat::Text => self.write_text(report),
            OutputFormat::Json => self.write_json(report),
        }?;
        self.out
            .flush()
            .map_err(|e| ReportError::Write { source: e })?;
        self.written += 1;
        Ok(())
    }

    fn write_text(&mut self, report: &Report) -> Result<(), ReportError> {
        let (heading, body) = match &report.body {
            ReportBody::Contents(body) => ("Current contents:", body),
            ReportBody::Differences(body) => ("Differences:", body),
        };
        let mut text = format!(
            "{}\n{}\n{}",
            report.timestamp.format(TEXT_TIMESTAMP),
            heading,
            body
        );
        if !text.ends_with('\n') {
            text.push('\n');
        }
        self.out
            .write_all(text.as_bytes())
            .map_err(|e| ReportError::Write { source: e })
    }

    fn write_json(&mut self, report: &Report) -> Result<(), ReportError> {
        let line =
            serde_json::to_string(report).map_err(|e| ReportError::Serialize { source: e })?;
        writeln!(self.out, "{}", line).map_err(|e| ReportError::Write { source: e })
    }

    /// Reports written so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }
}
