/// The poll loop: capture, compare against the baseline, report, repeat.
///
/// Each iteration runs to completion before the next starts. Shutdown is
/// observed at the top of an iteration and while sleeping between polls,
/// never in the middle of a comparison.
use crate::capture::{Capture, CaptureError, Probe};
use crate::config::MonitorConfig;
use crate::diff;
use crate::report::{Report, ReportBody, ReportError, ReportWriter};
use crate::signals::Shutdown;
use crate::stability::{Deadline, StabilityCounter, StabilityDecision};
use std::io::Write;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Output stayed the same for more polls than allowed.
    StableThresholdReached,
    /// The overall timeout elapsed.
    TimeoutReached,
    /// SIGINT/SIGTERM.
    Interrupted,
}

/// What a finished run looked like.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorSummary {
    pub reason: Termination,
    pub iterations: u64,
    pub reports: u64,
}

/// Errors that stop the loop. Everything else degrades and keeps polling.
#[derive(Debug)]
pub enum MonitorError {
    Report { source: ReportError },
}

impl std::fmt::Display for MonitorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MonitorError::Report { source } => write!(f, "cannot emit reports: {}", source),
        }
    }
}

impl std::error::Error for MonitorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MonitorError::Report { source } => Some(source),
        }
    }
}

impl From<ReportError> for MonitorError {
    fn from(source: ReportError) -> Self {
        MonitorError::Report { source }
    }
}

pub struct Monitor<P: Probe, W: Write> {
    probe: P,
    writer: ReportWriter<W>,
    shutdown: Shutdown,
    interval: Duration,
    stability: StabilityCounter,
    deadline: Option<Deadline>,
    baseline: Option<Vec<u8>>,
    iteration: u64,
}

impl<P: Probe, W: Write> Monitor<P, W> {
    /// Set up a monitor. The deadline, if any, starts counting now.
    pub fn new(config: &MonitorConfig, probe: P, out: W, shutdown: Shutdown) -> Self {
        Self {
            probe,
            writer: ReportWriter::new(out, config.format),
            shutdown,
            interval: config.interval,
            stability: StabilityCounter::new(config.stable_iterations),
            deadline: Deadline::starting_now(config.timeout),
            baseline: None,
            iteration: 0,
        }
    }

    /// Poll until a termination condition is met.
    pub async fn run(mut self) -> Result<MonitorSummary, MonitorError> {
        let reason = loop {
            if self.shutdown.is_requested() {
                break Termination::Interrupted;
            }

            self.iteration += 1;
            let capture = match self.probe.capture(&self.shutdown).await {
                Ok(capture) => capture,
                Err(CaptureError::Aborted) => break Termination::Interrupted,
                Err(e) => {
                    warn!(
                        iteration = self.iteration,
                        error = %e,
                        "capture failed, treating output as empty"
                    );
                    Capture::empty()
                }
            };

            if let Some(reason) = self.observe(capture)? {
                break reason;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = self.shutdown.requested() => break Termination::Interrupted,
            }
        };

        let summary = MonitorSummary {
            reason,
            iterations: self.iteration,
            reports: self.writer.written(),
        };
        info!(
            reason = ?summary.reason,
            iterations = summary.iterations,
            reports = summary.reports,
            "monitor finished"
        );
        Ok(summary)
    }

    /// Compare one capture with the baseline, report if it changed, and
    /// check the stop conditions. Stability is checked before the deadline
    /// so a change found on the last poll is still reported.
    fn observe(&mut self, capture: Capture) -> Result<Option<Termination>, MonitorError> {
        let changed = self.baseline.as_deref() != Some(capture.stdout.as_slice());

        if changed {
            let body = match self.baseline.as_deref() {
                None => ReportBody::Contents(lossy(&capture.stdout)),
                Some(previous) => match diff::unified_diff(previous, &capture.stdout) {
                    Ok(diff) => ReportBody::Differences(diff),
                    Err(e) => {
                        warn!(error = %e, "diff failed, reporting full contents");
                        ReportBody::Contents(lossy(&capture.stdout))
                    }
                },
            };
            let report = Report::new(self.iteration, body)
                .with_command_result(capture.exit_code, capture.duration);
            self.writer.write(&report)?;
            self.baseline = Some(capture.stdout);
        }

        match self.stability.record(changed) {
            StabilityDecision::Changed => {
                debug!(iteration = self.iteration, "output changed")
            }
            StabilityDecision::Unchanged { count } => {
                debug!(iteration = self.iteration, count, "output unchanged")
            }
            StabilityDecision::Stable { count } => {
                info!(count, "output stable, stopping");
                return Ok(Some(Termination::StableThresholdReached));
            }
        }

        if self.deadline.is_some_and(|deadline| deadline.has_passed()) {
            info!(iteration = self.iteration, "timeout reached, stopping");
            return Ok(Some(Termination::TimeoutReached));
        }
        Ok(None)
    }
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}
