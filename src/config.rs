use std::time::Duration;

pub const DEFAULT_INTERVAL_SECS: u64 = 1;
pub const DEFAULT_STABLE_ITERATIONS: u64 = 900;
pub const DEFAULT_TIMEOUT_SECS: u64 = 1800;

/// How change reports are encoded on stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Timestamp line, a heading, then the diff or contents.
    #[default]
    Text,
    /// One JSON object per report.
    Json,
}

/// Resolved monitor settings, fixed for the life of the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
    /// Pause between the end of one poll and the start of the next.
    pub interval: Duration,
    /// Consecutive unchanged polls tolerated before exiting. `None` = never.
    pub stable_iterations: Option<u64>,
    /// Total wall-clock budget. `None` = unbounded.
    pub timeout: Option<Duration>,
    pub format: OutputFormat,
    /// Program followed by its arguments. Never empty once parsed.
    pub command: Vec<String>,
}

impl MonitorConfig {
    /// Build a config from raw option values, applying the "zero disables" rule
    /// to the stability threshold and the timeout.
    pub fn from_values(
        interval_secs: u64,
        stable_iterations: u64,
        timeout_secs: u64,
        format: OutputFormat,
        command: Vec<String>,
    ) -> Self {
        Self {
            interval: Duration::from_secs(interval_secs),
            stable_iterations: (stable_iterations > 0).then_some(stable_iterations),
            timeout: (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs)),
            format,
            command,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MonitorConfig::from_values(
            DEFAULT_INTERVAL_SECS,
            DEFAULT_STABLE_ITERATIONS,
            DEFAULT_TIMEOUT_SECS,
            OutputFormat::default(),
            vec!["date".into()],
        );
        assert_eq!(config.interval, Duration::from_secs(1));
        assert_eq!(config.stable_iterations, Some(900));
        assert_eq!(config.timeout, Some(Duration::from_secs(1800)));
        assert_eq!(config.format, OutputFormat::Text);
    }

    #[test]
    fn test_largest_values_are_kept() {
        let config =
            MonitorConfig::from_values(u64::MAX, u64::MAX, u64::MAX, OutputFormat::Text, vec![]);
        assert_eq!(config.interval, Duration::from_secs(u64::MAX));
        assert_eq!(config.stable_iterations, Some(u64::MAX));
        assert_eq!(config.timeout, Some(Duration::from_secs(u64::MAX)));
    }

    #[test]
    fn test_zero_disables_threshold_and_timeout() {
        let config = MonitorConfig::from_values(0, 0, 0, OutputFormat::Json, vec!["ls".into()]);
        assert_eq!(config.interval, Duration::ZERO);
        assert_eq!(config.stable_iterations, None);
        assert_eq!(config.timeout, None);
        assert_eq!(config.command, vec!["ls"]);
    }
}
