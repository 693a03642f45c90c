//! Campaign statistics and the end-of-run summary

use super::outcome::{DispatchOutcome, OutcomeStatus};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// Running counters. `simulated` is a sub-count of `successful`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CampaignStatistics {
    pub processed: u64,
    pub successful: u64,
    pub failed: u64,
    pub skipped: u64,
    pub simulated: u64,
    pub started_at: DateTime<Utc>,
}

impl CampaignStatistics {
    fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            processed: 0,
            successful: 0,
            failed: 0,
            skipped: 0,
            simulated: 0,
            started_at,
        }
    }
}

/// Records outcomes as tasks finish
#[derive(Debug)]
pub struct CampaignReporter {
    started: Instant,
    stats: Mutex<CampaignStatistics>,
}

impl CampaignReporter {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            stats: Mutex::new(CampaignStatistics::new(Utc::now())),
        }
    }

    /// Count one outcome: `processed` plus exactly one of
    /// successful/failed/skipped
    pub fn record(&self, outcome: &DispatchOutcome) {
        let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        stats.processed += 1;
        match outcome.status {
            OutcomeStatus::Success => stats.successful += 1,
            OutcomeStatus::SimulatedTestSend => {
                stats.successful += 1;
                stats.simulated += 1;
            }
            OutcomeStatus::Error => stats.failed += 1,
            OutcomeStatus::Skipped => stats.skipped += 1,
        }
    }

    /// Snapshot of the counters; callable mid-campaign
    pub fn summary(&self) -> CampaignStatistics {
        *self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Close the run
    pub fn finish(&self, run: RunFacts) -> CampaignSummary {
        CampaignSummary {
            statistics: self.summary(),
            total: run.total,
            duration: self.elapsed(),
            concurrency: run.concurrency,
            cooling_periods: run.cooling_periods,
            cancelled: run.cancelled,
            unsubmitted: run.unsubmitted,
        }
    }
}

impl Default for CampaignReporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Engine-side facts folded into the summary
#[derive(Debug, Clone, Copy, Default)]
pub struct RunFacts {
    pub total: u64,
    pub concurrency: usize,
    pub cooling_periods: u64,
    pub cancelled: bool,
    pub unsubmitted: u64,
}

/// End-of-run report
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CampaignSummary {
    pub statistics: CampaignStatistics,
    /// Recipients in the campaign
    pub total: u64,
    #[serde(serialize_with = "serialize_millis")]
    pub duration: Duration,
    pub concurrency: usize,
    pub cooling_periods: u64,
    pub cancelled: bool,
    /// Tasks never submitted because of cancellation
    pub unsubmitted: u64,
}

fn serialize_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        (part as f64 / whole as f64) * 100.0
    }
}

impl CampaignSummary {
    pub fn success_rate(&self) -> f64 {
        percent(self.statistics.successful, self.statistics.processed)
    }

    pub fn failure_rate(&self) -> f64 {
        percent(self.statistics.failed, self.statistics.processed)
    }

    pub fn skip_rate(&self) -> f64 {
        percent(self.statistics.skipped, self.statistics.processed)
    }

    /// Average throughput over the whole run
    pub fn messages_per_minute(&self) -> f64 {
        let minutes = self.duration.as_secs_f64() / 60.0;
        if minutes <= 0.0 {
            0.0
        } else {
            self.statistics.processed as f64 / minutes
        }
    }
}

/// `1h 2m 3s`, `2m 3s` or `3s`
pub fn format_duration(duration: Duration) -> String {
    let seconds = duration.as_secs();
    let minutes = seconds / 60;
    let hours = minutes / 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes % 60, seconds % 60)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds % 60)
    } else {
        format!("{}s", seconds)
    }
}

impl fmt::Display for CampaignSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stats = &self.statistics;
        let rule = format!("+{}+{}+", "-".repeat(30), "-".repeat(20));
        let rows: [(&str, String); 12] = [
            ("Total recipients", self.total.to_string()),
            ("Processed", stats.processed.to_string()),
            ("Successfully sent", stats.successful.to_string()),
            ("  of which simulated", stats.simulated.to_string()),
            ("Failed deliveries", stats.failed.to_string()),
            ("Skipped", stats.skipped.to_string()),
            ("Success rate", format!("{:.2}%", self.success_rate())),
            ("Failure rate", format!("{:.2}%", self.failure_rate())),
            ("Skip rate", format!("{:.2}%", self.skip_rate())),
            ("Duration", format_duration(self.duration)),
            ("Messages per minute (avg)", format!("{:.0}", self.messages_per_minute())),
            ("Cooling periods", self.cooling_periods.to_string()),
        ];

        writeln!(f, "{}", rule)?;
        for (label, value) in rows {
            writeln!(f, "| {:<28} | {:>18} |", label, value)?;
        }
        writeln!(f, "| {:<28} | {:>18} |", "Concurrency", self.concurrency)?;
        if self.cancelled {
            writeln!(f, "| {:<28} | {:>18} |", "Cancelled, not submitted", self.unsubmitted)?;
        }
        write!(f, "{}", rule)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    #[test]
    fn test_record_counts_exactly_one_bucket() {
        let reporter = CampaignReporter::new();
        reporter.record(&DispatchOutcome::success("smtp.example.com:587", "<id>"));
        reporter.record(&DispatchOutcome::error("Invalid recipient email"));
        reporter.record(&DispatchOutcome::skipped("policy keywords matched: casino"));
        reporter.record(&DispatchOutcome::simulated(
            "smtp.example.com:587",
            crate::transport::EnvelopeSummary {
                to: "test@y.com".to_string(),
                original_recipient: "a@x.com".to_string(),
                from: "noreply@example.com".to_string(),
                subject: "s".to_string(),
                attachments: Vec::new(),
            },
        ));

        let stats = reporter.summary();
        assert_eq!(stats.processed, 4);
        assert_eq!(stats.successful, 2);
        assert_eq!(stats.simulated, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.processed, stats.successful + stats.failed + stats.skipped);
    }

    #[tokio::test]
    async fn test_concurrent_recording() {
        let reporter = Arc::new(CampaignReporter::new());
        let mut handles = Vec::new();
        for i in 0..50 {
            let reporter = reporter.clone();
            handles.push(tokio::spawn(async move {
                if i % 2 == 0 {
                    reporter.record(&DispatchOutcome::success("e", "m"));
                } else {
                    reporter.record(&DispatchOutcome::error("x"));
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let stats = reporter.summary();
        assert_eq!(stats.processed, 50);
        assert_eq!(stats.successful, 25);
        assert_eq!(stats.failed, 25);
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(3_400)), "3s");
        assert_eq!(format_duration(Duration::from_secs(123)), "2m 3s");
        assert_eq!(format_duration(Duration::from_secs(3_723)), "1h 2m 3s");
    }

    #[test]
    fn test_summary_rates() {
        let reporter = CampaignReporter::new();
        for _ in 0..3 {
            reporter.record(&DispatchOutcome::success("e", "m"));
        }
        reporter.record(&DispatchOutcome::skipped("r"));

        let mut summary = reporter.finish(RunFacts {
            total: 4,
            concurrency: 2,
            cooling_periods: 1,
            ..RunFacts::default()
        });
        summary.duration = Duration::from_secs(120);

        assert_eq!(summary.success_rate(), 75.0);
        assert_eq!(summary.skip_rate(), 25.0);
        assert_eq!(summary.failure_rate(), 0.0);
        assert_eq!(summary.messages_per_minute(), 2.0);

        let table = summary.to_string();
        assert!(table.contains("75.00%"));
        assert!(table.contains("2m 0s"));
        assert!(!table.contains("Cancelled"));
    }

    #[test]
    fn test_empty_run_has_zero_rates() {
        let summary = CampaignReporter::new().finish(RunFacts::default());
        assert_eq!(summary.success_rate(), 0.0);
        assert_eq!(summary.statistics.processed, 0);
    }
}
