//! Append-only audit trail of task outcomes

use super::outcome::OutcomeStatus;
use crate::transport::EnvelopeSummary;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 1024;

/// One recorded outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditRecord {
    pub sequence_index: usize,
    /// The recipient the task was for
    pub recipient_email: String,
    /// Where the message went; the override address in test mode
    pub delivered_to: String,
    pub from_address: Option<String>,
    pub template_name: Option<String>,
    /// Subject as sent, including any test tag
    pub subject: Option<String>,
    pub endpoint_used: Option<String>,
    pub status: OutcomeStatus,
    /// Error cause, or skip reason for skipped tasks
    pub error: Option<String>,
    pub message_id: Option<String>,
    /// The would-be envelope of a simulated send
    #[serde(skip_serializing_if = "Option::is_none")]
    pub envelope: Option<EnvelopeSummary>,
    pub timestamp: DateTime<Utc>,
}

impl AuditRecord {
    /// Whether delivery was redirected away from the recipient
    pub fn is_redirected(&self) -> bool {
        self.delivered_to != self.recipient_email
    }
}

/// Destination for audit records
pub trait AuditSink: Send + Sync {
    fn append(&self, record: AuditRecord);
}

/// In-memory trail with a broadcast feed for progress displays
#[derive(Debug)]
pub struct AuditTrail {
    records: Mutex<Vec<AuditRecord>>,
    events: broadcast::Sender<AuditRecord>,
}

impl AuditTrail {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            records: Mutex::new(Vec::new()),
            events,
        }
    }

    /// Receive records appended from now on
    pub fn subscribe(&self) -> broadcast::Receiver<AuditRecord> {
        self.events.subscribe()
    }

    /// Snapshot in append order
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write the trail as JSON lines
    pub fn write_jsonl(&self, path: &Path) -> mailcast_common::Result<()> {
        let records = self.records();
        let mut writer = BufWriter::new(File::create(path)?);
        for record in &records {
            serde_json::to_writer(&mut writer, record).map_err(io::Error::from)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        Ok(())
    }
}

impl Default for AuditTrail {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditSink for AuditTrail {
    fn append(&self, record: AuditRecord) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());
        // No subscribers is fine
        let _ = self.events.send(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn record(index: usize, status: OutcomeStatus) -> AuditRecord {
        AuditRecord {
            sequence_index: index,
            recipient_email: format!("r{}@x.com", index),
            delivered_to: "test@y.com".to_string(),
            from_address: Some("noreply@example.com".to_string()),
            template_name: Some("welcome".to_string()),
            subject: Some("Hello".to_string()),
            endpoint_used: None,
            status,
            error: None,
            message_id: None,
            envelope: None,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_append_and_subscribe() {
        let trail = AuditTrail::new();
        let mut events = trail.subscribe();

        trail.append(record(0, OutcomeStatus::SimulatedTestSend));
        trail.append(record(1, OutcomeStatus::Skipped));

        assert_eq!(events.recv().await.unwrap().sequence_index, 0);
        assert_eq!(events.recv().await.unwrap().status, OutcomeStatus::Skipped);
        assert_eq!(trail.len(), 2);
        assert!(trail.records()[0].is_redirected());
    }

    #[test]
    fn test_append_without_subscribers() {
        let trail = AuditTrail::new();
        trail.append(record(0, OutcomeStatus::Success));
        assert!(!trail.is_empty());
    }

    #[test]
    fn test_write_jsonl() {
        let trail = AuditTrail::new();
        trail.append(record(0, OutcomeStatus::Success));
        trail.append(AuditRecord {
            envelope: Some(EnvelopeSummary {
                to: "test@y.com".to_string(),
                original_recipient: "r1@x.com".to_string(),
                from: "noreply@example.com".to_string(),
                subject: "[TEST] Hello (r1@x.com)".to_string(),
                attachments: Vec::new(),
            }),
            ..record(1, OutcomeStatus::SimulatedTestSend)
        });

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        trail.write_jsonl(&path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["recipient_email"], "r0@x.com");
        assert!(first.get("envelope").is_none());

        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["status"], "simulated_test_send");
        assert_eq!(second["envelope"]["to"], "test@y.com");
        assert_eq!(second["envelope"]["original_recipient"], "r1@x.com");
    }
}
