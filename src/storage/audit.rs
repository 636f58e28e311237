// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Audit logging for submission lifecycle and admin actions.
//!
//! Events are appended to a daily JSONL file. Events carry receipt codes and
//! principal ids only, never message content or key material.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{StorageError, StoragePaths, StorageResult};

/// Types of auditable events.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    // Intake
    SubmissionCreated,

    // Admin lifecycle
    SubmissionViewed,
    SubmissionUnviewed,
    SubmissionFlagged,
    SubmissionDeleted,
    SubmissionRestored,
    SubmissionPurged,
    PurgeFailed,

    // Admin reads
    SubmissionDecrypted,

    // Auth
    PermissionDenied,
}

/// An audit log entry.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuditEvent {
    /// Unique event ID.
    pub event_id: String,
    /// When the event occurred.
    pub timestamp: DateTime<Utc>,
    /// Type of event.
    pub event_type: AuditEventType,
    /// Principal who triggered the event (absent for anonymous intake).
    pub user_id: Option<String>,
    /// Receipt code of the affected submission.
    pub resource_id: Option<String>,
    /// Additional details as JSON.
    #[schema(value_type = Option<Object>)]
    pub details: Option<serde_json::Value>,
    /// Whether the operation succeeded.
    pub success: bool,
    /// Error message if operation failed.
    pub error: Option<String>,
}

impl AuditEvent {
    /// Create a new audit event.
    pub fn new(event_type: AuditEventType) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type,
            user_id: None,
            resource_id: None,
            details: None,
            success: true,
            error: None,
        }
    }

    /// Set the principal.
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Set the affected submission.
    pub fn with_resource(mut self, receipt_code: impl Into<String>) -> Self {
        self.resource_id = Some(receipt_code.into());
        self
    }

    /// Add details.
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Mark as failed with error message.
    pub fn failed(mut self, error: impl Into<String>) -> Self {
        self.success = false;
        self.error = Some(error.into());
        self
    }
}

/// Filter for audit queries.
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub event_type: Option<AuditEventType>,
    pub resource_id: Option<String>,
}

impl AuditFilter {
    fn matches(&self, event: &AuditEvent) -> bool {
        self.event_type.is_none_or(|t| t == event.event_type)
            && self
                .resource_id
                .as_deref()
                .is_none_or(|r| event.resource_id.as_deref() == Some(r))
    }
}

/// Append-only audit log.
#[derive(Debug, Clone)]
pub struct AuditLog {
    paths: StoragePaths,
    write_lock: Arc<Mutex<()>>,
}

impl AuditLog {
    pub fn new(paths: StoragePaths) -> Self {
        Self {
            paths,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Append an event to today's log file.
    pub fn log(&self, event: &AuditEvent) -> StorageResult<()> {
        let date = event.timestamp.format("%Y-%m-%d").to_string();
        let path = self.paths.audit_events_file(&date);

        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');

        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| StorageError::Task("audit log lock poisoned".to_string()))?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        file.write_all(&line)?;
        Ok(())
    }

    /// Append an event, logging instead of failing if the write fails.
    pub fn record(&self, event: AuditEvent) {
        if let Err(e) = self.log(&event) {
            tracing::warn!(
                event_type = ?event.event_type,
                error = %e,
                "Failed to write audit event"
            );
        }
    }

    /// Read audit events for a specific date.
    pub fn read_events(&self, date: &str) -> StorageResult<Vec<AuditEvent>> {
        let path = self.paths.audit_events_file(date);
        let content = fs::read_to_string(&path)?;

        let mut events = Vec::new();
        for line in content.lines() {
            if line.trim().is_empty() {
                continue;
            }
            events.push(serde_json::from_str(line)?);
        }
        Ok(events)
    }

    /// Read events for an inclusive date range. Missing days are skipped.
    pub fn read_events_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> StorageResult<Vec<AuditEvent>> {
        let mut all_events = Vec::new();
        let mut current = start;

        while current <= end {
            let date_str = current.format("%Y-%m-%d").to_string();
            match self.read_events(&date_str) {
                Ok(events) => all_events.extend(events),
                Err(StorageError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
            current = current
                .succ_opt()
                .ok_or_else(|| StorageError::InvalidReference("date overflow".to_string()))?;
        }

        Ok(all_events)
    }

    /// Events in a date range that match the filter.
    pub fn search(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        filter: &AuditFilter,
    ) -> StorageResult<Vec<AuditEvent>> {
        Ok(self
            .read_events_range(start, end)?
            .into_iter()
            .filter(|e| filter.matches(e))
            .collect())
    }
}

/// Helper macro for recording audit events.
#[macro_export]
macro_rules! audit_log {
    ($audit:expr, $event_type:expr, $user:expr, $receipt:expr) => {{
        let event = $crate::storage::AuditEvent::new($event_type)
            .with_user($user)
            .with_resource($receipt);
        $audit.record(event);
    }};
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, AuditLog) {
        let temp = TempDir::new().unwrap();
        let log = AuditLog::new(StoragePaths::new(temp.path()));
        (temp, log)
    }

    fn today() -> NaiveDate {
        Utc::now().date_naive()
    }

    #[test]
    fn create_audit_event() {
        let event = AuditEvent::new(AuditEventType::SubmissionViewed)
            .with_user("admin")
            .with_resource("CLOAKK-AAAA-BBBB-CCCC");

        assert_eq!(event.event_type, AuditEventType::SubmissionViewed);
        assert_eq!(event.user_id, Some("admin".to_string()));
        assert_eq!(event.resource_id, Some("CLOAKK-AAAA-BBBB-CCCC".to_string()));
        assert!(event.success);
    }

    #[test]
    fn failed_event() {
        let event = AuditEvent::new(AuditEventType::PurgeFailed)
            .with_user("admin")
            .failed("blob store unavailable");

        assert!(!event.success);
        assert_eq!(event.error, Some("blob store unavailable".to_string()));
    }

    #[test]
    fn log_and_read_events() {
        let (_temp, log) = setup();

        log.log(&AuditEvent::new(AuditEventType::SubmissionCreated).with_resource("R1"))
            .unwrap();
        log.log(
            &AuditEvent::new(AuditEventType::SubmissionViewed)
                .with_user("admin")
                .with_resource("R1"),
        )
        .unwrap();

        let date = today().format("%Y-%m-%d").to_string();
        let events = log.read_events(&date).unwrap();

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, AuditEventType::SubmissionCreated);
        assert_eq!(events[1].event_type, AuditEventType::SubmissionViewed);
    }

    #[test]
    fn search_filters_by_type_and_receipt() {
        let (_temp, log) = setup();

        log.record(AuditEvent::new(AuditEventType::SubmissionCreated).with_resource("R1"));
        log.record(AuditEvent::new(AuditEventType::SubmissionCreated).with_resource("R2"));
        log.record(
            AuditEvent::new(AuditEventType::SubmissionDeleted)
                .with_user("admin")
                .with_resource("R1"),
        );

        let by_receipt = log
            .search(
                today(),
                today(),
                &AuditFilter {
                    event_type: None,
                    resource_id: Some("R1".to_string()),
                },
            )
            .unwrap();
        assert_eq!(by_receipt.len(), 2);

        let by_type = log
            .search(
                today(),
                today(),
                &AuditFilter {
                    event_type: Some(AuditEventType::SubmissionCreated),
                    resource_id: None,
                },
            )
            .unwrap();
        assert_eq!(by_type.len(), 2);
    }

    #[test]
    fn range_skips_missing_days() {
        let (_temp, log) = setup();
        log.record(AuditEvent::new(AuditEventType::SubmissionCreated));

        let start = today() - chrono::Duration::days(3);
        let events = log.read_events_range(start, today()).unwrap();
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn event_type_serializes_snake_case() {
        let json = serde_json::to_string(&AuditEventType::SubmissionPurged).unwrap();
        assert_eq!(json, "\"submission_purged\"");
    }
}
