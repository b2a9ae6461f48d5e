//! Evidence & notification sink.
//!
//! The engine hands each admitted violation, with its annotated frame, to an
//! `EvidenceSink` exactly once. Failures are reported as `SinkError` and never
//! abort frame processing; the violation still counts as detected.

pub mod evidence;
pub mod handoff;
pub mod notify;

use image::RgbImage;
use std::fmt;
use thiserror::Error;

use crate::correlate::Violation;
use crate::frame::epoch_secs;
use crate::storage::{ViolationRecord, ViolationStore};

pub use evidence::EvidenceStore;
pub use handoff::{Handoff, HandoffReport, SinkWorker};
#[cfg(feature = "notify-webhook")]
pub use notify::WebhookNotifier;
pub use notify::{AlertMessage, LogNotifier, Notifier, RetryPolicy};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RecordId(pub i64);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("evidence image write failed: {0:#}")]
    Evidence(anyhow::Error),
    #[error("violation record write failed: {0:#}")]
    Storage(anyhow::Error),
    /// The record exists; only the alert failed.
    #[error("notification for record {record_id} failed: {reason:#}")]
    Notify {
        record_id: RecordId,
        reason: anyhow::Error,
    },
}

pub trait EvidenceSink: Send {
    fn record(&mut self, violation: &Violation, annotated: &RgbImage) -> Result<RecordId, SinkError>;
}

/// Persist image, then record row, then notify (with retry).
pub struct RecordingSink {
    evidence: EvidenceStore,
    store: Box<dyn ViolationStore>,
    notifier: Box<dyn Notifier>,
    retry: RetryPolicy,
    recipient: Option<String>,
    stream_id: String,
}

impl RecordingSink {
    pub fn new(evidence: EvidenceStore, store: Box<dyn ViolationStore>) -> Self {
        Self {
            evidence,
            store,
            notifier: Box::new(LogNotifier),
            retry: RetryPolicy::default(),
            recipient: None,
            stream_id: "default".to_string(),
        }
    }

    pub fn with_notifier(mut self, notifier: Box<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_recipient(mut self, recipient: Option<String>) -> Self {
        self.recipient = recipient;
        self
    }

    pub fn with_stream_id(mut self, stream_id: &str) -> Self {
        self.stream_id = stream_id.to_string();
        self
    }

    pub fn store_mut(&mut self) -> &mut dyn ViolationStore {
        self.store.as_mut()
    }
}

impl EvidenceSink for RecordingSink {
    fn record(&mut self, violation: &Violation, annotated: &RgbImage) -> Result<RecordId, SinkError> {
        let violation_image = self
            .evidence
            .write(violation, annotated)
            .map_err(SinkError::Evidence)?;

        let record = ViolationRecord {
            image_name: violation.frame_name.clone(),
            original_image: violation.frame_name.clone(),
            violation_image: violation_image.clone(),
            fine_amount: violation.fine_amount,
            timestamp: epoch_secs(violation.detected_at) as i64,
            stream_id: self.stream_id.clone(),
            person_box: violation.person_box,
            vehicle_box: violation.vehicle_box,
            no_helmet_box: violation.no_helmet_box,
        };
        let record_id = RecordId(self.store.insert(&record).map_err(SinkError::Storage)?);

        let alert = AlertMessage {
            record_id: record_id.0,
            recipient: self.recipient.clone(),
            stream_id: self.stream_id.clone(),
            timestamp: record.timestamp,
            fine_amount: record.fine_amount,
            image: violation_image,
        };
        let notifier = &mut self.notifier;
        let what = format!("{} notification", notifier.name());
        self.retry
            .run(&what, || notifier.notify(&alert))
            .map_err(|reason| SinkError::Notify { record_id, reason })?;

        Ok(record_id)
    }
}
