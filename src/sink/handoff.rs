//! Hands admitted violations to a sink, inline or on a background worker.
//!
//! Every accepted violation gets exactly one `record` attempt. Sink errors are
//! logged here and go no further. The background queue is bounded; when a
//! stalled sink lets it fill up, new violations are dropped and counted.

use anyhow::{anyhow, Result};
use image::RgbImage;
use std::sync::mpsc::{self, SyncSender, TrySendError};
use std::thread::JoinHandle;

use crate::correlate::Violation;
use crate::sink::{EvidenceSink, RecordId, SinkError};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HandoffReport {
    pub recorded: u64,
    pub failed: u64,
    /// Never handed to the sink because the worker queue was full.
    pub dropped: u64,
}

impl HandoffReport {
    fn absorb(
        &mut self,
        stream: &str,
        violation: &Violation,
        result: std::result::Result<RecordId, SinkError>,
    ) {
        match result {
            Ok(id) => {
                self.recorded += 1;
                log::debug!(
                    "stream {}: frame {} violation stored as {}",
                    stream,
                    violation.frame_seq,
                    id
                );
            }
            Err(e) => {
                self.failed += 1;
                log::error!(
                    "stream {}: frame {} violation sink failed: {}",
                    stream,
                    violation.frame_seq,
                    e
                );
            }
        }
    }
}

type Job = (Violation, RgbImage);

pub const DEFAULT_SINK_QUEUE_CAPACITY: usize = 64;

/// Owns a sink on a dedicated thread. Submitting never blocks on delivery.
pub struct SinkWorker {
    tx: Option<SyncSender<Job>>,
    join: Option<JoinHandle<HandoffReport>>,
    dropped: u64,
}

impl SinkWorker {
    pub fn spawn<S: EvidenceSink + 'static>(stream_id: &str, sink: S) -> Result<Self> {
        Self::spawn_bounded(stream_id, sink, DEFAULT_SINK_QUEUE_CAPACITY)
    }

    /// Worker whose queue holds at most `capacity` pending violations.
    pub fn spawn_bounded<S: EvidenceSink + 'static>(
        stream_id: &str,
        mut sink: S,
        capacity: usize,
    ) -> Result<Self> {
        if capacity == 0 {
            return Err(anyhow!("sink queue capacity must be greater than zero"));
        }
        let (tx, rx) = mpsc::sync_channel::<Job>(capacity);
        let stream = stream_id.to_string();
        let join = std::thread::Builder::new()
            .name(format!("sink-{}", stream_id))
            .spawn(move || {
                let mut report = HandoffReport::default();
                // Ends once every sender is dropped and the queue is drained.
                for (violation, image) in rx {
                    let result = sink.record(&violation, &image);
                    report.absorb(&stream, &violation, result);
                }
                report
            })
            .map_err(|e| anyhow!("failed to spawn sink worker: {}", e))?;
        Ok(Self {
            tx: Some(tx),
            join: Some(join),
            dropped: 0,
        })
    }

    fn submit(&mut self, violation: Violation, image: RgbImage) -> Result<()> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| anyhow!("sink worker already shut down"))?;
        let frame_seq = violation.frame_seq;
        match tx.try_send((violation, image)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.dropped += 1;
                Err(anyhow!(
                    "sink queue full, frame {} violation dropped ({} dropped so far)",
                    frame_seq,
                    self.dropped
                ))
            }
            Err(TrySendError::Disconnected(_)) => {
                self.dropped += 1;
                Err(anyhow!("sink worker thread exited"))
            }
        }
    }

    /// Drain queued violations and join the worker.
    pub fn shutdown(mut self) -> Result<HandoffReport> {
        self.finish()
    }

    fn finish(&mut self) -> Result<HandoffReport> {
        self.tx.take();
        let mut report = match self.join.take() {
            Some(join) => join.join().map_err(|_| anyhow!("sink worker panicked"))?,
            None => HandoffReport::default(),
        };
        report.dropped = std::mem::take(&mut self.dropped);
        Ok(report)
    }
}

impl Drop for SinkWorker {
    fn drop(&mut self) {
        if let Err(e) = self.finish() {
            log::error!("{}", e);
        }
    }
}

pub enum Handoff {
    /// Calls the sink on the frame-processing thread.
    Inline {
        sink: Box<dyn EvidenceSink>,
        report: HandoffReport,
    },
    Background(SinkWorker),
}

impl Handoff {
    pub fn inline<S: EvidenceSink + 'static>(sink: S) -> Self {
        Handoff::Inline {
            sink: Box::new(sink),
            report: HandoffReport::default(),
        }
    }

    pub fn submit(&mut self, stream: &str, violation: Violation, image: RgbImage) {
        match self {
            Handoff::Inline { sink, report } => {
                let result = sink.record(&violation, &image);
                report.absorb(stream, &violation, result);
            }
            Handoff::Background(worker) => {
                if let Err(e) = worker.submit(violation, image) {
                    log::error!("stream {}: violation handoff failed: {}", stream, e);
                }
            }
        }
    }

    /// Flush pending work. For a background worker this joins the thread.
    pub fn close(self) -> Result<HandoffReport> {
        match self {
            Handoff::Inline { report, .. } => Ok(report),
            Handoff::Background(worker) => worker.shutdown(),
        }
    }
}
