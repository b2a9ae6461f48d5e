//! Stream lifecycle: `start`, `feed_frame`, `stop`.
//!
//! Each stream owns its detection source, correlation engine, deduplicator and
//! sink handoff; nothing is shared between streams. A stream processes one frame
//! at a time (detect -> correlate -> dedup -> emit). Different streams may be
//! fed concurrently from different threads.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

use crate::annotate::annotate;
use crate::correlate::{CorrelationConfig, CorrelationEngine, Violation};
use crate::dedup::{DedupConfig, Deduplicator};
use crate::detect::DetectionSource;
use crate::frame::Frame;
use crate::sink::{Handoff, HandoffReport};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StreamError {
    #[error("unknown stream '{0}'")]
    UnknownStream(String),
    #[error("stream '{0}' is already running")]
    AlreadyRunning(String),
    #[error("stream '{0}' was stopped")]
    Stopped(String),
    #[error("stream '{0}' state poisoned by a panic")]
    Poisoned(String),
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct StreamConfig {
    pub correlation: CorrelationConfig,
    pub dedup: DedupConfig,
}

/// What happened to one frame.
#[derive(Clone, Debug, Default)]
pub struct FrameOutcome {
    pub frame_seq: u64,
    /// Violations produced by the correlation engine before dedup.
    pub candidates: usize,
    pub admitted: Vec<Violation>,
    pub suppressed: usize,
    pub skipped_invalid: usize,
    /// The detection source failed; the frame was skipped.
    pub source_unavailable: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StreamStats {
    pub frames: u64,
    pub frames_unavailable: u64,
    pub candidates: u64,
    pub admitted: u64,
    pub suppressed: u64,
    pub skipped_invalid: u64,
    /// Filled in by `stop` once the sink has drained.
    pub sink: Option<HandoffReport>,
}

struct Stream {
    id: String,
    source: Box<dyn DetectionSource>,
    engine: CorrelationEngine,
    dedup: Deduplicator,
    handoff: Option<Handoff>,
    stats: StreamStats,
}

impl Stream {
    fn process(&mut self, frame: Frame) -> FrameOutcome {
        self.stats.frames += 1;

        let mut outcome = FrameOutcome {
            frame_seq: frame.seq,
            ..FrameOutcome::default()
        };

        let detections = match self.source.detect(&frame) {
            Ok(d) => d,
            Err(e) => {
                log::warn!("stream {}: frame {} skipped: {}", self.id, frame.seq, e);
                self.stats.frames_unavailable += 1;
                outcome.source_unavailable = true;
                return outcome;
            }
        };

        let correlation = self.engine.correlate(&frame, &detections);
        outcome.candidates = correlation.candidates.len();
        outcome.skipped_invalid = correlation.skipped_invalid;

        for violation in correlation.candidates {
            if self.dedup.admit(&violation) {
                outcome.admitted.push(violation);
            } else {
                log::debug!(
                    "stream {}: frame {} duplicate violation suppressed",
                    self.id,
                    frame.seq
                );
                outcome.suppressed += 1;
            }
        }

        if !outcome.admitted.is_empty() {
            let evidence = annotate(frame.image(), &detections, &outcome.admitted);
            for violation in &outcome.admitted {
                log::info!(
                    "stream {}: VIOLATION frame={} person={:?} fine={}",
                    self.id,
                    violation.frame_seq,
                    <[f32; 4]>::from(violation.person_box),
                    violation.fine_amount
                );
                if let Some(handoff) = self.handoff.as_mut() {
                    handoff.submit(&self.id, violation.clone(), evidence.clone());
                }
            }
        }

        self.stats.candidates += outcome.candidates as u64;
        self.stats.admitted += outcome.admitted.len() as u64;
        self.stats.suppressed += outcome.suppressed as u64;
        self.stats.skipped_invalid += outcome.skipped_invalid as u64;
        outcome
    }

    fn skip(&mut self, reason: &str) {
        log::warn!("stream {}: frame skipped: {}", self.id, reason);
        self.stats.frames += 1;
        self.stats.frames_unavailable += 1;
    }

    fn close(&mut self) -> StreamStats {
        if let Some(handoff) = self.handoff.take() {
            match handoff.close() {
                Ok(report) => self.stats.sink = Some(report),
                Err(e) => log::error!("stream {}: sink shutdown failed: {}", self.id, e),
            }
        }
        self.stats
    }
}

#[derive(Clone)]
struct StreamSlot {
    cancelled: Arc<AtomicBool>,
    stream: Arc<Mutex<Stream>>,
}

/// Hosts independent streams keyed by id.
#[derive(Default)]
pub struct StreamHost {
    streams: Mutex<HashMap<String, StreamSlot>>,
}

impl StreamHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(
        &self,
        stream_id: &str,
        config: StreamConfig,
        mut source: Box<dyn DetectionSource>,
        handoff: Handoff,
    ) -> Result<(), StreamError> {
        let mut streams = self.streams_guard()?;
        if streams.contains_key(stream_id) {
            return Err(StreamError::AlreadyRunning(stream_id.to_string()));
        }
        if let Err(e) = source.warm_up() {
            log::warn!("stream {}: source warm-up failed: {}", stream_id, e);
        }
        let stream = Stream {
            id: stream_id.to_string(),
            source,
            engine: CorrelationEngine::new(config.correlation),
            dedup: Deduplicator::new(config.dedup),
            handoff: Some(handoff),
            stats: StreamStats::default(),
        };
        log::info!(
            "stream {} started (source={})",
            stream_id,
            stream.source.name()
        );
        streams.insert(
            stream_id.to_string(),
            StreamSlot {
                cancelled: Arc::new(AtomicBool::new(false)),
                stream: Arc::new(Mutex::new(stream)),
            },
        );
        Ok(())
    }

    /// Process one frame on a running stream.
    ///
    /// Detection-source failures and sink failures are absorbed into the
    /// outcome and logs; only lifecycle problems surface as errors.
    pub fn feed_frame(&self, stream_id: &str, frame: Frame) -> Result<FrameOutcome, StreamError> {
        let slot = self.lookup(stream_id)?;
        let mut guard = slot
            .stream
            .lock()
            .map_err(|_| StreamError::Poisoned(stream_id.to_string()))?;
        // Cancellation is only observed between frames, never mid-correlation.
        if slot.cancelled.load(Ordering::SeqCst) {
            return Err(StreamError::Stopped(stream_id.to_string()));
        }
        Ok(guard.process(frame))
    }

    /// Account for a frame the host could not produce (decode or read error).
    ///
    /// Counted like a detection-source failure, so `frames_unavailable` covers
    /// every frame lost before correlation.
    pub fn note_unavailable(&self, stream_id: &str, reason: &str) -> Result<(), StreamError> {
        let slot = self.lookup(stream_id)?;
        let mut guard = slot
            .stream
            .lock()
            .map_err(|_| StreamError::Poisoned(stream_id.to_string()))?;
        if slot.cancelled.load(Ordering::SeqCst) {
            return Err(StreamError::Stopped(stream_id.to_string()));
        }
        guard.skip(reason);
        Ok(())
    }

    /// Stop a stream: cancel, wait for any in-flight frame, drain the sink.
    pub fn stop(&self, stream_id: &str) -> Result<StreamStats, StreamError> {
        let slot = self
            .streams_guard()?
            .remove(stream_id)
            .ok_or_else(|| StreamError::UnknownStream(stream_id.to_string()))?;
        // Flag first so feeders already queued on the lock bail out.
        slot.cancelled.store(true, Ordering::SeqCst);

        let mut guard = slot
            .stream
            .lock()
            .map_err(|_| StreamError::Poisoned(stream_id.to_string()))?;
        let stats = guard.close();
        log::info!(
            "stream {} stopped: frames={} admitted={} suppressed={} unavailable={}",
            stream_id,
            stats.frames,
            stats.admitted,
            stats.suppressed,
            stats.frames_unavailable
        );
        Ok(stats)
    }

    pub fn stats(&self, stream_id: &str) -> Result<StreamStats, StreamError> {
        let slot = self.lookup(stream_id)?;
        let guard = slot
            .stream
            .lock()
            .map_err(|_| StreamError::Poisoned(stream_id.to_string()))?;
        Ok(guard.stats)
    }

    pub fn stream_ids(&self) -> Vec<String> {
        match self.streams.lock() {
            Ok(streams) => streams.keys().cloned().collect(),
            Err(_) => Vec::new(),
        }
    }

    fn lookup(&self, stream_id: &str) -> Result<StreamSlot, StreamError> {
        self.streams_guard()?
            .get(stream_id)
            .cloned()
            .ok_or_else(|| StreamError::UnknownStream(stream_id.to_string()))
    }

    fn streams_guard(
        &self,
    ) -> Result<MutexGuard<'_, HashMap<String, StreamSlot>>, StreamError> {
        self.streams
            .lock()
            .map_err(|_| StreamError::Poisoned("<host>".to_string()))
    }
}
