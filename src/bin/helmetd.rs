//! helmetd - helmet violation daemon
//!
//! This daemon:
//! 1. Reads frames from the configured frames directory at `target_fps`
//! 2. Looks up recorded detections for each frame
//! 3. Correlates, deduplicates and records violations on a background sink
//! 4. Stops cleanly on Ctrl-C or when the frames run out

use anyhow::Result;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use helmet_witness::detect::FixtureSource;
use helmet_witness::ingest::ImageDirSource;
use helmet_witness::sink::{EvidenceStore, SinkWorker};
use helmet_witness::{Handoff, HelmetConfig, RecordingSink, SqliteViolationStore, StreamHost};

const STREAM_ID: &str = "uploads";
const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(5);

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cfg = HelmetConfig::load()?;
    log::info!(
        "helmetd {} db={} evidence={} frames={}",
        env!("CARGO_PKG_VERSION"),
        cfg.db_path,
        cfg.evidence_dir.display(),
        cfg.ingest.frames_dir.display()
    );

    let mut frames = ImageDirSource::open(&cfg.ingest.frames_dir)?;
    let detections = FixtureSource::open(&cfg.ingest.detections_path)?;
    log::info!(
        "loaded detections for {} frames from {}",
        detections.frame_count(),
        cfg.ingest.detections_path.display()
    );

    let store = SqliteViolationStore::open(&cfg.db_path)?;
    let sink = RecordingSink::new(EvidenceStore::new(&cfg.evidence_dir)?, Box::new(store))
        .with_notifier(cfg.notify.build_notifier()?)
        .with_retry(cfg.notify.retry)
        .with_recipient(cfg.notify.recipient.clone())
        .with_stream_id(STREAM_ID);
    let handoff = Handoff::Background(SinkWorker::spawn(STREAM_ID, sink)?);

    let host = StreamHost::new();
    host.start(STREAM_ID, cfg.stream_config(), Box::new(detections), handoff)?;

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })?;

    let frame_interval = Duration::from_secs(1) / cfg.ingest.target_fps;
    let mut last_health_log = Instant::now();

    loop {
        if rx.try_recv().is_ok() {
            log::info!("shutdown signal received, stopping stream {}", STREAM_ID);
            break;
        }
        let tick = Instant::now();

        match frames.next_frame() {
            Ok(Some(frame)) => {
                let outcome = host.feed_frame(STREAM_ID, frame)?;
                if outcome.suppressed > 0 {
                    log::debug!(
                        "frame {}: {} duplicate violations suppressed",
                        outcome.frame_seq,
                        outcome.suppressed
                    );
                }
            }
            Ok(None) => {
                log::info!("frames directory exhausted");
                break;
            }
            Err(e) => host.note_unavailable(STREAM_ID, &format!("{:#}", e))?,
        }

        if last_health_log.elapsed() >= HEALTH_LOG_INTERVAL {
            let ingest = frames.stats();
            let stream = host.stats(STREAM_ID)?;
            log::info!(
                "health: frames={}/{} candidates={} admitted={} suppressed={} unavailable={} dir={}",
                ingest.frames_read,
                ingest.frames_total,
                stream.candidates,
                stream.admitted,
                stream.suppressed,
                stream.frames_unavailable,
                ingest.dir
            );
            last_health_log = Instant::now();
        }

        if let Some(rest) = frame_interval.checked_sub(tick.elapsed()) {
            std::thread::sleep(rest);
        }
    }

    let stats = host.stop(STREAM_ID)?;
    let sink = stats.sink.unwrap_or_default();
    log::info!(
        "helmetd done: frames={} unavailable={} candidates={} admitted={} recorded={} sink_failures={} sink_dropped={}",
        stats.frames,
        stats.frames_unavailable,
        stats.candidates,
        stats.admitted,
        sink.recorded,
        sink.failed,
        sink.dropped
    );
    Ok(())
}
