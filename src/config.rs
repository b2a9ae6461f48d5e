use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::correlate::{
    CorrelationConfig, VehicleAnchor, DEFAULT_CONFIDENCE_FLOOR, DEFAULT_CONFIDENCE_THRESHOLD,
    DEFAULT_FINE_AMOUNT,
};
use crate::dedup::{
    DedupConfig, DedupWindow, DEFAULT_DEDUP_DISTANCE_PX, DEFAULT_DEDUP_MAX_ENTRIES,
    DEFAULT_DEDUP_WINDOW,
};
use crate::sink::evidence::DEFAULT_EVIDENCE_DIR;
use crate::sink::{LogNotifier, Notifier, RetryPolicy};
use crate::stream::StreamConfig;

const DEFAULT_DB_PATH: &str = "helmet.db";
const DEFAULT_FRAMES_DIR: &str = "static/uploads";
const DEFAULT_DETECTIONS_PATH: &str = "detections.jsonl";
const DEFAULT_TARGET_FPS: u32 = 10;
const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_BACKOFF_MS: u64 = 500;

#[derive(Debug, Deserialize, Default)]
struct HelmetConfigFile {
    db_path: Option<String>,
    evidence_dir: Option<PathBuf>,
    correlation: Option<CorrelationConfigFile>,
    dedup: Option<DedupConfigFile>,
    notify: Option<NotifyConfigFile>,
    ingest: Option<IngestConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct CorrelationConfigFile {
    confidence_threshold: Option<f32>,
    confidence_floor: Option<f32>,
    fine_amount: Option<u32>,
    /// "center" or "center_then_footpoint".
    vehicle_anchor: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct DedupConfigFile {
    distance_px: Option<f32>,
    window_secs: Option<f64>,
    window_frames: Option<u64>,
    max_entries: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct NotifyConfigFile {
    webhook_url: Option<String>,
    retry_attempts: Option<u32>,
    retry_backoff_ms: Option<u64>,
    recipient: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct IngestConfigFile {
    frames_dir: Option<PathBuf>,
    detections_path: Option<PathBuf>,
    target_fps: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct HelmetConfig {
    pub db_path: String,
    pub evidence_dir: PathBuf,
    pub correlation: CorrelationConfig,
    pub dedup: DedupConfig,
    pub notify: NotifySettings,
    pub ingest: IngestSettings,
}

#[derive(Debug, Clone)]
pub struct NotifySettings {
    pub webhook_url: Option<String>,
    pub retry: RetryPolicy,
    pub recipient: Option<String>,
}

#[derive(Debug, Clone)]
pub struct IngestSettings {
    pub frames_dir: PathBuf,
    pub detections_path: PathBuf,
    pub target_fps: u32,
}

impl HelmetConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("HELMET_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn stream_config(&self) -> StreamConfig {
        StreamConfig {
            correlation: self.correlation.clone(),
            dedup: self.dedup.clone(),
        }
    }

    fn from_file(file: HelmetConfigFile) -> Result<Self> {
        let db_path = file.db_path.unwrap_or_else(|| DEFAULT_DB_PATH.to_string());
        let evidence_dir = file
            .evidence_dir
            .unwrap_or_else(|| PathBuf::from(DEFAULT_EVIDENCE_DIR));

        let corr = file.correlation.unwrap_or_default();
        let vehicle_anchor = match corr.vehicle_anchor.as_deref() {
            None => CorrelationConfig::default().vehicle_anchor,
            Some(raw) => parse_anchor(raw)?,
        };
        let correlation = CorrelationConfig {
            confidence_threshold: corr
                .confidence_threshold
                .unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD),
            confidence_floor: corr.confidence_floor.unwrap_or(DEFAULT_CONFIDENCE_FLOOR),
            fine_amount: corr.fine_amount.unwrap_or(DEFAULT_FINE_AMOUNT),
            vehicle_anchor,
        };

        let dd = file.dedup.unwrap_or_default();
        let window = match (dd.window_frames, dd.window_secs) {
            (Some(_), Some(_)) => {
                return Err(anyhow!(
                    "dedup.window_frames and dedup.window_secs are mutually exclusive"
                ));
            }
            (Some(frames), None) => DedupWindow::Frames(frames),
            (None, Some(secs)) => DedupWindow::Time(secs_to_duration(secs, "dedup.window_secs")?),
            (None, None) => DedupWindow::Time(DEFAULT_DEDUP_WINDOW),
        };
        let dedup = DedupConfig {
            distance_px: dd.distance_px.unwrap_or(DEFAULT_DEDUP_DISTANCE_PX),
            window,
            max_entries: dd.max_entries.unwrap_or(DEFAULT_DEDUP_MAX_ENTRIES),
        };

        let nt = file.notify.unwrap_or_default();
        let notify = NotifySettings {
            webhook_url: nt.webhook_url,
            retry: RetryPolicy {
                attempts: nt.retry_attempts.unwrap_or(DEFAULT_RETRY_ATTEMPTS),
                backoff: Duration::from_millis(
                    nt.retry_backoff_ms.unwrap_or(DEFAULT_RETRY_BACKOFF_MS),
                ),
            },
            recipient: nt.recipient,
        };

        let ig = file.ingest.unwrap_or_default();
        let ingest = IngestSettings {
            frames_dir: ig
                .frames_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_FRAMES_DIR)),
            detections_path: ig
                .detections_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DETECTIONS_PATH)),
            target_fps: ig.target_fps.unwrap_or(DEFAULT_TARGET_FPS),
        };

        Ok(Self {
            db_path,
            evidence_dir,
            correlation,
            dedup,
            notify,
            ingest,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(path) = env_nonempty("HELMET_DB_PATH") {
            self.db_path = path;
        }
        if let Some(dir) = env_nonempty("HELMET_EVIDENCE_DIR") {
            self.evidence_dir = PathBuf::from(dir);
        }
        if let Some(raw) = env_nonempty("HELMET_CONFIDENCE_THRESHOLD") {
            self.correlation.confidence_threshold = raw
                .parse()
                .map_err(|_| anyhow!("HELMET_CONFIDENCE_THRESHOLD must be a number"))?;
        }
        if let Some(raw) = env_nonempty("HELMET_FINE_AMOUNT") {
            self.correlation.fine_amount = raw
                .parse()
                .map_err(|_| anyhow!("HELMET_FINE_AMOUNT must be a non-negative integer"))?;
        }
        if let Some(raw) = env_nonempty("HELMET_DEDUP_DISTANCE_PX") {
            self.dedup.distance_px = raw
                .parse()
                .map_err(|_| anyhow!("HELMET_DEDUP_DISTANCE_PX must be a number"))?;
        }
        if let Some(raw) = env_nonempty("HELMET_DEDUP_WINDOW_SECS") {
            if let DedupWindow::Frames(_) = self.dedup.window {
                return Err(anyhow!(
                    "HELMET_DEDUP_WINDOW_SECS conflicts with dedup.window_frames in the config file"
                ));
            }
            let secs: f64 = raw
                .parse()
                .map_err(|_| anyhow!("HELMET_DEDUP_WINDOW_SECS must be a number of seconds"))?;
            self.dedup.window = DedupWindow::Time(secs_to_duration(secs, "HELMET_DEDUP_WINDOW_SECS")?);
        }
        if let Some(url) = env_nonempty("HELMET_WEBHOOK_URL") {
            self.notify.webhook_url = Some(url);
        }
        if let Some(email) = env_nonempty("ADMIN_EMAIL") {
            self.notify.recipient = Some(email);
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        let c = &self.correlation;
        if !(0.0..=1.0).contains(&c.confidence_threshold) {
            return Err(anyhow!("confidence_threshold must be within [0, 1]"));
        }
        if !(0.0..=1.0).contains(&c.confidence_floor) {
            return Err(anyhow!("confidence_floor must be within [0, 1]"));
        }
        if self.dedup.distance_px.is_nan() || self.dedup.distance_px < 0.0 {
            return Err(anyhow!("dedup distance_px must be non-negative"));
        }
        match self.dedup.window {
            DedupWindow::Time(window) if window.is_zero() => {
                return Err(anyhow!("dedup window must be greater than zero"));
            }
            DedupWindow::Frames(0) => {
                return Err(anyhow!("dedup window_frames must be greater than zero"));
            }
            _ => {}
        }
        if self.dedup.max_entries == 0 {
            return Err(anyhow!("dedup max_entries must be greater than zero"));
        }
        if self.ingest.target_fps == 0 {
            return Err(anyhow!("ingest target_fps must be greater than zero"));
        }
        Ok(())
    }
}

impl NotifySettings {
    /// Webhook when a URL is configured, otherwise alerts go to the log.
    pub fn build_notifier(&self) -> Result<Box<dyn Notifier>> {
        match self.webhook_url.as_deref() {
            None => Ok(Box::new(LogNotifier)),
            Some(url) => {
                #[cfg(feature = "notify-webhook")]
                {
                    Ok(Box::new(crate::sink::WebhookNotifier::new(url)?))
                }
                #[cfg(not(feature = "notify-webhook"))]
                {
                    Err(anyhow!(
                        "webhook notifications to {} require the notify-webhook feature",
                        url
                    ))
                }
            }
        }
    }
}

fn parse_anchor(raw: &str) -> Result<VehicleAnchor> {
    match raw.trim().to_lowercase().as_str() {
        "center" => Ok(VehicleAnchor::Center),
        "center_then_footpoint" => Ok(VehicleAnchor::CenterThenFootpoint),
        other => Err(anyhow!(
            "correlation.vehicle_anchor must be 'center' or 'center_then_footpoint', got '{}'",
            other
        )),
    }
}

fn secs_to_duration(secs: f64, what: &str) -> Result<Duration> {
    Duration::try_from_secs_f64(secs)
        .map_err(|_| anyhow!("{} must be a non-negative number of seconds", what))
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn read_config_file(path: &Path) -> Result<HelmetConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_engine_defaults() {
        let cfg = HelmetConfig::from_file(HelmetConfigFile::default()).unwrap();
        assert_eq!(cfg.correlation, CorrelationConfig::default());
        assert_eq!(cfg.dedup, DedupConfig::default());
        assert_eq!(cfg.db_path, DEFAULT_DB_PATH);
        assert_eq!(cfg.notify.retry.attempts, DEFAULT_RETRY_ATTEMPTS);
    }

    #[test]
    fn unknown_vehicle_anchor_is_rejected() {
        let file: HelmetConfigFile =
            serde_json::from_str(r#"{"correlation": {"vehicle_anchor": "overlap"}}"#).unwrap();
        assert!(HelmetConfig::from_file(file).is_err());
    }

    #[test]
    fn validate_rejects_out_of_range_values() {
        let mut cfg = HelmetConfig::from_file(HelmetConfigFile::default()).unwrap();
        cfg.correlation.confidence_threshold = 1.5;
        assert!(cfg.validate().is_err());

        let mut cfg = HelmetConfig::from_file(HelmetConfigFile::default()).unwrap();
        cfg.dedup.window = DedupWindow::Time(Duration::ZERO);
        assert!(cfg.validate().is_err());

        let mut cfg = HelmetConfig::from_file(HelmetConfigFile::default()).unwrap();
        cfg.dedup.distance_px = f32::NAN;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn log_notifier_is_the_default_transport() {
        let cfg = HelmetConfig::from_file(HelmetConfigFile::default()).unwrap();
        assert_eq!(cfg.notify.build_notifier().unwrap().name(), "log");
    }
}
