//! Violation alerts.
//!
//! Transport is pluggable behind `Notifier`. Retries are owned by the sink via
//! `RetryPolicy`, never by frame processing.

use anyhow::{anyhow, Result};
use serde::Serialize;
use std::time::Duration;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AlertMessage {
    pub record_id: i64,
    pub recipient: Option<String>,
    pub stream_id: String,
    /// Seconds since the epoch.
    pub timestamp: i64,
    pub fine_amount: u32,
    pub image: String,
}

impl AlertMessage {
    pub fn subject(&self) -> String {
        "HELMET VIOLATION DETECTED".to_string()
    }

    pub fn body(&self) -> String {
        format!(
            "HELMET VIOLATION ALERT\n\
             A helmet violation has been detected on stream {}.\n\
             \n\
             Record: #{}\n\
             Timestamp (unix): {}\n\
             Fine amount: {}\n\
             Evidence: {}\n\
             Status: VIOLATION RECORDED\n",
            self.stream_id, self.record_id, self.timestamp, self.fine_amount, self.image
        )
    }
}

pub trait Notifier: Send {
    fn name(&self) -> &'static str;

    fn notify(&mut self, alert: &AlertMessage) -> Result<()>;
}

/// Writes alerts to the log. Default when no transport is configured.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn name(&self) -> &'static str {
        "log"
    }

    fn notify(&mut self, alert: &AlertMessage) -> Result<()> {
        log::warn!(
            "{} (to={}): record #{} fine={} image={}",
            alert.subject(),
            alert.recipient.as_deref().unwrap_or("-"),
            alert.record_id,
            alert.fine_amount,
            alert.image
        );
        Ok(())
    }
}

/// POSTs alerts as JSON to a webhook.
#[cfg(feature = "notify-webhook")]
pub struct WebhookNotifier {
    url: String,
    agent: ureq::Agent,
}

#[cfg(feature = "notify-webhook")]
impl WebhookNotifier {
    pub fn new(url: &str) -> Result<Self> {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(anyhow!("webhook url must be http(s): {}", url));
        }
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(10))
            .build();
        Ok(Self {
            url: url.to_string(),
            agent,
        })
    }
}

#[cfg(feature = "notify-webhook")]
impl Notifier for WebhookNotifier {
    fn name(&self) -> &'static str {
        "webhook"
    }

    fn notify(&mut self, alert: &AlertMessage) -> Result<()> {
        #[derive(Serialize)]
        struct Payload<'a> {
            subject: String,
            body: String,
            #[serde(flatten)]
            alert: &'a AlertMessage,
        }
        let payload = serde_json::to_string(&Payload {
            subject: alert.subject(),
            body: alert.body(),
            alert,
        })?;
        self.agent
            .post(&self.url)
            .set("Content-Type", "application/json")
            .send_string(&payload)
            .map_err(|e| anyhow!("webhook {} failed: {}", self.url, e))?;
        Ok(())
    }
}

/// Bounded retry with linear backoff (`backoff * attempt`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn run<F>(&self, what: &str, mut op: F) -> Result<()>
    where
        F: FnMut() -> Result<()>,
    {
        let attempts = self.attempts.max(1);
        let mut last_err = None;
        for attempt in 1..=attempts {
            match op() {
                Ok(()) => return Ok(()),
                Err(e) => {
                    log::warn!("{} attempt {}/{} failed: {:#}", what, attempt, attempts, e);
                    last_err = Some(e);
                }
            }
            if attempt < attempts && !self.backoff.is_zero() {
                std::thread::sleep(self.backoff * attempt);
            }
        }
        Err(last_err.unwrap_or_else(|| anyhow!("{} never attempted", what)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_stops_at_first_success() {
        let policy = RetryPolicy {
            attempts: 5,
            backoff: Duration::ZERO,
        };
        let mut calls = 0;
        policy
            .run("notify", || {
                calls += 1;
                if calls < 3 {
                    Err(anyhow!("smtp down"))
                } else {
                    Ok(())
                }
            })
            .unwrap();
        assert_eq!(calls, 3);
    }

    #[test]
    fn retry_gives_up_after_attempts() {
        let policy = RetryPolicy {
            attempts: 2,
            backoff: Duration::ZERO,
        };
        let mut calls = 0;
        let err = policy
            .run("notify", || {
                calls += 1;
                Err(anyhow!("smtp down #{}", calls))
            })
            .unwrap_err();
        assert_eq!(calls, 2);
        assert!(err.to_string().contains("#2"));
    }

    #[test]
    fn alert_body_carries_fine_and_evidence() {
        let alert = AlertMessage {
            record_id: 9,
            recipient: Some("admin@example.org".into()),
            stream_id: "gate-2".into(),
            timestamp: 1_700_000_000,
            fine_amount: 500,
            image: "viol_1.jpg".into(),
        };
        let body = alert.body();
        assert!(body.contains("Fine amount: 500"));
        assert!(body.contains("viol_1.jpg"));
        assert!(body.contains("gate-2"));
        assert!(LogNotifier.notify(&alert).is_ok());
    }
}
