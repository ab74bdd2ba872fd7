//! Health-transition notifications.
//!
//! A lineage (branch) notifies only when its health flips. Steady state,
//! in either direction, stays quiet, and change-proposal runs never notify.

use super::error::{Error, Result};
use super::executor::RunSummary;
use super::state;
use super::types::{Health, NotifySettings, PairStatus, UnitOutcome};
use serde::Serialize;
use std::path::Path;
use std::time::Duration;

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(15);

/// A notifiable health change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Healthy → Unhealthy
    Broke,
    /// Unhealthy → Healthy
    Recovered,
}

/// Decide whether a run notifies. A lineage with no history counts as
/// healthy.
pub fn transition(
    previous: Option<Health>,
    current: Health,
    change_proposal: bool,
) -> Option<Transition> {
    if change_proposal {
        return None;
    }
    match (previous.unwrap_or(Health::Healthy), current) {
        (Health::Healthy, Health::Unhealthy) => Some(Transition::Broke),
        (Health::Unhealthy, Health::Healthy) => Some(Transition::Recovered),
        _ => None,
    }
}

/// Message delivered to a sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub channel: String,
    pub text: String,
}

/// Destination for notifications.
pub trait NotificationSink {
    fn send(&self, notification: &Notification) -> Result<()>;
}

/// Posts `{"channel", "text"}` as JSON to a chat webhook.
pub struct WebhookSink {
    client: reqwest::blocking::Client,
    url: String,
}

impl WebhookSink {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(WEBHOOK_TIMEOUT)
            .build()
            .map_err(|e| Error::Notification(format!("cannot create HTTP client: {e}")))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    /// Webhook from the environment variable named in the settings.
    pub fn from_env(settings: &NotifySettings) -> Result<Self> {
        let url = std::env::var(&settings.webhook_url_env).map_err(|_| {
            Error::Notification(format!("{} is not set", settings.webhook_url_env))
        })?;
        Self::new(url)
    }
}

impl NotificationSink for WebhookSink {
    fn send(&self, notification: &Notification) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(notification)
            .send()
            .map_err(|e| Error::Notification(format!("webhook request failed: {e}")))?;
        if !response.status().is_success() {
            return Err(Error::Notification(format!(
                "webhook returned HTTP {}",
                response.status()
            )));
        }
        Ok(())
    }
}

/// Writes notifications to the log only.
#[derive(Debug, Default)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn send(&self, notification: &Notification) -> Result<()> {
        tracing::info!(channel = %notification.channel, "{}", notification.text);
        Ok(())
    }
}

/// Render the message for a transition.
pub fn message(
    pipeline: &str,
    lineage: &str,
    kind: Transition,
    summary: &RunSummary,
) -> String {
    match kind {
        Transition::Recovered => format!(
            "[{}] {} is healthy again: {}",
            pipeline,
            lineage,
            summary.headline()
        ),
        Transition::Broke => {
            let mut text = format!(
                "[{}] {} is broken: {}",
                pipeline,
                lineage,
                summary.headline()
            );
            for report in &summary.platforms {
                if let UnitOutcome::SetupFailed { stage, .. } = &report.outcome {
                    text.push_str(&format!("\n- {}: {} stage failed", report.platform, stage));
                }
                for r in report
                    .results
                    .iter()
                    .filter(|r| r.status == PairStatus::Failed)
                {
                    text.push_str(&format!("\n- {}: {}", report.platform, r.pair_id));
                }
            }
            text
        }
    }
}

/// Everything [`notify_run`] needs besides the sink and the summary.
pub struct NotifyRequest<'a> {
    pub state_dir: &'a Path,
    pub pipeline: &'a str,
    pub lineage: &'a str,
    pub channel: &'a str,
    pub change_proposal: bool,
}

/// Compare against the lineage's last health, send at most one
/// notification, then store the current health.
///
/// When sending fails the stored health is left unchanged, so the next run
/// sees the same transition.
pub fn notify_run(
    sink: &dyn NotificationSink,
    req: &NotifyRequest<'_>,
    summary: &RunSummary,
) -> Result<Option<Transition>> {
    record_health(sink, req, summary.health(), &summary.run_id, |kind| {
        message(req.pipeline, req.lineage, kind, summary)
    })
}

/// Record a run that ended in a run-fatal error as unhealthy, notifying
/// when that breaks the lineage.
pub fn notify_aborted(
    sink: &dyn NotificationSink,
    req: &NotifyRequest<'_>,
    run_id: &str,
    error: &Error,
) -> Result<Option<Transition>> {
    record_health(sink, req, Health::Unhealthy, run_id, |_| {
        format!("[{}] {} is broken: run aborted: {}", req.pipeline, req.lineage, error)
    })
}

fn record_health(
    sink: &dyn NotificationSink,
    req: &NotifyRequest<'_>,
    current: Health,
    run_id: &str,
    render: impl FnOnce(Transition) -> String,
) -> Result<Option<Transition>> {
    let previous = state::load_health(req.state_dir, req.lineage)?.map(|r| r.health);
    let decided = transition(previous, current, req.change_proposal);
    if let Some(kind) = decided {
        tracing::info!(lineage = req.lineage, ?kind, "health transition");
        sink.send(&Notification {
            channel: req.channel.to_string(),
            text: render(kind),
        })?;
    }
    state::save_health(req.state_dir, req.lineage, current, run_id)?;
    Ok(decided)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{PairResult, PlatformReport};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        sent: Mutex<Vec<Notification>>,
    }

    impl NotificationSink for RecordingSink {
        fn send(&self, notification: &Notification) -> Result<()> {
            self.sent.lock().unwrap().push(notification.clone());
            Ok(())
        }
    }

    struct FailingSink;

    impl NotificationSink for FailingSink {
        fn send(&self, _: &Notification) -> Result<()> {
            Err(Error::Notification("offline".into()))
        }
    }

    fn summary(failed: bool) -> RunSummary {
        let status = if failed {
            PairStatus::Failed
        } else {
            PairStatus::Passed
        };
        RunSummary {
            run_id: "r-1".into(),
            platforms: vec![PlatformReport {
                platform: "linux".into(),
                arch: "x86_64".into(),
                outcome: UnitOutcome::Completed,
                results: vec![PairResult {
                    pair_id: "cmake/3.25.3::Release".into(),
                    tool: "cmake/3.25.3".into(),
                    config: "Release".into(),
                    fingerprint: "blake3:00".into(),
                    status,
                    decision: None,
                    message: None,
                    duration: Duration::ZERO,
                    installed: Vec::new(),
                    uploaded: Vec::new(),
                }],
                duration: Duration::ZERO,
            }],
            ..RunSummary::default()
        }
    }

    fn request(dir: &Path, change_proposal: bool) -> NotifyRequest<'_> {
        NotifyRequest {
            state_dir: dir,
            pipeline: "recipe-index",
            lineage: "develop",
            channel: "#ci",
            change_proposal,
        }
    }

    #[test]
    fn test_transition_table() {
        use Health::*;
        assert_eq!(transition(None, Unhealthy, false), Some(Transition::Broke));
        assert_eq!(transition(None, Healthy, false), None);
        assert_eq!(transition(Some(Healthy), Unhealthy, false), Some(Transition::Broke));
        assert_eq!(
            transition(Some(Unhealthy), Healthy, false),
            Some(Transition::Recovered)
        );
        assert_eq!(transition(Some(Unhealthy), Unhealthy, false), None);
        assert_eq!(transition(Some(Healthy), Healthy, false), None);
        assert_eq!(transition(Some(Healthy), Unhealthy, true), None);
        assert_eq!(transition(Some(Unhealthy), Healthy, true), None);
    }

    #[test]
    fn test_repeated_failure_notifies_once() {
        let dir = tempfile::tempdir().unwrap();
        let sink = RecordingSink::default();
        let first = notify_run(&sink, &request(dir.path(), false), &summary(true)).unwrap();
        assert_eq!(first, Some(Transition::Broke));
        let second = notify_run(&sink, &request(dir.path(), false), &summary(true)).unwrap();
        assert_eq!(second, None);
        let sent = sink.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].channel, "#ci");
        assert!(sent[0].text.contains("develop is broken"));
        assert!(sent[0].text.contains("linux: cmake/3.25.3::Release"));
    }

    #[test]
    fn test_recovery_notifies() {
        let dir = tempfile::tempdir().unwrap();
        let sink = RecordingSink::default();
        notify_run(&sink, &request(dir.path(), false), &summary(true)).unwrap();
        let kind = notify_run(&sink, &request(dir.path(), false), &summary(false)).unwrap();
        assert_eq!(kind, Some(Transition::Recovered));
        assert!(sink.sent.lock().unwrap()[1].text.contains("healthy again"));
    }

    #[test]
    fn test_aborted_run_breaks_then_recovers() {
        let dir = tempfile::tempdir().unwrap();
        let sink = RecordingSink::default();
        let error = Error::RecipeUpload("zlib/1.3: 401 Unauthorized".into());
        let kind = notify_aborted(&sink, &request(dir.path(), false), "r-2", &error).unwrap();
        assert_eq!(kind, Some(Transition::Broke));
        let again = notify_aborted(&sink, &request(dir.path(), false), "r-3", &error).unwrap();
        assert_eq!(again, None);
        let record = state::load_health(dir.path(), "develop").unwrap().unwrap();
        assert_eq!(record.health, Health::Unhealthy);

        let kind = notify_run(&sink, &request(dir.path(), false), &summary(false)).unwrap();
        assert_eq!(kind, Some(Transition::Recovered));
        let sent = sink.sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert!(sent[0].text.starts_with("[recipe-index] develop is broken: run aborted"));
        assert!(sent[0].text.contains("401 Unauthorized"));
    }

    #[test]
    fn test_change_proposal_is_silent() {
        let dir = tempfile::tempdir().unwrap();
        let sink = RecordingSink::default();
        let kind = notify_run(&sink, &request(dir.path(), true), &summary(true)).unwrap();
        assert_eq!(kind, None);
        assert!(sink.sent.lock().unwrap().is_empty());
    }

    #[test]
    fn test_failed_send_keeps_previous_health() {
        let dir = tempfile::tempdir().unwrap();
        assert!(notify_run(&FailingSink, &request(dir.path(), false), &summary(true)).is_err());
        assert!(state::load_health(dir.path(), "develop").unwrap().is_none());
    }

    #[test]
    fn test_log_sink() {
        let n = Notification {
            channel: "#ci".into(),
            text: "hello".into(),
        };
        assert!(LogSink.send(&n).is_ok());
    }

    #[test]
    fn test_webhook_from_env_missing() {
        let settings = NotifySettings {
            channel: "#ci".into(),
            webhook_url_env: "PREBAKE_TEST_WEBHOOK_UNSET".into(),
        };
        assert!(matches!(
            WebhookSink::from_env(&settings),
            Err(Error::Notification(_))
        ));
    }
}
