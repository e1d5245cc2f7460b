use std::{
    sync::{Arc, Mutex as StdMutex},
    time::Duration,
};

use chrono::{DateTime, Utc};
use media_capture::{CaptureConstraints, CaptureStream, MediaCapability, PresenceSampler};
use shared::{
    domain::{EndReason, LiveSessionStatus, SessionId, SessionSummary, AWAY_LIMIT_SECONDS},
    error::{ApiError, ErrorCode},
};
use thiserror::Error;
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
    time::{interval_at, Instant},
};
use tracing::{info, warn};

pub const TICK_PERIOD: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum LiveSessionError {
    #[error("camera or microphone access denied: {0}")]
    MediaAccessDenied(String),
    #[error("a live session is already active")]
    AlreadyActive,
}

impl LiveSessionError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::MediaAccessDenied(_) => ErrorCode::MediaAccessDenied,
            Self::AlreadyActive => ErrorCode::AlreadyActive,
        }
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            Self::MediaAccessDenied(_) => "Camera access denied or unavailable.",
            Self::AlreadyActive => "You are already in this session.",
        }
    }
}

impl From<&LiveSessionError> for ApiError {
    fn from(value: &LiveSessionError) -> Self {
        ApiError::new(value.code(), value.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiveSessionSnapshot {
    pub status: LiveSessionStatus,
    pub session_seconds: u32,
    pub away_seconds: u32,
    pub presence: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveSessionEvent {
    Started { session_id: SessionId },
    Ticked(LiveSessionSnapshot),
    Ended(SessionSummary),
}

impl LiveSessionEvent {
    pub fn needs_user_notice(&self) -> bool {
        matches!(
            self,
            Self::Ended(SessionSummary {
                reason: EndReason::InactivityTimeout,
                ..
            })
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Skipped,
    Continued(LiveSessionSnapshot),
    Ended(SessionSummary),
}

struct ActiveSession {
    session_id: SessionId,
    started_at: DateTime<Utc>,
    stream: Box<dyn CaptureStream>,
}

/// Monitored live session: `Idle -> Active -> Ended`, with forced end after
/// [`AWAY_LIMIT_SECONDS`] of consecutive absence.
pub struct LiveSessionController {
    media: Arc<dyn MediaCapability>,
    presence: Arc<dyn PresenceSampler>,
    status: LiveSessionStatus,
    session_seconds: u32,
    away_seconds: u32,
    presence_detected: bool,
    active: Option<ActiveSession>,
    last_summary: Option<SessionSummary>,
    events: broadcast::Sender<LiveSessionEvent>,
}

impl LiveSessionController {
    pub fn new(media: Arc<dyn MediaCapability>, presence: Arc<dyn PresenceSampler>) -> Self {
        let (events, _) = broadcast::channel(512);
        Self {
            media,
            presence,
            status: LiveSessionStatus::Idle,
            session_seconds: 0,
            away_seconds: 0,
            presence_detected: false,
            active: None,
            last_summary: None,
            events,
        }
    }

    pub fn status(&self) -> LiveSessionStatus {
        self.status
    }

    pub fn session_seconds(&self) -> u32 {
        self.session_seconds
    }

    pub fn away_seconds(&self) -> u32 {
        self.away_seconds
    }

    pub fn presence(&self) -> bool {
        self.presence_detected
    }

    pub fn last_summary(&self) -> Option<&SessionSummary> {
        self.last_summary.as_ref()
    }

    pub fn snapshot(&self) -> LiveSessionSnapshot {
        LiveSessionSnapshot {
            status: self.status,
            session_seconds: self.session_seconds,
            away_seconds: self.away_seconds,
            presence: self.presence_detected,
        }
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<LiveSessionEvent> {
        self.events.subscribe()
    }

    pub async fn start(&mut self) -> Result<SessionId, LiveSessionError> {
        if self.status == LiveSessionStatus::Active {
            return Err(LiveSessionError::AlreadyActive);
        }

        let stream = self
            .media
            .acquire(CaptureConstraints::camera_and_microphone())
            .await
            .map_err(|err| {
                warn!("live: media acquisition failed err={err}");
                LiveSessionError::MediaAccessDenied(err.to_string())
            })?;

        let session_id = SessionId::new();
        self.active = Some(ActiveSession {
            session_id,
            started_at: Utc::now(),
            stream,
        });
        self.status = LiveSessionStatus::Active;
        self.session_seconds = 0;
        self.away_seconds = 0;
        self.presence_detected = true;

        info!("live: session started id={}", session_id.0);
        let _ = self.events.send(LiveSessionEvent::Started { session_id });
        Ok(session_id)
    }

    /// One sampling step. A failed presence sample counts as absence.
    pub fn tick(&mut self) -> TickOutcome {
        if self.status != LiveSessionStatus::Active {
            return TickOutcome::Skipped;
        }

        self.session_seconds = self.session_seconds.saturating_add(1);
        let present = match self.presence.sample() {
            Ok(present) => present,
            Err(err) => {
                warn!("live: presence sample failed, treating as away err={err}");
                false
            }
        };
        self.presence_detected = present;

        if present {
            self.away_seconds = 0;
        } else {
            self.away_seconds = self.away_seconds.saturating_add(1);
        }

        if self.away_seconds >= AWAY_LIMIT_SECONDS {
            warn!(
                "live: away limit reached away_seconds={} session_seconds={}",
                self.away_seconds, self.session_seconds
            );
            return match self.stop(EndReason::InactivityTimeout) {
                Some(summary) => TickOutcome::Ended(summary),
                None => TickOutcome::Skipped,
            };
        }

        let snapshot = self.snapshot();
        let _ = self.events.send(LiveSessionEvent::Ticked(snapshot));
        TickOutcome::Continued(snapshot)
    }

    /// Releases the capture stream and ends the session. Returns `None` when
    /// there was no active session, so repeated calls are harmless.
    pub fn stop(&mut self, reason: EndReason) -> Option<SessionSummary> {
        let active = self.active.take()?;
        active.stream.stop_all_tracks();

        let summary = SessionSummary {
            session_id: active.session_id,
            started_at: active.started_at,
            ended_at: Utc::now(),
            active_seconds: self.session_seconds,
            reason,
        };

        self.status = LiveSessionStatus::Ended;
        self.session_seconds = 0;
        self.away_seconds = 0;
        self.presence_detected = false;
        self.last_summary = Some(summary.clone());

        info!(
            "live: session ended id={} reason={:?} duration={}",
            summary.session_id.0,
            summary.reason,
            summary.duration_label()
        );
        let _ = self.events.send(LiveSessionEvent::Ended(summary.clone()));
        Some(summary)
    }
}

impl Drop for LiveSessionController {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            active.stream.stop_all_tracks();
        }
    }
}

/// Drives a [`LiveSessionController`] once per period while it is active.
/// Ticks and stops share the controller lock, so a stopped session never advances.
pub struct LiveSessionRunner {
    controller: Arc<Mutex<LiveSessionController>>,
    ticker: StdMutex<Option<JoinHandle<()>>>,
    events: broadcast::Sender<LiveSessionEvent>,
    period: Duration,
}

impl LiveSessionRunner {
    pub fn new(controller: LiveSessionController) -> Arc<Self> {
        Self::with_period(controller, TICK_PERIOD)
    }

    pub fn with_period(controller: LiveSessionController, period: Duration) -> Arc<Self> {
        let events = controller.events.clone();
        Arc::new(Self {
            controller: Arc::new(Mutex::new(controller)),
            ticker: StdMutex::new(None),
            events,
            period,
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<LiveSessionEvent> {
        self.events.subscribe()
    }

    pub async fn snapshot(&self) -> LiveSessionSnapshot {
        self.controller.lock().await.snapshot()
    }

    pub async fn last_summary(&self) -> Option<SessionSummary> {
        self.controller.lock().await.last_summary().cloned()
    }

    pub async fn start(&self) -> Result<SessionId, LiveSessionError> {
        let mut controller = self.controller.lock().await;
        let session_id = controller.start().await?;
        let task = self.spawn_ticker();
        self.replace_ticker(Some(task));
        Ok(session_id)
    }

    pub async fn stop(&self) -> Option<SessionSummary> {
        let mut controller = self.controller.lock().await;
        let summary = controller.stop(EndReason::UserRequested);
        self.replace_ticker(None);
        summary
    }

    fn spawn_ticker(&self) -> JoinHandle<()> {
        let controller = Arc::clone(&self.controller);
        let period = self.period;
        tokio::spawn(async move {
            let mut interval = interval_at(Instant::now() + period, period);
            loop {
                interval.tick().await;
                let mut guard = controller.lock().await;
                match guard.tick() {
                    TickOutcome::Continued(_) => {}
                    TickOutcome::Ended(_) | TickOutcome::Skipped => break,
                }
            }
        })
    }

    fn replace_ticker(&self, next: Option<JoinHandle<()>>) {
        let previous = match self.ticker.lock() {
            Ok(mut slot) => std::mem::replace(&mut *slot, next),
            Err(poisoned) => std::mem::replace(&mut *poisoned.into_inner(), next),
        };
        if let Some(task) = previous {
            task.abort();
        }
    }
}

impl Drop for LiveSessionRunner {
    fn drop(&mut self) {
        self.replace_ticker(None);
        if let Ok(mut controller) = self.controller.try_lock() {
            controller.stop(EndReason::UserRequested);
        }
    }
}

#[cfg(test)]
#[path = "tests/live_session_tests.rs"]
mod tests;
