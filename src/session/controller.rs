use std::sync::Arc;

use chrono::{Local, Utc};
use tokio::{
    sync::{mpsc, Mutex},
    task::JoinHandle,
    time,
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    config::FollowAlongConfig,
    entitlements::Entitlements,
    error::FollowAlongError,
    events::{EventSink, FollowAlongEvent},
    log_debug, log_error, log_info, log_warn,
    models::{FollowAlongSession, Surah},
    recognizer::{RecognizerEvent, SpeechRecognizer, TranscriptEvent},
    store::{usage_key, SessionStore, UsageCounter},
};

use super::state::{FollowAlongSnapshot, FollowAlongState, TranscriptOutcome};

const ENABLE_LOGS: bool = true;

/// Collaborators owned by the application root and shared with the controller.
pub struct FollowAlongServices<S> {
    pub store: S,
    pub recognizer: Arc<dyn SpeechRecognizer>,
    pub entitlements: Arc<dyn Entitlements>,
    pub events: Arc<dyn EventSink>,
}

struct Listener {
    handle: JoinHandle<()>,
    cancel: CancellationToken,
}

/// Drives one user's follow-along sessions.
///
/// Transcript events mutate state under a single lock, one at a time.
/// Start and stop additionally hold the lifecycle lock for their whole
/// duration, so a stop issued mid-start waits for the start's storage work.
pub struct FollowAlongController<S> {
    state: Arc<Mutex<FollowAlongState>>,
    lifecycle: Arc<Mutex<()>>,
    config: Arc<FollowAlongConfig>,
    user_id: Arc<str>,
    store: Arc<S>,
    recognizer: Arc<dyn SpeechRecognizer>,
    entitlements: Arc<dyn Entitlements>,
    events: Arc<dyn EventSink>,
    ticker: Arc<Mutex<Option<JoinHandle<()>>>>,
    listener: Arc<Mutex<Option<Listener>>>,
}

impl<S> Clone for FollowAlongController<S> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            lifecycle: self.lifecycle.clone(),
            config: self.config.clone(),
            user_id: self.user_id.clone(),
            store: self.store.clone(),
            recognizer: self.recognizer.clone(),
            entitlements: self.entitlements.clone(),
            events: self.events.clone(),
            ticker: self.ticker.clone(),
            listener: self.listener.clone(),
        }
    }
}

impl<S> FollowAlongController<S>
where
    S: SessionStore + UsageCounter + 'static,
{
    pub fn new(
        config: FollowAlongConfig,
        user_id: impl Into<String>,
        services: FollowAlongServices<S>,
    ) -> Self {
        let user_id: String = user_id.into();
        Self {
            state: Arc::new(Mutex::new(FollowAlongState::new())),
            lifecycle: Arc::new(Mutex::new(())),
            config: Arc::new(config),
            user_id: Arc::from(user_id),
            store: Arc::new(services.store),
            recognizer: services.recognizer,
            entitlements: services.entitlements,
            events: services.events,
            ticker: Arc::new(Mutex::new(None)),
            listener: Arc::new(Mutex::new(None)),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &FollowAlongConfig {
        &self.config
    }

    pub async fn snapshot(&self) -> FollowAlongSnapshot {
        self.state.lock().await.snapshot()
    }

    /// Set the surah the next session recites. Refused while active.
    pub async fn load_surah(&self, surah: Surah) -> Result<(), FollowAlongError> {
        let snapshot = {
            let mut state = self.state.lock().await;
            if state.is_active() {
                return Err(FollowAlongError::SessionActive);
            }
            log_info!("Loaded surah {} ({} verses)", surah.id, surah.verses.len());
            state.surah = Some(surah);
            state.snapshot()
        };
        self.emit_state(snapshot);
        Ok(())
    }

    pub async fn clear_surah(&self) -> Result<(), FollowAlongError> {
        let snapshot = {
            let mut state = self.state.lock().await;
            if state.is_active() {
                return Err(FollowAlongError::SessionActive);
            }
            state.surah = None;
            state.snapshot()
        };
        self.emit_state(snapshot);
        Ok(())
    }

    /// Sessions left today, or `None` for users with unlimited usage.
    pub async fn remaining_sessions_today(&self) -> Result<Option<u32>, FollowAlongError> {
        if self.entitlements.has_unlimited_usage() {
            return Ok(None);
        }
        let used = self.store.usage(&self.today_usage_key()).await?;
        Ok(Some(self.config.daily_session_limit.saturating_sub(used)))
    }

    pub async fn start(&self) -> Result<FollowAlongSnapshot, FollowAlongError> {
        let _lifecycle = self.lifecycle.lock().await;

        if self.state.lock().await.is_active() {
            return Err(FollowAlongError::AlreadyActive);
        }

        let key = self.today_usage_key();
        if !self.entitlements.has_unlimited_usage() {
            let used = self.store.usage(&key).await?;
            let limit = self.config.daily_session_limit;
            if used >= limit {
                log_info!("Follow-along start refused: {used}/{limit} sessions used today");
                return Err(FollowAlongError::LimitReached { limit, used });
            }
        }

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        self.recognizer
            .start_listening(events_tx)
            .map_err(FollowAlongError::RecognitionUnavailable)?;

        let snapshot = {
            let mut state = self.state.lock().await;
            state.begin_session(Utc::now());
            state.snapshot()
        };

        self.spawn_listener(events_rx).await;
        self.spawn_ticker().await;

        match self.store.increment(&key).await {
            Ok(count) => log_info!("Follow-along session started ({count} today)"),
            Err(err) => log_error!("Failed to record follow-along usage: {err:#}"),
        }

        self.emit_state(snapshot.clone());
        Ok(snapshot)
    }

    /// End the session, persisting it when a surah was loaded.
    ///
    /// Never fails: a storage error is logged and the session is still
    /// returned so the host can show its summary.
    pub async fn stop(&self) -> Option<FollowAlongSession> {
        let _lifecycle = self.lifecycle.lock().await;
        self.finish(true).await
    }

    /// Implicit stop, e.g. when the app is backgrounded. Same finalize path.
    pub async fn cancel(&self) -> Option<FollowAlongSession> {
        log_info!("Follow-along session cancelled; finalizing");
        self.stop().await
    }

    /// Process one recognizer event. Events delivered through the recognizer
    /// channel are routed here by the listener task.
    pub async fn handle_event(&self, event: RecognizerEvent) {
        match event {
            RecognizerEvent::Transcript(transcript) => {
                self.handle_transcript(&transcript).await;
            }
            RecognizerEvent::Paused => self.set_paused(true).await,
            RecognizerEvent::Resumed => self.set_paused(false).await,
            RecognizerEvent::Error(message) => {
                self.handle_recognition_error(message).await;
            }
        }
    }

    pub async fn handle_transcript(&self, event: &TranscriptEvent) -> TranscriptOutcome {
        let (outcome, snapshot) = {
            let mut state = self.state.lock().await;
            let outcome = state.apply_transcript(&event.transcript, &self.config);
            (outcome, state.snapshot())
        };

        match &outcome {
            TranscriptOutcome::Ignored => return outcome,
            TranscriptOutcome::VerseMatched {
                verse_number,
                confidence,
            } => {
                log_debug!("Matched verse {verse_number} ({confidence:.2})");
                self.events.emit(FollowAlongEvent::VerseMatched {
                    verse_number: *verse_number,
                    confidence: *confidence,
                });
            }
            TranscriptOutcome::Refreshed { .. } | TranscriptOutcome::NoMatch => {}
        }

        self.emit_state(snapshot);
        outcome
    }

    /// Stop and finalize after a recognition stream failure. The error is
    /// reported to the host together with whatever was captured. No-op while
    /// idle.
    pub async fn handle_recognition_error(&self, message: String) -> Option<FollowAlongSession> {
        let _lifecycle = self.lifecycle.lock().await;
        self.fail(message, true).await
    }

    async fn fail(&self, message: String, abort_listener: bool) -> Option<FollowAlongSession> {
        if !self.state.lock().await.is_active() {
            log_debug!("Ignoring recognition error while idle: {message}");
            return None;
        }
        log_error!("Speech recognition failed mid-session: {message}");
        let session = self.finish(abort_listener).await;
        self.events.emit(FollowAlongEvent::RecognitionFailed {
            message,
            session: session.clone(),
        });
        session
    }

    async fn set_paused(&self, paused: bool) {
        let snapshot = {
            let mut state = self.state.lock().await;
            if !state.set_paused(paused) {
                return;
            }
            state.snapshot()
        };
        self.emit_state(snapshot);
    }

    /// Caller must hold the lifecycle lock.
    async fn finish(&self, abort_listener: bool) -> Option<FollowAlongSession> {
        if let Some(listener) = self.listener.lock().await.take() {
            listener.cancel.cancel();
            // The listener itself finishes the session on a stream error and
            // must not abort its own task.
            if abort_listener {
                listener.handle.abort();
            }
        }
        self.cancel_ticker().await;

        let ended_at = Utc::now();
        let (was_active, session, snapshot) = {
            let mut state = self.state.lock().await;
            let was_active = state.is_active();
            let session = state.finalize(Uuid::new_v4().to_string(), ended_at);
            state.reset();
            (was_active, session, state.snapshot())
        };

        if was_active {
            self.recognizer.stop_listening();
        }

        match &session {
            Some(session) => {
                if let Err(err) = self.store.save(session).await {
                    log_error!(
                        "Failed to persist follow-along session {}; returning it unsaved: {err:#}",
                        session.id
                    );
                } else {
                    log_info!(
                        "Follow-along session {} saved: {} verses, {}% accuracy, {}s",
                        session.id,
                        session.verses_recited.len(),
                        session.accuracy_percentage,
                        session.duration_seconds
                    );
                }
                self.events.emit(FollowAlongEvent::SessionCompleted {
                    session: session.clone(),
                });
            }
            None if was_active => {
                log_warn!("Follow-along session stopped without a surah; nothing recorded");
            }
            None => {}
        }

        self.emit_state(snapshot);
        session
    }

    async fn spawn_listener(&self, mut events_rx: mpsc::UnboundedReceiver<RecognizerEvent>) {
        let mut listener_guard = self.listener.lock().await;
        if let Some(previous) = listener_guard.take() {
            previous.cancel.cancel();
            previous.handle.abort();
        }

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let controller = self.clone();

        let handle = tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = token.cancelled() => break,
                    event = events_rx.recv() => match event {
                        Some(event) => event,
                        None => break,
                    },
                };

                if let RecognizerEvent::Error(message) = event {
                    let _lifecycle = controller.lifecycle.lock().await;
                    // A stop may have won the race for the lock
                    if !token.is_cancelled() {
                        controller.fail(message, false).await;
                    }
                    break;
                }

                controller.handle_event(event).await;
            }
        });

        *listener_guard = Some(Listener { handle, cancel });
    }

    async fn spawn_ticker(&self) {
        let mut ticker_guard = self.ticker.lock().await;
        if let Some(handle) = ticker_guard.take() {
            handle.abort();
        }

        let state = self.state.clone();
        let events = self.events.clone();
        let tick_interval = self.config.tick_interval();

        let handle = tokio::spawn(async move {
            let mut interval = time::interval(tick_interval);
            // The first tick completes immediately
            interval.tick().await;
            loop {
                interval.tick().await;

                let elapsed_seconds = {
                    let mut guard = state.lock().await;
                    match guard.tick() {
                        Some(elapsed) => elapsed,
                        None => break,
                    }
                };

                events.emit(FollowAlongEvent::Tick { elapsed_seconds });
            }
        });

        *ticker_guard = Some(handle);
    }

    async fn cancel_ticker(&self) {
        if let Some(handle) = self.ticker.lock().await.take() {
            handle.abort();
        }
    }

    fn today_usage_key(&self) -> String {
        usage_key(&self.user_id, Local::now().date_naive())
    }

    fn emit_state(&self, snapshot: FollowAlongSnapshot) {
        self.events.emit(FollowAlongEvent::StateChanged { snapshot });
    }
}
