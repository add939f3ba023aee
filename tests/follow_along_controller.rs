use std::{
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use anyhow::{anyhow, Result};
use follow_along::{
    Database, FollowAlongConfig, FollowAlongController, FollowAlongError, FollowAlongEvent,
    FollowAlongServices, FollowAlongSession, ListeningStatus, RecognizerEvent, SessionStore,
    SpeechRecognizer, Surah, TranscriptEvent, TranscriptOutcome, UsageCounter, UserStore, Verse,
};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

#[derive(Default)]
struct ScriptedRecognizer {
    sender: Mutex<Option<UnboundedSender<RecognizerEvent>>>,
    unavailable: AtomicBool,
    starts: AtomicUsize,
    stops: AtomicUsize,
}

impl ScriptedRecognizer {
    fn say(&self, transcript: &str) {
        self.push(RecognizerEvent::Transcript(TranscriptEvent::partial(transcript)));
    }

    fn push(&self, event: RecognizerEvent) {
        let guard = self.sender.lock().unwrap();
        guard
            .as_ref()
            .expect("recognizer not listening")
            .send(event)
            .unwrap();
    }
}

impl SpeechRecognizer for ScriptedRecognizer {
    fn start_listening(&self, events: UnboundedSender<RecognizerEvent>) -> Result<(), String> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err("microphone permission denied".into());
        }
        self.starts.fetch_add(1, Ordering::SeqCst);
        *self.sender.lock().unwrap() = Some(events);
        Ok(())
    }

    fn stop_listening(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.sender.lock().unwrap().take();
    }
}

/// Store whose writes always fail.
struct BrokenStore;

impl SessionStore for BrokenStore {
    async fn get_all(&self) -> Result<Vec<FollowAlongSession>> {
        Ok(Vec::new())
    }

    async fn save(&self, _session: &FollowAlongSession) -> Result<()> {
        Err(anyhow!("disk full"))
    }

    async fn delete(&self, _id: &str) -> Result<()> {
        Err(anyhow!("disk full"))
    }

    async fn get_by_surah(&self, _surah_id: u32) -> Result<Vec<FollowAlongSession>> {
        Ok(Vec::new())
    }

    async fn clear_all(&self) -> Result<()> {
        Err(anyhow!("disk full"))
    }
}

impl UsageCounter for BrokenStore {
    async fn usage(&self, _key: &str) -> Result<u32> {
        Ok(0)
    }

    async fn increment(&self, _key: &str) -> Result<u32> {
        Err(anyhow!("disk full"))
    }
}

/// SQLite store whose writes take a while, with counters for inspection.
struct SlowStore {
    inner: UserStore,
    delay: Duration,
    saves: AtomicUsize,
    increments_started: AtomicUsize,
    increments_done: AtomicUsize,
}

impl SlowStore {
    fn new(delay: Duration) -> Self {
        Self {
            inner: Database::in_memory().unwrap().for_user("reader"),
            delay,
            saves: AtomicUsize::new(0),
            increments_started: AtomicUsize::new(0),
            increments_done: AtomicUsize::new(0),
        }
    }
}

impl SessionStore for SlowStore {
    async fn get_all(&self) -> Result<Vec<FollowAlongSession>> {
        self.inner.get_all().await
    }

    async fn save(&self, session: &FollowAlongSession) -> Result<()> {
        tokio::time::sleep(self.delay).await;
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.inner.save(session).await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.inner.delete(id).await
    }

    async fn get_by_surah(&self, surah_id: u32) -> Result<Vec<FollowAlongSession>> {
        self.inner.get_by_surah(surah_id).await
    }

    async fn clear_all(&self) -> Result<()> {
        self.inner.clear_all().await
    }
}

impl UsageCounter for SlowStore {
    async fn usage(&self, key: &str) -> Result<u32> {
        self.inner.usage(key).await
    }

    async fn increment(&self, key: &str) -> Result<u32> {
        self.increments_started.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        let count = self.inner.increment(key).await?;
        self.increments_done.fetch_add(1, Ordering::SeqCst);
        Ok(count)
    }
}

struct Harness<S> {
    controller: FollowAlongController<S>,
    recognizer: Arc<ScriptedRecognizer>,
    unlimited: Arc<AtomicBool>,
    events: UnboundedReceiver<FollowAlongEvent>,
}

fn opening_of_fatiha() -> Surah {
    Surah {
        id: 1,
        name: "Al-Fatiha".into(),
        name_arabic: "الفاتحة".into(),
        verses: vec![
            Verse::new(1, "بسم الله الرحمن الرحيم"),
            Verse::new(2, "الحمد لله رب العالمين"),
        ],
    }
}

fn ten_verse_surah() -> Surah {
    Surah {
        id: 2,
        name: "Ten".into(),
        name_arabic: "عشر".into(),
        verses: (1..=10)
            .map(|n| Verse::new(n, format!("كلمه{n} اولى{n} ثانيه{n} ثالثه{n}")))
            .collect(),
    }
}

fn harness_with<S>(store: S, config: FollowAlongConfig) -> Harness<S>
where
    S: SessionStore + UsageCounter + 'static,
{
    follow_along::init_logging();
    let recognizer = Arc::new(ScriptedRecognizer::default());
    let unlimited = Arc::new(AtomicBool::new(false));
    let (events_tx, events) = unbounded_channel();

    let controller = FollowAlongController::new(
        config,
        "reader",
        FollowAlongServices {
            store,
            recognizer: recognizer.clone(),
            entitlements: unlimited.clone(),
            events: Arc::new(events_tx),
        },
    );

    Harness {
        controller,
        recognizer,
        unlimited,
        events,
    }
}

fn harness() -> Harness<UserStore> {
    let store = Database::in_memory().unwrap().for_user("reader");
    harness_with(store, FollowAlongConfig::default())
}

async fn next_matching<F>(
    events: &mut UnboundedReceiver<FollowAlongEvent>,
    mut wanted: F,
) -> FollowAlongEvent
where
    F: FnMut(&FollowAlongEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let event = events.recv().await.expect("event channel closed");
            if wanted(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

fn is_verse_match(event: &FollowAlongEvent) -> bool {
    matches!(event, FollowAlongEvent::VerseMatched { .. })
}

fn verse_matches(events: &mut UnboundedReceiver<FollowAlongEvent>) -> Vec<u32> {
    let mut numbers = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let FollowAlongEvent::VerseMatched { verse_number, .. } = event {
            numbers.push(verse_number);
        }
    }
    numbers
}

#[tokio::test]
async fn recites_two_verses_end_to_end() {
    let mut h = harness();
    h.controller.load_surah(opening_of_fatiha()).await.unwrap();
    h.controller.start().await.unwrap();

    h.recognizer.say("بسم الله الرحمن الرحيم");
    let first = next_matching(&mut h.events, is_verse_match).await;
    assert!(matches!(first, FollowAlongEvent::VerseMatched { verse_number: 1, .. }));

    h.recognizer.say("الحمد لله رب العالمين");
    let second = next_matching(&mut h.events, is_verse_match).await;
    assert!(matches!(second, FollowAlongEvent::VerseMatched { verse_number: 2, .. }));

    let snapshot = h.controller.snapshot().await;
    assert_eq!(snapshot.matched_verse, Some(2));

    let session = h.controller.stop().await.expect("session");
    assert_eq!(session.verses_recited, [1, 2]);
    assert_eq!(session.total_verses, 2);
    assert_eq!(session.accuracy_percentage, 100);
    assert_eq!(session.surah_name_arabic, "الفاتحة");
    let surah = opening_of_fatiha();
    assert!(session.verses_recited.iter().all(|&n| surah.contains_verse(n)));

    let stored = h.controller.store().get_all().await.unwrap();
    assert_eq!(stored, [session]);
    assert_eq!(h.recognizer.stops.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn repeated_match_records_and_signals_once() {
    let mut h = harness();
    h.controller.load_surah(opening_of_fatiha()).await.unwrap();
    h.controller.start().await.unwrap();

    let first = h
        .controller
        .handle_transcript(&TranscriptEvent::partial("بسم الله الرحمن"))
        .await;
    assert!(matches!(first, TranscriptOutcome::VerseMatched { verse_number: 1, .. }));

    let second = h
        .controller
        .handle_transcript(&TranscriptEvent::partial("بسم الله الرحمن الرحيم"))
        .await;
    assert!(matches!(second, TranscriptOutcome::Refreshed { verse_number: 1, .. }));

    assert_eq!(verse_matches(&mut h.events), [1]);
    assert_eq!(h.controller.snapshot().await.verses_recited, [1]);
}

#[tokio::test]
async fn stop_without_matches_records_zero_accuracy() {
    let mut h = harness();
    h.controller.load_surah(ten_verse_surah()).await.unwrap();
    h.controller.start().await.unwrap();
    h.controller
        .handle_transcript(&TranscriptEvent::partial("كلام غير مفهوم"))
        .await;

    let session = h.controller.stop().await.expect("session");
    assert!(session.verses_recited.is_empty());
    assert_eq!(session.accuracy_percentage, 0);
    assert_eq!(session.total_verses, 10);
    assert!(session.ended_at >= session.started_at);

    let completed = next_matching(&mut h.events, |e| {
        matches!(e, FollowAlongEvent::SessionCompleted { .. })
    })
    .await;
    assert!(matches!(
        &completed,
        FollowAlongEvent::SessionCompleted { session: s } if *s == session
    ));
    assert_eq!(h.controller.store().get_by_surah(2).await.unwrap().len(), 1);
}

#[tokio::test]
async fn accuracy_counts_distinct_verses_of_the_surah() {
    let h = harness();
    h.controller.load_surah(ten_verse_surah()).await.unwrap();
    h.controller.start().await.unwrap();

    for transcript in [
        "كلمه1 اولى1 ثانيه1 ثالثه1",
        "كلمه2 اولى2 ثانيه2 ثالثه2",
        "اه",
        "كلمه1 اولى1 ثانيه1 ثالثه1",
        "كلمه2 اولى2 ثانيه2 ثالثه2",
        "كلمه3 اولى3 ثانيه3 ثالثه3",
    ] {
        h.controller
            .handle_transcript(&TranscriptEvent::partial(transcript))
            .await;
    }

    let session = h.controller.stop().await.expect("session");
    assert_eq!(session.verses_recited, [1, 2, 1, 2, 3]);
    assert_eq!(session.accuracy_percentage, 30);
}

#[tokio::test]
async fn stop_without_surah_returns_none() {
    let h = harness();
    h.controller.start().await.unwrap();
    h.controller
        .handle_transcript(&TranscriptEvent::partial("بسم الله"))
        .await;

    assert!(h.controller.stop().await.is_none());
    assert!(h.controller.store().get_all().await.unwrap().is_empty());
    assert_eq!(h.controller.snapshot().await.status, ListeningStatus::Idle);
}

#[tokio::test]
async fn stop_while_idle_is_a_no_op() {
    let h = harness();
    h.controller.load_surah(opening_of_fatiha()).await.unwrap();
    assert!(h.controller.stop().await.is_none());
    assert_eq!(h.recognizer.stops.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn stop_resets_transient_state() {
    let h = harness();
    h.controller.load_surah(opening_of_fatiha()).await.unwrap();
    h.controller.start().await.unwrap();
    h.controller
        .handle_transcript(&TranscriptEvent::partial("بسم الله الرحمن الرحيم"))
        .await;
    h.controller.stop().await;

    let snapshot = h.controller.snapshot().await;
    assert_eq!(snapshot.status, ListeningStatus::Idle);
    assert_eq!(snapshot.matched_verse, None);
    assert_eq!(snapshot.confidence, 0.0);
    assert!(snapshot.transcript.is_empty());
    assert!(snapshot.verses_recited.is_empty());
    assert_eq!(snapshot.surah_id, Some(1));
}

#[tokio::test]
async fn daily_limit_refuses_further_starts() {
    let config = FollowAlongConfig {
        daily_session_limit: 2,
        ..FollowAlongConfig::default()
    };
    let store = Database::in_memory().unwrap().for_user("reader");
    let h = harness_with(store, config);
    h.controller.load_surah(opening_of_fatiha()).await.unwrap();

    for _ in 0..2 {
        h.controller.start().await.unwrap();
        h.controller.stop().await.expect("session");
    }
    assert_eq!(h.controller.remaining_sessions_today().await.unwrap(), Some(0));

    let refused = h.controller.start().await.unwrap_err();
    assert!(refused.is_limit_reached());
    assert!(matches!(refused, FollowAlongError::LimitReached { limit: 2, used: 2 }));

    let snapshot = h.controller.snapshot().await;
    assert_eq!(snapshot.status, ListeningStatus::Idle);
    assert!(snapshot.started_at.is_none());
    assert_eq!(h.recognizer.starts.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn unlimited_users_bypass_the_limit() {
    let config = FollowAlongConfig {
        daily_session_limit: 1,
        ..FollowAlongConfig::default()
    };
    let store = Database::in_memory().unwrap().for_user("reader");
    let h = harness_with(store, config);
    h.unlimited.store(true, Ordering::SeqCst);
    h.controller.load_surah(opening_of_fatiha()).await.unwrap();

    for _ in 0..3 {
        h.controller.start().await.unwrap();
        h.controller.stop().await.expect("session");
    }
    assert_eq!(h.controller.remaining_sessions_today().await.unwrap(), None);
}

#[tokio::test]
async fn unavailable_recognizer_leaves_session_idle() {
    let h = harness();
    h.recognizer.unavailable.store(true, Ordering::SeqCst);
    h.controller.load_surah(opening_of_fatiha()).await.unwrap();

    let err = h.controller.start().await.unwrap_err();
    assert!(matches!(err, FollowAlongError::RecognitionUnavailable(_)));
    assert_eq!(h.controller.snapshot().await.status, ListeningStatus::Idle);
    assert_eq!(h.controller.remaining_sessions_today().await.unwrap(), Some(3));
    assert!(h.controller.stop().await.is_none());
}

#[tokio::test]
async fn only_one_session_is_active() {
    let h = harness();
    h.controller.load_surah(opening_of_fatiha()).await.unwrap();
    h.controller.start().await.unwrap();

    assert!(matches!(
        h.controller.start().await,
        Err(FollowAlongError::AlreadyActive)
    ));
    assert!(matches!(
        h.controller.load_surah(ten_verse_surah()).await,
        Err(FollowAlongError::SessionActive)
    ));
    assert!(matches!(
        h.controller.clear_surah().await,
        Err(FollowAlongError::SessionActive)
    ));
    assert_eq!(h.controller.remaining_sessions_today().await.unwrap(), Some(2));
}

#[tokio::test]
async fn recognition_error_finalizes_the_session() {
    let mut h = harness();
    h.controller.load_surah(opening_of_fatiha()).await.unwrap();
    h.controller.start().await.unwrap();

    h.recognizer.say("بسم الله الرحمن الرحيم");
    next_matching(&mut h.events, is_verse_match).await;
    h.recognizer.push(RecognizerEvent::Error("network lost".into()));

    let failed = next_matching(&mut h.events, |e| {
        matches!(e, FollowAlongEvent::RecognitionFailed { .. })
    })
    .await;
    let FollowAlongEvent::RecognitionFailed { message, session } = failed else {
        unreachable!();
    };
    assert_eq!(message, "network lost");
    let session = session.expect("partial session");
    assert_eq!(session.verses_recited, [1]);
    assert_eq!(session.accuracy_percentage, 50);

    assert_eq!(h.controller.snapshot().await.status, ListeningStatus::Idle);
    assert_eq!(h.controller.store().get_all().await.unwrap(), [session]);
    assert_eq!(h.recognizer.stops.load(Ordering::SeqCst), 1);

    // A new session can start from the error state
    h.controller.start().await.unwrap();
    assert!(h.controller.stop().await.is_some());
}

#[tokio::test]
async fn recognizer_pause_and_resume_stay_active() {
    let mut h = harness();
    h.controller.load_surah(opening_of_fatiha()).await.unwrap();
    h.controller.start().await.unwrap();

    h.recognizer.push(RecognizerEvent::Paused);
    next_matching(&mut h.events, |e| {
        matches!(
            e,
            FollowAlongEvent::StateChanged { snapshot }
                if snapshot.status == ListeningStatus::Paused
        )
    })
    .await;

    h.recognizer.push(RecognizerEvent::Resumed);
    h.recognizer.say("بسم الله الرحمن الرحيم");
    next_matching(&mut h.events, |e| {
        matches!(e, FollowAlongEvent::VerseMatched { verse_number: 1, .. })
    })
    .await;
    assert_eq!(h.controller.snapshot().await.status, ListeningStatus::Listening);

    let session = h.controller.cancel().await.expect("session");
    assert_eq!(session.verses_recited, [1]);
}

#[tokio::test]
async fn ticker_counts_while_active_only() {
    let config = FollowAlongConfig {
        tick_interval_ms: 10,
        ..FollowAlongConfig::default()
    };
    let store = Database::in_memory().unwrap().for_user("reader");
    let mut h = harness_with(store, config);
    h.controller.load_surah(opening_of_fatiha()).await.unwrap();
    h.controller.start().await.unwrap();

    next_matching(&mut h.events, |e| matches!(e, FollowAlongEvent::Tick { .. })).await;
    assert!(h.controller.snapshot().await.elapsed_seconds >= 1);

    h.controller.stop().await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.controller.snapshot().await.elapsed_seconds, 0);
}

#[tokio::test]
async fn storage_failure_still_returns_the_session() {
    let h = harness_with(BrokenStore, FollowAlongConfig::default());
    h.controller.load_surah(opening_of_fatiha()).await.unwrap();

    // Usage increment fails but the session still starts
    h.controller.start().await.unwrap();
    h.controller
        .handle_transcript(&TranscriptEvent::partial("الحمد لله رب العالمين"))
        .await;

    let session = h.controller.stop().await.expect("session returned unsaved");
    assert_eq!(session.verses_recited, [2]);
    assert_eq!(session.accuracy_percentage, 50);
}

#[tokio::test]
async fn controllers_are_isolated() {
    let a = harness();
    let b = harness();
    a.controller.load_surah(opening_of_fatiha()).await.unwrap();
    b.controller.load_surah(opening_of_fatiha()).await.unwrap();

    a.controller.start().await.unwrap();
    a.controller
        .handle_transcript(&TranscriptEvent::partial("بسم الله الرحمن الرحيم"))
        .await;

    assert_eq!(b.controller.snapshot().await.status, ListeningStatus::Idle);
    a.controller.stop().await;
    assert!(b.controller.store().get_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn surah_is_locked_while_listening() {
    let h = harness();
    h.controller.load_surah(opening_of_fatiha()).await.unwrap();
    h.controller.start().await.unwrap();

    let reload = h.controller.load_surah(ten_verse_surah()).await;
    assert!(matches!(reload, Err(FollowAlongError::SessionActive)));
    let clear = h.controller.clear_surah().await;
    assert!(matches!(clear, Err(FollowAlongError::SessionActive)));

    h.controller.stop().await;
    h.controller.clear_surah().await.unwrap();
    assert!(h.controller.snapshot().await.surah_id.is_none());
}

#[tokio::test]
async fn cancel_finalizes_like_stop() {
    let h = harness();
    h.controller.load_surah(opening_of_fatiha()).await.unwrap();
    h.controller.start().await.unwrap();
    h.controller
        .handle_transcript(&TranscriptEvent::partial("بسم الله الرحمن الرحيم"))
        .await;

    let session = h.controller.cancel().await.expect("session");
    assert_eq!(session.verses_recited, [1]);
    assert_eq!(h.controller.snapshot().await.status, ListeningStatus::Idle);
    assert_eq!(h.controller.store().get_all().await.unwrap(), [session]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_waits_for_an_in_flight_start() {
    let store = SlowStore::new(Duration::from_millis(200));
    let h = harness_with(store, FollowAlongConfig::default());
    h.controller.load_surah(opening_of_fatiha()).await.unwrap();

    let starting = {
        let controller = h.controller.clone();
        tokio::spawn(async move { controller.start().await })
    };
    tokio::time::timeout(Duration::from_secs(2), async {
        while h.controller.store().increments_started.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("start never reached the usage write");

    let session = h.controller.stop().await;
    assert!(session.is_some());
    assert_eq!(h.controller.store().increments_done.load(Ordering::SeqCst), 1);
    assert!(starting.await.unwrap().is_ok());

    assert_eq!(h.controller.snapshot().await.status, ListeningStatus::Idle);
    assert_eq!(h.controller.remaining_sessions_today().await.unwrap(), Some(2));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_racing_a_recognition_error_finalizes_once() {
    let store = SlowStore::new(Duration::from_millis(50));
    let mut h = harness_with(store, FollowAlongConfig::default());
    h.controller.load_surah(opening_of_fatiha()).await.unwrap();
    h.controller.start().await.unwrap();
    h.controller
        .handle_transcript(&TranscriptEvent::partial("بسم الله الرحمن الرحيم"))
        .await;

    h.recognizer.push(RecognizerEvent::Error("network lost".into()));
    h.controller.stop().await;
    // Let a listener that lost the race observe its cancellation
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(h.controller.store().saves.load(Ordering::SeqCst), 1);
    assert_eq!(h.controller.store().get_all().await.unwrap().len(), 1);
    assert_eq!(h.recognizer.stops.load(Ordering::SeqCst), 1);

    let mut completions = 0;
    while let Ok(event) = h.events.try_recv() {
        if matches!(event, FollowAlongEvent::SessionCompleted { .. }) {
            completions += 1;
        }
    }
    assert_eq!(completions, 1);
}

#[tokio::test]
async fn recognition_error_while_idle_is_ignored() {
    let mut h = harness();
    h.controller.load_surah(opening_of_fatiha()).await.unwrap();
    while h.events.try_recv().is_ok() {}

    let session = h.controller.handle_recognition_error("late error".into()).await;
    assert!(session.is_none());
    assert!(h.events.try_recv().is_err());
    assert_eq!(h.recognizer.stops.load(Ordering::SeqCst), 0);
}
