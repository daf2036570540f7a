// src/stream/session.rs
//! Stream session lifecycle.
//!
//! `Idle → Connecting → Streaming`, with `Reconnecting` after a failed handshake or
//! a stream error. Each failure bumps `attempt_count`; once it exceeds
//! `max_attempts` the session is `Failed` and no further connect is attempted.
//! A successful handshake resets the count.

use metrics::counter;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{error, info, warn};

use super::{RawEvent, StreamHandle, StreamMessage, StreamSource};
use crate::error::SessionError;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Streaming,
    Reconnecting,
    Failed,
    /// Shut down on request.
    Stopped,
}

/// Retry budget plus bounded exponential backoff between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Retry right away, no backoff.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay before retry number `attempt` (1-based): `base * 2^(attempt-1)`, capped.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if self.base_delay.is_zero() || attempt == 0 {
            return Duration::ZERO;
        }
        let shift = (attempt - 1).min(16);
        self.base_delay
            .checked_mul(1u32 << shift)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Receives each validated event while the session is streaming.
pub type EventHandler = Box<dyn FnMut(RawEvent) + Send>;

enum StreamEnd {
    Stopped,
    Failed(String),
}

pub struct SessionManager {
    source: Arc<dyn StreamSource>,
    track: String,
    policy: RetryPolicy,
    on_event: EventHandler,
    state: SessionState,
    attempt_count: u32,
    history: Vec<SessionState>,
    shutdown: Arc<Notify>,
}

impl SessionManager {
    pub fn new(
        source: Arc<dyn StreamSource>,
        track: impl Into<String>,
        policy: RetryPolicy,
        on_event: EventHandler,
    ) -> Self {
        Self {
            source,
            track: track.into(),
            policy,
            on_event,
            state: SessionState::Idle,
            attempt_count: 0,
            history: vec![SessionState::Idle],
            shutdown: Arc::new(Notify::new()),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    /// Every state entered, in order, starting with `Idle`.
    pub fn history(&self) -> &[SessionState] {
        &self.history
    }

    /// Notify to stop the session. Safe to trigger before `run` starts.
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        Arc::clone(&self.shutdown)
    }

    /// Drive the session until shutdown (`Ok`) or retry exhaustion (`Err`).
    pub async fn run(&mut self) -> Result<(), SessionError> {
        let shutdown = Arc::clone(&self.shutdown);
        let mut last_error = String::new();
        self.enter(SessionState::Connecting);

        loop {
            match self.state {
                SessionState::Connecting => {
                    let source = Arc::clone(&self.source);
                    let attempt = tokio::select! {
                        r = source.connect(&self.track) => Some(r),
                        _ = shutdown.notified() => None,
                    };
                    let Some(attempt) = attempt else {
                        self.enter(SessionState::Stopped);
                        return Ok(());
                    };

                    match attempt {
                        Ok(handle) => {
                            info!(
                                target: "stream",
                                source = self.source.name(),
                                after_failures = self.attempt_count,
                                "stream connected"
                            );
                            self.attempt_count = 0;
                            self.enter(SessionState::Streaming);
                            match self.pump(handle, &shutdown).await {
                                StreamEnd::Stopped => {
                                    self.enter(SessionState::Stopped);
                                    return Ok(());
                                }
                                StreamEnd::Failed(err) => {
                                    last_error = err;
                                    self.record_failure(&last_error);
                                }
                            }
                        }
                        Err(e) => {
                            last_error = format!("{e:#}");
                            self.record_failure(&last_error);
                        }
                    }
                }
                SessionState::Reconnecting => {
                    if self.attempt_count > self.policy.max_attempts {
                        self.enter(SessionState::Failed);
                        error!(
                            target: "stream",
                            source = self.source.name(),
                            attempts = self.attempt_count,
                            last_error = %last_error,
                            "stream retries exhausted"
                        );
                        return Err(SessionError::RetriesExhausted {
                            attempts: self.attempt_count,
                            last_error,
                        });
                    }

                    let delay = self.policy.delay_for(self.attempt_count);
                    if !delay.is_zero() {
                        tokio::select! {
                            _ = tokio::time::sleep(delay) => {}
                            _ = shutdown.notified() => {
                                self.enter(SessionState::Stopped);
                                return Ok(());
                            }
                        }
                    }
                    self.enter(SessionState::Connecting);
                }
                SessionState::Idle
                | SessionState::Streaming
                | SessionState::Failed
                | SessionState::Stopped => return Ok(()),
            }
        }
    }

    async fn pump(&mut self, mut handle: StreamHandle, shutdown: &Notify) -> StreamEnd {
        loop {
            let msg = tokio::select! {
                m = handle.next() => m,
                _ = shutdown.notified() => return StreamEnd::Stopped,
            };
            match msg {
                Some(StreamMessage::Data(raw)) => {
                    counter!("events_received_total").increment(1);
                    match RawEvent::from_json(&raw) {
                        Ok(ev) => (self.on_event)(ev),
                        Err(e) => {
                            warn!(target: "stream", error = %e, "dropping malformed event");
                            counter!("events_malformed_total").increment(1);
                        }
                    }
                }
                Some(StreamMessage::Error(e)) => return StreamEnd::Failed(format!("{e:#}")),
                None => return StreamEnd::Failed("stream ended".to_string()),
            }
        }
    }

    fn record_failure(&mut self, err: &str) {
        self.attempt_count += 1;
        counter!("stream_reconnects_total").increment(1);
        warn!(
            target: "stream",
            source = self.source.name(),
            attempt = self.attempt_count,
            max_attempts = self.policy.max_attempts,
            error = %err,
            "stream connection failed"
        );
        self.enter(SessionState::Reconnecting);
    }

    fn enter(&mut self, next: SessionState) {
        self.state = next;
        self.history.push(next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    enum Plan {
        Refuse,
        /// Open a stream, send these payloads, then either hold it open or fail it.
        Open { payloads: Vec<&'static str>, then_error: bool },
    }

    struct ScriptedSource {
        plans: Mutex<VecDeque<Plan>>,
        connects: AtomicUsize,
        held: Mutex<Vec<mpsc::Sender<StreamMessage>>>,
    }

    impl ScriptedSource {
        fn new(plans: Vec<Plan>) -> Arc<Self> {
            Arc::new(Self {
                plans: Mutex::new(plans.into()),
                connects: AtomicUsize::new(0),
                held: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl StreamSource for ScriptedSource {
        async fn connect(&self, _track: &str) -> Result<StreamHandle> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            let plan = self.plans.lock().unwrap().pop_front().unwrap_or(Plan::Refuse);
            match plan {
                Plan::Refuse => Err(anyhow!("handshake refused")),
                Plan::Open {
                    payloads,
                    then_error,
                } => {
                    let (tx, handle) = StreamHandle::channel(16);
                    for p in payloads {
                        tx.send(StreamMessage::Data(p.to_string())).await.unwrap();
                    }
                    if then_error {
                        tx.send(StreamMessage::Error(anyhow!("reset by peer")))
                            .await
                            .unwrap();
                    } else {
                        self.held.lock().unwrap().push(tx);
                    }
                    Ok(handle)
                }
            }
        }
        fn name(&self) -> &'static str {
            "scripted"
        }
    }

    fn collecting_handler() -> (EventHandler, mpsc::UnboundedReceiver<RawEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Box::new(move |ev| {
                let _ = tx.send(ev);
            }),
            rx,
        )
    }

    fn reconnects(history: &[SessionState]) -> usize {
        history
            .windows(2)
            .filter(|w| w[0] == SessionState::Connecting && w[1] == SessionState::Reconnecting)
            .count()
    }

    const EV: &str = r#"{"id":"1","text":"rust","author_handle":"a"}"#;

    #[tokio::test]
    async fn five_failures_then_streaming() {
        let mut plans: Vec<Plan> = (0..5).map(|_| Plan::Refuse).collect();
        plans.push(Plan::Open {
            payloads: vec!["{broken", EV],
            then_error: false,
        });
        let source = ScriptedSource::new(plans);
        let (handler, mut rx) = collecting_handler();
        let mut mgr = SessionManager::new(source.clone(), "rust", RetryPolicy::immediate(5), handler);
        let stop = mgr.shutdown_handle();

        let run = tokio::spawn(async move {
            let r = mgr.run().await;
            (mgr, r)
        });

        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.id, "1");
        stop.notify_one();
        let (mgr, r) = run.await.unwrap();

        assert!(r.is_ok());
        assert_eq!(reconnects(mgr.history()), 5);
        assert_eq!(source.connects.load(Ordering::SeqCst), 6);
        let h = mgr.history();
        assert_eq!(h[h.len() - 2], SessionState::Streaming);
        assert_eq!(mgr.state(), SessionState::Stopped);
        assert_eq!(mgr.attempt_count(), 0);
        assert!(rx.try_recv().is_err(), "malformed payload must not reach the handler");
    }

    #[tokio::test]
    async fn six_failures_is_terminal() {
        let source = ScriptedSource::new((0..10).map(|_| Plan::Refuse).collect());
        let (handler, _rx) = collecting_handler();
        let mut mgr = SessionManager::new(source.clone(), "rust", RetryPolicy::immediate(5), handler);

        let err = mgr.run().await.unwrap_err();
        match err {
            SessionError::RetriesExhausted { attempts, last_error } => {
                assert_eq!(attempts, 6);
                assert!(last_error.contains("handshake refused"));
            }
        }
        assert_eq!(mgr.state(), SessionState::Failed);
        assert_eq!(source.connects.load(Ordering::SeqCst), 6);
        assert_eq!(reconnects(mgr.history()), 6);
        assert!(!mgr.history().contains(&SessionState::Streaming));
    }

    #[tokio::test]
    async fn stream_error_triggers_reconnect() {
        let source = ScriptedSource::new(vec![
            Plan::Open {
                payloads: vec![EV],
                then_error: true,
            },
            Plan::Open {
                payloads: vec![EV],
                then_error: false,
            },
        ]);
        let (handler, mut rx) = collecting_handler();
        let mut mgr = SessionManager::new(source.clone(), "rust", RetryPolicy::immediate(5), handler);
        let stop = mgr.shutdown_handle();
        let run = tokio::spawn(async move {
            let r = mgr.run().await;
            (mgr, r)
        });

        rx.recv().await.unwrap();
        rx.recv().await.unwrap();
        stop.notify_one();
        let (mgr, r) = run.await.unwrap();
        assert!(r.is_ok());
        assert_eq!(
            mgr.history(),
            &[
                SessionState::Idle,
                SessionState::Connecting,
                SessionState::Streaming,
                SessionState::Reconnecting,
                SessionState::Connecting,
                SessionState::Streaming,
                SessionState::Stopped,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_sleeps_between_attempts() {
        let source = ScriptedSource::new((0..3).map(|_| Plan::Refuse).collect());
        let (handler, _rx) = collecting_handler();
        let policy = RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
        };
        let mut mgr = SessionManager::new(source.clone(), "rust", policy, handler);
        let started = tokio::time::Instant::now();
        assert!(mgr.run().await.is_err());
        // 100ms after the first failure, 200ms after the second; none after the last.
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(300), "elapsed {elapsed:?}");
        assert!(elapsed < Duration::from_millis(350), "elapsed {elapsed:?}");
    }

    #[test]
    fn delay_is_exponential_and_capped() {
        let p = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(3),
        };
        assert_eq!(p.delay_for(1), Duration::from_millis(500));
        assert_eq!(p.delay_for(2), Duration::from_millis(1000));
        assert_eq!(p.delay_for(3), Duration::from_millis(2000));
        assert_eq!(p.delay_for(4), Duration::from_secs(3));
        assert_eq!(p.delay_for(40), Duration::from_secs(3));
        assert_eq!(RetryPolicy::immediate(5).delay_for(3), Duration::ZERO);
    }
}
