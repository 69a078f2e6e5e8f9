use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::QuizError;
use crate::persistence::{load_or_default, PersistScheduler, SnapshotStore};
use crate::session::{QuizSession, Timings};
use crate::view::SessionView;
use crate::ws_protocol::WsEnvelope;

/// Shared handle used by the HTTP and WebSocket handlers. The session is the
/// only quiz state; everything else here feeds it or reports on it.
#[derive(Clone)]
pub struct AppState {
    pub session: Arc<RwLock<QuizSession>>,
    pub events: broadcast::Sender<WsEnvelope>,
    persister: Arc<Mutex<Option<PersistScheduler>>>,
    timer: Arc<Mutex<Option<JoinHandle<()>>>>,
    tick_interval: Duration,
}

impl AppState {
    /// Restores the session from `store` and starts the snapshot writer.
    /// Must be called from within a tokio runtime.
    pub fn new(config: &Config, store: Arc<dyn SnapshotStore>) -> Self {
        let mut session = QuizSession::new(Timings {
            auto_advance_delay: config.auto_advance_delay,
        });
        session.restore(load_or_default(store.as_ref()));

        let (events, _) = broadcast::channel(64);
        Self {
            session: Arc::new(RwLock::new(session)),
            events,
            persister: Arc::new(Mutex::new(Some(PersistScheduler::spawn(
                store,
                config.persist_debounce,
            )))),
            timer: Arc::new(Mutex::new(None)),
            tick_interval: config.tick_interval,
        }
    }

    pub async fn view(&self) -> SessionView {
        self.session.read().await.view()
    }

    /// Runs one command against the session. On success the new state is
    /// queued for saving and pushed to subscribers; a failed command changed
    /// nothing, so nothing is published.
    pub async fn mutate<T>(
        &self,
        command: impl FnOnce(&mut QuizSession) -> Result<T, QuizError>,
    ) -> Result<(T, SessionView), QuizError> {
        let mut session = self.session.write().await;
        let result = command(&mut *session)?;
        let view = session.view();
        self.persist(&session);
        drop(session);
        self.publish(&view);
        Ok((result, view))
    }

    fn persist(&self, session: &QuizSession) {
        let persister = self.persister.lock().unwrap_or_else(|e| e.into_inner());
        match persister.as_ref() {
            Some(scheduler) => scheduler.schedule(session.snapshot()),
            None => debug!("persistence stopped, snapshot not queued"),
        }
    }

    fn publish(&self, view: &SessionView) {
        // No receivers simply means no WebSocket client is connected.
        let _ = self.events.send(WsEnvelope::state_update(view));
    }

    /// (Re)starts the elapsed-time ticker, replacing any previous one.
    pub fn start_timer(&self) {
        let state = self.clone();
        let period = self.tick_interval;
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut last = Instant::now();
            loop {
                interval.tick().await;
                let now = Instant::now();
                state.on_tick(now - last).await;
                last = now;
            }
        });
        let previous = self
            .timer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
        debug!("timer started");
    }

    pub fn stop_timer(&self) {
        let handle = self.timer.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = handle {
            handle.abort();
            debug!("timer stopped");
        }
    }

    async fn on_tick(&self, dt: Duration) {
        let mut session = self.session.write().await;
        let outcome = session.tick(dt);
        if outcome.auto_advanced.is_some() {
            self.persist(&session);
        }
        if outcome.auto_advanced.is_some() || outcome.second_elapsed {
            let view = session.view();
            drop(session);
            self.publish(&view);
        }
    }

    /// Stops the timer and flushes the last pending snapshot.
    pub async fn shutdown(&self) {
        self.stop_timer();
        let scheduler = self.persister.lock().unwrap_or_else(|e| e.into_inner()).take();
        match scheduler {
            Some(scheduler) => {
                scheduler.shutdown().await;
                info!("snapshot writer flushed");
            }
            None => warn!("shutdown called twice"),
        }
    }
}
