//! Polling listener shared by the capture adapters.
//!
//! A [`ListenerSlot`] holds at most one running poll task. Starting it while
//! a task is alive is a no-op, so each adapter instance owns a single
//! platform connection no matter how often `start_listening` is called.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use tacit_core::{Result, ThreadNotification, ThreadRef};

/// Source of "threads changed since" events for one platform.
#[async_trait]
pub trait ThreadPoller: Send + Sync + 'static {
    async fn poll(&self, since: DateTime<Utc>) -> Result<Vec<ThreadRef>>;
}

struct RunningListener {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

pub struct ListenerSlot {
    adapter: String,
    interval: Duration,
    running: Mutex<Option<RunningListener>>,
    active: Arc<AtomicBool>,
    connections: AtomicUsize,
}

impl ListenerSlot {
    pub fn new(adapter: impl Into<String>, interval: Duration) -> Self {
        Self {
            adapter: adapter.into(),
            interval,
            running: Mutex::new(None),
            active: Arc::new(AtomicBool::new(false)),
            connections: AtomicUsize::new(0),
        }
    }

    /// Spawn the poll task unless one is already running. Returns whether a
    /// new task was started.
    pub async fn start(
        &self,
        poller: Arc<dyn ThreadPoller>,
        notifications: mpsc::Sender<ThreadNotification>,
    ) -> bool {
        let mut running = self.running.lock().await;
        if let Some(existing) = running.as_ref() {
            if !existing.task.is_finished() {
                debug!(
                    subsystem = "integrations",
                    component = "listener",
                    adapter = %self.adapter,
                    "Listener already running"
                );
                return false;
            }
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let adapter = self.adapter.clone();
        let interval = self.interval;
        let active = Arc::clone(&self.active);
        active.store(true, Ordering::SeqCst);
        self.connections.fetch_add(1, Ordering::SeqCst);

        let task = tokio::spawn(async move {
            poll_loop(adapter, interval, poller, notifications, stop_rx).await;
            active.store(false, Ordering::SeqCst);
        });

        info!(
            subsystem = "integrations",
            component = "listener",
            adapter = %self.adapter,
            interval_secs = self.interval.as_secs(),
            "Listener started"
        );
        *running = Some(RunningListener {
            stop: stop_tx,
            task,
        });
        true
    }

    /// Stop the poll task and wait for it to exit. Returns whether a task was
    /// running.
    pub async fn stop(&self) -> bool {
        let Some(listener) = self.running.lock().await.take() else {
            return false;
        };
        let _ = listener.stop.send(true);
        if let Err(e) = listener.task.await {
            warn!(
                subsystem = "integrations",
                component = "listener",
                adapter = %self.adapter,
                error = %e,
                "Listener task ended abnormally"
            );
        }
        self.active.store(false, Ordering::SeqCst);
        info!(
            subsystem = "integrations",
            component = "listener",
            adapter = %self.adapter,
            "Listener stopped"
        );
        true
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Number of platform connections opened over this slot's lifetime.
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

async fn poll_loop(
    adapter: String,
    interval: Duration,
    poller: Arc<dyn ThreadPoller>,
    notifications: mpsc::Sender<ThreadNotification>,
    mut stop: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut since = Utc::now();

    loop {
        tokio::select! {
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                let polled_at = Utc::now();
                match poller.poll(since).await {
                    Ok(refs) => {
                        since = polled_at;
                        for thread_ref in refs {
                            let note = ThreadNotification {
                                adapter: adapter.clone(),
                                thread_ref,
                                observed_at: polled_at,
                            };
                            if notifications.send(note).await.is_err() {
                                debug!(adapter = %adapter, "Notification receiver dropped; listener exiting");
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        warn!(
                            subsystem = "integrations",
                            component = "listener",
                            adapter = %adapter,
                            error = %e,
                            "Poll failed; retrying next tick"
                        );
                    }
                }
            }
        }
    }
}
