//! Work queue driving the [`Reconciler`]
//!
//! The controller decides *when* a resource is reconciled; the reconciler
//! decides *what* happens in a pass.
//!
//! ## Triggers
//!
//! - every listed resource once at startup
//! - ids from the store's [`watch`](crate::traits::ResourceStore::watch) stream
//! - [`ControllerHandle::trigger`]
//! - per-resource timers armed from the previous pass
//! - the optional periodic resync
//!
//! ## Scheduling Rules
//!
//! - A key never has two passes in flight. A trigger that arrives during a
//!   pass marks the key dirty and it runs again once the pass returns.
//! - At most `max_concurrent_reconciles` passes run at once.
//! - `Ok(Action)` with a requeue arms a timer for exactly that long and
//!   clears the key's failure count. Without a requeue the timer is disarmed.
//! - `Err(_)` arms a back-off timer of `base * 2^(n-1)`, capped at `max`,
//!   where `n` counts consecutive failures.
//! - A fresh trigger replaces any armed timer.
//!
//! ## Shutdown
//!
//! On the shutdown signal intake stops. In-flight passes get
//! `shutdown_grace` to finish and are aborted after that.

use std::collections::{HashMap, HashSet, VecDeque};
use std::future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::{Id, JoinSet};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_stream::StreamExt;
use tracing::{debug, error, info, warn};

use crate::config::ControllerConfig;
use crate::error::{Error, Result};
use crate::reconciler::{Action, Reconciler};
use crate::resource::ResourceId;

/// Delay before retry number `failures` (1-based)
pub fn backoff_delay(base: Duration, max: Duration, failures: u32) -> Duration {
    let exponent = failures.saturating_sub(1);
    2u32.checked_pow(exponent)
        .and_then(|factor| base.checked_mul(factor))
        .map_or(max, |delay| delay.min(max))
}

/// Cloneable handle for enqueueing resources
#[derive(Debug, Clone)]
pub struct ControllerHandle {
    tx: mpsc::UnboundedSender<ResourceId>,
}

impl ControllerHandle {
    /// Request a pass for `id` as soon as possible
    pub fn trigger(&self, id: ResourceId) -> Result<()> {
        self.tx
            .send(id)
            .map_err(|e| Error::Other(format!("controller stopped, dropped trigger for {}", e.0)))
    }
}

/// Per-key serializing work queue
pub struct Controller {
    reconciler: Arc<Reconciler>,
    config: ControllerConfig,
    trigger_tx: mpsc::UnboundedSender<ResourceId>,
    trigger_rx: mpsc::UnboundedReceiver<ResourceId>,
}

impl Controller {
    pub fn new(reconciler: Reconciler, config: ControllerConfig) -> Result<Self> {
        config.validate()?;
        let (trigger_tx, trigger_rx) = mpsc::unbounded_channel();
        Ok(Self {
            reconciler: Arc::new(reconciler),
            config,
            trigger_tx,
            trigger_rx,
        })
    }

    pub fn handle(&self) -> ControllerHandle {
        ControllerHandle {
            tx: self.trigger_tx.clone(),
        }
    }

    /// Run until `shutdown` fires (or its sender is dropped)
    pub async fn run(self, shutdown: oneshot::Receiver<()>) -> Result<()> {
        let Controller {
            reconciler,
            config,
            trigger_tx: _trigger_tx,
            mut trigger_rx,
        } = self;

        let mut queue = Queue::new(config.max_concurrent_reconciles);
        let mut watch = reconciler.store().watch();
        let mut resync = config.resync_interval().map(|period| {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });

        let initial = reconciler.store().list().await?;
        info!(
            "Controller started with {} resource(s), max {} concurrent",
            initial.len(),
            config.max_concurrent_reconciles
        );
        for id in initial {
            queue.enqueue(id);
        }

        tokio::pin!(shutdown);
        loop {
            queue.dispatch(&reconciler);
            let next_timer = queue.next_deadline();

            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    info!("Shutdown signal received");
                    break;
                }

                Some(joined) = queue.tasks.join_next_with_id(), if !queue.tasks.is_empty() => {
                    queue.complete(joined, &config);
                }

                Some(id) = trigger_rx.recv() => {
                    debug!("Triggered {}", id);
                    queue.enqueue(id);
                }

                Some(id) = watch.next() => {
                    debug!("Change observed for {}", id);
                    queue.enqueue(id);
                }

                _ = tokio::time::sleep_until(next_timer.unwrap_or_else(far_future)),
                    if next_timer.is_some() =>
                {
                    queue.fire_due_timers(Instant::now());
                }

                _ = tick(&mut resync) => {
                    match reconciler.store().list().await {
                        Ok(ids) => {
                            debug!("Resync of {} resource(s)", ids.len());
                            for id in ids {
                                queue.enqueue(id);
                            }
                        }
                        Err(e) => error!("Resync listing failed: {}", e),
                    }
                }
            }
        }

        queue.drain(config.shutdown_grace()).await;
        info!("Controller stopped");
        Ok(())
    }
}

fn far_future() -> Instant {
    Instant::now() + Duration::from_secs(86_400)
}

async fn tick(resync: &mut Option<Interval>) {
    match resync {
        Some(interval) => {
            interval.tick().await;
        }
        None => future::pending::<()>().await,
    }
}

/// Queue bookkeeping, owned by the run loop
struct Queue {
    max_concurrent: usize,
    pending: VecDeque<ResourceId>,
    queued: HashSet<ResourceId>,
    in_flight: HashSet<ResourceId>,
    dirty: HashSet<ResourceId>,
    timers: HashMap<ResourceId, Instant>,
    failures: HashMap<ResourceId, u32>,
    running: HashMap<Id, ResourceId>,
    tasks: JoinSet<Result<Action>>,
}

impl Queue {
    fn new(max_concurrent: usize) -> Self {
        Self {
            max_concurrent,
            pending: VecDeque::new(),
            queued: HashSet::new(),
            in_flight: HashSet::new(),
            dirty: HashSet::new(),
            timers: HashMap::new(),
            failures: HashMap::new(),
            running: HashMap::new(),
            tasks: JoinSet::new(),
        }
    }

    fn enqueue(&mut self, id: ResourceId) {
        self.timers.remove(&id);
        if self.queued.insert(id.clone()) {
            self.pending.push_back(id);
        }
    }

    fn dispatch(&mut self, reconciler: &Arc<Reconciler>) {
        while self.tasks.len() < self.max_concurrent {
            let Some(id) = self.pending.pop_front() else {
                break;
            };
            self.queued.remove(&id);

            if self.in_flight.contains(&id) {
                self.dirty.insert(id);
                continue;
            }

            let reconciler = Arc::clone(reconciler);
            let key = id.clone();
            let handle = self
                .tasks
                .spawn(async move { reconciler.reconcile(&key).await });
            self.running.insert(handle.id(), id.clone());
            self.in_flight.insert(id);
        }
    }

    fn complete(
        &mut self,
        joined: std::result::Result<(Id, Result<Action>), tokio::task::JoinError>,
        config: &ControllerConfig,
    ) {
        let (task_id, outcome) = match joined {
            Ok((task_id, outcome)) => (task_id, outcome),
            Err(e) => {
                let task_id = e.id();
                let message = if e.is_panic() {
                    "reconcile pass panicked".to_string()
                } else {
                    "reconcile pass cancelled".to_string()
                };
                (task_id, Err(Error::Other(message)))
            }
        };

        let Some(id) = self.running.remove(&task_id) else {
            return;
        };
        self.in_flight.remove(&id);

        let now = Instant::now();
        match outcome {
            Ok(action) => {
                self.failures.remove(&id);
                match action.requeue_after() {
                    Some(delay) => {
                        debug!("{} requeued in {:?}", id, delay);
                        self.timers.insert(id.clone(), now + delay);
                    }
                    None => {
                        self.timers.remove(&id);
                    }
                }
            }
            Err(e) => {
                let failures = self.failures.entry(id.clone()).or_insert(0);
                *failures = failures.saturating_add(1);
                let delay = backoff_delay(
                    config.error_backoff_base(),
                    config.error_backoff_max(),
                    *failures,
                );
                warn!(
                    "{} failed ({} in a row), retrying in {:?}: {}",
                    id, failures, delay, e
                );
                self.timers.insert(id.clone(), now + delay);
            }
        }

        if self.dirty.remove(&id) {
            self.enqueue(id);
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.timers.values().min().copied()
    }

    fn fire_due_timers(&mut self, now: Instant) {
        let due: Vec<ResourceId> = self
            .timers
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(id, _)| id.clone())
            .collect();
        for id in due {
            self.enqueue(id);
        }
    }

    async fn drain(&mut self, grace: Duration) {
        if self.tasks.is_empty() {
            return;
        }

        info!(
            "Waiting up to {:?} for {} in-flight pass(es)",
            grace,
            self.tasks.len()
        );
        let finished = tokio::time::timeout(grace, async {
            while self.tasks.join_next().await.is_some() {}
        })
        .await;

        if finished.is_err() {
            warn!("Aborting {} pass(es) still running", self.tasks.len());
            self.tasks.abort_all();
            while self.tasks.join_next().await.is_some() {}
        }
    }
}
