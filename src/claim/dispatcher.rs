// ============================================================================
// Claim Dispatcher
// ============================================================================
//
// Fans consumed messages out to one claim task per (topic, partition):
//
//   - at most one live claim per partition; a revoked partition's claim is
//     joined before the partition is claimed again, and its messages are
//     held back until then
//   - bounded channel per claim; when it is full the partition is paused and
//     messages queue locally, in offset order, until the claim catches up
//   - a failed claim restarts alone: its partition is rewound to the last
//     commit and stays paused for a cool-down while siblings keep running
//
// Broker calls go through PartitionControl, so the same logic runs against
// an in-memory fake.
//
// ============================================================================

use anyhow::{Context, Result, anyhow};
use futures_util::FutureExt;
use std::collections::{HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::{JoinError, JoinSet};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use validator_metrics::CLAIM_RESTARTS_TOTAL;

use super::{Claim, ClaimHandler, ClaimSession, run_claim};
use crate::error::{ClaimError, ClaimResult};
use crate::kafka::MessageEnvelope;
use crate::shutdown::{Shutdown, ShutdownTrigger};

/// Messages buffered per claim before its partition is paused
pub const CLAIM_BUFFER: usize = 64;
/// How long a failed partition stays paused before it is claimed again
pub const RESTART_DELAY: Duration = Duration::from_secs(5);

pub type ClaimKey = (String, i32);
pub type WorkerExit = (ClaimKey, u64, ClaimResult<()>);

/// Broker operations the dispatcher performs on a single partition
pub trait PartitionControl: Send + Sync + 'static {
    fn pause(&self, key: &ClaimKey) -> Result<()>;

    fn resume(&self, key: &ClaimKey) -> Result<()>;

    /// Reposition the partition at its last committed offset
    fn rewind_to_committed(&self, key: &ClaimKey) -> Result<()>;

    /// Session for a new claim on `key`. The claim's rewinds bump `epoch`;
    /// the dispatcher tags every message it hands over with its current value.
    fn session(
        &self,
        key: &ClaimKey,
        shutdown: Shutdown,
        epoch: Arc<AtomicU64>,
    ) -> Box<dyn ClaimSession>;
}

// ============================================================================
// Registry
// ============================================================================

/// Set once a claim task has finished, however it finished
#[derive(Default)]
struct Completion {
    done: Mutex<bool>,
    cond: Condvar,
}

impl Completion {
    fn finish(&self) {
        *self.done.lock().unwrap_or_else(PoisonError::into_inner) = true;
        self.cond.notify_all();
    }

    /// Block until finished or `timeout` passes. Returns whether it finished.
    fn wait(&self, timeout: Duration) -> bool {
        let done = self.done.lock().unwrap_or_else(PoisonError::into_inner);
        let (done, _) = self
            .cond
            .wait_timeout_while(done, timeout, |done| !*done)
            .unwrap_or_else(PoisonError::into_inner);
        *done
    }
}

struct FinishOnDrop(Arc<Completion>);

impl Drop for FinishOnDrop {
    fn drop(&mut self) {
        self.0.finish();
    }
}

struct RegisteredClaim {
    id: u64,
    trigger: ShutdownTrigger,
    done: Arc<Completion>,
}

/// Running claims, shared between the dispatcher and the rebalance callback
#[derive(Default)]
pub struct ClaimRegistry {
    claims: Mutex<HashMap<ClaimKey, RegisteredClaim>>,
    revoked: Mutex<Vec<ClaimKey>>,
}

impl ClaimRegistry {
    fn register(&self, key: ClaimKey, claim: RegisteredClaim) {
        self.lock_claims().insert(key, claim);
    }

    fn unregister(&self, key: &ClaimKey, id: u64) {
        let mut claims = self.lock_claims();
        if claims.get(key).is_some_and(|claim| claim.id == id) {
            claims.remove(key);
        }
    }

    fn stop_all(&self) {
        for claim in self.lock_claims().values() {
            claim.trigger.trigger();
        }
    }

    /// Stop the claims on `keys` and block until each has finished, for at
    /// most `timeout` in total.
    ///
    /// Called from the consumer's rebalance callback: once it returns, no
    /// claim in this process reads or commits the revoked partitions.
    pub fn revoke(&self, keys: &[ClaimKey], timeout: Duration) {
        let stopping: Vec<(ClaimKey, Arc<Completion>)> = {
            let mut claims = self.lock_claims();
            keys.iter()
                .filter_map(|key| {
                    claims.remove(key).map(|claim| {
                        claim.trigger.trigger();
                        (key.clone(), claim.done)
                    })
                })
                .collect()
        };
        self.revoked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(keys.iter().cloned());

        if stopping.is_empty() {
            return;
        }
        info!(claims = stopping.len(), "Waiting for revoked claims to finish");

        let wait = || {
            let deadline = std::time::Instant::now() + timeout;
            for (key, done) in &stopping {
                let left = deadline.saturating_duration_since(std::time::Instant::now());
                if !done.wait(left) {
                    warn!(
                        topic = %key.0,
                        partition = key.1,
                        timeout = ?timeout,
                        "Revoked claim still running; giving the partition up anyway"
                    );
                }
            }
        };

        // Blocking a runtime worker would strand the tasks queued on it
        match Handle::try_current() {
            Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
                tokio::task::block_in_place(wait)
            }
            _ => wait(),
        }
    }

    /// Partitions revoked since the last call
    pub fn take_revoked(&self) -> Vec<ClaimKey> {
        std::mem::take(&mut *self.revoked.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn lock_claims(&self) -> MutexGuard<'_, HashMap<ClaimKey, RegisteredClaim>> {
        self.claims.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

struct Worker {
    id: u64,
    tx: mpsc::Sender<MessageEnvelope>,
    epoch: Arc<AtomicU64>,
    pending: VecDeque<MessageEnvelope>,
    paused: bool,
}

/// Revoked claim whose task has not been joined yet
struct Retiring {
    id: u64,
    held: VecDeque<MessageEnvelope>,
    paused: bool,
}

pub struct Dispatcher<P: PartitionControl> {
    partitions: Arc<P>,
    handler: Arc<dyn ClaimHandler>,
    shutdown: Shutdown,
    registry: Arc<ClaimRegistry>,
    workers: HashMap<ClaimKey, Worker>,
    retiring: HashMap<ClaimKey, Retiring>,
    restarting: HashMap<ClaimKey, Instant>,
    tasks: JoinSet<WorkerExit>,
    next_id: u64,
    buffer: usize,
    restart_delay: Duration,
}

impl<P: PartitionControl> Dispatcher<P> {
    pub fn new(
        partitions: Arc<P>,
        handler: Arc<dyn ClaimHandler>,
        shutdown: Shutdown,
        registry: Arc<ClaimRegistry>,
    ) -> Self {
        Self {
            partitions,
            handler,
            shutdown,
            registry,
            workers: HashMap::new(),
            retiring: HashMap::new(),
            restarting: HashMap::new(),
            tasks: JoinSet::new(),
            next_id: 0,
            buffer: CLAIM_BUFFER,
            restart_delay: RESTART_DELAY,
        }
    }

    pub fn with_buffer(mut self, buffer: usize) -> Self {
        self.buffer = buffer.max(1);
        self
    }

    pub fn with_restart_delay(mut self, delay: Duration) -> Self {
        self.restart_delay = delay;
        self
    }

    /// Partitions with a running claim
    pub fn active_claims(&self) -> usize {
        self.workers.len()
    }

    /// Hand a consumed message to its partition's claim, starting one if needed
    pub fn dispatch(&mut self, envelope: MessageEnvelope) {
        let key = envelope.claim_key();

        if self.restarting.contains_key(&key) {
            // Fetched before the rewind; the partition is read again on resume
            debug!(
                topic = %key.0,
                partition = key.1,
                offset = envelope.offset,
                "Partition restarting; dropping prefetched message"
            );
            return;
        }

        if let Some(retiring) = self.retiring.get_mut(&key) {
            retiring.held.push_back(envelope);
            if !retiring.paused {
                retiring.paused = pause(&*self.partitions, &key);
            }
            return;
        }

        if !self.workers.contains_key(&key) {
            let worker = self.spawn_worker(&key, VecDeque::new(), false);
            self.workers.insert(key.clone(), worker);
        }

        let partitions = &*self.partitions;
        if let Some(worker) = self.workers.get_mut(&key) {
            worker.hand_over(partitions, &key, envelope);
        }
    }

    /// Forget the claims of revoked partitions. The registry has already
    /// stopped them; until their tasks are joined, new messages for those
    /// partitions are held.
    pub fn retire(&mut self, keys: Vec<ClaimKey>) {
        for key in keys {
            self.restarting.remove(&key);

            if let Some(worker) = self.workers.remove(&key) {
                info!(
                    topic = %key.0,
                    partition = key.1,
                    dropped = worker.pending.len(),
                    "Partition revoked; claim retired"
                );
                self.retiring.insert(
                    key,
                    Retiring {
                        id: worker.id,
                        held: VecDeque::new(),
                        paused: false,
                    },
                );
            } else if let Some(retiring) = self.retiring.get_mut(&key) {
                // Revoked again before the old claim was joined
                retiring.held.clear();
                retiring.paused = false;
            }
        }
    }

    /// Next finished claim task; `None` while no claim is running
    pub async fn join_next(&mut self) -> Option<Result<WorkerExit, JoinError>> {
        self.tasks.join_next().await
    }

    /// Account for a finished claim task.
    ///
    /// A failed claim is restarted on its own. Only a task that could not be
    /// joined, or a partition that cannot be rewound, is returned as an error.
    pub fn on_worker_done(&mut self, done: Result<WorkerExit, JoinError>) -> Result<()> {
        let (key, id, result) =
            done.map_err(|e| anyhow!("claim task could not be joined: {}", e))?;
        self.registry.unregister(&key, id);

        if self.retiring.get(&key).is_some_and(|retiring| retiring.id == id) {
            if let Err(e) = &result {
                warn!(
                    topic = %key.0,
                    partition = key.1,
                    error_code = e.error_code(),
                    error = %e,
                    "Revoked claim ended with an error"
                );
            }
            if let Some(retiring) = self.retiring.remove(&key) {
                if !retiring.held.is_empty() {
                    let mut worker = self.spawn_worker(&key, retiring.held, retiring.paused);
                    worker.flush(&*self.partitions, &key);
                    self.workers.insert(key, worker);
                }
            }
            return Ok(());
        }

        // Claims retired and rejoined since are no longer tracked here
        if !self.workers.get(&key).is_some_and(|worker| worker.id == id) {
            return Ok(());
        }
        let Some(worker) = self.workers.remove(&key) else {
            return Ok(());
        };

        match result {
            Ok(()) => {
                debug!(topic = %key.0, partition = key.1, "Claim closed");
                if worker.paused {
                    resume(&*self.partitions, &key);
                }
            }
            Err(e) => {
                CLAIM_RESTARTS_TOTAL
                    .with_label_values(&[e.error_code()])
                    .inc();
                error!(
                    topic = %key.0,
                    partition = key.1,
                    error_code = e.error_code(),
                    error = %e,
                    dropped = worker.pending.len(),
                    "Claim failed; restarting partition from its last commit"
                );

                let paused = worker.paused || pause(&*self.partitions, &key);
                self.partitions
                    .rewind_to_committed(&key)
                    .with_context(|| format!("Failed to rewind {}/{} after claim failure", key.0, key.1))?;
                if paused {
                    self.restarting
                        .insert(key, Instant::now() + self.restart_delay);
                }
            }
        }
        Ok(())
    }

    /// Periodic upkeep: drain queued messages into claims that caught up and
    /// resume partitions whose restart cool-down is over
    pub fn maintain(&mut self) {
        let now = Instant::now();
        let ready: Vec<ClaimKey> = self
            .restarting
            .iter()
            .filter(|(_, at)| **at <= now)
            .map(|(key, _)| key.clone())
            .collect();
        for key in ready {
            if resume(&*self.partitions, &key) {
                self.restarting.remove(&key);
                info!(topic = %key.0, partition = key.1, "Partition resumed after claim failure");
            }
        }

        let partitions = &*self.partitions;
        for (key, worker) in self.workers.iter_mut() {
            worker.flush(partitions, key);
        }
    }

    /// Stop every claim and wait for all of them
    pub async fn shutdown(mut self) -> Result<()> {
        self.registry.stop_all();
        self.workers.clear();
        self.retiring.clear();

        let mut outcome = Ok(());
        while let Some(done) = self.tasks.join_next().await {
            match done {
                Ok((key, _, Err(e))) => {
                    error!(
                        topic = %key.0,
                        partition = key.1,
                        error_code = e.error_code(),
                        error = %e,
                        "Claim failed during shutdown"
                    );
                }
                Ok(_) => {}
                Err(e) => {
                    error!(error = %e, "Claim task could not be joined");
                    if outcome.is_ok() {
                        outcome = Err(anyhow!("claim task could not be joined: {}", e));
                    }
                }
            }
        }
        outcome
    }

    fn spawn_worker(
        &mut self,
        key: &ClaimKey,
        pending: VecDeque<MessageEnvelope>,
        paused: bool,
    ) -> Worker {
        let id = self.next_id;
        self.next_id += 1;

        let (trigger, claim_shutdown) = self.shutdown.child();
        let (tx, rx) = mpsc::channel(self.buffer);
        let epoch = Arc::new(AtomicU64::new(0));
        let session = self
            .partitions
            .session(key, claim_shutdown, Arc::clone(&epoch));
        let mut claim = Claim::new(key.0.clone(), key.1, rx);
        let handler = Arc::clone(&self.handler);

        let done = Arc::new(Completion::default());
        self.registry.register(
            key.clone(),
            RegisteredClaim {
                id,
                trigger,
                done: Arc::clone(&done),
            },
        );

        let key = key.clone();
        debug!(topic = %key.0, partition = key.1, claim_id = id, "Claim started");
        self.tasks.spawn(async move {
            let _finished = FinishOnDrop(done);
            let result = AssertUnwindSafe(run_claim(handler.as_ref(), &*session, &mut claim))
                .catch_unwind()
                .await
                .unwrap_or_else(|_| {
                    Err(ClaimError::Panicked {
                        topic: key.0.clone(),
                        partition: key.1,
                    })
                });
            (key, id, result)
        });

        Worker {
            id,
            tx,
            epoch,
            pending,
            paused,
        }
    }
}

impl Worker {
    /// Queue `envelope` behind anything already pending; pause the partition
    /// once the claim's channel is full
    fn hand_over<P: PartitionControl>(
        &mut self,
        partitions: &P,
        key: &ClaimKey,
        mut envelope: MessageEnvelope,
    ) {
        envelope.epoch = self.epoch.load(Ordering::SeqCst);

        if !self.pending.is_empty() {
            self.pending.push_back(envelope);
            return;
        }

        match self.tx.try_send(envelope) {
            Ok(()) => {}
            Err(TrySendError::Full(envelope)) => {
                self.pending.push_back(envelope);
                if !self.paused {
                    self.paused = pause(partitions, key);
                }
            }
            Err(TrySendError::Closed(envelope)) => {
                debug!(
                    topic = %key.0,
                    partition = key.1,
                    offset = envelope.offset,
                    "Claim already closed; message left uncommitted"
                );
            }
        }
    }

    fn flush<P: PartitionControl>(&mut self, partitions: &P, key: &ClaimKey) {
        while let Some(envelope) = self.pending.pop_front() {
            match self.tx.try_send(envelope) {
                Ok(()) => {}
                Err(TrySendError::Full(envelope)) => {
                    self.pending.push_front(envelope);
                    break;
                }
                Err(TrySendError::Closed(_)) => {
                    self.pending.clear();
                    break;
                }
            }
        }

        if self.paused && self.pending.is_empty() && resume(partitions, key) {
            self.paused = false;
        }
    }
}

fn pause<P: PartitionControl>(partitions: &P, key: &ClaimKey) -> bool {
    match partitions.pause(key) {
        Ok(()) => {
            debug!(topic = %key.0, partition = key.1, "Partition paused");
            true
        }
        Err(e) => {
            warn!(error = %e, topic = %key.0, partition = key.1, "Failed to pause partition");
            false
        }
    }
}

fn resume<P: PartitionControl>(partitions: &P, key: &ClaimKey) -> bool {
    match partitions.resume(key) {
        Ok(()) => {
            debug!(topic = %key.0, partition = key.1, "Partition resumed");
            true
        }
        Err(e) => {
            warn!(error = %e, topic = %key.0, partition = key.1, "Failed to resume partition");
            false
        }
    }
}
