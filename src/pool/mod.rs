//! Worker pool executing jobs with bounded concurrency.
//!
//! A fixed number of slots each own a long-lived [`Tab`]. Slots advertise
//! themselves through a pool of "free slot" senders; a dispatch loop routes
//! each job to whichever slot frees up first. Callers of
//! [`WorkerPool::add`] block while every slot is busy; that is the
//! pipeline's backpressure point.
//!
//! # Failure Semantics
//!
//! A job handler error never crashes the pool: it is logged, the job counts
//! as completed (failed), and the slot is recycled. Failed jobs are not
//! re-queued; retrying is the caller's decision.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::Rng;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::browser::{Tab, TabOpener};
use crate::error::{Error, Result};
use crate::spider::Post;

// ============================================================================
// Job
// ============================================================================

/// One unit of crawl output to be fetched and saved.
#[derive(Debug, Clone)]
pub struct Job {
    /// The post this job archives.
    pub post: Post,
}

impl Job {
    /// Creates a job for a post.
    #[inline]
    #[must_use]
    pub fn new(post: Post) -> Self {
        Self { post }
    }
}

// ============================================================================
// JobHandler
// ============================================================================

/// Executes one job on a slot's tab.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Runs the job to completion.
    ///
    /// Errors are reported by the slot; they do not stop the pool.
    async fn run(&self, tab: &Tab, job: Job) -> Result<()>;
}

// ============================================================================
// WorkerPool
// ============================================================================

/// A fixed-size pool of tabs executing jobs.
pub struct WorkerPool {
    /// Hand-off to the dispatch loop. Capacity 1: with every slot busy and
    /// one job already waiting for a free slot, `add` blocks.
    job_tx: mpsc::Sender<Job>,
    /// Count of added-but-not-completed jobs.
    outstanding: watch::Sender<usize>,
    /// Stops slot loops and the dispatch loop.
    stop: CancellationToken,
    /// Slot and dispatch tasks, joined by [`WorkerPool::stop`].
    tasks: Mutex<Vec<JoinHandle<()>>>,
    size: usize,
}

impl WorkerPool {
    /// Opens `size` tabs and starts the pool.
    ///
    /// Each slot owns one tab for its whole lifetime. The pool observes
    /// `cancel` and shuts down when it fires.
    ///
    /// # Errors
    ///
    /// Returns an error if any tab cannot be opened; tabs opened so far are
    /// closed again.
    pub async fn start(
        opener: &dyn TabOpener,
        size: usize,
        worker_delay: Duration,
        handler: Arc<dyn JobHandler>,
        cancel: &CancellationToken,
    ) -> Result<Self> {
        if size == 0 {
            return Err(Error::config("worker pool size must be at least 1"));
        }

        let stop = cancel.child_token();
        let (free_tx, free_rx) = mpsc::channel::<mpsc::Sender<Job>>(size);
        let (job_tx, job_rx) = mpsc::channel::<Job>(1);
        let (outstanding, _) = watch::channel(0usize);

        let mut tabs = Vec::with_capacity(size);
        for _ in 0..size {
            match opener.open_tab().await {
                Ok(tab) => {
                    if let Err(e) = tab.enable_lifecycle_events().await {
                        warn!(error = %e, "lifecycle events unavailable, falling back to fixed waits");
                    }
                    tabs.push(tab);
                }
                Err(e) => {
                    for tab in &tabs {
                        tab.close().await;
                    }
                    return Err(e);
                }
            }
        }

        let mut tasks = Vec::with_capacity(size + 1);
        for (slot, tab) in tabs.into_iter().enumerate() {
            tasks.push(tokio::spawn(Self::slot_loop(
                slot,
                tab,
                free_tx.clone(),
                Arc::clone(&handler),
                outstanding.clone(),
                worker_delay,
                stop.clone(),
            )));
        }
        tasks.push(tokio::spawn(Self::dispatch_loop(
            job_rx,
            free_rx,
            outstanding.clone(),
            stop.clone(),
        )));

        info!(size, "worker pool started");
        Ok(Self {
            job_tx,
            outstanding,
            stop,
            tasks: Mutex::new(tasks),
            size,
        })
    }

    /// Returns the configured pool size.
    #[inline]
    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Submits a job, blocking while the pool is saturated.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Job`] if the pool has stopped.
    pub async fn add(&self, job: Job) -> Result<()> {
        self.outstanding.send_modify(|n| *n += 1);

        if self.job_tx.send(job).await.is_err() {
            self.outstanding.send_modify(|n| *n = n.saturating_sub(1));
            return Err(Error::job("worker pool is stopped"));
        }
        Ok(())
    }

    /// Blocks until every added job has completed (successfully or with a
    /// logged failure).
    pub async fn wait(&self) {
        let mut rx = self.outstanding.subscribe();
        let _ = rx.wait_for(|n| *n == 0).await;
    }

    /// Stops every slot and joins all pool tasks.
    ///
    /// Each slot closes its tab on the way out, so no connections are
    /// orphaned.
    pub async fn stop(&self) {
        debug!("worker pool stopping");
        self.stop.cancel();

        let tasks: Vec<_> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            let _ = task.await;
        }
        info!("worker pool stopped");
    }
}

// ============================================================================
// WorkerPool - Slot Loop
// ============================================================================

impl WorkerPool {
    /// One slot: advertise, take a job, run it, throttle, repeat.
    async fn slot_loop(
        slot: usize,
        tab: Tab,
        free_tx: mpsc::Sender<mpsc::Sender<Job>>,
        handler: Arc<dyn JobHandler>,
        outstanding: watch::Sender<usize>,
        worker_delay: Duration,
        stop: CancellationToken,
    ) {
        let (my_tx, mut my_rx) = mpsc::channel::<Job>(1);

        loop {
            // Advertise this slot as free.
            tokio::select! {
                _ = stop.cancelled() => break,
                sent = free_tx.send(my_tx.clone()) => {
                    if sent.is_err() {
                        break;
                    }
                }
            }

            let job = tokio::select! {
                _ = stop.cancelled() => break,
                job = my_rx.recv() => match job {
                    Some(job) => job,
                    None => break,
                },
            };

            let link = job.post.link.clone();
            debug!(slot, link = %link, "job started");
            if let Err(e) = handler.run(&tab, job).await {
                warn!(slot, link = %link, error = %e, "job failed");
            } else {
                debug!(slot, link = %link, "job finished");
            }
            outstanding.send_modify(|n| *n = n.saturating_sub(1));

            // Wait a bit before re-entering the pool, to be nice to the
            // remote target.
            let delay = jitter(worker_delay);
            if !delay.is_zero() {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }

        tab.close().await;
        debug!(slot, "slot stopped");
    }

    /// Routes each job to the next free slot.
    async fn dispatch_loop(
        mut job_rx: mpsc::Receiver<Job>,
        mut free_rx: mpsc::Receiver<mpsc::Sender<Job>>,
        outstanding: watch::Sender<usize>,
        stop: CancellationToken,
    ) {
        loop {
            let job = tokio::select! {
                _ = stop.cancelled() => break,
                job = job_rx.recv() => match job {
                    Some(job) => job,
                    None => break,
                },
            };

            // Blocks while every slot is busy; `add` callers queue up behind
            // this.
            let slot_tx = tokio::select! {
                _ = stop.cancelled() => break,
                slot = free_rx.recv() => match slot {
                    Some(slot) => slot,
                    None => break,
                },
            };

            if slot_tx.send(job).await.is_err() {
                warn!("slot vanished while dispatching job");
                outstanding.send_modify(|n| *n = n.saturating_sub(1));
            }
        }
        debug!("dispatch loop stopped");
    }
}

/// Randomized throttle: `delay/2 + rand(0..delay)`.
fn jitter(delay: Duration) -> Duration {
    let ms = delay.as_millis() as u64;
    if ms == 0 {
        return Duration::ZERO;
    }
    let extra = rand::rng().random_range(0..ms);
    Duration::from_millis(ms / 2 + extra)
}

// ============================================================================
// Tests
// ============================================================================
