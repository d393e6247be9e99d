//! Learning Queue: bounded, deadline-aware hand-off from turns to the promoter.
//!
//! Turns post a [`LearningJob`] and return immediately. A [`LearningWorker`]
//! drains the queue on its own task, so promotion latency and failures never
//! reach the caller. Jobs own their data; a job posted by a turn whose caller
//! went away still runs.
//!
//! - Full queue: the new job is dropped and counted.
//! - Job older than its deadline when dequeued: skipped and counted.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use colloquy_core::learning::{LearningOutcome, LearningPromoter};
use colloquy_core::metrics::{spans, DialogueCounters};
use colloquy_core::types::{CharacterId, RetrievedFact};
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, Instrument};

/// One interaction awaiting a learning decision.
#[derive(Debug, Clone)]
pub struct LearningJob {
    /// Character that answered.
    pub character_id: CharacterId,
    /// The user's utterance.
    pub query: String,
    /// Facts the answer was grounded on (empty on the conversational path).
    pub facts: Vec<RetrievedFact>,
    /// The character's answer.
    pub response: String,
    /// When the job was posted.
    pub enqueued_at: Instant,
    /// How long the job stays eligible.
    pub deadline: Duration,
}

impl LearningJob {
    /// Whether the job waited past its deadline.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.enqueued_at.elapsed() > self.deadline
    }
}

/// Statistics about the learning queue.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Current queue depth.
    pub depth: usize,
    /// Total jobs accepted.
    pub total_enqueued: u64,
    /// Total jobs dropped (queue full).
    pub total_dropped: u64,
    /// Total jobs expired (deadline exceeded).
    pub total_expired: u64,
}

struct QueueInner {
    jobs: VecDeque<LearningJob>,
    capacity: usize,
    deadline: Duration,
    closed: bool,
    total_enqueued: u64,
    total_dropped: u64,
    total_expired: u64,
}

/// Thread-safe FIFO of learning jobs. Clones share state.
#[derive(Clone)]
pub struct LearningQueue {
    inner: Arc<Mutex<QueueInner>>,
    notify: Arc<Notify>,
}

impl LearningQueue {
    /// Queue holding at most `capacity` jobs, each valid for `deadline`.
    #[must_use]
    pub fn new(capacity: usize, deadline: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(QueueInner {
                jobs: VecDeque::with_capacity(capacity.min(1024)),
                capacity,
                deadline,
                closed: false,
                total_enqueued: 0,
                total_dropped: 0,
                total_expired: 0,
            })),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Post a job. Returns `false` if the queue is full or closed.
    pub fn enqueue(
        &self,
        character_id: CharacterId,
        query: String,
        facts: Vec<RetrievedFact>,
        response: String,
    ) -> bool {
        let mut inner = self.inner.lock();
        if inner.closed || inner.jobs.len() >= inner.capacity {
            inner.total_dropped += 1;
            return false;
        }

        let deadline = inner.deadline;
        inner.jobs.push_back(LearningJob {
            character_id,
            query,
            facts,
            response,
            enqueued_at: Instant::now(),
            deadline,
        });
        inner.total_enqueued += 1;
        drop(inner);

        self.notify.notify_one();
        true
    }

    /// Oldest non-expired job, skipping and counting expired ones.
    pub fn dequeue(&self) -> Option<LearningJob> {
        let mut inner = self.inner.lock();
        loop {
            let job = inner.jobs.pop_front()?;
            if job.is_expired() {
                inner.total_expired += 1;
                debug!(character = %job.character_id, "Learning job expired in queue");
                continue;
            }
            return Some(job);
        }
    }

    /// Wait for the next job. Returns `None` once the queue is closed and empty.
    pub async fn next(&self) -> Option<LearningJob> {
        loop {
            let notified = self.notify.notified();
            if let Some(job) = self.dequeue() {
                return Some(job);
            }
            if self.inner.lock().closed {
                return None;
            }
            notified.await;
        }
    }

    /// Stop accepting jobs and wake the worker so it can drain and exit.
    pub fn close(&self) {
        self.inner.lock().closed = true;
        self.notify.notify_waiters();
        self.notify.notify_one();
    }

    /// Whether [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Current queue depth.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().jobs.len()
    }

    /// Whether the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().jobs.is_empty()
    }

    /// Get queue statistics.
    #[must_use]
    pub fn stats(&self) -> QueueStats {
        let inner = self.inner.lock();
        QueueStats {
            depth: inner.jobs.len(),
            total_enqueued: inner.total_enqueued,
            total_dropped: inner.total_dropped,
            total_expired: inner.total_expired,
        }
    }
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

/// Drains a [`LearningQueue`] through a [`LearningPromoter`].
#[derive(Clone)]
pub struct LearningWorker {
    queue: LearningQueue,
    promoter: Arc<LearningPromoter>,
    counters: Arc<DialogueCounters>,
}

impl LearningWorker {
    /// Worker over `queue`.
    #[must_use]
    pub fn new(
        queue: LearningQueue,
        promoter: Arc<LearningPromoter>,
        counters: Arc<DialogueCounters>,
    ) -> Self {
        Self {
            queue,
            promoter,
            counters,
        }
    }

    /// Run on the current tokio runtime until the queue is closed and drained.
    #[must_use]
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("Learning worker started");
            while let Some(job) = self.queue.next().await {
                self.process(job).await;
            }
            info!("Learning worker stopped");
        })
    }

    /// Process every job currently queued. Returns how many were processed.
    pub async fn run_pending(&self) -> usize {
        let mut processed = 0;
        while let Some(job) = self.queue.dequeue() {
            self.process(job).await;
            processed += 1;
        }
        processed
    }

    async fn process(&self, job: LearningJob) {
        let span = tracing::debug_span!(spans::LEARN, character = %job.character_id);
        let outcome = self
            .promoter
            .consider_learning(&job.character_id, &job.query, &job.facts, &job.response)
            .instrument(span)
            .await;

        match outcome {
            LearningOutcome::Learned(fact) => {
                DialogueCounters::incr(&self.counters.promotions);
                debug!(character = %job.character_id, category = %fact.category, "Learning job promoted");
            }
            LearningOutcome::Skipped { reason } => {
                debug!(character = %job.character_id, %reason, "Learning job skipped");
            }
        }
    }
}
