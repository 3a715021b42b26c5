//! Summary job queue and worker pool.
//!
//! The chat engine enqueues jobs without awaiting them. Jobs for a
//! conversation already waiting in the queue are coalesced, and a full queue
//! drops the job. Workers re-check the refresh policy before calling the
//! completion backend.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Mutex, Notify, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::chat::core::config::SummaryConfig;
use crate::chat::core::ids::{ConversationId, UserId};
use crate::chat::summarization::summarizer::{SummaryOutcome, Summarizer};

/// Request to refresh one conversation's summary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SummaryJob {
    /// Conversation to summarize.
    pub conversation_id: ConversationId,
    /// Owner of the conversation.
    pub user_id: UserId,
}

/// Result of an enqueue attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// Job accepted.
    Queued,
    /// A job for the same conversation is already waiting.
    Coalesced,
    /// Queue full or closed.
    Dropped,
}

/// Producer side of the summary queue.
#[derive(Clone)]
pub struct SummaryQueue {
    tx: mpsc::Sender<SummaryJob>,
    pending: Arc<DashMap<ConversationId, UserId>>,
}

impl SummaryQueue {
    /// Enqueue a job without waiting.
    pub fn enqueue(&self, job: SummaryJob) -> EnqueueOutcome {
        if self
            .pending
            .insert(job.conversation_id, job.user_id)
            .is_some()
        {
            debug!(conversation_id = %job.conversation_id, "Summary job coalesced");
            return EnqueueOutcome::Coalesced;
        }

        match self.tx.try_send(job) {
            Ok(()) => EnqueueOutcome::Queued,
            Err(TrySendError::Full(job)) => {
                self.pending.remove(&job.conversation_id);
                warn!(conversation_id = %job.conversation_id, "Summary queue full, job dropped");
                EnqueueOutcome::Dropped
            }
            Err(TrySendError::Closed(job)) => {
                self.pending.remove(&job.conversation_id);
                debug!(conversation_id = %job.conversation_id, "Summary queue closed, job dropped");
                EnqueueOutcome::Dropped
            }
        }
    }

    /// Number of jobs waiting for a worker.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

/// Consumer side: spawns the worker pool.
pub struct SummaryWorkers {
    rx: Arc<Mutex<mpsc::Receiver<SummaryJob>>>,
    pending: Arc<DashMap<ConversationId, UserId>>,
    summarizer: Arc<Summarizer>,
    workers: usize,
}

/// Create a bounded summary queue and its workers.
#[must_use]
pub fn summary_queue(
    summarizer: Arc<Summarizer>,
    config: &SummaryConfig,
) -> (SummaryQueue, SummaryWorkers) {
    let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
    let pending = Arc::new(DashMap::new());
    (
        SummaryQueue {
            tx,
            pending: Arc::clone(&pending),
        },
        SummaryWorkers {
            rx: Arc::new(Mutex::new(rx)),
            pending,
            summarizer,
            workers: config.workers.max(1),
        },
    )
}

impl SummaryWorkers {
    /// Spawn the worker tasks.
    #[must_use]
    pub fn spawn(self) -> SummaryWorkerHandle {
        let shutdown = Arc::new(Notify::new());
        let stopped = Arc::new(AtomicBool::new(false));
        info!(workers = self.workers, "Starting summary workers");

        let tasks = (0..self.workers)
            .map(|worker| {
                let worker_loop = WorkerLoop {
                    worker,
                    rx: Arc::clone(&self.rx),
                    pending: Arc::clone(&self.pending),
                    summarizer: Arc::clone(&self.summarizer),
                    shutdown: Arc::clone(&shutdown),
                    stopped: Arc::clone(&stopped),
                };
                tokio::spawn(worker_loop.run())
            })
            .collect();

        SummaryWorkerHandle {
            shutdown,
            stopped,
            tasks,
        }
    }
}

/// Handle used to stop the worker pool.
pub struct SummaryWorkerHandle {
    shutdown: Arc<Notify>,
    stopped: Arc<AtomicBool>,
    tasks: Vec<JoinHandle<()>>,
}

impl SummaryWorkerHandle {
    /// Signal every worker to stop and wait for them.
    ///
    /// A job already being summarized runs to completion; queued jobs are
    /// dropped.
    pub async fn shutdown(self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.shutdown.notify_waiters();
        for task in self.tasks {
            if let Err(err) = task.await {
                warn!(?err, "Summary worker panicked");
            }
        }
        info!("Summary workers stopped");
    }
}

struct WorkerLoop {
    worker: usize,
    rx: Arc<Mutex<mpsc::Receiver<SummaryJob>>>,
    pending: Arc<DashMap<ConversationId, UserId>>,
    summarizer: Arc<Summarizer>,
    shutdown: Arc<Notify>,
    stopped: Arc<AtomicBool>,
}

impl WorkerLoop {
    async fn run(self) {
        loop {
            let notified = self.shutdown.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.stopped.load(Ordering::SeqCst) {
                break;
            }

            let job = tokio::select! {
                job = next_job(&self.rx) => job,
                () = &mut notified => break,
            };
            let Some(job) = job else {
                break;
            };
            self.pending.remove(&job.conversation_id);
            self.process(job).await;
        }
        debug!(worker = self.worker, "Summary worker shutting down");
    }

    async fn process(&self, job: SummaryJob) {
        match self
            .summarizer
            .refresh(job.conversation_id, job.user_id)
            .await
        {
            Ok(SummaryOutcome::Updated) => {
                info!(worker = self.worker, conversation_id = %job.conversation_id, "Summary updated");
            }
            Ok(outcome) => {
                debug!(worker = self.worker, conversation_id = %job.conversation_id, ?outcome, "Summary not updated");
            }
            Err(err) => {
                warn!(worker = self.worker, conversation_id = %job.conversation_id, %err, "Summary refresh failed");
            }
        }
    }
}

async fn next_job(rx: &Mutex<mpsc::Receiver<SummaryJob>>) -> Option<SummaryJob> {
    rx.lock().await.recv().await
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;

    use super::*;
    use crate::chat::core::config::StorageConfig;
    use crate::chat::core::conversation::Conversation;
    use crate::chat::core::turn::NewTurn;
    use crate::chat::storage::conversation_store::{ConversationStore, SqliteConversationStore};
    use crate::chat::storage::database::Database;
    use crate::chat::storage::turn_store::{SqliteTurnStore, TurnStore};
    use crate::llm::completion::testing::ScriptedBackend;

    struct Fixture {
        conversations: Arc<SqliteConversationStore>,
        turns: Arc<SqliteTurnStore>,
        summarizer: Arc<Summarizer>,
    }

    async fn fixture(backend: ScriptedBackend) -> Fixture {
        let db = Database::open_in_memory().await.unwrap();
        let storage = StorageConfig::default();
        let conversations = Arc::new(
            SqliteConversationStore::new(db.connection(), &storage)
                .await
                .unwrap(),
        );
        let turns = Arc::new(SqliteTurnStore::new(db.connection(), &storage).await.unwrap());
        let summarizer = Arc::new(Summarizer::new(
            Arc::new(backend),
            turns.clone(),
            conversations.clone(),
            &SummaryConfig::default(),
        ));
        Fixture {
            conversations,
            turns,
            summarizer,
        }
    }

    fn job() -> SummaryJob {
        SummaryJob {
            conversation_id: ConversationId::new(),
            user_id: UserId::new(),
        }
    }

    #[tokio::test]
    async fn duplicate_jobs_are_coalesced() {
        let fixture = fixture(ScriptedBackend::new(Vec::new())).await;
        let (queue, _workers) = summary_queue(fixture.summarizer, &SummaryConfig::default());

        let first = job();
        assert_eq!(queue.enqueue(first), EnqueueOutcome::Queued);
        assert_eq!(queue.enqueue(first), EnqueueOutcome::Coalesced);
        assert_eq!(queue.enqueue(job()), EnqueueOutcome::Queued);
        assert_eq!(queue.pending(), 2);
    }

    #[tokio::test]
    async fn full_queue_drops_jobs() {
        let fixture = fixture(ScriptedBackend::new(Vec::new())).await;
        let config = SummaryConfig {
            queue_capacity: 1,
            ..SummaryConfig::default()
        };
        let (queue, _workers) = summary_queue(fixture.summarizer, &config);

        assert_eq!(queue.enqueue(job()), EnqueueOutcome::Queued);
        assert_eq!(queue.enqueue(job()), EnqueueOutcome::Dropped);
        assert_eq!(queue.pending(), 1);
    }

    #[tokio::test]
    async fn workers_write_summaries_and_stop() {
        let fixture = fixture(ScriptedBackend::replying("User asked about tides.")).await;
        let owner = UserId::new();
        let conversation = Conversation::new(owner, "tides", Utc::now());
        let id = conversation.conversation_id;
        fixture.conversations.create(conversation).await.unwrap();
        fixture
            .turns
            .append(
                id,
                owner,
                vec![
                    NewTurn::user(id, owner, "when is high tide?"),
                    NewTurn::assistant(id, owner, "At 6pm."),
                ],
            )
            .await
            .unwrap();

        let (queue, workers) = summary_queue(fixture.summarizer, &SummaryConfig::default());
        let handle = workers.spawn();
        assert_eq!(
            queue.enqueue(SummaryJob {
                conversation_id: id,
                user_id: owner,
            }),
            EnqueueOutcome::Queued
        );

        let mut summary = None;
        for _ in 0..100 {
            let stored = fixture.conversations.get(id, owner).await.unwrap().unwrap();
            if stored.summary.is_some() {
                summary = stored.summary;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(summary.as_deref(), Some("User asked about tides."));
        assert_eq!(queue.pending(), 0);

        tokio::time::timeout(Duration::from_secs(2), handle.shutdown())
            .await
            .unwrap();
    }
}
