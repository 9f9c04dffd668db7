mod worker;


use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::error::RuntimeError;
use crate::generator::{Generation, TextGenerator};
use crate::message::ChatMessage;

use worker::{GenerationWorker, Job};

/// Serialized access to a single [`TextGenerator`].
///
/// # Architecture
///
/// ```text
/// Caller ──► job_tx ──► [clova-generate thread] ──► reply_tx ──► Caller
///              (FIFO)      owns the generator
/// ```
///
/// ## Key properties
/// - The generator lives on exactly one OS thread; nothing else can reach
///   its device memory.
/// - Jobs are taken off the queue one at a time, so at most one generation is
///   in flight and callers are served first-come-first-served.
/// - A job whose caller has gone away is skipped if it has not started, and
///   cancelled at the next token boundary if it has.
/// - The worker exits once every [`GenerationEngine`] clone is dropped.
#[derive(Clone, Debug)]
pub struct GenerationEngine {
    job_tx: mpsc::Sender<Job>,
    model_id: Arc<str>,
}

impl GenerationEngine {
    /// Move `generator` onto its worker thread and start accepting jobs.
    ///
    /// At most `queue_capacity` jobs wait in the queue; further callers wait
    /// for a free slot in arrival order.
    pub fn start<G: TextGenerator>(
        generator: G,
        queue_capacity: usize,
    ) -> Result<Self, RuntimeError> {
        let model_id: Arc<str> = Arc::from(generator.model_id());
        let (job_tx, job_rx) = mpsc::channel::<Job>(queue_capacity.max(1));

        let worker = GenerationWorker::new(Box::new(generator), job_rx);
        std::thread::Builder::new()
            .name("clova-generate".to_owned())
            .spawn(move || worker.run())
            .map_err(|source| RuntimeError::SpawnWorkerFailed { source })?;

        Ok(Self { job_tx, model_id })
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Queue a generation and wait for its result.
    ///
    /// Dropping the returned future withdraws the job (or cancels it if it is
    /// already running).
    pub async fn generate(
        &self,
        messages: Vec<ChatMessage>,
        max_length: usize,
    ) -> Result<Generation, RuntimeError> {
        if messages.is_empty() {
            return Err(RuntimeError::EmptyMessages);
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        debug!(
            messages = messages.len(),
            max_length,
            queued = self.job_tx.max_capacity() - self.job_tx.capacity(),
            "queueing generation"
        );
        self.job_tx
            .send(Job {
                messages,
                max_length,
                reply_tx,
                enqueued_at: Instant::now(),
            })
            .await
            .map_err(|_| RuntimeError::WorkerShutdown)?;
        reply_rx.await.map_err(|_| RuntimeError::WorkerShutdown)?
    }
}
