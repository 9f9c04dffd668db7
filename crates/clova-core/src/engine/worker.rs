use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::error::RuntimeError;
use crate::generator::{Generation, TextGenerator};
use crate::message::ChatMessage;

/// One queued generation request.
pub(super) struct Job {
    pub(super) messages: Vec<ChatMessage>,
    pub(super) max_length: usize,
    pub(super) reply_tx: oneshot::Sender<Result<Generation, RuntimeError>>,
    pub(super) enqueued_at: Instant,
}

pub(super) struct GenerationWorker {
    generator: Box<dyn TextGenerator>,
    job_rx: mpsc::Receiver<Job>,
}

impl GenerationWorker {
    pub(super) fn new(generator: Box<dyn TextGenerator>, job_rx: mpsc::Receiver<Job>) -> Self {
        Self { generator, job_rx }
    }

    /// Main loop of the worker thread: one job at a time, in queue order.
    pub(super) fn run(mut self) {
        while let Some(job) = self.job_rx.blocking_recv() {
            self.handle(job);
        }
        debug!("generation queue closed; worker exiting");
    }

    fn handle(&mut self, job: Job) {
        let Job {
            messages,
            max_length,
            reply_tx,
            enqueued_at,
        } = job;

        if reply_tx.is_closed() {
            debug!("caller left while queued; skipping job");
            return;
        }

        let waited_ms = enqueued_at.elapsed().as_millis();
        let started = Instant::now();
        let generator = &mut self.generator;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            generator.generate(&messages, max_length, &|| reply_tx.is_closed())
        }));
        let result = outcome.unwrap_or_else(|payload| {
            Err(RuntimeError::GenerationPanicked {
                message: panic_message(payload.as_ref()),
            })
        });
        let elapsed_ms = started.elapsed().as_millis();

        match &result {
            Ok(generation) => info!(
                waited_ms,
                elapsed_ms,
                prompt_tokens = generation.prompt_tokens,
                total_tokens = generation.total_tokens,
                finish_reason = %generation.finish_reason,
                "generation finished"
            ),
            Err(RuntimeError::Cancelled) => {
                warn!(waited_ms, elapsed_ms, "generation cancelled; caller disconnected")
            }
            Err(e) => error!(waited_ms, elapsed_ms, error = %e, "generation failed"),
        }

        // The caller may have gone away meanwhile; nothing to do then.
        let _ = reply_tx.send(result);
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_owned()
    }
}
