// THEORY:
// Batch inspection fans images out over a fixed pool of workers.
//
// - A single dispatcher task receives every submitted image and hands them to the
//   workers round-robin, each worker owning its own queue.
// - A worker runs the CPU-bound pipeline on tokio's blocking pool, so decoding and
//   pixel work never stall the async runtime.
// - Each submission carries a oneshot channel for its outcome. The batch keeps the
//   receivers in submission order and awaits them together, which returns outcomes
//   in input order no matter which worker finishes first.
// - A failure (including a panic) inside one image's pipeline becomes an errored
//   outcome for that image only.
// - Cancellation is a shared flag. Workers check it before starting an image; once
//   it is set no new image is inspected and the batch reports `Cancelled`, throwing
//   away whatever partial results exist.

use crate::batch::ImageOutcome;
use crate::config::InspectionConfig;
use crate::error::{BatchError, ConfigError};
use crate::image_id::ImageId;
use crate::pipeline::InspectionPipeline;
use futures::future::join_all;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

/// One encoded image of a batch.
#[derive(Debug, Clone)]
pub struct ImageInput {
    pub name: String,
    pub bytes: Vec<u8>,
}

pub struct ImageTask {
    pub input: ImageInput,
    pub result_sender: oneshot::Sender<ImageOutcome>,
}

/// Stops a running batch from scheduling further images.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

pub struct WorkerPool {
    task_sender: mpsc::UnboundedSender<ImageTask>,
    workers: Vec<tokio::task::JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(pipeline: Arc<InspectionPipeline>, size: usize, cancelled: Arc<AtomicBool>) -> Self {
        let size = size.max(1);
        let (task_sender, mut task_receiver) = mpsc::unbounded_channel::<ImageTask>();
        let mut workers = Vec::with_capacity(size + 1);

        let (worker_senders, worker_receivers): (Vec<_>, Vec<_>) =
            (0..size).map(|_| mpsc::unbounded_channel::<ImageTask>()).unzip();

        // Dispatcher
        workers.push(tokio::spawn(async move {
            let mut worker_idx = 0;
            while let Some(task) = task_receiver.recv().await {
                let _ = worker_senders[worker_idx].send(task);
                worker_idx = (worker_idx + 1) % size;
            }
        }));

        for mut worker_receiver in worker_receivers {
            let pipeline = Arc::clone(&pipeline);
            let cancelled = Arc::clone(&cancelled);

            workers.push(tokio::spawn(async move {
                while let Some(task) = worker_receiver.recv().await {
                    let outcome = if cancelled.load(Ordering::SeqCst) {
                        errored(&task.input, "batch cancelled".to_string())
                    } else {
                        Self::inspect(Arc::clone(&pipeline), task.input).await
                    };
                    let _ = task.result_sender.send(outcome);
                }
            }));
        }

        Self { task_sender, workers }
    }

    async fn inspect(pipeline: Arc<InspectionPipeline>, input: ImageInput) -> ImageOutcome {
        let name = input.name.clone();
        let image_id = ImageId::from_bytes(&input.bytes);
        let bytes = input.bytes;

        match tokio::task::spawn_blocking(move || pipeline.inspect_bytes(&bytes)).await {
            Ok(Ok(report)) => ImageOutcome::Inspected {
                name,
                report: Box::new(report),
            },
            Ok(Err(error)) => {
                warn!(image = %name, %error, "image could not be inspected");
                ImageOutcome::Errored {
                    name,
                    image_id,
                    reason: error.to_string(),
                }
            }
            Err(join_error) => {
                warn!(image = %name, %join_error, "inspection worker failed");
                ImageOutcome::Errored {
                    name,
                    image_id,
                    reason: format!("inspection worker failed: {join_error}"),
                }
            }
        }
    }

    pub fn submit(&self, input: ImageInput) -> Result<oneshot::Receiver<ImageOutcome>, BatchError> {
        let (result_sender, result_receiver) = oneshot::channel();
        self.task_sender
            .send(ImageTask { input, result_sender })
            .map_err(|_| BatchError::Worker("task queue closed".to_string()))?;
        Ok(result_receiver)
    }

    /// Closes the queue and waits for queued images to drain.
    pub async fn shutdown(self) {
        drop(self.task_sender);
        for worker in self.workers {
            let _ = worker.await;
        }
    }
}

fn errored(input: &ImageInput, reason: String) -> ImageOutcome {
    ImageOutcome::Errored {
        name: input.name.clone(),
        image_id: ImageId::from_bytes(&input.bytes),
        reason,
    }
}

/// Inspects batches of images on a worker pool.
pub struct BatchProcessor {
    worker_pool: WorkerPool,
    cancelled: Arc<AtomicBool>,
    workers: usize,
}

impl BatchProcessor {
    /// Must be called from within a tokio runtime.
    pub fn new(config: InspectionConfig) -> Result<Self, ConfigError> {
        let workers = config.workers.unwrap_or_else(num_cpus::get).max(1);
        let pipeline = Arc::new(InspectionPipeline::new(config)?);
        let cancelled = Arc::new(AtomicBool::new(false));
        Ok(Self {
            worker_pool: WorkerPool::new(pipeline, workers, Arc::clone(&cancelled)),
            cancelled,
            workers,
        })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Cancelling is permanent for this processor.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            flag: Arc::clone(&self.cancelled),
        }
    }

    /// Outcomes in input order, or `Cancelled` if the batch was cancelled at any point.
    pub async fn process_batch(
        &self,
        inputs: Vec<ImageInput>,
    ) -> Result<Vec<ImageOutcome>, BatchError> {
        info!(images = inputs.len(), workers = self.workers, "batch started");
        let mut receivers = Vec::with_capacity(inputs.len());
        let mut fallbacks = Vec::with_capacity(inputs.len());

        for input in inputs {
            if self.cancelled.load(Ordering::SeqCst) {
                return Err(BatchError::Cancelled);
            }
            fallbacks.push((input.name.clone(), ImageId::from_bytes(&input.bytes)));
            receivers.push(self.worker_pool.submit(input)?);
        }

        let results = join_all(receivers).await;
        if self.cancelled.load(Ordering::SeqCst) {
            return Err(BatchError::Cancelled);
        }

        let outcomes: Vec<ImageOutcome> = results
            .into_iter()
            .zip(fallbacks)
            .map(|(result, (name, image_id))| {
                result.unwrap_or_else(|_| ImageOutcome::Errored {
                    name,
                    image_id,
                    reason: "inspection worker stopped before reporting".to_string(),
                })
            })
            .collect();
        info!(images = outcomes.len(), "batch finished");
        Ok(outcomes)
    }

    pub async fn shutdown(self) {
        self.worker_pool.shutdown().await;
    }
}
