//! Batch coordination: bounded fan-out of transforms with ordered results.
//!
//! Each item runs on the blocking thread pool, bounded by a per-batch
//! semaphore. Outcomes come back in input order through `StreamExt::buffered`,
//! so at most `parallel_workers` finished-but-not-yet-consumed outputs are
//! held in memory. The semaphore permit travels into the blocking job and is
//! only released when the job really ends, which keeps the bound honest even
//! after an item has timed out. Transforms reject oversized outputs before
//! resampling, so a held permit is bounded by the configured image limits.

use futures_util::stream::{self, BoxStream, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio_util::sync::CancellationToken;

use super::spec::TransformSpec;
use super::transform::{ImageTransform, ImageTransformer};
use crate::config::Config;
use crate::error::{ItemError, TransformError};
use crate::types::{BatchProgress, BatchResult, InputItem, OutputItem};

/// Options for the batch coordinator.
#[derive(Debug, Clone)]
pub struct CoordinatorOptions {
    /// Maximum concurrent transforms per batch
    pub parallel_workers: usize,
    /// Per-item timeout
    pub item_timeout: Duration,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self {
            parallel_workers: 4,
            item_timeout: Duration::from_millis(30_000),
        }
    }
}

impl CoordinatorOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            parallel_workers: config.processing.parallel_workers,
            item_timeout: Duration::from_millis(config.limits.item_timeout_ms),
        }
    }
}

/// A batch in progress.
pub struct BatchRun {
    /// Item outcomes in input order
    pub outcomes: BoxStream<'static, Result<OutputItem, ItemError>>,
    /// Counts updated as items complete (in completion order)
    pub progress: watch::Receiver<BatchProgress>,
}

/// Fans batch items out to an [`ImageTransform`] with bounded concurrency.
#[derive(Clone)]
pub struct BatchCoordinator {
    transformer: Arc<dyn ImageTransform>,
    options: CoordinatorOptions,
}

impl BatchCoordinator {
    pub fn new(transformer: Arc<dyn ImageTransform>, options: CoordinatorOptions) -> Self {
        Self {
            transformer,
            options,
        }
    }

    /// Coordinator using the production [`ImageTransformer`].
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            Arc::new(ImageTransformer::new(config)),
            CoordinatorOptions::from_config(config),
        )
    }

    pub fn options(&self) -> &CoordinatorOptions {
        &self.options
    }

    /// Process every item and return one outcome per item, in input order.
    ///
    /// Never fails: per-item errors are captured in their slots.
    pub async fn run(&self, items: Vec<InputItem>, spec: TransformSpec) -> BatchResult {
        let run = self.stream(items, Arc::new(spec), CancellationToken::new());
        let result: BatchResult = run.outcomes.collect().await;
        tracing::info!(
            "Batch finished: {} succeeded, {} failed",
            result.succeeded(),
            result.failed()
        );
        result
    }

    /// Start processing and return the ordered outcome stream.
    ///
    /// Work only advances while the stream is polled. Dropping the stream
    /// stops queued items from starting; cancelling `cancel` also stops
    /// in-flight items at their next stage boundary.
    pub fn stream(
        &self,
        items: Vec<InputItem>,
        spec: Arc<TransformSpec>,
        cancel: CancellationToken,
    ) -> BatchRun {
        let workers = self.options.parallel_workers.max(1);
        let (progress_tx, progress_rx) = watch::channel(BatchProgress::new(items.len()));

        let worker = ItemWorker {
            transformer: self.transformer.clone(),
            spec,
            semaphore: Arc::new(Semaphore::new(workers)),
            cancel,
            progress: Arc::new(progress_tx),
            timeout: self.options.item_timeout,
        };

        let outcomes = stream::iter(items)
            .map(move |item| worker.clone().run(item))
            .buffered(workers)
            .boxed();

        BatchRun {
            outcomes,
            progress: progress_rx,
        }
    }
}

/// Everything one item needs, cloned per item.
#[derive(Clone)]
struct ItemWorker {
    transformer: Arc<dyn ImageTransform>,
    spec: Arc<TransformSpec>,
    semaphore: Arc<Semaphore>,
    cancel: CancellationToken,
    progress: Arc<watch::Sender<BatchProgress>>,
    timeout: Duration,
}

impl ItemWorker {
    async fn run(self, item: InputItem) -> Result<OutputItem, ItemError> {
        let name = item.name.clone();
        let result = self.execute(item).await;

        let ok = result.is_ok();
        self.progress.send_modify(|p| {
            p.completed += 1;
            if ok {
                p.succeeded += 1;
            } else {
                p.failed += 1;
            }
        });

        result.map_err(|error| {
            if matches!(error, TransformError::Cancelled) {
                tracing::debug!("Cancelled: {}", name);
            } else {
                tracing::warn!("Failed: {} - {}", name, error);
            }
            ItemError::new(name, error)
        })
    }

    async fn execute(&self, item: InputItem) -> Result<OutputItem, TransformError> {
        let permit = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(TransformError::Cancelled),
            permit = self.semaphore.clone().acquire_owned() => {
                permit.map_err(|_| TransformError::Cancelled)?
            }
        };

        let item_token = self.cancel.child_token();
        let slot = InFlightSlot::enter(self.progress.clone());
        let job = tokio::task::spawn_blocking({
            let transformer = self.transformer.clone();
            let spec = self.spec.clone();
            let token = item_token.clone();
            move || {
                let _permit = permit;
                let _slot = slot;
                transformer.transform(&item, &spec, &token)
            }
        });

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(TransformError::Cancelled),
            joined = tokio::time::timeout(self.timeout, job) => match joined {
                Ok(Ok(result)) => result,
                Ok(Err(e)) => Err(TransformError::Worker(e.to_string())),
                Err(_) => {
                    item_token.cancel();
                    Err(TransformError::Timeout {
                        timeout_ms: self.timeout.as_millis() as u64,
                    })
                }
            },
        }
    }
}

/// Counts a blocking job as in flight for as long as it exists.
struct InFlightSlot {
    progress: Arc<watch::Sender<BatchProgress>>,
}

impl InFlightSlot {
    fn enter(progress: Arc<watch::Sender<BatchProgress>>) -> Self {
        progress.send_modify(|p| {
            p.in_flight += 1;
            p.peak_in_flight = p.peak_in_flight.max(p.in_flight);
        });
        Self { progress }
    }
}

impl Drop for InFlightSlot {
    fn drop(&mut self) {
        self.progress.send_modify(|p| p.in_flight = p.in_flight.saturating_sub(1));
    }
}
