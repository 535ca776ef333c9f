//! Request-level entry points: validation gate, single-image and batch runs.
//!
//! The service is what the HTTP layer and the CLI talk to. It rejects bad
//! requests before any work starts, then hands items to the transformer or
//! the coordinator. A batch is returned as a [`BatchDownload`]: the archive
//! is produced by a background task and read from an in-memory pipe.

use bytes::Bytes;
use futures_util::stream::{BoxStream, Stream, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt, DuplexStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::io::ReaderStream;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::archive::{ArchiveOptions, ArchiveStreamer, ArchiveSummary};
use crate::config::Config;
use crate::error::{ItemError, Result, SinkError, TransformError, ValidationError};
use crate::pipeline::{
    BatchCoordinator, CoordinatorOptions, DiscoveredFile, ImageTransform, ImageTransformer,
    TransformForm, TransformSpec,
};
use crate::types::{BatchProgress, InputItem, OutputItem, Preset};

/// Validates requests and runs them through the pipeline.
#[derive(Clone)]
pub struct BatchService {
    config: Arc<Config>,
    transformer: Arc<dyn ImageTransform>,
    coordinator: BatchCoordinator,
}

impl BatchService {
    /// Service backed by the production transformer.
    pub fn new(config: Config) -> Self {
        let transformer = Arc::new(ImageTransformer::new(&config));
        Self::with_transformer(config, transformer)
    }

    /// Service backed by a custom transformer.
    pub fn with_transformer(config: Config, transformer: Arc<dyn ImageTransform>) -> Self {
        let coordinator =
            BatchCoordinator::new(transformer.clone(), CoordinatorOptions::from_config(&config));
        Self {
            config: Arc::new(config),
            transformer,
            coordinator,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn presets(&self) -> &[Preset] {
        &self.config.presets
    }

    /// Build a spec from raw form fields and check it against the limits.
    pub fn spec_from_form(
        &self,
        form: TransformForm,
    ) -> std::result::Result<TransformSpec, ValidationError> {
        let spec = form.into_spec(self.config.processing.default_quality)?;
        spec.check_dimensions(self.config.limits.max_image_dimension)?;
        Ok(spec)
    }

    /// Reject an item over the per-item byte ceiling.
    pub fn validate_item(&self, item: &InputItem) -> std::result::Result<(), ValidationError> {
        let max_bytes = self.config.limits.max_item_bytes();
        if item.size_bytes() > max_bytes {
            return Err(ValidationError::ItemTooLarge {
                name: item.name.clone(),
                size_bytes: item.size_bytes(),
                max_bytes,
            });
        }
        Ok(())
    }

    /// The batch gate: runs before any item is touched.
    pub fn validate_batch(
        &self,
        items: &[InputItem],
        spec: &TransformSpec,
    ) -> std::result::Result<(), ValidationError> {
        if items.is_empty() {
            return Err(ValidationError::EmptyBatch);
        }
        let max = self.config.limits.max_batch_items;
        if items.len() > max {
            return Err(ValidationError::TooManyItems {
                count: items.len(),
                max,
            });
        }
        for item in items {
            self.validate_item(item)?;
        }
        spec.check_dimensions(self.config.limits.max_image_dimension)
    }

    /// Transform a single image.
    pub async fn process_one(&self, item: InputItem, spec: TransformSpec) -> Result<OutputItem> {
        self.validate_item(&item)?;
        spec.check_dimensions(self.config.limits.max_image_dimension)?;

        let name = item.name.clone();
        let timeout = Duration::from_millis(self.config.limits.item_timeout_ms);
        let cancel = CancellationToken::new();
        let job = tokio::task::spawn_blocking({
            let transformer = self.transformer.clone();
            let cancel = cancel.clone();
            move || transformer.transform(&item, &spec, &cancel)
        });

        let result = match tokio::time::timeout(timeout, job).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(TransformError::Worker(e.to_string())),
            Err(_) => {
                cancel.cancel();
                Err(TransformError::Timeout {
                    timeout_ms: self.config.limits.item_timeout_ms,
                })
            }
        };

        match result {
            Ok(output) => {
                tracing::info!(
                    "Processed {} -> {} ({} -> {} bytes, {}%)",
                    name,
                    output.name,
                    output.original_size,
                    output.optimized_size,
                    output.reduction_label()
                );
                Ok(output)
            }
            Err(error) => {
                tracing::warn!("Failed: {} - {}", name, error);
                Err(ItemError::new(name, error).into())
            }
        }
    }

    /// Validate a batch and start streaming its archive.
    ///
    /// Must be called from within a tokio runtime. Nothing is spawned when
    /// validation fails.
    pub fn process_batch(
        &self,
        items: Vec<InputItem>,
        spec: TransformSpec,
    ) -> Result<BatchDownload> {
        self.validate_batch(&items, &spec)?;

        let total = items.len();
        let cancel = CancellationToken::new();
        let buffer = self.config.archive.stream_buffer_kb.max(1) * 1024;
        let (writer, reader) = tokio::io::duplex(buffer);

        let run = self.coordinator.stream(items, Arc::new(spec), cancel.clone());
        let outcomes = if self.config.archive.dedupe_names {
            dedupe_names(run.outcomes)
        } else {
            run.outcomes
        };
        let streamer =
            ArchiveStreamer::new(writer, ArchiveOptions::from_config(&self.config.archive));

        tracing::info!("Starting batch of {} images", total);
        let task = tokio::spawn({
            let cancel = cancel.clone();
            async move {
                let result = tokio::select! {
                    result = streamer.stream_batch(outcomes) => result,
                    _ = cancel.cancelled() => Err(SinkError::Disconnected),
                };
                cancel.cancel();

                match &result {
                    Ok(summary) => tracing::info!(
                        "Batch archive complete: {} entries, {} failed, {} -> {} bytes",
                        summary.entries.len(),
                        summary.failures.len(),
                        summary.original_bytes(),
                        summary.optimized_bytes()
                    ),
                    Err(e) => tracing::warn!("Batch archive aborted: {}", e),
                }
                result
            }
        });

        Ok(BatchDownload {
            file_name: self.config.archive.file_name.clone(),
            total,
            reader,
            progress: run.progress,
            task,
            guard: cancel.drop_guard(),
        })
    }
}

impl BatchService {
    /// Transform files on disk into one archive written to `sink`.
    ///
    /// Files are read in groups of at most `limits.max_batch_items`, so only
    /// one group of inputs is held in memory at a time. Output names are made
    /// unique across the whole archive. `progress` reports totals over all
    /// groups.
    pub async fn archive_files<W: AsyncWrite + Unpin>(
        &self,
        files: &[DiscoveredFile],
        spec: TransformSpec,
        sink: W,
        progress: &watch::Sender<BatchProgress>,
    ) -> Result<ArchiveSummary> {
        if files.is_empty() {
            return Err(ValidationError::EmptyBatch.into());
        }
        spec.check_dimensions(self.config.limits.max_image_dimension)?;

        let group_size = self.config.limits.max_batch_items.max(1);
        let spec = Arc::new(spec);
        let mut streamer =
            ArchiveStreamer::new(sink, ArchiveOptions::from_config(&self.config.archive));
        let mut names = UniqueNames::default();
        progress.send_replace(BatchProgress::new(files.len()));

        for (index, group) in files.chunks(group_size).enumerate() {
            let mut items = Vec::with_capacity(group.len());
            for file in group {
                let item = file.load().await?;
                self.validate_item(&item)?;
                items.push(item);
            }
            tracing::debug!("Group {}: {} images", index + 1, items.len());

            let base = *progress.borrow();
            let cancel = CancellationToken::new();
            let _guard = cancel.clone().drop_guard();
            let run = self.coordinator.stream(items, spec.clone(), cancel);
            let mut outcomes = run.outcomes;
            while let Some(outcome) = outcomes.next().await {
                match outcome {
                    Ok(mut item) => {
                        if self.config.archive.dedupe_names {
                            item.name = names.claim(&item.name);
                        }
                        streamer.append(&item).await?;
                    }
                    Err(err) => streamer.record_failure(&err),
                }

                let current = *run.progress.borrow();
                progress.send_modify(|p| {
                    p.completed = base.completed + current.completed;
                    p.succeeded = base.succeeded + current.succeeded;
                    p.failed = base.failed + current.failed;
                    p.in_flight = current.in_flight;
                    p.peak_in_flight = base.peak_in_flight.max(current.peak_in_flight);
                });
            }
        }

        let summary = streamer.finish().await?;
        tracing::info!(
            "Archive complete: {} entries, {} failed, {} -> {} bytes",
            summary.entries.len(),
            summary.failures.len(),
            summary.original_bytes(),
            summary.optimized_bytes()
        );
        Ok(summary)
    }
}

/// A batch archive being produced in the background.
///
/// Dropping the download (or the body stream made from it) cancels the batch.
pub struct BatchDownload {
    /// Attachment file name
    pub file_name: String,
    /// Items in the batch
    pub total: usize,
    reader: DuplexStream,
    progress: watch::Receiver<BatchProgress>,
    task: JoinHandle<std::result::Result<ArchiveSummary, SinkError>>,
    guard: DropGuard,
}

impl BatchDownload {
    /// Receiver for live progress counts.
    pub fn progress(&self) -> watch::Receiver<BatchProgress> {
        self.progress.clone()
    }

    /// The archive as a byte stream for a response body.
    ///
    /// The batch is cancelled as soon as the stream is dropped, finished or not.
    pub fn into_body_stream(self) -> impl Stream<Item = std::io::Result<Bytes>> + Send + 'static {
        let BatchDownload { reader, guard, .. } = self;
        ReaderStream::new(reader).map(move |chunk| {
            let _guard = &guard;
            chunk
        })
    }

    /// Copy the whole archive into `sink` and return its summary.
    pub async fn write_to<W: AsyncWrite + Unpin>(self, sink: &mut W) -> Result<ArchiveSummary> {
        let BatchDownload {
            mut reader,
            task,
            guard,
            ..
        } = self;

        let copied = match tokio::io::copy(&mut reader, sink).await {
            Ok(_) => sink.flush().await,
            Err(e) => Err(e),
        };
        drop(reader);
        let joined = task.await;
        drop(guard);

        copied.map_err(SinkError::Io)?;
        let summary = joined.map_err(|e| SinkError::Archive(e.to_string()))??;
        Ok(summary)
    }
}

/// Rename successful outputs whose names were already used in this batch.
fn dedupe_names(
    outcomes: BoxStream<'static, std::result::Result<OutputItem, ItemError>>,
) -> BoxStream<'static, std::result::Result<OutputItem, ItemError>> {
    let mut names = UniqueNames::default();
    outcomes
        .map(move |outcome| {
            outcome.map(|mut item| {
                item.name = names.claim(&item.name);
                item
            })
        })
        .boxed()
}

/// Hands out `a.jpeg`, `a-1.jpeg`, `a-2.jpeg`, ...
#[derive(Debug, Default)]
struct UniqueNames {
    seen: HashSet<String>,
}

impl UniqueNames {
    fn claim(&mut self, name: &str) -> String {
        if self.seen.insert(name.to_string()) {
            return name.to_string();
        }

        let (stem, ext) = match name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
            _ => (name, None),
        };
        let mut n = 1;
        loop {
            let candidate = match ext {
                Some(ext) => format!("{stem}-{n}.{ext}"),
                None => format!("{stem}-{n}"),
            };
            if self.seen.insert(candidate.clone()) {
                return candidate;
            }
            n += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OptipackError;
    use crate::pipeline::transform::test_images::png;
    use crate::pipeline::TargetFormat;
    use image::GenericImageView;
    use std::io::{Cursor, Read};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Sleeps a little per item and counts invocations.
    struct SlowTransform {
        calls: AtomicUsize,
        steps: u32,
    }

    impl SlowTransform {
        fn new(steps: u32) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                steps,
            }
        }
    }

    impl ImageTransform for SlowTransform {
        fn transform(
            &self,
            item: &InputItem,
            _spec: &TransformSpec,
            cancel: &CancellationToken,
        ) -> std::result::Result<OutputItem, TransformError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            for _ in 0..self.steps {
                if cancel.is_cancelled() {
                    return Err(TransformError::Cancelled);
                }
                std::thread::sleep(Duration::from_millis(10));
            }
            Ok(OutputItem {
                name: item.name.clone(),
                bytes: item.bytes.clone(),
                original_size: item.size_bytes(),
                optimized_size: item.size_bytes(),
                width: 1,
                height: 1,
                content_type: "application/octet-stream",
            })
        }
    }

    fn fit_jpeg(size: u32) -> TransformSpec {
        TransformSpec::new(Some(size), Some(size), true, TargetFormat::Jpeg, Some(80))
    }

    fn zip_entries(buffer: Vec<u8>) -> Vec<(String, Vec<u8>)> {
        let mut archive = zip::ZipArchive::new(Cursor::new(buffer)).unwrap();
        (0..archive.len())
            .map(|i| {
                let mut file = archive.by_index(i).unwrap();
                let mut data = Vec::new();
                file.read_to_end(&mut data).unwrap();
                (file.name().to_string(), data)
            })
            .collect()
    }

    #[tokio::test]
    async fn test_empty_batch_rejected_before_work() {
        let mock = Arc::new(SlowTransform::new(0));
        let service = BatchService::with_transformer(Config::default(), mock.clone());

        let err = service.process_batch(Vec::new(), TransformSpec::default()).err().unwrap();
        assert!(matches!(err, OptipackError::Validation(ValidationError::EmptyBatch)));
        assert_eq!(mock.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_batch_limits_enforced() {
        let mut config = Config::default();
        config.limits.max_batch_items = 2;
        config.limits.max_file_size_mb = 1;
        let service = BatchService::new(config);

        let items = vec![
            InputItem::new("a.png", vec![0u8; 4]),
            InputItem::new("b.png", vec![0u8; 4]),
            InputItem::new("c.png", vec![0u8; 4]),
        ];
        let err = service.validate_batch(&items, &TransformSpec::default()).unwrap_err();
        assert_eq!(err, ValidationError::TooManyItems { count: 3, max: 2 });

        let items = vec![InputItem::new("big.png", vec![0u8; 1024 * 1024 + 1])];
        let err = service.validate_batch(&items, &TransformSpec::default()).unwrap_err();
        assert!(matches!(err, ValidationError::ItemTooLarge { ref name, .. } if name == "big.png"));

        let items = vec![InputItem::new("a.png", vec![0u8; 4])];
        let spec = TransformSpec::new(Some(20_000), None, true, TargetFormat::Original, None);
        let err = service.validate_batch(&items, &spec).unwrap_err();
        assert!(matches!(err, ValidationError::DimensionTooLarge { field: "width", .. }));
    }

    #[test]
    fn test_spec_from_form_applies_default_quality() {
        let mut config = Config::default();
        config.processing.default_quality = 65;
        let service = BatchService::new(config);

        let mut form = TransformForm::default();
        form.set("width", "300");
        form.set("format", "webp");
        let spec = service.spec_from_form(form).unwrap();
        assert_eq!(spec.quality(), 65);
        assert_eq!(spec.target_width(), Some(300));

        let mut form = TransformForm::default();
        form.set("format", "avif");
        assert!(service.spec_from_form(form).is_err());
    }

    #[tokio::test]
    async fn test_three_png_scenario() {
        let service = BatchService::new(Config::default());
        let items = vec![
            InputItem::new("square.png", png(100, 100)),
            InputItem::new("wide.png", png(2000, 500)),
            InputItem::new("tall.png", png(500, 2000)),
        ];
        let download = service.process_batch(items, fit_jpeg(200)).unwrap();
        assert_eq!(download.file_name, "imagens_otimizadas.zip");
        assert_eq!(download.total, 3);

        let mut buffer = Vec::new();
        let summary = download.write_to(&mut buffer).await.unwrap();
        assert_eq!(summary.entries.len(), 3);
        assert!(summary.failures.is_empty());

        let entries = zip_entries(buffer);
        let names: Vec<_> = entries.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["square.jpeg", "wide.jpeg", "tall.jpeg"]);
        for (_, data) in &entries {
            let (w, h) = image::load_from_memory(data).unwrap().dimensions();
            assert!(w <= 200 && h <= 200);
        }
    }

    #[tokio::test]
    async fn test_archive_files_larger_than_item_cap() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        for name in ["a.png", "b.png", "c.png", "d.png", "nested/a.png"] {
            std::fs::write(dir.path().join(name), png(12, 8)).unwrap();
        }

        let mut config = Config::default();
        config.limits.max_batch_items = 2;
        config.processing.parallel_workers = 2;
        let files = crate::pipeline::FileDiscovery::new(&config.processing).discover(dir.path());
        assert_eq!(files.len(), 5);

        let service = BatchService::new(config);
        let (progress_tx, progress_rx) = watch::channel(BatchProgress::default());
        let mut buffer = Vec::new();
        let summary = service
            .archive_files(&files, TransformSpec::default(), &mut buffer, &progress_tx)
            .await
            .unwrap();

        assert_eq!(summary.entries.len(), 5);
        assert!(summary.failures.is_empty());
        let names: Vec<_> = zip_entries(buffer).into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["a.png", "b.png", "c.png", "d.png", "a-1.png"]);

        let progress = *progress_rx.borrow();
        assert_eq!(progress.total, 5);
        assert_eq!(progress.completed, 5);
        assert_eq!(progress.succeeded, 5);
        assert!(progress.peak_in_flight <= 2);
    }

    #[tokio::test]
    async fn test_archive_files_rejects_empty() {
        let service = BatchService::new(Config::default());
        let (progress_tx, _) = watch::channel(BatchProgress::default());
        let err = service
            .archive_files(&[], TransformSpec::default(), Vec::new(), &progress_tx)
            .await
            .unwrap_err();
        assert!(matches!(err, OptipackError::Validation(ValidationError::EmptyBatch)));
    }

    #[tokio::test]
    async fn test_corrupt_item_left_out() {
        let service = BatchService::new(Config::default());
        let items = vec![
            InputItem::new("a.png", png(20, 20)),
            InputItem::new("b.png", b"garbage".to_vec()),
            InputItem::new("c.png", png(20, 20)),
        ];
        let download = service.process_batch(items, fit_jpeg(10)).unwrap();
        let mut buffer = Vec::new();
        let summary = download.write_to(&mut buffer).await.unwrap();

        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].name, "b.png");
        let names: Vec<_> = zip_entries(buffer).into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["a.jpeg", "c.jpeg"]);
    }

    #[tokio::test]
    async fn test_duplicate_names_made_unique() {
        let service = BatchService::new(Config::default());
        let items = vec![
            InputItem::new("photo.png", png(8, 8)),
            InputItem::new("photo.jpg", png(8, 8)),
            InputItem::new("nested/photo.png", png(8, 8)),
        ];
        let download = service.process_batch(items, fit_jpeg(4)).unwrap();
        let mut buffer = Vec::new();
        download.write_to(&mut buffer).await.unwrap();

        let names: Vec<_> = zip_entries(buffer).into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["photo.jpeg", "photo-1.jpeg", "photo-2.jpeg"]);
    }

    #[tokio::test]
    async fn test_dropped_body_cancels_batch() {
        let mut config = Config::default();
        config.processing.parallel_workers = 1;
        let mock = Arc::new(SlowTransform::new(5));
        let service = BatchService::with_transformer(config, mock.clone());

        let items: Vec<_> = (0..20)
            .map(|i| InputItem::new(format!("{i}.png"), vec![1u8; 16]))
            .collect();
        let download = service.process_batch(items, TransformSpec::default()).unwrap();
        let mut progress = download.progress();
        let body = download.into_body_stream();

        tokio::time::timeout(Duration::from_secs(5), async {
            while progress.borrow_and_update().completed == 0 {
                progress.changed().await.unwrap();
            }
        })
        .await
        .unwrap();
        drop(body);

        tokio::time::sleep(Duration::from_millis(300)).await;
        let calls = mock.calls.load(Ordering::SeqCst);
        assert!(calls < 20, "expected early stop, got {calls} calls");
        assert!(progress.borrow().succeeded < 20);
    }

    #[tokio::test]
    async fn test_body_stream_yields_archive() {
        let service = BatchService::with_transformer(Config::default(), Arc::new(SlowTransform::new(0)));
        let items = vec![
            InputItem::new("x.bin", vec![7u8; 32]),
            InputItem::new("y.bin", vec![9u8; 32]),
        ];
        let download = service.process_batch(items, TransformSpec::default()).unwrap();
        let chunks: Vec<_> = download.into_body_stream().collect().await;

        let mut buffer = Vec::new();
        for chunk in chunks {
            buffer.extend_from_slice(&chunk.unwrap());
        }
        let entries = zip_entries(buffer);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1], ("y.bin".to_string(), vec![9u8; 32]));
    }

    #[tokio::test]
    async fn test_process_one_success_and_failure() {
        let service = BatchService::new(Config::default());

        let output = service
            .process_one(InputItem::new("wide.png", png(400, 100)), fit_jpeg(200))
            .await
            .unwrap();
        assert_eq!(output.name, "wide.jpeg");
        assert_eq!((output.width, output.height), (200, 50));

        let err = service
            .process_one(InputItem::new("bad.png", b"nope".to_vec()), fit_jpeg(200))
            .await
            .unwrap_err();
        match err {
            OptipackError::Item(item) => {
                assert_eq!(item.name, "bad.png");
                assert_eq!(item.error.kind(), "decode");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_process_one_timeout() {
        let mut config = Config::default();
        config.limits.item_timeout_ms = 50;
        let service = BatchService::with_transformer(config, Arc::new(SlowTransform::new(100)));

        let err = service
            .process_one(InputItem::new("slow.png", vec![1u8]), TransformSpec::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OptipackError::Item(ItemError {
                error: TransformError::Timeout { timeout_ms: 50 },
                ..
            })
        ));
    }

    #[test]
    fn test_unique_names() {
        let mut names = UniqueNames::default();
        assert_eq!(names.claim("a.jpeg"), "a.jpeg");
        assert_eq!(names.claim("a.jpeg"), "a-1.jpeg");
        assert_eq!(names.claim("a-1.jpeg"), "a-1-1.jpeg");
        assert_eq!(names.claim("a.jpeg"), "a-2.jpeg");
        assert_eq!(names.claim("README"), "README");
        assert_eq!(names.claim("README"), "README-1");
        assert_eq!(names.claim(".hidden"), ".hidden");
        assert_eq!(names.claim(".hidden"), ".hidden-1");
    }
}
