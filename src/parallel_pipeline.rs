// THEORY:
// The `parallel_pipeline` module fans one base image out into many palette
// variations at once. It keeps three promises:
//
// 1.  **Bounded concurrency**: a fixed pool of N workers sharing one job queue.
//     Whichever worker is idle takes the next job, and each worker runs one
//     variation at a time, so no more than N variations are ever in flight. A
//     timed-out variation keeps its worker until the blocking render returns.
// 2.  **Failure isolation**: every variation reports through its own oneshot
//     channel, as a value. A bad palette, a timeout or even a panic inside the
//     recoloring code becomes a `Failure` entry for that palette only. Siblings
//     never see it.
// 3.  **Ordered results**: receivers are awaited in submission order, so the
//     output lines up with the input no matter which variation finishes first.
//
// The recoloring itself is CPU-bound and runs on tokio's blocking pool. The async
// side only waits: on the oneshot receivers and, when storing, on the sink.
// The decoded source is shared read-only through an `Arc`.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, mpsc, oneshot};

use crate::config::RecolorConfig;
use crate::core_modules::cache::ImageCache;
use crate::core_modules::codec;
use crate::core_modules::pixel_buffer::PixelBuffer;
use crate::error::{ErrorKind, FailureReason, RecolorError, Result};
use crate::pipeline::{RecolorPipeline, VariationFailure, VariationOutput, VariationResult, VariationSpec};
use crate::storage::{StorageSink, VariationMetadata};

/// Renders a single variation. [`RecolorPipeline`] is the production renderer.
pub trait VariationRenderer: Send + Sync + 'static {
    fn render(&self, source: &PixelBuffer, spec: &VariationSpec) -> Result<VariationOutput>;
}

impl VariationRenderer for RecolorPipeline {
    fn render(&self, source: &PixelBuffer, spec: &VariationSpec) -> Result<VariationOutput> {
        RecolorPipeline::render(self, source, spec)
    }
}

pub struct VariationTask {
    pub index: usize,
    pub source: Arc<PixelBuffer>,
    pub spec: VariationSpec,
    pub result_sender: oneshot::Sender<VariationResult>,
}

pub struct WorkerPool {
    task_sender: mpsc::UnboundedSender<VariationTask>,
    workers: Vec<tokio::task::JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(size: usize, renderer: Arc<dyn VariationRenderer>, task_timeout: Duration) -> Self {
        let size = size.max(1);
        let (task_sender, task_receiver) = mpsc::unbounded_channel::<VariationTask>();
        let task_receiver = Arc::new(Mutex::new(task_receiver));

        let workers = (0..size)
            .map(|_| {
                let renderer = Arc::clone(&renderer);
                let task_receiver = Arc::clone(&task_receiver);
                // Exits once the pool is dropped and the queue drains.
                tokio::spawn(async move {
                    loop {
                        let next = task_receiver.lock().await.recv().await;
                        let Some(task) = next else { break };
                        run_variation(Arc::clone(&renderer), task_timeout, task).await;
                    }
                })
            })
            .collect();

        Self {
            task_sender,
            workers,
        }
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Queues a variation and returns the receiver its result will arrive on.
    pub fn submit(
        &self,
        index: usize,
        source: Arc<PixelBuffer>,
        spec: VariationSpec,
    ) -> Result<oneshot::Receiver<VariationResult>> {
        let (result_sender, result_receiver) = oneshot::channel();
        let task = VariationTask {
            index,
            source,
            spec,
            result_sender,
        };
        self.task_sender.send(task).map_err(|_| RecolorError::Internal {
            message: "worker pool is shut down".to_string(),
        })?;
        Ok(result_receiver)
    }
}

/// Runs one task and answers on its channel. Returns only once the blocking
/// render has ended, even when the answer was a timeout.
#[tracing::instrument(name = "variation", skip_all, fields(index = task.index, palette = %task.spec.palette.name))]
async fn run_variation(renderer: Arc<dyn VariationRenderer>, task_timeout: Duration, task: VariationTask) {
    let VariationTask {
        source,
        spec,
        result_sender,
        ..
    } = task;
    let palette_name = spec.palette.name.clone();
    let mut job = tokio::task::spawn_blocking(move || renderer.render(&source, &spec));

    let (outcome, timed_out) = match tokio::time::timeout(task_timeout, &mut job).await {
        Ok(Ok(result)) => (result, false),
        Ok(Err(join_error)) => (Err(join_failure(&join_error)), false),
        Err(_) => (
            Err(RecolorError::Timeout {
                seconds: task_timeout.as_secs_f64().ceil() as u64,
            }),
            true,
        ),
    };

    let result = match outcome {
        Ok(output) => {
            tracing::debug!(bytes = output.bytes.len(), "variation finished");
            VariationResult::Success(output)
        }
        Err(error) => {
            tracing::warn!(kind = %error.kind(), %error, "variation failed");
            VariationResult::Failure(failure(palette_name, &error))
        }
    };
    // The caller may have stopped listening; nothing to do then.
    let _ = result_sender.send(result);

    // A blocking render cannot be interrupted. Its late result is dropped, but the
    // worker stays occupied until it returns.
    if timed_out {
        let late = job.await;
        tracing::debug!(panicked = late.is_err(), "timed-out variation released its worker");
    }
}

fn join_failure(join_error: &tokio::task::JoinError) -> RecolorError {
    RecolorError::Internal {
        message: if join_error.is_panic() {
            "variation task panicked".to_string()
        } else {
            "variation task was cancelled".to_string()
        },
    }
}

fn failure(palette_name: String, error: &RecolorError) -> VariationFailure {
    FailureReason {
        palette_name,
        kind: error.kind(),
        message: error.to_string(),
    }
}

/// Runs a batch of variations over one base image.
pub struct VariationOrchestrator {
    renderer: Arc<dyn VariationRenderer>,
    task_timeout: Duration,
}

impl VariationOrchestrator {
    pub fn new(config: &RecolorConfig) -> Self {
        Self {
            renderer: Arc::new(RecolorPipeline::new(config)),
            task_timeout: Duration::from_secs(config.task_timeout_secs),
        }
    }

    /// Create with a custom renderer
    pub fn with_renderer(renderer: Arc<dyn VariationRenderer>, task_timeout: Duration) -> Self {
        Self {
            renderer,
            task_timeout,
        }
    }

    /// Decodes `base_image` and runs every spec.
    ///
    /// # Errors
    ///
    /// `DecodeError` if the base image is unreadable (nothing is attempted), and
    /// `AggregateFailure` if every variation failed. Individual failures are
    /// otherwise reported inside the returned list.
    pub async fn run(
        &self,
        base_image: &[u8],
        specs: Vec<VariationSpec>,
        concurrency_limit: usize,
    ) -> Result<Vec<VariationResult>> {
        let bytes = base_image.to_vec();
        let source = tokio::task::spawn_blocking(move || codec::decode(&bytes))
            .await
            .map_err(|e| RecolorError::Internal {
                message: format!("decode task failed: {e}"),
            })??;
        self.run_decoded(Arc::new(source), specs, concurrency_limit).await
    }

    /// Like [`run`](Self::run), but decodes through `cache` under `key`. A hit skips
    /// decoding and `base_image` is not read.
    pub async fn run_cached(
        &self,
        cache: &ImageCache,
        key: &str,
        base_image: &[u8],
        specs: Vec<VariationSpec>,
        concurrency_limit: usize,
    ) -> Result<Vec<VariationResult>> {
        let source = match cache.get(key) {
            Some(hit) => {
                tracing::debug!(key, "base image served from cache");
                hit
            }
            None => {
                let cache = cache.clone();
                let key = key.to_string();
                let bytes = base_image.to_vec();
                tokio::task::spawn_blocking(move || cache.get_or_decode(&key, &bytes))
                    .await
                    .map_err(|e| RecolorError::Internal {
                        message: format!("decode task failed: {e}"),
                    })??
            }
        };
        self.run_decoded(source, specs, concurrency_limit).await
    }

    /// Like [`run`](Self::run), for callers that already hold a decoded image.
    pub async fn run_decoded(
        &self,
        source: Arc<PixelBuffer>,
        specs: Vec<VariationSpec>,
        concurrency_limit: usize,
    ) -> Result<Vec<VariationResult>> {
        if specs.is_empty() {
            return Ok(Vec::new());
        }
        let names: Vec<String> = specs.iter().map(|spec| spec.palette.name.clone()).collect();
        let pool = WorkerPool::new(
            concurrency_limit.max(1).min(specs.len()),
            Arc::clone(&self.renderer),
            self.task_timeout,
        );
        tracing::info!(
            variations = specs.len(),
            workers = pool.size(),
            width = source.width(),
            height = source.height(),
            "starting variation batch"
        );

        let receivers = specs
            .into_iter()
            .enumerate()
            .map(|(index, spec)| pool.submit(index, Arc::clone(&source), spec))
            .collect::<Result<Vec<_>>>()?;

        let results: Vec<VariationResult> = futures::future::join_all(receivers)
            .await
            .into_iter()
            .zip(names)
            .map(|(received, palette_name)| {
                received.unwrap_or_else(|_| {
                    let error = RecolorError::Internal {
                        message: "worker dropped the variation".to_string(),
                    };
                    VariationResult::Failure(failure(palette_name, &error))
                })
            })
            .collect();

        finish_batch(results)
    }

    /// Runs the batch, then stores every success through `sink`, filling in its URL.
    /// A store failure turns that entry into a `Failure` of kind `storage`.
    pub async fn run_and_store(
        &self,
        base_image: &[u8],
        specs: Vec<VariationSpec>,
        concurrency_limit: usize,
        sink: &dyn StorageSink,
    ) -> Result<Vec<VariationResult>> {
        let results = self.run(base_image, specs, concurrency_limit).await?;
        self.store_results(results, sink).await
    }

    /// Stores every success of a finished batch through `sink`, in order.
    ///
    /// # Errors
    ///
    /// `AggregateFailure` if nothing succeeded once storage is accounted for.
    pub async fn store_results(
        &self,
        results: Vec<VariationResult>,
        sink: &dyn StorageSink,
    ) -> Result<Vec<VariationResult>> {
        let mut stored = Vec::with_capacity(results.len());
        for (index, result) in results.into_iter().enumerate() {
            let entry = match result {
                VariationResult::Success(mut output) => {
                    let metadata = VariationMetadata::for_output(index, &output);
                    match sink.store(&output.bytes, &metadata).await {
                        Ok(url) => {
                            output.url = Some(url);
                            VariationResult::Success(output)
                        }
                        Err(error) => {
                            tracing::warn!(palette = %output.name, %error, "storing variation failed");
                            VariationResult::Failure(FailureReason {
                                palette_name: output.name,
                                kind: ErrorKind::Storage,
                                message: error.to_string(),
                            })
                        }
                    }
                }
                failed => failed,
            };
            stored.push(entry);
        }

        finish_batch(stored)
    }
}

/// Escalates only when every variation failed.
fn finish_batch(results: Vec<VariationResult>) -> Result<Vec<VariationResult>> {
    let succeeded = results.iter().filter(|result| result.is_success()).count();
    tracing::info!(
        succeeded,
        failed = results.len() - succeeded,
        "variation batch complete"
    );

    if !results.is_empty() && succeeded == 0 {
        let failures = results
            .into_iter()
            .filter_map(|result| match result {
                VariationResult::Failure(failure) => Some(failure),
                VariationResult::Success(_) => None,
            })
            .collect();
        return Err(RecolorError::AggregateFailure { failures });
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::color::RgbColor;
    use crate::core_modules::palette::PaletteSpec;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Echoes the palette name back; optionally sleeps or panics for named palettes.
    struct ScriptedRenderer {
        running: AtomicUsize,
        peak: AtomicUsize,
    }

    impl ScriptedRenderer {
        fn new() -> Self {
            Self {
                running: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    impl VariationRenderer for ScriptedRenderer {
        fn render(&self, _source: &PixelBuffer, spec: &VariationSpec) -> Result<VariationOutput> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);

            let name = spec.palette.name.as_str();
            if let Some(millis) = name.strip_prefix("sleep-").and_then(|ms| ms.parse().ok()) {
                std::thread::sleep(Duration::from_millis(millis));
            }
            self.running.fetch_sub(1, Ordering::SeqCst);
            if name == "panic" {
                panic!("renderer blew up");
            }
            if spec.palette.colors.is_empty() {
                return Err(RecolorError::palette("palette has no colors"));
            }
            Ok(VariationOutput {
                name: name.to_string(),
                description: None,
                bytes: name.as_bytes().to_vec(),
                format: codec::OutputFormat::Png,
                dominant_colors: Vec::new(),
                palette: spec.palette.colors.clone(),
                url: None,
            })
        }
    }

    fn spec(name: &str) -> VariationSpec {
        VariationSpec::new(PaletteSpec::new(name, ["#112233"]))
    }

    fn source() -> Arc<PixelBuffer> {
        Arc::new(PixelBuffer::filled(4, 4, RgbColor::new(10, 20, 30)))
    }

    fn orchestrator(renderer: Arc<ScriptedRenderer>, timeout: Duration) -> VariationOrchestrator {
        VariationOrchestrator::with_renderer(renderer, timeout)
    }

    #[tokio::test]
    async fn results_follow_submission_order() {
        let renderer = Arc::new(ScriptedRenderer::new());
        let specs = vec![spec("sleep-120"), spec("sleep-5"), spec("sleep-60"), spec("fast")];
        let results = orchestrator(renderer, Duration::from_secs(5))
            .run_decoded(source(), specs, 4)
            .await
            .unwrap();
        let names: Vec<_> = results.iter().map(|r| r.name().to_string()).collect();
        assert_eq!(names, vec!["sleep-120", "sleep-5", "sleep-60", "fast"]);
        assert!(results.iter().all(VariationResult::is_success));
    }

    #[tokio::test]
    async fn concurrency_never_exceeds_the_limit() {
        let renderer = Arc::new(ScriptedRenderer::new());
        let specs = (0..8).map(|_| spec("sleep-30")).collect();
        orchestrator(Arc::clone(&renderer), Duration::from_secs(5))
            .run_decoded(source(), specs, 2)
            .await
            .unwrap();
        assert!(renderer.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn timed_out_renders_keep_their_worker() {
        let renderer = Arc::new(ScriptedRenderer::new());
        let specs = vec![spec("sleep-300"), spec("sleep-300"), spec("sleep-300"), spec("fast")];
        let results = orchestrator(Arc::clone(&renderer), Duration::from_millis(30))
            .run_decoded(source(), specs, 1)
            .await
            .unwrap();

        assert_eq!(renderer.peak.load(Ordering::SeqCst), 1);
        let kinds: Vec<_> = results[..3].iter().map(|r| r.as_failure().unwrap().kind).collect();
        assert_eq!(kinds, vec![ErrorKind::Timeout; 3]);
        assert!(results[3].is_success());
    }

    #[tokio::test]
    async fn idle_workers_take_the_next_job() {
        let renderer = Arc::new(ScriptedRenderer::new());
        let specs = vec![
            spec("sleep-400"),
            spec("sleep-10"),
            spec("sleep-400"),
            spec("sleep-10"),
            spec("sleep-10"),
        ];
        let started = std::time::Instant::now();
        let results = orchestrator(Arc::clone(&renderer), Duration::from_secs(5))
            .run_decoded(source(), specs, 2)
            .await
            .unwrap();

        // Fixed assignment would queue both slow jobs on one worker (~810ms).
        let elapsed = started.elapsed();
        assert!(elapsed < Duration::from_millis(700), "{elapsed:?}");
        assert!(results.iter().all(VariationResult::is_success));
        assert!(renderer.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn timeouts_and_panics_are_isolated() {
        let renderer = Arc::new(ScriptedRenderer::new());
        let specs = vec![spec("ok"), spec("sleep-1000"), spec("panic")];
        let results = orchestrator(renderer, Duration::from_millis(100))
            .run_decoded(source(), specs, 3)
            .await
            .unwrap();

        assert!(results[0].is_success());
        let timed_out = results[1].as_failure().unwrap();
        assert_eq!(timed_out.kind, ErrorKind::Timeout);
        assert_eq!(timed_out.palette_name, "sleep-1000");
        assert_eq!(results[2].as_failure().unwrap().kind, ErrorKind::Internal);
    }

    #[tokio::test]
    async fn all_failed_is_an_aggregate_error() {
        let renderer = Arc::new(ScriptedRenderer::new());
        let empty = VariationSpec::new(PaletteSpec::new("empty", Vec::<String>::new()));
        let err = orchestrator(renderer, Duration::from_secs(5))
            .run_decoded(source(), vec![empty, spec("panic")], 0)
            .await
            .unwrap_err();
        match err {
            RecolorError::AggregateFailure { failures } => {
                let kinds: Vec<_> = failures.iter().map(|f| f.kind).collect();
                assert_eq!(kinds, vec![ErrorKind::PaletteValidation, ErrorKind::Internal]);
            }
            other => panic!("expected aggregate failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_batch_is_empty() {
        let renderer = Arc::new(ScriptedRenderer::new());
        let results = orchestrator(renderer, Duration::from_secs(1))
            .run_decoded(source(), Vec::new(), 4)
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn undecodable_base_image_is_fatal() {
        let renderer = Arc::new(ScriptedRenderer::new());
        let err = orchestrator(renderer, Duration::from_secs(1))
            .run(b"definitely not a png", vec![spec("ok")], 2)
            .await
            .unwrap_err();
        assert!(matches!(err, RecolorError::Decode { .. }));
        assert!(err.is_client_error());
    }

    struct RejectingSink;

    #[async_trait::async_trait]
    impl StorageSink for RejectingSink {
        async fn store(&self, _bytes: &[u8], metadata: &VariationMetadata) -> Result<String> {
            if metadata.name == "reject" {
                return Err(RecolorError::Storage {
                    message: "bucket full".to_string(),
                    source: None,
                });
            }
            Ok(format!("test://{}", metadata.index))
        }
    }

    #[tokio::test]
    async fn cached_batches_decode_once() {
        let renderer = Arc::new(ScriptedRenderer::new());
        let orchestrator = orchestrator(renderer, Duration::from_secs(5));
        let cache = ImageCache::new(4);
        let image = codec::encode_as(&source(), codec::OutputFormat::Png, None).unwrap();

        orchestrator
            .run_cached(&cache, "base", &image, vec![spec("first")], 1)
            .await
            .unwrap();
        // Garbage bytes under the same key must never reach the decoder.
        let again = orchestrator
            .run_cached(&cache, "base", b"not an image", vec![spec("second")], 1)
            .await
            .unwrap();
        assert!(again[0].is_success());
        assert_eq!(cache.stats().entry_count, 1);

        let err = orchestrator
            .run_cached(&cache, "other", b"not an image", vec![spec("third")], 1)
            .await
            .unwrap_err();
        assert!(matches!(err, RecolorError::Decode { .. }));
    }

    #[tokio::test]
    async fn storage_failures_become_variation_failures() {
        let renderer = Arc::new(ScriptedRenderer::new());
        let image = codec::encode_as(&source(), codec::OutputFormat::Png, None).unwrap();
        let results = orchestrator(renderer, Duration::from_secs(5))
            .run_and_store(&image, vec![spec("keep"), spec("reject")], 2, &RejectingSink)
            .await
            .unwrap();

        assert_eq!(results[0].as_success().unwrap().url.as_deref(), Some("test://0"));
        let rejected = results[1].as_failure().unwrap();
        assert_eq!(rejected.kind, ErrorKind::Storage);
        assert!(rejected.message.contains("bucket full"));
    }
}
