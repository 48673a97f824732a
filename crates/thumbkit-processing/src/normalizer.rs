//! Media ingestion normalizer.
//!
//! [`Normalizer::normalize`] runs the cheap synchronous checks (allow-list,
//! byte ceilings, truncation, option compatibility) and returns a lazy
//! [`NormalizeJob`]. Awaiting the job decodes the source off the executor,
//! registers a display handle and yields a [`MediaDescriptor`]. Dropping or
//! cancelling the job aborts the decode and leaves nothing registered.

use crate::descriptor::{DisplayFacts, MediaDescriptor};
use crate::display::{DisplayContent, DisplayRegistry};
use crate::image::{ImageProcessor, ImageResize, ImageTransformer, RenderPlan};
use crate::progress::{ProgressReporter, ProgressStream};
use crate::source::MediaSource;
use crate::traits::{DecodeContext, MediaProcessor};
use crate::validator::MediaValidator;
use crate::video::{processor_from_config, SharedVideoProcessor};
use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt};
use std::fmt;
use std::future::IntoFuture;
use std::sync::Arc;
use thumbkit_core::{
    is_format_supported, ErrorMetadata, LogLevel, MediaFormat, NormalizeError, NormalizeOptions,
    NormalizeResult, NormalizerConfig, ResourceLimit,
};
use tokio_util::sync::CancellationToken;

/// Progress range of the image decode when a rendition follows it
const IMAGE_DECODE_END_WITH_RENDER: u8 = 90;
const IMAGE_DECODE_END: u8 = 99;
const RENDER_START: u8 = 90;
const RENDER_END: u8 = 99;

struct NormalizerInner {
    config: NormalizerConfig,
    validator: MediaValidator,
    images: ImageProcessor,
    video: SharedVideoProcessor,
    registry: DisplayRegistry,
}

/// Entry point for ingesting media. Cheap to clone.
#[derive(Clone)]
pub struct Normalizer {
    inner: Arc<NormalizerInner>,
}

impl Normalizer {
    pub fn new(config: NormalizerConfig) -> anyhow::Result<Self> {
        let video = processor_from_config(&config)?;
        Self::with_video_processor(config, video)
    }

    /// Load [`NormalizerConfig`] from the environment
    pub fn from_env() -> anyhow::Result<Self> {
        Self::new(NormalizerConfig::from_env()?)
    }

    /// Build with an explicit video backend
    pub fn with_video_processor(
        config: NormalizerConfig,
        video: SharedVideoProcessor,
    ) -> anyhow::Result<Self> {
        config.validate()?;
        tracing::info!(
            max_image_bytes = config.max_image_bytes,
            max_video_bytes = config.max_video_bytes,
            max_source_dimension = config.max_source_dimension,
            video_backend = video.name(),
            "Normalizer initialized"
        );
        Ok(Self {
            inner: Arc::new(NormalizerInner {
                validator: MediaValidator::from_config(&config),
                images: ImageProcessor::from_config(&config),
                registry: DisplayRegistry::new(config.display_uri_prefix.clone()),
                video,
                config,
            }),
        })
    }

    pub fn config(&self) -> &NormalizerConfig {
        &self.inner.config
    }

    /// Registry the rendering surface resolves display URIs against
    pub fn registry(&self) -> &DisplayRegistry {
        &self.inner.registry
    }

    /// Whether the source's declared type is on the allow-list. No decoding.
    pub fn is_format_supported(&self, source: &MediaSource) -> bool {
        is_format_supported(source.content_type())
    }

    /// Validate `source` and `options` and prepare a normalization.
    #[tracing::instrument(skip(self, source, options), fields(
        content_type = %source.content_type(),
        declared_size = source.declared_size()
    ))]
    pub fn normalize(
        &self,
        source: MediaSource,
        options: NormalizeOptions,
    ) -> NormalizeResult<NormalizeJob> {
        let prepared = self
            .inner
            .validator
            .validate_source(&source)
            .and_then(|format| Ok((format, resolve_target_format(format, &options)?)));
        let (format, target_format) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => {
                log_failure(&e);
                return Err(e);
            }
        };

        let (reporter, progress) = ProgressReporter::channel();
        Ok(NormalizeJob {
            normalizer: self.clone(),
            source,
            format,
            target_format,
            max_dimension: options.effective_max_dimension(),
            reporter,
            progress: Some(progress),
            cancel: CancellationToken::new(),
        })
    }

    /// Normalize while forwarding every progress value to `on_progress`.
    pub async fn normalize_with_progress<F>(
        &self,
        source: MediaSource,
        options: NormalizeOptions,
        mut on_progress: F,
    ) -> NormalizeResult<MediaDescriptor>
    where
        F: FnMut(u8),
    {
        let mut job = self.normalize(source, options)?;
        let Some(mut progress) = job.take_progress() else {
            return job.run().await;
        };

        let run = job.run();
        tokio::pin!(run);
        loop {
            tokio::select! {
                biased;
                Some(percent) = progress.next() => on_progress(percent),
                result = &mut run => {
                    while let Some(Some(percent)) = progress.next().now_or_never() {
                        on_progress(percent);
                    }
                    return result;
                }
            }
        }
    }

    async fn normalize_image(
        &self,
        source: &MediaSource,
        format: MediaFormat,
        plan: RenderPlan,
        reporter: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> NormalizeResult<MediaDescriptor> {
        let images = &self.inner.images;
        images.validate(source.body(), format)?;

        let header = images.read_dimensions(source.body(), format)?;
        images.check_limits(header)?;
        let decode_end = if ImageTransformer::needs_render(format, header, &plan) {
            IMAGE_DECODE_END_WITH_RENDER
        } else {
            IMAGE_DECODE_END
        };

        let ctx = DecodeContext::new(reporter.span(0, decode_end), cancel.clone());
        let decoded = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(NormalizeError::Cancelled),
            result = images.extract_metadata(source, format, ctx) => result,
        }?;
        let dimensions = decoded.dimensions;
        let color_type = decoded.metadata.color_type;

        let rendition = if ImageTransformer::needs_render(format, dimensions, &plan) {
            let render_span = reporter.span(RENDER_START, RENDER_END);
            let image = decoded.image;
            let rendition = run_blocking(cancel, move || {
                ImageTransformer::render(&image, dimensions, &plan, &render_span)
            })
            .await?;
            Some(rendition)
        } else {
            None
        };

        let content = match rendition {
            Some(rendition) => DisplayContent {
                bytes: rendition.bytes,
                format: rendition.format,
                dimensions: rendition.dimensions,
            },
            None => DisplayContent {
                bytes: source.body().clone(),
                format,
                dimensions,
            },
        };
        let facts = DisplayFacts {
            dimensions: content.dimensions,
            format: content.format,
        };
        let display = self.inner.registry.register(content);

        Ok(MediaDescriptor::image(
            source.handle(),
            display,
            dimensions,
            format,
            color_type,
            facts,
        ))
    }

    async fn normalize_video(
        &self,
        source: &MediaSource,
        format: MediaFormat,
        max_dimension: Option<u32>,
        reporter: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> NormalizeResult<MediaDescriptor> {
        let ctx = DecodeContext::new(reporter.span(0, 99), cancel.clone());
        let metadata = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(NormalizeError::Cancelled),
            result = self.inner.video.extract_metadata(source, format, ctx) => result,
        }?;

        let dimensions = metadata.dimensions().ok_or_else(|| {
            NormalizeError::decode(
                format.token(),
                format!("invalid dimensions {}x{}", metadata.width, metadata.height),
            )
        })?;
        let max_side = self.inner.config.max_source_dimension;
        if dimensions.longest_side() > max_side {
            return Err(NormalizeError::exhausted(
                ResourceLimit::SourceDimension,
                dimensions.longest_side() as u64,
                max_side as u64,
            ));
        }
        if cancel.is_cancelled() {
            return Err(NormalizeError::Cancelled);
        }

        let display_dimensions = ImageResize::target_dimensions(dimensions, max_dimension);
        let display = self.inner.registry.register(DisplayContent {
            bytes: source.body().clone(),
            format,
            dimensions: display_dimensions,
        });

        Ok(MediaDescriptor::video(
            source.handle(),
            display,
            dimensions,
            format,
            metadata,
            display_dimensions,
        ))
    }
}

impl fmt::Debug for Normalizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Normalizer")
            .field("config", &self.inner.config)
            .field("video_backend", &self.inner.video.name())
            .field("registry", &self.inner.registry)
            .finish()
    }
}

/// A prepared, not yet started normalization.
///
/// Nothing happens until the job is awaited. Dropping it, or cancelling it
/// through [`NormalizeJob::cancel`] or its token, stops the decode.
pub struct NormalizeJob {
    normalizer: Normalizer,
    source: MediaSource,
    format: MediaFormat,
    target_format: MediaFormat,
    max_dimension: Option<u32>,
    reporter: ProgressReporter,
    progress: Option<ProgressStream>,
    cancel: CancellationToken,
}

impl NormalizeJob {
    pub fn format(&self) -> MediaFormat {
        self.format
    }

    /// Progress stream of this job; available once.
    pub fn take_progress(&mut self) -> Option<ProgressStream> {
        self.progress.take()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    #[tracing::instrument(skip(self), fields(format = %self.format))]
    pub async fn run(self) -> NormalizeResult<MediaDescriptor> {
        let NormalizeJob {
            normalizer,
            source,
            format,
            target_format,
            max_dimension,
            reporter,
            progress: _,
            cancel,
        } = self;

        let guard = cancel.clone().drop_guard();
        let start = std::time::Instant::now();

        let result = if cancel.is_cancelled() {
            Err(NormalizeError::Cancelled)
        } else if format.is_image() {
            let plan = RenderPlan {
                max_dimension,
                target_format,
            };
            normalizer
                .normalize_image(&source, format, plan, &reporter, &cancel)
                .await
        } else {
            normalizer
                .normalize_video(&source, format, max_dimension, &reporter, &cancel)
                .await
        };

        match result {
            Ok(descriptor) => {
                guard.disarm();
                reporter.complete();
                tracing::info!(
                    kind = %descriptor.kind(),
                    dimensions = %descriptor.dimensions(),
                    duration_seconds = ?descriptor.duration_seconds(),
                    display_uri = %descriptor.display_uri(),
                    duration_ms = start.elapsed().as_millis(),
                    "Media normalized"
                );
                Ok(descriptor)
            }
            Err(e) => {
                log_failure(&e);
                Err(e)
            }
        }
    }
}

impl IntoFuture for NormalizeJob {
    type Output = NormalizeResult<MediaDescriptor>;
    type IntoFuture = BoxFuture<'static, Self::Output>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.run())
    }
}

impl fmt::Debug for NormalizeJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NormalizeJob")
            .field("source", &self.source)
            .field("format", &self.format)
            .field("target_format", &self.target_format)
            .field("max_dimension", &self.max_dimension)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

/// Resolve `targetFormat` against the source format.
///
/// Images may be transcoded to any image format. Video is never re-encoded,
/// so a video target must name the source format.
fn resolve_target_format(
    format: MediaFormat,
    options: &NormalizeOptions,
) -> NormalizeResult<MediaFormat> {
    let Some(token) = options.target_format.as_deref() else {
        return Ok(format);
    };
    let target = MediaFormat::parse(token).ok_or_else(|| NormalizeError::unsupported(token))?;
    if target == format || (format.is_image() && target.is_image()) {
        Ok(target)
    } else {
        Err(NormalizeError::unsupported(target.mime_type()))
    }
}

/// Run `task` on the blocking pool, returning early once `cancel` fires.
async fn run_blocking<T, F>(cancel: &CancellationToken, task: F) -> NormalizeResult<T>
where
    F: FnOnce() -> NormalizeResult<T> + Send + 'static,
    T: Send + 'static,
{
    let handle = tokio::task::spawn_blocking(task);
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(NormalizeError::Cancelled),
        joined = handle => joined
            .map_err(|e| NormalizeError::Internal(format!("decode task failed: {}", e)))?,
    }
}

fn log_failure(error: &NormalizeError) {
    match error.log_level() {
        LogLevel::Debug => tracing::debug!(
            error_code = error.error_code(),
            error = %error,
            "Normalization failed"
        ),
        LogLevel::Warn => tracing::warn!(
            error_code = error.error_code(),
            error = %error,
            "Normalization failed"
        ),
        LogLevel::Error => tracing::error!(
            error_code = error.error_code(),
            error = %error,
            "Normalization failed"
        ),
    }
}
