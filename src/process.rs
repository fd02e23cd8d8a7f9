//! One invocation of the pipeline: source bytes in, [`GeneratedArtifact`] out.
//!
//! ## Flow
//!
//! ```text
//! disable? ──yes──► emit source verbatim ──► 100×100 artifact
//!    │no
//! validate options, resolve output mime, check remote credentials
//!    │
//!    ├──► remote publish (optional) ─────────────┐   rayon::join
//!    └──► cache lookup ─hit─► stored results     │
//!              └─miss─► metadata → resize × N ───┤
//!                                                ▼
//!                 emit each distinct result, map request positions
//!                                                ▼
//!                                    assemble GeneratedArtifact
//! ```
//!
//! Everything that can be checked without pixel work is checked first: an
//! unknown output extension or a missing credential fails before the adapter
//! or the network is touched. After that every failure is fatal for the
//! whole invocation. A failed upload discards resizes that already
//! succeeded, and a single failed resize discards the batch. Nothing is
//! emitted until both branches have succeeded.
//!
//! ## Collaborators
//!
//! The adapter, emitter, and remote host are injected through [`Pipeline`],
//! so tests run the whole flow with mocks. Progress is reported as
//! [`ProcessEvent`]s on an optional channel; the CLI prints them from a
//! separate thread.

use crate::artifact::{self, EmittedFile, GeneratedArtifact};
use crate::cache::{CacheError, CacheKey, CacheStatus, KeyParams, ResultCache};
use crate::config::{ConfigError, ResponsiveOptions};
use crate::emit::{EmitError, EmitRequest, FileEmitter};
use crate::imaging::{
    AdapterError, ImageAdapter, OutputFormat, ResizeFailure, SourceImage, TransformError,
    TransformOutput, TransformRequest, run_transform,
};
use crate::remote::{self, CloudinaryHost, RemoteError, RemoteHost};
use std::path::Path;
use std::sync::mpsc::Sender;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("no mime type for output extension '{0}'")]
    UnsupportedMime(String),
    #[error("Failed to decode source: {0}")]
    Decode(#[source] AdapterError),
    #[error(transparent)]
    Resize(ResizeFailure),
    #[error("missing Cloudinary credential: {0}")]
    MissingCredential(&'static str),
    #[error("Cloudinary upload failed: {0}")]
    RemoteUpload(String),
    #[error("Failed to emit file: {0}")]
    Emit(#[from] EmitError),
    #[error("Failed to compute cache key: {0}")]
    CacheKey(#[from] CacheError),
    #[error("expected {expected} results, got {found}")]
    ResultCount { expected: usize, found: usize },
    #[error("no files were emitted")]
    EmptyOutput,
}

impl From<TransformError> for ProcessError {
    fn from(err: TransformError) -> Self {
        match err {
            TransformError::Metadata(source) => Self::Decode(source),
            TransformError::Resize(failure) => Self::Resize(failure),
        }
    }
}

impl From<RemoteError> for ProcessError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::MissingCredential(field) => Self::MissingCredential(field),
            RemoteError::Upload(message) => Self::RemoteUpload(message),
        }
    }
}

/// Progress events reported during an invocation.
#[derive(Debug, Clone)]
pub enum ProcessEvent {
    /// Results are available, either from the cache or freshly encoded.
    Transformed {
        source: String,
        /// Effective width per requested position.
        widths: Vec<u32>,
        /// Number of resizes the adapter ran (or would have run).
        scheduled: usize,
        cache: CacheStatus,
    },
    Emitted {
        path: String,
        width: u32,
        height: u32,
    },
    Uploaded {
        public_id: String,
        url: String,
    },
    UploadFailed {
        public_id: String,
        message: String,
    },
    /// `disable = true`: the source was passed through untouched.
    Disabled { source: String, path: String },
}

/// Injected collaborators for one invocation.
pub struct Pipeline<'a> {
    pub adapter: &'a dyn ImageAdapter,
    pub emitter: &'a dyn FileEmitter,
    /// Transport used when `cloudinary` credentials are configured. `None`
    /// builds a [`CloudinaryHost`] from the credentials.
    pub remote: Option<&'a dyn RemoteHost>,
    pub events: Option<Sender<ProcessEvent>>,
}

impl<'a> Pipeline<'a> {
    pub fn new(adapter: &'a dyn ImageAdapter, emitter: &'a dyn FileEmitter) -> Self {
        Self {
            adapter,
            emitter,
            remote: None,
            events: None,
        }
    }

    pub fn with_remote(mut self, remote: &'a dyn RemoteHost) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn with_events(mut self, events: Sender<ProcessEvent>) -> Self {
        self.events = Some(events);
        self
    }

    fn send(&self, event: ProcessEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }
}

/// Outcome of a successful invocation.
#[derive(Debug, Clone)]
pub struct ProcessResult {
    pub artifact: GeneratedArtifact,
    /// `None` when processing was disabled.
    pub cache: Option<CacheStatus>,
}

/// Read `path` and run [`process`] on it.
pub fn process_file(
    path: &Path,
    options: &ResponsiveOptions,
    pipeline: &Pipeline<'_>,
) -> Result<ProcessResult, ProcessError> {
    let source = SourceImage::from_path(path)?;
    process(&source, options, pipeline)
}

/// Run one invocation.
pub fn process(
    source: &SourceImage,
    options: &ResponsiveOptions,
    pipeline: &Pipeline<'_>,
) -> Result<ProcessResult, ProcessError> {
    if options.disable {
        return process_disabled(source, options, pipeline);
    }

    options.validate()?;
    let extension = source.extension();
    let format = options.output_format(&extension).ok_or_else(|| {
        ProcessError::UnsupportedMime(options.format.clone().unwrap_or_else(|| extension.clone()))
    })?;
    let adapter_options = options.adapter_options()?;

    let credentials = options
        .cloudinary
        .as_ref()
        .map(|creds| creds.validate())
        .transpose()?;
    let cloudinary_host: CloudinaryHost;
    let host: Option<&dyn RemoteHost> = match (credentials, pipeline.remote) {
        (None, _) => None,
        (Some(_), Some(injected)) => Some(injected),
        (Some(valid), None) => {
            cloudinary_host = CloudinaryHost::new(valid)?;
            Some(&cloudinary_host)
        }
    };
    // The original is uploaded, so it keeps its own mime when it has one.
    let source_mime = OutputFormat::from_extension(&extension)
        .unwrap_or(format)
        .mime();

    let widths = options.requested_widths();
    let request = TransformRequest {
        widths: &widths,
        placeholder: options.placeholder_width(),
        format,
        options: adapter_options,
    };

    let events = pipeline.events.as_ref();
    let (uploaded, transformed) = rayon::join(
        || {
            host.map(|h| remote::publish(h, source, source_mime, events))
                .transpose()
        },
        || transform_cached(pipeline.adapter, source, &request, options),
    );
    let (output, cache) = transformed?;
    let remote_src = uploaded?;

    let plan = request.plan(output.source);
    let expected = plan.scheduled().len();
    if output.results.len() != expected {
        return Err(ProcessError::ResultCount {
            expected,
            found: output.results.len(),
        });
    }
    pipeline.send(ProcessEvent::Transformed {
        source: source.stem().to_string(),
        widths: plan.effective_widths(),
        scheduled: expected,
        cache,
    });

    let (regular, placeholder) = output.results.split_at(plan.widths.len());
    let distinct = regular
        .iter()
        .map(|result| -> Result<EmittedFile, EmitError> {
            let file = pipeline.emitter.emit(&EmitRequest {
                name: source.stem(),
                ext: format.extension(),
                data: &result.data,
                width: result.width,
                height: result.height,
            })?;
            pipeline.send(ProcessEvent::Emitted {
                path: file.path.clone(),
                width: file.width,
                height: file.height,
            });
            Ok(file)
        })
        .collect::<Result<Vec<_>, _>>()?;
    let files = plan
        .positions
        .iter()
        .map(|&i| distinct[i].clone())
        .collect();

    let artifact = artifact::assemble(
        files,
        placeholder.first().map(|result| (result, format)),
        remote_src,
    )
    .ok_or(ProcessError::EmptyOutput)?;
    info!(source = source.stem(), files = distinct.len(), ?cache, "processed");
    Ok(ProcessResult {
        artifact,
        cache: Some(cache),
    })
}

/// Emit the source bytes as-is, labelled 100×100. No adapter involved.
fn process_disabled(
    source: &SourceImage,
    options: &ResponsiveOptions,
    pipeline: &Pipeline<'_>,
) -> Result<ProcessResult, ProcessError> {
    // An extensionless source takes the configured format's extension, if any.
    let mut ext = source.extension();
    if ext.is_empty() {
        ext = options.format.clone().unwrap_or_default();
    }
    let file = pipeline.emitter.emit(&EmitRequest {
        name: source.stem(),
        ext: &ext,
        data: source.bytes(),
        width: artifact::DISABLED_DIMENSION,
        height: artifact::DISABLED_DIMENSION,
    })?;
    pipeline.send(ProcessEvent::Disabled {
        source: source.stem().to_string(),
        path: file.path.clone(),
    });
    Ok(ProcessResult {
        artifact: artifact::disabled_artifact(file.path),
        cache: None,
    })
}

/// Run the transform engine, through the cache when one is configured.
fn transform_cached(
    adapter: &dyn ImageAdapter,
    source: &SourceImage,
    request: &TransformRequest<'_>,
    options: &ResponsiveOptions,
) -> Result<(TransformOutput, CacheStatus), ProcessError> {
    let compute = || run_transform(adapter, source, request).map_err(ProcessError::from);

    let Some(dir) = options.cache_dir() else {
        return Ok((compute()?, CacheStatus::Miss));
    };
    let identifier = options.cache_identifier();
    let key = CacheKey::compute(
        source.bytes(),
        &KeyParams {
            identifier: &identifier,
            adapter: adapter.identity(),
            format: request.format,
            options: request.options,
            widths: request.widths,
            placeholder: request.placeholder,
        },
    )?;
    debug!(%key, dir = %dir.display(), "cache lookup");
    ResultCache::new(dir, options.cache_compression).get_or_compute(&key, compute)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emit::tests::RecordingEmitter;
    use crate::imaging::backend::tests::MockAdapter;
    use crate::remote::CloudinaryCredentials;
    use crate::remote::tests::MockHost;
    use std::sync::mpsc;
    use tempfile::TempDir;

    fn source() -> SourceImage {
        SourceImage::new(b"original".to_vec(), "photos/dawn.jpg")
    }

    fn sized(sizes: &[u32]) -> ResponsiveOptions {
        ResponsiveOptions {
            sizes: Some(sizes.to_vec()),
            ..ResponsiveOptions::default()
        }
    }

    fn credentials() -> CloudinaryCredentials {
        CloudinaryCredentials {
            cloud_name: Some("demo".into()),
            api_key: Some("123".into()),
            api_secret: Some("shh".into()),
        }
    }

    #[test]
    fn end_to_end_deduplicates_clamped_widths() {
        let adapter = MockAdapter::with_dimensions(1024, 768);
        let emitter = RecordingEmitter::default();
        let pipeline = Pipeline::new(&adapter, &emitter);

        let result = process(&source(), &sized(&[300, 600, 1024, 2000]), &pipeline).unwrap();
        let artifact = result.artifact;

        assert_eq!(adapter.resized_widths(), vec![300, 600, 1024]);
        assert_eq!(emitter.count(), 3);
        let widths: Vec<u32> = artifact.src_set.iter().map(|f| f.width).collect();
        assert_eq!(widths, vec![300, 600, 1024, 1024]);
        assert_eq!(artifact.src_set[2], artifact.src_set[3]);
        assert_eq!((artifact.width, artifact.height), (300, 225));
        assert_eq!(artifact.src, "dawn-300.jpg");
        assert_eq!(artifact.to_string(), "dawn-300.jpg");
        assert_eq!(result.cache, Some(CacheStatus::Miss));
    }

    #[test]
    fn duplicate_positions_share_one_result() {
        let adapter = MockAdapter::with_dimensions(500, 500);
        let emitter = RecordingEmitter::default();
        let pipeline = Pipeline::new(&adapter, &emitter);

        let artifact = process(&source(), &sized(&[800, 300, 1400]), &pipeline)
            .unwrap()
            .artifact;

        assert_eq!(adapter.resized_widths(), vec![300, 500]);
        assert_eq!(artifact.src_set[0], artifact.src_set[2]);
        let emitted = emitter.emitted.lock().unwrap();
        assert_eq!(emitted.len(), 2);
    }

    #[test]
    fn placeholder_is_inlined_not_emitted() {
        let adapter = MockAdapter::with_dimensions(1024, 768);
        let emitter = RecordingEmitter::default();
        let pipeline = Pipeline::new(&adapter, &emitter);
        let options = ResponsiveOptions {
            placeholder: true,
            ..sized(&[40, 600])
        };

        let artifact = process(&source(), &options, &pipeline).unwrap().artifact;

        // 40 is resized twice: once as a regular width, once as placeholder.
        assert_eq!(adapter.resized_widths(), vec![40, 40, 600]);
        assert_eq!(emitter.count(), 2);
        // "40x30" in base64
        assert_eq!(
            artifact.placeholder.as_deref(),
            Some("data:image/jpeg;base64,NDB4MzA=")
        );
    }

    #[test]
    fn explicit_format_changes_extension_and_mime() {
        let adapter = MockAdapter::with_dimensions(1024, 768);
        let emitter = RecordingEmitter::default();
        let pipeline = Pipeline::new(&adapter, &emitter);
        let options = ResponsiveOptions {
            format: Some("webp".into()),
            ..sized(&[300])
        };

        let artifact = process(&source(), &options, &pipeline).unwrap().artifact;
        assert_eq!(artifact.src, "dawn-300.webp");
    }

    #[test]
    fn cache_hit_skips_adapter_entirely() {
        let tmp = TempDir::new().unwrap();
        let options = ResponsiveOptions {
            cache_directory: crate::config::CacheDirectory::Path(tmp.path().to_path_buf()),
            ..sized(&[300, 600])
        };

        let first_adapter = MockAdapter::with_dimensions(1024, 768);
        let emitter = RecordingEmitter::default();
        let first = process(&source(), &options, &Pipeline::new(&first_adapter, &emitter)).unwrap();
        assert_eq!(first.cache, Some(CacheStatus::Miss));

        let second_adapter = MockAdapter::with_dimensions(1024, 768);
        let second =
            process(&source(), &options, &Pipeline::new(&second_adapter, &emitter)).unwrap();

        assert_eq!(second.cache, Some(CacheStatus::Hit));
        assert!(second_adapter.get_operations().is_empty());
        assert_eq!(first.artifact, second.artifact);
    }

    #[test]
    fn changed_options_miss_the_cache() {
        let tmp = TempDir::new().unwrap();
        let options = ResponsiveOptions {
            cache_directory: crate::config::CacheDirectory::Path(tmp.path().to_path_buf()),
            ..sized(&[300])
        };
        let adapter = MockAdapter::with_dimensions(1024, 768);
        let emitter = RecordingEmitter::default();
        process(&source(), &options, &Pipeline::new(&adapter, &emitter)).unwrap();

        let changed = ResponsiveOptions {
            quality: 50,
            ..options
        };
        let again = process(&source(), &changed, &Pipeline::new(&adapter, &emitter)).unwrap();
        assert_eq!(again.cache, Some(CacheStatus::Miss));
    }

    #[test]
    fn disable_passes_source_through() {
        let adapter = MockAdapter::with_dimensions(1024, 768);
        let emitter = RecordingEmitter::default();
        let options = ResponsiveOptions {
            disable: true,
            ..sized(&[300, 600])
        };

        let result = process(&source(), &options, &Pipeline::new(&adapter, &emitter)).unwrap();

        assert!(adapter.get_operations().is_empty());
        assert_eq!((result.artifact.width, result.artifact.height), (100, 100));
        assert_eq!(result.artifact.images.len(), 1);
        assert_eq!(result.cache, None);
        let emitted = emitter.emitted.lock().unwrap();
        assert_eq!(emitted[0].1, b"original");
    }

    #[test]
    fn disable_extensionless_source_uses_configured_format() {
        let adapter = MockAdapter::with_dimensions(1024, 768);
        let emitter = RecordingEmitter::default();
        let options = ResponsiveOptions {
            disable: true,
            format: Some("png".into()),
            ..sized(&[300])
        };
        let source = SourceImage::new(b"original".to_vec(), "photos/dawn");

        let result = process(&source, &options, &Pipeline::new(&adapter, &emitter)).unwrap();

        assert_eq!(result.artifact.src, "dawn-100.png");
    }

    #[test]
    fn missing_credential_fails_before_any_work() {
        let adapter = MockAdapter::with_dimensions(1024, 768);
        let emitter = RecordingEmitter::default();
        let host = MockHost::succeeding("https://x/upload/v1/dawn.jpg");
        let options = ResponsiveOptions {
            cloudinary: Some(CloudinaryCredentials {
                api_key: None,
                ..credentials()
            }),
            ..sized(&[300])
        };

        let err = process(
            &source(),
            &options,
            &Pipeline::new(&adapter, &emitter).with_remote(&host),
        )
        .unwrap_err();

        assert!(matches!(err, ProcessError::MissingCredential("api_key")));
        assert!(adapter.get_operations().is_empty());
        assert_eq!(host.upload_count(), 0);
        assert_eq!(emitter.count(), 0);
    }

    #[test]
    fn remote_url_becomes_src() {
        let adapter = MockAdapter::with_dimensions(1024, 768);
        let emitter = RecordingEmitter::default();
        let host = MockHost::succeeding("https://res.cloudinary.com/demo/image/upload/v1/dawn.jpg");
        let options = ResponsiveOptions {
            cloudinary: Some(credentials()),
            ..sized(&[300, 600])
        };

        let artifact = process(
            &source(),
            &options,
            &Pipeline::new(&adapter, &emitter).with_remote(&host),
        )
        .unwrap()
        .artifact;

        assert_eq!(
            artifact.src,
            "https://res.cloudinary.com/demo/image/upload/w_[width]/v1/dawn.jpg"
        );
        assert_eq!(artifact.src_set[0].path, "dawn-300.jpg");
        assert_eq!(emitter.count(), 2);
        let uploads = host.uploads.lock().unwrap();
        assert_eq!(uploads[0], ("dawn".to_string(), 8, "image/jpeg".to_string()));
    }

    #[test]
    fn upload_failure_aborts_even_after_resizes() {
        let adapter = MockAdapter::with_dimensions(1024, 768);
        let emitter = RecordingEmitter::default();
        let host = MockHost::failing("quota exceeded");
        let options = ResponsiveOptions {
            cloudinary: Some(credentials()),
            ..sized(&[300])
        };

        let err = process(
            &source(),
            &options,
            &Pipeline::new(&adapter, &emitter).with_remote(&host),
        )
        .unwrap_err();

        match err {
            ProcessError::RemoteUpload(message) => assert_eq!(message, "quota exceeded"),
            other => panic!("expected upload error, got {other:?}"),
        }
        assert_eq!(emitter.count(), 0);
    }

    #[test]
    fn resize_failure_produces_no_artifact() {
        let adapter = MockAdapter::with_dimensions(1024, 768).failing_at(600);
        let emitter = RecordingEmitter::default();

        let err = process(
            &source(),
            &sized(&[300, 600, 900]),
            &Pipeline::new(&adapter, &emitter),
        )
        .unwrap_err();

        match err {
            ProcessError::Resize(failure) => assert_eq!(failure.width, 600),
            other => panic!("expected resize error, got {other:?}"),
        }
        assert_eq!(emitter.count(), 0);
    }

    #[test]
    fn undecodable_source_is_decode_error() {
        let adapter = MockAdapter::with_dimensions(1024, 768).undecodable();
        let emitter = RecordingEmitter::default();

        let err = process(&source(), &sized(&[300]), &Pipeline::new(&adapter, &emitter))
            .unwrap_err();
        assert!(matches!(err, ProcessError::Decode(AdapterError::Decode(_))));
    }

    #[test]
    fn unsupported_mime_fails_before_adapter() {
        let adapter = MockAdapter::with_dimensions(1024, 768);
        let emitter = RecordingEmitter::default();
        let gif = SourceImage::new(b"GIF89a".to_vec(), "anim.gif");

        let err = process(&gif, &sized(&[300]), &Pipeline::new(&adapter, &emitter)).unwrap_err();

        assert!(matches!(err, ProcessError::UnsupportedMime(ref ext) if ext == "gif"));
        assert!(adapter.get_operations().is_empty());
    }

    #[test]
    fn invalid_options_are_config_errors() {
        let adapter = MockAdapter::with_dimensions(1024, 768);
        let emitter = RecordingEmitter::default();
        let options = ResponsiveOptions {
            rotate: 45,
            ..sized(&[300])
        };
        let err = process(&source(), &options, &Pipeline::new(&adapter, &emitter)).unwrap_err();
        assert!(matches!(err, ProcessError::Config(ConfigError::Validation(_))));
    }

    #[test]
    fn events_report_transform_and_emission() {
        let adapter = MockAdapter::with_dimensions(1024, 768);
        let emitter = RecordingEmitter::default();
        let (tx, rx) = mpsc::channel();
        let pipeline = Pipeline::new(&adapter, &emitter).with_events(tx);

        process(&source(), &sized(&[300, 2000]), &pipeline).unwrap();
        drop(pipeline);
        let events: Vec<ProcessEvent> = rx.iter().collect();

        match &events[0] {
            ProcessEvent::Transformed {
                widths,
                scheduled,
                cache,
                ..
            } => {
                assert_eq!(widths, &vec![300, 1024]);
                assert_eq!(*scheduled, 2);
                assert_eq!(*cache, CacheStatus::Miss);
            }
            other => panic!("unexpected first event {other:?}"),
        }
        let emitted = events
            .iter()
            .filter(|e| matches!(e, ProcessEvent::Emitted { .. }))
            .count();
        assert_eq!(emitted, 2);
    }

    #[test]
    fn process_file_reads_from_disk() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("dawn.png");
        std::fs::write(&path, b"png bytes").unwrap();
        let adapter = MockAdapter::with_dimensions(640, 480);
        let emitter = RecordingEmitter::default();

        let artifact = process_file(&path, &sized(&[320]), &Pipeline::new(&adapter, &emitter))
            .unwrap()
            .artifact;
        assert_eq!(artifact.src, "dawn-320.png");
        assert_eq!((artifact.width, artifact.height), (320, 240));
    }

    #[test]
    fn process_file_missing_is_io_error() {
        let adapter = MockAdapter::with_dimensions(640, 480);
        let emitter = RecordingEmitter::default();
        let err = process_file(
            Path::new("/nonexistent/dawn.jpg"),
            &ResponsiveOptions::default(),
            &Pipeline::new(&adapter, &emitter),
        )
        .unwrap_err();
        assert!(matches!(err, ProcessError::Io(_)));
    }
}
