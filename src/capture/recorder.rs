//! Real-time recording through a streaming encoder.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use chrono::Utc;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, trace, warn};

use super::{
    CaptureGuard, CaptureKind, DownloadSink, FinishToken, RecordingFinisher, StartOutcome,
    video_file_name,
};
use crate::config::DEFAULT_CODEC_PREFERENCES;
use crate::error::{PanelError, Result};

/// Container type used when no preferred codec is supported.
pub const GENERIC_VIDEO_TYPE: &str = "video/webm";

/// Output of a streaming encoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecorderEvent {
    /// An encoded chunk; empty chunks are ignored.
    Data(Vec<u8>),
    /// The encoder flushed its last chunk.
    Stopped,
}

/// A streaming encoder attached to the rendering surface.
pub trait RecorderBackend: Send + Sync {
    fn is_type_supported(&self, mime_type: &str) -> bool;

    /// Begin encoding at `fps`. `mime_type` is `None` when the encoder
    /// should pick its own default.
    fn start(
        &self,
        fps: u32,
        mime_type: Option<&str>,
    ) -> Result<mpsc::UnboundedReceiver<RecorderEvent>>;

    /// Ask the encoder to flush and emit [`RecorderEvent::Stopped`].
    fn request_stop(&self);
}

struct Recording {
    id: u64,
    stopping: bool,
    timer: Option<JoinHandle<()>>,
    finish: Option<FinishToken>,
}

struct Inner {
    backend: Arc<dyn RecorderBackend>,
    sink: Arc<dyn DownloadSink>,
    guard: CaptureGuard,
    finisher: Option<RecordingFinisher>,
    codec_preferences: Vec<String>,
    recording: Mutex<Option<Recording>>,
    next_id: AtomicU64,
    finished: watch::Sender<u64>,
    last_file: Mutex<Option<String>>,
}

/// Handle to the video capture path. Clones share one recorder.
#[derive(Clone)]
pub struct VideoRecorder {
    inner: Arc<Inner>,
}

impl VideoRecorder {
    pub fn new(backend: Arc<dyn RecorderBackend>, sink: Arc<dyn DownloadSink>) -> Self {
        Self::with_options(
            backend,
            sink,
            CaptureGuard::new(),
            None,
            DEFAULT_CODEC_PREFERENCES.map(String::from).to_vec(),
        )
    }

    pub fn with_options(
        backend: Arc<dyn RecorderBackend>,
        sink: Arc<dyn DownloadSink>,
        guard: CaptureGuard,
        finisher: Option<RecordingFinisher>,
        codec_preferences: Vec<String>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                backend,
                sink,
                guard,
                finisher,
                codec_preferences,
                recording: Mutex::new(None),
                next_id: AtomicU64::new(1),
                finished: watch::Sender::new(0),
                last_file: Mutex::new(None),
            }),
        }
    }

    pub fn is_recording(&self) -> bool {
        self.inner.lock_recording().is_some()
    }

    /// Name of the most recently delivered file.
    pub fn last_file(&self) -> Option<String> {
        self.inner.last_file.lock().ok().and_then(|f| f.clone())
    }

    /// First supported codec from the preference list.
    pub fn negotiate(&self) -> Option<String> {
        self.inner
            .codec_preferences
            .iter()
            .find(|mime| self.inner.backend.is_type_supported(mime))
            .cloned()
    }

    /// Start recording; `time_limit` in seconds, zero or `None` for none.
    #[instrument(skip(self))]
    pub fn start(&self, fps: u32, time_limit: Option<f64>) -> Result<StartOutcome> {
        let handle = Handle::try_current().map_err(|_| PanelError::NoRuntime)?;
        let mut slot = self.inner.lock_recording();
        if slot.is_some() {
            debug!("Already recording, start ignored");
            return Ok(StartOutcome::AlreadyActive);
        }
        if let Err(holder) = self.inner.guard.try_acquire(CaptureKind::Video) {
            info!(?holder, "Surface busy, recording not started");
            return Ok(StartOutcome::Busy(holder));
        }

        let negotiated = self.negotiate();
        let container = negotiated.clone().unwrap_or_else(|| GENERIC_VIDEO_TYPE.to_string());
        let events = match self.inner.backend.start(fps.max(1), negotiated.as_deref()) {
            Ok(events) => events,
            Err(e) => {
                self.inner.guard.release(CaptureKind::Video);
                return Err(e);
            }
        };

        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        let timer = time_limit
            .filter(|limit| limit.is_finite() && *limit > 0.0)
            .map(|limit| {
                let weak = Arc::downgrade(&self.inner);
                handle.spawn(async move {
                    tokio::time::sleep(Duration::from_secs_f64(limit)).await;
                    if let Some(inner) = Weak::upgrade(&weak) {
                        debug!(limit, "Recording time limit reached");
                        VideoRecorder { inner }.stop();
                    }
                })
            });

        *slot = Some(Recording {
            id,
            stopping: false,
            timer,
            finish: self.inner.finisher.as_ref().map(RecordingFinisher::begin),
        });
        drop(slot);

        handle.spawn(Arc::clone(&self.inner).collect(id, container.clone(), events));
        info!(recording = id, fps, %container, ?time_limit, "Recording started");
        Ok(StartOutcome::Started)
    }

    /// Signal the encoder to finish. Idempotent; returns whether this call
    /// initiated the stop.
    pub fn stop(&self) -> bool {
        {
            let mut slot = self.inner.lock_recording();
            let Some(recording) = slot.as_mut().filter(|r| !r.stopping) else {
                return false;
            };
            recording.stopping = true;
            if let Some(timer) = recording.timer.take() {
                timer.abort();
            }
            debug!(recording = recording.id, "Recording stop requested");
        }
        self.inner.backend.request_stop();
        true
    }

    /// Wait until the current recording, if any, has been delivered.
    pub async fn wait_finished(&self) {
        let Some(id) = self.inner.lock_recording().as_ref().map(|r| r.id) else {
            return;
        };
        let mut rx = self.inner.finished.subscribe();
        let _ = rx.wait_for(|done| *done >= id).await;
    }
}

impl Inner {
    fn lock_recording(&self) -> MutexGuard<'_, Option<Recording>> {
        self.recording
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Accumulate chunks until the encoder stops, then deliver.
    async fn collect(
        self: Arc<Self>,
        id: u64,
        container: String,
        mut events: mpsc::UnboundedReceiver<RecorderEvent>,
    ) {
        let mut chunks: Vec<Vec<u8>> = Vec::new();
        while let Some(event) = events.recv().await {
            match event {
                RecorderEvent::Data(chunk) if chunk.is_empty() => {}
                RecorderEvent::Data(chunk) => {
                    trace!(recording = id, bytes = chunk.len(), "Chunk received");
                    chunks.push(chunk);
                }
                RecorderEvent::Stopped => break,
            }
        }
        let bytes = chunks.concat();
        let file_name = video_file_name(Utc::now());
        debug!(recording = id, chunks = chunks.len(), %container, "Assembling recording");

        let sink = Arc::clone(&self.sink);
        let name = file_name.clone();
        let delivered = tokio::task::spawn_blocking(move || sink.deliver(&name, bytes))
            .await
            .map_err(|e| PanelError::Recorder(format!("delivery task failed: {e}")))
            .and_then(|r| r);

        let recording = self.lock_recording().take();
        if let Some(timer) = recording.as_ref().and_then(|r| r.timer.as_ref()) {
            timer.abort();
        }
        self.guard.release(CaptureKind::Video);
        if let (Some(finisher), Some(token)) = (
            &self.finisher,
            recording.and_then(|r| r.finish),
        ) {
            finisher.finish(&token);
        }

        match delivered {
            Ok(()) => {
                info!(recording = id, file = %file_name, "Recording delivered");
                if let Ok(mut last) = self.last_file.lock() {
                    *last = Some(file_name);
                }
            }
            Err(e) => error!(recording = id, error = %e, "Recording could not be delivered"),
        }
        self.finished.send_replace(id);
    }
}

/// Recorder backend driven by hand, for tests and demos.
#[derive(Default)]
pub struct ScriptedRecorder {
    supported: Vec<String>,
    sender: Mutex<Option<mpsc::UnboundedSender<RecorderEvent>>>,
    started_with: Mutex<Vec<(u32, Option<String>)>>,
    stop_requests: AtomicUsize,
}

impl ScriptedRecorder {
    /// Backend reporting support for exactly `supported`.
    pub fn new<S: Into<String>>(supported: impl IntoIterator<Item = S>) -> Self {
        Self {
            supported: supported.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Emit a chunk; false when not recording.
    pub fn push_chunk(&self, chunk: impl Into<Vec<u8>>) -> bool {
        self.sender
            .lock()
            .ok()
            .and_then(|s| s.as_ref().map(|tx| tx.send(RecorderEvent::Data(chunk.into())).is_ok()))
            .unwrap_or(false)
    }

    /// `(fps, mime_type)` of every start.
    pub fn starts(&self) -> Vec<(u32, Option<String>)> {
        self.started_with.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn stop_requests(&self) -> usize {
        self.stop_requests.load(Ordering::SeqCst)
    }
}

impl RecorderBackend for ScriptedRecorder {
    fn is_type_supported(&self, mime_type: &str) -> bool {
        self.supported.iter().any(|s| s == mime_type)
    }

    fn start(
        &self,
        fps: u32,
        mime_type: Option<&str>,
    ) -> Result<mpsc::UnboundedReceiver<RecorderEvent>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut sender = self
            .sender
            .lock()
            .map_err(|_| PanelError::Recorder("recorder lock poisoned".to_string()))?;
        if sender.is_some() {
            return Err(PanelError::Recorder("encoder already running".to_string()));
        }
        *sender = Some(tx);
        if let Ok(mut starts) = self.started_with.lock() {
            starts.push((fps, mime_type.map(String::from)));
        }
        Ok(rx)
    }

    fn request_stop(&self) {
        self.stop_requests.fetch_add(1, Ordering::SeqCst);
        let sender = self.sender.lock().ok().and_then(|mut s| s.take());
        match sender {
            Some(tx) => {
                let _ = tx.send(RecorderEvent::Stopped);
            }
            None => warn!("Stop requested with no encoder running"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::surface::MemorySink;

    fn recorder(supported: &[&str]) -> (Arc<ScriptedRecorder>, Arc<MemorySink>, VideoRecorder) {
        let backend = Arc::new(ScriptedRecorder::new(supported.iter().copied()));
        let sink = Arc::new(MemorySink::new());
        let recorder = VideoRecorder::new(backend.clone(), sink.clone());
        (backend, sink, recorder)
    }

    #[test]
    fn test_codec_negotiation_order() {
        let (_, _, rec) = recorder(&["video/webm", "video/webm;codecs=vp8"]);
        assert_eq!(rec.negotiate().as_deref(), Some("video/webm;codecs=vp8"));
        let (_, _, rec) = recorder(&[]);
        assert_eq!(rec.negotiate(), None);
    }

    #[tokio::test]
    async fn test_chunks_assembled_into_one_file() {
        let (backend, sink, rec) = recorder(&["video/webm;codecs=vp9"]);
        assert_eq!(rec.start(60, None).unwrap(), StartOutcome::Started);
        assert_eq!(rec.start(60, None).unwrap(), StartOutcome::AlreadyActive);
        assert_eq!(backend.starts(), vec![(60, Some("video/webm;codecs=vp9".to_string()))]);

        backend.push_chunk(b"abc".to_vec());
        backend.push_chunk(Vec::new());
        backend.push_chunk(b"def".to_vec());
        assert!(rec.stop());
        assert!(!rec.stop());
        rec.wait_finished().await;

        assert!(!rec.is_recording());
        assert_eq!(backend.stop_requests(), 1);
        let download = sink.last().unwrap();
        assert_eq!(download.bytes, b"abcdef");
        assert!(download.file_name.starts_with("galaxy-engine-"));
        assert!(download.file_name.ends_with(".webm"));
        assert_eq!(rec.last_file(), Some(download.file_name));
    }

    #[tokio::test]
    async fn test_unsupported_codecs_use_encoder_default() {
        let (backend, _, rec) = recorder(&[]);
        rec.start(30, None).unwrap();
        assert_eq!(backend.starts(), vec![(30, None)]);
        rec.stop();
        rec.wait_finished().await;
    }

    #[tokio::test]
    async fn test_time_limit_stops_recording() {
        let (backend, sink, rec) = recorder(&["video/webm"]);
        rec.start(30, Some(0.05)).unwrap();
        backend.push_chunk(b"x".to_vec());
        tokio::time::timeout(Duration::from_secs(5), rec.wait_finished())
            .await
            .unwrap();
        assert_eq!(sink.count(), 1);
        assert_eq!(backend.stop_requests(), 1);
    }

    #[tokio::test]
    async fn test_guard_blocks_second_path() {
        let guard = CaptureGuard::new();
        guard.try_acquire(CaptureKind::Frames).unwrap();
        let rec = VideoRecorder::with_options(
            Arc::new(ScriptedRecorder::new(["video/webm"])),
            Arc::new(MemorySink::new()),
            guard,
            None,
            vec!["video/webm".to_string()],
        );
        assert_eq!(rec.start(30, None).unwrap(), StartOutcome::Busy(CaptureKind::Frames));
        assert!(!rec.is_recording());
    }
}
