//! Tick-driven frame capture into a tar archive.
//!
//! # State Machine
//!
//! ```text
//! Idle --start--> Active --stop / frame ceiling--> Stopping --archive delivered--> Idle
//! ```
//!
//! At most one flatten runs at a time. A tick that arrives while one is in
//! flight is dropped, never queued. `stop` waits for the in-flight capture
//! through a one-shot channel before it writes the metadata record.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::{Notify, oneshot, watch};
use tracing::{debug, error, info, instrument, trace, warn};

use super::compositor::{EncodedFrame, ExportCompositor};
use super::{
    CaptureGuard, CaptureKind, DownloadSink, FinishToken, RecordingFinisher, StartOutcome,
    Surface, TickHook, archive_file_name, frame_name,
};
use crate::archive::{ArchiveEntry, ArchiveWriter};
use crate::error::{PanelError, Result};

/// Externally visible session phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CapturePhase {
    Idle,
    Active,
    Stopping,
}

/// Contents of `metadata.json`, plus what was delivered.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureMetadata {
    pub fps: u32,
    pub width: u32,
    pub height: u32,
    pub frame_count: usize,
    pub created_at: String,
    #[serde(skip)]
    pub file_name: String,
    #[serde(skip)]
    pub dropped_frames: u64,
    #[serde(skip)]
    pub archive_bytes: usize,
}

struct Session {
    id: u64,
    stopping: bool,
    fps: u32,
    max_frames: Option<usize>,
    frames: Vec<ArchiveEntry>,
    frame_index: u64,
    in_flight: bool,
    pending_stop: Option<oneshot::Sender<()>>,
    last_size: Option<(u32, u32)>,
    dropped_frames: u64,
    finish: Option<FinishToken>,
}

struct Inner {
    surface: Arc<dyn Surface>,
    hook: Arc<dyn TickHook>,
    sink: Arc<dyn DownloadSink>,
    guard: CaptureGuard,
    finisher: Option<RecordingFinisher>,
    compositor: Mutex<ExportCompositor>,
    session: Mutex<Option<Session>>,
    next_id: AtomicU64,
    settled: Notify,
    phase: watch::Sender<CapturePhase>,
    last_report: Mutex<Option<CaptureMetadata>>,
}

/// Handle to the frame capture path. Clones share one scheduler.
#[derive(Clone)]
pub struct CaptureScheduler {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for CaptureScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureScheduler")
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}

impl CaptureScheduler {
    pub fn new(
        surface: Arc<dyn Surface>,
        hook: Arc<dyn TickHook>,
        sink: Arc<dyn DownloadSink>,
        compositor: ExportCompositor,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                surface,
                hook,
                sink,
                guard: CaptureGuard::new(),
                finisher: None,
                compositor: Mutex::new(compositor),
                session: Mutex::new(None),
                next_id: AtomicU64::new(1),
                settled: Notify::new(),
                phase: watch::Sender::new(CapturePhase::Idle),
                last_report: Mutex::new(None),
            }),
        }
    }

    /// Share a guard with the video recorder. Call before the first start.
    #[must_use]
    pub fn with_guard(self, guard: CaptureGuard) -> Self {
        self.rebuild(|inner| inner.guard = guard)
    }

    #[must_use]
    pub fn with_finisher(self, finisher: RecordingFinisher) -> Self {
        self.rebuild(|inner| inner.finisher = Some(finisher))
    }

    fn rebuild(self, apply: impl FnOnce(&mut Inner)) -> Self {
        match Arc::try_unwrap(self.inner) {
            Ok(mut inner) => {
                apply(&mut inner);
                Self {
                    inner: Arc::new(inner),
                }
            }
            Err(inner) => {
                warn!("Scheduler already shared, builder option ignored");
                Self { inner }
            }
        }
    }

    pub fn phase(&self) -> CapturePhase {
        *self.inner.phase.borrow()
    }

    /// Watch phase transitions.
    pub fn subscribe(&self) -> watch::Receiver<CapturePhase> {
        self.inner.phase.subscribe()
    }

    /// Frames captured so far in the current session.
    pub fn frame_count(&self) -> usize {
        self.inner
            .lock_session()
            .as_ref()
            .map_or(0, |s| s.frames.len())
    }

    pub fn is_in_flight(&self) -> bool {
        self.inner
            .lock_session()
            .as_ref()
            .is_some_and(|s| s.in_flight)
    }

    /// Report of the most recently delivered archive.
    pub fn last_report(&self) -> Option<CaptureMetadata> {
        self.inner.last_report.lock().ok().and_then(|r| r.clone())
    }

    /// Begin a session.
    ///
    /// With a limit the session stops itself after `ceil(limit * fps)`
    /// frames. Must be called inside a Tokio runtime.
    #[instrument(skip(self))]
    pub fn start(&self, limit_seconds: Option<f64>, fps: u32) -> Result<StartOutcome> {
        if Handle::try_current().is_err() {
            return Err(PanelError::NoRuntime);
        }
        let fps = fps.max(1);
        {
            let mut slot = self.inner.lock_session();
            if slot.is_some() {
                debug!("Capture already running, start ignored");
                return Ok(StartOutcome::AlreadyActive);
            }
            if let Err(holder) = self.inner.guard.try_acquire(CaptureKind::Frames) {
                info!(?holder, "Surface busy, capture not started");
                return Ok(StartOutcome::Busy(holder));
            }
            let max_frames = limit_seconds
                .filter(|l| l.is_finite() && *l > 0.0)
                .map(|l| (l * f64::from(fps)).ceil() as usize);
            let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
            *slot = Some(Session {
                id,
                stopping: false,
                fps,
                max_frames,
                frames: Vec::new(),
                frame_index: 0,
                in_flight: false,
                pending_stop: None,
                last_size: None,
                dropped_frames: 0,
                finish: self.inner.finisher.as_ref().map(RecordingFinisher::begin),
            });
            info!(session = id, fps, ?max_frames, "Capture started");
        }

        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        self.inner.hook.install(Arc::new(move || {
            if let Some(inner) = weak.upgrade() {
                CaptureScheduler { inner }.tick();
            }
        }));
        self.inner.phase.send_replace(CapturePhase::Active);
        Ok(StartOutcome::Started)
    }

    /// Capture one frame if the session is active and nothing is in flight.
    ///
    /// Returns whether a capture was issued. Never blocks.
    pub fn tick(&self) -> bool {
        let (id, handle) = {
            let mut slot = self.inner.lock_session();
            let Some(session) = slot.as_mut() else {
                return false;
            };
            if session.stopping {
                trace!("Tick after stop, ignored");
                return false;
            }
            if session.in_flight {
                trace!(session = session.id, "Capture in flight, tick dropped");
                return false;
            }
            let Ok(handle) = Handle::try_current() else {
                warn!("Tick outside a runtime, dropped");
                return false;
            };
            session.in_flight = true;
            (session.id, handle)
        };

        let inner = Arc::clone(&self.inner);
        handle.spawn(async move {
            let worker = Arc::clone(&inner);
            let result = tokio::task::spawn_blocking(move || worker.capture_frame())
                .await
                .map_err(|e| PanelError::Encode(format!("capture task failed: {e}")))
                .and_then(|r| r);
            let reached_ceiling = inner.complete(id, result);
            if let Some(pending) = reached_ceiling {
                let scheduler = CaptureScheduler { inner };
                if let Err(e) = scheduler.finish_stop(pending).await {
                    error!(error = %e, "Automatic stop failed");
                }
            }
        });
        true
    }

    /// Wait until no capture is in flight.
    pub async fn settle(&self) {
        loop {
            let notified = self.inner.settled.notified();
            if !self.is_in_flight() {
                return;
            }
            notified.await;
        }
    }

    /// Wait until the scheduler is back to idle.
    pub async fn wait_idle(&self) {
        let mut rx = self.subscribe();
        let _ = rx.wait_for(|phase| *phase == CapturePhase::Idle).await;
    }

    /// Stop the session and deliver the archive.
    ///
    /// Idempotent: returns `Ok(None)` when no session is active or another
    /// stop already owns teardown.
    #[instrument(skip(self))]
    pub async fn stop(&self) -> Result<Option<CaptureMetadata>> {
        let pending = {
            let mut slot = self.inner.lock_session();
            match slot.as_mut() {
                Some(session) if !session.stopping => Inner::begin_stop(session),
                _ => {
                    debug!("Stop with no active capture, ignored");
                    return Ok(None);
                }
            }
        };
        self.finish_stop(pending).await.map(Some)
    }

    async fn finish_stop(&self, pending: Option<oneshot::Receiver<()>>) -> Result<CaptureMetadata> {
        self.inner.phase.send_replace(CapturePhase::Stopping);
        self.inner.hook.clear();
        if let Some(rx) = pending {
            debug!("Waiting for in-flight capture");
            let _ = rx.await;
        }

        let (frames, mut metadata, token) = {
            let mut slot = self.inner.lock_session();
            let Some(session) = slot.as_mut() else {
                return Err(PanelError::Other("capture session vanished during stop".to_string()));
            };
            let (width, height) = session
                .last_size
                .unwrap_or_else(|| self.inner.surface.dimensions());
            let now = Utc::now();
            let metadata = CaptureMetadata {
                fps: session.fps,
                width,
                height,
                frame_count: session.frames.len(),
                created_at: now.to_rfc3339_opts(SecondsFormat::Millis, true),
                file_name: archive_file_name(now),
                dropped_frames: session.dropped_frames,
                archive_bytes: 0,
            };
            (std::mem::take(&mut session.frames), metadata, session.finish.take())
        };

        let inner = Arc::clone(&self.inner);
        let delivery = {
            let metadata = metadata.clone();
            tokio::task::spawn_blocking(move || inner.deliver(frames, &metadata))
                .await
                .map_err(|e| PanelError::Other(format!("archive task failed: {e}")))
                .and_then(|r| r)
        };

        *self.inner.lock_session() = None;
        self.inner.guard.release(CaptureKind::Frames);
        if let (Some(finisher), Some(token)) = (&self.inner.finisher, token) {
            finisher.finish(&token);
        }

        let result = delivery.map(|bytes| {
            metadata.archive_bytes = bytes;
            metadata
        });
        if let Ok(metadata) = &result {
            info!(
                file = %metadata.file_name,
                frames = metadata.frame_count,
                dropped = metadata.dropped_frames,
                "Capture archive delivered"
            );
            if let Ok(mut last) = self.inner.last_report.lock() {
                *last = Some(metadata.clone());
            }
        }
        // Observers of Idle can rely on the report being in place.
        self.inner.phase.send_replace(CapturePhase::Idle);
        result
    }
}

impl Inner {
    fn lock_session(&self) -> MutexGuard<'_, Option<Session>> {
        self.session
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Flip to stopping; hands back a receiver if a capture is in flight.
    fn begin_stop(session: &mut Session) -> Option<oneshot::Receiver<()>> {
        session.stopping = true;
        info!(session = session.id, frames = session.frames.len(), "Capture stopping");
        if session.in_flight {
            let (tx, rx) = oneshot::channel();
            session.pending_stop = Some(tx);
            Some(rx)
        } else {
            None
        }
    }

    fn capture_frame(&self) -> Result<EncodedFrame> {
        let mut compositor = self
            .compositor
            .lock()
            .map_err(|_| PanelError::Encode("compositor lock poisoned".to_string()))?;
        compositor.flatten(self.surface.as_ref())
    }

    /// Completion handler for one capture.
    ///
    /// Returns the pending-stop receiver when this frame hit the ceiling
    /// and the caller must finish the stop.
    fn complete(
        &self,
        id: u64,
        result: Result<EncodedFrame>,
    ) -> Option<Option<oneshot::Receiver<()>>> {
        let outcome = self.record_frame(id, result);
        self.settled.notify_waiters();
        outcome
    }

    fn record_frame(
        &self,
        id: u64,
        result: Result<EncodedFrame>,
    ) -> Option<Option<oneshot::Receiver<()>>> {
        let mut slot = self.lock_session();
        let session = slot.as_mut().filter(|s| s.id == id)?;
        session.in_flight = false;
        if let Some(tx) = session.pending_stop.take() {
            let _ = tx.send(());
        }
        if session.stopping {
            trace!(session = id, "Frame finished after stop, discarded");
            return None;
        }

        match result {
            Ok(frame) => {
                let name = frame_name(session.frame_index);
                session.frame_index += 1;
                session.last_size = Some((frame.width, frame.height));
                trace!(session = id, %name, bytes = frame.png.len(), "Frame captured");
                session.frames.push(ArchiveEntry::bytes(name, frame.png));
            }
            Err(e) => {
                session.dropped_frames += 1;
                warn!(session = id, error = %e, "Frame dropped");
            }
        }

        let reached = session
            .max_frames
            .is_some_and(|max| session.frames.len() >= max);
        if !reached {
            return None;
        }
        info!(session = id, frames = session.frames.len(), "Frame ceiling reached");
        Some(Self::begin_stop(session))
    }

    /// Encode the archive and hand it to the sink. Returns the archive size.
    fn deliver(&self, frames: Vec<ArchiveEntry>, metadata: &CaptureMetadata) -> Result<usize> {
        let json = serde_json::to_vec_pretty(metadata)
            .map_err(|e| PanelError::Other(format!("Failed to serialize metadata: {e}")))?;
        let mut entries = Vec::with_capacity(frames.len() + 1);
        entries.push(ArchiveEntry::bytes("metadata.json", json));
        entries.extend(frames);

        let bytes = ArchiveWriter::new().encode(entries)?;
        let len = bytes.len();
        self.sink.deliver(&metadata.file_name, bytes)?;
        Ok(len)
    }
}
