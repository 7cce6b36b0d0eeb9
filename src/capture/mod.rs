//! Frame capture and recording.
//!
//! Two mutually exclusive paths turn the rendering surface into a download:
//!
//! - [`CaptureScheduler`] pulls one flattened PNG per tick and packages the
//!   frames plus `metadata.json` into a tar archive on stop.
//! - [`VideoRecorder`] drives a streaming [`RecorderBackend`] and writes a
//!   single container file on stop.
//!
//! Host facilities are injected: the surface to read, the hook that delivers
//! ticks, the sink that receives downloads and the overlay that is hidden
//! while capturing. Both paths share a [`CaptureGuard`] and run the
//! [`RecordingFinisher`] exactly once per session.

mod compositor;
mod recorder;
mod scheduler;
pub mod surface;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, SecondsFormat, Utc};
use image::RgbaImage;
use serde::Serialize;
use tracing::{debug, info, warn};

pub use compositor::{EncodedFrame, ExportCompositor};
pub use recorder::{RecorderBackend, RecorderEvent, ScriptedRecorder, VideoRecorder};
pub use scheduler::{CaptureMetadata, CapturePhase, CaptureScheduler};

use crate::color::ColorValue;
use crate::config::RecordingConfig;
use crate::engine::{EngineAction, EngineBridge, Setting, SettingValue};
use crate::error::Result;

/// A readable rendering surface.
pub trait Surface: Send + Sync {
    /// Current pixel contents, possibly with transparent regions.
    fn snapshot(&self) -> Result<RgbaImage>;

    /// Current size in pixels.
    fn dimensions(&self) -> (u32, u32);

    /// Background colors from the surface outward to the document root.
    fn background_chain(&self) -> Vec<ColorValue>;
}

/// Callback invoked once per presented frame.
pub type TickCallback = Arc<dyn Fn() + Send + Sync>;

/// The render loop's per-frame hook.
pub trait TickHook: Send + Sync {
    fn install(&self, callback: TickCallback);
    fn clear(&self);
}

/// Receives finished files.
pub trait DownloadSink: Send + Sync {
    fn deliver(&self, file_name: &str, bytes: Vec<u8>) -> Result<()>;
}

/// Cursor and overlay visibility while recording.
pub trait OverlayControl: Send + Sync {
    fn suppress(&self);
    fn restore(&self);
}

/// Overlay control for hosts without one.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOverlay;

impl OverlayControl for NoOverlay {
    fn suppress(&self) {}
    fn restore(&self) {}
}

/// Which capture path holds the surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureKind {
    Frames,
    Video,
}

/// Result of asking a capture path to start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StartOutcome {
    Started,
    /// This path already has a session running.
    AlreadyActive,
    /// The other path holds the surface.
    Busy(CaptureKind),
}

impl StartOutcome {
    pub const fn is_started(self) -> bool {
        matches!(self, Self::Started)
    }
}

/// Token making the two capture paths mutually exclusive.
#[derive(Debug, Clone, Default)]
pub struct CaptureGuard {
    holder: Arc<Mutex<Option<CaptureKind>>>,
}

impl CaptureGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the surface for `kind`; returns the current holder on conflict.
    pub fn try_acquire(&self, kind: CaptureKind) -> std::result::Result<(), CaptureKind> {
        let Ok(mut holder) = self.holder.lock() else {
            return Err(kind);
        };
        match *holder {
            Some(current) => Err(current),
            None => {
                *holder = Some(kind);
                Ok(())
            }
        }
    }

    /// Release the claim if `kind` holds it.
    pub fn release(&self, kind: CaptureKind) {
        if let Ok(mut holder) = self.holder.lock() {
            if *holder == Some(kind) {
                *holder = None;
            }
        }
    }

    pub fn holder(&self) -> Option<CaptureKind> {
        self.holder.lock().ok().and_then(|h| *h)
    }
}

/// One-shot flag tying a finish step to a single session.
#[derive(Debug, Clone, Default)]
pub struct FinishToken(Arc<AtomicBool>);

impl FinishToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// True the first time only.
    fn claim(&self) -> bool {
        !self.0.swap(true, Ordering::SeqCst)
    }

    pub fn is_finished(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Post-capture step shared by both paths.
///
/// Restores the overlay, then pauses the simulation and clears the scene
/// when the engine's after-recording toggles say so. When the engine cannot
/// be read the configured defaults decide.
#[derive(Clone)]
pub struct RecordingFinisher {
    bridge: EngineBridge,
    overlay: Arc<dyn OverlayControl>,
    fallback: RecordingConfig,
}

impl RecordingFinisher {
    pub fn new(
        bridge: EngineBridge,
        overlay: Arc<dyn OverlayControl>,
        fallback: RecordingConfig,
    ) -> Self {
        Self {
            bridge,
            overlay,
            fallback,
        }
    }

    /// Hide the overlay and hand out the session's token.
    pub fn begin(&self) -> FinishToken {
        self.overlay.suppress();
        FinishToken::new()
    }

    fn toggle(&self, setting: Setting, fallback: bool) -> bool {
        match self.bridge.get(setting) {
            Ok(SettingValue::Bool(value)) => value,
            Ok(_) | Err(_) => fallback,
        }
    }

    /// Run the finish step; later calls with the same token do nothing.
    pub fn finish(&self, token: &FinishToken) -> bool {
        if !token.claim() {
            debug!("Finish step already ran for this session");
            return false;
        }
        self.overlay.restore();

        if self.toggle(Setting::PauseAfterRecording, self.fallback.pause_after) {
            if let Err(e) = self.bridge.set(Setting::TimePlaying, SettingValue::Bool(false)) {
                warn!(error = %e, "Could not pause after recording");
            }
        }
        if self.toggle(Setting::CleanSceneAfterRecording, self.fallback.clean_scene_after) {
            if let Err(e) = self.bridge.action(EngineAction::ClearScene) {
                warn!(error = %e, "Could not clear scene after recording");
            }
        }
        info!("Capture session finished");
        true
    }
}

/// ISO-8601 timestamp with `:` and `.` replaced so it is safe in file names.
pub fn file_stamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace([':', '.'], "-")
}

/// `galaxy-engine-frames-<stamp>.tar`
pub fn archive_file_name(at: DateTime<Utc>) -> String {
    format!("galaxy-engine-frames-{}.tar", file_stamp(at))
}

/// `galaxy-engine-<stamp>.webm`
pub fn video_file_name(at: DateTime<Utc>) -> String {
    format!("galaxy-engine-{}.webm", file_stamp(at))
}

/// `frame_000042.png`
pub fn frame_name(index: u64) -> String {
    format!("frame_{index:06}.png")
}
