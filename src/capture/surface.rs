//! In-process host implementations for tests and the CLI.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use image::{Rgba, RgbaImage};
use tracing::{debug, info, trace};

use super::{DownloadSink, Surface, TickCallback, TickHook};
use crate::color::ColorValue;
use crate::error::{PanelError, Result};

/// A surface whose pixels are set directly.
pub struct StaticSurface {
    image: Mutex<RgbaImage>,
    ancestry: Mutex<Vec<ColorValue>>,
    failures: AtomicUsize,
    reads: AtomicUsize,
}

impl StaticSurface {
    /// Surface filled with one color.
    pub fn new(width: u32, height: u32, fill: ColorValue) -> Self {
        Self::from_image(RgbaImage::from_pixel(width, height, fill.into()))
    }

    pub fn from_image(image: RgbaImage) -> Self {
        Self {
            image: Mutex::new(image),
            ancestry: Mutex::new(Vec::new()),
            failures: AtomicUsize::new(0),
            reads: AtomicUsize::new(0),
        }
    }

    /// Set the background chain, surface first.
    #[must_use]
    pub fn with_ancestry(self, chain: Vec<ColorValue>) -> Self {
        if let Ok(mut ancestry) = self.ancestry.lock() {
            *ancestry = chain;
        }
        self
    }

    pub fn set_image(&self, image: RgbaImage) {
        if let Ok(mut current) = self.image.lock() {
            *current = image;
        }
    }

    /// Resize to a blank, fully transparent surface.
    pub fn resize(&self, width: u32, height: u32) {
        self.set_image(RgbaImage::new(width, height));
    }

    /// Paint one pixel.
    pub fn put_pixel(&self, x: u32, y: u32, color: ColorValue) {
        if let Ok(mut image) = self.image.lock() {
            if x < image.width() && y < image.height() {
                image.put_pixel(x, y, Rgba::from(color));
            }
        }
    }

    /// Make the next `count` reads fail.
    pub fn fail_next(&self, count: usize) {
        self.failures.store(count, Ordering::SeqCst);
    }

    /// Successful and failed reads so far.
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl Surface for StaticSurface {
    fn snapshot(&self) -> Result<RgbaImage> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(PanelError::Surface("surface read failed".to_string()));
        }
        self.image
            .lock()
            .map(|image| image.clone())
            .map_err(|_| PanelError::Surface("surface lock poisoned".to_string()))
    }

    fn dimensions(&self) -> (u32, u32) {
        self.image.lock().map(|i| i.dimensions()).unwrap_or((0, 0))
    }

    fn background_chain(&self) -> Vec<ColorValue> {
        self.ancestry.lock().map(|a| a.clone()).unwrap_or_default()
    }
}

/// Tick hook fired by hand.
#[derive(Default)]
pub struct ManualTicker {
    callback: Mutex<Option<TickCallback>>,
}

impl ManualTicker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver one tick; false when nothing is installed.
    pub fn fire(&self) -> bool {
        let callback = self.callback.lock().ok().and_then(|c| c.clone());
        match callback {
            Some(callback) => {
                callback();
                true
            }
            None => false,
        }
    }

    pub fn is_installed(&self) -> bool {
        self.callback.lock().map(|c| c.is_some()).unwrap_or(false)
    }
}

impl TickHook for ManualTicker {
    fn install(&self, callback: TickCallback) {
        if let Ok(mut slot) = self.callback.lock() {
            *slot = Some(callback);
        }
    }

    fn clear(&self) {
        if let Ok(mut slot) = self.callback.lock() {
            *slot = None;
        }
    }
}

/// Writes downloads into a directory.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, file_name: &str) -> PathBuf {
        self.dir.join(file_name)
    }
}

impl DownloadSink for DirectorySink {
    fn deliver(&self, file_name: &str, bytes: Vec<u8>) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(file_name);
        fs::write(&path, &bytes)?;
        info!(path = %path.display(), bytes = bytes.len(), "Download written");
        Ok(())
    }
}

/// One delivered file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Keeps downloads in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    downloads: Mutex<Vec<Download>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn downloads(&self) -> Vec<Download> {
        self.downloads.lock().map(|d| d.clone()).unwrap_or_default()
    }

    pub fn count(&self) -> usize {
        self.downloads.lock().map(|d| d.len()).unwrap_or(0)
    }

    pub fn last(&self) -> Option<Download> {
        self.downloads.lock().ok().and_then(|d| d.last().cloned())
    }
}

impl DownloadSink for MemorySink {
    fn deliver(&self, file_name: &str, bytes: Vec<u8>) -> Result<()> {
        trace!(file_name, bytes = bytes.len(), "Download captured in memory");
        self.downloads
            .lock()
            .map_err(|_| PanelError::Other("download sink lock poisoned".to_string()))?
            .push(Download {
                file_name: file_name.to_string(),
                bytes,
            });
        debug!(file_name, "Download delivered");
        Ok(())
    }
}
