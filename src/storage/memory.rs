//! In-memory store with injectable storage failures.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::trace;

use super::{KeyValueStore, WriteOp};
use crate::error::{PanelError, Result};

/// Volatile store, also used to simulate quota and disabled storage.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
    quota_bytes: Option<usize>,
    disabled: AtomicBool,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that rejects writes pushing total key+value bytes past `bytes`.
    #[must_use]
    pub fn with_quota(bytes: usize) -> Self {
        Self {
            quota_bytes: Some(bytes),
            ..Self::default()
        }
    }

    /// Reject every write, as storage does in some private browsing modes.
    pub fn set_disabled(&self, disabled: bool) {
        self.disabled.store(disabled, Ordering::SeqCst);
    }

    /// Number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|_| PanelError::Storage("memory store lock poisoned".to_string()))
    }
}

fn used_bytes(entries: &BTreeMap<String, String>) -> usize {
    entries.iter().map(|(k, v)| k.len() + v.len()).sum()
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn apply_batch(&self, ops: &[WriteOp]) -> Result<()> {
        let first_key = ops.first().map(|op| op.key().to_string()).unwrap_or_default();
        if self.disabled.load(Ordering::SeqCst) {
            return Err(PanelError::StorageWrite {
                key: first_key,
                reason: "storage is disabled".to_string(),
            });
        }

        let mut entries = self.lock()?;
        let mut staged = entries.clone();
        for op in ops {
            match op {
                WriteOp::Put { key, value } => {
                    staged.insert(key.clone(), value.clone());
                }
                WriteOp::Delete { key } => {
                    staged.remove(key);
                }
            }
        }
        if let Some(quota) = self.quota_bytes {
            let used = used_bytes(&staged);
            if used > quota {
                return Err(PanelError::StorageWrite {
                    key: first_key,
                    reason: format!("quota exceeded ({used} > {quota} bytes)"),
                });
            }
        }
        trace!(ops = ops.len(), "Memory store batch applied");
        *entries = staged;
        Ok(())
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .lock()?
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}
