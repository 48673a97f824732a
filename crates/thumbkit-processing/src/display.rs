//! Display handles: revocable references a rendering surface resolves to
//! bytes without touching the original source.
//!
//! [`DisplayRegistry`] is the only state shared between normalizations. Every
//! [`DisplayHandle`] is uniquely owned; releasing it (explicitly or on drop)
//! removes its entry. Release is idempotent.

use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thumbkit_core::{Dimensions, MediaFormat};
use uuid::Uuid;

const DEFAULT_PREFIX: &str = "blob:thumbkit/";

/// Content behind a display handle
#[derive(Debug, Clone)]
pub struct DisplayContent {
    pub bytes: Bytes,
    pub format: MediaFormat,
    pub dimensions: Dimensions,
}

impl DisplayContent {
    pub fn content_type(&self) -> &'static str {
        self.format.mime_type()
    }
}

struct RegistryInner {
    prefix: String,
    entries: RwLock<HashMap<Uuid, DisplayContent>>,
}

impl RegistryInner {
    fn remove(&self, id: &Uuid) -> bool {
        self.entries.write().remove(id).is_some()
    }
}

/// Registry of live display handles
#[derive(Clone)]
pub struct DisplayRegistry {
    inner: Arc<RegistryInner>,
}

impl DisplayRegistry {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                prefix: prefix.into(),
                entries: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Issue a new handle for `content`.
    pub fn register(&self, content: DisplayContent) -> DisplayHandle {
        let id = Uuid::new_v4();
        let uri = format!("{}{}", self.inner.prefix, id);
        self.inner.entries.write().insert(id, content);
        tracing::debug!(uri = %uri, "Display handle registered");
        DisplayHandle {
            id,
            uri,
            registry: Arc::clone(&self.inner),
            released: AtomicBool::new(false),
        }
    }

    /// Look up the content behind a URI; `None` once it is released.
    pub fn resolve(&self, uri: &str) -> Option<DisplayContent> {
        let id = self.parse_uri(uri)?;
        self.inner.entries.read().get(&id).cloned()
    }

    /// Revoke by URI. Returns whether an entry was removed.
    pub fn revoke(&self, uri: &str) -> bool {
        match self.parse_uri(uri) {
            Some(id) => self.inner.remove(&id),
            None => false,
        }
    }

    pub fn active_handles(&self) -> usize {
        self.inner.entries.read().len()
    }

    fn parse_uri(&self, uri: &str) -> Option<Uuid> {
        uri.strip_prefix(self.inner.prefix.as_str())
            .and_then(|rest| Uuid::parse_str(rest).ok())
    }
}

impl Default for DisplayRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX)
    }
}

impl fmt::Debug for DisplayRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DisplayRegistry")
            .field("prefix", &self.inner.prefix)
            .field("active_handles", &self.active_handles())
            .finish()
    }
}

/// A uniquely owned, revocable display reference
pub struct DisplayHandle {
    id: Uuid,
    uri: String,
    registry: Arc<RegistryInner>,
    released: AtomicBool,
}

impl DisplayHandle {
    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Content behind this handle, while it is live
    pub fn content(&self) -> Option<DisplayContent> {
        if self.is_released() {
            return None;
        }
        self.registry.entries.read().get(&self.id).cloned()
    }

    /// Release the handle. Returns true only for the call that removed the
    /// entry; later calls are no-ops.
    pub fn release(&self) -> bool {
        if self.released.swap(true, Ordering::AcqRel) {
            return false;
        }
        let removed = self.registry.remove(&self.id);
        if removed {
            tracing::debug!(uri = %self.uri, "Display handle released");
        }
        removed
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }
}

impl Drop for DisplayHandle {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for DisplayHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DisplayHandle")
            .field("uri", &self.uri)
            .field("released", &self.is_released())
            .finish()
    }
}
