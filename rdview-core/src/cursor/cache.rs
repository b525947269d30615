//! Converted-cursor store.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::cursor::convert::CursorImage;

/// Opaque, monotonically increasing identifier for a cached cursor.
pub type PointerHandle = u64;

// ── PointerCache ─────────────────────────────────────────────────

/// Owns converted cursor images keyed by handle.
///
/// One mutex covers the whole map: operations on different handles
/// may run concurrently from the caller's perspective, operations on
/// the same handle are serialized. Cursor changes are rare, so
/// simplicity wins over throughput here.
pub struct PointerCache {
    inner: Mutex<CacheInner>,
}

struct CacheInner {
    records: HashMap<PointerHandle, Arc<CursorImage>>,
    next_handle: PointerHandle,
}

impl PointerCache {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                records: HashMap::new(),
                next_handle: 0,
            }),
        }
    }

    /// Store a converted cursor under a freshly allocated handle.
    /// Handles are never reused within a session.
    pub fn insert(&self, image: CursorImage) -> PointerHandle {
        let mut inner = self.inner.lock().unwrap();
        let handle = inner.next_handle;
        inner.next_handle += 1;
        inner.records.insert(handle, Arc::new(image));
        handle
    }

    /// Evict a cursor. Unknown handles are a no-op — the engine pairs
    /// new/free per cursor, but a misbehaving peer must not crash us.
    pub fn remove(&self, handle: PointerHandle) -> Option<Arc<CursorImage>> {
        self.inner.lock().unwrap().records.remove(&handle)
    }

    /// Look up a cursor by handle.
    pub fn get(&self, handle: PointerHandle) -> Option<Arc<CursorImage>> {
        self.inner.lock().unwrap().records.get(&handle).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for PointerCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image() -> CursorImage {
        CursorImage {
            width: 1,
            height: 1,
            rgba: vec![0, 0, 0, 0xFF],
            mask: vec![0x80],
            hotspot_x: 0,
            hotspot_y: 0,
        }
    }

    #[test]
    fn handles_increase_monotonically() {
        let cache = PointerCache::new();
        let a = cache.insert(image());
        let b = cache.insert(image());
        cache.remove(a);
        let c = cache.insert(image());
        assert!(b > a);
        assert!(c > b, "handles are never reused");
    }

    #[test]
    fn remove_unknown_handle_is_noop() {
        let cache = PointerCache::new();
        assert!(cache.remove(42).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn get_after_remove_is_gone() {
        let cache = PointerCache::new();
        let handle = cache.insert(image());
        assert!(cache.get(handle).is_some());
        cache.remove(handle);
        assert!(cache.get(handle).is_none());
    }
}
