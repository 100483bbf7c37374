use std::num::{NonZeroU32, NonZeroUsize};
use std::sync::{Arc, Mutex};

use chime_container::BufferCache;
use tracing::warn;

use crate::error::LoadError;
use crate::loader::{SoundBuffer, SoundLoader};

const MAX_CACHE_COUNT: u32 = 400;
const MAX_CACHE_SIZE: usize = 64 << 20; // 64 MiB

/// The by-source-path cache of decoded buffers.
///
/// The cache owns its own lock so that a blocking load never stalls the
/// channel table: the loader is always invoked with no lock held, and the
/// result is inserted afterwards. Buffers are reference counted, so evicting
/// an entry that a voice is still playing is safe.
pub(crate) struct PreloadCache<L> {
    loader: Arc<L>,
    state: Mutex<CacheState>,
}

struct CacheState {
    enabled: bool,
    entries: BufferCache<String, SoundBuffer>,
}

impl<L: SoundLoader> PreloadCache<L> {
    pub(crate) fn new(loader: Arc<L>, enabled: bool) -> Self {
        let entries = BufferCache::new(
            NonZeroU32::new(MAX_CACHE_COUNT).unwrap(),
            NonZeroUsize::new(MAX_CACHE_SIZE).unwrap(),
        );

        Self {
            loader,
            state: Mutex::new(CacheState { enabled, entries }),
        }
    }

    /// Resolves a source path to a buffer. While the cache is disabled every
    /// call loads freshly and nothing is stored; existing entries are left
    /// untouched.
    pub(crate) fn resolve(&self, path: &str) -> Result<SoundBuffer, LoadError> {
        self.resolve_inner(path, false)
    }

    /// Resolves a source path for the background track. Background loads
    /// still serve from existing entries while the cache is disabled, since
    /// background content must persist across pause/resume.
    pub(crate) fn resolve_persistent(&self, path: &str) -> Result<SoundBuffer, LoadError> {
        self.resolve_inner(path, true)
    }

    fn resolve_inner(&self, path: &str, always_lookup: bool) -> Result<SoundBuffer, LoadError> {
        {
            let mut state = self.state.lock().unwrap();
            if (state.enabled || always_lookup)
                && let Some(buffer) = state.entries.get(path)
            {
                return Ok(buffer.clone());
            }
        }

        // The load may block for a while; it must run with no lock held.
        let buffer = self.loader.load(path)?;

        let mut state = self.state.lock().unwrap();
        if state.enabled {
            // Another caller may have inserted the same path in the
            // meantime; keep the existing entry as the canonical one.
            if let Some(existing) = state.entries.get(path) {
                return Ok(existing.clone());
            }

            if state.entries.insert(path.to_string(), buffer.clone()).is_err() {
                warn!("audio buffer is too big for the preload cache: '{path}'");
            }
        }

        Ok(buffer)
    }

    /// Removes the entry for the given path. Not an error if absent.
    pub(crate) fn unload(&self, path: &str) {
        let _ = self.state.lock().unwrap().entries.remove(path);
    }

    /// Removes every entry.
    pub(crate) fn unload_all(&self) {
        self.state.lock().unwrap().entries.clear();
    }

    /// Toggles caching of future loads. Disabling never purges existing
    /// entries; they only disappear through explicit unloads.
    pub(crate) fn set_enabled(&self, enabled: bool) {
        self.state.lock().unwrap().enabled = enabled;
    }

    pub(crate) fn is_enabled(&self) -> bool {
        self.state.lock().unwrap().enabled
    }

    /// The number of live entries, for diagnostics.
    pub(crate) fn count(&self) -> u32 {
        self.state.lock().unwrap().entries.count()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::frame::Frame;

    struct CountingLoader {
        loads: AtomicU32,
    }

    impl SoundLoader for CountingLoader {
        fn load(&self, path: &str) -> Result<SoundBuffer, LoadError> {
            if path == "missing.wav" {
                return Err(LoadError::NotFound(path.to_string()));
            }

            self.loads.fetch_add(1, Ordering::Relaxed);
            Ok(SoundBuffer::new(48000, vec![Frame::ZERO; 16]))
        }
    }

    fn cache(enabled: bool) -> PreloadCache<CountingLoader> {
        PreloadCache::new(Arc::new(CountingLoader { loads: AtomicU32::new(0) }), enabled)
    }

    #[test]
    fn test_resolve_caches_once() {
        let cache = cache(true);

        cache.resolve("a.wav").unwrap();
        cache.resolve("a.wav").unwrap();

        assert_eq!(cache.count(), 1);
        assert_eq!(cache.loader.loads.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_resolve_missing() {
        let cache = cache(true);

        assert!(matches!(cache.resolve("missing.wav"), Err(LoadError::NotFound(_))));
        assert_eq!(cache.count(), 0);
    }

    #[test]
    fn test_disabled_cache_loads_freshly() {
        let cache = cache(true);
        cache.resolve("a.wav").unwrap();
        cache.set_enabled(false);

        cache.resolve("a.wav").unwrap();

        // The entry from before disabling stays, but the new load neither
        // used nor extended it.
        assert_eq!(cache.count(), 1);
        assert_eq!(cache.loader.loads.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_persistent_resolve_uses_cache_while_disabled() {
        let cache = cache(true);
        cache.resolve("a.wav").unwrap();
        cache.set_enabled(false);

        cache.resolve_persistent("a.wav").unwrap();

        assert_eq!(cache.loader.loads.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_unload() {
        let cache = cache(true);
        cache.resolve("a.wav").unwrap();
        cache.resolve("b.wav").unwrap();

        cache.unload("a.wav");
        assert_eq!(cache.count(), 1);

        // Unloading an absent path is a no-op.
        cache.unload("a.wav");
        cache.unload_all();
        assert_eq!(cache.count(), 0);
    }
}
