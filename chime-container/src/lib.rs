//! Containers shared by the chime audio crates.
#![warn(missing_docs)]

use std::borrow::Borrow;
use std::hash::Hash;
use std::num::{NonZeroU32, NonZeroUsize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use hashbrown::HashMap;

/// Easily creates a typed, generation-checked key for a fixed slot table.
#[macro_export]
macro_rules! create_slot_key {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Copy, Clone, PartialEq, PartialOrd, Ord, Eq, Hash)]
        pub struct $name {
            slot: u32,
            generation: core::num::NonZeroU32,
        }

        impl $crate::SlotKey for $name {
            fn new(slot: u32, generation: core::num::NonZeroU32) -> Self {
                Self { slot, generation }
            }

            fn slot(&self) -> u32 {
                self.slot
            }

            fn generation(&self) -> core::num::NonZeroU32 {
                self.generation
            }
        }
    };
    ($name:ident) => {
        create_slot_key!($name, "no documentation");
    };
}

/// A key addressing a slot in a fixed table. The generation guards against
/// stale keys once a slot has been handed out again.
pub trait SlotKey: Copy {
    /// Creates a new key.
    fn new(slot: u32, generation: NonZeroU32) -> Self;

    /// Returns the slot index of the key.
    fn slot(&self) -> u32;

    /// Returns the generation of the key.
    fn generation(&self) -> NonZeroU32;
}

/// Something that can be cached.
pub trait Cacheable {
    /// Must return the size of the object. The size can be the actual byte
    /// size of a struct or the size that is allocated for an external
    /// resource.
    fn size(&self) -> usize;
}

impl Cacheable for Vec<u8> {
    fn size(&self) -> usize {
        self.len()
    }
}

impl<T: Cacheable> Cacheable for Arc<T> {
    fn size(&self) -> usize {
        self.as_ref().size()
    }
}

/// Thrown when a value is too big for the cache to store.
#[derive(Debug)]
pub struct ValueTooBig;

impl std::fmt::Display for ValueTooBig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Value is too big")
    }
}

impl std::error::Error for ValueTooBig {}

/// Statistic about a cache.
#[derive(Debug)]
pub struct Statistics {
    count: AtomicU32,
    max_count: NonZeroU32,
    size: AtomicUsize,
    max_size: NonZeroUsize,
}

/// A snapshot view of cache statistics.
#[derive(Debug)]
pub struct Snapshot {
    /// The current count of values inside the cache.
    pub count: u32,
    /// The maximal count of values inside the cache.
    pub max_count: u32,
    /// The current size of values inside the cache.
    pub size: usize,
    /// The maximal size of values inside the cache.
    pub max_size: usize,
}

impl Statistics {
    /// Returns a snapshot of the current values of the cache statistics.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            count: self.count.load(Ordering::Acquire),
            max_count: self.max_count.get(),
            size: self.size.load(Ordering::Acquire),
            max_size: self.max_size.get(),
        }
    }
}

struct Entry<V> {
    value: V,
    size: usize,
    last_used: u64,
}

/// A keyed cache that holds a certain amount of values, limited by count and
/// total size. The least recently used entry is dropped first when either
/// limit is reached. Designed to be the owner of the cached values.
pub struct BufferCache<K, V> {
    statistics: Arc<Statistics>,
    entries: HashMap<K, Entry<V>>,
    tick: u64,
}

impl<K: Clone + Eq + Hash, V: Cacheable> BufferCache<K, V> {
    /// Creates a new cache that holds at most `max_count` values that are at
    /// most `max_size` bytes in size.
    pub fn new(max_count: NonZeroU32, max_size: NonZeroUsize) -> Self {
        let statistics = Arc::new(Statistics {
            count: AtomicU32::new(0),
            max_count,
            size: AtomicUsize::new(0),
            max_size,
        });

        Self {
            statistics,
            entries: HashMap::new(),
            tick: 0,
        }
    }

    /// Returns the statistics of the cache.
    #[inline(always)]
    pub fn statistics(&self) -> Arc<Statistics> {
        self.statistics.clone()
    }

    /// Returns the number of values inside the cache.
    pub fn count(&self) -> u32 {
        self.entries.len() as u32
    }

    /// Returns the total size of all values inside the cache.
    pub fn size(&self) -> usize {
        self.entries.values().map(|entry| entry.size).sum()
    }

    /// Returns the maximal count of values inside the cache.
    #[inline(always)]
    pub fn max_count(&self) -> u32 {
        self.statistics.max_count.get()
    }

    /// Returns the maximal size of all values inside the cache.
    #[inline(always)]
    pub fn max_size(&self) -> usize {
        self.statistics.max_size.get()
    }

    /// Inserts a value of the given size, dropping the least recently used
    /// values until the new value fits.
    ///
    /// If the value is too big to ever fit inside the cache, this function
    /// will return a [`ValueTooBig`] error.
    pub fn insert(&mut self, key: K, value: V) -> Result<(), ValueTooBig> {
        let size = value.size();

        if size > self.max_size() {
            return Err(ValueTooBig);
        }

        let _ = self.remove(&key);

        // Drop as many values as we need to fit the new value.
        while self.entries.len() as u32 > self.max_count().saturating_sub(1)
            || self.size() > self.max_size().saturating_sub(size)
        {
            let Some(oldest) = self
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(key, _)| key.clone())
            else {
                return Err(ValueTooBig);
            };
            let _ = self.entries.remove(&oldest);
        }

        self.tick += 1;
        self.entries.insert(key, Entry {
            value,
            size,
            last_used: self.tick,
        });
        self.update_statistics();

        Ok(())
    }

    /// Returns a reference to the cached value with the given key.
    #[must_use]
    pub fn get<Q>(&mut self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.tick += 1;
        let tick = self.tick;

        self.entries.get_mut(key).map(|entry| {
            entry.last_used = tick;
            &entry.value
        })
    }

    /// Removes the value with the given key from the cache.
    #[must_use]
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let value = self.entries.remove(key).map(|entry| entry.value);
        self.update_statistics();
        value
    }

    /// Removes every value from the cache.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.update_statistics();
    }

    fn update_statistics(&self) {
        self.statistics.count.store(self.count(), Ordering::Release);
        self.statistics.size.store(self.size(), Ordering::Release);
    }
}
