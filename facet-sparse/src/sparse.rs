use alloc::string::String;
use alloc::sync::Arc;
use core::num::NonZeroUsize;
use core::sync::atomic::{AtomicUsize, Ordering};

use facet_core::{ConstTypeId, Facet, Shape};
use facet_reflect::Peek;
use facet_value::{Value, peek_to_value};

use crate::cache::{Lookup, OnceCache};
use crate::{
    Builder, FieldKey, FormatError, Formatter, KeyOrder, check_duplicates, debug, trace,
};

/// Result of [`SparseFormatter::format`].
#[derive(Debug)]
pub enum Sparse<'a, T: ?Sized> {
    /// No fields were requested: the value as given.
    Unfiltered(&'a T),
    /// The projected value.
    Filtered(Value),
}

impl<'a, 'facet, T> Sparse<'a, T>
where
    T: Facet<'facet> + ?Sized,
{
    /// Converts either variant to a [`Value`]. An unfiltered value is
    /// converted whole.
    pub fn into_value(self) -> Result<Value, FormatError> {
        match self {
            Sparse::Unfiltered(value) => {
                peek_to_value(Peek::new(value)).map_err(|err| FormatError::traversal(T::SHAPE, err))
            }
            Sparse::Filtered(value) => Ok(value),
        }
    }

    /// Returns true if no filtering happened.
    pub fn is_unfiltered(&self) -> bool {
        matches!(self, Sparse::Unfiltered(_))
    }
}

/// Settings for a [`SparseFormatter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SparseConfig {
    /// How field lists become formatter cache keys
    pub key_order: KeyOrder,
    /// Maximum formatters kept per type; unbounded if `None`
    pub formatter_capacity: Option<NonZeroUsize>,
    /// Maximum types kept; unbounded if `None`
    pub builder_capacity: Option<NonZeroUsize>,
}

impl Default for SparseConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl SparseConfig {
    /// Canonical keys, unbounded caches.
    pub const fn new() -> Self {
        Self {
            key_order: KeyOrder::Canonical,
            formatter_capacity: None,
            builder_capacity: None,
        }
    }

    /// Sets the key policy.
    pub const fn key_order(mut self, key_order: KeyOrder) -> Self {
        self.key_order = key_order;
        self
    }

    /// Bounds the formatters kept per type. Zero means unbounded.
    pub const fn formatter_capacity(mut self, capacity: usize) -> Self {
        self.formatter_capacity = NonZeroUsize::new(capacity);
        self
    }

    /// Bounds the number of types kept. Zero means unbounded.
    pub const fn builder_capacity(mut self, capacity: usize) -> Self {
        self.builder_capacity = NonZeroUsize::new(capacity);
        self
    }
}

/// Cache counters, as returned by [`SparseFormatter::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Types currently cached
    pub builders: usize,
    /// Formatters currently cached, across all types
    pub formatters: usize,
    /// Builders compiled since creation
    pub builder_compiles: usize,
    /// Formatters built since creation
    pub formatter_compiles: usize,
    /// Formatter lookups served from the cache
    pub hits: usize,
    /// Builders and formatters evicted to stay within capacity
    pub evictions: usize,
}

/// Per-type cache entry: the builder and the formatters built from it.
#[derive(Debug)]
struct TypeEntry {
    builder: Builder,
    formatters: OnceCache<String, Formatter>,
}

#[derive(Debug, Default)]
struct Counters {
    builder_compiles: AtomicUsize,
    formatter_compiles: AtomicUsize,
    hits: AtomicUsize,
    evictions: AtomicUsize,
}

/// Projects values onto caller-supplied field lists, caching the compiled
/// plans per type and per field set.
///
/// A `SparseFormatter` is `Send + Sync`; share one by reference or `Arc`
/// across request handlers. Each instance owns its caches.
#[derive(Debug)]
pub struct SparseFormatter {
    config: SparseConfig,
    types: OnceCache<ConstTypeId, TypeEntry>,
    counters: Counters,
}

impl Default for SparseFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl SparseFormatter {
    /// A formatter with the default [`SparseConfig`].
    pub fn new() -> Self {
        Self::with_config(SparseConfig::new())
    }

    /// A formatter with the given settings.
    pub fn with_config(config: SparseConfig) -> Self {
        Self {
            config,
            types: OnceCache::new(config.builder_capacity),
            counters: Counters::default(),
        }
    }

    /// The settings this formatter was created with.
    pub fn config(&self) -> &SparseConfig {
        &self.config
    }

    /// Keeps only `fields` of `value`.
    ///
    /// An empty field list returns [`Sparse::Unfiltered`] without touching
    /// the caches. Otherwise the list is checked for duplicates, the type's
    /// builder and the field set's formatter are looked up (and compiled on
    /// first use), and the formatter is applied.
    pub fn format<'a, 'facet, T, S>(
        &self,
        value: &'a T,
        fields: &[S],
    ) -> Result<Sparse<'a, T>, FormatError>
    where
        T: Facet<'facet> + ?Sized,
        S: AsRef<str>,
    {
        if fields.is_empty() {
            return Ok(Sparse::Unfiltered(value));
        }
        let formatter = self.formatter_for(T::SHAPE, fields)?;
        formatter.format(Peek::new(value)).map(Sparse::Filtered)
    }

    /// Like [`format`](Self::format), for callers that already hold a
    /// [`Peek`]. Returns `None` when no fields were requested.
    pub fn format_peek<S: AsRef<str>>(
        &self,
        peek: Peek<'_, '_>,
        fields: &[S],
    ) -> Result<Option<Value>, FormatError> {
        if fields.is_empty() {
            return Ok(None);
        }
        let formatter = self.formatter_for(peek.shape(), fields)?;
        formatter.format(peek).map(Some)
    }

    /// Resolves the formatter for `shape` and `fields`, compiling and
    /// caching it on first use, without applying it.
    pub fn formatter_for<S: AsRef<str>>(
        &self,
        shape: &'static Shape,
        fields: &[S],
    ) -> Result<Arc<Formatter>, FormatError> {
        check_duplicates(fields)?;

        let entry = self.type_entry(shape)?;
        let key = FieldKey::new(fields, self.config.key_order);

        let built = entry
            .formatters
            .get_or_try_insert_with(key.key(), || entry.builder.build(key.paths(), ""));
        let (formatter, lookup) = match built {
            Ok(found) => found,
            Err(err) => {
                debug!(%shape, key = key.key(), %err, "formatter build failed");
                return Err(err);
            }
        };

        match lookup {
            Lookup::Hit => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                trace!(%shape, key = key.key(), "formatter cache hit");
            }
            Lookup::Compiled { evicted } => {
                self.counters
                    .formatter_compiles
                    .fetch_add(1, Ordering::Relaxed);
                debug!(%shape, key = key.key(), "built formatter");
                self.record_evictions(evicted);
            }
        }

        Ok(formatter)
    }

    /// A snapshot of the cache counters.
    pub fn stats(&self) -> CacheStats {
        let entries = self.types.ready_values();
        CacheStats {
            builders: entries.len(),
            formatters: entries.iter().map(|entry| entry.formatters.len()).sum(),
            builder_compiles: self.counters.builder_compiles.load(Ordering::Relaxed),
            formatter_compiles: self.counters.formatter_compiles.load(Ordering::Relaxed),
            hits: self.counters.hits.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
        }
    }

    fn type_entry(&self, shape: &'static Shape) -> Result<Arc<TypeEntry>, FormatError> {
        let formatter_capacity = self.config.formatter_capacity;
        let compiled = self.types.get_or_try_insert_with(&shape.id, || {
            Builder::compile(shape).map(|builder| TypeEntry {
                builder,
                formatters: OnceCache::new(formatter_capacity),
            })
        });
        let (entry, lookup) = match compiled {
            Ok(found) => found,
            Err(err) => {
                debug!(%shape, %err, "builder compile failed");
                return Err(err);
            }
        };

        if let Lookup::Compiled { evicted } = lookup {
            self.counters.builder_compiles.fetch_add(1, Ordering::Relaxed);
            self.record_evictions(evicted);
        }
        Ok(entry)
    }

    fn record_evictions(&self, evicted: usize) {
        if evicted > 0 {
            debug!(evicted, "evicted least recently used cache entries");
            self.counters.evictions.fetch_add(evicted, Ordering::Relaxed);
        }
    }
}
