//! An in-process MapReduce engine.
//!
//! Users supply a [`Mapper`] and a [`Reducer`], hand the engine a list of
//! inputs, and get back every distinct intermediate key with its reduced
//! value, in ascending key order. Map and reduce calls are spread over a
//! bounded worker pool; grouping happens in a single pass in between.
//!
//! Reading inputs and printing results are left to collaborators: see
//! [`source`] and [`sink`] for the file-backed versions used by `mr-run`.

use std::fmt::Debug;

pub mod sink;
pub mod source;
pub mod standalone;
pub mod utils;
pub mod workload;

pub use standalone::engine::{
    CancellationToken, Completed, Engine, EngineError, ResultMapping, RunStats,
};
pub use standalone::config::EngineConfig;

/////////////////////////////////////////////////////////////////////////////
// MapReduce application types
/////////////////////////////////////////////////////////////////////////////

/// Why a single map call produced no pairs.
#[derive(Debug, thiserror::Error)]
pub enum MapError {
    /// The input could not be opened or read. The input contributes zero
    /// pairs and the run carries on (unless the engine runs strict).
    #[error("input unavailable")]
    InputUnavailable(#[source] anyhow::Error),
    /// The map function itself failed. This aborts the run.
    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

/// The output of a map call: every pair emitted for one input.
pub type MapOutput<K, V> = Result<Vec<KeyValue<K, V>>, MapError>;

/// Turns one input into intermediate key-value pairs.
///
/// Implementations must not mutate shared state: the engine may call `map`
/// for different inputs on different threads at the same time.
///
/// Any `Fn(&I) -> MapOutput<K, V>` is a mapper, so plain functions and
/// closures can be passed to [`Engine::run`] directly.
pub trait Mapper<I: ?Sized, K, V>: Sync {
    fn map(&self, input: &I) -> MapOutput<K, V>;
}

impl<F, I, K, V> Mapper<I, K, V> for F
where
    I: ?Sized,
    F: Fn(&I) -> MapOutput<K, V> + Sync,
{
    #[inline]
    fn map(&self, input: &I) -> MapOutput<K, V> {
        self(input)
    }
}

/// Folds every value emitted for one key into a single output.
///
/// `values` is never empty and holds the values in the order they were
/// emitted. Each key is reduced exactly once per run.
pub trait Reducer<K, V, O>: Sync {
    fn reduce(&self, key: &K, values: Vec<V>) -> anyhow::Result<O>;
}

impl<F, K, V, O> Reducer<K, V, O> for F
where
    F: Fn(&K, Vec<V>) -> anyhow::Result<O> + Sync,
{
    #[inline]
    fn reduce(&self, key: &K, values: Vec<V>) -> anyhow::Result<O> {
        self(key, values)
    }
}

/// Bound on intermediate keys: groupable, sortable, sendable between
/// workers and printable in error messages.
pub trait IntermediateKey: std::hash::Hash + Ord + Send + Debug {}

impl<T> IntermediateKey for T where T: std::hash::Hash + Ord + Send + Debug {}

/////////////////////////////////////////////////////////////////////////////
// Key-value pairs
/////////////////////////////////////////////////////////////////////////////

/// A single key-value pair.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct KeyValue<K, V> {
    /// The key.
    pub key: K,
    /// The value.
    pub value: V,
}

impl<K, V> KeyValue<K, V> {
    /// Construct a new key-value pair from the given key and value.
    pub fn new(key: K, value: V) -> Self {
        Self { key, value }
    }

    /// Borrow the key of this key-value pair.
    #[inline]
    pub fn key(&self) -> &K {
        &self.key
    }

    /// Borrow the value of this key-value pair.
    #[inline]
    pub fn value(&self) -> &V {
        &self.value
    }

    /// Splits the pair into a tuple.
    #[inline]
    pub fn into_parts(self) -> (K, V) {
        (self.key, self.value)
    }
}
