use rayon::prelude::*;
use serde::ser::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, info_span, warn};
use uuid::Uuid;

use super::config::EngineConfig;
use super::shuffle::{self, Groups};
use crate::*;

/// Errors that abort a run. No partial results survive any of them.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("map failed for input #{index} ({input})")]
    Mapper {
        index: usize,
        input: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("input #{index} ({input}) is unavailable")]
    UnavailableInput {
        index: usize,
        input: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("reduce failed for key {key}")]
    Reducer {
        key: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("failed to start {phase} workers")]
    Pool {
        phase: &'static str,
        #[source]
        source: rayon::ThreadPoolBuildError,
    },
    #[error("run cancelled")]
    Cancelled,
}

/// Shared flag that stops a run at the next phase boundary or task start.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/////////////////////////////////////////////////////////////////////////////
// Results
/////////////////////////////////////////////////////////////////////////////

/// The reduced value of every distinct key, in ascending key order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultMapping<K, O> {
    entries: Vec<KeyValue<K, O>>,
}

impl<K, O> Default for ResultMapping<K, O> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<K: Ord, O> ResultMapping<K, O> {
    /// Entries must already be sorted by key with no duplicates.
    fn from_sorted(entries: Vec<KeyValue<K, O>>) -> Self {
        debug_assert!(entries.windows(2).all(|w| w[0].key < w[1].key));
        Self { entries }
    }

    pub fn get(&self, key: &K) -> Option<&O> {
        self.entries
            .binary_search_by(|kv| kv.key.cmp(key))
            .ok()
            .map(|i| &self.entries[i].value)
    }

    pub fn into_btree_map(self) -> BTreeMap<K, O> {
        self.entries.into_iter().map(KeyValue::into_parts).collect()
    }
}

impl<K, O> ResultMapping<K, O> {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.entries.iter().map(KeyValue::key)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, KeyValue<K, O>> {
        self.entries.iter()
    }
}

impl<K, O> IntoIterator for ResultMapping<K, O> {
    type Item = KeyValue<K, O>;
    type IntoIter = std::vec::IntoIter<KeyValue<K, O>>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a, K, O> IntoIterator for &'a ResultMapping<K, O> {
    type Item = &'a KeyValue<K, O>;
    type IntoIter = std::slice::Iter<'a, KeyValue<K, O>>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Serializes as a map, keys in ascending order.
impl<K: Serialize, O: Serialize> Serialize for ResultMapping<K, O> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.entries.iter().map(|kv| (&kv.key, &kv.value)))
    }
}

/// Counters and timings for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunStats {
    pub run_id: Uuid,
    pub inputs: usize,
    pub unavailable_inputs: usize,
    pub pairs_emitted: usize,
    pub values_grouped: usize,
    pub keys: usize,
    pub map_time: Duration,
    pub shuffle_time: Duration,
    pub reduce_time: Duration,
}

/// A finished run.
#[derive(Debug)]
pub struct Completed<K, O> {
    pub results: ResultMapping<K, O>,
    pub stats: RunStats,
}

/////////////////////////////////////////////////////////////////////////////
// Engine
/////////////////////////////////////////////////////////////////////////////

/// Runs map, shuffle and reduce over a fixed list of inputs.
#[derive(Debug, Clone, Default)]
pub struct Engine {
    config: EngineConfig,
    cancel: Option<CancellationToken>,
}

// What a single map call contributed.
type Contribution<K, V> = Option<Vec<KeyValue<K, V>>>;

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            cancel: None,
        }
    }

    /// Observes `token` before every map and reduce call and between phases.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Maps every input, groups the pairs by key and reduces each group.
    pub fn run<I, K, V, O, M, R>(
        &self,
        inputs: &[I],
        mapper: &M,
        reducer: &R,
    ) -> Result<ResultMapping<K, O>, EngineError>
    where
        I: Debug + Sync,
        K: IntermediateKey,
        V: Send,
        O: Send,
        M: Mapper<I, K, V>,
        R: Reducer<K, V, O>,
    {
        self.execute(inputs, mapper, reducer).map(|done| done.results)
    }

    /// Like [`Engine::run`], also returning counters for the run.
    pub fn execute<I, K, V, O, M, R>(
        &self,
        inputs: &[I],
        mapper: &M,
        reducer: &R,
    ) -> Result<Completed<K, O>, EngineError>
    where
        I: Debug + Sync,
        K: IntermediateKey,
        V: Send,
        O: Send,
        M: Mapper<I, K, V>,
        R: Reducer<K, V, O>,
    {
        let run_id = Uuid::new_v4();
        let span = info_span!("run", id = %run_id);
        let _enter = span.enter();

        if inputs.is_empty() {
            debug!("no inputs, nothing to do");
            return Ok(Completed {
                results: ResultMapping::default(),
                stats: RunStats {
                    run_id,
                    inputs: 0,
                    unavailable_inputs: 0,
                    pairs_emitted: 0,
                    values_grouped: 0,
                    keys: 0,
                    map_time: Duration::ZERO,
                    shuffle_time: Duration::ZERO,
                    reduce_time: Duration::ZERO,
                },
            });
        }

        // map phase
        let started = Instant::now();
        let contributions = self.perform_map(inputs, mapper)?;
        let map_time = started.elapsed();
        let unavailable_inputs = contributions.iter().filter(|c| c.is_none()).count();
        let pairs_emitted: usize = contributions.iter().flatten().map(Vec::len).sum();
        debug!(
            inputs = inputs.len(),
            unavailable_inputs,
            pairs_emitted,
            elapsed = ?map_time,
            "map phase done"
        );

        // every map call has returned; nothing is grouped before this point
        self.check_cancelled()?;

        // shuffle phase
        let started = Instant::now();
        let groups = shuffle::group(contributions.into_iter().flatten());
        let shuffle_time = started.elapsed();
        let values_grouped = groups.value_count();
        let keys = groups.len();
        debug!(keys, values_grouped, elapsed = ?shuffle_time, "shuffle phase done");

        // reduce phase
        let started = Instant::now();
        let results = self.perform_reduce(groups, reducer)?;
        let reduce_time = started.elapsed();
        debug!(keys = results.len(), elapsed = ?reduce_time, "reduce phase done");

        let stats = RunStats {
            run_id,
            inputs: inputs.len(),
            unavailable_inputs,
            pairs_emitted,
            values_grouped,
            keys,
            map_time,
            shuffle_time,
            reduce_time,
        };
        info!(
            inputs = stats.inputs,
            pairs = stats.pairs_emitted,
            keys = stats.keys,
            "run complete"
        );
        Ok(Completed { results, stats })
    }

    fn perform_map<I, K, V, M>(
        &self,
        inputs: &[I],
        mapper: &M,
    ) -> Result<Vec<Contribution<K, V>>, EngineError>
    where
        I: Debug + Sync,
        K: Send,
        V: Send,
        M: Mapper<I, K, V>,
    {
        let workers = self.config.effective_map_workers();
        if workers == 1 {
            return inputs
                .iter()
                .enumerate()
                .map(|(index, input)| self.map_one(index, input, mapper))
                .collect();
        }

        // An indexed collect keeps contributions in input order, however the
        // calls were scheduled.
        build_pool("map", workers)?.install(|| {
            inputs
                .par_iter()
                .enumerate()
                .map(|(index, input)| self.map_one(index, input, mapper))
                .collect()
        })
    }

    fn map_one<I, K, V, M>(
        &self,
        index: usize,
        input: &I,
        mapper: &M,
    ) -> Result<Contribution<K, V>, EngineError>
    where
        I: Debug,
        M: Mapper<I, K, V>,
    {
        self.check_cancelled()?;
        match mapper.map(input) {
            Ok(pairs) => Ok(Some(pairs)),
            Err(MapError::InputUnavailable(source)) if self.config.strict_inputs => {
                Err(EngineError::UnavailableInput {
                    index,
                    input: label(input),
                    source,
                })
            }
            Err(MapError::InputUnavailable(source)) => {
                warn!(index, input = %label(input), "skipping unavailable input: {source:#}");
                Ok(None)
            }
            Err(MapError::Failed(source)) => Err(EngineError::Mapper {
                index,
                input: label(input),
                source,
            }),
        }
    }

    fn perform_reduce<K, V, O, R>(
        &self,
        groups: Groups<K, V>,
        reducer: &R,
    ) -> Result<ResultMapping<K, O>, EngineError>
    where
        K: IntermediateKey,
        V: Send,
        O: Send,
        R: Reducer<K, V, O>,
    {
        let sorted = groups.into_sorted();
        let workers = self.config.effective_reduce_workers();
        let entries: Vec<KeyValue<K, O>> = if workers == 1 {
            sorted
                .into_iter()
                .map(|(key, values)| self.reduce_one(key, values, reducer))
                .collect::<Result<_, _>>()?
        } else {
            build_pool("reduce", workers)?.install(|| {
                sorted
                    .into_par_iter()
                    .map(|(key, values)| self.reduce_one(key, values, reducer))
                    .collect::<Result<_, _>>()
            })?
        };
        Ok(ResultMapping::from_sorted(entries))
    }

    fn reduce_one<K, V, O, R>(
        &self,
        key: K,
        values: Vec<V>,
        reducer: &R,
    ) -> Result<KeyValue<K, O>, EngineError>
    where
        K: Debug,
        R: Reducer<K, V, O>,
    {
        self.check_cancelled()?;
        match reducer.reduce(&key, values) {
            Ok(value) => Ok(KeyValue::new(key, value)),
            Err(source) => Err(EngineError::Reducer {
                key: format!("{key:?}"),
                source,
            }),
        }
    }

    fn check_cancelled(&self) -> Result<(), EngineError> {
        match &self.cancel {
            Some(token) if token.is_cancelled() => Err(EngineError::Cancelled),
            _ => Ok(()),
        }
    }
}

const LABEL_LIMIT: usize = 80;

// Debug form of an input for messages, cut to LABEL_LIMIT characters.
fn label(input: &impl Debug) -> String {
    let mut label = format!("{input:?}");
    if let Some((cut, _)) = label.char_indices().nth(LABEL_LIMIT) {
        label.truncate(cut);
        label.push_str("...");
    }
    label
}

fn build_pool(phase: &'static str, workers: usize) -> Result<rayon::ThreadPool, EngineError> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(move |i| format!("mr-{phase}-{i}"))
        .build()
        .map_err(|source| EngineError::Pool { phase, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    fn words(text: &&str) -> MapOutput<String, u64> {
        Ok(text
            .split_whitespace()
            .map(|w| KeyValue::new(w.to_string(), 1))
            .collect())
    }

    fn sum(_key: &String, values: Vec<u64>) -> anyhow::Result<u64> {
        Ok(values.into_iter().sum())
    }

    #[test]
    fn counts_words_across_inputs() {
        let inputs = ["the quick fox", "the lazy fox"];
        let results = Engine::new(EngineConfig::sequential())
            .run(&inputs, &words, &sum)
            .unwrap();

        let got: Vec<(String, u64)> = results.into_iter().map(KeyValue::into_parts).collect();
        assert_eq!(
            got,
            vec![
                ("fox".to_string(), 2),
                ("lazy".to_string(), 1),
                ("quick".to_string(), 1),
                ("the".to_string(), 2),
            ]
        );
    }

    #[test]
    fn empty_input_invokes_nothing() {
        let maps = AtomicUsize::new(0);
        let reduces = AtomicUsize::new(0);
        let mapper = |_: &&str| -> MapOutput<String, u64> {
            maps.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        };
        let reducer = |_: &String, _: Vec<u64>| -> anyhow::Result<u64> {
            reduces.fetch_add(1, Ordering::SeqCst);
            Ok(0)
        };

        let inputs: [&str; 0] = [];
        let done = Engine::default().execute(&inputs, &mapper, &reducer).unwrap();

        assert!(done.results.is_empty());
        assert_eq!(done.stats.inputs, 0);
        assert_eq!(maps.load(Ordering::SeqCst), 0);
        assert_eq!(reduces.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn reduces_each_key_once_with_all_values() {
        let calls = Mutex::new(Vec::new());
        let reducer = |key: &String, values: Vec<u64>| -> anyhow::Result<usize> {
            calls.lock().unwrap().push(key.clone());
            Ok(values.len())
        };

        let inputs = ["a b a", "", "b a c", "a"];
        let results = Engine::new(EngineConfig::default().with_workers(4))
            .run(&inputs, &words, &reducer)
            .unwrap();

        let mut calls = calls.into_inner().unwrap();
        calls.sort();
        assert_eq!(calls, vec!["a", "b", "c"]);
        assert_eq!(results.get(&"a".to_string()), Some(&4));
        assert_eq!(results.get(&"b".to_string()), Some(&2));
        assert_eq!(results.get(&"c".to_string()), Some(&1));
    }

    #[test]
    fn parallel_map_keeps_input_order_within_groups() {
        let inputs: Vec<String> = (0..64).map(|i| i.to_string()).collect();
        let mapper = |input: &String| -> MapOutput<&'static str, String> {
            Ok(vec![KeyValue::new("all", input.clone())])
        };
        let concat = |_: &&'static str, values: Vec<String>| -> anyhow::Result<String> {
            Ok(values.join(","))
        };

        let expected = inputs.join(",");
        for _ in 0..4 {
            let results = Engine::new(EngineConfig::default().with_workers(8))
                .run(&inputs, &mapper, &concat)
                .unwrap();
            assert_eq!(results.get(&"all"), Some(&expected));
        }
    }

    #[test]
    fn unavailable_input_is_skipped() {
        let mapper = |input: &&str| -> MapOutput<String, u64> {
            if input.is_empty() {
                return Err(MapError::InputUnavailable(anyhow::anyhow!("no such file")));
            }
            words(input)
        };

        let inputs = ["x y", "", "y"];
        let done = Engine::new(EngineConfig::sequential())
            .execute(&inputs, &mapper, &sum)
            .unwrap();

        assert_eq!(done.stats.unavailable_inputs, 1);
        assert_eq!(done.stats.pairs_emitted, 3);
        assert_eq!(done.results.get(&"y".to_string()), Some(&2));
    }

    #[test]
    fn unavailable_input_is_fatal_when_strict() {
        let mapper = |input: &&str| -> MapOutput<String, u64> {
            if input.is_empty() {
                return Err(MapError::InputUnavailable(anyhow::anyhow!("no such file")));
            }
            words(input)
        };

        let inputs = ["x", ""];
        let err = Engine::new(EngineConfig::sequential().with_strict_inputs(true))
            .run(&inputs, &mapper, &sum)
            .unwrap_err();

        assert!(matches!(err, EngineError::UnavailableInput { index: 1, .. }));
    }

    #[test]
    fn mapper_failure_names_the_input() {
        let mapper = |input: &&str| -> MapOutput<String, u64> {
            if *input == "bad" {
                return Err(anyhow::anyhow!("corrupt record").into());
            }
            words(input)
        };

        let inputs = ["ok", "bad"];
        let err = Engine::new(EngineConfig::sequential())
            .run(&inputs, &mapper, &sum)
            .unwrap_err();

        match err {
            EngineError::Mapper { index, input, .. } => {
                assert_eq!(index, 1);
                assert_eq!(input, "\"bad\"");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn mapper_failure_message_stays_short_for_large_inputs() {
        let mapper = |input: &Vec<u8>| -> MapOutput<String, u64> {
            Err(anyhow::anyhow!("rejected {} bytes", input.len()).into())
        };

        let inputs = vec![vec![b'x'; 100_000]];
        let err = Engine::new(EngineConfig::sequential())
            .run(&inputs, &mapper, &sum)
            .unwrap_err();

        match err {
            EngineError::Mapper { index, ref input, .. } => {
                assert_eq!(index, 0);
                assert!(input.ends_with("..."));
            }
            ref other => panic!("unexpected error: {other}"),
        }
        assert!(err.to_string().len() < 200);
    }

    #[test]
    fn reducer_failure_names_the_key() {
        let reducer = |key: &String, values: Vec<u64>| -> anyhow::Result<u64> {
            if key == "boom" {
                bail!("overflow");
            }
            Ok(values.into_iter().sum())
        };

        let inputs = ["fine boom fine"];
        let err = Engine::new(EngineConfig::default().with_workers(2))
            .run(&inputs, &words, &reducer)
            .unwrap_err();

        assert!(matches!(err, EngineError::Reducer { ref key, .. } if key == "\"boom\""));
        assert_eq!(err.to_string(), "reduce failed for key \"boom\"");
        let cause = std::error::Error::source(&err).unwrap();
        assert_eq!(cause.to_string(), "overflow");
    }

    #[test]
    fn cancellation_during_map_stops_the_run() {
        let token = CancellationToken::new();
        let maps = AtomicUsize::new(0);
        let mapper = |input: &&str| -> MapOutput<String, u64> {
            maps.fetch_add(1, Ordering::SeqCst);
            token.cancel();
            words(input)
        };

        let inputs = ["a", "b", "c"];
        let err = Engine::new(EngineConfig::sequential())
            .with_cancellation(token.clone())
            .run(&inputs, &mapper, &sum)
            .unwrap_err();

        assert!(matches!(err, EngineError::Cancelled));
        assert_eq!(maps.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cancellation_at_barrier_skips_reduce() {
        let token = CancellationToken::new();
        let reduces = AtomicUsize::new(0);
        let mapper = |input: &&str| -> MapOutput<String, u64> {
            if *input == "last" {
                token.cancel();
            }
            words(input)
        };
        let reducer = |_: &String, values: Vec<u64>| -> anyhow::Result<u64> {
            reduces.fetch_add(1, Ordering::SeqCst);
            Ok(values.into_iter().sum())
        };

        let inputs = ["a", "last"];
        let err = Engine::new(EngineConfig::sequential())
            .with_cancellation(token.clone())
            .run(&inputs, &mapper, &reducer)
            .unwrap_err();

        assert!(matches!(err, EngineError::Cancelled));
        assert_eq!(reduces.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn cancellation_during_reduce_starts_no_more_reduces() {
        let token = CancellationToken::new();
        let reduces = AtomicUsize::new(0);
        let reducer = |_: &String, values: Vec<u64>| -> anyhow::Result<u64> {
            reduces.fetch_add(1, Ordering::SeqCst);
            token.cancel();
            Ok(values.into_iter().sum())
        };

        let inputs = ["a b c"];
        let err = Engine::new(EngineConfig::sequential())
            .with_cancellation(token.clone())
            .run(&inputs, &words, &reducer)
            .unwrap_err();

        assert!(matches!(err, EngineError::Cancelled));
        assert_eq!(reduces.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn result_mapping_serializes_as_ordered_map() {
        let inputs = ["b a b"];
        let results = Engine::new(EngineConfig::sequential())
            .run(&inputs, &words, &sum)
            .unwrap();

        let json = serde_json::to_string(&results).unwrap();
        assert_eq!(json, r#"{"a":1,"b":2}"#);
    }

    /// Tracks how many calls are in flight at once.
    #[derive(Default)]
    struct Gauge {
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    impl Gauge {
        fn hold(&self) {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(20));
            self.current.fetch_sub(1, Ordering::SeqCst);
        }

        fn peak(&self) -> usize {
            self.peak.load(Ordering::SeqCst)
        }
    }

    #[test]
    fn map_concurrency_stays_within_map_workers() {
        let gauge = Gauge::default();
        let mapper = |input: &String| -> MapOutput<String, u64> {
            gauge.hold();
            Ok(vec![KeyValue::new(input.clone(), 1)])
        };

        let inputs: Vec<String> = (0..16).map(|i| format!("k{i}")).collect();
        let results = Engine::new(EngineConfig::sequential().with_map_workers(2))
            .run(&inputs, &mapper, &sum)
            .unwrap();

        assert_eq!(results.len(), 16);
        assert_eq!(gauge.peak(), 2);
    }

    #[test]
    fn reduce_concurrency_stays_within_reduce_workers() {
        let gauge = Gauge::default();
        let reducer = |_: &String, values: Vec<u64>| -> anyhow::Result<u64> {
            gauge.hold();
            Ok(values.into_iter().sum())
        };

        let text = (0..16).map(|i| format!("k{i}")).collect::<Vec<_>>().join(" ");
        let inputs = [text.as_str()];
        let results = Engine::new(EngineConfig::sequential().with_reduce_workers(2))
            .run(&inputs, &words, &reducer)
            .unwrap();

        assert_eq!(results.len(), 16);
        assert_eq!(gauge.peak(), 2);
    }
}
