//! Converts MapReduce application names to actual application code.
//!
//! # Example
//!
//! To get the word count application:
//! ```
//! # use anyhow::Result;
//! use mrengine::workload;
//! # fn main() -> Result<()> {
//! let wc = workload::named("wc")?;
//! # Ok(())
//! # }
//! ```

use anyhow::{bail, Result};
use bytes::Bytes;

use crate::source::InputUnit;
use crate::{MapOutput, Mapper, Reducer};

pub mod grep;
pub mod inverted_index;
pub mod wc;

/// A map function takes one input and auxiliary arguments.
///
/// It returns every key-value pair emitted for that input.
pub type MapFn = fn(input: &InputUnit, aux: &Bytes) -> MapOutput<Bytes, Bytes>;

/// A reduce function takes in a key, every value emitted for that key,
/// and an auxiliary argument. It returns an [`anyhow::Result`]
/// containing a single output value.
pub type ReduceFn = fn(key: &Bytes, values: Vec<Bytes>, aux: &Bytes) -> Result<Bytes>;

/// A map reduce application.
#[derive(Copy, Clone)]
pub struct Workload {
    pub map_fn: MapFn,
    pub reduce_fn: ReduceFn,
}

/// A [`Workload`] bound to its auxiliary arguments, ready to hand to the
/// engine as both mapper and reducer.
#[derive(Clone)]
pub struct Application {
    workload: Workload,
    aux: Bytes,
}

impl Application {
    /// Binds `args`, serialized as a JSON array of strings.
    pub fn new(workload: Workload, args: &[String]) -> Result<Self> {
        let aux = Bytes::from(serde_json::to_vec(args)?);
        Ok(Self { workload, aux })
    }
}

impl Mapper<InputUnit, Bytes, Bytes> for Application {
    fn map(&self, input: &InputUnit) -> MapOutput<Bytes, Bytes> {
        (self.workload.map_fn)(input, &self.aux)
    }
}

impl Reducer<Bytes, Bytes, Bytes> for Application {
    fn reduce(&self, key: &Bytes, values: Vec<Bytes>) -> Result<Bytes> {
        (self.workload.reduce_fn)(key, values, &self.aux)
    }
}

/// Gets the [`Workload`] named `name`.
///
/// Returns [`None`] if no application with the given name was found.
pub fn try_named(name: &str) -> Option<Workload> {
    match name {
        "wc" => Some(Workload {
            map_fn: wc::map,
            reduce_fn: wc::reduce,
        }),
        "grep" => Some(Workload {
            map_fn: grep::map,
            reduce_fn: grep::reduce,
        }),
        "ii" | "inverted-index" => Some(Workload {
            map_fn: inverted_index::map,
            reduce_fn: inverted_index::reduce,
        }),
        _ => None,
    }
}

/// Gets the [`Workload`] named `name`.
///
/// Returns an [`anyhow::Error`] if no application with the given name was found.
pub fn named(name: &str) -> Result<Workload> {
    match try_named(name) {
        Some(app) => Ok(app),
        None => bail!("No app named `{}` found.", name),
    }
}
