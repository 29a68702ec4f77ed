//! Inputs for the engine: files matched by a glob, or data held in memory.

use anyhow::{Context, Result};
use bytes::Bytes;
use glob::glob;
use std::borrow::Cow;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::PathBuf;
use tracing::{debug, warn};

use crate::MapError;

/// One unit of work handed to a map call.
#[derive(Clone, PartialEq, Eq)]
pub enum InputUnit {
    /// A file, read lazily by whichever map call receives it.
    File(PathBuf),
    /// Data already in memory, under a display name.
    Inline { name: String, data: Bytes },
}

impl InputUnit {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::File(path.into())
    }

    pub fn inline(name: impl ToString, data: impl Into<Bytes>) -> Self {
        Self::Inline {
            name: name.to_string(),
            data: data.into(),
        }
    }

    /// The path for file inputs, the given name otherwise.
    pub fn name(&self) -> Cow<'_, str> {
        match self {
            Self::File(path) => path.to_string_lossy(),
            Self::Inline { name, .. } => Cow::Borrowed(name),
        }
    }

    /// Reads the whole input.
    ///
    /// Failing to open or read a file is reported as
    /// [`MapError::InputUnavailable`].
    pub fn read(&self) -> Result<Bytes, MapError> {
        match self {
            Self::File(path) => {
                let mut buf = Vec::new();
                {
                    // a scope so that the file is closed right after reading
                    let mut file = File::open(path)
                        .with_context(|| format!("failed to open {}", path.display()))
                        .map_err(MapError::InputUnavailable)?;
                    file.read_to_end(&mut buf)
                        .with_context(|| format!("failed to read {}", path.display()))
                        .map_err(MapError::InputUnavailable)?;
                }
                Ok(Bytes::from(buf))
            }
            Self::Inline { data, .. } => Ok(data.clone()),
        }
    }
}

// Shows the name and size only; inline data can be arbitrarily large.
impl fmt::Debug for InputUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => f.debug_tuple("File").field(path).finish(),
            Self::Inline { name, data } => f
                .debug_struct("Inline")
                .field("name", name)
                .field("len", &data.len())
                .finish(),
        }
    }
}

/// Expands `pattern` into file inputs, sorted by path with duplicates
/// removed.
///
/// Entries the glob walk cannot inspect are logged and skipped; an invalid
/// pattern is an error.
pub fn collect_inputs(pattern: &str) -> Result<Vec<InputUnit>> {
    let entries = glob(pattern).with_context(|| format!("invalid input pattern `{pattern}`"))?;
    let mut paths = Vec::new();
    for entry in entries {
        match entry {
            Ok(path) if path.is_dir() => debug!(path = %path.display(), "skipping directory"),
            Ok(path) => paths.push(path),
            Err(err) => warn!("skipping unreadable path: {err}"),
        }
    }
    paths.sort();
    paths.dedup();
    debug!(pattern, count = paths.len(), "collected inputs");
    Ok(paths.into_iter().map(InputUnit::File).collect())
}
