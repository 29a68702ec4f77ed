//! Writers for finished results.

use anyhow::Result;
use serde_json::{Map, Value};
use std::io::Write;

use crate::ResultMapping;

/// Consumes the results of one run.
pub trait OutputSink<K, O> {
    fn write(&mut self, results: &ResultMapping<K, O>) -> Result<()>;
}

/// One `key: value` line per entry, in key order.
pub struct TextSink<W> {
    writer: W,
}

impl<W: Write> TextSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W, K, O> OutputSink<K, O> for TextSink<W>
where
    W: Write,
    K: AsRef<[u8]>,
    O: AsRef<[u8]>,
{
    fn write(&mut self, results: &ResultMapping<K, O>) -> Result<()> {
        for kv in results {
            self.writer.write_all(kv.key().as_ref())?;
            self.writer.write_all(b": ")?;
            self.writer.write_all(kv.value().as_ref())?;
            self.writer.write_all(b"\n")?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

/// A single JSON object, keys in order. Bytes that are not valid UTF-8 are
/// replaced.
pub struct JsonSink<W> {
    writer: W,
    pretty: bool,
}

impl<W: Write> JsonSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            pretty: false,
        }
    }

    pub fn pretty(mut self) -> Self {
        self.pretty = true;
        self
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W, K, O> OutputSink<K, O> for JsonSink<W>
where
    W: Write,
    K: AsRef<[u8]>,
    O: AsRef<[u8]>,
{
    fn write(&mut self, results: &ResultMapping<K, O>) -> Result<()> {
        let mut object = Map::new();
        for kv in results {
            object.insert(
                String::from_utf8_lossy(kv.key().as_ref()).into_owned(),
                Value::String(String::from_utf8_lossy(kv.value().as_ref()).into_owned()),
            );
        }
        if self.pretty {
            serde_json::to_writer_pretty(&mut self.writer, &object)?;
        } else {
            serde_json::to_writer(&mut self.writer, &object)?;
        }
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}
