//! A MapReduce-compatible implementation of `grep`.
//!

use crate::source::InputUnit;
use crate::utils::string_from_bytes;
use crate::*;
use anyhow::{ensure, Context, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use clap::Parser;
use serde::{Deserialize, Serialize};

#[derive(Parser, Debug, Serialize, Deserialize)]
#[clap(no_binary_name = true)]
struct Args {
    #[clap(short, long, value_parser)]
    term: String,
}

fn parse_args(aux: &Bytes) -> Result<Args> {
    let args = serde_json::from_slice::<Vec<String>>(aux).context("malformed grep arguments")?;
    Ok(Args::try_parse_from(args)?)
}

/// Emits `(input name, line number ++ line)` for every line containing the
/// term. Line numbers start at 1.
pub fn map(input: &InputUnit, aux: &Bytes) -> MapOutput<Bytes, Bytes> {
    let term = parse_args(aux)?.term;
    let text = string_from_bytes(input.read()?)
        .with_context(|| format!("{} is not valid UTF-8", input.name()))?;
    let key = Bytes::from(input.name().into_owned());

    let mut value_buf = BytesMut::new();
    Ok(text
        .lines()
        .enumerate()
        .filter(|(_, line)| line.contains(&term))
        .map(|(i, line)| {
            value_buf.put_u64(i as u64 + 1);
            value_buf.put(line.as_bytes());
            KeyValue::new(key.clone(), value_buf.split().freeze())
        })
        .collect())
}

/// Renders the matches of one input as `line: text` entries ordered by line
/// number, separated by `; `.
pub fn reduce(_key: &Bytes, values: Vec<Bytes>, _aux: &Bytes) -> Result<Bytes> {
    let mut matches = Vec::with_capacity(values.len());
    for mut value in values {
        ensure!(value.len() >= 8, "truncated grep match");
        let line_no = value.get_u64();
        matches.push((line_no, string_from_bytes(value)?));
    }
    matches.sort_by_key(|(line_no, _)| *line_no);

    let rendered = matches
        .iter()
        .map(|(line_no, line)| format!("{line_no}: {line}"))
        .collect::<Vec<_>>()
        .join("; ");
    Ok(Bytes::from(rendered))
}
