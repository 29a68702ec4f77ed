//! A MapReduce-compatible implementation of word count.
//!

use crate::source::InputUnit;
use crate::utils::{string_from_bytes, u64_from_bytes, u64_to_bytes};
use crate::*;
use anyhow::{Context, Result};
use bytes::Bytes;

/// Splits `text` on whitespace, keeps only the ASCII letters of each token and
/// lowercases them. Tokens left empty are dropped.
pub fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split_whitespace().filter_map(|token| {
        let word: String = token
            .chars()
            .filter(char::is_ascii_alphabetic)
            .map(|c| c.to_ascii_lowercase())
            .collect();
        (!word.is_empty()).then_some(word)
    })
}

pub fn map(input: &InputUnit, _aux: &Bytes) -> MapOutput<Bytes, Bytes> {
    let text = string_from_bytes(input.read()?)
        .with_context(|| format!("{} is not valid UTF-8", input.name()))?;
    let one = u64_to_bytes(1);
    Ok(words(&text)
        .map(|word| KeyValue::new(Bytes::from(word), one.clone()))
        .collect())
}

pub fn reduce(_key: &Bytes, values: Vec<Bytes>, _aux: &Bytes) -> Result<Bytes> {
    let mut count: u64 = 0;
    for value in values {
        count = count
            .checked_add(u64_from_bytes(value)?)
            .context("count overflowed")?;
    }
    Ok(Bytes::from(count.to_string()))
}
