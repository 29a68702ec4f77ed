//! An inverted index: which inputs mention each word.
//!

use crate::source::InputUnit;
use crate::utils::string_from_bytes;
use crate::*;
use anyhow::{Context, Result};
use bytes::Bytes;
use itertools::Itertools;

use super::wc::words;

/// Emits `(word, input name)` once per distinct word of the input.
pub fn map(input: &InputUnit, _aux: &Bytes) -> MapOutput<Bytes, Bytes> {
    let text = string_from_bytes(input.read()?)
        .with_context(|| format!("{} is not valid UTF-8", input.name()))?;
    let name = Bytes::from(input.name().into_owned());
    Ok(words(&text)
        .unique()
        .map(|word| KeyValue::new(Bytes::from(word), name.clone()))
        .collect())
}

/// Joins the sorted, distinct input names with `,`.
pub fn reduce(_key: &Bytes, values: Vec<Bytes>, _aux: &Bytes) -> Result<Bytes> {
    let names: Vec<String> = values
        .into_iter()
        .map(string_from_bytes)
        .collect::<Result<_>>()?;
    Ok(Bytes::from(names.into_iter().sorted().dedup().join(",")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_emits_each_word_once() {
        let input = InputUnit::inline("a.txt", "Fox fox the");
        let pairs = map(&input, &Bytes::new()).unwrap();

        assert_eq!(
            pairs,
            vec![
                KeyValue::new(Bytes::from("fox"), Bytes::from("a.txt")),
                KeyValue::new(Bytes::from("the"), Bytes::from("a.txt")),
            ]
        );
    }

    #[test]
    fn reduce_sorts_and_dedups_names() {
        let values = vec![Bytes::from("b"), Bytes::from("a"), Bytes::from("b")];
        let out = reduce(&Bytes::from("fox"), values, &Bytes::new()).unwrap();
        assert_eq!(out, Bytes::from("a,b"));
    }
}
