//! Utility functions that may be helpful for implementing
//! and testing MapReduce workloads.
//!

use anyhow::{ensure, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Read an entire [`Bytes`] slice into a [`String`].
///
/// Returns an error if the slice contains invalid UTF-8.
pub fn string_from_bytes(buf: Bytes) -> Result<String> {
    Ok(String::from_utf8(buf.as_ref().into())?)
}

/// Encode a `u64` as 8 big-endian bytes.
pub fn u64_to_bytes(n: u64) -> Bytes {
    let mut buf = BytesMut::with_capacity(8);
    buf.put_u64(n);
    buf.freeze()
}

/// Decode a value written by [`u64_to_bytes`].
///
/// Returns an error unless the slice is exactly 8 bytes long.
pub fn u64_from_bytes(mut buf: Bytes) -> Result<u64> {
    ensure!(buf.len() == 8, "expected 8 bytes, got {}", buf.len());
    Ok(buf.get_u64())
}
