//! Block file encoding.
//!
//! A block is the cell's elements in linear order (axis 0 fastest), each
//! encoded little-endian, with no header. The expected length is known from
//! the grid, so a size mismatch is the corruption signal.

use bytes::{Bytes, BytesMut};

use crate::cell::primitive::Primitive;

/// Encodes cell elements into a block.
pub fn encode<T: Primitive>(data: &[T]) -> Bytes {
    let mut buf = BytesMut::with_capacity(data.len() * T::SIZE);
    for &value in data {
        value.put(&mut buf);
    }
    buf.freeze()
}

/// Decodes a block of exactly `expected_len` elements.
///
/// Returns a description of the mismatch when the block has the wrong size.
pub fn decode<T: Primitive>(mut block: &[u8], expected_len: usize) -> Result<Vec<T>, String> {
    let expected_bytes = expected_len * T::SIZE;
    if block.len() != expected_bytes {
        return Err(format!(
            "expected {expected_bytes} bytes ({expected_len} x {}), found {}",
            T::NAME,
            block.len()
        ));
    }
    let mut data = Vec::with_capacity(expected_len);
    for _ in 0..expected_len {
        data.push(T::take(&mut block));
    }
    Ok(data)
}
