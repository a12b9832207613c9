//! Primitive element types that a cell can hold.
//!
//! Each type knows its encoded size and how to move itself in and out of a
//! little-endian byte buffer. `to_f64`/`from_f64` are lossy conversions used
//! when one image feeds features to a classifier that writes another.

use std::fmt::Debug;

use bytes::{Buf, BufMut};

/// Fixed-size numeric element stored in cells and block files.
pub trait Primitive: Copy + Default + PartialEq + Debug + Send + Sync + 'static {
    /// Encoded size in bytes.
    const SIZE: usize;
    /// Short type name used in logs.
    const NAME: &'static str;

    /// Appends `self` to `buf` in little-endian order.
    fn put<B: BufMut>(self, buf: &mut B);

    /// Reads one value from `buf` in little-endian order.
    ///
    /// The caller guarantees at least [`SIZE`](Self::SIZE) bytes remain.
    fn take<B: Buf>(buf: &mut B) -> Self;

    fn to_f64(self) -> f64;

    /// Saturating conversion from `f64`.
    fn from_f64(value: f64) -> Self;
}

macro_rules! impl_primitive {
    ($t:ty, $name:literal, $put:ident, $get:ident) => {
        impl Primitive for $t {
            const SIZE: usize = std::mem::size_of::<$t>();
            const NAME: &'static str = $name;

            #[inline]
            fn put<B: BufMut>(self, buf: &mut B) {
                buf.$put(self);
            }

            #[inline]
            fn take<B: Buf>(buf: &mut B) -> Self {
                buf.$get()
            }

            #[inline]
            fn to_f64(self) -> f64 {
                self as f64
            }

            #[inline]
            fn from_f64(value: f64) -> Self {
                value as $t
            }
        }
    };
}

impl_primitive!(u8, "u8", put_u8, get_u8);
impl_primitive!(i8, "i8", put_i8, get_i8);
impl_primitive!(u16, "u16", put_u16_le, get_u16_le);
impl_primitive!(i16, "i16", put_i16_le, get_i16_le);
impl_primitive!(u32, "u32", put_u32_le, get_u32_le);
impl_primitive!(i32, "i32", put_i32_le, get_i32_le);
impl_primitive!(u64, "u64", put_u64_le, get_u64_le);
impl_primitive!(i64, "i64", put_i64_le, get_i64_le);
impl_primitive!(f32, "f32", put_f32_le, get_f32_le);
impl_primitive!(f64, "f64", put_f64_le, get_f64_le);
