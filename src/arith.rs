// Copyright 2024 Rémy Oudompheng. All rights reserved.
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Integer helpers shared by all counting kernels.
//!
//! The prime counting formulas are computed with signed integer
//! accumulators: 64-bit up to about 10^18 and 128-bit beyond.
//! The [`Counting`] trait abstracts over both widths so that each
//! kernel is written once; every multiplication that stitches
//! per-thread results together goes through `checked_mul` and
//! surfaces [`crate::Error::NumericOverflow`] instead of wrapping.

use std::fmt::{Debug, Display};

pub use num_integer::cbrt as icbrt;
pub use num_integer::sqrt as isqrt;
use num_integer::Roots;
use num_traits::{
    CheckedAdd, CheckedMul, CheckedSub, FromPrimitive, NumAssign, PrimInt, Signed, ToPrimitive,
};

/// Integer fourth root.
pub fn iroot4<T: Roots>(x: T) -> T {
    x.nth_root(4)
}

/// Integer sixth root.
pub fn iroot6<T: Roots>(x: T) -> T {
    x.nth_root(6)
}

/// Signed accumulator for counting kernels (i64 or i128).
pub trait Counting:
    PrimInt
    + Signed
    + NumAssign
    + CheckedAdd
    + CheckedSub
    + CheckedMul
    + FromPrimitive
    + ToPrimitive
    + Ord
    + Display
    + Debug
    + Send
    + Sync
    + 'static
{
    fn from64(v: i64) -> Self;
    /// Truncating conversion, the caller guarantees the value fits.
    fn low64(self) -> i64;
    fn as_f64(self) -> f64;
    fn from_f64_approx(v: f64) -> Self;
    /// Integer square root; roots of x <= 10^27 always fit in i64.
    fn sqrt64(self) -> i64;
    fn cbrt64(self) -> i64;
}

impl Counting for i64 {
    fn from64(v: i64) -> Self {
        v
    }
    fn low64(self) -> i64 {
        self
    }
    fn as_f64(self) -> f64 {
        self as f64
    }
    fn from_f64_approx(v: f64) -> Self {
        v as i64
    }
    fn sqrt64(self) -> i64 {
        isqrt(self)
    }
    fn cbrt64(self) -> i64 {
        icbrt(self)
    }
}

impl Counting for i128 {
    fn from64(v: i64) -> Self {
        v as i128
    }
    fn low64(self) -> i64 {
        self as i64
    }
    fn as_f64(self) -> f64 {
        self as f64
    }
    fn from_f64_approx(v: f64) -> Self {
        v as i128
    }
    fn sqrt64(self) -> i64 {
        isqrt(self) as i64
    }
    fn cbrt64(self) -> i64 {
        icbrt(self) as i64
    }
}

/// x / d where the quotient is known to fit in 64 bits.
#[inline]
pub fn fast_div<T: Counting>(x: T, d: i64) -> i64 {
    debug_assert!(d > 0);
    (x / T::from64(d)).low64()
}

/// x / d keeping the full width of x.
#[inline]
pub fn tdiv<T: Counting>(x: T, d: i64) -> T {
    debug_assert!(d > 0);
    x / T::from64(d)
}

/// min(x / d, cap): the quotient of a 128-bit x may not fit in 64
/// bits, so the clamp happens before the narrowing conversion.
#[inline]
pub fn div_clamp<T: Counting>(x: T, d: i64, cap: i64) -> i64 {
    debug_assert!(d > 0);
    (x / T::from64(d)).min(T::from64(cap)).low64()
}

#[inline]
pub fn ceil_div(a: i64, b: i64) -> i64 {
    debug_assert!(a >= 0 && b > 0);
    (a + b - 1) / b
}

/// Clamp v into [lo, hi].
#[inline]
pub fn in_between(lo: i64, v: i64, hi: i64) -> i64 {
    debug_assert!(lo <= hi);
    v.max(lo).min(hi)
}

/// Round up to the next multiple of 128.
#[inline]
pub fn ceil128(n: i64) -> i64 {
    debug_assert!(n >= 0);
    (n + 127) & !127
}

/// Round to the nearest power of two (1 for inputs <= 1).
pub fn round_pow2(n: u64) -> u64 {
    if n <= 1 {
        return 1;
    }
    let hi = n.next_power_of_two();
    let lo = hi >> 1;
    if n - lo < hi - n {
        lo
    } else {
        hi
    }
}

/// base^exp over u128, None on overflow.
pub fn checked_pow(base: u128, exp: u32) -> Option<u128> {
    let mut result: u128 = 1;
    for _ in 0..exp {
        result = result.checked_mul(base)?;
    }
    Some(result)
}

#[test]
fn test_roots() {
    assert_eq!(isqrt(0u64), 0);
    assert_eq!(isqrt(99u64), 9);
    assert_eq!(isqrt(100u64), 10);
    assert_eq!(isqrt(10_000_000_000_000_000_000u64), 3162277660);
    assert_eq!(icbrt(1_000_000u64), 100);
    assert_eq!(icbrt(999_999u64), 99);
    assert_eq!(iroot4(10_000u64), 10);
    assert_eq!(iroot6(1_000_000_000_000u128), 100);
    // Exact boundaries for large 128-bit inputs.
    let x: u128 = 10u128.pow(27);
    let r = isqrt(x);
    assert!(r * r <= x && (r + 1) * (r + 1) > x);
    let c = icbrt(x);
    assert!(c * c * c <= x && (c + 1) * (c + 1) * (c + 1) > x);
}

#[test]
fn test_round_pow2() {
    assert_eq!(round_pow2(0), 1);
    assert_eq!(round_pow2(1), 1);
    assert_eq!(round_pow2(2), 2);
    assert_eq!(round_pow2(3), 4);
    assert_eq!(round_pow2(5), 4);
    assert_eq!(round_pow2(6), 8);
    assert_eq!(round_pow2(1000), 1024);
    assert_eq!(round_pow2(1 << 40), 1 << 40);
}

#[test]
fn test_helpers() {
    assert_eq!(ceil_div(10, 3), 4);
    assert_eq!(ceil_div(9, 3), 3);
    assert_eq!(in_between(1, 5, 10), 5);
    assert_eq!(in_between(1, 0, 10), 1);
    assert_eq!(in_between(1, 11, 10), 10);
    assert_eq!(ceil128(0), 0);
    assert_eq!(ceil128(1), 128);
    assert_eq!(ceil128(128), 128);
    assert_eq!(ceil128(129), 256);
    assert_eq!(
        fast_div(1_000_000_000_000_000_000_000i128, 1_000),
        1_000_000_000_000_000_000
    );
    assert_eq!(checked_pow(2, 63), Some(1u128 << 63));
    assert_eq!(checked_pow(10, 38), Some(10u128.pow(38)));
    assert_eq!(checked_pow(2, 128), None);
}
