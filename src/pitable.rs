// Copyright 2024 Rémy Oudompheng. All rights reserved.
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Compressed PrimePi lookup tables.
//!
//! Each 128 consecutive integers are represented by one 64-bit
//! bitmap (one bit per odd integer, set if prime) and one 64-bit
//! running total equal to PrimePi(bucket_base - 1). A lookup is a
//! popcount over a masked word, so PrimePi(n) costs O(1) while the
//! table uses n/8 bytes.
//!
//! Since only odd integers are represented, the prime 2 is encoded
//! by flagging the bit of the integer 1 and short-circuiting
//! lookups below 2.
//!
//! [`SegmentedPiTable`] provides the same lookups over a sliding
//! window of O(segment_size) memory for queries up to x^(1/2),
//! where a full table would not fit.

use rayon::prelude::*;

use crate::arith::{ceil128, ceil_div, in_between};
use crate::primes::PrimeIter;

#[derive(Clone, Copy, Default)]
struct PiBucket {
    count: u64,
    bits: u64,
}

#[inline]
fn bucket_mask(offset: i64) -> u64 {
    // bits for the odd integers <= offset within the bucket
    let nbits = (offset % 128 + 1) / 2;
    if nbits == 0 {
        0
    } else {
        u64::MAX >> (64 - nbits)
    }
}

// Shared by PiTable and SegmentedPiTable: fill bits and counts for
// [start, stop) given bucket storage starting at table base `low`.
fn init_bits(buckets: &mut [PiBucket], low: i64, start: i64, stop: i64) -> u64 {
    for b in buckets.iter_mut() {
        *b = PiBucket::default();
    }
    // 2 is even and has no bit of its own: flag the bit of 1
    // instead, lookups below 2 are short-circuited.
    if start <= 1 && stop > 1 {
        buckets[0].bits |= 1;
    }
    let mut count = (start <= 2 && stop > 2) as u64;
    let mut it = PrimeIter::new(start.max(2) as u64, stop as u64);
    loop {
        let prime = it.next_prime() as i64;
        if prime >= stop {
            break;
        }
        let p = prime - low;
        buckets[(p / 128 - (start - low) / 128) as usize].bits |= 1 << (p % 128 / 2);
        count += 1;
    }
    count
}

fn init_counts(buckets: &mut [PiBucket], mut count: u64) {
    for b in buckets.iter_mut() {
        b.count = count;
        count += b.bits.count_ones() as u64;
    }
}

/// PrimePi(n) lookup table for n in [0, limit].
pub struct PiTable {
    buckets: Vec<PiBucket>,
    limit: i64,
}

impl PiTable {
    pub fn new(limit: i64, tpool: Option<&rayon::ThreadPool>) -> Self {
        let limit = limit.max(0);
        let nbuckets = (limit / 128 + 1) as usize;
        let mut buckets = vec![PiBucket::default(); nbuckets];
        let threads = tpool.map(|p| p.current_num_threads()).unwrap_or(1);
        // chunk bounds must stay multiples of 128
        let chunk_size = ceil128(ceil_div(limit + 1, threads as i64)).max(128) as usize / 128;

        let counts: Vec<u64> = if let Some(pool) = tpool {
            pool.install(|| {
                buckets
                    .par_chunks_mut(chunk_size)
                    .enumerate()
                    .map(|(t, chunk)| {
                        let start = (t * chunk_size * 128) as i64;
                        let stop = (start + chunk.len() as i64 * 128).min(limit + 1);
                        init_bits(chunk, 0, start, stop)
                    })
                    .collect()
            })
        } else {
            vec![init_bits(&mut buckets, 0, 0, limit + 1)]
        };

        // prefix pass: each chunk starts at the sum of the
        // preceding chunk counts
        let mut base = 0u64;
        let offsets: Vec<u64> = counts
            .iter()
            .map(|&c| {
                let o = base;
                base += c;
                o
            })
            .collect();
        if let Some(pool) = tpool {
            pool.install(|| {
                buckets
                    .par_chunks_mut(chunk_size)
                    .zip(offsets.par_iter())
                    .for_each(|(chunk, &offset)| init_counts(chunk, offset));
            });
        } else {
            init_counts(&mut buckets, 0);
        }
        PiTable { buckets, limit }
    }

    #[inline]
    pub fn limit(&self) -> i64 {
        self.limit
    }

    /// PrimePi(n).
    #[inline]
    pub fn get(&self, n: i64) -> i64 {
        if n < 2 {
            return 0;
        }
        debug_assert!(n <= self.limit);
        let b = &self.buckets[(n / 128) as usize];
        (b.count + (b.bits & bucket_mask(n)).count_ones() as u64) as i64
    }
}

/// PrimePi(n) lookups over a sliding window [low, high), used when
/// a full table up to x^(1/2) would not fit in memory.
pub struct SegmentedPiTable {
    buckets: Vec<PiBucket>,
    low: i64,
    high: i64,
    max_high: i64,
    segment_size: i64,
    pi_low: i64,
    threads: usize,
}

impl SegmentedPiTable {
    /// Table over [0, limit], advanced by `next()`.
    pub fn new(limit: i64, segment_size: i64, tpool: Option<&rayon::ThreadPool>) -> Self {
        let max_high = limit + 1;
        // 256 KiB of buckets span 256Ki * 8 numbers; large segments
        // improve load balancing of the threaded build.
        let min_segment_size = 256 * (1 << 10) * 8;
        let segment_size = ceil128(in_between(
            min_segment_size.min(max_high),
            segment_size,
            max_high.max(min_segment_size),
        ));
        let threads = tpool.map(|p| p.current_num_threads()).unwrap_or(1);
        let mut table = SegmentedPiTable {
            buckets: vec![PiBucket::default(); (segment_size / 128) as usize],
            low: 0,
            high: segment_size.min(max_high),
            max_high,
            segment_size,
            pi_low: 0,
            threads,
        };
        table.init(tpool);
        table
    }

    #[inline]
    pub fn low(&self) -> i64 {
        self.low
    }

    #[inline]
    pub fn high(&self) -> i64 {
        self.high
    }

    pub fn finished(&self) -> bool {
        self.low >= self.max_high
    }

    /// PrimePi(n) for low <= n < high.
    #[inline]
    pub fn get(&self, n: i64) -> i64 {
        if n < 2 {
            return 0;
        }
        debug_assert!(self.low <= n && n < self.high);
        let d = n - self.low;
        let b = &self.buckets[(d / 128) as usize];
        (b.count + (b.bits & bucket_mask(d)).count_ones() as u64) as i64
    }

    /// Slide the window to [high, high + segment_size).
    pub fn next(&mut self, tpool: Option<&rayon::ThreadPool>) {
        // pi_low must be updated before moving the window
        self.pi_low = self.get(self.high - 1);
        self.low = self.high;
        self.high = (self.low + self.segment_size).min(self.max_high);
        if !self.finished() {
            self.init(tpool);
        }
    }

    fn init(&mut self, tpool: Option<&rayon::ThreadPool>) {
        let (low, high) = (self.low, self.high);
        let span = high - low;
        let mut thread_size = ceil_div(span, self.threads as i64);
        // building tiny slices per thread is slower than one pass
        let min_thread_size: i64 = 10_000_000;
        thread_size = ceil128(thread_size.max(min_thread_size.min(span)));
        let chunk_buckets = (thread_size / 128).max(1) as usize;
        let nbuckets = ceil_div(span, 128) as usize;
        let buckets = &mut self.buckets[..nbuckets];

        let counts: Vec<u64> = if let Some(pool) = tpool {
            pool.install(|| {
                buckets
                    .par_chunks_mut(chunk_buckets)
                    .enumerate()
                    .map(|(t, chunk)| {
                        let start = low + (t * chunk_buckets * 128) as i64;
                        let stop = (start + chunk.len() as i64 * 128).min(high);
                        init_bits(chunk, low, start, stop)
                    })
                    .collect()
            })
        } else {
            vec![init_bits(buckets, low, low, high)]
        };

        let mut base = self.pi_low as u64;
        let offsets: Vec<u64> = counts
            .iter()
            .map(|&c| {
                let o = base;
                base += c;
                o
            })
            .collect();
        if let Some(pool) = tpool {
            pool.install(|| {
                buckets
                    .par_chunks_mut(chunk_buckets)
                    .zip(offsets.par_iter())
                    .for_each(|(chunk, &offset)| init_counts(chunk, offset));
            });
        } else {
            init_counts(buckets, self.pi_low as u64);
        }
    }
}

#[cfg(test)]
fn pi_bruteforce(n: i64) -> i64 {
    crate::primes::sieve_primes(n.max(0) as u64).len() as i64
}

#[test]
fn test_pi_table_small() {
    let pi = PiTable::new(1000, None);
    assert_eq!(pi.get(0), 0);
    assert_eq!(pi.get(1), 0);
    assert_eq!(pi.get(2), 1);
    assert_eq!(pi.get(3), 2);
    assert_eq!(pi.get(4), 2);
    for n in 0..=1000 {
        assert_eq!(pi.get(n), pi_bruteforce(n), "n={n}");
    }
}

#[test]
fn test_pi_table_boundaries() {
    // bucket boundaries at multiples of 128
    let pi = PiTable::new(100_000, None);
    for k in [127i64, 128, 129, 255, 256, 65535, 65536, 99999, 100000] {
        assert_eq!(pi.get(k), pi_bruteforce(k), "n={k}");
    }
    assert_eq!(pi.get(100_000), 9592);
}

#[test]
fn test_segmented_pi_table() {
    let limit = 300_000;
    let pi = PiTable::new(limit, None);
    // the minimum segment size covers [0, limit] in one window
    let mut seg = SegmentedPiTable::new(limit, 1 << 18, None);
    assert_eq!(seg.low(), 0);
    let mut checked = 0;
    while !seg.finished() {
        let mut n = seg.low();
        while n < seg.high() {
            assert_eq!(seg.get(n), pi.get(n), "n={n}");
            checked += 1;
            n += 611;
        }
        let last = seg.high() - 1;
        assert_eq!(seg.get(last), pi.get(last));
        seg.next(None);
    }
    assert!(checked >= limit / 611);
}
