// Copyright 2024 Rémy Oudompheng. All rights reserved.
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Prime generation and the multiplicative tables (Möbius, least
//! prime factor) that drive the special leaf enumerations.
//!
//! Two iterators provide bounded forward/backward enumeration of
//! primes over a window without materializing them: they sieve
//! blocks of 2^16 numbers with a bit per odd integer, which keeps
//! the memory footprint small even when the window reaches 10^13.

use crate::arith::isqrt;

/// All primes <= limit in ascending order.
///
/// One bit per odd number, 2 is hardcoded.
pub fn sieve_primes(limit: u64) -> Vec<u64> {
    if limit < 2 {
        return vec![];
    }
    let nbits = ((limit + 1) / 2) as usize; // bit i <=> 2i+1
    let nwords = nbits / 64 + 1;
    let mut bits = vec![!0u64; nwords];
    bits[0] &= !1; // 1 is not prime
    let root = isqrt(limit);
    let mut i = 3u64;
    while i <= root {
        if bits[(i / 2) as usize / 64] >> ((i / 2) % 64) & 1 == 1 {
            let mut m = i * i;
            while m <= limit {
                bits[(m / 2) as usize / 64] &= !(1 << ((m / 2) % 64));
                m += 2 * i;
            }
        }
        i += 2;
    }
    let mut primes = Vec::with_capacity(if limit > 16 {
        (limit as f64 / (limit as f64).ln() * 1.2) as usize
    } else {
        8
    });
    primes.push(2);
    for b in 0..nbits {
        if bits[b / 64] >> (b % 64) & 1 == 1 {
            let p = 2 * b as u64 + 1;
            if p > limit {
                break;
            }
            primes.push(p);
        }
    }
    primes
}

/// Primes <= limit with a 0 sentinel at index 0, so that
/// primes[b] is the b-th prime.
pub fn generate_primes(limit: i64) -> Vec<i64> {
    let mut primes: Vec<i64> = vec![0];
    primes.extend(sieve_primes(limit.max(0) as u64).iter().map(|&p| p as i64));
    primes
}

/// Least prime factor and Möbius tables over [0, limit].
///
/// lpf[m] is the smallest prime dividing m (m itself for primes);
/// lpf[1] = u64::MAX so that the special leaf test p < lpf[m]
/// accepts m = 1. mu[m] is the Möbius function, mu[0] = 0.
pub fn generate_mu_lpf(limit: i64) -> (Vec<u64>, Vec<i8>) {
    let n = limit.max(1) as usize;
    let mut lpf = vec![0u64; n + 1];
    let mut mu = vec![0i8; n + 1];
    lpf[1] = u64::MAX;
    mu[1] = 1;
    for i in 2..=n {
        if lpf[i] == 0 {
            for j in (i..=n).step_by(i) {
                if lpf[j] == 0 {
                    lpf[j] = i as u64;
                }
            }
        }
    }
    for m in 2..=n {
        let mut v = m;
        let mut odd = false;
        let musq = loop {
            if v == 1 {
                break if odd { -1i8 } else { 1 };
            }
            let p = lpf[v] as usize;
            v /= p;
            if v % p == 0 {
                break 0; // squareful
            }
            odd = !odd;
        };
        mu[m] = musq;
    }
    (lpf, mu)
}

// Iterators sieve blocks spanning 2^16 numbers.
const BLOCK_SPAN: u64 = 1 << 16;

fn sieve_block(low: u64, high: u64, sieving: &[u64], out: &mut Vec<u64>) {
    out.clear();
    if low < 3 && high > 2 {
        out.push(2);
    }
    let nbits = ((high - low) / 2 + 1) as usize;
    let mut bits = vec![!0u64; nbits / 64 + 1];
    for &p in sieving {
        if p == 2 {
            continue; // even numbers have no bit
        }
        if p * p >= high {
            break;
        }
        // first odd multiple of p inside [low, high)
        let mut m = p * p;
        if m < low {
            m = low + (p - low % p) % p;
            if m % 2 == 0 {
                m += p;
            }
        }
        while m < high {
            let idx = ((m - low) / 2) as usize;
            bits[idx / 64] &= !(1 << (idx % 64));
            m += 2 * p;
        }
    }
    // odd numbers low+1, low+3, ... (low is even)
    for i in 0..nbits {
        if bits[i / 64] >> (i % 64) & 1 == 1 {
            let p = low + 2 * i as u64 + 1;
            if p >= high {
                break;
            }
            if p > 2 {
                out.push(p);
            }
        }
    }
}

/// Forward enumeration of primes > start, in ascending order.
///
/// The stop hint only sizes the initial list of sieving primes,
/// iteration continues past it transparently.
pub struct PrimeIter {
    low: u64,
    start: u64,
    sieving: Vec<u64>,
    sieving_limit: u64,
    block: Vec<u64>,
    idx: usize,
}

impl PrimeIter {
    pub fn new(start: u64, stop_hint: u64) -> Self {
        let sieving_limit = isqrt(stop_hint.max(start).max(4)) + 1;
        PrimeIter {
            low: start.saturating_sub(1) & !1,
            start,
            sieving: sieve_primes(sieving_limit),
            sieving_limit,
            block: vec![],
            idx: 0,
        }
    }

    /// Next prime strictly greater than the previous one (the
    /// first call returns the smallest prime > start).
    pub fn next_prime(&mut self) -> u64 {
        loop {
            while self.idx < self.block.len() {
                let p = self.block[self.idx];
                self.idx += 1;
                if p > self.start {
                    return p;
                }
            }
            let high = self.low + BLOCK_SPAN;
            if high > self.sieving_limit * self.sieving_limit {
                while high > self.sieving_limit * self.sieving_limit {
                    self.sieving_limit *= 2;
                }
                self.sieving = sieve_primes(self.sieving_limit);
            }
            let mut block = std::mem::take(&mut self.block);
            sieve_block(self.low, high, &self.sieving, &mut block);
            self.block = block;
            self.low = high;
            self.idx = 0;
        }
    }
}

/// Backward enumeration of primes < start, in descending order.
/// Returns 0 once exhausted below 2.
pub struct ReversePrimeIter {
    high: u64,
    start: u64,
    sieving: Vec<u64>,
    block: Vec<u64>,
    idx: usize, // next index + 1 (0 = block consumed)
}

impl ReversePrimeIter {
    pub fn new(start: u64) -> Self {
        ReversePrimeIter {
            high: (start + 1) & !1,
            start,
            sieving: sieve_primes(isqrt(start.max(4)) + 1),
            block: vec![],
            idx: 0,
        }
    }

    pub fn prev_prime(&mut self) -> u64 {
        loop {
            while self.idx > 0 {
                let p = self.block[self.idx - 1];
                self.idx -= 1;
                if p < self.start {
                    return p;
                }
            }
            if self.high <= 2 {
                return 0;
            }
            let low = self.high.saturating_sub(BLOCK_SPAN) & !1;
            let mut block = std::mem::take(&mut self.block);
            sieve_block(low, self.high, &self.sieving, &mut block);
            self.block = block;
            self.high = low;
            self.idx = self.block.len();
        }
    }
}

#[test]
fn test_sieve_primes() {
    assert_eq!(sieve_primes(1), Vec::<u64>::new());
    assert_eq!(sieve_primes(2), vec![2]);
    assert_eq!(sieve_primes(30), vec![2, 3, 5, 7, 11, 13, 17, 19, 23, 29]);
    let ps = sieve_primes(611953);
    assert_eq!(ps.len(), 50000);
    assert_eq!(ps.last(), Some(&611953));
}

#[test]
fn test_generate_primes() {
    let ps = generate_primes(100);
    assert_eq!(ps[0], 0);
    assert_eq!(ps[1], 2);
    assert_eq!(ps[4], 7);
    assert_eq!(ps[25], 97);
    assert_eq!(ps.len(), 26);
}

#[test]
fn test_mu_lpf() {
    let (lpf, mu) = generate_mu_lpf(1000);
    assert_eq!(lpf[1], u64::MAX);
    assert_eq!(lpf[2], 2);
    assert_eq!(lpf[15], 3);
    assert_eq!(lpf[97], 97);
    assert_eq!(lpf[99], 3);
    assert_eq!(mu[1], 1);
    assert_eq!(mu[2], -1);
    assert_eq!(mu[6], 1);
    assert_eq!(mu[12], 0);
    assert_eq!(mu[30], -1);
    assert_eq!(mu[210], 1);
    assert_eq!(mu[49], 0);
    // Mertens function at 1000
    let m: i64 = (1..=1000).map(|i| mu[i] as i64).sum();
    assert_eq!(m, 2);
}

#[test]
fn test_prime_iter() {
    let mut it = PrimeIter::new(0, 1000);
    let mut got = vec![];
    loop {
        let p = it.next_prime();
        if p > 1000 {
            break;
        }
        got.push(p);
    }
    assert_eq!(got, sieve_primes(1000));

    // across block boundaries
    let mut it = PrimeIter::new(65520, 70000);
    assert_eq!(it.next_prime(), 65521);
    assert_eq!(it.next_prime(), 65537);

    // the hint is not a hard bound
    let mut it = PrimeIter::new(95, 100);
    assert_eq!(it.next_prime(), 97);
    assert_eq!(it.next_prime(), 101);
    assert_eq!(it.next_prime(), 103);
}

#[test]
fn test_reverse_prime_iter() {
    let mut rit = ReversePrimeIter::new(100);
    assert_eq!(rit.prev_prime(), 97);
    assert_eq!(rit.prev_prime(), 89);
    let mut rit = ReversePrimeIter::new(98);
    assert_eq!(rit.prev_prime(), 97);
    let mut rit = ReversePrimeIter::new(97);
    assert_eq!(rit.prev_prime(), 89);
    // across block boundaries, down to exhaustion
    let mut rit = ReversePrimeIter::new(65538);
    assert_eq!(rit.prev_prime(), 65537);
    assert_eq!(rit.prev_prime(), 65521);
    let mut rit = ReversePrimeIter::new(3);
    assert_eq!(rit.prev_prime(), 2);
    assert_eq!(rit.prev_prime(), 0);
    assert_eq!(rit.prev_prime(), 0);
}

#[test]
fn test_iterators_agree() {
    // forward and backward iterators see the same primes
    let mut it = PrimeIter::new(1_000_000, 1_100_000);
    let mut fwd = vec![];
    loop {
        let p = it.next_prime();
        if p > 1_100_000 {
            break;
        }
        fwd.push(p);
    }
    let mut rit = ReversePrimeIter::new(1_100_000);
    let mut bwd = vec![];
    loop {
        let p = rit.prev_prime();
        if p <= 1_000_000 {
            break;
        }
        bwd.push(p);
    }
    bwd.reverse();
    assert_eq!(fwd, bwd);
    // prime density near 10^6 is about 1/13.9
    assert!(fwd.len() > 6800 && fwd.len() < 7600);
}
