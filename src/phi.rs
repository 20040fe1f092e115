// Copyright 2024 Rémy Oudompheng. All rights reserved.
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Legendre's partial sieve function phi(x, a): the count of
//! integers <= x whose smallest prime factor exceeds the a-th
//! prime.
//!
//! phi(x, a) obeys phi(x, a) = phi(x, a-1) - phi(x / p_a, a-1).
//! For a <= 7 the values are read from precomputed tables in O(1)
//! (phi is periodic modulo the primorial 2*3*...*p_a). The general
//! case unrolls the recurrence over b in (c, a], switching to a
//! PrimePi lookup as soon as x / p_b falls below p_b^2, and caches
//! small subproblems keyed by (x, b).

use std::collections::HashMap;
use std::sync::OnceLock;

use rayon::prelude::*;

use crate::arith::{isqrt, Counting};
use crate::pitable::PiTable;
use crate::primes::generate_primes;
use crate::Preferences;

/// phi(x, a) is read from a table for a <= MAX_A.
pub const MAX_A: i64 = 7;

const TINY_PRIMES: [i64; 8] = [0, 2, 3, 5, 7, 11, 13, 17];
// primorials of the tiny primes and their totients
const PP: [i64; 8] = [1, 2, 6, 30, 210, 2310, 30030, 510510];
const TOTIENT: [i64; 8] = [1, 1, 2, 8, 48, 480, 5760, 92160];

struct PhiTiny {
    // tables[a][i] = phi(i, a) for i < PP[a]
    tables: Vec<Vec<u32>>,
}

static PHI_TINY: OnceLock<PhiTiny> = OnceLock::new();

fn phi_tiny_tables() -> &'static PhiTiny {
    PHI_TINY.get_or_init(|| {
        let mut tables = Vec::with_capacity(8);
        for a in 0..=7usize {
            let pp = PP[a] as usize;
            let mut t = vec![0u32; pp];
            for i in 1..pp {
                let coprime = TINY_PRIMES[1..=a].iter().all(|&p| i as i64 % p != 0);
                t[i] = t[i - 1] + coprime as u32;
            }
            tables.push(t);
        }
        PhiTiny { tables }
    })
}

/// phi(x, a) for a <= 7 in constant time.
#[inline]
pub fn phi_tiny<T: Counting>(x: T, a: i64) -> T {
    debug_assert!((0..=MAX_A).contains(&a));
    if x <= T::zero() {
        return T::zero();
    }
    let a = a as usize;
    let pp = PP[a];
    let q = x / T::from64(pp);
    let r = (x - q * T::from64(pp)).low64();
    q * T::from64(TOTIENT[a]) + T::from64(phi_tiny_tables().tables[a][r as usize] as i64)
}

/// Largest a <= 7 such that the a-th prime is <= y.
pub fn get_c(y: i64) -> i64 {
    let mut c = 0;
    while c < MAX_A && TINY_PRIMES[(c + 1) as usize] <= y {
        c += 1;
    }
    c
}

/// Memoization for phi(x, b) subproblems. Entries are only kept
/// for small x and b, with a per-level size cap as eviction.
pub struct PhiCache<'a> {
    primes: &'a [i64],
    pi: &'a PiTable,
    cache: Vec<HashMap<i64, i64>>,
}

const CACHE_A: usize = 100;
const CACHE_X: i64 = 1 << 32;
const CACHE_ENTRIES: usize = 1 << 16;

impl<'a> PhiCache<'a> {
    pub fn new(primes: &'a [i64], pi: &'a PiTable) -> Self {
        PhiCache {
            primes,
            pi,
            cache: vec![],
        }
    }

    // phi(x, a) = pi(x) - a + 1 when x fits in the pi table and
    // p_a >= sqrt(x): every survivor except 1 is then a prime.
    #[inline]
    fn is_pix(&self, x: i64, a: i64) -> bool {
        x <= self.pi.limit() && a >= self.pi.get(isqrt(x))
    }

    pub fn phi(&mut self, x: i64, a: i64) -> i64 {
        if x < 1 {
            return 0;
        }
        if a <= MAX_A {
            return phi_tiny(x, a.max(0));
        }
        if self.is_pix(x, a) {
            return self.pi.get(x) - a + 1;
        }
        let cached = a < CACHE_A as i64 && x <= CACHE_X;
        if cached {
            if let Some(slot) = self.cache.get((a - MAX_A) as usize) {
                if let Some(&v) = slot.get(&x) {
                    return v;
                }
            }
        }
        let c = get_c(isqrt(x)).min(a);
        let mut sum = phi_tiny(x, c);
        let mut b = c + 1;
        while b <= a {
            let xp = x / self.primes[b as usize];
            if xp < self.primes[b as usize] {
                // all remaining terms are phi(xp, b-1) = 1
                sum -= a - b + 1;
                b = a + 1;
                break;
            }
            if self.is_pix(xp, b - 1) {
                break;
            }
            sum -= self.phi(xp, b - 1);
            b += 1;
        }
        // collapsed tail: phi(x/p_b, b-1) = pi(x/p_b) - b + 2
        for b in b..=a {
            let xp = x / self.primes[b as usize];
            if xp < self.primes[b as usize] {
                sum -= a - b + 1;
                break;
            }
            sum -= self.pi.get(xp) - b + 2;
        }
        if cached {
            let idx = (a - MAX_A) as usize;
            if self.cache.len() <= idx {
                self.cache.resize_with(idx + 1, HashMap::new);
            }
            if self.cache[idx].len() < CACHE_ENTRIES {
                self.cache[idx].insert(x, sum);
            }
        }
        sum
    }
}

/// phi(x, a) with a parallel top level.
pub fn phi(x: i64, a: i64, prefs: &Preferences, tpool: Option<&rayon::ThreadPool>) -> i64 {
    if x < 1 {
        return 0;
    }
    if a < 1 {
        return x;
    }
    if a <= MAX_A {
        return phi_tiny(x, a);
    }
    let sqrtx = isqrt(x);
    let pi = PiTable::new(sqrtx, tpool);
    let pi_sqrtx = pi.get(sqrtx);
    if a >= pi_sqrtx {
        // phi(x, a) no longer depends on a beyond pi(sqrt(x)),
        // except for the trailing "- a + 1".
        if a > pi_sqrtx {
            return phi(x, pi_sqrtx, prefs, tpool) - (a - pi_sqrtx);
        }
    }
    let primes = generate_primes(sqrtx);
    debug_assert!((a as usize) < primes.len());
    let c = get_c(sqrtx).min(a);
    let mut sum = phi_tiny(x, c);

    let terms: Vec<i64> = (c + 1..=a).collect();
    let term = |b: i64, cache: &mut PhiCache| -> i64 { cache.phi(x / primes[b as usize], b - 1) };
    let partials: Vec<i64> = if let Some(pool) = tpool {
        let nchunks = (prefs.num_threads() * 8).max(1);
        let chunk_size = (terms.len() + nchunks - 1) / nchunks.max(1);
        pool.install(|| {
            terms
                .par_chunks(chunk_size.max(1))
                .map(|chunk| {
                    let mut cache = PhiCache::new(&primes, &pi);
                    chunk.iter().map(|&b| term(b, &mut cache)).sum()
                })
                .collect()
        })
    } else {
        let mut cache = PhiCache::new(&primes, &pi);
        vec![terms.iter().map(|&b| term(b, &mut cache)).sum()]
    };
    // fold in thread-id order
    for p in partials {
        sum -= p;
    }
    sum
}

#[cfg(test)]
fn phi_bruteforce(x: i64, a: i64) -> i64 {
    let primes = generate_primes(100_000);
    (1..=x)
        .filter(|&n| {
            (1..=a as usize).all(|b| b >= primes.len() || n % primes[b] != 0)
        })
        .count() as i64
}

#[test]
fn test_phi_tiny() {
    for a in 0..=MAX_A {
        for x in [0i64, 1, 2, 10, 100, 997, 2310, 4096] {
            assert_eq!(phi_tiny(x, a), phi_bruteforce(x, a), "x={x} a={a}");
        }
    }
    assert_eq!(phi_tiny(100i64, 4), 22);
    // one full period: phi(510510, 7) = totient(510510)
    assert_eq!(phi_tiny(510510i64, 7), 92160);
    assert_eq!(phi_tiny(2 * 510510 + 100i64, 7), 2 * 92160 + phi_tiny(100i64, 7));
}

#[test]
fn test_get_c() {
    assert_eq!(get_c(1), 0);
    assert_eq!(get_c(2), 1);
    assert_eq!(get_c(3), 2);
    assert_eq!(get_c(16), 6);
    assert_eq!(get_c(17), 7);
    assert_eq!(get_c(1 << 30), 7);
}

#[test]
fn test_phi() {
    let prefs = Preferences::default();
    assert_eq!(phi(100, 4, &prefs, None), 22);
    // 1 and the 157 primes in (31, 1000] survive the first 11 primes
    assert_eq!(phi(1000, 11, &prefs, None), 158);
    assert_eq!(phi(10_000, 25, &prefs, None), 1205);
    // a >= pi(sqrt(x)): only 1 and primes > p_a survive
    assert_eq!(phi(100, 25, &prefs, None), 1);
    assert_eq!(phi(100, 10, &prefs, None), 16);
    for a in 1..20 {
        assert_eq!(phi(3000, a, &prefs, None), phi_bruteforce(3000, a), "a={a}");
    }
}
