// Copyright 2024 Rémy Oudompheng. All rights reserved.
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Lagarias-Miller-Odlyzko, the simplest sieve based algorithm:
//! pi(x) = S1 + S2 + pi(y) - 1 - P2 with y = alpha * x^(1/3).
//!
//! S2 is computed in one pass over a single-threaded segmented
//! sieve, with every special leaf resolved by a counting query; no
//! easy/hard split. This is the reference implementation the
//! faster drivers are checked against.

use crate::arith::{in_between, isqrt};
use crate::p2::p2;
use crate::params::get_alpha_lmo;
use crate::phi::get_c;
use crate::pitable::PiTable;
use crate::primes::{generate_mu_lpf, generate_primes};
use crate::sieve::{get_segment_size, Sieve};
use crate::{Error, Preferences, Verbosity};

/// Contribution of the special leaves, sequential.
fn s2(
    x: i64,
    y: i64,
    c: i64,
    primes: &[i64],
    lpf: &[u64],
    mu: &[i8],
    pi: &PiTable,
) -> i64 {
    let limit = x / y + 1;
    let segment_size = get_segment_size(isqrt(limit));
    let mut sieve = Sieve::new(primes.len());
    let mut phi = vec![0i64; primes.len()];
    let pi_sqrty = pi.get(isqrt(y));
    let pi_y = pi.get(y);
    let mut s2 = 0i64;

    let mut low = 0i64;
    while low < limit {
        let high = (low + segment_size).min(limit);
        let low1 = low.max(1);
        sieve.pre_sieve(primes, c, low as u64, high as u64);

        'next_segment: {
            // special leaves composed of a prime and a square free
            // number: low <= x / (primes[b] * m) < high
            for b in (c + 1) as usize..=pi_sqrty as usize {
                let prime = primes[b];
                let xp = x / prime;
                let max_m = (xp / low1).min(y);
                if prime >= max_m {
                    break 'next_segment;
                }
                let min_m = (xp / high).max(y / prime);
                for m in (min_m + 1..=max_m).rev() {
                    if mu[m as usize] != 0 && prime < lpf[m as usize] as i64 {
                        let stop = xp / m - low;
                        let phi_xpm = phi[b] + sieve.count(stop);
                        s2 -= mu[m as usize] as i64 * phi_xpm;
                    }
                }
                phi[b] += sieve.total_count();
                sieve.cross_off_count(prime, b);
            }

            // special leaves composed of two primes:
            // low <= x / (primes[b] * primes[l]) < high
            for b in (pi_sqrty + 1) as usize..pi_y as usize {
                let prime = primes[b];
                let xp = x / prime;
                let mut l = pi.get((xp / low1).min(y)) as usize;
                let min_m = (xp / high).max(prime);
                if prime >= primes[l] {
                    break 'next_segment;
                }
                while primes[l] > min_m {
                    let stop = xp / primes[l] - low;
                    s2 += phi[b] + sieve.count(stop);
                    l -= 1;
                }
                phi[b] += sieve.total_count();
                sieve.cross_off_count(prime, b);
            }
        }
        low = high;
    }
    s2
}

/// Count primes <= x with the Lagarias-Miller-Odlyzko algorithm.
/// Run time O(x^(2/3) / log x), memory O(x^(1/3) (log x)^2).
pub fn pi_lmo(
    x: i64,
    prefs: &Preferences,
    tpool: Option<&rayon::ThreadPool>,
) -> Result<i64, Error> {
    if x < 2 {
        return Ok(0);
    }
    let alpha = get_alpha_lmo(x as f64);
    let x13 = crate::arith::icbrt(x);
    let y = in_between(x13.max(2), (alpha * x13 as f64) as i64, isqrt(x).max(2));
    let z = x / y;
    let c = get_c(y);
    if prefs.verbose(Verbosity::Info) {
        eprintln!();
        eprintln!("=== pi_lmo(x) ===");
        eprintln!("pi(x) = S1 + S2 + pi(y) - 1 - P2");
        eprintln!("x = {x}, y = {y}, z = {z}, c = {c}");
    }

    let p2: i64 = p2(x, y, prefs, tpool)?;
    let primes = generate_primes(y);
    let (lpf, mu) = generate_mu_lpf(y);
    let pi = PiTable::new(y, tpool);
    let pi_y = primes.len() as i64 - 1;

    let s1: i64 = crate::ordinary::s1(x, y, c, &primes, prefs, tpool)?;
    let s2 = s2(x, y, c, &primes, &lpf, &mu, &pi);

    Ok(s1 + s2 + pi_y - 1 - p2)
}

#[test]
fn test_pi_lmo() {
    let prefs = Preferences::default();
    use crate::lehmer::{pi_primesieve, pi_simple};
    for x in [2, 10, 100, 1000, 65536, 100_000] {
        assert_eq!(pi_lmo(x, &prefs, None).unwrap(), pi_primesieve(x), "x={x}");
    }
    for x in [1_000_000, 9_999_991, 10_000_000, 12_345_678] {
        assert_eq!(
            pi_lmo(x, &prefs, None).unwrap(),
            pi_simple(x, &prefs, None),
            "x={x}"
        );
    }
}

#[test]
fn test_pi_lmo_medium() {
    let prefs = Preferences::default();
    assert_eq!(pi_lmo(100_000_000, &prefs, None).unwrap(), 5761455);
    assert_eq!(pi_lmo(1_000_000_000, &prefs, None).unwrap(), 50847534);
}
