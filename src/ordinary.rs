// Copyright 2024 Rémy Oudompheng. All rights reserved.
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Ordinary leaves and closed-form terms.
//!
//! S1 (Deléglise-Rivat) and Phi0 (Gourdon) sum
//! mu(n) * phi(x / n, c) over the squarefree n below the
//! truncation (y resp. z) whose prime factors all lie in
//! (p_c, y]. The squarefree numbers are enumerated by a recursive
//! descent over products of increasing primes, following
//! Douglas Staple, "The Combinatorial Algorithm For Computing
//! pi(x)", arXiv:1503.01839, section 2.2; the outer level is
//! parallel over the first prime factor.
//!
//! Sigma collects the closed-form correction terms of the Gourdon
//! driver: pi(y) - 1 plus the triangular P2 corrections.

use std::time::Instant;

use rayon::prelude::*;

use crate::arith::Counting;
use crate::backup::{self, SumBackup};
use crate::lehmer::pi_simple;
use crate::phi::phi_tiny;
use crate::{Error, Preferences, Verbosity};

// Children of the node n = primes[b] * ... : multiply by one more
// prime above b while the product stays below the truncation.
fn ordinary_descent<T: Counting>(
    x: T,
    trunc: i64,
    b: usize,
    c: i64,
    n: i64,
    sign: i64,
    primes: &[i64],
) -> T {
    let mut sum = T::zero();
    for b2 in b + 1..primes.len() {
        if primes[b2] > trunc / n {
            break;
        }
        let next = n * primes[b2];
        sum += T::from64(sign) * phi_tiny(x / T::from64(next), c);
        sum += ordinary_descent(x, trunc, b2, c, next, -sign, primes);
    }
    sum
}

fn ordinary_leaves<T: Counting>(
    x: T,
    trunc: i64,
    c: i64,
    primes: &[i64],
    prefs: &Preferences,
    tpool: Option<&rayon::ThreadPool>,
) -> T {
    let mut sum = phi_tiny(x, c);
    let first_b = (c + 1) as usize;
    let term = |b: usize| -> T {
        let p = primes[b];
        let mut s = -phi_tiny(x / T::from64(p), c);
        if p <= trunc {
            s += ordinary_descent(x, trunc, b, c, p, 1, primes);
        }
        s
    };
    let partials: Vec<T> = match tpool {
        Some(pool) => {
            let bs: Vec<usize> = (first_b..primes.len()).collect();
            let chunk = (bs.len() / (prefs.num_threads() * 8).max(1)).max(1);
            pool.install(|| {
                bs.par_chunks(chunk)
                    .map(|ch| ch.iter().map(|&b| term(b)).fold(T::zero(), |a, v| a + v))
                    .collect()
            })
        }
        None => vec![(first_b..primes.len())
            .map(term)
            .fold(T::zero(), |a, v| a + v)],
    };
    for p in partials {
        sum += p;
    }
    sum
}

/// Ordinary leaves of Deléglise-Rivat: squarefree n <= y.
pub fn s1<T: Counting>(
    x: T,
    y: i64,
    c: i64,
    primes: &[i64],
    prefs: &Preferences,
    tpool: Option<&rayon::ThreadPool>,
) -> Result<T, Error> {
    if prefs.verbose(Verbosity::Info) {
        eprintln!();
        eprintln!("=== S1(x, y) ===");
        eprintln!("Computation of the ordinary leaves");
    }
    let time = Instant::now();
    let stamp = (x.to_string(), y, 0i64, c);
    if let Some(sum) = resume_sum::<T>(prefs, "S1", &stamp)? {
        return Ok(sum);
    }
    let s = ordinary_leaves(x, y, c, primes, prefs, tpool);
    store_sum(prefs, "S1", &stamp, &s.to_string(), time.elapsed().as_secs_f64());
    if prefs.verbose(Verbosity::Info) {
        eprintln!("S1 = {s} ({:.3}s)", time.elapsed().as_secs_f64());
    }
    Ok(s)
}

/// Ordinary leaves of Gourdon: squarefree n <= z with prime
/// factors <= y.
pub fn phi0<T: Counting>(
    x: T,
    y: i64,
    z: i64,
    k: i64,
    primes: &[i64],
    prefs: &Preferences,
    tpool: Option<&rayon::ThreadPool>,
) -> Result<T, Error> {
    if prefs.verbose(Verbosity::Info) {
        eprintln!();
        eprintln!("=== Phi0(x, y) ===");
        eprintln!("Computation of the ordinary leaves");
    }
    let time = Instant::now();
    let stamp = (x.to_string(), y, z, k);
    if let Some(sum) = resume_sum::<T>(prefs, "Phi0", &stamp)? {
        return Ok(sum);
    }
    let s = ordinary_leaves(x, z, k, primes, prefs, tpool);
    store_sum(prefs, "Phi0", &stamp, &s.to_string(), time.elapsed().as_secs_f64());
    if prefs.verbose(Verbosity::Info) {
        eprintln!("Phi0 = {s} ({:.3}s)", time.elapsed().as_secs_f64());
    }
    Ok(s)
}

/// Closed-form terms of the Gourdon driver:
/// a - 1 - (a-2)(a+1)/2 + (b-2)(b+1)/2, a = pi(y), b = pi(sqrt(x)).
pub fn sigma<T: Counting>(
    x: T,
    y: i64,
    prefs: &Preferences,
    tpool: Option<&rayon::ThreadPool>,
) -> Result<T, Error> {
    if prefs.verbose(Verbosity::Info) {
        eprintln!();
        eprintln!("=== Sigma(x, y) ===");
    }
    let time = Instant::now();
    let a = T::from64(pi_simple(y, prefs, tpool));
    let b = T::from64(pi_simple(x.sqrt64(), prefs, tpool));
    let two = T::from64(2);
    let tri = |n: T| -> Option<T> { (n - two).checked_mul(&(n + T::one())).map(|v| v / two) };
    let s = match (tri(a), tri(b)) {
        (Some(ta), Some(tb)) => a - T::one() - ta + tb,
        _ => return Err(Error::NumericOverflow),
    };
    if prefs.verbose(Verbosity::Info) {
        eprintln!("Sigma = {s} ({:.3}s)", time.elapsed().as_secs_f64());
    }
    Ok(s)
}

fn resume_sum<T: Counting>(
    prefs: &Preferences,
    name: &str,
    stamp: &(String, i64, i64, i64),
) -> Result<Option<T>, Error> {
    if prefs.backup_file.is_none() {
        return Ok(None);
    }
    let file = backup::load(prefs)?;
    let section = match name {
        "S1" => file.s1,
        _ => file.phi0,
    };
    if let Some(sec) = section {
        if (&sec.x, sec.y, sec.z, sec.k) == (&stamp.0, stamp.1, stamp.2, stamp.3) {
            if let Some(sum) = sec.sum.parse::<i128>().ok().and_then(T::from_i128) {
                if prefs.verbose(Verbosity::Info) {
                    eprintln!("Resuming {name}");
                }
                return Ok(Some(sum));
            }
        }
    }
    Ok(None)
}

fn store_sum(
    prefs: &Preferences,
    name: &str,
    stamp: &(String, i64, i64, i64),
    sum: &str,
    seconds: f64,
) {
    if prefs.backup_file.is_none() {
        return;
    }
    let mut file = backup::load(prefs).unwrap_or_default();
    let sec = SumBackup {
        x: stamp.0.clone(),
        y: stamp.1,
        z: stamp.2,
        k: stamp.3,
        sum: sum.to_string(),
        seconds,
    };
    match name {
        "S1" => file.s1 = Some(sec),
        _ => file.phi0 = Some(sec),
    }
    backup::store(prefs, &file);
}

// S1 by definition: sum of mu(n) * phi(x/n, c) over squarefree
// n <= trunc with lpf(n) > p_c and prime factors <= y.
#[cfg(test)]
fn ordinary_bruteforce(x: i64, y: i64, trunc: i64, c: i64) -> i64 {
    use crate::primes::generate_mu_lpf;
    let (lpf, mu) = generate_mu_lpf(trunc);
    let primes = crate::primes::generate_primes(y);
    let pc = primes[c as usize];
    let gpf = |mut n: i64| -> i64 {
        let mut g = 1;
        while n > 1 {
            g = lpf[n as usize] as i64;
            n /= g;
        }
        g
    };
    let mut sum = 0i64;
    for n in 1..=trunc {
        if mu[n as usize] != 0 && (n == 1 || lpf[n as usize] > pc as u64) && gpf(n) <= y {
            sum += mu[n as usize] as i64 * phi_tiny(x / n, c);
        }
    }
    sum
}

#[test]
fn test_s1_vs_bruteforce() {
    let prefs = Preferences::default();
    for (x, y) in [(10_000i64, 40i64), (100_000, 100), (654_321, 87)] {
        let c = crate::phi::get_c(y);
        let primes = crate::primes::generate_primes(y);
        let s: i64 = s1(x, y, c, &primes, &prefs, None).unwrap();
        assert_eq!(s, ordinary_bruteforce(x, y, y, c), "x={x} y={y}");
    }
}

#[test]
fn test_phi0_vs_bruteforce() {
    let prefs = Preferences::default();
    for (x, y, z) in [(100_000i64, 60i64, 90i64), (654_321, 87, 130), (100_000, 50, 50)] {
        let k = crate::phi::get_c(y);
        let primes = crate::primes::generate_primes(y);
        let s: i64 = phi0(x, y, z, k, &primes, &prefs, None).unwrap();
        assert_eq!(s, ordinary_bruteforce(x, y, z, k), "x={x} y={y} z={z}");
    }
}

#[test]
fn test_sigma() {
    let prefs = Preferences::default();
    // a = pi(100) = 25, b = pi(1000) = 168
    let s: i64 = sigma(1_000_000i64, 100, &prefs, None).unwrap();
    assert_eq!(s, 25 - 1 - (23 * 26) / 2 + (166 * 169) / 2);
}
