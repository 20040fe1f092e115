// Copyright 2024 Rémy Oudompheng. All rights reserved.
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! The classical prime counting formulas of Legendre, Meissel and
//! Lehmer. These are mostly superseded by the sieve based
//! algorithms but remain invaluable as independent references:
//! every driver must produce the same pi(x).
//!
//! Legendre: pi(x) = phi(x, a) + a - 1 with a = pi(x^(1/2))
//! Meissel:  pi(x) = phi(x, a) + a - 1 - P2 with a = pi(x^(1/3))
//! Lehmer:   pi(x) = phi(x, a) + a - 1 - P2 - P3, a = pi(x^(1/4))

use std::time::Instant;

use crate::arith::{icbrt, iroot4, isqrt};
use crate::p2::p2;
use crate::phi::phi;
use crate::pitable::PiTable;
use crate::primes::{generate_primes, PrimeIter};
use crate::{Error, Preferences, Verbosity};

/// Count primes <= x by pure sieving; only reasonable for small x
/// but entirely independent from the combinatorial method.
pub fn pi_primesieve(x: i64) -> i64 {
    if x < 2 {
        return 0;
    }
    let mut it = PrimeIter::new(1, x as u64);
    let mut count = 0;
    loop {
        if it.next_prime() > x as u64 {
            return count;
        }
        count += 1;
    }
}

/// Internal pi(x) used to initialize other algorithms; Legendre's
/// formula without any banner output.
pub fn pi_simple(x: i64, prefs: &Preferences, tpool: Option<&rayon::ThreadPool>) -> i64 {
    if x < 2 {
        return 0;
    }
    let a = pi_simple(isqrt(x), prefs, tpool);
    phi(x, a, prefs, tpool) + a - 1
}

pub fn pi_legendre(
    x: i64,
    prefs: &Preferences,
    tpool: Option<&rayon::ThreadPool>,
) -> Result<i64, Error> {
    if x < 2 {
        return Ok(0);
    }
    let a = pi_simple(isqrt(x), prefs, tpool);
    if prefs.verbose(Verbosity::Info) {
        eprintln!();
        eprintln!("=== pi_legendre(x) ===");
        eprintln!("pi(x) = phi(x, a) + a - 1");
        eprintln!("x = {x}, a = {a}");
    }
    Ok(phi(x, a, prefs, tpool) + a - 1)
}

pub fn pi_meissel(
    x: i64,
    prefs: &Preferences,
    tpool: Option<&rayon::ThreadPool>,
) -> Result<i64, Error> {
    if x < 2 {
        return Ok(0);
    }
    let y = icbrt(x);
    let a = pi_simple(y, prefs, tpool);
    if prefs.verbose(Verbosity::Info) {
        eprintln!();
        eprintln!("=== pi_meissel(x) ===");
        eprintln!("pi(x) = phi(x, a) + a - 1 - P2");
        eprintln!("x = {x}, y = {y}, a = {a}");
    }
    let phi_xa = phi(x, a, prefs, tpool);
    let p2: i64 = p2(x, y, prefs, tpool)?;
    Ok(phi_xa + a - 1 - p2)
}

/// P3(x, a) counts the numbers <= x with exactly 3 prime factors,
/// each exceeding the a-th prime.
fn p3(x: i64, a: i64, prefs: &Preferences, tpool: Option<&rayon::ThreadPool>) -> i64 {
    if prefs.verbose(Verbosity::Info) {
        eprintln!();
        eprintln!("=== P3(x, a) ===");
    }
    let time = Instant::now();
    let sqrtx = isqrt(x);
    let pi = PiTable::new(sqrtx, tpool);
    let primes = generate_primes(sqrtx);
    let b = pi.get(icbrt(x));
    let mut sum = 0i64;
    for i in (a + 1)..=b {
        let p = primes[i as usize];
        let max_q = isqrt(x / p);
        let max_j = pi.get(max_q);
        for j in i..=max_j {
            let q = primes[j as usize];
            // primes r with q <= r <= x/(p*q)
            sum += pi.get(x / (p * q)) - (j - 1);
        }
    }
    if prefs.verbose(Verbosity::Info) {
        eprintln!("P3 = {sum} ({:.3}s)", time.elapsed().as_secs_f64());
    }
    sum
}

pub fn pi_lehmer(
    x: i64,
    prefs: &Preferences,
    tpool: Option<&rayon::ThreadPool>,
) -> Result<i64, Error> {
    if x < 2 {
        return Ok(0);
    }
    let y = iroot4(x);
    let a = pi_simple(y, prefs, tpool);
    if prefs.verbose(Verbosity::Info) {
        eprintln!();
        eprintln!("=== pi_lehmer(x) ===");
        eprintln!("pi(x) = phi(x, a) + a - 1 - P2 - P3");
        eprintln!("x = {x}, y = {y}, a = {a}");
    }
    let phi_xa = phi(x, a, prefs, tpool);
    let p2: i64 = p2(x, y, prefs, tpool)?;
    let p3 = p3(x, a, prefs, tpool);
    Ok(phi_xa + a - 1 - p2 - p3)
}

#[test]
fn test_pi_primesieve() {
    assert_eq!(pi_primesieve(1), 0);
    assert_eq!(pi_primesieve(2), 1);
    assert_eq!(pi_primesieve(10), 4);
    assert_eq!(pi_primesieve(100), 25);
    assert_eq!(pi_primesieve(1_000_000), 78498);
}

#[test]
fn test_pi_simple() {
    let prefs = Preferences::default();
    assert_eq!(pi_simple(0, &prefs, None), 0);
    assert_eq!(pi_simple(2, &prefs, None), 1);
    assert_eq!(pi_simple(100, &prefs, None), 25);
    assert_eq!(pi_simple(10_000, &prefs, None), 1229);
    assert_eq!(pi_simple(1_000_000, &prefs, None), 78498);
    assert_eq!(pi_simple(10_000_000, &prefs, None), 664579);
}

#[test]
fn test_pi_legendre() {
    let prefs = Preferences::default();
    assert_eq!(pi_legendre(10, &prefs, None).unwrap(), 4);
    assert_eq!(pi_legendre(100_000, &prefs, None).unwrap(), 9592);
    assert_eq!(pi_legendre(10_000_000, &prefs, None).unwrap(), 664579);
}

#[test]
fn test_pi_meissel_lehmer() {
    let prefs = Preferences::default();
    for x in [2, 100, 65536, 100_000, 1 << 24, 10_000_000] {
        let expected = pi_simple(x, &prefs, None);
        assert_eq!(pi_meissel(x, &prefs, None).unwrap(), expected, "meissel {x}");
        assert_eq!(pi_lehmer(x, &prefs, None).unwrap(), expected, "lehmer {x}");
    }
}
