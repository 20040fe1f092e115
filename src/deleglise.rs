// Copyright 2024 Rémy Oudompheng. All rights reserved.
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Deléglise-Rivat: pi(x) = S1 + S2 + pi(y) - 1 - P2 with
//! y = alpha * x^(1/3), where S2 is split by leaf kind:
//! S2 = S2_trivial + S2_easy + S2_hard. The split is exact for
//! every alpha in [1, x^(1/6)], which the tests exercise since it
//! probes all the array bounds.

use crate::arith::{fast_div, in_between, Counting};
use crate::easyleaves::{s2_easy, s2_trivial};
use crate::hardleaves::s2_hard;
use crate::p2::p2;
use crate::params::get_alpha_dr;
use crate::phi::get_c;
use crate::pitable::PiTable;
use crate::primes::{generate_mu_lpf, generate_primes};
use crate::{Error, Preferences, Verbosity};

fn pi_dr<T: Counting>(
    x: T,
    prefs: &Preferences,
    tpool: Option<&rayon::ThreadPool>,
) -> Result<T, Error> {
    if x < T::from64(2) {
        return Ok(T::zero());
    }
    let xf = x.as_f64();
    let alpha = get_alpha_dr(xf, prefs);
    let x13 = x.cbrt64();
    let sqrtx = x.sqrt64();
    let y = in_between(x13.max(2), (alpha * x13 as f64) as i64, sqrtx.max(2));
    let z = fast_div(x, y);
    let c = get_c(y);
    if prefs.verbose(Verbosity::Info) {
        eprintln!();
        eprintln!("=== pi_deleglise_rivat(x) ===");
        eprintln!("pi(x) = S1 + S2 + pi(y) - 1 - P2");
        eprintln!("x = {x}, y = {y}, z = {z}, c = {c}, alpha = {alpha:.2}");
    }

    let p2v: T = p2(x, y, prefs, tpool)?;
    let primes = generate_primes(y);
    let (lpf, mu) = generate_mu_lpf(y);
    let pi = PiTable::new(y, tpool);
    let pi_y = primes.len() as i64 - 1;

    let s1v: T = crate::ordinary::s1(x, y, c, &primes, prefs, tpool)?;
    let trivial: T = s2_trivial(x, y, c, &primes, &pi, prefs, tpool);
    let easy: T = s2_easy(x, y, c, &primes, &pi, prefs, tpool)?;

    // estimate of the remaining hard contribution, used only for
    // progress reporting and chunk sizing
    let rix = T::from_f64_approx(crate::ri::ri_approx_f64(xf));
    let s2_approx = (rix + T::one() + p2v - s1v - T::from64(pi_y) - trivial - easy)
        .max(T::one());
    let hard: T = s2_hard(x, y, c, &primes, &lpf, &mu, &pi, s2_approx, prefs, tpool)?;

    Ok(s1v + trivial + easy + hard + T::from64(pi_y) - T::one() - p2v)
}

/// Count primes <= x with the Deléglise-Rivat algorithm.
pub fn pi_deleglise_rivat(
    x: i64,
    prefs: &Preferences,
    tpool: Option<&rayon::ThreadPool>,
) -> Result<i64, Error> {
    pi_dr::<i64>(x, prefs, tpool)
}

/// 128-bit entry point for x beyond 2^63.
pub fn pi_deleglise_rivat_u128(
    x: u128,
    prefs: &Preferences,
    tpool: Option<&rayon::ThreadPool>,
) -> Result<u128, Error> {
    if x >= crate::MAX_X {
        return Err(Error::NumericOverflow);
    }
    pi_dr::<i128>(x as i128, prefs, tpool).map(|v| v as u128)
}

#[test]
fn test_pi_deleglise_rivat() {
    let prefs = Preferences::default();
    use crate::lehmer::{pi_primesieve, pi_simple};
    for x in [2, 10, 100, 1000, 10_000, 100_000, 1 << 20] {
        assert_eq!(
            pi_deleglise_rivat(x, &prefs, None).unwrap(),
            pi_primesieve(x),
            "x={x}"
        );
    }
    for x in [10_000_000, 99_999_989, 123_456_789] {
        assert_eq!(
            pi_deleglise_rivat(x, &prefs, None).unwrap(),
            pi_simple(x, &prefs, None),
            "x={x}"
        );
    }
}

#[test]
fn test_alpha_invariance() {
    // every legal alpha must give the same pi(x): this probes the
    // array sizing bounds
    use rand::Rng;
    let mut rng = rand::thread_rng();
    let mut prefs = Preferences::default();
    for _ in 0..3 {
        let x: i64 = rng.gen_range(1_000_000..3_000_000);
        let expected = crate::lehmer::pi_meissel(x, &Preferences::default(), None).unwrap();
        let max_alpha = crate::arith::iroot6(x);
        for alpha in 1..=max_alpha {
            prefs.alpha = Some(alpha as f64);
            assert_eq!(
                pi_deleglise_rivat(x, &prefs, None).unwrap(),
                expected,
                "x={x} alpha={alpha}"
            );
        }
    }
}

#[test]
fn test_pi_dr_128_matches_64() {
    let prefs = Preferences::default();
    for x in [100_000u128, 12_345_678] {
        assert_eq!(
            pi_deleglise_rivat_u128(x, &prefs, None).unwrap(),
            pi_deleglise_rivat(x as i64, &prefs, None).unwrap() as u128
        );
    }
}
