// Copyright 2024 Rémy Oudompheng. All rights reserved.
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Xavier Gourdon's variant of the Deléglise-Rivat algorithm:
//!
//!   pi(x) = Sigma + Phi0 + AC + D - B
//!
//! with y = alpha_y * x^(1/3) and the leaf tree truncated at
//! z = alpha_z * y instead of y. A larger truncation moves work
//! from the hard leaves (D) into the ordinary leaves (Phi0) and
//! the PrimePi-resolved leaves (AC), at the cost of larger mu/lpf
//! tables. B plays the role of P2, Sigma collects the closed-form
//! corrections.
//!
//! x_star = max(x^(1/4), x/y^2) marks where the hard prime leaves
//! die out: for p > x_star, every leaf x/(p*q) is below p^2 and
//! resolves through a PrimePi table.

use crate::arith::{in_between, tdiv, Counting};
use crate::easyleaves::ac;
use crate::hardleaves::d;
use crate::ordinary::{phi0, sigma};
use crate::p2::b;
use crate::params::{get_alpha_y, get_alpha_z};
use crate::phi::get_c;
use crate::pitable::PiTable;
use crate::primes::{generate_mu_lpf, generate_primes};
use crate::ri::ri_approx_f64;
use crate::{Error, Preferences, Verbosity};

const TINY_PRIMES: [i64; 9] = [0, 2, 3, 5, 7, 11, 13, 17, 19];

/// Derive Gourdon's tuning variables (y, z, k, x_star) from x.
pub(crate) fn variables<T: Counting>(x: T, prefs: &Preferences) -> (i64, i64, i64, i64) {
    let xf = x.as_f64();
    let alpha_y = get_alpha_y(xf, prefs);
    let x13 = x.cbrt64();
    let sqrtx = x.sqrt64();
    let y = in_between(x13.max(2), (alpha_y * x13 as f64) as i64, sqrtx.max(2));
    let k = get_c(y);
    // composite leaves m <= z with factors > p_k must not contain
    // a prime factor above y, which holds while z/y < p_(k+1)
    let alpha_z = get_alpha_z(prefs).min((TINY_PRIMES[(k + 1) as usize] - 1).max(1) as f64);
    let z_hi = y.saturating_mul(y).min((sqrtx - 1).max(y));
    let z = in_between(y, (alpha_z * y as f64) as i64, z_hi);
    let x_star = crate::arith::isqrt(sqrtx)
        .max(tdiv(tdiv(x, y), y).low64())
        .max(TINY_PRIMES[(k + 1) as usize]);
    (y, z, k, x_star)
}

fn pi_g<T: Counting>(
    x: T,
    prefs: &Preferences,
    tpool: Option<&rayon::ThreadPool>,
) -> Result<T, Error> {
    if x < T::from64(2) {
        return Ok(T::zero());
    }
    let xf = x.as_f64();
    let (y, z, k, x_star) = variables(x, prefs);
    if prefs.verbose(Verbosity::Info) {
        eprintln!();
        eprintln!("=== pi_gourdon(x) ===");
        eprintln!("pi(x) = Sigma + Phi0 + AC + D - B");
        eprintln!("x = {x}, y = {y}, z = {z}, k = {k}, x_star = {x_star}");
    }

    let bv: T = b(x, y, prefs, tpool)?;
    let primes = generate_primes(y);
    let (lpf, mu) = generate_mu_lpf(z);
    let pi = PiTable::new(y, tpool);

    let sig: T = sigma(x, y, prefs, tpool)?;
    let phi0v: T = phi0(x, y, z, k, &primes, prefs, tpool)?;
    let acv: T = ac(x, y, z, k, &primes, &pi, prefs, tpool)?;

    // D ~ Ri(x) + B - Sigma - Phi0 - AC, for progress reporting
    let rix = T::from_f64_approx(ri_approx_f64(xf));
    let d_approx = (rix + bv - sig - phi0v - acv).max(T::one());
    let dv: T = d(x, y, z, k, &primes, &lpf, &mu, &pi, d_approx, prefs, tpool)?;

    Ok(sig + phi0v + acv + dv - bv)
}

/// Count primes <= x with Gourdon's algorithm, the default for
/// large x.
pub fn pi_gourdon(
    x: i64,
    prefs: &Preferences,
    tpool: Option<&rayon::ThreadPool>,
) -> Result<i64, Error> {
    pi_g::<i64>(x, prefs, tpool)
}

/// 128-bit entry point for x beyond 2^63.
pub fn pi_gourdon_u128(
    x: u128,
    prefs: &Preferences,
    tpool: Option<&rayon::ThreadPool>,
) -> Result<u128, Error> {
    if x >= crate::MAX_X {
        return Err(Error::NumericOverflow);
    }
    pi_g::<i128>(x as i128, prefs, tpool).map(|v| v as u128)
}

/// Individual formulas of the Gourdon decomposition, exposed on
/// the command line for distributing very large computations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Formula {
    Ac,
    B,
    D,
    Phi0,
    Sigma,
}

pub fn formula<T: Counting>(
    x: T,
    f: Formula,
    prefs: &Preferences,
    tpool: Option<&rayon::ThreadPool>,
) -> Result<T, Error> {
    if x < T::from64(2) {
        return Ok(T::zero());
    }
    let (y, z, k, _) = variables(x, prefs);
    match f {
        Formula::Sigma => sigma(x, y, prefs, tpool),
        Formula::B => b(x, y, prefs, tpool),
        Formula::Phi0 => {
            let primes = generate_primes(y);
            phi0(x, y, z, k, &primes, prefs, tpool)
        }
        Formula::Ac => {
            let primes = generate_primes(y);
            let pi = PiTable::new(y, tpool);
            ac(x, y, z, k, &primes, &pi, prefs, tpool)
        }
        Formula::D => {
            let primes = generate_primes(y);
            let (lpf, mu) = generate_mu_lpf(z);
            let pi = PiTable::new(y, tpool);
            let d_approx = T::from_f64_approx(ri_approx_f64(x.as_f64())).max(T::one());
            d(x, y, z, k, &primes, &lpf, &mu, &pi, d_approx, prefs, tpool)
        }
    }
}

#[test]
fn test_formulas_sum_to_pi() {
    let prefs = Preferences::default();
    let x = 10_000_000i64;
    let sig: i64 = formula(x, Formula::Sigma, &prefs, None).unwrap();
    let bv: i64 = formula(x, Formula::B, &prefs, None).unwrap();
    let phi0v: i64 = formula(x, Formula::Phi0, &prefs, None).unwrap();
    let acv: i64 = formula(x, Formula::Ac, &prefs, None).unwrap();
    let dv: i64 = formula(x, Formula::D, &prefs, None).unwrap();
    assert_eq!(sig + phi0v + acv + dv - bv, 664579);
}

#[test]
fn test_pi_gourdon() {
    let prefs = Preferences::default();
    use crate::lehmer::{pi_primesieve, pi_simple};
    for x in [2, 10, 100, 1000, 10_000, 65_537, 100_000, 1 << 20] {
        assert_eq!(pi_gourdon(x, &prefs, None).unwrap(), pi_primesieve(x), "x={x}");
    }
    for x in [10_000_000, 99_999_989, 123_456_789] {
        assert_eq!(
            pi_gourdon(x, &prefs, None).unwrap(),
            pi_simple(x, &prefs, None),
            "x={x}"
        );
    }
}

#[test]
fn test_pi_gourdon_alpha_z() {
    // z = alpha_z * y only moves work between kernels
    let mut prefs = Preferences::default();
    for alpha_z in [1.0, 2.0, 4.0, 8.0] {
        prefs.alpha_z = Some(alpha_z);
        assert_eq!(pi_gourdon(50_000_000, &prefs, None).unwrap(), 3001134);
    }
    for alpha_y in [1.0, 3.0, 9.0] {
        prefs.alpha_y = Some(alpha_y);
        prefs.alpha_z = Some(2.0);
        assert_eq!(pi_gourdon(10_000_000, &prefs, None).unwrap(), 664579);
    }
}

#[test]
#[ignore = "takes minutes; run with --ignored"]
fn test_pi_gourdon_large() {
    let prefs = Preferences::default();
    let pool = rayon::ThreadPoolBuilder::new().build().unwrap();
    assert_eq!(
        pi_gourdon(10i64.pow(10), &prefs, Some(&pool)).unwrap(),
        455052511
    );
    assert_eq!(
        crate::deleglise::pi_deleglise_rivat(10i64.pow(10), &prefs, Some(&pool)).unwrap(),
        455052511
    );
    assert_eq!(
        pi_gourdon(10i64.pow(12), &prefs, Some(&pool)).unwrap(),
        37607912018
    );
    assert_eq!(
        pi_gourdon(10i64.pow(14), &prefs, Some(&pool)).unwrap(),
        3204941750802
    );
}

#[test]
fn test_pi_gourdon_128() {
    let prefs = Preferences::default();
    assert_eq!(pi_gourdon_u128(123_456_789, &prefs, None).unwrap(), 7027260);
    assert_eq!(
        pi_gourdon_u128(crate::MAX_X, &prefs, None),
        Err(Error::NumericOverflow)
    );
}
