// Copyright 2024 Rémy Oudompheng. All rights reserved.
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Easy special leaves: the ones whose phi value is a PrimePi
//! lookup instead of a sieve count.
//!
//! A prime leaf (q, b) has value phi(x/(q p_b), b-1). Whenever
//! u = x/(q p_b) < p_b^2, every survivor of the first b-1 primes
//! below u is 1 or a prime, so phi(u, b-1) = pi(u) - b + 2; the
//! sub-case u < p_b has phi = 1 ("trivial") and is counted in
//! closed form as a difference of PrimePi values.
//!
//! Deléglise-Rivat (S2_trivial / S2_easy) restricts lookups to
//! u <= y, served by PiTable. Gourdon's AC formula also takes
//! u up to x^(1/2): the A part walks a SegmentedPiTable window by
//! window for y < u <= x^(1/2), the C part is the u <= y lookup
//! with truncation z. What is not easy here is hard and belongs to
//! hardleaves.rs; the split is exact, both sides use the same
//! min(p_b^2, cap) threshold.

use std::time::Instant;

use rayon::prelude::*;

use crate::arith::{div_clamp, fast_div, isqrt, tdiv, Counting};
use crate::backup::{self, SumBackup};
use crate::pitable::{PiTable, SegmentedPiTable};
use crate::{Error, Preferences, Verbosity};

// Parallel fold of f over a range of prime indexes, deterministic:
// partial sums are combined in chunk order.
fn par_sum_over_b<T, F>(
    first_b: usize,
    last_b: usize,
    tpool: Option<&rayon::ThreadPool>,
    threads: usize,
    f: F,
) -> T
where
    T: Counting,
    F: Fn(usize) -> T + Sync,
{
    if first_b >= last_b {
        return T::zero();
    }
    match tpool {
        Some(pool) => {
            let bs: Vec<usize> = (first_b..last_b).collect();
            let chunk = (bs.len() / (threads * 8).max(1)).max(1);
            let partials: Vec<T> = pool.install(|| {
                bs.par_chunks(chunk)
                    .map(|ch| {
                        ch.iter()
                            .map(|&b| f(b))
                            .fold(T::zero(), |acc, v| acc + v)
                    })
                    .collect()
            });
            partials.into_iter().fold(T::zero(), |acc, v| acc + v)
        }
        None => (first_b..last_b).map(f).fold(T::zero(), |acc, v| acc + v),
    }
}

#[inline]
fn psquare_capped(p: i64, cap: i64) -> i64 {
    // min(p^2, cap) without overflowing
    if p < (1 << 31) {
        (p * p).min(cap)
    } else {
        cap
    }
}

/// Trivial leaves: q in (max(x/p^2, p, trunc/p), y], each with
/// phi = 1, summed as PrimePi differences.
fn trivial_count<T: Counting>(
    x: T,
    y: i64,
    trunc: i64,
    first_b: usize,
    primes: &[i64],
    pi: &PiTable,
    tpool: Option<&rayon::ThreadPool>,
    threads: usize,
) -> T {
    let pi_y = pi.get(y);
    par_sum_over_b(first_b, primes.len(), tpool, threads, |b| {
        let p = primes[b];
        if p >= y {
            return T::zero();
        }
        let xp = tdiv(x, p);
        let lo = div_clamp(xp, p, y).max(p).max(trunc / p);
        if lo < y {
            T::from64(pi_y - pi.get(lo))
        } else {
            T::zero()
        }
    })
}

/// Easy leaves with u <= y: q in (max(x/(p*t_b), p, trunc/p),
/// min(x/p^2, y)] with t_b = min(p^2, y+1), each contributing
/// pi(u) - b + 2.
fn easy_formula_sum<T: Counting>(
    x: T,
    y: i64,
    trunc: i64,
    first_b: usize,
    primes: &[i64],
    pi: &PiTable,
    tpool: Option<&rayon::ThreadPool>,
    threads: usize,
) -> T {
    par_sum_over_b(first_b, primes.len(), tpool, threads, |b| {
        let p = primes[b];
        if p >= y {
            return T::zero();
        }
        let xp = tdiv(x, p);
        let fx = div_clamp(xp, p, y); // min(x / p^2, y)
        if fx <= p {
            return T::zero();
        }
        let t_b = psquare_capped(p, y + 1);
        let q_hi = fx;
        let q_lo = div_clamp(xp, t_b, y).max(p).max(trunc / p);
        let mut l = pi.get(q_hi) as usize;
        let mut sum = T::zero();
        while primes[l] > q_lo {
            let u = fast_div(xp, primes[l]);
            sum += T::from64(pi.get(u) - b as i64 + 2);
            l -= 1;
        }
        sum
    })
}

/// Gourdon's A: easy leaves with y < u <= x^(1/2), resolved
/// against a sliding PrimePi table.
fn a_sum<T: Counting>(
    x: T,
    y: i64,
    z: i64,
    primes: &[i64],
    pi: &PiTable,
    tpool: Option<&rayon::ThreadPool>,
    threads: usize,
) -> T {
    let sqrtx = x.sqrt64();
    if sqrtx <= y {
        return T::zero();
    }
    let pi_sqrty = pi.get(isqrt(y)) as usize;
    let mut total = T::zero();
    // window the PrimePi lookups: a full table up to x^(1/2)
    // would need x^(1/2)/8 bytes
    let mut seg = SegmentedPiTable::new(sqrtx, y.max(1 << 21), tpool);
    loop {
        let (wl, wh) = (seg.low(), seg.high());
        if wh > y + 1 {
            let window = &seg;
            let u_lo0 = wl.max(y + 1);
            // u < wh and q <= y force p > x/(y*wh); u >= u_lo0 and
            // q > p force p^2 < x/u_lo0
            let b_lo = pi.get(fast_div(tdiv(x, y), wh).min(y)) as usize;
            let b_hi = (pi.get(isqrt(fast_div(x, u_lo0)).min(y)) as usize + 1).min(primes.len());
            total += par_sum_over_b(b_lo.max(pi_sqrty) + 1, b_hi, tpool, threads, |b| {
                let p = primes[b];
                if p >= y {
                    return T::zero();
                }
                let xp = tdiv(x, p);
                let u_lo = wl.max(y + 1);
                let u_cap = psquare_capped(p, sqrtx + 1).min(wh);
                if u_cap <= u_lo {
                    return T::zero();
                }
                let q_hi = fast_div(xp, u_lo).min(y);
                let q_lo = fast_div(xp, u_cap).max(p).max(z / p);
                let mut l = pi.get(q_hi) as usize;
                let mut sum = T::zero();
                while primes[l] > q_lo {
                    let u = fast_div(xp, primes[l]);
                    sum += T::from64(window.get(u) - b as i64 + 2);
                    l -= 1;
                }
                sum
            });
        }
        seg.next(tpool);
        if seg.finished() {
            break;
        }
    }
    total
}

/// Deléglise-Rivat trivial leaves.
pub fn s2_trivial<T: Counting>(
    x: T,
    y: i64,
    c: i64,
    primes: &[i64],
    pi: &PiTable,
    prefs: &Preferences,
    tpool: Option<&rayon::ThreadPool>,
) -> T {
    if prefs.verbose(Verbosity::Info) {
        eprintln!();
        eprintln!("=== S2_trivial(x, y) ===");
    }
    let time = Instant::now();
    let s = trivial_count(
        x,
        y,
        y,
        (c + 1) as usize,
        primes,
        pi,
        tpool,
        prefs.num_threads(),
    );
    if prefs.verbose(Verbosity::Info) {
        eprintln!("S2_trivial = {s} ({:.3}s)", time.elapsed().as_secs_f64());
    }
    s
}

/// Deléglise-Rivat easy leaves (sparse and clustered).
pub fn s2_easy<T: Counting>(
    x: T,
    y: i64,
    c: i64,
    primes: &[i64],
    pi: &PiTable,
    prefs: &Preferences,
    tpool: Option<&rayon::ThreadPool>,
) -> Result<T, Error> {
    if prefs.verbose(Verbosity::Info) {
        eprintln!();
        eprintln!("=== S2_easy(x, y) ===");
        eprintln!("Computation of the easy special leaves");
    }
    let time = Instant::now();
    let stamp = (x.to_string(), y, 0i64, c);
    if prefs.backup_file.is_some() {
        let file = backup::load(prefs)?;
        if let Some(sec) = file.s2_easy {
            if (&sec.x, sec.y, sec.z, sec.k) == (&stamp.0, stamp.1, stamp.2, stamp.3) {
                if let Some(sum) = sec.sum.parse::<i128>().ok().and_then(T::from_i128) {
                    if prefs.verbose(Verbosity::Info) {
                        eprintln!("Resuming S2_easy");
                    }
                    return Ok(sum);
                }
            }
        }
    }
    let s = easy_formula_sum(
        x,
        y,
        y,
        (c + 1) as usize,
        primes,
        pi,
        tpool,
        prefs.num_threads(),
    );
    if prefs.backup_file.is_some() {
        let mut file = backup::load(prefs).unwrap_or_default();
        file.s2_easy = Some(SumBackup {
            x: stamp.0,
            y: stamp.1,
            z: stamp.2,
            k: stamp.3,
            sum: s.to_string(),
            seconds: time.elapsed().as_secs_f64(),
        });
        backup::store(prefs, &file);
    }
    if prefs.verbose(Verbosity::Info) {
        eprintln!("S2_easy = {s} ({:.3}s)", time.elapsed().as_secs_f64());
    }
    Ok(s)
}

/// Gourdon's A + C formulas (including the trivial leaves).
#[allow(clippy::too_many_arguments)]
pub fn ac<T: Counting>(
    x: T,
    y: i64,
    z: i64,
    k: i64,
    primes: &[i64],
    pi: &PiTable,
    prefs: &Preferences,
    tpool: Option<&rayon::ThreadPool>,
) -> Result<T, Error> {
    if prefs.verbose(Verbosity::Info) {
        eprintln!();
        eprintln!("=== AC(x, y) ===");
        eprintln!("Computation of the easy special leaves");
    }
    let time = Instant::now();
    let stamp = (x.to_string(), y, z, k);
    if prefs.backup_file.is_some() {
        let file = backup::load(prefs)?;
        if let Some(sec) = file.ac {
            if (&sec.x, sec.y, sec.z, sec.k) == (&stamp.0, stamp.1, stamp.2, stamp.3) {
                if let Some(sum) = sec.sum.parse::<i128>().ok().and_then(T::from_i128) {
                    if prefs.verbose(Verbosity::Info) {
                        eprintln!("Resuming AC");
                    }
                    return Ok(sum);
                }
            }
        }
    }
    let threads = prefs.num_threads();
    let first_b = (k + 1) as usize;
    let mut s = trivial_count(x, y, z, first_b, primes, pi, tpool, threads);
    s += easy_formula_sum(x, y, z, first_b, primes, pi, tpool, threads);
    s += a_sum(x, y, z, primes, pi, tpool, threads);
    if prefs.backup_file.is_some() {
        let mut file = backup::load(prefs).unwrap_or_default();
        file.ac = Some(SumBackup {
            x: stamp.0,
            y: stamp.1,
            z: stamp.2,
            k: stamp.3,
            sum: s.to_string(),
            seconds: time.elapsed().as_secs_f64(),
        });
        backup::store(prefs, &file);
    }
    if prefs.verbose(Verbosity::Info) {
        eprintln!("AC = {s} ({:.3}s)", time.elapsed().as_secs_f64());
    }
    Ok(s)
}

// Reference: enumerate the easy prime leaves naively and evaluate
// phi by trial division.
#[cfg(test)]
fn easy_leaves_brute(x: i64, y: i64, trunc: i64, c: i64, easy_cap: i64) -> i64 {
    use crate::primes::generate_primes;
    let primes = generate_primes(y);
    let phi_brute = |u: i64, b: usize| -> i64 {
        (1..=u)
            .filter(|&n| (1..=b).all(|i| n % primes[i] != 0))
            .count() as i64
    };
    let mut sum = 0i64;
    for b in (c + 1) as usize..primes.len() {
        let p = primes[b];
        for l in b + 1..primes.len() {
            let q = primes[l];
            if q * p <= trunc {
                continue;
            }
            let u = x / (p * q);
            let t_b = (p * p).min(easy_cap);
            if u < t_b {
                sum += phi_brute(u, b - 1);
            }
        }
    }
    sum
}

#[test]
fn test_s2_trivial_and_easy_vs_bruteforce() {
    let prefs = Preferences::default();
    for (x, y) in [(10_000i64, 40i64), (100_000, 100), (300_000, 60)] {
        let c = crate::phi::get_c(y);
        let primes = crate::primes::generate_primes(y);
        let pi = PiTable::new(y, None);
        let expected = easy_leaves_brute(x, y, y, c, y + 1);
        let trivial: i64 = s2_trivial(x, y, c, &primes, &pi, &prefs, None);
        let easy: i64 = s2_easy(x, y, c, &primes, &pi, &prefs, None).unwrap();
        assert_eq!(trivial + easy, expected, "x={x} y={y}");
    }
}

#[test]
fn test_ac_vs_bruteforce() {
    let prefs = Preferences::default();
    for (x, y, z) in [(1_000_000i64, 70i64, 100i64), (500_000, 50, 75), (120_000, 60, 60)] {
        let k = crate::phi::get_c(y);
        let primes = crate::primes::generate_primes(y);
        let pi = PiTable::new(y, None);
        let expected = easy_leaves_brute(x, y, z, k, isqrt(x) + 1);
        let got: i64 = ac(x, y, z, k, &primes, &pi, &prefs, None).unwrap();
        assert_eq!(got, expected, "x={x} y={y} z={z}");
    }
}
