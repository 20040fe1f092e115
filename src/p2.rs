// Copyright 2024 Rémy Oudompheng. All rights reserved.
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! The second partial sieve function P2(x, y) and Gourdon's B.
//!
//! P2(x, y) counts the numbers <= x with exactly 2 prime factors,
//! each exceeding y. With a = pi(y) and b = pi(x^(1/2)):
//!
//!   P2 = sum_{i=a+1}^{b} (pi(x / p_i) - (i - 1))
//!      = (a-2)(a+1)/2 - (b-2)(b+1)/2 + sum pi(x / p_i)
//!
//! B(x, y) is the bare sum of pi(x / p_i) over the same primes.
//! Both walk a backward prime iterator over the sieving primes and
//! a forward iterator that counts primes up to each x / p_i. Each
//! thread owns a strip [low, low + dist) and returns
//! pi(n) - pi(low - 1) counts, so the driver adds the missing
//! pi_low_minus_1 * iters contributions sequentially in thread
//! order, with overflow-checked multiplications.

use std::time::Instant;

use rayon::prelude::*;

use crate::arith::{ceil_div, div_clamp, fast_div, in_between, Counting};
use crate::backup::{self, P2Backup};
use crate::lehmer::pi_simple;
use crate::loadbalancer::LoadBalancerP2;
use crate::primes::{PrimeIter, ReversePrimeIter};
use crate::status::Status;
use crate::{Error, Preferences, Verbosity};

struct ThreadResult<T> {
    sum: T,
    pix: i64,
    iters: i64,
}

/// Count the primes inside (prime, stop], advancing the iterator.
fn count_primes(it: &mut PrimeIter, prime: &mut i64, stop: i64) -> i64 {
    let mut count = 0;
    let mut p = *prime;
    while p <= stop {
        count += 1;
        p = it.next_prime() as i64;
    }
    *prime = p;
    count
}

#[derive(Clone, Copy, PartialEq)]
enum Mode {
    P2,
    B,
}

fn strip_thread<T: Counting>(
    mode: Mode,
    x: T,
    y: i64,
    z: i64,
    low0: i64,
    thread_num: i64,
    dist: i64,
) -> ThreadResult<T> {
    let mut sum = T::zero();
    let mut pix = 0i64;
    let mut iters = 0i64;
    let low = low0 + dist * thread_num;
    if low < z {
        let z_th = (low + dist).min(z);
        let sqrtx = x.sqrt64();
        let stop = div_clamp(x, low, sqrtx);
        let start = match mode {
            // an x/z_th above sqrt(x) empties the loop either way
            Mode::P2 => div_clamp(x, z_th, sqrtx + 1).max(y),
            Mode::B => div_clamp(x, z_th, sqrtx).max(y),
        };
        let mut rit = ReversePrimeIter::new(stop as u64 + 1);
        let mut it = PrimeIter::new((low - 1).max(0) as u64, z_th as u64);
        let mut next = it.next_prime() as i64;
        let mut prime = rit.prev_prime() as i64;

        // sum of pi(x / prime) - pi(low - 1)
        while prime > start {
            let xp = fast_div(x, prime);
            if mode == Mode::P2 && xp >= z_th {
                break;
            }
            pix += count_primes(&mut it, &mut next, xp);
            sum += T::from64(pix);
            iters += 1;
            prime = rit.prev_prime() as i64;
        }
        // count the remaining primes of the strip
        pix += count_primes(&mut it, &mut next, z_th - 1);
    }
    ThreadResult { sum, pix, iters }
}

fn strip_driver<T: Counting>(
    mode: Mode,
    x: T,
    y: i64,
    prefs: &Preferences,
    tpool: Option<&rayon::ThreadPool>,
) -> Result<T, Error> {
    if x < T::from64(4) {
        return Ok(T::zero());
    }
    let sqrtx = x.sqrt64();
    let z = fast_div(x, y.max(1));
    let name = if mode == Mode::P2 { "P2" } else { "B" };

    let mut sum;
    let mut low;
    let mut pix_total;
    match mode {
        Mode::P2 => {
            let a = T::from64(pi_simple(y, prefs, tpool));
            let b = T::from64(pi_simple(sqrtx, prefs, tpool));
            if a >= b {
                return Ok(T::zero());
            }
            // sum_{i=a+1}^{b} -(i - 1)
            let two = T::from64(2);
            let corr = |n: T| -> Option<T> {
                (n - two).checked_mul(&(n + T::one())).map(|v| v / two)
            };
            sum = match (corr(a), corr(b)) {
                (Some(ca), Some(cb)) => ca - cb,
                _ => return Err(Error::NumericOverflow),
            };
            low = 2;
            pix_total = 0i64;
        }
        Mode::B => {
            sum = T::zero();
            low = sqrtx;
            pix_total = pi_simple(sqrtx - 1, prefs, tpool);
        }
    }

    let mut lb = LoadBalancerP2::new(low, z, prefs.num_threads());
    // resume a checkpointed run if the inputs match
    let stamp = x.to_string();
    if prefs.backup_file.is_some() {
        let file = backup::load(prefs)?;
        let section = if mode == Mode::P2 { file.p2 } else { file.b };
        if let Some(sec) = section {
            if sec.x == stamp && sec.y == y && sec.z == z {
                let s = sec
                    .sum
                    .parse::<i128>()
                    .ok()
                    .and_then(T::from_i128)
                    .ok_or_else(|| Error::BackupIo(format!("bad {name} sum")))?;
                sum = s;
                low = sec.low;
                pix_total = sec.pi_low_minus_1;
                lb.set_thread_dist(sec.thread_dist);
                if prefs.verbose(Verbosity::Info) {
                    eprintln!("Resuming {name} from {:.1}%", sec.percent);
                }
            } else if prefs.resume {
                return Err(Error::BackupIo(format!("{name} header mismatch")));
            }
        }
    }

    let mut status = Status::new(x.as_f64(), prefs);
    let mut timer = backup::BackupTimer::new();
    let start_time = Instant::now();
    let mut elapsed_prev = 0.0;
    while low < z {
        if prefs.abort() {
            return Err(Error::Interrupted);
        }
        let dist = lb.thread_dist(low, elapsed_prev);
        let nthreads = in_between(1, lb.get_threads() as i64, ceil_div(z - low, dist));
        let t0 = Instant::now();
        let results: Vec<ThreadResult<T>> = match tpool {
            Some(pool) if nthreads > 1 => pool.install(|| {
                (0..nthreads)
                    .into_par_iter()
                    .map(|i| strip_thread(mode, x, y, z, low, i, dist))
                    .collect()
            }),
            _ => (0..nthreads)
                .map(|i| strip_thread(mode, x, y, z, low, i, dist))
                .collect(),
        };
        elapsed_prev = t0.elapsed().as_secs_f64();

        // add the missing pi(low - 1) contributions in thread order
        for r in results {
            let corr = T::from64(pix_total)
                .checked_mul(&T::from64(r.iters))
                .ok_or(Error::NumericOverflow)?;
            sum = sum
                .checked_add(&r.sum)
                .and_then(|s| s.checked_add(&corr))
                .ok_or(Error::NumericOverflow)?;
            pix_total += r.pix;
        }
        low += dist * nthreads;

        if timer.due() && prefs.backup_file.is_some() {
            let mut file = backup::load(prefs).unwrap_or_default();
            let sec = P2Backup {
                x: stamp.clone(),
                y,
                z,
                low: low.min(z),
                thread_dist: dist,
                pi_low_minus_1: pix_total,
                sum: sum.to_string(),
                percent: 100.0 * low.min(z) as f64 / z as f64,
                seconds: start_time.elapsed().as_secs_f64(),
            };
            if mode == Mode::P2 {
                file.p2 = Some(sec);
            } else {
                file.b = Some(sec);
            }
            backup::store(prefs, &file);
        }
        status.print(100.0 * low.min(z) as f64 / z as f64);
    }
    status.finish();
    Ok(sum)
}

/// P2(x, y): numbers <= x with exactly two prime factors > y.
pub fn p2<T: Counting>(
    x: T,
    y: i64,
    prefs: &Preferences,
    tpool: Option<&rayon::ThreadPool>,
) -> Result<T, Error> {
    if prefs.verbose(Verbosity::Info) {
        eprintln!();
        eprintln!("=== P2(x, y) ===");
        eprintln!("Computation of the 2nd partial sieve function");
    }
    let time = Instant::now();
    let s = strip_driver(Mode::P2, x, y, prefs, tpool)?;
    if prefs.verbose(Verbosity::Info) {
        eprintln!("P2 = {s} ({:.3}s)", time.elapsed().as_secs_f64());
    }
    Ok(s)
}

/// B(x, y) = sum of pi(x / p) over primes y < p <= x^(1/2).
pub fn b<T: Counting>(
    x: T,
    y: i64,
    prefs: &Preferences,
    tpool: Option<&rayon::ThreadPool>,
) -> Result<T, Error> {
    if prefs.verbose(Verbosity::Info) {
        eprintln!();
        eprintln!("=== B(x, y) ===");
    }
    let time = Instant::now();
    let s = strip_driver(Mode::B, x, y, prefs, tpool)?;
    if prefs.verbose(Verbosity::Info) {
        eprintln!("B = {s} ({:.3}s)", time.elapsed().as_secs_f64());
    }
    Ok(s)
}

#[cfg(test)]
use crate::pitable::PiTable;
#[cfg(test)]
use crate::primes::generate_primes;

#[cfg(test)]
fn p2_bruteforce(x: i64, y: i64) -> i64 {
    // pairs p <= q of primes > y with p * q <= x
    let primes = generate_primes(x / 2);
    let mut count = 0;
    for i in 1..primes.len() {
        let p = primes[i];
        if p <= y {
            continue;
        }
        if p * p > x {
            break;
        }
        for j in i..primes.len() {
            if p * primes[j] > x {
                break;
            }
            count += 1;
        }
    }
    count
}

#[test]
fn test_p2_small() {
    let prefs = Preferences::default();
    // pi(100) = phi(100, 2) + 2 - 1 - P2(100, 4)
    assert_eq!(p2::<i64>(100, 4, &prefs, None).unwrap(), 9);
    for (x, y) in [(100i64, 4i64), (1000, 10), (10_000, 21), (50_000, 36)] {
        assert_eq!(
            p2::<i64>(x, y, &prefs, None).unwrap(),
            p2_bruteforce(x, y),
            "x={x} y={y}"
        );
    }
    assert_eq!(p2::<i64>(3, 2, &prefs, None).unwrap(), 0);
}

#[test]
fn test_b_small() {
    let prefs = Preferences::default();
    for (x, y) in [(10_000i64, 21i64), (100_000, 46), (1_000_000, 100)] {
        let sqrtx = crate::arith::isqrt(x);
        let pi = PiTable::new(x / y, None);
        let primes = generate_primes(sqrtx);
        let mut expected = 0i64;
        for i in 1..primes.len() {
            let p = primes[i];
            if p > y {
                expected += pi.get(x / p);
            }
        }
        assert_eq!(b::<i64>(x, y, &prefs, None).unwrap(), expected, "x={x} y={y}");
    }
}

#[test]
fn test_p2_128() {
    let prefs = Preferences::default();
    // the 64-bit and 128-bit paths agree
    let p64: i64 = p2(10_000_000i64, 215, &prefs, None).unwrap();
    let p128: i128 = p2(10_000_000i128, 215, &prefs, None).unwrap();
    assert_eq!(p64 as i128, p128);
}
