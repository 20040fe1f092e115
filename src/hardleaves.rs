// Copyright 2024 Rémy Oudompheng. All rights reserved.
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Hard special leaves: the segmented sieve engine behind S2_hard
//! (Deléglise-Rivat) and D (Gourdon).
//!
//! A special leaf at level b is a squarefree m with lpf(m) > p_b
//! and T < m*p_b, m <= T, where the truncation T is y for
//! Deléglise-Rivat and z for Gourdon; it contributes
//! -mu(m) * phi(x / (m p_b), b - 1) to phi(x, pi(y)). The leaves
//! whose phi value is a PrimePi lookup (prime m with
//! x/(m p_b) < min(p_b^2, easy_cap)) are counted by the easy leaf
//! kernels; everything else lands here and is counted against the
//! sieve: phi(u, b-1) = phi[b] + sieve.count(u - low) where phi[b]
//! accumulates the survivors of all previous segments.
//!
//! Within one segment and level the stop values x/(m p_b) strictly
//! increase as m decreases, which is exactly the monotone cursor
//! contract of Sieve::count.
//!
//! Workers own disjoint chunks of the sieve interval, so phi[b] is
//! chunk-local and starts at zero; the load balancer folds the
//! missing phi offsets back in serially using the per-level leaf
//! multiplicities (see loadbalancer.rs).

use std::time::Instant;

use rayon::prelude::*;

use crate::arith::{div_clamp, fast_div, isqrt, tdiv, Counting};
use crate::backup::{self, HardBackup};
use crate::loadbalancer::{ideal_num_threads, ChunkResult, LoadBalancer, Work};
use crate::pitable::PiTable;
use crate::sieve::Sieve;
use crate::{Error, Preferences, Verbosity};

struct HardCtx<'a, T> {
    x: T,
    y: i64,
    /// truncation of the leaf tree: y (S2_hard) or z (D)
    trunc: i64,
    c: i64,
    /// prime-m leaves with u < min(p_b^2, easy_cap) are easy and
    /// skipped here
    easy_cap: i64,
    /// sieve interval [0, limit)
    limit: i64,
    primes: &'a [i64],
    lpf: &'a [u64],
    mu: &'a [i8],
    pi: &'a PiTable,
    pi_sqrt_trunc: usize,
}

impl<'a, T: Counting> HardCtx<'a, T> {
    fn process_chunk(
        &self,
        sieve: &mut Sieve,
        phi: &mut [i64],
        mu_sum: &mut [i64],
        work: Work,
    ) -> ChunkResult<T> {
        let chunk_low = work.low;
        let chunk_high = (work.low + work.segments * work.segment_size).min(self.limit);
        phi.fill(0);
        mu_sum.fill(0);
        let first_b = (self.c + 1) as usize;
        let mut max_b = first_b - 1;
        let mut sum = T::zero();

        let mut low = chunk_low;
        while low < chunk_high {
            let high = (low + work.segment_size).min(chunk_high);
            let low1 = low.max(1);
            sieve.pre_sieve(self.primes, self.c, low as u64, high as u64);

            'leaves: for b in first_b..self.primes.len() {
                let p = self.primes[b];
                let xp: T = tdiv(self.x, p);
                // phi(u, b-1) is a pi lookup once u < t_b
                let t_b = if p <= self.easy_cap / p {
                    (p * p).min(self.easy_cap)
                } else {
                    self.easy_cap
                };

                if b <= self.pi_sqrt_trunc {
                    // squarefree m, prime or composite
                    let max_m = div_clamp(xp, low1, self.trunc);
                    if p >= max_m {
                        break 'leaves;
                    }
                    let min_m = div_clamp(xp, high, self.trunc)
                        .max(self.trunc / p)
                        .max(p);
                    let m_hard = div_clamp(xp, t_b, self.trunc);
                    for m in (min_m + 1..=max_m).rev() {
                        let lm = self.lpf[m as usize];
                        if lm <= p as u64 {
                            continue;
                        }
                        if lm == m as u64 {
                            // m prime: skip easy leaves, they are
                            // counted by the AC / S2_easy kernels
                            if m <= self.y && m <= m_hard {
                                let u = fast_div(xp, m);
                                let cnt = phi[b] + sieve.count(u - low);
                                sum += T::from64(cnt);
                                mu_sum[b] += 1;
                            }
                        } else if self.mu[m as usize] != 0 {
                            let u = fast_div(xp, m);
                            let cnt = phi[b] + sieve.count(u - low);
                            let w = -(self.mu[m as usize] as i64);
                            sum += T::from64(w * cnt);
                            mu_sum[b] += w;
                        }
                    }
                } else {
                    // m = q prime, walked through the prime index
                    let q_hi = div_clamp(xp, low1, self.y).min(div_clamp(xp, t_b, self.y));
                    if p >= q_hi {
                        break 'leaves;
                    }
                    let min_q = div_clamp(xp, high, self.y).max(self.trunc / p).max(p);
                    let mut l = self.pi.get(q_hi) as usize;
                    while self.primes[l] > min_q {
                        let u = fast_div(xp, self.primes[l]);
                        let cnt = phi[b] + sieve.count(u - low);
                        sum += T::from64(cnt);
                        mu_sum[b] += 1;
                        l -= 1;
                    }
                }

                phi[b] += sieve.total_count();
                sieve.cross_off_count(self.primes[b], b);
                max_b = max_b.max(b);
            }
            low = high;
        }

        ChunkResult {
            low: chunk_low,
            high: chunk_high,
            sum,
            first_b,
            phi_delta: phi[first_b..max_b + 1].to_vec(),
            mu_sum: mu_sum[first_b..max_b + 1].to_vec(),
            elapsed: 0.0,
        }
    }
}

fn worker_loop<T: Counting>(ctx: &HardCtx<T>, balancer: &LoadBalancer<T>) {
    let mut sieve = Sieve::new(ctx.primes.len());
    let mut phi = vec![0i64; ctx.primes.len()];
    let mut mu_sum = vec![0i64; ctx.primes.len()];
    let mut prev: Option<ChunkResult<T>> = None;
    loop {
        let work = match balancer.get_work(prev.take()) {
            Ok(Some(w)) => w,
            // exhausted, aborted, or failed: the balancer keeps
            // the error, workers just drain
            Ok(None) | Err(_) => return,
        };
        let t = Instant::now();
        let mut res = ctx.process_chunk(&mut sieve, &mut phi, &mut mu_sum, work);
        res.elapsed = t.elapsed().as_secs_f64();
        prev = Some(res);
    }
}

fn hard_engine<T: Counting>(
    name: &'static str,
    ctx: HardCtx<T>,
    sum_approx: T,
    prefs: &Preferences,
    tpool: Option<&rayon::ThreadPool>,
) -> Result<T, Error> {
    let start = Instant::now();
    let mut balancer: LoadBalancer<T> =
        LoadBalancer::new(ctx.x.as_f64(), ctx.limit, sum_approx, prefs);

    let stamp = (ctx.x.to_string(), ctx.y, ctx.trunc, ctx.c);
    if prefs.backup_file.is_some() {
        let file = backup::load(prefs)?;
        let section = if name == "D" { file.d } else { file.s2_hard };
        if let Some(sec) = section {
            if (&sec.x, sec.y, sec.z, sec.k) == (&stamp.0, stamp.1, stamp.2, stamp.3) {
                let sum = sec
                    .sum
                    .parse::<i128>()
                    .ok()
                    .and_then(T::from_i128)
                    .ok_or_else(|| Error::BackupIo(format!("bad {name} sum")))?;
                if prefs.verbose(Verbosity::Info) {
                    eprintln!("Resuming {name} from {:.1}%", sec.percent);
                }
                balancer.resume(sec.low, sec.segments, sec.segment_size, sum, sec.phi);
            } else if prefs.resume {
                return Err(Error::BackupIo(format!("{name} header mismatch")));
            }
        }
        let limit = ctx.limit;
        balancer.set_backup_hook(Box::new(move |low, segments, segment_size, sum: T, phi| {
            let mut file = backup::load(prefs).unwrap_or_default();
            let sec = HardBackup {
                x: stamp.0.clone(),
                y: stamp.1,
                z: stamp.2,
                k: stamp.3,
                low,
                segments,
                segment_size,
                sum: sum.to_string(),
                phi: phi.to_vec(),
                percent: 100.0 * low as f64 / limit as f64,
                seconds: start.elapsed().as_secs_f64(),
            };
            if name == "D" {
                file.d = Some(sec);
            } else {
                file.s2_hard = Some(sec);
            }
            backup::store(prefs, &file);
        }));
    }

    let threads = ideal_num_threads(prefs.num_threads(), ctx.limit, 1 << 16);
    if let Some(pool) = tpool {
        pool.install(|| {
            (0..threads)
                .into_par_iter()
                .for_each(|_| worker_loop(&ctx, &balancer));
        });
    } else {
        worker_loop(&ctx, &balancer);
    }
    let (sum, _phi) = balancer.finish()?;
    Ok(sum)
}

/// Contribution of the hard special leaves of Deléglise-Rivat.
#[allow(clippy::too_many_arguments)]
pub fn s2_hard<T: Counting>(
    x: T,
    y: i64,
    c: i64,
    primes: &[i64],
    lpf: &[u64],
    mu: &[i8],
    pi: &PiTable,
    s2_approx: T,
    prefs: &Preferences,
    tpool: Option<&rayon::ThreadPool>,
) -> Result<T, Error> {
    if prefs.verbose(Verbosity::Info) {
        eprintln!();
        eprintln!("=== S2_hard(x, y) ===");
        eprintln!("Computation of the hard special leaves");
    }
    let time = Instant::now();
    let ctx = HardCtx {
        x,
        y,
        trunc: y,
        c,
        easy_cap: y + 1,
        limit: fast_div(x, y) + 1,
        primes,
        lpf,
        mu,
        pi,
        pi_sqrt_trunc: pi.get(isqrt(y)) as usize,
    };
    let s = hard_engine("S2_hard", ctx, s2_approx, prefs, tpool)?;
    if prefs.verbose(Verbosity::Info) {
        eprintln!("S2_hard = {s} ({:.3}s)", time.elapsed().as_secs_f64());
    }
    Ok(s)
}

/// Gourdon's D formula: hard special leaves with truncation z.
#[allow(clippy::too_many_arguments)]
pub fn d<T: Counting>(
    x: T,
    y: i64,
    z: i64,
    k: i64,
    primes: &[i64],
    lpf: &[u64],
    mu: &[i8],
    pi: &PiTable,
    d_approx: T,
    prefs: &Preferences,
    tpool: Option<&rayon::ThreadPool>,
) -> Result<T, Error> {
    if prefs.verbose(Verbosity::Info) {
        eprintln!();
        eprintln!("=== D(x, y) ===");
        eprintln!("Computation of the hard special leaves");
    }
    let time = Instant::now();
    debug_assert!(z >= y && z <= y.saturating_mul(y));
    let ctx = HardCtx {
        x,
        y,
        trunc: z,
        c: k,
        easy_cap: x.sqrt64() + 1,
        limit: fast_div(x, z) + 1,
        primes,
        lpf,
        mu,
        pi,
        pi_sqrt_trunc: pi.get(isqrt(z)) as usize,
    };
    let s = hard_engine("D", ctx, d_approx, prefs, tpool)?;
    if prefs.verbose(Verbosity::Info) {
        eprintln!("D = {s} ({:.3}s)", time.elapsed().as_secs_f64());
    }
    Ok(s)
}

// Definition-level reference: enumerate the hard leaves naively
// and evaluate phi by trial division.
#[cfg(test)]
fn phi_factor_brute(u: i64, b: usize, primes: &[i64]) -> i64 {
    (1..=u)
        .filter(|&n| (1..=b).all(|i| n % primes[i] != 0))
        .count() as i64
}

#[cfg(test)]
fn hard_leaves_brute(x: i64, y: i64, trunc: i64, c: i64, easy_cap: i64) -> i64 {
    use crate::primes::{generate_mu_lpf, generate_primes};
    let primes = generate_primes(y);
    let (lpf, mu) = generate_mu_lpf(trunc);
    let mut sum = 0i64;
    for b in (c + 1) as usize..primes.len() {
        let p = primes[b];
        for m in 2..=trunc {
            if m * p <= trunc || lpf[m as usize] <= p as u64 {
                continue;
            }
            let prime_m = lpf[m as usize] == m as u64;
            if prime_m && m > y {
                continue;
            }
            if !prime_m && mu[m as usize] == 0 {
                continue;
            }
            let u = x / (p * m);
            if prime_m {
                let t_b = (p * p).min(easy_cap);
                if u < t_b {
                    continue; // easy leaf
                }
                sum += phi_factor_brute(u, b - 1, &primes);
            } else {
                sum -= mu[m as usize] as i64 * phi_factor_brute(u, b - 1, &primes);
            }
        }
    }
    sum
}

#[cfg(test)]
fn run_engine(x: i64, y: i64, trunc: i64, c: i64, easy_cap: i64) -> i64 {
    use crate::primes::{generate_mu_lpf, generate_primes};
    let prefs = Preferences::default();
    let primes = generate_primes(y);
    let (lpf, mu) = generate_mu_lpf(trunc);
    let pi = PiTable::new(y, None);
    let ctx = HardCtx {
        x,
        y,
        trunc,
        c,
        easy_cap,
        limit: x / trunc + 1,
        primes: &primes,
        lpf: &lpf,
        mu: &mu,
        pi: &pi,
        pi_sqrt_trunc: pi.get(isqrt(trunc)) as usize,
    };
    hard_engine("S2_hard", ctx, 1 << 30, &prefs, None).unwrap()
}

#[test]
fn test_hard_leaves_vs_bruteforce_dr() {
    // Deléglise-Rivat shape: trunc = y, easy_cap = y + 1
    for (x, y) in [(10_000i64, 40i64), (100_000, 100), (250_000, 70)] {
        let c = crate::phi::get_c(y);
        let expected = hard_leaves_brute(x, y, y, c, y + 1);
        let got = run_engine(x, y, y, c, y + 1);
        assert_eq!(got, expected, "x={x} y={y}");
    }
}

#[test]
fn test_hard_leaves_vs_bruteforce_gourdon() {
    // Gourdon shape: trunc = z > y, easy_cap = sqrt(x) + 1
    for (x, y, z) in [(100_000i64, 60i64, 90i64), (500_000, 100, 150), (250_000, 80, 120)] {
        let c = crate::phi::get_c(y);
        let cap = isqrt(x) + 1;
        let expected = hard_leaves_brute(x, y, z, c, cap);
        let got = run_engine(x, y, z, c, cap);
        assert_eq!(got, expected, "x={x} y={y} z={z}");
    }
}
