// Copyright 2024 Rémy Oudompheng. All rights reserved.
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Work distribution for the hard special leaves.
//!
//! The sieve interval [0, sieve_limit) is handed out as contiguous
//! chunks of segments * segment_size integers. Workers pull a
//! chunk, process it with their own sieve, and report the elapsed
//! wall time together with their partial results; the balancer
//! grows or shrinks the chunk shape so that one batch stays in the
//! 10..60 second range.
//!
//! Workers compute leaf contributions against a chunk-local phi
//! that starts at zero. Stitching the global phi back in requires
//! the per-level leaf multiplicities (mu_sum) and survivor counts
//! (phi_delta) of every earlier chunk, so results are buffered and
//! folded strictly in chunk order: the final sum is deterministic
//! for a fixed (x, y, threads, segment_size).

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Instant;

use crate::arith::{ceil128, ceil_div, in_between, isqrt, Counting};
use crate::status::Status;
use crate::{Error, Preferences};

// Resize thresholds in seconds: a batch below the low mark grows
// the chunk, above the high mark shrinks it.
const GROW_SECS: f64 = 10.0;
const SHRINK_SECS: f64 = 60.0;
const MIN_SEGMENT_SIZE: i64 = 1 << 23;

/// Limit the thread count so that every thread gets at least
/// `threshold` numbers of work.
pub fn ideal_num_threads(threads: usize, limit: i64, threshold: i64) -> usize {
    let max_threads = (limit / threshold.max(1)).max(1);
    (threads as i64).min(max_threads).max(1) as usize
}

#[derive(Clone, Copy, Debug)]
pub struct Work {
    pub low: i64,
    pub segments: i64,
    pub segment_size: i64,
}

/// Partial results of one chunk, reported by a worker.
pub struct ChunkResult<T> {
    pub low: i64,
    pub high: i64,
    /// signed leaf contributions against the chunk-local phi
    pub sum: T,
    /// phi_delta[i] and mu_sum[i] refer to level first_b + i
    pub first_b: usize,
    /// survivors per level accumulated over the chunk
    pub phi_delta: Vec<i64>,
    /// signed count of leaves per level
    pub mu_sum: Vec<i64>,
    pub elapsed: f64,
}

struct LbState<T> {
    low: i64,
    segments: i64,
    segment_size: i64,
    applied_low: i64,
    pending: BTreeMap<i64, ChunkResult<T>>,
    phi: Vec<i64>,
    sum: T,
    error: Option<Error>,
    last_backup: Instant,
}

/// Called with (low, segments, segment_size, sum, phi) roughly
/// every 60 seconds of wall time, in the serial stitching section.
pub type BackupHook<'a, T> = Box<dyn Fn(i64, i64, i64, T, &[i64]) + Send + Sync + 'a>;

pub struct LoadBalancer<'a, T> {
    state: Mutex<LbState<T>>,
    status: Mutex<Status>,
    prefs: &'a Preferences,
    sieve_limit: i64,
    max_size: i64,
    min_size: i64,
    sum_approx: T,
    backup: Option<BackupHook<'a, T>>,
}

impl<'a, T: Counting> LoadBalancer<'a, T> {
    pub fn new(x: f64, sieve_limit: i64, sum_approx: T, prefs: &'a Preferences) -> Self {
        let threads = prefs.num_threads().max(1) as i64;
        let max_size = ceil128(isqrt(sieve_limit).max(MIN_SEGMENT_SIZE));
        let min_size = MIN_SEGMENT_SIZE.min(max_size);
        let segment_size = ceil128(in_between(min_size, isqrt(sieve_limit) / threads, max_size));
        LoadBalancer {
            state: Mutex::new(LbState {
                low: 0,
                segments: 1,
                segment_size,
                applied_low: 0,
                pending: BTreeMap::new(),
                phi: vec![],
                sum: T::zero(),
                error: None,
                last_backup: Instant::now(),
            }),
            status: Mutex::new(Status::new(x, prefs)),
            prefs,
            sieve_limit,
            max_size,
            min_size,
            sum_approx,
            backup: None,
        }
    }

    pub fn set_backup_hook(&mut self, hook: BackupHook<'a, T>) {
        self.backup = Some(hook);
    }

    /// Restore a checkpoint before any worker starts.
    pub fn resume(&mut self, low: i64, segments: i64, segment_size: i64, sum: T, phi: Vec<i64>) {
        let st = self.state.get_mut().unwrap();
        st.low = low;
        st.applied_low = low;
        st.segments = segments.max(1);
        st.segment_size = ceil128(in_between(128, segment_size, self.max_size));
        st.sum = sum;
        st.phi = phi;
    }

    pub fn sieve_limit(&self) -> i64 {
        self.sieve_limit
    }

    /// Report the previous chunk (if any) and pull the next one.
    /// Returns None when the interval is exhausted or on abort.
    pub fn get_work(&self, prev: Option<ChunkResult<T>>) -> Result<Option<Work>, Error> {
        let mut st = self.state.lock().unwrap();
        if let Some(res) = prev {
            self.update_size(&mut st, &res);
            st.pending.insert(res.low, res);
            self.fold_pending(&mut st);
        }
        if let Some(e) = &st.error {
            return Err(e.clone());
        }
        let work = if self.prefs.abort() || st.low >= self.sieve_limit {
            None
        } else {
            let w = Work {
                low: st.low,
                segments: st.segments,
                segment_size: st.segment_size,
            };
            st.low += w.segments * w.segment_size;
            Some(w)
        };
        let percent = Status::hard_percent(
            st.applied_low as f64,
            self.sieve_limit as f64,
            st.sum.as_f64(),
            self.sum_approx.as_f64().max(1.0),
        );
        drop(st);
        // opportunistic: skip the status line if contended
        if let Ok(mut status) = self.status.try_lock() {
            status.print(percent);
        }
        Ok(work)
    }

    // Fold buffered results in chunk order. The multiplication
    // phi[b] * mu_sum[b] is where 128-bit sums can overflow, so it
    // is checked.
    fn fold_pending(&self, st: &mut LbState<T>) {
        while let Some(entry) = st.pending.first_entry() {
            if *entry.key() != st.applied_low || st.error.is_some() {
                break;
            }
            let res = entry.remove();
            if st.phi.len() < res.first_b + res.phi_delta.len() {
                st.phi.resize(res.first_b + res.phi_delta.len(), 0);
            }
            let mut sum = st.sum.checked_add(&res.sum);
            for (i, (&delta, &mult)) in res.phi_delta.iter().zip(&res.mu_sum).enumerate() {
                let b = res.first_b + i;
                if mult != 0 {
                    let corr = T::from64(st.phi[b]).checked_mul(&T::from64(mult));
                    sum = match (sum, corr) {
                        (Some(s), Some(c)) => s.checked_add(&c),
                        _ => None,
                    };
                }
                st.phi[b] += delta;
            }
            match sum {
                Some(s) => st.sum = s,
                None => {
                    st.error = Some(Error::NumericOverflow);
                    return;
                }
            }
            st.applied_low = res.high;

            if st.last_backup.elapsed().as_secs_f64() > 60.0 {
                st.last_backup = Instant::now();
                if let Some(hook) = &self.backup {
                    hook(st.applied_low, st.segments, st.segment_size, st.sum, &st.phi);
                }
            }
        }
    }

    fn update_size(&self, st: &mut LbState<T>, res: &ChunkResult<T>) {
        let secs = res.elapsed;
        if secs < GROW_SECS {
            let ratio = st.sum.as_f64() / self.sum_approx.as_f64().max(1.0);
            if ratio < 0.90 {
                if st.segments * 2 * st.segment_size <= self.max_size {
                    st.segments *= 2;
                } else if st.segment_size < self.max_size {
                    st.segment_size = ceil128((st.segment_size * 2).min(self.max_size));
                }
            }
        } else if secs > SHRINK_SECS {
            if st.segments > 1 {
                st.segments /= 2;
            } else if st.segment_size > self.min_size {
                st.segment_size = ceil128((st.segment_size / 2).max(self.min_size));
            }
        }
    }

    /// Consume the balancer; the folded total and the final phi.
    pub fn finish(self) -> Result<(T, Vec<i64>), Error> {
        if let Ok(mut status) = self.status.lock() {
            status.finish();
        }
        let st = self.state.into_inner().unwrap();
        if let Some(e) = st.error {
            return Err(e);
        }
        if self.prefs.abort() {
            return Err(Error::Interrupted);
        }
        debug_assert!(st.pending.is_empty());
        debug_assert!(st.applied_low >= self.sieve_limit);
        Ok((st.sum, st.phi))
    }
}

/// Thread sizing for the P2 / B kernels: the sieving distance per
/// thread doubles while batches stay under a minute and halves
/// beyond, within [2^23, ceil((z - low) / threads)].
pub struct LoadBalancerP2 {
    z: i64,
    min_dist: i64,
    thread_dist: i64,
    threads: usize,
}

impl LoadBalancerP2 {
    pub fn new(low: i64, z: i64, threads: usize) -> Self {
        let min_dist = 1 << 23;
        let threads = ideal_num_threads(threads, z.saturating_sub(low).max(1), 1 << 16);
        LoadBalancerP2 {
            z,
            min_dist,
            thread_dist: min_dist,
            threads,
        }
    }

    pub fn get_threads(&self) -> usize {
        self.threads
    }

    pub fn set_thread_dist(&mut self, dist: i64) {
        self.thread_dist = dist.max(1);
    }

    /// Distance for the next batch starting at `low`; `elapsed` is
    /// the wall time of the previous batch (0 for the first).
    pub fn thread_dist(&mut self, low: i64, elapsed: f64) -> i64 {
        if elapsed > 0.0 {
            if elapsed < 60.0 {
                self.thread_dist *= 2;
            } else {
                self.thread_dist /= 2;
            }
        }
        let max_dist = ceil_div((self.z - low).max(1), self.threads as i64);
        self.thread_dist = in_between(self.min_dist.min(max_dist), self.thread_dist, max_dist);
        self.thread_dist
    }
}

#[cfg(test)]
fn chunk_result(w: Work, limit: i64, elapsed: f64) -> ChunkResult<i64> {
    ChunkResult {
        low: w.low,
        high: (w.low + w.segments * w.segment_size).min(limit),
        sum: 1,
        first_b: 8,
        phi_delta: vec![10, 20],
        mu_sum: vec![1, -1],
        elapsed,
    }
}

#[test]
fn test_balancer_monotone_and_bounded() {
    let mut prefs = Preferences::default();
    prefs.threads = Some(4);
    let limit: i64 = 3 << 26;
    let lb: LoadBalancer<i64> = LoadBalancer::new(1e15, limit, 1 << 40, &prefs);
    let mut prev_low = -1i64;
    let mut batches = 0;
    let mut work = lb.get_work(None).unwrap();
    while let Some(w) = work {
        assert!(w.low > prev_low, "low must increase");
        assert!(w.segment_size % 128 == 0);
        assert!(w.segment_size >= (1 << 23).min(ceil128(isqrt(limit).max(1 << 23))));
        assert!(w.segment_size <= ceil128(isqrt(limit).max(1 << 23)));
        prev_low = w.low;
        batches += 1;
        assert!(batches < 10_000, "must terminate");
        // fast batches: the balancer should grow the chunks
        work = lb.get_work(Some(chunk_result(w, limit, 1.0))).unwrap();
    }
    let (sum, phi) = lb.finish().unwrap();
    assert_eq!(phi.len(), 10);
    // every chunk contributed phi_delta [10, 20] at levels [8, 9]
    assert_eq!(phi[8] % 10, 0);
    assert_eq!(phi[9] % 20, 0);
    assert!(sum != 0);
}

#[test]
fn test_balancer_out_of_order_stitching() {
    let prefs = Preferences::default();
    let limit = 100 * 128;
    let mut lb: LoadBalancer<i64> = LoadBalancer::new(1e10, limit, 1 << 30, &prefs);
    // force tiny chunks so that several are in flight
    lb.resume(0, 1, 128, 0, vec![]);
    // pull two chunks, report them in reverse order
    let w1 = lb.get_work(None).unwrap().unwrap();
    let w2 = lb.get_work(None).unwrap().unwrap();
    assert!(w2.low > w1.low);
    let r1 = chunk_result(w1, limit, 1.0);
    let r2 = chunk_result(w2, limit, 1.0);
    // r2 first: must be buffered, phi still empty
    lb.get_work(Some(r2)).unwrap();
    lb.get_work(Some(r1)).unwrap();
    while let Some(w) = lb.get_work(None).unwrap() {
        lb.get_work(Some(chunk_result(w, limit, 1.0))).unwrap();
    }
    let (sum, phi) = lb.finish().unwrap();
    // chunk k sees phi[8] = 10k, phi[9] = 20k from earlier chunks:
    // sum = sum_k (1 + 10k - 20k)
    let n = phi[8] / 10;
    let expected: i64 = (0..n).map(|k| 1 + 10 * k - 20 * k).sum();
    assert_eq!(sum, expected);
}

#[test]
fn test_balancer_overflow_detected() {
    let prefs = Preferences::default();
    let limit = 100 * 128;
    let mut lb: LoadBalancer<i64> = LoadBalancer::new(1e10, limit, 1 << 30, &prefs);
    lb.resume(0, 1, 128, 0, vec![]);
    let w1 = lb.get_work(None).unwrap().unwrap();
    let w2 = lb.get_work(None).unwrap().unwrap();
    let mut r1 = chunk_result(w1, limit, 1.0);
    r1.phi_delta = vec![i64::MAX / 2, 0];
    let mut r2 = chunk_result(w2, limit, 1.0);
    r2.mu_sum = vec![4, 0];
    lb.get_work(Some(r1)).unwrap();
    let err = lb.get_work(Some(r2));
    assert_eq!(err.unwrap_err(), Error::NumericOverflow);
}

#[test]
fn test_balancer_p2() {
    let mut lb = LoadBalancerP2::new(0, 1 << 30, 4);
    assert!(lb.get_threads() >= 1);
    let d0 = lb.thread_dist(0, 0.0);
    assert_eq!(d0, 1 << 23);
    let d1 = lb.thread_dist(d0, 1.0);
    assert_eq!(d1, 1 << 24);
    let d2 = lb.thread_dist(2 * d1, 100.0);
    assert_eq!(d2, 1 << 23);
    // near the end the distance is capped by the remaining range
    let d3 = lb.thread_dist((1 << 30) - 1024, 1.0);
    assert!(d3 <= ceil_div(1024, lb.get_threads() as i64).max(1));
}
