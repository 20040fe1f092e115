// Copyright 2024 Rémy Oudompheng. All rights reserved.
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Progress line for the long running kernels.
//!
//! A single line "\rStatus: p%" is rewritten in place, at most
//! every 0.1 seconds, and only when stderr is a terminal. The
//! holder of the surrounding try-lock skips printing entirely if
//! another worker is already in here.

use std::io::{IsTerminal, Write};
use std::time::Instant;

use crate::params::get_status_precision;
use crate::Preferences;

pub struct Status {
    enabled: bool,
    precision: usize,
    epsilon: f64,
    percent: f64,
    last: Option<Instant>,
}

// Only reprint after 0.1 seconds have elapsed.
const PRINT_DELAY: f64 = 0.1;

impl Status {
    pub fn new(x: f64, prefs: &Preferences) -> Self {
        let precision = get_status_precision(x, prefs);
        Status {
            enabled: prefs.status && std::io::stderr().is_terminal(),
            precision,
            epsilon: 10f64.powi(-(precision as i32)),
            percent: -1.0,
            last: None,
        }
    }

    fn percent_linear(n: f64, limit: f64) -> f64 {
        if limit <= 0.0 {
            return 100.0;
        }
        (n / limit * 100.0).clamp(0.0, 100.0)
    }

    /// The distribution of the hard leaves is heavily skewed
    /// towards the start of the sieving interval; this maps the
    /// linear ratio to something closer to elapsed time.
    pub fn skewed_percent(n: f64, limit: f64) -> f64 {
        let exp = 0.96f64;
        let percent = Self::percent_linear(n, limit);
        let base = exp + percent / (101.0 / (1.0 - exp));
        let low = base.powf(100.0);
        let dividend = base.powf(percent) - low;
        100.0 - 100.0 * dividend / (1.0 - low)
    }

    /// Progress of a hard leaf computation: the maximum of the
    /// sieve position and of the partial sum against its estimate,
    /// the latter being capped since it is only an approximation.
    pub fn hard_percent(low: f64, limit: f64, sum: f64, sum_approx: f64) -> f64 {
        let p1 = Self::skewed_percent(low, limit);
        let p2 = Self::skewed_percent(sum, sum_approx);
        let percent = p1.max(p2);
        if p2 > 95.0 {
            p1.max(95.0)
        } else {
            percent
        }
    }

    pub fn print(&mut self, percent: f64) {
        if !self.enabled {
            return;
        }
        if let Some(last) = self.last {
            if last.elapsed().as_secs_f64() < PRINT_DELAY {
                return;
            }
        }
        self.last = Some(Instant::now());
        if percent - self.percent >= self.epsilon {
            self.percent = percent;
            let mut err = std::io::stderr().lock();
            let _ = write!(err, "\rStatus: {:.*}%", self.precision, percent);
            let _ = err.flush();
        }
    }

    /// Terminate the status line before printing results.
    pub fn finish(&mut self) {
        if self.enabled && self.percent >= 0.0 {
            let mut err = std::io::stderr().lock();
            let _ = writeln!(err, "\rStatus: {:.*}%", self.precision, 100.0);
            let _ = err.flush();
            self.percent = -1.0;
        }
    }
}

#[test]
fn test_skewed_percent() {
    assert!(Status::skewed_percent(0.0, 100.0) < 1e-9);
    let p = Status::skewed_percent(100.0, 100.0);
    assert!((p - 100.0).abs() < 1e-9, "p={p}");
    // skew maps early positions to larger percentages
    let half = Status::skewed_percent(50.0, 100.0);
    assert!(half > 50.0 && half < 100.0);
    let mut prev = 0.0;
    for i in 0..=100 {
        let p = Status::skewed_percent(i as f64, 100.0);
        assert!(p >= prev - 1e-9 && p <= 100.0 + 1e-9);
        prev = p;
    }
}

#[test]
fn test_hard_percent_caps_estimate() {
    // when the sum ratio says "almost done" but the sieve does
    // not, trust the sieve (the estimate is approximate)
    let p = Status::hard_percent(10.0, 100.0, 99.0, 100.0);
    assert!(p >= 95.0 && p <= 100.0);
}
