//! Combinatorial prime counting.
//!
//! This crate computes pi(x), the number of primes not exceeding x,
//! for x up to about 10^27, using the combinatorial method: the
//! Lagarias-Miller-Odlyzko algorithm, the Deléglise-Rivat refinement
//! and Xavier Gourdon's variant. All of them reduce pi(x) to partial
//! sums over special leaves evaluated against a segmented sieve that
//! can count its unsieved elements in sublinear time while being
//! crossed off.
//!
//! Bibliography:
//!
//! J. C. Lagarias, V. S. Miller, A. M. Odlyzko, Computing pi(x):
//! The Meissel-Lehmer method, Mathematics of Computation 44 (1985)
//! <https://doi.org/10.1090/S0025-5718-1985-0777285-5>
//!
//! M. Deléglise, J. Rivat, Computing pi(x): The Meissel, Lehmer,
//! Lagarias, Miller, Odlyzko method, Mathematics of Computation 65
//! (1996) <https://doi.org/10.1090/S0025-5718-96-00674-6>
//!
//! X. Gourdon, Computation of pi(x): improvements to the Meissel,
//! Lehmer, Lagarias, Miller, Odlyzko, Deléglise and Rivat method (2001)
//!
//! T. Oliveira e Silva, Computing pi(x): the combinatorial method,
//! Revista do DETUA 4 (2006), pp. 759-768
//!
//! D. B. Staple, The combinatorial algorithm for computing pi(x),
//! arXiv:1503.01839 (2015)

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

pub mod arith;
pub mod backup;
pub mod deleglise;
pub mod easyleaves;
pub mod expr;
pub mod gourdon;
pub mod hardleaves;
pub mod lehmer;
pub mod lmo;
pub mod loadbalancer;
pub mod nthprime;
pub mod ordinary;
pub mod p2;
pub mod params;
pub mod phi;
pub mod pitable;
pub mod primes;
pub mod ri;
pub mod sieve;
pub mod status;

pub use crate::arith::Counting;

/// How much diagnostics is printed to stderr.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Verbosity {
    Silent,
    Info,
    Verbose,
    Debug,
}

/// Process-wide options, set once at startup and threaded through
/// every kernel. Reads are lock-free.
#[derive(Debug)]
pub struct Preferences {
    pub threads: Option<usize>,
    /// Tuning factor y = alpha * x^(1/3) (Deléglise-Rivat, LMO).
    pub alpha: Option<f64>,
    /// Gourdon tuning: y = alpha_y * x^(1/3).
    pub alpha_y: Option<f64>,
    /// Gourdon tuning: z = alpha_z * y.
    pub alpha_z: Option<f64>,
    /// Print a progress line while sieving.
    pub status: bool,
    pub status_precision: Option<usize>,
    pub backup_file: Option<PathBuf>,
    pub resume: bool,
    pub verbosity: Verbosity,
    abort: AtomicBool,
}

impl Default for Preferences {
    fn default() -> Self {
        Preferences {
            threads: None,
            alpha: None,
            alpha_y: None,
            alpha_z: None,
            status: false,
            status_precision: None,
            backup_file: None,
            resume: false,
            verbosity: Verbosity::Silent,
            abort: AtomicBool::new(false),
        }
    }
}

impl Preferences {
    pub fn verbose(&self, v: Verbosity) -> bool {
        self.verbosity >= v
    }

    /// Request cooperative cancellation: workers finish their
    /// current segment and drain.
    pub fn interrupt(&self) {
        self.abort.store(true, Ordering::Relaxed);
    }

    pub fn abort(&self) -> bool {
        self.abort.load(Ordering::Relaxed)
    }

    pub fn num_threads(&self) -> usize {
        self.threads.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }
}

/// Error kinds; kernels fail loudly and deterministically.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// Unrecognized or malformed command line option.
    Option(String),
    /// An expression could not be evaluated or exceeds the
    /// supported range.
    NumericParse(String),
    /// A 64-bit or 128-bit accumulator would overflow.
    NumericOverflow,
    /// Backup file could not be opened, parsed, or does not match.
    BackupIo(String),
    SelfTest(String),
    /// The computation was cancelled before completion.
    Interrupted,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Option(s) => write!(f, "invalid option {s}"),
            Error::NumericParse(s) => write!(f, "invalid number: {s}"),
            Error::NumericOverflow => write!(f, "arithmetic overflow"),
            Error::BackupIo(s) => write!(f, "backup error: {s}"),
            Error::SelfTest(s) => write!(f, "self test failed: {s}"),
            Error::Interrupted => write!(f, "interrupted"),
        }
    }
}

impl std::error::Error for Error {}

/// Largest x accepted by the 128-bit entry points. Above this the
/// accumulators could overflow i128, so the input is rejected up
/// front rather than wrapping.
pub const MAX_X: u128 = 1 << 126;

/// Number of primes <= x, using the fastest algorithm for the size
/// of x.
pub fn pi(x: i64, prefs: &Preferences, tpool: Option<&rayon::ThreadPool>) -> Result<i64, Error> {
    if x < 2 {
        return Ok(0);
    }
    if x <= 100_000 {
        return Ok(lehmer::pi_primesieve(x));
    }
    gourdon::pi_gourdon(x, prefs, tpool)
}

/// 128-bit entry point, for x beyond 2^63.
pub fn pi_u128(
    x: u128,
    prefs: &Preferences,
    tpool: Option<&rayon::ThreadPool>,
) -> Result<u128, Error> {
    if x >= MAX_X {
        return Err(Error::NumericOverflow);
    }
    if x <= i64::MAX as u128 {
        return pi(x as i64, prefs, tpool).map(|r| r as u128);
    }
    gourdon::pi_gourdon_u128(x, prefs, tpool)
}

pub use crate::nthprime::nth_prime;
pub use crate::phi::phi;

#[test]
fn test_pi_dispatch() {
    let prefs = Preferences::default();
    assert_eq!(pi(-5, &prefs, None).unwrap(), 0);
    assert_eq!(pi(1, &prefs, None).unwrap(), 0);
    assert_eq!(pi(2, &prefs, None).unwrap(), 1);
    assert_eq!(pi(10, &prefs, None).unwrap(), 4);
    assert_eq!(pi(100, &prefs, None).unwrap(), 25);
    assert_eq!(pi(1000, &prefs, None).unwrap(), 168);
    assert_eq!(pi_u128(100, &prefs, None).unwrap(), 25);
    assert_eq!(pi_u128(MAX_X, &prefs, None), Err(Error::NumericOverflow));
}
