// Copyright 2024 Rémy Oudompheng. All rights reserved.
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! The n-th prime. Ri_inverse(n) lands within O(sqrt(p_n)) of the
//! answer, so one pi(x) call plus a local sieve walk suffices.

use crate::primes::{PrimeIter, ReversePrimeIter};
use crate::ri::ri_inverse;
use crate::{Error, Preferences};

pub fn nth_prime(
    n: i64,
    prefs: &Preferences,
    tpool: Option<&rayon::ThreadPool>,
) -> Result<i64, Error> {
    if n < 1 {
        return Err(Error::NumericParse(format!("nth_prime({n}): n must be >= 1")));
    }
    if n < 10_000 {
        let mut it = PrimeIter::new(1, 120_000);
        let mut prime = 0;
        for _ in 0..n {
            prime = it.next_prime();
        }
        return Ok(prime as i64);
    }

    let guess = ri_inverse(n as u128) as i64;
    let mut count = crate::pi(guess, prefs, tpool)?;
    if count < n {
        let mut it = PrimeIter::new(guess as u64, guess as u64 + 1);
        let mut prime = 0;
        while count < n {
            prime = it.next_prime();
            count += 1;
        }
        Ok(prime as i64)
    } else {
        let mut rit = ReversePrimeIter::new(guess as u64 + 1);
        let mut prime = rit.prev_prime();
        while count > n {
            prime = rit.prev_prime();
            count -= 1;
        }
        Ok(prime as i64)
    }
}

#[test]
fn test_nth_prime_small() {
    let prefs = Preferences::default();
    assert_eq!(nth_prime(1, &prefs, None).unwrap(), 2);
    assert_eq!(nth_prime(2, &prefs, None).unwrap(), 3);
    assert_eq!(nth_prime(25, &prefs, None).unwrap(), 97);
    assert_eq!(nth_prime(1000, &prefs, None).unwrap(), 7919);
    assert!(nth_prime(0, &prefs, None).is_err());
}

#[test]
fn test_nth_prime_medium() {
    let prefs = Preferences::default();
    assert_eq!(nth_prime(10_000, &prefs, None).unwrap(), 104729);
    assert_eq!(nth_prime(100_000, &prefs, None).unwrap(), 1299709);
    assert_eq!(nth_prime(1_000_000, &prefs, None).unwrap(), 15485863);
    assert_eq!(nth_prime(10_000_000, &prefs, None).unwrap(), 179424673);
}

#[test]
#[ignore = "takes minutes; run with --ignored"]
fn test_nth_prime_large() {
    let prefs = Preferences::default();
    let pool = rayon::ThreadPoolBuilder::new().build().unwrap();
    assert_eq!(
        nth_prime(1_000_000_000, &prefs, Some(&pool)).unwrap(),
        22_801_763_489
    );
}

#[test]
fn test_nth_prime_round_trip() {
    use rand::Rng;
    let prefs = Preferences::default();
    let mut rng = rand::thread_rng();
    for _ in 0..10 {
        let n = rng.gen_range(10_000..1_000_000);
        let p = nth_prime(n, &prefs, None).unwrap();
        assert_eq!(crate::pi(p, &prefs, None).unwrap(), n, "n={n}");
        // p is the largest prime <= p
        assert_eq!(crate::pi(p - 1, &prefs, None).unwrap(), n - 1, "n={n}");
    }
}
