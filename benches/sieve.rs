// Copyright 2024 Rémy Oudompheng. All rights reserved.
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use brunch::Bench;

use yamapix::pitable::PiTable;
use yamapix::primes::{generate_primes, sieve_primes};
use yamapix::sieve::Sieve;
use yamapix::Preferences;

brunch::benches! {
    Bench::new("sieve_primes(10^6)")
    .run_seeded(1_000_000u64, sieve_primes),
    Bench::new("sieve_primes(10^7)")
    .run_seeded(10_000_000u64, sieve_primes),
    Bench::new("PiTable(10^7)")
    .run_seeded(10_000_000i64, |limit| PiTable::new(limit, None)),
    {
        // pre-sieve + cross off all primes < 1000 over one segment
        let primes = generate_primes(1000);
        Bench::new("cross_off_count 2^20")
        .run_seeded(primes, |primes| {
            let mut sieve = Sieve::new(primes.len());
            sieve.pre_sieve(&primes, 7, 0, 1 << 20);
            for b in 8..primes.len() {
                sieve.cross_off_count(primes[b], b);
            }
            sieve.total_count()
        })
    },
    {
        // one counting query per 2^10 positions
        let primes = generate_primes(1000);
        Bench::new("count queries 2^20")
        .run_seeded(primes, |primes| {
            let mut sieve = Sieve::new(primes.len());
            sieve.pre_sieve(&primes, 7, 0, 1 << 20);
            let mut total = 0i64;
            for stop in (0..(1i64 << 20)).step_by(1 << 10) {
                total += sieve.count(stop);
            }
            total
        })
    },
    Bench::new("pi_lmo(10^9)")
    .run_seeded(1_000_000_000i64, |x| {
        yamapix::lmo::pi_lmo(x, &Preferences::default(), None).unwrap()
    }),
}
