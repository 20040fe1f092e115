// Copyright 2024 Rémy Oudompheng. All rights reserved.
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Command line interface for the prime counting library.
//!
//! Numbers can be plain integers or small arithmetic expressions
//! such as 10^14 or 2^63-1.

use std::path::PathBuf;
use std::time::Instant;

use yamapix::gourdon::{self, Formula};
use yamapix::{deleglise, expr, lehmer, lmo, nthprime, p2, phi, ri};
use yamapix::{Error, Preferences, Verbosity};

const USAGE: &str = "Usage: ympix x [options]

Count the primes below x using the combinatorial method.

Options:
  -l, --legendre          count primes with Legendre's formula
  -m, --meissel           count primes with Meissel's formula
      --lehmer            count primes with Lehmer's formula
      --lmo               count primes with Lagarias-Miller-Odlyzko
      --deleglise-rivat   count primes with Deleglise-Rivat
  -g, --gourdon           count primes with Gourdon's algorithm (default)
  -p, --primesieve        count primes by pure sieving
  -n, --nth-prime         compute the n-th prime
      --phi X A           count numbers <= X not divisible by any
                          of the first A primes
      --Li                offset logarithmic integral
      --Li-inverse        inverse of Li
      --Ri                Riemann R function
      --Ri-inverse        inverse of Ri
      --AC, -B, -D, --Phi0, --Sigma
                          individual formulas of Gourdon's algorithm
  -t, --threads N         number of worker threads
  -a, --alpha F           tuning factor y = alpha * x^(1/3)
      --alpha-y F         Gourdon tuning y = alpha_y * x^(1/3)
      --alpha-z F         Gourdon tuning z = alpha_z * y
  -s, --status[=PREC]     print a progress line while sieving
      --time              print the elapsed time
  -b, --backup FILE       checkpoint the computation into FILE
  -r, --resume[=FILE]     resume from a checkpoint
      --number NUM        use NUM as the number x
      --verbose           print formula banners and timings
      --test              run the self tests (exit 1 on failure)
  -v, --version           print version
  -h, --help              this help";

const NO_PARAM: &[&str] = &[
    "-l",
    "--legendre",
    "-m",
    "--meissel",
    "--lehmer",
    "--lmo",
    "--deleglise-rivat",
    "-g",
    "--gourdon",
    "-p",
    "--primesieve",
    "-n",
    "--nth-prime",
    "--phi",
    "--Li",
    "--Li-inverse",
    "--Ri",
    "--Ri-inverse",
    "--AC",
    "-B",
    "--B",
    "-D",
    "--D",
    "--Phi0",
    "--Sigma",
    "--time",
    "--test",
    "--verbose",
    "-v",
    "--version",
    "-h",
    "--help",
    "-s",
    "--status",
];

// Rewrite argv for the `arguments` parser: split --opt=val and
// give the parameterless flags an explicit value so that they do
// not swallow the number that follows them.
fn normalize(argv: Vec<String>) -> Result<Vec<String>, Error> {
    let mut out = vec![];
    let mut iter = argv.into_iter().peekable();
    while let Some(tok) = iter.next() {
        if tok.starts_with('-') && tok.contains('=') {
            let (name, val) = tok.split_once('=').unwrap();
            if val.is_empty() {
                return Err(Error::Option(tok.clone()));
            }
            out.push(name.to_string());
            out.push(val.to_string());
        } else if tok == "-r" || tok == "--resume" {
            out.push(tok);
            // optional FILE: anything that is not an option and
            // not a number expression
            let is_file = iter.peek().map_or(false, |next| {
                !next.starts_with('-')
                    && next
                        .chars()
                        .any(|c| !c.is_ascii_digit() && !"^*/+() ".contains(c))
            });
            if is_file {
                out.push(iter.next().unwrap());
            } else {
                out.push("true".to_string());
            }
        } else if NO_PARAM.contains(&tok.as_str()) {
            out.push(tok);
            out.push("true".to_string());
        } else {
            out.push(tok);
        }
    }
    Ok(out)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mode {
    Pi,
    Legendre,
    Meissel,
    Lehmer,
    Lmo,
    DelegliseRivat,
    Gourdon,
    Primesieve,
    NthPrime,
    Phi,
    Li,
    LiInverse,
    Ri,
    RiInverse,
    Gf(Formula),
}

fn flag(arg: &arguments::Arguments, name: &str) -> bool {
    arg.get::<bool>(name).unwrap_or(false)
}

fn as_i64(x: u128, what: &str) -> Result<i64, Error> {
    i64::try_from(x).map_err(|_| Error::NumericParse(format!("{what}: {x} exceeds 2^63-1")))
}

fn run() -> Result<(), Error> {
    let argv: Vec<String> = std::env::args().collect();
    if argv.len() <= 1 {
        eprintln!("{USAGE}");
        std::process::exit(1);
    }
    let argv = normalize(argv)?;
    let arg =
        arguments::parse(argv.into_iter()).map_err(|e| Error::Option(e.to_string()))?;

    if flag(&arg, "help") || flag(&arg, "h") {
        println!("{USAGE}");
        return Ok(());
    }
    if flag(&arg, "version") || flag(&arg, "v") {
        println!("ympix {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let mut prefs = Preferences::default();
    prefs.threads = arg.get::<usize>("threads").or_else(|| arg.get("t"));
    prefs.alpha = arg.get::<f64>("alpha").or_else(|| arg.get("a"));
    prefs.alpha_y = arg.get::<f64>("alpha-y");
    prefs.alpha_z = arg.get::<f64>("alpha-z");
    if flag(&arg, "verbose") {
        prefs.verbosity = Verbosity::Info;
    }
    let mut time = flag(&arg, "time");
    for name in ["status", "s"] {
        if let Some(v) = arg.get::<String>(name) {
            prefs.status = true;
            time = true;
            prefs.verbosity = prefs.verbosity.max(Verbosity::Info);
            if v != "true" {
                let precision = v
                    .parse::<usize>()
                    .map_err(|_| Error::Option(format!("--status={v}")))?;
                prefs.status_precision = Some(precision);
            }
        }
    }

    let backup = arg
        .get::<String>("backup")
        .or_else(|| arg.get("b"))
        .map(PathBuf::from);
    let resume = arg
        .get::<String>("resume")
        .or_else(|| arg.get("r"));
    if let Some(r) = &resume {
        prefs.resume = true;
        let file = if r == "true" {
            backup.clone().unwrap_or_else(|| PathBuf::from("ympix.backup"))
        } else {
            PathBuf::from(r)
        };
        if let Some(b) = &backup {
            if *b != file {
                return Err(Error::Option(
                    "resume and backup file must be identical".into(),
                ));
            }
        }
        prefs.backup_file = Some(file);
        // surface unreadable checkpoints before computing
        yamapix::backup::load(&prefs)?;
    } else {
        prefs.backup_file = backup;
    }

    if flag(&arg, "test") {
        return self_test(&prefs);
    }

    let mut numbers: Vec<u128> = vec![];
    if let Some(n) = arg.get::<String>("number") {
        numbers.push(expr::eval(&n)?);
    }
    for orphan in &arg.orphans {
        numbers.push(expr::eval(orphan)?);
    }

    let mut mode = Mode::Pi;
    for (name, m) in [
        ("legendre", Mode::Legendre),
        ("l", Mode::Legendre),
        ("meissel", Mode::Meissel),
        ("m", Mode::Meissel),
        ("lehmer", Mode::Lehmer),
        ("lmo", Mode::Lmo),
        ("deleglise-rivat", Mode::DelegliseRivat),
        ("gourdon", Mode::Gourdon),
        ("g", Mode::Gourdon),
        ("primesieve", Mode::Primesieve),
        ("p", Mode::Primesieve),
        ("nth-prime", Mode::NthPrime),
        ("n", Mode::NthPrime),
        ("phi", Mode::Phi),
        ("Li", Mode::Li),
        ("Li-inverse", Mode::LiInverse),
        ("Ri", Mode::Ri),
        ("Ri-inverse", Mode::RiInverse),
        ("AC", Mode::Gf(Formula::Ac)),
        ("B", Mode::Gf(Formula::B)),
        ("D", Mode::Gf(Formula::D)),
        ("Phi0", Mode::Gf(Formula::Phi0)),
        ("Sigma", Mode::Gf(Formula::Sigma)),
    ] {
        if flag(&arg, name) {
            mode = m;
        }
    }

    let Some(&x) = numbers.first() else {
        return Err(Error::Option("missing x number".into()));
    };

    let threads = prefs.num_threads();
    let tpool = if threads > 1 {
        Some(
            rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .build()
                .map_err(|e| Error::Option(format!("cannot create thread pool: {e}")))?,
        )
    } else {
        None
    };
    let tpool = tpool.as_ref();

    let start = Instant::now();
    let result: String = match mode {
        Mode::Pi => yamapix::pi_u128(x, &prefs, tpool)?.to_string(),
        Mode::Legendre => lehmer::pi_legendre(as_i64(x, "x")?, &prefs, tpool)?.to_string(),
        Mode::Meissel => lehmer::pi_meissel(as_i64(x, "x")?, &prefs, tpool)?.to_string(),
        Mode::Lehmer => lehmer::pi_lehmer(as_i64(x, "x")?, &prefs, tpool)?.to_string(),
        Mode::Lmo => lmo::pi_lmo(as_i64(x, "x")?, &prefs, tpool)?.to_string(),
        Mode::DelegliseRivat => deleglise::pi_deleglise_rivat_u128(x, &prefs, tpool)?.to_string(),
        Mode::Gourdon => gourdon::pi_gourdon_u128(x, &prefs, tpool)?.to_string(),
        Mode::Primesieve => lehmer::pi_primesieve(as_i64(x, "x")?).to_string(),
        Mode::NthPrime => nthprime::nth_prime(as_i64(x, "n")?, &prefs, tpool)?.to_string(),
        Mode::Phi => {
            let Some(&a) = numbers.get(1) else {
                return Err(Error::Option("option --phi requires 2 numbers".into()));
            };
            phi::phi(as_i64(x, "x")?, as_i64(a, "a")?, &prefs, tpool).to_string()
        }
        Mode::Li => ri::li(x).to_string(),
        Mode::LiInverse => ri::li_inverse(x).to_string(),
        Mode::Ri => ri::ri(x).to_string(),
        Mode::RiInverse => ri::ri_inverse(x).to_string(),
        Mode::Gf(f) => {
            if x <= i64::MAX as u128 {
                gourdon::formula(x as i64, f, &prefs, tpool)?.to_string()
            } else {
                if x >= yamapix::MAX_X {
                    return Err(Error::NumericOverflow);
                }
                gourdon::formula(x as i128, f, &prefs, tpool)?.to_string()
            }
        }
    };
    println!("{result}");
    if time {
        println!("Seconds: {:.3}", start.elapsed().as_secs_f64());
    }
    Ok(())
}

fn self_test(prefs: &Preferences) -> Result<(), Error> {
    use rand::Rng;

    fn check(name: &str, ok: bool) -> Result<(), Error> {
        println!("{name}   {}", if ok { "OK" } else { "ERROR" });
        if ok {
            Ok(())
        } else {
            Err(Error::SelfTest(name.to_string()))
        }
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(prefs.num_threads())
        .build()
        .ok();
    let tpool = pool.as_ref();

    // pi(10^n)
    const PI_POW10: [i64; 9] = [
        4, 25, 168, 1229, 9592, 78498, 664579, 5761455, 50847534,
    ];
    for (i, &expected) in PI_POW10.iter().enumerate() {
        let x = 10i64.pow(i as u32 + 1);
        let got = yamapix::pi(x, prefs, tpool)?;
        check(&format!("pi(10^{}) = {got}", i + 1), got == expected)?;
    }

    // all algorithms must agree
    let mut rng = rand::thread_rng();
    for _ in 0..5 {
        let x = rng.gen_range(1_000_000i64..10_000_000);
        let expected = lehmer::pi_legendre(x, prefs, tpool)?;
        let results = [
            ("pi_meissel", lehmer::pi_meissel(x, prefs, tpool)?),
            ("pi_lehmer", lehmer::pi_lehmer(x, prefs, tpool)?),
            ("pi_lmo", lmo::pi_lmo(x, prefs, tpool)?),
            (
                "pi_deleglise_rivat",
                deleglise::pi_deleglise_rivat(x, prefs, tpool)?,
            ),
            ("pi_gourdon", gourdon::pi_gourdon(x, prefs, tpool)?),
        ];
        for (name, got) in results {
            check(&format!("{name}({x}) = {got}"), got == expected)?;
        }
    }

    // phi(x, pi(sqrt(x))) = pi(x) - pi(sqrt(x)) + 1
    let x = 1_000_000;
    let a = lehmer::pi_simple(1000, prefs, tpool);
    let phi_xa = phi::phi(x, a, prefs, tpool);
    check(
        &format!("phi({x}, {a}) = {phi_xa}"),
        phi_xa == 78498 - 168 + 1,
    )?;
    check("P2(100, 4) = 9", p2::p2::<i64>(100, 4, prefs, None)? == 9)?;

    // nth_prime and its round trip
    let p = nthprime::nth_prime(10_000, prefs, tpool)?;
    check(&format!("nth_prime(10^4) = {p}"), p == 104_729)?;
    for _ in 0..3 {
        let n = rng.gen_range(10_000i64..1_000_000);
        let p = nthprime::nth_prime(n, prefs, tpool)?;
        let count = yamapix::pi(p, prefs, tpool)?;
        check(&format!("pi(nth_prime({n})) = {count}"), count == n)?;
    }

    // Ri / Li brackets
    for exp in [6u32, 9, 12] {
        let x = 10u128.pow(exp);
        let rix = ri::ri(x);
        let ok = ri::ri_inverse(rix) < x && x <= ri::ri_inverse(rix + 1);
        check(&format!("Ri_inverse(Ri(10^{exp}))"), ok)?;
    }

    println!();
    println!("All tests passed successfully!");
    Ok(())
}

fn main() {
    match run() {
        Ok(()) => {}
        Err(e) => {
            eprintln!("ympix: {e}");
            eprintln!("Try 'ympix --help' for more information.");
            std::process::exit(1);
        }
    }
}
