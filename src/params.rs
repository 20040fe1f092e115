use crate::Preferences;

// Tuning factors. y = alpha * x^(1/3) balances the cost of the
// easy and hard special leaves; any alpha in [1, x^(1/6)] gives
// the same pi(x), only the run time changes.

/// Default alpha for the Lagarias-Miller-Odlyzko algorithm, see:
/// Tomás Oliveira e Silva, Computing pi(x): the combinatorial method,
/// Revista do DETUA, vol. 4, no. 6, pp. 763-764, March 2006.
pub fn get_alpha_lmo(x: f64) -> f64 {
    let beta = 1.1;
    (x.max(16.0).ln().ln() * beta).max(1.0)
}

/// Default alpha for Deléglise-Rivat, a cubic fit in log10(x).
pub fn get_alpha_dr(x: f64, prefs: &Preferences) -> f64 {
    let alpha = match prefs.alpha {
        Some(a) => a,
        None => {
            let d = x.max(100.0).log10();
            (d * d * d / 150.0).max(1.0)
        }
    };
    validate_alpha(x, alpha)
}

/// Gourdon's y = alpha_y * x^(1/3).
pub fn get_alpha_y(x: f64, prefs: &Preferences) -> f64 {
    let alpha = match prefs.alpha_y.or(prefs.alpha) {
        Some(a) => a,
        None => {
            let d = x.max(100.0).log10();
            (d * d * d / 175.0).max(1.0)
        }
    };
    validate_alpha(x, alpha)
}

/// Gourdon's z = alpha_z * y. Kept small: the hard leaf engine
/// requires alpha_z < p(k+1) so that a composite special leaf
/// cannot contain a prime factor above y.
pub fn get_alpha_z(prefs: &Preferences) -> f64 {
    let alpha = prefs.alpha_z.unwrap_or(1.5);
    alpha.clamp(1.0, 8.0)
}

/// Clamp alpha into [1, x^(1/6)].
pub fn validate_alpha(x: f64, alpha: f64) -> f64 {
    alpha.clamp(1.0, x.max(64.0).powf(1.0 / 6.0))
}

/// Number of digits printed in the status line; higher precision
/// is only useful for very long computations.
pub fn get_status_precision(x: f64, prefs: &Preferences) -> usize {
    if let Some(p) = prefs.status_precision {
        return p.min(5);
    }
    if x >= 1e23 {
        3
    } else if x >= 1e21 {
        2
    } else if x >= 1e19 {
        1
    } else {
        0
    }
}

#[test]
fn test_alpha() {
    let prefs = Preferences::default();
    for exp in 5..27 {
        let x = 10f64.powi(exp);
        let a = get_alpha_dr(x, &prefs);
        assert!(a >= 1.0 && a <= x.powf(1.0 / 6.0));
        let ay = get_alpha_y(x, &prefs);
        assert!(ay >= 1.0 && ay <= x.powf(1.0 / 6.0));
    }
    assert_eq!(get_alpha_z(&prefs), 1.5);
    let mut p2 = Preferences::default();
    p2.alpha_z = Some(100.0);
    assert_eq!(get_alpha_z(&p2), 8.0);
    p2.alpha = Some(3.0);
    assert_eq!(get_alpha_dr(1e12, &p2), 3.0);
}

#[test]
fn test_status_precision() {
    let prefs = Preferences::default();
    assert_eq!(get_status_precision(1e10, &prefs), 0);
    assert_eq!(get_status_precision(1e19, &prefs), 1);
    assert_eq!(get_status_precision(1e24, &prefs), 3);
}
