//! # Log-Ratio Reparameterization Codec
//!
//! Stateless pure functions converting between the model's constrained
//! parameter space (simplices and positive scalars) and an unconstrained real
//! vector suitable for gradient- or Hessian-based MCMC proposals, tracking
//! the log-Jacobian of each transform.
//!
//! For a simplex `{a, b, c, d}` the forward transform pivots on the first
//! coordinate and produces `{log(b/a), log(c/a), log(d/a)}`; with
//! `phi = b/a + c/a + d/a = (1-a)/a` the inverse recovers `a = 1/(1+phi)`.
//!
//! Note the Jacobian bookkeeping is intentionally asymmetric: the forward
//! Jacobian sums the logs of the *original* constrained coordinates while the
//! inverse Jacobian sums the logs of the *reconstructed* coordinates. The two
//! are used additively along encode/decode within a single MCMC step and are
//! not algebraic negatives of one another; both formulas must stay exactly as
//! written.

use crate::error::{PetrelError, Result};

/// Transform a vector of k positive values (a simplex up to normalization)
/// into k-1 unconstrained log ratios.
///
/// Returns the unconstrained vector and the log-Jacobian, which is the sum of
/// the logs of all k input coordinates (the pivot's log counted once).
pub fn log_ratio_forward(constrained: &[f64]) -> Result<(Vec<f64>, f64)> {
    if constrained.is_empty() {
        return Err(PetrelError::domain("cannot transform an empty vector"));
    }
    if let Some((i, &v)) = constrained
        .iter()
        .enumerate()
        .find(|(_, &v)| !(v > 0.0))
    {
        return Err(PetrelError::domain(format!(
            "component {} is {} but all components must be positive",
            i, v
        )));
    }

    let log_first = constrained[0].ln();
    let mut log_jacobian = log_first;
    let mut unconstrained = Vec::with_capacity(constrained.len() - 1);
    for &v in &constrained[1..] {
        let log_v = v.ln();
        log_jacobian += log_v;
        unconstrained.push(log_v - log_first);
    }
    Ok((unconstrained, log_jacobian))
}

/// Invert [`log_ratio_forward`]: recover k constrained values from k-1
/// unconstrained log ratios.
///
/// Returns the constrained vector and the log-Jacobian, which is the sum of
/// the logs of the k *reconstructed* coordinates.
pub fn log_ratio_inverse(unconstrained: &[f64]) -> (Vec<f64>, f64) {
    let mut constrained = Vec::with_capacity(unconstrained.len() + 1);
    constrained.push(1.0);
    let mut phi = 0.0;
    for &y in unconstrained {
        let r = y.exp();
        phi += r;
        constrained.push(r);
    }

    let scale = 1.0 + phi;
    let mut log_jacobian = 0.0;
    for v in &mut constrained {
        *v /= scale;
        log_jacobian += v.ln();
    }
    (constrained, log_jacobian)
}

/// Degenerate scalar case: a free positive scalar with no simplex partner
/// (omega, pinvar, rate variance) maps to its log. The Jacobian contribution
/// is `log(x)`, consistent with the general rule.
pub fn log_forward(x: f64) -> Result<(f64, f64)> {
    if !(x > 0.0) {
        return Err(PetrelError::domain(format!(
            "value {} must be positive for log transformation",
            x
        )));
    }
    let log_x = x.ln();
    Ok((log_x, log_x))
}

/// Inverse of [`log_forward`]. The Jacobian contribution is `y`, the log of
/// the recovered value.
pub fn log_inverse(y: f64) -> (f64, f64) {
    (y.exp(), y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    const TOL: f64 = 1e-9;

    fn random_simplex(rng: &mut StdRng, k: usize) -> Vec<f64> {
        let raw: Vec<f64> = (0..k).map(|_| rng.gen_range(0.05..1.0)).collect();
        let total: f64 = raw.iter().sum();
        raw.into_iter().map(|v| v / total).collect()
    }

    #[test]
    fn test_round_trip() {
        let mut rng = StdRng::seed_from_u64(42);
        for k in [2usize, 4, 6, 61] {
            let x = random_simplex(&mut rng, k);
            let (u, _) = log_ratio_forward(&x).unwrap();
            assert_eq!(u.len(), k - 1);
            let (back, _) = log_ratio_inverse(&u);
            assert_eq!(back.len(), k);
            for (orig, rec) in x.iter().zip(back.iter()) {
                assert!((orig - rec).abs() < TOL, "k={}: {} vs {}", k, orig, rec);
            }
        }
    }

    #[test]
    fn test_uniform_simplex_jacobian() {
        for k in [2usize, 4, 6, 61] {
            let x = vec![1.0 / k as f64; k];
            let (_, log_jacobian) = log_ratio_forward(&x).unwrap();
            let expected = -(k as f64) * (k as f64).ln();
            assert!((log_jacobian - expected).abs() < TOL);
        }
    }

    #[test]
    fn test_inverse_jacobian_is_log_product_of_result() {
        let u = vec![0.3, -0.8, 1.2];
        let (x, log_jacobian) = log_ratio_inverse(&u);
        let expected: f64 = x.iter().map(|v| v.ln()).sum();
        assert!((log_jacobian - expected).abs() < TOL);
    }

    #[test]
    fn test_scalar_round_trip() {
        let (y, fwd_jac) = log_forward(2.0).unwrap();
        assert!((y - 2.0f64.ln()).abs() < TOL);
        assert!((fwd_jac - 2.0f64.ln()).abs() < TOL);

        let (x, inv_jac) = log_inverse(y);
        assert!((x - 2.0).abs() < TOL);
        assert!((inv_jac - y).abs() < TOL);
    }

    #[test]
    fn test_rejects_empty_and_nonpositive() {
        assert!(matches!(
            log_ratio_forward(&[]),
            Err(PetrelError::Domain { .. })
        ));
        assert!(matches!(
            log_ratio_forward(&[0.5, 0.0, 0.5]),
            Err(PetrelError::Domain { .. })
        ));
        assert!(matches!(
            log_ratio_forward(&[0.5, -0.1, 0.6]),
            Err(PetrelError::Domain { .. })
        ));
        assert!(matches!(log_forward(0.0), Err(PetrelError::Domain { .. })));
        assert!(matches!(log_forward(-1.0), Err(PetrelError::Domain { .. })));
    }

    #[test]
    fn test_inverse_output_sums_to_one() {
        let u = vec![0.1, 0.2, -0.3, 2.0, -1.5];
        let (x, _) = log_ratio_inverse(&u);
        let total: f64 = x.iter().sum();
        assert!((total - 1.0).abs() < TOL);
        assert!(x.iter().all(|&v| v > 0.0));
    }
}
