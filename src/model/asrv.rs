//! # Among-Site Rate Variation Holder
//!
//! Per-subset ASRV settings: the shape of the discretized gamma distribution
//! (stored as its variance, the inverse of the usual alpha), the proportion
//! of invariable sites, and the category count. Rate variance and pinvar are
//! [`Shared`](crate::model::param::Shared) storage so they can be linked
//! across subsets.
//!
//! The holder derives the per-category rate scalers and weights consumed by
//! the likelihood engine. Gamma categories have equal probability and carry
//! the mean rate of their slice (Yang 1994); under the invariable-sites model
//! a zero-rate category of weight pinvar is prepended and the gamma rates are
//! scaled by 1/(1-pinvar), keeping the overall mean rate at 1.

use crate::model::param::RealParam;

/// Rate variance below this is treated as no rate heterogeneity.
const MIN_RATE_VAR: f64 = 1e-9;

/// ASRV parameter holder for one subset.
#[derive(Debug)]
pub struct Asrv {
    rate_var: RealParam,
    pinvar: RealParam,
    num_categ: usize,
    invar_model: bool,
    rate_var_fixed: bool,
    pinvar_fixed: bool,
    rates: Vec<f64>,
    probs: Vec<f64>,
}

impl Asrv {
    /// A fresh, unshared holder: one category, no invariable class.
    pub fn new() -> Self {
        let mut asrv = Self {
            rate_var: RealParam::new(1.0),
            pinvar: RealParam::new(0.0),
            num_categ: 1,
            invar_model: false,
            rate_var_fixed: false,
            pinvar_fixed: false,
            rates: Vec::new(),
            probs: Vec::new(),
        };
        asrv.recalc();
        asrv
    }

    pub fn num_categ(&self) -> usize {
        self.num_categ
    }

    pub fn is_invar_model(&self) -> bool {
        self.invar_model
    }

    pub fn rate_var(&self) -> f64 {
        self.rate_var.get()
    }

    pub fn pinvar(&self) -> f64 {
        self.pinvar.get()
    }

    pub fn rate_var_param(&self) -> &RealParam {
        &self.rate_var
    }

    pub fn pinvar_param(&self) -> &RealParam {
        &self.pinvar
    }

    pub fn is_fixed_rate_var(&self) -> bool {
        self.rate_var_fixed
    }

    pub fn is_fixed_pinvar(&self) -> bool {
        self.pinvar_fixed
    }

    pub fn fix_rate_var(&mut self, fixed: bool) {
        self.rate_var_fixed = fixed;
    }

    pub fn fix_pinvar(&mut self, fixed: bool) {
        self.pinvar_fixed = fixed;
    }

    /// Install a (possibly shared) rate variance handle.
    pub fn install_rate_var(&mut self, handle: RealParam) {
        self.rate_var = handle;
        self.recalc();
    }

    /// Install a (possibly shared) pinvar handle.
    pub fn install_pinvar(&mut self, handle: RealParam) {
        self.pinvar = handle;
        self.recalc();
    }

    /// Write a new rate variance through the shared storage.
    pub fn set_rate_var(&mut self, value: f64) {
        self.rate_var.set(value);
        self.recalc();
    }

    /// Write a new pinvar through the shared storage.
    pub fn set_pinvar(&mut self, value: f64) {
        self.pinvar.set(value);
        self.recalc();
    }

    pub fn set_num_categ(&mut self, num_categ: usize) {
        debug_assert!(num_categ >= 1);
        self.num_categ = num_categ;
        self.recalc();
    }

    pub fn set_is_invar_model(&mut self, invar: bool) {
        self.invar_model = invar;
        self.recalc();
    }

    /// Category rate scalers, weight-averaged mean 1.
    pub fn rates(&self) -> &[f64] {
        &self.rates
    }

    /// Category weights, summing to 1.
    pub fn probs(&self) -> &[f64] {
        &self.probs
    }

    fn recalc(&mut self) {
        let p = if self.invar_model { self.pinvar.get() } else { 0.0 };
        let v = self.rate_var.get();
        let g = self.num_categ;

        let gamma_rates = if g == 1 || v < MIN_RATE_VAR {
            vec![1.0; g]
        } else {
            discretized_gamma_rates(1.0 / v, g)
        };

        self.rates.clear();
        self.probs.clear();
        if self.invar_model {
            self.rates.push(0.0);
            self.probs.push(p);
        }
        let weight = (1.0 - p) / g as f64;
        for r in gamma_rates {
            self.rates.push(r / (1.0 - p));
            self.probs.push(weight);
        }
    }
}

impl Default for Asrv {
    fn default() -> Self {
        Self::new()
    }
}

/// Mean rates of `g` equal-probability slices of a mean-1 gamma distribution
/// with the given shape (scale = 1/shape).
///
/// Uses the identity E[X; a<X<b] = alpha*theta*(F_{alpha+1}(b) - F_{alpha+1}(a))
/// with alpha*theta = 1, so each slice mean is g times the increment of the
/// shape+1 CDF between consecutive quantile boundaries.
fn discretized_gamma_rates(shape: f64, g: usize) -> Vec<f64> {
    let scale = 1.0 / shape;
    let mut rates = Vec::with_capacity(g);
    let mut cum_lower = 0.0;
    for i in 1..=g {
        let cum_upper = if i == g {
            1.0
        } else {
            let boundary = gamma_quantile(shape, scale, i as f64 / g as f64);
            gamma_p(shape + 1.0, boundary / scale)
        };
        rates.push(g as f64 * (cum_upper - cum_lower));
        cum_lower = cum_upper;
    }
    rates
}

/// Quantile of the gamma distribution with the given shape and scale, found
/// by bracketing and bisection on the regularized lower incomplete gamma.
fn gamma_quantile(shape: f64, scale: f64, prob: f64) -> f64 {
    debug_assert!(prob > 0.0 && prob < 1.0);
    let mut hi = scale * shape.max(1.0);
    while gamma_p(shape, hi / scale) < prob {
        hi *= 2.0;
        if hi > 1e300 {
            break;
        }
    }
    let mut lo = 0.0;
    for _ in 0..200 {
        let mid = 0.5 * (lo + hi);
        if gamma_p(shape, mid / scale) < prob {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    0.5 * (lo + hi)
}

/// Log-gamma function (recursion into Stirling's approximation).
fn ln_gamma(x: f64) -> f64 {
    if x <= 0.0 {
        return f64::INFINITY;
    }
    if x < 0.5 {
        // Reflection formula
        return std::f64::consts::PI.ln() - (std::f64::consts::PI * x).sin().ln()
            - ln_gamma(1.0 - x);
    }
    if x < 7.0 {
        // Recurse upward until Stirling is accurate
        let mut xx = x;
        let mut result = 0.0;
        while xx < 7.0 {
            result -= xx.ln();
            xx += 1.0;
        }
        return result + ln_gamma(xx);
    }
    let x2 = x * x;
    (x - 0.5) * x.ln() - x + 0.5 * (2.0 * std::f64::consts::PI).ln() + 1.0 / (12.0 * x)
        - 1.0 / (360.0 * x2 * x)
        + 1.0 / (1260.0 * x2 * x2 * x)
}

/// Regularized lower incomplete gamma P(a, x): the CDF of the unit-scale
/// gamma distribution with shape a.
fn gamma_p(a: f64, x: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    if a <= 0.0 {
        return 1.0;
    }
    if x < a + 1.0 {
        lower_incomplete_gamma_series(a, x)
    } else {
        1.0 - upper_incomplete_gamma_cf(a, x)
    }
}

/// Lower incomplete gamma ratio via series expansion (for x < a + 1).
fn lower_incomplete_gamma_series(a: f64, x: f64) -> f64 {
    let max_iter = 200;
    let eps = 1e-14;

    let mut sum = 1.0 / a;
    let mut term = 1.0 / a;
    for n in 1..max_iter {
        term *= x / (a + n as f64);
        sum += term;
        if term.abs() < eps * sum.abs() {
            break;
        }
    }
    sum * (-x + a * x.ln() - ln_gamma(a)).exp()
}

/// Upper incomplete gamma ratio via continued fraction (for x >= a + 1).
fn upper_incomplete_gamma_cf(a: f64, x: f64) -> f64 {
    let max_iter = 200;
    let eps = 1e-14;

    let mut b = x + 1.0 - a;
    let mut c = 1.0 / 1e-300;
    let mut d = 1.0 / b;
    let mut h = d;
    for i in 1..max_iter {
        let an = -(i as f64) * (i as f64 - a);
        b += 2.0;
        d = an * d + b;
        if d.abs() < 1e-300 {
            d = 1e-300;
        }
        c = b + an / c;
        if c.abs() < 1e-300 {
            c = 1e-300;
        }
        d = 1.0 / d;
        let del = d * c;
        h *= del;
        if (del - 1.0).abs() < eps {
            break;
        }
    }
    (a * x.ln() - x - ln_gamma(a)).exp() * h
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() <= tol
    }

    #[test]
    fn test_ln_gamma_known_values() {
        assert!(approx_eq(ln_gamma(1.0), 0.0, 1e-9));
        assert!(approx_eq(ln_gamma(2.0), 0.0, 1e-9));
        // Gamma(0.5) = sqrt(pi)
        assert!(approx_eq(
            ln_gamma(0.5),
            std::f64::consts::PI.sqrt().ln(),
            1e-9
        ));
        // Gamma(5) = 24
        assert!(approx_eq(ln_gamma(5.0), 24.0f64.ln(), 1e-9));
    }

    #[test]
    fn test_gamma_p_exponential() {
        // Shape 1 is the unit exponential: P(1, x) = 1 - exp(-x). The
        // truncated Stirling series in ln_gamma is good to a few parts in
        // 1e10, well inside what the discretization needs.
        for x in [0.1, 0.5, 1.0, 2.0, 5.0] {
            assert!(approx_eq(gamma_p(1.0, x), 1.0 - (-x as f64).exp(), 1e-9));
        }
    }

    #[test]
    fn test_gamma_quantile_exponential_median() {
        // Median of the unit exponential is ln 2
        let q = gamma_quantile(1.0, 1.0, 0.5);
        assert!(approx_eq(q, std::f64::consts::LN_2, 1e-9));
    }

    #[test]
    fn test_discretized_rates_alpha_half() {
        // Canonical example: shape 0.5 (rate variance 2), four categories
        let rates = discretized_gamma_rates(0.5, 4);
        let expected = [0.0334, 0.2519, 0.8203, 2.8944];
        for (r, e) in rates.iter().zip(expected.iter()) {
            assert!(approx_eq(*r, *e, 1e-3), "{} vs {}", r, e);
        }
    }

    #[test]
    fn test_discretized_rates_mean_one() {
        for shape in [0.2, 0.5, 1.0, 3.0] {
            for g in [2usize, 4, 8] {
                let rates = discretized_gamma_rates(shape, g);
                let mean: f64 = rates.iter().sum::<f64>() / g as f64;
                assert!(approx_eq(mean, 1.0, 1e-8), "shape={} g={}", shape, g);
            }
        }
    }

    #[test]
    fn test_holder_single_category() {
        let asrv = Asrv::new();
        assert_eq!(asrv.rates(), &[1.0]);
        assert_eq!(asrv.probs(), &[1.0]);
    }

    #[test]
    fn test_holder_gamma_categories_normalized() {
        let mut asrv = Asrv::new();
        asrv.set_num_categ(4);
        asrv.set_rate_var(2.0);

        let weight_sum: f64 = asrv.probs().iter().sum();
        let mean_rate: f64 = asrv
            .rates()
            .iter()
            .zip(asrv.probs())
            .map(|(r, p)| r * p)
            .sum();
        assert!(approx_eq(weight_sum, 1.0, 1e-9));
        assert!(approx_eq(mean_rate, 1.0, 1e-8));
    }

    #[test]
    fn test_holder_invar_model() {
        let mut asrv = Asrv::new();
        asrv.set_num_categ(4);
        asrv.set_rate_var(1.0);
        asrv.set_is_invar_model(true);
        asrv.set_pinvar(0.2);

        assert_eq!(asrv.rates().len(), 5);
        assert_eq!(asrv.probs().len(), 5);
        assert_eq!(asrv.rates()[0], 0.0);
        assert!(approx_eq(asrv.probs()[0], 0.2, 1e-12));

        let weight_sum: f64 = asrv.probs().iter().sum();
        let mean_rate: f64 = asrv
            .rates()
            .iter()
            .zip(asrv.probs())
            .map(|(r, p)| r * p)
            .sum();
        assert!(approx_eq(weight_sum, 1.0, 1e-9));
        assert!(approx_eq(mean_rate, 1.0, 1e-8));
    }

    #[test]
    fn test_shared_rate_var_recalc() {
        let handle = RealParam::new(2.0);
        let mut a = Asrv::new();
        let mut b = Asrv::new();
        a.set_num_categ(4);
        b.set_num_categ(4);
        a.install_rate_var(handle.clone());
        b.install_rate_var(handle.clone());
        assert!(a.rate_var_param().same(b.rate_var_param()));

        // Writing through one holder is visible to the other's storage
        a.set_rate_var(0.5);
        assert_eq!(b.rate_var(), 0.5);
    }
}
