//! Null/real mixture model of observed log-likelihood ratios.
//!
//! For one source, the LLRs against all candidate targets are modelled as
//! pi0 * f0 + (1 - pi0) * f1 with f0 the analytic null. pi0 comes from a
//! Storey estimate on the null p-values; f1 is an [`LBeta`] fitted by the
//! method of moments in the x = 1 - exp(-2 llr) coordinate, where Beta
//! moments invert in closed form. The posterior probability of a real effect
//! is the mixture responsibility of f1.

use crate::nulldist::{nulldist, nullpval, LBeta, TestType};
use crate::stats::solve_dense;
use anyhow::Error;
use log::warn;
use ndarray::prelude::*;

/// LLRs at or below this are treated as this value when evaluating densities,
/// keeping the boundary of the support out of the arithmetic.
const MIN_LLR: f64 = 1e-18;

/// Storey estimate of the proportion of true nulls from a p-value vector.
///
/// Computes pi0(lambda) = #{p > lambda} / (m (1 - lambda)) on the grid
/// lambda = 0, 0.05, ..., 0.95, smooths with a least-squares cubic and reads
/// it off at the last grid point, clamped to (0, 1].
pub fn pi0est(pvals: &[f64]) -> f64 {
    if pvals.is_empty() {
        return 1.0;
    }
    let m = pvals.len() as f64;
    let lambdas: Vec<f64> = (0..20).map(|j| 0.05 * j as f64).collect();
    let raw: Vec<f64> = lambdas
        .iter()
        .map(|&lam| pvals.iter().filter(|&&p| p > lam).count() as f64 / (m * (1.0 - lam)))
        .collect();

    // least-squares cubic in lambda via the normal equations
    let mut xtx = vec![vec![0.0; 4]; 4];
    let mut xty = vec![0.0; 4];
    for (&lam, &v) in lambdas.iter().zip(&raw) {
        let pow = [1.0, lam, lam * lam, lam * lam * lam];
        for r in 0..4 {
            for c in 0..4 {
                xtx[r][c] += pow[r] * pow[c];
            }
            xty[r] += pow[r] * v;
        }
    }
    let smoothed = match solve_dense(&mut xtx, &mut xty) {
        Some(coef) => {
            let lam = lambdas[lambdas.len() - 1];
            coef[0] + coef[1] * lam + coef[2] * lam * lam + coef[3] * lam * lam * lam
        }
        None => raw[raw.len() - 1],
    };
    smoothed.clamp(1e-6, 1.0)
}

/// Fitted mixture of a known null and a moment-matched real LBeta component.
#[derive(Clone, Debug)]
pub struct MixDist {
    /// estimated proportion of true nulls
    pub pi0: f64,
    /// analytic null component
    pub null: LBeta,
    /// fitted real component; `None` when the fit degenerated, in which case
    /// every posterior is zero
    pub real: Option<LBeta>,
}

impl MixDist {
    /// Posterior probability that each LLR comes from the real component.
    pub fn posterior(&self, llr: ArrayView1<'_, f64>) -> Array1<f64> {
        llr.mapv(|l| self.posterior_one(l))
    }

    fn posterior_one(&self, l: f64) -> f64 {
        let Some(real) = self.real else { return 0.0 };
        let l = l.max(MIN_LLR);
        let ln_w0 = self.pi0.ln() + self.null.ln_pdf(l);
        let ln_w1 = (1.0 - self.pi0).ln() + real.ln_pdf(l);
        if !ln_w1.is_finite() && ln_w1 < 0.0 {
            return 0.0;
        }
        if !ln_w0.is_finite() && ln_w0 < 0.0 {
            return 1.0;
        }
        let p = 1.0 / (1.0 + (ln_w0 - ln_w1).exp());
        if p.is_nan() {
            0.0
        } else {
            p.clamp(0.0, 1.0)
        }
    }
}

/// Fit the mixture for one source's LLRs by the method of moments.
///
/// Degenerate inputs (no detectable real component, real moments outside the
/// Beta family) are not errors: they produce a null-only mixture.
pub fn fit_mixdist_mom(llr: ArrayView1<'_, f64>, test: TestType, ns: usize, ng: usize) -> Result<MixDist, Error> {
    let null = nulldist(test, ns, ng)?;
    let pvals = nullpval(llr, test, ns, ng)?.to_vec();
    let pi0 = pi0est(&pvals);

    let real = fit_real_component(llr, &null, pi0);
    Ok(MixDist { pi0, null, real })
}

fn fit_real_component(llr: ArrayView1<'_, f64>, null: &LBeta, pi0: f64) -> Option<LBeta> {
    if pi0 >= 1.0 - 1e-6 || llr.is_empty() {
        return None;
    }

    let m = llr.len() as f64;
    let mut m1 = 0.0;
    let mut m2 = 0.0;
    for &l in llr {
        let x = (-(-2.0 * l.max(0.0)).exp_m1()).clamp(0.0, 1.0);
        m1 += x;
        m2 += x * x;
    }
    m1 /= m;
    m2 /= m;

    let (n1, n2) = null.x_moments();
    let r1 = (m1 - pi0 * n1) / (1.0 - pi0);
    let r2 = (m2 - pi0 * n2) / (1.0 - pi0);
    if !(0.0..1.0).contains(&r1) || r1 <= 0.0 {
        warn!("real-component mean {r1:.4} outside (0, 1); using null-only mixture");
        return None;
    }
    let var = r2 - r1 * r1;
    if var <= 0.0 {
        warn!("real-component variance {var:.4e} non-positive; using null-only mixture");
        return None;
    }
    let conc = r1 * (1.0 - r1) / var - 1.0;
    if conc <= 0.0 {
        warn!("real-component moments inconsistent with a Beta fit; using null-only mixture");
        return None;
    }
    LBeta::new(2.0 * r1 * conc, 2.0 * (1.0 - r1) * conc).ok()
}
