//! Kernel density estimation of observed LLR distributions.
//!
//! The LLR support [0, inf) is first opened up with z = ln(exp(2 l) - 1),
//! a Gaussian kernel density with Silverman bandwidth is fitted to the
//! transformed sample on a fixed grid, and densities are mapped back through
//! the Jacobian dz/dl = 2 / (1 - exp(-2 l)). The KDE-based mixture replaces
//! the parametric real component: the posterior is 1 - pi0 f0 / f-hat.

use crate::mixture::pi0est;
use crate::nulldist::{nulldist, nullpval, LBeta, TestType};
use crate::stats::{percentile, variance};
use anyhow::{bail, format_err, Error};
use ndarray::prelude::*;
use ndarray_stats::QuantileExt;
use noisy_float::prelude::*;

/// Evaluation grid resolution.
const GRID_POINTS: usize = 512;

/// LLRs at or below this are clamped before the log transform.
const MIN_LLR: f64 = 1e-12;

/// Gaussian kernel density of a transformed LLR sample, tabulated on a grid.
#[derive(Clone, Debug)]
pub struct LlrKde {
    grid_lo: f64,
    grid_step: f64,
    density: Array1<f64>,
    /// Silverman bandwidth in the transformed coordinate
    pub bandwidth: f64,
}

#[inline]
fn to_z(l: f64) -> f64 {
    (2.0 * l.max(MIN_LLR)).exp_m1().ln()
}

/// Fit a Gaussian KDE to a vector of LLRs.
pub fn fit_kde(llr: &[f64]) -> Result<LlrKde, Error> {
    if llr.len() < 2 {
        bail!("KDE requires at least 2 observations, got {}", llr.len());
    }
    let z: Vec<f64> = llr.iter().map(|&l| to_z(l)).collect();

    let sd = variance(&z, 1.0).sqrt();
    let iqr = percentile(&z, 75.0) - percentile(&z, 25.0);
    let spread = if iqr > 0.0 { sd.min(iqr / 1.34) } else { sd };
    let mut bandwidth = 0.9 * spread * (z.len() as f64).powf(-0.2);
    if !(bandwidth > 0.0) {
        // all observations identical in z; fall back to a token width
        bandwidth = 1e-3;
    }

    let zarr = Array1::from(z.clone()).mapv(n64);
    let lo = zarr.min().map_err(|e| format_err!("empty KDE sample: {e}"))?.raw() - 3.0 * bandwidth;
    let hi = zarr.max().map_err(|e| format_err!("empty KDE sample: {e}"))?.raw() + 3.0 * bandwidth;
    let step = (hi - lo) / (GRID_POINTS - 1) as f64;

    let norm = 1.0 / ((2.0 * std::f64::consts::PI).sqrt() * bandwidth * z.len() as f64);
    let density = Array1::from_shape_fn(GRID_POINTS, |g| {
        let zg = lo + step * g as f64;
        let mut acc = 0.0;
        for &zi in &z {
            let t = (zg - zi) / bandwidth;
            acc += (-0.5 * t * t).exp();
        }
        acc * norm
    });

    Ok(LlrKde {
        grid_lo: lo,
        grid_step: step,
        density,
        bandwidth,
    })
}

impl LlrKde {
    /// Density in the transformed coordinate, linearly interpolated off the
    /// grid; zero outside it.
    pub fn pdf_z(&self, z: f64) -> f64 {
        let pos = (z - self.grid_lo) / self.grid_step;
        if pos < 0.0 || pos > (self.density.len() - 1) as f64 {
            return 0.0;
        }
        let i = (pos as usize).min(self.density.len() - 2);
        let frac = pos - i as f64;
        self.density[i] * (1.0 - frac) + self.density[i + 1] * frac
    }

    /// Density of the LLR itself.
    pub fn pdf(&self, l: f64) -> f64 {
        let l = l.max(MIN_LLR);
        self.pdf_z(to_z(l)) * 2.0 / (-(-2.0 * l).exp_m1())
    }
}

/// Mixture with a KDE-estimated observed density in place of a parametric
/// real component.
#[derive(Clone, Debug)]
pub struct KdeMix {
    /// estimated proportion of true nulls
    pub pi0: f64,
    /// analytic null component
    pub null: LBeta,
    /// KDE of the full observed LLR density
    pub kde: LlrKde,
}

impl KdeMix {
    /// Posterior probability that each LLR comes from the real component,
    /// 1 - pi0 f0 / f-hat clamped to [0, 1].
    pub fn posterior(&self, llr: ArrayView1<'_, f64>) -> Array1<f64> {
        llr.mapv(|l| {
            let f0 = self.null.pdf(l.max(MIN_LLR));
            let fhat = self.kde.pdf(l);
            if fhat <= 0.0 {
                return 0.0;
            }
            (1.0 - self.pi0 * f0 / fhat).clamp(0.0, 1.0)
        })
    }
}

/// Fit the KDE mixture for one source's LLRs.
pub fn fit_mixdist_kde(llr: ArrayView1<'_, f64>, test: TestType, ns: usize, ng: usize) -> Result<KdeMix, Error> {
    let null = nulldist(test, ns, ng)?;
    let pvals = nullpval(llr, test, ns, ng)?.to_vec();
    let pi0 = pi0est(&pvals);
    let kde = fit_kde(&llr.to_vec())?;
    Ok(KdeMix { pi0, null, kde })
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::prelude::*;
    use rand_distr::Beta as RandBeta;
    use rand_pcg::Pcg64Mcg;

    fn null_sample(seed: u64, m: usize) -> Vec<f64> {
        let mut rng = Pcg64Mcg::seed_from_u64(seed);
        let beta = RandBeta::new(1.0, 3.5).unwrap();
        (0..m)
            .map(|_| {
                let x: f64 = beta.sample(&mut rng);
                -0.5 * (1.0 - x).ln()
            })
            .collect()
    }

    #[test]
    fn test_kde_is_a_density() {
        let llr = null_sample(3, 1500);
        let kde = fit_kde(&llr).unwrap();
        assert!(kde.bandwidth > 0.0);

        // integrate over the LLR axis; nearly all mass lies below 2.5
        let step = 1e-3;
        let total: f64 = (0..2500).map(|i| kde.pdf(step * (i as f64 + 0.5)) * step).sum();
        assert!((total - 1.0).abs() < 0.05, "KDE mass {total}");
        assert!(llr.iter().all(|&l| kde.pdf(l) >= 0.0));
    }

    #[test]
    fn test_kde_tracks_the_null_density() {
        let llr = null_sample(17, 4000);
        let kde = fit_kde(&llr).unwrap();
        let null = LBeta::new(2.0, 7.0).unwrap();
        for l in [0.1, 0.2, 0.4, 0.6] {
            let rel = (kde.pdf(l) - null.pdf(l)).abs() / null.pdf(l);
            assert!(rel < 0.3, "KDE off by {:.0}% at {l}", 100.0 * rel);
        }
    }

    #[test]
    fn test_kde_posterior_on_pure_null() {
        let llr = Array1::from(null_sample(5, 3000));
        let mix = fit_mixdist_kde(llr.view(), TestType::Linkage, 10, 3).unwrap();
        assert!(mix.pi0 > 0.8, "pi0 = {}", mix.pi0);
        let posterior = mix.posterior(llr.view());
        assert!(posterior.iter().all(|&p| (0.0..=1.0).contains(&p)));
        let mean = posterior.sum() / posterior.len() as f64;
        assert!(mean < 0.25, "mean posterior {mean} on null data");
    }

    #[test]
    fn test_kde_posterior_separates_mixture() {
        let mut rng = Pcg64Mcg::seed_from_u64(23);
        let null = RandBeta::new(1.0, 3.5).unwrap();
        let real = RandBeta::new(4.0, 2.0).unwrap();
        let llr = Array1::from_shape_fn(4000, |i| {
            let x: f64 = if i % 2 == 0 {
                null.sample(&mut rng)
            } else {
                real.sample(&mut rng)
            };
            -0.5 * (1.0 - x).ln()
        });
        let mix = fit_mixdist_kde(llr.view(), TestType::Linkage, 10, 3).unwrap();
        let probe = ndarray::array![0.02, 1.2];
        let p = mix.posterior(probe.view());
        assert!(p[1] > 0.7, "posterior at strong LLR: {}", p[1]);
        assert!(p[1] > p[0]);
    }

    #[test]
    fn test_kde_rejects_tiny_samples() {
        assert!(fit_kde(&[0.5]).is_err());
    }
}
