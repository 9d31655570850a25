//! Per-sample log-likelihood ratios for the pairwise causal tests.
//!
//! All formulas assume supernormalized data: every column has mean 0 and
//! variance 1 in the 1/n convention, so each model's maximum likelihood is a
//! function of a handful of second moments. For a candidate regulator A with
//! eQTL E (categories j, frequencies f_j) tested against gene B:
//!
//! * rho = (1/n) sum_i A_i B_i
//! * a   = sum_j f_j mu_{A,j}^2        (variance of A explained by E)
//! * b   = sum_j f_j mu_{B,j}^2        (variance of B explained by E)
//! * c   = sum_j f_j mu_{A,j} mu_{B,j} (explained covariance)
//! * D   = (1-a)(1-b) - (rho-c)^2
//!
//! The tests compare nested Gaussian models of B:
//!
//! * correlation (0): B ~ A vs B alone:        -1/2 ln(1 - rho^2)
//! * primary (1):     A ~ E vs A alone:        -1/2 ln(1 - a)
//! * linkage (2):     B ~ E vs B alone:        -1/2 ln(1 - b)
//! * mediation (3):   B ~ E + A vs B ~ A:      1/2 ln[(1-a)(1-rho^2) / D]
//! * relevance (4):   B ~ E + A vs B alone:    -1/2 ln[D / (1-a)]
//! * pleiotropy (5):  B ~ E + A vs B ~ E:      -1/2 ln[D / ((1-a)(1-b))]
//!
//! Each alternative nests its null, so every LLR is non-negative, and
//! llr4 = llr2 + llr5 identically.

use anyhow::{bail, Error};
use ndarray::prelude::*;
use ndarray::Zip;

/// ln with the argument clamped to the smallest positive normal float, so
/// degenerate statistics (exactly collinear columns) stay finite.
#[inline]
fn ln_pos(x: f64) -> f64 {
    x.max(f64::MIN_POSITIVE).ln()
}

/// Partition of the samples into the observed genotype categories of one
/// variant.
#[derive(Clone, Debug)]
pub struct GenotypeSplit {
    category: Vec<usize>,
    counts: Vec<usize>,
    freqs: Vec<f64>,
}

impl GenotypeSplit {
    /// Categorize samples by the distinct values of a genotype vector.
    pub fn new(e: ArrayView1<'_, u8>) -> Self {
        let mut values: Vec<u8> = e.iter().copied().collect();
        values.sort_unstable();
        values.dedup();

        let n = e.len();
        let mut category = Vec::with_capacity(n);
        let mut counts = vec![0usize; values.len()];
        for &v in e {
            // values is tiny and sorted
            let j = values.binary_search(&v).unwrap_or(0);
            category.push(j);
            counts[j] += 1;
        }
        let freqs = counts.iter().map(|&c| c as f64 / n as f64).collect();
        GenotypeSplit {
            category,
            counts,
            freqs,
        }
    }

    /// Number of samples.
    pub fn n(&self) -> usize {
        self.category.len()
    }

    /// Number of distinct genotype categories observed.
    pub fn ng(&self) -> usize {
        self.counts.len()
    }

    /// Within-category means of a column.
    pub fn category_means(&self, col: ArrayView1<'_, f64>) -> Vec<f64> {
        let mut sums = vec![0.0; self.ng()];
        for (&j, &v) in self.category.iter().zip(col) {
            sums[j] += v;
        }
        for (s, &c) in sums.iter_mut().zip(&self.counts) {
            *s /= c as f64;
        }
        sums
    }

    /// Variance of a supernormalized column explained by the genotype,
    /// `sum_j f_j mu_j^2`.
    pub fn explained_variance(&self, col: ArrayView1<'_, f64>) -> f64 {
        self.category_means(col)
            .iter()
            .zip(&self.freqs)
            .map(|(&m, &f)| f * m * m)
            .sum()
    }

    fn explained_cross(&self, mu_a: &[f64], mu_b: &[f64]) -> f64 {
        mu_a.iter()
            .zip(mu_b)
            .zip(&self.freqs)
            .map(|((&ma, &mb), &f)| f * ma * mb)
            .sum()
    }
}

/// Log-likelihood ratios of tests 2-5 for one (A, E) pair against every
/// column of the expression matrix. The entry at A's own column is
/// meaningless (the statistics degenerate) and should be masked downstream.
#[derive(Clone, Debug)]
pub struct LlrCol {
    /// secondary linkage, E -> B
    pub llr2: Array1<f64>,
    /// mediation, B independent of E given A
    pub llr3: Array1<f64>,
    /// relevance, B depends on (E, A)
    pub llr4: Array1<f64>,
    /// pleiotropy, A-B dependence beyond the shared E
    pub llr5: Array1<f64>,
}

/// Compute tests 2-5 for supernormalized expression `y` (samples x genes),
/// genotype split `split` and regulator column `a_col`.
pub fn llr_col(y: ArrayView2<'_, f64>, split: &GenotypeSplit, a_col: usize) -> Result<LlrCol, Error> {
    let n = y.nrows();
    if split.n() != n {
        bail!("genotype vector has {} samples, expression has {}", split.n(), n);
    }
    if a_col >= y.ncols() {
        bail!("regulator column {} out of range ({} genes)", a_col, y.ncols());
    }

    let a = y.column(a_col);
    let mu_a = split.category_means(a);
    let a_exp: f64 = mu_a.iter().zip(&split.freqs).map(|(&m, &f)| f * m * m).sum();
    let va = 1.0 - a_exp;

    let p = y.ncols();
    let mut llr2 = Array1::zeros(p);
    let mut llr3 = Array1::zeros(p);
    let mut llr4 = Array1::zeros(p);
    let mut llr5 = Array1::zeros(p);

    Zip::from(&mut llr2)
        .and(&mut llr3)
        .and(&mut llr4)
        .and(&mut llr5)
        .and(y.columns())
        .par_for_each(|l2, l3, l4, l5, b| {
            let rho = a.dot(&b) / n as f64;
            let mu_b = split.category_means(b);
            let b_exp: f64 = mu_b.iter().zip(&split.freqs).map(|(&m, &f)| f * m * m).sum();
            let c_exp = split.explained_cross(&mu_a, &mu_b);
            let vb = 1.0 - b_exp;
            let resid = rho - c_exp;
            let d = va * vb - resid * resid;

            *l2 = -0.5 * ln_pos(vb);
            *l3 = 0.5 * (ln_pos(va * (1.0 - rho * rho)) - ln_pos(d));
            *l4 = -0.5 * (ln_pos(d) - ln_pos(va));
            *l5 = -0.5 * (ln_pos(d) - ln_pos(va * vb));
        });

    Ok(LlrCol { llr2, llr3, llr4, llr5 })
}

/// Correlation-test (test 0) LLRs of column `a_col` against every column.
/// The self entry degenerates and should be masked downstream.
pub fn corr_llr_col(y: ArrayView2<'_, f64>, a_col: usize) -> Result<Array1<f64>, Error> {
    if a_col >= y.ncols() {
        bail!("source column {} out of range ({} genes)", a_col, y.ncols());
    }
    let n = y.nrows() as f64;
    let rho = y.t().dot(&y.column(a_col)) / n;
    Ok(rho.mapv(|r| -0.5 * ln_pos(1.0 - r * r)))
}

/// Linkage-test (test 2) LLRs of one genotype split against every column.
pub fn linkage_llr(y: ArrayView2<'_, f64>, split: &GenotypeSplit) -> Result<Array1<f64>, Error> {
    if split.n() != y.nrows() {
        bail!(
            "genotype vector has {} samples, expression has {}",
            split.n(),
            y.nrows()
        );
    }
    let mut out = Array1::zeros(y.ncols());
    Zip::from(&mut out).and(y.columns()).par_for_each(|l, col| {
        *l = -0.5 * ln_pos(1.0 - split.explained_variance(col));
    });
    Ok(out)
}

/// Primary-test (test 1) LLR: how strongly the genotype explains its own
/// cis gene.
pub fn primary_llr(y: ArrayView2<'_, f64>, split: &GenotypeSplit, a_col: usize) -> Result<f64, Error> {
    if a_col >= y.ncols() {
        bail!("regulator column {} out of range ({} genes)", a_col, y.ncols());
    }
    if split.n() != y.nrows() {
        bail!(
            "genotype vector has {} samples, expression has {}",
            split.n(),
            y.nrows()
        );
    }
    Ok(-0.5 * ln_pos(1.0 - split.explained_variance(y.column(a_col))))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::supernormalize::supernormalize;
    use crate::supernormalize::test::raw_fixture;
    use assert_approx_eq::assert_approx_eq;
    use ndarray::array;
    use rand::prelude::*;
    use rand_distr::Normal as RandNormal;
    use rand_pcg::Pcg64Mcg;

    fn fixture_split() -> GenotypeSplit {
        GenotypeSplit::new(array![0u8, 0, 0, 0, 1, 1, 1, 1, 2, 2, 2, 2].view())
    }

    #[test]
    fn test_genotype_split() {
        let split = GenotypeSplit::new(array![2u8, 0, 2, 0, 5, 5].view());
        assert_eq!(split.ng(), 3);
        assert_eq!(split.n(), 6);
        assert_eq!(split.counts, vec![2, 2, 2]);
        let means = split.category_means(array![1.0, 10.0, 3.0, 20.0, 100.0, 200.0].view());
        assert_eq!(means, vec![15.0, 2.0, 150.0]);
    }

    #[test]
    fn test_against_reference() {
        // reference values computed independently from the same raw fixture:
        // supernormalize, then evaluate the closed-form LLRs and check them
        // against explicit OLS residual variances
        let y = supernormalize(raw_fixture().view()).unwrap();
        let split = fixture_split();

        assert_approx_eq!(primary_llr(y.view(), &split, 0).unwrap(), 0.97002327527934, 1e-6);

        let llr0 = corr_llr_col(y.view(), 0).unwrap();
        for &(j, expect) in &[
            (1usize, 1.05113537723665),
            (2, 0.26231830761878),
            (3, 0.136594469746708),
        ] {
            assert_approx_eq!(llr0[j], expect, 1e-6);
        }

        let got = llr_col(y.view(), &split, 0).unwrap();
        let expected2 = [0.97002327527934, 0.612943787765469, 0.203496418393037, 0.287682072451781];
        for (j, &expect) in expected2.iter().enumerate() {
            assert_approx_eq!(got.llr2[j], expect, 1e-6);
        }
        for &(j, expect) in &[
            (1usize, 0.247271655711352),
            (2, 0.00589581122477038),
            (3, 0.203176770455208),
        ] {
            assert_approx_eq!(got.llr3[j], expect, 1e-6);
        }
        for &(j, expect) in &[
            (1usize, 1.298407032948),
            (2, 0.26821411884355),
            (3, 0.339771240201916),
        ] {
            assert_approx_eq!(got.llr4[j], expect, 1e-6);
        }
        for &(j, expect) in &[
            (1usize, 0.685463245182532),
            (2, 0.0647177004505126),
            (3, 0.0520891677501351),
        ] {
            assert_approx_eq!(got.llr5[j], expect, 1e-6);
        }

        let linkage = linkage_llr(y.view(), &split).unwrap();
        for (j, &expect) in expected2.iter().enumerate() {
            assert_approx_eq!(linkage[j], expect, 1e-9);
        }
    }

    #[test]
    fn test_llr_invariants_on_random_data() {
        let mut rng = Pcg64Mcg::seed_from_u64(7);
        let noise = RandNormal::new(0.0, 1.0).unwrap();
        let n = 60;
        let p = 8;
        let e = Array1::from_shape_fn(n, |_| rng.gen_range(0..3u8));
        let mut raw = Array2::from_shape_fn((n, p), |_| noise.sample(&mut rng));
        for i in 0..n {
            raw[[i, 0]] += 1.5 * e[i] as f64;
            let r0 = raw[[i, 0]];
            raw[[i, 1]] += 0.9 * r0;
        }

        let y = supernormalize(raw.view()).unwrap();
        let split = GenotypeSplit::new(e.view());
        let got = llr_col(y.view(), &split, 0).unwrap();

        for j in 0..p {
            if j == 0 {
                continue;
            }
            assert!(got.llr2[j] >= -1e-12);
            assert!(got.llr3[j] >= -1e-12);
            assert!(got.llr4[j] >= -1e-12);
            assert!(got.llr5[j] >= -1e-12);
            // relevance decomposes into linkage + pleiotropy
            assert_approx_eq!(got.llr4[j], got.llr2[j] + got.llr5[j], 1e-9);
        }

        // the driven gene should stand out from pure noise genes
        assert!(got.llr2[1] > got.llr2[4]);
    }

    #[test]
    fn test_monomorphic_variant_degenerates() {
        // a single genotype category explains nothing: linkage and mediation
        // vanish, relevance and pleiotropy collapse onto the correlation test
        let y = supernormalize(raw_fixture().view()).unwrap();
        let split = GenotypeSplit::new(Array1::<u8>::zeros(12).view());
        assert_eq!(split.ng(), 1);
        let got = llr_col(y.view(), &split, 0).unwrap();
        let llr0 = corr_llr_col(y.view(), 0).unwrap();
        for j in 1..y.ncols() {
            assert!(got.llr2[j].abs() < 1e-9);
            assert!(got.llr3[j].abs() < 1e-9);
            assert_approx_eq!(got.llr4[j], llr0[j], 1e-9);
            assert_approx_eq!(got.llr5[j], llr0[j], 1e-9);
        }
    }

    #[test]
    fn test_dimension_mismatch() {
        let y = supernormalize(raw_fixture().view()).unwrap();
        let split = GenotypeSplit::new(Array1::<u8>::zeros(5).view());
        assert!(llr_col(y.view(), &split, 0).is_err());
        assert!(corr_llr_col(y.view(), 99).is_err());
    }
}
