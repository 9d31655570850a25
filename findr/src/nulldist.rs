//! Analytic null distributions of the log-likelihood ratios.
//!
//! Under each test's null hypothesis, the explained-variance ratio
//! x = 1 - exp(-2 llr) follows a Beta distribution whose parameters are fixed
//! by the sample count and the number of genotype categories. [`LBeta`] is
//! the induced distribution of the LLR itself; p-values are its survival
//! function, evaluated through the regularized incomplete beta function.

use anyhow::{bail, Error};
use ndarray::prelude::*;
use statrs::function::beta::{beta_reg, ln_beta};

/// Which pairwise test a statistic came from.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TestType {
    /// test 0: A and B are correlated
    Corr,
    /// tests 1 and 2: E explains A (primary) or B (secondary linkage)
    Linkage,
    /// test 3: B is independent of E given A
    Mediation,
    /// test 4: B depends on (E, A)
    Relevance,
    /// test 5: A-B dependence beyond the shared eQTL
    Pleiotropy,
}

/// Distribution of L = -1/2 ln(1 - X) with X ~ Beta(alpha/2, beta/2),
/// supported on [0, inf).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LBeta {
    /// twice the Beta shape parameter of the explained component
    pub alpha: f64,
    /// twice the Beta shape parameter of the residual component
    pub beta: f64,
}

impl LBeta {
    /// Construct with both shape parameters strictly positive.
    pub fn new(alpha: f64, beta: f64) -> Result<Self, Error> {
        if !(alpha > 0.0 && beta > 0.0) {
            bail!("LBeta parameters must be positive, got ({alpha}, {beta})");
        }
        Ok(LBeta { alpha, beta })
    }

    /// Natural log of the density at `l`.
    pub fn ln_pdf(&self, l: f64) -> f64 {
        if l < 0.0 {
            return f64::NEG_INFINITY;
        }
        let a = 0.5 * self.alpha;
        let b = 0.5 * self.beta;
        let x = -(-2.0 * l).exp_m1(); // 1 - exp(-2l)
        let shape_term = if x > 0.0 {
            (a - 1.0) * x.ln()
        } else if a > 1.0 {
            f64::NEG_INFINITY
        } else if a == 1.0 {
            0.0
        } else {
            f64::INFINITY
        };
        std::f64::consts::LN_2 - ln_beta(a, b) + shape_term - self.beta * l
    }

    /// Density at `l`.
    pub fn pdf(&self, l: f64) -> f64 {
        self.ln_pdf(l).exp()
    }

    /// P(L <= l).
    pub fn cdf(&self, l: f64) -> f64 {
        if l <= 0.0 {
            return 0.0;
        }
        let x = (-(-2.0 * l).exp_m1()).clamp(0.0, 1.0);
        beta_reg(0.5 * self.alpha, 0.5 * self.beta, x)
    }

    /// P(L > l), computed directly in the upper tail for precision.
    pub fn sf(&self, l: f64) -> f64 {
        if l <= 0.0 {
            return 1.0;
        }
        let x = (-2.0 * l).exp().clamp(0.0, 1.0);
        beta_reg(0.5 * self.beta, 0.5 * self.alpha, x)
    }

    /// First two moments of X = 1 - exp(-2L).
    pub fn x_moments(&self) -> (f64, f64) {
        let a = 0.5 * self.alpha;
        let b = 0.5 * self.beta;
        let m1 = a / (a + b);
        let m2 = a * (a + 1.0) / ((a + b) * (a + b + 1.0));
        (m1, m2)
    }
}

/// Null distribution of a test's LLR for `ns` samples and `ng` genotype
/// categories (`ng` is ignored by the correlation test).
pub fn nulldist(test: TestType, ns: usize, ng: usize) -> Result<LBeta, Error> {
    let ns = ns as f64;
    let ng = ng as f64;
    let (alpha, beta) = match test {
        TestType::Corr => (1.0, ns - 2.0),
        TestType::Linkage => (ng - 1.0, ns - ng),
        TestType::Mediation => (ng - 1.0, ns - ng - 1.0),
        TestType::Relevance => (ng, ns - ng - 1.0),
        TestType::Pleiotropy => (1.0, ns - ng - 1.0),
    };
    LBeta::new(alpha, beta)
}

/// Null p-values (survival function) for a vector of LLRs.
pub fn nullpval(llr: ArrayView1<'_, f64>, test: TestType, ns: usize, ng: usize) -> Result<Array1<f64>, Error> {
    let null = nulldist(test, ns, ng)?;
    Ok(llr.mapv(|l| null.sf(l).clamp(0.0, 1.0)))
}
