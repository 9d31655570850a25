//! Exported analyses: all-vs-all / bipartite coexpression, eQTL-gene
//! association, and eQTL-instrumented causal inference.
//!
//! Each analysis supernormalizes the expression matrix, computes one LLR
//! vector per source against every target gene, fits the null/real mixture
//! per source and converts the LLRs to posterior probabilities. Results come
//! back as source-by-target tables; [`PosteriorTable::network`] flattens a
//! table into a ranked edge list with q-values.

use crate::fdr::{adjusted_pvalue_bh, qvalues};
use crate::kde::fit_mixdist_kde;
use crate::llr::{corr_llr_col, linkage_llr, llr_col, GenotypeSplit};
use crate::mixture::fit_mixdist_mom;
use crate::nulldist::{nullpval, TestType};
use crate::supernormalize::supernormalize;
use anyhow::{bail, Error};
use findr_types::matrix::resolve_colnames;
use findr_types::{CisPairs, Edge, ExpressionMatrix, GenotypeMatrix, Network};
use itertools::Itertools;
use log::warn;
use ndarray::prelude::*;
use noisy_float::prelude::*;
use pacer::{Pacer, Silent};

/// How the real LLR component is estimated.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FitMethod {
    /// method-of-moments LBeta fit of the real component
    Moments,
    /// kernel density estimate of the observed LLR density
    Kde,
}

impl std::str::FromStr for FitMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mom" => Ok(FitMethod::Moments),
            "kde" => Ok(FitMethod::Kde),
            _ => bail!("fit method not recognized: {}", s),
        }
    }
}

/// How the causal tests are combined into one edge probability.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Combination {
    /// no combination; keep the four per-test posteriors
    None,
    /// instrumental variables: p2 * p5
    IV,
    /// mediation: p2 * p3
    Mediation,
    /// compound combination (p2 * p5 + p4) / 2
    Orig,
}

impl std::str::FromStr for Combination {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Combination::None),
            "iv" => Ok(Combination::IV),
            "mediation" => Ok(Combination::Mediation),
            "orig" => Ok(Combination::Orig),
            _ => bail!("combination not recognized: {}", s),
        }
    }
}

/// Options shared by the exported analyses.
#[derive(Clone, Debug)]
pub struct FindrOptions {
    /// posterior estimation method
    pub method: FitMethod,
    /// causal test combination
    pub combination: Combination,
    /// drop edges with q-value above this, if set
    pub fdr: Option<f64>,
    /// restrict sources to these column indices
    pub cols: Option<Vec<usize>>,
    /// restrict sources to these column names (overrides `cols`)
    pub colnames: Option<Vec<String>>,
}

impl Default for FindrOptions {
    fn default() -> Self {
        FindrOptions {
            method: FitMethod::Moments,
            combination: Combination::None,
            fdr: None,
            cols: None,
            colnames: None,
        }
    }
}

impl FindrOptions {
    fn source_columns(&self, all: &[String]) -> Result<Vec<usize>, Error> {
        if let Some(names) = &self.colnames {
            return resolve_colnames(names, all);
        }
        if let Some(cols) = &self.cols {
            for &c in cols {
                if c >= all.len() {
                    bail!("source column {} out of range ({} columns)", c, all.len());
                }
            }
            return Ok(cols.clone());
        }
        Ok((0..all.len()).collect())
    }
}

/// Source-by-target posterior probabilities. Cells that were not tested
/// (self pairs, monomorphic variants) hold NaN.
#[derive(Clone, Debug)]
pub struct PosteriorTable {
    /// source names, row labels
    pub sources: Vec<String>,
    /// target gene names, column labels
    pub targets: Vec<String>,
    /// posterior probability per source and target
    pub posteriors: Array2<f64>,
}

impl PosteriorTable {
    /// Flatten into a ranked edge list with q-values, optionally filtered.
    pub fn network(&self, fdr: Option<f64>) -> Network {
        build_network(&self.sources, &self.targets, self.posteriors.view(), fdr)
    }
}

/// Association analysis output: linkage posteriors plus the raw and
/// BH-adjusted null p-values per variant.
#[derive(Clone, Debug)]
pub struct AssociationTable {
    /// variant-by-gene posterior probabilities
    pub posteriors: PosteriorTable,
    /// null p-values of the linkage test
    pub pvalues: Array2<f64>,
    /// Benjamini-Hochberg adjusted p-values, per variant
    pub adjusted_pvalues: Array2<f64>,
}

/// Causal analysis output: per-test posteriors for every retained cis pair
/// against every gene.
#[derive(Clone, Debug)]
pub struct CausalTable {
    /// regulator gene names, one per retained pair
    pub sources: Vec<String>,
    /// target gene names
    pub targets: Vec<String>,
    /// secondary linkage posteriors, P(E -> B)
    pub p2: Array2<f64>,
    /// mediation posteriors, P(B independent of E given A)
    pub p3: Array2<f64>,
    /// relevance posteriors, P(B depends on E, A)
    pub p4: Array2<f64>,
    /// pleiotropy posteriors, P(A-B interaction beyond E)
    pub p5: Array2<f64>,
}

impl CausalTable {
    /// Combine the per-test posteriors into one probability per edge.
    pub fn combined(&self, combination: Combination) -> Result<Array2<f64>, Error> {
        match combination {
            Combination::None => bail!("choose a combination to produce edge probabilities"),
            Combination::IV => Ok(&self.p2 * &self.p5),
            Combination::Mediation => Ok(&self.p2 * &self.p3),
            Combination::Orig => Ok((&self.p2 * &self.p5 + &self.p4) / 2.0),
        }
    }

    /// Ranked edge list under the given combination.
    pub fn network(&self, combination: Combination, fdr: Option<f64>) -> Result<Network, Error> {
        let probs = self.combined(combination)?;
        Ok(build_network(&self.sources, &self.targets, probs.view(), fdr))
    }
}

fn build_network(sources: &[String], targets: &[String], probs: ArrayView2<'_, f64>, fdr: Option<f64>) -> Network {
    let mut entries = Vec::new();
    for (i, row) in probs.axis_iter(Axis(0)).enumerate() {
        for (j, &p) in row.iter().enumerate() {
            if p.is_finite() {
                entries.push((i, j, p));
            }
        }
    }
    let qs = qvalues(&entries.iter().map(|&(_, _, p)| p).collect::<Vec<_>>());
    let mut order: Vec<usize> = (0..entries.len()).collect();
    order.sort_by_key(|&k| std::cmp::Reverse(n64(entries[k].2)));

    let mut edges: Vec<Edge> = order
        .into_iter()
        .map(|k| {
            let (i, j, p) = entries[k];
            Edge {
                source: sources[i].clone(),
                target: targets[j].clone(),
                posterior: p,
                qvalue: qs[k],
            }
        })
        .collect();
    if let Some(fdr) = fdr {
        edges.retain(|e| e.qvalue <= fdr);
    }
    Network { edges }
}

/// Fit the mixture on the LLRs (minus the skipped self entry) and evaluate
/// posteriors for the full vector.
fn posteriors_for(
    llr: &Array1<f64>,
    skip: Option<usize>,
    test: TestType,
    ns: usize,
    ng: usize,
    method: FitMethod,
) -> Result<Array1<f64>, Error> {
    let fit_input = match skip {
        Some(s) => Array1::from_iter(
            llr.iter()
                .enumerate()
                .filter(|&(j, _)| j != s)
                .map(|(_, &v)| v),
        ),
        None => llr.clone(),
    };
    let mut posterior = match method {
        FitMethod::Moments => fit_mixdist_mom(fit_input.view(), test, ns, ng)?.posterior(llr.view()),
        FitMethod::Kde => fit_mixdist_kde(fit_input.view(), test, ns, ng)?.posterior(llr.view()),
    };
    if let Some(s) = skip {
        posterior[s] = f64::NAN;
    }
    Ok(posterior)
}

/// All-vs-all (or bipartite, via `cols`/`colnames`) coexpression analysis:
/// posterior probability that each source gene and target gene are
/// correlated.
pub fn coexpression(x: &ExpressionMatrix, opts: &FindrOptions) -> Result<PosteriorTable, Error> {
    coexpression_with_cancellation(Silent, x, opts)
}

/// [`coexpression`] with progress reporting and cancellation.
pub fn coexpression_with_cancellation(
    mut pacer: impl Pacer,
    x: &ExpressionMatrix,
    opts: &FindrOptions,
) -> Result<PosteriorTable, Error> {
    let ns = x.n_samples();
    let y = supernormalize(x.data.view())?;
    let sources = opts.source_columns(&x.genes)?;

    let mut posteriors = Array2::from_elem((sources.len(), x.n_genes()), f64::NAN);
    for (row, &i) in sources.iter().enumerate() {
        pacer.checkpoint(row as f64 / sources.len() as f64)?;
        let llr0 = corr_llr_col(y.view(), i)?;
        let post = posteriors_for(&llr0, Some(i), TestType::Corr, ns, 0, opts.method)?;
        posteriors.row_mut(row).assign(&post);
    }
    pacer.checkpoint(1.0)?;

    Ok(PosteriorTable {
        sources: sources.iter().map(|&i| x.genes[i].clone()).collect(),
        targets: x.genes.clone(),
        posteriors,
    })
}

/// Association analysis: posterior probability (and null p-values) that each
/// variant is linked to each gene.
pub fn association(
    x: &ExpressionMatrix,
    g: &GenotypeMatrix,
    opts: &FindrOptions,
) -> Result<AssociationTable, Error> {
    association_with_cancellation(Silent, x, g, opts)
}

/// [`association`] with progress reporting and cancellation.
pub fn association_with_cancellation(
    mut pacer: impl Pacer,
    x: &ExpressionMatrix,
    g: &GenotypeMatrix,
    opts: &FindrOptions,
) -> Result<AssociationTable, Error> {
    check_samples(x, g)?;
    let ns = x.n_samples();
    let y = supernormalize(x.data.view())?;
    let variants = opts.source_columns(&g.variants)?;

    let mut posteriors = Array2::from_elem((variants.len(), x.n_genes()), f64::NAN);
    let mut pvalues = Array2::ones((variants.len(), x.n_genes()));
    for (row, &v) in variants.iter().enumerate() {
        pacer.checkpoint(row as f64 / variants.len() as f64)?;
        let split = GenotypeSplit::new(g.data.column(v));
        if split.ng() < 2 {
            warn!("variant {} is monomorphic; association set to zero", g.variants[v]);
            posteriors.row_mut(row).fill(0.0);
            continue;
        }
        let llr2 = linkage_llr(y.view(), &split)?;
        pvalues
            .row_mut(row)
            .assign(&nullpval(llr2.view(), TestType::Linkage, ns, split.ng())?);
        let post = posteriors_for(&llr2, None, TestType::Linkage, ns, split.ng(), opts.method)?;
        posteriors.row_mut(row).assign(&post);
    }
    pacer.checkpoint(1.0)?;

    let mut adjusted = Array2::ones((variants.len(), x.n_genes()));
    for (mut arow, prow) in adjusted.axis_iter_mut(Axis(0)).zip(pvalues.axis_iter(Axis(0))) {
        let adj = adjusted_pvalue_bh(&prow.to_vec());
        arow.assign(&Array1::from(adj));
    }

    Ok(AssociationTable {
        posteriors: PosteriorTable {
            sources: variants.iter().map(|&v| g.variants[v].clone()).collect(),
            targets: x.genes.clone(),
            posteriors,
        },
        pvalues,
        adjusted_pvalues: adjusted,
    })
}

/// Causal inference: for each cis (gene, eQTL) pair, posterior probabilities
/// of the secondary, mediation, relevance and pleiotropy tests against every
/// target gene.
pub fn causal(
    x: &ExpressionMatrix,
    g: &GenotypeMatrix,
    pairs: &CisPairs,
    opts: &FindrOptions,
) -> Result<CausalTable, Error> {
    causal_with_cancellation(Silent, x, g, pairs, opts)
}

/// [`causal`] with progress reporting and cancellation.
pub fn causal_with_cancellation(
    mut pacer: impl Pacer,
    x: &ExpressionMatrix,
    g: &GenotypeMatrix,
    pairs: &CisPairs,
    opts: &FindrOptions,
) -> Result<CausalTable, Error> {
    check_samples(x, g)?;
    let ns = x.n_samples();
    let y = supernormalize(x.data.view())?;

    let mut resolved = pairs.resolve(x, g)?;
    if opts.cols.is_some() || opts.colnames.is_some() {
        let keep = opts.source_columns(&x.genes)?;
        resolved.retain(|(a, _)| keep.contains(a));
    }

    let mut sources = Vec::new();
    let mut rows: Vec<(Array1<f64>, Array1<f64>, Array1<f64>, Array1<f64>)> = Vec::new();
    for (k, &(a_col, e_col)) in resolved.iter().enumerate() {
        pacer.checkpoint(k as f64 / resolved.len() as f64)?;
        let split = GenotypeSplit::new(g.data.column(e_col));
        if split.ng() < 2 {
            warn!(
                "variant {} is monomorphic; skipping cis pair for gene {}",
                g.variants[e_col], x.genes[a_col]
            );
            continue;
        }
        let ng = split.ng();
        let llrs = llr_col(y.view(), &split, a_col)?;

        let p2 = posteriors_for(&llrs.llr2, Some(a_col), TestType::Linkage, ns, ng, opts.method)?;
        let p3 = posteriors_for(&llrs.llr3, Some(a_col), TestType::Mediation, ns, ng, opts.method)?
            .mapv(|p| 1.0 - p);
        let p4 = posteriors_for(&llrs.llr4, Some(a_col), TestType::Relevance, ns, ng, opts.method)?;
        let p5 = posteriors_for(&llrs.llr5, Some(a_col), TestType::Pleiotropy, ns, ng, opts.method)?;

        sources.push(x.genes[a_col].clone());
        rows.push((p2, p3, p4, p5));
    }
    pacer.checkpoint(1.0)?;
    let (rows2, rows3, rows4, rows5): (Vec<_>, Vec<_>, Vec<_>, Vec<_>) = rows.into_iter().multiunzip();

    let stack = |rows: &[Array1<f64>]| -> Array2<f64> {
        let mut out = Array2::from_elem((rows.len(), x.n_genes()), f64::NAN);
        for (mut dst, src) in out.axis_iter_mut(Axis(0)).zip(rows) {
            dst.assign(src);
        }
        out
    };

    Ok(CausalTable {
        sources,
        targets: x.genes.clone(),
        p2: stack(&rows2),
        p3: stack(&rows3),
        p4: stack(&rows4),
        p5: stack(&rows5),
    })
}

fn check_samples(x: &ExpressionMatrix, g: &GenotypeMatrix) -> Result<(), Error> {
    if x.n_samples() != g.n_samples() {
        bail!(
            "expression has {} samples but genotypes have {}",
            x.n_samples(),
            g.n_samples()
        );
    }
    if x.samples != g.samples {
        bail!("expression and genotype tables disagree on sample ids");
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::prelude::*;
    use rand_distr::Normal as RandNormal;
    use rand_pcg::Pcg64Mcg;

    const N_SAMPLES: usize = 200;
    const N_GENES: usize = 60;
    const N_DRIVEN: usize = 10;

    /// Simulated system: gene 0 is driven by variant rs0; genes 1..=10 are
    /// driven by gene 0; the rest is independent noise. rs_mono never varies.
    fn simulate() -> (ExpressionMatrix, GenotypeMatrix) {
        let mut rng = Pcg64Mcg::seed_from_u64(4242);
        let noise = RandNormal::new(0.0, 1.0).unwrap();

        let e = Array1::from_shape_fn(N_SAMPLES, |_| rng.gen_range(0..3u8));
        let mut data = Array2::from_shape_fn((N_SAMPLES, N_GENES), |_| noise.sample(&mut rng));
        for i in 0..N_SAMPLES {
            data[[i, 0]] += 1.5 * e[i] as f64;
            let a = data[[i, 0]];
            for j in 1..=N_DRIVEN {
                data[[i, j]] += 0.8 * a;
            }
        }

        let samples: Vec<String> = (0..N_SAMPLES).map(|i| format!("s{i}")).collect();
        let genes: Vec<String> = (0..N_GENES).map(|j| format!("g{j}")).collect();
        let x = ExpressionMatrix::new(data, samples.clone(), genes).unwrap();

        let mut gd = Array2::zeros((N_SAMPLES, 2));
        for i in 0..N_SAMPLES {
            gd[[i, 0]] = e[i];
            gd[[i, 1]] = 1;
        }
        let g = GenotypeMatrix::new(gd, samples, vec!["rs0".into(), "rs_mono".into()]).unwrap();
        (x, g)
    }

    fn mean_over(v: &Array1<f64>, idx: impl Iterator<Item = usize>) -> f64 {
        let vals: Vec<f64> = idx.map(|j| v[j]).collect();
        vals.iter().sum::<f64>() / vals.len() as f64
    }

    #[test]
    fn test_coexpression_finds_the_module() {
        let (x, _) = simulate();
        let table = coexpression(&x, &FindrOptions::default()).unwrap();
        assert_eq!(table.posteriors.dim(), (N_GENES, N_GENES));

        let row0 = table.posteriors.row(0).to_owned();
        assert!(row0[0].is_nan(), "self posterior must be masked");
        let driven = mean_over(&row0, 1..=N_DRIVEN);
        let free = mean_over(&row0, N_DRIVEN + 1..N_GENES);
        assert!(driven > 0.5, "driven mean posterior {driven}");
        assert!(free < 0.5, "noise mean posterior {free}");
        assert!(driven > free + 0.3);
    }

    #[test]
    fn test_coexpression_source_selection() {
        let (x, _) = simulate();
        let opts = FindrOptions {
            colnames: Some(vec!["g0".into(), "g3".into()]),
            ..Default::default()
        };
        let table = coexpression(&x, &opts).unwrap();
        assert_eq!(table.sources, vec!["g0".to_string(), "g3".to_string()]);
        assert_eq!(table.posteriors.dim(), (2, N_GENES));

        let bad = FindrOptions {
            colnames: Some(vec!["nope".into()]),
            ..Default::default()
        };
        assert!(coexpression(&x, &bad).is_err());
    }

    #[test]
    fn test_association() {
        let (x, g) = simulate();
        let table = association(&x, &g, &FindrOptions::default()).unwrap();

        let row = table.posteriors.posteriors.row(0).to_owned();
        assert!(row[0] > 0.8, "posterior of rs0 -> g0: {}", row[0]);
        let free = mean_over(&row, N_DRIVEN + 1..N_GENES);
        assert!(free < 0.4, "noise mean posterior {free}");

        assert!(table.pvalues[[0, 0]] < 1e-10);
        // adjusted p-values never fall below the raw ones
        for (p, a) in table.pvalues.iter().zip(&table.adjusted_pvalues) {
            assert!(a >= p);
        }

        // monomorphic variant contributes nothing
        assert!(table.posteriors.posteriors.row(1).iter().all(|&p| p == 0.0));
        assert!(table.pvalues.row(1).iter().all(|&p| p == 1.0));
    }

    #[test]
    fn test_causal_orders_targets() {
        let (x, g) = simulate();
        let pairs = CisPairs::new(
            vec!["g0".into(), "g20".into()],
            vec!["rs0".into(), "rs_mono".into()],
        )
        .unwrap();
        let table = causal(&x, &g, &pairs, &FindrOptions::default()).unwrap();

        // the monomorphic pair is skipped
        assert_eq!(table.sources, vec!["g0".to_string()]);
        assert_eq!(table.p2.dim(), (1, N_GENES));

        let p2 = table.p2.row(0).to_owned();
        assert!(p2[0].is_nan());
        assert!(mean_over(&p2, 1..=N_DRIVEN) > 0.5);
        assert!(mean_over(&p2, N_DRIVEN + 1..N_GENES) < 0.4);

        for combination in [Combination::IV, Combination::Mediation, Combination::Orig] {
            let probs = table.combined(combination).unwrap();
            let row = probs.row(0).to_owned();
            let driven = mean_over(&row, 1..=N_DRIVEN);
            let free = mean_over(&row, N_DRIVEN + 1..N_GENES);
            assert!(
                driven > free + 0.3,
                "{combination:?}: driven {driven} vs noise {free}"
            );
        }
        assert!(table.combined(Combination::None).is_err());

        let net = table.network(Combination::Orig, None).unwrap();
        assert_eq!(net.len(), N_GENES - 1);
        // ranked by decreasing posterior, q-values non-decreasing
        for w in net.edges.windows(2) {
            assert!(w[0].posterior >= w[1].posterior);
            assert!(w[0].qvalue <= w[1].qvalue + 1e-12);
        }
        let top: Vec<&str> = net.edges[..N_DRIVEN].iter().map(|e| e.target.as_str()).collect();
        let hits = (1..=N_DRIVEN).filter(|j| top.contains(&format!("g{j}").as_str())).count();
        assert!(hits >= 7, "only {hits} driven genes in the top ranks");

        let strict = table.network(Combination::Orig, Some(0.05)).unwrap();
        assert!(strict.len() < net.len());
        assert!(strict.edges.iter().all(|e| e.qvalue <= 0.05));
    }

    #[test]
    fn test_kde_method_agrees_qualitatively() {
        let (x, g) = simulate();
        let opts = FindrOptions {
            method: FitMethod::Kde,
            ..Default::default()
        };
        let table = association(&x, &g, &opts).unwrap();
        let row = table.posteriors.posteriors.row(0).to_owned();
        assert!(row[0] > 0.7, "KDE posterior of rs0 -> g0: {}", row[0]);
        assert!(mean_over(&row, N_DRIVEN + 1..N_GENES) < 0.5);
    }

    #[test]
    fn test_cancellation() {
        let (x, g) = simulate();
        let pairs = CisPairs::new(vec!["g0".into()], vec!["rs0".into()]).unwrap();
        let (handle, tracker) = pacer::tracker();
        handle.abort();
        assert!(causal_with_cancellation(tracker, &x, &g, &pairs, &FindrOptions::default()).is_err());

        let (handle, tracker) = pacer::tracker();
        coexpression_with_cancellation(tracker, &x, &FindrOptions::default()).unwrap();
        assert_eq!(handle.progress(), 1.0);
    }

    #[test]
    fn test_sample_mismatch_is_rejected() {
        let (x, g) = simulate();
        let mut g2 = g.clone();
        g2.samples[0] = "intruder".into();
        assert!(association(&x, &g2, &FindrOptions::default()).is_err());
    }

    #[test]
    fn test_option_parsing() {
        assert_eq!("mom".parse::<FitMethod>().unwrap(), FitMethod::Moments);
        assert_eq!("kde".parse::<FitMethod>().unwrap(), FitMethod::Kde);
        assert!("quantile".parse::<FitMethod>().is_err());
        assert_eq!("iv".parse::<Combination>().unwrap(), Combination::IV);
        assert_eq!("orig".parse::<Combination>().unwrap(), Combination::Orig);
        assert_eq!("mediation".parse::<Combination>().unwrap(), Combination::Mediation);
        assert_eq!("none".parse::<Combination>().unwrap(), Combination::None);
        assert!("best".parse::<Combination>().is_err());
    }
}
