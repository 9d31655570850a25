//! Multiple-testing summaries: q-values from posterior probabilities and
//! Benjamini-Hochberg adjustment of raw p-values.

use noisy_float::prelude::*;

/// Convert posterior probabilities into q-values.
///
/// Accepting every edge with posterior >= p incurs an expected false
/// discovery proportion equal to the mean of (1 - posterior) over the
/// accepted set; the q-value of an edge is that mean over it and all
/// stronger edges. Input order is preserved in the output. Posteriors must
/// be finite.
pub fn qvalues(posteriors: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..posteriors.len()).collect();
    order.sort_by_key(|&i| std::cmp::Reverse(n64(posteriors[i])));

    let mut out = vec![0.0; posteriors.len()];
    let mut acc = 0.0;
    for (rank, &i) in order.iter().enumerate() {
        acc += 1.0 - posteriors[i];
        out[i] = acc / (rank + 1) as f64;
    }
    out
}

/// Benjamini-Hochberg adjusted p-values, in input order.
///
/// Walks the ascending order from the largest p-value down, carrying the
/// running minimum of p * m / rank. P-values must be finite.
pub fn adjusted_pvalue_bh(pvalues: &[f64]) -> Vec<f64> {
    let m = pvalues.len();
    let mut order: Vec<usize> = (0..m).collect();
    order.sort_by_key(|&i| n64(pvalues[i]));

    let mut out = vec![0.0; m];
    let mut running = f64::INFINITY;
    for rank in (0..m).rev() {
        let i = order[rank];
        running = running.min(pvalues[i] * m as f64 / (rank + 1) as f64).min(1.0);
        out[i] = running;
    }
    out
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_qvalues_reference() {
        // fixture from an independent implementation
        let got = qvalues(&[0.9, 0.5, 0.8, 0.99, 0.1]);
        let expected = [0.055, 0.2025, 0.103333333333333, 0.01, 0.342];
        for (g, e) in got.iter().zip(&expected) {
            assert_approx_eq!(g, e, 1e-12);
        }
    }

    #[test]
    fn test_qvalues_monotone_along_ranking() {
        let post = [0.97, 0.2, 0.5, 0.9, 0.03, 0.8];
        let qs = qvalues(&post);
        let mut order: Vec<usize> = (0..post.len()).collect();
        order.sort_by(|&a, &b| post[b].partial_cmp(&post[a]).unwrap());
        for w in order.windows(2) {
            assert!(qs[w[0]] <= qs[w[1]] + 1e-12);
        }
        // the strongest edge's q-value is its own error probability
        assert_approx_eq!(qs[0], 1.0 - 0.97, 1e-12);
    }

    #[test]
    fn test_bh_reference() {
        // fixture from an independent implementation
        let got = adjusted_pvalue_bh(&[0.01, 0.02, 0.03, 0.5, 0.04, 1.0, 0.005]);
        let expected = [
            0.035,
            0.0466666666666667,
            0.0525,
            0.583333333333333,
            0.056,
            1.0,
            0.035,
        ];
        for (g, e) in got.iter().zip(&expected) {
            assert_approx_eq!(g, e, 1e-12);
        }
    }

    #[test]
    fn test_bh_bounds() {
        let pv = [0.2, 0.9, 0.01];
        let adj = adjusted_pvalue_bh(&pv);
        for (&p, &a) in pv.iter().zip(&adj) {
            assert!(a >= p - 1e-12);
            assert!(a <= 1.0);
        }
    }

    #[test]
    fn test_empty() {
        assert!(qvalues(&[]).is_empty());
        assert!(adjusted_pvalue_bh(&[]).is_empty());
    }
}
