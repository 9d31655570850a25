//! Rank-based inverse normal transformation of expression data.
//!
//! Each gene (column) is converted to tied ranks, ranks are mapped to
//! standard normal quantiles at r/(n+1), and the result is centered and
//! scaled to unit variance. All downstream likelihood ratios assume this
//! transformation: it makes every marginal exactly standard normal up to
//! ties, so the tests reduce to functions of second moments.

use crate::stats::tied_ranks;
use anyhow::{bail, Error};
use log::warn;
use ndarray::prelude::*;
use ndarray::Zip;
use statrs::distribution::{ContinuousCDF, Normal};

/// Supernormalize every column of a samples-by-genes matrix.
///
/// Constant columns carry no rank information and are mapped to zero with a
/// warning. Fails on non-finite input or fewer than two samples.
pub fn supernormalize(x: ArrayView2<'_, f64>) -> Result<Array2<f64>, Error> {
    let mut out = x.to_owned();
    supernormalize_in_place(&mut out)?;
    Ok(out)
}

/// [`supernormalize`] on owned data, replacing the matrix contents.
pub fn supernormalize_in_place(x: &mut Array2<f64>) -> Result<(), Error> {
    let n = x.nrows();
    if n < 2 {
        bail!("supernormalization requires at least 2 samples, got {n}");
    }
    if x.iter().any(|v| !v.is_finite()) {
        bail!("expression matrix contains non-finite values");
    }

    let normal = Normal::new(0.0, 1.0).unwrap();
    Zip::from(x.columns_mut()).par_for_each(|mut col| {
        supernormalize_col(&normal, &mut col);
    });
    Ok(())
}

fn supernormalize_col(normal: &Normal, col: &mut ArrayViewMut1<'_, f64>) {
    let n = col.len();
    let values = col.to_vec();

    let lo = values.iter().cloned().fold(f64::INFINITY, f64::min);
    let hi = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if lo == hi {
        warn!("constant expression column; supernormalized to zero");
        col.fill(0.0);
        return;
    }

    let ranks = tied_ranks(&values);
    for (v, r) in col.iter_mut().zip(&ranks) {
        *v = normal.inverse_cdf(r / (n as f64 + 1.0));
    }

    // exact zero mean, unit variance (1/n convention); ties push the raw
    // quantiles slightly off both
    let mean = col.sum() / n as f64;
    col.mapv_inplace(|v| v - mean);
    let var = col.iter().map(|v| v * v).sum::<f64>() / n as f64;
    let scale = var.sqrt().recip();
    col.mapv_inplace(|v| v * scale);
}
