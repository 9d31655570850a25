//! # findr: causal gene network inference from genome-transcriptome data
//!
//! Implements the Findr family of pairwise likelihood-ratio tests for
//! reconstructing gene regulatory networks from expression data with
//! (optionally) matching eQTL genotypes: rank-based supernormalization,
//! per-test log-likelihood ratios, analytic null distributions, mixture-model
//! and kernel-density posterior probabilities, and q-value based FDR control.

#![deny(missing_docs)]

/// Exported analyses: coexpression, association and causal inference
#[allow(clippy::module_inception)]
pub mod findr;

/// Posterior-probability to q-value conversion and p-value adjustment
pub mod fdr;

/// Kernel density estimation of observed LLR distributions
pub mod kde;

/// Log-likelihood ratios for the pairwise tests
pub mod llr;

/// Mixture model of null and real LLR distributions
pub mod mixture;

/// Analytic null LLR distributions and p-values
pub mod nulldist;

/// Small statistics helpers
pub mod stats;

/// Rank-based inverse normal transformation
pub mod supernormalize;

pub use crate::findr::{
    association, association_with_cancellation, causal, causal_with_cancellation, coexpression,
    coexpression_with_cancellation, Combination, FindrOptions, FitMethod,
};
pub use crate::supernormalize::{supernormalize, supernormalize_in_place};
