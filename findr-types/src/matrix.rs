use anyhow::{bail, Error};
use ndarray::prelude::*;

/// Samples-by-genes expression table with row/column labels.
#[derive(Clone, Debug)]
pub struct ExpressionMatrix {
    /// expression values, one row per sample, one column per gene
    pub data: Array2<f64>,
    /// sample ids, row labels of `data`
    pub samples: Vec<String>,
    /// gene names, column labels of `data`
    pub genes: Vec<String>,
}

impl ExpressionMatrix {
    /// Build a labelled expression matrix, validating label lengths against
    /// the matrix shape.
    pub fn new(data: Array2<f64>, samples: Vec<String>, genes: Vec<String>) -> Result<Self, Error> {
        if samples.len() != data.nrows() {
            bail!(
                "expression matrix has {} rows but {} sample ids",
                data.nrows(),
                samples.len()
            );
        }
        if genes.len() != data.ncols() {
            bail!(
                "expression matrix has {} columns but {} gene names",
                data.ncols(),
                genes.len()
            );
        }
        Ok(ExpressionMatrix { data, samples, genes })
    }

    /// Number of samples (rows).
    pub fn n_samples(&self) -> usize {
        self.data.nrows()
    }

    /// Number of genes (columns).
    pub fn n_genes(&self) -> usize {
        self.data.ncols()
    }

    /// Column index of a gene name.
    pub fn gene_index(&self, name: &str) -> Option<usize> {
        self.genes.iter().position(|g| g == name)
    }
}

/// Samples-by-variants genotype table. Genotype values are small category
/// codes (e.g. minor-allele counts 0/1/2).
#[derive(Clone, Debug)]
pub struct GenotypeMatrix {
    /// genotype category per sample and variant
    pub data: Array2<u8>,
    /// sample ids, row labels of `data`
    pub samples: Vec<String>,
    /// variant names, column labels of `data`
    pub variants: Vec<String>,
}

impl GenotypeMatrix {
    /// Build a labelled genotype matrix, validating label lengths against the
    /// matrix shape.
    pub fn new(data: Array2<u8>, samples: Vec<String>, variants: Vec<String>) -> Result<Self, Error> {
        if samples.len() != data.nrows() {
            bail!(
                "genotype matrix has {} rows but {} sample ids",
                data.nrows(),
                samples.len()
            );
        }
        if variants.len() != data.ncols() {
            bail!(
                "genotype matrix has {} columns but {} variant names",
                data.ncols(),
                variants.len()
            );
        }
        Ok(GenotypeMatrix { data, samples, variants })
    }

    /// Number of samples (rows).
    pub fn n_samples(&self) -> usize {
        self.data.nrows()
    }

    /// Number of variants (columns).
    pub fn n_variants(&self) -> usize {
        self.data.ncols()
    }

    /// Column index of a variant name.
    pub fn variant_index(&self, name: &str) -> Option<usize> {
        self.variants.iter().position(|v| v == name)
    }
}

/// Resolve a list of column names against the full label set, failing on the
/// first unknown name.
pub fn resolve_colnames(names: &[String], all: &[String]) -> Result<Vec<usize>, Error> {
    names
        .iter()
        .map(|name| {
            all.iter()
                .position(|g| g == name)
                .ok_or_else(|| anyhow::format_err!("unknown column name: {name}"))
        })
        .collect()
}
