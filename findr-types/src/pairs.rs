use crate::matrix::{ExpressionMatrix, GenotypeMatrix};
use anyhow::{bail, Error};
use serde::{Deserialize, Serialize};

/// Cis gene/eQTL mapping: for each entry, the named gene has the named
/// variant as its strongest cis-acting eQTL.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CisPairs {
    /// gene names, parallel to `variants`
    pub genes: Vec<String>,
    /// variant names, parallel to `genes`
    pub variants: Vec<String>,
}

impl CisPairs {
    /// Build a pair table from parallel name lists.
    pub fn new(genes: Vec<String>, variants: Vec<String>) -> Result<Self, Error> {
        if genes.len() != variants.len() {
            bail!(
                "cis pair table has {} genes but {} variants",
                genes.len(),
                variants.len()
            );
        }
        Ok(CisPairs { genes, variants })
    }

    /// Number of pairs.
    pub fn len(&self) -> usize {
        self.genes.len()
    }

    /// Is the table empty?
    pub fn is_empty(&self) -> bool {
        self.genes.is_empty()
    }

    /// Resolve names to `(gene column, variant column)` index pairs against
    /// the given matrices. Unknown names are errors.
    pub fn resolve(
        &self,
        expression: &ExpressionMatrix,
        genotypes: &GenotypeMatrix,
    ) -> Result<Vec<(usize, usize)>, Error> {
        self.genes
            .iter()
            .zip(&self.variants)
            .map(|(gene, variant)| {
                let g = match expression.gene_index(gene) {
                    Some(g) => g,
                    None => bail!("cis pair references unknown gene: {gene}"),
                };
                let v = match genotypes.variant_index(variant) {
                    Some(v) => v,
                    None => bail!("cis pair references unknown variant: {variant}"),
                };
                Ok((g, v))
            })
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use ndarray::Array2;

    fn tiny() -> (ExpressionMatrix, GenotypeMatrix) {
        let x = ExpressionMatrix::new(
            Array2::zeros((4, 2)),
            (0..4).map(|i| format!("s{i}")).collect(),
            vec!["gene_a".into(), "gene_b".into()],
        )
        .unwrap();
        let g = GenotypeMatrix::new(
            Array2::zeros((4, 1)),
            (0..4).map(|i| format!("s{i}")).collect(),
            vec!["rs1".into()],
        )
        .unwrap();
        (x, g)
    }

    #[test]
    fn test_resolve() {
        let (x, g) = tiny();
        let pairs = CisPairs::new(vec!["gene_b".into()], vec!["rs1".into()]).unwrap();
        assert_eq!(pairs.resolve(&x, &g).unwrap(), vec![(1, 0)]);
    }

    #[test]
    fn test_resolve_unknown_name() {
        let (x, g) = tiny();
        let pairs = CisPairs::new(vec!["gene_z".into()], vec!["rs1".into()]).unwrap();
        let err = pairs.resolve(&x, &g).unwrap_err().to_string();
        assert!(err.contains("gene_z"), "{err}");
    }

    #[test]
    fn test_length_mismatch() {
        assert!(CisPairs::new(vec!["a".into()], vec![]).is_err());
    }
}
