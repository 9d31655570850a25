//! Arrow IPC input and result output for the findr workspace.
//!
//! The tutorial data layout is columnar: an expression table whose float
//! columns are genes, a genotype table whose integer columns are variants
//! (both optionally carrying a string sample-id column), and a two-string
//! cis-pair table mapping genes to their eQTLs.

mod read;
mod write;

pub use crate::read::{read_expression, read_genotypes, read_pairs};
pub use crate::write::write_edges_csv;
