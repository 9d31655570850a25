//! Shared data types for the findr workspace: named expression and genotype
//! matrices, cis gene/variant pair tables, and inferred-network results.

pub mod matrix;
pub mod network;
pub mod pairs;

pub use crate::matrix::{ExpressionMatrix, GenotypeMatrix};
pub use crate::network::{Edge, Network};
pub use crate::pairs::CisPairs;
