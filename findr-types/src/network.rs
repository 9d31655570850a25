use serde::{Deserialize, Serialize};

/// One directed edge of an inferred network.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    /// regulator (gene or variant) name
    pub source: String,
    /// target gene name
    pub target: String,
    /// posterior probability that the edge is real
    pub posterior: f64,
    /// estimated FDR incurred by accepting this edge and all stronger ones
    pub qvalue: f64,
}

/// An inferred network: directed edges sorted by decreasing posterior.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Network {
    /// edges, strongest first
    pub edges: Vec<Edge>,
}

impl Network {
    /// Number of edges.
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    /// Is the network empty?
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Keep only edges with q-value at or below `fdr`. Edges are sorted by
    /// posterior, so this truncates the tail.
    pub fn filter_fdr(&mut self, fdr: f64) {
        self.edges.retain(|e| e.qvalue <= fdr);
    }
}
